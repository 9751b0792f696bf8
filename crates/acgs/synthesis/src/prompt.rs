use acgs_types::Principle;

use crate::context::SynthesisContext;

/// Renders oracle prompts for rule synthesis.
pub struct SynthesisPromptBuilder;

impl SynthesisPromptBuilder {
    /// Build the synthesis prompt for one principle.
    pub fn build(principle: &Principle, context: &SynthesisContext) -> String {
        let mut prompt = String::new();

        prompt.push_str("You translate constitutional principles into executable policy rules.\n");
        prompt.push_str("Reply with exactly one rule in the grammar below and nothing else.\n\n");

        prompt.push_str("## Grammar\n");
        prompt.push_str(GRAMMAR_BLOCK);
        prompt.push('\n');

        prompt.push_str(&format!(
            "## Principle {} (priority {}, {})\n{}\n\n",
            principle.id, principle.priority, principle.formalizability, principle.description
        ));
        if let Some(parent) = &context.parent {
            prompt.push_str(&format!("Derived from principle {}.\n\n", parent));
        }
        if let Some(spec) = &principle.formal_spec {
            prompt.push_str(&format!("## Formal intent\nThe rule must fire exactly when: {}\n\n", spec));
        }

        if !principle.scenarios.is_empty() {
            prompt.push_str("## Scenarios\n");
            for s in &principle.scenarios {
                prompt.push_str(&format!(
                    "- {}{}: given {} when {} then {}\n",
                    s.name,
                    if s.mandatory { "" } else { " (advisory)" },
                    s.given,
                    s.when,
                    s.then
                ));
            }
            prompt.push('\n');
        }

        if !context.active_rules.is_empty() {
            prompt.push_str("## Active rules (avoid contradicting these)\n");
            for r in &context.active_rules {
                prompt.push_str(&format!(
                    "- {} [priority {}, {}]: {}\n",
                    r.id, r.priority, r.verdict, r.body
                ));
            }
            prompt.push('\n');
        }

        if !context.forbidden_patterns.is_empty() {
            prompt.push_str("## Forbidden constructs\n");
            for p in &context.forbidden_patterns {
                prompt.push_str(&format!("- {}\n", p));
            }
            prompt.push('\n');
        }

        if !context.fairness_constraints.is_empty() || !context.excluded_fields.is_empty() {
            prompt.push_str("## Fairness constraints\n");
            for c in &context.fairness_constraints {
                prompt.push_str(&format!("- {}\n", c));
            }
            for f in &context.excluded_fields {
                prompt.push_str(&format!("- do not read field `{}`\n", f));
            }
            prompt.push('\n');
        }

        if let Some(template) = &context.corrective_template {
            prompt.push_str(&format!("## Follow this template\n{}\n\n", template));
        }

        if !context.previous_errors.is_empty() {
            prompt.push_str("## Previous attempts failed with\n");
            for e in &context.previous_errors {
                prompt.push_str(&format!("- {}\n", e));
            }
            prompt.push('\n');
        }

        prompt.push_str("## Output\n");
        prompt.push_str("A single (rule ...) form. Optionally a final line `confidence: <0..1>`.\n");
        prompt
    }
}

const GRAMMAR_BLOCK: &str = "\
(rule <name> (when <condition>) (then <deny|warn|allow> \"<explanation>\"))
condition := true | false | <number> | \"<string>\" | <field.path>
           | (< a b) | (<= a b) | (> a b) | (>= a b) | (== a b) | (!= a b)
           | (and c...) | (or c...) | (not c)
           | (exists path) | (in path v...) | (contains path \"s\") | (matches path \"glob\")
           | (any path c) | (all path c)   ; element fields as it.<field>
           | (call abs|len|lower|min|max args...)\n";
