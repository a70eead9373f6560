// Prompt fragments shared by every agent. Agent-specific templates live in
// the prompts.rs next to each agent.

/// Instruction appended to every prompt that receives retrieved context.
pub const GROUNDING_INSTRUCTION: &str = "\
    Base your response on the provided context whenever it is relevant. \
    Do NOT invent facts that contradict the context. \
    If the context does not cover the question, say so plainly.";

/// Reply in the learner's language.
pub const LANGUAGE_INSTRUCTION: &str = "\
    Answer in the same language the user writes in.";

/// Fills `{name}` placeholders in a template.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    vars.iter().fold(template.to_string(), |acc, (name, value)| {
        acc.replace(&format!("{{{name}}}"), value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_replaces_all_occurrences() {
        let out = render("{a} and {b} and {a}", &[("a", "x"), ("b", "y")]);
        assert_eq!(out, "x and y and x");
    }

    #[test]
    fn test_render_leaves_unknown_placeholders() {
        assert_eq!(render("{missing}", &[]), "{missing}");
    }
}
