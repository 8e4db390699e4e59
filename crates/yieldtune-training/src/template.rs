//! Mistral Instruct prompt template.

const INST_OPEN: &str = "[INST] ";
const INST_CLOSE: &str = " [/INST]";

/// Fixed `[INST] ... [/INST]` wrapper used for both training text and
/// inference prompts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PromptTemplate;

impl PromptTemplate {
    /// `"[INST] {instruction} [/INST]\n{response}"`
    #[must_use]
    pub fn render_training(&self, instruction: &str, response: &str) -> String {
        let mut text =
            String::with_capacity(INST_OPEN.len() + instruction.len() + INST_CLOSE.len() + 1 + response.len());
        text.push_str(INST_OPEN);
        text.push_str(instruction);
        text.push_str(INST_CLOSE);
        text.push('\n');
        text.push_str(response);
        text
    }

    /// Prompt without a response; the model generates the continuation.
    #[must_use]
    pub fn render_prompt(&self, instruction: &str) -> String {
        format!("{INST_OPEN}{instruction}{INST_CLOSE}")
    }
}
