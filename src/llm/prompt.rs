//! RAG prompt layout: instructions, document sections, then the question.

/// Full prompt sent as a single user message.
pub fn build_prompt(system_prompt: &str, context: &str, question: &str) -> String {
    let mut prompt = String::with_capacity(system_prompt.len() + context.len() + question.len() + 32);
    prompt.push_str(system_prompt);
    if !context.is_empty() {
        prompt.push('\n');
        prompt.push_str(context);
    }
    prompt.push_str("\n\nQuestion: ");
    prompt.push_str(question.trim());
    prompt.push_str("\n\nAnswer:");
    prompt
}
