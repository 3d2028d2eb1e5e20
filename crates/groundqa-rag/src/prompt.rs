use groundqa_core::types::ScoredPassage;

pub const INSUFFICIENT_CONTEXT: &str = "I don't have enough information in the provided passages to answer this question.";

/// Labeled passage blocks, numbered from 1 and separated by blank lines.
pub fn build_context(passages: &[ScoredPassage]) -> String {
    passages
        .iter()
        .enumerate()
        .map(|(i, p)| format!("[Passage {}] Category: {} | Topic: {}\n{}", i + 1, p.category(), p.topic(), p.text()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn build_prompt(question: &str, context: &str) -> String {
    format!(
        "You are an analyst assistant. Your task is to answer questions using only the passages retrieved below.

INSTRUCTIONS:
- Use ONLY the provided passages to formulate your answer
- If the passages do not contain enough information to answer, say \"{INSUFFICIENT_CONTEXT}\"
- Be concise and specific
- When relevant, mention which categories the points relate to
- Summarize common themes if several passages make similar points

PASSAGES:
{context}

QUESTION: {question}

ANSWER:"
    )
}
