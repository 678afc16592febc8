use crate::models::{ConversationTurn, RankedResult};

/// Formats each result as `[filename pX-Y | chunk_id]` followed by its text,
/// separated by blank lines, in rerank order.
pub fn compose_context(results: &[RankedResult]) -> String {
    results
        .iter()
        .map(|result| {
            let chunk = &result.chunk;
            format!(
                "[{} p{}-{} | {}]\n{}",
                chunk.filename, chunk.page_start, chunk.page_end, chunk.chunk_id, chunk.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Renders the last `max_turns` turns as `ROLE: content` lines, oldest first.
pub fn render_history(turns: &[ConversationTurn], max_turns: usize) -> String {
    let skip = turns.len().saturating_sub(max_turns);
    turns[skip..]
        .iter()
        .map(|turn| format!("{}: {}", turn.role.label(), turn.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// The text embedded for retrieval. History shapes what is retrieved but is
/// never passed on to generation.
pub fn retrieval_query(question: &str, history: &str) -> String {
    if history.trim().is_empty() {
        return question.to_string();
    }
    format!("Previous conversation:\n{history}\n\nCurrent question: {question}")
}
