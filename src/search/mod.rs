//! Keyword search over the record store: an indexed tier backed by tantivy
//! and a substring fallback tier that works straight off the in-memory
//! records when the index is unavailable or rejects the query.

pub mod text_index;

pub use text_index::TextIndex;

use crate::models::Record;

/// Search records via the text index, falling back to a case-insensitive
/// substring scan when the index is absent or errors. The degradation is
/// transparent to callers; the failure itself is logged.
pub fn search_with_fallback(
    index: Option<&TextIndex>,
    records: &[Record],
    query: &str,
    limit: usize,
) -> Vec<Record> {
    if let Some(index) = index {
        match index.search(query, limit) {
            Ok(hits) => {
                return hits
                    .into_iter()
                    .filter_map(|(id, _)| records.iter().find(|r| r.id == id).cloned())
                    .collect();
            }
            Err(e) => {
                tracing::warn!("Text index search failed, using fallback: {e:#}");
            }
        }
    }
    substring_fallback(records, query, limit)
}

/// Case-insensitive substring match over title, symptoms, root cause and
/// solution.
pub fn substring_fallback(records: &[Record], query: &str, limit: usize) -> Vec<Record> {
    let needle = query.to_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }
    records
        .iter()
        .filter(|r| {
            r.title.to_lowercase().contains(&needle)
                || r.symptoms.to_lowercase().contains(&needle)
                || r.root_cause.to_lowercase().contains(&needle)
                || r.solution.to_lowercase().contains(&needle)
        })
        .take(limit)
        .cloned()
        .collect()
}

/// Match records containing ANY of the given terms (case-insensitive) in
/// title, symptoms, root cause, solution or tags. The solver builds its
/// terms from whitespace-split words longer than 3 characters.
pub fn keyword_fallback(records: &[Record], terms: &[String], limit: usize) -> Vec<Record> {
    let needles: Vec<String> = terms
        .iter()
        .map(|t| t.to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();
    if needles.is_empty() {
        return Vec::new();
    }

    records
        .iter()
        .filter(|r| {
            let haystacks = [
                r.title.to_lowercase(),
                r.symptoms.to_lowercase(),
                r.root_cause.to_lowercase(),
                r.solution.to_lowercase(),
                r.tags.join(" ").to_lowercase(),
            ];
            needles
                .iter()
                .any(|n| haystacks.iter().any(|h| h.contains(n)))
        })
        .take(limit)
        .cloned()
        .collect()
}

/// Whitespace-split a problem description into search terms, keeping only
/// words longer than 3 characters.
pub fn search_terms(problem: &str) -> Vec<String> {
    problem
        .split_whitespace()
        .filter(|w| w.len() > 3)
        .map(|w| w.to_string())
        .collect()
}
