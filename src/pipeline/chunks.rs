//! Chunk list operations applied between search and rerank.

use crate::inference::{Chunk, RerankedChunk};
use std::collections::HashMap;

/// Separator between passages of one document after merging
pub const MERGE_SEPARATOR: &str = "\n\n";

/// Collapse chunks of the same document into one.
///
/// Chunks are visited by descending score; the first chunk seen for a
/// `document_id` is the anchor and keeps its score and metadata, later ones
/// only contribute their content. The output is ordered by anchor score.
/// Running it again on its own output changes nothing.
pub fn merge_by_document(mut chunks: Vec<Chunk>) -> Vec<Chunk> {
    chunks.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut merged: Vec<Chunk> = Vec::with_capacity(chunks.len());
    let mut index: HashMap<String, usize> = HashMap::new();

    for chunk in chunks {
        match index.get(&chunk.metadata.document_id) {
            Some(&position) => {
                let anchor = &mut merged[position];
                anchor.content.push_str(MERGE_SEPARATOR);
                anchor.content.push_str(&chunk.content);
            }
            None => {
                index.insert(chunk.metadata.document_id.clone(), merged.len());
                merged.push(chunk);
            }
        }
    }

    merged
}

/// Keep the first `limit` entries, preserving order
pub fn truncate<T>(mut items: Vec<T>, limit: usize) -> Vec<T> {
    items.truncate(limit);
    items
}

/// Best `limit` reranked chunks, flattened back into chunks
pub fn top_reranked(mut results: Vec<RerankedChunk>, limit: usize) -> Vec<Chunk> {
    results.sort_by(|a, b| b.rerank_score.total_cmp(&a.rerank_score));
    results.into_iter().take(limit).map(RerankedChunk::into_chunk).collect()
}
