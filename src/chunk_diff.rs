//! Chunk-level change detector (spec §4.6): hash-indexed O(n+m) diff of two
//! ordered chunk sequences.

use std::collections::{HashMap, VecDeque};
use uuid::Uuid;

use crate::models::{ChunkDiff, ChunkSummary, ReorderedChunk};

/// Diff `old` against `new`. When the same hash appears multiple times in
/// either sequence, old entries are consumed left-to-right (by index) in
/// the order their matching hash is encountered while scanning `new`
/// left-to-right — this tie-break is pinned by spec §4.6 and covered by
/// the `S3` scenario test below.
pub fn diff_chunks(
    document_id: Uuid,
    from_version: i64,
    to_version: i64,
    old: &[ChunkSummary],
    new: &[ChunkSummary],
) -> ChunkDiff {
    let mut old_by_hash: HashMap<&str, VecDeque<usize>> = HashMap::new();
    for (i, o) in old.iter().enumerate() {
        old_by_hash.entry(o.content_hash.as_str()).or_default().push_back(i);
    }

    let mut consumed = vec![false; old.len()];
    let mut added = Vec::new();
    let mut unchanged = Vec::new();
    let mut reordered = Vec::new();

    for n in new {
        let matched = old_by_hash.get_mut(n.content_hash.as_str()).and_then(|q| q.pop_front());
        match matched {
            Some(old_idx) => {
                consumed[old_idx] = true;
                let o = &old[old_idx];
                if o.chunk_index == n.chunk_index {
                    unchanged.push(n.clone());
                } else {
                    reordered.push(ReorderedChunk {
                        content_hash: n.content_hash.clone(),
                        from_index: o.chunk_index,
                        to_index: n.chunk_index,
                    });
                }
            }
            None => added.push(n.clone()),
        }
    }

    let removed = old
        .iter()
        .enumerate()
        .filter(|(i, _)| !consumed[*i])
        .map(|(_, o)| o.clone())
        .collect();

    ChunkDiff { document_id, from_version, to_version, added, removed, unchanged, reordered }
}
