//! Combines per-chunk transcriptions into one document.
//!
//! Chunks produced by silence-aware splitting can share a few words at
//! their boundaries (speech clipped around the cut point gets transcribed
//! on both sides). The merge searches for a case-insensitive overlap
//! between the tail of the accumulated text and the head of the next
//! chunk and drops the duplicated prefix before joining.

use vox_stt_interface::{ChunkRecord, ChunkStatus};

/// Overlaps shorter than this are treated as coincidence, not duplication.
const MIN_OVERLAP: usize = 10;
/// Overlap search window, in characters, at each join.
const MAX_OVERLAP: usize = 100;

/// Merge the successful chunks of a job, in ascending index order.
/// FAILED or empty chunks are skipped; the caller is responsible for
/// refusing to merge when nothing succeeded.
pub fn merge_chunks(chunks: &[ChunkRecord]) -> String {
    let mut sorted: Vec<&ChunkRecord> = chunks
        .iter()
        .filter(|c| c.status == ChunkStatus::Completed)
        .collect();
    sorted.sort_by_key(|c| c.index);

    let texts: Vec<&str> = sorted
        .iter()
        .filter_map(|c| c.text.as_deref())
        .collect();

    merge(&texts)
}

/// Merge already-ordered chunk texts.
pub fn merge(texts: &[&str]) -> String {
    let cleaned: Vec<String> = texts
        .iter()
        .map(|t| clean_text(t))
        .filter(|t| !t.is_empty())
        .collect();

    if cleaned.is_empty() {
        return String::new();
    }

    let mut merged: Vec<char> = cleaned[0].chars().collect();

    for text in &cleaned[1..] {
        let current: Vec<char> = text.chars().collect();
        let overlap = find_overlap(&merged, &current);
        if overlap > 0 {
            tracing::debug!(overlap, "dropping duplicated chunk prefix");
        }
        let rest = &current[overlap..];

        let needs_space = matches!(
            (merged.last(), rest.first()),
            (Some(last), Some(first)) if !last.is_whitespace() && !first.is_whitespace()
        );
        if needs_space {
            merged.push(' ');
        }
        merged.extend_from_slice(rest);
    }

    final_cleanup(&merged.into_iter().collect::<String>())
}

/// Per-chunk cleanup: trim, collapse whitespace runs to single spaces,
/// collapse runs of the same sentence-terminal punctuation.
pub fn clean_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev: Option<char> = None;

    for c in text.trim().chars() {
        if c.is_whitespace() {
            if prev != Some(' ') {
                out.push(' ');
                prev = Some(' ');
            }
            continue;
        }
        if matches!(c, '.' | '!' | '?') && prev == Some(c) {
            continue;
        }
        out.push(c);
        prev = Some(c);
    }

    out
}

/// Longest `L` in `[MIN_OVERLAP, min(len, len, MAX_OVERLAP)]` such that the
/// last `L` characters of `prev` equal the first `L` of `next`,
/// case-insensitively. Returns 0 when no such overlap exists.
fn find_overlap(prev: &[char], next: &[char]) -> usize {
    let max = prev.len().min(next.len()).min(MAX_OVERLAP);

    for len in (MIN_OVERLAP..=max).rev() {
        let suffix = &prev[prev.len() - len..];
        let prefix = &next[..len];
        let matches = suffix
            .iter()
            .zip(prefix)
            .all(|(a, b)| a.to_lowercase().eq(b.to_lowercase()));
        if matches {
            return len;
        }
    }

    0
}

/// Final pass over the joined document: whitespace normalization,
/// punctuation spacing, and sentence-initial capitalization.
pub fn final_cleanup(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out: Vec<char> = Vec::with_capacity(chars.len());

    let is_terminal = |c: char| matches!(c, '.' | ',' | '!' | '?');
    let is_closer = |c: char| matches!(c, ')' | ']' | '}' | '"' | '\'' | '»');

    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];

        if c.is_whitespace() {
            // Swallow the run; decide later whether a space survives based
            // on what follows it.
            let mut j = i + 1;
            while j < chars.len() && chars[j].is_whitespace() {
                j += 1;
            }
            if j < chars.len() && !is_terminal(chars[j]) && !is_closer(chars[j]) && !out.is_empty()
            {
                out.push(' ');
            }
            i = j;
            continue;
        }

        if is_terminal(c) {
            // Duplicate sentence punctuation collapses to one.
            if out.last().copied() == Some(c) && c != ',' {
                i += 1;
                continue;
            }
            out.push(c);
            let next = chars[i + 1..].iter().find(|n| !n.is_whitespace());
            // One space after, unless a closer or the end follows.
            let mut j = i + 1;
            while j < chars.len() && chars[j].is_whitespace() {
                j += 1;
            }
            if let Some(&n) = next
                && !is_closer(n)
                && !is_terminal(n)
            {
                out.push(' ');
            }
            i = j;
            continue;
        }

        out.push(c);
        i += 1;
    }

    while out.last().is_some_and(|c| c.is_whitespace()) {
        out.pop();
    }

    if let Some(first) = out.first_mut() {
        let upper: Vec<char> = first.to_uppercase().collect();
        if upper.len() == 1 {
            *first = upper[0];
        }
    }

    out.into_iter().collect()
}
