//! Structure-aware markdown chunker.
//!
//! Splits a note's markdown into chunks that stay close to a target
//! character count, never break mid-line, and carry heading context so
//! each chunk is self-locating. The algorithm is a pre-split by heading
//! hierarchy followed by a recursive separator cascade, small-fragment
//! absorption, and an overlap window — see the component design for the
//! full rationale.

use std::collections::BTreeMap;

use crate::models::{Chunk, Note};

/// Target character count is divided into the four separator tiers used
/// when a section is still too large: blank line, single newline,
/// sentence boundary, plain space. Beyond that, fall back to a hard
/// character split.
const SEPARATORS: [&str; 4] = ["\n\n", "\n", ". ", " "];

struct Section {
    headers: BTreeMap<String, String>,
    text: String,
}

/// Splits a note's markdown into chunks. Returns an empty vec for empty
/// markdown. The first chunk carries `contentHash`; every chunk carries
/// the note's stable `noteId` and a deterministic `id`.
pub fn chunk_note(note: &Note, target_chars: usize) -> Vec<Chunk> {
    if note.markdown.is_empty() {
        return Vec::new();
    }

    let overlap = (target_chars / 6).max(1);
    let mut fragments: Vec<(BTreeMap<String, String>, String)> = Vec::new();

    for section in split_sections(&note.markdown) {
        let pieces = absorb_small(recursive_split(&section.text, target_chars, 0), target_chars);
        for piece in pieces {
            fragments.push((section.headers.clone(), piece));
        }
    }

    if fragments.is_empty() {
        return Vec::new();
    }

    apply_overlap(&mut fragments, overlap);

    let note_id = note.note_id();
    fragments
        .into_iter()
        .enumerate()
        .map(|(index, (headers, content))| Chunk {
            id: Chunk::derive_id(&note_id, &note.modification_date, index),
            note_id: note_id.clone(),
            chunk_index: index,
            content,
            title: note.title.clone(),
            modification_date: note.modification_date,
            size: note.size,
            header_metadata: headers,
            content_hash: if index == 0 { Some(note.content_hash()) } else { None },
        })
        .collect()
}

/// Pre-splits markdown by heading hierarchy. Each resulting section
/// carries the enclosing heading path (`h1`..`h6`) and the raw text
/// including the heading line itself, so concatenation in order
/// recovers every character of the original markdown.
fn split_sections(markdown: &str) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut stack: BTreeMap<usize, String> = BTreeMap::new();
    let mut current_headers: BTreeMap<String, String> = BTreeMap::new();
    let mut current = String::new();

    for line in markdown.split_inclusive('\n') {
        if let Some((level, title)) = parse_heading(line) {
            if !current.is_empty() {
                sections.push(Section {
                    headers: current_headers.clone(),
                    text: std::mem::take(&mut current),
                });
            }
            stack.retain(|&l, _| l < level);
            stack.insert(level, title);
            current_headers = stack.iter().map(|(l, t)| (format!("h{l}"), t.clone())).collect();
        }
        current.push_str(line);
    }

    if !current.is_empty() {
        sections.push(Section {
            headers: current_headers,
            text: current,
        });
    }

    if sections.is_empty() {
        sections.push(Section {
            headers: BTreeMap::new(),
            text: markdown.to_string(),
        });
    }

    sections
}

fn parse_heading(line: &str) -> Option<(usize, String)> {
    let trimmed = line.trim_end_matches('\n');
    let hashes = trimmed.chars().take_while(|&c| c == '#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = &trimmed[hashes..];
    if !rest.starts_with(' ') {
        return None;
    }
    Some((hashes, rest.trim().to_string()))
}

/// Recursively splits `text` through the separator cascade until every
/// fragment is at most `1.5 * target_chars`, falling back to a hard
/// character split once the separator tiers are exhausted.
fn recursive_split(text: &str, target_chars: usize, tier: usize) -> Vec<String> {
    let max_chars = target_chars * 3 / 2;
    if text.chars().count() <= max_chars {
        return vec![text.to_string()];
    }

    if tier < SEPARATORS.len() {
        let sep = SEPARATORS[tier];
        if text.contains(sep) {
            return accumulate(split_keep_separator(text, sep), target_chars, tier);
        }
        return recursive_split(text, target_chars, tier + 1);
    }

    hard_split_chars(text, max_chars)
}

/// Splits `text` on `sep`, keeping the separator attached to the end of
/// every piece but the last so no character is lost.
fn split_keep_separator(text: &str, sep: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut rest = text;
    while let Some(idx) = rest.find(sep) {
        let (head, tail) = rest.split_at(idx + sep.len());
        out.push(head.to_string());
        rest = tail;
    }
    if !rest.is_empty() {
        out.push(rest.to_string());
    }
    out
}

/// Greedily groups adjacent pieces so each group stays under
/// `1.5 * target_chars`, recursing into the next separator tier for any
/// single piece that is still too large on its own.
fn accumulate(pieces: Vec<String>, target_chars: usize, tier: usize) -> Vec<String> {
    let max_chars = target_chars * 3 / 2;
    let mut out = Vec::new();
    let mut buf = String::new();

    for piece in pieces {
        if piece.chars().count() > max_chars {
            if !buf.is_empty() {
                out.push(std::mem::take(&mut buf));
            }
            out.extend(recursive_split(&piece, target_chars, tier + 1));
            continue;
        }

        if !buf.is_empty() && buf.chars().count() + piece.chars().count() > max_chars {
            out.push(std::mem::take(&mut buf));
        }
        buf.push_str(&piece);
    }

    if !buf.is_empty() {
        out.push(buf);
    }

    out
}

fn hard_split_chars(text: &str, max_chars: usize) -> Vec<String> {
    text.chars()
        .collect::<Vec<_>>()
        .chunks(max_chars.max(1))
        .map(|c| c.iter().collect())
        .collect()
}

/// Absorbs small fragments into their neighbor within the same section
/// until each chunk is at least `target_chars / 4`. Never merges across
/// a section boundary (callers invoke this per-section).
fn absorb_small(fragments: Vec<String>, target_chars: usize) -> Vec<String> {
    let min_chars = target_chars / 4;
    if fragments.len() <= 1 {
        return fragments;
    }

    let mut out: Vec<String> = Vec::new();
    for frag in fragments {
        if let Some(last) = out.last_mut() {
            if last.chars().count() < min_chars {
                last.push_str(&frag);
                continue;
            }
        }
        out.push(frag);
    }

    if out.len() > 1 && out.last().unwrap().chars().count() < min_chars {
        let tail = out.pop().unwrap();
        out.last_mut().unwrap().push_str(&tail);
    }

    out
}

/// Prepends the tail of each chunk to its successor, without touching
/// the first chunk.
fn apply_overlap(fragments: &mut [(BTreeMap<String, String>, String)], overlap_chars: usize) {
    for i in (1..fragments.len()).rev() {
        let tail: String = fragments[i - 1]
            .1
            .chars()
            .rev()
            .take(overlap_chars)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        if !tail.is_empty() {
            fragments[i].1 = format!("{tail}{}", fragments[i].1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use std::collections::BTreeMap as Map;

    fn note(title: &str, markdown: &str) -> Note {
        Note {
            title: title.to_string(),
            markdown: markdown.to_string(),
            size: markdown.len() as u64,
            modification_date: DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .unwrap()
                .with_timezone(&chrono::Utc),
            creation_date: None,
            extra: Map::new(),
        }
    }

    #[test]
    fn empty_markdown_yields_zero_chunks() {
        let n = note("Empty", "");
        assert!(chunk_note(&n, 1200).is_empty());
    }

    #[test]
    fn single_short_note_is_one_chunk() {
        let n = note("A", "# H\n\ntext");
        let chunks = chunk_note(&n, 1200);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].content_hash, Some(n.content_hash()));
    }

    #[test]
    fn heading_metadata_is_attached() {
        let n = note("A", "# Top\n\nIntro text.\n\n## Sub\n\nSub text that is here.");
        let chunks = chunk_note(&n, 1200);
        assert!(chunks.iter().any(|c| c.header_metadata.get("h1") == Some(&"Top".to_string())));
    }

    #[test]
    fn chunk_indices_are_contiguous() {
        let body = (0..80).map(|i| format!("Paragraph number {i} with some extra words to pad it out.")).collect::<Vec<_>>().join("\n\n");
        let n = note("Long", &body);
        let chunks = chunk_note(&n, 200);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i);
        }
    }

    #[test]
    fn only_first_chunk_has_content_hash() {
        let body = (0..80).map(|i| format!("Paragraph number {i} with some extra words to pad it out.")).collect::<Vec<_>>().join("\n\n");
        let n = note("Long", &body);
        let chunks = chunk_note(&n, 200);
        assert!(chunks.len() > 1);
        assert!(chunks[0].content_hash.is_some());
        assert!(chunks[1..].iter().all(|c| c.content_hash.is_none()));
    }

    #[test]
    fn chunking_is_deterministic() {
        let body = "Alpha beta gamma.\n\nDelta epsilon zeta.\n\nEta theta iota kappa lambda.";
        let n = note("A", body);
        let a = chunk_note(&n, 20);
        let b = chunk_note(&n, 20);
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.id, y.id);
            assert_eq!(x.content, y.content);
        }
    }

    #[test]
    fn chunks_stay_within_bounds_when_note_is_large_enough() {
        let body = (0..200).map(|i| format!("Sentence number {i} about the general topic at hand today.")).collect::<Vec<_>>().join(" ");
        let n = note("Big", &body);
        let target = 500;
        let chunks = chunk_note(&n, target);
        // every chunk but possibly the last respects the upper bound;
        // overlap can push a chunk slightly over so allow generous slack.
        for c in &chunks[..chunks.len().saturating_sub(1)] {
            assert!(c.content.chars().count() <= target * 2, "chunk too large: {}", c.content.len());
        }
    }

    proptest::proptest! {
        #[test]
        fn every_non_final_chunk_respects_the_upper_bound(
            sentence_count in 10usize..300,
            target in 80usize..2000,
        ) {
            let body = (0..sentence_count)
                .map(|i| format!("Sentence number {i} about the general topic at hand today."))
                .collect::<Vec<_>>()
                .join(" ");
            let n = note("Prop", &body);
            let chunks = chunk_note(&n, target);

            let upper_bound = target * 2;
            for c in &chunks[..chunks.len().saturating_sub(1)] {
                proptest::prop_assert!(c.content.chars().count() <= upper_bound);
            }
        }
    }
}
