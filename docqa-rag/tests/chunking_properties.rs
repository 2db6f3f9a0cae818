//! Property tests for passage coverage, size and overlap.

use docqa_rag::{Chunker, Document, RecursiveChunker};
use proptest::prelude::*;

/// Text built from words, punctuation and breaks, with some CJK mixed in.
fn arb_page() -> impl Strategy<Value = String> {
    proptest::collection::vec(
        prop_oneof![
            4 => "[a-z]{1,12}",
            1 => Just(" ".to_string()),
            1 => Just(". ".to_string()),
            1 => Just(", ".to_string()),
            1 => Just("\n".to_string()),
            1 => Just("\n\n".to_string()),
            1 => Just("。".to_string()),
            1 => "[一-龥]{1,6}",
        ],
        1..120,
    )
    .prop_map(|parts| parts.join(" "))
}

/// `(max_chars, overlap_chars)` with overlap strictly below the budget.
fn arb_budget() -> impl Strategy<Value = (usize, usize)> {
    (2usize..200).prop_flat_map(|max| (Just(max), 0..max))
}

/// **Chunk coverage, size bound and overlap**
/// *For any* page and budget, passages stay within `max_chars`, match the
/// page text at their span, cover every character, and consecutive passages
/// share between 1 and `overlap_chars` characters (none when overlap is 0).
mod prop_chunk_invariants {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn passages_cover_page_within_budget(
            page in arb_page(),
            (max_chars, overlap) in arb_budget(),
        ) {
            prop_assume!(!page.trim().is_empty());
            let doc = Document::from_pages("doc", [page.clone()]);
            let passages = RecursiveChunker::new(max_chars, overlap).chunk(&doc).unwrap();
            let chars: Vec<char> = page.chars().collect();

            prop_assert!(!passages.is_empty());
            prop_assert_eq!(passages[0].char_span.start, 0);
            prop_assert_eq!(passages.last().unwrap().char_span.end, chars.len());

            for p in &passages {
                prop_assert!(p.text.chars().count() <= max_chars);
                prop_assert!(!p.char_span.is_empty());
                let expected: String = chars[p.char_span.start..p.char_span.end].iter().collect();
                prop_assert_eq!(&p.text, &expected);
            }

            for pair in passages.windows(2) {
                let (a, b) = (pair[0].char_span, pair[1].char_span);
                // no gap, forward progress
                prop_assert!(b.start <= a.end);
                prop_assert!(b.start > a.start);
                let shared = a.end - b.start;
                prop_assert!(shared <= overlap);
                if overlap > 0 {
                    prop_assert!(shared >= 1);
                }
            }
        }

        #[test]
        fn chunking_is_deterministic(
            page in arb_page(),
            (max_chars, overlap) in arb_budget(),
        ) {
            prop_assume!(!page.trim().is_empty());
            let doc = Document::from_pages("doc", [page]);
            let chunker = RecursiveChunker::new(max_chars, overlap);
            prop_assert_eq!(chunker.chunk(&doc).unwrap(), chunker.chunk(&doc).unwrap());
        }
    }
}

#[test]
fn overlap_stays_close_to_configured_window() {
    let words: Vec<String> = (0..400).map(|i| format!("w{i:03}")).collect();
    let doc = Document::from_pages("doc", [words.join(" ")]);
    let passages = RecursiveChunker::new(100, 20).chunk(&doc).unwrap();

    // words are 4 chars plus a space, so a boundary is never more than 4 away
    for pair in passages.windows(2) {
        let shared = pair[0].char_span.end - pair[1].char_span.start;
        assert!((16..=20).contains(&shared), "overlap {shared}");
    }
}

#[test]
fn multi_page_passages_keep_page_numbers_in_order() {
    let doc = Document::from_pages("doc", ["one two three ".repeat(20), "four five six ".repeat(20)]);
    let passages = RecursiveChunker::new(60, 10).chunk(&doc).unwrap();
    let pages: Vec<u32> = passages.iter().map(|p| p.source_page).collect();
    let mut sorted = pages.clone();
    sorted.sort();
    assert_eq!(pages, sorted);
    assert!(pages.contains(&1) && pages.contains(&2));
}
