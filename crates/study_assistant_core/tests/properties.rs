use proptest::prelude::*;

use study_assistant_core::chunking::{cap_chunks, split_into_chunks, word_windows};
use study_assistant_core::images::images_for_chunk;

proptest! {
    #[test]
    fn splitting_is_lossless(text in "\\PC{0,400}", size in 1usize..64) {
        let chunks = split_into_chunks(&text, size).unwrap();
        let rejoined: String = chunks.iter().map(|c| c.text.as_str()).collect();
        prop_assert_eq!(rejoined, text);
        for (i, chunk) in chunks.iter().enumerate() {
            prop_assert_eq!(chunk.index, i);
            prop_assert!(chunk.text.chars().count() <= size);
        }
    }

    #[test]
    fn capping_keeps_order_and_bound(len in 0usize..200, size in 1usize..8, max in 1usize..20) {
        let text = "a".repeat(len);
        let chunks = split_into_chunks(&text, size).unwrap();
        let total = chunks.len();
        let kept = cap_chunks(chunks, max);

        prop_assert_eq!(kept.len(), total.min(max));
        prop_assert!(kept.windows(2).all(|w| w[0].index < w[1].index));
        if total > 0 {
            prop_assert_eq!(kept[0].index, 0);
        }
        if total > max {
            for (i, chunk) in kept.iter().enumerate() {
                prop_assert_eq!(chunk.index, i * total / max);
            }
        }
    }

    #[test]
    fn image_ranges_partition_all_images(chunks in 1usize..30, images in 0usize..100) {
        let mut next = 0;
        for chunk in 0..chunks {
            let range = images_for_chunk(chunk, chunks, images);
            if !range.is_empty() {
                prop_assert_eq!(range.start, next);
                next = range.end;
            }
        }
        prop_assert_eq!(next, images);
    }

    #[test]
    fn windows_cover_every_word(words in 1usize..300, window in 1usize..60, overlap in 0usize..60) {
        let text = (0..words).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ");
        let windows = word_windows(&text, window, overlap).unwrap();
        let last = windows.last().unwrap();
        let last_word = format!("w{}", words - 1);
        prop_assert!(last.ends_with(&last_word));
        prop_assert!(windows.iter().all(|w| w.split(' ').count() <= window));
    }
}
