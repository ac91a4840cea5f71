//! crates/study_assistant_core/src/images.rs
//!
//! Spreads a document's page images across its generation chunks.

use std::ops::Range;

/// Returns the contiguous range of image indices that belongs to `chunk_index`.
///
/// With `per_chunk = total_images / total_chunks`, chunk `i` receives
/// `[floor(i * per_chunk), floor((i + 1) * per_chunk))`, clipped to `[0, total_images)`.
/// The floors are computed in integer arithmetic, so over all chunks the ranges tile
/// `0..total_images` exactly once with no gaps.
pub fn images_for_chunk(chunk_index: usize, total_chunks: usize, total_images: usize) -> Range<usize> {
    if total_chunks == 0 || total_images == 0 || chunk_index >= total_chunks {
        return 0..0;
    }

    let start = chunk_index * total_images / total_chunks;
    let end = (chunk_index + 1) * total_images / total_chunks;
    start.min(total_images)..end.min(total_images)
}

/// Formats the image markers a chunk prompt asks the model to place, e.g. `[PDF_IMG:2]`.
pub fn image_markers(range: Range<usize>) -> Vec<String> {
    range.map(|index| format!("[PDF_IMG:{index}]")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seven_images_over_three_chunks() {
        assert_eq!(images_for_chunk(0, 3, 7), 0..2);
        assert_eq!(images_for_chunk(1, 3, 7), 2..4);
        assert_eq!(images_for_chunk(2, 3, 7), 4..7);
    }

    #[test]
    fn fewer_images_than_chunks_leaves_some_chunks_empty() {
        let ranges: Vec<_> = (0..5).map(|i| images_for_chunk(i, 5, 2)).collect();
        assert_eq!(ranges, vec![0..0, 0..0, 0..1, 1..1, 1..2]);
    }

    #[test]
    fn no_images_means_every_chunk_is_empty() {
        for i in 0..4 {
            assert!(images_for_chunk(i, 4, 0).is_empty());
        }
    }

    #[test]
    fn even_division_gives_equal_shares() {
        for i in 0..3 {
            assert_eq!(images_for_chunk(i, 3, 9).len(), 3);
        }
    }

    #[test]
    fn markers_follow_range() {
        assert_eq!(image_markers(2..4), vec!["[PDF_IMG:2]", "[PDF_IMG:3]"]);
        assert!(image_markers(0..0).is_empty());
    }
}
