/// Whether the completion that just brought the job to `completed` of
/// `total` successful chunks deserves a progress write.
///
/// Writes happen at the first completion, the final completion, and (for
/// jobs of at least four chunks) when cumulative progress crosses 50% or
/// 75%. That bounds progress writes to at most four per job no matter how
/// many chunks it has.
pub fn is_milestone(completed: u32, total: u32) -> bool {
    if total == 0 || completed == 0 {
        return false;
    }
    if completed == 1 || completed == total {
        return true;
    }
    if total >= 4 {
        let before = (completed - 1) as f64 / total as f64;
        let after = completed as f64 / total as f64;
        for threshold in [0.5, 0.75] {
            if before < threshold && after >= threshold {
                return true;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn milestones(total: u32) -> Vec<u32> {
        (1..=total).filter(|&c| is_milestone(c, total)).collect()
    }

    #[test]
    fn twenty_chunks_write_exactly_four_times() {
        assert_eq!(milestones(20), vec![1, 10, 15, 20]);
    }

    #[test]
    fn small_jobs_write_first_and_last_only() {
        assert_eq!(milestones(1), vec![1]);
        assert_eq!(milestones(2), vec![1, 2]);
        assert_eq!(milestones(3), vec![1, 3]);
    }

    #[test]
    fn four_chunks_hit_every_milestone() {
        assert_eq!(milestones(4), vec![1, 2, 3, 4]);
    }

    #[test]
    fn write_count_is_bounded_regardless_of_chunk_count() {
        for total in 1..=500 {
            let count = milestones(total).len();
            assert!(count <= 4, "total={total} wrote {count} times");
            assert!(count >= 1);
            if total >= 4 {
                assert_eq!(count, 4, "total={total}");
            }
        }
    }

    #[test]
    fn zero_progress_never_writes() {
        assert!(!is_milestone(0, 10));
        assert!(!is_milestone(0, 0));
        assert!(!is_milestone(1, 0));
    }
}
