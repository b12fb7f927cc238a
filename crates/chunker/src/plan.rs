//! Pure interval arithmetic on detected speech spans. Everything here is
//! in samples at 16 kHz; seconds only appear at the crate boundary.

use vox_audio_utils::WHISPER_SAMPLE_RATE;

use crate::detect::Span;
use crate::policy::ChunkPolicy;

const SR: f64 = WHISPER_SAMPLE_RATE as f64;

pub fn seconds_to_samples(s: f64) -> u64 {
    (s * SR) as u64
}

pub fn samples_to_seconds(n: u64) -> f64 {
    n as f64 / SR
}

/// Contiguous fixed-duration windows covering the whole stream.
pub fn fixed_windows(total_samples: u64, chunk_duration_s: f64) -> Vec<Span> {
    let window = seconds_to_samples(chunk_duration_s).max(1);
    let mut out = Vec::new();
    let mut start = 0;
    while start < total_samples {
        let end = (start + window).min(total_samples);
        out.push((start, end));
        start = end;
    }
    out
}

/// Deterministic post-processing of silence-derived candidates, in order:
/// intro/outro trimming, minimum-duration drop, maximum-duration split.
/// The result stays sorted and non-overlapping.
pub fn postprocess(spans: Vec<Span>, total_samples: u64, policy: &ChunkPolicy) -> Vec<Span> {
    let mut spans = spans;

    if policy.filter_intro_outro {
        let intro_end = seconds_to_samples(policy.intro_s);
        let outro_start = total_samples.saturating_sub(seconds_to_samples(policy.outro_s));
        spans = spans
            .into_iter()
            .filter_map(|(start, end)| {
                let start = start.max(intro_end);
                let end = end.min(outro_start);
                (end > start).then_some((start, end))
            })
            .collect();
    }

    let min = seconds_to_samples(policy.min_chunk_s);
    spans.retain(|(start, end)| end - start >= min);

    let max = seconds_to_samples(policy.max_chunk_s).max(1);
    let mut out = Vec::with_capacity(spans.len());
    for (start, end) in spans {
        if end - start <= max {
            out.push((start, end));
            continue;
        }
        let mut sub_start = start;
        while sub_start < end {
            let sub_end = (sub_start + max).min(end);
            out.push((sub_start, sub_end));
            sub_start = sub_end;
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sec(n: f64) -> u64 {
        seconds_to_samples(n)
    }

    fn policy() -> ChunkPolicy {
        ChunkPolicy::default()
    }

    #[test]
    fn fixed_windows_cover_without_gaps() {
        let spans = fixed_windows(sec(90.0), 30.0);
        assert_eq!(spans, vec![
            (0, sec(30.0)),
            (sec(30.0), sec(60.0)),
            (sec(60.0), sec(90.0)),
        ]);
    }

    #[test]
    fn fixed_windows_keep_the_short_tail() {
        let spans = fixed_windows(sec(70.0), 30.0);
        assert_eq!(spans.len(), 3);
        assert_eq!(spans[2], (sec(60.0), sec(70.0)));
    }

    #[test]
    fn chunks_inside_intro_and_outro_are_dropped() {
        let total = sec(60.0);
        let spans = vec![(sec(1.0), sec(4.0)), (sec(10.0), sec(20.0)), (sec(56.0), sec(59.0))];
        let out = postprocess(spans, total, &policy());
        assert_eq!(out, vec![(sec(10.0), sec(20.0))]);
    }

    #[test]
    fn chunks_overlapping_the_zones_are_clipped() {
        let total = sec(60.0);
        let spans = vec![(sec(2.0), sec(12.0)), (sec(50.0), sec(58.0))];
        let out = postprocess(spans, total, &policy());
        assert_eq!(out, vec![(sec(5.0), sec(12.0)), (sec(50.0), sec(55.0))]);
    }

    #[test]
    fn trimming_can_be_disabled() {
        let total = sec(60.0);
        let mut p = policy();
        p.filter_intro_outro = false;
        let spans = vec![(sec(1.0), sec(4.0))];
        assert_eq!(postprocess(spans.clone(), total, &p), spans);
    }

    #[test]
    fn short_chunks_are_dropped() {
        let total = sec(60.0);
        let spans = vec![(sec(10.0), sec(11.5)), (sec(20.0), sec(30.0))];
        let out = postprocess(spans, total, &policy());
        assert_eq!(out, vec![(sec(20.0), sec(30.0))]);
    }

    #[test]
    fn long_chunks_split_into_contiguous_windows() {
        let total = sec(200.0);
        let spans = vec![(sec(10.0), sec(160.0))];
        let out = postprocess(spans, total, &policy());
        assert_eq!(out, vec![
            (sec(10.0), sec(70.0)),
            (sec(70.0), sec(130.0)),
            (sec(130.0), sec(160.0)),
        ]);
    }

    #[test]
    fn split_preserves_total_order_across_neighbours() {
        let total = sec(300.0);
        let spans = vec![(sec(10.0), sec(80.0)), (sec(90.0), sec(100.0))];
        let out = postprocess(spans, total, &policy());
        assert_eq!(out, vec![
            (sec(10.0), sec(70.0)),
            (sec(70.0), sec(80.0)),
            (sec(90.0), sec(100.0)),
        ]);
        assert!(out.windows(2).all(|w| w[0].1 <= w[1].0));
    }
}
