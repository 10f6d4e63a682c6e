//! Heuristic defect detection for synthesized speech.
//!
//! Catches the failure modes neural TTS produces in practice: truncated or
//! empty output, silence, hard clipping, and isolated pops where the decoder
//! glitched mid-utterance.

use crate::types::{QualityVerdict, VerdictReason, Waveform};

/// Thresholds for [`QualityGate::evaluate`].
#[derive(Debug, Clone)]
pub struct QualityGate {
    /// Shortest acceptable output
    pub min_duration_ms: u32,
    /// Peak amplitude below this is treated as silence
    pub silence_peak: f64,
    /// Amplitude counted as clipped
    pub clip_level: f64,
    /// Largest tolerated fraction of clipped samples
    pub max_clip_ratio: f64,
    /// Below this many sample differences the pop check is skipped
    pub min_diffs_for_pop_check: usize,
    pub pop_p999: f64,
    pub pop_ratio: f64,
}

impl Default for QualityGate {
    fn default() -> Self {
        Self {
            min_duration_ms: 120,
            silence_peak: 1e-4,
            clip_level: 0.999,
            max_clip_ratio: 0.02,
            min_diffs_for_pop_check: 100,
            pop_p999: 0.45,
            pop_ratio: 120.0,
        }
    }
}

const MEDIAN_FLOOR: f64 = 1e-9;

impl QualityGate {
    /// Run the checks in order and stop at the first failure.
    pub fn evaluate(&self, waveform: &Waveform) -> QualityVerdict {
        if waveform.format.bits_per_sample != 16
            || waveform.format.channels == 0
            || waveform.format.sample_rate == 0
            || waveform.samples.is_empty()
        {
            return QualityVerdict::reject(VerdictReason::Undecodable);
        }

        let min_frames =
            waveform.format.sample_rate as u64 * self.min_duration_ms as u64 / 1000;
        if (waveform.frames() as u64) < min_frames {
            return QualityVerdict::reject(VerdictReason::TooShort);
        }

        let mono = waveform.to_mono_f64();

        let peak = mono.iter().map(|v| v.abs()).fold(0.0f64, f64::max);
        if peak < self.silence_peak {
            return QualityVerdict::reject(VerdictReason::NearSilent);
        }

        let clipped = mono.iter().filter(|v| v.abs() >= self.clip_level).count();
        if clipped as f64 / mono.len() as f64 > self.max_clip_ratio {
            return QualityVerdict::reject(VerdictReason::Clipping);
        }

        if self.has_pop(&mono) {
            return QualityVerdict::reject(VerdictReason::Discontinuity);
        }

        QualityVerdict::accept()
    }

    /// An isolated transient: the 99.9th percentile jump is large both in
    /// absolute terms and relative to the typical jump.
    fn has_pop(&self, mono: &[f64]) -> bool {
        let mut diffs: Vec<f64> = mono.windows(2).map(|w| (w[1] - w[0]).abs()).collect();
        if diffs.len() < self.min_diffs_for_pop_check {
            return false;
        }
        diffs.sort_by(|a, b| a.total_cmp(b));

        let p999 = percentile_sorted(&diffs, 99.9);
        let med = percentile_sorted(&diffs, 50.0).max(MEDIAN_FLOOR);
        log::debug!("pop check: p99.9={:.4} median={:.6}", p999, med);

        p999 > self.pop_p999 && p999 / med > self.pop_ratio
    }
}

/// Percentile with linear interpolation between closest ranks.
fn percentile_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let pos = q / 100.0 * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AudioFormat;

    const SR: u32 = 16000;

    fn fmt(channels: u16) -> AudioFormat {
        AudioFormat { sample_rate: SR, channels, bits_per_sample: 16 }
    }

    fn sine_samples(n: usize, freq: f64, amp: f64) -> Vec<i32> {
        (0..n)
            .map(|i| ((i as f64 / SR as f64 * freq * std::f64::consts::TAU).sin() * amp * 32767.0) as i32)
            .collect()
    }

    fn mono(samples: Vec<i32>) -> Waveform {
        Waveform::new(samples, fmt(1))
    }

    #[test]
    fn test_clean_sine_accepted() {
        let v = QualityGate::default().evaluate(&mono(sine_samples(SR as usize, 440.0, 0.5)));
        assert_eq!(v, QualityVerdict::accept());
    }

    #[test]
    fn test_non_16_bit_undecodable() {
        let wf = Waveform::new(
            vec![0; 8000],
            AudioFormat { sample_rate: SR, channels: 1, bits_per_sample: 24 },
        );
        let v = QualityGate::default().evaluate(&wf);
        assert!(!v.accepted);
        assert_eq!(v.reason, VerdictReason::Undecodable);
    }

    #[test]
    fn test_empty_undecodable() {
        let v = QualityGate::default().evaluate(&mono(vec![]));
        assert_eq!(v.reason, VerdictReason::Undecodable);
    }

    #[test]
    fn test_duration_boundary() {
        let gate = QualityGate::default();
        // 120 ms at 16 kHz = 1920 frames
        let v = gate.evaluate(&mono(sine_samples(1920, 440.0, 0.5)));
        assert!(v.accepted, "120 ms should pass, got {:?}", v);

        let v = gate.evaluate(&mono(sine_samples(1904, 440.0, 0.5)));
        assert_eq!(v.reason, VerdictReason::TooShort);
    }

    #[test]
    fn test_near_silence() {
        let v = QualityGate::default().evaluate(&mono(vec![0; 8000]));
        assert_eq!(v.reason, VerdictReason::NearSilent);

        // 3/32768 ≈ 9.2e-5, still below the floor
        let v = QualityGate::default().evaluate(&mono(vec![3; 8000]));
        assert_eq!(v.reason, VerdictReason::NearSilent);
    }

    #[test]
    fn test_clipping_boundary() {
        let gate = QualityGate::default();

        // Exactly 2.0% of samples at full scale
        let mut samples = sine_samples(10_000, 200.0, 0.3);
        for s in samples.iter_mut().take(200) {
            *s = 32767;
        }
        let v = gate.evaluate(&mono(samples));
        assert_ne!(v.reason, VerdictReason::Clipping);

        // 2.0001%
        let mut samples = sine_samples(1_000_000, 200.0, 0.3);
        for s in samples.iter_mut().take(20_001) {
            *s = -32768;
        }
        let v = gate.evaluate(&mono(samples));
        assert!(!v.accepted);
        assert_eq!(v.reason, VerdictReason::Clipping);
    }

    #[test]
    fn test_isolated_pops_rejected() {
        let mut samples = sine_samples(SR as usize, 100.0, 0.01);
        for k in 0..20 {
            samples[400 + k * 700] = 29000;
        }
        let v = QualityGate::default().evaluate(&mono(samples));
        assert_eq!(v.reason, VerdictReason::Discontinuity);
    }

    #[test]
    fn test_single_pop_below_percentile_passes() {
        // Two large diffs out of 16000 stay above the 99.9th percentile cut
        let mut samples = sine_samples(SR as usize, 100.0, 0.01);
        samples[8000] = 29000;
        let v = QualityGate::default().evaluate(&mono(samples));
        assert!(v.accepted, "got {:?}", v);
    }

    #[test]
    fn test_loud_busy_signal_not_a_pop() {
        // Large diffs everywhere: p99.9 is high but so is the median
        let samples: Vec<i32> = (0..8000).map(|i| if i % 2 == 0 { 20000 } else { -20000 }).collect();
        let v = QualityGate::default().evaluate(&mono(samples));
        assert!(v.accepted, "got {:?}", v);
    }

    #[test]
    fn test_pop_check_skipped_for_few_diffs() {
        let gate = QualityGate { min_duration_ms: 0, ..QualityGate::default() };
        let mut samples = vec![10; 50];
        samples[25] = 30000;
        assert!(gate.evaluate(&mono(samples)).accepted);
    }

    #[test]
    fn test_stereo_is_mixed_to_mono() {
        // Opposite-phase channels cancel out to silence in the mono mix
        let left = sine_samples(4000, 440.0, 0.5);
        let mut samples = Vec::with_capacity(8000);
        for &l in &left {
            samples.push(l);
            samples.push(-l);
        }
        let v = QualityGate::default().evaluate(&Waveform::new(samples, fmt(2)));
        assert_eq!(v.reason, VerdictReason::NearSilent);
    }

    #[test]
    fn test_percentile_interpolates() {
        let sorted = [0.0, 1.0, 2.0, 3.0];
        assert!((percentile_sorted(&sorted, 50.0) - 1.5).abs() < 1e-12);
        assert!((percentile_sorted(&sorted, 100.0) - 3.0).abs() < 1e-12);
        assert_eq!(percentile_sorted(&[], 50.0), 0.0);
    }
}
