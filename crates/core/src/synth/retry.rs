//! Quality-gated retries around a synthesizer.

use std::path::Path;

use crate::audio::io::read_wav;
use crate::audio::quality::QualityGate;
use crate::error::DrillError;
use crate::synth::{DecodingParams, SpeechSynthesizer, SynthesisCall};
use crate::types::{SynthesisRequest, VerdictReason, Waveform};

#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    /// When false, any waveform the synthesizer produces is accepted as-is.
    pub quality_check: bool,
    pub gate: QualityGate,
}

impl RetryPolicy {
    pub fn new(quality_check: bool) -> Self {
        Self {
            quality_check,
            gate: QualityGate::default(),
        }
    }
}

enum AttemptError {
    Failed(DrillError),
    Rejected(VerdictReason),
}

/// Synthesize `request` into `scratch_path`, retrying until the quality gate
/// accepts or `retry_budget + 1` attempts have been made.
///
/// Returns `None` when the budget is exhausted; the caller carries on without
/// this segment.
pub fn synthesize_with_retry(
    synth: &mut dyn SpeechSynthesizer,
    request: &SynthesisRequest,
    scratch_path: &Path,
    policy: &RetryPolicy,
) -> Option<Waveform> {
    let params = DecodingParams::for_mode(request.decoding_mode);
    let attempts = request.retry_budget.saturating_add(1);

    for attempt in 1..=attempts {
        let call = SynthesisCall {
            reference_voice: &request.reference_voice,
            text: &request.text,
            params: &params,
            seed: if attempt == 1 { request.seed } else { None },
            output_path: scratch_path,
        };

        match run_attempt(synth, &call, policy) {
            Ok(waveform) => {
                log::debug!(
                    "Accepted attempt {}/{} ({} ms)",
                    attempt,
                    attempts,
                    waveform.duration_ms()
                );
                return Some(waveform);
            }
            Err(AttemptError::Rejected(reason)) => {
                log::warn!(
                    "Inference quality check failed on attempt {}/{}: {}",
                    attempt,
                    attempts,
                    reason.describe()
                );
            }
            Err(AttemptError::Failed(e)) => {
                log::warn!("Inference failed on attempt {}/{}: {}", attempt, attempts, e);
            }
        }
    }

    log::warn!(
        "Giving up on {:?} after {} attempt(s)",
        request.text,
        attempts
    );
    None
}

fn run_attempt(
    synth: &mut dyn SpeechSynthesizer,
    call: &SynthesisCall<'_>,
    policy: &RetryPolicy,
) -> Result<Waveform, AttemptError> {
    let path = synth
        .synthesize(call)
        .map_err(|e| AttemptError::Failed(DrillError::attempt(format!("{:#}", e))))?;

    if path != call.output_path {
        return Err(AttemptError::Failed(DrillError::attempt(format!(
            "synthesizer wrote {} instead of {}",
            path.display(),
            call.output_path.display()
        ))));
    }
    if !path.exists() {
        return Err(AttemptError::Failed(DrillError::attempt(format!(
            "output not found: {}",
            path.display()
        ))));
    }

    let waveform = match read_wav(&path) {
        Ok(wf) => wf,
        Err(_) if policy.quality_check => {
            return Err(AttemptError::Rejected(VerdictReason::Undecodable));
        }
        Err(e) => return Err(AttemptError::Failed(DrillError::attempt(format!("{:#}", e)))),
    };

    if policy.quality_check {
        let verdict = policy.gate.evaluate(&waveform);
        if !verdict.accepted {
            return Err(AttemptError::Rejected(verdict.reason));
        }
    }

    Ok(waveform)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::testing::{FakeSynthesizer, tone};
    use crate::types::{AudioFormat, DecodingMode};
    use anyhow::bail;
    use std::path::PathBuf;

    fn request(retry_budget: u32, seed: Option<u64>) -> SynthesisRequest {
        SynthesisRequest {
            reference_voice: PathBuf::from("voices/en.wav"),
            text: "Hello.".to_string(),
            decoding_mode: DecodingMode::Deterministic,
            seed,
            retry_budget,
        }
    }

    #[test]
    fn test_rejected_output_exhausts_budget() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = dir.path().join("row_1_en.wav");
        let mut synth = FakeSynthesizer::new(|_| Ok(Some(Waveform::new(vec![0; 22050], AudioFormat::default()))));

        let result = synthesize_with_retry(&mut synth, &request(2, None), &scratch, &RetryPolicy::new(true));
        assert!(result.is_none());
        assert_eq!(synth.calls.len(), 3);
        assert!(synth.calls.iter().all(|c| c.output_path == scratch));
    }

    #[test]
    fn test_zero_budget_makes_one_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let mut synth = FakeSynthesizer::new(|_| bail!("CUDA error"));
        let result = synthesize_with_retry(
            &mut synth,
            &request(0, None),
            &dir.path().join("a.wav"),
            &RetryPolicy::new(true),
        );
        assert!(result.is_none());
        assert_eq!(synth.calls.len(), 1);
    }

    #[test]
    fn test_recovers_after_failures() {
        let dir = tempfile::tempdir().unwrap();
        let mut n = 0;
        let mut synth = FakeSynthesizer::new(move |_| {
            n += 1;
            match n {
                1 => bail!("decoder crashed"),
                2 => Ok(Some(Waveform::new(vec![0; 22050], AudioFormat::default()))),
                _ => Ok(Some(tone(1000, AudioFormat::default()))),
            }
        });
        let result = synthesize_with_retry(
            &mut synth,
            &request(5, None),
            &dir.path().join("a.wav"),
            &RetryPolicy::new(true),
        );
        let wf = result.unwrap();
        assert_eq!(wf.duration_ms(), 1000);
        assert_eq!(synth.calls.len(), 3);
    }

    #[test]
    fn test_missing_output_counts_as_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut synth = FakeSynthesizer::new(|_| Ok(None));
        let result = synthesize_with_retry(
            &mut synth,
            &request(1, None),
            &dir.path().join("never_written.wav"),
            &RetryPolicy::new(false),
        );
        assert!(result.is_none());
        assert_eq!(synth.calls.len(), 2);
    }

    #[test]
    fn test_quality_check_disabled_accepts_anything() {
        let dir = tempfile::tempdir().unwrap();
        let mut synth = FakeSynthesizer::new(|_| Ok(Some(Waveform::new(vec![0; 100], AudioFormat::default()))));
        let result = synthesize_with_retry(
            &mut synth,
            &request(2, None),
            &dir.path().join("a.wav"),
            &RetryPolicy::new(false),
        );
        assert_eq!(result.unwrap().samples.len(), 100);
        assert_eq!(synth.calls.len(), 1);
    }

    #[test]
    fn test_seed_only_on_first_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let mut synth = FakeSynthesizer::new(|_| Ok(Some(Waveform::new(vec![0; 10], AudioFormat::default()))));
        synthesize_with_retry(
            &mut synth,
            &request(2, Some(1234)),
            &dir.path().join("a.wav"),
            &RetryPolicy::new(true),
        );
        let seeds: Vec<_> = synth.calls.iter().map(|c| c.seed).collect();
        assert_eq!(seeds, vec![Some(1234), None, None]);
    }

    /// Writes good audio, but always to the same file.
    struct FixedPathSynthesizer {
        path: PathBuf,
        calls: usize,
    }

    impl SpeechSynthesizer for FixedPathSynthesizer {
        fn name(&self) -> &str {
            "fixed"
        }

        fn synthesize(&mut self, _call: &SynthesisCall<'_>) -> anyhow::Result<PathBuf> {
            self.calls += 1;
            crate::audio::io::write_wav(&self.path, &tone(800, AudioFormat::default()))?;
            Ok(self.path.clone())
        }
    }

    #[test]
    fn test_output_for_another_segment_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut synth = FixedPathSynthesizer {
            path: dir.path().join("row_1_zh.wav"),
            calls: 0,
        };
        let result = synthesize_with_retry(
            &mut synth,
            &request(1, None),
            &dir.path().join("row_2_en.wav"),
            &RetryPolicy::new(true),
        );
        assert!(result.is_none());
        assert_eq!(synth.calls, 2);
    }

    #[test]
    fn test_decoding_mode_forwarded() {
        let dir = tempfile::tempdir().unwrap();
        let mut synth = FakeSynthesizer::new(|_| Ok(Some(tone(500, AudioFormat::default()))));
        let mut req = request(0, None);
        req.decoding_mode = DecodingMode::Stochastic;
        assert!(synthesize_with_retry(&mut synth, &req, &dir.path().join("a.wav"), &RetryPolicy::new(true)).is_some());
        assert!(synth.calls[0].do_sample);
    }
}
