//! Speech synthesizer interface and backends.
//!
//! The synthesizer is an external neural TTS model: reference voice sample +
//! text + decoding parameters in, WAV file out. Backends:
//! - WorkerSynthesizer: long-lived model worker process speaking line-delimited JSON
//!
//! The retry controller wraps any backend with quality-gated retries.

pub mod retry;
pub mod worker;

use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Serialize;

use crate::types::DecodingMode;

pub use retry::{RetryPolicy, synthesize_with_retry};
pub use worker::{WorkerConfig, WorkerSynthesizer};

/// Sampling parameters forwarded to the model's inference call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodingParams {
    pub do_sample: bool,
    pub top_p: f32,
    pub top_k: u32,
    pub temperature: f32,
    pub length_penalty: f32,
    pub num_beams: u32,
    pub repetition_penalty: f32,
    pub max_mel_tokens: u32,
}

impl DecodingParams {
    pub fn for_mode(mode: DecodingMode) -> Self {
        let deterministic = Self {
            do_sample: false,
            top_p: 1.0,
            top_k: 0,
            temperature: 1.0,
            length_penalty: 1.0,
            num_beams: 1,
            repetition_penalty: 1.0,
            max_mel_tokens: 1024,
        };
        match mode {
            DecodingMode::Deterministic => deterministic,
            DecodingMode::Stochastic => Self {
                do_sample: true,
                top_p: 0.8,
                top_k: 50,
                ..deterministic
            },
        }
    }
}

/// A single synthesis attempt.
#[derive(Debug, Clone)]
pub struct SynthesisCall<'a> {
    pub reference_voice: &'a Path,
    pub text: &'a str,
    pub params: &'a DecodingParams,
    /// Reseed the model before this call; only set on a segment's first attempt
    pub seed: Option<u64>,
    /// Scratch path the synthesizer should write to
    pub output_path: &'a Path,
}

/// Speech synthesizer backend trait.
pub trait SpeechSynthesizer {
    /// Backend name for display.
    fn name(&self) -> &str;

    /// Synthesize one utterance, returning the path of the written WAV.
    /// Anything other than `call.output_path` is treated as a failed attempt.
    fn synthesize(&mut self, call: &SynthesisCall<'_>) -> Result<PathBuf>;

    /// Release model resources at the end of the run.
    fn release(&mut self) -> Result<()> {
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic_params() {
        let p = DecodingParams::for_mode(DecodingMode::Deterministic);
        assert!(!p.do_sample);
        assert_eq!(p.top_k, 0);
        assert_eq!(p.top_p, 1.0);
        assert_eq!(p.max_mel_tokens, 1024);
    }

    #[test]
    fn test_stochastic_params() {
        let p = DecodingParams::for_mode(DecodingMode::Stochastic);
        assert!(p.do_sample);
        assert_eq!(p.top_k, 50);
        assert!((p.top_p - 0.8).abs() < 1e-6);
        assert_eq!(p.num_beams, 1);
    }

    #[test]
    fn test_params_serialize_flat() {
        let p = DecodingParams::for_mode(DecodingMode::Deterministic);
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["do_sample"], false);
        assert_eq!(json["max_mel_tokens"], 1024);
    }
}
