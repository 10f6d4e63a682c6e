use std::path::PathBuf;

/// One bilingual sentence pair from the input table.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DialogueRow {
    pub english: String,
    pub chinese: String,
}

impl DialogueRow {
    pub fn new(english: impl Into<String>, chinese: impl Into<String>) -> Self {
        Self {
            english: english.into(),
            chinese: chinese.into(),
        }
    }

    /// Rows with both fields empty are skipped without touching the synthesizer.
    pub fn is_blank(&self) -> bool {
        self.english.is_empty() && self.chinese.is_empty()
    }
}

/// Sample layout of a PCM waveform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
    /// Bits per sample (8, 16, 24 or 32, integer PCM)
    pub bits_per_sample: u16,
}

impl AudioFormat {
    /// Build a format from a sample width in bytes, the way it is configured.
    pub fn from_sample_width(sample_rate: u32, channels: u16, sample_width: u16) -> Self {
        Self {
            sample_rate,
            channels,
            bits_per_sample: sample_width * 8,
        }
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            sample_rate: 22050,
            channels: 1,
            bits_per_sample: 16,
        }
    }
}

/// Interleaved integer PCM audio.
///
/// Samples are stored at their native bit depth (a 16-bit waveform holds
/// values in `i16` range), interleaved by channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    pub samples: Vec<i32>,
    pub format: AudioFormat,
}

impl Waveform {
    pub fn new(samples: Vec<i32>, format: AudioFormat) -> Self {
        Self { samples, format }
    }

    /// Number of sample frames (one sample per channel).
    pub fn frames(&self) -> usize {
        if self.format.channels == 0 {
            return 0;
        }
        self.samples.len() / self.format.channels as usize
    }

    /// Duration in whole milliseconds, rounded to nearest.
    pub fn duration_ms(&self) -> u64 {
        if self.format.sample_rate == 0 {
            return 0;
        }
        let frames = self.frames() as u64;
        let sr = self.format.sample_rate as u64;
        (frames * 1000 + sr / 2) / sr
    }

    /// Full-scale value for this bit depth, e.g. 32768 for 16-bit audio.
    pub fn full_scale(&self) -> f64 {
        (1i64 << (self.format.bits_per_sample.clamp(1, 32) - 1)) as f64
    }

    /// Average all channels to one and scale to [-1, 1].
    pub fn to_mono_f64(&self) -> Vec<f64> {
        let channels = self.format.channels.max(1) as usize;
        let scale = self.full_scale();
        self.samples
            .chunks_exact(channels)
            .map(|frame| frame.iter().map(|&s| s as f64).sum::<f64>() / channels as f64 / scale)
            .collect()
    }
}

/// Decoding strategy requested from the synthesizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodingMode {
    /// Greedy decoding: same text and voice give the same audio.
    #[default]
    Deterministic,
    /// Top-k / top-p sampling.
    Stochastic,
}

/// One segment to synthesize, with its retry policy.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisRequest {
    /// Reference voice sample the synthesizer clones
    pub reference_voice: PathBuf,
    pub text: String,
    pub decoding_mode: DecodingMode,
    pub seed: Option<u64>,
    /// Extra attempts after the first one
    pub retry_budget: u32,
}

/// Why the quality gate accepted or rejected a waveform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerdictReason {
    Passed,
    Undecodable,
    TooShort,
    NearSilent,
    Clipping,
    Discontinuity,
}

impl VerdictReason {
    pub fn describe(&self) -> &'static str {
        match self {
            VerdictReason::Passed => "passed",
            VerdictReason::Undecodable => "not decodable as 16-bit PCM",
            VerdictReason::TooShort => "shorter than minimum duration",
            VerdictReason::NearSilent => "near-silent",
            VerdictReason::Clipping => "excessive clipping",
            VerdictReason::Discontinuity => "sharp discontinuity",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityVerdict {
    pub accepted: bool,
    pub reason: VerdictReason,
}

impl QualityVerdict {
    pub fn accept() -> Self {
        Self {
            accepted: true,
            reason: VerdictReason::Passed,
        }
    }

    pub fn reject(reason: VerdictReason) -> Self {
        Self {
            accepted: false,
            reason,
        }
    }
}

/// A time-stamped subtitle block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cue {
    /// 1-based, global across the run
    pub index: usize,
    pub start_ms: u64,
    pub end_ms: u64,
    pub text: String,
}

/// What happened to a single table row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOutcome {
    /// Every non-empty field produced audio.
    Complete,
    /// English produced audio, chinese was lost.
    Partial,
    /// No english audio, so nothing reached the track but the ding and pause.
    Failed,
    /// Both fields empty.
    Skipped,
}

/// Aggregated per-row outcomes of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub rows_total: usize,
    pub complete: usize,
    pub partial: usize,
    pub failed: usize,
    pub skipped: usize,
    pub cues: usize,
    pub duration_ms: u64,
}

impl RunSummary {
    pub fn record(&mut self, outcome: RowOutcome) {
        self.rows_total += 1;
        match outcome {
            RowOutcome::Complete => self.complete += 1,
            RowOutcome::Partial => self.partial += 1,
            RowOutcome::Failed => self.failed += 1,
            RowOutcome::Skipped => self.skipped += 1,
        }
    }

    pub fn produced_audio(&self) -> bool {
        self.duration_ms > 0
    }
}
