//! Drill run: rows in, one timeline out.
//!
//! Rows are processed strictly in table order because each row's cue
//! timestamps depend on everything appended before it. Failures below the
//! run level (a rejected attempt, an exhausted segment, an unusable ding)
//! are logged and the run keeps going.

use std::path::{Path, PathBuf};

use crate::audio::effects::{adjust_volume, fade_in, fade_out};
use crate::audio::io::{decode_audio, write_pcm};
use crate::audio::normalize::{NormalizedSegment, normalize};
use crate::drill::subtitle;
use crate::drill::table::{load_rows, speakable_text};
use crate::drill::timeline::{DrillPattern, Timeline};
use crate::error::DrillError;
use crate::synth::{RetryPolicy, SpeechSynthesizer, synthesize_with_retry};
use crate::types::{AudioFormat, DecodingMode, DialogueRow, RowOutcome, RunSummary, SynthesisRequest};

/// Notification sound played between rows.
#[derive(Debug, Clone)]
pub struct DingConfig {
    pub path: PathBuf,
    pub gain_db: f64,
    pub fade_in_ms: u64,
    pub fade_out_ms: u64,
}

impl DingConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            gain_db: -6.0,
            fade_in_ms: 100,
            fade_out_ms: 120,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DrillConfig {
    /// Reference voice for english sentences
    pub english_voice: PathBuf,
    /// Reference voice for chinese sentences
    pub chinese_voice: PathBuf,
    /// Where per-attempt synthesizer output goes
    pub scratch_dir: PathBuf,
    /// Only process the first N rows; 0 means no limit
    pub row_limit: Option<usize>,
    pub target: AudioFormat,
    pub pattern: DrillPattern,
    /// Linear fade at both ends of every spoken segment
    pub edge_fade_ms: u64,
    pub decoding_mode: DecodingMode,
    pub retry_budget: u32,
    pub seed: Option<u64>,
    pub quality_check: bool,
    pub ding: Option<DingConfig>,
}

impl DrillConfig {
    pub fn new(english_voice: impl Into<PathBuf>, chinese_voice: impl Into<PathBuf>) -> Self {
        Self {
            english_voice: english_voice.into(),
            chinese_voice: chinese_voice.into(),
            scratch_dir: PathBuf::from("temp_tts"),
            row_limit: None,
            target: AudioFormat::default(),
            pattern: DrillPattern::default(),
            edge_fade_ms: 8,
            decoding_mode: DecodingMode::Deterministic,
            retry_budget: 2,
            seed: None,
            quality_check: true,
            ding: None,
        }
    }
}

/// Output of [`run_drill`].
#[derive(Debug)]
pub struct DrillOutput {
    pub timeline: Timeline,
    pub summary: RunSummary,
}

/// Files written by [`export`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportPaths {
    pub audio: PathBuf,
    pub subtitles: PathBuf,
}

/// Decode, conform, and shape the notification sound.
///
/// Returns `None` (with a log line) when the file is missing or unusable; a
/// missing ding never stops a run.
pub fn load_ding(config: &DingConfig, target: AudioFormat) -> Option<NormalizedSegment> {
    if !config.path.exists() {
        log::warn!("Ding sound not found at {}, continuing without it", config.path.display());
        return None;
    }

    let mut seg = match decode_audio(&config.path).and_then(|wf| normalize(wf, target)) {
        Ok(seg) => seg,
        Err(e) => {
            log::warn!("Could not load or process ding sound: {:#}", e);
            return None;
        }
    };

    let wf = seg.waveform_mut();
    adjust_volume(wf, config.gain_db);
    fade_in(wf, config.fade_in_ms);
    fade_out(wf, config.fade_out_ms);
    log::debug!("Ding: {} ms", seg.duration_ms());
    Some(seg)
}

/// Load the sentence table for a run.
///
/// Only an undecodable table is an error. A missing or malformed file is
/// logged and yields no rows, so the run ends in an empty export.
pub fn load_table(path: &Path) -> Result<Vec<DialogueRow>, DrillError> {
    match load_rows(path) {
        Ok(table) => {
            log::info!("Loaded {} rows from {}", table.rows.len(), path.display());
            Ok(table.rows)
        }
        Err(e) => match e.downcast::<DrillError>() {
            Ok(err) if err.is_fatal() => Err(err),
            Ok(err) => {
                log::error!("{}", err);
                Ok(Vec::new())
            }
            Err(e) => {
                log::error!("{:#}", e);
                Ok(Vec::new())
            }
        },
    }
}

/// Create the scratch directory. Returns false (after logging) if it cannot
/// be created; nothing can be synthesized in that case.
pub fn prepare_scratch_dir(dir: &Path) -> bool {
    match std::fs::create_dir_all(dir) {
        Ok(()) => true,
        Err(e) => {
            log::error!("Failed to create scratch directory {}: {}", dir.display(), e);
            false
        }
    }
}

/// Scratch WAV for one row and language, reused by every attempt.
pub fn scratch_path(scratch_dir: &Path, row_number: usize, lang: &str) -> PathBuf {
    scratch_dir.join(format!("row_{}_{}.wav", row_number, lang))
}

/// Synthesize and conform one sentence. `None` if the text is empty or
/// every attempt failed.
fn synthesize_segment(
    synth: &mut dyn SpeechSynthesizer,
    text: &str,
    voice: &Path,
    scratch: &Path,
    config: &DrillConfig,
    policy: &RetryPolicy,
) -> Option<NormalizedSegment> {
    if text.is_empty() {
        return None;
    }

    let request = SynthesisRequest {
        reference_voice: voice.to_path_buf(),
        text: speakable_text(text),
        decoding_mode: config.decoding_mode,
        seed: config.seed,
        retry_budget: config.retry_budget,
    };

    let waveform = synthesize_with_retry(synth, &request, scratch, policy)?;
    match normalize(waveform, config.target) {
        Ok(seg) => Some(seg.with_edge_fade(config.edge_fade_ms)),
        Err(e) => {
            log::warn!("Could not normalize {}: {:#}", scratch.display(), e);
            None
        }
    }
}

/// Synthesize one row and append it to the timeline.
pub fn process_row(
    synth: &mut dyn SpeechSynthesizer,
    timeline: Timeline,
    row: &DialogueRow,
    row_number: usize,
    config: &DrillConfig,
    policy: &RetryPolicy,
    ding: Option<&NormalizedSegment>,
) -> (Timeline, RowOutcome) {
    if row.is_blank() {
        return (timeline, RowOutcome::Skipped);
    }

    let english = synthesize_segment(
        synth,
        &row.english,
        &config.english_voice,
        &scratch_path(&config.scratch_dir, row_number, "en"),
        config,
        policy,
    );
    let chinese = synthesize_segment(
        synth,
        &row.chinese,
        &config.chinese_voice,
        &scratch_path(&config.scratch_dir, row_number, "zh"),
        config,
        policy,
    );

    // Without english the row has no speech and no cue, whatever chinese did
    let outcome = match (&english, &chinese) {
        (None, _) => RowOutcome::Failed,
        (Some(_), None) if !row.chinese.is_empty() => RowOutcome::Partial,
        (Some(_), _) => RowOutcome::Complete,
    };

    let (timeline, cues) = timeline.append_row(row, english.as_ref(), chinese.as_ref(), ding);
    log::debug!("Row {}: {:?}, {} cue(s), cursor at {} ms", row_number, outcome, cues, timeline.cursor_ms());
    (timeline, outcome)
}

/// Process all rows (up to the configured limit) in order.
pub fn run_drill(
    synth: &mut dyn SpeechSynthesizer,
    rows: &[DialogueRow],
    config: &DrillConfig,
) -> DrillOutput {
    let rows = match config.row_limit {
        Some(limit) if limit > 0 => &rows[..limit.min(rows.len())],
        _ => rows,
    };
    let policy = RetryPolicy::new(config.quality_check);
    let ding = config.ding.as_ref().and_then(|d| load_ding(d, config.target));

    let mut timeline = Timeline::new(config.target, config.pattern);
    let mut summary = RunSummary::default();

    for (i, row) in rows.iter().enumerate() {
        let row_number = i + 1;
        if !row.is_blank() {
            log::info!("[Row {}/{}] {}", row_number, rows.len(), row.english);
        }
        let (next, outcome) =
            process_row(synth, timeline, row, row_number, config, &policy, ding.as_ref());
        timeline = next;
        summary.record(outcome);
    }

    summary.cues = timeline.cues().len();
    summary.duration_ms = timeline.cursor_ms();
    DrillOutput { timeline, summary }
}

/// Write the track and its `.srt` next to it.
///
/// An empty timeline writes nothing and returns `Ok(None)`.
pub fn export(timeline: &Timeline, output: &Path) -> Result<Option<ExportPaths>, DrillError> {
    if timeline.is_empty() {
        log::info!("No audio generated");
        return Ok(None);
    }

    log::info!("Exporting audio: {}", output.display());
    write_pcm(output, timeline.samples(), timeline.format())
        .map_err(|e| DrillError::export(output, e))?;

    let srt_path = output.with_extension("srt");
    log::info!("Exporting subtitles: {}", srt_path.display());
    std::fs::write(&srt_path, subtitle::render(timeline.cues()))
        .map_err(|e| DrillError::export(&srt_path, e))?;

    Ok(Some(ExportPaths {
        audio: output.to_path_buf(),
        subtitles: srt_path,
    }))
}
