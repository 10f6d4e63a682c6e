//! Drilltrack CLI: bilingual drill tracks and one-off sentence synthesis.

use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};

use drilltrack_core::drill::{self, DingConfig, DrillConfig, DrillPattern};
use drilltrack_core::synth::{RetryPolicy, SpeechSynthesizer, WorkerConfig, WorkerSynthesizer, synthesize_with_retry};
use drilltrack_core::types::{AudioFormat, DecodingMode, SynthesisRequest};

// ─── Top-level CLI ───────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "drilltrack",
    about = "Bilingual repeated-exposure study tracks from sentence tables",
    version,
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build a drill track and subtitles from a sentence table
    Build(BuildArgs),
    /// Synthesize a single sentence
    Say(SayArgs),
}

// ─── Shared arguments (embedded in each subcommand) ──────────────

#[derive(Parser, Debug)]
struct SynthArgs {
    /// Model checkpoints directory
    #[arg(long)]
    model_dir: PathBuf,

    /// Model worker executable
    #[arg(long, default_value = "indextts-worker")]
    worker_program: PathBuf,

    /// Let the model worker fetch missing files over the network
    #[arg(long, default_value_t = false)]
    allow_online: bool,

    /// Use stochastic decoding
    #[arg(long, default_value_t = false)]
    non_stable: bool,

    /// Retries per sentence after the first attempt
    #[arg(long, default_value_t = 2)]
    max_retries: u32,

    /// Seed for the first attempt of each sentence
    #[arg(long)]
    seed: Option<u64>,

    /// Accept any synthesized audio without the quality gate
    #[arg(long, default_value_t = false)]
    no_quality_check: bool,

    /// Show verbose output
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

impl SynthArgs {
    fn decoding_mode(&self) -> DecodingMode {
        if self.non_stable {
            DecodingMode::Stochastic
        } else {
            DecodingMode::Deterministic
        }
    }

    fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            program: self.worker_program.clone(),
            offline: !self.allow_online,
            ..WorkerConfig::new(&self.model_dir)
        }
    }
}

// ─── Build ───────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(about = "Build a drill track and subtitles from a sentence table")]
#[command(allow_negative_numbers = true)]
struct BuildArgs {
    #[command(flatten)]
    synth: SynthArgs,

    /// Input CSV with `english` and `chinese` columns
    #[arg(long)]
    csv: PathBuf,

    /// Reference voice for English
    #[arg(long)]
    en_prompt: PathBuf,

    /// Reference voice for Chinese
    #[arg(long)]
    zh_prompt: PathBuf,

    /// Final merged WAV file; subtitles are written next to it
    #[arg(long, default_value = "study_loop_merged_srt_v2.wav")]
    output: PathBuf,

    /// Directory for per-sentence scratch files
    #[arg(long, default_value = "temp_tts")]
    temp_dir: PathBuf,

    /// Only process the first N rows
    #[arg(long)]
    limit: Option<usize>,

    /// Notification sound played after each row
    #[arg(long, default_value = "ding.mp3")]
    ding: PathBuf,

    /// Disable the notification sound
    #[arg(long, default_value_t = false)]
    no_ding: bool,

    /// Ding gain adjustment in dB
    #[arg(long, default_value_t = -6.0)]
    ding_gain_db: f64,

    /// Ding fade-in in milliseconds
    #[arg(long, default_value_t = 100)]
    ding_fade_in_ms: u64,

    /// Ding fade-out in milliseconds
    #[arg(long, default_value_t = 120)]
    ding_fade_out_ms: u64,

    /// Output sample rate
    #[arg(long, default_value_t = 22050)]
    target_sr: u32,

    /// Output channel count
    #[arg(long, default_value_t = 1)]
    target_channels: u16,

    /// Output sample width in bytes
    #[arg(long, default_value_t = 2, value_parser = clap::value_parser!(u16).range(1..=4))]
    target_sample_width: u16,

    /// Pause after each spoken sentence, in milliseconds
    #[arg(long, default_value_t = 800)]
    silence_short_ms: u64,

    /// Pause closing each row, in milliseconds
    #[arg(long, default_value_t = 1500)]
    silence_long_ms: u64,

    /// Fade in/out applied to each synthesized sentence, in milliseconds
    #[arg(long, default_value_t = 8)]
    edge_fade_ms: u64,
}

impl BuildArgs {
    fn drill_config(&self) -> DrillConfig {
        let ding = (!self.no_ding).then(|| DingConfig {
            path: self.ding.clone(),
            gain_db: self.ding_gain_db,
            fade_in_ms: self.ding_fade_in_ms,
            fade_out_ms: self.ding_fade_out_ms,
        });

        DrillConfig {
            english_voice: self.en_prompt.clone(),
            chinese_voice: self.zh_prompt.clone(),
            scratch_dir: self.temp_dir.clone(),
            row_limit: self.limit,
            target: AudioFormat::from_sample_width(
                self.target_sr,
                self.target_channels,
                self.target_sample_width,
            ),
            pattern: DrillPattern {
                short_silence_ms: self.silence_short_ms,
                long_silence_ms: self.silence_long_ms,
                ..DrillPattern::default()
            },
            edge_fade_ms: self.edge_fade_ms,
            decoding_mode: self.synth.decoding_mode(),
            retry_budget: self.synth.max_retries,
            seed: self.synth.seed,
            quality_check: !self.synth.no_quality_check,
            ding,
        }
    }
}

// ─── Say ─────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(about = "Synthesize a single sentence with one reference voice")]
struct SayArgs {
    #[command(flatten)]
    synth: SynthArgs,

    /// Reference voice
    #[arg(long)]
    prompt_wav: PathBuf,

    /// Text to speak
    #[arg(long, default_value = "Hello, this is a test.")]
    text: String,

    /// Output WAV file
    #[arg(long, default_value = "toy_output.wav")]
    output: PathBuf,
}

// ─── Main ────────────────────────────────────────────────────────

fn main() {
    let cli = Cli::parse();

    // Init logging
    let log_level = match &cli.command {
        Command::Build(a) if a.synth.verbose => "debug",
        Command::Say(a) if a.synth.verbose => "debug",
        _ => "info",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    let result = match cli.command {
        Command::Build(args) => run_build(args),
        Command::Say(args) => run_say(args),
    };

    if let Err(e) = result {
        log::error!("{:#}", e);
        std::process::exit(1);
    }
}

// ─── Helpers ─────────────────────────────────────────────────────

/// Start the model worker. Failure here ends the run before any row.
fn load_synthesizer(args: &SynthArgs) -> Result<WorkerSynthesizer> {
    let synth = WorkerSynthesizer::spawn(&args.worker_config())?;
    log::info!("Speech model ready ({})", synth.name());
    Ok(synth)
}

fn release_synthesizer(synth: &mut dyn SpeechSynthesizer) {
    if let Err(e) = synth.release() {
        log::warn!("Failed to release {} synthesizer: {:#}", synth.name(), e);
    }
}

// ─── Build runner ────────────────────────────────────────────────

fn run_build(args: BuildArgs) -> Result<()> {
    let config = args.drill_config();
    let mut synth = load_synthesizer(&args.synth)?;

    // Only an undecodable table stops the run; other load problems leave no rows
    let mut rows = match drill::load_table(&args.csv) {
        Ok(rows) => rows,
        Err(e) => {
            release_synthesizer(&mut synth);
            return Err(e.into());
        }
    };
    if !drill::prepare_scratch_dir(&config.scratch_dir) {
        rows.clear();
    }

    let output = drill::run_drill(&mut synth, &rows, &config);
    release_synthesizer(&mut synth);

    match drill::export(&output.timeline, &args.output) {
        Ok(Some(paths)) => {
            log::info!("Audio: {}", paths.audio.display());
            log::info!("Subtitles: {}", paths.subtitles.display());
        }
        Ok(None) => {}
        Err(e) => log::error!("{}", e),
    }

    let s = &output.summary;
    log::info!(
        "Done: {} rows ({} complete, {} partial, {} failed, {} skipped), {} cues, {:.1}s",
        s.rows_total,
        s.complete,
        s.partial,
        s.failed,
        s.skipped,
        s.cues,
        s.duration_ms as f64 / 1000.0,
    );
    if !s.produced_audio() {
        log::warn!("No audio was produced");
    }
    Ok(())
}

// ─── Say runner ──────────────────────────────────────────────────

fn run_say(args: SayArgs) -> Result<()> {
    let mut synth = load_synthesizer(&args.synth)?;

    let request = SynthesisRequest {
        reference_voice: args.prompt_wav.clone(),
        text: drill::table::speakable_text(&args.text),
        decoding_mode: args.synth.decoding_mode(),
        seed: args.synth.seed,
        retry_budget: args.synth.max_retries,
    };
    let policy = RetryPolicy::new(!args.synth.no_quality_check);

    let result = synthesize_with_retry(&mut synth, &request, &args.output, &policy);
    release_synthesizer(&mut synth);

    match result {
        Some(waveform) => {
            log::info!(
                "Wrote {} ({:.2}s)",
                args.output.display(),
                waveform.duration_ms() as f64 / 1000.0
            );
            Ok(())
        }
        None => bail!("No acceptable audio after {} attempts", args.synth.max_retries.saturating_add(1)),
    }
}
