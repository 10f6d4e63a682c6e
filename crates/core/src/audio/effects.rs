//! Sample-level effects on integer waveforms: silence, gain, linear fades.

use crate::types::{AudioFormat, Waveform};

/// Clamp a value into the signed range of the given bit depth.
pub(crate) fn clamp_to_depth(value: f64, bits: u16) -> i32 {
    let max = ((1i64 << (bits.clamp(1, 32) - 1)) - 1) as f64;
    let min = -max - 1.0;
    value.round().clamp(min, max) as i32
}

/// Number of frames covering `ms` milliseconds at `sr`, rounded to nearest.
pub fn ms_to_frames(ms: u64, sr: u32) -> usize {
    ((ms * sr as u64 + 500) / 1000) as usize
}

/// Generate silence of given duration in the given format.
pub fn generate_silence(duration_ms: u64, format: AudioFormat) -> Waveform {
    let n_frames = ms_to_frames(duration_ms, format.sample_rate);
    Waveform::new(vec![0; n_frames * format.channels as usize], format)
}

/// Adjust volume by dB amount. Modifies samples in place, saturating at full scale.
pub fn adjust_volume(waveform: &mut Waveform, db: f64) {
    if db.abs() < 0.01 {
        return;
    }
    let gain = 10.0f64.powf(db / 20.0);
    let bits = waveform.format.bits_per_sample;
    for sample in waveform.samples.iter_mut() {
        *sample = clamp_to_depth(*sample as f64 * gain, bits);
    }
}

/// Linear fade from silence over the first `fade_ms` milliseconds.
///
/// Fades longer than the waveform cover the whole waveform.
pub fn fade_in(waveform: &mut Waveform, fade_ms: u64) {
    let channels = waveform.format.channels.max(1) as usize;
    let fade_frames = ms_to_frames(fade_ms, waveform.format.sample_rate).min(waveform.frames());
    if fade_frames == 0 {
        return;
    }
    for (i, frame) in waveform.samples.chunks_exact_mut(channels).take(fade_frames).enumerate() {
        let gain = i as f64 / fade_frames as f64;
        for s in frame.iter_mut() {
            *s = (*s as f64 * gain).round() as i32;
        }
    }
}

/// Linear fade to silence over the last `fade_ms` milliseconds.
pub fn fade_out(waveform: &mut Waveform, fade_ms: u64) {
    let channels = waveform.format.channels.max(1) as usize;
    let frames = waveform.frames();
    let fade_frames = ms_to_frames(fade_ms, waveform.format.sample_rate).min(frames);
    if fade_frames == 0 {
        return;
    }
    let start = frames - fade_frames;
    for (i, frame) in waveform.samples.chunks_exact_mut(channels).skip(start).enumerate() {
        let gain = (fade_frames - 1 - i) as f64 / fade_frames as f64;
        for s in frame.iter_mut() {
            *s = (*s as f64 * gain).round() as i32;
        }
    }
}

/// Fade both edges of a speech segment to suppress clicks at concatenation
/// boundaries. Skipped unless the segment is longer than twice the fade.
///
/// Returns whether the fade was applied.
pub fn edge_fade(waveform: &mut Waveform, fade_ms: u64) -> bool {
    if fade_ms == 0 || waveform.duration_ms() <= fade_ms * 2 {
        return false;
    }
    fade_in(waveform, fade_ms);
    fade_out(waveform, fade_ms);
    true
}
