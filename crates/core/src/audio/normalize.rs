//! Conform waveforms to the run's output format so they can be concatenated
//! sample-for-sample.

use anyhow::{Result, bail};

use crate::audio::effects::{clamp_to_depth, edge_fade};
use crate::audio::io::resample_channels;
use crate::types::{AudioFormat, Waveform};

/// A waveform known to match a target format.
///
/// Only produced by [`normalize`] and [`NormalizedSegment::silence`], so the
/// timeline can append its samples without further checks.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedSegment {
    waveform: Waveform,
}

impl NormalizedSegment {
    pub fn silence(duration_ms: u64, format: AudioFormat) -> Self {
        Self {
            waveform: crate::audio::effects::generate_silence(duration_ms, format),
        }
    }

    pub fn format(&self) -> AudioFormat {
        self.waveform.format
    }

    pub fn samples(&self) -> &[i32] {
        &self.waveform.samples
    }

    pub fn duration_ms(&self) -> u64 {
        self.waveform.duration_ms()
    }

    /// Linear fade at both edges, unless the segment is too short for it.
    pub fn with_edge_fade(mut self, fade_ms: u64) -> Self {
        edge_fade(&mut self.waveform, fade_ms);
        self
    }

    /// Mutable access for post-processing that keeps the format (gain, fades).
    pub fn waveform_mut(&mut self) -> &mut Waveform {
        &mut self.waveform
    }
}

/// Resample, remix and requantize `waveform` to `target`, in that order.
///
/// A waveform already in the target format is returned with its samples
/// untouched.
pub fn normalize(waveform: Waveform, target: AudioFormat) -> Result<NormalizedSegment> {
    if !matches!(target.bits_per_sample, 8 | 16 | 24 | 32) {
        bail!("Unsupported target bit depth: {}", target.bits_per_sample);
    }
    if target.channels == 0 || target.sample_rate == 0 {
        bail!("Target format needs at least one channel and a positive sample rate");
    }
    if waveform.format.channels == 0 {
        bail!("Source waveform has no channels");
    }

    let mut wf = waveform;
    if wf.format.sample_rate != target.sample_rate {
        wf = change_rate(&wf, target.sample_rate)?;
    }
    if wf.format.channels != target.channels {
        wf = change_channels(&wf, target.channels);
    }
    if wf.format.bits_per_sample != target.bits_per_sample {
        wf = change_depth(&wf, target.bits_per_sample);
    }

    Ok(NormalizedSegment { waveform: wf })
}

fn change_rate(wf: &Waveform, to_sr: u32) -> Result<Waveform> {
    let channels = wf.format.channels as usize;
    let scale = wf.full_scale();

    let mut planar: Vec<Vec<f64>> = vec![Vec::with_capacity(wf.frames()); channels];
    for frame in wf.samples.chunks_exact(channels) {
        for (ch, &s) in frame.iter().enumerate() {
            planar[ch].push(s as f64 / scale);
        }
    }

    let resampled = resample_channels(&planar, wf.format.sample_rate, to_sr)?;
    let n_frames = resampled.first().map(|c| c.len()).unwrap_or(0);
    let bits = wf.format.bits_per_sample;

    let mut samples = Vec::with_capacity(n_frames * channels);
    for i in 0..n_frames {
        for ch in &resampled {
            samples.push(clamp_to_depth(ch[i] * scale, bits));
        }
    }

    Ok(Waveform::new(
        samples,
        AudioFormat {
            sample_rate: to_sr,
            ..wf.format
        },
    ))
}

/// Downmix by averaging, upmix by duplicating the mono mix.
fn change_channels(wf: &Waveform, to_channels: u16) -> Waveform {
    let from = wf.format.channels as usize;
    let to = to_channels as usize;

    let mut samples = Vec::with_capacity(wf.frames() * to);
    for frame in wf.samples.chunks_exact(from) {
        if from == 1 {
            samples.extend(std::iter::repeat(frame[0]).take(to));
        } else {
            let sum: i64 = frame.iter().map(|&s| s as i64).sum();
            let mono = (sum as f64 / from as f64).round() as i32;
            samples.extend(std::iter::repeat(mono).take(to));
        }
    }

    Waveform::new(
        samples,
        AudioFormat {
            channels: to_channels,
            ..wf.format
        },
    )
}

/// Requantize by arithmetic shift; narrowing truncates toward negative infinity.
fn change_depth(wf: &Waveform, to_bits: u16) -> Waveform {
    let from_bits = wf.format.bits_per_sample;
    let samples = if to_bits > from_bits {
        let shift = to_bits - from_bits;
        wf.samples.iter().map(|&s| ((s as i64) << shift) as i32).collect()
    } else {
        let shift = from_bits - to_bits;
        wf.samples.iter().map(|&s| s >> shift).collect()
    };

    Waveform::new(
        samples,
        AudioFormat {
            bits_per_sample: to_bits,
            ..wf.format
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(frames: usize, format: AudioFormat, freq: f64) -> Waveform {
        let channels = format.channels as usize;
        let amp = (1i64 << (format.bits_per_sample - 1)) as f64 * 0.5;
        let mut samples = Vec::with_capacity(frames * channels);
        for i in 0..frames {
            let v = ((i as f64 / format.sample_rate as f64) * freq * std::f64::consts::TAU).sin() * amp;
            for _ in 0..channels {
                samples.push(v as i32);
            }
        }
        Waveform::new(samples, format)
    }

    #[test]
    fn test_conformant_waveform_is_unchanged() {
        let target = AudioFormat::default();
        let wf = sine(22050, target, 440.0);
        let seg = normalize(wf.clone(), target).unwrap();
        assert_eq!(seg.samples(), wf.samples.as_slice());
        assert_eq!(seg.format(), target);
    }

    #[test]
    fn test_normalize_twice_is_idempotent() {
        let source = AudioFormat { sample_rate: 22050, channels: 2, bits_per_sample: 24 };
        let target = AudioFormat::default();
        let once = normalize(sine(2205, source, 300.0), target).unwrap();
        let twice = normalize(once.waveform.clone(), target).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_downmix_averages() {
        let source = AudioFormat { sample_rate: 22050, channels: 2, bits_per_sample: 16 };
        let wf = Waveform::new(vec![1000, 3000, -2000, 0], source);
        let seg = normalize(wf, AudioFormat::default()).unwrap();
        assert_eq!(seg.samples(), &[2000, -1000]);
    }

    #[test]
    fn test_upmix_duplicates() {
        let target = AudioFormat { sample_rate: 22050, channels: 2, bits_per_sample: 16 };
        let wf = Waveform::new(vec![5, -7], AudioFormat::default());
        let seg = normalize(wf, target).unwrap();
        assert_eq!(seg.samples(), &[5, 5, -7, -7]);
    }

    #[test]
    fn test_requantize_bit_depth() {
        let source = AudioFormat { sample_rate: 22050, channels: 1, bits_per_sample: 24 };
        let wf = Waveform::new(vec![0x7FFF00, -0x800000, 0x000100], source);
        let seg = normalize(wf, AudioFormat::default()).unwrap();
        assert_eq!(seg.samples(), &[0x7FFF, -0x8000, 1]);

        let target = AudioFormat { bits_per_sample: 32, ..AudioFormat::default() };
        let wf = Waveform::new(vec![1, -1], AudioFormat::default());
        let seg = normalize(wf, target).unwrap();
        assert_eq!(seg.samples(), &[65536, -65536]);
    }

    #[test]
    fn test_resample_changes_rate_and_duration_roughly() {
        let source = AudioFormat { sample_rate: 44100, channels: 1, bits_per_sample: 16 };
        let seg = normalize(sine(44100, source, 440.0), AudioFormat::default()).unwrap();
        assert_eq!(seg.format().sample_rate, 22050);
        let ms = seg.duration_ms();
        assert!(ms > 900 && ms < 1100, "Expected ~1000 ms, got {}", ms);
    }

    #[test]
    fn test_rejects_bad_target() {
        let wf = Waveform::new(vec![0; 10], AudioFormat::default());
        let target = AudioFormat { bits_per_sample: 12, ..AudioFormat::default() };
        assert!(normalize(wf, target).is_err());
    }

    #[test]
    fn test_silence_segment() {
        let seg = NormalizedSegment::silence(1500, AudioFormat::default());
        assert_eq!(seg.duration_ms(), 1500);
        assert!(seg.samples().iter().all(|&s| s == 0));
    }

    #[test]
    fn test_edge_fade_on_segment() {
        let seg = normalize(sine(22050, AudioFormat::default(), 100.0), AudioFormat::default())
            .unwrap()
            .with_edge_fade(8);
        assert_eq!(seg.samples()[0], 0);
        assert_eq!(*seg.samples().last().unwrap(), 0);
    }
}
