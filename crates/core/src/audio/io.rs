//! Audio I/O: WAV read/write, container decode, resampling.

use anyhow::{Context, Result, bail};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::path::Path;

use crate::types::{AudioFormat, Waveform};

/// Read a WAV file into an interleaved integer waveform.
///
/// - Integer WAVs keep their bit depth and channel layout
/// - Float WAVs are converted to 32-bit integer samples
pub fn read_wav(path: &Path) -> Result<Waveform> {
    let reader = WavReader::open(path)
        .with_context(|| format!("Failed to open WAV file: {}", path.display()))?;

    let spec = reader.spec();
    if spec.channels == 0 {
        bail!("WAV file has no channels: {}", path.display());
    }

    let (samples, bits_per_sample) = match spec.sample_format {
        SampleFormat::Int => {
            let samples = reader
                .into_samples::<i32>()
                .collect::<std::result::Result<Vec<_>, _>>()
                .context("Failed to read WAV samples")?;
            (samples, spec.bits_per_sample)
        }
        SampleFormat::Float => {
            let samples = reader
                .into_samples::<f32>()
                .map(|s| s.map(|v| (v.clamp(-1.0, 1.0) as f64 * i32::MAX as f64) as i32))
                .collect::<std::result::Result<Vec<_>, _>>()
                .context("Failed to read WAV samples")?;
            (samples, 32)
        }
    };

    Ok(Waveform::new(
        samples,
        AudioFormat {
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            bits_per_sample,
        },
    ))
}

/// Write an integer waveform as a PCM WAV file in its own format.
///
/// Creates parent directories if needed.
pub fn write_wav(path: &Path, waveform: &Waveform) -> Result<()> {
    write_pcm(path, &waveform.samples, waveform.format)
}

/// Write interleaved integer samples as a PCM WAV file.
pub fn write_pcm(path: &Path, samples: &[i32], format: AudioFormat) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
    }

    let spec = WavSpec {
        channels: format.channels,
        sample_rate: format.sample_rate,
        bits_per_sample: format.bits_per_sample,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)
        .with_context(|| format!("Failed to create WAV file: {}", path.display()))?;

    match format.bits_per_sample {
        8 => {
            for &s in samples {
                writer.write_sample(s as i8)?;
            }
        }
        16 => {
            for &s in samples {
                writer.write_sample(s as i16)?;
            }
        }
        24 | 32 => {
            for &s in samples {
                writer.write_sample(s)?;
            }
        }
        other => bail!("Unsupported bit depth for WAV output: {}", other),
    }

    writer.finalize().context("Failed to finalize WAV file")?;
    Ok(())
}

/// Resample deinterleaved channels together so they stay phase-aligned.
///
/// Uses rubato for high-quality resampling.
pub fn resample_channels(channels: &[Vec<f64>], from_sr: u32, to_sr: u32) -> Result<Vec<Vec<f64>>> {
    if from_sr == to_sr {
        return Ok(channels.to_vec());
    }

    let len = channels.first().map(|c| c.len()).unwrap_or(0);
    if len == 0 {
        return Ok(vec![Vec::new(); channels.len()]);
    }

    use rubato::{SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction, Resampler};

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let ratio = to_sr as f64 / from_sr as f64;
    let mut resampler = SincFixedIn::<f64>::new(
        ratio,
        2.0,
        params,
        len,
        channels.len(),
    )?;

    Ok(resampler.process(channels, None)?)
}

/// Decode any container symphonia understands (WAV, MP3, AAC/MP4) to a
/// 16-bit interleaved waveform at the source rate and channel count.
///
/// Used for the notification sound, which is usually shipped as MP3.
pub fn decode_audio(input_path: &Path) -> Result<Waveform> {
    use symphonia::core::audio::SampleBuffer;
    use symphonia::core::codecs::{CODEC_TYPE_NULL, DecoderOptions};
    use symphonia::core::errors::Error as SymphError;
    use symphonia::core::formats::FormatOptions;
    use symphonia::core::io::MediaSourceStream;
    use symphonia::core::meta::MetadataOptions;
    use symphonia::core::probe::Hint;

    let file = std::fs::File::open(input_path)
        .with_context(|| format!("Failed to open: {}", input_path.display()))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = input_path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .with_context(|| format!("Unsupported format: {}", input_path.display()))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .context("No audio track found")?;

    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(44100);
    let mut channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(1);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .context("Unsupported codec")?;

    let mut all_samples: Vec<i32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(SymphError::ResetRequired) => break,
            Err(e) => return Err(e.into()),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate = spec.rate;
                channels = spec.channels.count();
                let mut sample_buf = SampleBuffer::<i16>::new(decoded.capacity() as u64, spec);
                sample_buf.copy_interleaved_ref(decoded);
                all_samples.extend(sample_buf.samples().iter().map(|&s| s as i32));
            }
            Err(SymphError::DecodeError(_)) => continue,
            Err(e) => return Err(e.into()),
        }
    }

    if all_samples.is_empty() {
        bail!("No audio decoded from {}", input_path.display());
    }

    Ok(Waveform::new(
        all_samples,
        AudioFormat {
            sample_rate,
            channels: channels.max(1) as u16,
            bits_per_sample: 16,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine_i16(n: usize, sr: u32, freq: f64, amp: f64) -> Vec<i32> {
        (0..n)
            .map(|i| ((i as f64 / sr as f64 * freq * std::f64::consts::TAU).sin() * amp * 32767.0) as i32)
            .collect()
    }

    #[test]
    fn test_write_read_roundtrip_keeps_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roundtrip.wav");
        let fmt = AudioFormat { sample_rate: 16000, channels: 2, bits_per_sample: 16 };
        let wf = Waveform::new(sine_i16(2000, 16000, 440.0, 0.5), fmt);
        write_wav(&path, &wf).unwrap();

        let read = read_wav(&path).unwrap();
        assert_eq!(read, wf);
    }

    #[test]
    fn test_write_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("x.wav");
        let wf = Waveform::new(vec![0; 10], AudioFormat::default());
        write_wav(&path, &wf).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_read_float_wav_as_32_bit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("float.wav");
        let spec = WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let mut writer = WavWriter::create(&path, spec).unwrap();
        for v in [0.0f32, 0.5, -1.0] {
            writer.write_sample(v).unwrap();
        }
        writer.finalize().unwrap();

        let wf = read_wav(&path).unwrap();
        assert_eq!(wf.format.bits_per_sample, 32);
        assert_eq!(wf.samples[0], 0);
        assert!(wf.samples[1] > 1_000_000_000);
        assert!(wf.samples[2] < -2_000_000_000);
    }

    #[test]
    fn test_read_missing_file_fails() {
        assert!(read_wav(Path::new("/nonexistent/nothing.wav")).is_err());
    }

    #[test]
    fn test_resample_same_rate() {
        let samples = vec![vec![1.0, 2.0, 3.0]];
        let result = resample_channels(&samples, 16000, 16000).unwrap();
        assert_eq!(result, samples);
    }

    #[test]
    fn test_resample_upsample() {
        let samples: Vec<f64> = (0..4000).map(|i| (i as f64 / 4000.0 * std::f64::consts::TAU).sin()).collect();
        let result = resample_channels(&[samples], 8000, 16000).unwrap();
        // Sinc resampler loses samples at edges due to filter length; allow wide tolerance
        assert!(result[0].len() >= 7000 && result[0].len() <= 8500,
            "Expected ~8000 samples, got {}", result[0].len());
    }

    #[test]
    fn test_resample_channels_stay_aligned() {
        let left: Vec<f64> = (0..4000).map(|i| (i as f64 / 100.0).sin() * 0.5).collect();
        let out = resample_channels(&[left.clone(), left], 16000, 8000).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].len(), out[1].len());
        assert_eq!(out[0], out[1]);
    }

    #[test]
    fn test_resample_empty() {
        let result = resample_channels(&[Vec::new()], 16000, 8000).unwrap();
        assert_eq!(result, vec![Vec::<f64>::new()]);
    }

    #[test]
    fn test_decode_audio_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ding.wav");
        let fmt = AudioFormat { sample_rate: 44100, channels: 2, bits_per_sample: 16 };
        let wf = Waveform::new(sine_i16(44100 * 2, 44100, 880.0, 0.4), fmt);
        write_wav(&path, &wf).unwrap();

        let decoded = decode_audio(&path).unwrap();
        assert_eq!(decoded.format, fmt);
        assert_eq!(decoded.frames(), 44100);
    }
}
