//! 16-bit PCM WAV helpers.

use std::path::Path;

use super::error::{MediaError, MediaResult};

/// Header facts of a WAV file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavInfo {
    pub sample_rate: u32,
    pub channels: u16,
    /// Samples per channel.
    pub num_frames: u64,
}

impl WavInfo {
    /// Duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.num_frames as f64 / self.sample_rate as f64
    }
}

/// Read the header of a WAV file without decoding samples.
pub fn wav_info(path: &Path) -> MediaResult<WavInfo> {
    if !path.exists() {
        return Err(MediaError::SourceNotFound(path.to_path_buf()));
    }
    let reader = hound::WavReader::open(path).map_err(|e| MediaError::wav(path, e))?;
    let spec = reader.spec();
    Ok(WavInfo {
        sample_rate: spec.sample_rate,
        channels: spec.channels,
        num_frames: reader.duration() as u64,
    })
}

/// Decode a mono 16-bit WAV file.
///
/// Fails with [`MediaError::InvalidData`] for multi-channel or non-16-bit
/// files, and when `expected_rate` is given and differs.
pub fn read_mono(path: &Path, expected_rate: Option<u32>) -> MediaResult<Vec<i16>> {
    if !path.exists() {
        return Err(MediaError::SourceNotFound(path.to_path_buf()));
    }
    let mut reader = hound::WavReader::open(path).map_err(|e| MediaError::wav(path, e))?;
    let spec = reader.spec();

    let invalid = |message: String| MediaError::InvalidData {
        path: path.to_path_buf(),
        message,
    };
    if spec.channels != 1 {
        return Err(invalid(format!("expected mono, found {} channels", spec.channels)));
    }
    if spec.sample_format != hound::SampleFormat::Int || spec.bits_per_sample != 16 {
        return Err(invalid(format!(
            "expected 16-bit PCM, found {:?} {} bits",
            spec.sample_format, spec.bits_per_sample
        )));
    }
    if let Some(rate) = expected_rate {
        if spec.sample_rate != rate {
            return Err(invalid(format!(
                "expected {} Hz, found {} Hz",
                rate, spec.sample_rate
            )));
        }
    }

    reader
        .samples::<i16>()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| MediaError::wav(path, e))
}

/// Write mono 16-bit samples to `path`.
pub fn write_mono(path: &Path, samples: &[i16], sample_rate: u32) -> MediaResult<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).map_err(|e| MediaError::wav(path, e))?;
    for &sample in samples {
        writer
            .write_sample(sample)
            .map_err(|e| MediaError::wav(path, e))?;
    }
    writer.finalize().map_err(|e| MediaError::wav(path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn write_then_inspect_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let samples: Vec<i16> = (0..1600).map(|i| (i % 100) as i16).collect();
        write_mono(&path, &samples, 16_000).unwrap();

        let info = wav_info(&path).unwrap();
        assert_eq!(info.sample_rate, 16_000);
        assert_eq!(info.channels, 1);
        assert_eq!(info.num_frames, 1600);
        assert!((info.duration_secs() - 0.1).abs() < 1e-9);

        assert_eq!(read_mono(&path, Some(16_000)).unwrap(), samples);
    }

    #[test]
    fn rejects_wrong_rate_and_stereo() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_mono(&path, &[0; 10], 8_000).unwrap();
        assert!(matches!(
            read_mono(&path, Some(16_000)),
            Err(MediaError::InvalidData { .. })
        ));

        let stereo = dir.path().join("stereo.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 16_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&stereo, spec).unwrap();
        for _ in 0..4 {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();
        assert!(matches!(
            read_mono(&stereo, None),
            Err(MediaError::InvalidData { .. })
        ));
    }
}
