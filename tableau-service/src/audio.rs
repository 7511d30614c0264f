//! WAV decode/encode and the loudness post-process applied to generated music.

use std::io::Cursor;

/// Output loudness target, in dB below full scale
pub const LOUDNESS_HEADROOM_DB: f32 = 14.0;

/// Below this level the track is treated as silence and left alone
const SILENCE_FLOOR_DB: f32 = -70.0;

/// Interleaved f32 samples in [-1, 1]
#[derive(Debug, Clone, PartialEq)]
pub struct RawAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl RawAudio {
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / (self.sample_rate as f64 * self.channels as f64)
    }
}

/// Decode a WAV byte buffer (integer or float samples)
pub fn decode_wav(bytes: &[u8]) -> Result<RawAudio, hound::Error> {
    let reader = hound::WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<Vec<_>, _>>()?,
        hound::SampleFormat::Int => {
            let max_val = (1u64 << (spec.bits_per_sample.max(1) - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<Result<Vec<_>, _>>()?
        }
    };

    Ok(RawAudio {
        samples,
        sample_rate: spec.sample_rate,
        channels: spec.channels,
    })
}

/// Encode as 16-bit PCM WAV
pub fn encode_wav_pcm16(audio: &RawAudio) -> Result<Vec<u8>, hound::Error> {
    let spec = hound::WavSpec {
        channels: audio.channels,
        sample_rate: audio.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for &s in &audio.samples {
            let clamped = s.clamp(-1.0, 1.0);
            writer.write_sample((clamped * i16::MAX as f32).round() as i16)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

/// RMS level in dBFS, `None` for empty or silent input
pub fn loudness_db(samples: &[f32]) -> Option<f32> {
    if samples.is_empty() {
        return None;
    }
    let mean_square = samples
        .iter()
        .filter(|s| s.is_finite())
        .map(|s| (*s as f64) * (*s as f64))
        .sum::<f64>()
        / samples.len() as f64;
    if mean_square <= 0.0 {
        return None;
    }
    let db = (10.0 * mean_square.log10()) as f32;
    (db > SILENCE_FLOOR_DB).then_some(db)
}

/// Bring the track to `-headroom_db` dBFS RMS, then soft-limit with tanh.
///
/// Non-finite samples become zero. Silent input only gets the cleanup.
pub fn normalize_loudness(samples: &mut [f32], headroom_db: f32) {
    for s in samples.iter_mut() {
        if !s.is_finite() {
            *s = 0.0;
        }
    }

    let Some(current_db) = loudness_db(samples) else {
        return;
    };

    let gain = 10f32.powf((-headroom_db - current_db) / 20.0);
    for s in samples.iter_mut() {
        *s = (*s * gain).tanh();
    }
}

/// The fixed post-process for synthesized music: normalize, then encode
pub fn master_track(mut audio: RawAudio) -> Result<Vec<u8>, hound::Error> {
    normalize_loudness(&mut audio.samples, LOUDNESS_HEADROOM_DB);
    encode_wav_pcm16(&audio)
}
