pub mod capturer;
pub mod levels;
pub mod resampler;

use std::io::Cursor;

use hound::{SampleFormat, WavSpec, WavWriter};
use thiserror::Error;
use tracing::debug;

pub use capturer::{AudioCapturer, AudioConfig, CpalInput};
pub use levels::LevelAnalyzer;
pub use resampler::{AudioResampler, convert_f32_to_i16};

pub const TRANSCRIPTION_SAMPLE_RATE: u32 = 16_000;
pub const WAV_MIME_TYPE: &str = "audio/wav";
pub const WAV_FILE_NAME: &str = "recording.wav";

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("invalid audio config: {0}")]
    InvalidConfig(String),
    #[error("no audio input device available")]
    NoInputDevice,
    #[error("audio host is unavailable: {0}")]
    HostUnavailable(String),
    #[error("failed to read default input config: {0}")]
    DefaultInputConfig(String),
    #[error("unsupported audio sample format: {0}")]
    UnsupportedSampleFormat(String),
    #[error("failed to build audio stream: {0}")]
    StreamBuild(String),
    #[error("failed to start audio stream: {0}")]
    StreamStart(String),
    #[error("failed to stop audio stream: {0}")]
    StreamStop(String),
    #[error("audio worker did not become ready: {0}")]
    WorkerStart(String),
    #[error("failed to create resampler: {0}")]
    ResamplerCreate(String),
    #[error("failed to process resampler chunk: {0}")]
    ResamplerProcess(String),
    #[error("invalid audio input: {0}")]
    InvalidInput(String),
    #[error("failed to encode wav payload: {0}")]
    Encode(String),
}

#[derive(Debug, Clone)]
pub struct AudioPayload {
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
    pub file_name: &'static str,
    pub duration_ms: u64,
}

/// Resamples mono `samples` captured at `input_sample_rate` down to the
/// transcription rate and wraps them in a 16-bit PCM WAV container.
pub fn assemble_payload(samples: &[f32], input_sample_rate: u32) -> Result<AudioPayload, AudioError> {
    if input_sample_rate == 0 {
        return Err(AudioError::InvalidConfig(
            "input sample rate must be greater than 0".to_string(),
        ));
    }

    let pcm = if input_sample_rate == TRANSCRIPTION_SAMPLE_RATE {
        samples.iter().copied().map(convert_f32_to_i16).collect()
    } else {
        let mut resampler = AudioResampler::new(input_sample_rate, TRANSCRIPTION_SAMPLE_RATE, 1)?;
        resampler.process_all(samples)?
    };

    let bytes = encode_wav(&pcm, TRANSCRIPTION_SAMPLE_RATE)?;
    let duration_ms = (pcm.len() as u64 * 1_000) / u64::from(TRANSCRIPTION_SAMPLE_RATE);
    debug!(
        input_samples = samples.len(),
        output_samples = pcm.len(),
        bytes = bytes.len(),
        duration_ms,
        "audio payload assembled"
    );

    Ok(AudioPayload {
        bytes,
        mime_type: WAV_MIME_TYPE,
        file_name: WAV_FILE_NAME,
        duration_ms,
    })
}

fn encode_wav(samples: &[i16], sample_rate: u32) -> Result<Vec<u8>, AudioError> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer =
            WavWriter::new(&mut cursor, spec).map_err(|err| AudioError::Encode(err.to_string()))?;
        for sample in samples {
            writer
                .write_sample(*sample)
                .map_err(|err| AudioError::Encode(err.to_string()))?;
        }
        writer
            .finalize()
            .map_err(|err| AudioError::Encode(err.to_string()))?;
    }

    Ok(cursor.into_inner())
}
