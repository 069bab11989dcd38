use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use super::AudioError;

const MAX_FLUSH_CHUNKS: usize = 3;

pub struct AudioResampler {
    resampler: SincFixedIn<f32>,
    input_buffer: Vec<Vec<f32>>,
    input_frames_needed: usize,
    channels: usize,
    ratio: f64,
}

impl AudioResampler {
    pub fn new(from_rate: u32, to_rate: u32, channels: usize) -> Result<Self, AudioError> {
        if from_rate == 0 || to_rate == 0 {
            return Err(AudioError::InvalidConfig(
                "sample rates must be greater than 0".to_string(),
            ));
        }
        if channels == 0 {
            return Err(AudioError::InvalidConfig(
                "channels must be greater than 0".to_string(),
            ));
        }

        let params = SincInterpolationParameters {
            sinc_len: 256,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: 256,
            window: WindowFunction::BlackmanHarris2,
        };

        let ratio = to_rate as f64 / from_rate as f64;
        let chunk_size = (((from_rate as f64) * 0.1) as usize).max(1);

        let resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, chunk_size, channels)
            .map_err(|err| AudioError::ResamplerCreate(err.to_string()))?;

        let input_frames_needed = resampler.input_frames_next();
        let input_buffer = vec![Vec::with_capacity(chunk_size * 2); channels];
        Ok(Self {
            resampler,
            input_buffer,
            input_frames_needed,
            channels,
            ratio,
        })
    }

    /// Buffers interleaved `input` and resamples every complete chunk,
    /// returning the mixed-down mono output produced so far.
    pub fn process(&mut self, input: &[f32]) -> Result<Vec<i16>, AudioError> {
        if input.is_empty() {
            return Ok(Vec::new());
        }
        if input.len() % self.channels != 0 {
            return Err(AudioError::InvalidInput(
                "input sample count must match channel layout".to_string(),
            ));
        }

        for frame in input.chunks_exact(self.channels) {
            for (channel_idx, sample) in frame.iter().enumerate() {
                self.input_buffer[channel_idx].push(*sample);
            }
        }

        let mut output = Vec::new();
        while self.input_buffer[0].len() >= self.input_frames_needed {
            output.extend(self.process_buffered_chunk()?);
        }
        Ok(output)
    }

    /// Resamples a complete recording, flushing the resampler tail with
    /// silence and trimming the result to the exact expected length.
    pub fn process_all(&mut self, input: &[f32]) -> Result<Vec<i16>, AudioError> {
        let frames = input.len() / self.channels;
        let expected = ((frames as f64) * self.ratio).round() as usize;

        let mut output = self.process(input)?;
        let silence = vec![0.0_f32; self.input_frames_needed * self.channels];
        let mut flushes = 0;
        while output.len() < expected && flushes < MAX_FLUSH_CHUNKS {
            output.extend(self.process(&silence)?);
            flushes += 1;
        }

        output.truncate(expected);
        Ok(output)
    }

    fn process_buffered_chunk(&mut self) -> Result<Vec<i16>, AudioError> {
        let input_chunk: Vec<Vec<f32>> = self
            .input_buffer
            .iter()
            .map(|channel| channel[..self.input_frames_needed].to_vec())
            .collect();

        let output_buffer = self
            .resampler
            .process(&input_chunk, None)
            .map_err(|err| AudioError::ResamplerProcess(err.to_string()))?;

        for channel_input in &mut self.input_buffer {
            channel_input.drain(..self.input_frames_needed);
        }
        self.input_frames_needed = self.resampler.input_frames_next();

        let frame_count = output_buffer[0].len();
        let mut output = Vec::with_capacity(frame_count);
        for frame_idx in 0..frame_count {
            let mut mixed_sample = 0.0_f32;
            for channel in output_buffer.iter().take(self.channels) {
                mixed_sample += channel[frame_idx];
            }
            mixed_sample /= self.channels as f32;
            output.push(convert_f32_to_i16(mixed_sample));
        }

        Ok(output)
    }
}

pub fn convert_f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_test_signal(samples: usize) -> Vec<f32> {
        (0..samples)
            .map(|index| (index as f32 * 0.001).sin())
            .collect()
    }

    #[test]
    fn conversion_clamps_expected_range() {
        assert_eq!(convert_f32_to_i16(0.0), 0);
        assert_eq!(convert_f32_to_i16(0.5), 16_383);
        assert_eq!(convert_f32_to_i16(-0.5), -16_383);
        assert_eq!(convert_f32_to_i16(1.2), 32_767);
        assert_eq!(convert_f32_to_i16(-1.3), -32_767);
    }

    #[test]
    fn streaming_process_buffers_until_a_chunk_is_complete() {
        let mut resampler = match AudioResampler::new(48_000, 16_000, 1) {
            Ok(value) => value,
            Err(err) => panic!("failed to create resampler: {err}"),
        };

        let partial = resampler.process(&build_test_signal(1_000));
        assert!(matches!(partial, Ok(ref chunk) if chunk.is_empty()));

        let full = match resampler.process(&build_test_signal(9_000)) {
            Ok(value) => value,
            Err(err) => panic!("resampler processing failed: {err}"),
        };
        assert!(!full.is_empty());
    }

    #[test]
    fn process_all_returns_exact_length_for_odd_sizes() {
        let mut resampler = match AudioResampler::new(44_100, 16_000, 1) {
            Ok(value) => value,
            Err(err) => panic!("failed to create resampler: {err}"),
        };

        let output = match resampler.process_all(&build_test_signal(12_345)) {
            Ok(value) => value,
            Err(err) => panic!("resampler processing failed: {err}"),
        };
        let expected = (12_345_f64 * 16_000.0 / 44_100.0).round() as usize;
        assert_eq!(output.len(), expected);
    }

    #[test]
    fn resampler_rejects_invalid_interleaved_input() {
        let mut resampler = match AudioResampler::new(48_000, 16_000, 2) {
            Ok(value) => value,
            Err(err) => panic!("failed to create resampler: {err}"),
        };

        let result = resampler.process(&[0.2, -0.3, 0.1]);
        assert!(matches!(result, Err(AudioError::InvalidInput(_))));
    }
}
