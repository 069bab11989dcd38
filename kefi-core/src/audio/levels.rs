use std::f32::consts::PI;
use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

pub const FFT_SIZE: usize = 512;
// Decibel window mapped onto [0, 1], matching the usual analyser defaults.
const MIN_DECIBELS: f32 = -100.0;
const MAX_DECIBELS: f32 = -30.0;

/// Turns the most recent window of microphone samples into a handful of
/// normalized frequency-band levels for the recording indicator.
pub struct LevelAnalyzer {
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    bucket_count: usize,
    scratch: Vec<Complex<f32>>,
}

impl LevelAnalyzer {
    pub fn new(bucket_count: usize) -> Self {
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(FFT_SIZE);
        let window = (0..FFT_SIZE)
            .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f32 / (FFT_SIZE as f32 - 1.0)).cos())
            .collect();

        Self {
            fft,
            window,
            bucket_count: bucket_count.clamp(1, FFT_SIZE / 2),
            scratch: vec![Complex::new(0.0, 0.0); FFT_SIZE],
        }
    }

    pub fn bucket_count(&self) -> usize {
        self.bucket_count
    }

    /// Analyzes the trailing `FFT_SIZE` samples of `recent` (zero-padded at the
    /// front when shorter) and averages the magnitude spectrum into buckets.
    pub fn analyze(&mut self, recent: &[f32]) -> Vec<f32> {
        let tail_start = recent.len().saturating_sub(FFT_SIZE);
        let tail = &recent[tail_start..];
        let offset = FFT_SIZE - tail.len();

        for (idx, slot) in self.scratch.iter_mut().enumerate() {
            let sample = if idx < offset { 0.0 } else { tail[idx - offset] };
            let sample = if sample.is_finite() { sample } else { 0.0 };
            *slot = Complex::new(sample * self.window[idx], 0.0);
        }
        self.fft.process(&mut self.scratch);

        let bins = FFT_SIZE / 2;
        let bins_per_bucket = bins / self.bucket_count;
        let normalization = FFT_SIZE as f32 / 4.0;

        (0..self.bucket_count)
            .map(|bucket| {
                let start = bucket * bins_per_bucket;
                let end = if bucket + 1 == self.bucket_count {
                    bins
                } else {
                    start + bins_per_bucket
                };
                let magnitude: f32 = self.scratch[start..end]
                    .iter()
                    .map(|bin| bin.norm() / normalization)
                    .sum::<f32>()
                    / (end - start) as f32;
                to_level(magnitude)
            })
            .collect()
    }
}

fn to_level(magnitude: f32) -> f32 {
    if magnitude <= 0.0 || !magnitude.is_finite() {
        return 0.0;
    }
    let decibels = 20.0 * magnitude.log10();
    ((decibels - MIN_DECIBELS) / (MAX_DECIBELS - MIN_DECIBELS)).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(bin: usize, amplitude: f32) -> Vec<f32> {
        (0..FFT_SIZE)
            .map(|i| (2.0 * PI * bin as f32 * i as f32 / FFT_SIZE as f32).sin() * amplitude)
            .collect()
    }

    #[test]
    fn silence_yields_zero_levels() {
        let mut analyzer = LevelAnalyzer::new(8);
        let levels = analyzer.analyze(&vec![0.0; 2_048]);
        assert_eq!(levels, vec![0.0; 8]);
    }

    #[test]
    fn tone_lights_up_its_bucket_most() {
        let mut analyzer = LevelAnalyzer::new(8);
        // 256 bins / 8 buckets = 32 bins per bucket; bin 80 falls in bucket 2.
        let levels = analyzer.analyze(&tone(80, 0.8));
        let loudest = levels
            .iter()
            .enumerate()
            .fold((0, f32::MIN), |best, (idx, level)| {
                if *level > best.1 { (idx, *level) } else { best }
            })
            .0;
        assert_eq!(loudest, 2);
        assert!(levels.iter().all(|level| (0.0..=1.0).contains(level)));
    }

    #[test]
    fn short_input_is_zero_padded() {
        let mut analyzer = LevelAnalyzer::new(4);
        let levels = analyzer.analyze(&[0.5, -0.5, 0.25]);
        assert_eq!(levels.len(), 4);
    }

    #[test]
    fn bucket_count_is_clamped() {
        assert_eq!(LevelAnalyzer::new(0).bucket_count(), 1);
        assert_eq!(LevelAnalyzer::new(10_000).bucket_count(), FFT_SIZE / 2);
    }
}
