use std::{f32::consts::PI, sync::Arc};

use crossbeam_channel::Receiver;
use rustfft::{Fft, FftPlanner, num_complex::Complex};

use super::FrequencySource;

#[derive(Clone, Debug)]
pub struct SpectrumConfig {
    pub fft_size: usize,
    pub smoothing: f32,
    pub min_decibels: f32,
    pub max_decibels: f32,
}

impl Default for SpectrumConfig {
    fn default() -> Self {
        Self {
            fft_size: 128,
            smoothing: 0.8,
            min_decibels: -100.0,
            max_decibels: -30.0,
        }
    }
}

/// Byte spectrum over the most recent `fft_size` microphone samples.
///
/// Each snapshot applies a Blackman window and a forward FFT, scales the
/// magnitudes by `1 / fft_size`, smooths them exponentially across calls and
/// maps the decibel range linearly onto 0..=255.
pub struct SpectrumAnalyser {
    cfg: SpectrumConfig,
    samples_rx: Option<Receiver<Vec<f32>>>,
    window: Vec<f32>,
    history: Vec<f32>,
    smoothed: Vec<f32>,
    scratch: Vec<Complex<f32>>,
    fft: Arc<dyn Fft<f32>>,
}

impl SpectrumAnalyser {
    pub fn new(cfg: SpectrumConfig, samples_rx: Option<Receiver<Vec<f32>>>) -> Self {
        let n = cfg.fft_size.max(2);
        let fft = FftPlanner::<f32>::new().plan_fft_forward(n);
        Self {
            window: blackman_window(n),
            history: vec![0.0; n],
            smoothed: vec![0.0; n / 2],
            scratch: vec![Complex::new(0.0, 0.0); n],
            fft,
            samples_rx,
            cfg: SpectrumConfig { fft_size: n, ..cfg },
        }
    }

    /// Appends raw mono samples, keeping only the newest `fft_size`.
    pub fn push_samples(&mut self, samples: &[f32]) {
        let n = self.history.len();
        if samples.len() >= n {
            self.history.copy_from_slice(&samples[samples.len() - n..]);
            return;
        }
        self.history.rotate_left(samples.len());
        let start = n - samples.len();
        self.history[start..].copy_from_slice(samples);
    }

    fn drain_input(&mut self) {
        let Some(rx) = self.samples_rx.take() else {
            return;
        };
        while let Ok(chunk) = rx.try_recv() {
            self.push_samples(&chunk);
        }
        self.samples_rx = Some(rx);
    }

    fn update_smoothed_magnitudes(&mut self) {
        let n = self.cfg.fft_size;
        for (dst, (sample, w)) in self
            .scratch
            .iter_mut()
            .zip(self.history.iter().zip(self.window.iter()))
        {
            *dst = Complex::new(sample * w, 0.0);
        }
        self.fft.process(&mut self.scratch);

        let scale = 1.0 / n as f32;
        let k = self.cfg.smoothing.clamp(0.0, 1.0);
        for (bin, value) in self.smoothed.iter_mut().enumerate() {
            let magnitude = self.scratch[bin].norm() * scale;
            let next = k * *value + (1.0 - k) * magnitude;
            *value = if next.is_finite() { next } else { 0.0 };
        }
    }

    fn to_byte(&self, magnitude: f32) -> u8 {
        if magnitude <= 0.0 {
            return 0;
        }
        let db = 20.0 * magnitude.log10();
        let range = (self.cfg.max_decibels - self.cfg.min_decibels).max(f32::EPSILON);
        let scaled = 255.0 / range * (db - self.cfg.min_decibels);
        scaled.clamp(0.0, 255.0) as u8
    }
}

impl FrequencySource for SpectrumAnalyser {
    fn bin_count(&self) -> usize {
        self.cfg.fft_size / 2
    }

    fn byte_frequency_data(&mut self, out: &mut [u8]) {
        self.drain_input();
        self.update_smoothed_magnitudes();
        for (dst, magnitude) in out.iter_mut().zip(self.smoothed.iter()) {
            *dst = self.to_byte(*magnitude);
        }
    }
}

fn blackman_window(n: usize) -> Vec<f32> {
    let alpha = 0.16;
    let a0 = 0.5 * (1.0 - alpha);
    let a1 = 0.5;
    let a2 = 0.5 * alpha;
    (0..n)
        .map(|i| {
            let x = i as f32 / n as f32;
            a0 - a1 * (2.0 * PI * x).cos() + a2 * (4.0 * PI * x).cos()
        })
        .collect()
}
