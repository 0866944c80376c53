mod analyser;
mod capture;

pub use analyser::{SpectrumAnalyser, SpectrumConfig};
pub use capture::{MicrophoneInput, start_microphone};

/// Number of highest-frequency bins averaged into `treble`.
const TREBLE_BINS: usize = 10;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct AudioFeatures {
    pub volume: f32,
    pub treble: f32,
}

impl AudioFeatures {
    pub const SILENT: AudioFeatures = AudioFeatures {
        volume: 0.0,
        treble: 0.0,
    };
}

/// Anything able to fill a byte frequency snapshot (0..=255 per bin).
pub trait FrequencySource: Send {
    fn bin_count(&self) -> usize;

    fn byte_frequency_data(&mut self, out: &mut [u8]);
}

/// Reduces a frequency snapshot to overall volume and high-band energy.
pub fn features_from_bins(bins: &[u8]) -> AudioFeatures {
    if bins.is_empty() {
        return AudioFeatures::SILENT;
    }

    let total: u32 = bins.iter().map(|&b| b as u32).sum();
    let avg = total as f32 / bins.len() as f32;

    let tail_start = bins.len().saturating_sub(TREBLE_BINS);
    let high: u32 = bins[tail_start..].iter().map(|&b| b as u32).sum();
    let high = high as f32 / TREBLE_BINS as f32;

    AudioFeatures {
        volume: avg / 255.0,
        treble: high / 255.0,
    }
}

/// Owns the optional audio source and the snapshot buffer it is read into.
pub struct AudioFeatureExtractor {
    source: Option<Box<dyn FrequencySource>>,
    bins: Vec<u8>,
}

impl AudioFeatureExtractor {
    pub fn new(source: Option<Box<dyn FrequencySource>>) -> Self {
        let bins = source
            .as_ref()
            .map(|s| vec![0u8; s.bin_count()])
            .unwrap_or_default();
        Self { source, bins }
    }

    pub fn silent() -> Self {
        Self::new(None)
    }

    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    /// Refreshes the snapshot and reduces it. Without a source this is always
    /// silence.
    pub fn sample(&mut self) -> AudioFeatures {
        let Some(source) = self.source.as_mut() else {
            return AudioFeatures::SILENT;
        };
        source.byte_frequency_data(&mut self.bins);
        features_from_bins(&self.bins)
    }
}
