use rand::{Rng, SeedableRng, rngs::StdRng};

/// Source of uniform samples in `[0, 1)`.
///
/// Every random decision of a session (shape picks, jitter, mutation rolls)
/// goes through this trait so a run can be replayed from a scripted sequence.
pub trait RandomSource {
    fn next_unit(&mut self) -> f32;

    /// Uniform sample in `[-half_span, half_span)`.
    fn next_centered(&mut self, span: f32) -> f32 {
        (self.next_unit() - 0.5) * span
    }

    /// Uniform index in `0..len`. `len` must be non-zero.
    fn next_index(&mut self, len: usize) -> usize {
        let idx = (self.next_unit() * len as f32) as usize;
        idx.min(len.saturating_sub(1))
    }
}

impl RandomSource for StdRng {
    fn next_unit(&mut self) -> f32 {
        self.random::<f32>()
    }
}

pub fn session_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => {
            log::info!("using deterministic random seed {seed}");
            StdRng::seed_from_u64(seed)
        }
        None => StdRng::from_os_rng(),
    }
}
