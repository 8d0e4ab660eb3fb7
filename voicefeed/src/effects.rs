//! Filter and reverb parameters with deferred application.
//!
//! Effect parameters can be changed at any time, but the backend only sees them while a
//! voice is actually playing. [`Deferred`] holds a value that is waiting to be applied:
//! every `play()` applies whatever is pending, while a change made during playback is
//! applied immediately and then forgotten.

/// Filter shape requested by the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    LowPass,
    HighPass,
    BandPass,
}

/// Filter request as stored on a session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterSpec {
    pub mode: FilterMode,
    /// Stored for completeness; the gain-based backend filters ignore it.
    pub q: f32,
    /// Cutoff / center frequency in Hz
    pub frequency: f32,
}

/// Gains written to the backend filter object.
///
/// A gain left as `None` keeps the backend default for that band.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterParams {
    pub mode: FilterMode,
    pub gain_hf: Option<f32>,
    pub gain_lf: Option<f32>,
}

impl FilterSpec {
    pub fn new(mode: FilterMode, q: f32, frequency: f32) -> Self {
        Self { mode, q, frequency }
    }

    /// Maps the frequency onto band gains, using `reference_hz` as the 1.0 point.
    pub fn params(&self, reference_hz: f32) -> FilterParams {
        let freq = (self.frequency / reference_hz).clamp(0.0, 1.0);
        let (gain_hf, gain_lf) = match self.mode {
            FilterMode::LowPass => (Some(freq), None),
            FilterMode::HighPass => (None, Some(freq)),
            FilterMode::BandPass => (Some(freq), Some(1.0 - freq)),
        };
        FilterParams {
            mode: self.mode,
            gain_hf,
            gain_lf,
        }
    }
}

/// A parameter change that has not been applied to a voice yet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Deferred<T> {
    value: Option<T>,
}

impl<T: Copy> Deferred<T> {
    pub fn new() -> Self {
        Self { value: None }
    }

    /// Records a new value to apply.
    pub fn set(&mut self, value: T) {
        self.value = Some(value);
    }

    /// The value waiting to be applied, if any.
    pub fn pending(&self) -> Option<T> {
        self.value
    }

    pub fn is_pending(&self) -> bool {
        self.value.is_some()
    }

    /// Hands out the pending value and forgets it.
    pub fn take(&mut self) -> Option<T> {
        self.value.take()
    }

    /// Drops the pending value without applying it.
    pub fn clear(&mut self) {
        self.value = None;
    }
}

impl<T: Copy> Default for Deferred<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowpass_gains() {
        let params = FilterSpec::new(FilterMode::LowPass, 1.0, 5000.0).params(20000.0);
        assert_eq!(params.gain_hf, Some(0.25));
        assert_eq!(params.gain_lf, None);
    }

    #[test]
    fn test_highpass_gains() {
        let params = FilterSpec::new(FilterMode::HighPass, 1.0, 10000.0).params(20000.0);
        assert_eq!(params.gain_hf, None);
        assert_eq!(params.gain_lf, Some(0.5));
    }

    #[test]
    fn test_bandpass_gains() {
        let params = FilterSpec::new(FilterMode::BandPass, 0.7, 15000.0).params(20000.0);
        assert_eq!(params.gain_hf, Some(0.75));
        assert_eq!(params.gain_lf, Some(0.25));
    }

    #[test]
    fn test_frequency_is_clamped() {
        let params = FilterSpec::new(FilterMode::BandPass, 1.0, 40000.0).params(20000.0);
        assert_eq!(params.gain_hf, Some(1.0));
        assert_eq!(params.gain_lf, Some(0.0));
    }

    #[test]
    fn test_deferred_lifecycle() {
        let mut mix = Deferred::new();
        assert!(!mix.is_pending());

        mix.set(0.5f32);
        assert_eq!(mix.pending(), Some(0.5));

        assert_eq!(mix.take(), Some(0.5));
        assert_eq!(mix.pending(), None);

        mix.set(0.25);
        mix.clear();
        assert!(!mix.is_pending());
    }
}
