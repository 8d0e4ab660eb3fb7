//! Configuration for VoiceFeed

use crate::backend::DistanceModel;
use crate::error::{Result, VoiceFeedError};
use crate::queue::{FILL_CHUNK_BYTES, MAX_BUFFERS};

/// Configuration descriptor shared by every session created from a [`VoiceWorld`](crate::VoiceWorld).
#[derive(Debug, Clone)]
pub struct EngineDesc {
    /// Number of hardware voices the pool hands out before reporting exhaustion
    pub max_voices: usize,
    /// Backend buffer objects allocated per streaming session
    pub max_buffers: usize,
    /// Target number of bytes submitted per buffer refill. Must hold at least one
    /// alignment unit of every stream played; `play()` reports a configuration error
    /// otherwise.
    pub fill_chunk_bytes: usize,
    /// Refill is skipped while more than this many buffers are queued on the voice
    pub backpressure_queued: usize,
    /// Frequency (Hz) that maps to a filter gain of 1.0
    pub filter_reference_hz: f32,
    /// Distance attenuation model pushed to the backend on every play
    pub distance_model: DistanceModel,
}

impl Default for EngineDesc {
    fn default() -> Self {
        Self {
            max_voices: 32,
            max_buffers: MAX_BUFFERS,
            fill_chunk_bytes: FILL_CHUNK_BYTES,
            backpressure_queued: 2,
            filter_reference_hz: 20000.0,
            distance_model: DistanceModel::InverseDistanceClamped,
        }
    }
}

impl EngineDesc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_voices(mut self, max: usize) -> Self {
        self.max_voices = max;
        self
    }

    pub fn max_buffers(mut self, count: usize) -> Self {
        self.max_buffers = count;
        self
    }

    pub fn fill_chunk_bytes(mut self, bytes: usize) -> Self {
        self.fill_chunk_bytes = bytes;
        self
    }

    pub fn backpressure_queued(mut self, queued: usize) -> Self {
        self.backpressure_queued = queued;
        self
    }

    pub fn filter_reference_hz(mut self, hz: f32) -> Self {
        self.filter_reference_hz = hz;
        self
    }

    pub fn distance_model(mut self, model: DistanceModel) -> Self {
        self.distance_model = model;
        self
    }

    /// Checks that the descriptor can drive a session.
    pub fn validate(&self) -> Result<()> {
        if self.max_voices == 0 {
            return Err(VoiceFeedError::Configuration(
                "max_voices must be at least 1".into(),
            ));
        }
        if self.max_buffers == 0 {
            return Err(VoiceFeedError::Configuration(
                "max_buffers must be at least 1".into(),
            ));
        }
        if self.fill_chunk_bytes == 0 {
            return Err(VoiceFeedError::Configuration(
                "fill_chunk_bytes must be non-zero".into(),
            ));
        }
        if !(self.filter_reference_hz > 0.0) {
            return Err(VoiceFeedError::Configuration(format!(
                "filter_reference_hz must be positive, got {}",
                self.filter_reference_hz
            )));
        }
        Ok(())
    }
}
