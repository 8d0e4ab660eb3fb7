//! Primitive operations the playback policy layer issues against a voice backend.
//!
//! A platform provides exactly one [`Backend`] implementation; sessions receive it by
//! injection and never branch on the platform themselves. [`SimulatedBackend`] is a
//! headless implementation that models queue consumption in software.

pub mod simulated;

pub use simulated::{BackendCall, SimulatedBackend};

use crate::effects::FilterParams;
use crate::error::Result;
use crate::format::SampleFormat;
use crate::math::Vec3;

/// Hardware voice (an OpenAL-style "source").
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoiceHandle(pub u32);

/// Backend buffer object holding one submitted chunk.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferHandle(pub u32);

/// Auxiliary effect slot (e.g. the shared reverb processor).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SlotHandle(pub u32);

/// Backend filter object that can be attached as a voice's direct filter.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct FilterHandle(pub u32);

impl std::fmt::Display for VoiceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Voice({})", self.0)
    }
}

impl std::fmt::Display for BufferHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Buffer({})", self.0)
    }
}

/// Live state reported by the backend for a voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendVoiceState {
    Initial,
    Playing,
    Paused,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DistanceModel {
    None,
    Inverse,
    #[default]
    InverseDistanceClamped,
    Linear,
    Exponent,
}

/// Scalar and binding parameters that can be written onto a voice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VoiceParam {
    Gain(f32),
    /// Backend pitch multiplier (already converted from the application range)
    Pitch(f32),
    Position(Vec3),
    Velocity(Vec3),
    Looping(bool),
    /// Binds a single buffer to the voice, or detaches every buffer with `None`
    Buffer(Option<BufferHandle>),
}

/// Routing of a voice output into an auxiliary effect slot.
///
/// `slot: None` detaches the send so the voice plays dry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuxiliarySend {
    pub slot: Option<SlotHandle>,
    pub send_index: u32,
    pub filter: Option<FilterHandle>,
}

impl AuxiliarySend {
    pub fn dry() -> Self {
        Self {
            slot: None,
            send_index: 0,
            filter: None,
        }
    }

    pub fn to_slot(slot: SlotHandle) -> Self {
        Self {
            slot: Some(slot),
            send_index: 0,
            filter: None,
        }
    }
}

/// Effect objects a backend exposes when its effect extension is initialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EffectSlots {
    pub reverb_slot: Option<SlotHandle>,
    pub filter: Option<FilterHandle>,
}

/// Connects playback sessions to a low-level voice API.
///
/// Every call reports driver failures through [`VoiceFeedError::BackendCallFailed`](crate::VoiceFeedError::BackendCallFailed).
/// Calls are expected to be synchronous and non-blocking.
pub trait Backend {
    fn allocate_buffers(&mut self, count: usize) -> Result<Vec<BufferHandle>>;

    fn release_buffers(&mut self, buffers: &[BufferHandle]) -> Result<()>;

    /// Sets the unpack block alignment used when the backend decodes a buffer's data.
    fn set_buffer_alignment(&mut self, buffer: BufferHandle, block_alignment: u32) -> Result<()>;

    /// Copies `data` into `buffer`, replacing its previous contents.
    fn submit(
        &mut self,
        buffer: BufferHandle,
        format: SampleFormat,
        data: &[u8],
        sample_rate: u32,
    ) -> Result<()>;

    fn enqueue(&mut self, voice: VoiceHandle, buffer: BufferHandle) -> Result<()>;

    /// Removes up to `count` fully consumed buffers from the front of the voice queue.
    fn dequeue_processed(&mut self, voice: VoiceHandle, count: usize)
    -> Result<Vec<BufferHandle>>;

    /// Buffers currently attached to the voice, processed ones included.
    fn queued_count(&self, voice: VoiceHandle) -> Result<usize>;

    fn processed_count(&self, voice: VoiceHandle) -> Result<usize>;

    fn set_voice_param(&mut self, voice: VoiceHandle, param: VoiceParam) -> Result<()>;

    fn set_distance_model(&mut self, model: DistanceModel) -> Result<()>;

    fn play(&mut self, voice: VoiceHandle) -> Result<()>;

    fn pause(&mut self, voice: VoiceHandle) -> Result<()>;

    fn stop(&mut self, voice: VoiceHandle) -> Result<()>;

    fn voice_state(&self, voice: VoiceHandle) -> Result<BackendVoiceState>;

    fn listener_position(&self) -> Result<Vec3>;

    /// `None` when the effect extension is unavailable.
    fn effect_slots(&self) -> Option<EffectSlots>;

    fn bind_auxiliary_send(&mut self, voice: VoiceHandle, send: AuxiliarySend) -> Result<()>;

    fn configure_filter(&mut self, filter: FilterHandle, params: FilterParams) -> Result<()>;

    fn set_direct_filter(&mut self, voice: VoiceHandle, filter: Option<FilterHandle>) -> Result<()>;
}

