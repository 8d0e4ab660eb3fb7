//! # VoiceFeed
//!
//! A per-voice streaming playback engine for OpenAL-style audio backends.
//!
//! VoiceFeed is the policy layer between a game's sound instances and a low-level voice
//! API: it maps each sound onto a pooled hardware voice, keeps streamed sources fed with
//! correctly aligned chunks, and drives play/pause/stop/loop, 3D placement and optional
//! reverb and filter effects. It never decodes, mixes or resamples audio.
//!
//! ## Quick Start
//!
//! ```no_run
//! use voicefeed::*;
//! use std::sync::Arc;
//!
//! let mut world = VoiceWorld::new(EngineDesc::default(), SimulatedBackend::new())?;
//!
//! // 16-bit stereo PCM already in wire format
//! let pcm = vec![0u8; 1_000_000];
//! let stream = StreamedSource::new(SampleFormat::Stereo16, 44100, 1, pcm)?;
//! let id = world.create_session(SoundSource::Streamed(Arc::new(stream)));
//!
//! world.play(id)?;
//!
//! // Once per frame
//! world.update();
//! for event in world.poll_events() {
//!     if let VoiceEvent::EndOfStream { session_id } = event {
//!         println!("{} finished", session_id);
//!     }
//! }
//! # Ok::<(), VoiceFeedError>(())
//! ```
//!
//! ## Key Components
//!
//! - **[`VoiceWorld`]**: Owns sessions, the shared backend and the voice pool
//! - **[`PlaybackSession`]**: State machine for one sound instance
//! - **[`BufferQueue`](queue::BufferQueue)**: Aligned chunk submission, backpressure and loop wraparound
//! - **[`Backend`]**: Primitive voice operations, implemented once per platform
//! - **[`VoicePool`]**: Finite set of hardware voices shared across sessions
//! - **[`VoiceEvent`]**: Start, pause, loop, end-of-stream and error notifications

pub mod backend;
pub mod config;
pub mod effects;
pub mod error;
pub mod events;
pub mod format;
pub mod math;
pub mod playback;
pub mod pool;
pub mod queue;
pub mod spatial;
pub mod world;

pub use backend::{
    AuxiliarySend, Backend, BackendCall, BackendVoiceState, BufferHandle, DistanceModel,
    EffectSlots, FilterHandle, SimulatedBackend, SlotHandle, VoiceHandle, VoiceParam,
};
pub use config::EngineDesc;
pub use effects::{FilterMode, FilterParams, FilterSpec};
pub use error::{Result, VoiceFeedError};
pub use events::VoiceEvent;
pub use format::{SampleFormat, StreamedSource};
pub use math::{Pose, Quat, Vec3};
pub use playback::{PlayState, PlaybackSession, SoundSource};
pub use pool::VoicePool;
pub use spatial::{AudioEmitter, AudioListener};
pub use world::{SessionId, VoiceWorld};
