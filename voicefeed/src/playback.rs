//! Playback control and state management.
//!
//! This module provides the per-sound state machine:
//! - [`PlayState`]: Current playback state (playing, paused, stopped)
//! - [`SoundSource`]: What a session plays (a streamed source or a resident buffer)
//! - [`PlaybackSession`]: One sound instance mapped onto a pooled hardware voice
//!
//! A session only holds a voice between `play()` and `stop()` (or the natural end of a
//! non-looping stream). While it holds one, `push_if_needed()` must be called once per
//! frame so that streamed sources keep their buffer queue topped up.

use crate::backend::{
    AuxiliarySend, Backend, BackendVoiceState, BufferHandle, DistanceModel, EffectSlots,
    VoiceHandle, VoiceParam,
};
use crate::config::EngineDesc;
use crate::effects::{Deferred, FilterMode, FilterSpec};
use crate::error::{Result, VoiceFeedError};
use crate::events::VoiceEvent;
use crate::format::StreamedSource;
use crate::math::Vec3;
use crate::pool::VoicePool;
use crate::queue::{BufferQueue, RefillOutcome, RefillStatus};
use crate::spatial::{AudioEmitter, AudioListener, voice_placement};
use crate::world::SessionId;
use crossbeam_channel::Sender;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Represents the current playback state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayState {
    /// No voice is playing (initial state, and the state after a stream ends)
    #[default]
    Stopped,
    Playing,
    /// Playing position is retained on the voice
    Paused,
}

impl From<BackendVoiceState> for PlayState {
    fn from(state: BackendVoiceState) -> Self {
        match state {
            BackendVoiceState::Initial | BackendVoiceState::Stopped => Self::Stopped,
            BackendVoiceState::Paused => Self::Paused,
            BackendVoiceState::Playing => Self::Playing,
        }
    }
}

/// Audio a session plays.
#[derive(Debug, Clone)]
pub enum SoundSource {
    /// Fed incrementally through the session's buffer queue
    Streamed(Arc<StreamedSource>),
    /// A single buffer already uploaded to the backend; looping uses the voice's own flag
    Resident(BufferHandle),
}

impl SoundSource {
    pub fn is_streamed(&self) -> bool {
        matches!(self, Self::Streamed(_))
    }
}

/// Converts the application pitch range `[-1, 1]` into a backend pitch multiplier.
pub fn backend_pitch(pitch: f32) -> f32 {
    2f32.powf(pitch)
}

/// Voice position used to express stereo pan.
pub fn pan_position(pan: f32) -> Vec3 {
    Vec3::new(pan, 0.0, 0.1)
}

fn lock<B>(backend: &Mutex<B>) -> MutexGuard<'_, B> {
    backend.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One logical sound instance and the hardware voice it currently plays on.
pub struct PlaybackSession<B: Backend> {
    id: SessionId,
    source: SoundSource,
    backend: Arc<Mutex<B>>,
    pool: Arc<VoicePool>,
    events: Option<Sender<VoiceEvent>>,

    state: PlayState,
    voice: Option<VoiceHandle>,
    pause_depth: u32,
    looped: bool,
    loop_count: u32,
    volume: f32,
    pitch: f32,
    pan: f32,

    queue: BufferQueue,
    max_buffers: usize,
    distance_model: DistanceModel,
    filter_reference_hz: f32,

    reverb: Deferred<f32>,
    filter: Deferred<FilterSpec>,
}

impl<B: Backend> PlaybackSession<B> {
    pub fn new(
        id: SessionId,
        source: SoundSource,
        backend: Arc<Mutex<B>>,
        pool: Arc<VoicePool>,
        desc: &EngineDesc,
    ) -> Self {
        Self {
            id,
            source,
            backend,
            pool,
            events: None,
            state: PlayState::Stopped,
            voice: None,
            pause_depth: 0,
            looped: false,
            loop_count: 0,
            volume: 1.0,
            pitch: 0.0,
            pan: 0.0,
            queue: BufferQueue::new(desc.fill_chunk_bytes, desc.backpressure_queued),
            max_buffers: desc.max_buffers,
            distance_model: desc.distance_model,
            filter_reference_hz: desc.filter_reference_hz,
            reverb: Deferred::new(),
            filter: Deferred::new(),
        }
    }

    /// Routes this session's notifications into `sender`.
    pub fn with_events(mut self, sender: Sender<VoiceEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn source(&self) -> &SoundSource {
        &self.source
    }

    pub fn voice(&self) -> Option<VoiceHandle> {
        self.voice
    }

    pub fn has_voice(&self) -> bool {
        self.voice.is_some()
    }

    /// Last known state, without asking the backend.
    pub fn cached_state(&self) -> PlayState {
        self.state
    }

    pub fn pause_depth(&self) -> u32 {
        self.pause_depth
    }

    pub fn is_looped(&self) -> bool {
        self.looped
    }

    /// Times a looping stream has wrapped since the session was created.
    pub fn loop_count(&self) -> u32 {
        self.loop_count
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    pub fn pan(&self) -> f32 {
        self.pan
    }

    /// Byte offset of the next chunk to submit from a streamed source.
    pub fn cursor(&self) -> usize {
        self.queue.cursor()
    }

    pub fn buffers(&self) -> &[BufferHandle] {
        self.queue.buffers()
    }

    pub fn pending_reverb_mix(&self) -> Option<f32> {
        self.reverb.pending()
    }

    pub fn pending_filter(&self) -> Option<FilterSpec> {
        self.filter.pending()
    }

    /// Starts playback, reserving a voice from the pool if none is held.
    ///
    /// A paused session is resumed and a playing one is left alone. Otherwise a fresh
    /// voice is reserved, initial parameters and pending effects are pushed, the first
    /// batch of buffers is queued and the voice starts.
    ///
    /// # Errors
    ///
    /// - [`VoiceFeedError::PoolExhausted`] when no voice is free; the session stays
    ///   `Stopped` without a voice.
    /// - [`VoiceFeedError::InvalidStreamState`] for an empty stream.
    /// - [`VoiceFeedError::Configuration`] when `fill_chunk_bytes` cannot hold a single
    ///   alignment unit of the stream.
    /// - [`VoiceFeedError::BackendCallFailed`] when setting up the voice fails; the
    ///   voice is returned to the pool.
    pub fn play(&mut self) -> Result<()> {
        if self.voice.is_some() {
            match self.state() {
                PlayState::Playing => {
                    log::debug!("Session {} is already playing", self.id);
                    return Ok(());
                }
                PlayState::Paused => return self.resume(),
                PlayState::Stopped => {
                    log::debug!(
                        "Session {} voice stopped on its own, releasing before replay",
                        self.id
                    );
                    self.release_voice();
                }
            }
        }

        if let SoundSource::Streamed(stream) = &self.source {
            if stream.is_empty() {
                return Err(VoiceFeedError::InvalidStreamState(format!(
                    "session {} has an empty stream",
                    self.id
                )));
            }
            if self.queue.fill_chunk_bytes() < stream.alignment_unit() {
                return Err(VoiceFeedError::Configuration(format!(
                    "fill_chunk_bytes {} is smaller than the {} byte alignment unit of session {}",
                    self.queue.fill_chunk_bytes(),
                    stream.alignment_unit(),
                    self.id
                )));
            }
        }

        let voice = match self.pool.reserve() {
            Ok(voice) => voice,
            Err(e) => {
                log::warn!("Session {} could not play: {}", self.id, e);
                self.state = PlayState::Stopped;
                return Err(e);
            }
        };
        self.voice = Some(voice);
        self.pause_depth = 0;

        let shared = Arc::clone(&self.backend);
        let result = {
            let mut backend = lock(&shared);
            self.start_voice(&mut *backend, voice)
        };

        match result {
            Ok(outcome) => {
                self.state = PlayState::Playing;
                log::info!(
                    "Session {} playing on {} (streamed: {}, looped: {})",
                    self.id,
                    voice,
                    self.source.is_streamed(),
                    self.looped
                );
                self.emit(VoiceEvent::Started {
                    session_id: self.id,
                });
                if let Some(outcome) = outcome {
                    self.note_refill(&outcome);
                }
                Ok(())
            }
            Err(e) => {
                log::error!("Session {} failed to start {}: {}", self.id, voice, e);
                self.release_voice();
                Err(e)
            }
        }
    }

    fn start_voice(
        &mut self,
        backend: &mut B,
        voice: VoiceHandle,
    ) -> Result<Option<RefillOutcome>> {
        let slots = backend.effect_slots();

        let outcome = match self.source.clone() {
            SoundSource::Streamed(stream) => {
                self.queue.reset();
                let buffers = backend.allocate_buffers(self.max_buffers)?;
                self.queue.set_buffers(buffers.clone());

                backend.set_voice_param(voice, VoiceParam::Buffer(None))?;
                if stream.block_alignment() > 0 {
                    for buffer in &buffers {
                        backend.set_buffer_alignment(*buffer, stream.block_alignment())?;
                    }
                }

                self.push_initial_params(backend, voice, false)?;
                self.apply_pending_effects(backend, voice, slots)?;

                let outcome = self
                    .queue
                    .refill(backend, voice, &stream, &buffers, self.looped)?;
                if outcome.status == RefillStatus::Drained {
                    return Err(VoiceFeedError::InvalidStreamState(format!(
                        "stream of {} bytes holds no complete {} byte unit",
                        stream.total_size(),
                        stream.alignment_unit()
                    )));
                }
                Some(outcome)
            }
            SoundSource::Resident(buffer) => {
                backend.set_voice_param(voice, VoiceParam::Buffer(Some(buffer)))?;
                self.push_initial_params(backend, voice, true)?;
                self.apply_pending_effects(backend, voice, slots)?;
                None
            }
        };

        backend.play(voice)?;
        Ok(outcome)
    }

    fn push_initial_params(&self, backend: &mut B, voice: VoiceHandle, resident: bool) -> Result<()> {
        backend.set_distance_model(self.distance_model)?;
        backend.set_voice_param(voice, VoiceParam::Position(pan_position(self.pan)))?;
        backend.set_voice_param(voice, VoiceParam::Gain(self.volume))?;
        // Streamed sources loop through the buffer queue instead
        if resident {
            backend.set_voice_param(voice, VoiceParam::Looping(self.looped))?;
        }
        backend.set_voice_param(voice, VoiceParam::Pitch(backend_pitch(self.pitch)))?;
        Ok(())
    }

    fn apply_pending_effects(
        &self,
        backend: &mut B,
        voice: VoiceHandle,
        slots: Option<EffectSlots>,
    ) -> Result<()> {
        let Some(slots) = slots else {
            return Ok(());
        };
        apply_reverb(backend, voice, slots, self.reverb.pending())?;
        apply_filter(
            backend,
            voice,
            slots,
            self.filter.pending(),
            self.filter_reference_hz,
        )
    }

    /// Pauses a playing voice.
    ///
    /// No-op without a voice or when not `Playing`. Only the first pause of a nested
    /// sequence reaches the backend.
    pub fn pause(&mut self) -> Result<()> {
        let Some(voice) = self.voice else {
            return Ok(());
        };
        if self.state != PlayState::Playing {
            return Ok(());
        }

        if self.pause_depth == 0 {
            lock(&self.backend).pause(voice)?;
        }
        self.pause_depth += 1;
        self.state = PlayState::Paused;
        log::debug!(
            "Session {} paused (depth {}) at byte {}",
            self.id,
            self.pause_depth,
            self.queue.cursor()
        );
        self.emit(VoiceEvent::Paused {
            session_id: self.id,
        });
        Ok(())
    }

    /// Resumes a paused voice, or starts playback when no voice was ever reserved.
    ///
    /// The backend is only resumed once the pause depth returns to zero, but the
    /// session reports `Playing` after every call.
    pub fn resume(&mut self) -> Result<()> {
        let Some(voice) = self.voice else {
            return self.play();
        };

        let was_paused = self.state == PlayState::Paused;
        if was_paused {
            self.pause_depth = self.pause_depth.saturating_sub(1);
            if self.pause_depth == 0 {
                lock(&self.backend).play(voice)?;
            }
        }
        self.state = PlayState::Playing;

        if was_paused {
            log::debug!(
                "Session {} resumed (depth {})",
                self.id,
                self.pause_depth
            );
            self.emit(VoiceEvent::Resumed {
                session_id: self.id,
            });
        }
        Ok(())
    }

    /// Stops playback and returns the voice to the pool.
    ///
    /// Safe from any state. Cleanup is best-effort: backend failures are logged and
    /// reported as [`VoiceEvent::BackendError`], but the session always ends `Stopped`
    /// without a voice.
    pub fn stop(&mut self, immediate: bool) {
        if self.voice.is_none() {
            self.state = PlayState::Stopped;
            return;
        }

        log::debug!("Session {} stopping (immediate: {})", self.id, immediate);
        self.release_voice();
        self.emit(VoiceEvent::Stopped {
            session_id: self.id,
        });
    }

    fn release_voice(&mut self) {
        self.state = PlayState::Stopped;
        self.pause_depth = 0;
        let Some(voice) = self.voice.take() else {
            return;
        };

        let mut failures = Vec::new();
        {
            let shared = Arc::clone(&self.backend);
            let mut backend = lock(&shared);

            if let Err(e) = backend.stop(voice) {
                failures.push(e);
            }
            // The voice goes back to the pool; do not leak effects to its next user
            if backend.effect_slots().is_some() {
                if let Err(e) = backend.bind_auxiliary_send(voice, AuxiliarySend::dry()) {
                    failures.push(e);
                }
                if let Err(e) = backend.set_direct_filter(voice, None) {
                    failures.push(e);
                }
            }
            if !self.source.is_streamed() && self.looped {
                if let Err(e) = backend.set_voice_param(voice, VoiceParam::Looping(false)) {
                    failures.push(e);
                }
            }
            if let Err(e) = backend.set_voice_param(voice, VoiceParam::Buffer(None)) {
                failures.push(e);
            }
            let buffers = self.queue.take_buffers();
            if !buffers.is_empty() {
                if let Err(e) = backend.release_buffers(&buffers) {
                    failures.push(e);
                }
            }
        }

        self.pool.free(voice);
        log::info!("Session {} released {}", self.id, voice);

        for e in failures {
            log::error!("Session {} cleanup of {} failed: {}", self.id, voice, e);
            self.report(e);
        }
    }

    /// Queries the backend for the live state of the voice.
    ///
    /// Always `Stopped` without a voice. When the query fails the last known state is
    /// returned.
    pub fn state(&mut self) -> PlayState {
        let Some(voice) = self.voice else {
            return PlayState::Stopped;
        };

        match lock(&self.backend).voice_state(voice) {
            Ok(state) => self.state = state.into(),
            Err(e) => log::warn!("Session {} state query failed: {}", self.id, e),
        }
        self.state
    }

    /// Refills the voice's buffer queue from the streamed source.
    ///
    /// Call once per frame. Does nothing for resident sources, without a voice, or
    /// while paused. Buffers the backend reports as processed are dequeued and
    /// refilled; a drained non-looping stream stops the session and emits
    /// [`VoiceEvent::EndOfStream`]. A voice that ran dry while data was still coming
    /// is restarted.
    pub fn push_if_needed(&mut self) -> Result<()> {
        let SoundSource::Streamed(stream) = &self.source else {
            return Ok(());
        };
        let stream = Arc::clone(stream);
        let Some(voice) = self.voice else {
            return Ok(());
        };
        if self.state == PlayState::Paused {
            return Ok(());
        }

        let shared = Arc::clone(&self.backend);
        let outcome = {
            let mut backend = lock(&shared);

            let processed = backend.processed_count(voice)?;
            if processed == 0 && self.queue.idle_buffers().is_empty() {
                return Ok(());
            }
            let freed = if processed > 0 {
                backend.dequeue_processed(voice, processed)?
            } else {
                Vec::new()
            };

            let outcome = self
                .queue
                .refill(&mut *backend, voice, &stream, &freed, self.looped)?;

            if !outcome.chunks.is_empty()
                && matches!(
                    backend.voice_state(voice)?,
                    BackendVoiceState::Initial | BackendVoiceState::Stopped
                )
            {
                log::warn!(
                    "Session {} underrun on {}, restarting voice",
                    self.id,
                    voice
                );
                backend.play(voice)?;
                self.state = PlayState::Playing;
            }
            outcome
        };

        self.note_refill(&outcome);

        if outcome.status == RefillStatus::Drained {
            log::info!("Session {} reached end of stream", self.id);
            self.release_voice();
            self.emit(VoiceEvent::EndOfStream {
                session_id: self.id,
            });
        }
        Ok(())
    }

    fn note_refill(&mut self, outcome: &RefillOutcome) {
        for _ in 0..outcome.wraps {
            self.loop_count += 1;
            self.emit(VoiceEvent::Looped {
                session_id: self.id,
                loop_count: self.loop_count,
            });
        }
    }

    /// Sets the gain; pushed to the voice immediately when one is held.
    pub fn set_volume(&mut self, volume: f32) -> Result<()> {
        self.volume = volume;
        self.update_voice(VoiceParam::Gain(volume))
    }

    /// Sets the pitch in the application range `[-1, 1]`.
    pub fn set_pitch(&mut self, pitch: f32) -> Result<()> {
        self.pitch = pitch;
        self.update_voice(VoiceParam::Pitch(backend_pitch(pitch)))
    }

    pub fn set_pan(&mut self, pan: f32) -> Result<()> {
        self.pan = pan;
        self.update_voice(VoiceParam::Position(pan_position(pan)))
    }

    /// Sets whether the sound loops.
    ///
    /// Streamed sources pick the change up on their next refill; resident sources
    /// update the voice's own loop flag.
    pub fn set_looped(&mut self, looped: bool) -> Result<()> {
        self.looped = looped;
        if self.source.is_streamed() {
            return Ok(());
        }
        self.update_voice(VoiceParam::Looping(looped))
    }

    fn update_voice(&mut self, param: VoiceParam) -> Result<()> {
        let Some(voice) = self.voice else {
            return Ok(());
        };
        let result = lock(&self.backend).set_voice_param(voice, param);
        if let Err(e) = &result {
            log::warn!("Session {} failed to update {:?}: {}", self.id, param, e);
            self.report(e.clone());
        }
        result
    }

    /// Places the voice so that `emitter` is heard from `listener`.
    ///
    /// Must be called again whenever either of them moves.
    pub fn apply_3d(&mut self, listener: &AudioListener, emitter: &AudioEmitter) -> Result<()> {
        let Some(voice) = self.voice else {
            return Ok(());
        };
        let result = place_voice(&mut *lock(&self.backend), voice, listener, emitter);
        if let Err(e) = &result {
            log::warn!("Session {} failed to apply 3D: {}", self.id, e);
            self.report(e.clone());
        }
        result
    }

    /// Sets the reverb send level.
    ///
    /// While playing the send is applied immediately and the value is then forgotten;
    /// otherwise it is applied by the next `play()`.
    pub fn set_reverb_mix(&mut self, mix: f32) -> Result<()> {
        let Some(slots) = lock(&self.backend).effect_slots() else {
            log::debug!("Session {}: effects unavailable, ignoring reverb", self.id);
            return Ok(());
        };

        self.reverb.set(mix);
        if self.state() != PlayState::Playing {
            return Ok(());
        }
        let Some(voice) = self.voice else {
            return Ok(());
        };

        let mix = self.reverb.take();
        let result = apply_reverb(&mut *lock(&self.backend), voice, slots, mix);
        if let Err(e) = &result {
            self.report(e.clone());
        }
        result
    }

    /// Sets the direct filter.
    ///
    /// While playing the filter is applied immediately and no longer pending;
    /// otherwise it is applied by the next `play()`.
    pub fn set_filter(&mut self, mode: FilterMode, q: f32, frequency: f32) -> Result<()> {
        let Some(slots) = lock(&self.backend).effect_slots() else {
            log::debug!("Session {}: effects unavailable, ignoring filter", self.id);
            return Ok(());
        };

        self.filter.set(FilterSpec::new(mode, q, frequency));
        if self.state() != PlayState::Playing {
            return Ok(());
        }
        let Some(voice) = self.voice else {
            return Ok(());
        };

        let spec = self.filter.take();
        let result = apply_filter(
            &mut *lock(&self.backend),
            voice,
            slots,
            spec,
            self.filter_reference_hz,
        );
        if let Err(e) = &result {
            self.report(e.clone());
        }
        result
    }

    /// Drops a pending filter.
    ///
    /// A filter that is already attached to the voice stays attached until the voice
    /// is stopped.
    pub fn clear_filter(&mut self) {
        if lock(&self.backend).effect_slots().is_none() {
            return;
        }
        self.filter.clear();
    }

    fn report(&self, error: VoiceFeedError) {
        self.emit(VoiceEvent::BackendError {
            session_id: self.id,
            error: error.to_string(),
        });
    }

    fn emit(&self, event: VoiceEvent) {
        if let Some(sender) = &self.events {
            if sender.send(event).is_err() {
                log::debug!("Session {} event receiver dropped", self.id);
            }
        }
    }
}

impl<B: Backend> Drop for PlaybackSession<B> {
    fn drop(&mut self) {
        if self.voice.is_some() {
            self.release_voice();
        }
    }
}

fn place_voice<B: Backend + ?Sized>(
    backend: &mut B,
    voice: VoiceHandle,
    listener: &AudioListener,
    emitter: &AudioEmitter,
) -> Result<()> {
    let origin = backend.listener_position()?;
    let (position, velocity) = voice_placement(origin, listener, emitter);
    backend.set_voice_param(voice, VoiceParam::Position(position))?;
    backend.set_voice_param(voice, VoiceParam::Velocity(velocity))
}

fn apply_reverb<B: Backend + ?Sized>(
    backend: &mut B,
    voice: VoiceHandle,
    slots: EffectSlots,
    mix: Option<f32>,
) -> Result<()> {
    if let (Some(mix), Some(slot)) = (mix, slots.reverb_slot) {
        if mix > 0.0 {
            backend.bind_auxiliary_send(voice, AuxiliarySend::to_slot(slot))?;
        }
    }
    Ok(())
}

fn apply_filter<B: Backend + ?Sized>(
    backend: &mut B,
    voice: VoiceHandle,
    slots: EffectSlots,
    spec: Option<FilterSpec>,
    reference_hz: f32,
) -> Result<()> {
    if let (Some(spec), Some(filter)) = (spec, slots.filter) {
        backend.configure_filter(filter, spec.params(reference_hz))?;
        backend.set_direct_filter(voice, Some(filter))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendCall, FilterHandle, SimulatedBackend, SlotHandle};
    use crate::format::SampleFormat;

    fn session(
        source: SoundSource,
        backend: SimulatedBackend,
        voices: usize,
    ) -> (PlaybackSession<SimulatedBackend>, Arc<Mutex<SimulatedBackend>>, Arc<VoicePool>) {
        let backend = Arc::new(Mutex::new(backend));
        let pool = Arc::new(VoicePool::new(voices));
        let session = PlaybackSession::new(
            SessionId::new(1),
            source,
            backend.clone(),
            pool.clone(),
            &EngineDesc::default(),
        );
        (session, backend, pool)
    }

    fn streamed(size: usize) -> SoundSource {
        SoundSource::Streamed(Arc::new(
            StreamedSource::new(SampleFormat::Stereo16, 44100, 1, vec![0u8; size]).unwrap(),
        ))
    }

    fn effects() -> EffectSlots {
        EffectSlots {
            reverb_slot: Some(SlotHandle(7)),
            filter: Some(FilterHandle(9)),
        }
    }

    #[test]
    fn test_play_pushes_initial_params_in_order() {
        let (mut session, backend, _pool) = session(streamed(1_000_000), SimulatedBackend::new(), 1);
        session.set_pan(-0.5).unwrap();
        session.set_volume(0.8).unwrap();
        session.set_pitch(1.0).unwrap();
        session.play().unwrap();

        let backend = backend.lock().unwrap();
        let voice = session.voice().unwrap();
        let params: Vec<VoiceParam> = backend
            .calls()
            .iter()
            .filter_map(|c| match c {
                BackendCall::SetVoiceParam(_, p) => Some(*p),
                _ => None,
            })
            .collect();
        assert_eq!(
            params,
            vec![
                VoiceParam::Buffer(None),
                VoiceParam::Position(Vec3::new(-0.5, 0.0, 0.1)),
                VoiceParam::Gain(0.8),
                VoiceParam::Pitch(2.0),
            ]
        );
        assert_eq!(backend.count_calls(|c| matches!(c, BackendCall::Play(_))), 1);
        assert_eq!(backend.queued_count(voice), Ok(5));
        assert_eq!(session.cursor(), 5 * 131072);
    }

    #[test]
    fn test_resident_source_loops_on_voice() {
        let mut sim = SimulatedBackend::new();
        let buffer = sim.allocate_buffers(1).unwrap()[0];
        sim.submit(buffer, SampleFormat::Mono16, &[0u8; 64], 22050)
            .unwrap();

        let (mut session, backend, _pool) = session(SoundSource::Resident(buffer), sim, 1);
        session.set_looped(true).unwrap();
        session.play().unwrap();

        let voice = session.voice().unwrap();
        {
            let backend = backend.lock().unwrap();
            assert!(backend.voice(voice).unwrap().looping);
            assert_eq!(
                backend.voice(voice).unwrap().queue.iter().copied().collect::<Vec<_>>(),
                vec![buffer]
            );
        }

        session.push_if_needed().unwrap();
        session.stop(true);

        let backend = backend.lock().unwrap();
        assert!(!backend.voice(voice).unwrap().looping);
        // Resident buffers belong to the caller
        assert_eq!(backend.live_buffers(), 1);
    }

    #[test]
    fn test_pool_exhausted_leaves_session_stopped() {
        let (mut first, backend, pool) = session(streamed(4096), SimulatedBackend::new(), 1);
        first.play().unwrap();

        let mut second = PlaybackSession::new(
            SessionId::new(2),
            streamed(4096),
            backend.clone(),
            pool.clone(),
            &EngineDesc::default(),
        );
        assert_eq!(second.play(), Err(VoiceFeedError::PoolExhausted(1)));
        assert!(!second.has_voice());
        assert_eq!(second.state(), PlayState::Stopped);

        first.stop(true);
        assert!(second.play().is_ok());
    }

    #[test]
    fn test_nested_pause_and_resume() {
        let (mut session, backend, _pool) = session(streamed(1_000_000), SimulatedBackend::new(), 1);
        session.play().unwrap();
        backend.lock().unwrap().clear_calls();

        session.pause().unwrap();
        session.pause().unwrap();
        session.resume().unwrap();
        session.resume().unwrap();

        let backend = backend.lock().unwrap();
        assert_eq!(backend.count_calls(|c| matches!(c, BackendCall::Pause(_))), 1);
        assert_eq!(backend.count_calls(|c| matches!(c, BackendCall::Play(_))), 1);
        assert_eq!(session.cached_state(), PlayState::Playing);
        assert_eq!(session.pause_depth(), 0);
    }

    #[test]
    fn test_resume_reports_playing_while_depth_remains() {
        // Known discrepancy: with a pause depth above one, resume reports Playing
        // although the backend voice is still paused.
        let (mut session, backend, _pool) = session(streamed(1_000_000), SimulatedBackend::new(), 1);
        session.play().unwrap();
        session.pause().unwrap();
        session.pause_depth = 2;

        session.resume().unwrap();
        assert_eq!(session.pause_depth(), 1);
        assert_eq!(session.cached_state(), PlayState::Playing);

        let voice = session.voice().unwrap();
        let live = backend.lock().unwrap().voice_state(voice).unwrap();
        assert_eq!(live, BackendVoiceState::Paused);
        assert_eq!(session.state(), PlayState::Paused);
    }

    #[test]
    fn test_resume_without_voice_plays() {
        let (mut session, _backend, _pool) = session(streamed(4096), SimulatedBackend::new(), 1);
        session.resume().unwrap();
        assert!(session.has_voice());
        assert_eq!(session.state(), PlayState::Playing);
    }

    #[test]
    fn test_stop_without_voice_makes_no_calls() {
        let (mut session, backend, _pool) = session(streamed(4096), SimulatedBackend::new(), 1);
        session.stop(true);
        session.stop(false);
        assert_eq!(session.state(), PlayState::Stopped);
        assert!(backend.lock().unwrap().calls().is_empty());
    }

    #[test]
    fn test_stop_cleanup_is_best_effort() {
        let (mut session, backend, pool) =
            session(streamed(1_000_000), SimulatedBackend::new().with_effects(effects()), 1);
        session.play().unwrap();
        backend.lock().unwrap().fail_call("bind_auxiliary_send");
        backend.lock().unwrap().fail_call("release_buffers");

        session.stop(true);
        assert!(!session.has_voice());
        assert_eq!(session.cached_state(), PlayState::Stopped);
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn test_stop_detaches_effects() {
        let (mut session, backend, _pool) =
            session(streamed(1_000_000), SimulatedBackend::new().with_effects(effects()), 1);
        session.set_reverb_mix(0.4).unwrap();
        session.play().unwrap();
        let voice = session.voice().unwrap();
        assert_eq!(
            backend.lock().unwrap().voice(voice).unwrap().aux_send,
            AuxiliarySend::to_slot(SlotHandle(7))
        );

        session.stop(true);
        let backend = backend.lock().unwrap();
        let state = backend.voice(voice).unwrap();
        assert_eq!(state.aux_send, AuxiliarySend::dry());
        assert_eq!(state.direct_filter, None);
        assert_eq!(backend.live_buffers(), 0);
    }

    #[test]
    fn test_reverb_set_while_playing_is_applied_once() {
        let (mut session, backend, _pool) =
            session(streamed(1_000_000), SimulatedBackend::new().with_effects(effects()), 1);
        session.play().unwrap();
        session.set_reverb_mix(0.6).unwrap();

        assert_eq!(session.pending_reverb_mix(), None);
        let binds = backend
            .lock()
            .unwrap()
            .count_calls(|c| matches!(c, BackendCall::BindAuxiliarySend(_, s) if s.slot.is_some()));
        assert_eq!(binds, 1);
    }

    #[test]
    fn test_filter_applied_on_play_and_cleared_pending() {
        let (mut session, backend, _pool) =
            session(streamed(1_000_000), SimulatedBackend::new().with_effects(effects()), 1);
        session.set_filter(FilterMode::BandPass, 1.0, 5000.0).unwrap();
        assert!(session.pending_filter().is_some());

        session.play().unwrap();
        {
            let backend = backend.lock().unwrap();
            let params = backend.filter_params(FilterHandle(9)).unwrap();
            assert_eq!(params.gain_hf, Some(0.25));
            assert_eq!(params.gain_lf, Some(0.75));
            let voice = session.voice().unwrap();
            assert_eq!(
                backend.voice(voice).unwrap().direct_filter,
                Some(FilterHandle(9))
            );
        }

        session.set_filter(FilterMode::LowPass, 1.0, 10000.0).unwrap();
        assert_eq!(session.pending_filter(), None);
    }

    #[test]
    fn test_clear_filter_keeps_applied_filter() {
        let (mut session, backend, _pool) =
            session(streamed(1_000_000), SimulatedBackend::new().with_effects(effects()), 1);
        session.play().unwrap();
        session.set_filter(FilterMode::LowPass, 1.0, 2000.0).unwrap();
        session.clear_filter();

        let voice = session.voice().unwrap();
        assert_eq!(
            backend.lock().unwrap().voice(voice).unwrap().direct_filter,
            Some(FilterHandle(9))
        );
    }

    #[test]
    fn test_effects_ignored_without_extension() {
        let (mut session, backend, _pool) = session(streamed(1_000_000), SimulatedBackend::new(), 1);
        session.set_reverb_mix(1.0).unwrap();
        session.set_filter(FilterMode::HighPass, 1.0, 1000.0).unwrap();
        assert_eq!(session.pending_reverb_mix(), None);
        assert_eq!(session.pending_filter(), None);

        session.play().unwrap();
        session.stop(true);
        let backend = backend.lock().unwrap();
        assert_eq!(
            backend.count_calls(|c| matches!(
                c,
                BackendCall::BindAuxiliarySend(..) | BackendCall::SetDirectFilter(..)
            )),
            0
        );
    }

    #[test]
    fn test_failed_parameter_update_keeps_playing() {
        let (mut session, backend, _pool) = session(streamed(1_000_000), SimulatedBackend::new(), 1);
        let (sender, receiver) = crossbeam_channel::unbounded();
        session.events = Some(sender);
        session.play().unwrap();

        backend.lock().unwrap().fail_call("set_voice_param");
        assert!(session.set_volume(0.3).is_err());
        assert_eq!(session.volume(), 0.3);
        assert_eq!(session.state(), PlayState::Playing);
        assert!(receiver.try_iter().any(|e| e.is_error()));
    }

    #[test]
    fn test_failed_setup_returns_voice() {
        let mut sim = SimulatedBackend::new();
        sim.fail_call("play");
        let (mut session, _backend, pool) = session(streamed(1_000_000), sim, 1);

        assert!(matches!(
            session.play(),
            Err(VoiceFeedError::BackendCallFailed(_))
        ));
        assert!(!session.has_voice());
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn test_apply_3d_writes_position_and_velocity() {
        let mut sim = SimulatedBackend::new();
        sim.set_listener_position(Vec3::new(0.0, 1.0, 0.0));
        let (mut session, backend, _pool) = session(streamed(1_000_000), sim, 1);

        let listener = AudioListener::default();
        let emitter = AudioEmitter::at(Vec3::new(3.0, 0.0, 0.0)).with_velocity(Vec3::Z);

        // Without a voice nothing is sent
        session.apply_3d(&listener, &emitter).unwrap();
        assert!(backend.lock().unwrap().calls().is_empty());

        session.play().unwrap();
        session.apply_3d(&listener, &emitter).unwrap();
        let voice = session.voice().unwrap();
        let backend = backend.lock().unwrap();
        let state = backend.voice(voice).unwrap();
        assert_eq!(state.position, Vec3::new(3.0, 1.0, 0.0));
        assert_eq!(state.velocity, Vec3::Z);
    }

    #[test]
    fn test_unalignable_stream_fails_to_start() {
        let source = SoundSource::Streamed(Arc::new(
            StreamedSource::new(SampleFormat::Stereo16, 44100, 1, vec![0u8; 3]).unwrap(),
        ));
        let (mut session, _backend, pool) = session(source, SimulatedBackend::new(), 1);
        assert!(matches!(
            session.play(),
            Err(VoiceFeedError::InvalidStreamState(_))
        ));
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn test_fill_chunk_smaller_than_unit_is_a_configuration_error() {
        let backend = Arc::new(Mutex::new(SimulatedBackend::new()));
        let pool = Arc::new(VoicePool::new(1));
        let source = SoundSource::Streamed(Arc::new(
            StreamedSource::new(SampleFormat::MonoMsAdpcm, 22050, 512, vec![0u8; 4096]).unwrap(),
        ));
        let mut session = PlaybackSession::new(
            SessionId::new(1),
            source,
            backend.clone(),
            pool.clone(),
            &EngineDesc::default().fill_chunk_bytes(200),
        );

        assert!(matches!(
            session.play(),
            Err(VoiceFeedError::Configuration(_))
        ));
        assert!(!session.has_voice());
        assert_eq!(pool.available(), 1);
        assert!(backend.lock().unwrap().calls().is_empty());
    }

    #[test]
    fn test_pitch_conversion() {
        assert_eq!(backend_pitch(0.0), 1.0);
        assert_eq!(backend_pitch(1.0), 2.0);
        assert_eq!(backend_pitch(-1.0), 0.5);
    }
}
