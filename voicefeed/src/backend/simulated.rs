//! Headless backend that models an OpenAL-style voice queue in software.
//!
//! No audio is produced. Voices consume their queued buffers only when told to via
//! [`SimulatedBackend::advance`] or [`SimulatedBackend::consume_buffers`], which makes
//! refill behavior fully deterministic. Every mutating call is recorded so callers can
//! assert on exactly what was issued.

use super::{
    AuxiliarySend, Backend, BackendVoiceState, BufferHandle, DistanceModel, EffectSlots,
    FilterHandle, VoiceHandle, VoiceParam,
};
use crate::effects::FilterParams;
use crate::error::{Result, VoiceFeedError};
use crate::format::{SampleFormat, alignment_unit};
use crate::math::Vec3;
use std::collections::{HashMap, HashSet, VecDeque};

/// A mutating call issued against the [`SimulatedBackend`].
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    AllocateBuffers(usize),
    ReleaseBuffers(Vec<BufferHandle>),
    SetBufferAlignment(BufferHandle, u32),
    Submit { buffer: BufferHandle, len: usize },
    Enqueue(VoiceHandle, BufferHandle),
    DequeueProcessed(VoiceHandle, usize),
    SetVoiceParam(VoiceHandle, VoiceParam),
    SetDistanceModel(DistanceModel),
    Play(VoiceHandle),
    Pause(VoiceHandle),
    Stop(VoiceHandle),
    BindAuxiliarySend(VoiceHandle, AuxiliarySend),
    ConfigureFilter(FilterHandle, FilterParams),
    SetDirectFilter(VoiceHandle, Option<FilterHandle>),
}

#[derive(Debug, Clone, Default)]
struct SimulatedBuffer {
    len: usize,
    block_alignment: u32,
}

/// Software model of one voice.
#[derive(Debug, Clone)]
pub struct SimulatedVoice {
    pub state: BackendVoiceState,
    pub queue: VecDeque<BufferHandle>,
    /// Buffers at the front of `queue` that have been fully played
    pub processed: usize,
    /// Bytes consumed from the buffer currently playing
    pub offset: usize,
    pub gain: f32,
    pub pitch: f32,
    pub position: Vec3,
    pub velocity: Vec3,
    pub looping: bool,
    pub aux_send: AuxiliarySend,
    pub direct_filter: Option<FilterHandle>,
}

impl Default for SimulatedVoice {
    fn default() -> Self {
        Self {
            state: BackendVoiceState::Initial,
            queue: VecDeque::new(),
            processed: 0,
            offset: 0,
            gain: 1.0,
            pitch: 1.0,
            position: Vec3::ZERO,
            velocity: Vec3::ZERO,
            looping: false,
            aux_send: AuxiliarySend::dry(),
            direct_filter: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct SimulatedBackend {
    buffers: HashMap<BufferHandle, SimulatedBuffer>,
    next_buffer: u32,
    voices: HashMap<VoiceHandle, SimulatedVoice>,
    listener_position: Vec3,
    distance_model: DistanceModel,
    effects: Option<EffectSlots>,
    filters: HashMap<FilterHandle, FilterParams>,
    failing: HashSet<&'static str>,
    calls: Vec<BackendCall>,
}

impl SimulatedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exposes effect objects, as a backend with an initialized effect extension would.
    pub fn with_effects(mut self, effects: EffectSlots) -> Self {
        self.effects = Some(effects);
        self
    }

    pub fn set_listener_position(&mut self, position: Vec3) {
        self.listener_position = position;
    }

    /// Makes every subsequent call named `call` fail (e.g. `"submit"`, `"set_voice_param"`).
    pub fn fail_call(&mut self, call: &'static str) {
        self.failing.insert(call);
    }

    pub fn clear_failures(&mut self) {
        self.failing.clear();
    }

    pub fn calls(&self) -> &[BackendCall] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    pub fn count_calls(&self, predicate: impl Fn(&BackendCall) -> bool) -> usize {
        self.calls.iter().filter(|call| predicate(call)).count()
    }

    /// Length of every submitted chunk, in submission order.
    pub fn submitted_chunks(&self) -> Vec<usize> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                BackendCall::Submit { len, .. } => Some(*len),
                _ => None,
            })
            .collect()
    }

    pub fn voice(&self, voice: VoiceHandle) -> Option<&SimulatedVoice> {
        self.voices.get(&voice)
    }

    /// Number of buffer objects currently allocated.
    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn distance_model(&self) -> DistanceModel {
        self.distance_model
    }

    pub fn filter_params(&self, filter: FilterHandle) -> Option<FilterParams> {
        self.filters.get(&filter).copied()
    }

    /// Plays `bytes` worth of queued data on a playing voice.
    ///
    /// Buffers that are fully consumed become processed. A voice that runs out of
    /// queued data stops, unless it is looping natively.
    pub fn advance(&mut self, voice: VoiceHandle, mut bytes: usize) {
        let buffers = &self.buffers;
        let Some(state) = self.voices.get_mut(&voice) else {
            return;
        };
        if state.state != BackendVoiceState::Playing {
            return;
        }

        let queue_bytes: usize = state
            .queue
            .iter()
            .map(|b| buffers.get(b).map_or(0, |b| b.len))
            .sum();

        while bytes > 0 && state.processed < state.queue.len() {
            let len = buffers
                .get(&state.queue[state.processed])
                .map_or(0, |b| b.len);
            let take = bytes.min(len - state.offset.min(len));
            state.offset += take;
            bytes -= take;

            if state.offset >= len {
                state.processed += 1;
                state.offset = 0;
                if state.looping && state.processed == state.queue.len() && queue_bytes > 0 {
                    state.processed = 0;
                }
            }
        }

        if state.processed == state.queue.len() {
            log::debug!("Simulated {} ran out of data", voice);
            state.state = BackendVoiceState::Stopped;
        }
    }

    /// Marks the next `count` queued buffers of a playing voice as fully played.
    pub fn consume_buffers(&mut self, voice: VoiceHandle, count: usize) {
        let Some(state) = self.voices.get_mut(&voice) else {
            return;
        };
        if state.state != BackendVoiceState::Playing {
            return;
        }
        state.processed = (state.processed + count).min(state.queue.len());
        state.offset = 0;
        if state.processed == state.queue.len() {
            state.state = BackendVoiceState::Stopped;
        }
    }

    fn check(&self, call: &'static str) -> Result<()> {
        if self.failing.contains(call) {
            return Err(VoiceFeedError::backend(call, "simulated driver error"));
        }
        Ok(())
    }

    fn voice_mut(&mut self, voice: VoiceHandle) -> &mut SimulatedVoice {
        self.voices.entry(voice).or_default()
    }
}

impl Backend for SimulatedBackend {
    fn allocate_buffers(&mut self, count: usize) -> Result<Vec<BufferHandle>> {
        self.check("allocate_buffers")?;
        self.calls.push(BackendCall::AllocateBuffers(count));

        let handles: Vec<BufferHandle> = (0..count)
            .map(|_| {
                self.next_buffer += 1;
                BufferHandle(self.next_buffer)
            })
            .collect();
        for handle in &handles {
            self.buffers.insert(*handle, SimulatedBuffer::default());
        }
        Ok(handles)
    }

    fn release_buffers(&mut self, buffers: &[BufferHandle]) -> Result<()> {
        self.check("release_buffers")?;
        for buffer in buffers {
            if self.voices.values().any(|v| v.queue.contains(buffer)) {
                return Err(VoiceFeedError::backend(
                    "release_buffers",
                    format!("{} is still attached to a voice", buffer),
                ));
            }
        }
        self.calls.push(BackendCall::ReleaseBuffers(buffers.to_vec()));
        for buffer in buffers {
            self.buffers.remove(buffer);
        }
        Ok(())
    }

    fn set_buffer_alignment(&mut self, buffer: BufferHandle, block_alignment: u32) -> Result<()> {
        self.check("set_buffer_alignment")?;
        let entry = self
            .buffers
            .get_mut(&buffer)
            .ok_or_else(|| VoiceFeedError::backend("set_buffer_alignment", "unknown buffer"))?;
        entry.block_alignment = block_alignment;
        self.calls
            .push(BackendCall::SetBufferAlignment(buffer, block_alignment));
        Ok(())
    }

    fn submit(
        &mut self,
        buffer: BufferHandle,
        format: SampleFormat,
        data: &[u8],
        sample_rate: u32,
    ) -> Result<()> {
        self.check("submit")?;
        if sample_rate == 0 {
            return Err(VoiceFeedError::backend("submit", "sample rate is zero"));
        }
        let entry = self
            .buffers
            .get_mut(&buffer)
            .ok_or_else(|| VoiceFeedError::backend("submit", "unknown buffer"))?;

        if !format.is_adpcm() || entry.block_alignment > 0 {
            let unit = alignment_unit(format, format.channels(), entry.block_alignment)
                .ok_or_else(|| VoiceFeedError::backend("submit", "unpack unit overflows"))?;
            if data.len() % unit != 0 {
                return Err(VoiceFeedError::backend(
                    "submit",
                    format!(
                        "{} bytes is not a multiple of the {} byte unpack unit",
                        data.len(),
                        unit
                    ),
                ));
            }
        }

        entry.len = data.len();
        self.calls.push(BackendCall::Submit {
            buffer,
            len: data.len(),
        });
        Ok(())
    }

    fn enqueue(&mut self, voice: VoiceHandle, buffer: BufferHandle) -> Result<()> {
        self.check("enqueue")?;
        if !self.buffers.contains_key(&buffer) {
            return Err(VoiceFeedError::backend("enqueue", "unknown buffer"));
        }
        self.voice_mut(voice).queue.push_back(buffer);
        self.calls.push(BackendCall::Enqueue(voice, buffer));
        Ok(())
    }

    fn dequeue_processed(
        &mut self,
        voice: VoiceHandle,
        count: usize,
    ) -> Result<Vec<BufferHandle>> {
        self.check("dequeue_processed")?;
        let state = self.voice_mut(voice);
        if count > state.processed {
            return Err(VoiceFeedError::backend(
                "dequeue_processed",
                format!("only {} buffers are processed", state.processed),
            ));
        }
        let buffers: Vec<BufferHandle> = state.queue.drain(..count).collect();
        state.processed -= count;
        self.calls.push(BackendCall::DequeueProcessed(voice, count));
        Ok(buffers)
    }

    fn queued_count(&self, voice: VoiceHandle) -> Result<usize> {
        self.check("queued_count")?;
        Ok(self.voices.get(&voice).map_or(0, |v| v.queue.len()))
    }

    fn processed_count(&self, voice: VoiceHandle) -> Result<usize> {
        self.check("processed_count")?;
        Ok(self.voices.get(&voice).map_or(0, |v| v.processed))
    }

    fn set_voice_param(&mut self, voice: VoiceHandle, param: VoiceParam) -> Result<()> {
        self.check("set_voice_param")?;
        let buffer_known = match param {
            VoiceParam::Buffer(Some(buffer)) => self.buffers.contains_key(&buffer),
            _ => true,
        };
        let state = self.voice_mut(voice);
        match param {
            VoiceParam::Gain(gain) => state.gain = gain,
            VoiceParam::Pitch(pitch) => state.pitch = pitch,
            VoiceParam::Position(position) => state.position = position,
            VoiceParam::Velocity(velocity) => state.velocity = velocity,
            VoiceParam::Looping(looping) => state.looping = looping,
            VoiceParam::Buffer(buffer) => {
                if matches!(
                    state.state,
                    BackendVoiceState::Playing | BackendVoiceState::Paused
                ) {
                    return Err(VoiceFeedError::backend(
                        "set_voice_param",
                        "cannot change the buffer binding of an active voice",
                    ));
                }
                if !buffer_known {
                    return Err(VoiceFeedError::backend("set_voice_param", "unknown buffer"));
                }
                state.queue.clear();
                state.queue.extend(buffer);
                state.processed = 0;
                state.offset = 0;
            }
        }
        self.calls.push(BackendCall::SetVoiceParam(voice, param));
        Ok(())
    }

    fn set_distance_model(&mut self, model: DistanceModel) -> Result<()> {
        self.check("set_distance_model")?;
        self.distance_model = model;
        self.calls.push(BackendCall::SetDistanceModel(model));
        Ok(())
    }

    fn play(&mut self, voice: VoiceHandle) -> Result<()> {
        self.check("play")?;
        let state = self.voice_mut(voice);
        if state.state != BackendVoiceState::Paused {
            state.processed = 0;
            state.offset = 0;
        }
        state.state = if state.queue.is_empty() {
            BackendVoiceState::Stopped
        } else {
            BackendVoiceState::Playing
        };
        self.calls.push(BackendCall::Play(voice));
        Ok(())
    }

    fn pause(&mut self, voice: VoiceHandle) -> Result<()> {
        self.check("pause")?;
        let state = self.voice_mut(voice);
        if state.state == BackendVoiceState::Playing {
            state.state = BackendVoiceState::Paused;
        }
        self.calls.push(BackendCall::Pause(voice));
        Ok(())
    }

    fn stop(&mut self, voice: VoiceHandle) -> Result<()> {
        self.check("stop")?;
        let state = self.voice_mut(voice);
        state.state = BackendVoiceState::Stopped;
        state.processed = state.queue.len();
        state.offset = 0;
        self.calls.push(BackendCall::Stop(voice));
        Ok(())
    }

    fn voice_state(&self, voice: VoiceHandle) -> Result<BackendVoiceState> {
        self.check("voice_state")?;
        Ok(self
            .voices
            .get(&voice)
            .map_or(BackendVoiceState::Initial, |v| v.state))
    }

    fn listener_position(&self) -> Result<Vec3> {
        self.check("listener_position")?;
        Ok(self.listener_position)
    }

    fn effect_slots(&self) -> Option<EffectSlots> {
        self.effects
    }

    fn bind_auxiliary_send(&mut self, voice: VoiceHandle, send: AuxiliarySend) -> Result<()> {
        self.check("bind_auxiliary_send")?;
        self.voice_mut(voice).aux_send = send;
        self.calls.push(BackendCall::BindAuxiliarySend(voice, send));
        Ok(())
    }

    fn configure_filter(&mut self, filter: FilterHandle, params: FilterParams) -> Result<()> {
        self.check("configure_filter")?;
        self.filters.insert(filter, params);
        self.calls.push(BackendCall::ConfigureFilter(filter, params));
        Ok(())
    }

    fn set_direct_filter(&mut self, voice: VoiceHandle, filter: Option<FilterHandle>) -> Result<()> {
        self.check("set_direct_filter")?;
        self.voice_mut(voice).direct_filter = filter;
        self.calls.push(BackendCall::SetDirectFilter(voice, filter));
        Ok(())
    }
}
