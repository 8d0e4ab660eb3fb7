use crate::backend::Backend;
use crate::config::EngineDesc;
use crate::error::{Result, VoiceFeedError};
use crate::events::VoiceEvent;
use crate::playback::{PlayState, PlaybackSession, SoundSource};
use crate::pool::VoicePool;
use crate::spatial::{AudioEmitter, AudioListener};
use crossbeam_channel::{Receiver, Sender};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Unique identifier for a playback session.
///
/// Returned by [`VoiceWorld::create_session`] and used for every playback operation.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SessionId({})", self.0)
    }
}

/// Owns every playback session sharing one backend and one voice pool.
///
/// `VoiceWorld` is driven from a single loop: issue playback operations at any time,
/// then call [`update`](Self::update) once per frame to keep streams fed, and drain
/// [`poll_events`](Self::poll_events) to learn about starts, loops and stream ends.
pub struct VoiceWorld<B: Backend> {
    desc: EngineDesc,
    backend: Arc<Mutex<B>>,
    pool: Arc<VoicePool>,
    sessions: HashMap<SessionId, PlaybackSession<B>>,
    next_session_id: u64,
    listener: AudioListener,
    event_sender: Sender<VoiceEvent>,
    event_receiver: Receiver<VoiceEvent>,
}

impl<B: Backend> VoiceWorld<B> {
    /// Creates a world with its own pool of `desc.max_voices` voices.
    pub fn new(desc: EngineDesc, backend: B) -> Result<Self> {
        let pool = Arc::new(VoicePool::new(desc.max_voices));
        Self::with_pool(desc, Arc::new(Mutex::new(backend)), pool)
    }

    /// Creates a world over a backend and voice pool that may be shared with other worlds.
    pub fn with_pool(
        desc: EngineDesc,
        backend: Arc<Mutex<B>>,
        pool: Arc<VoicePool>,
    ) -> Result<Self> {
        desc.validate()?;
        let (event_sender, event_receiver) = crossbeam_channel::unbounded();
        log::info!(
            "VoiceWorld created ({} voices, {} buffers per stream)",
            pool.capacity(),
            desc.max_buffers
        );
        Ok(Self {
            desc,
            backend,
            pool,
            sessions: HashMap::new(),
            next_session_id: 0,
            listener: AudioListener::default(),
            event_sender,
            event_receiver,
        })
    }

    pub fn desc(&self) -> &EngineDesc {
        &self.desc
    }

    pub fn backend(&self) -> &Arc<Mutex<B>> {
        &self.backend
    }

    pub fn pool(&self) -> &Arc<VoicePool> {
        &self.pool
    }

    /// Registers a new stopped session for `source`. No voice is reserved until `play`.
    pub fn create_session(&mut self, source: SoundSource) -> SessionId {
        let id = SessionId(self.next_session_id);
        self.next_session_id += 1;

        let session = PlaybackSession::new(
            id,
            source,
            Arc::clone(&self.backend),
            Arc::clone(&self.pool),
            &self.desc,
        )
        .with_events(self.event_sender.clone());
        self.sessions.insert(id, session);
        log::debug!("Created session {}", id);
        id
    }

    pub fn session(&self, id: SessionId) -> Option<&PlaybackSession<B>> {
        self.sessions.get(&id)
    }

    pub fn session_mut(&mut self, id: SessionId) -> Option<&mut PlaybackSession<B>> {
        self.sessions.get_mut(&id)
    }

    pub fn session_ids(&self) -> Vec<SessionId> {
        self.sessions.keys().copied().collect()
    }

    pub fn contains_session(&self, id: SessionId) -> bool {
        self.sessions.contains_key(&id)
    }

    fn get_mut(&mut self, id: SessionId) -> Result<&mut PlaybackSession<B>> {
        self.sessions
            .get_mut(&id)
            .ok_or(VoiceFeedError::SessionNotFound(id))
    }

    /// Starts (or resumes) a session.
    ///
    /// # Errors
    ///
    /// Returns [`VoiceFeedError::SessionNotFound`] for an unknown id, and otherwise
    /// whatever [`PlaybackSession::play`] reports.
    pub fn play(&mut self, id: SessionId) -> Result<()> {
        self.get_mut(id)?.play()
    }

    pub fn pause(&mut self, id: SessionId) -> Result<()> {
        self.get_mut(id)?.pause()
    }

    pub fn resume(&mut self, id: SessionId) -> Result<()> {
        self.get_mut(id)?.resume()
    }

    pub fn stop(&mut self, id: SessionId, immediate: bool) -> Result<()> {
        self.get_mut(id)?.stop(immediate);
        Ok(())
    }

    pub fn state(&mut self, id: SessionId) -> Result<PlayState> {
        Ok(self.get_mut(id)?.state())
    }

    /// Stops every session that holds a voice.
    pub fn stop_all(&mut self) {
        for session in self.sessions.values_mut() {
            session.stop(true);
        }
    }

    /// Removes a session, stopping it first. Returns false if the id was unknown.
    pub fn remove_session(&mut self, id: SessionId) -> bool {
        match self.sessions.remove(&id) {
            Some(mut session) => {
                session.stop(true);
                log::debug!("Removed session {}", id);
                true
            }
            None => false,
        }
    }

    pub fn set_listener(&mut self, listener: AudioListener) {
        self.listener = listener;
    }

    pub fn listener(&self) -> AudioListener {
        self.listener
    }

    /// Positions a session's voice relative to the world listener.
    pub fn apply_3d(&mut self, id: SessionId, emitter: &AudioEmitter) -> Result<()> {
        let listener = self.listener;
        self.get_mut(id)?.apply_3d(&listener, emitter)
    }

    /// Refills every streaming session. Call once per frame.
    ///
    /// A failing session does not stop the others from being serviced; its error is
    /// logged and reported as [`VoiceEvent::BackendError`].
    pub fn update(&mut self) {
        for (id, session) in self.sessions.iter_mut() {
            if let Err(e) = session.push_if_needed() {
                log::error!("Failed to refill session {}: {}", id, e);
                // Receiver lives in self, send cannot fail
                let _ = self.event_sender.send(VoiceEvent::BackendError {
                    session_id: *id,
                    error: e.to_string(),
                });
            }
        }
    }

    /// Drains every event emitted since the last call.
    pub fn poll_events(&self) -> Vec<VoiceEvent> {
        self.event_receiver.try_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SimulatedBackend;
    use crate::format::{SampleFormat, StreamedSource};

    fn stream(size: usize) -> SoundSource {
        SoundSource::Streamed(Arc::new(
            StreamedSource::new(SampleFormat::Mono16, 22050, 1, vec![0u8; size]).unwrap(),
        ))
    }

    #[test]
    fn test_session_ids_are_unique() {
        let mut world = VoiceWorld::new(EngineDesc::default(), SimulatedBackend::new()).unwrap();
        let a = world.create_session(stream(64));
        let b = world.create_session(stream(64));
        assert_ne!(a, b);
        assert_eq!(world.session_ids().len(), 2);
    }

    #[test]
    fn test_unknown_session() {
        let mut world = VoiceWorld::new(EngineDesc::default(), SimulatedBackend::new()).unwrap();
        let missing = SessionId::new(42);
        assert_eq!(
            world.play(missing),
            Err(VoiceFeedError::SessionNotFound(missing))
        );
        assert!(!world.remove_session(missing));
    }

    #[test]
    fn test_invalid_desc_is_rejected() {
        let desc = EngineDesc::default().max_voices(0);
        assert!(VoiceWorld::new(desc, SimulatedBackend::new()).is_err());
    }

    #[test]
    fn test_events_are_collected() {
        let mut world = VoiceWorld::new(EngineDesc::default(), SimulatedBackend::new()).unwrap();
        let id = world.create_session(stream(64));
        world.play(id).unwrap();
        world.pause(id).unwrap();
        world.stop(id, true).unwrap();

        let events = world.poll_events();
        assert_eq!(
            events,
            vec![
                VoiceEvent::Started { session_id: id },
                VoiceEvent::Paused { session_id: id },
                VoiceEvent::Stopped { session_id: id },
            ]
        );
        assert!(world.poll_events().is_empty());
    }

    #[test]
    fn test_remove_session_frees_voice() {
        let desc = EngineDesc::default().max_voices(1);
        let mut world = VoiceWorld::new(desc, SimulatedBackend::new()).unwrap();
        let id = world.create_session(stream(64));
        world.play(id).unwrap();
        assert_eq!(world.pool().available(), 0);

        assert!(world.remove_session(id));
        assert_eq!(world.pool().available(), 1);
    }
}
