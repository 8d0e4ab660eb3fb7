//! Shared pool of hardware voices.

use crate::backend::VoiceHandle;
use crate::error::{Result, VoiceFeedError};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Hands out exclusive voices to playback sessions.
///
/// The pool is shared by every session (usually behind an `Arc`) and serializes
/// `reserve`/`free` internally, so sessions driven from different threads can use it.
#[derive(Debug)]
pub struct VoicePool {
    capacity: usize,
    free: Mutex<VecDeque<VoiceHandle>>,
}

impl VoicePool {
    /// Creates a pool of `capacity` voices numbered from 1.
    pub fn new(capacity: usize) -> Self {
        Self::from_handles((1..=capacity as u32).map(VoiceHandle))
    }

    /// Creates a pool over voices the backend already generated.
    pub fn from_handles(handles: impl IntoIterator<Item = VoiceHandle>) -> Self {
        let free: VecDeque<VoiceHandle> = handles.into_iter().collect();
        log::debug!("Created voice pool with {} voices", free.len());
        Self {
            capacity: free.len(),
            free: Mutex::new(free),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of voices currently free.
    pub fn available(&self) -> usize {
        self.lock().len()
    }

    pub fn in_use(&self) -> usize {
        self.capacity - self.available()
    }

    /// Reserves a voice for exclusive use.
    ///
    /// # Errors
    ///
    /// Returns [`VoiceFeedError::PoolExhausted`] when every voice is taken.
    pub fn reserve(&self) -> Result<VoiceHandle> {
        let voice = self
            .lock()
            .pop_front()
            .ok_or(VoiceFeedError::PoolExhausted(self.capacity))?;
        log::debug!("Reserved {} ({} left)", voice, self.available());
        Ok(voice)
    }

    /// Returns a voice to the pool. Freeing a voice that is already free is ignored.
    pub fn free(&self, voice: VoiceHandle) {
        let mut free = self.lock();
        if free.contains(&voice) {
            log::warn!("{} returned to the pool twice, ignoring", voice);
            return;
        }
        free.push_back(voice);
        log::debug!("Freed {} ({} available)", voice, free.len());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<VoiceHandle>> {
        self.free
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_reserve_until_exhausted() {
        let pool = VoicePool::new(2);
        assert_eq!(pool.reserve(), Ok(VoiceHandle(1)));
        assert_eq!(pool.reserve(), Ok(VoiceHandle(2)));
        assert_eq!(pool.reserve(), Err(VoiceFeedError::PoolExhausted(2)));
        assert_eq!(pool.in_use(), 2);
    }

    #[test]
    fn test_free_makes_voice_available_again() {
        let pool = VoicePool::new(1);
        let voice = pool.reserve().unwrap();
        pool.free(voice);
        pool.free(voice);
        assert_eq!(pool.available(), 1);
        assert_eq!(pool.reserve(), Ok(voice));
    }

    #[test]
    fn test_concurrent_reservations_are_exclusive() {
        let pool = Arc::new(VoicePool::new(64));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = pool.clone();
                std::thread::spawn(move || {
                    (0..8)
                        .map(|_| pool.reserve().unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut voices: Vec<VoiceHandle> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        voices.sort();
        voices.dedup();
        assert_eq!(voices.len(), 64);
        assert_eq!(pool.available(), 0);
    }
}
