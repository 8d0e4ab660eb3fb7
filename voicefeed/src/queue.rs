//! Buffer queue management for streamed sources.
//!
//! A streaming voice owns a small ring of backend buffers. Every refill cycle takes the
//! buffers the backend has finished with, fills each one with the next chunk of the
//! stream and queues it again. Chunks are always truncated to the stream's alignment
//! unit so that every submission starts and ends on an encoder block boundary.

use crate::backend::{Backend, BufferHandle, VoiceHandle};
use crate::error::{Result, VoiceFeedError};
use crate::format::StreamedSource;

/// Backend buffer objects allocated per streaming session.
pub const MAX_BUFFERS: usize = 5;

/// Target number of bytes pushed into one buffer per refill.
pub const FILL_CHUNK_BYTES: usize = 131072;

/// What to submit next from a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkPlan {
    /// Submit `len` bytes starting at `offset`. `wrapped` is set when the cursor had to
    /// go back to the start of a looping stream first.
    Submit {
        offset: usize,
        len: usize,
        wrapped: bool,
    },
    /// No aligned bytes are left to submit.
    Exhausted,
}

/// Plans the next chunk for a stream of `total` bytes read at `cursor`.
///
/// `unit` must be non-zero.
pub fn plan_chunk(
    cursor: usize,
    total: usize,
    unit: usize,
    fill_chunk: usize,
    looping: bool,
) -> ChunkPlan {
    let align = |len: usize| len - len % unit;

    let len = align(fill_chunk.min(total.saturating_sub(cursor)));
    if len > 0 {
        return ChunkPlan::Submit {
            offset: cursor,
            len,
            wrapped: false,
        };
    }

    if !looping {
        return ChunkPlan::Exhausted;
    }

    match align(fill_chunk.min(total)) {
        0 => ChunkPlan::Exhausted,
        len => ChunkPlan::Submit {
            offset: 0,
            len,
            wrapped: true,
        },
    }
}

/// Why a refill cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefillStatus {
    /// Enough buffers were queued already; nothing was submitted.
    Throttled,
    /// Buffers were offered to the stream (possibly none were needed).
    Filled,
    /// The queue is empty and the stream has nothing left: the voice should stop.
    Drained,
}

/// Result of one refill cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefillOutcome {
    pub status: RefillStatus,
    /// Byte length of every chunk submitted this cycle, in order.
    pub chunks: Vec<usize>,
    /// Number of times the cursor wrapped back to the start.
    pub wraps: u32,
}

impl RefillOutcome {
    fn with_status(status: RefillStatus) -> Self {
        Self {
            status,
            chunks: Vec::new(),
            wraps: 0,
        }
    }

    pub fn bytes_submitted(&self) -> usize {
        self.chunks.iter().sum()
    }
}

/// Per-session buffer ring and stream cursor.
#[derive(Debug)]
pub struct BufferQueue {
    buffers: Vec<BufferHandle>,
    idle: Vec<BufferHandle>,
    cursor: usize,
    fill_chunk_bytes: usize,
    backpressure_queued: usize,
}

impl BufferQueue {
    pub fn new(fill_chunk_bytes: usize, backpressure_queued: usize) -> Self {
        Self {
            buffers: Vec::new(),
            idle: Vec::new(),
            cursor: 0,
            fill_chunk_bytes,
            backpressure_queued,
        }
    }

    pub fn fill_chunk_bytes(&self) -> usize {
        self.fill_chunk_bytes
    }

    /// Byte offset of the next submission.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn reset(&mut self) {
        self.cursor = 0;
        self.idle.clear();
    }

    /// Every backend buffer owned by this queue.
    pub fn buffers(&self) -> &[BufferHandle] {
        &self.buffers
    }

    /// Buffers that were handed back by the backend but not refilled yet.
    pub fn idle_buffers(&self) -> &[BufferHandle] {
        &self.idle
    }

    pub fn set_buffers(&mut self, buffers: Vec<BufferHandle>) {
        self.buffers = buffers;
        self.idle.clear();
    }

    /// Gives up ownership of every buffer, e.g. to release them on stop.
    pub fn take_buffers(&mut self) -> Vec<BufferHandle> {
        self.idle.clear();
        std::mem::take(&mut self.buffers)
    }

    /// Runs one refill cycle.
    ///
    /// `available` are buffers that just became free (freshly allocated or dequeued).
    /// Buffers left over from a throttled or exhausted cycle are offered first. On error
    /// every buffer that was not queued stays parked for the next cycle.
    pub fn refill<B: Backend + ?Sized>(
        &mut self,
        backend: &mut B,
        voice: VoiceHandle,
        source: &StreamedSource,
        available: &[BufferHandle],
        looping: bool,
    ) -> Result<RefillOutcome> {
        self.idle.extend_from_slice(available);

        if source.is_empty() {
            return Err(VoiceFeedError::InvalidStreamState(
                "refill requested for an empty stream".into(),
            ));
        }
        let unit = source.alignment_unit();
        if unit == 0 {
            return Err(VoiceFeedError::InvalidStreamState(
                "stream alignment unit is zero".into(),
            ));
        }

        let queued = backend.queued_count(voice)?;
        if queued > self.backpressure_queued {
            log::debug!(
                "{}: {} buffers queued, deferring refill of {} buffers",
                voice,
                queued,
                self.idle.len()
            );
            return Ok(RefillOutcome::with_status(RefillStatus::Throttled));
        }

        let total = source.total_size();
        if queued == 0
            && plan_chunk(self.cursor, total, unit, self.fill_chunk_bytes, looping)
                == ChunkPlan::Exhausted
        {
            log::debug!(
                "{}: queue drained at {}/{} bytes",
                voice,
                self.cursor,
                total
            );
            return Ok(RefillOutcome::with_status(RefillStatus::Drained));
        }

        let mut outcome = RefillOutcome::with_status(RefillStatus::Filled);
        let mut remaining = std::mem::take(&mut self.idle).into_iter();

        while let Some(buffer) = remaining.next() {
            let (offset, len) =
                match plan_chunk(self.cursor, total, unit, self.fill_chunk_bytes, looping) {
                    ChunkPlan::Submit {
                        offset,
                        len,
                        wrapped,
                    } => {
                        if wrapped {
                            log::debug!("{}: stream looped back to start", voice);
                            outcome.wraps += 1;
                        }
                        (offset, len)
                    }
                    ChunkPlan::Exhausted => {
                        self.idle.push(buffer);
                        break;
                    }
                };

            let data = &source.data()[offset..offset + len];
            if let Err(e) = backend.submit(buffer, source.format(), data, source.sample_rate()) {
                self.idle.push(buffer);
                self.idle.extend(remaining);
                return Err(e);
            }
            if let Err(e) = backend.enqueue(voice, buffer) {
                self.idle.push(buffer);
                self.idle.extend(remaining);
                return Err(e);
            }

            self.cursor = offset + len;
            outcome.chunks.push(len);
        }
        self.idle.extend(remaining);

        if !outcome.chunks.is_empty() {
            log::debug!(
                "{}: queued {} chunks ({} bytes), cursor {}/{}",
                voice,
                outcome.chunks.len(),
                outcome.bytes_submitted(),
                self.cursor,
                total
            );
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SimulatedBackend;
    use crate::format::SampleFormat;

    fn source(format: SampleFormat, block_alignment: u32, size: usize) -> StreamedSource {
        StreamedSource::new(format, 44100, block_alignment, vec![0u8; size]).unwrap()
    }

    #[test]
    fn test_plan_truncates_to_alignment() {
        assert_eq!(
            plan_chunk(0, 1000, 262, 600, false),
            ChunkPlan::Submit {
                offset: 0,
                len: 524,
                wrapped: false
            }
        );
        assert_eq!(
            plan_chunk(524, 1000, 262, 600, false),
            ChunkPlan::Submit {
                offset: 524,
                len: 262,
                wrapped: false
            }
        );
        // 214 bytes left, less than one unit
        assert_eq!(plan_chunk(786, 1000, 262, 600, false), ChunkPlan::Exhausted);
    }

    #[test]
    fn test_plan_wraps_when_looping() {
        assert_eq!(
            plan_chunk(1000, 1000, 4, 131072, true),
            ChunkPlan::Submit {
                offset: 0,
                len: 1000,
                wrapped: true
            }
        );
        assert_eq!(plan_chunk(0, 3, 4, 131072, true), ChunkPlan::Exhausted);
    }

    #[test]
    fn test_backpressure_defers_buffers() {
        let mut backend = SimulatedBackend::new();
        let voice = VoiceHandle(1);
        let stream = source(SampleFormat::Stereo16, 1, 1_000_000);
        let buffers = backend.allocate_buffers(MAX_BUFFERS).unwrap();

        let mut queue = BufferQueue::new(FILL_CHUNK_BYTES, 2);
        queue.set_buffers(buffers.clone());
        let outcome = queue
            .refill(&mut backend, voice, &stream, &buffers[..3], false)
            .unwrap();
        assert_eq!(outcome.chunks.len(), 3);

        let outcome = queue
            .refill(&mut backend, voice, &stream, &buffers[3..], false)
            .unwrap();
        assert_eq!(outcome.status, RefillStatus::Throttled);
        assert_eq!(queue.idle_buffers(), &buffers[3..]);
        assert_eq!(queue.cursor(), 3 * FILL_CHUNK_BYTES);
    }

    #[test]
    fn test_drained_when_queue_empty_and_stream_done() {
        let mut backend = SimulatedBackend::new();
        let voice = VoiceHandle(1);
        let stream = source(SampleFormat::Mono8, 1, 100);
        let buffers = backend.allocate_buffers(2).unwrap();

        let mut queue = BufferQueue::new(FILL_CHUNK_BYTES, 2);
        queue.set_buffers(buffers.clone());
        let outcome = queue
            .refill(&mut backend, voice, &stream, &buffers, false)
            .unwrap();
        assert_eq!(outcome.chunks, vec![100]);
        assert_eq!(queue.idle_buffers(), &buffers[1..]);

        backend.play(voice).unwrap();
        backend.consume_buffers(voice, 1);
        let done = backend.dequeue_processed(voice, 1).unwrap();
        let outcome = queue
            .refill(&mut backend, voice, &stream, &done, false)
            .unwrap();
        assert_eq!(outcome.status, RefillStatus::Drained);
        assert!(outcome.chunks.is_empty());
    }

    #[test]
    fn test_empty_stream_is_rejected() {
        let mut backend = SimulatedBackend::new();
        let stream = source(SampleFormat::Mono16, 1, 0);
        let mut queue = BufferQueue::new(FILL_CHUNK_BYTES, 2);
        let result = queue.refill(&mut backend, VoiceHandle(1), &stream, &[], false);
        assert!(matches!(result, Err(VoiceFeedError::InvalidStreamState(_))));
    }

    #[test]
    fn test_failed_queue_query_keeps_buffers() {
        let mut backend = SimulatedBackend::new();
        let voice = VoiceHandle(1);
        let stream = source(SampleFormat::Mono8, 1, 100);
        let buffers = backend.allocate_buffers(3).unwrap();

        let mut queue = BufferQueue::new(FILL_CHUNK_BYTES, 2);
        queue.set_buffers(buffers.clone());
        queue
            .refill(&mut backend, voice, &stream, &buffers[..1], false)
            .unwrap();

        backend.fail_call("queued_count");
        let result = queue.refill(&mut backend, voice, &stream, &buffers[1..], false);
        assert!(matches!(result, Err(VoiceFeedError::BackendCallFailed(_))));
        assert_eq!(queue.idle_buffers(), &buffers[1..]);
    }

    #[test]
    fn test_failed_submit_keeps_buffers() {
        let mut backend = SimulatedBackend::new();
        let voice = VoiceHandle(1);
        let stream = source(SampleFormat::Stereo16, 1, 1_000_000);
        let buffers = backend.allocate_buffers(3).unwrap();
        backend.fail_call("submit");

        let mut queue = BufferQueue::new(FILL_CHUNK_BYTES, 2);
        queue.set_buffers(buffers.clone());
        let result = queue.refill(&mut backend, voice, &stream, &buffers, false);
        assert!(matches!(result, Err(VoiceFeedError::BackendCallFailed(_))));
        assert_eq!(queue.idle_buffers().len(), 3);
        assert_eq!(queue.cursor(), 0);
    }
}
