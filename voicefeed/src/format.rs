//! Wire formats and the streamed source descriptor.

use crate::error::{Result, VoiceFeedError};
use std::sync::Arc;

/// Sample encoding of the bytes submitted to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleFormat {
    Mono8,
    Stereo8,
    Mono16,
    Stereo16,
    MonoFloat32,
    StereoFloat32,
    MonoMsAdpcm,
    StereoMsAdpcm,
}

impl SampleFormat {
    pub fn channels(&self) -> u32 {
        match self {
            Self::Mono8 | Self::Mono16 | Self::MonoFloat32 | Self::MonoMsAdpcm => 1,
            Self::Stereo8 | Self::Stereo16 | Self::StereoFloat32 | Self::StereoMsAdpcm => 2,
        }
    }

    pub fn is_adpcm(&self) -> bool {
        matches!(self, Self::MonoMsAdpcm | Self::StereoMsAdpcm)
    }

    /// Bytes per PCM sample; everything that is not 8 or 16 bit counts as 4.
    pub fn bytes_per_sample(&self) -> u32 {
        match self {
            Self::Mono8 | Self::Stereo8 => 1,
            Self::Mono16 | Self::Stereo16 => 2,
            _ => 4,
        }
    }
}

/// Largest block alignment a stream may declare (the WAV `nBlockAlign` field is 16 bits).
pub const MAX_BLOCK_ALIGNMENT: u32 = u16::MAX as u32;

/// Byte granularity every submission for a stream must respect.
///
/// ADPCM: `channels * ((block_alignment - 2) / 2 + 7)`.
/// PCM: `channels * bytes_per_sample * block_alignment`.
///
/// Returns `None` when the product does not fit in a `usize`.
pub fn alignment_unit(format: SampleFormat, channels: u32, block_alignment: u32) -> Option<usize> {
    let channels = channels as usize;
    let block_alignment = block_alignment as usize;
    if format.is_adpcm() {
        channels.checked_mul(block_alignment.saturating_sub(2) / 2 + 7)
    } else {
        channels
            .checked_mul(format.bytes_per_sample() as usize)?
            .checked_mul(block_alignment.max(1))
    }
}

/// Immutable description of an in-memory wire-format stream.
///
/// The total size does not have to be a multiple of the alignment unit; the queue
/// truncates every chunk to the unit instead.
#[derive(Debug, Clone)]
pub struct StreamedSource {
    format: SampleFormat,
    channels: u32,
    sample_rate: u32,
    block_alignment: u32,
    unit: usize,
    data: Arc<[u8]>,
}

impl StreamedSource {
    pub fn new(
        format: SampleFormat,
        sample_rate: u32,
        block_alignment: u32,
        data: impl Into<Arc<[u8]>>,
    ) -> Result<Self> {
        if sample_rate == 0 {
            return Err(VoiceFeedError::InvalidStreamState(
                "sample rate must be non-zero".into(),
            ));
        }
        if format.is_adpcm() && block_alignment < 2 {
            return Err(VoiceFeedError::InvalidStreamState(format!(
                "ADPCM block alignment must be at least 2, got {}",
                block_alignment
            )));
        }
        if block_alignment > MAX_BLOCK_ALIGNMENT {
            return Err(VoiceFeedError::InvalidStreamState(format!(
                "block alignment {} exceeds {}",
                block_alignment, MAX_BLOCK_ALIGNMENT
            )));
        }
        let channels = format.channels();
        let unit = alignment_unit(format, channels, block_alignment).ok_or_else(|| {
            VoiceFeedError::InvalidStreamState(format!(
                "alignment unit for block alignment {} overflows",
                block_alignment
            ))
        })?;

        Ok(Self {
            format,
            channels,
            sample_rate,
            block_alignment,
            unit,
            data: data.into(),
        })
    }

    pub fn format(&self) -> SampleFormat {
        self.format
    }

    pub fn channels(&self) -> u32 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Encoder block alignment as declared by the container (0 when unspecified).
    pub fn block_alignment(&self) -> u32 {
        self.block_alignment
    }

    pub fn total_size(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn alignment_unit(&self) -> usize {
        self.unit
    }
}
