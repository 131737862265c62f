use std::collections::VecDeque;
use std::ops::Range;

use tracing::trace;

use crate::core::{CompressionLevel, EncodedStream, MacError, MacResult, WaveFormat};
use crate::lossless::Encoder;

use super::types::EncodedFrame;

/// streaming encoder, takes PCM in any chunk size and hands out frames
/// as soon as they are full
pub struct StreamingEncoder {
    encoder: Encoder<Vec<u8>>,
    /// PCM waiting for a full frame
    pcm_buffer: Vec<u8>,
    /// frames ready for the caller, as spans of `output`
    pending_frames: VecDeque<PendingFrame>,
    /// every byte committed so far
    output: Vec<u8>,
}

struct PendingFrame {
    index: u32,
    offset: u64,
    blocks: u32,
    bytes: Range<usize>,
}

impl StreamingEncoder {
    pub fn new(format: WaveFormat) -> MacResult<Self> {
        Ok(Self {
            encoder: Encoder::in_memory(format)?,
            pcm_buffer: Vec::new(),
            pending_frames: VecDeque::new(),
            output: Vec::new(),
        })
    }

    /// set the level, only before the first frame is encoded
    pub fn with_level(mut self, level: CompressionLevel) -> MacResult<Self> {
        self.encoder = self.encoder.with_level(level)?;
        Ok(self)
    }

    pub fn with_blocks_per_frame(mut self, blocks: u32) -> MacResult<Self> {
        self.encoder = self.encoder.with_blocks_per_frame(blocks)?;
        Ok(self)
    }

    pub fn format(&self) -> WaveFormat {
        self.encoder.format()
    }

    pub fn level(&self) -> CompressionLevel {
        self.encoder.level()
    }

    /// push interleaved PCM, full frames are encoded right away
    pub fn push_pcm(&mut self, pcm: &[u8]) -> MacResult<()> {
        self.pcm_buffer.extend_from_slice(pcm);

        let frame_bytes = self.encoder.frame_bytes();
        while self.pcm_buffer.len() >= frame_bytes {
            let frame: Vec<u8> = self.pcm_buffer.drain(..frame_bytes).collect();
            self.encode_frame(&frame)?;
        }
        Ok(())
    }

    /// next encoded frame if any
    pub fn next_frame(&mut self) -> Option<EncodedFrame> {
        let frame = self.pending_frames.pop_front()?;
        Some(EncodedFrame {
            index: frame.index,
            offset: frame.offset,
            blocks: frame.blocks,
            data: self.output[frame.bytes].to_vec(),
        })
    }

    /// blocks waiting for a full frame
    pub fn pending_blocks(&self) -> usize {
        self.pcm_buffer.len() / self.format().block_align()
    }

    pub fn pending_frames(&self) -> usize {
        self.pending_frames.len()
    }

    /// encode whatever is buffered as a short last frame and close the stream
    pub fn finish(mut self) -> MacResult<EncodedStream> {
        if !self.pcm_buffer.is_empty() {
            if self.pcm_buffer.len() % self.format().block_align() != 0 {
                return Err(MacError::InvalidInput(format!(
                    "{} trailing bytes do not make a whole block",
                    self.pcm_buffer.len()
                )));
            }
            let frame = std::mem::take(&mut self.pcm_buffer);
            self.encode_frame(&frame)?;
        }

        let (tail, info) = self.encoder.finish()?;
        self.output.extend_from_slice(&tail);
        Ok(EncodedStream {
            data: self.output,
            info,
        })
    }

    fn encode_frame(&mut self, pcm: &[u8]) -> MacResult<()> {
        let index = self.encoder.encode_frame(pcm)?;
        let start = self.output.len();
        self.output.append(self.encoder.sink_mut());

        let number = (self.encoder.frames().len() - 1) as u32;
        trace!(frame = number, bytes = self.output.len() - start, "frame committed");
        self.pending_frames.push_back(PendingFrame {
            index: number,
            offset: index.offset,
            blocks: index.blocks,
            bytes: start..self.output.len(),
        });
        Ok(())
    }
}
