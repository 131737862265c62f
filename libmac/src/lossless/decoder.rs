use tracing::info;

use crate::core::{
    reserve_hint, CompressionLevel, EncodedStream, FrameIndex, MacError, MacResult, StreamInfo,
    WaveFormat,
};

use super::frame::FrameDecompressor;

/// stream decoder driven by a frame table
pub struct Decoder {
    decompressor: FrameDecompressor,
}

impl Decoder {
    /// decoder accepting frames up to the level's default size
    pub fn new(format: WaveFormat, level: CompressionLevel) -> MacResult<Self> {
        Ok(Decoder {
            decompressor: FrameDecompressor::new(format, level)?,
        })
    }

    /// decoder for a stream described by a sidecar, the table is checked first
    pub fn from_info(info: &StreamInfo) -> MacResult<Self> {
        info.validate()?;
        Decoder::new(info.format, info.level)?.with_blocks_per_frame(info.blocks_per_frame)
    }

    pub fn with_blocks_per_frame(mut self, blocks: u32) -> MacResult<Self> {
        self.decompressor.set_max_blocks(blocks)?;
        Ok(self)
    }

    pub fn format(&self) -> WaveFormat {
        self.decompressor.format()
    }

    pub fn level(&self) -> CompressionLevel {
        self.decompressor.level()
    }

    /// decode a single frame, seeking straight to its offset
    pub fn decode_frame(
        &mut self,
        data: &[u8],
        frame: &FrameIndex,
        frame_number: u32,
    ) -> MacResult<Vec<u8>> {
        let (pcm, _) =
            self.decompressor
                .decompress_frame(data, frame.offset, frame.blocks, frame_number)?;
        Ok(pcm)
    }

    /// decode every frame in order, stopping at the first bad one
    pub fn decode_stream(&mut self, data: &[u8], frames: &[FrameIndex]) -> MacResult<Vec<u8>> {
        let max_blocks = self.decompressor.max_blocks();
        if let Some(number) = frames.iter().position(|f| f.blocks > max_blocks) {
            return Err(MacError::InvalidInput(format!(
                "frame {} claims {} blocks, expected at most {}",
                number, frames[number].blocks, max_blocks
            )));
        }
        let total: u64 = frames.iter().map(|f| f.blocks as u64).sum();
        let total_bytes = total
            .checked_mul(self.format().block_align() as u64)
            .ok_or_else(|| MacError::InvalidInput("frame table is too large".into()))?;
        let mut pcm = Vec::with_capacity(reserve_hint(total_bytes, data.len() as u64));

        for (number, frame) in frames.iter().enumerate() {
            let number = u32::try_from(number)
                .map_err(|_| MacError::InvalidInput("too many frames".into()))?;
            pcm.extend_from_slice(&self.decode_frame(data, frame, number)?);
        }

        info!(frames = frames.len(), blocks = total, "stream decoded");
        Ok(pcm)
    }

    pub fn decode_encoded(&mut self, stream: &EncodedStream) -> MacResult<Vec<u8>> {
        self.decode_stream(&stream.data, &stream.info.frames)
    }
}
