use std::io::Write;

use tracing::{debug, info};

use crate::core::{
    CompressionLevel, EncodedStream, FrameIndex, MacError, MacResult, StreamInfo, WaveFormat,
    CODEC_VERSION, MAX_BLOCKS_PER_FRAME,
};

use super::frame::FrameCompressor;

/// stream encoder: cuts PCM into frames and keeps the frame table
pub struct Encoder<W: Write> {
    format: WaveFormat,
    level: CompressionLevel,
    blocks_per_frame: u32,
    custom_frame_size: bool,
    compressor: FrameCompressor<W>,
    frames: Vec<FrameIndex>,
    total_blocks: u64,
    short_frame_seen: bool,
}

impl<W: Write> Encoder<W> {
    pub fn new(sink: W, format: WaveFormat) -> MacResult<Self> {
        let level = CompressionLevel::default();
        Ok(Encoder {
            format,
            level,
            blocks_per_frame: level.blocks_per_frame(),
            custom_frame_size: false,
            compressor: FrameCompressor::new(sink, format, level)?,
            frames: Vec::new(),
            total_blocks: 0,
            short_frame_seen: false,
        })
    }

    /// pick the level, only before the first frame
    pub fn with_level(mut self, level: CompressionLevel) -> MacResult<Self> {
        self.ensure_not_started("the level")?;
        self.compressor.set_level(level)?;
        self.level = level;
        if !self.custom_frame_size {
            self.blocks_per_frame = level.blocks_per_frame();
        }
        Ok(self)
    }

    /// override the level's frame size, only before the first frame
    pub fn with_blocks_per_frame(mut self, blocks: u32) -> MacResult<Self> {
        self.ensure_not_started("the frame size")?;
        if blocks == 0 || blocks > MAX_BLOCKS_PER_FRAME {
            return Err(MacError::InvalidInput(format!(
                "{} blocks per frame is outside 1..={}",
                blocks, MAX_BLOCKS_PER_FRAME
            )));
        }
        self.blocks_per_frame = blocks;
        self.custom_frame_size = true;
        Ok(self)
    }

    fn ensure_not_started(&self, what: &str) -> MacResult<()> {
        if self.frames.is_empty() && !self.compressor.is_poisoned() {
            Ok(())
        } else {
            Err(MacError::InvalidInput(format!(
                "{} cannot change once frames were written",
                what
            )))
        }
    }

    pub fn format(&self) -> WaveFormat {
        self.format
    }

    pub fn level(&self) -> CompressionLevel {
        self.level
    }

    pub fn blocks_per_frame(&self) -> u32 {
        self.blocks_per_frame
    }

    pub fn frames(&self) -> &[FrameIndex] {
        &self.frames
    }

    pub fn total_blocks(&self) -> u64 {
        self.total_blocks
    }

    /// the sink holding every byte committed so far
    pub fn sink_mut(&mut self) -> &mut W {
        self.compressor.sink_mut()
    }

    /// bytes needed for one full frame
    pub fn frame_bytes(&self) -> usize {
        self.blocks_per_frame as usize * self.format.block_align()
    }

    /// encode one frame; only the last frame of a stream may be short
    pub fn encode_frame(&mut self, pcm: &[u8]) -> MacResult<FrameIndex> {
        let block_align = self.format.block_align();
        if pcm.is_empty() || pcm.len() % block_align != 0 {
            return Err(MacError::InvalidInput(format!(
                "frame of {} bytes is not a whole, non-zero number of {}-byte blocks",
                pcm.len(),
                block_align
            )));
        }
        let blocks = pcm.len() / block_align;
        if blocks > self.blocks_per_frame as usize {
            return Err(MacError::InvalidInput(format!(
                "frame of {} blocks exceeds the frame size of {}",
                blocks, self.blocks_per_frame
            )));
        }
        if self.short_frame_seen {
            return Err(MacError::InvalidInput(
                "a short frame was already written, it must be the last one".into(),
            ));
        }

        let summary = self.compressor.compress_frame(pcm)?;
        if summary.blocks < self.blocks_per_frame {
            self.short_frame_seen = true;
        }

        let index = FrameIndex {
            offset: summary.offset,
            blocks: summary.blocks,
        };
        self.frames.push(index);
        self.total_blocks += summary.blocks as u64;
        Ok(index)
    }

    /// encode a run of PCM, frame by frame
    pub fn encode(&mut self, pcm: &[u8]) -> MacResult<()> {
        let frame_bytes = self.frame_bytes();
        for chunk in pcm.chunks(frame_bytes) {
            self.encode_frame(chunk)?;
        }
        Ok(())
    }

    /// finish the stream, returning the sink and the stream info
    pub fn finish(self) -> MacResult<(W, StreamInfo)> {
        let peak_level = self.compressor.peak();
        let (sink, md5, compressed_bytes) = self.compressor.finish()?;

        let info = StreamInfo {
            version: CODEC_VERSION.to_string(),
            format: self.format,
            level: self.level,
            blocks_per_frame: self.blocks_per_frame,
            total_blocks: self.total_blocks,
            frames: self.frames,
            peak_level,
            md5,
            compressed_bytes,
        };
        info!(
            frames = info.frames.len(),
            blocks = info.total_blocks,
            bytes = compressed_bytes,
            peak = peak_level,
            "stream finished"
        );
        Ok((sink, info))
    }
}

impl Encoder<Vec<u8>> {
    /// in-memory encoder
    pub fn in_memory(format: WaveFormat) -> MacResult<Self> {
        Encoder::new(Vec::new(), format)
    }

    pub fn finish_stream(self) -> MacResult<EncodedStream> {
        let (data, info) = self.finish()?;
        debug!(bytes = data.len(), "in-memory stream ready");
        Ok(EncodedStream { data, info })
    }
}
