//! One frame through the whole pipeline
//!
//! Layout of a frame, starting on a byte boundary:
//!
//! | Field          | Size    | Notes                                      |
//! |----------------|---------|--------------------------------------------|
//! | crc            | 4 bytes | CRC32 >> 1, bit 31 set if special follows  |
//! | special codes  | 4 bytes | only when non-zero                         |
//! | coded values   | ...     | range coded, Y then X per block for stereo |
//! | coder tail     | 5+ bytes| pending bytes plus decoder lookahead       |

use std::io::Write;

use tracing::{debug, warn};

use crate::core::crc32::frame_checksum;
use crate::core::range_coder::{KState, RangeDecoder, RangeEncoder};
use crate::core::{
    CompressionLevel, MacError, MacResult, SpecialCodes, WaveFormat, MAX_BLOCKS_PER_FRAME,
};

use super::predictor::Predictor;
use super::prepare::{prepare, unprepare};

const SPECIAL_FLAG: u32 = 0x8000_0000;

/// what the caller needs to know about a compressed frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSummary {
    pub offset: u64,
    pub blocks: u32,
    pub special: SpecialCodes,
    pub peak: u32,
}

pub struct FrameCompressor<W: Write> {
    format: WaveFormat,
    level: CompressionLevel,
    coder: RangeEncoder<W>,
    predictor_x: Predictor,
    predictor_y: Predictor,
    state_x: KState,
    state_y: KState,
    peak: u32,
    poisoned: bool,
}

impl<W: Write> FrameCompressor<W> {
    pub fn new(sink: W, format: WaveFormat, level: CompressionLevel) -> MacResult<Self> {
        format.validate()?;
        Ok(FrameCompressor {
            format,
            level,
            coder: RangeEncoder::new(sink),
            predictor_x: Predictor::new(level),
            predictor_y: Predictor::new(level),
            state_x: KState::new(),
            state_y: KState::new(),
            peak: 0,
            poisoned: false,
        })
    }

    pub fn format(&self) -> WaveFormat {
        self.format
    }

    pub fn level(&self) -> CompressionLevel {
        self.level
    }

    /// switch levels before the first frame, a stream has one level
    pub fn set_level(&mut self, level: CompressionLevel) -> MacResult<()> {
        if self.coder.position() > 0 {
            return Err(MacError::InvalidInput(format!(
                "cannot switch to level {} after frames were written at {}",
                level, self.level
            )));
        }
        self.level = level;
        self.predictor_x = Predictor::new(level);
        self.predictor_y = Predictor::new(level);
        Ok(())
    }

    /// running peak magnitude over every frame so far
    pub fn peak(&self) -> u32 {
        self.peak
    }

    pub fn position(&self) -> u64 {
        self.coder.position()
    }

    pub fn sink_mut(&mut self) -> &mut W {
        self.coder.sink_mut()
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// compress one frame of interleaved PCM
    ///
    /// A failure leaves a partial frame in the output, so the compressor
    /// refuses further frames afterwards.
    pub fn compress_frame(&mut self, pcm: &[u8]) -> MacResult<FrameSummary> {
        if self.poisoned {
            return Err(MacError::Poisoned);
        }
        let result = self.compress_frame_inner(pcm);
        if matches!(
            result,
            Err(MacError::ResidualOutOfRange { .. }) | Err(MacError::Io(_))
        ) {
            self.poisoned = true;
        }
        result
    }

    fn compress_frame_inner(&mut self, pcm: &[u8]) -> MacResult<FrameSummary> {
        let frame = prepare(pcm, &self.format)?;
        if frame.blocks() == 0 {
            return Err(MacError::InvalidInput("empty frame".into()));
        }

        self.coder.align();
        let offset = self.coder.position();

        let special = frame.special;
        if special.is_empty() {
            self.coder.encode_u32(frame.crc)?;
        } else {
            self.coder.encode_u32(frame.crc | SPECIAL_FLAG)?;
            self.coder.encode_u32(special.bits())?;
        }

        self.predictor_x.flush();
        self.predictor_y.flush();
        self.state_x.flush();
        self.state_y.flush();
        self.coder.start();

        if self.format.is_stereo() {
            if special.contains(SpecialCodes::LEFT_SILENCE)
                && special.contains(SpecialCodes::RIGHT_SILENCE)
            {
                // nothing to code
            } else if special.contains(SpecialCodes::PSEUDO_STEREO) {
                for &x in &frame.x {
                    let residual = self.predictor_x.compress(x, 0);
                    self.coder.encode_value(residual, &mut self.state_x)?;
                }
            } else {
                let mut last_x = 0;
                for (&x, &y) in frame.x.iter().zip(&frame.y) {
                    let residual = self.predictor_y.compress(y, last_x);
                    self.coder.encode_value(residual, &mut self.state_y)?;
                    let residual = self.predictor_x.compress(x, y);
                    self.coder.encode_value(residual, &mut self.state_x)?;
                    last_x = x;
                }
            }
        } else if !special.contains(SpecialCodes::MONO_SILENCE) {
            for &x in &frame.x {
                let residual = self.predictor_x.compress(x, 0);
                self.coder.encode_value(residual, &mut self.state_x)?;
            }
        }

        self.coder.finish_frame();
        self.coder.flush_words()?;
        self.peak = self.peak.max(frame.peak);

        let summary = FrameSummary {
            offset,
            blocks: frame.blocks() as u32,
            special,
            peak: frame.peak,
        };
        debug!(
            offset,
            blocks = summary.blocks,
            special = special.bits(),
            bytes = self.coder.position() - offset,
            "compressed frame"
        );
        Ok(summary)
    }

    /// flush the last word and hand back the sink with the output digest and size
    pub fn finish(self) -> MacResult<(W, [u8; 16], u64)> {
        self.coder.finish()
    }
}

pub struct FrameDecompressor {
    format: WaveFormat,
    level: CompressionLevel,
    /// frames claiming more blocks than this are refused
    max_blocks: u32,
    predictor_x: Predictor,
    predictor_y: Predictor,
    state_x: KState,
    state_y: KState,
}

impl FrameDecompressor {
    pub fn new(format: WaveFormat, level: CompressionLevel) -> MacResult<Self> {
        format.validate()?;
        Ok(FrameDecompressor {
            format,
            level,
            max_blocks: level.blocks_per_frame(),
            predictor_x: Predictor::new(level),
            predictor_y: Predictor::new(level),
            state_x: KState::new(),
            state_y: KState::new(),
        })
    }

    pub fn format(&self) -> WaveFormat {
        self.format
    }

    pub fn level(&self) -> CompressionLevel {
        self.level
    }

    pub fn max_blocks(&self) -> u32 {
        self.max_blocks
    }

    /// frame size the stream was written with, the level's default otherwise
    pub fn set_max_blocks(&mut self, blocks: u32) -> MacResult<()> {
        if blocks == 0 || blocks > MAX_BLOCKS_PER_FRAME {
            return Err(MacError::InvalidInput(format!(
                "{} blocks per frame is outside 1..={}",
                blocks, MAX_BLOCKS_PER_FRAME
            )));
        }
        self.max_blocks = blocks;
        Ok(())
    }

    /// decode `blocks` blocks starting at logical byte `offset`
    ///
    /// Returns the PCM and the position just past the frame. State is reset
    /// at the frame start, so any frame can be decoded on its own.
    pub fn decompress_frame(
        &mut self,
        data: &[u8],
        offset: u64,
        blocks: u32,
        frame_number: u32,
    ) -> MacResult<(Vec<u8>, u64)> {
        let offset = usize::try_from(offset)
            .ok()
            .filter(|&o| o < data.len())
            .ok_or_else(|| {
                MacError::InvalidInput(format!(
                    "frame {} starts at {} but the stream has {} bytes",
                    frame_number,
                    offset,
                    data.len()
                ))
            })?;
        if blocks == 0 || blocks > self.max_blocks {
            return Err(MacError::InvalidInput(format!(
                "frame {} claims {} blocks, expected 1..={}",
                frame_number, blocks, self.max_blocks
            )));
        }

        let mut coder = RangeDecoder::new(data, offset);
        let mut stored = coder.decode_u32();
        let special = if stored & SPECIAL_FLAG != 0 {
            SpecialCodes::from_bits(coder.decode_u32())
        } else {
            SpecialCodes::NONE
        };
        stored &= !SPECIAL_FLAG;

        self.predictor_x.flush();
        self.predictor_y.flush();
        self.state_x.flush();
        self.state_y.flush();
        coder.start();

        let blocks = blocks as usize;
        let mut x = Vec::with_capacity(blocks);
        let mut y = Vec::with_capacity(blocks);

        if self.format.is_stereo() {
            if special.contains(SpecialCodes::LEFT_SILENCE)
                && special.contains(SpecialCodes::RIGHT_SILENCE)
            {
                x.resize(blocks, 0);
                y.resize(blocks, 0);
            } else if special.contains(SpecialCodes::PSEUDO_STEREO) {
                for _ in 0..blocks {
                    let residual = coder.decode_value(&mut self.state_x);
                    x.push(self.predictor_x.decompress(residual, 0));
                }
                y.resize(blocks, 0);
            } else {
                let mut last_x = 0;
                for _ in 0..blocks {
                    let residual = coder.decode_value(&mut self.state_y);
                    let value_y = self.predictor_y.decompress(residual, last_x);
                    let residual = coder.decode_value(&mut self.state_x);
                    let value_x = self.predictor_x.decompress(residual, value_y);
                    x.push(value_x);
                    y.push(value_y);
                    last_x = value_x;
                }
            }
        } else if special.contains(SpecialCodes::MONO_SILENCE) {
            x.resize(blocks, 0);
        } else {
            for _ in 0..blocks {
                let residual = coder.decode_value(&mut self.state_x);
                x.push(self.predictor_x.decompress(residual, 0));
            }
        }
        coder.finish();

        let mut pcm = Vec::with_capacity(blocks * self.format.block_align());
        unprepare(&x, &y, &self.format, &mut pcm);

        let computed = frame_checksum(&pcm);
        if computed != stored {
            warn!(
                frame = frame_number,
                stored, computed, "frame failed its CRC check"
            );
            return Err(MacError::CrcMismatch {
                frame: frame_number,
                stored,
                computed,
            });
        }

        debug!(
            frame = frame_number,
            blocks,
            special = special.bits(),
            "decompressed frame"
        );
        Ok((pcm, coder.position() as u64))
    }
}
