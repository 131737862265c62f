//! common types for the codec core

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::{MacError, MacResult};

// constants

/// blocks per frame at levels below extra high
pub const BLOCKS_PER_FRAME: u32 = 73728;

/// largest frame the encoder writes or the decoder accepts
pub const MAX_BLOCKS_PER_FRAME: u32 = BLOCKS_PER_FRAME * 64;

/// decoded buffers are reserved up front to at most this many times the compressed size
const RESERVE_RATIO: u64 = 8;

/// codec version reported in stream summaries
pub const CODEC_VERSION: &str = env!("CARGO_PKG_VERSION");

// types

/// compression level, fixes the depth and order of the adaptive filter cascade
///
/// | Level     | Value | NN stages (order/shift)          |
/// |-----------|-------|----------------------------------|
/// | Fast      | 1000  | none                             |
/// | Normal    | 2000  | 16/11                            |
/// | High      | 3000  | 64/11                            |
/// | ExtraHigh | 4000  | 256/13, 32/10                    |
/// | Insane    | 5000  | 1280/15, 256/13, 16/11           |
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
#[repr(u16)]
pub enum CompressionLevel {
    Fast = 1000,
    #[default]
    Normal = 2000,
    High = 3000,
    ExtraHigh = 4000,
    Insane = 5000,
}

impl CompressionLevel {
    pub const ALL: [CompressionLevel; 5] = [
        CompressionLevel::Fast,
        CompressionLevel::Normal,
        CompressionLevel::High,
        CompressionLevel::ExtraHigh,
        CompressionLevel::Insane,
    ];

    pub fn value(self) -> u16 {
        self as u16
    }

    /// (order, shift) of each NN stage, in compression order
    pub fn nn_stages(self) -> &'static [(usize, u32)] {
        match self {
            CompressionLevel::Fast => &[],
            CompressionLevel::Normal => &[(16, 11)],
            CompressionLevel::High => &[(64, 11)],
            CompressionLevel::ExtraHigh => &[(256, 13), (32, 10)],
            CompressionLevel::Insane => &[(1280, 15), (256, 13), (16, 11)],
        }
    }

    /// default frame length for this level
    pub fn blocks_per_frame(self) -> u32 {
        match self {
            CompressionLevel::ExtraHigh => BLOCKS_PER_FRAME * 4,
            CompressionLevel::Insane => BLOCKS_PER_FRAME * 16,
            _ => BLOCKS_PER_FRAME,
        }
    }
}

impl TryFrom<u16> for CompressionLevel {
    type Error = MacError;

    fn try_from(value: u16) -> MacResult<Self> {
        match value {
            1000 => Ok(CompressionLevel::Fast),
            2000 => Ok(CompressionLevel::Normal),
            3000 => Ok(CompressionLevel::High),
            4000 => Ok(CompressionLevel::ExtraHigh),
            5000 => Ok(CompressionLevel::Insane),
            other => Err(MacError::UnsupportedCompressionLevel(other)),
        }
    }
}

impl FromStr for CompressionLevel {
    type Err = MacError;

    fn from_str(s: &str) -> MacResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "fast" => Ok(CompressionLevel::Fast),
            "normal" => Ok(CompressionLevel::Normal),
            "high" => Ok(CompressionLevel::High),
            "extra-high" | "extrahigh" | "extra_high" => Ok(CompressionLevel::ExtraHigh),
            "insane" => Ok(CompressionLevel::Insane),
            other => match other.parse::<u16>() {
                Ok(v) => CompressionLevel::try_from(v),
                Err(_) => Err(MacError::InvalidInput(format!(
                    "unknown compression level '{}'",
                    s
                ))),
            },
        }
    }
}

impl fmt::Display for CompressionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CompressionLevel::Fast => "fast",
            CompressionLevel::Normal => "normal",
            CompressionLevel::High => "high",
            CompressionLevel::ExtraHigh => "extra-high",
            CompressionLevel::Insane => "insane",
        };
        f.write_str(name)
    }
}

/// per-frame special codes, written after the frame CRC when non-zero
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SpecialCodes(u32);

impl SpecialCodes {
    pub const NONE: SpecialCodes = SpecialCodes(0);
    pub const MONO_SILENCE: SpecialCodes = SpecialCodes(1);
    pub const LEFT_SILENCE: SpecialCodes = SpecialCodes(1);
    pub const RIGHT_SILENCE: SpecialCodes = SpecialCodes(2);
    pub const PSEUDO_STEREO: SpecialCodes = SpecialCodes(4);

    pub fn from_bits(bits: u32) -> Self {
        SpecialCodes(bits)
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, other: SpecialCodes) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: SpecialCodes) {
        self.0 |= other.0;
    }
}

/// PCM layout of the samples handed to the codec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaveFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

impl WaveFormat {
    /// checked constructor, only 1-2 channels at 8, 16 or 24 bits are supported
    pub fn new(sample_rate: u32, channels: u16, bits_per_sample: u16) -> MacResult<Self> {
        let format = WaveFormat {
            sample_rate,
            channels,
            bits_per_sample,
        };
        format.validate()?;
        Ok(format)
    }

    pub fn validate(&self) -> MacResult<()> {
        if !(1..=2).contains(&self.channels) {
            return Err(MacError::UnsupportedFormat(format!(
                "{} channels (only mono and stereo are supported)",
                self.channels
            )));
        }
        if !matches!(self.bits_per_sample, 8 | 16 | 24) {
            return Err(MacError::UnsupportedFormat(format!(
                "{} bits per sample (expected 8, 16 or 24)",
                self.bits_per_sample
            )));
        }
        Ok(())
    }

    pub fn bytes_per_sample(&self) -> usize {
        self.bits_per_sample as usize / 8
    }

    /// bytes per multi-channel block
    pub fn block_align(&self) -> usize {
        self.bytes_per_sample() * self.channels as usize
    }

    pub fn is_stereo(&self) -> bool {
        self.channels == 2
    }
}

/// where a frame lives in the compressed stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameIndex {
    /// byte offset of the frame's first byte
    pub offset: u64,
    /// blocks (multi-channel samples) in the frame
    pub blocks: u32,
}

/// everything a container layer needs to store next to the compressed bytes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamInfo {
    pub version: String,
    pub format: WaveFormat,
    pub level: CompressionLevel,
    pub blocks_per_frame: u32,
    pub total_blocks: u64,
    pub frames: Vec<FrameIndex>,
    /// largest absolute sample value seen
    pub peak_level: u32,
    /// MD5 of the compressed bytes
    pub md5: [u8; 16],
    pub compressed_bytes: u64,
}

impl StreamInfo {
    pub fn md5_hex(&self) -> String {
        self.md5.iter().map(|b| format!("{:02x}", b)).collect()
    }

    pub fn uncompressed_bytes(&self) -> u64 {
        self.total_blocks
            .saturating_mul(self.format.block_align() as u64)
    }

    /// capacity to reserve for the decoded PCM
    ///
    /// Silence beats any ratio, so this is a starting size and the buffer
    /// may still grow.
    pub fn decoded_capacity(&self) -> usize {
        reserve_hint(self.uncompressed_bytes(), self.compressed_bytes)
    }

    /// check the frame table before any of it sizes a buffer
    pub fn validate(&self) -> MacResult<()> {
        self.format.validate()?;
        if self.blocks_per_frame == 0 || self.blocks_per_frame > MAX_BLOCKS_PER_FRAME {
            return Err(MacError::InvalidInput(format!(
                "{} blocks per frame is outside 1..={}",
                self.blocks_per_frame, MAX_BLOCKS_PER_FRAME
            )));
        }

        let mut total: u64 = 0;
        let mut previous: Option<u64> = None;
        for (number, frame) in self.frames.iter().enumerate() {
            if frame.blocks == 0 || frame.blocks > self.blocks_per_frame {
                return Err(MacError::InvalidInput(format!(
                    "frame {} claims {} blocks, the frame size is {}",
                    number, frame.blocks, self.blocks_per_frame
                )));
            }
            let out_of_order = previous.is_some_and(|p| frame.offset <= p);
            if out_of_order || frame.offset >= self.compressed_bytes {
                return Err(MacError::InvalidInput(format!(
                    "frame {} starts at {}, out of order or past the {} stream bytes",
                    number, frame.offset, self.compressed_bytes
                )));
            }
            previous = Some(frame.offset);
            total += frame.blocks as u64;
        }
        if total != self.total_blocks {
            return Err(MacError::InvalidInput(format!(
                "frame table holds {} blocks but the stream claims {}",
                total, self.total_blocks
            )));
        }
        Ok(())
    }

    pub fn duration_secs(&self) -> f64 {
        if self.format.sample_rate == 0 {
            0.0
        } else {
            self.total_blocks as f64 / self.format.sample_rate as f64
        }
    }

    /// uncompressed / compressed
    pub fn compression_ratio(&self) -> f64 {
        if self.compressed_bytes == 0 {
            0.0
        } else {
            self.uncompressed_bytes() as f64 / self.compressed_bytes as f64
        }
    }

    pub fn to_json(&self) -> MacResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| MacError::InvalidInput(format!("cannot serialize stream info: {}", e)))
    }

    pub fn from_json(json: &str) -> MacResult<Self> {
        let info: StreamInfo = serde_json::from_str(json)
            .map_err(|e| MacError::InvalidInput(format!("invalid stream info: {}", e)))?;
        info.validate()?;
        Ok(info)
    }
}

/// starting capacity for `decoded` bytes coming out of `compressed` bytes
pub fn reserve_hint(decoded: u64, compressed: u64) -> usize {
    let capped = decoded.min(compressed.saturating_mul(RESERVE_RATIO));
    usize::try_from(capped).unwrap_or(0)
}

/// compressed bytes together with their stream info
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedStream {
    #[serde(with = "serde_bytes")]
    pub data: Vec<u8>,
    pub info: StreamInfo,
}
