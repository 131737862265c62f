//! PCM bytes to and from the X/Y channel pair
//!
//! Stereo is decorrelated as `Y = L - R`, `X = R + Y / 2` where R is the
//! first sample of each block. Mono uses X only.

use crate::core::crc32::frame_checksum;
use crate::core::{MacError, MacResult, SpecialCodes, WaveFormat};

/// one frame ready for the predictors
#[derive(Debug, Clone, Default)]
pub struct PreparedFrame {
    pub x: Vec<i32>,
    pub y: Vec<i32>,
    /// frame CRC over the raw PCM, top bit clear
    pub crc: u32,
    pub special: SpecialCodes,
    pub peak: u32,
}

impl PreparedFrame {
    pub fn blocks(&self) -> usize {
        self.x.len()
    }
}

/// decode one little-endian sample, 8-bit data is unsigned with a 128 offset
#[inline]
pub fn read_sample(bytes: &[u8], bits_per_sample: u16) -> i32 {
    match bits_per_sample {
        8 => bytes[0] as i32 - 128,
        16 => i16::from_le_bytes([bytes[0], bytes[1]]) as i32,
        // sign-extend from bit 23
        _ => ((bytes[0] as i32) | ((bytes[1] as i32) << 8) | ((bytes[2] as i32) << 16)) << 8 >> 8,
    }
}

/// encode one sample, truncating to the sample width
#[inline]
pub fn write_sample(value: i32, bits_per_sample: u16, out: &mut Vec<u8>) {
    match bits_per_sample {
        8 => out.push(value.wrapping_add(128) as u8),
        16 => out.extend_from_slice(&(value as i16).to_le_bytes()),
        _ => out.extend_from_slice(&value.to_le_bytes()[..3]),
    }
}

/// interleaved samples to PCM bytes
pub fn samples_to_pcm(samples: &[i32], bits_per_sample: u16) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * (bits_per_sample as usize / 8));
    for &s in samples {
        write_sample(s, bits_per_sample, &mut out);
    }
    out
}

/// PCM bytes to interleaved samples, a trailing partial sample is ignored
pub fn pcm_to_samples(pcm: &[u8], bits_per_sample: u16) -> Vec<i32> {
    let width = bits_per_sample as usize / 8;
    pcm.chunks_exact(width)
        .map(|chunk| read_sample(chunk, bits_per_sample))
        .collect()
}

/// split a frame of PCM into X/Y and detect the special cases
pub fn prepare(pcm: &[u8], format: &WaveFormat) -> MacResult<PreparedFrame> {
    let block_align = format.block_align();
    if pcm.len() % block_align != 0 {
        return Err(MacError::InvalidInput(format!(
            "{} bytes is not a whole number of {}-byte blocks",
            pcm.len(),
            block_align
        )));
    }

    let width = format.bytes_per_sample();
    let bits = format.bits_per_sample;
    let blocks = pcm.len() / block_align;
    let mut frame = PreparedFrame {
        x: Vec::with_capacity(blocks),
        crc: frame_checksum(pcm),
        ..Default::default()
    };

    if format.is_stereo() {
        frame.y.reserve(blocks);
        let mut peak_left = 0u32;
        let mut peak_right = 0u32;
        let mut pseudo_stereo = true;

        for block in pcm.chunks_exact(block_align) {
            let right = read_sample(&block[..width], bits);
            let left = read_sample(&block[width..], bits);
            peak_left = peak_left.max(left.unsigned_abs());
            peak_right = peak_right.max(right.unsigned_abs());

            let y = left - right;
            pseudo_stereo &= y == 0;
            frame.y.push(y);
            frame.x.push(right + y / 2);
        }

        if peak_left == 0 {
            frame.special.insert(SpecialCodes::LEFT_SILENCE);
        }
        if peak_right == 0 {
            frame.special.insert(SpecialCodes::RIGHT_SILENCE);
        }
        if pseudo_stereo && blocks > 0 {
            frame.special.insert(SpecialCodes::PSEUDO_STEREO);
        }
        frame.peak = peak_left.max(peak_right);
    } else {
        for sample in pcm.chunks_exact(width) {
            let value = read_sample(sample, bits);
            frame.peak = frame.peak.max(value.unsigned_abs());
            frame.x.push(value);
        }
        if frame.peak == 0 {
            frame.special.insert(SpecialCodes::MONO_SILENCE);
        }
    }

    Ok(frame)
}

/// rebuild interleaved PCM from X/Y; `y` is ignored for mono
pub fn unprepare(x: &[i32], y: &[i32], format: &WaveFormat, out: &mut Vec<u8>) {
    let bits = format.bits_per_sample;
    out.reserve(x.len() * format.block_align());
    if format.is_stereo() {
        for (&x, &y) in x.iter().zip(y) {
            let right = x.wrapping_sub(y / 2);
            let left = right.wrapping_add(y);
            write_sample(right, bits, out);
            write_sample(left, bits, out);
        }
    } else {
        for &x in x {
            write_sample(x, bits, out);
        }
    }
}
