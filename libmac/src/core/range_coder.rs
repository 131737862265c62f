//! Adaptive range coder for signed residuals
//!
//! Values are split by a pivot derived from a running magnitude estimate.
//! The overflow part goes through a fixed 64-symbol frequency model, the
//! base part through a uniform divide. Bytes are emitted with carry
//! counting: one pending byte plus a run of pending 0xFF bytes.
//!
//! The output is a bit array of 32-bit words filled most-significant byte
//! first and flushed to the sink little-endian. Positions handed out by the
//! encoder are logical byte positions inside that array.

use std::io::Write;

use md5::{Digest, Md5};

use super::error::{MacError, MacResult};

pub const TOP_VALUE: u32 = 1 << 31;
pub const BOTTOM_VALUE: u32 = TOP_VALUE >> 8;
const SHIFT_BITS: u32 = 23;
const EXTRA_BITS: u32 = 7;

const MODEL_ELEMENTS: usize = 64;
const RANGE_OVERFLOW_SHIFT: u32 = 16;

/// words buffered before a mid-frame flush to the sink
const FLUSH_WORDS: usize = 4096;

/// k hysteresis boundaries, zero entries are unreachable
pub const K_SUM_MIN_BOUNDARY: [u32; 32] = [
    0, 32, 64, 128, 256, 512, 1024, 2048, 4096, 8192, 16384, 32768, 65536, 131072, 262144, 524288,
    1048576, 2097152, 4194304, 8388608, 16777216, 33554432, 67108864, 134217728, 268435456,
    536870912, 1073741824, 2147483648, 0, 0, 0, 0,
];

/// cumulative frequencies of the overflow model
pub const RANGE_TOTAL: [u32; MODEL_ELEMENTS] = [
    0, 19578, 36160, 48417, 56323, 60899, 63265, 64435, 64971, 65232, 65351, 65416, 65447, 65466,
    65476, 65482, 65485, 65488, 65490, 65491, 65492, 65493, 65494, 65495, 65496, 65497, 65498,
    65499, 65500, 65501, 65502, 65503, 65504, 65505, 65506, 65507, 65508, 65509, 65510, 65511,
    65512, 65513, 65514, 65515, 65516, 65517, 65518, 65519, 65520, 65521, 65522, 65523, 65524,
    65525, 65526, 65527, 65528, 65529, 65530, 65531, 65532, 65533, 65534, 65535,
];

/// symbol widths of the overflow model
pub const RANGE_WIDTH: [u32; MODEL_ELEMENTS] = [
    19578, 16582, 12257, 7906, 4576, 2366, 1170, 536, 261, 119, 65, 31, 19, 10, 6, 3, 3, 2, 1, 1,
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1,
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1,
];

/// per-channel adaptive model state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KState {
    pub k: u32,
    pub k_sum: u32,
}

impl Default for KState {
    fn default() -> Self {
        Self::new()
    }
}

impl KState {
    pub fn new() -> Self {
        KState {
            k: 10,
            k_sum: (1 << 10) * 16,
        }
    }

    pub fn flush(&mut self) {
        *self = KState::new();
    }

    /// divisor between the modelled and the uniform part, never zero
    #[inline]
    pub fn pivot(&self) -> u32 {
        (self.k_sum / 32).max(1)
    }

    /// fold one unsigned value into the estimate, k moves at most one step
    #[inline]
    pub fn update(&mut self, value: u32) {
        let gain = ((value as u64 + 1) / 2) as u32;
        let decay = ((self.k_sum as u64 + 16) >> 5) as u32;
        self.k_sum = self.k_sum.wrapping_add(gain).wrapping_sub(decay);

        let k = self.k as usize;
        if self.k_sum < K_SUM_MIN_BOUNDARY[k] {
            self.k -= 1;
        } else if k + 1 < K_SUM_MIN_BOUNDARY.len()
            && K_SUM_MIN_BOUNDARY[k + 1] != 0
            && self.k_sum >= K_SUM_MIN_BOUNDARY[k + 1]
        {
            self.k += 1;
        }
    }
}

/// zigzag a residual, `None` when it does not fit in 32 bits
#[inline]
pub fn to_unsigned(value: i32) -> Option<u32> {
    if value > 0 {
        Some((value as u32) * 2 - 1)
    } else {
        value.unsigned_abs().checked_mul(2)
    }
}

#[inline]
pub fn to_signed(value: u32) -> i32 {
    if value & 1 == 1 {
        ((value >> 1) + 1) as i32
    } else {
        ((value >> 1) as i32).wrapping_neg()
    }
}

/// pivots of 2^16 and above are coded as two divides: (pivot / split + 1, split)
#[inline]
fn split_factor(pivot: u32) -> Option<u32> {
    if pivot >= 1 << 16 {
        let bits = 32 - pivot.leading_zeros();
        Some(1 << (bits - 16))
    } else {
        None
    }
}

// encoder

pub struct RangeEncoder<W: Write> {
    sink: W,
    words: Vec<u32>,
    bit_index: usize,
    bytes_written: u64,
    digest: Md5,
    low: u32,
    range: u32,
    buffer: u32,
    help: u32,
}

impl<W: Write> RangeEncoder<W> {
    pub fn new(sink: W) -> Self {
        RangeEncoder {
            sink,
            words: Vec::with_capacity(FLUSH_WORDS + 1),
            bit_index: 0,
            bytes_written: 0,
            digest: Md5::new(),
            low: 0,
            range: TOP_VALUE,
            buffer: 0,
            help: 0,
        }
    }

    /// logical byte position of the next output byte
    pub fn position(&self) -> u64 {
        self.bytes_written + (self.bit_index / 8) as u64
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn range(&self) -> u32 {
        self.range
    }

    /// bytes already flushed can be taken from here
    pub fn sink_mut(&mut self) -> &mut W {
        &mut self.sink
    }

    pub fn align(&mut self) {
        self.bit_index = (self.bit_index + 7) & !7;
    }

    /// byte-align and reset the coder registers for a new frame
    pub fn start(&mut self) {
        self.align();
        self.low = 0;
        self.range = TOP_VALUE;
        self.buffer = 0;
        self.help = 0;
    }

    #[inline]
    fn putc(&mut self, byte: u32) {
        let word = self.bit_index >> 5;
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= (byte & 0xFF) << (24 - (self.bit_index & 31));
        self.bit_index += 8;
    }

    pub(crate) fn normalize(&mut self) {
        while self.range <= BOTTOM_VALUE {
            if self.low < (0xFF << SHIFT_BITS) {
                self.putc(self.buffer);
                while self.help > 0 {
                    self.putc(0xFF);
                    self.help -= 1;
                }
                self.buffer = (self.low >> SHIFT_BITS) & 0xFF;
            } else if self.low & TOP_VALUE != 0 {
                // carry into the pending byte, the 0xFF run rolls over to zeros
                self.putc(self.buffer + 1);
                while self.help > 0 {
                    self.putc(0);
                    self.help -= 1;
                }
                self.buffer = (self.low >> SHIFT_BITS) & 0xFF;
            } else {
                self.help += 1;
            }

            self.low = (self.low << 8) & (TOP_VALUE - 1);
            self.range <<= 8;
        }
    }

    #[inline]
    fn encode_fast(&mut self, width: u32, total: u32, shift: u32) {
        self.normalize();
        let t = self.range >> shift;
        self.range = t.wrapping_mul(width);
        self.low = self.low.wrapping_add(t.wrapping_mul(total));
    }

    #[inline]
    fn encode_direct(&mut self, value: u32, shift: u32) {
        self.normalize();
        self.range >>= shift;
        self.low = self.low.wrapping_add(self.range.wrapping_mul(value));
    }

    #[inline]
    fn encode_divide(&mut self, value: u32, divisor: u32) {
        self.normalize();
        let t = self.range / divisor;
        self.range = t;
        self.low = self.low.wrapping_add(t.wrapping_mul(value));
    }

    /// raw 32-bit word, most significant byte first, outside the range coder
    pub fn encode_u32(&mut self, value: u32) -> MacResult<()> {
        self.reserve()?;
        self.align();
        for shift in [24, 16, 8, 0] {
            self.putc(value >> shift);
        }
        Ok(())
    }

    pub fn encode_value(&mut self, value: i32, state: &mut KState) -> MacResult<()> {
        self.reserve()?;

        let unsigned = to_unsigned(value).ok_or(MacError::ResidualOutOfRange { value })?;

        let pivot = state.pivot();
        state.update(unsigned);

        let overflow = unsigned / pivot;
        let base = unsigned - overflow * pivot;

        if (overflow as usize) < MODEL_ELEMENTS - 1 {
            let symbol = overflow as usize;
            self.encode_fast(RANGE_WIDTH[symbol], RANGE_TOTAL[symbol], RANGE_OVERFLOW_SHIFT);
        } else {
            // escape, then the overflow as two raw 16-bit halves
            let symbol = MODEL_ELEMENTS - 1;
            self.encode_fast(RANGE_WIDTH[symbol], RANGE_TOTAL[symbol], RANGE_OVERFLOW_SHIFT);
            self.encode_direct((overflow >> 16) & 0xFFFF, 16);
            self.encode_direct(overflow & 0xFFFF, 16);
        }

        match split_factor(pivot) {
            Some(split) => {
                self.encode_divide(base / split, pivot / split + 1);
                self.encode_divide(base % split, split);
            }
            None => self.encode_divide(base, pivot),
        }
        Ok(())
    }

    /// flush the pending byte, the carry run and the decoder lookahead
    pub fn finish_frame(&mut self) {
        self.normalize();

        let tail = (self.low >> SHIFT_BITS) + 1;
        if tail > 0xFF {
            self.putc(self.buffer + 1);
            while self.help > 0 {
                self.putc(0);
                self.help -= 1;
            }
        } else {
            self.putc(self.buffer);
            while self.help > 0 {
                self.putc(0xFF);
                self.help -= 1;
            }
        }

        self.putc(tail & 0xFF);
        self.putc(0);
        self.putc(0);
        self.putc(0);
    }

    fn reserve(&mut self) -> MacResult<()> {
        if self.bit_index >> 5 >= FLUSH_WORDS {
            self.flush_words()?;
        }
        Ok(())
    }

    /// write every complete word to the sink
    pub fn flush_words(&mut self) -> MacResult<()> {
        let full = self.bit_index >> 5;
        if full == 0 {
            return Ok(());
        }
        self.write_words(full)?;
        self.words.drain(..full);
        self.bit_index &= 31;
        Ok(())
    }

    fn write_words(&mut self, count: usize) -> MacResult<()> {
        let mut bytes = Vec::with_capacity(count * 4);
        for word in self.words.iter().take(count) {
            bytes.extend_from_slice(&word.to_le_bytes());
        }
        // a word can be counted before any byte touched it
        bytes.resize(count * 4, 0);
        self.digest.update(&bytes);
        self.sink.write_all(&bytes)?;
        self.bytes_written += bytes.len() as u64;
        Ok(())
    }

    /// write everything including the zero-padded last word
    pub fn finish(mut self) -> MacResult<(W, [u8; 16], u64)> {
        self.flush_words()?;
        if self.bit_index > 0 {
            self.write_words(1)?;
            self.bit_index = 0;
            self.words.clear();
        }
        self.sink.flush()?;
        let digest: [u8; 16] = self.digest.finalize().into();
        Ok((self.sink, digest, self.bytes_written))
    }
}

// decoder

pub struct RangeDecoder<'a> {
    data: &'a [u8],
    pos: usize,
    low: u32,
    range: u32,
    buffer: u32,
}

impl<'a> RangeDecoder<'a> {
    /// `offset` is a logical byte position as reported by the encoder
    pub fn new(data: &'a [u8], offset: usize) -> Self {
        RangeDecoder {
            data,
            pos: offset,
            low: 0,
            range: 0,
            buffer: 0,
        }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn range(&self) -> u32 {
        self.range
    }

    /// bytes past the end read as zero
    #[inline]
    fn getc(&mut self) -> u32 {
        let logical = self.pos;
        self.pos += 1;
        let physical = (logical & !3) + 3 - (logical & 3);
        self.data.get(physical).map_or(0, |&b| b as u32)
    }

    pub fn decode_u32(&mut self) -> u32 {
        let mut value = 0u32;
        for _ in 0..4 {
            value = (value << 8) | self.getc();
        }
        value
    }

    /// prime the registers at the start of a frame's coded values
    pub fn start(&mut self) {
        // the encoder's first byte is always the empty pending byte
        self.pos += 1;
        self.buffer = self.getc();
        self.low = self.buffer >> (8 - EXTRA_BITS);
        self.range = 1 << EXTRA_BITS;
    }

    pub(crate) fn normalize(&mut self) {
        while self.range <= BOTTOM_VALUE {
            self.buffer = (self.buffer << 8) | self.getc();
            self.low = (self.low << 8) | ((self.buffer >> 1) & 0xFF);
            self.range <<= 8;
        }
    }

    #[inline]
    fn decode_fast(&mut self, shift: u32) -> u32 {
        self.normalize();
        self.range >>= shift;
        self.low / self.range
    }

    #[inline]
    fn decode_fast_update(&mut self, shift: u32) -> u32 {
        let value = self.decode_fast(shift);
        self.low = self.low.wrapping_sub(self.range.wrapping_mul(value));
        value
    }

    #[inline]
    fn decode_divide(&mut self, divisor: u32) -> u32 {
        self.normalize();
        self.range /= divisor;
        let value = self.low / self.range;
        self.low = self.low.wrapping_sub(self.range.wrapping_mul(value));
        value
    }

    pub fn decode_value(&mut self, state: &mut KState) -> i32 {
        let pivot = state.pivot();

        let total = self.decode_fast(RANGE_OVERFLOW_SHIFT);
        let symbol = RANGE_TOTAL[1..]
            .iter()
            .take_while(|&&t| total >= t)
            .count();
        self.low = self
            .low
            .wrapping_sub(self.range.wrapping_mul(RANGE_TOTAL[symbol]));
        self.range = self.range.wrapping_mul(RANGE_WIDTH[symbol]);

        let overflow = if symbol == MODEL_ELEMENTS - 1 {
            let high = self.decode_fast_update(16);
            let low = self.decode_fast_update(16);
            (high << 16) | low
        } else {
            symbol as u32
        };

        let base = match split_factor(pivot) {
            Some(split) => {
                let base_a = self.decode_divide(pivot / split + 1);
                let base_b = self.decode_divide(split);
                base_a.wrapping_mul(split).wrapping_add(base_b)
            }
            None => self.decode_divide(pivot),
        };

        let unsigned = base.wrapping_add(overflow.wrapping_mul(pivot));
        state.update(unsigned);
        to_signed(unsigned)
    }

    /// consume the frame's trailing lookahead without reading it
    pub fn finish(&mut self) {
        while self.range <= BOTTOM_VALUE {
            self.pos += 1;
            self.range <<= 8;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lcg(seed: &mut u32) -> u32 {
        *seed = seed.wrapping_mul(1664525).wrapping_add(1013904223);
        *seed
    }

    fn encode_values(values: &[i32]) -> Vec<u8> {
        let mut encoder = RangeEncoder::new(Vec::new());
        let mut state = KState::new();
        encoder.start();
        for &v in values {
            encoder.encode_value(v, &mut state).unwrap();
        }
        encoder.finish_frame();
        encoder.finish().unwrap().0
    }

    fn decode_values(data: &[u8], count: usize) -> Vec<i32> {
        let mut decoder = RangeDecoder::new(data, 0);
        let mut state = KState::new();
        decoder.start();
        let values = (0..count).map(|_| decoder.decode_value(&mut state)).collect();
        decoder.finish();
        values
    }

    #[test]
    fn test_zigzag() {
        assert_eq!(to_unsigned(0), Some(0));
        assert_eq!(to_unsigned(1), Some(1));
        assert_eq!(to_unsigned(-1), Some(2));
        assert_eq!(to_unsigned(2), Some(3));
        assert_eq!(to_unsigned(i32::MAX), Some(u32::MAX - 2));
        assert_eq!(to_unsigned(-i32::MAX), Some(u32::MAX - 1));
        assert_eq!(to_unsigned(i32::MIN), None);
        for v in [-70000, -3, -1, 0, 1, 5, 65536, i32::MAX, -i32::MAX] {
            assert_eq!(to_signed(to_unsigned(v).unwrap()), v);
        }
    }

    #[test]
    fn test_zero_ksum_pivot_is_one() {
        let state = KState { k: 0, k_sum: 0 };
        assert_eq!(state.pivot(), 1);
        let state = KState { k: 0, k_sum: 31 };
        assert_eq!(state.pivot(), 1);
    }

    #[test]
    fn test_k_moves_one_step() {
        let mut state = KState::new();
        let mut previous = state.k;
        for v in [0u32, 0, 1_000_000, 5, u32::MAX - 1, 0, 0, 0, 70000] {
            state.update(v);
            assert!(state.k.abs_diff(previous) <= 1);
            assert!(state.k < 32);
            previous = state.k;
        }
    }

    #[test]
    fn test_range_invariant_after_normalize() {
        let mut encoder = RangeEncoder::new(Vec::new());
        let mut state = KState::new();
        let mut seed = 7u32;
        encoder.start();
        for i in 0..5000 {
            let magnitude = 1 << (i % 20);
            let v = (lcg(&mut seed) % magnitude) as i32 - (magnitude as i32 / 2);
            encoder.encode_value(v, &mut state).unwrap();
            encoder.normalize();
            assert!(encoder.range() > BOTTOM_VALUE);
            assert!(encoder.range() <= TOP_VALUE);
        }
    }

    #[test]
    fn test_values_roundtrip() {
        let mut seed = 42u32;
        let mut values = Vec::new();
        for i in 0..20000 {
            let magnitude = 1u32 << (i / 1000);
            values.push((lcg(&mut seed) % magnitude) as i32 - (magnitude / 2) as i32);
        }
        let data = encode_values(&values);
        assert_eq!(decode_values(&data, values.len()), values);
    }

    #[test]
    fn test_escape_and_split_pivot_roundtrip() {
        // small values first keep the pivot at 1, then a jump forces the escape path;
        // a long run of huge values drives the pivot past 2^16
        let mut values = vec![0; 600];
        values.push(1_000_000);
        values.push(-1_000_000);
        values.extend((0..3000).map(|i| if i % 2 == 0 { 90_000_000 } else { -90_000_001 }));
        values.push(i32::MAX);
        values.push(-i32::MAX);
        values.push(0);
        let data = encode_values(&values);
        assert_eq!(decode_values(&data, values.len()), values);
    }

    #[test]
    fn test_out_of_range_residual() {
        let mut encoder = RangeEncoder::new(Vec::new());
        let mut state = KState::new();
        encoder.start();
        let err = encoder.encode_value(i32::MIN, &mut state).unwrap_err();
        assert!(matches!(err, MacError::ResidualOutOfRange { value } if value == i32::MIN));
    }

    #[test]
    fn test_raw_words_and_positions() {
        let mut encoder = RangeEncoder::new(Vec::new());
        encoder.encode_u32(0xDEADBEEF).unwrap();
        assert_eq!(encoder.position(), 4);
        encoder.encode_u32(0x01020304).unwrap();
        let (data, _, written) = encoder.finish().unwrap();
        assert_eq!(written, 8);
        // words are stored little-endian
        assert_eq!(data, vec![0xEF, 0xBE, 0xAD, 0xDE, 0x04, 0x03, 0x02, 0x01]);

        let mut decoder = RangeDecoder::new(&data, 0);
        assert_eq!(decoder.decode_u32(), 0xDEADBEEF);
        assert_eq!(decoder.decode_u32(), 0x01020304);
    }

    #[test]
    fn test_digest_covers_output() {
        let mut encoder = RangeEncoder::new(Vec::new());
        encoder.encode_u32(0x12345678).unwrap();
        encoder.encode_u32(0x9ABCDEF0).unwrap();
        let (data, digest, _) = encoder.finish().unwrap();
        let expected: [u8; 16] = Md5::digest(&data).into();
        assert_eq!(digest, expected);
    }

    #[test]
    fn test_large_output_flushes_midway() {
        let mut seed = 3u32;
        let values: Vec<i32> = (0..200_000)
            .map(|_| (lcg(&mut seed) >> 8) as i32 - (1 << 23))
            .collect();
        let data = encode_values(&values);
        assert!(data.len() > FLUSH_WORDS * 4);
        assert_eq!(decode_values(&data, values.len()), values);
    }
}
