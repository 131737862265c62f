//! Adaptive FIR stages ("NN filters")
//!
//! Each stage predicts from its last `order` saturated inputs and adapts
//! its weights by adding or subtracting a sign vector. Compression and
//! decompression run the same update on the same values, so the weights
//! of both sides stay identical.

use crate::core::roll_buffer::RollBuffer;

/// writes between history rolls
const NN_WINDOW: usize = 512;

#[derive(Debug, Clone)]
pub struct NnFilter {
    order: usize,
    shift: u32,
    round: i32,
    weights: Vec<i16>,
    input: RollBuffer<i16>,
    adapt: RollBuffer<i16>,
    running_average: i32,
}

#[inline]
fn saturate_i16(value: i32) -> i16 {
    value.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

#[inline]
fn dot_product(input: &[i16], weights: &[i16]) -> i32 {
    input
        .iter()
        .zip(weights)
        .fold(0i32, |acc, (&x, &w)| {
            acc.wrapping_add((x as i32) * (w as i32))
        })
}

/// sign-sign update, a zero direction leaves the weights alone
#[inline]
fn adapt_weights(weights: &mut [i16], adapt: &[i16], direction: i32) {
    if direction < 0 {
        for (w, &a) in weights.iter_mut().zip(adapt) {
            *w = w.wrapping_add(a);
        }
    } else if direction > 0 {
        for (w, &a) in weights.iter_mut().zip(adapt) {
            *w = w.wrapping_sub(a);
        }
    }
}

impl NnFilter {
    pub fn new(order: usize, shift: u32) -> Self {
        debug_assert!(order > 0 && shift > 0);
        NnFilter {
            order,
            shift,
            round: 1 << (shift - 1),
            weights: vec![0; order],
            input: RollBuffer::new(NN_WINDOW, order),
            adapt: RollBuffer::new(NN_WINDOW, order),
            running_average: 0,
        }
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn shift(&self) -> u32 {
        self.shift
    }

    pub fn weights(&self) -> &[i16] {
        &self.weights
    }

    pub fn flush(&mut self) {
        self.weights.fill(0);
        self.input.flush();
        self.adapt.flush();
        self.running_average = 0;
    }

    #[inline]
    fn prediction(&self) -> i32 {
        dot_product(self.input.history(), &self.weights).wrapping_add(self.round) >> self.shift
    }

    pub fn compress(&mut self, input: i32) -> i32 {
        self.input.set_current(saturate_i16(input));

        let output = input.wrapping_sub(self.prediction());
        adapt_weights(&mut self.weights, self.adapt.history(), output);

        self.update_adapt(input);
        self.input.advance();
        output
    }

    pub fn decompress(&mut self, input: i32) -> i32 {
        let output = input.wrapping_add(self.prediction());
        adapt_weights(&mut self.weights, self.adapt.history(), input);

        self.input.set_current(saturate_i16(output));
        self.update_adapt(output);
        self.input.advance();
        output
    }

    /// push the sign of `value`, scaled by its size against the running average
    fn update_adapt(&mut self, value: i32) {
        let magnitude = value.wrapping_abs();
        let average = self.running_average;

        let step: i16 = if magnitude > average.wrapping_mul(3) {
            32
        } else if magnitude > average.wrapping_mul(4) / 3 {
            16
        } else if magnitude > 0 {
            8
        } else {
            0
        };
        self.adapt.set_current(if value < 0 { step } else { -step });

        self.running_average = average.wrapping_add(magnitude.wrapping_sub(average) / 16);

        for distance in [1, 2, 8] {
            if distance <= self.order {
                *self.adapt.back_mut(distance) >>= 1;
            }
        }
        self.adapt.advance();
    }
}

/// the stages fixed by one compression level, run in series
#[derive(Debug, Clone, Default)]
pub struct NnCascade {
    stages: Vec<NnFilter>,
}

impl NnCascade {
    pub fn new(stages: &[(usize, u32)]) -> Self {
        NnCascade {
            stages: stages
                .iter()
                .map(|&(order, shift)| NnFilter::new(order, shift))
                .collect(),
        }
    }

    pub fn stages(&self) -> &[NnFilter] {
        &self.stages
    }

    pub fn flush(&mut self) {
        for stage in &mut self.stages {
            stage.flush();
        }
    }

    #[inline]
    pub fn compress(&mut self, input: i32) -> i32 {
        self.stages
            .iter_mut()
            .fold(input, |value, stage| stage.compress(value))
    }

    #[inline]
    pub fn decompress(&mut self, input: i32) -> i32 {
        self.stages
            .iter_mut()
            .rev()
            .fold(input, |value, stage| stage.decompress(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_saturate() {
        assert_eq!(saturate_i16(40000), i16::MAX);
        assert_eq!(saturate_i16(-40000), i16::MIN);
        assert_eq!(saturate_i16(-123), -123);
    }

    #[test]
    fn test_first_sample_passes_through() {
        let mut filter = NnFilter::new(16, 11);
        assert_eq!(filter.compress(1234), 1234);
        assert!(filter.weights().iter().all(|&w| w == 0));
    }

    #[test]
    fn test_weights_follow_residual_sign() {
        let mut filter = NnFilter::new(16, 11);
        for _ in 0..64 {
            filter.compress(1000);
        }
        // a constant positive signal pushes the weights up
        assert!(filter.weights().iter().any(|&w| w > 0));
    }

    #[test]
    fn test_stage_symmetry() {
        for &(order, shift) in &[(16, 11), (32, 10), (64, 11), (256, 13), (1280, 15)] {
            let mut forward = NnFilter::new(order, shift);
            let mut backward = NnFilter::new(order, shift);
            for i in 0..5000i32 {
                let x = ((i * 37) % 2001 - 1000) * (1 + (i % 7));
                let residual = forward.compress(x);
                assert_eq!(backward.decompress(residual), x, "order {} sample {}", order, i);
            }
            assert_eq!(forward.weights(), backward.weights());
        }
    }

    #[test]
    fn test_cascade_symmetry_with_wide_input() {
        let stages = [(1280, 15), (256, 13), (16, 11)];
        let mut forward = NnCascade::new(&stages);
        let mut backward = NnCascade::new(&stages);
        let mut seed = 11u32;
        for _ in 0..4000 {
            seed = seed.wrapping_mul(1664525).wrapping_add(1013904223);
            // wider than 16 bits so the history saturates
            let x = (seed >> 7) as i32 - (1 << 24);
            assert_eq!(backward.decompress(forward.compress(x)), x);
        }
        for (a, b) in forward.stages().iter().zip(backward.stages()) {
            assert_eq!(a.weights(), b.weights());
        }
    }

    #[test]
    fn test_flush_restores_initial_behaviour() {
        let mut filter = NnFilter::new(32, 10);
        let first: Vec<i32> = (0..100).map(|i| filter.compress(i * 3 - 150)).collect();
        filter.flush();
        let second: Vec<i32> = (0..100).map(|i| filter.compress(i * 3 - 150)).collect();
        assert_eq!(first, second);
    }
}
