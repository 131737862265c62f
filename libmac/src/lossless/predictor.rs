//! Per-channel prediction pipeline
//!
//! stage 1: fixed first-order filter on both inputs
//! stage 2: sign-sign adaptive predictor over first differences of this
//!          channel (A) and the cross channel (B)
//! stage 3: NN cascade on the stage-2 residual
//!
//! Mono streams feed B = 0, which keeps the cross-channel weights at zero.

use crate::core::roll_buffer::RollBuffer;
use crate::core::CompressionLevel;

use super::filters::Stage1Filter;
use super::nn_filter::NnCascade;

const WINDOW_BLOCKS: usize = 512;
const HISTORY_ELEMENTS: usize = 8;

const INITIAL_WEIGHTS_A: [i32; 4] = [360, 317, -109, 98];

/// adaptation step for a lookback value: negative values push up, positive push down
#[inline]
fn adapt_sign(value: i32) -> i32 {
    match value {
        0 => 0,
        v if v < 0 => 1,
        _ => -1,
    }
}

#[derive(Debug, Clone)]
pub struct Predictor {
    stage1_a: Stage1Filter,
    stage1_b: Stage1Filter,
    prediction_a: RollBuffer<i32>,
    prediction_b: RollBuffer<i32>,
    adapt_a: RollBuffer<i32>,
    adapt_b: RollBuffer<i32>,
    weights_a: [i32; 4],
    weights_b: [i32; 5],
    last_a: i32,
    cascade: NnCascade,
}

impl Predictor {
    pub fn new(level: CompressionLevel) -> Self {
        let mut predictor = Predictor {
            stage1_a: Stage1Filter::new(),
            stage1_b: Stage1Filter::new(),
            prediction_a: RollBuffer::new(WINDOW_BLOCKS, HISTORY_ELEMENTS),
            prediction_b: RollBuffer::new(WINDOW_BLOCKS, HISTORY_ELEMENTS),
            adapt_a: RollBuffer::new(WINDOW_BLOCKS, HISTORY_ELEMENTS),
            adapt_b: RollBuffer::new(WINDOW_BLOCKS, HISTORY_ELEMENTS),
            weights_a: INITIAL_WEIGHTS_A,
            weights_b: [0; 5],
            last_a: 0,
            cascade: NnCascade::new(level.nn_stages()),
        };
        predictor.flush();
        predictor
    }

    /// reset to the start-of-frame state
    pub fn flush(&mut self) {
        self.cascade.flush();
        self.stage1_a.flush();
        self.stage1_b.flush();
        self.prediction_a.flush();
        self.prediction_b.flush();
        self.adapt_a.flush();
        self.adapt_b.flush();
        self.weights_a = INITIAL_WEIGHTS_A;
        self.weights_b = [0; 5];
        self.last_a = 0;
    }

    pub fn weights(&self) -> ([i32; 4], [i32; 5]) {
        (self.weights_a, self.weights_b)
    }

    pub fn cascade(&self) -> &NnCascade {
        &self.cascade
    }

    /// fill this step's lookback slots from the previous stage-2 input and the filtered B
    #[inline]
    fn load_history(&mut self, b: i32) {
        let last_a = self.last_a;
        self.prediction_a.set_current(last_a);
        let previous = self.prediction_a.back(1);
        *self.prediction_a.back_mut(1) = last_a.wrapping_sub(previous);

        self.prediction_b.set_current(b);
        let previous = self.prediction_b.back(1);
        *self.prediction_b.back_mut(1) = b.wrapping_sub(previous);
    }

    #[inline]
    fn prediction(&self) -> i32 {
        let a = &self.prediction_a;
        let b = &self.prediction_b;
        let wa = &self.weights_a;
        let wb = &self.weights_b;

        let prediction_a = a
            .current()
            .wrapping_mul(wa[0])
            .wrapping_add(a.back(1).wrapping_mul(wa[1]))
            .wrapping_add(a.back(2).wrapping_mul(wa[2]))
            .wrapping_add(a.back(3).wrapping_mul(wa[3]));
        let prediction_b = b
            .current()
            .wrapping_mul(wb[0])
            .wrapping_add(b.back(1).wrapping_mul(wb[1]))
            .wrapping_add(b.back(2).wrapping_mul(wb[2]))
            .wrapping_add(b.back(3).wrapping_mul(wb[3]))
            .wrapping_add(b.back(4).wrapping_mul(wb[4]));

        prediction_a.wrapping_add(prediction_b >> 1) >> 10
    }

    /// record lookback signs and move every weight one step against the residual
    #[inline]
    fn adapt(&mut self, residual: i32) {
        self.adapt_a
            .set_current(adapt_sign(self.prediction_a.current()));
        *self.adapt_a.back_mut(1) = adapt_sign(self.prediction_a.back(1));
        self.adapt_b
            .set_current(adapt_sign(self.prediction_b.current()));
        *self.adapt_b.back_mut(1) = adapt_sign(self.prediction_b.back(1));

        let signs_a = [
            self.adapt_a.current(),
            self.adapt_a.back(1),
            self.adapt_a.back(2),
            self.adapt_a.back(3),
        ];
        let signs_b = [
            self.adapt_b.current(),
            self.adapt_b.back(1),
            self.adapt_b.back(2),
            self.adapt_b.back(3),
            self.adapt_b.back(4),
        ];

        if residual > 0 {
            for (w, s) in self.weights_a.iter_mut().zip(signs_a) {
                *w = w.wrapping_sub(s);
            }
            for (w, s) in self.weights_b.iter_mut().zip(signs_b) {
                *w = w.wrapping_sub(s);
            }
        } else if residual < 0 {
            for (w, s) in self.weights_a.iter_mut().zip(signs_a) {
                *w = w.wrapping_add(s);
            }
            for (w, s) in self.weights_b.iter_mut().zip(signs_b) {
                *w = w.wrapping_add(s);
            }
        }
    }

    #[inline]
    fn advance(&mut self) {
        self.prediction_a.advance();
        self.prediction_b.advance();
        self.adapt_a.advance();
        self.adapt_b.advance();
    }

    /// predict `a` (this channel) with help from `b` (the cross channel), returns the residual
    pub fn compress(&mut self, a: i32, b: i32) -> i32 {
        let a = self.stage1_a.compress(a);
        let b = self.stage1_b.compress(b);

        self.load_history(b);
        let output = a.wrapping_sub(self.prediction());
        self.adapt(output);
        self.last_a = a;
        self.advance();

        self.cascade.compress(output)
    }

    /// inverse of `compress`, `b` must be the same cross-channel value the encoder saw
    pub fn decompress(&mut self, residual: i32, b: i32) -> i32 {
        let residual = self.cascade.decompress(residual);
        let b = self.stage1_b.compress(b);

        self.load_history(b);
        let current = residual.wrapping_add(self.prediction());
        self.adapt(residual);
        self.last_a = current;
        self.advance();

        self.stage1_a.decompress(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adapt_sign() {
        assert_eq!(adapt_sign(0), 0);
        assert_eq!(adapt_sign(5), -1);
        assert_eq!(adapt_sign(1 << 30), -1);
        assert_eq!(adapt_sign(-5), 1);
        assert_eq!(adapt_sign(i32::MIN), 1);
    }

    #[test]
    fn test_first_sample() {
        // with empty history stage 2 predicts zero and stage 1 passes the first value
        let mut predictor = Predictor::new(CompressionLevel::Fast);
        assert_eq!(predictor.compress(100, 0), 100);
    }

    #[test]
    fn test_symmetry_every_level() {
        for level in CompressionLevel::ALL {
            let mut encoder = Predictor::new(level);
            let mut decoder = Predictor::new(level);
            let mut last_b = 0;
            for i in 0..3000i32 {
                let a = ((i * 131) % 4000) - 2000 + (i % 3) * 700;
                let b = ((i * 17) % 300) - 150;
                let residual = encoder.compress(a, last_b);
                assert_eq!(decoder.decompress(residual, last_b), a, "{} sample {}", level, i);
                last_b = b;
            }
            assert_eq!(encoder.weights(), decoder.weights());
        }
    }

    #[test]
    fn test_mono_keeps_cross_weights_at_zero() {
        let mut predictor = Predictor::new(CompressionLevel::Normal);
        for i in 0..2000 {
            predictor.compress((i * 7) % 500 - 250, 0);
        }
        assert_eq!(predictor.weights().1, [0; 5]);
        assert_ne!(predictor.weights().0, INITIAL_WEIGHTS_A);
    }

    #[test]
    fn test_flush_restores_initial_state() {
        let mut predictor = Predictor::new(CompressionLevel::High);
        let first: Vec<i32> = (0..700).map(|i| predictor.compress(i * 5 - 900, i)).collect();
        predictor.flush();
        assert_eq!(predictor.weights(), (INITIAL_WEIGHTS_A, [0; 5]));
        let second: Vec<i32> = (0..700).map(|i| predictor.compress(i * 5 - 900, i)).collect();
        assert_eq!(first, second);
    }
}
