//! Fixed first-order leaky predictor applied ahead of the adaptive stages

/// `out = in - ((last * MULTIPLY) >> SHIFT)`, inverse adds
#[derive(Debug, Clone, Copy, Default)]
pub struct ScaledFirstOrderFilter<const MULTIPLY: i32, const SHIFT: u32> {
    last: i32,
}

/// the stage-1 filter used by the codec
pub type Stage1Filter = ScaledFirstOrderFilter<31, 5>;

impl<const MULTIPLY: i32, const SHIFT: u32> ScaledFirstOrderFilter<MULTIPLY, SHIFT> {
    pub fn new() -> Self {
        ScaledFirstOrderFilter { last: 0 }
    }

    pub fn flush(&mut self) {
        self.last = 0;
    }

    #[inline]
    fn prediction(&self) -> i32 {
        self.last.wrapping_mul(MULTIPLY) >> SHIFT
    }

    #[inline]
    pub fn compress(&mut self, input: i32) -> i32 {
        let output = input.wrapping_sub(self.prediction());
        self.last = input;
        output
    }

    #[inline]
    pub fn decompress(&mut self, input: i32) -> i32 {
        self.last = input.wrapping_add(self.prediction());
        self.last
    }
}
