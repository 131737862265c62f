//! Bounded lookback buffer shared by every predictor stage
//!
//! Values are written at a cursor and read back by distance. When the cursor
//! reaches the end of the arena the last `history` values are copied to the
//! head, so lookback reads are unaffected by a roll.

#[derive(Debug, Clone)]
pub struct RollBuffer<T> {
    data: Vec<T>,
    history: usize,
    index: usize,
}

impl<T: Copy + Default> RollBuffer<T> {
    /// `window` writes fit between rolls, `history` values stay readable behind the cursor
    pub fn new(window: usize, history: usize) -> Self {
        RollBuffer {
            data: vec![T::default(); window.max(1) + history],
            history,
            index: history,
        }
    }

    /// zero everything and rewind the cursor
    pub fn flush(&mut self) {
        self.data.fill(T::default());
        self.index = self.history;
    }

    #[inline]
    pub fn current(&self) -> T {
        self.data[self.index]
    }

    #[inline]
    pub fn set_current(&mut self, value: T) {
        self.data[self.index] = value;
    }

    /// value written `distance` steps ago (1 = previous write)
    #[inline]
    pub fn back(&self, distance: usize) -> T {
        debug_assert!(distance <= self.history);
        self.data[self.index - distance]
    }

    #[inline]
    pub fn back_mut(&mut self, distance: usize) -> &mut T {
        debug_assert!(distance <= self.history);
        &mut self.data[self.index - distance]
    }

    /// the `history` most recent values, oldest first
    #[inline]
    pub fn history(&self) -> &[T] {
        &self.data[self.index - self.history..self.index]
    }

    /// step the cursor, rolling when the arena is full
    #[inline]
    pub fn advance(&mut self) {
        self.index += 1;
        if self.index == self.data.len() {
            let start = self.index - self.history;
            self.data.copy_within(start..self.index, 0);
            self.index = self.history;
        }
    }

    pub fn push(&mut self, value: T) {
        self.set_current(value);
        self.advance();
    }
}
