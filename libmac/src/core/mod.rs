pub mod crc32;
pub mod error;
pub mod range_coder;
pub mod roll_buffer;
pub mod types;

pub use crc32::compute as compute_crc32;
pub use error::{MacError, MacResult};
pub use range_coder::{KState, RangeDecoder, RangeEncoder};
pub use roll_buffer::RollBuffer;
pub use types::*;
