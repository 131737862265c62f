//! Lossless codec pipeline
//!
//! stage 1 fixed filter, stage 2 adaptive cross-channel predictor, NN cascade,
//! then the range coder. Decoding runs the same stages backwards.

pub mod decoder;
pub mod encoder;
pub mod filters;
pub mod frame;
pub mod nn_filter;
pub mod predictor;
pub mod prepare;

pub use decoder::Decoder;
pub use encoder::Encoder;
pub use filters::{ScaledFirstOrderFilter, Stage1Filter};
pub use frame::{FrameCompressor, FrameDecompressor, FrameSummary};
pub use nn_filter::{NnCascade, NnFilter};
pub use predictor::Predictor;
pub use prepare::{pcm_to_samples, samples_to_pcm, PreparedFrame};
