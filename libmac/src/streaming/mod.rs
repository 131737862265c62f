//! streaming encode/decode
//!
//! incremental encoding and decoding for sockets, pipes or memory constrained stuff
mod decoder;
mod encoder;
mod pipeline;
mod types;

pub use decoder::StreamingDecoder;
pub use encoder::StreamingEncoder;
pub use pipeline::{spawn_encoder, EncoderPipeline, DEFAULT_QUEUE_DEPTH};
pub use types::{DecoderState, EncodedFrame};
