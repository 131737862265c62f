//! Streaming types and enums

/// Streaming decoder state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    /// Waiting for the bytes of the next frame
    NeedData,
    /// At least one frame can be decoded
    Ready,
    /// Every frame in the table was decoded
    Finished,
    /// A frame failed its CRC, nothing more is decoded
    Corrupt,
}

/// bytes committed by the encoder after one frame
///
/// Concatenating `data` of every frame in order, followed by the tail
/// returned when the stream is finished, gives the complete stream.
/// Frame boundaries fall inside 32-bit output words, so `data` may end a
/// few bytes before the frame does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrame {
    /// frame number within the stream
    pub index: u32,
    /// logical byte offset of the frame start
    pub offset: u64,
    /// blocks in the frame
    pub blocks: u32,
    /// stream bytes flushed while this frame was coded
    pub data: Vec<u8>,
}

impl EncodedFrame {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
