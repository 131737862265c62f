use tracing::{debug, warn};

use crate::core::{MacError, MacResult, StreamInfo};
use crate::lossless::Decoder;

use super::types::DecoderState;

/// streaming decoder fed with stream bytes as they arrive
///
/// The frame table comes from the [`StreamInfo`] sidecar, so a frame can
/// be decoded as soon as the 32-bit words covering it are in the buffer.
pub struct StreamingDecoder {
    info: StreamInfo,
    decoder: Decoder,
    /// incoming data buffer
    buffer: Vec<u8>,
    state: DecoderState,
    /// next frame to decode
    current_frame: usize,
}

impl StreamingDecoder {
    /// the frame table is checked here, before it sizes anything
    pub fn new(info: StreamInfo) -> MacResult<Self> {
        let decoder = Decoder::from_info(&info)?;
        let mut streaming = Self {
            buffer: Vec::with_capacity(64 * 1024),
            state: DecoderState::NeedData,
            info,
            decoder,
            current_frame: 0,
        };
        streaming.refresh_state();
        Ok(streaming)
    }

    pub fn info(&self) -> &StreamInfo {
        &self.info
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    /// feed more data, returns true if a frame is ready
    pub fn feed(&mut self, data: &[u8]) -> bool {
        if matches!(self.state, DecoderState::Corrupt | DecoderState::Finished) {
            return false;
        }
        self.buffer.extend_from_slice(data);
        self.refresh_state();
        self.state == DecoderState::Ready
    }

    /// decode the next frame, `None` until its bytes are here
    pub fn next_frame(&mut self) -> MacResult<Option<Vec<u8>>> {
        match self.state {
            DecoderState::Corrupt => return Err(MacError::Poisoned),
            DecoderState::Ready => {}
            _ => return Ok(None),
        }

        let number = self.current_frame;
        let frame = self.info.frames[number];
        let pcm = match self.decoder.decode_frame(&self.buffer, &frame, number as u32) {
            Ok(pcm) => pcm,
            Err(e) => {
                warn!(frame = number, "streaming decode stopped: {}", e);
                self.state = DecoderState::Corrupt;
                return Err(e);
            }
        };

        self.current_frame += 1;
        self.refresh_state();
        Ok(Some(pcm))
    }

    /// decode every frame that is ready
    pub fn decode_available(&mut self) -> MacResult<Vec<u8>> {
        let mut pcm = Vec::new();
        while let Some(frame) = self.next_frame()? {
            pcm.extend_from_slice(&frame);
        }
        Ok(pcm)
    }

    /// frames ready to decode
    pub fn frames_available(&self) -> usize {
        if self.state == DecoderState::Corrupt {
            return 0;
        }
        (self.current_frame..self.info.frames.len())
            .take_while(|&n| self.frame_complete(n))
            .count()
    }

    /// bytes buffered
    pub fn buffered_bytes(&self) -> usize {
        self.buffer.len()
    }

    pub fn current_frame_index(&self) -> usize {
        self.current_frame
    }

    /// start over with the same stream info
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.current_frame = 0;
        self.state = DecoderState::NeedData;
        self.refresh_state();
    }

    // internal stuff

    /// a frame ends where the next one starts; reads touch whole words
    fn frame_end(&self, n: usize) -> u64 {
        let total = self.info.compressed_bytes;
        match self.info.frames.get(n + 1) {
            Some(next) => ((next.offset + 3) & !3).min(total),
            None => total,
        }
    }

    fn frame_complete(&self, n: usize) -> bool {
        self.buffer.len() as u64 >= self.frame_end(n)
    }

    fn refresh_state(&mut self) {
        if self.state == DecoderState::Corrupt {
            return;
        }
        let previous = self.state;
        self.state = if self.current_frame >= self.info.frames.len() {
            DecoderState::Finished
        } else if self.frame_complete(self.current_frame) {
            DecoderState::Ready
        } else {
            DecoderState::NeedData
        };
        if previous != self.state {
            debug!(
                frame = self.current_frame,
                buffered = self.buffer.len(),
                "streaming decoder is now {:?}",
                self.state
            );
        }
    }
}
