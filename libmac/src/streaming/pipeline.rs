use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Sender};
use tracing::{debug, error};

use crate::core::{CompressionLevel, EncodedStream, MacError, MacResult, WaveFormat};

use super::encoder::StreamingEncoder;

/// PCM chunks in flight before `send` blocks
pub const DEFAULT_QUEUE_DEPTH: usize = 8;

/// handle to an encoder running on its own thread
///
/// The thread owns every piece of codec state; callers only hand over PCM.
pub struct EncoderPipeline {
    sender: Option<Sender<Vec<u8>>>,
    handle: Option<JoinHandle<MacResult<EncodedStream>>>,
}

/// start an encoder thread fed through a bounded channel
pub fn spawn_encoder(
    format: WaveFormat,
    level: CompressionLevel,
    blocks_per_frame: Option<u32>,
    queue_depth: usize,
) -> MacResult<EncoderPipeline> {
    let mut encoder = StreamingEncoder::new(format)?.with_level(level)?;
    if let Some(blocks) = blocks_per_frame {
        encoder = encoder.with_blocks_per_frame(blocks)?;
    }

    let (sender, receiver) = bounded::<Vec<u8>>(queue_depth.max(1));
    let handle = thread::Builder::new()
        .name("mac-encoder".into())
        .spawn(move || {
            // frames stay in the encoder's output, the stream is returned whole
            for chunk in receiver {
                encoder.push_pcm(&chunk)?;
            }
            debug!("encoder thread draining");
            encoder.finish()
        })?;

    Ok(EncoderPipeline {
        sender: Some(sender),
        handle: Some(handle),
    })
}

impl EncoderPipeline {
    /// queue a chunk of PCM, blocks while the queue is full
    pub fn send(&self, pcm: Vec<u8>) -> MacResult<()> {
        let sender = self.sender.as_ref().ok_or(MacError::Poisoned)?;
        // a closed channel means the thread already returned an error
        sender.send(pcm).map_err(|_| MacError::Poisoned)
    }

    /// close the input and wait for the finished stream
    pub fn finish(mut self) -> MacResult<EncodedStream> {
        self.sender.take();
        let handle = self.handle.take().ok_or(MacError::Poisoned)?;
        match handle.join() {
            Ok(result) => result,
            Err(_) => {
                error!("encoder thread panicked");
                Err(MacError::Poisoned)
            }
        }
    }
}

impl Drop for EncoderPipeline {
    fn drop(&mut self) {
        self.sender.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
