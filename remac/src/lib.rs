//! remac - converter library for the libmac codec
//!
//! Reads integer PCM from WAV or FLAC, writes the compressed stream plus a
//! JSON sidecar holding the frame table, and turns both back into WAV.
//!

pub mod audio;
pub mod logging;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub use libmac_audio::{CompressionLevel, EncodedStream, StreamInfo, WaveFormat};
use libmac_audio::{
    spawn_encoder, Decoder, DecoderState, MacError, StreamingDecoder, DEFAULT_QUEUE_DEPTH,
};

use audio::PcmAudio;

/// PCM bytes handed to the encoder thread at a time
const ENCODE_CHUNK_BYTES: usize = 64 * 1024;

/// compressed bytes read per step when streaming a decode
const DECODE_CHUNK_BYTES: usize = 16 * 1024;

/// Options for encoding
#[derive(Debug, Clone, Copy, Default)]
pub struct EncodeOptions {
    pub level: CompressionLevel,
    /// frame length override, the level picks one otherwise
    pub frame_blocks: Option<u32>,
}

impl EncodeOptions {
    pub fn with_level(mut self, level: CompressionLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_frame_blocks(mut self, blocks: u32) -> Self {
        self.frame_blocks = Some(blocks);
        self
    }
}

/// The JSON file stored next to a compressed stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sidecar {
    pub stream: StreamInfo,
    /// "remac x.y.z"
    pub encoder: String,
    /// RFC 3339 UTC timestamp
    pub encoded_at: String,
    pub source_format: Option<String>,
}

impl Sidecar {
    pub fn new(stream: StreamInfo, source_format: Option<String>) -> Self {
        Sidecar {
            stream,
            encoder: format!("remac {}", env!("CARGO_PKG_VERSION")),
            encoded_at: chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            source_format,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize sidecar")
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let sidecar: Sidecar = serde_json::from_str(json).context("Invalid sidecar")?;
        sidecar
            .stream
            .validate()
            .map_err(|e| anyhow::anyhow!("Invalid sidecar: {}", e))?;
        Ok(sidecar)
    }
}

/// `song.mac` -> `song.mac.json`
pub fn sidecar_path(stream_path: &Path) -> PathBuf {
    let mut name = stream_path.as_os_str().to_owned();
    name.push(".json");
    PathBuf::from(name)
}

pub fn read_sidecar(stream_path: &Path) -> Result<Sidecar> {
    let path = sidecar_path(stream_path);
    let json = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read sidecar {}", path.display()))?;
    Sidecar::from_json(&json)
}

pub fn write_sidecar(stream_path: &Path, sidecar: &Sidecar) -> Result<()> {
    let path = sidecar_path(stream_path);
    std::fs::write(&path, sidecar.to_json()?)
        .with_context(|| format!("Failed to write sidecar {}", path.display()))
}

/// Compress PCM on an encoder thread, feeding it in chunks
pub fn encode_pcm(audio: &PcmAudio, options: EncodeOptions) -> Result<(Vec<u8>, Sidecar)> {
    let pipeline = spawn_encoder(
        audio.format,
        options.level,
        options.frame_blocks,
        DEFAULT_QUEUE_DEPTH,
    )
    .map_err(|e| anyhow::anyhow!("Failed to start encoder: {}", e))?;

    let mut sent = Ok(());
    for chunk in audio.pcm.chunks(ENCODE_CHUNK_BYTES) {
        sent = pipeline.send(chunk.to_vec());
        if sent.is_err() {
            break;
        }
    }

    // the thread's own error says more than a closed channel
    let stream = match (pipeline.finish(), sent) {
        (Ok(stream), Ok(())) => stream,
        (Err(e), _) | (Ok(_), Err(e)) => bail!("Encoding failed: {}", e),
    };

    info!(
        blocks = stream.info.total_blocks,
        frames = stream.info.frames.len(),
        bytes = stream.data.len(),
        "encoded"
    );
    let sidecar = Sidecar::new(stream.info, audio.source_format.clone());
    Ok((stream.data, sidecar))
}

/// Read a WAV/FLAC file in memory and compress it
pub fn encode_from_audio(
    audio_bytes: &[u8],
    extension: Option<&str>,
    options: EncodeOptions,
) -> Result<(Vec<u8>, Sidecar)> {
    let audio = audio::read_audio_from_bytes(audio_bytes, extension)
        .context("Failed to read audio")?;
    encode_pcm(&audio, options)
}

/// Decode a stream as its bytes come off `reader`, writing PCM to `out`
///
/// Returns the number of PCM bytes written. Stops at the first frame that
/// fails its CRC.
pub fn decode_stream<R: Read, W: Write>(
    mut reader: R,
    info: &StreamInfo,
    mut out: W,
) -> Result<u64> {
    let mut decoder = StreamingDecoder::new(info.clone())
        .map_err(|e| anyhow::anyhow!("Invalid stream info: {}", e))?;
    let mut chunk = vec![0u8; DECODE_CHUNK_BYTES];
    let mut written = 0u64;

    loop {
        while let Some(pcm) = decoder
            .next_frame()
            .map_err(|e| anyhow::anyhow!("Decoding failed: {}", e))?
        {
            out.write_all(&pcm)?;
            written += pcm.len() as u64;
        }
        if decoder.state() == DecoderState::Finished {
            break;
        }

        let read = reader.read(&mut chunk).context("Failed to read stream")?;
        if read == 0 {
            bail!(
                "Stream ended after {} of {} frames",
                decoder.current_frame_index(),
                info.frames.len()
            );
        }
        decoder.feed(&chunk[..read]);
    }

    out.flush()?;
    debug!(bytes = written, "stream decoded");
    Ok(written)
}

/// Decode a whole stream to WAV bytes
pub fn decode_to_wav(data: &[u8], sidecar: &Sidecar) -> Result<Vec<u8>> {
    let info = &sidecar.stream;
    let mut pcm = Vec::with_capacity(info.decoded_capacity());
    decode_stream(data, info, &mut pcm)?;
    audio::write_wav_to_bytes(&pcm, &info.format)
}

/// Outcome of checking a stream against its sidecar
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerifyReport {
    pub frames: usize,
    pub frames_ok: usize,
    pub md5_ok: bool,
    pub size_ok: bool,
    pub first_error: Option<String>,
}

impl VerifyReport {
    pub fn is_ok(&self) -> bool {
        self.md5_ok && self.size_ok && self.frames_ok == self.frames
    }
}

/// Decode every frame and compare the stream digest with the sidecar
pub fn verify(data: &[u8], sidecar: &Sidecar) -> Result<VerifyReport> {
    use md5::{Digest, Md5};

    let info = &sidecar.stream;
    let digest: [u8; 16] = Md5::digest(data).into();
    let md5_ok = digest == info.md5;
    if !md5_ok {
        warn!("stream digest does not match the sidecar");
    }

    let mut decoder =
        Decoder::from_info(info).map_err(|e| anyhow::anyhow!("Invalid stream info: {}", e))?;
    let mut frames_ok = 0;
    let mut first_error = None;
    for (number, frame) in info.frames.iter().enumerate() {
        match decoder.decode_frame(data, frame, number as u32) {
            Ok(_) => frames_ok += 1,
            Err(e @ MacError::CrcMismatch { .. }) | Err(e @ MacError::InvalidInput(_)) => {
                first_error = Some(e.to_string());
                break;
            }
            Err(e) => return Err(anyhow::anyhow!("Verification failed: {}", e)),
        }
    }

    Ok(VerifyReport {
        frames: info.frames.len(),
        frames_ok,
        md5_ok,
        size_ok: data.len() as u64 == info.compressed_bytes,
        first_error,
    })
}
