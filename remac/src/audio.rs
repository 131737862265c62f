use anyhow::{bail, Context, Result};
use libmac_audio::{samples_to_pcm, WaveFormat};
use std::io::{Cursor, Write};
use std::path::Path;
use symphonia::core::audio::{AudioBufferRef, Signal};
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

/// Integer PCM read from a source file
#[derive(Debug, Clone)]
pub struct PcmAudio {
    pub format: WaveFormat,
    /// interleaved little-endian PCM, 8-bit data unsigned
    pub pcm: Vec<u8>,
    /// Source format (e.g., "FLAC", "WAV")
    pub source_format: Option<String>,
}

impl PcmAudio {
    pub fn blocks(&self) -> usize {
        self.pcm.len() / self.format.block_align()
    }

    pub fn duration_secs(&self) -> f64 {
        self.blocks() as f64 / self.format.sample_rate as f64
    }
}

/// Read an audio file into integer PCM at its own bit depth
pub fn read_audio_file(path: &Path) -> Result<PcmAudio> {
    let file = std::fs::File::open(path).context("Failed to open audio file")?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());
    read_from_source(mss, path.extension().and_then(|e| e.to_str()))
}

/// Read audio from bytes, `extension` is only a probing hint
pub fn read_audio_from_bytes(bytes: &[u8], extension: Option<&str>) -> Result<PcmAudio> {
    let cursor = Cursor::new(bytes.to_vec());
    let mss = MediaSourceStream::new(Box::new(cursor), Default::default());
    read_from_source(mss, extension)
}

fn read_from_source(mss: MediaSourceStream, extension: Option<&str>) -> Result<PcmAudio> {
    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .context("Unsupported audio format")?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .context("No audio track found")?;

    let source_format = Some(match extension {
        Some(ext) => ext.to_uppercase(),
        None => match track.codec_params.codec {
            symphonia::core::codecs::CODEC_TYPE_FLAC => "FLAC".to_string(),
            symphonia::core::codecs::CODEC_TYPE_PCM_U8
            | symphonia::core::codecs::CODEC_TYPE_PCM_S16LE
            | symphonia::core::codecs::CODEC_TYPE_PCM_S24LE => "WAV".to_string(),
            _ => "UNKNOWN".to_string(),
        },
    });

    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .context("Unknown sample rate")?;
    let channels = track
        .codec_params
        .channels
        .context("Unknown channel count")?
        .count();
    let bits_per_sample = track
        .codec_params
        .bits_per_sample
        .context("Unknown bit depth, only integer PCM sources can be compressed")?;

    let wave_format = WaveFormat::new(sample_rate, channels as u16, bits_per_sample as u16)
        .map_err(|e| anyhow::anyhow!("Cannot compress this source: {}", e))?;
    debug!(
        sample_rate,
        channels, bits_per_sample, "probed source track"
    );

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .context("Failed to create decoder")?;

    let mut samples = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break
            }
            Err(e) => return Err(e).context("Error reading packet"),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(symphonia::core::errors::Error::DecodeError(e)) => {
                // a dropped packet would make the output lossy
                bail!("Source packet failed to decode: {}", e);
            }
            Err(e) => return Err(e).context("Error decoding packet"),
        };

        append_samples(&decoded, &mut samples, channels, bits_per_sample)?;
    }

    Ok(PcmAudio {
        format: wave_format,
        pcm: samples_to_pcm(&samples, wave_format.bits_per_sample),
        source_format,
    })
}

/// interleave one decoded buffer as integers at the source bit depth
fn append_samples(
    buffer: &AudioBufferRef,
    samples: &mut Vec<i32>,
    channels: usize,
    bits_per_sample: u32,
) -> Result<()> {
    match buffer {
        AudioBufferRef::U8(buf) => {
            for frame in 0..buf.frames() {
                for ch in 0..channels {
                    samples.push(buf.chan(ch)[frame] as i32 - 128);
                }
            }
        }
        AudioBufferRef::S8(buf) => {
            for frame in 0..buf.frames() {
                for ch in 0..channels {
                    samples.push(buf.chan(ch)[frame] as i32);
                }
            }
        }
        AudioBufferRef::S16(buf) => {
            for frame in 0..buf.frames() {
                for ch in 0..channels {
                    samples.push(buf.chan(ch)[frame] as i32);
                }
            }
        }
        AudioBufferRef::S24(buf) => {
            for frame in 0..buf.frames() {
                for ch in 0..channels {
                    samples.push(buf.chan(ch)[frame].inner());
                }
            }
        }
        AudioBufferRef::S32(buf) => {
            // narrower sources arrive left-justified in 32 bits
            let shift = 32 - bits_per_sample.min(32);
            for frame in 0..buf.frames() {
                for ch in 0..channels {
                    samples.push(buf.chan(ch)[frame] >> shift);
                }
            }
        }
        AudioBufferRef::F32(_) | AudioBufferRef::F64(_) => {
            bail!("Floating point sources cannot be compressed losslessly");
        }
        _ => {
            warn!("unsupported sample layout in source buffer");
            bail!("Unsupported sample layout, expected signed integer PCM");
        }
    }
    Ok(())
}

/// canonical 44-byte header for integer PCM
pub fn wav_header(format: &WaveFormat, data_size: u32) -> Vec<u8> {
    let mut header = Vec::with_capacity(44);
    let block_align = format.block_align() as u16;
    let byte_rate = format.sample_rate.saturating_mul(block_align as u32);

    header.extend_from_slice(b"RIFF");
    header.extend_from_slice(&(36u32.saturating_add(data_size)).to_le_bytes());
    header.extend_from_slice(b"WAVE");

    header.extend_from_slice(b"fmt ");
    header.extend_from_slice(&16u32.to_le_bytes());
    header.extend_from_slice(&1u16.to_le_bytes()); // integer PCM
    header.extend_from_slice(&format.channels.to_le_bytes());
    header.extend_from_slice(&format.sample_rate.to_le_bytes());
    header.extend_from_slice(&byte_rate.to_le_bytes());
    header.extend_from_slice(&block_align.to_le_bytes());
    header.extend_from_slice(&format.bits_per_sample.to_le_bytes());

    header.extend_from_slice(b"data");
    header.extend_from_slice(&data_size.to_le_bytes());
    header
}

/// Write PCM to a WAV file
pub fn write_wav(path: &Path, pcm: &[u8], format: &WaveFormat) -> Result<()> {
    let bytes = write_wav_to_bytes(pcm, format)?;
    std::fs::write(path, bytes).context("Failed to write WAV file")
}

/// Write PCM to WAV format in memory
pub fn write_wav_to_bytes(pcm: &[u8], format: &WaveFormat) -> Result<Vec<u8>> {
    let data_size = u32::try_from(pcm.len()).context("PCM too large for a WAV file")?;
    let mut buffer = wav_header(format, data_size);
    buffer.write_all(pcm)?;
    if pcm.len() % 2 == 1 {
        // RIFF chunks are word aligned
        buffer.push(0);
    }
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use libmac_audio::pcm_to_samples;

    #[test]
    fn test_wav_roundtrip_through_symphonia() {
        for (channels, bits) in [(1u16, 8u16), (2, 16), (2, 24)] {
            let format = WaveFormat::new(22050, channels, bits).unwrap();
            let limit = (1i32 << (bits - 1)) - 1;
            let samples: Vec<i32> = (0..4000i32)
                .map(|i| ((i * 131) % (2 * limit)) - limit)
                .collect();
            let pcm = samples_to_pcm(&samples, bits);

            let wav = write_wav_to_bytes(&pcm, &format).unwrap();
            let audio = read_audio_from_bytes(&wav, Some("wav")).unwrap();

            assert_eq!(audio.format, format);
            assert_eq!(pcm_to_samples(&audio.pcm, bits), samples);
            assert_eq!(audio.source_format.as_deref(), Some("WAV"));
        }
    }

    #[test]
    fn test_header_layout() {
        let format = WaveFormat::new(44100, 2, 16).unwrap();
        let header = wav_header(&format, 400);
        assert_eq!(header.len(), 44);
        assert_eq!(&header[0..4], b"RIFF");
        assert_eq!(u32::from_le_bytes([header[4], header[5], header[6], header[7]]), 436);
        assert_eq!(u16::from_le_bytes([header[32], header[33]]), 4);
        assert_eq!(u16::from_le_bytes([header[34], header[35]]), 16);
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(read_audio_from_bytes(b"definitely not audio", None).is_err());
    }
}
