use wasm_bindgen::prelude::*;

pub mod core;
pub mod lossless;
pub mod streaming;

pub use core::{
    compute_crc32, CompressionLevel, EncodedStream, FrameIndex, MacError, MacResult,
    SpecialCodes, StreamInfo, WaveFormat, BLOCKS_PER_FRAME, CODEC_VERSION, MAX_BLOCKS_PER_FRAME,
};
pub use lossless::{pcm_to_samples, samples_to_pcm, Decoder, Encoder};
pub use streaming::{
    spawn_encoder, DecoderState, EncodedFrame, EncoderPipeline, StreamingDecoder,
    StreamingEncoder, DEFAULT_QUEUE_DEPTH,
};

// native api

/// compress interleaved little-endian PCM in one go
///
/// # Arguments
/// * `pcm` - interleaved PCM, 8-bit unsigned or 16/24-bit signed
/// * `format` - layout of `pcm`
/// * `level` - compression level
///
/// # Returns
/// the compressed bytes together with the frame table and digest
pub fn encode(pcm: &[u8], format: WaveFormat, level: CompressionLevel) -> MacResult<EncodedStream> {
    let mut encoder = Encoder::in_memory(format)?.with_level(level)?;
    encoder.encode(pcm)?;
    encoder.finish_stream()
}

/// decompress a whole stream, every frame is CRC checked
pub fn decode(stream: &EncodedStream) -> MacResult<Vec<u8>> {
    let mut decoder = Decoder::from_info(&stream.info)?;
    decoder.decode_encoded(stream)
}

// wasm api

/// turn an error into js
fn to_js_err(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&e.to_string())
}

/// compress PCM, returns `{ data, info }`
///
/// # Arguments
/// * `pcm` - interleaved PCM bytes
/// * `sample_rate` - Sample rate in Hz (e.g., 44100)
/// * `channels` - 1 or 2
/// * `bits_per_sample` - 8, 16 or 24
/// * `level` - 1000 to 5000 in steps of 1000
#[wasm_bindgen(js_name = encode)]
pub fn encode_js(
    pcm: &[u8],
    sample_rate: u32,
    channels: u16,
    bits_per_sample: u16,
    level: u16,
) -> Result<JsValue, JsValue> {
    #[cfg(target_arch = "wasm32")]
    console_error_panic_hook::set_once();

    let format = WaveFormat::new(sample_rate, channels, bits_per_sample).map_err(to_js_err)?;
    let level = CompressionLevel::try_from(level).map_err(to_js_err)?;
    let stream = encode(pcm, format, level).map_err(to_js_err)?;

    serde_wasm_bindgen::to_value(&stream)
        .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
}

/// decompress a `{ data, info }` object back to PCM bytes
#[wasm_bindgen(js_name = decode)]
pub fn decode_js(stream: JsValue) -> Result<Vec<u8>, JsValue> {
    #[cfg(target_arch = "wasm32")]
    console_error_panic_hook::set_once();

    let stream: EncodedStream = serde_wasm_bindgen::from_value(stream)
        .map_err(|e| JsValue::from_str(&format!("Invalid stream: {}", e)))?;
    decode(&stream).map_err(to_js_err)
}

/// get lib version
#[wasm_bindgen]
pub fn version() -> String {
    CODEC_VERSION.to_string()
}
