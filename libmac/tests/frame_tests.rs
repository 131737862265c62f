use libmac_audio::lossless::{FrameCompressor, FrameDecompressor};
use libmac_audio::{
    decode, encode, samples_to_pcm, CompressionLevel, Decoder, Encoder, MacError, SpecialCodes,
    StreamingDecoder, WaveFormat, MAX_BLOCKS_PER_FRAME,
};

fn stereo16() -> WaveFormat {
    WaveFormat::new(44100, 2, 16).unwrap()
}

fn ramp(blocks: usize, channels: usize) -> Vec<u8> {
    let samples: Vec<i32> = (0..blocks * channels)
        .map(|i| ((i as i32 * 97) % 3001) - 1500)
        .collect();
    samples_to_pcm(&samples, 16)
}

#[test]
fn test_silent_frame_is_tiny() {
    let pcm = vec![0u8; 4096 * 4];
    let stream = encode(&pcm, stereo16(), CompressionLevel::High).unwrap();
    assert!(stream.data.len() < 32, "{} bytes", stream.data.len());
    assert_eq!(stream.info.peak_level, 0);
    assert_eq!(decode(&stream).unwrap(), pcm);

    let mono = WaveFormat::new(8000, 1, 8).unwrap();
    let pcm = vec![128u8; 3000];
    let stream = encode(&pcm, mono, CompressionLevel::Normal).unwrap();
    assert!(stream.data.len() < 32);
    assert_eq!(decode(&stream).unwrap(), pcm);
}

#[test]
fn test_pseudo_stereo_codes_one_channel() {
    let mono: Vec<i32> = (0..4000).map(|i| ((i * 53) % 2001) - 1000).collect();
    let duplicated: Vec<i32> = mono.iter().flat_map(|&s| [s, s]).collect();
    let pcm = samples_to_pcm(&duplicated, 16);

    let mut compressor = FrameCompressor::new(Vec::new(), stereo16(), CompressionLevel::Normal).unwrap();
    let summary = compressor.compress_frame(&pcm).unwrap();
    assert_eq!(summary.special, SpecialCodes::PSEUDO_STEREO);
    let (data, _, _) = compressor.finish().unwrap();

    let mut decompressor = FrameDecompressor::new(stereo16(), CompressionLevel::Normal).unwrap();
    let (decoded, _) = decompressor.decompress_frame(&data, 0, 4000, 0).unwrap();
    assert_eq!(decoded, pcm);

    // the same signal as true stereo needs two coded channels
    let distinct: Vec<i32> = mono.iter().flat_map(|&s| [s, s / 2]).collect();
    let stereo = encode(&samples_to_pcm(&distinct, 16), stereo16(), CompressionLevel::Normal).unwrap();
    assert!(data.len() < stereo.data.len());
}

#[test]
fn test_one_silent_channel() {
    let samples: Vec<i32> = (0..3000).flat_map(|i| [0, (i % 200) - 100]).collect();
    let pcm = samples_to_pcm(&samples, 16);

    let mut compressor = FrameCompressor::new(Vec::new(), stereo16(), CompressionLevel::Fast).unwrap();
    let summary = compressor.compress_frame(&pcm).unwrap();
    assert!(summary.special.contains(SpecialCodes::RIGHT_SILENCE));
    assert!(!summary.special.contains(SpecialCodes::LEFT_SILENCE));

    let stream = encode(&pcm, stereo16(), CompressionLevel::Fast).unwrap();
    assert_eq!(decode(&stream).unwrap(), pcm);
}

#[test]
fn test_corrupted_byte_fails_crc() {
    let pcm = ramp(2000, 2);
    let mut stream = encode(&pcm, stereo16(), CompressionLevel::Normal).unwrap();
    let middle = stream.data.len() / 2;
    stream.data[middle] ^= 0x10;

    match decode(&stream) {
        Err(MacError::CrcMismatch { frame, stored, computed }) => {
            assert_eq!(frame, 0);
            assert_ne!(stored, computed);
        }
        other => panic!("expected a CRC mismatch, got {:?}", other.map(|v| v.len())),
    }
}

#[test]
fn test_corruption_stops_at_bad_frame() {
    let pcm = ramp(3000, 2);
    let mut encoder = Encoder::in_memory(stereo16())
        .unwrap()
        .with_blocks_per_frame(1000)
        .unwrap();
    encoder.encode(&pcm).unwrap();
    let mut stream = encoder.finish_stream().unwrap();

    // damage the second frame only
    let target = stream.info.frames[1].offset as usize + 12;
    stream.data[target] ^= 0xFF;

    let mut decoder = Decoder::from_info(&stream.info).unwrap();
    let first = decoder
        .decode_frame(&stream.data, &stream.info.frames[0], 0)
        .unwrap();
    assert_eq!(first, &pcm[..4000]);
    assert!(matches!(
        decoder.decode_encoded(&stream),
        Err(MacError::CrcMismatch { frame: 1, .. })
    ));
}

#[test]
fn test_short_frame_must_be_last() {
    let mut encoder = Encoder::in_memory(stereo16())
        .unwrap()
        .with_blocks_per_frame(100)
        .unwrap();
    encoder.encode_frame(&ramp(100, 2)).unwrap();
    encoder.encode_frame(&ramp(50, 2)).unwrap();
    assert!(matches!(
        encoder.encode_frame(&ramp(100, 2)),
        Err(MacError::InvalidInput(_))
    ));
}

#[test]
fn test_frame_shape_errors() {
    let mut encoder = Encoder::in_memory(stereo16())
        .unwrap()
        .with_blocks_per_frame(100)
        .unwrap();
    assert!(matches!(encoder.encode_frame(&[]), Err(MacError::InvalidInput(_))));
    assert!(matches!(encoder.encode_frame(&[0u8; 6]), Err(MacError::InvalidInput(_))));
    assert!(matches!(
        encoder.encode_frame(&ramp(101, 2)),
        Err(MacError::InvalidInput(_))
    ));
    // rejected frames leave the encoder usable
    encoder.encode_frame(&ramp(100, 2)).unwrap();
    assert_eq!(encoder.frames().len(), 1);
}

#[test]
fn test_frame_offset_out_of_range() {
    let stream = encode(&ramp(100, 2), stereo16(), CompressionLevel::Fast).unwrap();
    let mut decompressor = FrameDecompressor::new(stereo16(), CompressionLevel::Fast).unwrap();
    assert!(matches!(
        decompressor.decompress_frame(&stream.data, stream.data.len() as u64, 10, 0),
        Err(MacError::InvalidInput(_))
    ));
    assert!(matches!(
        decompressor.decompress_frame(&stream.data, 0, 0, 0),
        Err(MacError::InvalidInput(_))
    ));
}

#[test]
fn test_frame_offsets_are_increasing() {
    let pcm = ramp(5000, 2);
    let mut encoder = Encoder::in_memory(stereo16())
        .unwrap()
        .with_blocks_per_frame(512)
        .unwrap();
    encoder.encode(&pcm).unwrap();
    let stream = encoder.finish_stream().unwrap();

    assert_eq!(stream.info.frames[0].offset, 0);
    for pair in stream.info.frames.windows(2) {
        assert!(pair[1].offset > pair[0].offset);
    }
    assert_eq!(stream.info.compressed_bytes % 4, 0);
    assert_eq!(stream.info.compressed_bytes, stream.data.len() as u64);
}

#[test]
fn test_level_mismatch_is_detected() {
    let pcm = ramp(2000, 2);
    let stream = encode(&pcm, stereo16(), CompressionLevel::High).unwrap();
    let mut decoder = Decoder::new(stereo16(), CompressionLevel::Fast).unwrap();
    assert!(matches!(
        decoder.decode_encoded(&stream),
        Err(MacError::CrcMismatch { .. })
    ));
}

#[test]
fn test_inflated_block_count_is_rejected() {
    let pcm = ramp(600, 2);
    let mut stream = encode(&pcm, stereo16(), CompressionLevel::Normal).unwrap();
    stream.info.frames[0].blocks = u32::MAX;

    assert!(matches!(decode(&stream), Err(MacError::InvalidInput(_))));
    assert!(matches!(
        StreamingDecoder::new(stream.info.clone()),
        Err(MacError::InvalidInput(_))
    ));

    // a decoder built without the table still refuses the frame
    let mut decoder = Decoder::new(stereo16(), CompressionLevel::Normal).unwrap();
    assert!(matches!(
        decoder.decode_encoded(&stream),
        Err(MacError::InvalidInput(_))
    ));
    assert!(matches!(
        decoder.decode_frame(&stream.data, &stream.info.frames[0], 0),
        Err(MacError::InvalidInput(_))
    ));
}

#[test]
fn test_frame_table_must_agree_with_itself() {
    let pcm = ramp(3000, 2);
    let mut encoder = Encoder::in_memory(stereo16())
        .unwrap()
        .with_blocks_per_frame(1000)
        .unwrap();
    encoder.encode(&pcm).unwrap();
    let stream = encoder.finish_stream().unwrap();
    assert!(stream.info.validate().is_ok());

    // a frame larger than the declared frame size
    let mut info = stream.info.clone();
    info.frames[1].blocks = 1001;
    info.total_blocks += 1;
    assert!(matches!(info.validate(), Err(MacError::InvalidInput(_))));

    // total that disagrees with the table
    let mut info = stream.info.clone();
    info.total_blocks = u64::MAX;
    assert!(matches!(info.validate(), Err(MacError::InvalidInput(_))));
    assert_eq!(info.uncompressed_bytes(), u64::MAX);

    // offsets out of order or past the end
    let mut info = stream.info.clone();
    info.frames[2].offset = info.frames[1].offset;
    assert!(info.validate().is_err());
    let mut info = stream.info.clone();
    info.frames[2].offset = u64::MAX;
    assert!(info.validate().is_err());

    // absurd frame size
    let mut info = stream.info.clone();
    info.blocks_per_frame = MAX_BLOCKS_PER_FRAME + 1;
    assert!(Decoder::from_info(&info).is_err());
}

#[test]
fn test_decoded_capacity_is_bounded_by_stream_size() {
    let stream = encode(&ramp(1000, 2), stereo16(), CompressionLevel::Fast).unwrap();
    let mut info = stream.info.clone();
    let expected = 4000u64.min(info.compressed_bytes * 8);
    assert_eq!(info.decoded_capacity() as u64, expected);

    info.total_blocks = u64::MAX / 2;
    assert_eq!(info.decoded_capacity() as u64, info.compressed_bytes * 8);
}

#[test]
fn test_level_is_fixed_once_frames_are_written() {
    // switching before the first frame is fine
    let mut encoder = Encoder::in_memory(stereo16())
        .unwrap()
        .with_level(CompressionLevel::Normal)
        .unwrap()
        .with_blocks_per_frame(500)
        .unwrap();
    encoder.encode_frame(&ramp(500, 2)).unwrap();
    assert!(matches!(
        encoder.with_level(CompressionLevel::Insane),
        Err(MacError::InvalidInput(_))
    ));

    let mut encoder = Encoder::in_memory(stereo16()).unwrap();
    encoder.encode_frame(&ramp(100, 2)).unwrap();
    assert!(matches!(
        encoder.with_blocks_per_frame(50),
        Err(MacError::InvalidInput(_))
    ));

    let mut compressor =
        FrameCompressor::new(Vec::new(), stereo16(), CompressionLevel::Normal).unwrap();
    compressor.set_level(CompressionLevel::High).unwrap();
    compressor.compress_frame(&ramp(100, 2)).unwrap();
    assert!(compressor.set_level(CompressionLevel::Insane).is_err());
    assert_eq!(compressor.level(), CompressionLevel::High);
}

#[test]
fn test_frame_size_limits() {
    assert!(matches!(
        Encoder::in_memory(stereo16()).unwrap().with_blocks_per_frame(0),
        Err(MacError::InvalidInput(_))
    ));
    assert!(Encoder::in_memory(stereo16())
        .unwrap()
        .with_blocks_per_frame(MAX_BLOCKS_PER_FRAME + 1)
        .is_err());

    let mut decompressor = FrameDecompressor::new(stereo16(), CompressionLevel::Fast).unwrap();
    assert_eq!(decompressor.max_blocks(), CompressionLevel::Fast.blocks_per_frame());
    assert!(decompressor.set_max_blocks(0).is_err());
    decompressor.set_max_blocks(10).unwrap();
    let stream = encode(&ramp(100, 2), stereo16(), CompressionLevel::Fast).unwrap();
    assert!(matches!(
        decompressor.decompress_frame(&stream.data, 0, 11, 0),
        Err(MacError::InvalidInput(_))
    ));
}
