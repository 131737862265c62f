use libmac_audio::{
    decode, samples_to_pcm, spawn_encoder, CompressionLevel, DecoderState, StreamingDecoder,
    StreamingEncoder, WaveFormat,
};

fn source(blocks: usize) -> Vec<u8> {
    let samples: Vec<i32> = (0..blocks)
        .flat_map(|i| {
            let v = ((i as f64 * 0.05).sin() * 12000.0) as i32;
            [v, v / 3 + (i as i32 % 7)]
        })
        .collect();
    samples_to_pcm(&samples, 16)
}

#[test]
fn test_producer_thread_to_streaming_decoder() {
    let format = WaveFormat::new(44100, 2, 16).unwrap();
    let pcm = source(9000);

    let pipeline = spawn_encoder(format, CompressionLevel::High, Some(2000), 2).unwrap();
    let producer = {
        let pcm = pcm.clone();
        std::thread::spawn(move || {
            for chunk in pcm.chunks(4100) {
                pipeline.send(chunk.to_vec()).unwrap();
            }
            pipeline.finish().unwrap()
        })
    };
    let stream = producer.join().unwrap();
    assert_eq!(stream.info.frames.len(), 5);
    assert_eq!(decode(&stream).unwrap(), pcm);

    let mut decoder = StreamingDecoder::new(stream.info.clone()).unwrap();
    let mut out = Vec::new();
    for chunk in stream.data.chunks(1000) {
        if decoder.feed(chunk) {
            out.extend_from_slice(&decoder.decode_available().unwrap());
        }
    }
    assert_eq!(decoder.state(), DecoderState::Finished);
    assert_eq!(out, pcm);
}

#[test]
fn test_streaming_encoder_frames_rebuild_stream() {
    let format = WaveFormat::new(44100, 2, 16).unwrap();
    let pcm = source(3500);

    let mut encoder = StreamingEncoder::new(format)
        .unwrap()
        .with_level(CompressionLevel::Fast)
        .unwrap()
        .with_blocks_per_frame(1000)
        .unwrap();
    let mut bytes = Vec::new();
    for chunk in pcm.chunks(999) {
        encoder.push_pcm(chunk).unwrap();
        while let Some(frame) = encoder.next_frame() {
            bytes.extend_from_slice(&frame.data);
        }
    }
    assert_eq!(encoder.pending_blocks(), 500);

    let stream = encoder.finish().unwrap();
    assert!(stream.data.starts_with(&bytes));
    assert_eq!(decode(&stream).unwrap(), pcm);
}

#[test]
fn test_empty_stream_is_finished() {
    let format = WaveFormat::new(44100, 1, 16).unwrap();
    let stream = StreamingEncoder::new(format).unwrap().finish().unwrap();
    let decoder = StreamingDecoder::new(stream.info).unwrap();
    assert_eq!(decoder.state(), DecoderState::Finished);
}
