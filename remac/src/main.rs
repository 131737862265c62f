use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use remac::logging::{init_logging, LogLevel};
use remac::{CompressionLevel, EncodeOptions};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "remac")]
#[command(version)]
#[command(about = "Lossless audio compressor built on libmac", long_about = None)]
struct Cli {
    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compress a WAV or FLAC file
    Encode {
        /// Input audio file (wav, flac)
        input: PathBuf,
        /// Output stream, the sidecar goes next to it as <output>.json
        output: PathBuf,
        /// Compression level (fast, normal, high, extra-high, insane or 1000-5000)
        #[arg(short, long, default_value = "normal")]
        level: CompressionLevel,
        /// Blocks per frame, defaults to the level's frame size
        #[arg(long)]
        frame_blocks: Option<u32>,
    },
    /// Decompress a stream to WAV
    Decode {
        /// Input stream (its sidecar must sit next to it)
        input: PathBuf,
        /// Output WAV file
        output: PathBuf,
    },
    /// Show information about a stream
    Info {
        /// Input stream
        input: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check every frame and the stream digest
    Verify {
        /// Input stream
        input: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(LogLevel::from_verbosity(cli.verbose));

    match cli.command {
        Commands::Encode {
            input,
            output,
            level,
            frame_blocks,
        } => {
            let mut options = EncodeOptions::default().with_level(level);
            if let Some(blocks) = frame_blocks {
                if blocks == 0 {
                    bail!("--frame-blocks must be at least 1");
                }
                options = options.with_frame_blocks(blocks);
            }
            encode(&input, &output, options)?;
        }
        Commands::Decode { input, output } => {
            decode(&input, &output)?;
        }
        Commands::Info { input, json } => {
            info(&input, json)?;
        }
        Commands::Verify { input } => {
            verify(&input)?;
        }
    }

    Ok(())
}

fn encode(input: &Path, output: &Path, options: EncodeOptions) -> Result<()> {
    println!("Reading {}...", input.display());

    let audio = remac::audio::read_audio_file(input).context("Failed to read audio file")?;

    println!("  Sample rate: {} Hz", audio.format.sample_rate);
    println!("  Channels: {}", audio.format.channels);
    println!("  Bit depth: {}", audio.format.bits_per_sample);
    println!("  Duration: {:.2}s", audio.duration_secs());

    println!("Encoding ({})...", options.level);
    let (data, sidecar) = remac::encode_pcm(&audio, options)?;

    fs::write(output, &data).context("Failed to write output file")?;
    remac::write_sidecar(output, &sidecar)?;

    println!("Done!");
    println!("  Output: {}", output.display());
    println!("  Sidecar: {}", remac::sidecar_path(output).display());
    println!(
        "  Size: {} bytes ({:.2}x compression)",
        data.len(),
        sidecar.stream.compression_ratio()
    );

    Ok(())
}

fn decode(input: &Path, output: &Path) -> Result<()> {
    println!("Reading {}...", input.display());

    let sidecar = remac::read_sidecar(input)?;
    let format = sidecar.stream.format;

    println!("  Sample rate: {} Hz", format.sample_rate);
    println!("  Channels: {}", format.channels);
    println!("  Duration: {:.2}s", sidecar.stream.duration_secs());

    println!("Decoding...");

    // header first, PCM is streamed in behind it
    let data_size = u32::try_from(sidecar.stream.uncompressed_bytes())
        .context("Decoded audio too large for a WAV file")?;
    let source = fs::File::open(input).context("Failed to open stream")?;
    let mut sink = std::io::BufWriter::new(
        fs::File::create(output).context("Failed to create WAV file")?,
    );
    std::io::Write::write_all(&mut sink, &remac::audio::wav_header(&format, data_size))?;
    let written = remac::decode_stream(std::io::BufReader::new(source), &sidecar.stream, &mut sink)?;
    if written % 2 == 1 {
        std::io::Write::write_all(&mut sink, &[0])?;
    }
    std::io::Write::flush(&mut sink)?;

    println!("Done!");
    println!("  Output: {}", output.display());

    Ok(())
}

fn info(input: &Path, json: bool) -> Result<()> {
    let sidecar = remac::read_sidecar(input)?;

    if json {
        println!("{}", sidecar.to_json()?);
        return Ok(());
    }

    let stream = &sidecar.stream;
    println!("libmac Stream");
    println!("───────────────────────────────");
    println!("  Codec:       {}", stream.version);
    println!("  Encoder:     {}", sidecar.encoder);
    println!("  Encoded at:  {}", sidecar.encoded_at);
    if let Some(ref source) = sidecar.source_format {
        println!("  Source:      {}", source);
    }
    println!("  Level:       {} ({})", stream.level, stream.level.value());
    println!("  Sample rate: {} Hz", stream.format.sample_rate);
    println!("  Channels:    {}", stream.format.channels);
    println!("  Bit depth:   {}", stream.format.bits_per_sample);
    println!("  Duration:    {:.2}s", stream.duration_secs());
    println!("  Frames:      {}", stream.frames.len());
    println!("  Frame size:  {} blocks", stream.blocks_per_frame);
    println!("  Peak level:  {}", stream.peak_level);
    println!("  Stream size: {} bytes", stream.compressed_bytes);
    println!("  Compression: {:.2}x", stream.compression_ratio());
    println!("  MD5:         {}", stream.md5_hex());

    Ok(())
}

fn verify(input: &Path) -> Result<()> {
    let sidecar = remac::read_sidecar(input)?;
    let data = fs::read(input).context("Failed to read stream")?;

    let report = remac::verify(&data, &sidecar)?;
    println!("Frames: {}/{} ok", report.frames_ok, report.frames);
    println!("MD5:    {}", if report.md5_ok { "ok" } else { "MISMATCH" });
    println!("Size:   {}", if report.size_ok { "ok" } else { "MISMATCH" });
    if let Some(ref error) = report.first_error {
        println!("Error:  {}", error);
    }

    if !report.is_ok() {
        bail!("{} failed verification", input.display());
    }
    println!("✓ Stream is valid");
    Ok(())
}
