// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Encodes a raw YUV file to an H.264 elementary stream.
//!
//! ```text
//! cargo run --example encode_yuv -- --input in.yuv --output out.h264 \
//!     --width 640 --height 360 --preset veryfast --profile high
//! ```

mod common;

use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::PathBuf,
    time::Instant,
};

use clap::Parser;
use tracing::{info, warn};
use x264::{
    BitstreamWriter, Colorspace, Encoder, Flushed, LogLevel, Parameters, Picture, Preset,
    Profile, RateControl, RawFrameReader, Tune, config::get_x264_so_path, frame_count_for_len, load_api,
};

#[derive(Debug, Parser)]
#[command(version, about = "Encode raw video with libx264", long_about = None)]
struct Args {
    /// Raw input frames, planes tightly packed.
    #[arg(long)]
    input: PathBuf,

    /// Output file, or `-` for stdout.
    #[arg(long)]
    output: PathBuf,

    #[arg(long)]
    width: u32,

    #[arg(long)]
    height: u32,

    /// Input colorspace, e.g. `i420`, `nv12` or `i444+high-depth`.
    #[arg(long, default_value = "i420")]
    csp: Colorspace,

    /// Frame rate numerator.
    #[arg(long, default_value_t = 25)]
    fps: u32,

    /// Number of frames to encode; 0 encodes the whole input.
    #[arg(long, default_value_t = 0)]
    frames: u64,

    #[arg(long, default_value = "medium")]
    preset: Preset,

    /// Comma separated tunings, e.g. `film,zerolatency`.
    #[arg(long)]
    tune: Option<Tune>,

    #[arg(long)]
    profile: Option<Profile>,

    /// Constant rate factor.
    #[arg(long, conflicts_with = "bitrate")]
    crf: Option<f32>,

    /// Average bitrate in kbit/s.
    #[arg(long)]
    bitrate: Option<u32>,

    /// Extra `name=value` options passed to `x264_param_parse`.
    #[arg(long = "x264-param", value_parser = parse_key_value)]
    x264_params: Vec<(String, String)>,

    /// Path to libx264; defaults to `X264_LIBRARY_PATH` or the platform name.
    #[arg(long, env = "X264_LIBRARY_PATH")]
    library: Option<PathBuf>,
}

fn parse_key_value(arg: &str) -> Result<(String, String), String> {
    arg.split_once('=')
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected name=value, got \"{arg}\""))
}

fn main() -> Result<(), x264::Error> {
    common::setup_logging();
    let args = Args::parse();

    let api = load_api(args.library.clone().unwrap_or_else(get_x264_so_path))?;
    let mut builder = Parameters::builder_with_preset(api, args.preset, args.tune)?
        .resolution(args.width, args.height)
        .colorspace(args.csp)
        .bit_depth(if args.csp.is_high_depth() { 10 } else { 8 })
        .fps(args.fps, 1)
        .log_level(LogLevel::from_tracing());
    if let Some(rf) = args.crf {
        builder = builder.rate_control(RateControl::Crf { rf });
    }
    if let Some(bitrate_kbps) = args.bitrate {
        builder = builder.rate_control(RateControl::Abr { bitrate_kbps });
    }
    for (name, value) in &args.x264_params {
        builder = builder.parse(name, value)?;
    }
    let params = builder.profile(args.profile)?.build()?;

    let summary = serde_json::to_string_pretty(&params.summary())
        .map_err(|error| x264::Error::Other(error.to_string()))?;
    info!("Encoder parameters:\n{summary}");

    let input = File::open(&args.input)?;
    let available = frame_count_for_len(input.metadata()?.len(), params.frame_size()?);
    let frames = match args.frames {
        0 => available,
        requested if requested > available => {
            warn!("Input holds only {available} frames, {requested} requested");
            available
        }
        requested => requested,
    };

    let output: Box<dyn Write> = if args.output.as_os_str() == "-" {
        Box::new(std::io::stdout().lock())
    } else {
        Box::new(File::create(&args.output)?)
    };
    let mut writer = BitstreamWriter::new(BufWriter::new(output));
    let mut reader = RawFrameReader::new(BufReader::new(input));
    let mut encoder = Encoder::open(&params)?;
    let mut picture = Picture::for_parameters(&params)?;

    let started = Instant::now();
    for pts in 0..frames {
        if !reader.read_frame(&mut picture)? {
            break;
        }
        picture.set_pts(pts as i64);
        if let Some(frame) = encoder.encode(&picture)? {
            writer.write_frame(&frame)?;
        }
    }
    // An empty input leaves nothing to drain and produces an empty stream.
    while encoder.frames_in() > 0 {
        match encoder.flush()? {
            Flushed::Frame(frame) => {
                writer.write_frame(&frame)?;
            }
            Flushed::Pending => {}
            Flushed::Drained => break,
        }
    }
    writer.flush()?;

    let elapsed = started.elapsed();
    info!(
        "Encoded {} frames into {} bytes in {:.2?} ({:.1} fps)",
        encoder.frames_out(),
        writer.bytes_written(),
        elapsed,
        encoder.frames_out() as f64 / elapsed.as_secs_f64().max(f64::EPSILON)
    );
    encoder.close();
    Ok(())
}
