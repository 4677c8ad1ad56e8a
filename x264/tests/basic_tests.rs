// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Basic integration tests against a real libx264.
//!
//! These tests load the library found by [`get_x264_so_path`] and encode short
//! synthetic sequences. They are ignored by default; run them with
//! `cargo test -- --ignored` on a machine with libx264 (build 164) installed,
//! pointing `X264_LIBRARY_PATH` at it if it is not on the loader path.
//!
//! # Test Coverage
//!
//! - Library loading and parameter preparation with presets and profiles
//! - A full encode and flush cycle with frame accounting
//! - Header retrieval and parameter snapshots

mod common;

use common::setup_logging;
use tracing::info;
use x264::{
    Colorspace, Encoder, Flushed, NalType, OwnedEncodedFrame, Parameters, Picture, Preset, Profile,
    Tune, X264ApiHandle, config::get_x264_so_path,
};

fn setup_test() -> X264ApiHandle {
    setup_logging();
    x264::load_api(get_x264_so_path()).unwrap()
}

/// Fills the luma plane with a moving gradient so consecutive frames differ.
fn fill_gradient(picture: &mut Picture, frame: i64) {
    let stride = picture.stride(0).unwrap();
    let luma = picture.plane_mut(0).unwrap();
    for (row, line) in luma.chunks_mut(stride).enumerate() {
        for (col, sample) in line.iter_mut().enumerate() {
            *sample = (row + col + frame as usize * 4) as u8;
        }
    }
    for plane in 1..picture.plane_count() {
        picture.plane_mut(plane).unwrap().fill(128);
    }
}

#[test]
#[ignore = "requires libx264"]
fn basic_x264_encode_and_flush() {
    let api = setup_test();
    let params = Parameters::builder_with_preset(api, Preset::Veryfast, None)
        .unwrap()
        .resolution(640, 360)
        .colorspace(Colorspace::I420)
        .fps(25, 1)
        .threads(1)
        .profile(Some(Profile::High))
        .unwrap()
        .build()
        .unwrap();
    let mut encoder = Encoder::open(&params).unwrap();
    let mut picture = Picture::for_parameters(&params).unwrap();

    let mut frames: Vec<OwnedEncodedFrame> = Vec::new();
    for pts in 0..50 {
        fill_gradient(&mut picture, pts);
        picture.set_pts(pts);
        if let Some(frame) = encoder.encode(&picture).unwrap() {
            frames.push(frame.into());
        }
    }
    loop {
        match encoder.flush().unwrap() {
            Flushed::Frame(frame) => frames.push(frame.into()),
            Flushed::Pending => {}
            Flushed::Drained => break,
        }
    }

    info!(
        "Encoded {} frames into {} bytes",
        frames.len(),
        frames.iter().map(OwnedEncodedFrame::size).sum::<usize>()
    );
    assert_eq!(frames.len(), 50);
    assert!(frames[0].picture.keyframe);
    assert!(frames[0].nals.iter().any(|nal| nal.nal_type == NalType::Sps));
    assert!(
        frames
            .windows(2)
            .all(|pair| pair[0].picture.dts <= pair[1].picture.dts)
    );
    let mut pts: Vec<_> = frames.iter().map(|frame| frame.picture.pts).collect();
    pts.sort_unstable();
    assert_eq!(pts, (0..50).collect::<Vec<_>>());
    encoder.close();
}

#[test]
#[ignore = "requires libx264"]
fn basic_x264_low_latency_has_no_delay() {
    let api = setup_test();
    let params = Parameters::builder_with_preset(api, Preset::Ultrafast, Some(Tune::ZERO_LATENCY))
        .unwrap()
        .resolution(320, 240)
        .threads(1)
        .profile(Some(Profile::Baseline))
        .unwrap()
        .build()
        .unwrap();
    let mut encoder = Encoder::open(&params).unwrap();
    assert_eq!(encoder.maximum_delayed_frames(), 0);

    let mut picture = Picture::for_parameters(&params).unwrap();
    for pts in 0..5 {
        fill_gradient(&mut picture, pts);
        picture.set_pts(pts);
        let frame = encoder.encode(&picture).unwrap().expect("no lookahead");
        assert_eq!(frame.picture().pts, pts);
    }
    assert!(matches!(encoder.flush().unwrap(), Flushed::Drained));
}

#[test]
#[ignore = "requires libx264"]
fn basic_x264_headers_and_parameters() {
    let api = setup_test();
    let params = Parameters::builder(api)
        .resolution(320, 240)
        .repeat_headers(false)
        .profile(Some(Profile::Main))
        .unwrap()
        .build()
        .unwrap();
    let mut encoder = Encoder::open(&params).unwrap();

    let headers = encoder.headers().unwrap();
    let types: Vec<_> = headers.iter().map(|nal| nal.nal_type).collect();
    info!("Header NAL units: {types:?}");
    assert!(types.contains(&NalType::Sps));
    assert!(types.contains(&NalType::Pps));

    let snapshot = encoder.parameters().unwrap();
    assert_eq!(snapshot.width(), 320);
    assert_eq!(snapshot.height(), 240);
    assert!(!snapshot.repeat_headers());
}
