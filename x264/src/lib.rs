// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! # x264
//!
//! Safe, idiomatic Rust bindings for libx264, the H.264/AVC encoder, loaded at
//! runtime as a shared library.
//!
//! ## Overview
//!
//! This crate wraps the raw dispatch table from [`x264_sys`] with RAII types
//! and a checked encoder lifecycle. All encoding work happens inside libx264;
//! the crate prepares parameters, feeds pictures, and hands back the NAL units
//! the library produces.
//!
//! ### Key Concepts
//!
//! - **Parameters**: an `x264_param_t` prepared by a staged [`ParametersBuilder`]
//!   (preset and tune, overrides, fast first pass, profile) and frozen as [`Parameters`]
//! - **Picture**: a caller-owned input frame with one buffer per plane ([`Picture`])
//! - **Encoder session**: one open libx264 encoder ([`Encoder`]) moving from
//!   open, through flushing, to closed
//! - **NAL unit**: a chunk of the H.264 bitstream, borrowed as [`Nal`] or copied
//!   as [`NalUnit`]
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────────────┐   ┌────────────┐   ┌─────────┐
//! │ load_api │──►│ ParametersBuilder │──►│ Parameters │──►│ Encoder │
//! └──────────┘   └───────────────────┘   └────────────┘   └────┬────┘
//!                                                              │
//!          Picture ──► encode() / flush() ──► EncodedFrame ◄───┘
//!                                               └─► Nal / NalUnit
//! ```
//!
//! ## Examples
//!
//! ### Encoding raw I420 frames to an Annex-B stream
//!
//! ```no_run
//! use std::fs::File;
//!
//! use x264::{
//!     BitstreamWriter, Colorspace, Encoder, Flushed, Parameters, Picture, Preset, Profile,
//!     RawFrameReader, config::get_x264_so_path, load_api,
//! };
//!
//! # fn main() -> Result<(), x264::Error> {
//! // Load libx264 and prepare the parameters in the order x264 requires
//! let api = load_api(get_x264_so_path())?;
//! let params = Parameters::builder_with_preset(api, Preset::Medium, None)?
//!     .resolution(640, 360)
//!     .colorspace(Colorspace::I420)
//!     .fps(25, 1)
//!     .profile(Some(Profile::High))?
//!     .build()?;
//!
//! let mut encoder = Encoder::open(&params)?;
//! let mut picture = Picture::for_parameters(&params)?;
//! let mut reader = RawFrameReader::new(File::open("input.yuv")?);
//! let mut writer = BitstreamWriter::new(File::create("output.h264")?);
//!
//! let mut pts = 0;
//! while reader.read_frame(&mut picture)? {
//!     picture.set_pts(pts);
//!     pts += 1;
//!     if let Some(frame) = encoder.encode(&picture)? {
//!         writer.write_frame(&frame)?;
//!     }
//! }
//!
//! // Drain the frames still buffered for lookahead and B-frames
//! loop {
//!     match encoder.flush()? {
//!         Flushed::Frame(frame) => {
//!             writer.write_frame(&frame)?;
//!         }
//!         Flushed::Pending => {}
//!         Flushed::Drained => break,
//!     }
//! }
//! encoder.close();
//! # Ok(())
//! # }
//! ```
//!
//! ## Thread Safety
//!
//! - The loaded library ([`X264ApiHandle`]) is `Send + Sync` and shared through an `Arc`
//! - [`Encoder`] and [`Parameters`] are `Send` but not `Sync`
//! - Every [`Encoder`] method takes `&mut self`, so calls into one session never overlap

mod api;
mod encoder;
mod error;
mod io;
mod nal;
mod params;
mod picture;

pub mod config;

pub use api::{X264Api, X264ApiHandle, load_api, wrap_api};
pub use encoder::{Encoder, Flushed, SessionState};
pub use error::{Error, ErrorKind, Result};
pub use io::{BitstreamWriter, RawFrameReader, frame_count_for_len};
pub use nal::{EncodedFrame, Nal, NalCallback, NalPriority, NalType, NalUnit, OwnedEncodedFrame};
pub use params::{
    ChromaFormat, Colorspace, ColorspaceFormat, FirstPass, LogLevel, Overrides, ParameterSummary,
    Parameters, ParametersBuilder, PlaneLayout, Preset, Profile, PsyTune, RateControl, Restricted,
    Tune,
};
pub use picture::{FrameType, OutputPicture, Picture, Psnr};
