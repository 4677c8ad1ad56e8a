// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! # x264-sys: Raw FFI bindings to libx264
//!
//! This crate provides low-level, unsafe Rust bindings to the x264 H.264 encoder
//! C library (API build [`X264_BUILD`]). It is generated from the installed
//! `x264.h` using `bindgen`, and the library is never linked at build time: every
//! entry point is resolved at runtime through `libloading`.
//!
//! ## Overview
//!
//! `x264-sys` exposes:
//! - Raw C types (`x264_param_t`, `x264_picture_t`, `x264_nal_t`, ...)
//! - Constants for colorspaces, frame types, NAL unit types and parameter names
//! - [`Libx264`], the generated loader with one field per entry point (the
//!   `x264_` prefix dropped, so `x264_encoder_open_164` becomes `encoder_open`)
//! - [`X264Api`], a copy of those entry points that can also be assembled from
//!   in-process functions
//!
//! ## Usage
//!
//! **Most users should NOT use this crate directly.** Use the safe `x264` wrapper
//! crate instead, which provides:
//! - An encoder session with an explicit open / encode / flush / close state machine
//! - A builder that enforces x264's preset → options → profile ordering
//! - Owned copies of NAL units that outlive the next encoder call
//!
//! ## Safety
//!
//! All functions in this crate are `unsafe` and require the caller to uphold x264's
//! invariants:
//! - `x264_param_t` must be initialized by `param_default` before use
//! - An encoder handle must not be used from two threads at the same time
//! - NAL payloads returned by `encoder_encode` are only valid until the next call
//! - Null checks are the caller's responsibility
//!
//! ## Build Process
//!
//! The build script finds `x264.h` through `pkg-config`. Set `X264_INCLUDE_DIR`
//! to use a header from somewhere else.

// Suppress expected warnings from bindgen-generated code.
// See https://github.com/rust-lang/rust-bindgen/issues/1651.

#![allow(non_upper_case_globals)]
#![allow(non_camel_case_types)]
#![allow(non_snake_case)]
#![allow(missing_docs)]
#![allow(rustdoc::broken_intra_doc_links)]
#![allow(rustdoc::invalid_html_tags)]
#![allow(unsafe_op_in_unsafe_fn)]
#![allow(deref_nullptr)]
#![allow(clippy::missing_safety_doc)]

extern crate libloading;

// Include bindgen-generated FFI bindings
include!(concat!(env!("OUT_DIR"), "/bindings.rs"));

mod library;
mod names;

pub use library::{X264Api, X264Functions};
pub use names::{X264_PRESET_NAMES, X264_PROFILE_NAMES, X264_TUNE_NAMES};
