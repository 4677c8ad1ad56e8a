// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Error types for x264 operations.
//!
//! This module defines the error types returned by the safe wrapper, mapping
//! negative libx264 return codes and session misuse to idiomatic Rust error enums.

use std::ffi::c_int;

use crate::{Colorspace, Profile};

/// Convenience result type using [`Error`] as the error variant.
pub type Result<T> = core::result::Result<T, Error>;

/// Broad classification of an [`Error`].
///
/// Callers decide what to do with a failure from its kind: configuration errors
/// are reported at the call that caused them, encode failures end the session,
/// and resource exhaustion is surfaced without retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid names, sizes, parameters or an operation issued in the wrong state.
    Config,
    /// The encoder reported a failure; the session is no longer usable.
    EncodeFailure,
    /// A buffer or handle could not be allocated.
    ResourceExhaustion,
    /// The shared library could not be loaded or is missing an entry point.
    Library,
    /// Anything else (I/O of the frame source or bitstream sink).
    Other,
}

/// Errors that can occur when using the x264 API.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Unknown preset \"{0}\"")]
    UnknownPreset(String),

    #[error("Unknown tune \"{0}\"")]
    UnknownTune(String),

    /// Only one psy tuning (film, animation, grain, stillimage, psnr, ssim) can be used.
    #[error("Conflicting psy tunings \"{first}\" and \"{second}\"")]
    ConflictingTunes { first: String, second: String },

    #[error("Unknown profile \"{0}\"")]
    UnknownProfile(String),

    #[error("Unknown colorspace \"{0}\"")]
    UnknownColorspace(String),

    #[error("Unknown log level \"{0}\"")]
    UnknownLogLevel(String),

    /// Width and height must be positive and a multiple of the chroma subsampling factor.
    #[error("Invalid dimensions {width}x{height} for colorspace {colorspace}")]
    InvalidDimensions {
        width: u32,
        height: u32,
        colorspace: Colorspace,
    },

    /// The colorspace cannot be used for this operation or by the loaded library.
    #[error("Unsupported colorspace {0}")]
    UnsupportedColorspace(Colorspace),

    /// `x264_param_default_preset` rejected the preset/tune combination.
    #[error("Preset \"{preset}\" with tune \"{tune}\" rejected by x264")]
    PresetRejected { preset: String, tune: String },

    /// `x264_param_apply_profile` rejected the profile for the current settings.
    #[error("Profile {profile} cannot be applied to the current parameters")]
    ProfileRejected { profile: Profile },

    /// `x264_param_parse` returned `X264_PARAM_BAD_NAME`, `BAD_VALUE` or `ALLOC_FAILED`.
    #[error("Invalid parameter {name}={value} (code {code})")]
    InvalidParameter {
        name: String,
        value: String,
        code: c_int,
    },

    /// x264 only calls `nalu_process` with a single thread or sliced threads.
    #[error("A NAL callback needs threads=1 or sliced threads, got threads={threads} with frame threading")]
    NalCallbackWithFrameThreads { threads: u32 },

    /// `x264_encoder_open` returned no encoder for these parameters.
    #[error("x264 refused to open an encoder with these parameters")]
    InvalidParams,

    /// Flushing was requested before any frame was submitted.
    #[error("Cannot flush an encoder that has not received any frame")]
    FlushBeforeInput,

    #[error("Cannot {operation} while the encoder is {state}")]
    InvalidState {
        operation: &'static str,
        state: crate::SessionState,
    },

    /// The picture does not match the format the session was opened with.
    #[error("Picture is {actual} but the encoder expects {expected}")]
    PictureMismatch { expected: String, actual: String },

    #[error("Presentation timestamp {current} does not follow {previous}")]
    NonMonotonicPts { previous: i64, current: i64 },

    /// `x264_encoder_reconfig` rejected the new parameters; the session keeps the old ones.
    #[error("x264 rejected the reconfiguration (code {0})")]
    ReconfigFailed(c_int),

    /// `x264_encoder_invalidate_reference` is not supported with the current settings.
    #[error("Cannot invalidate references from pts {pts}")]
    InvalidateReferenceFailed { pts: i64 },

    /// `x264_encoder_encode` returned a negative value. The session is unusable.
    #[error("Encoding failed (code {0})")]
    EncodeFailed(c_int),

    /// An earlier encode failure left the session unusable.
    #[error("Encoder session failed earlier and cannot be used")]
    SessionFailed,

    #[error("Allocation of {0} bytes failed")]
    AllocationFailed(usize),

    /// A generic error for Rust-level failures not directly mapped to x264 errors.
    #[error("Other error: {0}")]
    Other(String),

    /// Failed to convert a Rust string to a C-compatible null-terminated string.
    #[error("Null string: {0}")]
    NulString(#[from] std::ffi::NulError),

    /// Failed to load the x264 dynamic library or resolve one of its symbols.
    #[error("Loading library: {0}")]
    LibLoading(#[from] libloading::Error),

    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Classifies this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::UnknownPreset(_)
            | Error::UnknownTune(_)
            | Error::ConflictingTunes { .. }
            | Error::UnknownProfile(_)
            | Error::UnknownColorspace(_)
            | Error::UnknownLogLevel(_)
            | Error::InvalidDimensions { .. }
            | Error::UnsupportedColorspace(_)
            | Error::PresetRejected { .. }
            | Error::ProfileRejected { .. }
            | Error::InvalidParameter { .. }
            | Error::NalCallbackWithFrameThreads { .. }
            | Error::InvalidParams
            | Error::FlushBeforeInput
            | Error::InvalidState { .. }
            | Error::PictureMismatch { .. }
            | Error::NonMonotonicPts { .. }
            | Error::ReconfigFailed(_)
            | Error::InvalidateReferenceFailed { .. }
            | Error::NulString(_) => ErrorKind::Config,
            Error::EncodeFailed(_) | Error::SessionFailed => ErrorKind::EncodeFailure,
            Error::AllocationFailed(_) => ErrorKind::ResourceExhaustion,
            Error::LibLoading(_) => ErrorKind::Library,
            Error::Other(_) | Error::Io(_) => ErrorKind::Other,
        }
    }

    /// Converts an `x264_param_parse` return code to a Rust [`Result`].
    pub(crate) fn from_parse_status(status: c_int, name: &str, value: &str) -> Result<()> {
        if status == 0 {
            Ok(())
        } else {
            Err(Error::InvalidParameter {
                name: name.to_string(),
                value: value.to_string(),
                code: status,
            })
        }
    }
}
