// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Build-time configuration and path resolution for libx264.
//!
//! This module provides helper functions to locate the x264 shared library
//! based on the environment and on compile-time build settings.

use std::path::PathBuf;

// Build script generates constants.rs with X264_LIB_DIR
include!(concat!(env!("OUT_DIR"), "/constants.rs"));

/// Environment variable overriding the library location at runtime.
pub const X264_LIBRARY_PATH_ENV: &str = "X264_LIBRARY_PATH";

/// File name of the build-164 shared library on the current platform.
#[cfg(target_os = "windows")]
pub const X264_LIBRARY_NAME: &str = "libx264-164.dll";
#[cfg(target_os = "macos")]
pub const X264_LIBRARY_NAME: &str = "libx264.164.dylib";
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
pub const X264_LIBRARY_NAME: &str = "libx264.so.164";

/// Returns the path to the x264 shared library.
///
/// Resolution order:
///
/// 1. `$X264_LIBRARY_PATH`, if set and non-empty
/// 2. [`X264_LIBRARY_NAME`] inside the directory given by `X264_LIB_DIR` at build time
/// 3. the bare [`X264_LIBRARY_NAME`], left to the system loader search path
///
/// # Examples
///
/// ```no_run
/// use x264::config::get_x264_so_path;
/// use x264::load_api;
///
/// # fn main() -> Result<(), x264::Error> {
/// let api = load_api(get_x264_so_path())?;
/// # Ok(())
/// # }
/// ```
pub fn get_x264_so_path() -> PathBuf {
    resolve_library_path(std::env::var_os(X264_LIBRARY_PATH_ENV).map(PathBuf::from))
}

fn resolve_library_path(from_env: Option<PathBuf>) -> PathBuf {
    if let Some(path) = from_env
        && !path.as_os_str().is_empty()
    {
        return path;
    }
    match X264_LIB_DIR {
        Some(dir) => PathBuf::from(dir).join(X264_LIBRARY_NAME),
        None => PathBuf::from(X264_LIBRARY_NAME),
    }
}
