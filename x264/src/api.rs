// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Loading of the libx264 shared library.

use std::{ffi::OsStr, sync::Arc};

use crate::Result;

pub use x264_sys::X264Api;

/// Shared handle to a loaded libx264.
///
/// Every builder, parameter set and encoder keeps a clone, so the library stays
/// loaded until the last of them is dropped.
pub type X264ApiHandle = Arc<X264Api>;

/// Loads libx264 from `path` and resolves every entry point the crate uses.
///
/// The lookup happens once, up front. A library missing any required symbol is
/// rejected here rather than at the first call that needs it.
///
/// # Errors
///
/// Returns [`crate::Error::LibLoading`] if the library cannot be opened or a
/// symbol is missing.
///
/// # Examples
///
/// ```no_run
/// use x264::{config::get_x264_so_path, load_api};
///
/// # fn main() -> Result<(), x264::Error> {
/// let api = load_api(get_x264_so_path())?;
/// # Ok(())
/// # }
/// ```
pub fn load_api(path: impl AsRef<OsStr>) -> Result<X264ApiHandle> {
    let path = path.as_ref();
    // Safety: the path is expected to point at a libx264 exporting build 164.
    let api = unsafe { X264Api::new(path)? };
    tracing::debug!(
        "Loaded libx264 from {} (chroma format {})",
        path.to_string_lossy(),
        api.chroma_format()
    );
    Ok(Arc::new(api))
}

/// Wraps an already constructed dispatch table, e.g. one built with
/// [`X264Api::from_functions`] for a statically linked encoder.
pub fn wrap_api(api: X264Api) -> X264ApiHandle {
    Arc::new(api)
}
