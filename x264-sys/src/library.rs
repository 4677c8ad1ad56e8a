// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! A copyable table of the libx264 entry points.
//!
//! The generated [`Libx264`] can only be built from a real shared library. The
//! table here holds the same function pointers but can also be assembled from
//! in-process functions, e.g. a statically linked encoder or a test double.
//! [`X264Functions::from_loaded`] copies every field out of the generated loader,
//! so a signature that drifts from `x264.h` fails to compile.

use std::ffi::{OsStr, c_char, c_int};

use libloading::Library;

use crate::{Libx264, X264_BUILD, x264_nal_t, x264_param_t, x264_picture_t, x264_t};

// `encoder_open` is bound to `x264_encoder_open_164`, and the structs this crate
// exposes are the ones of that build.
const _: () = assert!(X264_BUILD == 164);

macro_rules! entry_points {
    ($( $(#[$doc:meta])* fn $name:ident($($arg:ident: $ty:ty),*) $(-> $ret:ty)?; )*) => {
        /// One function pointer per libx264 entry point.
        #[derive(Debug, Clone, Copy)]
        pub struct X264Functions {
            $(pub $name: unsafe extern "C" fn($($ty),*) $(-> $ret)?,)*
        }

        impl X264Functions {
            /// Copies the entry points resolved by a generated [`Libx264`].
            pub fn from_loaded(library: &Libx264) -> Self {
                Self {
                    $($name: library.$name,)*
                }
            }
        }

        impl X264Api {
            $(
                $(#[$doc])*
                pub unsafe fn $name(&self, $($arg: $ty),*) $(-> $ret)? {
                    unsafe { (self.functions.$name)($($arg),*) }
                }
            )*
        }
    };
}

entry_points! {
    fn param_default(param: *mut x264_param_t);
    fn param_parse(param: *mut x264_param_t, name: *const c_char, value: *const c_char) -> c_int;
    fn param_cleanup(param: *mut x264_param_t);
    fn param_default_preset(
        param: *mut x264_param_t,
        preset: *const c_char,
        tune: *const c_char
    ) -> c_int;
    fn param_apply_fastfirstpass(param: *mut x264_param_t);
    fn param_apply_profile(param: *mut x264_param_t, profile: *const c_char) -> c_int;
    fn picture_init(pic: *mut x264_picture_t);
    fn picture_alloc(pic: *mut x264_picture_t, i_csp: c_int, i_width: c_int, i_height: c_int) -> c_int;
    fn picture_clean(pic: *mut x264_picture_t);
    /// Writes the escaped bytes of `nal` to `dst`, which must hold at least
    /// `i_payload * 3 / 2 + 5 + 64` bytes, and points the unit at them.
    fn nal_encode(encoder: *mut x264_t, dst: *mut u8, nal: *mut x264_nal_t);
    /// `x264_encoder_open_164`.
    fn encoder_open(param: *mut x264_param_t) -> *mut x264_t;
    fn encoder_reconfig(encoder: *mut x264_t, param: *mut x264_param_t) -> c_int;
    fn encoder_parameters(encoder: *mut x264_t, param: *mut x264_param_t);
    fn encoder_headers(
        encoder: *mut x264_t,
        pp_nal: *mut *mut x264_nal_t,
        pi_nal: *mut c_int
    ) -> c_int;
    fn encoder_encode(
        encoder: *mut x264_t,
        pp_nal: *mut *mut x264_nal_t,
        pi_nal: *mut c_int,
        pic_in: *mut x264_picture_t,
        pic_out: *mut x264_picture_t
    ) -> c_int;
    fn encoder_close(encoder: *mut x264_t);
    fn encoder_delayed_frames(encoder: *mut x264_t) -> c_int;
    fn encoder_maximum_delayed_frames(encoder: *mut x264_t) -> c_int;
    fn encoder_intra_refresh(encoder: *mut x264_t);
    fn encoder_invalidate_reference(encoder: *mut x264_t, pts: i64) -> c_int;
}

/// The libx264 entry points plus the value of `x264_chroma_format`.
///
/// When built by [`Self::new`], the generated loader is kept alongside the
/// copied pointers, which keeps the shared library mapped.
pub struct X264Api {
    functions: X264Functions,
    chroma_format: c_int,
    _library: Option<Libx264>,
}

impl X264Api {
    /// Loads the shared library at `path` and resolves every entry point.
    ///
    /// # Safety
    ///
    /// Loading a library runs its initialisation routines. The library must be a
    /// libx264 exporting API build [`X264_BUILD`].
    pub unsafe fn new<P: AsRef<OsStr>>(path: P) -> Result<Self, libloading::Error> {
        let library = unsafe { Library::new(path)? };
        // `x264_chroma_format` is an exported `const int`, not a function.
        let chroma_format = unsafe {
            let address = library.get::<*const c_int>(b"x264_chroma_format\0")?;
            **address
        };
        let loaded = unsafe { Libx264::from_library(library)? };
        Ok(Self {
            functions: X264Functions::from_loaded(&loaded),
            chroma_format,
            _library: Some(loaded),
        })
    }

    /// Builds a table from in-process implementations (a statically linked
    /// libx264, or a stand-in used for testing).
    ///
    /// `chroma_format` is the value of `x264_chroma_format`: 0 when the library
    /// accepts every chroma format, otherwise the single `X264_CSP_*` it supports.
    pub fn from_functions(functions: X264Functions, chroma_format: c_int) -> Self {
        Self {
            functions,
            chroma_format,
            _library: None,
        }
    }

    pub fn functions(&self) -> &X264Functions {
        &self.functions
    }

    /// The only chroma format the library can encode, or 0 for no restriction.
    pub fn chroma_format(&self) -> c_int {
        self.chroma_format
    }
}

impl std::fmt::Debug for X264Api {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("X264Api")
            .field("loaded", &self._library.is_some())
            .field("chroma_format", &self.chroma_format)
            .finish_non_exhaustive()
    }
}
