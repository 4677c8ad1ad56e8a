// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Build script for `x264-sys` FFI crate.
//!
//! This script:
//! 1. Locates the installed `x264.h` through `pkg-config`
//! 2. Generates Rust FFI bindings using `bindgen`
//! 3. Configures dynamic library loading via `libloading`
//!
//! Nothing is linked: every entry point is resolved at runtime. When
//! `pkg-config` knows no x264, the compiler's default include path is used, and
//! `X264_INCLUDE_DIR` can point at a header directory explicitly.

use bindgen::callbacks::{IntKind, ParseCallbacks};
use std::env;
use std::path::PathBuf;

const HEADER: &str = "wrapper.h";

/// Include directories holding `x264.h`.
fn get_include_dirs() -> Vec<PathBuf> {
    println!("cargo:rerun-if-env-changed=X264_INCLUDE_DIR");
    if let Ok(dir) = env::var("X264_INCLUDE_DIR") {
        return vec![PathBuf::from(dir)];
    }

    match pkg_config::Config::new()
        .cargo_metadata(false)
        .env_metadata(false)
        .probe("x264")
    {
        Ok(library) => library.include_paths,
        Err(err) => {
            println!("cargo:warning=pkg-config could not find x264 ({err}), using default include path");
            Vec::new()
        }
    }
}

/// Main build entry point.
fn main() {
    println!("cargo:rerun-if-changed={HEADER}");
    let includes_dirs = get_include_dirs();
    for include_dir in &includes_dirs {
        println!("cargo:include={}", include_dir.display());
    }

    // Generate Rust FFI bindings from the x264 header
    let bindings = bindgen::builder()
        .clang_args(
            includes_dirs
                .iter()
                .map(|dir| format!("-I{}", dir.display())),
        )
        .header(HEADER)
        .allowlist_function("x264_.*")
        .allowlist_type("x264_.*|nal_unit_type_e|nal_priority_e|pic_struct_e")
        .allowlist_var("X264_.*|NAL_.*|PIC_STRUCT_.*")
        // Exported data and header-local tables, neither reachable through a
        // dynamically loaded function table.
        .blocklist_item("x264_chroma_format")
        .blocklist_item("x264_levels")
        .blocklist_item("x264_.*_names")
        .derive_default(true)
        .derive_debug(true)
        .prepend_enum_name(false)
        .dynamic_library_name("Libx264")
        .dynamic_link_require_all(true)
        .parse_callbacks(Box::new(CB))
        .generate()
        .unwrap();

    let out_path = PathBuf::from(env::var("OUT_DIR").unwrap());
    bindings
        .write_to_file(out_path.join("bindings.rs"))
        .expect("Could not write bindings");
}

/// Custom bindgen callback for name and type transformations.
#[derive(Debug)]
struct CB;

impl ParseCallbacks for CB {
    /// Drops the library prefix from entry points.
    ///
    /// - `x264_param_default` → `param_default`
    /// - `x264_encoder_open_164` → `encoder_open` (the header renames it per API build)
    fn item_name(&self, item_info: bindgen::callbacks::ItemInfo) -> Option<String> {
        match item_info.kind {
            bindgen::callbacks::ItemKind::Function => {
                let name = item_info.name.strip_prefix("x264_")?;
                Some(strip_build_suffix(name).to_string())
            }
            _ => None,
        }
    }

    /// Keeps `#define` constants as `int`, the type every `x264_param_t` field
    /// they are stored in has.
    fn int_macro(&self, _name: &str, value: i64) -> Option<IntKind> {
        i32::try_from(value).ok().map(|_| IntKind::Int)
    }
}

/// `encoder_open_164` → `encoder_open`; other names are returned unchanged.
fn strip_build_suffix(name: &str) -> &str {
    match name.rsplit_once('_') {
        Some((stem, build))
            if stem == "encoder_open" && build.bytes().all(|b| b.is_ascii_digit()) =>
        {
            stem
        }
        _ => name,
    }
}
