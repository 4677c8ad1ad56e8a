// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Build script for the `x264` crate.
//!
//! This script generates `constants.rs` containing the optional directory of a
//! prebuilt libx264, taken from the `X264_LIB_DIR` environment variable at build
//! time. The configuration module uses it to locate the library at runtime.

use std::env;
use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-env-changed=X264_LIB_DIR");

    let lib_dir = match env::var("X264_LIB_DIR") {
        Ok(dir) if !dir.is_empty() => format!("Some({dir:?})"),
        _ => "None".to_string(),
    };

    // Generate constants.rs in the build output directory
    let out_path = PathBuf::from(env::var("OUT_DIR").expect("failed to get output directory"))
        .join("constants.rs");

    let data = format!("pub const X264_LIB_DIR: Option<&str> = {lib_dir};\n");
    std::fs::write(out_path, data).expect("Unable to write file");
}
