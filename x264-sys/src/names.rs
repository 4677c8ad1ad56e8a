// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Name tables of `x264.h`.
//!
//! The header declares these as `static` arrays, so the shared library exports
//! no symbol for them.

/// Presets, ordered from fastest to slowest.
pub const X264_PRESET_NAMES: [&str; 10] = [
    "ultrafast",
    "superfast",
    "veryfast",
    "faster",
    "fast",
    "medium",
    "slow",
    "slower",
    "veryslow",
    "placebo",
];

/// Tunings. The first six are psy tunings and are mutually exclusive.
pub const X264_TUNE_NAMES: [&str; 8] = [
    "film",
    "animation",
    "grain",
    "stillimage",
    "psnr",
    "ssim",
    "fastdecode",
    "zerolatency",
];

/// Profiles, from most to least restrictive.
pub const X264_PROFILE_NAMES: [&str; 6] =
    ["baseline", "main", "high", "high10", "high422", "high444"];
