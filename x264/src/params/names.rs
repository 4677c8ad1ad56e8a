// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Typed forms of the names x264 accepts for presets, tunings, profiles and log levels.
//!
//! Every name is validated when it is parsed, so a typo surfaces as a
//! configuration error before any library call is made.

use std::{ffi::c_int, fmt, str::FromStr};

use serde::Serialize;

use crate::{Error, Result};

/// Speed/quality preset, ordered from fastest to slowest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    Ultrafast,
    Superfast,
    Veryfast,
    Faster,
    Fast,
    Medium,
    Slow,
    Slower,
    Veryslow,
    Placebo,
}

impl Preset {
    pub const ALL: [Preset; 10] = [
        Preset::Ultrafast,
        Preset::Superfast,
        Preset::Veryfast,
        Preset::Faster,
        Preset::Fast,
        Preset::Medium,
        Preset::Slow,
        Preset::Slower,
        Preset::Veryslow,
        Preset::Placebo,
    ];

    /// The name x264 knows this preset by.
    pub fn as_str(&self) -> &'static str {
        x264_sys::X264_PRESET_NAMES[*self as usize]
    }
}

impl FromStr for Preset {
    type Err = Error;

    /// Accepts a preset name (case-insensitive) or its index `"0"` to `"9"`.
    fn from_str(s: &str) -> Result<Self> {
        if let [digit @ b'0'..=b'9'] = s.as_bytes() {
            return Ok(Self::ALL[usize::from(digit - b'0')]);
        }
        Self::ALL
            .into_iter()
            .find(|preset| preset.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::UnknownPreset(s.to_string()))
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Psychovisual tuning. At most one can be active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PsyTune {
    Film,
    Animation,
    Grain,
    Stillimage,
    Psnr,
    Ssim,
}

impl PsyTune {
    const ALL: [PsyTune; 6] = [
        PsyTune::Film,
        PsyTune::Animation,
        PsyTune::Grain,
        PsyTune::Stillimage,
        PsyTune::Psnr,
        PsyTune::Ssim,
    ];

    pub fn as_str(&self) -> &'static str {
        x264_sys::X264_TUNE_NAMES[*self as usize]
    }
}

/// A tuning combination as passed to `x264_param_default_preset`.
///
/// Parsed from names joined by any of `,./-+`, e.g. `"film,zerolatency"`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Tune {
    pub psy: Option<PsyTune>,
    pub fast_decode: bool,
    pub zero_latency: bool,
}

impl Tune {
    pub const ZERO_LATENCY: Tune = Tune {
        psy: None,
        fast_decode: false,
        zero_latency: true,
    };

    /// Returns `true` when no tuning is selected.
    pub fn is_empty(&self) -> bool {
        self.psy.is_none() && !self.fast_decode && !self.zero_latency
    }

    fn names(&self) -> impl Iterator<Item = &'static str> {
        self.psy
            .map(|psy| psy.as_str())
            .into_iter()
            .chain(self.fast_decode.then_some("fastdecode"))
            .chain(self.zero_latency.then_some("zerolatency"))
    }
}

impl FromStr for Tune {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut tune = Tune::default();
        for name in s.split([',', '.', '/', '-', '+']).filter(|name| !name.is_empty()) {
            if name.eq_ignore_ascii_case("fastdecode") {
                tune.fast_decode = true;
            } else if name.eq_ignore_ascii_case("zerolatency") {
                tune.zero_latency = true;
            } else {
                let psy = PsyTune::ALL
                    .into_iter()
                    .find(|psy| psy.as_str().eq_ignore_ascii_case(name))
                    .ok_or_else(|| Error::UnknownTune(name.to_string()))?;
                if let Some(first) = tune.psy {
                    return Err(Error::ConflictingTunes {
                        first: first.as_str().to_string(),
                        second: psy.as_str().to_string(),
                    });
                }
                tune.psy = Some(psy);
            }
        }
        Ok(tune)
    }
}

impl fmt::Display for Tune {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, name) in self.names().enumerate() {
            if index > 0 {
                f.write_str(",")?;
            }
            f.write_str(name)?;
        }
        Ok(())
    }
}

/// H.264 profile, ordered from most to least restrictive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    Baseline,
    Main,
    High,
    High10,
    High422,
    High444,
}

impl Profile {
    pub const ALL: [Profile; 6] = [
        Profile::Baseline,
        Profile::Main,
        Profile::High,
        Profile::High10,
        Profile::High422,
        Profile::High444,
    ];

    pub fn as_str(&self) -> &'static str {
        x264_sys::X264_PROFILE_NAMES[*self as usize]
    }

    /// Highest bit depth the profile permits.
    pub fn max_bit_depth(&self) -> u32 {
        if *self >= Profile::High10 { 10 } else { 8 }
    }
}

impl FromStr for Profile {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|profile| profile.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::UnknownProfile(s.to_string()))
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verbosity of the library's own log output (`i_log_level`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    None,
    Error,
    Warning,
    Info,
    Debug,
}

impl LogLevel {
    /// Picks the x264 level matching the currently active `tracing` filter.
    pub fn from_tracing() -> Self {
        use tracing::level_filters::LevelFilter;

        match LevelFilter::current() {
            LevelFilter::OFF => LogLevel::None,
            LevelFilter::ERROR => LogLevel::Error,
            LevelFilter::WARN => LogLevel::Warning,
            LevelFilter::INFO => LogLevel::Info,
            _ => LogLevel::Debug,
        }
    }

    pub fn as_raw(&self) -> c_int {
        match self {
            LogLevel::None => x264_sys::X264_LOG_NONE,
            LogLevel::Error => x264_sys::X264_LOG_ERROR,
            LogLevel::Warning => x264_sys::X264_LOG_WARNING,
            LogLevel::Info => x264_sys::X264_LOG_INFO,
            LogLevel::Debug => x264_sys::X264_LOG_DEBUG,
        }
    }

    pub fn from_raw(level: c_int) -> Self {
        match level {
            l if l < x264_sys::X264_LOG_ERROR => LogLevel::None,
            x264_sys::X264_LOG_ERROR => LogLevel::Error,
            x264_sys::X264_LOG_WARNING => LogLevel::Warning,
            x264_sys::X264_LOG_INFO => LogLevel::Info,
            _ => LogLevel::Debug,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            LogLevel::None => "none",
            LogLevel::Error => "error",
            LogLevel::Warning => "warning",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }
}

impl FromStr for LogLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        [
            LogLevel::None,
            LogLevel::Error,
            LogLevel::Warning,
            LogLevel::Info,
            LogLevel::Debug,
        ]
        .into_iter()
        .find(|level| level.as_str().eq_ignore_ascii_case(s))
        .ok_or_else(|| Error::UnknownLogLevel(s.to_string()))
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
