// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Encoder parameters and the staged builder that produces them.
//!
//! x264 expects its parameter struct to be prepared in a fixed order: preset and
//! tune first, then individual overrides, then the fast first pass adjustment,
//! and the profile restriction last. [`ParametersBuilder`] encodes that order in
//! its type. Each stage consumes the builder and only offers the operations that
//! are still legal:
//!
//! ```text
//! ParametersBuilder<Overrides> ──fast_first_pass()──► ParametersBuilder<FirstPass>
//!            │                                                  │
//!            └───────────────profile()────────────┬─────────────┘
//!                                                 ▼
//!                                    ParametersBuilder<Restricted> ──build()──► Parameters
//! ```

mod colorspace;
mod names;

use std::{
    ffi::{CString, c_int},
    marker::PhantomData,
    mem::MaybeUninit,
    path::Path,
    sync::Arc,
};

use serde::Serialize;
use tracing::{debug, warn};

use crate::{Error, Nal, NalCallback, Result, api::X264ApiHandle};

pub use colorspace::{ChromaFormat, Colorspace, ColorspaceFormat, PlaneLayout};
pub use names::{LogLevel, Preset, Profile, PsyTune, Tune};

/// Owns one `x264_param_t` and releases the strings x264 attached to it.
pub(crate) struct RawParams {
    pub(crate) api: X264ApiHandle,
    raw: Box<x264_sys::x264_param_t>,
}

// Safety: the struct only holds plain values and pointers to heap strings owned
// by this value. Nothing in it is tied to the thread that created it.
unsafe impl Send for RawParams {}

impl RawParams {
    /// Runs `init` on a zeroed struct, which must leave it fully initialized.
    fn init(
        api: X264ApiHandle,
        init: impl FnOnce(&X264ApiHandle, *mut x264_sys::x264_param_t),
    ) -> Self {
        let mut raw: Box<MaybeUninit<x264_sys::x264_param_t>> = Box::new(MaybeUninit::zeroed());
        init(&api, raw.as_mut_ptr());
        // Safety: an all-zero x264_param_t is a valid value (null pointers, `None`
        // callbacks), and `init` only ever overwrites it with library defaults.
        let raw = unsafe { raw.assume_init() };
        Self { api, raw }
    }

    fn as_mut_ptr(&mut self) -> *mut x264_sys::x264_param_t {
        &mut *self.raw
    }

    /// A bitwise copy for calls that take a mutable pointer but keep their own copy.
    pub(crate) fn copy(&self) -> x264_sys::x264_param_t {
        *self.raw
    }
}

impl Drop for RawParams {
    fn drop(&mut self) {
        let param = self.as_mut_ptr();
        unsafe { self.api.param_cleanup(param) };
    }
}

/// Rate control mode and its target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum RateControl {
    /// Constant rate factor (quality based), the x264 default.
    Crf { rf: f32 },
    /// Constant quantizer.
    Cqp { qp: u32 },
    /// Average bitrate in kbit/s.
    Abr { bitrate_kbps: u32 },
}

/// Stage marker: presets applied, individual settings may be overridden.
#[derive(Debug)]
pub enum Overrides {}
/// Stage marker: the fast first pass adjustment has been applied.
#[derive(Debug)]
pub enum FirstPass {}
/// Stage marker: a profile restriction has been applied.
#[derive(Debug)]
pub enum Restricted {}

/// Staged builder for [`Parameters`].
///
/// # Examples
///
/// ```no_run
/// use x264::{Colorspace, Parameters, Preset, Profile, load_api};
///
/// # fn main() -> Result<(), x264::Error> {
/// let api = load_api(x264::config::get_x264_so_path())?;
/// let params = Parameters::builder_with_preset(api, Preset::Medium, None)?
///     .resolution(640, 360)
///     .colorspace(Colorspace::I420)
///     .fps(25, 1)
///     .parse("keyint", "50")?
///     .profile(Some(Profile::High))?
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct ParametersBuilder<S = Overrides> {
    raw: RawParams,
    preset: Option<Preset>,
    tune: Tune,
    profile: Option<Profile>,
    nal_callback: Option<NalCallback>,
    _stage: PhantomData<S>,
}

impl ParametersBuilder<Overrides> {
    /// Starts from `x264_param_default`: library defaults plus CPU detection.
    pub fn new(api: X264ApiHandle) -> Self {
        let raw = RawParams::init(api, |api, param| unsafe { api.param_default(param) });
        Self {
            raw,
            preset: None,
            tune: Tune::default(),
            profile: None,
            nal_callback: None,
            _stage: PhantomData,
        }
    }

    /// Starts from `x264_param_default_preset` with an optional tuning.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PresetRejected`] if the library refuses the combination.
    pub fn with_preset(api: X264ApiHandle, preset: Preset, tune: Option<Tune>) -> Result<Self> {
        let tune = tune.unwrap_or_default();
        let preset_name = CString::new(preset.as_str())?;
        let tune_name = (!tune.is_empty())
            .then(|| CString::new(tune.to_string()))
            .transpose()?;
        let mut status = 0;
        let raw = RawParams::init(api, |api, param| {
            status = unsafe {
                api.param_default_preset(
                    param,
                    preset_name.as_ptr(),
                    tune_name.as_ref().map_or(std::ptr::null(), |tune| tune.as_ptr()),
                )
            };
        });
        if status < 0 {
            return Err(Error::PresetRejected {
                preset: preset.to_string(),
                tune: tune.to_string(),
            });
        }
        debug!("Applied preset {preset} with tune \"{tune}\"");
        Ok(Self {
            raw,
            preset: Some(preset),
            tune,
            profile: None,
            nal_callback: None,
            _stage: PhantomData,
        })
    }

    /// Sets the frame size in pixels.
    pub fn resolution(mut self, width: u32, height: u32) -> Self {
        self.raw.raw.i_width = to_c_int(width);
        self.raw.raw.i_height = to_c_int(height);
        self
    }

    pub fn colorspace(mut self, colorspace: Colorspace) -> Self {
        self.raw.raw.i_csp = colorspace.as_raw();
        self
    }

    /// Sets the encoded bit depth (8 or 10).
    pub fn bit_depth(mut self, bit_depth: u32) -> Self {
        self.raw.raw.i_bitdepth = to_c_int(bit_depth);
        self
    }

    pub fn fps(mut self, num: u32, den: u32) -> Self {
        self.raw.raw.i_fps_num = num;
        self.raw.raw.i_fps_den = den;
        self
    }

    pub fn timebase(mut self, num: u32, den: u32) -> Self {
        self.raw.raw.i_timebase_num = num;
        self.raw.raw.i_timebase_den = den;
        self
    }

    /// Maximum and optional minimum distance between keyframes.
    pub fn keyint(mut self, max: u32, min: Option<u32>) -> Self {
        self.raw.raw.i_keyint_max = to_c_int(max);
        self.raw.raw.i_keyint_min = min.map_or(x264_sys::X264_KEYINT_MIN_AUTO, to_c_int);
        self
    }

    pub fn bframes(mut self, bframes: u32) -> Self {
        self.raw.raw.i_bframe = to_c_int(bframes);
        self
    }

    /// Number of encoding threads, 0 for automatic.
    pub fn threads(mut self, threads: u32) -> Self {
        self.raw.raw.i_threads = to_c_int(threads);
        self
    }

    /// Splits each frame into slices encoded in parallel instead of encoding
    /// several frames at once. Adds no latency.
    pub fn sliced_threads(mut self, sliced: bool) -> Self {
        self.raw.raw.b_sliced_threads = sliced.into();
        self
    }

    /// Emit Annex-B start codes instead of 4-byte length prefixes.
    pub fn annexb(mut self, annexb: bool) -> Self {
        self.raw.raw.b_annexb = annexb.into();
        self
    }

    /// Put SPS/PPS before every keyframe instead of only the first.
    pub fn repeat_headers(mut self, repeat: bool) -> Self {
        self.raw.raw.b_repeat_headers = repeat.into();
        self
    }

    pub fn psnr(mut self, enabled: bool) -> Self {
        self.raw.raw.analyse.b_psnr = enabled.into();
        self
    }

    pub fn ssim(mut self, enabled: bool) -> Self {
        self.raw.raw.analyse.b_ssim = enabled.into();
        self
    }

    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.raw.raw.i_log_level = level.as_raw();
        self
    }

    pub fn rate_control(mut self, rate_control: RateControl) -> Self {
        let rc = &mut self.raw.raw.rc;
        match rate_control {
            RateControl::Crf { rf } => {
                rc.i_rc_method = x264_sys::X264_RC_CRF;
                rc.f_rf_constant = rf;
            }
            RateControl::Cqp { qp } => {
                rc.i_rc_method = x264_sys::X264_RC_CQP;
                rc.i_qp_constant = to_c_int(qp);
            }
            RateControl::Abr { bitrate_kbps } => {
                rc.i_rc_method = x264_sys::X264_RC_ABR;
                rc.i_bitrate = to_c_int(bitrate_kbps);
            }
        }
        self
    }

    /// Video buffering verifier limits in kbit/s and kbit.
    pub fn vbv(mut self, max_bitrate_kbps: u32, buffer_size_kbit: u32) -> Self {
        self.raw.raw.rc.i_vbv_max_bitrate = to_c_int(max_bitrate_kbps);
        self.raw.raw.rc.i_vbv_buffer_size = to_c_int(buffer_size_kbit);
        self
    }

    /// Number of frames to be encoded, if known. Only used for progress and rate control.
    pub fn frame_total(mut self, frames: u32) -> Self {
        self.raw.raw.i_frame_total = to_c_int(frames);
        self
    }

    /// Hands every NAL unit to `callback` as soon as it is finished, through
    /// x264's `nalu_process` hook, for low-latency output.
    ///
    /// Units then reach the application only through the callback: frames
    /// returned by [`crate::Encoder::encode`] and [`crate::Encoder::flush`] carry
    /// picture information but no NAL units. The hook does not work with frame
    /// threads, so [`Self::build`] requires `threads(1)` or sliced threads.
    pub fn nal_callback(mut self, callback: impl Fn(Nal<'_>) + Send + Sync + 'static) -> Self {
        self.nal_callback = Some(Arc::new(callback));
        self
    }

    /// Makes this a first pass writing rate control statistics to `stats`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] if the library rejects the settings.
    pub fn first_pass(self, stats: impl AsRef<Path>) -> Result<Self> {
        let stats = stats.as_ref().to_string_lossy().into_owned();
        self.parse("pass", "1")?.parse("stats", &stats)
    }

    /// Sets any parameter by its x264 command line name, via `x264_param_parse`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] carrying `X264_PARAM_BAD_NAME`,
    /// `X264_PARAM_BAD_VALUE` or `X264_PARAM_ALLOC_FAILED`.
    pub fn parse(mut self, name: &str, value: &str) -> Result<Self> {
        let c_name = CString::new(name)?;
        let c_value = CString::new(value)?;
        let param = self.raw.as_mut_ptr();
        let status = unsafe { self.raw.api.param_parse(param, c_name.as_ptr(), c_value.as_ptr()) };
        Error::from_parse_status(status, name, value)?;
        Ok(self)
    }

    /// Applies `x264_param_apply_fastfirstpass`.
    ///
    /// Only meaningful for a first pass (see [`Self::first_pass`]); otherwise the
    /// adjustment is skipped.
    pub fn fast_first_pass(mut self) -> ParametersBuilder<FirstPass> {
        if self.raw.raw.rc.b_stat_write != 0 {
            let param = self.raw.as_mut_ptr();
            unsafe { self.raw.api.param_apply_fastfirstpass(param) };
            debug!("Applied fast first pass settings");
        } else {
            warn!("Fast first pass requested without writing statistics, skipping");
        }
        self.into_stage()
    }
}

impl<S> ParametersBuilder<S> {
    fn into_stage<T>(self) -> ParametersBuilder<T> {
        ParametersBuilder {
            raw: self.raw,
            preset: self.preset,
            tune: self.tune,
            profile: self.profile,
            nal_callback: self.nal_callback,
            _stage: PhantomData,
        }
    }

    /// Restricts the parameters to `profile` with `x264_param_apply_profile`.
    ///
    /// `None` leaves the parameters untouched. Applying the same profile again
    /// changes nothing, since a profile only ever removes features.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProfileRejected`] if the current settings cannot be
    /// expressed in the profile, e.g. 4:4:4 input with `high`.
    pub fn profile(mut self, profile: Option<Profile>) -> Result<ParametersBuilder<Restricted>> {
        if let Some(profile) = profile {
            let name = CString::new(profile.as_str())?;
            let param = self.raw.as_mut_ptr();
            if unsafe { self.raw.api.param_apply_profile(param, name.as_ptr()) } < 0 {
                return Err(Error::ProfileRejected { profile });
            }
            debug!("Applied profile {profile}");
            // Profiles only narrow, so the strictest one applied is in force.
            self.profile = Some(self.profile.map_or(profile, |previous| previous.min(profile)));
        }
        Ok(self.into_stage())
    }

    /// Validates the parameters and freezes them.
    ///
    /// # Errors
    ///
    /// * [`Error::UnknownColorspace`] if `i_csp` names no colorspace
    /// * [`Error::InvalidDimensions`] if the size does not suit the colorspace
    /// * [`Error::UnsupportedColorspace`] if the loaded library was built for a
    ///   different chroma format
    /// * [`Error::InvalidParameter`] for a bit depth other than 8 or 10
    /// * [`Error::NalCallbackWithFrameThreads`] if a NAL callback is set while
    ///   frame threads are in use
    pub fn build(self) -> Result<Parameters> {
        let raw = &self.raw.raw;
        let colorspace = Colorspace::from_raw(raw.i_csp)?;
        colorspace.validate_dimensions(
            u32::try_from(raw.i_width).unwrap_or(0),
            u32::try_from(raw.i_height).unwrap_or(0),
        )?;
        let library_chroma = self.raw.api.chroma_format();
        if library_chroma != 0 && library_chroma != colorspace.chroma_format().as_raw() {
            return Err(Error::UnsupportedColorspace(colorspace));
        }
        if !matches!(raw.i_bitdepth, 8 | 10) {
            return Err(Error::InvalidParameter {
                name: "bitdepth".to_string(),
                value: raw.i_bitdepth.to_string(),
                code: x264_sys::X264_PARAM_BAD_VALUE,
            });
        }
        if self.nal_callback.is_some() && raw.b_sliced_threads == 0 && raw.i_threads != 1 {
            return Err(Error::NalCallbackWithFrameThreads {
                threads: to_u32(raw.i_threads),
            });
        }
        Ok(Parameters {
            raw: self.raw,
            colorspace,
            preset: self.preset,
            tune: self.tune,
            profile: self.profile,
            nal_callback: self.nal_callback,
        })
    }
}

fn to_c_int(value: u32) -> c_int {
    // Out of range values become -1, which validation or the library rejects.
    c_int::try_from(value).unwrap_or(-1)
}

fn to_u32(value: c_int) -> u32 {
    u32::try_from(value).unwrap_or(0)
}

/// A validated, immutable set of encoder parameters.
///
/// Produced by [`ParametersBuilder::build`] or taken from a running encoder
/// with [`crate::Encoder::parameters`]. Opening an encoder copies the values,
/// so a `Parameters` can be reused for several sessions.
pub struct Parameters {
    raw: RawParams,
    colorspace: Colorspace,
    preset: Option<Preset>,
    tune: Tune,
    profile: Option<Profile>,
    nal_callback: Option<NalCallback>,
}

impl Parameters {
    /// Shortcut for [`ParametersBuilder::new`].
    pub fn builder(api: X264ApiHandle) -> ParametersBuilder<Overrides> {
        ParametersBuilder::new(api)
    }

    /// Shortcut for [`ParametersBuilder::with_preset`].
    pub fn builder_with_preset(
        api: X264ApiHandle,
        preset: Preset,
        tune: Option<Tune>,
    ) -> Result<ParametersBuilder<Overrides>> {
        ParametersBuilder::with_preset(api, preset, tune)
    }

    /// Wraps a struct filled by `x264_encoder_parameters`.
    ///
    /// String and zone pointers in it belong to the encoder and are cleared, as
    /// they would dangle once the encoder is closed. So is the `nalu_process`
    /// hook, which only works with the session that installed it.
    pub(crate) fn from_encoder(
        api: X264ApiHandle,
        fill: impl FnOnce(&X264ApiHandle, *mut x264_sys::x264_param_t),
        profile: Option<Profile>,
    ) -> Result<Self> {
        let mut raw = RawParams::init(api, fill);
        {
            let param = &mut *raw.raw;
            param.psz_cqm_file = std::ptr::null_mut();
            param.psz_dump_yuv = std::ptr::null_mut();
            param.psz_clbin_file = std::ptr::null_mut();
            param.rc.psz_stat_out = std::ptr::null_mut();
            param.rc.psz_stat_in = std::ptr::null_mut();
            param.rc.psz_zones = std::ptr::null_mut();
            param.rc.zones = std::ptr::null_mut();
            param.rc.i_zones = 0;
            param.opaque = std::ptr::null_mut();
            param.param_free = None;
            param.nalu_process = None;
        }
        let colorspace = Colorspace::from_raw(raw.raw.i_csp)?;
        Ok(Self {
            raw,
            colorspace,
            preset: None,
            tune: Tune::default(),
            profile,
            nal_callback: None,
        })
    }

    pub(crate) fn raw(&self) -> &RawParams {
        &self.raw
    }

    pub(crate) fn api(&self) -> &X264ApiHandle {
        &self.raw.api
    }

    pub(crate) fn nal_callback(&self) -> Option<&NalCallback> {
        self.nal_callback.as_ref()
    }

    /// Whether encoders opened with these parameters deliver NAL units through
    /// a callback instead of the returned frames.
    pub fn has_nal_callback(&self) -> bool {
        self.nal_callback.is_some()
    }

    pub fn sliced_threads(&self) -> bool {
        self.raw.raw.b_sliced_threads != 0
    }

    /// The underlying `x264_param_t`.
    pub fn as_raw(&self) -> &x264_sys::x264_param_t {
        &self.raw.raw
    }

    pub fn width(&self) -> u32 {
        to_u32(self.raw.raw.i_width)
    }

    pub fn height(&self) -> u32 {
        to_u32(self.raw.raw.i_height)
    }

    pub fn colorspace(&self) -> Colorspace {
        self.colorspace
    }

    pub fn bit_depth(&self) -> u32 {
        to_u32(self.raw.raw.i_bitdepth)
    }

    pub fn fps(&self) -> (u32, u32) {
        (self.raw.raw.i_fps_num, self.raw.raw.i_fps_den)
    }

    pub fn timebase(&self) -> (u32, u32) {
        (self.raw.raw.i_timebase_num, self.raw.raw.i_timebase_den)
    }

    pub fn keyint_max(&self) -> u32 {
        to_u32(self.raw.raw.i_keyint_max)
    }

    pub fn bframes(&self) -> u32 {
        to_u32(self.raw.raw.i_bframe)
    }

    pub fn threads(&self) -> u32 {
        to_u32(self.raw.raw.i_threads)
    }

    pub fn annexb(&self) -> bool {
        self.raw.raw.b_annexb != 0
    }

    pub fn repeat_headers(&self) -> bool {
        self.raw.raw.b_repeat_headers != 0
    }

    pub fn psnr(&self) -> bool {
        self.raw.raw.analyse.b_psnr != 0
    }

    pub fn ssim(&self) -> bool {
        self.raw.raw.analyse.b_ssim != 0
    }

    pub fn cabac(&self) -> bool {
        self.raw.raw.b_cabac != 0
    }

    pub fn log_level(&self) -> LogLevel {
        LogLevel::from_raw(self.raw.raw.i_log_level)
    }

    pub fn frame_total(&self) -> u32 {
        to_u32(self.raw.raw.i_frame_total)
    }

    pub fn rate_control(&self) -> RateControl {
        let rc = &self.raw.raw.rc;
        match rc.i_rc_method {
            x264_sys::X264_RC_CQP => RateControl::Cqp {
                qp: to_u32(rc.i_qp_constant),
            },
            x264_sys::X264_RC_ABR => RateControl::Abr {
                bitrate_kbps: to_u32(rc.i_bitrate),
            },
            _ => RateControl::Crf {
                rf: rc.f_rf_constant,
            },
        }
    }

    pub fn preset(&self) -> Option<Preset> {
        self.preset
    }

    pub fn tune(&self) -> Tune {
        self.tune
    }

    /// The strictest profile applied while building, if any.
    pub fn profile(&self) -> Option<Profile> {
        self.profile
    }

    /// Size in bytes of one tightly packed input frame.
    pub fn frame_size(&self) -> Result<usize> {
        self.colorspace.frame_size(self.width(), self.height())
    }

    pub fn summary(&self) -> ParameterSummary {
        ParameterSummary {
            width: self.width(),
            height: self.height(),
            colorspace: self.colorspace.to_string(),
            bit_depth: self.bit_depth(),
            fps: self.fps(),
            timebase: self.timebase(),
            keyint_max: self.keyint_max(),
            bframes: self.bframes(),
            threads: self.threads(),
            annexb: self.annexb(),
            repeat_headers: self.repeat_headers(),
            rate_control: self.rate_control(),
            preset: self.preset,
            tune: (!self.tune.is_empty()).then(|| self.tune.to_string()),
            profile: self.profile,
            log_level: self.log_level(),
        }
    }
}

impl std::fmt::Debug for Parameters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Parameters")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("colorspace", &self.colorspace)
            .field("preset", &self.preset)
            .field("profile", &self.profile)
            .field("nal_callback", &self.nal_callback.is_some())
            .finish_non_exhaustive()
    }
}

/// Serializable overview of a [`Parameters`] value, for logs and reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterSummary {
    pub width: u32,
    pub height: u32,
    pub colorspace: String,
    pub bit_depth: u32,
    pub fps: (u32, u32),
    pub timebase: (u32, u32),
    pub keyint_max: u32,
    pub bframes: u32,
    pub threads: u32,
    pub annexb: bool,
    pub repeat_headers: bool,
    pub rate_control: RateControl,
    pub preset: Option<Preset>,
    pub tune: Option<String>,
    pub profile: Option<Profile>,
    pub log_level: LogLevel,
}
