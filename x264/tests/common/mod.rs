// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Shared test utilities: logging setup and an in-process stand-in for libx264.
//!
//! The stand-in implements every entry point of the dispatch table with plain
//! `extern "C"` functions. Its encoder delays `i_bframe` frames, emits SPS/PPS/SEI
//! before the first IDR, and writes every call's output into one reused buffer
//! that is overwritten with `0xAA` before each call, like x264 reuses its own.
//! With `nalu_process` set it hands each unit, unescaped, to the hook first and
//! scribbles over the returned buffer. Per-thread knobs inject failures.

#![allow(dead_code)]

use std::{
    cell::Cell,
    collections::VecDeque,
    ffi::{CStr, CString, c_char, c_int, c_void},
};

use x264::{X264ApiHandle, wrap_api};
use x264_sys::{X264Api, X264Functions, x264_nal_t, x264_param_t, x264_picture_t, x264_t};

/// Ensures logging is initialized only once across all tests.
static LOG_ONCE: std::sync::Once = std::sync::Once::new();

pub fn setup_logging() {
    LOG_ONCE.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::builder()
                    .with_default_directive(tracing::level_filters::LevelFilter::INFO.into())
                    .from_env_lossy(),
            )
            .with_test_writer()
            .init();
    });
}

/// Byte every payload buffer is overwritten with before the library writes new output.
pub const SCRIBBLE: u8 = 0xAA;

thread_local! {
    static FAIL_AT_PTS: Cell<Option<i64>> = const { Cell::new(None) };
    static REJECT_OPEN: Cell<bool> = const { Cell::new(false) };
    static STALLED_FLUSHES: Cell<u32> = const { Cell::new(0) };
    static PARAM_CLEANUPS: Cell<usize> = const { Cell::new(0) };
    static ENCODERS_OPEN: Cell<isize> = const { Cell::new(0) };
    static ENCODE_CALLS: Cell<usize> = const { Cell::new(0) };
    static INTRA_REFRESHES: Cell<usize> = const { Cell::new(0) };
}

/// Makes the encode call for the picture with this pts fail.
pub fn fail_encode_at(pts: Option<i64>) {
    FAIL_AT_PTS.with(|cell| cell.set(pts));
}

/// Makes `x264_encoder_open` return null.
pub fn reject_open(reject: bool) {
    REJECT_OPEN.with(|cell| cell.set(reject));
}

/// The next `count` flush calls return nothing even though frames are buffered.
pub fn stall_flushes(count: u32) {
    STALLED_FLUSHES.with(|cell| cell.set(count));
}

pub fn param_cleanups() -> usize {
    PARAM_CLEANUPS.with(Cell::get)
}

/// Encoders opened minus encoders closed on this thread.
pub fn encoders_open() -> isize {
    ENCODERS_OPEN.with(Cell::get)
}

/// Calls to `x264_encoder_encode` on this thread.
pub fn encode_calls() -> usize {
    ENCODE_CALLS.with(Cell::get)
}

pub fn intra_refreshes() -> usize {
    INTRA_REFRESHES.with(Cell::get)
}

/// A dispatch table backed by the stand-in, accepting every chroma format.
pub fn fake_api() -> X264ApiHandle {
    fake_api_with_chroma(0)
}

/// A dispatch table backed by the stand-in, built for a single chroma format.
pub fn fake_api_with_chroma(chroma_format: c_int) -> X264ApiHandle {
    wrap_api(X264Api::from_functions(functions(), chroma_format))
}

pub fn functions() -> X264Functions {
    X264Functions {
        param_default,
        param_parse,
        param_cleanup,
        param_default_preset,
        param_apply_fastfirstpass,
        param_apply_profile,
        picture_init,
        picture_alloc,
        picture_clean,
        nal_encode,
        encoder_open,
        encoder_reconfig,
        encoder_parameters,
        encoder_headers,
        encoder_encode,
        encoder_close,
        encoder_delayed_frames,
        encoder_maximum_delayed_frames,
        encoder_intra_refresh,
        encoder_invalidate_reference,
    }
}

fn default_param() -> x264_param_t {
    // Safety: all-zero is a valid x264_param_t.
    let mut param: x264_param_t = unsafe { std::mem::zeroed() };
    param.i_csp = x264_sys::X264_CSP_I420;
    param.i_bitdepth = 8;
    param.i_fps_num = 25;
    param.i_fps_den = 1;
    param.i_timebase_num = 1;
    param.i_timebase_den = 25;
    param.i_keyint_max = 250;
    param.i_bframe = 3;
    param.i_frame_reference = 3;
    param.b_cabac = 1;
    param.b_annexb = 1;
    param.b_repeat_headers = 1;
    param.i_log_level = x264_sys::X264_LOG_INFO;
    param.analyse.b_transform_8x8 = 1;
    param.analyse.i_subpel_refine = 7;
    param.rc.i_rc_method = x264_sys::X264_RC_CRF;
    param.rc.f_rf_constant = 23.0;
    param.rc.i_qp_constant = 23;
    param.rc.i_lookahead = 40;
    param
}

unsafe fn name<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        None
    } else {
        unsafe { CStr::from_ptr(ptr) }.to_str().ok()
    }
}

unsafe extern "C" fn param_default(param: *mut x264_param_t) {
    unsafe { *param = default_param() };
}

unsafe extern "C" fn param_default_preset(
    param: *mut x264_param_t,
    preset: *const c_char,
    tune: *const c_char,
) -> c_int {
    let param = unsafe { &mut *param };
    *param = default_param();
    let preset = unsafe { name(preset) }.unwrap_or("medium");
    let index = match preset.as_bytes() {
        [digit @ b'0'..=b'9'] => usize::from(digit - b'0'),
        _ => match x264_sys::X264_PRESET_NAMES.iter().position(|p| *p == preset) {
            Some(index) => index,
            None => return -1,
        },
    };
    if index == 0 {
        param.i_bframe = 0;
        param.b_cabac = 0;
        param.i_frame_reference = 1;
    } else if index >= 6 {
        param.i_frame_reference = 5;
    }
    if let Some(tune) = unsafe { name(tune) } {
        let mut psy = 0;
        for token in tune.split([',', '.', '/', '-', '+']).filter(|t| !t.is_empty()) {
            match x264_sys::X264_TUNE_NAMES.iter().position(|t| *t == token) {
                Some(6) => {}
                Some(7) => {
                    param.i_bframe = 0;
                    param.rc.i_lookahead = 0;
                }
                Some(_) => {
                    psy += 1;
                    if psy > 1 {
                        return -1;
                    }
                }
                None => return -1,
            }
        }
    }
    0
}

unsafe extern "C" fn param_parse(
    param: *mut x264_param_t,
    name_ptr: *const c_char,
    value_ptr: *const c_char,
) -> c_int {
    let param = unsafe { &mut *param };
    let (Some(key), Some(value)) = (unsafe { name(name_ptr) }, unsafe { name(value_ptr) }) else {
        return x264_sys::X264_PARAM_BAD_NAME;
    };
    let int = || value.parse::<c_int>().ok();
    let flag = || match value {
        "1" | "true" | "yes" => Some(1),
        "0" | "false" | "no" => Some(0),
        _ => None,
    };
    let parsed = match key {
        "keyint" => int().map(|v| param.i_keyint_max = v),
        "min-keyint" => int().map(|v| param.i_keyint_min = v),
        "bframes" => int().map(|v| param.i_bframe = v),
        "threads" => int().map(|v| param.i_threads = v),
        "ref" => int().map(|v| param.i_frame_reference = v),
        "annexb" => flag().map(|v| param.b_annexb = v),
        "repeat-headers" => flag().map(|v| param.b_repeat_headers = v),
        "psnr" => flag().map(|v| param.analyse.b_psnr = v),
        "ssim" => flag().map(|v| param.analyse.b_ssim = v),
        "crf" => value.parse::<f32>().ok().map(|v| {
            param.rc.i_rc_method = x264_sys::X264_RC_CRF;
            param.rc.f_rf_constant = v;
        }),
        "pass" => int().map(|v| {
            param.rc.b_stat_write = c_int::from(v & 1 != 0);
            param.rc.b_stat_read = c_int::from(v & 2 != 0);
        }),
        "stats" => {
            let Ok(value) = CString::new(value) else {
                return x264_sys::X264_PARAM_BAD_VALUE;
            };
            // Strings live in a list hanging off `opaque`, freed by param_cleanup.
            if param.opaque.is_null() {
                param.opaque = Box::into_raw(Box::new(Vec::<CString>::new())).cast();
            }
            let strings = unsafe { &mut *param.opaque.cast::<Vec<CString>>() };
            strings.push(value);
            let ptr = strings.last().map_or(std::ptr::null_mut(), |s| s.as_ptr().cast_mut());
            param.rc.psz_stat_out = ptr;
            param.rc.psz_stat_in = ptr;
            Some(())
        }
        _ => return x264_sys::X264_PARAM_BAD_NAME,
    };
    match parsed {
        Some(()) => 0,
        None => x264_sys::X264_PARAM_BAD_VALUE,
    }
}

unsafe extern "C" fn param_cleanup(param: *mut x264_param_t) {
    let param = unsafe { &mut *param };
    if !param.opaque.is_null() {
        drop(unsafe { Box::from_raw(param.opaque.cast::<Vec<CString>>()) });
        param.opaque = std::ptr::null_mut();
    }
    PARAM_CLEANUPS.with(|cell| cell.set(cell.get() + 1));
}

unsafe extern "C" fn param_apply_fastfirstpass(param: *mut x264_param_t) {
    let param = unsafe { &mut *param };
    if param.rc.b_stat_write != 0 && param.rc.b_stat_read == 0 {
        param.i_frame_reference = 1;
        param.analyse.b_transform_8x8 = 0;
        param.analyse.i_subpel_refine = 2;
    }
}

fn chroma_of(csp: c_int) -> c_int {
    match csp & x264_sys::X264_CSP_MASK {
        x264_sys::X264_CSP_I400 => x264_sys::X264_CSP_I400,
        c if c < x264_sys::X264_CSP_I422 => x264_sys::X264_CSP_I420,
        c if c < x264_sys::X264_CSP_I444 => x264_sys::X264_CSP_I422,
        _ => x264_sys::X264_CSP_I444,
    }
}

unsafe extern "C" fn param_apply_profile(param: *mut x264_param_t, profile: *const c_char) -> c_int {
    let param = unsafe { &mut *param };
    let Some(index) = unsafe { name(profile) }
        .and_then(|profile| x264_sys::X264_PROFILE_NAMES.iter().position(|p| *p == profile))
    else {
        return -1;
    };
    let chroma = chroma_of(param.i_csp);
    if (chroma == x264_sys::X264_CSP_I444 && index < 5)
        || (chroma == x264_sys::X264_CSP_I422 && index < 4)
        || (param.i_bitdepth > 8 && index < 3)
    {
        return -1;
    }
    if index == 0 {
        param.i_bframe = 0;
        param.b_cabac = 0;
        param.analyse.b_transform_8x8 = 0;
    } else if index == 1 {
        param.analyse.b_transform_8x8 = 0;
    }
    0
}

unsafe extern "C" fn picture_init(pic: *mut x264_picture_t) {
    // Safety: all-zero is a valid x264_picture_t.
    unsafe {
        *pic = std::mem::zeroed();
        (*pic).i_type = x264_sys::X264_TYPE_AUTO;
        (*pic).i_pic_struct = x264_sys::PIC_STRUCT_AUTO as c_int;
    }
}

unsafe extern "C" fn picture_alloc(
    _pic: *mut x264_picture_t,
    _csp: c_int,
    _width: c_int,
    _height: c_int,
) -> c_int {
    -1
}

unsafe extern "C" fn picture_clean(_pic: *mut x264_picture_t) {}

/// Prefixes the unit like `emit` does; the stand-in never needs escaping.
unsafe extern "C" fn nal_encode(_h: *mut x264_t, dst: *mut u8, nal: *mut x264_nal_t) {
    let nal = unsafe { &mut *nal };
    let len = usize::try_from(nal.i_payload).unwrap_or(0);
    let prefix = if nal.b_long_startcode != 0 {
        [0, 0, 0, 1]
    } else {
        (len as u32).to_be_bytes()
    };
    unsafe {
        dst.copy_from_nonoverlapping(prefix.as_ptr(), prefix.len());
        dst.add(prefix.len())
            .copy_from_nonoverlapping(nal.p_payload, len);
    }
    nal.p_payload = dst;
    nal.i_payload = (len + prefix.len()) as c_int;
}

struct FakeEncoder {
    param: x264_param_t,
    queue: VecDeque<(i64, u8, *mut c_void)>,
    frames_out: i64,
    payload: Vec<u8>,
    nals: Vec<x264_nal_t>,
}

struct PendingNal {
    nal_type: c_int,
    priority: c_int,
    body: Vec<u8>,
}

impl FakeEncoder {
    fn delay(&self) -> usize {
        usize::try_from(self.param.i_bframe).unwrap_or(0)
    }

    fn emit(&mut self, units: &[PendingNal]) -> c_int {
        self.payload.fill(SCRIBBLE);
        self.payload.clear();
        let annexb = self.param.b_annexb != 0;
        let mut ranges = Vec::new();
        for unit in units {
            let start = self.payload.len();
            if annexb {
                self.payload.extend_from_slice(&[0, 0, 0, 1]);
            } else {
                let len = 1 + unit.body.len() as u32;
                self.payload.extend_from_slice(&len.to_be_bytes());
            }
            self.payload.push(((unit.priority as u8) << 5) | unit.nal_type as u8);
            self.payload.extend_from_slice(&unit.body);
            ranges.push((start, self.payload.len() - start));
        }
        let base = self.payload.as_mut_ptr();
        self.nals.clear();
        for (unit, (start, len)) in units.iter().zip(ranges) {
            self.nals.push(x264_nal_t {
                i_ref_idc: unit.priority,
                i_type: unit.nal_type,
                b_long_startcode: c_int::from(annexb),
                i_first_mb: 0,
                i_last_mb: 0,
                i_payload: len as c_int,
                p_payload: unsafe { base.add(start) },
                i_padding: 0,
            });
        }
        self.payload.len() as c_int
    }

    /// Hands every emitted unit to `nalu_process`, then invalidates the buffer.
    fn deliver(&mut self, h: *mut x264_t, opaque: *mut c_void) {
        let Some(process) = self.param.nalu_process else {
            return;
        };
        for mut nal in self.nals.clone() {
            // The hook sees the unit without its start code or length prefix.
            nal.p_payload = unsafe { nal.p_payload.add(4) };
            nal.i_payload -= 4;
            unsafe { process(h, &mut nal, opaque) };
        }
        self.payload.fill(SCRIBBLE);
    }

    fn header_units(&self) -> Vec<PendingNal> {
        let profile_idc = if self.param.b_cabac == 0 { 66 } else { 100 };
        let mut sps = vec![profile_idc, 0, 30];
        sps.extend_from_slice(&(self.param.i_width as u16).to_be_bytes());
        sps.extend_from_slice(&(self.param.i_height as u16).to_be_bytes());
        vec![
            PendingNal {
                nal_type: x264_sys::NAL_SPS as c_int,
                priority: x264_sys::NAL_PRIORITY_HIGHEST as c_int,
                body: sps,
            },
            PendingNal {
                nal_type: x264_sys::NAL_PPS as c_int,
                priority: x264_sys::NAL_PRIORITY_HIGHEST as c_int,
                body: vec![0xCE, 0x3C, 0x80],
            },
            PendingNal {
                nal_type: x264_sys::NAL_SEI as c_int,
                priority: x264_sys::NAL_PRIORITY_DISPOSABLE as c_int,
                body: b"x264 stand-in".to_vec(),
            },
        ]
    }
}

unsafe fn encoder<'a>(h: *mut x264_t) -> &'a mut FakeEncoder {
    unsafe { &mut *h.cast::<FakeEncoder>() }
}

unsafe extern "C" fn encoder_open(param: *mut x264_param_t) -> *mut x264_t {
    let param = unsafe { *param };
    if REJECT_OPEN.with(Cell::get) || param.i_width <= 0 || param.i_height <= 0 {
        return std::ptr::null_mut();
    }
    ENCODERS_OPEN.with(|cell| cell.set(cell.get() + 1));
    let mut param = param;
    // The library keeps its own copy; strings of the caller's struct are not shared.
    param.opaque = std::ptr::null_mut();
    param.rc.psz_stat_out = std::ptr::null_mut();
    param.rc.psz_stat_in = std::ptr::null_mut();
    Box::into_raw(Box::new(FakeEncoder {
        param,
        queue: VecDeque::new(),
        frames_out: 0,
        payload: Vec::with_capacity(1 << 16),
        nals: Vec::new(),
    }))
    .cast()
}

unsafe extern "C" fn encoder_reconfig(h: *mut x264_t, param: *mut x264_param_t) -> c_int {
    let encoder = unsafe { encoder(h) };
    let param = unsafe { &*param };
    if param.rc.i_rc_method != encoder.param.rc.i_rc_method {
        return -1;
    }
    encoder.param.rc.f_rf_constant = param.rc.f_rf_constant;
    encoder.param.rc.i_bitrate = param.rc.i_bitrate;
    encoder.param.rc.i_vbv_max_bitrate = param.rc.i_vbv_max_bitrate;
    encoder.param.rc.i_vbv_buffer_size = param.rc.i_vbv_buffer_size;
    encoder.param.i_keyint_max = param.i_keyint_max;
    0
}

unsafe extern "C" fn encoder_parameters(h: *mut x264_t, param: *mut x264_param_t) {
    let encoder = unsafe { encoder(h) };
    unsafe { *param = encoder.param };
}

unsafe extern "C" fn encoder_headers(
    h: *mut x264_t,
    pp_nal: *mut *mut x264_nal_t,
    pi_nal: *mut c_int,
) -> c_int {
    let encoder = unsafe { encoder(h) };
    let units = encoder.header_units();
    let size = encoder.emit(&units);
    unsafe {
        *pp_nal = encoder.nals.as_mut_ptr();
        *pi_nal = encoder.nals.len() as c_int;
    }
    size
}

unsafe extern "C" fn encoder_encode(
    h: *mut x264_t,
    pp_nal: *mut *mut x264_nal_t,
    pi_nal: *mut c_int,
    pic_in: *mut x264_picture_t,
    pic_out: *mut x264_picture_t,
) -> c_int {
    ENCODE_CALLS.with(|cell| cell.set(cell.get() + 1));
    let encoder = unsafe { encoder(h) };
    unsafe { *pi_nal = 0 };

    if let Some(pic) = unsafe { pic_in.as_ref() } {
        if FAIL_AT_PTS.with(Cell::get) == Some(pic.i_pts)
            || pic.img.i_csp != encoder.param.i_csp
            || pic.img.plane[0].is_null()
        {
            return -1;
        }
        let first_luma = unsafe { *pic.img.plane[0] };
        encoder.queue.push_back((pic.i_pts, first_luma, pic.opaque));
        if encoder.queue.len() <= encoder.delay() {
            return 0;
        }
    } else if !encoder.queue.is_empty() {
        let stalled = STALLED_FLUSHES.with(|cell| {
            let stalled = cell.get();
            cell.set(stalled.saturating_sub(1));
            stalled > 0
        });
        if stalled {
            return 0;
        }
    }

    let Some((pts, first_luma, opaque)) = encoder.queue.pop_front() else {
        return 0;
    };
    let index = encoder.frames_out;
    let keyint = i64::from(encoder.param.i_keyint_max.max(1));
    let idr = index % keyint == 0;
    let mut units = if idr && (index == 0 || encoder.param.b_repeat_headers != 0) {
        encoder.header_units()
    } else {
        Vec::new()
    };
    let mut body = pts.to_be_bytes().to_vec();
    body.push(first_luma);
    units.push(PendingNal {
        nal_type: if idr {
            x264_sys::NAL_SLICE_IDR as c_int
        } else {
            x264_sys::NAL_SLICE as c_int
        },
        priority: if idr {
            x264_sys::NAL_PRIORITY_HIGHEST as c_int
        } else {
            x264_sys::NAL_PRIORITY_HIGH as c_int
        },
        body,
    });
    let size = encoder.emit(&units);
    encoder.deliver(h, opaque);
    encoder.frames_out += 1;

    unsafe {
        *pp_nal = encoder.nals.as_mut_ptr();
        *pi_nal = encoder.nals.len() as c_int;
        let out = &mut *pic_out;
        out.i_pts = pts;
        out.i_dts = index - encoder.delay() as i64;
        out.b_keyframe = c_int::from(idr);
        out.i_type = if idr {
            x264_sys::X264_TYPE_IDR
        } else {
            x264_sys::X264_TYPE_P
        };
        if encoder.param.analyse.b_psnr != 0 {
            out.prop.f_psnr_avg = 42.0;
            out.prop.f_psnr = [43.0, 41.0, 40.0];
        }
        if encoder.param.analyse.b_ssim != 0 {
            out.prop.f_ssim = 0.98;
        }
    }
    size
}

unsafe extern "C" fn encoder_close(h: *mut x264_t) {
    drop(unsafe { Box::from_raw(h.cast::<FakeEncoder>()) });
    ENCODERS_OPEN.with(|cell| cell.set(cell.get() - 1));
}

unsafe extern "C" fn encoder_delayed_frames(h: *mut x264_t) -> c_int {
    unsafe { encoder(h) }.queue.len() as c_int
}

unsafe extern "C" fn encoder_maximum_delayed_frames(h: *mut x264_t) -> c_int {
    unsafe { encoder(h) }.delay() as c_int
}

unsafe extern "C" fn encoder_intra_refresh(_h: *mut x264_t) {
    INTRA_REFRESHES.with(|cell| cell.set(cell.get() + 1));
}

unsafe extern "C" fn encoder_invalidate_reference(h: *mut x264_t, _pts: i64) -> c_int {
    if unsafe { encoder(h) }.param.i_bframe > 0 {
        -1
    } else {
        0
    }
}
