// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! NAL units produced by the encoder.
//!
//! x264 hands out NAL payloads in a buffer it reuses on the next call. The
//! borrowed views here ([`EncodedFrame`], [`Nal`]) carry a lifetime tied to the
//! encoder borrow, so the compiler rejects any use after the encoder is called
//! again. [`OwnedEncodedFrame`] and [`NalUnit`] are independent copies.

use std::{
    ffi::{c_int, c_void},
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

use tracing::error;

use crate::{OutputPicture, api::X264ApiHandle};

/// NAL unit type (`nal_unit_type_e`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NalType {
    Unknown,
    Slice,
    SliceDpa,
    SliceDpb,
    SliceDpc,
    SliceIdr,
    Sei,
    Sps,
    Pps,
    Aud,
    Filler,
}

impl NalType {
    pub fn from_raw(value: c_int) -> Self {
        let Ok(value) = x264_sys::nal_unit_type_e::try_from(value) else {
            return NalType::Unknown;
        };
        match value {
            x264_sys::NAL_SLICE => NalType::Slice,
            x264_sys::NAL_SLICE_DPA => NalType::SliceDpa,
            x264_sys::NAL_SLICE_DPB => NalType::SliceDpb,
            x264_sys::NAL_SLICE_DPC => NalType::SliceDpc,
            x264_sys::NAL_SLICE_IDR => NalType::SliceIdr,
            x264_sys::NAL_SEI => NalType::Sei,
            x264_sys::NAL_SPS => NalType::Sps,
            x264_sys::NAL_PPS => NalType::Pps,
            x264_sys::NAL_AUD => NalType::Aud,
            x264_sys::NAL_FILLER => NalType::Filler,
            _ => NalType::Unknown,
        }
    }

    /// Coded slice data, as opposed to headers and supplemental units.
    pub fn is_slice(&self) -> bool {
        matches!(
            self,
            NalType::Slice
                | NalType::SliceDpa
                | NalType::SliceDpb
                | NalType::SliceDpc
                | NalType::SliceIdr
        )
    }

    pub fn is_parameter_set(&self) -> bool {
        matches!(self, NalType::Sps | NalType::Pps)
    }
}

/// Reference priority of a NAL unit (`nal_priority_e`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NalPriority {
    Disposable,
    Low,
    High,
    Highest,
}

impl NalPriority {
    pub fn from_raw(value: c_int) -> Self {
        let Ok(value) = x264_sys::nal_priority_e::try_from(value) else {
            return NalPriority::Disposable;
        };
        match value {
            x264_sys::NAL_PRIORITY_LOW => NalPriority::Low,
            x264_sys::NAL_PRIORITY_HIGH => NalPriority::High,
            x264_sys::NAL_PRIORITY_HIGHEST => NalPriority::Highest,
            _ => NalPriority::Disposable,
        }
    }
}

/// Borrowed view of one NAL unit in the encoder's output buffer.
#[derive(Debug, Clone, Copy)]
pub struct Nal<'a> {
    pub nal_type: NalType,
    pub priority: NalPriority,
    /// Whether the unit starts with a 4-byte start code (Annex-B only).
    pub long_start_code: bool,
    /// Index of the first macroblock, for slices.
    pub first_mb: i32,
    /// Index of the last macroblock, for slices.
    pub last_mb: i32,
    /// Start code (or length prefix) plus the escaped NAL bytes, including padding.
    pub payload: &'a [u8],
    /// Trailing padding bytes included in `payload`.
    pub padding: usize,
}

impl<'a> Nal<'a> {
    /// # Safety
    ///
    /// `raw.p_payload` must point to `raw.i_payload` readable bytes that stay
    /// valid and unmodified for `'a`.
    unsafe fn from_raw(raw: &x264_sys::x264_nal_t) -> Self {
        let payload = match usize::try_from(raw.i_payload) {
            Ok(len) if len > 0 && !raw.p_payload.is_null() => unsafe {
                std::slice::from_raw_parts(raw.p_payload.cast_const(), len)
            },
            _ => &[],
        };
        Self {
            nal_type: NalType::from_raw(raw.i_type),
            priority: NalPriority::from_raw(raw.i_ref_idc),
            long_start_code: raw.b_long_startcode != 0,
            first_mb: raw.i_first_mb,
            last_mb: raw.i_last_mb,
            payload,
            padding: usize::try_from(raw.i_padding).unwrap_or(0),
        }
    }

    /// Copies the payload into an owned unit.
    pub fn to_owned(&self) -> NalUnit {
        self.into()
    }
}

/// Owned copy of a NAL unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NalUnit {
    pub nal_type: NalType,
    pub priority: NalPriority,
    pub long_start_code: bool,
    pub first_mb: i32,
    pub last_mb: i32,
    pub payload: Vec<u8>,
    pub padding: usize,
}

impl<'a> From<&Nal<'a>> for NalUnit {
    fn from(nal: &Nal<'a>) -> Self {
        Self {
            nal_type: nal.nal_type,
            priority: nal.priority,
            long_start_code: nal.long_start_code,
            first_mb: nal.first_mb,
            last_mb: nal.last_mb,
            payload: nal.payload.to_vec(),
            padding: nal.padding,
        }
    }
}

impl<'a> From<Nal<'a>> for NalUnit {
    fn from(nal: Nal<'a>) -> Self {
        (&nal).into()
    }
}

/// Copies a raw NAL array into owned units.
///
/// # Safety
///
/// `nals` must point to `count` valid NAL structs whose payloads are readable.
pub(crate) unsafe fn collect_owned(
    nals: *const x264_sys::x264_nal_t,
    count: c_int,
) -> Vec<NalUnit> {
    unsafe { raw_slice(nals, count) }
        .iter()
        .map(|raw| NalUnit::from(unsafe { Nal::from_raw(raw) }))
        .collect()
}

unsafe fn raw_slice<'a>(
    nals: *const x264_sys::x264_nal_t,
    count: c_int,
) -> &'a [x264_sys::x264_nal_t] {
    match usize::try_from(count) {
        Ok(count) if count > 0 && !nals.is_null() => unsafe {
            std::slice::from_raw_parts(nals, count)
        },
        _ => &[],
    }
}

/// One encoded frame as returned by a single encode or flush call.
///
/// Borrows the encoder's output buffer. Call [`Self::to_owned`] to keep the
/// data beyond the next encoder call.
#[derive(Debug, Clone, Copy)]
pub struct EncodedFrame<'a> {
    nals: &'a [x264_sys::x264_nal_t],
    size: usize,
    picture: OutputPicture,
}

impl<'a> EncodedFrame<'a> {
    /// # Safety
    ///
    /// `nals` must point to `count` NAL structs whose payloads stay valid and
    /// unmodified for `'a`.
    pub(crate) unsafe fn from_raw(
        nals: *const x264_sys::x264_nal_t,
        count: c_int,
        size: usize,
        picture: OutputPicture,
    ) -> Self {
        Self {
            nals: unsafe { raw_slice(nals, count) },
            size,
            picture,
        }
    }

    /// NAL units in emission order.
    pub fn nals(&self) -> impl ExactSizeIterator<Item = Nal<'a>> + use<'a> {
        let nals: &'a [x264_sys::x264_nal_t] = self.nals;
        // Safety: the payload pointers were valid for 'a when this frame was created.
        nals.iter().map(|raw| unsafe { Nal::from_raw(raw) })
    }

    pub fn nal_count(&self) -> usize {
        self.nals.len()
    }

    /// Total payload bytes, as returned by `x264_encoder_encode`.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn picture(&self) -> &OutputPicture {
        &self.picture
    }

    pub fn is_keyframe(&self) -> bool {
        self.picture.keyframe
    }

    /// Copies every payload into an owned frame.
    pub fn to_owned(&self) -> OwnedEncodedFrame {
        self.into()
    }
}

/// Owned copy of an [`EncodedFrame`], independent of the encoder's buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct OwnedEncodedFrame {
    pub nals: Vec<NalUnit>,
    pub picture: OutputPicture,
}

impl OwnedEncodedFrame {
    /// All payloads concatenated in emission order, ready to be written out.
    pub fn data(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(self.size());
        for nal in &self.nals {
            data.extend_from_slice(&nal.payload);
        }
        data
    }

    pub fn size(&self) -> usize {
        self.nals.iter().map(|nal| nal.payload.len()).sum()
    }
}

impl<'a> From<&EncodedFrame<'a>> for OwnedEncodedFrame {
    fn from(frame: &EncodedFrame<'a>) -> Self {
        Self {
            nals: frame.nals().map(NalUnit::from).collect(),
            picture: frame.picture,
        }
    }
}

impl<'a> From<EncodedFrame<'a>> for OwnedEncodedFrame {
    fn from(frame: EncodedFrame<'a>) -> Self {
        (&frame).into()
    }
}

/// Receives every NAL unit as soon as libx264 finishes it, before the frame
/// is complete (see [`crate::ParametersBuilder::nal_callback`]).
///
/// May be called from libx264's slice threads, several at a time.
pub type NalCallback = Arc<dyn Fn(Nal<'_>) + Send + Sync>;

/// State reached by [`process_nal`] through the `opaque` pointer of every input
/// picture of a session.
pub(crate) struct NalSink {
    api: X264ApiHandle,
    callback: NalCallback,
}

impl NalSink {
    pub(crate) fn new(api: X264ApiHandle, callback: NalCallback) -> Box<Self> {
        Box::new(Self { api, callback })
    }

    pub(crate) fn as_opaque(&self) -> *mut c_void {
        std::ptr::from_ref(self).cast_mut().cast()
    }
}

/// Bytes `x264_nal_encode` may write for a unit of `payload` unescaped bytes.
fn escaped_capacity(payload: c_int) -> usize {
    let payload = usize::try_from(payload).unwrap_or(0);
    payload + payload / 2 + 5 + 64
}

/// The `nalu_process` hook of sessions with a [`NalCallback`].
///
/// # Safety
///
/// `opaque` must be null or point to a live [`NalSink`], and `nal` must be an
/// unescaped unit of the encoder `h`.
pub(crate) unsafe extern "C" fn process_nal(
    h: *mut x264_sys::x264_t,
    nal: *mut x264_sys::x264_nal_t,
    opaque: *mut c_void,
) {
    let Some(sink) = (unsafe { opaque.cast::<NalSink>().as_ref() }) else {
        return;
    };
    if nal.is_null() {
        return;
    }
    let mut buffer = vec![0u8; escaped_capacity(unsafe { (*nal).i_payload })];
    unsafe { sink.api.nal_encode(h, buffer.as_mut_ptr(), nal) };
    // Safety: the unit now points into `buffer`, which outlives the callback.
    let unit = unsafe { Nal::from_raw(&*nal) };
    // Unwinding into libx264 would abort the process.
    if panic::catch_unwind(AssertUnwindSafe(|| (sink.callback)(unit))).is_err() {
        error!("NAL callback panicked, {:?} unit dropped", unit.nal_type);
    }
}
