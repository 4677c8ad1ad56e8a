// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Encoder sessions.
//!
//! An [`Encoder`] owns one libx264 encoder handle and walks it through its
//! lifecycle:
//!
//! ```text
//!  open() ──► Open ──flush()──► Flushing ──close()──► Closed
//!              │                   │
//!              └──encode error─────┴──► Failed
//! ```
//!
//! While `Open`, every [`Encoder::encode`] call submits one picture and returns
//! at most one encoded frame. The encoder buffers frames for lookahead and
//! B-frame reordering, so early calls usually return nothing. At end of input
//! [`Encoder::flush`] drains those buffered frames until it reports
//! [`Flushed::Drained`].

use std::{ffi::c_int, fmt};

use tracing::{debug, error, info, warn};

use crate::{
    Colorspace, EncodedFrame, Error, NalUnit, OutputPicture, Parameters, Picture, Profile, Result,
    api::X264ApiHandle,
    nal::{self, NalSink},
    picture,
};

/// Lifecycle state of an [`Encoder`].
///
/// There is no "unopened" state: an `Encoder` value only exists once
/// [`Encoder::open`] succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Accepting pictures.
    Open,
    /// Draining buffered frames; no more pictures are accepted.
    Flushing,
    /// An encode call failed. Only closing is possible.
    Failed,
    /// The handle has been released.
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionState::Open => "open",
            SessionState::Flushing => "flushing",
            SessionState::Failed => "failed",
            SessionState::Closed => "closed",
        })
    }
}

/// Result of one [`Encoder::flush`] step.
#[derive(Debug)]
pub enum Flushed<'a> {
    /// A buffered frame came out.
    Frame(EncodedFrame<'a>),
    /// Nothing came out this time but frames are still buffered; flush again.
    Pending,
    /// Every buffered frame has been emitted. Further flushes return this again.
    Drained,
}

/// Output of one `x264_encoder_encode` call, before it is tied to a borrow.
struct RawOutput {
    nals: *const x264_sys::x264_nal_t,
    count: c_int,
    size: usize,
    picture: OutputPicture,
}

impl RawOutput {
    /// # Safety
    ///
    /// The encoder must not be called again during `'a`.
    unsafe fn into_frame<'a>(self) -> EncodedFrame<'a> {
        unsafe { EncodedFrame::from_raw(self.nals, self.count, self.size, self.picture) }
    }
}

/// An open libx264 encoder session.
///
/// All operations take `&mut self`, so calls into one session never overlap.
/// Frames returned by [`Self::encode`] and [`Self::flush`] borrow the session
/// and must be copied (see [`EncodedFrame::to_owned`]) or written out before
/// the next call.
///
/// # Examples
///
/// ```no_run
/// use x264::{Colorspace, Encoder, Flushed, Parameters, Picture, Preset, load_api};
///
/// # fn main() -> Result<(), x264::Error> {
/// let api = load_api(x264::config::get_x264_so_path())?;
/// let params = Parameters::builder_with_preset(api, Preset::Fast, None)?
///     .resolution(640, 360)
///     .colorspace(Colorspace::I420)
///     .profile(None)?
///     .build()?;
/// let mut encoder = Encoder::open(&params)?;
/// let mut picture = Picture::for_parameters(&params)?;
/// let mut stream = Vec::new();
///
/// for pts in 0..50 {
///     picture.set_pts(pts);
///     if let Some(frame) = encoder.encode(&picture)? {
///         for nal in frame.nals() {
///             stream.extend_from_slice(nal.payload);
///         }
///     }
/// }
/// loop {
///     match encoder.flush()? {
///         Flushed::Frame(frame) => stream.extend(frame.to_owned().data()),
///         Flushed::Pending => continue,
///         Flushed::Drained => break,
///     }
/// }
/// encoder.close();
/// # Ok(())
/// # }
/// ```
pub struct Encoder {
    api: X264ApiHandle,
    handle: *mut x264_sys::x264_t,
    state: SessionState,
    drained: bool,
    colorspace: Colorspace,
    width: u32,
    height: u32,
    psnr: bool,
    ssim: bool,
    profile: Option<Profile>,
    last_pts: Option<i64>,
    frames_in: u64,
    frames_out: u64,
    /// Set when units are delivered through `nalu_process`. Attached to every
    /// input picture, so it must outlive the encoder handle.
    nal_sink: Option<Box<NalSink>>,
}

// Safety: a libx264 encoder handle may be used from any thread as long as calls
// are not concurrent, which `&mut self` on every call guarantees. It is not
// `Sync`.
unsafe impl Send for Encoder {}

impl Encoder {
    /// Opens an encoder with a copy of `params`.
    ///
    /// The library keeps its own copy of the parameters, so `params` can be
    /// dropped or reused afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParams`] if `x264_encoder_open` rejects the parameters.
    pub fn open(params: &Parameters) -> Result<Self> {
        let api = params.api().clone();
        let mut raw = params.raw().copy();
        let nal_sink = params
            .nal_callback()
            .map(|callback| NalSink::new(api.clone(), callback.clone()));
        if nal_sink.is_some() {
            raw.nalu_process = Some(nal::process_nal);
        }
        let handle = unsafe { api.encoder_open(&mut raw) };
        if handle.is_null() {
            return Err(Error::InvalidParams);
        }
        info!(
            "Opened x264 encoder: {}x{} {} profile {}",
            params.width(),
            params.height(),
            params.colorspace(),
            params
                .profile()
                .map_or_else(|| "auto".to_string(), |profile| profile.to_string())
        );
        Ok(Self {
            api,
            handle,
            state: SessionState::Open,
            drained: false,
            colorspace: params.colorspace(),
            width: params.width(),
            height: params.height(),
            psnr: params.psnr(),
            ssim: params.ssim(),
            profile: params.profile(),
            last_pts: None,
            frames_in: 0,
            frames_out: 0,
            nal_sink,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether a flush has emitted every buffered frame.
    pub fn is_drained(&self) -> bool {
        self.drained
    }

    /// Pictures accepted so far.
    pub fn frames_in(&self) -> u64 {
        self.frames_in
    }

    /// Encoded frames returned so far.
    pub fn frames_out(&self) -> u64 {
        self.frames_out
    }

    pub fn colorspace(&self) -> Colorspace {
        self.colorspace
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    fn ensure_state(&self, operation: &'static str, allowed: &[SessionState]) -> Result<()> {
        if self.state == SessionState::Failed {
            Err(Error::SessionFailed)
        } else if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(Error::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    /// Submits one picture.
    ///
    /// Returns `Ok(None)` while the encoder is still buffering. That never means
    /// the stream is complete; only [`Self::flush`] can report that.
    ///
    /// # Errors
    ///
    /// * [`Error::InvalidState`] after flushing has started
    /// * [`Error::PictureMismatch`] if the picture's format or size differs from
    ///   the session's
    /// * [`Error::NonMonotonicPts`] if the timestamp does not increase
    /// * [`Error::EncodeFailed`] if the library fails; the session becomes
    ///   [`SessionState::Failed`]
    /// * [`Error::SessionFailed`] if an earlier call failed
    pub fn encode(&mut self, picture: &Picture) -> Result<Option<EncodedFrame<'_>>> {
        self.ensure_state("encode", &[SessionState::Open])?;
        if picture.colorspace() != self.colorspace
            || picture.width() != self.width
            || picture.height() != self.height
        {
            return Err(Error::PictureMismatch {
                expected: format!("{}x{} {}", self.width, self.height, self.colorspace),
                actual: format!(
                    "{}x{} {}",
                    picture.width(),
                    picture.height(),
                    picture.colorspace()
                ),
            });
        }
        if let Some(previous) = self.last_pts
            && picture.pts() <= previous
        {
            return Err(Error::NonMonotonicPts {
                previous,
                current: picture.pts(),
            });
        }

        let mut pic_in = picture.as_raw(&self.api);
        if let Some(sink) = &self.nal_sink {
            pic_in.opaque = sink.as_opaque();
        }
        let output = self.encode_raw(&mut pic_in)?;
        self.last_pts = Some(picture.pts());
        self.frames_in += 1;
        // Safety: the frame borrows `self` mutably, so the encoder cannot be
        // called again while it is alive.
        Ok(output.map(|output| unsafe { output.into_frame() }))
    }

    /// Drains one buffered frame at end of input.
    ///
    /// The first call ends the input phase; [`Self::encode`] is rejected from
    /// then on. Keep calling until [`Flushed::Drained`] is returned.
    ///
    /// # Errors
    ///
    /// * [`Error::FlushBeforeInput`] if no picture has been submitted
    /// * [`Error::EncodeFailed`] / [`Error::SessionFailed`] as for [`Self::encode`]
    pub fn flush(&mut self) -> Result<Flushed<'_>> {
        self.ensure_state("flush", &[SessionState::Open, SessionState::Flushing])?;
        if self.state == SessionState::Open {
            if self.frames_in == 0 {
                return Err(Error::FlushBeforeInput);
            }
            debug!(
                "Flushing x264 encoder with {} delayed frames",
                self.delayed_frames()
            );
            self.state = SessionState::Flushing;
        }
        if self.drained {
            return Ok(Flushed::Drained);
        }

        match self.encode_raw(std::ptr::null_mut())? {
            // Safety: as in `encode`.
            Some(output) => Ok(Flushed::Frame(unsafe { output.into_frame() })),
            None if self.delayed_frames() == 0 => {
                self.drained = true;
                debug!(
                    "x264 encoder drained: {} frames in, {} frames out",
                    self.frames_in, self.frames_out
                );
                Ok(Flushed::Drained)
            }
            None => Ok(Flushed::Pending),
        }
    }

    fn encode_raw(&mut self, pic_in: *mut x264_sys::x264_picture_t) -> Result<Option<RawOutput>> {
        let mut nals: *mut x264_sys::x264_nal_t = std::ptr::null_mut();
        let mut count: c_int = 0;
        let mut pic_out = picture::init_raw(&self.api);
        let ret = unsafe {
            self.api
                .encoder_encode(self.handle, &mut nals, &mut count, pic_in, &mut pic_out)
        };
        if ret < 0 {
            self.state = SessionState::Failed;
            error!("x264_encoder_encode failed with {ret}, session is unusable");
            return Err(Error::EncodeFailed(ret));
        }
        if ret == 0 {
            return Ok(None);
        }
        self.frames_out += 1;
        let picture = OutputPicture::from_raw(&pic_out, self.psnr, self.ssim);
        debug!(
            "Encoded frame pts={} dts={} type={:?} size={} nals={}",
            picture.pts, picture.dts, picture.frame_type, ret, count
        );
        if self.nal_sink.is_some() {
            // The units went to the callback; the returned array is not valid.
            nals = std::ptr::null_mut();
            count = 0;
        }
        Ok(Some(RawOutput {
            nals,
            count,
            size: ret as usize,
            picture,
        }))
    }

    /// Applies new parameters to an open session with `x264_encoder_reconfig`.
    ///
    /// Only settings x264 can change mid-stream (rate control targets, VBV,
    /// psy options and the like) take effect, starting with the next frame the
    /// library encodes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ReconfigFailed`] if the library rejects the change. The
    /// session keeps its previous settings and stays usable.
    pub fn reconfig(&mut self, params: &Parameters) -> Result<()> {
        self.ensure_state("reconfig", &[SessionState::Open])?;
        let mut raw = params.raw().copy();
        let ret = unsafe { self.api.encoder_reconfig(self.handle, &mut raw) };
        if ret < 0 {
            warn!("x264 rejected reconfiguration ({ret}), keeping previous settings");
            return Err(Error::ReconfigFailed(ret));
        }
        debug!("Reconfigured x264 encoder");
        Ok(())
    }

    /// Returns the SPS, PPS and version SEI, e.g. for out-of-band signalling
    /// when headers are not repeated in the stream.
    pub fn headers(&mut self) -> Result<Vec<NalUnit>> {
        self.ensure_state("fetch headers", &[SessionState::Open, SessionState::Flushing])?;
        let mut nals: *mut x264_sys::x264_nal_t = std::ptr::null_mut();
        let mut count: c_int = 0;
        let ret = unsafe { self.api.encoder_headers(self.handle, &mut nals, &mut count) };
        if ret < 0 {
            return Err(Error::Other(format!("x264_encoder_headers failed with {ret}")));
        }
        // Safety: the array stays valid until the next encoder call, and the
        // units are copied before returning.
        Ok(unsafe { nal::collect_owned(nals, count) })
    }

    /// Returns the parameters the encoder is actually using.
    pub fn parameters(&self) -> Result<Parameters> {
        let handle = self.handle;
        Parameters::from_encoder(
            self.api.clone(),
            |api, param| unsafe { api.encoder_parameters(handle, param) },
            self.profile,
        )
    }

    /// Number of frames submitted but not yet returned.
    pub fn delayed_frames(&self) -> u32 {
        let delayed = unsafe { self.api.encoder_delayed_frames(self.handle) };
        u32::try_from(delayed).unwrap_or(0)
    }

    /// Upper bound of [`Self::delayed_frames`] for the current parameters.
    pub fn maximum_delayed_frames(&self) -> u32 {
        let delayed = unsafe { self.api.encoder_maximum_delayed_frames(self.handle) };
        u32::try_from(delayed).unwrap_or(0)
    }

    /// Starts a periodic intra refresh cycle on the next frame (requires
    /// intra refresh to be enabled in the parameters).
    pub fn intra_refresh(&mut self) -> Result<()> {
        self.ensure_state("request intra refresh", &[SessionState::Open])?;
        unsafe { self.api.encoder_intra_refresh(self.handle) };
        Ok(())
    }

    /// Tells the encoder that frames from `pts` onwards were lost, so they are
    /// no longer used as references.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidateReferenceFailed`] if x264 cannot do this with
    /// the current settings (B-frames or intra refresh enabled).
    pub fn invalidate_reference(&mut self, pts: i64) -> Result<()> {
        self.ensure_state("invalidate references", &[SessionState::Open])?;
        let ret = unsafe { self.api.encoder_invalidate_reference(self.handle, pts) };
        if ret < 0 {
            return Err(Error::InvalidateReferenceFailed { pts });
        }
        Ok(())
    }

    /// Closes the session and releases the encoder.
    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.handle.is_null() {
            return;
        }
        if self.state != SessionState::Failed {
            let delayed = self.delayed_frames();
            if delayed > 0 {
                warn!("Closing x264 encoder with {delayed} frames never flushed");
            }
        }
        unsafe { self.api.encoder_close(self.handle) };
        self.handle = std::ptr::null_mut();
        self.state = SessionState::Closed;
        info!(
            "Closed x264 encoder: {} frames in, {} frames out",
            self.frames_in, self.frames_out
        );
    }
}

impl Drop for Encoder {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Encoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Encoder")
            .field("state", &self.state)
            .field("drained", &self.drained)
            .field("colorspace", &self.colorspace)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("frames_in", &self.frames_in)
            .field("frames_out", &self.frames_out)
            .field("nal_callback", &self.nal_sink.is_some())
            .finish_non_exhaustive()
    }
}
