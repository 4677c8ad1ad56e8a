// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Input picture buffers and the per-frame information x264 reports back.

use std::{ffi::c_int, mem::MaybeUninit};

use crate::{Colorspace, Error, Parameters, PlaneLayout, Result, api::X264Api};

/// Slice type of a frame: forced on input, reported on output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum FrameType {
    /// Let the encoder decide.
    #[default]
    Auto,
    Idr,
    I,
    P,
    /// B-frame used as a reference.
    BRef,
    B,
    /// IDR or I depending on the open GOP setting.
    Keyframe,
}

impl FrameType {
    pub fn as_raw(&self) -> c_int {
        match self {
            FrameType::Auto => x264_sys::X264_TYPE_AUTO,
            FrameType::Idr => x264_sys::X264_TYPE_IDR,
            FrameType::I => x264_sys::X264_TYPE_I,
            FrameType::P => x264_sys::X264_TYPE_P,
            FrameType::BRef => x264_sys::X264_TYPE_BREF,
            FrameType::B => x264_sys::X264_TYPE_B,
            FrameType::Keyframe => x264_sys::X264_TYPE_KEYFRAME,
        }
    }

    pub fn from_raw(value: c_int) -> Self {
        match value {
            x264_sys::X264_TYPE_IDR => FrameType::Idr,
            x264_sys::X264_TYPE_I => FrameType::I,
            x264_sys::X264_TYPE_P => FrameType::P,
            x264_sys::X264_TYPE_BREF => FrameType::BRef,
            x264_sys::X264_TYPE_B => FrameType::B,
            x264_sys::X264_TYPE_KEYFRAME => FrameType::Keyframe,
            _ => FrameType::Auto,
        }
    }

    pub fn is_intra(&self) -> bool {
        matches!(self, FrameType::Idr | FrameType::I | FrameType::Keyframe)
    }
}

/// A reusable input frame whose plane buffers are owned by the caller.
///
/// Buffers are allocated once, tightly packed, and sized from the colorspace
/// and frame size. Fill them with [`Self::plane_mut`] (or
/// [`crate::RawFrameReader`]), set the timestamp, and pass the picture to
/// [`crate::Encoder::encode`]. x264 copies the pixels during that call, so the
/// picture can be refilled as soon as it returns.
///
/// # Examples
///
/// ```
/// use x264::{Colorspace, Picture};
///
/// # fn main() -> Result<(), x264::Error> {
/// let mut picture = Picture::new(Colorspace::I420, 640, 360)?;
/// assert_eq!(picture.plane_count(), 3);
/// picture.plane_mut(0).unwrap().fill(16);
/// picture.set_pts(0);
/// # Ok(())
/// # }
/// ```
pub struct Picture {
    colorspace: Colorspace,
    width: u32,
    height: u32,
    layouts: Vec<PlaneLayout>,
    planes: Vec<Vec<u8>>,
    pts: i64,
    frame_type: FrameType,
}

impl Picture {
    /// Allocates zeroed planes for one frame.
    ///
    /// # Errors
    ///
    /// * [`Error::InvalidDimensions`] if the size does not suit the colorspace
    /// * [`Error::UnsupportedColorspace`] for colorspaces without a packed layout (`V210`)
    /// * [`Error::AllocationFailed`] if a plane buffer cannot be reserved
    pub fn new(colorspace: Colorspace, width: u32, height: u32) -> Result<Self> {
        let layouts = colorspace.plane_layouts(width, height)?;
        let planes = layouts
            .iter()
            .map(|layout| {
                let mut plane = Vec::new();
                plane
                    .try_reserve_exact(layout.len())
                    .map_err(|_| Error::AllocationFailed(layout.len()))?;
                plane.resize(layout.len(), 0);
                Ok(plane)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            colorspace,
            width,
            height,
            layouts,
            planes,
            pts: 0,
            frame_type: FrameType::Auto,
        })
    }

    /// Allocates a picture matching the input format of `params`.
    pub fn for_parameters(params: &Parameters) -> Result<Self> {
        Self::new(params.colorspace(), params.width(), params.height())
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

    pub fn plane_count(&self) -> usize {
        self.planes.len()
    }

    pub fn layouts(&self) -> &[PlaneLayout] {
        &self.layouts
    }

    /// Bytes between the starts of two rows of plane `index`.
    pub fn stride(&self, index: usize) -> Option<usize> {
        self.layouts.get(index).map(|layout| layout.row_bytes)
    }

    pub fn plane(&self, index: usize) -> Option<&[u8]> {
        self.planes.get(index).map(Vec::as_slice)
    }

    pub fn plane_mut(&mut self, index: usize) -> Option<&mut [u8]> {
        self.planes.get_mut(index).map(Vec::as_mut_slice)
    }

    pub fn planes_mut(&mut self) -> impl Iterator<Item = &mut [u8]> {
        self.planes.iter_mut().map(Vec::as_mut_slice)
    }

    /// Total bytes across all planes.
    pub fn frame_size(&self) -> usize {
        self.layouts.iter().map(PlaneLayout::len).sum()
    }

    pub fn pts(&self) -> i64 {
        self.pts
    }

    pub fn set_pts(&mut self, pts: i64) {
        self.pts = pts;
    }

    pub fn frame_type(&self) -> FrameType {
        self.frame_type
    }

    /// Forces the slice type of the next encode. Reset with [`FrameType::Auto`].
    pub fn set_frame_type(&mut self, frame_type: FrameType) {
        self.frame_type = frame_type;
    }

    /// Builds the `x264_picture_t` describing this picture for one encode call.
    ///
    /// The returned struct borrows the plane buffers through raw pointers, so it
    /// must not be used after `self` is modified or dropped.
    pub(crate) fn as_raw(&self, api: &X264Api) -> x264_sys::x264_picture_t {
        let mut pic = init_raw(api);
        pic.i_type = self.frame_type.as_raw();
        pic.i_pts = self.pts;
        pic.img.i_csp = self.colorspace.as_raw();
        pic.img.i_plane = self.planes.len() as c_int;
        for (index, (plane, layout)) in self.planes.iter().zip(&self.layouts).enumerate() {
            // x264 only reads input planes.
            pic.img.plane[index] = plane.as_ptr().cast_mut();
            // `plane_layouts` only produces strides that fit.
            pic.img.i_stride[index] = c_int::try_from(layout.row_bytes).unwrap_or(c_int::MAX);
        }
        pic
    }
}

impl std::fmt::Debug for Picture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Picture")
            .field("colorspace", &self.colorspace)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("pts", &self.pts)
            .field("frame_type", &self.frame_type)
            .finish_non_exhaustive()
    }
}

/// Returns a picture struct reset by `x264_picture_init`.
pub(crate) fn init_raw(api: &X264Api) -> x264_sys::x264_picture_t {
    let mut pic: MaybeUninit<x264_sys::x264_picture_t> = MaybeUninit::zeroed();
    unsafe {
        api.picture_init(pic.as_mut_ptr());
        pic.assume_init()
    }
}

/// Per-plane and average PSNR of an encoded frame, in dB.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Psnr {
    pub average: f64,
    pub y: f64,
    pub u: f64,
    pub v: f64,
}

/// What x264 reports about an encoded frame (`pic_out`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutputPicture {
    /// Presentation timestamp of the input frame this output belongs to.
    pub pts: i64,
    /// Decoding timestamp. Negative for the first frames when B-frames are used.
    pub dts: i64,
    pub keyframe: bool,
    pub frame_type: FrameType,
    /// Present when PSNR computation was enabled.
    pub psnr: Option<Psnr>,
    /// Present when SSIM computation was enabled.
    pub ssim: Option<f64>,
}

impl OutputPicture {
    pub(crate) fn from_raw(pic: &x264_sys::x264_picture_t, psnr: bool, ssim: bool) -> Self {
        Self {
            pts: pic.i_pts,
            dts: pic.i_dts,
            keyframe: pic.b_keyframe != 0,
            frame_type: FrameType::from_raw(pic.i_type),
            psnr: psnr.then_some(Psnr {
                average: pic.prop.f_psnr_avg,
                y: pic.prop.f_psnr[0],
                u: pic.prop.f_psnr[1],
                v: pic.prop.f_psnr[2],
            }),
            ssim: ssim.then_some(pic.prop.f_ssim),
        }
    }
}
