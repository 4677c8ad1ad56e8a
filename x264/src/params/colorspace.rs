// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Colorspaces and the plane layout each one implies.

use std::{ffi::c_int, fmt, str::FromStr};

use serde::Serialize;

use crate::{Error, Result};

/// Pixel sampling and plane arrangement of input frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorspaceFormat {
    /// Monochrome, luma only.
    I400,
    I420,
    YV12,
    NV12,
    NV21,
    I422,
    YV16,
    NV16,
    YUYV,
    UYVY,
    V210,
    I444,
    YV24,
    BGR,
    BGRA,
    RGB,
}

/// Chroma sampling family of a [`ColorspaceFormat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ChromaFormat {
    Mono,
    Yuv420,
    Yuv422,
    Yuv444,
}

impl ChromaFormat {
    /// The `X264_CSP_*` value x264 uses for this family in `x264_chroma_format`.
    pub fn as_raw(&self) -> c_int {
        match self {
            ChromaFormat::Mono => x264_sys::X264_CSP_I400,
            ChromaFormat::Yuv420 => x264_sys::X264_CSP_I420,
            ChromaFormat::Yuv422 => x264_sys::X264_CSP_I422,
            ChromaFormat::Yuv444 => x264_sys::X264_CSP_I444,
        }
    }
}

/// Width and height of one plane relative to the luma plane.
///
/// The width is expressed in bytes per luma sample for 8-bit input, so packed
/// formats carry factors above one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PlaneRatio {
    width_num: usize,
    width_den: usize,
    height_den: usize,
}

const FULL: PlaneRatio = PlaneRatio {
    width_num: 1,
    width_den: 1,
    height_den: 1,
};
const HALF: PlaneRatio = PlaneRatio {
    width_num: 1,
    width_den: 2,
    height_den: 2,
};
const HALF_WIDTH: PlaneRatio = PlaneRatio {
    width_num: 1,
    width_den: 2,
    height_den: 1,
};
const HALF_HEIGHT: PlaneRatio = PlaneRatio {
    width_num: 1,
    width_den: 1,
    height_den: 2,
};

const PACKED_2: PlaneRatio = packed(2);
const PACKED_3: PlaneRatio = packed(3);
const PACKED_4: PlaneRatio = packed(4);

const fn packed(bytes: usize) -> PlaneRatio {
    PlaneRatio {
        width_num: bytes,
        width_den: 1,
        height_den: 1,
    }
}

impl ColorspaceFormat {
    pub const ALL: [ColorspaceFormat; 16] = [
        ColorspaceFormat::I400,
        ColorspaceFormat::I420,
        ColorspaceFormat::YV12,
        ColorspaceFormat::NV12,
        ColorspaceFormat::NV21,
        ColorspaceFormat::I422,
        ColorspaceFormat::YV16,
        ColorspaceFormat::NV16,
        ColorspaceFormat::YUYV,
        ColorspaceFormat::UYVY,
        ColorspaceFormat::V210,
        ColorspaceFormat::I444,
        ColorspaceFormat::YV24,
        ColorspaceFormat::BGR,
        ColorspaceFormat::BGRA,
        ColorspaceFormat::RGB,
    ];

    pub fn as_raw(&self) -> c_int {
        match self {
            ColorspaceFormat::I400 => x264_sys::X264_CSP_I400,
            ColorspaceFormat::I420 => x264_sys::X264_CSP_I420,
            ColorspaceFormat::YV12 => x264_sys::X264_CSP_YV12,
            ColorspaceFormat::NV12 => x264_sys::X264_CSP_NV12,
            ColorspaceFormat::NV21 => x264_sys::X264_CSP_NV21,
            ColorspaceFormat::I422 => x264_sys::X264_CSP_I422,
            ColorspaceFormat::YV16 => x264_sys::X264_CSP_YV16,
            ColorspaceFormat::NV16 => x264_sys::X264_CSP_NV16,
            ColorspaceFormat::YUYV => x264_sys::X264_CSP_YUYV,
            ColorspaceFormat::UYVY => x264_sys::X264_CSP_UYVY,
            ColorspaceFormat::V210 => x264_sys::X264_CSP_V210,
            ColorspaceFormat::I444 => x264_sys::X264_CSP_I444,
            ColorspaceFormat::YV24 => x264_sys::X264_CSP_YV24,
            ColorspaceFormat::BGR => x264_sys::X264_CSP_BGR,
            ColorspaceFormat::BGRA => x264_sys::X264_CSP_BGRA,
            ColorspaceFormat::RGB => x264_sys::X264_CSP_RGB,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ColorspaceFormat::I400 => "i400",
            ColorspaceFormat::I420 => "i420",
            ColorspaceFormat::YV12 => "yv12",
            ColorspaceFormat::NV12 => "nv12",
            ColorspaceFormat::NV21 => "nv21",
            ColorspaceFormat::I422 => "i422",
            ColorspaceFormat::YV16 => "yv16",
            ColorspaceFormat::NV16 => "nv16",
            ColorspaceFormat::YUYV => "yuyv",
            ColorspaceFormat::UYVY => "uyvy",
            ColorspaceFormat::V210 => "v210",
            ColorspaceFormat::I444 => "i444",
            ColorspaceFormat::YV24 => "yv24",
            ColorspaceFormat::BGR => "bgr",
            ColorspaceFormat::BGRA => "bgra",
            ColorspaceFormat::RGB => "rgb",
        }
    }

    pub fn chroma_format(&self) -> ChromaFormat {
        use ColorspaceFormat::*;
        match self {
            I400 => ChromaFormat::Mono,
            I420 | YV12 | NV12 | NV21 => ChromaFormat::Yuv420,
            I422 | YV16 | NV16 | YUYV | UYVY | V210 => ChromaFormat::Yuv422,
            I444 | YV24 | BGR | BGRA | RGB => ChromaFormat::Yuv444,
        }
    }

    fn planes(&self) -> &'static [PlaneRatio] {
        use ColorspaceFormat::*;
        match self {
            I400 => &[FULL],
            I420 | YV12 => &[FULL, HALF, HALF],
            NV12 | NV21 => &[FULL, HALF_HEIGHT],
            I422 | YV16 => &[FULL, HALF_WIDTH, HALF_WIDTH],
            NV16 => &[FULL, FULL],
            YUYV | UYVY => &[PACKED_2],
            I444 | YV24 => &[FULL, FULL, FULL],
            BGR | RGB => &[PACKED_3],
            BGRA => &[PACKED_4],
            // Packed 10-bit groups with alignment rules of their own.
            V210 => &[],
        }
    }
}

/// Byte geometry of one tightly packed plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneLayout {
    /// Bytes per row, which is also the stride of a packed buffer.
    pub row_bytes: usize,
    pub rows: usize,
}

impl PlaneLayout {
    /// Bytes of the whole plane. Saturates for geometries no
    /// [`Colorspace::plane_layouts`] call would produce.
    pub fn len(&self) -> usize {
        self.row_bytes.saturating_mul(self.rows)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A colorspace as x264 understands it: a format plus the
/// `X264_CSP_HIGH_DEPTH` and `X264_CSP_VFLIP` flags.
///
/// # Examples
///
/// ```
/// use x264::{Colorspace, ColorspaceFormat};
///
/// let csp: Colorspace = "i420".parse().unwrap();
/// assert_eq!(csp.format(), ColorspaceFormat::I420);
/// assert_eq!(csp.frame_size(640, 360).unwrap(), 640 * 360 * 3 / 2);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Colorspace {
    format: ColorspaceFormat,
    high_depth: bool,
    vflip: bool,
}

impl Colorspace {
    pub const I420: Colorspace = Colorspace::new(ColorspaceFormat::I420);

    pub const fn new(format: ColorspaceFormat) -> Self {
        Self {
            format,
            high_depth: false,
            vflip: false,
        }
    }

    /// Samples are stored as 16-bit words instead of bytes.
    pub const fn with_high_depth(mut self, high_depth: bool) -> Self {
        self.high_depth = high_depth;
        self
    }

    /// Rows are stored bottom up.
    pub const fn with_vflip(mut self, vflip: bool) -> Self {
        self.vflip = vflip;
        self
    }

    pub fn format(&self) -> ColorspaceFormat {
        self.format
    }

    pub fn is_high_depth(&self) -> bool {
        self.high_depth
    }

    pub fn is_vflip(&self) -> bool {
        self.vflip
    }

    pub fn chroma_format(&self) -> ChromaFormat {
        self.format.chroma_format()
    }

    /// Number of planes an input picture of this colorspace carries.
    pub fn plane_count(&self) -> usize {
        self.format.planes().len()
    }

    /// Horizontal and vertical subsampling factors that width and height must
    /// be divisible by.
    pub fn subsampling(&self) -> (u32, u32) {
        match self.chroma_format() {
            ChromaFormat::Yuv420 => (2, 2),
            ChromaFormat::Yuv422 => (2, 1),
            ChromaFormat::Mono | ChromaFormat::Yuv444 => (1, 1),
        }
    }

    /// Checks that `width`x`height` is a legal frame size for this colorspace.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDimensions`] for zero sizes, sizes that do not
    /// fit the library's `int` fields, or sizes not divisible by the chroma
    /// subsampling factor.
    pub fn validate_dimensions(&self, width: u32, height: u32) -> Result<()> {
        let (x, y) = self.subsampling();
        let fits = |v: u32| v > 0 && c_int::try_from(v).is_ok();
        if fits(width) && fits(height) && width % x == 0 && height % y == 0 {
            Ok(())
        } else {
            Err(Error::InvalidDimensions {
                width,
                height,
                colorspace: *self,
            })
        }
    }

    /// Per-plane byte geometry of a tightly packed frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDimensions`] as [`Self::validate_dimensions`] does,
    /// and also when a row is too wide for the library's `int` stride or a plane
    /// too large to address. Returns [`Error::UnsupportedColorspace`] for `V210`,
    /// which has no simple plane geometry.
    pub fn plane_layouts(&self, width: u32, height: u32) -> Result<Vec<PlaneLayout>> {
        self.validate_dimensions(width, height)?;
        let planes = self.format.planes();
        if planes.is_empty() {
            return Err(Error::UnsupportedColorspace(*self));
        }
        let depth = if self.high_depth { 2 } else { 1 };
        let too_large = || Error::InvalidDimensions {
            width,
            height,
            colorspace: *self,
        };
        planes
            .iter()
            .map(|ratio| -> Result<PlaneLayout> {
                let row_bytes = (width as usize)
                    .checked_mul(ratio.width_num)
                    .map(|bytes| bytes / ratio.width_den)
                    .and_then(|bytes| bytes.checked_mul(depth))
                    .filter(|bytes| c_int::try_from(*bytes).is_ok())
                    .ok_or_else(too_large)?;
                let rows = height as usize / ratio.height_den;
                row_bytes.checked_mul(rows).ok_or_else(too_large)?;
                Ok(PlaneLayout { row_bytes, rows })
            })
            .collect()
    }

    /// Total bytes of one tightly packed frame.
    ///
    /// # Errors
    ///
    /// As [`Self::plane_layouts`], plus [`Error::InvalidDimensions`] when the
    /// planes together exceed the address space.
    pub fn frame_size(&self, width: u32, height: u32) -> Result<usize> {
        self.plane_layouts(width, height)?
            .iter()
            .try_fold(0usize, |total, layout| total.checked_add(layout.len()))
            .ok_or(Error::InvalidDimensions {
                width,
                height,
                colorspace: *self,
            })
    }

    /// The `i_csp` value including flags.
    pub fn as_raw(&self) -> c_int {
        let mut csp = self.format.as_raw();
        if self.high_depth {
            csp |= x264_sys::X264_CSP_HIGH_DEPTH;
        }
        if self.vflip {
            csp |= x264_sys::X264_CSP_VFLIP;
        }
        csp
    }

    /// Decodes an `i_csp` value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownColorspace`] when the format bits name no colorspace.
    pub fn from_raw(csp: c_int) -> Result<Self> {
        let format = ColorspaceFormat::ALL
            .into_iter()
            .find(|format| format.as_raw() == csp & x264_sys::X264_CSP_MASK)
            .ok_or_else(|| Error::UnknownColorspace(format!("0x{csp:04x}")))?;
        Ok(Colorspace::new(format)
            .with_high_depth(csp & x264_sys::X264_CSP_HIGH_DEPTH != 0)
            .with_vflip(csp & x264_sys::X264_CSP_VFLIP != 0))
    }
}

impl From<ColorspaceFormat> for Colorspace {
    fn from(format: ColorspaceFormat) -> Self {
        Colorspace::new(format)
    }
}

impl FromStr for Colorspace {
    type Err = Error;

    /// Parses a format name, optionally followed by `+high-depth` and/or `+vflip`.
    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split('+');
        let name = parts.next().unwrap_or_default();
        let format = ColorspaceFormat::ALL
            .into_iter()
            .find(|format| format.as_str().eq_ignore_ascii_case(name))
            .ok_or_else(|| Error::UnknownColorspace(s.to_string()))?;
        let mut csp = Colorspace::new(format);
        for flag in parts {
            match flag.to_ascii_lowercase().as_str() {
                "high-depth" => csp.high_depth = true,
                "vflip" => csp.vflip = true,
                _ => return Err(Error::UnknownColorspace(s.to_string())),
            }
        }
        Ok(csp)
    }
}

impl fmt::Display for Colorspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.format.as_str())?;
        if self.high_depth {
            f.write_str("+high-depth")?;
        }
        if self.vflip {
            f.write_str("+vflip")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sizes(csp: &str, width: u32, height: u32) -> Vec<(usize, usize)> {
        csp.parse::<Colorspace>()
            .unwrap()
            .plane_layouts(width, height)
            .unwrap()
            .into_iter()
            .map(|plane| (plane.row_bytes, plane.rows))
            .collect()
    }

    #[test]
    fn planar_layouts() {
        assert_eq!(sizes("i420", 640, 360), [(640, 360), (320, 180), (320, 180)]);
        assert_eq!(sizes("nv12", 640, 360), [(640, 360), (640, 180)]);
        assert_eq!(sizes("i422", 64, 48), [(64, 48), (32, 48), (32, 48)]);
        assert_eq!(sizes("nv16", 64, 48), [(64, 48), (64, 48)]);
        assert_eq!(sizes("i444", 64, 48), [(64, 48); 3]);
        assert_eq!(sizes("i400", 63, 47), [(63, 47)]);
    }

    #[test]
    fn packed_layouts() {
        assert_eq!(sizes("yuyv", 64, 48), [(128, 48)]);
        assert_eq!(sizes("bgr", 64, 48), [(192, 48)]);
        assert_eq!(sizes("bgra", 64, 48), [(256, 48)]);
        assert_eq!(sizes("i420+high-depth", 64, 48), [(128, 48), (64, 24), (64, 24)]);
    }

    #[test]
    fn frame_sizes_match_raw_file_layouts() {
        let i420 = Colorspace::I420;
        assert_eq!(i420.frame_size(640, 360).unwrap(), 345_600);
        let i444: Colorspace = "i444".parse().unwrap();
        assert_eq!(i444.frame_size(640, 360).unwrap(), 640 * 360 * 3);
    }

    #[test]
    fn odd_sizes_are_rejected_for_subsampled_formats() {
        assert!(matches!(
            Colorspace::I420.validate_dimensions(641, 360),
            Err(Error::InvalidDimensions { .. })
        ));
        assert!(Colorspace::I420.validate_dimensions(640, 0).is_err());
        let i422: Colorspace = "i422".parse().unwrap();
        assert!(i422.validate_dimensions(64, 47).is_ok());
        assert!(i422.validate_dimensions(63, 48).is_err());
    }

    #[test]
    fn oversized_frames_are_rejected_not_overflowed() {
        let bgra: Colorspace = "bgra+high-depth".parse().unwrap();
        let max = i32::MAX as u32;
        assert!(matches!(
            bgra.frame_size(max, max),
            Err(Error::InvalidDimensions { width, .. }) if width == max
        ));
        assert!(matches!(
            bgra.plane_layouts(max, 1),
            Err(Error::InvalidDimensions { .. })
        ));
        // 8 bytes per pixel: the widest row whose stride still fits an int.
        let widest = (i32::MAX / 8) as u32;
        assert_eq!(
            bgra.plane_layouts(widest, 1).unwrap()[0].row_bytes,
            widest as usize * 8
        );
        assert!(bgra.plane_layouts(widest + 1, 1).is_err());
        assert_eq!(
            PlaneLayout {
                row_bytes: usize::MAX,
                rows: 2
            }
            .len(),
            usize::MAX
        );
    }

    #[test]
    fn v210_has_no_packed_geometry() {
        let v210: Colorspace = "v210".parse().unwrap();
        assert!(matches!(
            v210.plane_layouts(48, 16),
            Err(Error::UnsupportedColorspace(_))
        ));
    }

    #[test]
    fn raw_values_keep_flags() {
        let csp: Colorspace = "nv12+vflip+high-depth".parse().unwrap();
        let raw = csp.as_raw();
        assert_eq!(
            raw,
            x264_sys::X264_CSP_NV12 | x264_sys::X264_CSP_VFLIP | x264_sys::X264_CSP_HIGH_DEPTH
        );
        assert_eq!(Colorspace::from_raw(raw).unwrap(), csp);
        assert_eq!(csp.to_string(), "nv12+high-depth+vflip");
        assert!(Colorspace::from_raw(0x00ff).is_err());
        assert!("i420+sideways".parse::<Colorspace>().is_err());
    }
}
