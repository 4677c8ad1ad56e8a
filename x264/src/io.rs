// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Raw frame input and elementary stream output.

use std::io::{ErrorKind, Read, Write};

use tracing::debug;

use crate::{EncodedFrame, Nal, NalUnit, OwnedEncodedFrame, Picture, Result};

/// Number of whole frames of `frame_size` bytes in a source of `len` bytes.
///
/// Trailing bytes that do not form a complete frame are ignored.
pub fn frame_count_for_len(len: u64, frame_size: usize) -> u64 {
    match u64::try_from(frame_size) {
        Ok(0) | Err(_) => 0,
        Ok(frame_size) => len / frame_size,
    }
}

/// Reads tightly packed raw frames (e.g. a `.yuv` file) into [`Picture`]s.
///
/// Planes are read one after the other, each with exactly the byte count the
/// picture's colorspace and size imply.
pub struct RawFrameReader<R> {
    reader: R,
    frames_read: u64,
}

impl<R: Read> RawFrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            frames_read: 0,
        }
    }

    /// Fills `picture` with the next frame.
    ///
    /// Returns `Ok(false)` once the source cannot provide a complete frame; a
    /// truncated last frame is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Io`] for read failures other than end of input.
    pub fn read_frame(&mut self, picture: &mut Picture) -> Result<bool> {
        for plane in picture.planes_mut() {
            match self.reader.read_exact(plane) {
                Ok(()) => {}
                Err(error) if error.kind() == ErrorKind::UnexpectedEof => {
                    debug!("Frame source exhausted after {} frames", self.frames_read);
                    return Ok(false);
                }
                Err(error) => return Err(error.into()),
            }
        }
        self.frames_read += 1;
        Ok(true)
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

/// Writes NAL payloads to an H.264 elementary stream.
///
/// Payloads are written unchanged, so the framing (Annex-B start codes or
/// length prefixes) is whatever the encoder was configured to emit.
pub struct BitstreamWriter<W> {
    writer: W,
    bytes_written: u64,
    nals_written: u64,
}

impl<W: Write> BitstreamWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            bytes_written: 0,
            nals_written: 0,
        }
    }

    fn write_payload(&mut self, payload: &[u8]) -> Result<usize> {
        self.writer.write_all(payload)?;
        self.bytes_written += payload.len() as u64;
        self.nals_written += 1;
        Ok(payload.len())
    }

    pub fn write_nal(&mut self, nal: &Nal<'_>) -> Result<usize> {
        self.write_payload(nal.payload)
    }

    pub fn write_unit(&mut self, unit: &NalUnit) -> Result<usize> {
        self.write_payload(&unit.payload)
    }

    /// Writes every unit in order, e.g. the output of [`crate::Encoder::headers`].
    pub fn write_units(&mut self, units: &[NalUnit]) -> Result<usize> {
        units
            .iter()
            .try_fold(0, |total, unit| Ok(total + self.write_unit(unit)?))
    }

    /// Writes all NAL units of a frame in emission order and returns the byte count.
    pub fn write_frame(&mut self, frame: &EncodedFrame<'_>) -> Result<usize> {
        frame
            .nals()
            .try_fold(0, |total, nal| Ok(total + self.write_nal(&nal)?))
    }

    pub fn write_owned_frame(&mut self, frame: &OwnedEncodedFrame) -> Result<usize> {
        self.write_units(&frame.nals)
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn nals_written(&self) -> u64 {
        self.nals_written
    }

    pub fn flush(&mut self) -> Result<()> {
        Ok(self.writer.flush()?)
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}
