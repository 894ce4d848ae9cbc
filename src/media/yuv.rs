// SPDX-License-Identifier: GPL-3.0-only

//! Planar 4:2:0 to semiplanar conversion and RGBA expansion
//!
//! The semiplanar buffer is `width*height` luma bytes followed by
//! `width*height/2` chroma bytes. Chroma order is B (V / Cr) before A
//! (U / Cb). Sources with interleaved chroma (pixel stride >= 2) come out
//! as V,U,V,U pairs; packed sources (pixel stride 1) come out as the whole
//! V plane followed by the whole U plane, and the frame records which.

use crate::backends::camera::{Plane, RawFrame};
use crate::constants::color::NEUTRAL_CHROMA;
use crate::errors::{ProcessError, ProcessResult};
use tracing::trace;

/// Byte length of a semiplanar frame
pub fn semiplanar_len(width: u32, height: u32) -> usize {
    let pixels = width as usize * height as usize;
    pixels + pixels / 2
}

/// Byte length of an RGBA frame
pub fn rgba_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * 4
}

/// Arrangement of the chroma block after the luma plane
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChromaLayout {
    /// V,U pairs (NV21)
    Interleaved,
    /// All V samples, then all U samples
    Planar,
}

/// Borrowed semiplanar frame
#[derive(Debug, Clone, Copy)]
pub struct SemiplanarFrame<'a> {
    pub width: u32,
    pub height: u32,
    pub data: &'a [u8],
    pub chroma_layout: ChromaLayout,
}

impl<'a> SemiplanarFrame<'a> {
    /// Wrap an NV21 buffer, checking its length
    pub fn new(width: u32, height: u32, data: &'a [u8]) -> ProcessResult<Self> {
        let expected = semiplanar_len(width, height);
        if width == 0 || height == 0 || data.len() != expected {
            return Err(ProcessError::InvalidFrame(format!(
                "{}x{} semiplanar frame needs {} bytes, got {}",
                width,
                height,
                expected,
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
            chroma_layout: ChromaLayout::Interleaved,
        })
    }

    pub fn luma(&self) -> &'a [u8] {
        &self.data[..self.width as usize * self.height as usize]
    }

    pub fn chroma(&self) -> &'a [u8] {
        &self.data[self.width as usize * self.height as usize..]
    }

    /// (V, U) covering pixel (`x`, `y`)
    #[inline]
    fn chroma_at(&self, chroma: &[u8], x: usize, y: usize) -> (u8, u8) {
        let cw = self.width as usize / 2;
        let ch = self.height as usize / 2;
        if cw == 0 || ch == 0 {
            return (NEUTRAL_CHROMA, NEUTRAL_CHROMA);
        }
        let k = (y / 2).min(ch - 1) * cw + (x / 2).min(cw - 1);
        let (vi, ui) = match self.chroma_layout {
            ChromaLayout::Interleaved => (2 * k, 2 * k + 1),
            ChromaLayout::Planar => (k, cw * ch + k),
        };
        (
            chroma.get(vi).copied().unwrap_or(NEUTRAL_CHROMA),
            chroma.get(ui).copied().unwrap_or(NEUTRAL_CHROMA),
        )
    }
}

/// Converts raw planar frames into a reusable semiplanar buffer
#[derive(Debug, Default)]
pub struct ColorConverter {
    buffer: Vec<u8>,
}

impl ColorConverter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convert `raw`; the result borrows the converter's buffer
    pub fn convert(&mut self, raw: &RawFrame) -> ProcessResult<SemiplanarFrame<'_>> {
        let layout = convert_into(raw, &mut self.buffer)?;
        Ok(SemiplanarFrame {
            width: raw.width,
            height: raw.height,
            data: &self.buffer,
            chroma_layout: layout,
        })
    }
}

fn invalid(msg: impl Into<String>) -> ProcessError {
    ProcessError::InvalidFrame(msg.into())
}

/// Row `r` of a plane, `len` bytes long, if the buffer holds it
#[inline]
fn row(plane: &Plane, r: usize, len: usize) -> Option<&[u8]> {
    let start = r.checked_mul(plane.row_stride)?;
    plane.data.get(start..start.checked_add(len)?)
}

/// Convert `raw` into `out` (resized to the semiplanar length)
///
/// Chroma bytes no source sample reached are set to the neutral value.
pub fn convert_into(raw: &RawFrame, out: &mut Vec<u8>) -> ProcessResult<ChromaLayout> {
    let (w, h) = (raw.width as usize, raw.height as usize);
    if w == 0 || h == 0 {
        return Err(invalid("empty frame"));
    }

    let luma = raw.luma();
    if luma.pixel_stride != 1 || luma.row_stride < w {
        return Err(invalid(format!(
            "unsupported luma layout (row stride {}, pixel stride {})",
            luma.row_stride, luma.pixel_stride
        )));
    }

    let (u, v) = (raw.chroma_a(), raw.chroma_b());
    let stride = v.pixel_stride;
    if stride == 0 || u.pixel_stride != stride {
        return Err(invalid(format!(
            "mismatched chroma pixel strides (U {}, V {})",
            u.pixel_stride, v.pixel_stride
        )));
    }

    let total = semiplanar_len(raw.width, raw.height);
    out.clear();
    out.reserve(total);

    for r in 0..h {
        let src = row(luma, r, w).ok_or_else(|| invalid(format!("luma plane ends at row {}", r)))?;
        out.extend_from_slice(src);
    }

    let (cw, ch) = raw.chroma_size();
    let layout = if stride == 1 {
        for plane in [v, u] {
            for r in 0..ch {
                let room = total - out.len();
                match row(plane, r, cw.min(room)) {
                    Some(src) if !src.is_empty() => out.extend_from_slice(src),
                    _ => break,
                }
            }
        }
        ChromaLayout::Planar
    } else {
        'pairs: for r in 0..ch {
            for c in 0..cw {
                if out.len() + 2 > total {
                    break 'pairs;
                }
                let (Some(vi), Some(ui)) = (v.sample_index(c, r), u.sample_index(c, r)) else {
                    break 'pairs;
                };
                out.push(v.data[vi]);
                out.push(u.data[ui]);
            }
        }
        ChromaLayout::Interleaved
    };

    if out.len() < total {
        trace!(
            missing = total - out.len(),
            stride,
            "Chroma planes short, padding with neutral chroma"
        );
        out.resize(total, NEUTRAL_CHROMA);
    }
    Ok(layout)
}

/// BT.601 YUV to RGB for one pixel
#[inline]
fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let y = y as f32;
    let u = u as f32 - 128.0;
    let v = v as f32 - 128.0;
    [
        (y + 1.402 * v).clamp(0.0, 255.0) as u8,
        (y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8,
        (y + 1.772 * u).clamp(0.0, 255.0) as u8,
    ]
}

/// Expand a semiplanar frame into opaque RGBA
pub fn semiplanar_to_rgba(frame: &SemiplanarFrame<'_>, out: &mut [u8]) -> ProcessResult<()> {
    let (w, h) = (frame.width as usize, frame.height as usize);
    if w == 0 || h == 0 || frame.data.len() < semiplanar_len(frame.width, frame.height) {
        return Err(invalid(format!(
            "{}x{} frame with {} bytes",
            w,
            h,
            frame.data.len()
        )));
    }
    if out.len() != rgba_len(frame.width, frame.height) {
        return Err(invalid(format!(
            "RGBA target holds {} bytes, {}x{} needs {}",
            out.len(),
            w,
            h,
            rgba_len(frame.width, frame.height)
        )));
    }

    let luma = frame.luma();
    let chroma = frame.chroma();
    for (y, (luma_row, out_row)) in luma.chunks_exact(w).zip(out.chunks_exact_mut(w * 4)).enumerate() {
        for (x, (&l, px)) in luma_row.iter().zip(out_row.chunks_exact_mut(4)).enumerate() {
            let (v, u) = frame.chroma_at(chroma, x, y);
            let [r, g, b] = yuv_to_rgb(l, u, v);
            px.copy_from_slice(&[r, g, b, 255]);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::synthetic::test_pattern;
    use std::time::Duration;

    fn frame(width: u32, height: u32, planes: [Plane; 3]) -> RawFrame {
        RawFrame {
            width,
            height,
            planes,
            timestamp: Duration::ZERO,
        }
    }

    #[test]
    fn test_packed_chroma_copied_v_then_u() {
        let luma = Plane::new((0..16).collect(), 4, 1);
        let u = Plane::new(vec![100, 101, 102, 103], 2, 1);
        let v = Plane::new(vec![200, 201, 202, 203], 2, 1);
        let raw = frame(4, 4, [luma, u, v]);

        let mut converter = ColorConverter::new();
        let out = converter.convert(&raw).unwrap();
        assert_eq!(out.data.len(), 24);
        assert_eq!(out.chroma_layout, ChromaLayout::Planar);
        assert_eq!(out.luma(), &(0..16).collect::<Vec<u8>>()[..]);
        assert_eq!(out.chroma(), &[200, 201, 202, 203, 100, 101, 102, 103]);
    }

    #[test]
    fn test_interleaved_chroma_sampled_at_stride() {
        // U at even offsets, V at odd; 0xEE marks bytes that must be skipped
        let u = Plane::new(vec![10, 0xEE, 11, 0xEE, 12, 0xEE, 13], 4, 2);
        let v = Plane::new(vec![20, 0xEE, 21, 0xEE, 22, 0xEE, 23], 4, 2);
        let raw = frame(4, 4, [Plane::new(vec![50; 16], 4, 1), u, v]);

        let mut out = Vec::new();
        let layout = convert_into(&raw, &mut out).unwrap();
        assert_eq!(layout, ChromaLayout::Interleaved);
        assert_eq!(out.len(), 24);
        assert_eq!(&out[16..], &[20, 10, 21, 11, 22, 12, 23, 13]);
    }

    #[test]
    fn test_luma_row_padding_stripped() {
        let [luma, u, v] = test_pattern(8, 4, 0, 2, 5);
        let expected: Vec<u8> = luma
            .data
            .chunks(13)
            .flat_map(|row| row[..8].to_vec())
            .collect();
        let raw = frame(8, 4, [luma, u, v]);

        let mut out = Vec::new();
        convert_into(&raw, &mut out).unwrap();
        assert_eq!(&out[..32], &expected[..]);
    }

    #[test]
    fn test_short_chroma_filled_neutral() {
        let u = Plane::new(vec![1, 0, 2], 4, 2);
        let v = Plane::new(vec![3, 0, 4], 4, 2);
        let raw = frame(4, 4, [Plane::new(vec![0; 16], 4, 1), u, v]);

        let mut out = Vec::new();
        convert_into(&raw, &mut out).unwrap();
        assert_eq!(out.len(), 24);
        assert_eq!(&out[16..], &[3, 1, 4, 2, 128, 128, 128, 128]);
    }

    #[test]
    fn test_zero_pixel_stride_rejected() {
        let raw = frame(
            2,
            2,
            [
                Plane::new(vec![0; 4], 2, 1),
                Plane::new(vec![0], 1, 0),
                Plane::new(vec![0], 1, 0),
            ],
        );
        assert!(matches!(
            convert_into(&raw, &mut Vec::new()),
            Err(ProcessError::InvalidFrame(_))
        ));
    }

    #[test]
    fn test_layouts_reconstruct_same_color() {
        let (w, h) = (16, 8);
        let packed = frame(w, h, test_pattern(w, h, 3, 1, 0));
        let interleaved = frame(w, h, test_pattern(w, h, 3, 2, 0));

        let mut a = ColorConverter::new();
        let mut b = ColorConverter::new();
        let mut rgba_a = vec![0; rgba_len(w, h)];
        let mut rgba_b = vec![0; rgba_len(w, h)];
        semiplanar_to_rgba(&a.convert(&packed).unwrap(), &mut rgba_a).unwrap();
        semiplanar_to_rgba(&b.convert(&interleaved).unwrap(), &mut rgba_b).unwrap();
        assert_eq!(rgba_a, rgba_b);
    }

    #[test]
    fn test_neutral_chroma_is_gray() {
        let mut data = vec![90u8; 4];
        data.extend_from_slice(&[128, 128]);
        let frame = SemiplanarFrame::new(2, 2, &data).unwrap();
        let mut rgba = vec![0; 16];
        semiplanar_to_rgba(&frame, &mut rgba).unwrap();
        for px in rgba.chunks_exact(4) {
            assert_eq!(px, &[90, 90, 90, 255]);
        }
    }
}
