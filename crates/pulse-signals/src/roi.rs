//! Region-of-interest helpers
//!
//! Face detection itself happens outside this crate. Given a face rectangle
//! from any detector, these helpers derive the forehead sub-region and
//! reduce an interleaved frame buffer to one mean colour per frame, the
//! sample the pipeline consumes.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SignalError};

/// Axis-aligned pixel rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Intersection with a `frame_width x frame_height` frame.
    pub fn clip(&self, frame_width: u32, frame_height: u32) -> Rect {
        let x = self.x.min(frame_width);
        let y = self.y.min(frame_height);
        let right = self.x.saturating_add(self.width).min(frame_width);
        let bottom = self.y.saturating_add(self.height).min(frame_height);
        Rect::new(x, y, right - x, bottom - y)
    }
}

/// Forehead band of a detected face: the middle half horizontally, from 10%
/// to 35% of the face height.
pub fn forehead_roi(face: &Rect) -> Rect {
    let (w, h) = (face.width as f32, face.height as f32);
    Rect {
        x: face.x.saturating_add((w * 0.25) as u32),
        y: face.y.saturating_add((h * 0.1) as u32),
        width: (w * 0.5) as u32,
        height: (h * 0.25) as u32,
    }
}

/// Mean `[R, G, B]` over `roi` of an interleaved RGB888 (`channels = 3`) or
/// RGBA8888 (`channels = 4`) frame.
///
/// The ROI is clipped to the frame. Alpha is ignored.
pub fn extract_roi_mean_rgb(
    frame: &[u8],
    width: u32,
    height: u32,
    channels: u8,
    roi: &Rect,
) -> Result<[f32; 3]> {
    if channels != 3 && channels != 4 {
        return Err(SignalError::InvalidFrame(format!(
            "unsupported channel count {}",
            channels
        )));
    }
    let stride = width as usize * channels as usize;
    let needed = stride * height as usize;
    if frame.len() < needed {
        return Err(SignalError::InvalidFrame(format!(
            "frame has {} bytes, {}x{}x{} needs {}",
            frame.len(),
            width,
            height,
            channels,
            needed
        )));
    }

    let clipped = roi.clip(width, height);
    if clipped.is_empty() {
        return Err(SignalError::InvalidFrame(format!(
            "roi {:?} does not overlap the {}x{} frame",
            roi, width, height
        )));
    }

    let mut sum = [0u64; 3];
    for row in clipped.y..clipped.y + clipped.height {
        let start = row as usize * stride + clipped.x as usize * channels as usize;
        let end = start + clipped.width as usize * channels as usize;
        for pixel in frame[start..end].chunks_exact(channels as usize) {
            sum[0] += pixel[0] as u64;
            sum[1] += pixel[1] as u64;
            sum[2] += pixel[2] as u64;
        }
    }

    let count = clipped.area() as f64;
    Ok([
        (sum[0] as f64 / count) as f32,
        (sum[1] as f64 / count) as f32,
        (sum[2] as f64 / count) as f32,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_forehead_geometry() {
        let face = Rect::new(100, 50, 200, 240);
        let forehead = forehead_roi(&face);
        assert_eq!(forehead, Rect::new(150, 74, 100, 60));
    }

    #[test]
    fn test_forehead_near_coordinate_limit_saturates() {
        let face = Rect::new(u32::MAX - 10, u32::MAX - 5, 400, 400);
        let forehead = forehead_roi(&face);
        assert_eq!(forehead.x, u32::MAX);
        assert_eq!(forehead.y, u32::MAX);
        assert_eq!((forehead.width, forehead.height), (200, 100));
        assert!(forehead.clip(640, 480).is_empty());
    }

    #[test]
    fn test_clip() {
        let r = Rect::new(8, 8, 10, 10);
        assert_eq!(r.clip(12, 20), Rect::new(8, 8, 4, 10));
        assert!(Rect::new(30, 0, 5, 5).clip(20, 20).is_empty());
    }

    #[test]
    fn test_mean_rgb_uniform() {
        let frame: Vec<u8> = [128u8, 64, 32].repeat(16);
        let rgb = extract_roi_mean_rgb(&frame, 4, 4, 3, &Rect::new(0, 0, 2, 2)).unwrap();
        assert_relative_eq!(rgb[0], 128.0);
        assert_relative_eq!(rgb[1], 64.0);
        assert_relative_eq!(rgb[2], 32.0);
    }

    #[test]
    fn test_mean_rgb_only_reads_roi() {
        // 4x2 RGBA frame: left half red, right half blue
        let mut frame = Vec::new();
        for _row in 0..2 {
            frame.extend_from_slice(&[255, 0, 0, 255, 255, 0, 0, 255]);
            frame.extend_from_slice(&[0, 0, 255, 255, 0, 0, 255, 255]);
        }
        let right = extract_roi_mean_rgb(&frame, 4, 2, 4, &Rect::new(2, 0, 2, 2)).unwrap();
        assert_eq!(right, [0.0, 0.0, 255.0]);
        let all = extract_roi_mean_rgb(&frame, 4, 2, 4, &Rect::new(0, 0, 4, 2)).unwrap();
        assert_relative_eq!(all[0], 127.5);
        assert_relative_eq!(all[2], 127.5);
    }

    #[test]
    fn test_mean_rgb_rejects_bad_input() {
        let frame = vec![0u8; 4 * 4 * 3];
        assert!(extract_roi_mean_rgb(&frame, 4, 4, 2, &Rect::new(0, 0, 1, 1)).is_err());
        assert!(extract_roi_mean_rgb(&frame, 8, 8, 3, &Rect::new(0, 0, 1, 1)).is_err());
        assert!(extract_roi_mean_rgb(&frame, 4, 4, 3, &Rect::new(10, 10, 2, 2)).is_err());
    }
}
