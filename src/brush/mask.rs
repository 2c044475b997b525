//! Brush mask storage
//!
//! `TempBuf` is a small owned pixel grid. Brush masks are single channel
//! (`u8` coverage or `f32` solidified); pixmaps are three channel `u8`.
//! Every buffer carries an identity that changes whenever its content
//! changes, which is what the mask cache compares against.

use std::sync::atomic::{AtomicU64, Ordering};

use image::{GrayImage, RgbImage};

use crate::core::{try_alloc, PaintError};

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

fn next_id() -> u64 {
    NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed)
}

/// Value stored in a mask cell
pub trait MaskSample: Copy + Default + Send + Sync + 'static {
    /// Coverage as 0.0 - 1.0
    fn to_unit(self) -> f32;
    fn from_unit(v: f32) -> Self;
}

impl MaskSample for u8 {
    #[inline]
    fn to_unit(self) -> f32 {
        self as f32 / 255.0
    }

    #[inline]
    fn from_unit(v: f32) -> Self {
        (v * 255.0).round().clamp(0.0, 255.0) as u8
    }
}

impl MaskSample for f32 {
    #[inline]
    fn to_unit(self) -> f32 {
        self
    }

    #[inline]
    fn from_unit(v: f32) -> Self {
        v
    }
}

/// Owned pixel grid with content identity
#[derive(Debug, Clone)]
pub struct TempBuf<T> {
    id: u64,
    width: usize,
    height: usize,
    channels: usize,
    data: Vec<T>,
}

/// Color brush pixmap (RGB)
pub type Pixmap = TempBuf<u8>;

impl<T: MaskSample> TempBuf<T> {
    /// Zeroed single-channel buffer
    pub fn new(width: usize, height: usize) -> Result<Self, PaintError> {
        Self::with_channels(width, height, 1)
    }

    pub fn with_channels(width: usize, height: usize, channels: usize) -> Result<Self, PaintError> {
        Ok(Self {
            id: next_id(),
            width,
            height,
            channels,
            data: try_alloc(width * height * channels, T::default())?,
        })
    }

    /// Wrap existing single-channel data
    pub fn from_vec(width: usize, height: usize, data: Vec<T>) -> Result<Self, PaintError> {
        Self::from_vec_channels(width, height, 1, data)
    }

    pub fn from_vec_channels(
        width: usize,
        height: usize,
        channels: usize,
        data: Vec<T>,
    ) -> Result<Self, PaintError> {
        if data.len() != width * height * channels {
            return Err(PaintError::InvalidInput(format!(
                "{}x{}x{} buffer needs {} values, got {}",
                width,
                height,
                channels,
                width * height * channels,
                data.len()
            )));
        }
        Ok(Self {
            id: next_id(),
            width,
            height,
            channels,
            data,
        })
    }

    /// Content identity
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    /// Mutable access; the buffer takes a fresh identity
    pub fn data_mut(&mut self) -> &mut [T] {
        self.id = next_id();
        &mut self.data
    }

    pub fn row(&self, y: usize) -> &[T] {
        let stride = self.width * self.channels;
        &self.data[y * stride..(y + 1) * stride]
    }

    /// Channel `c` of pixel `(x, y)`; default outside the grid
    #[inline]
    pub fn get(&self, x: isize, y: isize, c: usize) -> T {
        if x < 0 || y < 0 || x as usize >= self.width || y as usize >= self.height {
            return T::default();
        }
        self.data[(y as usize * self.width + x as usize) * self.channels + c]
    }
}

impl TempBuf<u8> {
    /// Coverage mask from a grayscale image
    pub fn from_gray_image(img: &GrayImage) -> Result<Self, PaintError> {
        Self::from_vec(img.width() as usize, img.height() as usize, img.as_raw().clone())
    }

    /// Color pixmap from an RGB image
    pub fn from_rgb_image(img: &RgbImage) -> Result<Self, PaintError> {
        Self::from_vec_channels(
            img.width() as usize,
            img.height() as usize,
            3,
            img.as_raw().clone(),
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_changes_on_write() {
        let mut buf = TempBuf::<u8>::new(4, 4).unwrap();
        let id = buf.id();
        assert_eq!(buf.id(), id);
        buf.data_mut()[0] = 9;
        assert_ne!(buf.id(), id);
    }

    #[test]
    fn test_out_of_bounds_reads_default() {
        let buf = TempBuf::from_vec(2, 1, vec![3u8, 4]).unwrap();
        assert_eq!(buf.get(1, 0, 0), 4);
        assert_eq!(buf.get(-1, 0, 0), 0);
        assert_eq!(buf.get(2, 0, 0), 0);
    }

    #[test]
    fn test_from_vec_checks_length() {
        assert!(TempBuf::from_vec(3, 3, vec![0u8; 8]).is_err());
    }

    #[test]
    fn test_gray_image_import() {
        let img = GrayImage::from_raw(2, 2, vec![0, 64, 128, 255]).unwrap();
        let mask = TempBuf::from_gray_image(&img).unwrap();
        assert_eq!(mask.row(1), &[128, 255]);
        assert_eq!(mask.get(1, 1, 0).to_unit(), 1.0);
    }
}
