//! Fixed-size storage tile

use crate::core::{try_alloc, PaintError};

/// Tile edge length in pixels
pub const TILE_SIZE: i32 = 64;

/// One `TILE_SIZE` x `TILE_SIZE` block of pixels in a surface's format.
///
/// Tiles on the right and bottom surface edges keep the full size; the
/// part outside the surface is never read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tile {
    data: Vec<u8>,
    bpp: usize,
}

impl Tile {
    /// Allocate a zeroed tile
    pub fn new(bpp: usize) -> Result<Self, PaintError> {
        let len = (TILE_SIZE * TILE_SIZE) as usize * bpp;
        Ok(Self {
            data: try_alloc(len, 0u8)?,
            bpp,
        })
    }

    /// Rebuild a tile from raw bytes (used when unpacking undo data)
    pub fn from_bytes(data: Vec<u8>, bpp: usize) -> Result<Self, PaintError> {
        let expected = (TILE_SIZE * TILE_SIZE) as usize * bpp;
        if data.len() != expected {
            return Err(PaintError::Compression(format!(
                "tile holds {} bytes, expected {}",
                data.len(),
                expected
            )));
        }
        Ok(Self { data, bpp })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn bpp(&self) -> usize {
        self.bpp
    }

    /// Bytes of `len` pixels starting at tile-local `(x, y)`
    #[inline]
    pub fn span(&self, x: i32, y: i32, len: i32) -> &[u8] {
        let start = self.offset(x, y);
        &self.data[start..start + len as usize * self.bpp]
    }

    #[inline]
    pub fn span_mut(&mut self, x: i32, y: i32, len: i32) -> &mut [u8] {
        let start = self.offset(x, y);
        let end = start + len as usize * self.bpp;
        &mut self.data[start..end]
    }

    #[inline]
    fn offset(&self, x: i32, y: i32) -> usize {
        (y * TILE_SIZE + x) as usize * self.bpp
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_span_addressing() {
        let mut tile = Tile::new(2).unwrap();
        tile.span_mut(3, 1, 2).copy_from_slice(&[1, 2, 3, 4]);
        assert_eq!(tile.span(3, 1, 1), &[1, 2]);
        assert_eq!(tile.span(4, 1, 1), &[3, 4]);
        assert_eq!(tile.bytes()[(TILE_SIZE as usize + 3) * 2], 1);
    }

    #[test]
    fn test_from_bytes_checks_length() {
        assert!(Tile::from_bytes(vec![0; 10], 4).is_err());
        assert!(Tile::from_bytes(vec![0; 64 * 64], 1).is_ok());
    }
}
