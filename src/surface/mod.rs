//! Surface module - the tiled raster a stroke paints into
//!
//! Storage is sparse: a tile that was never written reads as zero bytes
//! (transparent for alpha formats). Paint routines exchange pixels with the
//! surface either as raw format bytes (undo, copies) or as straight-alpha
//! RGBA `f32` (blending).

mod format;
mod tile;

pub use format::{to_u8, PixelFormat};
pub use tile::{Tile, TILE_SIZE};

use image::{Rgba, RgbaImage};

use crate::core::{try_alloc, PaintError, Rect};

/// Tiled target surface
#[derive(Debug, Clone)]
pub struct Surface {
    width: i32,
    height: i32,
    format: PixelFormat,
    tiles_x: i32,
    tiles_y: i32,
    tiles: Vec<Option<Tile>>,
}

impl Surface {
    /// Create an empty surface
    pub fn new(width: i32, height: i32, format: PixelFormat) -> Result<Self, PaintError> {
        if width <= 0 || height <= 0 {
            return Err(PaintError::InvalidInput(format!(
                "surface size {}x{} must be positive",
                width, height
            )));
        }
        let tiles_x = (width + TILE_SIZE - 1) / TILE_SIZE;
        let tiles_y = (height + TILE_SIZE - 1) / TILE_SIZE;
        let tiles = try_alloc((tiles_x * tiles_y) as usize, None)?;

        Ok(Self {
            width,
            height,
            format,
            tiles_x,
            tiles_y,
            tiles,
        })
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.width, self.height)
    }

    /// Surface-space rectangle covered by tile `(tx, ty)`, clipped to the surface
    pub fn tile_rect(&self, tx: i32, ty: i32) -> Rect {
        Rect::new(tx * TILE_SIZE, ty * TILE_SIZE, TILE_SIZE, TILE_SIZE)
            .intersect(&self.bounds())
            .unwrap_or_default()
    }

    /// Tile coordinates of every tile intersecting `rect`
    pub fn tiles_in(&self, rect: Rect) -> Vec<(i32, i32)> {
        let Some(rect) = rect.intersect(&self.bounds()) else {
            return Vec::new();
        };
        let tx0 = rect.x / TILE_SIZE;
        let ty0 = rect.y / TILE_SIZE;
        let tx1 = (rect.right() - 1) / TILE_SIZE;
        let ty1 = (rect.bottom() - 1) / TILE_SIZE;

        (ty0..=ty1)
            .flat_map(|ty| (tx0..=tx1).map(move |tx| (tx, ty)))
            .collect()
    }

    fn index(&self, tx: i32, ty: i32) -> Option<usize> {
        if tx < 0 || ty < 0 || tx >= self.tiles_x || ty >= self.tiles_y {
            None
        } else {
            Some((ty * self.tiles_x + tx) as usize)
        }
    }

    /// Read access; `None` for tiles that were never written
    pub fn tile(&self, tx: i32, ty: i32) -> Option<&Tile> {
        self.index(tx, ty).and_then(|i| self.tiles[i].as_ref())
    }

    /// Get-or-create write access
    pub fn tile_mut(&mut self, tx: i32, ty: i32) -> Result<&mut Tile, PaintError> {
        let i = self
            .index(tx, ty)
            .ok_or_else(|| PaintError::InvalidInput(format!("tile ({}, {}) out of range", tx, ty)))?;
        let bpp = self.format.bytes_per_pixel();
        let slot = &mut self.tiles[i];
        if slot.is_none() {
            *slot = Some(Tile::new(bpp)?);
        }
        slot.as_mut()
            .ok_or_else(|| PaintError::InvalidInput("tile allocation vanished".into()))
    }

    /// Swap a whole tile in or out, returning the previous content
    pub fn replace_tile(&mut self, tx: i32, ty: i32, tile: Option<Tile>) -> Option<Tile> {
        let i = self.index(tx, ty)?;
        std::mem::replace(&mut self.tiles[i], tile)
    }

    fn check_rect(&self, rect: Rect) -> Result<(), PaintError> {
        if rect.is_empty() || rect.intersect(&self.bounds()) != Some(rect) {
            return Err(PaintError::InvalidInput(format!(
                "rect {:?} outside surface {}x{}",
                rect, self.width, self.height
            )));
        }
        Ok(())
    }

    /// Copy the raw format bytes of `rect` into a contiguous buffer
    pub fn read_raw(&self, rect: Rect) -> Result<Vec<u8>, PaintError> {
        self.check_rect(rect)?;
        let bpp = self.format.bytes_per_pixel();
        let stride = rect.width as usize * bpp;
        let mut out = try_alloc(rect.area() * bpp, 0u8)?;

        for (tx, ty) in self.tiles_in(rect) {
            let Some(tile) = self.tile(tx, ty) else {
                continue;
            };
            let Some(span) = self.tile_rect(tx, ty).intersect(&rect) else {
                continue;
            };
            for y in span.y..span.bottom() {
                let src = tile.span(span.x - tx * TILE_SIZE, y - ty * TILE_SIZE, span.width);
                let start = (y - rect.y) as usize * stride + (span.x - rect.x) as usize * bpp;
                out[start..start + src.len()].copy_from_slice(src);
            }
        }
        Ok(out)
    }

    /// Write a contiguous buffer of raw format bytes over `rect`
    pub fn write_raw(&mut self, rect: Rect, data: &[u8]) -> Result<(), PaintError> {
        self.check_rect(rect)?;
        let bpp = self.format.bytes_per_pixel();
        let stride = rect.width as usize * bpp;
        if data.len() != rect.area() * bpp {
            return Err(PaintError::InvalidInput(format!(
                "buffer of {} bytes does not match {:?}",
                data.len(),
                rect
            )));
        }

        for (tx, ty) in self.tiles_in(rect) {
            let Some(span) = self.tile_rect(tx, ty).intersect(&rect) else {
                continue;
            };
            let tile = self.tile_mut(tx, ty)?;
            for y in span.y..span.bottom() {
                let start = (y - rect.y) as usize * stride + (span.x - rect.x) as usize * bpp;
                let dst = tile.span_mut(span.x - tx * TILE_SIZE, y - ty * TILE_SIZE, span.width);
                dst.copy_from_slice(&data[start..start + dst.len()]);
            }
        }
        Ok(())
    }

    /// Read `rect` as straight-alpha RGBA `f32`
    pub fn read_rgba(&self, rect: Rect) -> Result<Vec<f32>, PaintError> {
        self.format.ensure_paintable()?;
        let raw = self.read_raw(rect)?;
        let bpp = self.format.bytes_per_pixel();
        let mut out = try_alloc(rect.area() * 4, 0.0f32)?;
        for (src, dst) in raw.chunks_exact(bpp).zip(out.chunks_exact_mut(4)) {
            self.format.decode(src, dst);
        }
        Ok(out)
    }

    /// Write straight-alpha RGBA `f32` over `rect`
    pub fn write_rgba(&mut self, rect: Rect, data: &[f32]) -> Result<(), PaintError> {
        self.format.ensure_paintable()?;
        let bpp = self.format.bytes_per_pixel();
        let mut raw = try_alloc(rect.area() * bpp, 0u8)?;
        for (src, dst) in data.chunks_exact(4).zip(raw.chunks_exact_mut(bpp)) {
            self.format.encode(src, dst);
        }
        self.write_raw(rect, &raw)
    }

    /// Single pixel as RGBA `f32`; transparent outside the surface
    pub fn pixel(&self, x: i32, y: i32) -> [f32; 4] {
        let mut out = [0.0; 4];
        if !self.bounds().contains(x, y) {
            return out;
        }
        let bpp = self.format.bytes_per_pixel();
        match self.tile(x / TILE_SIZE, y / TILE_SIZE) {
            Some(tile) => self
                .format
                .decode(tile.span(x % TILE_SIZE, y % TILE_SIZE, 1), &mut out),
            None => self.format.decode(&[0u8; 4][..bpp], &mut out),
        }
        out
    }

    /// Fill the whole surface with one color
    pub fn fill(&mut self, color: [f32; 4]) -> Result<(), PaintError> {
        let bpp = self.format.bytes_per_pixel();
        let mut px = [0u8; 4];
        self.format.encode(&color, &mut px[..bpp]);
        let row: Vec<u8> = px[..bpp].repeat(TILE_SIZE as usize);

        for ty in 0..self.tiles_y {
            for tx in 0..self.tiles_x {
                let tile = self.tile_mut(tx, ty)?;
                for y in 0..TILE_SIZE {
                    tile.span_mut(0, y, TILE_SIZE).copy_from_slice(&row);
                }
            }
        }
        Ok(())
    }

    /// Import an RGBA image, converting to `format`
    pub fn from_rgba_image(img: &RgbaImage, format: PixelFormat) -> Result<Self, PaintError> {
        let mut surface = Self::new(img.width() as i32, img.height() as i32, format)?;
        let data: Vec<f32> = img.as_raw().iter().map(|&v| v as f32 / 255.0).collect();
        let bounds = surface.bounds();
        if format.is_paintable() {
            surface.write_rgba(bounds, &data)?;
        } else {
            let raw: Vec<u8> = img.pixels().map(|p| p.0[0]).collect();
            surface.write_raw(bounds, &raw)?;
        }
        Ok(surface)
    }

    /// Export as an 8-bit RGBA image
    pub fn to_rgba_image(&self) -> Result<RgbaImage, PaintError> {
        let data = self.read_rgba(self.bounds())?;
        let mut img = RgbaImage::new(self.width as u32, self.height as u32);
        for (px, src) in img.pixels_mut().zip(data.chunks_exact(4)) {
            *px = Rgba([to_u8(src[0]), to_u8(src[1]), to_u8(src[2]), to_u8(src[3])]);
        }
        Ok(img)
    }
}
