//! Undo and dirty-region tracking for one stroke
//!
//! Tiles are copied lazily: the first write a stroke makes to a tile is
//! preceded by a snapshot of that tile. The snapshot serves three readers:
//! CONTINUOUS compositing (pre-stroke pixels), cancellation (restore) and
//! commit (packed into one [`UndoEntry`]).

use std::collections::HashMap;

use lz4_flex::{compress_prepend_size, decompress_size_prepended};

use crate::core::{try_alloc, PaintError, Rect};
use crate::surface::{PixelFormat, Surface, Tile, TILE_SIZE};

/// Receiver of committed strokes
pub trait UndoLog {
    fn push(&mut self, entry: UndoEntry);
}

/// Lazily captured pre-stroke tiles plus the stroke extent
#[derive(Debug, Default)]
pub struct UndoTracker {
    /// `None` marks a tile that did not exist before the stroke
    snapshot: HashMap<(i32, i32), Option<Tile>>,
    extent: Option<Rect>,
}

impl UndoTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget everything; called at stroke start
    pub fn reset(&mut self) {
        self.snapshot.clear();
        self.extent = None;
    }

    /// Bounding box of every pixel touched since the last reset
    pub fn extent(&self) -> Option<Rect> {
        self.extent
    }

    /// Number of tiles captured so far
    pub fn tile_count(&self) -> usize {
        self.snapshot.len()
    }

    /// Capture the tiles under `rect` that are not yet captured, then grow
    /// the extent. Must run before the first write to `rect`.
    pub fn touch(&mut self, surface: &Surface, rect: Rect) {
        let Some(rect) = rect.intersect(&surface.bounds()) else {
            return;
        };
        for key in surface.tiles_in(rect) {
            self.snapshot
                .entry(key)
                .or_insert_with(|| surface.tile(key.0, key.1).cloned());
        }
        self.extent = Some(match self.extent {
            Some(extent) => extent.union(&rect),
            None => rect,
        });
    }

    /// Raw pre-stroke bytes of `rect`
    pub fn original_raw(&self, surface: &Surface, rect: Rect) -> Result<Vec<u8>, PaintError> {
        let mut out = surface.read_raw(rect)?;
        let bpp = surface.format().bytes_per_pixel();
        let stride = rect.width as usize * bpp;

        for (tx, ty) in surface.tiles_in(rect) {
            let Some(saved) = self.snapshot.get(&(tx, ty)) else {
                continue;
            };
            let Some(span) = surface.tile_rect(tx, ty).intersect(&rect) else {
                continue;
            };
            for y in span.y..span.bottom() {
                let start = (y - rect.y) as usize * stride + (span.x - rect.x) as usize * bpp;
                let dst = &mut out[start..start + span.width as usize * bpp];
                match saved {
                    Some(tile) => dst.copy_from_slice(tile.span(
                        span.x - tx * TILE_SIZE,
                        y - ty * TILE_SIZE,
                        span.width,
                    )),
                    None => dst.fill(0),
                }
            }
        }
        Ok(out)
    }

    /// Pre-stroke pixels of `rect` as straight-alpha RGBA
    pub fn original_rgba(&self, surface: &Surface, rect: Rect) -> Result<Vec<f32>, PaintError> {
        let format = surface.format();
        format.ensure_paintable()?;
        let raw = self.original_raw(surface, rect)?;
        let mut out = try_alloc(rect.area() * 4, 0.0f32)?;
        for (src, dst) in raw.chunks_exact(format.bytes_per_pixel()).zip(out.chunks_exact_mut(4)) {
            format.decode(src, dst);
        }
        Ok(out)
    }

    /// Put every captured tile back and forget the stroke
    pub fn restore(&mut self, surface: &mut Surface) {
        let tiles = self.snapshot.len();
        for ((tx, ty), tile) in self.snapshot.drain() {
            surface.replace_tile(tx, ty, tile);
        }
        tracing::debug!("Restored {} tiles, extent {:?}", tiles, self.extent);
        self.extent = None;
    }

    /// Pack the captured tiles into an undo entry and forget the stroke.
    ///
    /// Returns `None` when the stroke touched nothing.
    pub fn commit(&mut self, surface: &Surface, name: &str) -> Option<UndoEntry> {
        let extent = self.extent.take()?;
        let mut tiles: Vec<PackedTile> = self
            .snapshot
            .drain()
            .map(|((tx, ty), tile)| PackedTile::pack(tx, ty, tile.as_ref()))
            .collect();
        tiles.sort_by_key(|t| (t.ty, t.tx));

        let entry = UndoEntry {
            name: name.to_string(),
            region: extent,
            format: surface.format(),
            tiles,
        };
        tracing::debug!(
            "Committed '{}' covering {:?}: {} tiles, {} bytes packed",
            entry.name,
            entry.region,
            entry.tiles.len(),
            entry.packed_size()
        );
        Some(entry)
    }
}

/// One tile of an undo entry, LZ4-compressed
#[derive(Debug, Clone, PartialEq, Eq)]
struct PackedTile {
    tx: i32,
    ty: i32,
    /// `None` for a tile that did not exist
    data: Option<Vec<u8>>,
}

impl PackedTile {
    fn pack(tx: i32, ty: i32, tile: Option<&Tile>) -> Self {
        Self {
            tx,
            ty,
            data: tile.map(|t| compress_prepend_size(t.bytes())),
        }
    }

    fn unpack(&self, bpp: usize) -> Result<Option<Tile>, PaintError> {
        self.data
            .as_ref()
            .map(|packed| {
                let bytes = decompress_size_prepended(packed)
                    .map_err(|e| PaintError::Compression(e.to_string()))?;
                Tile::from_bytes(bytes, bpp)
            })
            .transpose()
    }
}

/// Committed pre-stroke content of one stroke
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndoEntry {
    name: String,
    region: Rect,
    format: PixelFormat,
    tiles: Vec<PackedTile>,
}

impl UndoEntry {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pixels modified by the stroke
    pub fn region(&self) -> Rect {
        self.region
    }

    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    /// Compressed bytes held by the entry
    pub fn packed_size(&self) -> usize {
        self.tiles
            .iter()
            .filter_map(|t| t.data.as_ref())
            .map(Vec::len)
            .sum()
    }

    /// Swap the stored tiles with the surface's.
    ///
    /// Returns the entry that reverts this application (redo for an undo).
    pub fn apply(&self, surface: &mut Surface) -> Result<UndoEntry, PaintError> {
        if surface.format() != self.format {
            return Err(PaintError::InvalidInput(format!(
                "undo entry for {:?} applied to a {:?} surface",
                self.format,
                surface.format()
            )));
        }
        let bpp = self.format.bytes_per_pixel();
        let restored = self
            .tiles
            .iter()
            .map(|t| t.unpack(bpp))
            .collect::<Result<Vec<_>, _>>()?;

        let mut reverse = Vec::with_capacity(self.tiles.len());
        for (packed, tile) in self.tiles.iter().zip(restored) {
            let previous = surface.replace_tile(packed.tx, packed.ty, tile);
            reverse.push(PackedTile::pack(packed.tx, packed.ty, previous.as_ref()));
        }

        Ok(UndoEntry {
            name: self.name.clone(),
            region: self.region,
            format: self.format,
            tiles: reverse,
        })
    }
}

/// In-memory undo/redo stacks
#[derive(Debug, Default)]
pub struct MemoryUndoLog {
    undo: Vec<UndoEntry>,
    redo: Vec<UndoEntry>,
}

impl MemoryUndoLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.undo.len()
    }

    pub fn is_empty(&self) -> bool {
        self.undo.is_empty()
    }

    pub fn last(&self) -> Option<&UndoEntry> {
        self.undo.last()
    }

    /// Revert the newest stroke; returns its region
    pub fn undo(&mut self, surface: &mut Surface) -> Result<Option<Rect>, PaintError> {
        let Some(entry) = self.undo.pop() else {
            return Ok(None);
        };
        match entry.apply(surface) {
            Ok(redo) => {
                let region = entry.region;
                self.redo.push(redo);
                Ok(Some(region))
            }
            Err(e) => {
                self.undo.push(entry);
                Err(e)
            }
        }
    }

    /// Re-apply the newest undone stroke; returns its region
    pub fn redo(&mut self, surface: &mut Surface) -> Result<Option<Rect>, PaintError> {
        let Some(entry) = self.redo.pop() else {
            return Ok(None);
        };
        match entry.apply(surface) {
            Ok(undo) => {
                let region = entry.region;
                self.undo.push(undo);
                Ok(Some(region))
            }
            Err(e) => {
                self.redo.push(entry);
                Err(e)
            }
        }
    }
}

impl UndoLog for MemoryUndoLog {
    fn push(&mut self, entry: UndoEntry) {
        self.undo.push(entry);
        self.redo.clear();
    }
}
