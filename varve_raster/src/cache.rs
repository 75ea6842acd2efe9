// Copyright 2026 the Varve Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Cached per-layer surfaces.
//!
//! Each composited layer gets one slot, keyed by its position in the pass's
//! layer list and validated by (bounds, content generation). Rasterizing a
//! layer whose slot already matches is a no-op — the central cache property:
//! an unchanged subtree reuses its surface without repainting.
//!
//! A layer whose surface cannot be allocated (oversized, or the allocator
//! refused) falls back to **direct drawing**: the slot stays surfaceless and
//! the presenter executes the layer's paint commands into the output
//! instead. One hungry layer degrades only itself, never the frame.

use kurbo::Vec2;
use tiny_skia::Pixmap;
use varve_core::compositor::LayerContent;

use crate::paint;

/// Raster work counters, mostly for tests and diagnostics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RasterStats {
    /// Surfaces painted (allocated or repainted).
    pub rasterized: u64,
    /// Raster calls satisfied by an existing surface.
    pub reused: u64,
    /// Layers downgraded to direct drawing.
    pub direct: u64,
}

struct Slot {
    bounds: kurbo::Rect,
    generation: u64,
    pixmap: Option<Pixmap>,
}

/// Error raised when a surface cannot be allocated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("cannot allocate a {width}x{height} layer surface")]
pub struct SurfaceError {
    /// Requested width in pixels.
    pub width: u32,
    /// Requested height in pixels.
    pub height: u32,
}

/// The per-layer surface cache.
pub struct SurfaceCache {
    slots: Vec<Slot>,
    max_dimension: u32,
    stats: RasterStats,
}

impl core::fmt::Debug for SurfaceCache {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SurfaceCache")
            .field("slots", &self.slots.len())
            .field("max_dimension", &self.max_dimension)
            .field("stats", &self.stats)
            .finish()
    }
}

impl Default for SurfaceCache {
    fn default() -> Self {
        Self::new()
    }
}

impl SurfaceCache {
    /// Default cap on either surface dimension, in pixels.
    pub const DEFAULT_MAX_DIMENSION: u32 = 8192;

    /// Creates an empty cache with the default dimension cap.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_dimension(Self::DEFAULT_MAX_DIMENSION)
    }

    /// Creates an empty cache refusing surfaces larger than `max_dimension`
    /// on either side.
    #[must_use]
    pub fn with_max_dimension(max_dimension: u32) -> Self {
        Self {
            slots: Vec::new(),
            max_dimension: max_dimension.max(1),
            stats: RasterStats::default(),
        }
    }

    /// Work counters accumulated since creation.
    #[must_use]
    pub fn stats(&self) -> RasterStats {
        self.stats
    }

    /// The cached surface for the layer at `index`, if it has one.
    ///
    /// `None` means the layer is empty or draws directly.
    #[must_use]
    pub fn surface(&self, index: usize) -> Option<&Pixmap> {
        self.slots.get(index).and_then(|slot| slot.pixmap.as_ref())
    }

    /// Brings every slot up to date with the given layer list.
    ///
    /// Slots whose bounds and generation match are left untouched. All
    /// others are repainted with the layer's local origin translated to the
    /// surface origin, reallocating only when the pixel size changed.
    pub fn rasterize(&mut self, layers: &[LayerContent]) {
        self.slots.truncate(layers.len());
        for (index, layer) in layers.iter().enumerate() {
            if let Some(slot) = self.slots.get(index) {
                if slot.bounds == layer.bounds()
                    && slot.generation == layer.generation()
                    && (slot.pixmap.is_some() || surface_size(layer.bounds()).is_none())
                {
                    self.stats.reused += 1;
                    continue;
                }
            }

            let recycled = self
                .slots
                .get_mut(index)
                .and_then(|slot| slot.pixmap.take());
            let pixmap = self.paint_layer(layer, recycled);
            let slot = Slot {
                bounds: layer.bounds(),
                generation: layer.generation(),
                pixmap,
            };
            if index < self.slots.len() {
                self.slots[index] = slot;
            } else {
                self.slots.push(slot);
            }
        }
    }

    fn paint_layer(&mut self, layer: &LayerContent, recycled: Option<Pixmap>) -> Option<Pixmap> {
        let Some((width, height)) = surface_size(layer.bounds()) else {
            // Empty bounds: everything clipped away, nothing to cache.
            return None;
        };
        // A same-size surface is repainted in place; only a resize
        // reallocates.
        let mut pixmap = match recycled {
            Some(mut pixmap) if pixmap.width() == width && pixmap.height() == height => {
                pixmap.fill(tiny_skia::Color::TRANSPARENT);
                pixmap
            }
            _ => match self.allocate(width, height) {
                Ok(pixmap) => pixmap,
                Err(_) => {
                    // Recoverable: this layer draws uncached, the frame
                    // survives.
                    self.stats.direct += 1;
                    return None;
                }
            },
        };
        let origin = layer.bounds().origin();
        paint::execute(&mut pixmap, layer.items(), Vec2::new(-origin.x, -origin.y));
        self.stats.rasterized += 1;
        Some(pixmap)
    }

    fn allocate(&self, width: u32, height: u32) -> Result<Pixmap, SurfaceError> {
        if width > self.max_dimension || height > self.max_dimension {
            return Err(SurfaceError { width, height });
        }
        Pixmap::new(width, height).ok_or(SurfaceError { width, height })
    }
}

/// Pixel size for a layer's local bounds, or `None` when empty.
#[expect(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "bounds are non-negative and far below u32::MAX after the emptiness check"
)]
fn surface_size(bounds: kurbo::Rect) -> Option<(u32, u32)> {
    let width = bounds.width().ceil();
    let height = bounds.height().ceil();
    if width <= 0.0 || height <= 0.0 {
        return None;
    }
    Some((width as u32, height as u32))
}

#[cfg(test)]
mod tests {
    use kurbo::Rect;
    use varve_core::compositor::composite;
    use varve_core::display::{Color, DisplayList, PaintCommand};

    use super::*;

    fn one_rect_layers(x1: f64, y1: f64) -> Vec<LayerContent> {
        let mut list = DisplayList::new();
        list.push_paint(
            PaintCommand::FillRect {
                color: Color::rgb(10, 20, 30),
            },
            Rect::new(0.0, 0.0, x1, y1),
            None,
        );
        composite(&list).layers
    }

    #[test]
    fn unchanged_layer_reuses_its_surface() {
        let mut cache = SurfaceCache::new();
        let layers = one_rect_layers(100.0, 100.0);

        cache.rasterize(&layers);
        assert_eq!(cache.stats().rasterized, 1);
        assert!(cache.surface(0).is_some());

        cache.rasterize(&layers);
        assert_eq!(cache.stats().rasterized, 1, "no repaint");
        assert_eq!(cache.stats().reused, 1);
    }

    #[test]
    fn same_size_content_change_repaints_the_existing_surface() {
        let mut cache = SurfaceCache::new();
        cache.rasterize(&one_rect_layers(100.0, 100.0));

        let mut recolored = DisplayList::new();
        recolored.push_paint(
            PaintCommand::FillRect {
                color: Color::rgb(200, 20, 30),
            },
            Rect::new(0.0, 0.0, 100.0, 100.0),
            None,
        );
        cache.rasterize(&composite(&recolored).layers);
        assert_eq!(cache.stats().rasterized, 2, "content change repaints");
        assert_eq!(cache.stats().reused, 0);
        let surface = cache.surface(0).expect("surface kept");
        assert_eq!((surface.width(), surface.height()), (102, 102));
    }

    #[test]
    fn resized_layer_reallocates() {
        let mut cache = SurfaceCache::new();
        cache.rasterize(&one_rect_layers(100.0, 100.0));
        cache.rasterize(&one_rect_layers(150.0, 100.0));
        assert_eq!(cache.stats().rasterized, 2);
        assert_eq!(cache.stats().reused, 0);
    }

    #[test]
    fn surface_matches_layer_bounds_with_outset() {
        let mut cache = SurfaceCache::new();
        cache.rasterize(&one_rect_layers(100.0, 50.0));
        let surface = cache.surface(0).expect("surface allocated");
        // 100x50 content plus the one-unit outset on each side.
        assert_eq!(surface.width(), 102);
        assert_eq!(surface.height(), 52);
    }

    #[test]
    fn oversized_layer_degrades_to_direct_drawing() {
        let mut cache = SurfaceCache::with_max_dimension(64);
        let layers = one_rect_layers(500.0, 40.0);

        cache.rasterize(&layers);
        assert_eq!(cache.stats().direct, 1);
        assert!(cache.surface(0).is_none(), "no surface for this layer");

        // The failed slot is not retried into a reuse; it stays direct.
        cache.rasterize(&layers);
        assert_eq!(cache.stats().reused, 0);
        assert_eq!(cache.stats().direct, 2);
    }

    #[test]
    fn shrinking_layer_set_drops_extra_slots() {
        let mut cache = SurfaceCache::new();
        let mut list = DisplayList::new();
        list.push_paint(
            PaintCommand::FillRect {
                color: Color::rgb(1, 2, 3),
            },
            Rect::new(0.0, 0.0, 10.0, 10.0),
            None,
        );
        // A real transform separates the chains, forcing a second layer.
        let moved = list.push_effect(
            varve_core::display::EffectCommand::Transform {
                translation: kurbo::Vec2::new(100.0, 0.0),
            },
            None,
            None,
        );
        list.push_paint(
            PaintCommand::FillRect {
                color: Color::rgb(4, 5, 6),
            },
            Rect::new(0.0, 0.0, 20.0, 10.0),
            Some(moved),
        );
        let two = composite(&list).layers;
        assert_eq!(two.len(), 2);
        cache.rasterize(&two);
        assert!(cache.surface(1).is_some());

        let one = one_rect_layers(10.0, 10.0);
        cache.rasterize(&one);
        assert!(cache.surface(1).is_none(), "stale slot dropped");
    }
}
