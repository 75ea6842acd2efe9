// Copyright 2026 the Varve Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The software [`PresentBackend`]: cached layer surfaces composited into an
//! output pixmap.
//!
//! `present` walks the draw list recursively: transforms accumulate a device
//! offset, blends render their children into a scratch buffer and composite
//! it once with the group's opacity and blend mode, and surface leaves blit
//! their cached pixmap (or, for layers that could not get a surface, execute
//! their paint commands directly).
//!
//! No layer surface is ever allocated here — that is `rasterize`'s job. The
//! scratch buffers used for blend groups are pooled per nesting depth and
//! reused across frames.

use kurbo::{Rect, Vec2};
use tiny_skia::{BlendMode as SkiaBlendMode, Paint, Pixmap, PixmapPaint, Transform};

use varve_core::compositor::{DrawId, DrawKind, DrawList, LayerContent};
use varve_core::control::PresentBackend;
use varve_core::display::{BlendMode, Color, EffectCommand};

use crate::cache::{RasterStats, SurfaceCache, SurfaceError};
use crate::paint;

fn to_skia_blend(mode: BlendMode) -> SkiaBlendMode {
    match mode {
        BlendMode::SourceOver => SkiaBlendMode::SourceOver,
        BlendMode::Multiply => SkiaBlendMode::Multiply,
        BlendMode::Screen => SkiaBlendMode::Screen,
    }
}

/// Software rasterizer and presenter over `tiny_skia`.
pub struct SoftwareBackend {
    cache: SurfaceCache,
    output: Pixmap,
    scratch: Vec<Option<Pixmap>>,
    background: Color,
}

impl core::fmt::Debug for SoftwareBackend {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SoftwareBackend")
            .field("cache", &self.cache)
            .field("viewport", &(self.output.width(), self.output.height()))
            .field("background", &self.background)
            .finish()
    }
}

impl SoftwareBackend {
    /// Creates a backend with a viewport-sized output surface.
    ///
    /// # Errors
    ///
    /// Returns [`SurfaceError`] if the output surface cannot be allocated.
    pub fn new(width: u32, height: u32) -> Result<Self, SurfaceError> {
        Self::with_max_dimension(width, height, SurfaceCache::DEFAULT_MAX_DIMENSION)
    }

    /// Like [`new`](Self::new), with a custom cap on layer surface
    /// dimensions.
    ///
    /// # Errors
    ///
    /// Returns [`SurfaceError`] if the output surface cannot be allocated.
    pub fn with_max_dimension(
        width: u32,
        height: u32,
        max_dimension: u32,
    ) -> Result<Self, SurfaceError> {
        let output = Pixmap::new(width, height).ok_or(SurfaceError { width, height })?;
        Ok(Self {
            cache: SurfaceCache::with_max_dimension(max_dimension),
            output,
            scratch: Vec::new(),
            background: Color::WHITE,
        })
    }

    /// Sets the color the output is cleared to before each present.
    pub fn set_background(&mut self, color: Color) {
        self.background = color;
    }

    /// The presented output surface.
    #[must_use]
    pub fn output(&self) -> &Pixmap {
        &self.output
    }

    /// Raster work counters from the surface cache.
    #[must_use]
    pub fn stats(&self) -> RasterStats {
        self.cache.stats()
    }
}

impl PresentBackend for SoftwareBackend {
    fn rasterize(&mut self, layers: &[LayerContent]) {
        self.cache.rasterize(layers);
    }

    fn present(&mut self, draw_list: &DrawList, layers: &[LayerContent], scroll: f64) {
        self.output.fill(paint::to_skia(self.background));
        let offset = Vec2::new(0.0, -scroll);
        let Self {
            cache,
            output,
            scratch,
            ..
        } = self;
        for &root in draw_list.roots() {
            draw_node(output, scratch, cache, draw_list, layers, root, offset, 0);
        }
    }
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "device-space positions fit i32 comfortably"
)]
fn draw_node(
    target: &mut Pixmap,
    scratch: &mut Vec<Option<Pixmap>>,
    cache: &SurfaceCache,
    draw_list: &DrawList,
    layers: &[LayerContent],
    id: DrawId,
    offset: Vec2,
    depth: usize,
) {
    let node = draw_list.node(id);
    match node.kind {
        DrawKind::Surface(index) => {
            assert!(
                index < layers.len(),
                "draw list references a layer outside this compositing pass"
            );
            let layer = &layers[index];
            if let Some(surface) = cache.surface(index) {
                let origin = layer.bounds().origin() + offset;
                target.draw_pixmap(
                    origin.x.round() as i32,
                    origin.y.round() as i32,
                    surface.as_ref(),
                    &PixmapPaint::default(),
                    Transform::identity(),
                    None,
                );
            } else if layer.bounds().width() > 0.0 {
                // Uncached layer: execute its commands straight into the
                // target.
                paint::execute(target, layer.items(), offset);
            }
        }
        DrawKind::Effect(EffectCommand::Transform { translation }) => {
            for &child in &node.children {
                draw_node(
                    target,
                    scratch,
                    cache,
                    draw_list,
                    layers,
                    child,
                    offset + translation,
                    depth,
                );
            }
        }
        DrawKind::Effect(EffectCommand::Blend {
            opacity,
            mode,
            clip,
        }) => {
            let mut group = take_scratch(scratch, depth, target.width(), target.height());
            let Some(buffer) = group.as_mut() else {
                // No group buffer available; draw through without the group
                // semantics rather than dropping the subtree.
                for &child in &node.children {
                    draw_node(target, scratch, cache, draw_list, layers, child, offset, depth);
                }
                return;
            };
            for &child in &node.children {
                draw_node(
                    buffer, scratch, cache, draw_list, layers, child, offset, depth + 1,
                );
            }
            if let Some(clip) = clip {
                clear_outside(buffer, clip + offset);
            }
            let paint = PixmapPaint {
                opacity,
                blend_mode: to_skia_blend(mode),
                ..PixmapPaint::default()
            };
            target.draw_pixmap(0, 0, buffer.as_ref(), &paint, Transform::identity(), None);
            scratch[depth] = group;
        }
    }
}

/// Takes the pooled scratch buffer for a nesting depth, clearing it, or
/// allocates one on first use (and after a viewport resize).
fn take_scratch(
    scratch: &mut Vec<Option<Pixmap>>,
    depth: usize,
    width: u32,
    height: u32,
) -> Option<Pixmap> {
    if scratch.len() <= depth {
        scratch.resize_with(depth + 1, || None);
    }
    match scratch[depth].take() {
        Some(mut pixmap) if pixmap.width() == width && pixmap.height() == height => {
            pixmap.fill(tiny_skia::Color::TRANSPARENT);
            Some(pixmap)
        }
        _ => Pixmap::new(width, height),
    }
}

/// Erases everything outside `clip` (device space) from the buffer.
fn clear_outside(pixmap: &mut Pixmap, clip: Rect) {
    let width = f64::from(pixmap.width());
    let height = f64::from(pixmap.height());
    let mut paint = Paint::default();
    paint.blend_mode = SkiaBlendMode::Clear;
    paint.anti_alias = false;

    let strips = [
        Rect::new(0.0, 0.0, width, clip.y0),
        Rect::new(0.0, clip.y1, width, height),
        Rect::new(0.0, clip.y0, clip.x0, clip.y1),
        Rect::new(clip.x1, clip.y0, width, clip.y1),
    ];
    for strip in strips {
        if strip.width() <= 0.0 || strip.height() <= 0.0 {
            continue;
        }
        #[expect(
            clippy::cast_possible_truncation,
            reason = "device-space coordinates fit f32 comfortably"
        )]
        let Some(rect) = tiny_skia::Rect::from_ltrb(
            strip.x0 as f32,
            strip.y0 as f32,
            strip.x1 as f32,
            strip.y1 as f32,
        ) else {
            continue;
        };
        pixmap.fill_rect(rect, &paint, Transform::identity(), None);
    }
}

#[cfg(test)]
mod tests {
    use varve_core::compositor::composite;
    use varve_core::display::{ContentKey, DisplayList, PaintCommand};

    use super::*;

    fn fill(r: u8, g: u8, b: u8) -> PaintCommand {
        PaintCommand::FillRect {
            color: Color::rgb(r, g, b),
        }
    }

    fn pixel(backend: &SoftwareBackend, x: u32, y: u32) -> (u8, u8, u8, u8) {
        let p = backend.output().pixel(x, y).expect("pixel in range");
        (p.red(), p.green(), p.blue(), p.alpha())
    }

    #[test]
    fn later_painted_content_wins_the_overlap() {
        // Blue square translated right to overlap a green square painted
        // after it: the overlap must come out green.
        let mut list = DisplayList::new();
        let moved = list.push_effect(
            EffectCommand::Transform {
                translation: Vec2::new(50.0, 0.0),
            },
            None,
            None,
        );
        list.push_paint(fill(0, 0, 255), Rect::new(0.0, 0.0, 100.0, 100.0), Some(moved));
        list.push_paint(fill(0, 255, 0), Rect::new(100.0, 0.0, 200.0, 100.0), None);

        let out = composite(&list);
        let mut backend = SoftwareBackend::new(250, 120).unwrap();
        backend.rasterize(&out.layers);
        backend.present(&out.draw_list, &out.layers, 0.0);

        assert_eq!(pixel(&backend, 120, 50), (0, 255, 0, 255), "overlap is green");
        assert_eq!(pixel(&backend, 60, 50), (0, 0, 255, 255), "blue shows left of it");
    }

    #[test]
    fn shared_blend_ancestor_darkens_exactly_once() {
        let mut list = DisplayList::new();
        let shared = list.push_effect(
            EffectCommand::Blend {
                opacity: 0.5,
                mode: BlendMode::SourceOver,
                clip: None,
            },
            None,
            None,
        );
        list.push_paint(fill(255, 0, 0), Rect::new(0.0, 0.0, 100.0, 100.0), Some(shared));
        let moved = list.push_effect(
            EffectCommand::Transform {
                translation: Vec2::new(50.0, 0.0),
            },
            None,
            Some(shared),
        );
        list.push_paint(fill(0, 0, 255), Rect::new(0.0, 0.0, 100.0, 100.0), Some(moved));

        let out = composite(&list);
        assert_eq!(out.layers.len(), 2, "overlap forces two layers");

        let mut backend = SoftwareBackend::new(200, 120).unwrap();
        backend.rasterize(&out.layers);
        backend.present(&out.draw_list, &out.layers, 0.0);

        // Overlap region: blue wins within the group, then the group's 0.5
        // opacity applies once over the white background. Double application
        // (two cloned ancestors) would read much brighter than 127.
        let (r, g, b, _) = pixel(&backend, 75, 50);
        assert!((126..=129).contains(&r), "red channel was {r}");
        assert!((126..=129).contains(&g), "green channel was {g}");
        assert_eq!(b, 255);
    }

    #[test]
    fn scroll_translates_the_presented_frame() {
        let mut list = DisplayList::new();
        list.push_paint(fill(255, 0, 0), Rect::new(0.0, 100.0, 50.0, 150.0), None);

        let out = composite(&list);
        let mut backend = SoftwareBackend::new(100, 100).unwrap();
        backend.rasterize(&out.layers);

        backend.present(&out.draw_list, &out.layers, 0.0);
        assert_eq!(pixel(&backend, 25, 50), (255, 255, 255, 255), "below the fold");

        backend.present(&out.draw_list, &out.layers, 100.0);
        assert_eq!(pixel(&backend, 25, 25), (255, 0, 0, 255), "scrolled into view");
    }

    #[test]
    fn clip_confines_the_group() {
        let mut list = DisplayList::new();
        let clipped = list.push_effect(
            EffectCommand::Blend {
                opacity: 1.0,
                mode: BlendMode::SourceOver,
                clip: Some(Rect::new(0.0, 0.0, 50.0, 50.0)),
            },
            None,
            None,
        );
        list.push_paint(fill(255, 0, 0), Rect::new(0.0, 0.0, 100.0, 100.0), Some(clipped));

        let out = composite(&list);
        let mut backend = SoftwareBackend::new(120, 120).unwrap();
        backend.rasterize(&out.layers);
        backend.present(&out.draw_list, &out.layers, 0.0);

        assert_eq!(pixel(&backend, 25, 25), (255, 0, 0, 255), "inside the clip");
        assert_eq!(pixel(&backend, 75, 75), (255, 255, 255, 255), "outside is background");
    }

    #[test]
    fn uncached_layer_draws_directly() {
        let mut list = DisplayList::new();
        list.push_paint(fill(0, 128, 0), Rect::new(0.0, 0.0, 500.0, 40.0), None);

        let out = composite(&list);
        // The 500-wide layer exceeds the cap, so it gets no surface.
        let mut backend = SoftwareBackend::with_max_dimension(600, 100, 64).unwrap();
        backend.rasterize(&out.layers);
        assert_eq!(backend.stats().direct, 1);

        backend.present(&out.draw_list, &out.layers, 0.0);
        assert_eq!(pixel(&backend, 250, 20), (0, 128, 0, 255), "fallback still draws");
    }

    #[test]
    fn composited_update_changes_pixels_without_reraster() {
        let mut list = DisplayList::new();
        let keyed = list.push_effect(
            EffectCommand::Blend {
                opacity: 0.2,
                mode: BlendMode::SourceOver,
                clip: None,
            },
            Some(ContentKey(4)),
            None,
        );
        list.push_paint(fill(0, 0, 0), Rect::new(0.0, 0.0, 50.0, 50.0), Some(keyed));

        let mut out = composite(&list);
        let mut backend = SoftwareBackend::new(80, 80).unwrap();
        backend.rasterize(&out.layers);
        backend.present(&out.draw_list, &out.layers, 0.0);
        let (before, ..) = pixel(&backend, 25, 25);
        assert!((203..=205).contains(&before), "0.2 black over white, was {before}");

        assert!(out.draw_list.apply_update(
            ContentKey(4),
            EffectCommand::Blend {
                opacity: 1.0,
                mode: BlendMode::SourceOver,
                clip: None,
            }
        ));
        let rasterized = backend.stats().rasterized;
        backend.present(&out.draw_list, &out.layers, 0.0);
        assert_eq!(backend.stats().rasterized, rasterized, "no surface repainted");
        assert_eq!(pixel(&backend, 25, 25), (0, 0, 0, 255));
    }
}
