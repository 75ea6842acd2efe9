// Copyright 2026 the Varve Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Paint-command execution against `tiny_skia` pixmaps.

use kurbo::{Rect, Vec2};
use tiny_skia::{Paint, Pixmap, Transform};
use varve_core::compositor::LayerPaint;
use varve_core::display::{Color, PaintCommand};

/// Converts a varve color to the raster color type.
pub(crate) fn to_skia(color: Color) -> tiny_skia::Color {
    tiny_skia::Color::from_rgba8(color.r, color.g, color.b, color.a)
}

/// Executes paint items into `target`, translated by `offset`.
///
/// Used both when repainting a cached layer surface (offset moves the
/// layer's local bounds to the origin) and when drawing an uncached layer
/// directly into the output.
pub(crate) fn execute(target: &mut Pixmap, items: &[LayerPaint], offset: Vec2) {
    for item in items {
        let bounds = item.bounds + offset;
        match item.command {
            PaintCommand::FillRect { color } => fill_rect(target, bounds, color),
            PaintCommand::StrokeRect { color, width } => {
                // Four side strips drawn inside the bounds.
                let w = width.min(bounds.width() / 2.0).min(bounds.height() / 2.0);
                let top = Rect::new(bounds.x0, bounds.y0, bounds.x1, bounds.y0 + w);
                let bottom = Rect::new(bounds.x0, bounds.y1 - w, bounds.x1, bounds.y1);
                let left = Rect::new(bounds.x0, bounds.y0 + w, bounds.x0 + w, bounds.y1 - w);
                let right = Rect::new(bounds.x1 - w, bounds.y0 + w, bounds.x1, bounds.y1 - w);
                for side in [top, bottom, left, right] {
                    fill_rect(target, side, color);
                }
            }
        }
    }
}

/// Fills one rectangle; off-target or degenerate rects are clipped or
/// dropped by the raster library.
#[expect(
    clippy::cast_possible_truncation,
    reason = "device-space coordinates fit f32 comfortably"
)]
pub(crate) fn fill_rect(target: &mut Pixmap, rect: Rect, color: Color) {
    let Some(skia_rect) = tiny_skia::Rect::from_ltrb(
        rect.x0 as f32,
        rect.y0 as f32,
        rect.x1 as f32,
        rect.y1 as f32,
    ) else {
        return;
    };
    let mut paint = Paint::default();
    paint.set_color(to_skia(color));
    paint.anti_alias = false;
    target.fill_rect(skia_rect, &paint, Transform::identity(), None);
}
