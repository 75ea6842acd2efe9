// Copyright 2026 the Varve Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Pipeline-stage dirty flags.
//!
//! The render side of the pipeline runs a fixed sequence of stages:
//!
//! ```text
//! Style → Layout → Paint → Composite → Raster → Draw
//! ```
//!
//! Invalidation is tracked as one small ordered flag set per document, not
//! per node. The cascade invariant lives in a single place,
//! [`StageFlags::begin`]: consuming a stage inserts every *later* stage, so
//! work invalidated early always flows downstream, and marking a late stage
//! can never resurrect an earlier one.
//!
//! The presenting side's two flags (`needs_animation_frame`,
//! `needs_raster_and_draw`) are not part of this set; they live in the commit
//! channel's signal block (see [`commit`](crate::commit)).

use bitflags::bitflags;

/// One stage of the render-side pipeline, in execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    /// Style recalculation.
    Style,
    /// Box layout (geometry).
    Layout,
    /// Display-list production.
    Paint,
    /// Layer assignment and draw-list build.
    Composite,
    /// Layer surface rasterization (runs on the presenting side).
    Raster,
    /// Draw-list execution (runs on the presenting side).
    Draw,
}

impl Stage {
    /// All stages in execution order.
    pub const ALL: [Self; 6] = [
        Self::Style,
        Self::Layout,
        Self::Paint,
        Self::Composite,
        Self::Raster,
        Self::Draw,
    ];

    /// The flag bit for this stage.
    #[must_use]
    pub const fn flag(self) -> StageFlags {
        match self {
            Self::Style => StageFlags::STYLE,
            Self::Layout => StageFlags::LAYOUT,
            Self::Paint => StageFlags::PAINT,
            Self::Composite => StageFlags::COMPOSITE,
            Self::Raster => StageFlags::RASTER,
            Self::Draw => StageFlags::DRAW,
        }
    }

    /// Flags for every stage strictly after this one.
    #[must_use]
    pub const fn later(self) -> StageFlags {
        match self {
            Self::Style => StageFlags::LAYOUT
                .union(StageFlags::PAINT)
                .union(StageFlags::COMPOSITE)
                .union(StageFlags::RASTER)
                .union(StageFlags::DRAW),
            Self::Layout => StageFlags::PAINT
                .union(StageFlags::COMPOSITE)
                .union(StageFlags::RASTER)
                .union(StageFlags::DRAW),
            Self::Paint => StageFlags::COMPOSITE
                .union(StageFlags::RASTER)
                .union(StageFlags::DRAW),
            Self::Composite => StageFlags::RASTER.union(StageFlags::DRAW),
            Self::Raster => StageFlags::DRAW,
            Self::Draw => StageFlags::empty(),
        }
    }
}

bitflags! {
    /// The set of pipeline stages that need to run.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct StageFlags: u8 {
        /// Style recalculation is pending.
        const STYLE = 1 << 0;
        /// Layout is pending.
        const LAYOUT = 1 << 1;
        /// Paint is pending.
        const PAINT = 1 << 2;
        /// Compositing is pending.
        const COMPOSITE = 1 << 3;
        /// Rasterization is pending.
        const RASTER = 1 << 4;
        /// Drawing is pending.
        const DRAW = 1 << 5;
    }
}

impl StageFlags {
    /// Marks a single stage as needing to run.
    ///
    /// Marking never touches earlier stages; the downstream stages are
    /// inserted when the marked stage is [consumed](Self::begin).
    pub fn mark(&mut self, stage: Stage) {
        self.insert(stage.flag());
    }

    /// Returns whether the stage is currently marked.
    #[must_use]
    pub fn needs(&self, stage: Stage) -> bool {
        self.contains(stage.flag())
    }

    /// Consumes a stage at the start of running it.
    ///
    /// If the stage was marked, clears it, inserts every later stage (the
    /// cascade), and returns `true`. If it was not marked, returns `false`
    /// and changes nothing.
    pub fn begin(&mut self, stage: Stage) -> bool {
        if !self.contains(stage.flag()) {
            return false;
        }
        self.remove(stage.flag());
        self.insert(stage.later());
        true
    }
}
