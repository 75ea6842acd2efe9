// Copyright 2026 the Varve Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Display-list arena: the painted description of one frame.
//!
//! A display list is an ordered tree of commands produced by the paint stage
//! and consumed by the compositor. Nodes live in a flat vector and refer to
//! each other by [`NodeId`] index handles; parent back-pointers are plain
//! indices, so the tree has no cyclic ownership.
//!
//! The node payload is a closed union:
//!
//! - [`PaintCommand`] — a drawable leaf (rectangle fills and strokes). The
//!   geometry lives on the node's bounds.
//! - [`EffectCommand`] — an interior node whose children are drawn through a
//!   visual effect: a 2D translation, or a blend (opacity, blend mode, and an
//!   optional clip rectangle).
//!
//! Effect bounds are maintained incrementally: attaching a child unions its
//! bounds into every ancestor, so an effect's bounds always contain the union
//! of its children's bounds.
//!
//! [`ContentKey`] tags a node with an opaque content identity. Keys originate
//! on the render thread and cross to the control thread as plain integers;
//! they are compared, never dereferenced.

use core::fmt;

use kurbo::{Rect, Vec2};

/// An 8-bit RGBA color.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Color {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
    /// Alpha channel (255 = opaque).
    pub a: u8,
}

impl Color {
    /// Opaque white.
    pub const WHITE: Self = Self::rgb(255, 255, 255);
    /// Opaque black.
    pub const BLACK: Self = Self::rgb(0, 0, 0);
    /// Fully transparent.
    pub const TRANSPARENT: Self = Self::rgba(0, 0, 0, 0);

    /// Creates an opaque color from RGB channels.
    #[must_use]
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Creates a color from RGBA channels.
    #[must_use]
    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }
}

/// Opaque identity of the content a display node came from.
///
/// The render thread assigns keys from its own node table. The control thread
/// treats them as bare integers for matching composited updates; it never
/// follows them back into render-thread state.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentKey(pub u64);

impl fmt::Debug for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentKey({})", self.0)
    }
}

/// Blend mode for compositing a subtree over what is beneath it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BlendMode {
    /// Standard source-over alpha compositing.
    #[default]
    SourceOver,
    /// Multiply blend.
    Multiply,
    /// Screen blend.
    Screen,
}

/// A drawable leaf command. Geometry lives on the owning node's bounds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PaintCommand {
    /// Fills the node's bounds with a solid color.
    FillRect {
        /// Fill color.
        color: Color,
    },
    /// Strokes the border of the node's bounds.
    StrokeRect {
        /// Stroke color.
        color: Color,
        /// Stroke width in pixels, drawn inside the bounds.
        width: f64,
    },
}

/// A visual effect applied to a subtree at draw time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum EffectCommand {
    /// Translates children by an offset.
    Transform {
        /// Offset applied to children, in the parent's coordinate space.
        translation: Vec2,
    },
    /// Draws children as a group with opacity, a blend mode, and an optional
    /// clip rectangle (in the effect's own coordinate space).
    Blend {
        /// Group opacity (1.0 = opaque).
        opacity: f32,
        /// How the group composites over content beneath it.
        mode: BlendMode,
        /// Clip applied to the group, if any.
        clip: Option<Rect>,
    },
}

impl EffectCommand {
    /// Returns whether the effect does real work at draw time.
    ///
    /// An identity transform or a plain source-over group with full opacity
    /// and no clip is visually a no-op; such effects never force compositing
    /// on their own.
    #[must_use]
    pub fn is_real(&self) -> bool {
        match *self {
            Self::Transform { translation } => translation.x != 0.0 || translation.y != 0.0,
            Self::Blend {
                opacity,
                mode,
                clip,
            } => opacity != 1.0 || mode != BlendMode::SourceOver || clip.is_some(),
        }
    }

    /// Maps a rectangle from this effect's child space into its parent space.
    #[must_use]
    pub fn map_up(&self, rect: Rect) -> Rect {
        match *self {
            Self::Transform { translation } => rect + translation,
            Self::Blend { clip, .. } => clip.map_or(rect, |c| intersect(rect, c)),
        }
    }

    /// Maps a rectangle from this effect's parent space into its child space.
    ///
    /// The inverse of [`map_up`](Self::map_up): translations are undone and
    /// clips still intersect (a clip constrains visibility in both
    /// directions).
    #[must_use]
    pub fn map_down(&self, rect: Rect) -> Rect {
        match *self {
            Self::Transform { translation } => rect - translation,
            Self::Blend { clip, .. } => clip.map_or(rect, |c| intersect(rect, c)),
        }
    }
}

/// The payload of a display node.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DisplayItem {
    /// A drawable leaf.
    Paint(PaintCommand),
    /// A visual effect with children.
    Effect(EffectCommand),
}

/// A handle to a node in a [`DisplayList`].
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    /// Returns the raw slot index (for diagnostics only).
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

/// One node of the display list.
#[derive(Clone, Debug)]
pub struct DisplayNode {
    /// The command payload.
    pub item: DisplayItem,
    /// Bounds in the node's local (painted) coordinate space. For effects
    /// this is the running union of the children's bounds.
    pub bounds: Rect,
    /// Opaque content identity, if the node tracks one.
    pub key: Option<ContentKey>,
    /// Parent node, if attached.
    pub parent: Option<NodeId>,
    /// Ordered children. Always empty for paint leaves.
    pub children: Vec<NodeId>,
}

/// The painted output of one frame: a forest of effect/paint trees stored in
/// a flat arena.
///
/// Built once per paint pass, consumed by the compositor, then discarded.
#[derive(Clone, Debug, Default)]
pub struct DisplayList {
    nodes: Vec<DisplayNode>,
}

impl DisplayList {
    /// Creates an empty display list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes in the list.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns whether the list has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Appends a paint leaf with the given bounds.
    ///
    /// # Panics
    ///
    /// Panics if `parent` refers to a paint leaf (only effects have
    /// children).
    pub fn push_paint(
        &mut self,
        command: PaintCommand,
        bounds: Rect,
        parent: Option<NodeId>,
    ) -> NodeId {
        self.push_node(DisplayItem::Paint(command), bounds, None, parent)
    }

    /// Appends an effect node with empty initial bounds.
    ///
    /// Bounds grow as children are attached.
    ///
    /// # Panics
    ///
    /// Panics if `parent` refers to a paint leaf.
    pub fn push_effect(
        &mut self,
        effect: EffectCommand,
        key: Option<ContentKey>,
        parent: Option<NodeId>,
    ) -> NodeId {
        self.push_node(DisplayItem::Effect(effect), Rect::ZERO, key, parent)
    }

    fn push_node(
        &mut self,
        item: DisplayItem,
        bounds: Rect,
        key: Option<ContentKey>,
        parent: Option<NodeId>,
    ) -> NodeId {
        let id = NodeId(u32::try_from(self.nodes.len()).expect("display list too large"));
        if let Some(p) = parent {
            assert!(
                matches!(self.node(p).item, DisplayItem::Effect(_)),
                "paint leaves cannot have children"
            );
            self.nodes[p.0 as usize].children.push(id);
        }
        self.nodes.push(DisplayNode {
            item,
            bounds,
            key,
            parent,
            children: Vec::new(),
        });
        self.grow_ancestor_bounds(parent, bounds);
        id
    }

    /// Unions `bounds` into every ancestor starting at `from`, mapping
    /// through each effect on the way up.
    fn grow_ancestor_bounds(&mut self, from: Option<NodeId>, bounds: Rect) {
        let mut rect = bounds;
        let mut cursor = from;
        while let Some(id) = cursor {
            let node = &mut self.nodes[id.0 as usize];
            node.bounds = union(node.bounds, rect);
            let DisplayItem::Effect(effect) = node.item else {
                unreachable!("paint leaf in ancestor chain");
            };
            rect = effect.map_up(node.bounds);
            cursor = node.parent;
        }
    }

    /// Returns a node by handle.
    ///
    /// # Panics
    ///
    /// Panics if the handle is out of range.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &DisplayNode {
        &self.nodes[id.0 as usize]
    }

    /// Iterates over all node handles in insertion (document) order.
    #[expect(
        clippy::cast_possible_truncation,
        reason = "push_node already rejects lists larger than u32"
    )]
    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len()).map(|i| NodeId(i as u32))
    }

    /// Returns the chain of ancestors of `id`, nearest first.
    #[must_use]
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut chain = Vec::new();
        let mut cursor = self.node(id).parent;
        while let Some(a) = cursor {
            chain.push(a);
            cursor = self.node(a).parent;
        }
        chain
    }

    /// Maps the node's bounds through every ancestor effect into the root
    /// (absolute) coordinate space.
    #[must_use]
    pub fn absolute_bounds(&self, id: NodeId) -> Rect {
        let mut rect = self.node(id).bounds;
        let mut cursor = self.node(id).parent;
        while let Some(a) = cursor {
            let node = self.node(a);
            if let DisplayItem::Effect(effect) = node.item {
                rect = effect.map_up(rect);
            }
            cursor = node.parent;
        }
        rect
    }

    /// Maps an absolute-space rectangle down into the local space of `id`
    /// (the space the node's own bounds are expressed in), applying ancestor
    /// clips on the way.
    #[must_use]
    pub fn absolute_to_local(&self, rect: Rect, id: NodeId) -> Rect {
        let chain = self.ancestors(id);
        let mut out = rect;
        // Apply outermost ancestors first.
        for &a in chain.iter().rev() {
            if let DisplayItem::Effect(effect) = self.node(a).item {
                out = effect.map_down(out);
            }
        }
        out
    }
}

/// Union of two rectangles where a degenerate rect is treated as empty.
pub(crate) fn union(a: Rect, b: Rect) -> Rect {
    if is_empty(a) {
        b
    } else if is_empty(b) {
        a
    } else {
        a.union(b)
    }
}

/// Intersection of two rectangles, empty ([`Rect::ZERO`]) when disjoint.
pub(crate) fn intersect(a: Rect, b: Rect) -> Rect {
    let x0 = a.x0.max(b.x0);
    let y0 = a.y0.max(b.y0);
    let x1 = a.x1.min(b.x1);
    let y1 = a.y1.min(b.y1);
    if x1 <= x0 || y1 <= y0 {
        Rect::ZERO
    } else {
        Rect::new(x0, y0, x1, y1)
    }
}

/// Returns whether the rectangle covers no area.
pub(crate) fn is_empty(rect: Rect) -> bool {
    rect.x1 <= rect.x0 || rect.y1 <= rect.y0
}

/// Returns whether two rectangles cover a common area.
pub(crate) fn overlaps(a: Rect, b: Rect) -> bool {
    !is_empty(intersect(a, b))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Rect {
        Rect::new(x0, y0, x1, y1)
    }

    #[test]
    fn paint_leaf_carries_bounds() {
        let mut dl = DisplayList::new();
        let id = dl.push_paint(
            PaintCommand::FillRect {
                color: Color::BLACK,
            },
            rect(10.0, 10.0, 20.0, 20.0),
            None,
        );
        assert_eq!(dl.node(id).bounds, rect(10.0, 10.0, 20.0, 20.0));
        assert!(dl.node(id).children.is_empty());
    }

    #[test]
    fn effect_bounds_union_children_incrementally() {
        let mut dl = DisplayList::new();
        let group = dl.push_effect(
            EffectCommand::Blend {
                opacity: 0.5,
                mode: BlendMode::SourceOver,
                clip: None,
            },
            None,
            None,
        );
        dl.push_paint(
            PaintCommand::FillRect {
                color: Color::BLACK,
            },
            rect(0.0, 0.0, 10.0, 10.0),
            Some(group),
        );
        assert_eq!(dl.node(group).bounds, rect(0.0, 0.0, 10.0, 10.0));

        dl.push_paint(
            PaintCommand::FillRect {
                color: Color::WHITE,
            },
            rect(30.0, 30.0, 40.0, 40.0),
            Some(group),
        );
        assert_eq!(dl.node(group).bounds, rect(0.0, 0.0, 40.0, 40.0));
    }

    #[test]
    fn nested_effect_bounds_map_through_translation() {
        let mut dl = DisplayList::new();
        let outer = dl.push_effect(
            EffectCommand::Transform {
                translation: Vec2::new(100.0, 0.0),
            },
            None,
            None,
        );
        let inner = dl.push_effect(
            EffectCommand::Transform {
                translation: Vec2::new(0.0, 50.0),
            },
            None,
            Some(outer),
        );
        let leaf = dl.push_paint(
            PaintCommand::FillRect {
                color: Color::BLACK,
            },
            rect(0.0, 0.0, 10.0, 10.0),
            Some(inner),
        );

        // Inner bounds hold the leaf; outer bounds hold the translated inner.
        assert_eq!(dl.node(inner).bounds, rect(0.0, 0.0, 10.0, 10.0));
        assert_eq!(dl.node(outer).bounds, rect(0.0, 50.0, 10.0, 60.0));
        assert_eq!(dl.absolute_bounds(leaf), rect(100.0, 50.0, 110.0, 60.0));
    }

    #[test]
    fn absolute_bounds_respect_ancestor_clip() {
        let mut dl = DisplayList::new();
        let clipped = dl.push_effect(
            EffectCommand::Blend {
                opacity: 1.0,
                mode: BlendMode::SourceOver,
                clip: Some(rect(0.0, 0.0, 5.0, 5.0)),
            },
            None,
            None,
        );
        let leaf = dl.push_paint(
            PaintCommand::FillRect {
                color: Color::BLACK,
            },
            rect(0.0, 0.0, 10.0, 10.0),
            Some(clipped),
        );
        assert_eq!(dl.absolute_bounds(leaf), rect(0.0, 0.0, 5.0, 5.0));
    }

    #[test]
    fn absolute_to_local_inverts_translation() {
        let mut dl = DisplayList::new();
        let moved = dl.push_effect(
            EffectCommand::Transform {
                translation: Vec2::new(7.0, 3.0),
            },
            None,
            None,
        );
        let leaf = dl.push_paint(
            PaintCommand::FillRect {
                color: Color::BLACK,
            },
            rect(1.0, 1.0, 2.0, 2.0),
            Some(moved),
        );
        let abs = dl.absolute_bounds(leaf);
        assert_eq!(abs, rect(8.0, 4.0, 9.0, 5.0));
        assert_eq!(dl.absolute_to_local(abs, leaf), rect(1.0, 1.0, 2.0, 2.0));
    }

    #[test]
    fn ancestors_nearest_first() {
        let mut dl = DisplayList::new();
        let a = dl.push_effect(
            EffectCommand::Transform {
                translation: Vec2::ZERO,
            },
            None,
            None,
        );
        let b = dl.push_effect(
            EffectCommand::Transform {
                translation: Vec2::ZERO,
            },
            None,
            Some(a),
        );
        let leaf = dl.push_paint(
            PaintCommand::FillRect {
                color: Color::BLACK,
            },
            rect(0.0, 0.0, 1.0, 1.0),
            Some(b),
        );
        assert_eq!(dl.ancestors(leaf), vec![b, a]);
    }

    #[test]
    #[should_panic(expected = "paint leaves cannot have children")]
    fn paint_parent_panics() {
        let mut dl = DisplayList::new();
        let leaf = dl.push_paint(
            PaintCommand::FillRect {
                color: Color::BLACK,
            },
            rect(0.0, 0.0, 1.0, 1.0),
            None,
        );
        let _ = dl.push_paint(
            PaintCommand::FillRect {
                color: Color::WHITE,
            },
            rect(0.0, 0.0, 1.0, 1.0),
            Some(leaf),
        );
    }

    #[test]
    fn identity_effects_are_not_real() {
        assert!(
            !EffectCommand::Transform {
                translation: Vec2::ZERO
            }
            .is_real()
        );
        assert!(
            !EffectCommand::Blend {
                opacity: 1.0,
                mode: BlendMode::SourceOver,
                clip: None
            }
            .is_real()
        );
        assert!(
            EffectCommand::Transform {
                translation: Vec2::new(1.0, 0.0)
            }
            .is_real()
        );
        assert!(
            EffectCommand::Blend {
                opacity: 0.5,
                mode: BlendMode::SourceOver,
                clip: None
            }
            .is_real()
        );
        assert!(
            EffectCommand::Blend {
                opacity: 1.0,
                mode: BlendMode::SourceOver,
                clip: Some(rect(0.0, 0.0, 1.0, 1.0))
            }
            .is_real()
        );
    }

    #[test]
    fn empty_rect_helpers() {
        assert!(is_empty(Rect::ZERO));
        assert!(!is_empty(rect(0.0, 0.0, 1.0, 1.0)));
        assert!(overlaps(rect(0.0, 0.0, 2.0, 2.0), rect(1.0, 1.0, 3.0, 3.0)));
        assert!(!overlaps(rect(0.0, 0.0, 1.0, 1.0), rect(1.0, 0.0, 2.0, 1.0)));
        assert_eq!(
            intersect(rect(0.0, 0.0, 1.0, 1.0), rect(5.0, 5.0, 6.0, 6.0)),
            Rect::ZERO
        );
        // Union ignores the empty rect rather than stretching to the origin.
        assert_eq!(
            union(Rect::ZERO, rect(50.0, 50.0, 60.0, 60.0)),
            rect(50.0, 50.0, 60.0, 60.0)
        );
    }
}
