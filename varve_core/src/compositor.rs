// Copyright 2026 the Varve Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Layer assignment and draw-list construction.
//!
//! The compositor consumes one frame's painted [`DisplayList`] and partitions
//! its drawable content into the smallest set of [`LayerContent`]s that
//! preserves paint order, then builds the [`DrawList`] that recombines those
//! layers with the effects that must still execute at draw time.
//!
//! The pass works in document order:
//!
//! 1. Mark every effect `needs_compositing` bottom-up: an effect composites
//!    when it does [real work](crate::display::EffectCommand::is_real) or
//!    when any child composites.
//! 2. Flatten the tree into *non-composited commands*: nodes that do not
//!    composite themselves but sit directly under a compositing ancestor (or
//!    at the root). These are the boundaries where caching starts.
//! 3. Assign each command to a layer, walking existing layers in **reverse
//!    creation order**: merge into the first layer whose content shares the
//!    exact same effect-ancestor chain; stop and open a new layer as soon as
//!    an existing layer's absolute bounds intersect the command's. Later
//!    content may never move behind an earlier layer, so only the most
//!    recent compatible layer is a legal merge target.
//! 4. Size each layer to the clip-aware union of its items' bounds mapped
//!    into the layer's local space, outset by one unit.
//! 5. Build the draw list: one `Surface` leaf per layer, then clone each
//!    distinct composited ancestor exactly once, re-parenting accumulated
//!    children. Layers sharing an ancestor effect share its single clone;
//!    duplicating it would apply opacity or blending twice.
//!
//! When only effect parameters changed since the last full pass, the whole
//! pipeline above is skipped and the existing draw list is patched in place
//! with [`DrawList::apply_update`] — no layer is touched, no surface
//! rerasterized.

use core::fmt;

use kurbo::Rect;
use rustc_hash::FxHashMap;
use std::hash::Hasher;

use crate::display::{
    self, ContentKey, DisplayItem, DisplayList, EffectCommand, NodeId, PaintCommand,
};

/// One paint command owned by a composited layer, in layer-local coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LayerPaint {
    /// The drawable command.
    pub command: PaintCommand,
    /// Bounds in the layer's local (painted) coordinate space.
    pub bounds: Rect,
}

/// Self-contained content of one composited layer.
///
/// Produced by [`composite`] and shipped across the commit channel as a
/// value: it owns its paint commands and carries no references back into the
/// render thread's display list.
#[derive(Clone, Debug, PartialEq)]
pub struct LayerContent {
    items: Vec<LayerPaint>,
    absolute_bounds: Rect,
    bounds: Rect,
    generation: u64,
}

impl LayerContent {
    /// The layer's paint commands in paint order.
    #[must_use]
    pub fn items(&self) -> &[LayerPaint] {
        &self.items
    }

    /// Union of the items' absolute bounds (the layer's footprint in the
    /// output).
    #[must_use]
    pub fn absolute_bounds(&self) -> Rect {
        self.absolute_bounds
    }

    /// Cache bounds in layer-local space: the clip-aware union of the items'
    /// visible extents, outset by one unit. Surfaces are allocated at this
    /// size; an empty rect means nothing survives clipping and no surface is
    /// ever allocated.
    #[must_use]
    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    /// Hash of the layer's content. Two layers with equal bounds and equal
    /// generation raster identically, so a cached surface can be reused.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// A handle to a node in a [`DrawList`].
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct DrawId(u32);

impl DrawId {
    /// Returns the raw slot index (for diagnostics only).
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for DrawId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DrawId({})", self.0)
    }
}

/// The payload of a draw-list node.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DrawKind {
    /// Draw the composited layer at this index in the pass's layer list.
    Surface(usize),
    /// Execute a cloned visual effect over the children.
    Effect(EffectCommand),
}

/// One node of the draw list.
#[derive(Clone, Debug, PartialEq)]
pub struct DrawNode {
    /// The node payload.
    pub kind: DrawKind,
    /// Content identity carried over from the cloned effect, if any.
    pub key: Option<ContentKey>,
    /// Ordered children (empty for `Surface` leaves).
    pub children: Vec<DrawId>,
}

/// The per-frame tree executed to produce the final image: cloned effects
/// with "draw this layer" leaves.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DrawList {
    nodes: Vec<DrawNode>,
    roots: Vec<DrawId>,
}

impl DrawList {
    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns whether the list has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The root nodes in draw order.
    #[must_use]
    pub fn roots(&self) -> &[DrawId] {
        &self.roots
    }

    /// Returns a node by handle.
    ///
    /// # Panics
    ///
    /// Panics if the handle is out of range.
    #[must_use]
    pub fn node(&self, id: DrawId) -> &DrawNode {
        &self.nodes[id.0 as usize]
    }

    /// Iterates over all node handles.
    #[expect(
        clippy::cast_possible_truncation,
        reason = "push already rejects lists larger than u32"
    )]
    pub fn ids(&self) -> impl Iterator<Item = DrawId> + '_ {
        (0..self.nodes.len()).map(|i| DrawId(i as u32))
    }

    fn push(&mut self, kind: DrawKind, key: Option<ContentKey>) -> DrawId {
        let id = DrawId(u32::try_from(self.nodes.len()).expect("draw list too large"));
        self.nodes.push(DrawNode {
            kind,
            key,
            children: Vec::new(),
        });
        id
    }

    fn attach(&mut self, parent: DrawId, child: DrawId) {
        self.nodes[parent.0 as usize].children.push(child);
    }

    /// Applies one composited update: replaces the blend parameters of the
    /// cloned effect tagged with `key`.
    ///
    /// Returns `true` if a node was patched. Updates only apply to
    /// [`EffectCommand::Blend`] nodes; a key that is absent from the list
    /// (the content vanished between frames) or that names a non-blend
    /// effect is a no-op. Applying the same update twice leaves the list in
    /// the same state as applying it once.
    pub fn apply_update(&mut self, key: ContentKey, effect: EffectCommand) -> bool {
        let EffectCommand::Blend { .. } = effect else {
            return false;
        };
        for node in &mut self.nodes {
            if node.key == Some(key) {
                if let DrawKind::Effect(existing @ EffectCommand::Blend { .. }) = &mut node.kind {
                    *existing = effect;
                    return true;
                }
            }
        }
        false
    }
}

/// The output of one full compositing pass.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameOutput {
    /// Composited layers in creation (draw) order.
    pub layers: Vec<LayerContent>,
    /// The draw list recombining the layers.
    pub draw_list: DrawList,
}

/// Runs a full compositing pass over one painted display list.
#[must_use]
pub fn composite(list: &DisplayList) -> FrameOutput {
    let needs = mark_needs_compositing(list);
    let commands = flatten(list, &needs);
    let assigned = assign_layers(list, &commands);

    let mut layers = Vec::with_capacity(assigned.len());
    let mut draw_list = DrawList::default();
    let mut cloned: FxHashMap<NodeId, DrawId> = FxHashMap::default();

    for build in &assigned {
        let index = layers.len();
        layers.push(materialize(list, build));

        // Synthesize the "draw this layer" leaf, then walk the shared effect
        // ancestry, cloning each distinct ancestor exactly once.
        let leaf = draw_list.push(DrawKind::Surface(index), None);
        let mut child = leaf;
        let mut cursor = build.parent;
        let mut rooted = false;
        while let Some(ancestor) = cursor {
            if let Some(&existing) = cloned.get(&ancestor) {
                draw_list.attach(existing, child);
                rooted = true;
                break;
            }
            let node = list.node(ancestor);
            let DisplayItem::Effect(effect) = node.item else {
                unreachable!("paint leaf in effect-ancestor chain");
            };
            let clone = draw_list.push(DrawKind::Effect(effect), node.key);
            draw_list.attach(clone, child);
            cloned.insert(ancestor, clone);
            child = clone;
            cursor = node.parent;
        }
        if !rooted {
            draw_list.roots.push(child);
        }
    }

    FrameOutput { layers, draw_list }
}

/// Step 1: bottom-up `needs_compositing` marking.
///
/// The arena assigns children higher indices than their parents, so a single
/// reverse scan visits every child before its parent.
fn mark_needs_compositing(list: &DisplayList) -> Vec<bool> {
    let mut needs = vec![false; list.len()];
    for id in list.ids().collect::<Vec<_>>().into_iter().rev() {
        let node = list.node(id);
        if let DisplayItem::Effect(effect) = node.item {
            let mut composited = effect.is_real();
            for &child in &node.children {
                composited |= needs[child.index() as usize];
            }
            needs[id.index() as usize] = composited;
        }
    }
    needs
}

/// Step 2: collect the non-composited commands in document (paint) order.
///
/// A node qualifies when it does not composite itself and sits at the root or
/// directly under a compositing ancestor. Recursion only descends through
/// compositing effects — a qualifying node's whole subtree rasters with it.
fn flatten(list: &DisplayList, needs: &[bool]) -> Vec<NodeId> {
    fn visit(list: &DisplayList, needs: &[bool], id: NodeId, out: &mut Vec<NodeId>) {
        if needs[id.index() as usize] {
            for &child in &list.node(id).children {
                visit(list, needs, child, out);
            }
        } else {
            out.push(id);
        }
    }

    let mut out = Vec::new();
    for id in list.ids() {
        if list.node(id).parent.is_none() {
            visit(list, needs, id, &mut out);
        }
    }
    out
}

struct BuildLayer {
    members: Vec<NodeId>,
    parent: Option<NodeId>,
    absolute_bounds: Rect,
}

/// Step 3: assign commands to layers with the reverse-scan merge/overlap
/// rule.
fn assign_layers(list: &DisplayList, commands: &[NodeId]) -> Vec<BuildLayer> {
    let mut layers: Vec<BuildLayer> = Vec::new();

    for &command in commands {
        let absolute = list.absolute_bounds(command);
        if display::is_empty(absolute) {
            // Nothing to draw, nothing to cache.
            continue;
        }
        let parent = list.node(command).parent;

        let mut placed = false;
        for layer in layers.iter_mut().rev() {
            if layer.parent == parent {
                layer.members.push(command);
                layer.absolute_bounds = display::union(layer.absolute_bounds, absolute);
                placed = true;
                break;
            }
            if display::overlaps(layer.absolute_bounds, absolute) {
                // Visually interleaved content may not share a layer, and
                // this command may not merge behind the layer it overlaps.
                break;
            }
        }
        if !placed {
            layers.push(BuildLayer {
                members: vec![command],
                parent,
                absolute_bounds: absolute,
            });
        }
    }
    layers
}

/// Step 4: turn an assignment into self-contained layer content with
/// clip-aware local bounds.
fn materialize(list: &DisplayList, build: &BuildLayer) -> LayerContent {
    let mut items = Vec::new();
    for &member in &build.members {
        collect_paints(list, member, &mut items);
    }

    // Map each member's absolute bounds back into layer-local space through
    // the shared effect chain. Ancestor clips intersect on the way down, so
    // the surface is sized to the visible content, not the unclipped extent.
    let mut local = Rect::ZERO;
    for &member in &build.members {
        let visible = list.absolute_to_local(list.absolute_bounds(member), member);
        local = display::union(local, visible);
    }
    let bounds = if display::is_empty(local) {
        Rect::ZERO
    } else {
        local.inflate(1.0, 1.0)
    };

    LayerContent {
        generation: content_generation(&items),
        absolute_bounds: build.absolute_bounds,
        bounds,
        items,
    }
}

/// Collects the paint leaves of a member subtree.
///
/// Members are non-compositing by construction, so any effects inside are
/// visually identity and contribute no geometry change.
fn collect_paints(list: &DisplayList, id: NodeId, out: &mut Vec<LayerPaint>) {
    let node = list.node(id);
    match node.item {
        DisplayItem::Paint(command) => out.push(LayerPaint {
            command,
            bounds: node.bounds,
        }),
        DisplayItem::Effect(_) => {
            for &child in &node.children {
                collect_paints(list, child, out);
            }
        }
    }
}

fn content_generation(items: &[LayerPaint]) -> u64 {
    let mut hasher = rustc_hash::FxHasher::default();
    for item in items {
        match item.command {
            PaintCommand::FillRect { color } => {
                hasher.write_u8(0);
                hasher.write_u32(u32::from_le_bytes([color.r, color.g, color.b, color.a]));
            }
            PaintCommand::StrokeRect { color, width } => {
                hasher.write_u8(1);
                hasher.write_u32(u32::from_le_bytes([color.r, color.g, color.b, color.a]));
                hasher.write_u64(width.to_bits());
            }
        }
        hasher.write_u64(item.bounds.x0.to_bits());
        hasher.write_u64(item.bounds.y0.to_bits());
        hasher.write_u64(item.bounds.x1.to_bits());
        hasher.write_u64(item.bounds.y1.to_bits());
    }
    hasher.finish()
}
