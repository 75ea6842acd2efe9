// Copyright 2026 the Varve Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The render thread's frame-production pipeline.
//!
//! [`Pipeline`] owns everything the render thread knows about one document:
//! its dirty-stage flags, its animation driver, the scroll offset it was last
//! handed, and the [`DocumentDelegate`] — the seam to the style, layout, and
//! paint collaborators this crate treats as external.
//!
//! [`Pipeline::produce_frame`] is the body of the "produce frame" task. It
//! runs the animation driver, drains the stage flags in order (each consumed
//! stage cascading into the later ones), and packages the result as a
//! [`CommitPayload`]: a full frame when layer assignment ran, a
//! composited-update map when only blend parameters moved, or neither when
//! nothing changed at all.

use rustc_hash::FxHashMap;

use crate::animate::{AnimatedProperty, AnimationDriver, PropertyUpdate};
use crate::commit::CommitPayload;
use crate::compositor;
use crate::dirty::{Stage, StageFlags};
use crate::display::{BlendMode, DisplayList, EffectCommand};
use crate::trace::{CompositeEvent, FramePath, FrameProducedEvent, Tracer};

/// The content-side collaborators the pipeline drives.
///
/// Style, layout, and paint are out of scope for this crate; a delegate
/// supplies their outputs. Methods are only called for stages the dirty
/// flags say need to run.
pub trait DocumentDelegate: Send {
    /// Recalculates styles.
    fn style(&mut self);

    /// Runs layout and returns the total content height.
    fn layout(&mut self) -> f64;

    /// Paints the styled, laid-out tree into a fresh display list.
    fn paint(&mut self) -> DisplayList;

    /// Receives one advanced animation value before the frame's stages run,
    /// so the repainted tree reflects it.
    fn apply_animation(&mut self, update: PropertyUpdate) {
        _ = update;
    }
}

/// Render-thread state for one document.
pub struct Pipeline {
    url: String,
    delegate: Box<dyn DocumentDelegate>,
    flags: StageFlags,
    driver: AnimationDriver,
    viewport_height: f64,
    content_height: f64,
    scroll: f64,
    scroll_changed: bool,
    pending_updates: FxHashMap<crate::display::ContentKey, EffectCommand>,
    update_eligible: bool,
    has_composited: bool,
    frame_index: u64,
}

impl core::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Pipeline")
            .field("url", &self.url)
            .field("flags", &self.flags)
            .field("frame_index", &self.frame_index)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Creates a pipeline for a freshly loaded document.
    ///
    /// The first produced frame runs the full cascade from style.
    #[must_use]
    pub fn new(url: String, delegate: Box<dyn DocumentDelegate>, viewport_height: f64) -> Self {
        let mut flags = StageFlags::empty();
        flags.mark(Stage::Style);
        Self {
            url,
            delegate,
            flags,
            driver: AnimationDriver::new(),
            viewport_height,
            content_height: 0.0,
            scroll: 0.0,
            scroll_changed: false,
            pending_updates: FxHashMap::default(),
            update_eligible: true,
            has_composited: false,
            frame_index: 0,
        }
    }

    /// The document URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The animation driver, for starting animations and frame callbacks.
    pub fn driver_mut(&mut self) -> &mut AnimationDriver {
        &mut self.driver
    }

    /// Marks a pipeline stage dirty.
    ///
    /// Any external invalidation may have changed layer content or geometry,
    /// so it also forfeits composited-update eligibility for the next frame.
    pub fn set_needs(&mut self, stage: Stage) {
        self.flags.mark(stage);
        self.update_eligible = false;
    }

    /// Swaps in a new document after navigation.
    ///
    /// All per-document state is reset; the next frame runs the full cascade.
    pub fn replace_document(&mut self, url: String, delegate: Box<dyn DocumentDelegate>) {
        self.url = url;
        self.delegate = delegate;
        self.flags = StageFlags::empty();
        self.flags.mark(Stage::Style);
        self.driver = AnimationDriver::new();
        self.pending_updates.clear();
        self.update_eligible = true;
        self.has_composited = false;
        self.content_height = 0.0;
        self.scroll = 0.0;
        self.scroll_changed = false;
    }

    /// Produces one frame.
    ///
    /// `requested_scroll` is the control thread's current offset; the
    /// pipeline adopts it, clamps it against the laid-out content height,
    /// and reports the value back only if clamping changed it.
    #[expect(
        clippy::cast_possible_truncation,
        reason = "layer and draw-node counts fit u32 comfortably"
    )]
    pub fn produce_frame(
        &mut self,
        requested_scroll: Option<f64>,
        tracer: &mut Tracer<'_>,
    ) -> CommitPayload {
        self.frame_index += 1;

        if let Some(offset) = requested_scroll {
            self.scroll = offset;
            self.scroll_changed = false;
        }

        let mut advanced = Vec::new();
        self.driver.run_frame(&mut advanced);
        self.apply_property_updates(advanced);

        if self.flags.begin(Stage::Style) {
            self.delegate.style();
        }
        if self.flags.begin(Stage::Layout) {
            self.content_height = self.delegate.layout();
        }

        let clamped = clamp_scroll(self.scroll, self.content_height, self.viewport_height);
        if clamped != self.scroll {
            self.scroll = clamped;
            self.scroll_changed = true;
        }

        let display_list = if self.flags.begin(Stage::Paint) {
            Some(self.delegate.paint())
        } else {
            None
        };

        let mut frame = None;
        let mut updates = FxHashMap::default();
        let mut path = FramePath::Unchanged;
        if self.flags.begin(Stage::Composite) {
            let fast_path =
                self.update_eligible && self.has_composited && !self.pending_updates.is_empty();
            if fast_path {
                updates = core::mem::take(&mut self.pending_updates);
                path = FramePath::CompositedUpdate;
            } else if let Some(list) = &display_list {
                let output = compositor::composite(list);
                tracer.composite(&CompositeEvent {
                    frame_index: self.frame_index,
                    layer_count: output.layers.len() as u32,
                    draw_nodes: output.draw_list.len() as u32,
                });
                self.pending_updates.clear();
                self.has_composited = true;
                frame = Some(output);
                path = FramePath::Full;
            }
        }
        // Raster and draw run on the presenting side; consuming them here
        // keeps the cascade accounting closed.
        let _ = self.flags.begin(Stage::Raster);
        let _ = self.flags.begin(Stage::Draw);
        self.update_eligible = true;

        tracer.frame_produced(&FrameProducedEvent {
            frame_index: self.frame_index,
            path,
        });

        CommitPayload {
            url: self.url.clone(),
            scroll: self.scroll_changed.then_some(self.scroll),
            content_height: self.content_height,
            frame,
            updates,
            wants_animation_frame: self.driver.frame_requested(),
            frame_index: self.frame_index,
            epoch: 0,
        }
    }

    #[expect(
        clippy::cast_possible_truncation,
        reason = "opacity narrows to f32 by design"
    )]
    fn apply_property_updates(&mut self, advanced: Vec<PropertyUpdate>) {
        for update in advanced {
            self.delegate.apply_animation(update);
            match update.property {
                AnimatedProperty::Opacity => {
                    // Compositable: repaint, but the existing layers and
                    // surfaces stay valid — only the cloned blend's
                    // parameters move.
                    self.flags.mark(Stage::Paint);
                    self.pending_updates.insert(
                        update.key,
                        EffectCommand::Blend {
                            opacity: update.value as f32,
                            mode: BlendMode::SourceOver,
                            clip: None,
                        },
                    );
                }
                AnimatedProperty::Height => {
                    // Geometry invalidates layer bounds; the whole pipeline
                    // from layout on must run again.
                    self.flags.mark(Stage::Layout);
                    self.update_eligible = false;
                }
            }
        }
    }
}

/// Clamps a scroll offset to the scrollable range of the document.
fn clamp_scroll(offset: f64, content_height: f64, viewport_height: f64) -> f64 {
    offset.clamp(0.0, (content_height - viewport_height).max(0.0))
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use kurbo::Rect;

    use super::*;
    use crate::display::{Color, ContentKey, PaintCommand};

    type CallLog = Arc<Mutex<Vec<&'static str>>>;

    struct TestDelegate {
        log: CallLog,
        height: f64,
        keyed_opacity: Option<(ContentKey, f64)>,
    }

    impl TestDelegate {
        fn plain(log: CallLog, height: f64) -> Box<Self> {
            Box::new(Self {
                log,
                height,
                keyed_opacity: None,
            })
        }

        fn with_opacity_group(log: CallLog, height: f64, key: ContentKey) -> Box<Self> {
            Box::new(Self {
                log,
                height,
                keyed_opacity: Some((key, 0.1)),
            })
        }
    }

    impl DocumentDelegate for TestDelegate {
        fn style(&mut self) {
            self.log.lock().unwrap().push("style");
        }

        fn layout(&mut self) -> f64 {
            self.log.lock().unwrap().push("layout");
            self.height
        }

        fn paint(&mut self) -> DisplayList {
            self.log.lock().unwrap().push("paint");
            let mut list = DisplayList::new();
            let parent = self.keyed_opacity.map(|(key, opacity)| {
                list.push_effect(
                    EffectCommand::Blend {
                        opacity: opacity as f32,
                        mode: BlendMode::SourceOver,
                        clip: None,
                    },
                    Some(key),
                    None,
                )
            });
            list.push_paint(
                PaintCommand::FillRect {
                    color: Color::BLACK,
                },
                Rect::new(0.0, 0.0, 100.0, 100.0),
                parent,
            );
            list
        }

        fn apply_animation(&mut self, update: PropertyUpdate) {
            if let Some((key, opacity)) = &mut self.keyed_opacity {
                if *key == update.key {
                    *opacity = update.value;
                }
            }
        }
    }

    fn log() -> CallLog {
        Arc::new(Mutex::new(Vec::new()))
    }

    #[test]
    fn first_frame_runs_the_full_cascade_in_order() {
        let calls = log();
        let mut pipeline = Pipeline::new(
            "about:blank".into(),
            TestDelegate::plain(Arc::clone(&calls), 800.0),
            600.0,
        );

        let payload = pipeline.produce_frame(Some(0.0), &mut Tracer::none());

        assert_eq!(*calls.lock().unwrap(), vec!["style", "layout", "paint"]);
        assert!(payload.frame.is_some());
        assert!(payload.updates.is_empty());
        assert_eq!(payload.content_height, 800.0);
    }

    #[test]
    fn marking_paint_skips_style_and_layout() {
        let calls = log();
        let mut pipeline = Pipeline::new(
            "about:blank".into(),
            TestDelegate::plain(Arc::clone(&calls), 800.0),
            600.0,
        );
        let _ = pipeline.produce_frame(Some(0.0), &mut Tracer::none());
        calls.lock().unwrap().clear();

        pipeline.set_needs(Stage::Paint);
        let payload = pipeline.produce_frame(Some(0.0), &mut Tracer::none());

        assert_eq!(*calls.lock().unwrap(), vec!["paint"]);
        assert!(payload.frame.is_some(), "external paint invalidation recomposites");
    }

    #[test]
    fn unchanged_frame_commits_neither_frame_nor_updates() {
        let calls = log();
        let mut pipeline = Pipeline::new(
            "about:blank".into(),
            TestDelegate::plain(Arc::clone(&calls), 800.0),
            600.0,
        );
        let _ = pipeline.produce_frame(Some(0.0), &mut Tracer::none());
        calls.lock().unwrap().clear();

        let payload = pipeline.produce_frame(Some(0.0), &mut Tracer::none());
        assert!(calls.lock().unwrap().is_empty(), "no stage ran");
        assert!(payload.is_unchanged());
    }

    #[test]
    fn opacity_animation_takes_the_composited_update_path() {
        let calls = log();
        let key = ContentKey(11);
        let mut pipeline = Pipeline::new(
            "about:blank".into(),
            TestDelegate::with_opacity_group(Arc::clone(&calls), 800.0, key),
            600.0,
        );
        let _ = pipeline.produce_frame(Some(0.0), &mut Tracer::none());

        pipeline.driver_mut().animate(
            key,
            AnimatedProperty::Opacity,
            crate::animate::Animation::new(0.1, 0.999, 120),
        );
        let payload = pipeline.produce_frame(Some(0.0), &mut Tracer::none());

        assert!(payload.frame.is_none(), "no recomposite on the fast path");
        assert_eq!(payload.updates.len(), 1);
        let EffectCommand::Blend { opacity, .. } = payload.updates[&key] else {
            panic!("update must be a blend");
        };
        let expected = 0.1 + (0.999 - 0.1) / 120.0;
        assert!((f64::from(opacity) - expected).abs() < 1e-6);
        assert!(
            payload.wants_animation_frame,
            "119 frames to go, the driver wants the next one"
        );
    }

    #[test]
    fn geometry_animation_forces_the_full_path() {
        let calls = log();
        let key = ContentKey(12);
        let mut pipeline = Pipeline::new(
            "about:blank".into(),
            TestDelegate::plain(Arc::clone(&calls), 800.0),
            600.0,
        );
        let _ = pipeline.produce_frame(Some(0.0), &mut Tracer::none());
        calls.lock().unwrap().clear();

        pipeline.driver_mut().animate(
            key,
            AnimatedProperty::Height,
            crate::animate::Animation::new(100.0, 200.0, 10),
        );
        let payload = pipeline.produce_frame(Some(0.0), &mut Tracer::none());

        assert!(payload.frame.is_some(), "geometry invalidates layer bounds");
        assert!(payload.updates.is_empty());
        assert_eq!(*calls.lock().unwrap(), vec!["layout", "paint"]);
    }

    #[test]
    fn scroll_is_clamped_and_reported_only_when_overridden() {
        let calls = log();
        let mut pipeline = Pipeline::new(
            "about:blank".into(),
            TestDelegate::plain(Arc::clone(&calls), 1000.0),
            600.0,
        );

        let payload = pipeline.produce_frame(Some(2000.0), &mut Tracer::none());
        assert_eq!(payload.scroll, Some(400.0), "clamped to the scrollable range");

        let payload = pipeline.produce_frame(Some(100.0), &mut Tracer::none());
        assert_eq!(payload.scroll, None, "in-range offsets are honored silently");
    }

    #[test]
    fn external_invalidation_forfeits_update_eligibility() {
        let calls = log();
        let key = ContentKey(13);
        let mut pipeline = Pipeline::new(
            "about:blank".into(),
            TestDelegate::with_opacity_group(Arc::clone(&calls), 800.0, key),
            600.0,
        );
        let _ = pipeline.produce_frame(Some(0.0), &mut Tracer::none());

        pipeline.driver_mut().animate(
            key,
            AnimatedProperty::Opacity,
            crate::animate::Animation::new(0.1, 0.999, 120),
        );
        // A style invalidation in the same frame interval means the layer
        // set may change; the cheap path would patch a stale draw list.
        pipeline.set_needs(Stage::Style);
        let payload = pipeline.produce_frame(Some(0.0), &mut Tracer::none());

        assert!(payload.frame.is_some());
        assert!(payload.updates.is_empty());
    }

    #[test]
    fn replace_document_restarts_the_cascade() {
        let calls = log();
        let mut pipeline = Pipeline::new(
            "about:blank".into(),
            TestDelegate::plain(Arc::clone(&calls), 800.0),
            600.0,
        );
        let _ = pipeline.produce_frame(Some(0.0), &mut Tracer::none());
        calls.lock().unwrap().clear();

        pipeline.replace_document(
            "https://example.org/next".into(),
            TestDelegate::plain(Arc::clone(&calls), 400.0),
        );
        assert_eq!(pipeline.url(), "https://example.org/next");

        let payload = pipeline.produce_frame(Some(0.0), &mut Tracer::none());
        assert_eq!(*calls.lock().unwrap(), vec!["style", "layout", "paint"]);
        assert!(payload.frame.is_some());
        assert_eq!(payload.content_height, 400.0);
    }
}
