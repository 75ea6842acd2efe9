// Copyright 2026 the Varve Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tracing and diagnostics for the two-thread frame loop.
//!
//! [`TraceSink`] has one method per event, each defaulting to a no-op, so a
//! sink overrides only the events it wants.
//!
//! [`Tracer`] wraps an optional `&mut dyn TraceSink`. With the `trace`
//! feature disabled every `Tracer` method compiles away entirely; enabled,
//! a call costs one `Option` branch before dispatching to the sink.
//!
//! Events originate on both threads (the render thread produces and commits;
//! the control thread rasterizes and presents). [`SharedSink`] wraps any sink
//! in an `Arc<Mutex<..>>` so each thread can hold its own handle and build a
//! local [`Tracer`] from it.

use std::sync::{Arc, Mutex};

// ---------------------------------------------------------------------------
// Event structs
// ---------------------------------------------------------------------------

/// Which path a produced frame took through the pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FramePath {
    /// Full pipeline: paint, layer assignment, and a fresh draw list.
    Full,
    /// Composited update: only effect parameters in the existing draw list.
    CompositedUpdate,
    /// Nothing changed; the previous frame is reused.
    Unchanged,
}

/// Emitted when a task panics inside the render loop.
#[derive(Clone, Copy, Debug)]
pub struct TaskPanicEvent {
    /// Label of the failed task.
    pub label: &'static str,
}

/// Emitted after the render thread finishes producing a frame.
#[derive(Clone, Copy, Debug)]
pub struct FrameProducedEvent {
    /// Monotonic frame counter on the producing side.
    pub frame_index: u64,
    /// Which production path the frame took.
    pub path: FramePath,
}

/// Emitted after a full compositing pass.
#[derive(Clone, Copy, Debug)]
pub struct CompositeEvent {
    /// Frame counter.
    pub frame_index: u64,
    /// Number of composited layers produced.
    pub layer_count: u32,
    /// Number of nodes in the rebuilt draw list.
    pub draw_nodes: u32,
}

/// Emitted when a payload lands in the commit channel.
#[derive(Clone, Copy, Debug)]
pub struct CommitEvent {
    /// Frame counter.
    pub frame_index: u64,
    /// Whether the payload carries a full frame (layers + draw list).
    pub has_frame: bool,
    /// Number of composited updates in the payload.
    pub update_count: u32,
    /// Whether the producer wants another animation frame.
    pub wants_animation_frame: bool,
}

/// Emitted after the control thread presents a frame.
#[derive(Clone, Copy, Debug)]
pub struct PresentEvent {
    /// Counter of raster-and-draw passes on the presenting side.
    pub pass_index: u64,
    /// Scroll offset the frame was presented at.
    pub scroll: f64,
}

/// Emitted when navigation discards the old document.
#[derive(Clone, Copy, Debug)]
pub struct NavigateEvent {
    /// The new document epoch.
    pub epoch: u64,
    /// Number of queued tasks that were discarded.
    pub discarded_tasks: u32,
}

// ---------------------------------------------------------------------------
// TraceSink trait
// ---------------------------------------------------------------------------

/// Receives trace events from the frame loop.
///
/// All methods have default no-op implementations, so you only need to
/// override the events you care about.
pub trait TraceSink {
    /// Called when a task panics inside the render loop.
    fn on_task_panic(&mut self, e: &TaskPanicEvent) {
        _ = e;
    }

    /// Called after the render thread finishes producing a frame.
    fn on_frame_produced(&mut self, e: &FrameProducedEvent) {
        _ = e;
    }

    /// Called after a full compositing pass.
    fn on_composite(&mut self, e: &CompositeEvent) {
        _ = e;
    }

    /// Called when a payload lands in the commit channel.
    fn on_commit(&mut self, e: &CommitEvent) {
        _ = e;
    }

    /// Called after the control thread presents a frame.
    fn on_present(&mut self, e: &PresentEvent) {
        _ = e;
    }

    /// Called when navigation discards the old document.
    fn on_navigate(&mut self, e: &NavigateEvent) {
        _ = e;
    }
}

/// A [`TraceSink`] that discards all events.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl TraceSink for NoopSink {}

// ---------------------------------------------------------------------------
// SharedSink
// ---------------------------------------------------------------------------

/// A cloneable, thread-safe handle to a sink, usable from both threads.
///
/// Each clone can serve as the backing sink for a thread-local [`Tracer`];
/// event dispatch takes the inner lock for the duration of one sink call.
#[derive(Clone)]
pub struct SharedSink {
    inner: Arc<Mutex<Box<dyn TraceSink + Send>>>,
}

impl core::fmt::Debug for SharedSink {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SharedSink").finish_non_exhaustive()
    }
}

impl SharedSink {
    /// Wraps a sink for cross-thread use.
    #[must_use]
    pub fn new(sink: Box<dyn TraceSink + Send>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(sink)),
        }
    }

    /// Runs a closure against the wrapped sink.
    pub fn with(&self, f: impl FnOnce(&mut dyn TraceSink)) {
        let mut guard = self.inner.lock().expect("trace sink mutex poisoned");
        f(guard.as_mut());
    }
}

impl TraceSink for SharedSink {
    fn on_task_panic(&mut self, e: &TaskPanicEvent) {
        self.with(|s| s.on_task_panic(e));
    }

    fn on_frame_produced(&mut self, e: &FrameProducedEvent) {
        self.with(|s| s.on_frame_produced(e));
    }

    fn on_composite(&mut self, e: &CompositeEvent) {
        self.with(|s| s.on_composite(e));
    }

    fn on_commit(&mut self, e: &CommitEvent) {
        self.with(|s| s.on_commit(e));
    }

    fn on_present(&mut self, e: &PresentEvent) {
        self.with(|s| s.on_present(e));
    }

    fn on_navigate(&mut self, e: &NavigateEvent) {
        self.with(|s| s.on_navigate(e));
    }
}

// ---------------------------------------------------------------------------
// Tracer wrapper
// ---------------------------------------------------------------------------

/// Thin wrapper around an optional [`TraceSink`].
///
/// When the `trace` feature is **off**, every method compiles to nothing.
/// When **on**, each method checks the inner `Option` (one branch) before
/// dispatching to the sink.
pub struct Tracer<'a> {
    #[cfg(feature = "trace")]
    sink: Option<&'a mut dyn TraceSink>,
    #[cfg(not(feature = "trace"))]
    _marker: core::marker::PhantomData<&'a mut dyn TraceSink>,
}

impl core::fmt::Debug for Tracer<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Tracer").finish_non_exhaustive()
    }
}

impl<'a> Tracer<'a> {
    /// Creates a tracer that dispatches to the given sink.
    #[inline]
    #[must_use]
    pub fn new(sink: &'a mut dyn TraceSink) -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: Some(sink) }
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = sink;
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    /// Creates a tracer that discards all events.
    #[inline]
    #[must_use]
    pub fn none() -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: None }
        }
        #[cfg(not(feature = "trace"))]
        {
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    /// Emits a [`TaskPanicEvent`].
    #[inline]
    pub fn task_panic(&mut self, e: &TaskPanicEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_task_panic(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`FrameProducedEvent`].
    #[inline]
    pub fn frame_produced(&mut self, e: &FrameProducedEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_frame_produced(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`CompositeEvent`].
    #[inline]
    pub fn composite(&mut self, e: &CompositeEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_composite(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`CommitEvent`].
    #[inline]
    pub fn commit(&mut self, e: &CommitEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_commit(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`PresentEvent`].
    #[inline]
    pub fn present(&mut self, e: &PresentEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_present(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`NavigateEvent`].
    #[inline]
    pub fn navigate(&mut self, e: &NavigateEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_navigate(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }
}
