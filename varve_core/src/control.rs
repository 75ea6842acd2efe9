// Copyright 2026 the Varve Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The control thread's half of the pipeline.
//!
//! [`Controller`] owns browser-level state: the committed url/scroll/height
//! copies, the current draw list and layers, the frame-request cadence, and
//! the [`FrameState`] machine that enforces the at-most-one-pending-frame
//! guard. [`RenderHandle`] owns the spawned render thread: its task queue,
//! the shared [`Pipeline`], and the document epoch used to cancel stale work.
//!
//! Back-pressure falls out of the state machine: a new frame is requested
//! only from `Idle`, and the controller returns to `Idle` only after its own
//! rasterize-and-present pass, so the render thread can never outrun the
//! presenting side.
//!
//! The scroll offset is the one value both threads may write. The control
//! thread updates it directly on input for a snappy feel and sets a
//! `locally_overridden` flag; whichever side changed it last within a frame
//! interval wins when the commit lands. Everything else crosses only through
//! the commit channel.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::commit::CommitChannel;
use crate::compositor::{DrawList, LayerContent};
use crate::pipeline::{DocumentDelegate, Pipeline};
use crate::task::{self, QueueClosed, Task, TaskQueue};
use crate::trace::{NavigateEvent, PresentEvent, SharedSink, Tracer};

/// Rasterizes layer surfaces and executes draw lists.
///
/// The seam between the core and the pixel-producing side. The
/// `varve_raster` crate provides the software implementation; tests use
/// counting doubles.
pub trait PresentBackend {
    /// Ensures every layer has an up-to-date cached surface.
    ///
    /// Called only when a commit delivered new layers; surfaces whose bounds
    /// and generation are unchanged must be reused, not repainted.
    fn rasterize(&mut self, layers: &[LayerContent]);

    /// Executes the draw list into the output, translated by `scroll`.
    ///
    /// Never allocates a layer surface; all allocation belongs to
    /// [`rasterize`](Self::rasterize).
    fn present(&mut self, draw_list: &DrawList, layers: &[LayerContent], scroll: f64);
}

/// The sole cadence tunable: the target frame interval.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CadenceConfig {
    /// Minimum spacing between "produce frame" requests.
    pub frame_interval: Duration,
}

impl Default for CadenceConfig {
    fn default() -> Self {
        Self {
            frame_interval: Duration::from_millis(33),
        }
    }
}

/// Where the control thread stands in the commit protocol.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FrameState {
    /// No frame in flight; a new one may be requested.
    #[default]
    Idle,
    /// A "produce frame" task is outstanding on the render thread.
    FramePending,
    /// A commit landed and awaits the rasterize-and-present pass.
    Committed,
}

/// Owns the render thread: queue, pipeline, and document epoch.
///
/// Dropping the handle stops the queue and joins the thread.
pub struct RenderHandle {
    queue: Arc<TaskQueue>,
    pipeline: Arc<Mutex<Pipeline>>,
    channel: Arc<CommitChannel>,
    epoch: Arc<AtomicU64>,
    trace: Option<SharedSink>,
    thread: Option<JoinHandle<()>>,
}

impl core::fmt::Debug for RenderHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RenderHandle")
            .field("epoch", &self.epoch.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl RenderHandle {
    /// Spawns the render thread around a freshly built pipeline.
    #[must_use]
    pub fn spawn(
        pipeline: Pipeline,
        channel: Arc<CommitChannel>,
        trace: Option<SharedSink>,
    ) -> Self {
        let queue = Arc::new(TaskQueue::new());
        let thread = thread::Builder::new()
            .name("varve-render".into())
            .spawn({
                let queue = Arc::clone(&queue);
                let mut sink = trace.clone();
                move || {
                    let mut tracer = match sink.as_mut() {
                        Some(sink) => Tracer::new(sink),
                        None => Tracer::none(),
                    };
                    task::run_loop(&queue, &mut tracer);
                }
            })
            .expect("failed to spawn render thread");

        Self {
            queue,
            pipeline: Arc::new(Mutex::new(pipeline)),
            channel,
            epoch: Arc::new(AtomicU64::new(0)),
            trace,
            thread: Some(thread),
        }
    }

    /// The current document epoch.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Enqueues epoch-guarded work against the pipeline.
    ///
    /// The closure runs on the render thread with run-to-completion
    /// semantics. If navigation retires the document before the task runs,
    /// the task is a silent no-op.
    ///
    /// # Errors
    ///
    /// Returns [`QueueClosed`] after shutdown.
    pub fn post(
        &self,
        label: &'static str,
        work: impl FnOnce(&mut Pipeline) + Send + 'static,
    ) -> Result<(), QueueClosed> {
        let pipeline = Arc::clone(&self.pipeline);
        let epoch = Arc::clone(&self.epoch);
        let produced_under = epoch.load(Ordering::SeqCst);
        self.queue.enqueue(Task::new(label, move || {
            if epoch.load(Ordering::SeqCst) != produced_under {
                return;
            }
            let mut pipeline = pipeline.lock().expect("pipeline mutex poisoned");
            work(&mut pipeline);
        }))
    }

    /// Runs `work` after `delay`, via a background timer whose completion is
    /// delivered as a new task.
    ///
    /// The render thread never blocks on the delay; the timer fires on a
    /// helper thread and enqueues the epoch-guarded completion. A timer that
    /// outlives its document, or the queue, expires silently.
    pub fn post_delayed(
        &self,
        label: &'static str,
        delay: Duration,
        work: impl FnOnce(&mut Pipeline) + Send + 'static,
    ) {
        let queue = Arc::clone(&self.queue);
        let pipeline = Arc::clone(&self.pipeline);
        let epoch = Arc::clone(&self.epoch);
        let produced_under = epoch.load(Ordering::SeqCst);
        let _ = thread::Builder::new()
            .name("varve-timer".into())
            .spawn(move || {
                thread::sleep(delay);
                if epoch.load(Ordering::SeqCst) != produced_under {
                    return;
                }
                let _ = queue.enqueue(Task::new(label, move || {
                    if epoch.load(Ordering::SeqCst) != produced_under {
                        return;
                    }
                    let mut pipeline = pipeline.lock().expect("pipeline mutex poisoned");
                    work(&mut pipeline);
                }));
            });
    }

    /// Enqueues the "produce frame" task with the given scroll offset.
    fn request_produce_frame(&self, scroll: f64) -> Result<(), QueueClosed> {
        let pipeline = Arc::clone(&self.pipeline);
        let channel = Arc::clone(&self.channel);
        let epoch = Arc::clone(&self.epoch);
        let produced_under = epoch.load(Ordering::SeqCst);
        let mut sink = self.trace.clone();
        self.queue.enqueue(Task::new("produce-frame", move || {
            if epoch.load(Ordering::SeqCst) != produced_under {
                return;
            }
            let mut tracer = match sink.as_mut() {
                Some(sink) => Tracer::new(sink),
                None => Tracer::none(),
            };
            let mut payload = {
                let mut pipeline = pipeline.lock().expect("pipeline mutex poisoned");
                pipeline.produce_frame(Some(scroll), &mut tracer)
            };
            payload.epoch = produced_under;
            // Navigation may have landed while the frame was being produced.
            if epoch.load(Ordering::SeqCst) != produced_under {
                return;
            }
            channel.commit(payload, &mut tracer);
        }))
    }

    /// Retires the current document and loads a new one.
    ///
    /// Bumps the epoch (turning in-flight completions into no-ops), drains
    /// the queue, and schedules the document swap under the new epoch.
    #[expect(
        clippy::cast_possible_truncation,
        reason = "discarded-task counts fit u32 comfortably"
    )]
    pub fn navigate(
        &self,
        url: String,
        delegate: Box<dyn DocumentDelegate>,
        tracer: &mut Tracer<'_>,
    ) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        let discarded = self.queue.drain_and_clear();
        tracer.navigate(&NavigateEvent {
            epoch: self.epoch.load(Ordering::SeqCst),
            discarded_tasks: discarded as u32,
        });
        let _ = self.post("load-document", move |pipeline| {
            pipeline.replace_document(url, delegate);
        });
    }
}

impl Drop for RenderHandle {
    fn drop(&mut self) {
        self.queue.request_stop();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// The control thread's state machine and committed frame data.
pub struct Controller {
    cadence: CadenceConfig,
    render: RenderHandle,
    channel: Arc<CommitChannel>,
    state: FrameState,
    url: String,
    content_height: f64,
    viewport_height: f64,
    draw_list: Option<DrawList>,
    layers: Vec<LayerContent>,
    new_layers: bool,
    scroll: f64,
    scroll_overridden: bool,
    needs_animation_frame: bool,
    needs_raster_and_draw: bool,
    last_frame_at: Option<Instant>,
    pass_index: u64,
}

impl core::fmt::Debug for Controller {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Controller")
            .field("state", &self.state)
            .field("url", &self.url)
            .field("scroll", &self.scroll)
            .finish_non_exhaustive()
    }
}

impl Controller {
    /// Spawns a render thread for `url` and returns the controller driving
    /// it.
    ///
    /// The first frame is requested by the first [`pump`](Self::pump) call.
    #[must_use]
    pub fn new(
        url: String,
        delegate: Box<dyn DocumentDelegate>,
        cadence: CadenceConfig,
        viewport_height: f64,
        trace: Option<SharedSink>,
    ) -> Self {
        let channel = Arc::new(CommitChannel::new());
        let pipeline = Pipeline::new(url.clone(), delegate, viewport_height);
        let render = RenderHandle::spawn(pipeline, Arc::clone(&channel), trace);
        Self {
            cadence,
            render,
            channel,
            state: FrameState::Idle,
            url,
            content_height: 0.0,
            viewport_height,
            draw_list: None,
            layers: Vec::new(),
            new_layers: false,
            scroll: 0.0,
            scroll_overridden: false,
            needs_animation_frame: true,
            needs_raster_and_draw: false,
            last_frame_at: None,
            pass_index: 0,
        }
    }

    /// The render-thread handle, for posting document work.
    #[must_use]
    pub fn render(&self) -> &RenderHandle {
        &self.render
    }

    /// The current protocol state.
    #[must_use]
    pub fn state(&self) -> FrameState {
        self.state
    }

    /// The committed document URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The current scroll offset.
    #[must_use]
    pub fn scroll(&self) -> f64 {
        self.scroll
    }

    /// Host signal: a future frame has been requested.
    #[must_use]
    pub fn needs_animation_frame(&self) -> bool {
        self.needs_animation_frame
    }

    /// Host signal: produced frame data awaits presentation.
    #[must_use]
    pub fn needs_raster_and_draw(&self) -> bool {
        self.needs_raster_and_draw
    }

    /// Requests a new frame now, if the protocol allows one.
    ///
    /// Returns `false` while a frame is pending or committed-but-unpresented
    /// (the at-most-one-pending-frame guard), or after shutdown.
    pub fn request_frame(&mut self) -> bool {
        if !matches!(self.state, FrameState::Idle) {
            return false;
        }
        if self.render.request_produce_frame(self.scroll).is_err() {
            return false;
        }
        self.state = FrameState::FramePending;
        self.needs_animation_frame = false;
        true
    }

    /// Requests a frame if one is wanted, the protocol is idle, and at least
    /// one frame interval has passed. Returns whether a request was made.
    pub fn pump(&mut self, now: Instant) -> bool {
        if !self.needs_animation_frame || !matches!(self.state, FrameState::Idle) {
            return false;
        }
        if let Some(last) = self.last_frame_at {
            if now.duration_since(last) < self.cadence.frame_interval {
                return false;
            }
        }
        if self.request_frame() {
            self.last_frame_at = Some(now);
            true
        } else {
            false
        }
    }

    /// Blocks until a commit is waiting or the timeout elapses.
    #[must_use]
    pub fn wait_for_commit(&self, timeout: Duration) -> bool {
        self.channel.wait(timeout)
    }

    /// Consumes a pending commit, if one has landed.
    ///
    /// Copies the payload fields out under the channel lock, arbitrates the
    /// scroll offset, and installs or patches the draw list. A payload from
    /// a retired document epoch is discarded silently.
    pub fn poll_commit(&mut self) -> bool {
        let Some(payload) = self.channel.take() else {
            return false;
        };
        if payload.epoch != self.render.epoch() {
            return false;
        }
        debug_assert!(
            matches!(self.state, FrameState::FramePending),
            "commit without a pending frame"
        );
        self.state = FrameState::Committed;
        self.url = payload.url;
        self.content_height = payload.content_height;

        if self.scroll_overridden {
            // Local input won this interval; the value rides out with the
            // next frame request.
            self.scroll_overridden = false;
        } else if let Some(offset) = payload.scroll {
            self.scroll = offset;
        }

        if let Some(frame) = payload.frame {
            self.layers = frame.layers;
            self.draw_list = Some(frame.draw_list);
            self.new_layers = true;
        } else if !payload.updates.is_empty() {
            if let Some(draw_list) = &mut self.draw_list {
                for (key, effect) in payload.updates {
                    let _ = draw_list.apply_update(key, effect);
                }
            }
        }

        if payload.wants_animation_frame {
            self.needs_animation_frame = true;
        }
        self.needs_raster_and_draw = true;
        true
    }

    /// Updates the scroll offset directly in response to input.
    ///
    /// Presents immediately from the existing draw list; no new frame is
    /// produced for a scroll alone.
    pub fn scroll_to(&mut self, offset: f64) {
        let limit = (self.content_height - self.viewport_height).max(0.0);
        self.scroll = offset.clamp(0.0, limit);
        self.scroll_overridden = true;
        self.needs_raster_and_draw = true;
    }

    /// Runs the rasterize-and-present pass if one is needed.
    ///
    /// Rasterizes only when a commit delivered new layers; always re-executes
    /// the draw list. Completes the protocol cycle: a committed frame returns
    /// the controller to `Idle`.
    pub fn raster_and_draw(
        &mut self,
        backend: &mut dyn PresentBackend,
        tracer: &mut Tracer<'_>,
    ) -> bool {
        if !self.needs_raster_and_draw {
            return false;
        }
        if self.new_layers {
            backend.rasterize(&self.layers);
            self.new_layers = false;
        }
        if let Some(draw_list) = &self.draw_list {
            backend.present(draw_list, &self.layers, self.scroll);
        }
        tracer.present(&PresentEvent {
            pass_index: self.pass_index,
            scroll: self.scroll,
        });
        self.pass_index += 1;
        self.needs_raster_and_draw = false;
        if matches!(self.state, FrameState::Committed) {
            self.state = FrameState::Idle;
        }
        true
    }

    /// Navigates to a new document.
    ///
    /// Drains the render queue, retires the old epoch so in-flight work
    /// no-ops, discards any uncollected commit, and resets control-side
    /// scroll state. The old frame stays on screen until the new document's
    /// first commit.
    pub fn navigate(
        &mut self,
        url: String,
        delegate: Box<dyn DocumentDelegate>,
        tracer: &mut Tracer<'_>,
    ) {
        self.render.navigate(url.clone(), delegate, tracer);
        let _ = self.channel.take();
        self.url = url;
        self.scroll = 0.0;
        self.scroll_overridden = false;
        self.content_height = 0.0;
        self.state = FrameState::Idle;
        self.needs_animation_frame = true;
    }
}
