// Copyright 2026 the Varve Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Two-thread render scheduling, display-list compositing, and the commit
//! protocol between them.
//!
//! `varve_core` turns a changing tree of painted content into cacheable
//! composited layers on a fixed cadence, keeping production and presentation
//! on separate OS threads that meet at exactly one synchronization point.
//!
//! # Architecture
//!
//! Two threads, one handoff:
//!
//! ```text
//!   ControlThread (Controller)                RenderThread (Pipeline)
//!       │  pump / request_frame                    │
//!       ├──── enqueue "produce frame" ────────────►│ TaskQueue
//!       │                                          │ animate → style →
//!       │                                          │ layout → paint →
//!       │                                          │ composite
//!       │◄──────── CommitChannel::commit ──────────┤
//!       │  poll_commit (copy under one lock)       │
//!       ▼                                          │
//!   raster_and_draw ──► PresentBackend             │
//!       │  (cached layer surfaces + draw list)     │
//!       └── back to Idle ── next pump ────────────►│
//! ```
//!
//! **[`task`]** — Deferred work units on a mutex/condvar FIFO, the render
//! loop, panic isolation, and atomic drain for navigation.
//!
//! **[`dirty`]** — The ordered pipeline-stage flag set with its single
//! cascade rule: consuming a stage invalidates every later stage.
//!
//! **[`display`]** — The display-list arena: paint leaves and effect nodes
//! in a flat vector with index handles and incrementally maintained bounds.
//!
//! **[`compositor`]** — Layer assignment (same-chain merge, overlap
//! splitting, reverse-order scan), clip-aware surface bounds, and draw-list
//! construction with exactly-once effect cloning. Also the composited-update
//! fast path that patches effect parameters without touching layers.
//!
//! **[`commit`]** — The one-way payload handoff guarded by a single mutex,
//! held only to move values in or out.
//!
//! **[`pipeline`]** — The render thread's frame production: stage draining
//! against a [`DocumentDelegate`](pipeline::DocumentDelegate), scroll
//! clamping, and payload selection (full frame, composited updates, or
//! nothing).
//!
//! **[`animate`]** — Frame-indexed linear animations and the driver whose
//! pending-request state is swapped out before frame work runs.
//!
//! **[`control`]** — The control thread's state machine (idle → pending →
//! committed), cadence pump, scroll arbitration, navigation with epoch-based
//! cancellation, and the [`PresentBackend`](control::PresentBackend) seam.
//!
//! **[`trace`]** — [`TraceSink`](trace::TraceSink) trait and event types for
//! frame-loop instrumentation, with zero-overhead
//! [`Tracer`](trace::Tracer) wrapper.
//!
//! # Crate features
//!
//! - `trace` (disabled by default): Enables `Tracer` method bodies (one
//!   branch per call site).

pub mod animate;
pub mod commit;
pub mod compositor;
pub mod control;
pub mod dirty;
pub mod display;
pub mod pipeline;
pub mod task;
pub mod trace;
