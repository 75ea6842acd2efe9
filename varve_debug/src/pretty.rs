// Copyright 2026 the Varve Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Human-readable trace output.
//!
//! [`PrettyPrintSink`] implements [`TraceSink`] and writes one line per
//! event to a [`Write`](std::io::Write) destination (default: stderr).

use std::io::Write;

use varve_core::trace::{
    CommitEvent, CompositeEvent, FramePath, FrameProducedEvent, NavigateEvent, PresentEvent,
    TaskPanicEvent, TraceSink,
};

/// Writes human-readable trace lines to a [`Write`](std::io::Write)
/// destination.
pub struct PrettyPrintSink<W: Write = Box<dyn Write>> {
    writer: W,
}

impl<W: Write> std::fmt::Debug for PrettyPrintSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrettyPrintSink").finish_non_exhaustive()
    }
}

impl PrettyPrintSink {
    /// Creates a sink that writes to stderr.
    #[must_use]
    pub fn stderr() -> Self {
        Self {
            writer: Box::new(std::io::stderr()),
        }
    }

    /// Creates a sink that writes to a boxed writer.
    #[must_use]
    pub fn new(writer: Box<dyn Write>) -> Self {
        Self { writer }
    }
}

impl<W: Write> PrettyPrintSink<W> {
    /// Creates a sink that writes to the given destination.
    #[must_use]
    pub fn with_writer(writer: W) -> Self {
        Self { writer }
    }
}

fn path_name(path: FramePath) -> &'static str {
    match path {
        FramePath::Full => "full",
        FramePath::CompositedUpdate => "composited-update",
        FramePath::Unchanged => "unchanged",
    }
}

impl<W: Write> TraceSink for PrettyPrintSink<W> {
    fn on_task_panic(&mut self, e: &TaskPanicEvent) {
        let _ = writeln!(self.writer, "[panic] task={}", e.label);
    }

    fn on_frame_produced(&mut self, e: &FrameProducedEvent) {
        let _ = writeln!(
            self.writer,
            "[frame] index={} path={}",
            e.frame_index,
            path_name(e.path)
        );
    }

    fn on_composite(&mut self, e: &CompositeEvent) {
        let _ = writeln!(
            self.writer,
            "[composite] frame={} layers={} draw_nodes={}",
            e.frame_index, e.layer_count, e.draw_nodes
        );
    }

    fn on_commit(&mut self, e: &CommitEvent) {
        let _ = writeln!(
            self.writer,
            "[commit] frame={} has_frame={} updates={} wants_af={}",
            e.frame_index, e.has_frame, e.update_count, e.wants_animation_frame
        );
    }

    fn on_present(&mut self, e: &PresentEvent) {
        let _ = writeln!(
            self.writer,
            "[present] pass={} scroll={:.1}",
            e.pass_index, e.scroll
        );
    }

    fn on_navigate(&mut self, e: &NavigateEvent) {
        let _ = writeln!(
            self.writer,
            "[navigate] epoch={} discarded={}",
            e.epoch, e.discarded_tasks
        );
    }
}
