// Copyright 2026 the Varve Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The commit handoff between the render thread and the control thread.
//!
//! Commit is the single synchronization point between the two threads. One
//! mutex guards exactly the handoff slot; both sides hold it only long enough
//! to move a value in or out (copy-then-release, never compute-while-held).
//!
//! A [`CommitPayload`] is a value object: it owns its layers, draw list, and
//! update map outright and carries no references back into render-thread
//! state. Content identity crosses only as opaque
//! [`ContentKey`](crate::display::ContentKey)s.
//!
//! Exactly one of `frame` / `updates` is populated per commit. Both absent
//! means "nothing changed — reuse the previous frame".

use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;

use crate::compositor::FrameOutput;
use crate::display::{ContentKey, EffectCommand};
use crate::trace::{CommitEvent, Tracer};

/// One frame's output, transferred from the render thread to the control
/// thread.
#[derive(Clone, Debug, Default)]
pub struct CommitPayload {
    /// Document URL at production time.
    pub url: String,
    /// Layout-clamped scroll offset, present only when the render thread
    /// overrode the value it was handed.
    pub scroll: Option<f64>,
    /// Total content height from the last layout.
    pub content_height: f64,
    /// Full compositing output: layers plus a fresh draw list.
    pub frame: Option<FrameOutput>,
    /// Composited updates to patch into the existing draw list instead.
    pub updates: FxHashMap<ContentKey, EffectCommand>,
    /// Whether the producer wants another frame one interval from now.
    pub wants_animation_frame: bool,
    /// Producing-side frame counter.
    pub frame_index: u64,
    /// Document epoch the frame was produced under. The control thread
    /// discards payloads from an epoch that navigation has since retired.
    pub epoch: u64,
}

impl CommitPayload {
    /// Returns whether the payload carries no new frame data at all.
    #[must_use]
    pub fn is_unchanged(&self) -> bool {
        self.frame.is_none() && self.updates.is_empty()
    }
}

/// The one-way, lock-protected handoff slot.
#[derive(Debug, Default)]
pub struct CommitChannel {
    slot: Mutex<Option<CommitPayload>>,
    committed: Condvar,
}

impl CommitChannel {
    /// Creates an empty channel.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Render-thread side: deposits a finished frame and wakes waiters.
    ///
    /// The at-most-one-pending-frame guard on the control side guarantees the
    /// slot is empty here; finding it occupied means a second frame was
    /// produced before the first was consumed, which is a protocol violation.
    #[expect(
        clippy::cast_possible_truncation,
        reason = "update counts fit u32 comfortably"
    )]
    pub fn commit(&self, payload: CommitPayload, tracer: &mut Tracer<'_>) {
        debug_assert!(
            payload.frame.is_none() || payload.updates.is_empty(),
            "a commit carries a draw list or composited updates, never both"
        );
        tracer.commit(&CommitEvent {
            frame_index: payload.frame_index,
            has_frame: payload.frame.is_some(),
            update_count: payload.updates.len() as u32,
            wants_animation_frame: payload.wants_animation_frame,
        });

        let mut slot = self.slot.lock().expect("commit mutex poisoned");
        // A leftover payload from a retired epoch is dropped here; within one
        // epoch the pending-frame guard keeps the slot empty.
        debug_assert!(
            slot.as_ref().is_none_or(|prev| prev.epoch != payload.epoch),
            "committed a frame before the previous one was consumed"
        );
        *slot = Some(payload);
        drop(slot);
        self.committed.notify_all();
    }

    /// Control-thread side: takes the pending payload, if any.
    ///
    /// The payload is moved out under the lock and the lock released before
    /// the caller touches it.
    #[must_use]
    pub fn take(&self) -> Option<CommitPayload> {
        self.slot.lock().expect("commit mutex poisoned").take()
    }

    /// Blocks until a payload is available or the timeout elapses.
    ///
    /// Returns whether a payload is waiting (it is left in place for
    /// [`take`](Self::take)).
    #[must_use]
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut slot = self.slot.lock().expect("commit mutex poisoned");
        while slot.is_none() {
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                return false;
            };
            let (guard, _) = self
                .committed
                .wait_timeout(slot, remaining)
                .expect("commit mutex poisoned");
            slot = guard;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn commit_then_take_round_trips() {
        let channel = CommitChannel::new();
        let payload = CommitPayload {
            url: "https://example.org/".into(),
            content_height: 900.0,
            frame_index: 1,
            ..CommitPayload::default()
        };
        channel.commit(payload, &mut Tracer::none());

        let taken = channel.take().expect("payload present");
        assert_eq!(taken.url, "https://example.org/");
        assert!(taken.is_unchanged());
        assert!(channel.take().is_none(), "slot is consumed");
    }

    #[test]
    fn wait_wakes_on_cross_thread_commit() {
        let channel = Arc::new(CommitChannel::new());
        let producer = {
            let channel = Arc::clone(&channel);
            thread::spawn(move || {
                channel.commit(CommitPayload::default(), &mut Tracer::none());
            })
        };
        assert!(channel.wait(Duration::from_secs(5)));
        producer.join().unwrap();
        assert!(channel.take().is_some());
    }

    #[test]
    fn wait_times_out_when_nothing_commits() {
        let channel = CommitChannel::new();
        assert!(!channel.wait(Duration::from_millis(10)));
    }

    #[test]
    #[should_panic(expected = "before the previous one was consumed")]
    fn double_commit_is_a_contract_violation() {
        let channel = CommitChannel::new();
        channel.commit(CommitPayload::default(), &mut Tracer::none());
        channel.commit(CommitPayload::default(), &mut Tracer::none());
    }
}
