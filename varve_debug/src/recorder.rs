// Copyright 2026 the Varve Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Compact binary event recording and decoding.
//!
//! [`RecorderSink`] implements [`TraceSink`] and encodes events into a
//! `Vec<u8>` as little-endian records. [`decode`] reads them back as an
//! iterator of [`RecordedEvent`].
//!
//! Events carry no wall-clock times; each record is stamped with a
//! monotonically increasing sequence number so exporters can reconstruct
//! ordering.

use varve_core::trace::{
    CommitEvent, CompositeEvent, FramePath, FrameProducedEvent, NavigateEvent, PresentEvent,
    TaskPanicEvent, TraceSink,
};

// ---------------------------------------------------------------------------
// Event type discriminants
// ---------------------------------------------------------------------------

const TAG_TASK_PANIC: u8 = 1;
const TAG_FRAME_PRODUCED: u8 = 2;
const TAG_COMPOSITE: u8 = 3;
const TAG_COMMIT: u8 = 4;
const TAG_PRESENT: u8 = 5;
const TAG_NAVIGATE: u8 = 6;

// ---------------------------------------------------------------------------
// RecorderSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that encodes events into a compact binary buffer.
#[derive(Debug, Default)]
pub struct RecorderSink {
    buf: Vec<u8>,
    sequence: u64,
}

impl RecorderSink {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a view of the recorded bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consumes the recorder and returns the recorded bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    // -- encoding helpers --------------------------------------------------

    fn begin_record(&mut self, tag: u8) {
        self.buf.push(tag);
        let seq = self.sequence;
        self.sequence += 1;
        self.write_u64(seq);
    }

    fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_f64(&mut self, v: f64) {
        self.write_u64(v.to_bits());
    }

    fn write_str(&mut self, s: &str) {
        let bytes = s.as_bytes();
        let len = u32::try_from(bytes.len()).unwrap_or(u32::MAX);
        self.write_u32(len);
        self.buf.extend_from_slice(&bytes[..len as usize]);
    }

    fn write_path(&mut self, path: FramePath) {
        self.write_u8(match path {
            FramePath::Full => 0,
            FramePath::CompositedUpdate => 1,
            FramePath::Unchanged => 2,
        });
    }
}

impl TraceSink for RecorderSink {
    fn on_task_panic(&mut self, e: &TaskPanicEvent) {
        self.begin_record(TAG_TASK_PANIC);
        self.write_str(e.label);
    }

    fn on_frame_produced(&mut self, e: &FrameProducedEvent) {
        self.begin_record(TAG_FRAME_PRODUCED);
        self.write_u64(e.frame_index);
        self.write_path(e.path);
    }

    fn on_composite(&mut self, e: &CompositeEvent) {
        self.begin_record(TAG_COMPOSITE);
        self.write_u64(e.frame_index);
        self.write_u32(e.layer_count);
        self.write_u32(e.draw_nodes);
    }

    fn on_commit(&mut self, e: &CommitEvent) {
        self.begin_record(TAG_COMMIT);
        self.write_u64(e.frame_index);
        self.write_u8(u8::from(e.has_frame));
        self.write_u32(e.update_count);
        self.write_u8(u8::from(e.wants_animation_frame));
    }

    fn on_present(&mut self, e: &PresentEvent) {
        self.begin_record(TAG_PRESENT);
        self.write_u64(e.pass_index);
        self.write_f64(e.scroll);
    }

    fn on_navigate(&mut self, e: &NavigateEvent) {
        self.begin_record(TAG_NAVIGATE);
        self.write_u64(e.epoch);
        self.write_u32(e.discarded_tasks);
    }
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// A decoded trace record with its sequence number.
#[derive(Clone, Debug, PartialEq)]
pub enum RecordedEvent {
    /// A task panicked in the render loop.
    TaskPanic {
        /// Record sequence number.
        sequence: u64,
        /// Task label.
        label: String,
    },
    /// A frame finished producing.
    FrameProduced {
        /// Record sequence number.
        sequence: u64,
        /// Producing-side frame counter.
        frame_index: u64,
        /// Production path.
        path: FramePath,
    },
    /// A full compositing pass ran.
    Composite {
        /// Record sequence number.
        sequence: u64,
        /// Producing-side frame counter.
        frame_index: u64,
        /// Layers produced.
        layer_count: u32,
        /// Draw-list size.
        draw_nodes: u32,
    },
    /// A payload was committed.
    Commit {
        /// Record sequence number.
        sequence: u64,
        /// Producing-side frame counter.
        frame_index: u64,
        /// Whether a full frame was carried.
        has_frame: bool,
        /// Composited updates carried.
        update_count: u32,
        /// Whether another frame was requested.
        wants_animation_frame: bool,
    },
    /// A present pass completed.
    Present {
        /// Record sequence number.
        sequence: u64,
        /// Presenting-side pass counter.
        pass_index: u64,
        /// Scroll offset presented at.
        scroll: f64,
    },
    /// A navigation retired the document.
    Navigate {
        /// Record sequence number.
        sequence: u64,
        /// New document epoch.
        epoch: u64,
        /// Queued tasks discarded.
        discarded_tasks: u32,
    },
}

impl RecordedEvent {
    /// The record's sequence number.
    #[must_use]
    pub fn sequence(&self) -> u64 {
        match self {
            Self::TaskPanic { sequence, .. }
            | Self::FrameProduced { sequence, .. }
            | Self::Composite { sequence, .. }
            | Self::Commit { sequence, .. }
            | Self::Present { sequence, .. }
            | Self::Navigate { sequence, .. } => *sequence,
        }
    }
}

/// Decodes recorded bytes into an event iterator.
///
/// Decoding stops at the first malformed or unknown record.
#[must_use]
pub fn decode(bytes: &[u8]) -> DecodeIter<'_> {
    DecodeIter { bytes, pos: 0 }
}

/// Iterator over [`RecordedEvent`]s in a recorded buffer.
#[derive(Debug)]
pub struct DecodeIter<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl DecodeIter<'_> {
    fn read_u8(&mut self) -> Option<u8> {
        let v = *self.bytes.get(self.pos)?;
        self.pos += 1;
        Some(v)
    }

    fn read_u32(&mut self) -> Option<u32> {
        let end = self.pos.checked_add(4)?;
        let chunk = self.bytes.get(self.pos..end)?;
        self.pos = end;
        Some(u32::from_le_bytes(chunk.try_into().ok()?))
    }

    fn read_u64(&mut self) -> Option<u64> {
        let end = self.pos.checked_add(8)?;
        let chunk = self.bytes.get(self.pos..end)?;
        self.pos = end;
        Some(u64::from_le_bytes(chunk.try_into().ok()?))
    }

    fn read_f64(&mut self) -> Option<f64> {
        Some(f64::from_bits(self.read_u64()?))
    }

    fn read_str(&mut self) -> Option<String> {
        let len = self.read_u32()? as usize;
        let end = self.pos.checked_add(len)?;
        let chunk = self.bytes.get(self.pos..end)?;
        self.pos = end;
        String::from_utf8(chunk.to_vec()).ok()
    }

    fn read_path(&mut self) -> Option<FramePath> {
        match self.read_u8()? {
            0 => Some(FramePath::Full),
            1 => Some(FramePath::CompositedUpdate),
            2 => Some(FramePath::Unchanged),
            _ => None,
        }
    }
}

impl Iterator for DecodeIter<'_> {
    type Item = RecordedEvent;

    fn next(&mut self) -> Option<Self::Item> {
        let tag = self.read_u8()?;
        let sequence = self.read_u64()?;
        match tag {
            TAG_TASK_PANIC => Some(RecordedEvent::TaskPanic {
                sequence,
                label: self.read_str()?,
            }),
            TAG_FRAME_PRODUCED => Some(RecordedEvent::FrameProduced {
                sequence,
                frame_index: self.read_u64()?,
                path: self.read_path()?,
            }),
            TAG_COMPOSITE => Some(RecordedEvent::Composite {
                sequence,
                frame_index: self.read_u64()?,
                layer_count: self.read_u32()?,
                draw_nodes: self.read_u32()?,
            }),
            TAG_COMMIT => Some(RecordedEvent::Commit {
                sequence,
                frame_index: self.read_u64()?,
                has_frame: self.read_u8()? != 0,
                update_count: self.read_u32()?,
                wants_animation_frame: self.read_u8()? != 0,
            }),
            TAG_PRESENT => Some(RecordedEvent::Present {
                sequence,
                pass_index: self.read_u64()?,
                scroll: self.read_f64()?,
            }),
            TAG_NAVIGATE => Some(RecordedEvent::Navigate {
                sequence,
                epoch: self.read_u64()?,
                discarded_tasks: self.read_u32()?,
            }),
            _ => None, // unknown tag → stop iteration
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_every_event_kind() {
        let mut rec = RecorderSink::new();
        rec.on_task_panic(&TaskPanicEvent { label: "explode" });
        rec.on_frame_produced(&FrameProducedEvent {
            frame_index: 3,
            path: FramePath::CompositedUpdate,
        });
        rec.on_composite(&CompositeEvent {
            frame_index: 3,
            layer_count: 4,
            draw_nodes: 9,
        });
        rec.on_commit(&CommitEvent {
            frame_index: 3,
            has_frame: true,
            update_count: 0,
            wants_animation_frame: true,
        });
        rec.on_present(&PresentEvent {
            pass_index: 2,
            scroll: 120.5,
        });
        rec.on_navigate(&NavigateEvent {
            epoch: 1,
            discarded_tasks: 7,
        });

        let events: Vec<_> = decode(rec.as_bytes()).collect();
        assert_eq!(events.len(), 6);
        assert_eq!(
            events[0],
            RecordedEvent::TaskPanic {
                sequence: 0,
                label: "explode".into()
            }
        );
        assert_eq!(
            events[1],
            RecordedEvent::FrameProduced {
                sequence: 1,
                frame_index: 3,
                path: FramePath::CompositedUpdate
            }
        );
        assert_eq!(
            events[4],
            RecordedEvent::Present {
                sequence: 4,
                pass_index: 2,
                scroll: 120.5
            }
        );
        assert_eq!(events[5].sequence(), 5);
    }

    #[test]
    fn truncated_buffer_stops_cleanly() {
        let mut rec = RecorderSink::new();
        rec.on_composite(&CompositeEvent {
            frame_index: 1,
            layer_count: 2,
            draw_nodes: 3,
        });
        let bytes = rec.as_bytes();
        let truncated = &bytes[..bytes.len() - 2];
        assert_eq!(decode(truncated).count(), 0);
    }

    #[test]
    fn unknown_tag_stops_iteration() {
        let mut rec = RecorderSink::new();
        rec.on_navigate(&NavigateEvent {
            epoch: 2,
            discarded_tasks: 0,
        });
        let mut bytes = rec.into_bytes();
        bytes.push(0xFF);
        bytes.extend_from_slice(&[0; 8]);
        assert_eq!(decode(&bytes).count(), 1);
    }
}
