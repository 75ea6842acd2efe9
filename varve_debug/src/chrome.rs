// Copyright 2026 the Varve Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Chrome Trace Event Format exporter.
//!
//! [`export`] reads recorded bytes from a
//! [`RecorderSink`](crate::recorder::RecorderSink) and writes
//! [Chrome Trace Event Format][spec] JSON to the given writer.
//!
//! varve events carry no wall-clock times, so timestamps are the record
//! sequence numbers (one microsecond apart). The result preserves ordering
//! and is loadable in `chrome://tracing` or [Perfetto](https://ui.perfetto.dev/),
//! but durations are synthetic.
//!
//! [spec]: https://docs.google.com/document/d/1CvAClvFfyA5R-PhYUmn5OOQtYMH4h6I0nSsKchNAySU

use std::io::{self, Write};

use serde_json::{Value, json};

use crate::recorder::{RecordedEvent, decode};

// Render thread vs control thread lanes in the trace viewer.
const TID_RENDER: u32 = 1;
const TID_CONTROL: u32 = 2;

/// Exports recorded events as Chrome Trace Event Format JSON.
///
/// # Errors
///
/// Returns any error from the underlying writer.
pub fn export(bytes: &[u8], writer: &mut dyn Write) -> io::Result<()> {
    let mut events: Vec<Value> = Vec::new();

    for recorded in decode(bytes) {
        let ts = recorded.sequence();
        match recorded {
            RecordedEvent::TaskPanic { label, .. } => {
                events.push(json!({
                    "ph": "i",
                    "name": "TaskPanic",
                    "cat": "Task",
                    "ts": ts,
                    "pid": 0,
                    "tid": TID_RENDER,
                    "s": "t",
                    "args": { "label": label }
                }));
            }
            RecordedEvent::FrameProduced {
                frame_index, path, ..
            } => {
                events.push(json!({
                    "ph": "i",
                    "name": "FrameProduced",
                    "cat": "Pipeline",
                    "ts": ts,
                    "pid": 0,
                    "tid": TID_RENDER,
                    "s": "t",
                    "args": {
                        "frame_index": frame_index,
                        "path": format!("{path:?}"),
                    }
                }));
            }
            RecordedEvent::Composite {
                frame_index,
                layer_count,
                draw_nodes,
                ..
            } => {
                events.push(json!({
                    "ph": "i",
                    "name": "Composite",
                    "cat": "Pipeline",
                    "ts": ts,
                    "pid": 0,
                    "tid": TID_RENDER,
                    "s": "t",
                    "args": {
                        "frame_index": frame_index,
                        "layer_count": layer_count,
                        "draw_nodes": draw_nodes,
                    }
                }));
            }
            RecordedEvent::Commit {
                frame_index,
                has_frame,
                update_count,
                wants_animation_frame,
                ..
            } => {
                events.push(json!({
                    "ph": "i",
                    "name": "Commit",
                    "cat": "Protocol",
                    "ts": ts,
                    "pid": 0,
                    "tid": TID_RENDER,
                    "s": "p",
                    "args": {
                        "frame_index": frame_index,
                        "has_frame": has_frame,
                        "update_count": update_count,
                        "wants_animation_frame": wants_animation_frame,
                    }
                }));
            }
            RecordedEvent::Present {
                pass_index, scroll, ..
            } => {
                events.push(json!({
                    "ph": "i",
                    "name": "Present",
                    "cat": "Protocol",
                    "ts": ts,
                    "pid": 0,
                    "tid": TID_CONTROL,
                    "s": "t",
                    "args": {
                        "pass_index": pass_index,
                        "scroll": scroll,
                    }
                }));
            }
            RecordedEvent::Navigate {
                epoch,
                discarded_tasks,
                ..
            } => {
                events.push(json!({
                    "ph": "i",
                    "name": "Navigate",
                    "cat": "Protocol",
                    "ts": ts,
                    "pid": 0,
                    "tid": TID_CONTROL,
                    "s": "p",
                    "args": {
                        "epoch": epoch,
                        "discarded_tasks": discarded_tasks,
                    }
                }));
            }
        }
    }

    let doc = Value::Array(events);
    serde_json::to_writer(&mut *writer, &doc)?;
    writer.flush()
}

#[cfg(test)]
mod tests {
    use varve_core::trace::{CommitEvent, FramePath, FrameProducedEvent, TraceSink};

    use crate::recorder::RecorderSink;

    use super::*;

    #[test]
    fn export_produces_a_json_array_of_events() {
        let mut rec = RecorderSink::new();
        rec.on_frame_produced(&FrameProducedEvent {
            frame_index: 1,
            path: FramePath::Full,
        });
        rec.on_commit(&CommitEvent {
            frame_index: 1,
            has_frame: true,
            update_count: 0,
            wants_animation_frame: false,
        });

        let mut out = Vec::new();
        export(rec.as_bytes(), &mut out).unwrap();

        let doc: Value = serde_json::from_slice(&out).unwrap();
        let events = doc.as_array().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0]["name"], "FrameProduced");
        assert_eq!(events[0]["ts"], 0);
        assert_eq!(events[1]["name"], "Commit");
        assert_eq!(events[1]["ts"], 1);
        assert_eq!(events[1]["args"]["has_frame"], true);
    }

    #[test]
    fn empty_recording_exports_an_empty_array() {
        let mut out = Vec::new();
        export(&[], &mut out).unwrap();
        let doc: Value = serde_json::from_slice(&out).unwrap();
        assert!(doc.as_array().unwrap().is_empty());
    }
}
