// Copyright 2026 the Varve Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Frame-indexed animations and the per-document animation driver.
//!
//! An [`Animation`] interpolates one numeric property linearly over a fixed
//! number of frames. The [`AnimationDriver`] owns every live animation plus
//! the registered per-frame callbacks, and tracks whether anything has asked
//! for a future frame.
//!
//! The driver swaps its pending state out *before* running frame work: a
//! callback that requests another frame (or starts a new animation) lands the
//! request in the fresh state, so it is neither lost nor double-scheduled.

use crate::display::ContentKey;

/// Linear interpolation of one property over a fixed frame count.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Animation {
    start: f64,
    end: f64,
    total_frames: u32,
    frame: u32,
}

impl Animation {
    /// Creates an animation from `start` to `end` over `total_frames` frames.
    ///
    /// An animation with `total_frames == 0` is already finished; it never
    /// yields a value (and never divides by its frame count).
    #[must_use]
    pub const fn new(start: f64, end: f64, total_frames: u32) -> Self {
        Self {
            start,
            end,
            total_frames,
            frame: 0,
        }
    }

    /// Advances one frame and returns the interpolated value, or `None` once
    /// the final frame has been produced.
    ///
    /// The value at frame `total_frames` is exactly `end`.
    pub fn advance(&mut self) -> Option<f64> {
        if self.frame >= self.total_frames {
            return None;
        }
        self.frame += 1;
        let t = f64::from(self.frame) / f64::from(self.total_frames);
        Some(self.start + (self.end - self.start) * t)
    }

    /// Returns whether the animation has produced its final value.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.frame >= self.total_frames
    }

    /// The current frame index (0 before the first [`advance`](Self::advance)).
    #[must_use]
    pub const fn frame(&self) -> u32 {
        self.frame
    }
}

/// Which document property an animation drives.
///
/// The property decides how far back into the pipeline an advancing
/// animation invalidates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AnimatedProperty {
    /// Group opacity. Feeds a compositable blend effect, so only paint is
    /// invalidated and the frame stays eligible for a composited update.
    Opacity,
    /// Element height. Changes geometry, which invalidates layer bounds and
    /// forces the full pipeline from layout on.
    Height,
}

impl AnimatedProperty {
    /// Returns whether a change to this property moves geometry.
    #[must_use]
    pub const fn affects_geometry(self) -> bool {
        match self {
            Self::Opacity => false,
            Self::Height => true,
        }
    }
}

/// One advanced property value produced by a driver frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PropertyUpdate {
    /// Content the property belongs to.
    pub key: ContentKey,
    /// Which property advanced.
    pub property: AnimatedProperty,
    /// The new interpolated value.
    pub value: f64,
}

struct Slot {
    key: ContentKey,
    property: AnimatedProperty,
    animation: Animation,
}

type FrameCallback = Box<dyn FnOnce(&mut AnimationDriver) + Send>;

/// Owns a document's animations and frame-callback requests.
#[derive(Default)]
pub struct AnimationDriver {
    animations: Vec<Slot>,
    callbacks: Vec<FrameCallback>,
    frame_requested: bool,
}

impl core::fmt::Debug for AnimationDriver {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AnimationDriver")
            .field("animations", &self.animations.len())
            .field("callbacks", &self.callbacks.len())
            .field("frame_requested", &self.frame_requested)
            .finish()
    }
}

impl AnimationDriver {
    /// Creates an idle driver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts (or restarts) an animation for `key` and requests a frame.
    ///
    /// A second animation for the same key replaces the first.
    pub fn animate(&mut self, key: ContentKey, property: AnimatedProperty, animation: Animation) {
        if let Some(slot) = self.animations.iter_mut().find(|s| s.key == key) {
            slot.property = property;
            slot.animation = animation;
        } else {
            self.animations.push(Slot {
                key,
                property,
                animation,
            });
        }
        self.request_frame();
    }

    /// Registers a callback to run at the start of the next frame and
    /// requests that frame.
    pub fn add_frame_callback(&mut self, callback: impl FnOnce(&mut Self) + Send + 'static) {
        self.callbacks.push(Box::new(callback));
        self.request_frame();
    }

    /// Asks for another frame at the next cadence opportunity.
    pub fn request_frame(&mut self) {
        self.frame_requested = true;
    }

    /// Returns whether anything has requested a future frame.
    #[must_use]
    pub fn frame_requested(&self) -> bool {
        self.frame_requested
    }

    /// Returns whether any animation is still running.
    #[must_use]
    pub fn has_active_animations(&self) -> bool {
        !self.animations.is_empty()
    }

    /// Runs one animation frame.
    ///
    /// Consumes the pending request flag and callback list *first*, then runs
    /// callbacks and advances every animation, appending the produced values
    /// to `updates` in registration order. Finished animations are removed;
    /// any still-running animation requests the next frame.
    ///
    /// Returns `false` (doing nothing) if no frame was requested.
    pub fn run_frame(&mut self, updates: &mut Vec<PropertyUpdate>) -> bool {
        if !core::mem::take(&mut self.frame_requested) {
            return false;
        }
        let callbacks = core::mem::take(&mut self.callbacks);
        for callback in callbacks {
            callback(self);
        }

        self.animations.retain_mut(|slot| {
            match slot.animation.advance() {
                Some(value) => {
                    updates.push(PropertyUpdate {
                        key: slot.key,
                        property: slot.property,
                        value,
                    });
                    true
                }
                None => false,
            }
        });
        if self.has_active_animations() {
            self.request_frame();
        }
        true
    }
}
