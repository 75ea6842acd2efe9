// Copyright 2026 the Varve Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Software raster and present backend for varve.
//!
//! This crate implements the core's
//! [`PresentBackend`](varve_core::control::PresentBackend) seam over
//! [`tiny_skia`] pixmaps:
//!
//! - [`SurfaceCache`] — one lazily allocated surface per composited layer,
//!   reused across frames while the layer's bounds and content generation
//!   are unchanged. Layers whose surface cannot be allocated degrade to
//!   direct drawing instead of failing the frame.
//! - [`SoftwareBackend`] — clears the output, walks the draw list
//!   (accumulating translations, rendering blend groups through pooled
//!   scratch buffers so a shared ancestor effect applies exactly once), and
//!   blits cached layer surfaces translated for scroll.

mod backend;
mod cache;
mod paint;

pub use backend::SoftwareBackend;
pub use cache::{RasterStats, SurfaceCache, SurfaceError};
