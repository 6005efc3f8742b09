//! Image Grabber - remote image loading for recycled display slots.
//!
//! This crate fetches images over HTTP with conditional revalidation, keeps
//! decoded images in a byte-budgeted memory LRU and re-encoded copies in a
//! journaled disk LRU, and delivers results to display slots without ever
//! showing a stale result in a slot that has been reassigned.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Domain layer containing entities, errors, and port definitions.
pub mod domain;
/// Infrastructure layer containing caches, network and the load pipeline.
pub mod infrastructure;
/// Presentation layer containing display slot implementations.
pub mod presentation;

/// Current version of the application.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name.
pub const NAME: &str = "image-grabber";
