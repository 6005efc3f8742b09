//! Presentation layer with display slot implementations.

/// Reusable widgets.
pub mod widgets;
