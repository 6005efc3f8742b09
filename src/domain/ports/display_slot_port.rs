//! Port definition for the UI-owned destination of a load.

use std::time::Duration;

use crate::domain::entities::{SharedImage, SlotId};

/// How a decoded image replaces the current content.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Swap immediately.
    Immediate,
    /// Fade the image in over the placeholder.
    CrossFade {
        /// Fade duration.
        duration: Duration,
        /// Image shown underneath while fading.
        underlay: Option<SharedImage>,
    },
}

/// Port for a display slot the loader can write into.
///
/// The loader only ever holds weak references to slots and always mutates
/// them from the thread draining completions.
pub trait DisplaySlot: Send + Sync {
    /// Stable identity used to look up the slot's binding.
    fn slot_id(&self) -> SlotId;

    /// Shows a decoded image.
    fn show_image(&self, image: SharedImage, transition: Transition);

    /// Shows the placeholder while a load is pending.
    fn show_placeholder(&self, placeholder: Option<SharedImage>);
}
