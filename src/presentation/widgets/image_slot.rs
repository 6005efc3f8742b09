//! Headless display slot that records what the pipeline shows in it.

use parking_lot::Mutex;

use crate::domain::entities::{SharedImage, SlotId, SlotStatus};
use crate::domain::ports::{DisplaySlot, Transition};

#[derive(Default)]
struct SlotState {
    image: Option<SharedImage>,
    placeholder: Option<SharedImage>,
    transition: Option<Transition>,
    status: SlotStatus,
    image_updates: usize,
}

/// A display slot with no rendering backend.
///
/// Holds the current image or placeholder so callers can render or
/// inspect it. Reusing a slot for a different key is just another
/// `load_into` call with the same slot.
pub struct ImageSlot {
    id: SlotId,
    state: Mutex<SlotState>,
}

impl ImageSlot {
    /// Creates an empty slot with a fresh id.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: SlotId::new(),
            state: Mutex::new(SlotState::default()),
        }
    }

    /// Image currently shown, if any.
    #[must_use]
    pub fn image(&self) -> Option<SharedImage> {
        self.state.lock().image.clone()
    }

    /// Placeholder set by the last load that missed the memory tier.
    #[must_use]
    pub fn placeholder(&self) -> Option<SharedImage> {
        self.state.lock().placeholder.clone()
    }

    /// Current display state.
    #[must_use]
    pub fn status(&self) -> SlotStatus {
        self.state.lock().status
    }

    /// Transition used for the last image shown.
    #[must_use]
    pub fn last_transition(&self) -> Option<Transition> {
        self.state.lock().transition.clone()
    }

    /// Number of times an image has been shown.
    #[must_use]
    pub fn image_updates(&self) -> usize {
        self.state.lock().image_updates
    }

    /// Whether an image is shown.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.status().is_ready()
    }

    /// Whether a load is pending.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.status().is_loading()
    }

    /// Pixel dimensions of the current image.
    #[must_use]
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.state
            .lock()
            .image
            .as_ref()
            .map(|image| (image.width(), image.height()))
    }

    /// Resets the slot to empty.
    pub fn clear(&self) {
        *self.state.lock() = SlotState::default();
    }
}

impl Default for ImageSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplaySlot for ImageSlot {
    fn slot_id(&self) -> SlotId {
        self.id
    }

    fn show_image(&self, image: SharedImage, transition: Transition) {
        let mut state = self.state.lock();
        state.image = Some(image);
        state.transition = Some(transition);
        state.status = SlotStatus::Ready;
        state.image_updates += 1;
    }

    fn show_placeholder(&self, placeholder: Option<SharedImage>) {
        let mut state = self.state.lock();
        state.image = None;
        state.placeholder = placeholder;
        state.transition = None;
        state.status = SlotStatus::Loading;
    }
}

impl std::fmt::Debug for ImageSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ImageSlot")
            .field("id", &self.id)
            .field("has_image", &state.image.is_some())
            .field("has_placeholder", &state.placeholder.is_some())
            .field("status", &state.status)
            .finish_non_exhaustive()
    }
}
