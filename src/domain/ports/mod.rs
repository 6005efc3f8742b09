mod display_slot_port;
mod http_transport_port;
mod image_codec_port;
mod image_source_port;

pub use crate::domain::errors::{CacheError, CacheResult};
pub use display_slot_port::{DisplaySlot, Transition};
pub use http_transport_port::{
    ConditionalRequest, HttpTransport, STATUS_NOT_MODIFIED, TransportResponse,
};
pub use image_codec_port::{CompressionFormat, ImageCodec};
pub use image_source_port::ImageSourcePort;

#[cfg(test)]
pub mod mocks {
    pub use super::http_transport_port::MockHttpTransport;
    pub use super::image_source_port::mock::{MockImageSource, image_for};
}
