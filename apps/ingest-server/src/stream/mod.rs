//! Delivery-format path to the media platform
//!
//! - `client`: platform HTTP API (upload URLs, resumable sessions, video status)
//! - `relay`: server-side chunked relay for clients without resumable support

mod client;
mod relay;
mod types;

pub use client::StreamClient;
pub use relay::{video_id_from_url, RelayUploader, ResumableTarget, SpooledBody, RELAY_CHUNK_SIZE};
#[cfg(test)]
pub(crate) use relay::MockTarget;
pub use types::*;
