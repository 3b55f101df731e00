//! Payload handling module.
//!
//! Loads the auth certificate and the download agent image, and splits the
//! DA into upload chunks.

pub mod image;

pub use image::{AuthBlob, ChunkIterator, DaBlob, ImageError};
