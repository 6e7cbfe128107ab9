//! A pure-Rust JPEG (ITU-T T.81) decoder.
//!
//! Supports baseline and extended-sequential DCT frames, progressive DCT
//! frames (spectral selection and successive approximation), and both
//! Huffman and arithmetic entropy coding, with restart interval resync.
//! Lossless and hierarchical/differential frames are recognized at the
//! marker level and rejected with [`errors::DecodeErrors::UnsupportedMode`]
//! rather than decoded.
#![allow(
    clippy::needless_return,
    clippy::similar_names,
    clippy::inline_always,
    clippy::similar_names
)]
#![warn(
    clippy::correctness,
    clippy::perf,
    clippy::pedantic,
    clippy::inline_always
)]
#[macro_use]
extern crate log;

pub use crate::decoder::Decoder;
pub use crate::errors::DecodeErrors;
pub use crate::frame::FrameData;

mod arithmetic;
mod bitreader;
mod color_convert;
mod components;
mod decoder;
pub mod errors;
mod frame;
mod headers;
mod huffman;
mod idct;
mod marker;
mod progressive;
mod scan;
mod tables;
mod upsampler;

/// Decode a complete JPEG file held in memory.
///
/// Convenience wrapper around [`Decoder::new`] + [`Decoder::decode`] for
/// callers who don't need to reuse table state across images.
///
/// # Errors
/// See [`Decoder::decode`].
pub fn decode(data: &[u8]) -> Result<(FrameData, Vec<u8>), DecodeErrors>
{
    Decoder::new().decode(data)
}
