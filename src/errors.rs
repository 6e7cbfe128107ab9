//! Errors that can occur while decoding a JPEG image
//!
//! The decoder never panics on adversarial input: every failure mode the
//! bitstream can trigger is represented here and propagated to the caller
//! with `?`.
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};

/// Common decode errors.
///
/// The variant set follows the kinds a conforming decoder can hit: running
/// out of bytes, a marker that doesn't belong where it was found, a
/// Huffman or arithmetic bitstream that doesn't decode to anything valid, a
/// frame type the core doesn't implement, a malformed table, or a scan
/// header that references something the frame never defined.
#[allow(clippy::module_name_repetitions)]
pub enum DecodeErrors
{
    /// Ran out of input while reading a header, a segment, or an
    /// entropy-coded segment.
    Truncation(String),
    /// A marker byte was not where the format expects one, or a segment's
    /// length field didn't match what was read.
    InvalidMarker(String),
    /// No Huffman code matched the bits consumed, or canonical-code
    /// construction from the DHT payload was impossible.
    InvalidHuffman(String),
    /// The arithmetic decoder hit an out-of-range probability state index,
    /// or a restart happened with the decoder in an unexpected state.
    InvalidArithmetic(String),
    /// The frame uses a mode the core does not decode (lossless,
    /// hierarchical/differential, or more components than supported).
    UnsupportedMode(UnsupportedScheme),
    /// A quantization, Huffman, or arithmetic-conditioning table was
    /// malformed (bad precision, out-of-range threshold, excessive length).
    InvalidTable(String),
    /// A scan header referenced a component id the frame never declared, or
    /// a table index with no matching `DefineX` segment.
    ShapeMismatch(String)
}

impl Debug for DecodeErrors
{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result
    {
        match self
        {
            Self::Truncation(reason) => write!(f, "Truncated input: {reason}"),
            Self::InvalidMarker(reason) => write!(f, "Invalid marker: {reason}"),
            Self::InvalidHuffman(reason) => write!(f, "Invalid Huffman bitstream: {reason}"),
            Self::InvalidArithmetic(reason) => write!(f, "Invalid arithmetic bitstream: {reason}"),
            Self::UnsupportedMode(scheme) => write!(f, "{scheme:?}"),
            Self::InvalidTable(reason) => write!(f, "Invalid table: {reason}"),
            Self::ShapeMismatch(reason) => write!(f, "Shape mismatch: {reason}")
        }
    }
}

impl Display for DecodeErrors
{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result
    {
        Debug::fmt(self, f)
    }
}

impl Error for DecodeErrors {}

/// Frame types the core recognizes at the marker level but does not decode.
#[derive(Eq, PartialEq, Copy, Clone)]
pub enum UnsupportedScheme
{
    /// SOF3 / SOF11 — lossless, Huffman or arithmetic coded
    Lossless,
    /// SOF5..SOF7 / SOF9..SOF11 — differential/hierarchical frames
    Hierarchical,
    /// A frame declaring more components than the core supports
    TooManyComponents(u8)
}

impl Debug for UnsupportedScheme
{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result
    {
        match self
        {
            Self::Lossless => write!(
                f,
                "Lossless JPEG frames are recognized but not decoded by this core"
            ),
            Self::Hierarchical => write!(
                f,
                "Hierarchical/differential JPEG frames are recognized but not decoded by this core"
            ),
            Self::TooManyComponents(n) => write!(
                f,
                "Frame declares {n} components, the core supports at most 4"
            )
        }
    }
}
