//! JPEG marker codes (Table B.1)
//!
//! A marker is always `0xFF` followed by a non-`0x00`, non-`0xFF` byte; the
//! driver (`crate::decoder`) scans for that pattern and turns the second
//! byte into a [`Marker`].

/// A decoded JPEG marker.
#[derive(Eq, PartialEq, Copy, Clone, Debug)]
#[allow(clippy::upper_case_acronyms)]
pub enum Marker
{
    /// Start of image
    SOI,
    /// End of image
    EOI,
    /// Start of frame, carrying the raw marker byte (0xC0..=0xCF minus DHT/JPG/DAC)
    SOF(u8),
    /// Define Huffman table(s)
    DHT,
    /// Define arithmetic conditioning table(s)
    DAC,
    /// Define quantization table(s)
    DQT,
    /// Define restart interval
    DRI,
    /// Start of scan
    SOS,
    /// Restart marker 0..7
    RST(u8),
    /// Application segment 0..15
    APP(u8),
    /// Comment segment
    COM,
    /// Define number of lines
    DNL,
    /// Any other reserved/unrecognized marker; the byte is kept so the
    /// driver can still length-skip the segment without faulting.
    Other(u8)
}

impl Marker
{
    /// Turn the byte following `0xFF` into a marker.
    ///
    /// Returns `None` for `0x00` (byte-stuffing) and `0xFF` (fill bytes),
    /// neither of which is a marker.
    #[must_use]
    pub fn from_u8(byte: u8) -> Option<Marker>
    {
        match byte
        {
            0x00 | 0xFF => None,
            0xD8 => Some(Marker::SOI),
            0xD9 => Some(Marker::EOI),
            0xC4 => Some(Marker::DHT),
            0xCC => Some(Marker::DAC),
            0xDB => Some(Marker::DQT),
            0xDD => Some(Marker::DRI),
            0xDA => Some(Marker::SOS),
            0xD0..=0xD7 => Some(Marker::RST(byte - 0xD0)),
            0xE0..=0xEF => Some(Marker::APP(byte - 0xE0)),
            0xFE => Some(Marker::COM),
            0xDC => Some(Marker::DNL),
            // SOF markers: 0xC0..0xCF except DHT(0xC4), JPG(0xC8), DAC(0xCC)
            0xC0..=0xCF if byte != 0xC4 && byte != 0xC8 && byte != 0xCC => Some(Marker::SOF(byte)),
            other => Some(Marker::Other(other))
        }
    }

    /// Is this one of the 13 valid start-of-frame markers the core
    /// recognizes as SOF (excluding DHT/JPG/DAC, which share the C0..CF
    /// range but are not frame headers)?
    #[must_use]
    pub const fn is_sof(self) -> bool
    {
        matches!(self, Marker::SOF(_))
    }
}

/// Raw SOF marker byte -> decoding scheme, per Table B.1.
#[derive(Eq, PartialEq, Copy, Clone, Debug)]
pub enum FrameMode
{
    /// SOF0: baseline sequential DCT, Huffman coding
    Baseline,
    /// SOF1: extended sequential DCT, Huffman coding
    ExtendedSequential,
    /// SOF2: progressive DCT, Huffman coding
    Progressive,
    /// SOF9: extended sequential DCT, arithmetic coding
    ExtendedSequentialArithmetic,
    /// SOF10: progressive DCT, arithmetic coding
    ProgressiveArithmetic
}

impl FrameMode
{
    /// Whether this frame mode uses arithmetic (as opposed to Huffman)
    /// entropy coding.
    #[must_use]
    pub const fn is_arithmetic(self) -> bool
    {
        matches!(
            self,
            FrameMode::ExtendedSequentialArithmetic | FrameMode::ProgressiveArithmetic
        )
    }

    /// Whether this frame mode is progressive (spectral selection +
    /// successive approximation), as opposed to single-pass sequential.
    #[must_use]
    pub const fn is_progressive(self) -> bool
    {
        matches!(
            self,
            FrameMode::Progressive | FrameMode::ProgressiveArithmetic
        )
    }
}

/// Classify a raw SOF marker byte (`0xC0..=0xCF`).
///
/// Returns `Ok(None)` for SOF5..SOF7/SOF13..SOF15 (differential/
/// hierarchical) and SOF3/SOF11 (lossless) — markers the driver recognizes
/// but refuses to decode. The caller turns `None` into
/// [`crate::errors::UnsupportedScheme`].
#[must_use]
pub fn classify_sof(raw: u8) -> Option<FrameMode>
{
    match raw
    {
        0xC0 => Some(FrameMode::Baseline),
        0xC1 => Some(FrameMode::ExtendedSequential),
        0xC2 => Some(FrameMode::Progressive),
        0xC9 => Some(FrameMode::ExtendedSequentialArithmetic),
        0xCA => Some(FrameMode::ProgressiveArithmetic),
        _ => None
    }
}
