//! Per-component frame state (T.81 Table B.2, Table B.3).

use crate::errors::DecodeErrors;

/// A single color/luma component as declared in the frame header, plus the
/// per-component decode state (DC predictor) that rides along with it
/// through a scan.
#[derive(Clone)]
pub struct Component
{
    /// Component identifier byte from the frame header (conventionally 1,
    /// 2, 3 for Y, Cb, Cr, but not required to be).
    pub id: u8,
    pub horiz_sampling: u8,
    pub vert_sampling: u8,
    pub quant_table_idx: u8,
    /// Per-component DC predictor, reset to 0 at the start of each scan and
    /// at every restart marker.
    pub dc_predictor: i32,
    /// Block grid dimensions for this component, derived from the frame's
    /// MCU geometry and this component's sampling factors.
    pub blocks_per_line: usize,
    pub blocks_per_column: usize
}

impl Component
{
    /// Build a component from its three `SOF` bytes: id, packed sampling
    /// factors, quantization table selector.
    ///
    /// `width`/`height` are the frame's pixel dimensions and `max_h`/`max_v`
    /// its maximum sampling factors; a component's own block grid is
    /// `ceil(width*h/(8*max_h))` by `ceil(height*v/(8*max_v))`, which can be
    /// smaller than the MCU-padded grid `mcus_per_line*h` whenever the frame
    /// dimensions aren't an exact multiple of `8*max_h`/`8*max_v` — matters
    /// for non-interleaved progressive scans, which walk this component's
    /// own grid rather than the MCU grid.
    pub fn new(
        bytes: [u8; 3], max_h: u8, max_v: u8, width: usize, height: usize
    ) -> Result<Component, DecodeErrors>
    {
        let (horiz_sampling, vert_sampling) = sampling_from_byte(bytes[1])?;
        let quant_table_idx = bytes[2];

        if quant_table_idx > 3
        {
            return Err(DecodeErrors::InvalidTable(format!(
                "Quantization table selector {quant_table_idx} is out of range 0..=3"
            )));
        }
        if horiz_sampling > max_h || vert_sampling > max_v
        {
            return Err(DecodeErrors::ShapeMismatch(
                "Component sampling factor exceeds the frame's maximum".to_string()
            ));
        }

        let blocks_per_line =
            (width * usize::from(horiz_sampling)).div_ceil(8 * usize::from(max_h));
        let blocks_per_column =
            (height * usize::from(vert_sampling)).div_ceil(8 * usize::from(max_v));

        Ok(Component {
            id: bytes[0],
            horiz_sampling,
            vert_sampling,
            quant_table_idx,
            dc_predictor: 0,
            blocks_per_line,
            blocks_per_column
        })
    }

    pub fn reset_dc_predictor(&mut self)
    {
        self.dc_predictor = 0;
    }
}

/// Split a packed sampling-factor byte (`h<<4 | v`) into its two nibbles,
/// rejecting zero factors (every component must sample at least once per
/// MCU).
pub fn sampling_from_byte(byte: u8) -> Result<(u8, u8), DecodeErrors>
{
    let h = byte >> 4;
    let v = byte & 0x0F;
    if h == 0 || v == 0
    {
        return Err(DecodeErrors::InvalidTable(format!(
            "Component sampling factors must be nonzero, got h={h} v={v}"
        )));
    }
    Ok((h, v))
}

/// Well-known component ids used by the default (JFIF/Adobe) color
/// conventions; informational only, the decoder does not require ids to
/// match these.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum ComponentId
{
    Y,
    Cb,
    Cr,
    Other(u8)
}

impl From<u8> for ComponentId
{
    fn from(id: u8) -> Self
    {
        match id
        {
            1 => ComponentId::Y,
            2 => ComponentId::Cb,
            3 => ComponentId::Cr,
            other => ComponentId::Other(other)
        }
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn sampling_byte_splits_into_nibbles()
    {
        assert_eq!(sampling_from_byte(0x22).unwrap(), (2, 2));
        assert_eq!(sampling_from_byte(0x11).unwrap(), (1, 1));
    }

    #[test]
    fn zero_sampling_factor_is_rejected()
    {
        assert!(sampling_from_byte(0x01).is_err());
        assert!(sampling_from_byte(0x10).is_err());
    }

    #[test]
    fn component_derives_block_grid_from_frame_pixel_dimensions()
    {
        // 64x48 is an exact multiple of 8*max_h=16/8*max_v=16, so this
        // matches what the MCU-padded grid would also give: 4x3 MCUs of
        // 2x2 blocks each.
        let comp = Component::new([1, 0x22, 0], 2, 2, 64, 48).unwrap();
        assert_eq!(comp.blocks_per_line, 8);
        assert_eq!(comp.blocks_per_column, 6);
    }

    #[test]
    fn component_block_grid_can_be_smaller_than_the_mcu_padded_grid()
    {
        // width=20, maxH=2, h=2: MCU grid rounds up to 2 MCUs (4 blocks),
        // but the component's own grid is ceil(20*2/16) = 3 blocks.
        let comp = Component::new([1, 0x22, 0], 2, 2, 20, 16).unwrap();
        assert_eq!(comp.blocks_per_line, 3);
    }

    #[test]
    fn sampling_factor_above_frame_maximum_is_rejected()
    {
        assert!(Component::new([1, 0x31, 0], 2, 2, 64, 48).is_err());
    }

    #[test]
    fn component_id_recognizes_jfif_convention()
    {
        assert_eq!(ComponentId::from(1), ComponentId::Y);
        assert_eq!(ComponentId::from(9), ComponentId::Other(9));
    }
}
