//! Frame header state and the per-component coefficient storage that scans
//! write into (T.81 Annex B.2.2).

use crate::components::Component;
use crate::errors::DecodeErrors;
use crate::marker::FrameMode;

/// Everything decoded from a `SOF` segment, plus the MCU geometry derived
/// from it.
pub struct FrameData
{
    pub mode: FrameMode,
    pub precision: u8,
    pub width: usize,
    pub height: usize,
    pub components: Vec<Component>,
    pub max_h: u8,
    pub max_v: u8,
    /// Pixel dimensions of one MCU (`8 * max_h`, `8 * max_v`).
    pub mcu_px_w: usize,
    pub mcu_px_h: usize,
    pub mcus_per_row: usize,
    pub mcus_per_column: usize,
    pub total_mcus: usize
}

impl FrameData
{
    /// Parse a `SOF` payload (the bytes right after the 2-byte length
    /// field): 1 precision byte, 2 height, 2 width, 1 component count, then
    /// 3 bytes per component.
    ///
    /// # Errors
    /// [`DecodeErrors::Truncation`] if the payload is shorter than its
    /// declared component count implies; [`DecodeErrors::UnsupportedMode`]
    /// if there are more than 4 components; anything
    /// [`Component::new`] rejects also propagates.
    pub fn parse(mode: FrameMode, payload: &[u8]) -> Result<FrameData, DecodeErrors>
    {
        if payload.len() < 6
        {
            return Err(DecodeErrors::Truncation(
                "SOF payload shorter than the fixed 6-byte header".to_string()
            ));
        }

        let precision = payload[0];
        let height = usize::from(u16::from_be_bytes([payload[1], payload[2]]));
        let width = usize::from(u16::from_be_bytes([payload[3], payload[4]]));
        let num_components = usize::from(payload[5]);

        if num_components == 0 || num_components > 4
        {
            return Err(DecodeErrors::UnsupportedMode(
                crate::errors::UnsupportedScheme::TooManyComponents(num_components as u8)
            ));
        }
        if payload.len() < 6 + num_components * 3
        {
            return Err(DecodeErrors::Truncation(
                "SOF payload shorter than its declared component count implies".to_string()
            ));
        }
        if width == 0 || height == 0
        {
            return Err(DecodeErrors::InvalidTable(
                "Frame declares zero width or height".to_string()
            ));
        }

        let mut raw_components = Vec::with_capacity(num_components);
        let mut max_h = 1u8;
        let mut max_v = 1u8;
        for i in 0..num_components
        {
            let base = 6 + i * 3;
            let bytes = [payload[base], payload[base + 1], payload[base + 2]];
            let (h, v) = crate::components::sampling_from_byte(bytes[1])?;
            max_h = max_h.max(h);
            max_v = max_v.max(v);
            raw_components.push(bytes);
        }

        let mcu_px_w = 8 * usize::from(max_h);
        let mcu_px_h = 8 * usize::from(max_v);
        let mcus_per_row = width.div_ceil(mcu_px_w);
        let mcus_per_column = height.div_ceil(mcu_px_h);

        let mut components = Vec::with_capacity(num_components);
        for bytes in raw_components
        {
            components.push(Component::new(bytes, max_h, max_v, width, height)?);
        }

        Ok(FrameData {
            mode,
            precision,
            width,
            height,
            components,
            max_h,
            max_v,
            mcu_px_w,
            mcu_px_h,
            mcus_per_row,
            mcus_per_column,
            total_mcus: mcus_per_row * mcus_per_column
        })
    }

    pub fn component_by_id(&self, id: u8) -> Option<&Component>
    {
        self.components.iter().find(|c| c.id == id)
    }

    pub fn component_by_id_mut(&mut self, id: u8) -> Option<&mut Component>
    {
        self.components.iter_mut().find(|c| c.id == id)
    }
}

/// Full-resolution DCT coefficient storage for one component, in zig-zag
/// order per block — the representation progressive scans accumulate
/// into across spectral-selection and successive-approximation passes
/// before a single final IDCT pass turns it into samples.
#[derive(Clone)]
pub struct CoefficientGrid
{
    pub blocks_per_line: usize,
    pub blocks_per_column: usize,
    /// `blocks_per_line * blocks_per_column` blocks of 64 zig-zag-ordered
    /// coefficients each.
    data: Vec<i32>
}

impl CoefficientGrid
{
    #[must_use]
    pub fn new(blocks_per_line: usize, blocks_per_column: usize) -> CoefficientGrid
    {
        CoefficientGrid {
            blocks_per_line,
            blocks_per_column,
            data: vec![0i32; blocks_per_line * blocks_per_column * 64]
        }
    }

    #[must_use]
    pub fn block(&self, block_x: usize, block_y: usize) -> &[i32]
    {
        let start = (block_y * self.blocks_per_line + block_x) * 64;
        &self.data[start..start + 64]
    }

    pub fn block_mut(&mut self, block_x: usize, block_y: usize) -> &mut [i32]
    {
        let start = (block_y * self.blocks_per_line + block_x) * 64;
        &mut self.data[start..start + 64]
    }
}
