//! Baseline and extended-sequential scan decoding (T.81 Figure A.6, Annex
//! F.2.2) — the single-pass case, as opposed to progressive's
//! multi-scan spectral selection in [`crate::progressive`].

use crate::arithmetic::{ArithDecoder, AcContexts, DcCategory, DcContexts};
use crate::bitreader::read_bits;
use crate::components::Component;
use crate::errors::DecodeErrors;
use crate::frame::FrameData;
use crate::huffman::HuffmanTable;

/// T.81 Figure F.12's `EXTEND`: turn an `size`-bit unsigned value into the
/// signed difference/coefficient it represents. A value whose top bit is 0
/// represents a negative number in a shifted range; one whose top bit is 1
/// represents itself.
#[must_use]
pub fn extend(value: u32, size: u8) -> i32
{
    if size == 0
    {
        return 0;
    }
    let half = 1i32 << (size - 1);
    if (value as i32) < half
    {
        value as i32 - (2 * half - 1)
    }
    else
    {
        value as i32
    }
}

/// One component's Huffman tables for a scan, resolved from the scan
/// header's table selectors.
pub struct HuffmanScanTables<'a>
{
    pub dc: &'a HuffmanTable,
    pub ac: &'a HuffmanTable
}

/// Decode one Huffman-coded block's 64 zig-zag coefficients, given the
/// previous DC value for this component.
///
/// Returns the cursor position after the block and the new DC predictor.
pub(crate) fn decode_huffman_block(
    buf: &[u8], mut i: usize, mut b: u8, tables: &HuffmanScanTables<'_>, prev_dc: i32,
    block: &mut [i32]
) -> Result<(usize, u8, i32), DecodeErrors>
{
    let (ni, nb, size) = tables.dc.decode_single(buf, i, b)?;
    i = ni;
    b = nb;

    let diff = if size == 0
    {
        0
    }
    else
    {
        let (ni, nb, bits) = read_bits(buf, i, b, size)?;
        i = ni;
        b = nb;
        extend(bits, size)
    };
    let dc = prev_dc + diff;
    block[0] = dc;

    let mut k = 1usize;
    while k <= 63
    {
        let (ni, nb, symbol) = tables.ac.decode_single(buf, i, b)?;
        i = ni;
        b = nb;

        let run = symbol >> 4;
        let size = symbol & 0x0F;

        if size == 0
        {
            if run == 15
            {
                k += 16; // ZRL: 16 zero coefficients
                continue;
            }
            break; // EOB: rest of the block is zero
        }

        k += usize::from(run);
        if k > 63
        {
            return Err(DecodeErrors::InvalidHuffman(
                "AC run length overruns the end of the block".to_string()
            ));
        }

        let (ni, nb, bits) = read_bits(buf, i, b, size)?;
        i = ni;
        b = nb;
        block[k] = extend(bits, size);
        k += 1;
    }

    Ok((i, b, dc))
}

/// Decode one arithmetic-coded block. `kx` is this component's DC
/// conditioning threshold, reused as the AC bank-split point for the
/// simplified conditioning scheme documented in `DESIGN.md`.
///
/// Returns the new DC predictor value and the category it falls into, in
/// the same shape as [`decode_huffman_block`].
pub(crate) fn decode_arithmetic_block(
    dec: &mut ArithDecoder<'_>, dc_cx: &mut DcContexts, ac_cx: &mut AcContexts, kx: usize,
    dc_low: i32, prev_dc: i32, prev_category: DcCategory, block: &mut [i32]
) -> Result<(i32, DcCategory), DecodeErrors>
{
    let diff = dc_cx.decode_diff(dec, prev_category)?;
    let dc = prev_dc + diff;
    block[0] = dc;
    let new_category = DcCategory::of(diff, dc_low);

    let mut k = 1usize;
    while k <= 63
    {
        if ac_cx.decode_eob(dec, k) != 0
        {
            break;
        }
        let coeff = ac_cx.decode_coefficient(dec, k, kx)?;
        block[k] = coeff;
        k += 1;
    }

    Ok((dc, new_category))
}

/// Where a given scan-relative component index's blocks land in the
/// frame's MCU grid for this restart segment. Interleaved scans (more than
/// one component) walk MCUs; a lone non-interleaved component instead
/// walks its own full block grid directly, ignoring MCU boundaries.
pub struct BlockWalk
{
    interleaved: bool,
    mcus_per_row: usize,
    h: usize,
    v: usize,
    blocks_per_line: usize,
    blocks_per_column: usize
}

impl BlockWalk
{
    #[must_use]
    pub fn new(frame: &FrameData, component: &Component, interleaved: bool) -> BlockWalk
    {
        BlockWalk {
            interleaved,
            mcus_per_row: frame.mcus_per_row,
            h: usize::from(component.horiz_sampling),
            v: usize::from(component.vert_sampling),
            blocks_per_line: component.blocks_per_line,
            blocks_per_column: component.blocks_per_column
        }
    }

    /// Block coordinates touched by MCU `mcu_index` (interleaved case) or
    /// by the `mcu_index`-th block overall (non-interleaved case).
    #[must_use]
    pub fn blocks_for_mcu(&self, mcu_index: usize) -> Vec<(usize, usize)>
    {
        if self.interleaved
        {
            let mcu_x = mcu_index % self.mcus_per_row;
            let mcu_y = mcu_index / self.mcus_per_row;
            let mut out = Vec::with_capacity(self.h * self.v);
            for by in 0..self.v
            {
                for bx in 0..self.h
                {
                    out.push((mcu_x * self.h + bx, mcu_y * self.v + by));
                }
            }
            out
        }
        else
        {
            let block_x = mcu_index % self.blocks_per_line;
            let block_y = mcu_index / self.blocks_per_line;
            if block_y >= self.blocks_per_column
            {
                Vec::new()
            }
            else
            {
                vec![(block_x, block_y)]
            }
        }
    }

    /// Total number of `blocks_for_mcu` steps needed to cover every block.
    #[must_use]
    pub fn total_units(&self, frame: &FrameData) -> usize
    {
        if self.interleaved
        {
            frame.total_mcus
        }
        else
        {
            self.blocks_per_line * self.blocks_per_column
        }
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn extend_maps_low_half_to_negative_range()
    {
        assert_eq!(extend(0, 3), -7);
        assert_eq!(extend(3, 3), -4);
        assert_eq!(extend(4, 3), 4);
        assert_eq!(extend(7, 3), 7);
        assert_eq!(extend(0, 0), 0);
    }

    #[test]
    fn huffman_block_decodes_dc_only_then_eob()
    {
        // DC table: {0 -> size 3}. AC table: {0 -> EOB (run=0,size=0)}.
        let mut dc_counts = [0u8; 16];
        dc_counts[2] = 1; // one 3-bit code
        let dc = HuffmanTable::new(&dc_counts, &[3]).unwrap();

        let mut ac_counts = [0u8; 16];
        ac_counts[0] = 1; // one 1-bit code
        let ac = HuffmanTable::new(&ac_counts, &[0x00]).unwrap();

        // DC code "000" (3 bits) then 3 magnitude bits "101" (=5, size 3 ->
        // extend(5,3)=5), then AC code "0" (EOB).
        // Bit stream: 000 101 0 -> pad to byte: 00010100 -> 0x14
        let buf = [0x14];
        let tables = HuffmanScanTables { dc: &dc, ac: &ac };
        let mut block = [0i32; 64];
        let (_, _, new_dc) =
            decode_huffman_block(&buf, 0, 0, &tables, 0, &mut block).unwrap();
        assert_eq!(new_dc, 5);
        assert_eq!(block[0], 5);
        assert!(block[1..].iter().all(|&c| c == 0));
    }

    #[test]
    fn block_walk_covers_every_block_in_a_non_interleaved_scan()
    {
        let sof_payload = {
            let mut v = vec![8u8, 0, 13, 0, 13, 1];
            v.extend_from_slice(&[1, 0x11, 0]);
            v
        };
        let frame = FrameData::parse(crate::marker::FrameMode::Baseline, &sof_payload).unwrap();
        let walk = BlockWalk::new(&frame, &frame.components[0], false);
        let total = walk.total_units(&frame);
        assert_eq!(total, 4); // 13px -> 2x2 blocks of 8px each
        let mut seen = std::collections::HashSet::new();
        for i in 0..total
        {
            for coord in walk.blocks_for_mcu(i)
            {
                seen.insert(coord);
            }
        }
        assert_eq!(seen.len(), 4);
    }
}
