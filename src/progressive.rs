//! Progressive scan decoding: spectral selection and successive
//! approximation, for both first scans and refinement scans (T.81 Annex
//! G), Huffman- and arithmetic-coded.
//!
//! Unlike baseline/extended sequential, a progressive frame's coefficient
//! storage is built up across many scans; each function here mutates
//! whatever coefficients its spectral band covers in place rather than
//! returning a finished block.

use crate::arithmetic::{ArithDecoder, AcContexts, DcCategory, DcContexts};
use crate::bitreader::read_bits;
use crate::errors::DecodeErrors;
use crate::huffman::HuffmanTable;
use crate::scan::extend;

/// End-of-band run counter (T.81 G.1.2.2): how many more whole blocks,
/// after this one, are known to have no nonzero coefficients left in the
/// current spectral band. Carried across blocks within a scan (reset at
/// restart markers).
#[derive(Default)]
pub struct EobRun(pub u32);

/// Decode a progressive DC first scan's contribution to one block: just
/// the DC difference, point-transformed by `al` (successive approximation
/// low bit position).
pub fn huffman_dc_first(
    buf: &[u8], i: usize, b: u8, dc_table: &HuffmanTable, prev_dc: i32, al: u8, dc_coeff: &mut i32
) -> Result<(usize, u8, i32), DecodeErrors>
{
    let (ni, nb, size) = dc_table.decode_single(buf, i, b)?;

    let (i, b, diff) = if size == 0
    {
        (ni, nb, 0)
    }
    else
    {
        let (ni2, nb2, bits) = read_bits(buf, ni, nb, size)?;
        (ni2, nb2, extend(bits, size))
    };

    let dc = prev_dc + diff;
    *dc_coeff = dc << al;
    Ok((i, b, dc))
}

/// Decode a progressive DC refinement scan's contribution: a single raw
/// bit, OR'd in at position `al`.
pub fn huffman_dc_refine(
    buf: &[u8], i: usize, b: u8, al: u8, dc_coeff: &mut i32
) -> Result<(usize, u8), DecodeErrors>
{
    let (ni, nb, bit) = read_bits(buf, i, b, 1)?;
    if bit != 0
    {
        *dc_coeff |= 1 << al;
    }
    Ok((ni, nb))
}

/// Decode a progressive AC first scan's contribution to one block's
/// spectral band `ss..=se`. Returns the advanced bit cursor; `eob_run`
/// carries any end-of-band run into subsequent blocks.
pub fn huffman_ac_first(
    buf: &[u8], mut i: usize, mut b: u8, ac_table: &HuffmanTable, ss: u8, se: u8, al: u8,
    eob_run: &mut EobRun, block: &mut [i32; 64]
) -> Result<(usize, u8), DecodeErrors>
{
    if eob_run.0 > 0
    {
        eob_run.0 -= 1;
        return Ok((i, b));
    }

    let mut k = usize::from(ss);
    while k <= usize::from(se)
    {
        let (ni, nb, symbol) = ac_table.decode_single(buf, i, b)?;
        i = ni;
        b = nb;

        let run = symbol >> 4;
        let size = symbol & 0x0F;

        if size == 0
        {
            if run < 15
            {
                let mut run_length: u32 = (1u32 << run) - 1;
                if run > 0
                {
                    let (ni, nb, extra) = read_bits(buf, i, b, run)?;
                    i = ni;
                    b = nb;
                    run_length += extra;
                }
                eob_run.0 = run_length;
                break;
            }
            // ZRL: skip 16 zero coefficients, stay in the zig-zag band.
            k += 16;
            continue;
        }

        k += usize::from(run);
        if k > usize::from(se)
        {
            return Err(DecodeErrors::InvalidHuffman(
                "Progressive AC run length overruns the spectral band".to_string()
            ));
        }

        let (ni, nb, bits) = read_bits(buf, i, b, size)?;
        i = ni;
        b = nb;
        block[k] = extend(bits, size) << al;
        k += 1;
    }

    Ok((i, b))
}

/// Decode a progressive AC refinement scan's contribution to one block
/// (T.81 Figure G.7's Huffman refinement procedure): existing nonzero
/// coefficients get a correction bit; the first newly-nonzero coefficient
/// found (if any, before an EOB run starts) gets its sign and magnitude
/// `p1`.
pub fn huffman_ac_refine(
    buf: &[u8], mut i: usize, mut b: u8, ac_table: &HuffmanTable, ss: u8, se: u8, al: u8,
    eob_run: &mut EobRun, block: &mut [i32; 64]
) -> Result<(usize, u8), DecodeErrors>
{
    let p1 = 1i32 << al;
    let m1 = -1i32 << al;
    let mut k = usize::from(ss);

    if eob_run.0 == 0
    {
        while k <= usize::from(se)
        {
            let (ni, nb, symbol) = ac_table.decode_single(buf, i, b)?;
            i = ni;
            b = nb;

            let mut run = symbol >> 4;
            let size = symbol & 0x0F;
            let mut new_value = 0i32;

            if size == 0
            {
                if run != 15
                {
                    let mut run_length: u32 = (1u32 << run) - 1;
                    if run > 0
                    {
                        let (ni, nb, extra) = read_bits(buf, i, b, run)?;
                        i = ni;
                        b = nb;
                        run_length += extra;
                    }
                    eob_run.0 = run_length;
                    break;
                }
                // run == 15: ZRL, correct existing coefficients while
                // skipping 16 zero-history slots below.
            }
            else
            {
                let (ni, nb, sign_bit) = read_bits(buf, i, b, 1)?;
                i = ni;
                b = nb;
                new_value = if sign_bit != 0 { m1 } else { p1 };
            }

            while k <= usize::from(se)
            {
                if block[k] != 0
                {
                    let (ni, nb, correction) = read_bits(buf, i, b, 1)?;
                    i = ni;
                    b = nb;
                    if correction != 0 && block[k] & p1 == 0
                    {
                        block[k] += if block[k] >= 0 { p1 } else { m1 };
                    }
                }
                else
                {
                    if run == 0
                    {
                        if size != 0
                        {
                            block[k] = new_value;
                        }
                        k += 1;
                        break;
                    }
                    run -= 1;
                }
                k += 1;
            }
        }
    }

    if eob_run.0 > 0
    {
        while k <= usize::from(se)
        {
            if block[k] != 0
            {
                let (ni, nb, correction) = read_bits(buf, i, b, 1)?;
                i = ni;
                b = nb;
                if correction != 0 && block[k] & p1 == 0
                {
                    block[k] += if block[k] >= 0 { p1 } else { m1 };
                }
            }
            k += 1;
        }
        eob_run.0 -= 1;
    }

    Ok((i, b))
}

/// Arithmetic-coded counterpart of [`huffman_dc_first`]. Returns the new DC
/// predictor value and its category, matching the Huffman path's shape.
pub fn arith_dc_first(
    dec: &mut ArithDecoder<'_>, cx: &mut DcContexts, dc_low: i32, prev_dc: i32,
    prev_category: DcCategory, al: u8, dc_coeff: &mut i32
) -> Result<(i32, DcCategory), DecodeErrors>
{
    let diff = cx.decode_diff(dec, prev_category)?;
    let dc = prev_dc + diff;
    *dc_coeff = dc << al;
    Ok((dc, DcCategory::of(diff, dc_low)))
}

/// Arithmetic-coded counterpart of [`huffman_dc_refine`].
pub fn arith_dc_refine(dec: &mut ArithDecoder<'_>, al: u8, dc_coeff: &mut i32)
{
    if dec.decode_fixed() != 0
    {
        *dc_coeff |= 1 << al;
    }
}

/// Arithmetic-coded counterpart of [`huffman_ac_first`].
pub fn arith_ac_first(
    dec: &mut ArithDecoder<'_>, cx: &mut AcContexts, ss: u8, se: u8, al: u8, kx: usize,
    eob_run: &mut EobRun, block: &mut [i32; 64]
) -> Result<(), DecodeErrors>
{
    if eob_run.0 > 0
    {
        eob_run.0 -= 1;
        return Ok(());
    }

    let mut k = usize::from(ss);
    while k <= usize::from(se)
    {
        if cx.decode_eob(dec, k) != 0
        {
            // Fixed-length EOB run encoding isn't used in the arithmetic
            // coder the way it is for Huffman; one EOB context decode ends
            // the band for this block only.
            break;
        }
        let coeff = cx.decode_coefficient(dec, k, kx)?;
        block[k] = coeff << al;
        k += 1;
    }
    Ok(())
}

/// Arithmetic-coded counterpart of [`huffman_ac_refine`]. `eob_run` is
/// threaded through for signature parity with [`arith_ac_first`]; as noted
/// there, the arithmetic coder's end-of-band decision only ever ends the
/// band for the current block, so this never actually sets a run that
/// carries into a later block.
pub fn arith_ac_refine(
    dec: &mut ArithDecoder<'_>, cx: &mut AcContexts, ss: u8, se: u8, al: u8, kx: usize,
    eob_run: &mut EobRun, block: &mut [i32; 64]
) -> Result<(), DecodeErrors>
{
    if eob_run.0 > 0
    {
        eob_run.0 -= 1;
        return Ok(());
    }

    let p1 = 1i32 << al;
    let m1 = -1i32 << al;

    let mut k = usize::from(ss);
    let mut eob = false;
    while k <= usize::from(se)
    {
        if !eob && cx.decode_eob(dec, k) != 0
        {
            eob = true;
        }

        if block[k] != 0
        {
            if cx.decode_correction(dec) != 0 && block[k] & p1 == 0
            {
                block[k] += if block[k] >= 0 { p1 } else { m1 };
            }
        }
        else if !eob && cx.decode_coefficient(dec, k, kx)? != 0
        {
            let sign = dec.decode_fixed();
            block[k] = if sign == 0 { p1 } else { m1 };
        }
        k += 1;
    }
    Ok(())
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn dc_first_scan_applies_point_transform()
    {
        let mut dc_counts = [0u8; 16];
        dc_counts[2] = 1;
        let dc = HuffmanTable::new(&dc_counts, &[3]).unwrap();
        // "000" + "101" (=5) -> diff 5, point-transformed by al=2 -> 20
        let buf = [0b000_101_00];
        let mut coeff = 0i32;
        let (_, _, dc_val) = huffman_dc_first(&buf, 0, 0, &dc, 0, 2, &mut coeff).unwrap();
        assert_eq!(dc_val, 5);
        assert_eq!(coeff, 20);
    }

    #[test]
    fn dc_refine_ors_in_a_single_bit()
    {
        let buf = [0b1000_0000];
        let mut coeff = 4i32;
        huffman_dc_refine(&buf, 0, 0, 1, &mut coeff).unwrap();
        assert_eq!(coeff, 6); // 4 | (1 << 1)
    }

    #[test]
    fn eob_run_skips_a_block_entirely()
    {
        let mut run = EobRun(3);
        let mut block = [0i32; 64];
        let ac_table = {
            let mut counts = [0u8; 16];
            counts[0] = 1;
            HuffmanTable::new(&counts, &[0x00]).unwrap()
        };
        let buf = [0x00];
        let (i, b) =
            huffman_ac_first(&buf, 0, 0, &ac_table, 1, 63, 0, &mut run, &mut block).unwrap();
        assert_eq!((i, b), (0, 0));
        assert_eq!(run.0, 2);
    }
}
