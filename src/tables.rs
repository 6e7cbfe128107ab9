//! Zig-zag ordering and quantization tables (T.81 Annex A.2.3, Annex B.2.4.1).

use crate::errors::DecodeErrors;

/// Maps zig-zag scan index `0..=63` to natural (row-major) block index.
/// This is the standard sequence; some widely-copied reference code swaps
/// positions 1 and 2, which is wrong — position 1 is (row 0, col 1), not
/// (row 1, col 0).
#[rustfmt::skip]
pub const ZIGZAG: [usize; 64] = [
     0,  1,  8, 16,  9,  2,  3, 10,
    17, 24, 32, 25, 18, 11,  4,  5,
    12, 19, 26, 33, 40, 48, 41, 34,
    27, 20, 13,  6,  7, 14, 21, 28,
    35, 42, 49, 56, 57, 50, 43, 36,
    29, 22, 15, 23, 30, 37, 44, 51,
    58, 59, 52, 45, 38, 31, 39, 46,
    53, 60, 61, 54, 47, 55, 62, 63,
];

/// One 8x8 quantization table, stored in natural (row-major) order.
#[derive(Clone, Copy)]
pub struct QuantizationTable
{
    pub values: [u16; 64]
}

impl QuantizationTable
{
    /// Build a quantization table from a DQT payload's 64 values, given in
    /// zig-zag order as they appear on the wire.
    ///
    /// # Errors
    /// [`DecodeErrors::InvalidTable`] if any entry is zero — a zero
    /// quantization value has no defined meaning and would divide by zero
    /// during dequantization.
    pub fn from_zigzag(values: &[u16; 64]) -> Result<QuantizationTable, DecodeErrors>
    {
        let mut natural = [0u16; 64];
        for (zz_index, &value) in values.iter().enumerate()
        {
            if value == 0
            {
                return Err(DecodeErrors::InvalidTable(
                    "Quantization table entry is zero".to_string()
                ));
            }
            natural[ZIGZAG[zz_index]] = value;
        }
        Ok(QuantizationTable { values: natural })
    }
}

/// Dequantize a block that is still in zig-zag order, writing the result
/// into natural order ready for the IDCT.
#[must_use]
pub fn dequantize_zigzag(coefficients: &[i32; 64], table: &QuantizationTable) -> [i32; 64]
{
    let mut out = [0i32; 64];
    for (zz_index, &coeff) in coefficients.iter().enumerate()
    {
        let natural_index = ZIGZAG[zz_index];
        out[natural_index] = coeff * i32::from(table.values[natural_index]);
    }
    out
}
