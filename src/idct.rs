//! Inverse discrete cosine transform (T.81 Annex A.3.3, reference formula).
//!
//! This is the textbook double-sum formula, not a fast butterfly
//! approximation: correctness over speed, since nothing downstream needs
//! this to be fast and a literal implementation is the easiest to audit
//! against the standard. No level shift is applied here; that's folded
//! into color conversion.

use std::f32::consts::PI;
use std::sync::OnceLock;

const BLOCK: usize = 8;

fn cosine_table() -> &'static [[f32; BLOCK]; BLOCK]
{
    static TABLE: OnceLock<[[f32; BLOCK]; BLOCK]> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = [[0f32; BLOCK]; BLOCK];
        for (x, row) in table.iter_mut().enumerate()
        {
            for (u, cell) in row.iter_mut().enumerate()
            {
                *cell = (((2 * x + 1) as f32) * (u as f32) * PI / 16.0).cos();
            }
        }
        table
    })
}

fn c(u: usize) -> f32
{
    if u == 0
    {
        std::f32::consts::FRAC_1_SQRT_2
    }
    else
    {
        1.0
    }
}

/// Inverse DCT of one 8x8 block of dequantized coefficients, in natural
/// (row-major) order, producing real-valued samples (no level shift, no
/// rounding) in natural order.
///
/// `f(x, y) = 1/4 * sum_u sum_v C(u) C(v) F(u, v) cos((2x+1)u*pi/16) cos((2y+1)v*pi/16)`
#[must_use]
pub fn idct_8x8(coefficients: &[i32; 64]) -> [f32; 64]
{
    let cos = cosine_table();
    let mut freq = [[0f32; BLOCK]; BLOCK];
    for v in 0..BLOCK
    {
        for u in 0..BLOCK
        {
            freq[v][u] = coefficients[v * BLOCK + u] as f32;
        }
    }

    let mut out = [0f32; 64];
    for y in 0..BLOCK
    {
        for x in 0..BLOCK
        {
            let mut sum = 0f32;
            for v in 0..BLOCK
            {
                let cv = c(v) * cos[y][v];
                for u in 0..BLOCK
                {
                    sum += c(u) * cos[x][u] * cv * freq[v][u];
                }
            }
            out[y * BLOCK + x] = sum / 4.0;
        }
    }
    out
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn all_zero_block_idcts_to_all_zero()
    {
        let coeffs = [0i32; 64];
        let out = idct_8x8(&coeffs);
        assert!(out.iter().all(|&v| v.abs() < 1e-4));
    }

    #[test]
    fn dc_only_block_idcts_to_a_flat_plane()
    {
        let mut coeffs = [0i32; 64];
        coeffs[0] = 16; // DC coefficient
        let out = idct_8x8(&coeffs);
        // DC-only input is a constant plane: f(x,y) = (1/4) * C(0)*C(0) * DC
        let expected = 0.25 * 0.5 * 16.0;
        for &v in &out
        {
            assert!((v - expected).abs() < 1e-3, "{v} vs {expected}");
        }
    }

    #[test]
    fn idct_is_symmetric_about_the_block_center_for_symmetric_input()
    {
        // A coefficient pattern symmetric under (u,v) -> (v,u) must produce
        // output symmetric under (x,y) -> (y,x).
        let mut coeffs = [0i32; 64];
        coeffs[1 * 8 + 2] = 5;
        coeffs[2 * 8 + 1] = 5;
        let out = idct_8x8(&coeffs);
        for y in 0..8
        {
            for x in 0..8
            {
                assert!((out[y * 8 + x] - out[x * 8 + y]).abs() < 1e-3);
            }
        }
    }
}
