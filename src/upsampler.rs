//! Chroma alignment via nearest-neighbor replication (T.81 Annex A.2.2's
//! sampling-factor geometry, deliberately *not* the triangle-filter "fancy"
//! upsampling some decoders use for smoother output).

/// Map a component's decoded samples (laid out in its own, possibly
/// subsampled, grid) onto the frame's full-resolution pixel grid by nearest
/// neighbor.
///
/// `component` is `comp_width * comp_height` samples, row-major.
/// `h`/`v` are this component's sampling factors, `max_h`/`max_v` the
/// frame's maximums; `out_width`/`out_height` are the full-resolution
/// target dimensions (the frame's `width`/`height`, i.e. already cropped to
/// the image's real size rather than padded out to a whole number of
/// MCUs).
#[must_use]
pub fn align_nearest_neighbor(
    component: &[u8], comp_width: usize, comp_height: usize, h: u8, v: u8, max_h: u8, max_v: u8,
    out_width: usize, out_height: usize
) -> Vec<u8>
{
    let mut out = vec![0u8; out_width * out_height];
    let h = u32::from(h);
    let v = u32::from(v);
    let max_h = u32::from(max_h);
    let max_v = u32::from(max_v);

    for y in 0..out_height
    {
        let src_y = ((y as u32) * v / max_v).min(comp_height.saturating_sub(1) as u32) as usize;
        for x in 0..out_width
        {
            let src_x = ((x as u32) * h / max_h).min(comp_width.saturating_sub(1) as u32) as usize;
            out[y * out_width + x] = component[src_y * comp_width + src_x];
        }
    }

    out
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn full_resolution_component_is_a_plain_copy()
    {
        let comp = vec![1, 2, 3, 4];
        let out = align_nearest_neighbor(&comp, 2, 2, 2, 2, 2, 2, 2, 2);
        assert_eq!(out, comp);
    }

    #[test]
    fn half_resolution_chroma_replicates_each_sample_into_a_2x2_block()
    {
        // 1x1 chroma sample, 4:2:0-style (h=v=1, max_h=max_v=2), output 2x2.
        let comp = vec![42];
        let out = align_nearest_neighbor(&comp, 1, 1, 1, 1, 2, 2, 2, 2);
        assert_eq!(out, vec![42, 42, 42, 42]);
    }

    #[test]
    fn non_aligned_output_size_clamps_to_the_last_sample()
    {
        // comp is 2 wide, output is 3 wide (e.g. a 13px-wide image's last
        // partial MCU column): nearest neighbor must not index out of
        // bounds, it should clamp to the last real sample.
        let comp = vec![10, 20, 30, 40]; // 2x2
        let out = align_nearest_neighbor(&comp, 2, 2, 1, 1, 1, 1, 3, 3);
        assert_eq!(out.len(), 9);
        assert_eq!(out[2], 20); // last column clamps, doesn't read past comp
    }
}
