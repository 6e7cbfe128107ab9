//! Segment-level frame/scan driver (T.81 Annex B.2, Annex E.2, Annex G.2).
//!
//! Walks markers top to bottom, dispatches each segment to its parser in
//! [`crate::headers`], drives one or more scans' entropy decoding via
//! [`crate::scan`]/[`crate::progressive`], and assembles the final raster
//! once every coefficient grid has been filled.

use crate::arithmetic::{ArithDecoder, AcContexts, DcCategory, DcContexts};
use crate::bitreader::{find_segment_end, unstuff_segment};
use crate::color_convert::{gray_to_rgb, ycbcr_to_rgb};
use crate::errors::{DecodeErrors, UnsupportedScheme};
use crate::frame::{CoefficientGrid, FrameData};
use crate::headers::{
    apply_dac, parse_dht, parse_dqt, parse_dri, parse_sos, ConditioningTables, ScanHeader
};
use crate::huffman::HuffmanTable;
use crate::idct::idct_8x8;
use crate::marker::{classify_sof, Marker};
use crate::progressive::{
    arith_ac_first, arith_ac_refine, arith_dc_first, arith_dc_refine, huffman_ac_first,
    huffman_ac_refine, huffman_dc_first, huffman_dc_refine, EobRun
};
use crate::scan::{decode_arithmetic_block, decode_huffman_block, BlockWalk, HuffmanScanTables};
use crate::tables::{dequantize_zigzag, QuantizationTable};
use crate::upsampler::align_nearest_neighbor;

/// Decodes one JPEG image. Holds table and conditioning state that persists
/// across the whole byte stream; a fresh instance should be built for each
/// image decoded.
#[derive(Default)]
pub struct Decoder
{
    quant_tables: [Option<QuantizationTable>; 4],
    dc_tables: [Option<HuffmanTable>; 4],
    ac_tables: [Option<HuffmanTable>; 4],
    conditioning: ConditioningTables,
    restart_interval: u16
}

/// Per-scan-component bookkeeping that rides along for the whole scan:
/// which coefficient grid it writes into, how its blocks are addressed, and
/// (for arithmetic coding) its own adaptive statistics.
struct ScanComponentState
{
    component_idx: usize,
    walk: BlockWalk,
    dc_table_idx: u8,
    ac_table_idx: u8,
    kx: usize,
    dc_low: i32,
    dc_cx: DcContexts,
    ac_cx: AcContexts,
    eob_run: EobRun,
    prev_category: DcCategory
}

impl Decoder
{
    #[must_use]
    pub fn new() -> Decoder
    {
        Decoder {
            conditioning: ConditioningTables::default(),
            ..Decoder::default()
        }
    }

    /// Decode a complete JPEG file held in memory.
    ///
    /// Returns the parsed frame metadata plus an interleaved 8-bit RGB
    /// raster (`width * height * 3` bytes, row-major, no padding).
    ///
    /// # Errors
    /// Any [`DecodeErrors`] variant the bitstream can trigger: truncation,
    /// a misplaced or unsupported marker, a malformed table, an entropy
    /// bitstream that doesn't decode, or a scan referencing an undeclared
    /// component.
    pub fn decode(&mut self, data: &[u8]) -> Result<(FrameData, Vec<u8>), DecodeErrors>
    {
        if data.len() < 4 || data[0] != 0xFF || data[1] != 0xD8
        {
            return Err(DecodeErrors::InvalidMarker(
                "File does not start with an SOI marker".to_string()
            ));
        }
        trace!("SOI found, beginning marker scan");

        let mut i = 2usize;
        let mut frame: Option<FrameData> = None;
        let mut grids: Vec<CoefficientGrid> = Vec::new();

        loop
        {
            while data.get(i) == Some(&0xFF) && data.get(i + 1) == Some(&0xFF)
            {
                i += 1;
            }
            if data.get(i) != Some(&0xFF)
            {
                return Err(DecodeErrors::Truncation(
                    "Marker scan ran off the end of the file before EOI".to_string()
                ));
            }
            let marker_byte = data[i + 1];
            let Some(marker) = Marker::from_u8(marker_byte)
            else
            {
                return Err(DecodeErrors::InvalidMarker(format!(
                    "Stray {marker_byte:#04x} byte outside an entropy-coded segment"
                )));
            };
            i += 2;

            match marker
            {
                Marker::SOI =>
                {
                    self.restart_interval = 0;
                }
                Marker::EOI =>
                {
                    debug!("EOI reached");
                    break;
                }
                Marker::RST(_) =>
                {
                    // A restart marker outside a scan's entropy data is not
                    // expected from a conforming encoder; skip it.
                    warn!("Restart marker found outside any scan, skipping");
                }
                other =>
                {
                    let length = read_segment_length(data, i)?;
                    let payload = data.get(i + 2..i + length).ok_or_else(|| {
                        DecodeErrors::Truncation(
                            "Segment length runs past the end of the file".to_string()
                        )
                    })?;

                    match other
                    {
                        Marker::SOF(raw) =>
                        {
                            let mode = classify_sof(raw).ok_or_else(|| {
                                DecodeErrors::UnsupportedMode(if raw == 0xC3 || raw == 0xCB
                                {
                                    UnsupportedScheme::Lossless
                                }
                                else
                                {
                                    UnsupportedScheme::Hierarchical
                                })
                            })?;
                            debug!("SOF marker {raw:#04x} parsed as {mode:?}");
                            let parsed = FrameData::parse(mode, payload)?;
                            grids = parsed
                                .components
                                .iter()
                                .map(|c| CoefficientGrid::new(c.blocks_per_line, c.blocks_per_column))
                                .collect();
                            frame = Some(parsed);
                        }
                        Marker::DHT =>
                        {
                            for (is_ac, idx, table) in parse_dht(payload)?
                            {
                                if is_ac
                                {
                                    self.ac_tables[usize::from(idx)] = Some(table);
                                }
                                else
                                {
                                    self.dc_tables[usize::from(idx)] = Some(table);
                                }
                            }
                        }
                        Marker::DQT =>
                        {
                            for (idx, table) in parse_dqt(payload)?
                            {
                                self.quant_tables[usize::from(idx)] = Some(table);
                            }
                        }
                        Marker::DAC =>
                        {
                            apply_dac(&mut self.conditioning, payload)?;
                        }
                        Marker::DRI =>
                        {
                            self.restart_interval = parse_dri(payload)?;
                            debug!("Restart interval set to {}", self.restart_interval);
                        }
                        Marker::SOS =>
                        {
                            let frame_ref = frame.as_mut().ok_or_else(|| {
                                DecodeErrors::ShapeMismatch(
                                    "SOS segment appeared before any SOF".to_string()
                                )
                            })?;
                            let scan = parse_sos(payload, frame_ref)?;
                            i += length - 2;
                            debug!(
                                "SOS: {} component(s), Ss={} Se={} Ah={} Al={}",
                                scan.components.len(),
                                scan.spectral_start,
                                scan.spectral_end,
                                scan.approx_high,
                                scan.approx_low
                            );
                            i = self.decode_scan(data, i, frame_ref, &scan, &mut grids)?;
                            continue;
                        }
                        // COM, APPn, DNL, and anything else recognized but
                        // not acted upon: skip by length.
                        _ =>
                        {}
                    }
                    i += length - 2;
                }
            }
        }

        let frame = frame.ok_or_else(|| {
            DecodeErrors::ShapeMismatch("File reached EOI without ever declaring a frame".to_string())
        })?;
        let raster = assemble_raster(&frame, &grids, &self.quant_tables)?;
        Ok((frame, raster))
    }

    /// Decode one scan's entropy-coded data, split across however many
    /// restart-interval segments it contains. Returns the index of the
    /// marker that ends the scan (a restart marker is consumed internally
    /// and never returned; anything else is left for the main loop).
    fn decode_scan(
        &mut self, data: &[u8], start: usize, frame: &mut FrameData, scan: &ScanHeader,
        grids: &mut [CoefficientGrid]
    ) -> Result<usize, DecodeErrors>
    {
        let is_arithmetic = frame.mode.is_arithmetic();
        let is_progressive = frame.mode.is_progressive();
        let interleaved = scan.components.len() > 1;

        let mut states = Vec::with_capacity(scan.components.len());
        for sc in &scan.components
        {
            let component_idx = frame
                .components
                .iter()
                .position(|c| c.id == sc.component_id)
                .ok_or_else(|| {
                    DecodeErrors::ShapeMismatch(format!(
                        "Scan component id {} has no matching frame component",
                        sc.component_id
                    ))
                })?;
            let walk = BlockWalk::new(frame, &frame.components[component_idx], interleaved);
            let kx = usize::from(self.conditioning.ac[usize::from(sc.ac_table)]);
            let (dc_low, _dc_high) = self.conditioning.dc_thresholds(sc.dc_table);
            states.push(ScanComponentState {
                component_idx,
                walk,
                dc_table_idx: sc.dc_table,
                ac_table_idx: sc.ac_table,
                kx,
                dc_low,
                dc_cx: DcContexts::default(),
                ac_cx: AcContexts::default(),
                eob_run: EobRun::default(),
                prev_category: DcCategory::Zero
            });
            frame.components[component_idx].reset_dc_predictor();
        }

        let total_units = states[0].walk.total_units(frame);
        let mut unit_index = 0usize;
        let mut pos = start;

        while unit_index < total_units
        {
            let (seg_end, marker) = find_segment_end(data, pos);
            let unstuffed = unstuff_segment(&data[pos..seg_end]);

            let units_this_segment = if self.restart_interval > 0
            {
                usize::from(self.restart_interval)
            }
            else
            {
                total_units
            }
            .min(total_units - unit_index);

            if is_arithmetic
            {
                let mut dec = ArithDecoder::new(&unstuffed);
                for m in unit_index..unit_index + units_this_segment
                {
                    decode_arithmetic_unit(
                        &mut dec, frame, scan, &mut states, grids, is_progressive, m
                    )?;
                }
            }
            else
            {
                let mut cursor = (0usize, 0u8);
                for m in unit_index..unit_index + units_this_segment
                {
                    cursor = decode_huffman_unit(
                        &unstuffed,
                        cursor,
                        frame,
                        scan,
                        &self.dc_tables,
                        &self.ac_tables,
                        &mut states,
                        grids,
                        is_progressive,
                        m
                    )?;
                }
            }

            unit_index += units_this_segment;

            match marker
            {
                Some(m) if (0xD0..=0xD7).contains(&m) =>
                {
                    trace!("Restart marker RST{} resync at unit {unit_index}", m - 0xD0);
                    pos = seg_end + 2;
                    for state in &mut states
                    {
                        frame.components[state.component_idx].reset_dc_predictor();
                        state.prev_category = DcCategory::Zero;
                        state.dc_cx = DcContexts::default();
                        state.ac_cx = AcContexts::default();
                        state.eob_run = EobRun::default();
                    }
                }
                _ =>
                {
                    return Ok(seg_end);
                }
            }
        }

        Ok(pos)
    }
}

/// Convert a `CoefficientGrid` block's 64-element slice into a fixed-size
/// array reference. The grid always hands out exactly 64 elements per
/// block by construction.
fn as_block(slice: &mut [i32]) -> &mut [i32; 64]
{
    slice.try_into().expect("coefficient grid blocks are always 64 elements")
}

#[allow(clippy::too_many_arguments)]
fn decode_huffman_unit(
    buf: &[u8], mut cursor: (usize, u8), frame: &mut FrameData, scan: &ScanHeader,
    dc_tables: &[Option<HuffmanTable>; 4], ac_tables: &[Option<HuffmanTable>; 4],
    states: &mut [ScanComponentState], grids: &mut [CoefficientGrid], is_progressive: bool,
    m: usize
) -> Result<(usize, u8), DecodeErrors>
{
    for state in states.iter_mut()
    {
        // AC-only progressive scans carry a DC table selector too but never
        // use it; only resolve each table when the scan band actually needs
        // it, so an unused selector pointing at an undefined slot doesn't
        // spuriously fail a scan that never reads it.
        let dc_table = dc_tables[usize::from(state.dc_table_idx)].as_ref();
        let ac_table = ac_tables[usize::from(state.ac_table_idx)].as_ref();

        for (bx, by) in state.walk.blocks_for_mcu(m)
        {
            let component_idx = state.component_idx;
            let predictor = frame.components[component_idx].dc_predictor;
            let block = grids[component_idx].block_mut(bx, by);

            if !is_progressive
            {
                let dc_table = dc_table.ok_or_else(|| {
                    DecodeErrors::ShapeMismatch(format!(
                        "Scan references DC Huffman table {} which was never defined",
                        state.dc_table_idx
                    ))
                })?;
                let ac_table = ac_table.ok_or_else(|| {
                    DecodeErrors::ShapeMismatch(format!(
                        "Scan references AC Huffman table {} which was never defined",
                        state.ac_table_idx
                    ))
                })?;
                let tables = HuffmanScanTables { dc: dc_table, ac: ac_table };
                let (ni, nb, dc) =
                    decode_huffman_block(buf, cursor.0, cursor.1, &tables, predictor, block)?;
                cursor = (ni, nb);
                frame.components[component_idx].dc_predictor = dc;
            }
            else if scan.spectral_start == 0
            {
                if scan.approx_high == 0
                {
                    let dc_table = dc_table.ok_or_else(|| {
                        DecodeErrors::ShapeMismatch(format!(
                            "Scan references DC Huffman table {} which was never defined",
                            state.dc_table_idx
                        ))
                    })?;
                    let (ni, nb, dc) = huffman_dc_first(
                        buf,
                        cursor.0,
                        cursor.1,
                        dc_table,
                        predictor,
                        scan.approx_low,
                        &mut block[0]
                    )?;
                    cursor = (ni, nb);
                    frame.components[component_idx].dc_predictor = dc;
                }
                else
                {
                    let (ni, nb) =
                        huffman_dc_refine(buf, cursor.0, cursor.1, scan.approx_low, &mut block[0])?;
                    cursor = (ni, nb);
                }
            }
            else
            {
                let ac_table = ac_table.ok_or_else(|| {
                    DecodeErrors::ShapeMismatch(format!(
                        "Scan references AC Huffman table {} which was never defined",
                        state.ac_table_idx
                    ))
                })?;
                let block = as_block(block);
                let (ni, nb) = if scan.approx_high == 0
                {
                    huffman_ac_first(
                        buf,
                        cursor.0,
                        cursor.1,
                        ac_table,
                        scan.spectral_start,
                        scan.spectral_end,
                        scan.approx_low,
                        &mut state.eob_run,
                        block
                    )?
                }
                else
                {
                    huffman_ac_refine(
                        buf,
                        cursor.0,
                        cursor.1,
                        ac_table,
                        scan.spectral_start,
                        scan.spectral_end,
                        scan.approx_low,
                        &mut state.eob_run,
                        block
                    )?
                };
                cursor = (ni, nb);
            }
        }
    }
    Ok(cursor)
}

fn decode_arithmetic_unit(
    dec: &mut ArithDecoder<'_>, frame: &mut FrameData, scan: &ScanHeader,
    states: &mut [ScanComponentState], grids: &mut [CoefficientGrid], is_progressive: bool,
    m: usize
) -> Result<(), DecodeErrors>
{
    for state in states.iter_mut()
    {
        for (bx, by) in state.walk.blocks_for_mcu(m)
        {
            let component_idx = state.component_idx;
            let predictor = frame.components[component_idx].dc_predictor;
            let block = grids[component_idx].block_mut(bx, by);

            if !is_progressive
            {
                let (dc, category) = decode_arithmetic_block(
                    dec,
                    &mut state.dc_cx,
                    &mut state.ac_cx,
                    state.kx,
                    state.dc_low,
                    predictor,
                    state.prev_category,
                    block
                )?;
                frame.components[component_idx].dc_predictor = dc;
                state.prev_category = category;
            }
            else if scan.spectral_start == 0
            {
                if scan.approx_high == 0
                {
                    let (dc, category) = arith_dc_first(
                        dec,
                        &mut state.dc_cx,
                        state.dc_low,
                        predictor,
                        state.prev_category,
                        scan.approx_low,
                        &mut block[0]
                    )?;
                    frame.components[component_idx].dc_predictor = dc;
                    state.prev_category = category;
                }
                else
                {
                    arith_dc_refine(dec, scan.approx_low, &mut block[0]);
                }
            }
            else
            {
                let block = as_block(block);
                if scan.approx_high == 0
                {
                    arith_ac_first(
                        dec,
                        &mut state.ac_cx,
                        scan.spectral_start,
                        scan.spectral_end,
                        scan.approx_low,
                        state.kx,
                        &mut state.eob_run,
                        block
                    )?;
                }
                else
                {
                    arith_ac_refine(
                        dec,
                        &mut state.ac_cx,
                        scan.spectral_start,
                        scan.spectral_end,
                        scan.approx_low,
                        state.kx,
                        &mut state.eob_run,
                        block
                    )?;
                }
            }
        }
    }
    Ok(())
}

/// Read a segment's 2-byte big-endian length field at `i` (the length
/// includes the 2 length bytes themselves), validating it against the
/// remaining buffer.
fn read_segment_length(data: &[u8], i: usize) -> Result<usize, DecodeErrors>
{
    let bytes = data.get(i..i + 2).ok_or_else(|| {
        DecodeErrors::Truncation("Segment ended before its length field".to_string())
    })?;
    let length = usize::from(u16::from_be_bytes([bytes[0], bytes[1]]));
    if length < 2
    {
        return Err(DecodeErrors::InvalidMarker(format!(
            "Segment length {length} is smaller than the length field itself"
        )));
    }
    if i + length > data.len()
    {
        return Err(DecodeErrors::Truncation(
            "Segment length runs past the end of the file".to_string()
        ));
    }
    Ok(length)
}

/// Turn every component's filled-in coefficient grid into a final RGB (or
/// grayscale-expanded-to-RGB) raster: dequantize, un-zig-zag, inverse DCT,
/// level-shift, chroma-align, color-convert.
fn assemble_raster(
    frame: &FrameData, grids: &[CoefficientGrid], quant_tables: &[Option<QuantizationTable>; 4]
) -> Result<Vec<u8>, DecodeErrors>
{
    let mut planes: Vec<Vec<u8>> = Vec::with_capacity(frame.components.len());

    for (component, grid) in frame.components.iter().zip(grids)
    {
        let table = quant_tables[usize::from(component.quant_table_idx)].as_ref().ok_or_else(|| {
            DecodeErrors::ShapeMismatch(format!(
                "Component {} references quantization table {} which was never defined",
                component.id, component.quant_table_idx
            ))
        })?;

        let comp_width = grid.blocks_per_line * 8;
        let comp_height = grid.blocks_per_column * 8;
        let mut plane = vec![0u8; comp_width * comp_height];

        for by in 0..grid.blocks_per_column
        {
            for bx in 0..grid.blocks_per_line
            {
                let coeffs: [i32; 64] =
                    grid.block(bx, by).try_into().expect("blocks are always 64 elements");
                let dequantized = dequantize_zigzag(&coeffs, table);
                let samples = idct_8x8(&dequantized);

                for y in 0..8
                {
                    for x in 0..8
                    {
                        let px = bx * 8 + x;
                        let py = by * 8 + y;
                        let shifted = (samples[y * 8 + x] + 128.0).round().clamp(0.0, 255.0) as u8;
                        plane[py * comp_width + px] = shifted;
                    }
                }
            }
        }

        planes.push(align_nearest_neighbor(
            &plane,
            comp_width,
            comp_height,
            component.horiz_sampling,
            component.vert_sampling,
            frame.max_h,
            frame.max_v,
            frame.width,
            frame.height
        ));
    }

    let mut raster = vec![0u8; frame.width * frame.height * 3];

    if planes.len() == 1
    {
        for (px, &y) in planes[0].iter().enumerate()
        {
            let rgb = gray_to_rgb(f32::from(y));
            raster[px * 3..px * 3 + 3].copy_from_slice(&rgb);
        }
    }
    else
    {
        for px in 0..frame.width * frame.height
        {
            let y = f32::from(planes[0][px]);
            let cb = f32::from(planes[1][px]);
            let cr = f32::from(planes[2][px]);
            let rgb = ycbcr_to_rgb(y, cb, cr);
            raster[px * 3..px * 3 + 3].copy_from_slice(&rgb);
        }
    }

    Ok(raster)
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::headers::{parse_dht, parse_dqt};
    use crate::huffman::HuffmanTable;

    /// Build the smallest possible baseline grayscale JPEG: one 8x8 block,
    /// a trivial DC-only Huffman code, and a flat quant table.
    fn minimal_gray_jpeg() -> Vec<u8>
    {
        let mut file = vec![0xFF, 0xD8]; // SOI

        // DQT: index 0, all ones (identity dequantization).
        let mut dqt_payload = vec![0x00u8];
        dqt_payload.extend(std::iter::repeat(1u8).take(64));
        push_segment(&mut file, 0xDB, &dqt_payload);

        // DHT DC: one 2-bit code "00" -> symbol 0 (category 0, diff 0).
        let mut dht_dc = vec![0x00u8];
        let mut counts = [0u8; 16];
        counts[1] = 1;
        dht_dc.extend_from_slice(&counts);
        dht_dc.push(0x00);
        push_segment(&mut file, 0xC4, &dht_dc);

        // DHT AC: one 2-bit code "00" -> symbol 0x00 (EOB).
        let mut dht_ac = vec![0x10u8];
        let mut ac_counts = [0u8; 16];
        ac_counts[1] = 1;
        dht_ac.extend_from_slice(&ac_counts);
        dht_ac.push(0x00);
        push_segment(&mut file, 0xC4, &dht_ac);

        // SOF0: 8-bit precision, 8x8, one component, 1x1 sampling, quant 0.
        let sof = vec![8u8, 0, 8, 0, 8, 1, 1, 0x11, 0];
        push_segment(&mut file, 0xC0, &sof);

        // SOS: one component, DC/AC table 0, Ss=0 Se=63 Ah=0 Al=0.
        let sos = vec![1u8, 1, 0x00, 0, 63, 0];
        push_segment(&mut file, 0xDA, &sos);

        // Entropy data: DC code "00" then AC code "00" (EOB), padded with 1 bits.
        file.push(0b0000_1111);

        file.extend_from_slice(&[0xFF, 0xD9]); // EOI
        file
    }

    fn push_segment(file: &mut Vec<u8>, marker: u8, payload: &[u8])
    {
        file.push(0xFF);
        file.push(marker);
        let len = (payload.len() + 2) as u16;
        file.extend_from_slice(&len.to_be_bytes());
        file.extend_from_slice(payload);
    }

    #[test]
    fn decodes_a_minimal_flat_gray_image()
    {
        let file = minimal_gray_jpeg();
        let mut decoder = Decoder::new();
        let (frame, raster) = decoder.decode(&file).unwrap();
        assert_eq!(frame.width, 8);
        assert_eq!(frame.height, 8);
        assert_eq!(raster.len(), 8 * 8 * 3);
        // DC-only, all-zero coefficients -> flat mid-gray plane after the
        // +128 level shift.
        assert!(raster.iter().all(|&v| v == 128));
    }

    #[test]
    fn segment_length_rejects_a_field_smaller_than_itself()
    {
        let data = [0x00u8, 0x01];
        assert!(matches!(
            read_segment_length(&data, 0),
            Err(DecodeErrors::InvalidMarker(_))
        ));
    }

    #[test]
    fn missing_soi_is_rejected()
    {
        let mut decoder = Decoder::new();
        assert!(decoder.decode(&[0x00, 0x01, 0x02]).is_err());
    }

    #[test]
    fn builders_agree_with_standalone_header_parsers()
    {
        // Sanity check that the hand-rolled fixture payloads above are
        // actually well-formed against the real parsers.
        let mut dqt_payload = vec![0x00u8];
        dqt_payload.extend(std::iter::repeat(1u8).take(64));
        assert_eq!(parse_dqt(&dqt_payload).unwrap().len(), 1);

        let mut counts = [0u8; 16];
        counts[1] = 1;
        let mut dht_dc = vec![0x00u8];
        dht_dc.extend_from_slice(&counts);
        dht_dc.push(0x00);
        let tables = parse_dht(&dht_dc).unwrap();
        assert_eq!(tables.len(), 1);
        let _: &HuffmanTable = &tables[0].2;
    }
}
