//! Table- and scan-header segment parsers (T.81 Annex B.2).
//!
//! Every parser here takes the segment *payload* — the bytes after the
//! 2-byte length field, already sliced to exactly that length by the
//! driver — rather than a stream, since the driver holds the whole file in
//! memory up front.

use crate::errors::DecodeErrors;
use crate::frame::FrameData;
use crate::huffman::HuffmanTable;
use crate::tables::QuantizationTable;

/// One `DQT` segment can define several tables; each entry is its
/// destination index (`0..=3`).
pub fn parse_dqt(payload: &[u8]) -> Result<Vec<(u8, QuantizationTable)>, DecodeErrors>
{
    let mut out = Vec::new();
    let mut i = 0usize;

    while i < payload.len()
    {
        let info = payload[i];
        let precision = info >> 4;
        let index = info & 0x0F;
        if index > 3
        {
            return Err(DecodeErrors::InvalidTable(format!(
                "Quantization table index {index} out of range 0..=3"
            )));
        }
        i += 1;

        let mut values = [0u16; 64];
        match precision
        {
            0 =>
            {
                let bytes = payload.get(i..i + 64).ok_or_else(|| {
                    DecodeErrors::Truncation("DQT segment shorter than an 8-bit table".to_string())
                })?;
                for (v, &b) in values.iter_mut().zip(bytes)
                {
                    *v = u16::from(b);
                }
                i += 64;
            }
            1 =>
            {
                let bytes = payload.get(i..i + 128).ok_or_else(|| {
                    DecodeErrors::Truncation("DQT segment shorter than a 16-bit table".to_string())
                })?;
                for (v, pair) in values.iter_mut().zip(bytes.chunks_exact(2))
                {
                    *v = u16::from_be_bytes([pair[0], pair[1]]);
                }
                i += 128;
            }
            _ =>
            {
                return Err(DecodeErrors::InvalidTable(format!(
                    "Quantization table precision nibble must be 0 or 1, found {precision}"
                )));
            }
        }

        out.push((index, QuantizationTable::from_zigzag(&values)?));
    }

    Ok(out)
}

/// One `DHT` segment can define several tables; `is_ac` distinguishes the
/// DC/AC class, and the `u8` is the destination index (`0..=3`).
pub fn parse_dht(payload: &[u8]) -> Result<Vec<(bool, u8, HuffmanTable)>, DecodeErrors>
{
    let mut out = Vec::new();
    let mut i = 0usize;

    while i < payload.len()
    {
        let info = payload.get(i).copied().ok_or_else(|| {
            DecodeErrors::Truncation("DHT segment ended mid-table-header".to_string())
        })?;
        let is_ac = (info >> 4) & 1 != 0;
        let index = info & 0x0F;
        if index > 3
        {
            return Err(DecodeErrors::InvalidTable(format!(
                "Huffman table index {index} out of range 0..=3"
            )));
        }
        i += 1;

        let counts_slice = payload.get(i..i + 16).ok_or_else(|| {
            DecodeErrors::Truncation("DHT segment ended mid-length-table".to_string())
        })?;
        let mut counts = [0u8; 16];
        counts.copy_from_slice(counts_slice);
        i += 16;

        let total: usize = counts.iter().map(|&c| usize::from(c)).sum();
        let symbols = payload.get(i..i + total).ok_or_else(|| {
            DecodeErrors::Truncation("DHT segment ended mid-symbol-list".to_string())
        })?;
        i += total;

        out.push((is_ac, index, HuffmanTable::new(&counts, symbols)?));
    }

    Ok(out)
}

/// Arithmetic conditioning table values from a `DAC` segment (T.81 Table
/// B.5), falling back to the standard defaults (`Tdc = 5`, `Tac = 0`) for
/// any class/table slot a `DAC` never touches.
#[derive(Clone)]
pub struct ConditioningTables
{
    pub dc: [u8; 4],
    pub ac: [u8; 4]
}

impl Default for ConditioningTables
{
    fn default() -> Self
    {
        ConditioningTables {
            dc: [5; 4],
            ac: [0; 4]
        }
    }
}

impl ConditioningTables
{
    /// Decode one DC conditioning slot's raw byte into its `(low, high)`
    /// threshold pair: `low = 0` if the low nibble is 0 else
    /// `1 << (low_nibble − 1)`; `high = 1 << high_nibble`.
    #[must_use]
    pub fn dc_thresholds(&self, index: u8) -> (i32, i32)
    {
        let byte = self.dc[usize::from(index)];
        let low_nibble = byte & 0x0F;
        let high_nibble = byte >> 4;
        let low = if low_nibble == 0 { 0 } else { 1i32 << (low_nibble - 1) };
        let high = 1i32 << high_nibble;
        (low, high)
    }
}

/// Apply a `DAC` segment's `(class<<4 | index, value)` pairs onto an
/// existing conditioning table set.
pub fn apply_dac(tables: &mut ConditioningTables, payload: &[u8]) -> Result<(), DecodeErrors>
{
    if payload.len() % 2 != 0
    {
        return Err(DecodeErrors::InvalidTable(
            "DAC segment length is not a whole number of (selector, value) pairs".to_string()
        ));
    }
    for pair in payload.chunks_exact(2)
    {
        let class = pair[0] >> 4;
        let index = usize::from(pair[0] & 0x0F);
        if index > 3
        {
            return Err(DecodeErrors::InvalidTable(format!(
                "DAC table index {index} out of range 0..=3"
            )));
        }
        match class
        {
            0 => tables.dc[index] = pair[1],
            1 => tables.ac[index] = pair[1],
            other =>
            {
                return Err(DecodeErrors::InvalidTable(format!(
                    "DAC class nibble must be 0 (DC) or 1 (AC), found {other}"
                )));
            }
        }
    }
    Ok(())
}

/// A `DRI` segment: the restart interval in MCUs, `0` meaning disabled.
pub fn parse_dri(payload: &[u8]) -> Result<u16, DecodeErrors>
{
    let bytes: [u8; 2] = payload
        .try_into()
        .map_err(|_| DecodeErrors::Truncation("DRI segment must be exactly 2 bytes".to_string()))?;
    Ok(u16::from_be_bytes(bytes))
}

/// One component's entry in a scan header.
pub struct ScanComponent
{
    pub component_id: u8,
    pub dc_table: u8,
    pub ac_table: u8
}

/// Everything decoded from a `SOS` segment.
pub struct ScanHeader
{
    pub components: Vec<ScanComponent>,
    pub spectral_start: u8,
    pub spectral_end: u8,
    pub approx_high: u8,
    pub approx_low: u8
}

/// Parse a `SOS` payload against the already-parsed frame, which it needs
/// in order to validate the declared component ids and default the
/// spectral-selection/successive-approximation fields for non-progressive
/// frames.
pub fn parse_sos(payload: &[u8], frame: &FrameData) -> Result<ScanHeader, DecodeErrors>
{
    let ns = usize::from(*payload.first().ok_or_else(|| {
        DecodeErrors::Truncation("SOS segment is empty".to_string())
    })?);

    if ns == 0 || ns > 4
    {
        return Err(DecodeErrors::ShapeMismatch(format!(
            "Scan declares {ns} components, expected 1..=4"
        )));
    }
    if payload.len() < 1 + ns * 2 + 3
    {
        return Err(DecodeErrors::Truncation(
            "SOS segment shorter than its declared component count implies".to_string()
        ));
    }

    let mut components = Vec::with_capacity(ns);
    for i in 0..ns
    {
        let base = 1 + i * 2;
        let component_id = payload[base];
        let tables_byte = payload[base + 1];

        if frame.component_by_id(component_id).is_none()
        {
            return Err(DecodeErrors::ShapeMismatch(format!(
                "Scan references component id {component_id} which the frame never declared"
            )));
        }

        components.push(ScanComponent {
            component_id,
            dc_table: tables_byte >> 4,
            ac_table: tables_byte & 0x0F
        });
    }

    let tail = &payload[1 + ns * 2..];
    let spectral_start = tail[0];
    let spectral_end = tail[1];
    let approx_high = tail[2] >> 4;
    let approx_low = tail[2] & 0x0F;

    if spectral_start > 63 || spectral_end > 63 || spectral_start > spectral_end
    {
        return Err(DecodeErrors::ShapeMismatch(format!(
            "Invalid spectral selection Ss={spectral_start} Se={spectral_end}"
        )));
    }

    Ok(ScanHeader {
        components,
        spectral_start,
        spectral_end,
        approx_high,
        approx_low
    })
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::marker::FrameMode;

    #[test]
    fn parses_a_single_8_bit_dqt_table()
    {
        let mut payload = vec![0x00u8]; // precision 0, index 0
        payload.extend(std::iter::repeat(2u8).take(64));
        let tables = parse_dqt(&payload).unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].0, 0);
    }

    #[test]
    fn rejects_out_of_range_dqt_index()
    {
        let mut payload = vec![0x04u8]; // index 4, invalid
        payload.extend(std::iter::repeat(1u8).take(64));
        assert!(parse_dqt(&payload).is_err());
    }

    #[test]
    fn parses_a_dht_table_matching_scenario_1()
    {
        let mut payload = vec![0x00u8]; // DC class, index 0
        let counts: [u8; 16] = [0, 1, 5, 1, 1, 1, 1, 1, 1, 0, 0, 0, 0, 0, 0, 0];
        payload.extend_from_slice(&counts);
        payload.extend(0u8..=11);
        let tables = parse_dht(&payload).unwrap();
        assert_eq!(tables.len(), 1);
        assert!(!tables[0].0); // DC
        assert_eq!(tables[0].1, 0);
    }

    #[test]
    fn dac_defaults_match_annex_f()
    {
        let tables = ConditioningTables::default();
        assert_eq!(tables.dc, [5, 5, 5, 5]);
        assert_eq!(tables.ac, [0, 0, 0, 0]);
    }

    #[test]
    fn dac_segment_overrides_one_slot()
    {
        let mut tables = ConditioningTables::default();
        apply_dac(&mut tables, &[0x01, 9]).unwrap(); // DC table 1 -> 9
        assert_eq!(tables.dc, [5, 9, 5, 5]);
    }

    #[test]
    fn dc_thresholds_decode_the_default_conditioning_byte()
    {
        let tables = ConditioningTables::default();
        assert_eq!(tables.dc_thresholds(0), (16, 1));
    }

    #[test]
    fn dc_thresholds_track_a_dac_override()
    {
        let mut tables = ConditioningTables::default();
        apply_dac(&mut tables, &[0x00, 0x23]).unwrap(); // DC table 0 -> low=3,high=2
        assert_eq!(tables.dc_thresholds(0), (4, 4));
    }

    fn sof_payload(width: u16, height: u16, components: &[(u8, u8, u8)]) -> Vec<u8>
    {
        let mut v = vec![8u8];
        v.extend_from_slice(&height.to_be_bytes());
        v.extend_from_slice(&width.to_be_bytes());
        v.push(components.len() as u8);
        for &(id, sampling, qt) in components
        {
            v.extend_from_slice(&[id, sampling, qt]);
        }
        v
    }

    #[test]
    fn parses_sos_for_a_known_frame()
    {
        let sof = sof_payload(8, 8, &[(1, 0x11, 0), (2, 0x11, 1)]);
        let frame = FrameData::parse(FrameMode::Baseline, &sof).unwrap();
        let sos = [2, 1, 0x00, 2, 0x11, 0, 63, 0];
        let scan = parse_sos(&sos, &frame).unwrap();
        assert_eq!(scan.components.len(), 2);
        assert_eq!(scan.spectral_end, 63);
    }

    #[test]
    fn sos_rejects_unknown_component_id()
    {
        let sof = sof_payload(8, 8, &[(1, 0x11, 0)]);
        let frame = FrameData::parse(FrameMode::Baseline, &sof).unwrap();
        let sos = [1, 9, 0x00, 0, 63, 0];
        assert!(parse_sos(&sos, &frame).is_err());
    }
}
