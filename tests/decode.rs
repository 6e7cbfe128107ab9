//! End-to-end decode tests against hand-built minimal JPEG byte streams.
//!
//! Every fixture here is constructed rather than loaded from disk: each one
//! is the smallest file that exercises one decoder behavior (color
//! conversion, restart resync, non-8-multiple cropping, clamping,
//! progressive scan composition, arithmetic coding) with bit patterns
//! traced by hand against the tables the fixture itself defines.

use jpeg_core::{decode, DecodeErrors, Decoder};

fn push_segment(file: &mut Vec<u8>, marker: u8, payload: &[u8])
{
    file.push(0xFF);
    file.push(marker);
    let len = (payload.len() + 2) as u16;
    file.extend_from_slice(&len.to_be_bytes());
    file.extend_from_slice(payload);
}

/// A single-symbol DHT table payload: one code of length 1 ("0") mapping to
/// `symbol`. `class` is 0x00 for DC, 0x10 for AC.
fn single_symbol_dht(class: u8, index: u8, symbol: u8) -> Vec<u8>
{
    let mut payload = vec![class | index];
    let mut counts = [0u8; 16];
    counts[0] = 1;
    payload.extend_from_slice(&counts);
    payload.push(symbol);
    payload
}

fn flat_dqt(index: u8) -> Vec<u8>
{
    let mut payload = vec![index];
    payload.extend(std::iter::repeat(1u8).take(64));
    payload
}

#[test]
fn color_frame_with_neutral_chroma_matches_gray_of_the_luma_plane()
{
    // Y: DC table 0 (code "0" -> size 7), Cb/Cr: DC table 1 (code "0" ->
    // size 0, i.e. always a zero difference). All three share AC table 0
    // (code "0" -> EOB). Entropy data: Y's DC magnitude bits encode 64.
    let mut file = vec![0xFF, 0xD8];
    push_segment(&mut file, 0xDB, &flat_dqt(0));
    push_segment(&mut file, 0xC4, &single_symbol_dht(0x00, 0, 7));
    push_segment(&mut file, 0xC4, &single_symbol_dht(0x00, 1, 0));
    push_segment(&mut file, 0xC4, &single_symbol_dht(0x10, 0, 0x00));
    let sof = vec![8u8, 0, 8, 0, 8, 3, 1, 0x11, 0, 2, 0x11, 0, 3, 0x11, 0];
    push_segment(&mut file, 0xC0, &sof);
    let sos = vec![3u8, 1, 0x00, 2, 0x10, 3, 0x10, 0, 63, 0];
    push_segment(&mut file, 0xDA, &sos);
    // 0x40, 0x00: Y DC code "0" + magnitude "1000000" (=64) + Y AC EOB "0",
    // then Cb/Cr DC "0" + AC "0" each, padded with zero bits.
    file.extend_from_slice(&[0x40, 0x00]);
    file.extend_from_slice(&[0xFF, 0xD9]);

    let (frame, raster) = decode(&file).unwrap();
    assert_eq!(frame.width, 8);
    assert_eq!(frame.height, 8);
    assert_eq!(raster.len(), 8 * 8 * 3);
    for px in raster.chunks_exact(3)
    {
        assert_eq!(px, [136, 136, 136]);
    }
}

#[test]
fn restart_marker_resets_the_dc_predictor_between_segments()
{
    // Two 1x1-sampled MCUs in a row, DRI=1. Both blocks use the same DC
    // code (diff 64 each). Without a predictor reset at the restart marker
    // the second block's level would be double the first's.
    let mut file = vec![0xFF, 0xD8];
    push_segment(&mut file, 0xDB, &flat_dqt(0));
    push_segment(&mut file, 0xC4, &single_symbol_dht(0x00, 0, 7));
    push_segment(&mut file, 0xC4, &single_symbol_dht(0x10, 0, 0x00));
    let sof = vec![8u8, 0, 8, 0, 16, 1, 1, 0x11, 0];
    push_segment(&mut file, 0xC0, &sof);
    push_segment(&mut file, 0xDD, &[0x00, 0x01]); // DRI = 1
    let sos = vec![1u8, 1, 0x00, 0, 63, 0];
    push_segment(&mut file, 0xDA, &sos);
    // MCU0: DC "0"+"1000000"+AC "0", padded to a byte boundary.
    file.extend_from_slice(&[0x40, 0x00]);
    file.extend_from_slice(&[0xFF, 0xD0]); // RST0
    // MCU1: identical bit pattern.
    file.extend_from_slice(&[0x40, 0x00]);
    file.extend_from_slice(&[0xFF, 0xD9]);

    let (frame, raster) = decode(&file).unwrap();
    assert_eq!(frame.width, 16);
    assert_eq!(frame.height, 8);
    // Both 8x8 blocks decode to the same flat level: 128 + 64/8 = 136.
    for x in [0usize, 8]
    {
        let px = (0 * 16 + x) * 3;
        assert_eq!(&raster[px..px + 3], [136, 136, 136]);
    }
}

#[test]
fn non_multiple_of_eight_dimensions_crop_to_the_declared_size()
{
    // 13x13, single component, no subsampling: a non-interleaved scan over
    // a 2x2 block grid padded out to 16x16 and cropped back down.
    let mut file = vec![0xFF, 0xD8];
    push_segment(&mut file, 0xDB, &flat_dqt(0));
    push_segment(&mut file, 0xC4, &single_symbol_dht(0x00, 0, 0));
    push_segment(&mut file, 0xC4, &single_symbol_dht(0x10, 0, 0x00));
    let sof = vec![8u8, 0, 13, 0, 13, 1, 1, 0x11, 0];
    push_segment(&mut file, 0xC0, &sof);
    let sos = vec![1u8, 1, 0x00, 0, 63, 0];
    push_segment(&mut file, 0xDA, &sos);
    // Four blocks, each DC "0" (diff 0) + AC "0" (EOB): 2 bits each, 8 bits
    // total, no padding needed.
    file.push(0b0000_0000);
    file.extend_from_slice(&[0xFF, 0xD9]);

    let (frame, raster) = decode(&file).unwrap();
    assert_eq!(frame.width, 13);
    assert_eq!(frame.height, 13);
    assert_eq!(raster.len(), 13 * 13 * 3);
    assert!(raster.iter().all(|&v| v == 128));
}

#[test]
fn pixel_values_clamp_instead_of_wrapping_past_255()
{
    // DC difference 4088 (size 12) pushes the flat IDCT output to 511,
    // which must clamp to 255 rather than wrap.
    let mut file = vec![0xFF, 0xD8];
    push_segment(&mut file, 0xDB, &flat_dqt(0));
    push_segment(&mut file, 0xC4, &single_symbol_dht(0x00, 0, 12));
    push_segment(&mut file, 0xC4, &single_symbol_dht(0x10, 0, 0x00));
    let sof = vec![8u8, 0, 8, 0, 8, 1, 1, 0x11, 0];
    push_segment(&mut file, 0xC0, &sof);
    let sos = vec![1u8, 1, 0x00, 0, 63, 0];
    push_segment(&mut file, 0xDA, &sos);
    file.extend_from_slice(&[0x7F, 0xC0]);
    file.extend_from_slice(&[0xFF, 0xD9]);

    let (_, raster) = decode(&file).unwrap();
    assert!(raster.iter().all(|&v| v == 255));
}

#[test]
fn progressive_dc_first_scan_and_refinement_compose_into_one_value()
{
    // DC first scan (Al=1) decodes a difference of 5 -> coefficient 10.
    // The refinement scan (Ah=1, Al=0) ORs in bit 0, giving 11.
    let mut file = vec![0xFF, 0xD8];
    push_segment(&mut file, 0xDB, &flat_dqt(0));
    push_segment(&mut file, 0xC4, &single_symbol_dht(0x00, 0, 3));
    let sof = vec![8u8, 0, 8, 0, 8, 1, 1, 0x11, 0];
    push_segment(&mut file, 0xC2, &sof); // SOF2: progressive

    let sos_first = vec![1u8, 1, 0x00, 0, 0, 0x01];
    push_segment(&mut file, 0xDA, &sos_first);
    // DC code "0" + magnitude "101" (=5), zero-padded to a byte.
    file.push(0b0101_0000);

    let sos_refine = vec![1u8, 1, 0x00, 0, 0, 0x10];
    push_segment(&mut file, 0xDA, &sos_refine);
    // A single refinement bit "1", zero-padded.
    file.push(0b1000_0000);

    file.extend_from_slice(&[0xFF, 0xD9]);

    let (_, raster) = decode(&file).unwrap();
    // Coefficient 11, IDCT flat level 11/8 = 1.375 -> +128 -> round to 129.
    assert!(raster.iter().all(|&v| v == 129));
}

#[test]
fn arithmetic_coded_frame_decodes_and_stays_grayscale()
{
    // SOF9: extended-sequential, arithmetic coding. No entropy bytes at
    // all before EOI; the arithmetic decoder treats a fully exhausted
    // segment the same as a run of 0xFF marker-stuffing bytes, a
    // well-defined (if degenerate) bitstream.
    let mut file = vec![0xFF, 0xD8];
    push_segment(&mut file, 0xDB, &flat_dqt(0));
    let sof = vec![8u8, 0, 8, 0, 8, 1, 1, 0x11, 0];
    push_segment(&mut file, 0xC9, &sof);
    let sos = vec![1u8, 1, 0x00, 0, 63, 0];
    push_segment(&mut file, 0xDA, &sos);
    file.extend_from_slice(&[0xFF, 0xD9]);

    let (frame, raster) = decode(&file).unwrap();
    assert_eq!(frame.width, 8);
    assert_eq!(frame.height, 8);
    // Single-component frames always replicate the gray sample across
    // every channel, regardless of what the entropy decoder produced.
    for px in raster.chunks_exact(3)
    {
        assert_eq!(px[0], px[1]);
        assert_eq!(px[1], px[2]);
    }
}

#[test]
fn non_1_1_1_sampling_on_a_non_aligned_size_reproduces_each_quadrant()
{
    // 13x13, 4:2:0-style sampling (Y 2x2, Cb/Cr 1x1): one MCU covering a
    // 16x16-padded grid of four distinct Y blocks (Cb/Cr held flat at the
    // neutral chroma diff of 0), cropped back down to 13x13. Mirrors the
    // structure of a four-quadrant reference raster: each of the four 8x8
    // corners should keep its own DC level across the crop boundary, the
    // same non-1:1:1/non-aligned-size combination a subsampled
    // non-interleaved walk has to get right.
    let mut file = vec![0xFF, 0xD8];
    push_segment(&mut file, 0xDB, &flat_dqt(0));
    push_segment(&mut file, 0xC4, &single_symbol_dht(0x00, 0, 7)); // Y DC: size 7
    push_segment(&mut file, 0xC4, &single_symbol_dht(0x00, 1, 0)); // Cb/Cr DC: size 0
    push_segment(&mut file, 0xC4, &single_symbol_dht(0x10, 0, 0x00)); // shared AC: EOB
    let sof = vec![8u8, 0, 13, 0, 13, 3, 1, 0x22, 0, 2, 0x11, 0, 3, 0x11, 0];
    push_segment(&mut file, 0xC0, &sof);
    let sos = vec![3u8, 1, 0x00, 2, 0x10, 3, 0x10, 0, 63, 0];
    push_segment(&mut file, 0xDA, &sos);
    // Four Y blocks (diffs 64, -120, 96, -112 -> running DC 64, -56, 40,
    // -72, i.e. gray levels 136, 121, 133, 119), then Cb and Cr each a
    // single flat (diff 0) block.
    file.extend_from_slice(&[0x40, 0x03, 0x98, 0x01, 0xE0]);
    file.extend_from_slice(&[0xFF, 0xD9]);

    let (frame, raster) = decode(&file).unwrap();
    assert_eq!(frame.width, 13);
    assert_eq!(frame.height, 13);

    let pixel = |x: usize, y: usize| -> u8 { raster[(y * 13 + x) * 3] };
    assert_eq!(pixel(0, 0), 136); // top-left quadrant
    assert_eq!(pixel(12, 0), 121); // top-right quadrant, past the crop line
    assert_eq!(pixel(0, 12), 133); // bottom-left quadrant, past the crop line
    assert_eq!(pixel(12, 12), 119); // bottom-right quadrant
}

#[test]
fn file_without_an_soi_marker_is_rejected()
{
    assert!(matches!(
        decode(&[0x00, 0x01, 0x02, 0x03]),
        Err(DecodeErrors::InvalidMarker(_))
    ));
}

#[test]
fn reusing_a_decoder_for_a_second_image_does_not_leak_table_state()
{
    let mut file = vec![0xFF, 0xD8];
    push_segment(&mut file, 0xDB, &flat_dqt(0));
    push_segment(&mut file, 0xC4, &single_symbol_dht(0x00, 0, 0));
    push_segment(&mut file, 0xC4, &single_symbol_dht(0x10, 0, 0x00));
    let sof = vec![8u8, 0, 8, 0, 8, 1, 1, 0x11, 0];
    push_segment(&mut file, 0xC0, &sof);
    let sos = vec![1u8, 1, 0x00, 0, 63, 0];
    push_segment(&mut file, 0xDA, &sos);
    file.push(0b0000_1111);
    file.extend_from_slice(&[0xFF, 0xD9]);

    let mut decoder = Decoder::new();
    let (_, first) = decoder.decode(&file).unwrap();
    let (_, second) = decoder.decode(&file).unwrap();
    assert_eq!(first, second);
}
