// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use jpeg_core::{
    decode::{DecompressOptions, Decompressor, HeaderStatus},
    encode::{CompressParams, Compressor, RestartInterval},
    error::{Error, Result},
    headers::{ColorSpace, QuantTable, ScanInfo},
    io::{MemorySource, SliceDestination, VecDestination},
    markers::codes::{APP14, COM, DQT, RST0, SOF2, SOS},
    memory::MemoryLimits,
};
use rand::{Rng, SeedableRng};
use rand_xorshift::XorShiftRng;
use test_log::test;

fn random_pixels(rng: &mut XorShiftRng, len: usize) -> Vec<u8> {
    (0..len).map(|_| rng.random_range(0..=255)).collect()
}

fn encode(compressor: &mut Compressor, pixels: &[u8], write_all_tables: bool) -> Result<Vec<u8>> {
    let height = compressor.params_mut()?.height;
    let rows: Vec<&[u8]> = pixels.chunks_exact(pixels.len() / height).collect();
    let mut dest = VecDestination::new();
    compressor.start_compress(&mut dest, write_all_tables)?;
    let mut taken = 0;
    while taken < rows.len() {
        taken += compressor.write_scanlines(&mut dest, &rows[taken..(taken + 5).min(rows.len())])?;
    }
    compressor.finish_compress(&mut dest)?;
    Ok(dest.into_inner())
}

fn decode_with(d: &mut Decompressor, data: &[u8]) -> Result<Vec<u8>> {
    let mut src = MemorySource::new(data);
    assert_eq!(d.read_header(&mut src, true)?, HeaderStatus::HeaderOk);
    d.start_decompress(&mut src)?;
    let frame = d.headers().frame.clone().unwrap();
    let mut out = vec![0; frame.width * frame.height * d.output_components()];
    assert_eq!(d.read_scanlines(&mut src, &mut out)?.complete(), Some(frame.height));
    d.finish_decompress(&mut src)?;
    Ok(out)
}

fn count_markers(data: &[u8], code: u8) -> usize {
    data.windows(2).filter(|w| w == &[0xff, code]).count()
}

#[test]
fn cmyk_is_lossless_with_unit_quantizer() -> Result<()> {
    let mut rng = XorShiftRng::seed_from_u64(0);
    let pixels = random_pixels(&mut rng, 13 * 9 * 4);
    let mut compressor =
        Compressor::new(CompressParams::new(13, 9, ColorSpace::Cmyk, ColorSpace::Cmyk))?;
    let data = encode(&mut compressor, &pixels, true)?;
    assert_eq!(count_markers(&data, APP14), 1);

    let mut d = Decompressor::new(DecompressOptions::default());
    let out = decode_with(&mut d, &data)?;
    assert_eq!(out.len(), pixels.len());
    for (a, b) in out.iter().zip(pixels.iter()) {
        assert!(a.abs_diff(*b) <= 2, "{a} vs {b}");
    }
    Ok(())
}

#[test]
fn unsupported_conversion_fails_at_start() -> Result<()> {
    let mut compressor =
        Compressor::new(CompressParams::new(8, 8, ColorSpace::Cmyk, ColorSpace::Ycck))?;
    let mut dest = VecDestination::new();
    assert!(matches!(
        compressor.start_compress(&mut dest, true),
        Err(Error::ConversionNotSupported(4))
    ));
    // Nothing was started, so the parameters can still be fixed.
    compressor.params_mut()?.set_color_space(ColorSpace::Cmyk);
    compressor.start_compress(&mut dest, true)?;
    Ok(())
}

#[test]
fn coarse_quantization_stays_close() -> Result<()> {
    let mut params = CompressParams::new(16, 16, ColorSpace::Grayscale, ColorSpace::Grayscale);
    params.tables.quant[0] = Some(QuantTable::flat(4));
    let pixels: Vec<u8> = (0..256).map(|i| (i % 16 * 8 + i / 16 * 4) as u8).collect();
    let data = encode(&mut Compressor::new(params)?, &pixels, true)?;
    let out = decode_with(&mut Decompressor::new(DecompressOptions::default()), &data)?;
    for (a, b) in out.iter().zip(pixels.iter()) {
        assert!(a.abs_diff(*b) <= 8, "{a} vs {b}");
    }
    Ok(())
}

#[test]
fn every_scan_of_the_script_is_written() -> Result<()> {
    let mut params = CompressParams::new(24, 16, ColorSpace::Rgb, ColorSpace::YCbCr);
    params.scan_script = Some(vec![
        ScanInfo::progressive(vec![0, 1, 2], 0, 0, 0, 0),
        ScanInfo::progressive(vec![0], 1, 63, 0, 0),
        ScanInfo::progressive(vec![1], 1, 63, 0, 0),
        ScanInfo::progressive(vec![2], 1, 63, 0, 0),
    ]);
    let mut rng = XorShiftRng::seed_from_u64(1);
    let pixels = random_pixels(&mut rng, 24 * 16 * 3);
    let data = encode(&mut Compressor::new(params)?, &pixels, true)?;
    assert_eq!(count_markers(&data, SOF2), 1);
    assert_eq!(count_markers(&data, SOS), 4);

    let mut src = MemorySource::new(&data);
    let mut d = Decompressor::new(DecompressOptions::default());
    assert_eq!(d.read_header(&mut src, true)?, HeaderStatus::HeaderOk);
    assert!(d.has_multiple_scans()?);
    assert!(d.read_coefficients(&mut src)?.is_complete());
    assert!(d.coef_bits().unwrap().iter().flatten().all(|&b| b == 0));
    assert_eq!(d.num_warnings(), 0);
    Ok(())
}

#[test]
fn sequential_multi_scan_script() -> Result<()> {
    let mut params = CompressParams::new(16, 16, ColorSpace::Rgb, ColorSpace::YCbCr);
    params.scan_script = Some(vec![
        ScanInfo::sequential(vec![0]),
        ScanInfo::sequential(vec![1, 2]),
    ]);
    let pixels: Vec<u8> = (0..16 * 16 * 3).map(|i| (i % 97) as u8).collect();
    let multi = encode(&mut Compressor::new(params)?, &pixels, true)?;
    assert_eq!(count_markers(&multi, SOS), 2);
    let single = encode(
        &mut Compressor::new(CompressParams::new(16, 16, ColorSpace::Rgb, ColorSpace::YCbCr))?,
        &pixels,
        true,
    )?;
    let mut d = Decompressor::new(DecompressOptions::default());
    assert_eq!(decode_with(&mut d, &multi)?, decode_with(&mut d, &single)?);
    Ok(())
}

#[test]
fn restart_interval_in_rows() -> Result<()> {
    let mut params = CompressParams::new(32, 32, ColorSpace::Grayscale, ColorSpace::Grayscale);
    params.restart = Some(RestartInterval::Rows(1));
    let pixels = vec![77; 32 * 32];
    let data = encode(&mut Compressor::new(params)?, &pixels, true)?;
    // Four MCU rows, so three markers.
    let restarts: usize = (0..8).map(|n| count_markers(&data, RST0 + n)).sum();
    assert_eq!(restarts, 3);
    let mut d = Decompressor::new(DecompressOptions::default());
    let out = decode_with(&mut d, &data)?;
    assert!(out.iter().all(|&v| v.abs_diff(77) <= 1));
    assert_eq!(d.num_warnings(), 0);
    assert_eq!(d.headers().restart_interval, 4);
    Ok(())
}

#[test]
fn abbreviated_streams_share_tables() -> Result<()> {
    let mut params = CompressParams::new(8, 16, ColorSpace::Grayscale, ColorSpace::Grayscale);
    params.tables.quant[0] = Some(QuantTable::flat(3));
    let mut compressor = Compressor::new(params)?;
    let mut tables = VecDestination::new();
    compressor.write_tables(&mut tables)?;
    let tables = tables.into_inner();
    let pixels = vec![100; 8 * 16];
    let image = encode(&mut compressor, &pixels, false)?;
    assert_eq!(count_markers(&image, DQT), 0);

    // Without the tables the image cannot be decoded.
    let mut d = Decompressor::new(DecompressOptions::default());
    assert!(matches!(decode_with(&mut d, &image), Err(Error::NoQuantTable(0))));

    let mut d = Decompressor::new(DecompressOptions::default());
    let mut src = MemorySource::new(&tables);
    assert_eq!(d.read_header(&mut src, false)?, HeaderStatus::TablesOnly);
    let out = decode_with(&mut d, &image)?;
    assert!(out.iter().all(|&v| v.abs_diff(100) <= 2));
    Ok(())
}

#[test]
fn markers_are_written_before_the_frame() -> Result<()> {
    let mut compressor =
        Compressor::new(CompressParams::new(8, 8, ColorSpace::Grayscale, ColorSpace::Grayscale))?;
    let mut dest = VecDestination::new();
    compressor.start_compress(&mut dest, true)?;
    compressor.write_marker(&mut dest, COM, b"first")?;
    compressor.write_marker(&mut dest, 0xe1, b"Exif\0\0")?;
    assert!(matches!(
        compressor.write_marker(&mut dest, 0xd0, b""),
        Err(Error::BadMarkerWrite(0xd0))
    ));
    let rows = vec![[9u8; 8]; 8];
    let rows: Vec<&[u8]> = rows.iter().map(|r| &r[..]).collect();
    compressor.write_scanlines(&mut dest, &rows)?;
    compressor.finish_compress(&mut dest)?;
    let data = dest.into_inner();

    let mut d = Decompressor::new(DecompressOptions::default());
    d.save_markers(COM, Some(64))?;
    d.save_markers(0xe1, Some(4))?;
    let mut src = MemorySource::new(&data);
    d.read_header(&mut src, true)?;
    let saved = d.saved_markers();
    assert_eq!(saved.len(), 2);
    assert_eq!((saved[0].code, &saved[0].data[..]), (COM, &b"first"[..]));
    assert_eq!((saved[1].code, &saved[1].data[..]), (0xe1, &b"Exif"[..]));
    assert_eq!(saved[1].original_length, 6);
    Ok(())
}

#[test]
fn fixed_destination_matches_growable() -> Result<()> {
    let pixels = vec![50u8; 16 * 16];
    let params = CompressParams::new(16, 16, ColorSpace::Grayscale, ColorSpace::Grayscale);
    let expected = encode(&mut Compressor::new(params.clone())?, &pixels, true)?;

    let mut buf = vec![0u8; expected.len()];
    let mut dest = SliceDestination::new(&mut buf);
    let mut compressor = Compressor::new(params.clone())?;
    compressor.start_compress(&mut dest, true)?;
    let rows: Vec<&[u8]> = pixels.chunks(16).collect();
    compressor.write_scanlines(&mut dest, &rows)?;
    compressor.finish_compress(&mut dest)?;
    assert_eq!(dest.written(), expected.len());
    assert_eq!(buf, expected);

    let mut small = vec![0u8; expected.len() - 1];
    let mut dest = SliceDestination::new(&mut small);
    let mut compressor = Compressor::new(params)?;
    compressor.start_compress(&mut dest, true)?;
    compressor.write_scanlines(&mut dest, &rows)?;
    assert!(matches!(
        compressor.finish_compress(&mut dest),
        Err(Error::DestinationFull)
    ));
    compressor.abort();
    assert_eq!(compressor.next_scanline(), 0);
    Ok(())
}

#[test]
fn backing_store_gives_identical_stream() -> Result<()> {
    let mut rng = XorShiftRng::seed_from_u64(2);
    let pixels = random_pixels(&mut rng, 40 * 40 * 3);
    let mut params = CompressParams::new(40, 40, ColorSpace::Rgb, ColorSpace::YCbCr);
    params.scan_script = Some(vec![
        ScanInfo::progressive(vec![0, 1, 2], 0, 0, 0, 0),
        ScanInfo::progressive(vec![0], 1, 63, 0, 0),
        ScanInfo::progressive(vec![1], 1, 63, 0, 0),
        ScanInfo::progressive(vec![2], 1, 63, 0, 0),
    ]);
    let expected = encode(&mut Compressor::new(params.clone())?, &pixels, true)?;
    params.memory = MemoryLimits {
        max_memory_to_use: Some(2048),
        ..Default::default()
    };
    assert_eq!(encode(&mut Compressor::new(params)?, &pixels, true)?, expected);
    Ok(())
}

#[test]
fn bad_scripts_are_rejected() -> Result<()> {
    let scripts = [
        vec![],
        // Component 1 is never sent.
        vec![ScanInfo::sequential(vec![0])],
        // Components out of frame order.
        vec![ScanInfo::sequential(vec![1, 0])],
        // AC scans cannot interleave.
        vec![
            ScanInfo::progressive(vec![0, 1], 0, 0, 0, 0),
            ScanInfo::progressive(vec![0, 1], 1, 63, 0, 0),
        ],
        // Refinement without a first scan.
        vec![
            ScanInfo::progressive(vec![0, 1], 0, 0, 1, 0),
        ],
    ];
    for script in scripts {
        let mut params = CompressParams::new(8, 8, ColorSpace::Unknown, ColorSpace::Unknown);
        params.input_components = 2;
        params.set_color_space(ColorSpace::Unknown);
        params.scan_script = Some(script);
        let mut compressor = Compressor::new(params)?;
        let mut dest = VecDestination::new();
        assert!(compressor.start_compress(&mut dest, true).is_err());
        assert!(dest.data().is_empty());
    }
    Ok(())
}
