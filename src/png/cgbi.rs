//! Repair of Apple's CgBI-flavored PNGs.
//!
//! Apple-derived emoji bitmaps are stored as PNGs with a private `CgBI`
//! chunk, pixels in BGRA order, and an IDAT stream compressed as raw deflate
//! without the zlib wrapper. Repair reverses all three so the files open in
//! any standard viewer.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use binary_reader::{BinaryReader, Endian};
use flate2::read::DeflateDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use log::{debug, warn};

use crate::error::PngError;
use crate::extractor::CancelToken;
use crate::png::{ChunkName, PngFile};

/// What happened to a single file.
#[derive(Debug, PartialEq, Eq)]
pub enum RepairOutcome {
    Converted,
    Skipped(&'static str),
}

/// Tallies for one directory pass.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RepairSummary {
    pub converted: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Repairs every `*.png` file in a directory, in name order. Per-file
/// failures are logged and counted; only a failure to read the directory
/// itself is fatal. `progress` receives 0-100 over the file count.
pub fn convert_directory<F>(
    dir: &Path,
    cancel: &CancelToken,
    mut progress: F,
) -> Result<RepairSummary, PngError>
where
    F: FnMut(u8),
{
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension()
                .map(|ext| ext.eq_ignore_ascii_case("png"))
                .unwrap_or(false)
        })
        .collect();
    paths.sort();

    let total = paths.len();
    let mut summary = RepairSummary::default();
    for (i, path) in paths.iter().enumerate() {
        if cancel.is_cancelled() {
            break;
        }
        match convert_file(path) {
            Ok(RepairOutcome::Converted) => summary.converted += 1,
            Ok(RepairOutcome::Skipped(reason)) => {
                debug!("skipping {}: {}", path.display(), reason);
                summary.skipped += 1;
            }
            Err(err) => {
                warn!("could not repair {}: {}", path.display(), err);
                summary.failed += 1;
            }
        }
        progress(((i + 1) * 100 / total) as u8);
    }

    Ok(summary)
}

/// Repairs one file in place. A file qualifies only when decoding finds
/// exactly one `CgBI` chunk; zero or several is a skip, not an error.
pub fn convert_file(path: &Path) -> Result<RepairOutcome, PngError> {
    let mut png = PngFile::decode_file(path)?;

    match png.count(ChunkName::CGBI) {
        0 => return Ok(RepairOutcome::Skipped("not CgBI")),
        1 => {}
        n => {
            warn!("{} carries {} CgBI chunks; leaving it untouched", path.display(), n);
            return Ok(RepairOutcome::Skipped("multiple CgBI chunks"));
        }
    }

    png.coalesce_idat();

    let ihdr = png
        .chunk(ChunkName::IHDR)
        .ok_or_else(|| PngError::Repair("missing IHDR chunk".into()))?;
    let (width, height) = parse_ihdr(&ihdr.data)?;

    let idat_index = png
        .chunks
        .iter()
        .position(|c| c.name == ChunkName::IDAT)
        .ok_or_else(|| PngError::Repair("missing IDAT chunk".into()))?;

    // CgBI IDAT payloads carry no zlib wrapper.
    let mut raster = Vec::new();
    DeflateDecoder::new(&png.chunks[idat_index].data[..])
        .read_to_end(&mut raster)
        .map_err(|err| PngError::Repair(format!("inflate failed: {}", err)))?;

    swap_channels(&mut raster, width, height)?;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(&raster)
        .map_err(|err| PngError::Repair(format!("deflate failed: {}", err)))?;
    png.chunks[idat_index].data = encoder
        .finish()
        .map_err(|err| PngError::Repair(format!("deflate failed: {}", err)))?;

    png.remove(ChunkName::CGBI);
    png.encode_to_file(path)?;

    debug!("repaired {} ({}x{})", path.display(), width, height);
    Ok(RepairOutcome::Converted)
}

/// Reads width and height out of an IHDR payload. The pixel walk depends on
/// an exact scanline stride, so the dimensions are parsed up front and the
/// pixel layout is pinned to 8-bit RGBA.
fn parse_ihdr(data: &[u8]) -> Result<(u32, u32), PngError> {
    let mut reader = BinaryReader::from_u8(data);
    reader.endian = Endian::Big;

    let width = reader
        .read_u32()
        .map_err(|_| PngError::Repair("IHDR too short".into()))?;
    let height = reader
        .read_u32()
        .map_err(|_| PngError::Repair("IHDR too short".into()))?;
    let bit_depth = reader
        .read_u8()
        .map_err(|_| PngError::Repair("IHDR too short".into()))?;
    let color_type = reader
        .read_u8()
        .map_err(|_| PngError::Repair("IHDR too short".into()))?;

    if bit_depth != 8 || color_type != 6 {
        return Err(PngError::Repair(format!(
            "unsupported pixel layout (bit depth {}, color type {})",
            bit_depth, color_type
        )));
    }

    Ok((width, height))
}

/// Walks the decoded raster row-major, skipping the filter-type byte at the
/// start of each scanline and swapping bytes 0 and 2 of every 4-byte pixel.
/// Green and alpha stay where they are. The swap commutes with PNG's
/// byte-wise scanline filters; rows stay filtered throughout.
fn swap_channels(raster: &mut [u8], width: u32, height: u32) -> Result<(), PngError> {
    let stride = 1 + width as usize * 4;
    let expected = stride * height as usize;
    if raster.len() < expected {
        return Err(PngError::Repair(format!(
            "raster is {} bytes, expected {} for {}x{}",
            raster.len(),
            expected,
            width,
            height
        )));
    }

    for row in raster.chunks_exact_mut(stride).take(height as usize) {
        for pixel in row[1..].chunks_exact_mut(4) {
            pixel.swap(0, 2);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::png::PngChunk;

    fn ihdr_data(width: u32, height: u32) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&width.to_be_bytes());
        data.extend_from_slice(&height.to_be_bytes());
        // bit depth 8, color type 6 (RGBA), compression 0, filter 0, interlace 0
        data.extend_from_slice(&[8, 6, 0, 0, 0]);
        data
    }

    /// A 2x2 BGRA raster with distinct channel values per pixel, each
    /// scanline prefixed with filter type 0.
    fn bgra_raster() -> Vec<u8> {
        vec![
            0, 0x01, 0x02, 0x03, 0xFF, 0x11, 0x12, 0x13, 0xFE, //
            0, 0x21, 0x22, 0x23, 0xFD, 0x31, 0x32, 0x33, 0xFC,
        ]
    }

    fn cgbi_file(raster: &[u8]) -> PngFile {
        let mut deflated = flate2::write::DeflateEncoder::new(Vec::new(), Compression::default());
        deflated.write_all(raster).unwrap();
        let idat = deflated.finish().unwrap();
        PngFile {
            chunks: vec![
                PngChunk {
                    name: ChunkName::CGBI,
                    data: vec![0x50, 0x00, 0x20, 0x02],
                },
                PngChunk {
                    name: ChunkName::IHDR,
                    data: ihdr_data(2, 2),
                },
                PngChunk {
                    name: ChunkName::IDAT,
                    data: idat,
                },
                PngChunk {
                    name: ChunkName::IEND,
                    data: vec![],
                },
            ],
        }
    }

    #[test]
    fn swap_exchanges_bytes_zero_and_two_only() {
        let mut raster = bgra_raster();
        swap_channels(&mut raster, 2, 2).unwrap();
        assert_eq!(
            raster,
            vec![
                0, 0x03, 0x02, 0x01, 0xFF, 0x13, 0x12, 0x11, 0xFE, //
                0, 0x23, 0x22, 0x21, 0xFD, 0x33, 0x32, 0x31, 0xFC,
            ]
        );
    }

    #[test]
    fn swapping_twice_restores_the_raster() {
        let mut raster = bgra_raster();
        swap_channels(&mut raster, 2, 2).unwrap();
        swap_channels(&mut raster, 2, 2).unwrap();
        assert_eq!(raster, bgra_raster());
    }

    #[test]
    fn short_raster_is_a_repair_error() {
        let mut raster = vec![0u8; 5];
        match swap_channels(&mut raster, 2, 2) {
            Err(PngError::Repair(_)) => {}
            other => panic!("expected Repair, got {:?}", other),
        }
    }

    #[test]
    fn repair_swaps_pixels_and_strips_the_marker_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("glyph.png");
        cgbi_file(&bgra_raster()).encode_to_file(&path).unwrap();

        assert_eq!(convert_file(&path).unwrap(), RepairOutcome::Converted);

        let repaired = PngFile::decode_file(&path).unwrap();
        assert_eq!(repaired.count(ChunkName::CGBI), 0);

        let idat = repaired.chunk(ChunkName::IDAT).unwrap();
        let mut raster = Vec::new();
        flate2::read::ZlibDecoder::new(&idat.data[..])
            .read_to_end(&mut raster)
            .unwrap();
        // First pixel was B=0x01 G=0x02 R=0x03; repaired order is RGBA.
        assert_eq!(&raster[1..5], &[0x03, 0x02, 0x01, 0xFF]);
    }

    #[test]
    fn file_without_cgbi_is_skipped_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.png");
        let mut file = cgbi_file(&bgra_raster());
        file.remove(ChunkName::CGBI);
        file.encode_to_file(&path).unwrap();
        let before = fs::read(&path).unwrap();

        assert_eq!(
            convert_file(&path).unwrap(),
            RepairOutcome::Skipped("not CgBI")
        );
        assert_eq!(fs::read(&path).unwrap(), before);
    }

    #[test]
    fn repaired_file_is_skipped_on_a_second_pass() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("glyph.png");
        cgbi_file(&bgra_raster()).encode_to_file(&path).unwrap();

        assert_eq!(convert_file(&path).unwrap(), RepairOutcome::Converted);
        assert_eq!(
            convert_file(&path).unwrap(),
            RepairOutcome::Skipped("not CgBI")
        );
    }

    #[test]
    fn multiple_cgbi_chunks_are_an_anomaly_skip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("odd.png");
        let mut file = cgbi_file(&bgra_raster());
        let marker = file.chunks[0].clone();
        file.chunks.insert(1, marker);
        file.encode_to_file(&path).unwrap();

        assert_eq!(
            convert_file(&path).unwrap(),
            RepairOutcome::Skipped("multiple CgBI chunks")
        );
    }

    #[test]
    fn directory_pass_isolates_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        cgbi_file(&bgra_raster())
            .encode_to_file(&dir.path().join("a.png"))
            .unwrap();
        fs::write(dir.path().join("b.png"), b"not a png at all").unwrap();

        let mut seen = Vec::new();
        let summary = convert_directory(dir.path(), &CancelToken::new(), |pct| seen.push(pct)).unwrap();
        assert_eq!(summary.converted, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(seen, vec![50, 100]);
    }
}
