pub mod cgbi;

use std::fmt;
use std::fs;
use std::path::Path;

use binary_reader::{BinaryReader, Endian};
use flate2::Crc;

use crate::error::PngError;

/// The 8-byte signature present at the start of every PNG file.
pub const PNG_SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

/// Four-byte PNG chunk name, e.g. `IHDR`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkName(pub [u8; 4]);

impl ChunkName {
    pub const CGBI: ChunkName = ChunkName(*b"CgBI");
    pub const IHDR: ChunkName = ChunkName(*b"IHDR");
    pub const PLTE: ChunkName = ChunkName(*b"PLTE");
    pub const IDAT: ChunkName = ChunkName(*b"IDAT");
    pub const IEND: ChunkName = ChunkName(*b"IEND");

    /// Every chunk name the codec accepts: the critical chunks, the standard
    /// ancillary chunks, Apple's private `CgBI` and `iDOT`, and the APNG
    /// control chunks.
    pub const KNOWN: &'static [ChunkName] = &[
        ChunkName::CGBI,
        ChunkName::IHDR,
        ChunkName::PLTE,
        ChunkName::IDAT,
        ChunkName::IEND,
        ChunkName(*b"acTL"),
        ChunkName(*b"bKGD"),
        ChunkName(*b"cHRM"),
        ChunkName(*b"fcTL"),
        ChunkName(*b"fdAT"),
        ChunkName(*b"gAMA"),
        ChunkName(*b"hIST"),
        ChunkName(*b"iCCP"),
        ChunkName(*b"iDOT"),
        ChunkName(*b"iTXt"),
        ChunkName(*b"pHYs"),
        ChunkName(*b"sBIT"),
        ChunkName(*b"sPLT"),
        ChunkName(*b"sRGB"),
        ChunkName(*b"tEXt"),
        ChunkName(*b"tIME"),
        ChunkName(*b"tRNS"),
        ChunkName(*b"zTXt"),
    ];

    /// Validates a raw 4-byte name against the recognized set.
    pub fn from_bytes(raw: &[u8]) -> Result<ChunkName, PngError> {
        if raw.len() != 4 {
            return Err(PngError::Truncated);
        }
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(raw);
        let name = ChunkName(bytes);
        if ChunkName::KNOWN.contains(&name) {
            Ok(name)
        } else {
            Err(PngError::UnknownChunkType(
                String::from_utf8_lossy(raw).into_owned(),
            ))
        }
    }

    pub fn as_str(&self) -> &str {
        // Names are ASCII by construction; KNOWN holds nothing else.
        std::str::from_utf8(&self.0).unwrap_or("????")
    }
}

impl fmt::Debug for ChunkName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl fmt::Display for ChunkName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One chunk of a PNG file. The wire CRC is discarded on read and recomputed
/// on write, so only the name and payload are held.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PngChunk {
    pub name: ChunkName,
    pub data: Vec<u8>,
}

/// An ordered PNG chunk sequence. Order is significant and preserved, except
/// where [`PngFile::coalesce_idat`] or CgBI removal explicitly reorder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PngFile {
    pub chunks: Vec<PngChunk>,
}

impl PngFile {
    /// Reads a chunk sequence out of raw bytes. Reading stops once the IEND
    /// chunk has been consumed; trailing bytes are ignored.
    pub fn decode(bytes: &[u8]) -> Result<PngFile, PngError> {
        let mut reader = BinaryReader::from_u8(bytes);
        reader.endian = Endian::Big;

        let header = reader.read_bytes(8).map_err(|_| PngError::Truncated)?;
        if header != &PNG_SIGNATURE[..] {
            return Err(PngError::InvalidFormat);
        }

        let mut chunks = Vec::new();
        loop {
            let length = reader.read_u32().map_err(|_| PngError::Truncated)? as usize;
            let name = ChunkName::from_bytes(reader.read_bytes(4).map_err(|_| PngError::Truncated)?)?;
            // Exactly `length` bytes of payload; embedded bytes are never
            // treated as delimiters.
            let data = reader
                .read_bytes(length)
                .map_err(|_| PngError::Truncated)?
                .to_vec();
            reader.read_u32().map_err(|_| PngError::Truncated)?;

            chunks.push(PngChunk { name, data });
            if name == ChunkName::IEND {
                break;
            }
        }

        Ok(PngFile { chunks })
    }

    pub fn decode_file(path: &Path) -> Result<PngFile, PngError> {
        let bytes = fs::read(path)?;
        PngFile::decode(&bytes)
    }

    /// Serializes the chunk sequence, recomputing each chunk's length field
    /// and CRC-32 over name+data. CRCs carried over from decoding are never
    /// trusted.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&PNG_SIGNATURE);
        for chunk in &self.chunks {
            out.extend_from_slice(&(chunk.data.len() as u32).to_be_bytes());
            out.extend_from_slice(&chunk.name.0);
            out.extend_from_slice(&chunk.data);

            let mut crc = Crc::new();
            crc.update(&chunk.name.0);
            crc.update(&chunk.data);
            out.extend_from_slice(&crc.sum().to_be_bytes());
        }
        out
    }

    pub fn encode_to_file(&self, path: &Path) -> Result<(), PngError> {
        fs::write(path, self.encode())?;
        Ok(())
    }

    pub fn chunk(&self, name: ChunkName) -> Option<&PngChunk> {
        self.chunks.iter().find(|c| c.name == name)
    }

    pub fn count(&self, name: ChunkName) -> usize {
        self.chunks.iter().filter(|c| c.name == name).count()
    }

    /// Removes every chunk with the given name.
    pub fn remove(&mut self, name: ChunkName) {
        self.chunks.retain(|c| c.name != name);
    }

    /// Merges all IDAT payloads, in file order, into the first IDAT chunk and
    /// drops the rest. Pixel-level transforms require one logical data chunk.
    pub fn coalesce_idat(&mut self) {
        if self.count(ChunkName::IDAT) < 2 {
            return;
        }

        let mut merged = Vec::new();
        let mut first_index = None;
        for (i, chunk) in self.chunks.iter().enumerate() {
            if chunk.name == ChunkName::IDAT {
                if first_index.is_none() {
                    first_index = Some(i);
                }
                merged.extend_from_slice(&chunk.data);
            }
        }

        if let Some(first) = first_index {
            self.chunks[first].data = merged;
            let mut seen = false;
            self.chunks.retain(|c| {
                if c.name != ChunkName::IDAT {
                    return true;
                }
                if seen {
                    false
                } else {
                    seen = true;
                    true
                }
            });
        }
    }
}
