//! Line-oriented scanner for the hex-dumped bitmap tables.
//!
//! `CBDT` and `sbix` dumps are far too large to load as XML trees, so both
//! extractors walk them line by line: a start marker opens a glyph block and
//! captures its name, hex lines accumulate into a byte buffer, and an end
//! marker emits one record. Single pass, bounded memory.

use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;

use log::warn;
use regex::Regex;

/// Line format of the hex payload inside a glyph block: byte pairs in groups
/// of up to four, separated by single spaces.
pub const HEX_DATA_PATTERN: &str = r"^(([0-9a-f]{2}){1,4} ?)+$";

/// One glyph's worth of bitmap data pulled out of a table dump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlyphImageRecord {
    pub name: String,
    pub data: Vec<u8>,
}

/// Streaming iterator over the glyph records of one table dump file.
pub struct GlyphStream {
    lines: Lines<BufReader<File>>,
    start: Regex,
    end: Regex,
    hex: Regex,
    current: Option<(String, Vec<u8>)>,
}

impl GlyphStream {
    /// Opens a dump for scanning. `start` must capture the glyph name in its
    /// first group; `end` closes a block.
    pub fn open(path: &Path, start: Regex, end: Regex) -> std::io::Result<GlyphStream> {
        let file = File::open(path)?;
        Ok(GlyphStream {
            lines: BufReader::new(file).lines(),
            start,
            end,
            hex: Regex::new(HEX_DATA_PATTERN).unwrap(),
            current: None,
        })
    }
}

impl Iterator for GlyphStream {
    type Item = GlyphImageRecord;

    fn next(&mut self) -> Option<GlyphImageRecord> {
        while let Some(line) = self.lines.next() {
            let line = match line {
                Ok(line) => line,
                Err(err) => {
                    warn!("unreadable line in table dump: {}", err);
                    continue;
                }
            };
            let line = line.trim();

            if let Some(caps) = self.start.captures(line) {
                // A new block begins; an unterminated previous block is dropped.
                self.current = Some((caps[1].to_string(), Vec::new()));
                continue;
            }

            if self.current.is_some() {
                if self.hex.is_match(line) {
                    if let Some((_, data)) = self.current.as_mut() {
                        push_hex_bytes(data, line);
                    }
                    continue;
                }
                if self.end.is_match(line) {
                    if let Some((name, data)) = self.current.take() {
                        return Some(GlyphImageRecord { name, data });
                    }
                }
                // Anything else inside an open block is ignored, not fatal.
            }
        }
        None
    }
}

/// Counts glyph blocks without accumulating any data. Run before the
/// extraction pass so progress has a denominator; the extraction pass is
/// expected to emit exactly this many records.
pub fn count_glyphs(path: &Path, start: &Regex) -> std::io::Result<usize> {
    let reader = BufReader::new(File::open(path)?);
    let mut count = 0;
    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(_) => continue,
        };
        if start.is_match(line.trim()) {
            count += 1;
        }
    }
    Ok(count)
}

/// Appends the bytes of one hex line, whitespace-insensitively.
fn push_hex_bytes(buf: &mut Vec<u8>, line: &str) {
    let compact: String = line.split_whitespace().collect();
    let bytes = compact.as_bytes();
    let mut i = 0;
    while i + 2 <= bytes.len() {
        if let Ok(byte) = u8::from_str_radix(&compact[i..i + 2], 16) {
            buf.push(byte);
        }
        i += 2;
    }
}
