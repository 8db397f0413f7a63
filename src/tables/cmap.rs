use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use fxhash::FxHashMap;
use log::debug;
use xml::reader::{EventReader, XmlEvent};

use crate::error::ExtractError;
use crate::tables::{attr_value, FontTable};

/// One cmap subtable: two parallel sequences where index `i` joins a glyph
/// name to its Unicode code point, plus a derived name-to-code lookup.
#[derive(Debug, Clone)]
pub struct CmapSubtable {
    pub format: u16,
    pub platform_id: u16,
    pub plat_enc_id: u16,
    pub names: Vec<String>,
    pub codes: Vec<String>,
    code_by_name: FxHashMap<String, String>,
}

impl CmapSubtable {
    pub fn new(
        format: u16,
        platform_id: u16,
        plat_enc_id: u16,
        names: Vec<String>,
        codes: Vec<String>,
    ) -> CmapSubtable {
        debug_assert_eq!(names.len(), codes.len());
        let mut code_by_name = FxHashMap::default();
        for (name, code) in names.iter().zip(codes.iter()) {
            // Several codes can map to one glyph; the first occurrence wins.
            code_by_name
                .entry(name.clone())
                .or_insert_with(|| code.clone());
        }
        CmapSubtable {
            format,
            platform_id,
            plat_enc_id,
            names,
            codes,
            code_by_name,
        }
    }

    /// The code point mapped to a glyph name, as the dump spells it.
    pub fn code_for(&self, glyph_name: &str) -> Option<&str> {
        self.code_by_name.get(glyph_name).map(|code| code.as_str())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Finds the first subtable of the requested format in a located cmap dump.
/// Only format 12 is exercised by the extractor; in the case of multiple
/// subtables with the format, the first encountered is chosen.
pub fn find_subtable(cmap_path: &Path, format: u16) -> Result<CmapSubtable, ExtractError> {
    let file = File::open(cmap_path)
        .map_err(|_| ExtractError::TableNotFound(FontTable::Cmap.tag().to_string()))?;
    let parser = EventReader::new(BufReader::new(file));

    let wanted = format!("cmap_format_{}", format);
    let mut inside = false;
    let mut found = false;
    let mut platform_id = 0u16;
    let mut plat_enc_id = 0u16;
    let mut names = Vec::new();
    let mut codes = Vec::new();

    for event in parser {
        let event = event.map_err(|err| ExtractError::InvalidTableDump(err.to_string()))?;
        match event {
            XmlEvent::StartElement {
                name, attributes, ..
            } => {
                if !found && name.local_name == wanted {
                    inside = true;
                    found = true;
                    platform_id = parse_id(&attributes, "platformID")?;
                    plat_enc_id = parse_id(&attributes, "platEncID")?;
                } else if inside && name.local_name == "map" {
                    match (
                        attr_value(&attributes, "code"),
                        attr_value(&attributes, "name"),
                    ) {
                        (Some(code), Some(glyph)) => {
                            codes.push(code);
                            names.push(glyph);
                        }
                        _ => debug!("map entry without code/name attributes; ignoring"),
                    }
                }
            }
            XmlEvent::EndElement { name } => {
                if name.local_name == wanted {
                    inside = false;
                }
            }
            _ => {}
        }
    }

    if !found {
        return Err(ExtractError::SubtableNotFound(format));
    }

    Ok(CmapSubtable::new(
        format,
        platform_id,
        plat_enc_id,
        names,
        codes,
    ))
}

fn parse_id(attributes: &[xml::attribute::OwnedAttribute], name: &str) -> Result<u16, ExtractError> {
    let raw = attr_value(attributes, name)
        .ok_or_else(|| ExtractError::InvalidTableDump(format!("missing {} attribute", name)))?;
    raw.parse()
        .map_err(|_| ExtractError::InvalidTableDump(format!("bad {} value: {}", name, raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ttFont>
  <cmap>
    <tableVersion version="0"/>
    <cmap_format_4 platformID="0" platEncID="3" language="0">
      <map code="0x20" name="space"/>
    </cmap_format_4>
    <cmap_format_12 platformID="3" platEncID="10" format="12" length="100" nGroups="3">
      <map code="65" name="A"/>
      <map code="66" name="B"/>
      <map code="0x1f600" name="smiley"/>
    </cmap_format_12>
  </cmap>
</ttFont>
"#;

    fn write_sample(contents: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("font._c_m_a_p.ttx");
        let mut file = File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        (dir, path)
    }

    #[test]
    fn finds_the_format_12_subtable() {
        let (_dir, path) = write_sample(SAMPLE);
        let subtable = find_subtable(&path, 12).unwrap();
        assert_eq!(subtable.format, 12);
        assert_eq!(subtable.platform_id, 3);
        assert_eq!(subtable.plat_enc_id, 10);
        assert_eq!(subtable.names, vec!["A", "B", "smiley"]);
        assert_eq!(subtable.codes, vec!["65", "66", "0x1f600"]);
        assert_eq!(subtable.code_for("smiley"), Some("0x1f600"));
        assert_eq!(subtable.code_for("nonexistent"), None);
    }

    #[test]
    fn entries_from_other_formats_are_not_mixed_in() {
        let (_dir, path) = write_sample(SAMPLE);
        let subtable = find_subtable(&path, 12).unwrap();
        assert_eq!(subtable.code_for("space"), None);
        assert_eq!(subtable.len(), 3);
    }

    #[test]
    fn missing_format_is_subtable_not_found() {
        let (_dir, path) = write_sample(SAMPLE);
        match find_subtable(&path, 13) {
            Err(ExtractError::SubtableNotFound(13)) => {}
            other => panic!("expected SubtableNotFound, got {:?}", other),
        }
    }

    #[test]
    fn first_mapping_wins_for_duplicate_names() {
        let subtable = CmapSubtable::new(
            12,
            3,
            10,
            vec!["g".into(), "g".into()],
            vec!["65".into(), "66".into()],
        );
        assert_eq!(subtable.code_for("g"), Some("65"));
    }
}
