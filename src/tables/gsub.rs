use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use fxhash::FxHashMap;
use log::debug;
use xml::reader::{EventReader, XmlEvent};

use crate::error::ExtractError;
use crate::tables::{attr_value, FontTable};

/// A composite glyph substituting for a sequence of component glyphs.
/// Component order is as declared in the font and is significant for
/// code-sequence reconstruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ligature {
    pub glyph_name: String,
    pub components: Vec<String>,
}

/// All ligatures sharing one base (first-component) glyph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LigatureSet {
    pub glyph_name: String,
    pub ligatures: Vec<Ligature>,
}

/// O(1) access to ligatures by resulting-glyph name and to sets by base
/// glyph name.
#[derive(Debug, Clone, Default)]
pub struct LigatureIndex {
    sets: Vec<LigatureSet>,
    set_by_base: FxHashMap<String, usize>,
    ligature_by_result: FxHashMap<String, (usize, usize)>,
}

impl LigatureIndex {
    pub fn push(&mut self, set: LigatureSet) {
        let set_index = self.sets.len();
        self.set_by_base
            .entry(set.glyph_name.clone())
            .or_insert(set_index);
        for (i, ligature) in set.ligatures.iter().enumerate() {
            self.ligature_by_result
                .entry(ligature.glyph_name.clone())
                .or_insert((set_index, i));
        }
        self.sets.push(set);
    }

    pub fn sets(&self) -> &[LigatureSet] {
        &self.sets
    }

    pub fn set_for_base(&self, glyph_name: &str) -> Option<&LigatureSet> {
        self.set_by_base.get(glyph_name).map(|&i| &self.sets[i])
    }

    /// The set and ligature whose substitution produces `glyph_name`.
    pub fn ligature_for_result(&self, glyph_name: &str) -> Option<(&LigatureSet, &Ligature)> {
        self.ligature_by_result
            .get(glyph_name)
            .map(|&(set, lig)| (&self.sets[set], &self.sets[set].ligatures[lig]))
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}

/// Extracts every ligature set in a located GSUB dump.
pub fn extract_ligature_sets(gsub_path: &Path) -> Result<LigatureIndex, ExtractError> {
    let file = File::open(gsub_path)
        .map_err(|_| ExtractError::TableNotFound(FontTable::Gsub.tag().to_string()))?;
    let parser = EventReader::new(BufReader::new(file));

    let mut index = LigatureIndex::default();
    let mut current: Option<LigatureSet> = None;

    for event in parser {
        let event = event.map_err(|err| ExtractError::InvalidTableDump(err.to_string()))?;
        match event {
            XmlEvent::StartElement {
                name, attributes, ..
            } => {
                if name.local_name == "LigatureSet" {
                    match attr_value(&attributes, "glyph") {
                        Some(glyph_name) => {
                            current = Some(LigatureSet {
                                glyph_name,
                                ligatures: Vec::new(),
                            })
                        }
                        None => debug!("LigatureSet without a glyph attribute; ignoring"),
                    }
                } else if name.local_name == "Ligature" {
                    if let Some(set) = current.as_mut() {
                        match (
                            attr_value(&attributes, "glyph"),
                            attr_value(&attributes, "components"),
                        ) {
                            (Some(glyph_name), Some(components)) => set.ligatures.push(Ligature {
                                glyph_name,
                                components: components
                                    .split(',')
                                    .map(|c| c.trim().to_string())
                                    .collect(),
                            }),
                            _ => debug!("Ligature without glyph/components; ignoring"),
                        }
                    }
                }
            }
            XmlEvent::EndElement { name } => {
                if name.local_name == "LigatureSet" {
                    if let Some(set) = current.take() {
                        index.push(set);
                    }
                }
            }
            _ => {}
        }
    }

    debug!("collected {} ligature sets", index.len());
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ttFont>
  <GSUB>
    <LigatureSubst index="0">
      <LigatureSet glyph="u1F468">
        <Ligature components="u200D,u1F469" glyph="family"/>
        <Ligature components="u1F3FB" glyph="man_light"/>
      </LigatureSet>
      <LigatureSet glyph="u1F1FA">
        <Ligature components="u1F1F8" glyph="flag_us"/>
      </LigatureSet>
    </LigatureSubst>
  </GSUB>
</ttFont>
"#;

    fn write_sample() -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("font.G_S_U_B_.ttx");
        let mut file = File::create(&path).unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        (dir, path)
    }

    #[test]
    fn collects_sets_and_ligatures_in_order() {
        let (_dir, path) = write_sample();
        let index = extract_ligature_sets(&path).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.sets()[0].glyph_name, "u1F468");
        assert_eq!(index.sets()[0].ligatures.len(), 2);
        assert_eq!(index.sets()[1].ligatures.len(), 1);
    }

    #[test]
    fn component_order_is_preserved() {
        let (_dir, path) = write_sample();
        let index = extract_ligature_sets(&path).unwrap();
        let (_, ligature) = index.ligature_for_result("family").unwrap();
        assert_eq!(ligature.components, vec!["u200D", "u1F469"]);
    }

    #[test]
    fn lookup_by_result_finds_the_owning_set() {
        let (_dir, path) = write_sample();
        let index = extract_ligature_sets(&path).unwrap();
        let (set, ligature) = index.ligature_for_result("flag_us").unwrap();
        assert_eq!(set.glyph_name, "u1F1FA");
        assert_eq!(ligature.components, vec!["u1F1F8"]);
        assert!(index.ligature_for_result("u1F468").is_none());
    }

    #[test]
    fn lookup_by_base_glyph() {
        let (_dir, path) = write_sample();
        let index = extract_ligature_sets(&path).unwrap();
        assert_eq!(
            index.set_for_base("u1F468").map(|s| s.ligatures.len()),
            Some(2)
        );
        assert!(index.set_for_base("family").is_none());
    }
}
