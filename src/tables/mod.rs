pub mod cbdt;
pub mod cmap;
pub mod glyph_stream;
pub mod gsub;
pub mod sbix;

use xml::attribute::OwnedAttribute;

/// Tables the extractor knows how to locate in a font dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FontTable {
    Cmap,
    Cbdt,
    Cblc,
    Gsub,
    Sbix,
}

impl FontTable {
    /// The tag exactly as it appears in the font directory and the dump
    /// manifest. Tags are case-sensitive.
    pub fn tag(&self) -> &'static str {
        match self {
            FontTable::Cmap => "cmap",
            FontTable::Cbdt => "CBDT",
            FontTable::Cblc => "CBLC",
            FontTable::Gsub => "GSUB",
            FontTable::Sbix => "sbix",
        }
    }
}

/// Looks up one attribute by name on an XML start element.
pub(crate) fn attr_value(attributes: &[OwnedAttribute], name: &str) -> Option<String> {
    attributes
        .iter()
        .find(|attr| attr.name.local_name == name)
        .map(|attr| attr.value.clone())
}
