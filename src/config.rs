use std::path::PathBuf;

/// Filesystem and tool knobs for an [`Extractor`](crate::Extractor).
/// Everything path-shaped is resolved against a project's data directory at
/// run time; nothing here is process-global.
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// Program used to list and dump font tables.
    pub font_tool: PathBuf,
    /// Directory under the project data path that receives the table dump.
    pub ttx_dir_name: String,
    /// Manifest file the split dump writes at the root of the ttx directory.
    pub ttx_manifest_name: String,
    /// Directory under the project data path that receives extracted glyphs.
    pub extraction_dir_name: String,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        ExtractorConfig {
            font_tool: PathBuf::from("ttx"),
            ttx_dir_name: "ttx".into(),
            ttx_manifest_name: "font.ttx".into(),
            extraction_dir_name: "extraction".into(),
        }
    }
}
