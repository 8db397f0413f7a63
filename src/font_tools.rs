//! Driver for the external font-introspection tool.
//!
//! Table enumeration and dumping are delegated to a `ttx`-style subprocess.
//! The tool interleaves informational output across stdout and stderr, so
//! both streams are merged into one line channel and parsed identically; a
//! line is only treated as fatal when it matches [`FATAL_PATTERN`].

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;

use fxhash::FxHashMap;
use log::{debug, error, info};
use regex::Regex;
use xml::reader::{EventReader, XmlEvent};

use crate::error::ExtractError;
use crate::extractor::CancelToken;
use crate::tables::{attr_value, FontTable};

/// A table-listing line: indented tag followed by a hex checksum.
const TABLE_LINE_PATTERN: &str = r"^\s+([^\s.]+)\s+0x";
/// Emitted once per table during a split dump.
const DUMPING_PATTERN: &str = r"^Dumping '.+' table";
/// Output lines that mean the tool is beyond recovery.
const FATAL_PATTERN: &str = r"^(ERROR|Traceback)";

/// Which bitmap-glyph flavor a font carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontPlatform {
    Apple,
    Android,
}

/// Handle on the external font tool binary.
pub struct FontTools {
    tool: PathBuf,
}

impl FontTools {
    pub fn new(tool: impl Into<PathBuf>) -> FontTools {
        FontTools { tool: tool.into() }
    }

    /// Lists the table tags present in a font via `<tool> -l <font>`.
    pub fn list_tables(&self, font_path: &Path) -> Result<Vec<String>, ExtractError> {
        let table_line = Regex::new(TABLE_LINE_PATTERN).unwrap();
        let mut tables = Vec::new();

        let mut cmd = Command::new(&self.tool);
        cmd.arg("-l").arg(font_path);
        self.run(cmd, None, |line| {
            if let Some(caps) = table_line.captures(line) {
                tables.push(caps[1].to_string());
            }
        })?;

        if tables.is_empty() {
            return Err(ExtractError::FontReadError(
                "no tables reported for the font".into(),
            ));
        }
        Ok(tables)
    }

    /// Converts a font into a split per-table dump via
    /// `<tool> -f -s -o <manifest> <font>`, after a listing pass that fixes
    /// the table count. `on_progress` receives 0-100 as tables are dumped.
    /// Returns the table tags found by the listing pass. Cancellation kills
    /// the child process and returns early without error.
    pub fn convert_to_ttx<F>(
        &self,
        font_path: &Path,
        ttx_manifest: &Path,
        cancel: &CancelToken,
        mut on_progress: F,
    ) -> Result<Vec<String>, ExtractError>
    where
        F: FnMut(u8),
    {
        let tables = self.list_tables(font_path)?;
        info!("font carries {} tables", tables.len());
        if cancel.is_cancelled() {
            return Ok(tables);
        }

        let dumping = Regex::new(DUMPING_PATTERN).unwrap();
        let total = tables.len();
        let mut dumped = 0usize;

        let mut cmd = Command::new(&self.tool);
        cmd.arg("-f")
            .arg("-s")
            .arg("-o")
            .arg(ttx_manifest)
            .arg(font_path);
        self.run(cmd, Some(cancel), |line| {
            if dumping.is_match(line) {
                dumped += 1;
                on_progress((dumped * 100 / total).min(100) as u8);
            }
        })?;

        Ok(tables)
    }

    /// Spawns the tool and feeds every merged output line to `on_line`.
    fn run<F>(
        &self,
        mut cmd: Command,
        cancel: Option<&CancelToken>,
        mut on_line: F,
    ) -> Result<(), ExtractError>
    where
        F: FnMut(&str),
    {
        debug!("running {:?}", cmd);
        let mut child = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| {
                ExtractError::FontReadError(format!(
                    "could not launch {}: {}",
                    self.tool.display(),
                    err
                ))
            })?;

        let (tx, rx) = mpsc::channel();
        let mut forwarders = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            forwarders.push(forward_lines(stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            forwarders.push(forward_lines(stderr, tx.clone()));
        }
        drop(tx);

        let fatal = Regex::new(FATAL_PATTERN).unwrap();
        let mut fatal_line = None;
        let mut cancelled = false;
        for line in rx {
            if let Some(token) = cancel {
                if token.is_cancelled() {
                    cancelled = true;
                    break;
                }
            }
            if fatal.is_match(&line) {
                fatal_line = Some(line);
                break;
            }
            debug!("[font tools] {}", line);
            on_line(&line);
        }

        if cancelled || fatal_line.is_some() {
            let _ = child.kill();
        }
        let status = child.wait().map_err(|err| {
            ExtractError::FontReadError(format!("could not reap font tools: {}", err))
        })?;
        for forwarder in forwarders {
            let _ = forwarder.join();
        }

        if cancelled {
            return Ok(());
        }
        if let Some(line) = fatal_line {
            error!("font tools reported a fatal error: {}", line);
            return Err(ExtractError::FontReadError(line));
        }
        if !status.success() {
            return Err(ExtractError::FontReadError(format!(
                "font tools exited with {}",
                status
            )));
        }
        Ok(())
    }
}

fn forward_lines<R>(stream: R, tx: mpsc::Sender<String>) -> thread::JoinHandle<()>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        for line in BufReader::new(stream).lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    })
}

/// Applies the platform detection rule to a table listing: `sbix` means
/// Apple, a `CBLC`/`CBDT` pair means Android, anything else is unsupported.
pub fn detect_platform(tables: &[String]) -> Result<FontPlatform, ExtractError> {
    let has = |tag: &str| tables.iter().any(|t| t == tag);
    if has(FontTable::Sbix.tag()) {
        Ok(FontPlatform::Apple)
    } else if has(FontTable::Cblc.tag()) && has(FontTable::Cbdt.tag()) {
        Ok(FontPlatform::Android)
    } else {
        Err(ExtractError::UnrecognizedFontType)
    }
}

/// Paths of the per-table dump files, read once per font from the manifest
/// the split dump leaves at the root of the ttx directory. Immutable after
/// construction.
#[derive(Debug)]
pub struct TableIndex {
    entries: FxHashMap<String, Vec<PathBuf>>,
}

impl TableIndex {
    /// Builds the index by parsing the XML manifest. Every element carrying a
    /// `src` attribute maps its tag to a dump file path resolved relative to
    /// the ttx directory.
    pub fn from_manifest(ttx_dir: &Path, manifest_name: &str) -> Result<TableIndex, ExtractError> {
        let manifest_path = ttx_dir.join(manifest_name);
        let file = File::open(&manifest_path).map_err(|err| {
            ExtractError::InvalidTableDump(format!(
                "could not open dump manifest {}: {}",
                manifest_path.display(),
                err
            ))
        })?;

        let parser = EventReader::new(BufReader::new(file));
        let mut entries: FxHashMap<String, Vec<PathBuf>> = FxHashMap::default();
        for event in parser {
            let event = event.map_err(|err| ExtractError::InvalidTableDump(err.to_string()))?;
            if let XmlEvent::StartElement {
                name, attributes, ..
            } = event
            {
                if let Some(src) = attr_value(&attributes, "src") {
                    entries
                        .entry(name.local_name)
                        .or_default()
                        .push(ttx_dir.join(src));
                }
            }
        }

        Ok(TableIndex { entries })
    }

    /// The dump file for a table. Zero or ambiguous manifest entries fail.
    pub fn locate(&self, table: FontTable) -> Result<PathBuf, ExtractError> {
        match self.entries.get(table.tag()).map(Vec::as_slice) {
            Some([path]) => Ok(path.clone()),
            None | Some([]) => Err(ExtractError::TableNotFound(table.tag().to_string())),
            Some(paths) => Err(ExtractError::InvalidTableDump(format!(
                "{} manifest entries for table '{}'",
                paths.len(),
                table.tag()
            ))),
        }
    }
}
