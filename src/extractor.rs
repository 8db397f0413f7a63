//! Per-run orchestration: platform detection, glyph-name resolution, file
//! writes and progress reporting.
//!
//! Each extraction runs on its own worker thread and reports upward through
//! a channel of [`ExtractionEvent`]s: a monotonic 0-100 progress stream
//! terminated by either `Done` or a single translated `Failed` message.
//! Cancellation is cooperative and is not a failure; it simply halts event
//! emission and tears down the child process and open streams.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use itertools::Itertools;
use log::{debug, error, info, warn};

use crate::config::ExtractorConfig;
use crate::error::ExtractError;
use crate::font_tools::{self, FontPlatform, FontTools, TableIndex};
use crate::png::cgbi;
use crate::project::Project;
use crate::tables::cmap::{self, CmapSubtable};
use crate::tables::gsub::{self, LigatureIndex};
use crate::tables::{cbdt, sbix, FontTable};

/// Cooperative cancellation flag shared between the run owner and the
/// worker. Cloning hands out another handle on the same flag.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// What an extraction run reports upward.
#[derive(Debug)]
pub enum ExtractionEvent {
    /// Overall completion percentage, 0-100, monotonic. 100 is emitted only
    /// on success.
    Progress(u8),
    /// The run finished; the record carries the dump and extraction paths.
    Done(Project),
    /// The run aborted. One human-readable message per run; the underlying
    /// cause goes to the log, not to the caller.
    Failed(String),
}

/// Handle on one running extraction.
pub struct ExtractionHandle {
    events: Receiver<ExtractionEvent>,
    cancel: CancelToken,
    worker: Option<JoinHandle<()>>,
}

impl ExtractionHandle {
    /// Blocks for the next event. `None` once the run is over and all events
    /// have been drained.
    pub fn recv(&self) -> Option<ExtractionEvent> {
        self.events.recv().ok()
    }

    pub fn events(&self) -> &Receiver<ExtractionEvent> {
        &self.events
    }

    /// Requests cancellation. The worker stops at its next checkpoint.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Waits for the worker thread to finish.
    pub fn join(mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// Drives extraction runs. One logical run per project at a time; nothing is
/// shared between runs.
pub struct Extractor {
    config: ExtractorConfig,
}

impl Extractor {
    pub fn new(config: ExtractorConfig) -> Extractor {
        Extractor { config }
    }

    /// Starts an extraction run for the project on a worker thread.
    pub fn extract(&self, project: Project) -> ExtractionHandle {
        let cancel = CancelToken::new();
        let (tx, rx) = mpsc::channel();
        let config = self.config.clone();
        let token = cancel.clone();
        let worker = thread::spawn(move || run_extraction(config, project, tx, token));
        ExtractionHandle {
            events: rx,
            cancel,
            worker: Some(worker),
        }
    }
}

fn run_extraction(
    config: ExtractorConfig,
    project: Project,
    tx: Sender<ExtractionEvent>,
    cancel: CancelToken,
) {
    let mut reporter = ProgressReporter::new(tx.clone(), cancel.clone());
    match execute(&config, project, &mut reporter, &cancel) {
        Ok(Some(project)) => {
            let _ = tx.send(ExtractionEvent::Done(project));
        }
        Ok(None) => {
            debug!("extraction cancelled");
        }
        Err(err) => {
            error!("extraction failed: {}", err);
            let _ = tx.send(ExtractionEvent::Failed(user_message(&err)));
        }
    }
}

fn execute(
    config: &ExtractorConfig,
    mut project: Project,
    reporter: &mut ProgressReporter,
    cancel: &CancelToken,
) -> Result<Option<Project>, ExtractError> {
    if !project.font_path.is_file() {
        return Err(ExtractError::FontMissing(project.font_path.clone()));
    }

    reporter.emit(0);
    let tools = FontTools::new(config.font_tool.clone());

    // Conversion covers the first half of overall progress.
    let ttx_dir = project.data_path.join(&config.ttx_dir_name);
    fs::create_dir_all(&ttx_dir)?;
    let manifest = ttx_dir.join(&config.ttx_manifest_name);
    let tables = tools.convert_to_ttx(&project.font_path, &manifest, cancel, |pct| {
        reporter.emit(pct / 2);
    })?;
    if cancel.is_cancelled() {
        return Ok(None);
    }
    reporter.emit(50);
    project.ttx_dir_path = Some(ttx_dir.clone());

    let platform = font_tools::detect_platform(&tables)?;
    if let Some(declared) = project.font_type {
        if declared != platform {
            warn!(
                "project says {:?} but the font's tables say {:?}; trusting the tables",
                declared, platform
            );
        }
    }
    project.font_type = Some(platform);

    // The table index is built once per font and reused for every lookup,
    // as is the cmap format 12 subtable.
    let index = TableIndex::from_manifest(&ttx_dir, &config.ttx_manifest_name)?;
    let cmap = cmap::find_subtable(&index.locate(FontTable::Cmap)?, 12)?;
    debug!("cmap format 12 subtable carries {} mappings", cmap.len());

    // The extraction directory exists exactly once, before any glyph write.
    let extraction_dir = project.data_path.join(&config.extraction_dir_name);
    if extraction_dir.exists() {
        fs::remove_dir_all(&extraction_dir)?;
    }
    fs::create_dir_all(&extraction_dir)?;

    match platform {
        FontPlatform::Android => {
            extract_android(&index, &extraction_dir, &cmap, cancel, reporter)?
        }
        FontPlatform::Apple => extract_apple(&index, &extraction_dir, &cmap, cancel, reporter)?,
    }
    if cancel.is_cancelled() {
        return Ok(None);
    }

    project.extraction_path = Some(extraction_dir);
    reporter.emit(100);
    Ok(Some(project))
}

/// Streams CBDT records, resolving names through cmap with a ligature-set
/// fallback, and writes one file per resolved glyph. Covers 50-100.
fn extract_android(
    index: &TableIndex,
    out_dir: &Path,
    cmap: &CmapSubtable,
    cancel: &CancelToken,
    reporter: &mut ProgressReporter,
) -> Result<(), ExtractError> {
    let ligatures = gsub::extract_ligature_sets(&index.locate(FontTable::Gsub)?)?;

    let cbdt_path = index.locate(FontTable::Cbdt)?;
    let total = cbdt::count_glyphs(&cbdt_path)?;
    info!("CBDT table carries {} bitmap glyphs", total);

    let mut done = 0usize;
    let mut written = 0usize;
    for record in cbdt::extract_glyph_data(&cbdt_path)? {
        if cancel.is_cancelled() {
            return Ok(());
        }
        match resolve_file_name(&record.name, cmap, Some(&ligatures)) {
            Some(file_name) => {
                if write_glyph(out_dir, &file_name, &record.data) {
                    written += 1;
                }
            }
            None => warn!(
                "glyph '{}' has no cmap or ligature mapping; skipping",
                record.name
            ),
        }
        done += 1;
        reporter.emit(50 + (done.min(total) * 50 / total.max(1)) as u8);
    }

    if done != total {
        warn!(
            "count pass reported {} glyphs but {} records were emitted",
            total, done
        );
    }
    info!("wrote {} of {} glyphs", written, done);
    Ok(())
}

/// Streams sbix records, resolving names through cmap only, then repairs the
/// CgBI encoding across the written files. Extraction covers 50-75 and the
/// repair pass 75-100.
fn extract_apple(
    index: &TableIndex,
    out_dir: &Path,
    cmap: &CmapSubtable,
    cancel: &CancelToken,
    reporter: &mut ProgressReporter,
) -> Result<(), ExtractError> {
    let sbix_path = index.locate(FontTable::Sbix)?;
    let total = sbix::count_glyphs(&sbix_path)?;
    info!("sbix table carries {} PNG glyphs", total);

    let mut done = 0usize;
    let mut written = 0usize;
    for record in sbix::extract_glyph_data(&sbix_path)? {
        if cancel.is_cancelled() {
            return Ok(());
        }
        match resolve_file_name(&record.name, cmap, None) {
            Some(file_name) => {
                if write_glyph(out_dir, &file_name, &record.data) {
                    written += 1;
                }
            }
            None => warn!("glyph '{}' has no cmap mapping; skipping", record.name),
        }
        done += 1;
        reporter.emit(50 + (done.min(total) * 25 / total.max(1)) as u8);
    }

    if done != total {
        warn!(
            "count pass reported {} glyphs but {} records were emitted",
            total, done
        );
    }
    reporter.emit(75);
    info!("wrote {} of {} glyphs", written, done);

    let summary = cgbi::convert_directory(out_dir, cancel, |pct| {
        reporter.emit(75 + (pct as usize * 25 / 100) as u8);
    })?;
    if cancel.is_cancelled() {
        return Ok(());
    }
    info!(
        "CgBI repair: {} converted, {} skipped, {} failed",
        summary.converted, summary.skipped, summary.failed
    );
    Ok(())
}

/// Writes one resolved glyph. A failed write loses that glyph only; it is
/// logged and the stream moves on.
fn write_glyph(out_dir: &Path, file_name: &str, data: &[u8]) -> bool {
    let path = out_dir.join(file_name);
    match fs::write(&path, data) {
        Ok(()) => true,
        Err(err) => {
            warn!("could not write {}: {}", path.display(), err);
            false
        }
    }
}

/// Maps an internal glyph name to its public file name: a direct cmap hit
/// becomes `<code>.png`; otherwise a ligature whose substitution produces
/// the glyph becomes the base and component codes joined with `_`, in
/// declared order. `None` is a resolution gap and the glyph is skipped.
fn resolve_file_name(
    glyph_name: &str,
    cmap: &CmapSubtable,
    ligatures: Option<&LigatureIndex>,
) -> Option<String> {
    if let Some(code) = cmap.code_for(glyph_name) {
        return Some(format!("{}.png", code));
    }

    let (set, ligature) = ligatures?.ligature_for_result(glyph_name)?;
    let mut codes = Vec::with_capacity(ligature.components.len() + 1);
    codes.push(cmap.code_for(&set.glyph_name)?);
    for component in &ligature.components {
        codes.push(cmap.code_for(component)?);
    }
    Some(format!("{}.png", codes.iter().join("_")))
}

/// Translates a run-fatal error into the single message surfaced upward.
fn user_message(err: &ExtractError) -> String {
    match err {
        ExtractError::FontMissing(_) => "The project's font file is missing.".into(),
        ExtractError::FontReadError(_) => {
            "The font could not be converted by the font tools.".into()
        }
        ExtractError::TableNotFound(tag) => format!("The font is missing its '{}' table.", tag),
        ExtractError::SubtableNotFound(format) => format!(
            "The font's character map has no format {} subtable.",
            format
        ),
        ExtractError::UnrecognizedFontType => {
            "The font does not look like an Apple or Android emoji font.".into()
        }
        ExtractError::InvalidTableDump(_) => {
            "The font's dumped tables could not be parsed.".into()
        }
        ExtractError::Png(_) => "An extracted image could not be processed.".into(),
        ExtractError::Io(_) => "A file operation failed during extraction.".into(),
    }
}

/// Pushes progress events, keeping the stream monotonic and treating a
/// hung-up receiver as cancellation.
struct ProgressReporter {
    tx: Sender<ExtractionEvent>,
    cancel: CancelToken,
    last: i16,
}

impl ProgressReporter {
    fn new(tx: Sender<ExtractionEvent>, cancel: CancelToken) -> ProgressReporter {
        ProgressReporter {
            tx,
            cancel,
            last: -1,
        }
    }

    fn emit(&mut self, pct: u8) {
        let pct = pct.min(100);
        if i16::from(pct) <= self.last {
            return;
        }
        self.last = i16::from(pct);
        if self.tx.send(ExtractionEvent::Progress(pct)).is_err() {
            self.cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::gsub::{Ligature, LigatureSet};

    fn sample_cmap() -> CmapSubtable {
        CmapSubtable::new(
            12,
            3,
            10,
            vec!["A".into(), "B".into(), "C".into()],
            vec!["65".into(), "66".into(), "0x43".into()],
        )
    }

    fn sample_ligatures() -> LigatureIndex {
        let mut index = LigatureIndex::default();
        index.push(LigatureSet {
            glyph_name: "A".into(),
            ligatures: vec![
                Ligature {
                    glyph_name: "AB_lig".into(),
                    components: vec!["B".into()],
                },
                Ligature {
                    glyph_name: "ACB_lig".into(),
                    components: vec!["C".into(), "B".into()],
                },
                Ligature {
                    glyph_name: "AX_lig".into(),
                    components: vec!["X".into()],
                },
            ],
        });
        index
    }

    #[test]
    fn direct_cmap_hit_uses_the_code_as_file_name() {
        assert_eq!(
            resolve_file_name("A", &sample_cmap(), None),
            Some("65.png".into())
        );
    }

    #[test]
    fn ligature_fallback_joins_codes_in_declared_order() {
        let ligatures = sample_ligatures();
        assert_eq!(
            resolve_file_name("AB_lig", &sample_cmap(), Some(&ligatures)),
            Some("65_66.png".into())
        );
        assert_eq!(
            resolve_file_name("ACB_lig", &sample_cmap(), Some(&ligatures)),
            Some("65_0x43_66.png".into())
        );
    }

    #[test]
    fn unresolvable_component_is_a_resolution_gap() {
        let ligatures = sample_ligatures();
        assert_eq!(
            resolve_file_name("AX_lig", &sample_cmap(), Some(&ligatures)),
            None
        );
    }

    #[test]
    fn unknown_glyph_without_ligature_index_is_skipped() {
        assert_eq!(resolve_file_name("nope", &sample_cmap(), None), None);
        assert_eq!(
            resolve_file_name("nope", &sample_cmap(), Some(&sample_ligatures())),
            None
        );
    }

    #[test]
    fn progress_stream_is_monotonic() {
        let (tx, rx) = mpsc::channel();
        let mut reporter = ProgressReporter::new(tx, CancelToken::new());
        for pct in [0, 10, 5, 10, 50, 120, 100] {
            reporter.emit(pct);
        }
        drop(reporter);

        let seen: Vec<_> = rx
            .iter()
            .map(|event| match event {
                ExtractionEvent::Progress(pct) => pct,
                other => panic!("unexpected event {:?}", other),
            })
            .collect();
        assert_eq!(seen, vec![0, 10, 50, 100]);
    }

    #[test]
    fn hung_up_receiver_cancels_the_run() {
        let (tx, rx) = mpsc::channel();
        drop(rx);
        let cancel = CancelToken::new();
        let mut reporter = ProgressReporter::new(tx, cancel.clone());
        reporter.emit(10);
        assert!(cancel.is_cancelled());
    }
}
