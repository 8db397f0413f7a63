//! Extraction of bitmap emoji glyphs from TrueType/OpenType fonts.
//!
//! Apple fonts carry their emoji bitmaps in an `sbix` table as CgBI-encoded
//! PNGs; Android fonts carry theirs in a `CBDT`/`CBLC` pair. This crate
//! drives an external `ttx`-style dump tool over a font, streams the dumped
//! bitmap table, maps each glyph's internal name to its Unicode code
//! sequence through the `cmap` and `GSUB` tables, writes one PNG per
//! resolved glyph, and repairs the CgBI pixel encoding where needed.
//!
//! The entry point is [`Extractor`], which runs one extraction per call on a
//! worker thread and reports a cancellable stream of progress events:
//!
//! ```no_run
//! use emoji_extractor::{Extractor, ExtractorConfig, ExtractionEvent, Project};
//!
//! let extractor = Extractor::new(ExtractorConfig::default());
//! let project = Project::new("noto", "work/noto".into(), "NotoColorEmoji.ttf".into());
//! let handle = extractor.extract(project);
//! while let Some(event) = handle.recv() {
//!     match event {
//!         ExtractionEvent::Progress(pct) => println!("{}%", pct),
//!         ExtractionEvent::Done(project) => println!("done: {:?}", project.extraction_path),
//!         ExtractionEvent::Failed(message) => eprintln!("{}", message),
//!     }
//! }
//! ```

pub mod config;
pub mod error;
pub mod extractor;
pub mod font_tools;
pub mod png;
pub mod project;
pub mod tables;

pub use config::ExtractorConfig;
pub use error::{ExtractError, PngError};
pub use extractor::{CancelToken, ExtractionEvent, ExtractionHandle, Extractor};
pub use font_tools::FontPlatform;
pub use project::Project;
