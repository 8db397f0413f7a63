use std::path::PathBuf;
use std::process::exit;

use emoji_extractor::{ExtractionEvent, Extractor, ExtractorConfig, Project};

mod flags {
    use std::path::PathBuf;

    xflags::xflags! {
        /// Extract bitmap emoji glyphs from an Apple or Android font.
        cmd emoji-extractor {
            /// Path to the emoji font file.
            required font: PathBuf
            /// Working directory for the table dump and extracted images.
            optional -o, --out out: PathBuf
            /// Font dump tool to invoke (defaults to `ttx`).
            optional --tool tool: PathBuf
            /// Log more (repeat for debug output).
            repeated -v, --verbose
        }
    }
}

fn main() {
    let flags = flags::EmojiExtractor::from_env_or_exit();

    env_logger::init_from_env(env_logger::Env::default().filter_or(
        env_logger::DEFAULT_FILTER_ENV,
        match flags.verbose {
            0 => "warn",
            1 => "info",
            _ => "debug",
        },
    ));

    let mut config = ExtractorConfig::default();
    if let Some(tool) = flags.tool {
        config.font_tool = tool;
    }

    let data_path = flags
        .out
        .unwrap_or_else(|| PathBuf::from("emoji-extraction"));
    let name = flags
        .font
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "font".to_string());
    if let Err(err) = std::fs::create_dir_all(&data_path) {
        eprintln!("could not create {}: {}", data_path.display(), err);
        exit(1);
    }

    let project = Project::new(name, data_path, flags.font);
    let handle = Extractor::new(config).extract(project);

    while let Some(event) = handle.recv() {
        match event {
            ExtractionEvent::Progress(pct) => {
                print!("\r{:>3}%", pct);
                use std::io::Write;
                let _ = std::io::stdout().flush();
            }
            ExtractionEvent::Done(project) => {
                match project.extraction_path {
                    Some(path) => println!("\nextracted into {}", path.display()),
                    None => println!("\ndone"),
                }
            }
            ExtractionEvent::Failed(message) => {
                eprintln!("\nerror: {}", message);
                exit(1);
            }
        }
    }
    handle.join();
}
