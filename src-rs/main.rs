use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{ArgAction, Args, Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::{json, Value};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

mod conditions;
mod config;
mod error;
mod generate;
mod history;
mod library;
mod logging;
mod resolver;

use conditions::{InputMode, DEFAULT_MUD, DEFAULT_SINUOSITY, DEFAULT_WIDTH};
use config::AppConfig;
use generate::{run_generation, GenerateInputs, GenerationOutcome, Upload};
use history::HistoryStore;
use library::ImageLibrary;

#[derive(Parser, Debug)]
#[command(
    name = "facies-sim",
    version,
    about = "Simulated conditional facies map generation backed by a pre-rendered gallery"
)]
struct Cli {
    /// Gallery root (default: FACIES_GALLERY_DIR / ./facies_gallery)
    #[arg(long, global = true)]
    gallery_dir: Option<PathBuf>,
    /// History store directory (default: FACIES_HISTORY_DIR / ./history_records)
    #[arg(long, global = true)]
    history_dir: Option<PathBuf>,
    /// Debug-level logging on stderr (RUST_LOG overrides)
    #[arg(short, long, global = true, action = ArgAction::SetTrue)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
#[allow(clippy::enum_variant_names)]
enum Commands {
    /// Print supported commands in JSON
    Commands,
    /// Pick a gallery image for the given conditions and record it in history
    Generate(GenerateArgs),
    /// List history entries, newest first
    History(HistoryArgs),
    /// Write one history entry to a file
    Export(ExportArgs),
    /// Delete every history entry
    Clear(ClearArgs),
}

#[derive(Args, Debug)]
struct GenerateArgs {
    /// Condition input mode
    #[arg(long, value_enum, default_value_t = InputMode::Global)]
    mode: InputMode,
    /// Mud ratio, 0.1..=0.9 step 0.1 (global and joint modes)
    #[arg(long, default_value_t = DEFAULT_MUD)]
    mud: f64,
    /// Channel sinuosity, 0.1..=0.9 step 0.1 (global mode)
    #[arg(long, default_value_t = DEFAULT_SINUOSITY)]
    sinuosity: f64,
    /// Channel width, 2.0..=6.0 step 0.5 (global mode)
    #[arg(long, default_value_t = DEFAULT_WIDTH)]
    width: f64,
    /// Well-point image, named like faciesA.png (well and joint modes)
    #[arg(long)]
    upload: Option<PathBuf>,
    /// Write the generated image bytes to this path
    #[arg(long)]
    out: Option<PathBuf>,
    /// RNG seed for reproducible picks (default: FACIES_SEED / entropy)
    #[arg(long)]
    seed: Option<u64>,
    /// Simulated generation time in milliseconds
    #[arg(long, default_value_t = 1000)]
    delay_ms: u64,
    /// Print the generation payload JSON to stdout
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,
    /// Exit non-zero when no image is available or the history write fails
    #[arg(long, action = ArgAction::SetTrue)]
    strict: bool,
}

#[derive(Args, Debug)]
struct HistoryArgs {
    /// Print history JSON to stdout
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,
}

#[derive(Args, Debug)]
struct ExportArgs {
    /// History entry file name (as printed by `history`)
    entry: String,
    /// Destination path (default: ./<entry>)
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ClearArgs {
    /// Print clear report JSON to stdout
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,
    /// Exit non-zero when any entry could not be removed
    #[arg(long, action = ArgAction::SetTrue)]
    strict: bool,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init_tracing(cli.verbose);

    let seed = match &cli.command {
        Commands::Generate(args) => args.seed,
        _ => None,
    };
    let config = AppConfig::resolve(cli.gallery_dir, cli.history_dir, seed);

    match cli.command {
        Commands::Commands => print_commands(),
        Commands::Generate(args) => command_generate(&config, args),
        Commands::History(args) => command_history(&config, args),
        Commands::Export(args) => command_export(&config, args),
        Commands::Clear(args) => command_clear(&config, args),
    }
}

fn print_commands() -> Result<()> {
    let rows = vec![
        json!({
            "name": "generate",
            "description": "Resolve global/well/joint conditions to a gallery image and record it.",
            "modes": ["global", "well", "joint"]
        }),
        json!({
            "name": "history",
            "description": "List recorded images, newest first."
        }),
        json!({
            "name": "export",
            "description": "Download one history entry to a file."
        }),
        json!({
            "name": "clear",
            "description": "Delete all history entries, reporting any that could not be removed."
        }),
    ];

    println!(
        "{}",
        serde_json::to_string_pretty(&json!({ "commands": rows }))?
    );
    Ok(())
}

fn command_generate(config: &AppConfig, args: GenerateArgs) -> Result<()> {
    let upload = args.upload.as_deref().map(Upload::from_path).transpose()?;
    let conditions = GenerateInputs {
        mode: args.mode,
        mud: args.mud,
        sinuosity: args.sinuosity,
        width: args.width,
        upload: upload.as_ref(),
    }
    .into_conditions()?;

    let library = ImageLibrary::new(&config.gallery_root);
    let mut store = HistoryStore::open(&config.history_dir)?;
    let rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    if args.delay_ms > 0 {
        thread::sleep(Duration::from_millis(args.delay_ms));
    }

    let outcome = run_generation(&library, &mut store, rng, conditions)?;

    let download = match (&args.out, outcome.image_bytes.as_deref()) {
        (Some(out), Some(bytes)) => {
            write_bytes(out, bytes)?;
            Some(abs_path(out))
        }
        _ => None,
    };

    let payload = generation_payload(&library, &outcome, upload.as_ref(), download.as_deref());

    if args.json {
        println!("{}", serde_json::to_string(&payload)?);
    } else {
        for warning in outcome.warnings() {
            eprintln!("warning: {warning}");
        }
        if let Some(found) = &outcome.resolution {
            println!("{}", abs_path(&library.path_of(&found.image)).display());
        }
    }

    if args.strict {
        if let Some(issue) = outcome.issues.first() {
            bail!("{}", issue.describe());
        }
    }
    Ok(())
}

fn generation_payload(
    library: &ImageLibrary,
    outcome: &GenerationOutcome,
    upload: Option<&Upload>,
    download: Option<&Path>,
) -> Value {
    let image_path = outcome
        .resolution
        .as_ref()
        .map(|found| abs_path(&library.path_of(&found.image)).display().to_string());
    let image_size = outcome
        .image_dimensions()
        .map(|(w, h)| json!({ "w": w, "h": h, "units": "px" }));

    json!({
        "generated_at": timestamp_iso(),
        "generated_at_epoch_ms": Utc::now().timestamp_millis(),
        "mode": outcome.conditions.mode(),
        "conditions": outcome.conditions,
        "upload": upload.map(Upload::summary),
        "resolution": outcome.resolution,
        "caption": outcome.caption(),
        "image_path": image_path,
        "image_size": image_size,
        "download_path": download.map(|p| p.display().to_string()),
        "history_entry": outcome.history,
        "warnings": outcome.warnings(),
    })
}

fn command_history(config: &AppConfig, args: HistoryArgs) -> Result<()> {
    let store = HistoryStore::open(&config.history_dir)?;
    let entries = store.list();

    if args.json {
        let payload = json!({
            "history_dir": abs_path(store.dir()).display().to_string(),
            "count": store.len(),
            "entries": entries,
        });
        println!("{}", serde_json::to_string(&payload)?);
        return Ok(());
    }

    if store.is_empty() {
        eprintln!("no history records yet; generate some images first");
        return Ok(());
    }
    for entry in entries {
        println!(
            "{}\t{}\t{}",
            entry.id,
            entry.recorded_at.as_deref().unwrap_or("-"),
            entry.size
        );
    }
    Ok(())
}

fn command_export(config: &AppConfig, args: ExportArgs) -> Result<()> {
    let store = HistoryStore::open(&config.history_dir)?;
    let bytes = store.read(&args.entry)?;
    let out = args
        .out
        .unwrap_or_else(|| PathBuf::from(&args.entry));
    write_bytes(&out, &bytes)?;
    println!("{}", abs_path(&out).display());
    Ok(())
}

fn command_clear(config: &AppConfig, args: ClearArgs) -> Result<()> {
    let mut store = HistoryStore::open(&config.history_dir)?;
    let report = store.clear()?;

    if args.json {
        println!("{}", serde_json::to_string(&report)?);
    } else {
        for failure in &report.failed {
            eprintln!("warning: could not remove {}: {}", failure.id, failure.reason);
        }
        println!(
            "cleared {} history entries ({} failed)",
            report.removed.len(),
            report.failed.len()
        );
    }

    if args.strict {
        if let Some(err) = report.into_error() {
            bail!(err);
        }
    }
    Ok(())
}

fn write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    ensure_parent_dir(path)?;
    fs::write(path, bytes).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create parent directory: {}", parent.display())
            })?;
        }
    }
    Ok(())
}

fn abs_path(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(path)
}

fn timestamp_iso() -> String {
    Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditions::{ConditionSet, GlobalConditions};
    use tempfile::tempdir;

    #[test]
    fn cli_parses_generate_modes() {
        let cli = Cli::try_parse_from([
            "facies-sim",
            "--gallery-dir",
            "/g",
            "generate",
            "--mode",
            "joint",
            "--mud",
            "0.7",
            "--upload",
            "faciesA.png",
            "--seed",
            "4",
        ])
        .unwrap();
        assert_eq!(cli.gallery_dir, Some(PathBuf::from("/g")));
        match cli.command {
            Commands::Generate(args) => {
                assert_eq!(args.mode, InputMode::Joint);
                assert_eq!(args.mud, 0.7);
                assert_eq!(args.sinuosity, DEFAULT_SINUOSITY);
                assert_eq!(args.seed, Some(4));
                assert_eq!(args.delay_ms, 1000);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn cli_rejects_unknown_mode() {
        assert!(Cli::try_parse_from(["facies-sim", "generate", "--mode", "both"]).is_err());
    }

    #[test]
    fn writes_bytes_creating_parents() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("a").join("b.png");
        write_bytes(&target, b"png").unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"png");
    }

    #[test]
    fn payload_reports_empty_gallery() {
        let dir = tempdir().unwrap();
        let library = ImageLibrary::new(dir.path().join("facies_gallery"));
        let mut store = HistoryStore::open(dir.path().join("history_records")).unwrap();
        let conditions = ConditionSet::Global(GlobalConditions::new(0.5, 0.5, 4.0).unwrap());
        let outcome =
            run_generation(&library, &mut store, StdRng::seed_from_u64(0), conditions).unwrap();

        let payload = generation_payload(&library, &outcome, None, None);
        assert_eq!(payload["mode"], "global");
        assert!(payload["image_path"].is_null());
        assert!(payload["history_entry"].is_null());
        assert_eq!(payload["warnings"].as_array().map(Vec::len), Some(1));
    }

    #[test]
    fn generate_then_export_round_trips() {
        let dir = tempdir().unwrap();
        let config = AppConfig {
            gallery_root: dir.path().join("facies_gallery"),
            history_dir: dir.path().join("history_records"),
            seed: Some(11),
        };
        let well = config.gallery_root.join("wellimage");
        fs::create_dir_all(&well).unwrap();
        fs::write(well.join("fakesA1.png"), b"A1 bytes").unwrap();
        let upload_path = dir.path().join("faciesA.png");
        fs::write(&upload_path, b"upload").unwrap();

        command_generate(
            &config,
            GenerateArgs {
                mode: InputMode::Well,
                mud: DEFAULT_MUD,
                sinuosity: DEFAULT_SINUOSITY,
                width: DEFAULT_WIDTH,
                upload: Some(upload_path),
                out: Some(dir.path().join("download").join("result.png")),
                seed: None,
                delay_ms: 0,
                json: true,
                strict: true,
            },
        )
        .unwrap();
        assert_eq!(
            fs::read(dir.path().join("download").join("result.png")).unwrap(),
            b"A1 bytes"
        );

        let store = HistoryStore::open(&config.history_dir).unwrap();
        let entry = store.list().remove(0);
        let exported = dir.path().join("exported.png");
        command_export(
            &config,
            ExportArgs {
                entry: entry.id,
                out: Some(exported.clone()),
            },
        )
        .unwrap();
        assert_eq!(fs::read(&exported).unwrap(), b"A1 bytes");

        command_clear(&config, ClearArgs { json: true, strict: true }).unwrap();
        assert!(HistoryStore::open(&config.history_dir).unwrap().is_empty());
    }

    #[test]
    fn generate_rejects_missing_upload() {
        let dir = tempdir().unwrap();
        let config = AppConfig {
            gallery_root: dir.path().join("g"),
            history_dir: dir.path().join("h"),
            seed: Some(1),
        };
        let err = command_generate(
            &config,
            GenerateArgs {
                mode: InputMode::Joint,
                mud: 0.3,
                sinuosity: DEFAULT_SINUOSITY,
                width: DEFAULT_WIDTH,
                upload: None,
                out: None,
                seed: None,
                delay_ms: 0,
                json: true,
                strict: false,
            },
        )
        .unwrap_err();
        assert!(err.to_string().contains("uploaded well image"));
    }

    #[test]
    fn strict_generate_fails_on_empty_gallery() {
        let dir = tempdir().unwrap();
        let config = AppConfig {
            gallery_root: dir.path().join("g"),
            history_dir: dir.path().join("h"),
            seed: Some(1),
        };
        let args = |strict| GenerateArgs {
            mode: InputMode::Global,
            mud: DEFAULT_MUD,
            sinuosity: DEFAULT_SINUOSITY,
            width: DEFAULT_WIDTH,
            upload: None,
            out: None,
            seed: None,
            delay_ms: 0,
            json: false,
            strict,
        };

        assert!(command_generate(&config, args(false)).is_ok());
        let err = command_generate(&config, args(true)).unwrap_err();
        assert!(err.to_string().contains("no image available"));
        assert!(HistoryStore::open(&config.history_dir).unwrap().is_empty());
    }
}
