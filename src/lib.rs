pub mod capabilities;
pub mod db;
pub mod error;
pub mod pipeline;
pub mod quality;
pub mod registry;
pub mod replay;
pub mod settings;
pub mod text;
pub mod tracker;
mod utils;

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{bail, Context, Result};
use log::{info, warn};

use db::Database;
use error::StartupError;
use pipeline::{Pipeline, Sink, SourceController, StoreSink};
use replay::{replay_collaborators, Manifest, ManifestSource, ReplayModels};
use settings::SettingsStore;

const USAGE: &str = "usage: platewatch [--display] <manifest.json>... [--settings <settings.json>]";

struct Args {
    manifests: Vec<PathBuf>,
    settings: PathBuf,
    display_only: bool,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Args> {
    let mut parsed = Args {
        manifests: Vec::new(),
        settings: PathBuf::from("platewatch.json"),
        display_only: false,
    };
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--display" => parsed.display_only = true,
            "--settings" => {
                let Some(path) = args.next() else {
                    bail!("--settings needs a path\n{USAGE}");
                };
                parsed.settings = PathBuf::from(path);
            }
            flag if flag.starts_with("--") => bail!("unknown flag {flag}\n{USAGE}"),
            path => parsed.manifests.push(PathBuf::from(path)),
        }
    }
    if parsed.manifests.is_empty() {
        bail!("no manifest given\n{USAGE}");
    }
    Ok(parsed)
}

fn load_manifest(path: &Path) -> Result<Manifest, StartupError> {
    Manifest::load(path).map_err(|source| StartupError::Component {
        component: "replay manifest",
        source,
    })
}

/// Replays each manifest as its own frame source through one shared pipeline.
pub fn run() -> Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = parse_args(std::env::args().skip(1))?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    runtime.block_on(replay(args))
}

async fn replay(args: Args) -> Result<()> {
    let store = SettingsStore::new(args.settings).map_err(StartupError::Settings)?;
    let settings = store.current();
    info!("platewatch starting up...");

    let models = ReplayModels::new(settings.plate_label.clone());
    let sink = if args.display_only {
        Sink::Display
    } else {
        let database = Database::new(settings.database_path.clone()).map_err(StartupError::Storage)?;
        Sink::Store(StoreSink::new(database, settings.image_dir.clone()))
    };
    let pipeline = Arc::new(Pipeline::new(replay_collaborators(&models), sink, settings)?);

    let mut controller = SourceController::new(Arc::clone(&pipeline));
    // Recordings are staged on a shared model double, so manifests run one
    // after another rather than side by side.
    for path in &args.manifests {
        let manifest = load_manifest(path)?;
        let name = path.display().to_string();
        controller.spawn(Box::new(ManifestSource::new(name, manifest, models.clone())))?;

        for (name, stats) in controller.wait().await? {
            info!(
                "{name}: {} frame(s) read, {} skipped, {} failed; {} plate(s) read, {} failed",
                stats.frames_read,
                stats.frames_skipped,
                stats.frames_failed,
                stats.plates_read,
                stats.plates_failed
            );
            if stats.frames_failed > 0 || stats.plates_failed > 0 {
                warn!("{name}: some detections were dropped; see errors above");
            }
        }
    }

    if let Sink::Store(store) = pipeline.sink() {
        let plates = store.registry().count().await?;
        info!("{plates} distinct plate(s) on record");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Result<Args> {
        parse_args(list.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_parse_args() {
        let parsed = args(&["--display", "a.json", "b.json", "--settings", "s.json"]).unwrap();
        assert!(parsed.display_only);
        assert_eq!(parsed.manifests, vec![PathBuf::from("a.json"), PathBuf::from("b.json")]);
        assert_eq!(parsed.settings, PathBuf::from("s.json"));
    }

    #[test]
    fn test_unreadable_manifest_is_a_startup_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_manifest(&dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(
            err,
            StartupError::Component {
                component: "replay manifest",
                ..
            }
        ));
        assert!(err.to_string().starts_with("failed to load replay manifest"));
    }

    #[test]
    fn test_parse_args_rejects_bad_input() {
        assert!(args(&[]).is_err());
        assert!(args(&["a.json", "--settings"]).is_err());
        assert!(args(&["--verbose", "a.json"]).is_err());
    }
}
