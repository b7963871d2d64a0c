//! # LaunchRank CLI Entry Point
//!
//! Drives the tracking and ranking engine from the command line.
//!
//! ## Usage
//!
//! ```bash
//! # Count a launch of an app (optionally at a given epoch-millisecond time)
//! launchrank record com.example.mail
//! launchrank record com.example.mail --at 1650000000000
//!
//! # Ranked list for the default widget, or a specific one
//! launchrank rank
//! launchrank rank --widget 12 --json
//!
//! # Inspect and maintain history
//! launchrank show
//! launchrank reset com.example.mail
//! launchrank reset
//! launchrank decay
//!
//! # Move the whole document between devices
//! launchrank export backup.json
//! launchrank import backup.json
//!
//! # Print the effective configuration
//! launchrank config
//! ```
//!
//! Set `RUST_LOG=debug` to see ingestion decisions.

use launchrank::config::EngineConfig;
use launchrank::ingest::{IngestOutcome, UsageTracker, WidgetRefresher};
use launchrank::platform::{LogNotifier, PermissiveCatalog};
use launchrank::rank::{RankingEngine, UnavailableUsageStats};
use launchrank::store::DataStore;
use launchrank::usage::{Clock, ManualClock, SystemClock};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, FixedOffset, Local, TimeZone};
use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

/// LaunchRank - rank apps by when and how often you use them
#[derive(Parser, Debug)]
#[command(name = "launchrank")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Track app launches and rank apps for home-screen widgets", long_about = None)]
struct Args {
    /// Directory holding the usage document (overrides the config file)
    #[arg(long, value_name = "DIR", global = true)]
    data_dir: Option<PathBuf>,

    /// Path to the configuration file
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Count one foreground launch of an app
    Record {
        /// Package id of the app
        package: String,
        /// Event time in milliseconds since the epoch (defaults to now)
        #[arg(long, value_name = "MS")]
        at: Option<i64>,
    },
    /// Print the ranked app list for a widget
    Rank {
        /// Widget id (0 is the global default)
        #[arg(long, default_value_t = 0)]
        widget: i32,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Print the usage history
    Show,
    /// Forget one app's history, or everything when no package is given
    Reset { package: Option<String> },
    /// Apply the retention decay right away
    Decay,
    /// Write the whole document to a file
    Export { file: PathBuf },
    /// Replace the document with a file of any supported format
    Import { file: PathBuf },
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let args = Args::parse();
    let stdout = io::stdout();
    let mut out = stdout.lock();
    run_application(args, &mut out).await
}

async fn run_application(args: Args, out: &mut dyn Write) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::load_from(path)?,
        None => EngineConfig::load(),
    };
    if let Some(dir) = args.data_dir {
        config.data_dir = Some(dir);
    }

    // `record --at` pins the wall clock too, so the launch lands in that slot
    let clock: Arc<dyn Clock> = match &args.command {
        Command::Record { at: Some(ms), .. } => Arc::new(ManualClock::new(local_time(*ms)?)),
        _ => Arc::new(SystemClock),
    };
    let store = Arc::new(config.open_store(Arc::clone(&clock))?);

    match args.command {
        Command::Record { package, at } => {
            let timestamp = at.unwrap_or_else(|| clock.now_millis());
            let tracker = UsageTracker::new(Arc::clone(&store), &config)?;
            let outcome = tracker.on_foreground_app_changed(&package, timestamp);
            tracker.flush()?;

            let refresher = WidgetRefresher::new(
                Arc::new(LogNotifier),
                Arc::new(PermissiveCatalog),
                clock,
                &config,
            );
            refresher.on_foreground_app_changed(&package, &store.load().home_launcher_package_name);

            writeln!(out, "{}", describe_outcome(&package, outcome))?;
        }
        Command::Rank { widget, json } => {
            let engine = RankingEngine::new(
                store,
                Arc::new(PermissiveCatalog),
                Arc::new(UnavailableUsageStats),
                &config,
            );
            let ranked = engine.rank_widget(widget);
            if json {
                let rendered =
                    serde_json::to_string_pretty(&ranked).context("Failed to serialize ranking")?;
                writeln!(out, "{rendered}")?;
            } else if ranked.is_empty() {
                writeln!(out, "No apps to rank yet")?;
            } else {
                for (position, app) in ranked.iter().enumerate() {
                    let pin = if app.pinned { "  [pinned]" } else { "" };
                    writeln!(
                        out,
                        "{:>3}. {:<44} {:>10}{}",
                        position + 1,
                        app.package_name,
                        app.sort_value,
                        pin
                    )?;
                }
            }
        }
        Command::Show => show_history(&store, out)?,
        Command::Reset { package } => {
            let tracker = UsageTracker::new(Arc::clone(&store), &config)?;
            match package {
                Some(package) => {
                    if !tracker.reset_app(&package) {
                        bail!("No usage history for {}", package);
                    }
                    tracker.flush()?;
                    writeln!(out, "Reset history of {package}")?;
                }
                None => {
                    tracker.clear_all();
                    tracker.flush()?;
                    writeln!(out, "Cleared all usage history")?;
                }
            }
        }
        Command::Decay => {
            let document = store.decay_now()?;
            writeln!(out, "Decayed launch counts of {} apps", document.app_infos.len())?;
        }
        Command::Export { file } => {
            store.export_to(&file)?;
            writeln!(out, "Exported to {}", file.display())?;
        }
        Command::Import { file } => {
            let document = store.import_from(&file)?;
            writeln!(
                out,
                "Imported {} apps and {} widget configurations",
                document.app_infos.len(),
                document.widget_settings.len()
            )?;
        }
        Command::Config => {
            let rendered =
                serde_json::to_string_pretty(&config).context("Failed to serialize config")?;
            writeln!(out, "{rendered}")?;
        }
    }

    Ok(())
}

fn describe_outcome(package: &str, outcome: IngestOutcome) -> String {
    match outcome {
        IngestOutcome::Ignored => format!("Ignored {package}"),
        IngestOutcome::BurstSuppressed => format!("Ignored {package} (duplicate launch)"),
        IngestOutcome::Counted {
            slot,
            first_launch: true,
        } => format!("Started tracking {package} (slot {slot})"),
        IngestOutcome::Counted { slot, .. } => format!("Counted {package} (slot {slot})"),
    }
}

fn show_history(store: &DataStore, out: &mut dyn Write) -> Result<()> {
    let mut records = store.load().app_infos;
    if records.is_empty() {
        writeln!(out, "No usage history yet")?;
        return Ok(());
    }

    records.sort_by(|a, b| b.launched_times().cmp(&a.launched_times()));
    for record in &records {
        let last = if record.last_launched > 0 {
            local_time(record.last_launched)?
                .format("%Y-%m-%d %H:%M")
                .to_string()
        } else {
            "never".to_string()
        };
        writeln!(
            out,
            "{:<44} {:>8}  {}",
            record.package_name,
            record.launched_times(),
            last
        )?;
    }
    Ok(())
}

fn local_time(millis: i64) -> Result<DateTime<FixedOffset>> {
    Local
        .timestamp_millis_opt(millis)
        .single()
        .map(|time| time.fixed_offset())
        .with_context(|| format!("Invalid timestamp: {millis}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn args(temp_dir: &TempDir, command: &[&str]) -> Args {
        let data_dir = temp_dir.path().join("data");
        let config = temp_dir.path().join("config.json");
        let mut argv = vec![
            "launchrank".to_string(),
            "--data-dir".to_string(),
            data_dir.display().to_string(),
            "--config".to_string(),
            config.display().to_string(),
        ];
        argv.extend(command.iter().map(|s| (*s).to_string()));
        Args::try_parse_from(argv).unwrap()
    }

    async fn run(temp_dir: &TempDir, command: &[&str]) -> Result<String> {
        let mut out = Vec::new();
        run_application(args(temp_dir, command), &mut out).await?;
        Ok(String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_args_parsing() {
        let args =
            Args::try_parse_from(["launchrank", "record", "com.mail", "--at", "42"]).unwrap();
        assert!(matches!(
            args.command,
            Command::Record { ref package, at: Some(42) } if package == "com.mail"
        ));

        let args = Args::try_parse_from(["launchrank", "rank", "--widget", "7", "--json"]).unwrap();
        assert!(matches!(args.command, Command::Rank { widget: 7, json: true }));

        let args = Args::try_parse_from(["launchrank", "reset"]).unwrap();
        assert!(matches!(args.command, Command::Reset { package: None }));

        assert!(Args::try_parse_from(["launchrank"]).is_err());
    }

    #[tokio::test]
    async fn test_record_then_rank() {
        let temp_dir = TempDir::new().unwrap();
        run(&temp_dir, &["record", "com.mail", "--at", "1650000000000"])
            .await
            .unwrap();
        run(&temp_dir, &["record", "com.chat", "--at", "1650000100000"])
            .await
            .unwrap();
        run(&temp_dir, &["record", "com.mail", "--at", "1650000200000"])
            .await
            .unwrap();

        let output = run(&temp_dir, &["rank"]).await.unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("com.mail"));
        assert!(lines[1].contains("com.chat"));
    }

    #[tokio::test]
    async fn test_record_reports_burst_duplicate() {
        let temp_dir = TempDir::new().unwrap();
        let first = run(&temp_dir, &["record", "com.mail", "--at", "1650000000000"])
            .await
            .unwrap();
        assert!(first.contains("Started tracking"));

        let second = run(&temp_dir, &["record", "com.mail", "--at", "1650000000100"])
            .await
            .unwrap();
        assert!(second.contains("duplicate launch"));
    }

    #[tokio::test]
    async fn test_reset_unknown_package_fails() {
        let temp_dir = TempDir::new().unwrap();
        let result = run(&temp_dir, &["reset", "com.unknown"]).await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("No usage history"));
    }

    #[tokio::test]
    async fn test_export_import_roundtrip() {
        let source = TempDir::new().unwrap();
        run(&source, &["record", "com.mail", "--at", "1650000000000"])
            .await
            .unwrap();
        let export = source.path().join("backup.json");
        run(&source, &["export", export.to_str().unwrap()])
            .await
            .unwrap();

        let target = TempDir::new().unwrap();
        let output = run(&target, &["import", export.to_str().unwrap()])
            .await
            .unwrap();
        assert!(output.contains("Imported 1 apps"));

        let shown = run(&target, &["show"]).await.unwrap();
        assert!(shown.contains("com.mail"));
    }

    #[tokio::test]
    async fn test_import_legacy_flat_file() {
        let temp_dir = TempDir::new().unwrap();
        let legacy = temp_dir.path().join("old.json");
        fs::write(&legacy, r#"{"a":"10|1650000000000|com.example.app"}"#).unwrap();

        run(&temp_dir, &["import", legacy.to_str().unwrap()])
            .await
            .unwrap();
        let shown = run(&temp_dir, &["show"]).await.unwrap();
        assert!(shown.contains("com.example.app"));
    }

    #[tokio::test]
    async fn test_config_prints_effective_values() {
        let temp_dir = TempDir::new().unwrap();
        let output = run(&temp_dir, &["config"]).await.unwrap();
        assert!(output.contains("\"self_package\": \"dev.launchrank\""));
        assert!(output.contains("data"));
    }

    #[tokio::test]
    async fn test_empty_history() {
        let temp_dir = TempDir::new().unwrap();
        assert!(run(&temp_dir, &["show"]).await.unwrap().contains("No usage history"));
        assert!(run(&temp_dir, &["rank"]).await.unwrap().contains("No apps to rank"));
    }
}
