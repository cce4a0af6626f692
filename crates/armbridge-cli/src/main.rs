//! `armbridge` – drive the camera → physical → joint → controller chain.
//!
//! Each subcommand runs one stage against the interchange store and prints a
//! short summary.  The process exits non-zero when a stage aborts.

mod commands;
mod config;
mod telemetry;

use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use armbridge_motion::DispatchState;
use armbridge_store::{InterchangeStore, Table};
use armbridge_types::CalibrationParameters;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::warn;

use crate::commands::DispatchOptions;

#[derive(Debug, Parser)]
#[command(name = "armbridge", author, version, about = "Camera-guided robot arm pipeline")]
struct Cli {
    /// Config file (defaults to ~/.armbridge/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Interchange store path, overriding the config file.
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Write the default config file.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
    /// Replace the calibration parameters.
    SetCalibration {
        #[arg(long, allow_negative_numbers = true)]
        mx: f64,
        #[arg(long, allow_negative_numbers = true)]
        cx: f64,
        #[arg(long, allow_negative_numbers = true)]
        my: f64,
        #[arg(long, allow_negative_numbers = true)]
        cy: f64,
    },
    /// Replace a table from a JSON `{"header": [...], "rows": [[...]]}` file.
    Import { table: String, file: PathBuf },
    /// Print a table.
    Show { table: String },
    /// List stored tables.
    Tables,
    /// Sensor coordinates → physical coordinates.
    Calibrate,
    /// Physical coordinates → joint angles.
    Solve,
    /// Send joint angles to the controller.
    Dispatch {
        /// Stop at the first failed command.
        #[arg(long)]
        abort_on_failure: bool,
        /// Print frames instead of connecting.
        #[arg(long)]
        dry_run: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let _guard = telemetry::init_tracing("armbridge");

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {e}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode, Box<dyn Error>> {
    let config_path = cli.config.clone().unwrap_or_else(config::config_path);

    if let Command::Init { force } = cli.command {
        if commands::init(&config_path, force)? {
            println!("  {} Config written to {}", "✓".green().bold(), config_path.display().to_string().bold());
        } else {
            println!(
                "  Config already exists at {} (use {} to overwrite)",
                config_path.display().to_string().bold(),
                "--force".bold()
            );
        }
        return Ok(ExitCode::SUCCESS);
    }

    let mut cfg = config::load_or_default(&config_path)?;
    if let Some(store) = cli.store {
        cfg.store_path = store;
    }

    match cli.command {
        Command::Init { .. } => Ok(ExitCode::SUCCESS),
        Command::SetCalibration { mx, cx, my, cy } => {
            let mut store = InterchangeStore::open(&cfg.store_path)?;
            let params = CalibrationParameters { mx, cx, my, cy };
            commands::set_calibration(&mut store, &params)?;
            println!(
                "  {} Calibration set: mx={mx} cx={cx} my={my} cy={cy}",
                "✓".green().bold()
            );
            Ok(ExitCode::SUCCESS)
        }
        Command::Import { table, file } => {
            let mut store = InterchangeStore::open(&cfg.store_path)?;
            let imported = commands::import_table(&mut store, &table, &file)?;
            println!(
                "  {} Imported {} row(s) into {}",
                "✓".green().bold(),
                imported.len(),
                table.bold()
            );
            Ok(ExitCode::SUCCESS)
        }
        Command::Show { table } => {
            let store = InterchangeStore::open_existing(&cfg.store_path)?;
            print_table(&table, &store.read_table(&table)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Tables => {
            let store = InterchangeStore::open_existing(&cfg.store_path)?;
            for name in store.table_names()? {
                let rows = store.read_table(&name)?.len();
                println!("  {:<24} {} row(s)", name.bold(), rows);
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Calibrate => {
            let mut store = InterchangeStore::open_existing(&cfg.store_path)?;
            let report = commands::calibrate(&cfg, &mut store)?;
            for (sensor, physical) in &report.points {
                println!(
                    "  Camera ({}, {}) → Physical ({:.4}, {:.4}, {:.4})",
                    sensor.x, sensor.y, physical.x, physical.y, physical.z
                );
            }
            if !report.skipped_rows.is_empty() {
                println!(
                    "  {} skipped incomplete row(s): {:?}",
                    "!".yellow().bold(),
                    report.skipped_rows
                );
            }
            println!(
                "  {} {} physical point(s) written",
                "✓".green().bold(),
                report.points.len()
            );
            Ok(ExitCode::SUCCESS)
        }
        Command::Solve => {
            let mut store = InterchangeStore::open_existing(&cfg.store_path)?;
            let (solver, report) = commands::solve(&cfg, &mut store)?;
            println!(
                "  {} {} joint vector(s) of {} joint(s) written (solver: {})",
                "✓".green().bold(),
                report.rows,
                report.joints,
                solver.dimmed()
            );
            Ok(ExitCode::SUCCESS)
        }
        Command::Dispatch { abort_on_failure, dry_run } => {
            let store = InterchangeStore::open_existing(&cfg.store_path)?;
            let cancel = install_cancel_handler();
            let outcome = commands::dispatch(
                &cfg,
                &store,
                DispatchOptions { abort_on_failure, dry_run },
                cancel,
            )?;
            for frame in &outcome.frames {
                println!("  {}", frame.dimmed());
            }

            let report = &outcome.report;
            for (row, response) in &report.responses {
                println!("  Point {}: {}", row + 1, response);
            }
            for (row, err) in &report.failures {
                println!("  {} Point {}: {}", "✗".red().bold(), row + 1, err);
            }
            let summary = format!(
                "{}/{} sent, {} failed, {} skipped ({})",
                report.sent,
                report.total,
                report.failures.len(),
                report.skipped(),
                outcome.endpoint
            );
            match report.final_state {
                DispatchState::Aborted => {
                    let reason = if report.cancelled { "cancelled" } else { "aborted" };
                    println!("  {} Dispatch {reason}: {summary}", "✗".red().bold());
                    Ok(ExitCode::FAILURE)
                }
                _ => {
                    println!("  {} Dispatch done: {summary}", "✓".green().bold());
                    Ok(ExitCode::SUCCESS)
                }
            }
        }
    }
}

fn install_cancel_handler() -> Arc<AtomicBool> {
    let cancel = Arc::new(AtomicBool::new(false));
    let flag = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping after the current command …".yellow().bold());
        flag.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; dispatch cannot be interrupted");
    }
    cancel
}

fn print_table(name: &str, table: &Table) {
    println!("  {} ({} row(s))", name.bold(), table.len());
    println!("  {}", table.header.join("\t").underline());
    for row in &table.rows {
        let cells: Vec<String> = row.iter().map(ToString::to_string).collect();
        println!("  {}", cells.join("\t"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_negative_calibration_values() {
        let cli = Cli::try_parse_from([
            "armbridge", "set-calibration", "--mx", "-0.5", "--cx", "12", "--my", "0.25", "--cy", "-3",
        ])
        .unwrap();
        match cli.command {
            Command::SetCalibration { mx, cx, my, cy } => {
                assert_eq!((mx, cx, my, cy), (-0.5, 12.0, 0.25, -3.0));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn parses_dispatch_flags_and_global_store() {
        let cli = Cli::try_parse_from(["armbridge", "dispatch", "--dry-run", "--store", "/tmp/a.db"]).unwrap();
        assert_eq!(cli.store, Some(PathBuf::from("/tmp/a.db")));
        assert!(matches!(cli.command, Command::Dispatch { dry_run: true, abort_on_failure: false }));
    }
}
