mod backup;
mod db;
mod error;
mod generate;
mod ipc;
mod jobs;
mod ledger;
mod model;
mod overdue;
mod period;
mod reference;
mod settings;
mod status;
mod structure;
#[cfg(test)]
mod test_support;

use anyhow::Context;
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "School fee ledger sidecar and batch jobs", long_about = None)]
struct Args {
    /// Workspace directory holding the ledger database
    #[arg(short, long, global = true, env = "FEELEDGER_WORKSPACE")]
    workspace: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Answer JSON-lines requests on stdin/stdout (default)
    Serve,
    /// Create pending fees for every active student in the current academic year
    GenerateMonthly {
        /// Target month (1-12); defaults to the current month
        #[arg(long)]
        month: Option<u32>,
        /// Target calendar year; defaults to the current year
        #[arg(long)]
        year: Option<i32>,
    },
    /// Mark pending fees past their due date as overdue and apply late fees
    UpdateOverdue {
        /// Evaluation date (YYYY-MM-DD); defaults to today
        #[arg(long)]
        as_of: Option<NaiveDate>,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // stdout carries the protocol and job summaries.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

fn require_workspace(workspace: Option<PathBuf>) -> anyhow::Result<rusqlite::Connection> {
    let path = workspace.context("--workspace (or FEELEDGER_WORKSPACE) is required")?;
    db::open_db(&path)
}

fn run_generate(
    workspace: Option<PathBuf>,
    month: Option<u32>,
    year: Option<i32>,
) -> anyhow::Result<()> {
    let conn = require_workspace(workspace)?;
    let report = jobs::generate_monthly_fees(&conn, month, year, Local::now().naive_local())?;
    println!(
        "generated {} fees for {:02}/{} ({} students, {} skipped, {} errors)",
        report.generated,
        report.month,
        report.year,
        report.students,
        report.skipped,
        report.errors.len()
    );
    Ok(())
}

fn run_update_overdue(workspace: Option<PathBuf>, as_of: Option<NaiveDate>) -> anyhow::Result<()> {
    let conn = require_workspace(workspace)?;
    let as_of = as_of.unwrap_or_else(|| Local::now().date_naive());
    let report = jobs::update_overdue_fees(&conn, as_of)?;
    println!(
        "updated {} of {} fees as of {} ({} overdue, {} errors)",
        report.updated,
        report.scanned,
        report.as_of,
        report.overdue_total,
        report.errors.len()
    );
    Ok(())
}

fn serve(workspace: Option<PathBuf>) {
    let mut state = ipc::AppState::new();
    if let Some(path) = workspace {
        match db::open_db(&path) {
            Ok(conn) => {
                state.workspace = Some(path);
                state.db = Some(conn);
            }
            Err(e) => tracing::warn!(error = %format!("{e:#}"), "initial workspace not opened"),
        }
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // Can't reply without id.
                let resp = serde_json::json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                });
                let _ = writeln!(stdout, "{}", resp);
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging();

    let result = match args.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            serve(args.workspace);
            Ok(())
        }
        Command::GenerateMonthly { month, year } => run_generate(args.workspace, month, year),
        Command::UpdateOverdue { as_of } => run_update_overdue(args.workspace, as_of),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "job failed");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
