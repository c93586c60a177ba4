//! mq - merge queue for branches produced by parallel workers

mod cli;

use anstream::eprintln;
use clap::{Parser, Subcommand};
use cli::context::CommandContext;
use cli::style::Stylize;
use mq_refinery::error::{Error, Result};
use mq_refinery::queue::ListFilter;
use mq_refinery::types::IssueStatus;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "mq", version, about = "Merge queue and refinery for worker branches")]
struct Cli {
    /// Config file (default: $MQ_CONFIG, then the user config dir)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Debug logging for this crate (RUST_LOG overrides the rest)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Submit a branch to the merge queue
    Submit {
        /// Branch to submit (default: current branch)
        #[arg(long)]
        branch: Option<String>,
        /// Source issue (default: parsed from the branch name)
        #[arg(long)]
        issue: Option<String>,
        /// Target the epic's integration branch
        #[arg(long)]
        epic: Option<String>,
        /// Priority 0-4 (default: inherited from the issue)
        #[arg(short, long)]
        priority: Option<u8>,
        /// Rig the merge request belongs to
        #[arg(long)]
        rig: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a rig's merge queue
    List {
        /// Rig name or tenant prefix (default: `default_rig`)
        rig: Option<String>,
        /// Only merge requests ready to merge
        #[arg(long)]
        ready: bool,
        /// Only this raw status (open, in_progress, closed)
        #[arg(long)]
        status: Option<IssueStatus>,
        /// Only this worker
        #[arg(long)]
        worker: Option<String>,
        /// Only merge requests targeting integration/<epic>
        #[arg(long)]
        epic: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one merge request in detail
    Status {
        /// Merge request id
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Clear a failed merge request's error so it merges again
    Retry {
        /// Merge request id
        id: String,
        /// Attempt the merge immediately
        #[arg(long)]
        now: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Close a merge request without merging it
    Reject {
        /// Rig name or tenant prefix
        rig: String,
        /// Merge request id or branch name
        id_or_branch: String,
        /// Why the merge request is rejected
        #[arg(short, long)]
        reason: String,
        /// Notify the worker
        #[arg(long)]
        notify: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Merge ready merge requests, one per target branch at a time
    Refinery {
        /// Rig name or tenant prefix (default: `default_rig`)
        rig: Option<String>,
        /// Run a single cycle and exit
        #[arg(long)]
        once: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

impl Command {
    const fn json(&self) -> bool {
        match self {
            Self::Submit { json, .. }
            | Self::List { json, .. }
            | Self::Status { json, .. }
            | Self::Retry { json, .. }
            | Self::Reject { json, .. }
            | Self::Refinery { json, .. } => *json,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    mq_refinery::logging::init(cli.verbose);

    let json = cli.command.json();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if json {
                cli::print_json_error(&e);
            } else {
                eprintln!("{} {e}", "error:".error());
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let ctx = CommandContext::new(cli.config.as_deref())?;

    match cli.command {
        Command::Submit {
            branch,
            issue,
            epic,
            priority,
            rig,
            json,
        } => {
            cli::submit::run_submit(
                &ctx,
                cli::submit::SubmitOptions {
                    branch,
                    issue,
                    epic,
                    priority,
                    rig,
                    json,
                },
            )
            .await
        }
        Command::List {
            rig,
            ready,
            status,
            worker,
            epic,
            json,
        } => {
            let filter = ListFilter {
                ready,
                status,
                worker,
                epic,
            };
            cli::list::run_list(&ctx, rig.as_deref(), filter, json).await
        }
        Command::Status { id, json } => cli::status::run_status(&ctx, &id, json).await,
        Command::Retry { id, now, json } => cli::retry::run_retry(&ctx, &id, now, json).await,
        Command::Reject {
            rig,
            id_or_branch,
            reason,
            notify,
            json,
        } => {
            if reason.trim().is_empty() {
                return Err(Error::Config("--reason must not be empty".to_string()));
            }
            cli::reject::run_reject(&ctx, Some(&rig), &id_or_branch, &reason, notify, json).await
        }
        Command::Refinery { rig, once, json } => {
            cli::refinery::run_refinery(&ctx, rig.as_deref(), once, json).await
        }
    }
}
