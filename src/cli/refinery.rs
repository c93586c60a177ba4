//! Refinery command - merge ready merge requests

use crate::cli::context::CommandContext;
use crate::cli::print_json;
use crate::cli::style::{Stylize, check, cross};
use anstream::{eprintln, println};
use mq_refinery::error::Result;
use mq_refinery::refinery::{AttemptOutcome, CycleReport, Refinery};
use std::sync::Arc;
use std::time::Duration;

/// Run the refinery command
///
/// With `once`, runs a single cycle and prints its report; otherwise loops
/// every `poll_interval_secs` until Ctrl-C.
pub async fn run_refinery(
    ctx: &CommandContext,
    rig: Option<&str>,
    once: bool,
    json: bool,
) -> Result<()> {
    let tenant = ctx.tenant(rig)?;
    let refinery = Refinery::new(Arc::clone(&ctx.queue));

    if once {
        let report = refinery.run_cycle(&tenant).await?;
        if json {
            return print_json(&report);
        }
        print_report(&report);
        return Ok(());
    }

    let interval = Duration::from_secs(ctx.config.refinery.poll_interval_secs.max(1));
    if !json {
        eprintln!(
            "{} every {}s for '{}' (Ctrl-C to stop)",
            "Refinery running".emphasis(),
            interval.as_secs(),
            tenant.accent()
        );
    }
    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    refinery
        .run(&tenant, interval, shutdown, |report| {
            if json {
                let _ = print_json(report);
            } else if !report.outcomes.is_empty()
                || !report.errors.is_empty()
                || !report.recovered.is_empty()
            {
                print_report(report);
            }
        })
        .await
}

fn print_report(report: &CycleReport) {
    for id in &report.recovered {
        println!(
            "{} {}",
            id.accent(),
            "was stuck in progress; marked failed, retry it to merge".warn()
        );
    }
    if report.plan.is_empty() {
        println!("{}", "Nothing ready to merge.".muted());
    }
    for outcome in &report.outcomes {
        match outcome {
            AttemptOutcome::Merged { .. } => println!("{} {}", check(), outcome.to_string().success()),
            AttemptOutcome::Failed { .. } => println!("{} {}", cross(), outcome.to_string().error()),
            AttemptOutcome::Skipped { .. } => println!("  {}", outcome.to_string().muted()),
        }
    }
    for error in &report.errors {
        println!(
            "{} {} {}",
            cross(),
            error.mr_id.accent(),
            format!("[{}] {}", error.kind, error.message).error()
        );
    }
    for waiting in &report.plan.waiting {
        println!("  {}", waiting.to_string().muted());
    }
}
