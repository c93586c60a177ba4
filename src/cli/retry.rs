//! Retry command - re-queue a failed merge request

use crate::cli::context::CommandContext;
use crate::cli::print_json;
use crate::cli::style::{Stylize, check, cross, spinner_style};
use anstream::println;
use indicatif::ProgressBar;
use mq_refinery::error::Result;
use mq_refinery::queue::RetryOutcome;
use mq_refinery::refinery::AttemptOutcome;
use std::time::Duration;

/// Run the retry command
pub async fn run_retry(ctx: &CommandContext, id: &str, now: bool, json: bool) -> Result<()> {
    let mr = ctx.queue.get(id).await?;
    if !json {
        println!("Retrying merge request: {}", mr.id.emphasis());
        println!("  Branch: {}", mr.branch.accent());
        if let Some(ref worker) = mr.worker {
            println!("  Worker: {worker}");
        }
        if let Some(ref error) = mr.error {
            println!("  Previous error: {}", error.muted());
        }
    }

    let spinner = (now && !json).then(|| {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(spinner_style());
        spinner.set_message(format!("Merging into {}...", mr.target.emphasis()));
        spinner.enable_steady_tick(Duration::from_millis(80));
        spinner
    });
    let outcome = ctx.queue.retry(id, now).await;
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }
    let outcome = outcome?;

    if json {
        return match outcome {
            RetryOutcome::Queued(mr) => print_json(&serde_json::json!({
                "queued": true,
                "merge_request": mr,
            })),
            RetryOutcome::Processed(attempt) => print_json(&attempt),
        };
    }

    match outcome {
        RetryOutcome::Queued(_) => {
            println!("{} Merge request queued for retry", check());
            println!("  {}", "Will be processed on next refinery cycle".muted());
        }
        RetryOutcome::Processed(attempt @ AttemptOutcome::Merged { .. }) => {
            println!("{} {}", check(), attempt.to_string().success());
        }
        RetryOutcome::Processed(attempt @ AttemptOutcome::Failed { .. }) => {
            println!("{} {}", cross(), attempt.to_string().error());
        }
        RetryOutcome::Processed(attempt) => println!("{}", attempt.to_string().warn()),
    }
    Ok(())
}
