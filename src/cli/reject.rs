//! Reject command - close a merge request without merging

use crate::cli::context::CommandContext;
use crate::cli::print_json;
use crate::cli::style::{Stylize, cross};
use anstream::println;
use mq_refinery::error::Result;

/// Run the reject command
pub async fn run_reject(
    ctx: &CommandContext,
    rig: Option<&str>,
    id_or_branch: &str,
    reason: &str,
    notify: bool,
    json: bool,
) -> Result<()> {
    let tenant = ctx.tenant(rig)?;
    let result = ctx
        .queue
        .reject(&tenant, id_or_branch, reason, notify)
        .await?;

    if json {
        return print_json(&result);
    }

    let mr = &result.merge_request;
    println!("{} Rejected: {}", cross(), mr.branch.emphasis());
    println!("  MR ID:  {}", mr.id.accent());
    if let Some(ref worker) = mr.worker {
        println!("  Worker: {worker}");
    }
    println!("  Reason: {reason}");
    if let Some(ref issue) = mr.source_issue {
        println!("  Issue:  {issue} {}", "(not closed - work not done)".muted());
    }
    if result.notified {
        println!("  {}", "Worker notified".muted());
    } else if let Some(ref error) = result.notify_error {
        println!("  {}", format!("Notification failed: {error}").warn());
    }
    Ok(())
}
