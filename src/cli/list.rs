//! List command - show a rig's merge queue

use crate::cli::context::CommandContext;
use crate::cli::style::Stylize;
use crate::cli::{format_age, print_json, truncate};
use anstream::println;
use chrono::Utc;
use mq_refinery::error::Result;
use mq_refinery::queue::ListFilter;
use mq_refinery::types::{DisplayStatus, MergeRequest};

const BRANCH_WIDTH: usize = 30;
const ID_WIDTH: usize = 12;

/// Run the list command
pub async fn run_list(
    ctx: &CommandContext,
    rig: Option<&str>,
    filter: ListFilter,
    json: bool,
) -> Result<()> {
    let tenant = ctx.tenant(rig)?;
    let mrs = ctx.queue.list(&tenant, &filter).await?;

    if json {
        return print_json(&mrs);
    }

    println!("{} Merge queue for '{}':\n", "Queue".emphasis(), rig.unwrap_or(&tenant));
    if mrs.is_empty() {
        println!("  {}", "(empty)".muted());
        return Ok(());
    }

    println!(
        "  {:<12} {:<12} {:<8} {:<30} {:<10} AGE",
        "ID", "STATUS", "PRIORITY", "BRANCH", "WORKER"
    );
    println!("  {}", "-".repeat(90));
    let now = Utc::now();
    for mr in &mrs {
        print_row(mr, now);
    }
    Ok(())
}

fn print_row(mr: &MergeRequest, now: chrono::DateTime<Utc>) {
    let status = mr.display_status();
    let padded = format!("{:<12}", status.to_string());
    let styled = match status {
        DisplayStatus::Ready | DisplayStatus::InProgress => padded.emphasis(),
        DisplayStatus::Failed => padded.error(),
        DisplayStatus::Blocked | DisplayStatus::Closed => padded.muted(),
    };

    println!(
        "  {:<12} {} {:<8} {:<30} {:<10} {}",
        truncate(&mr.id, ID_WIDTH),
        styled,
        format!("P{}", mr.priority),
        truncate(&mr.branch, BRANCH_WIDTH),
        mr.worker.as_deref().unwrap_or(""),
        format_age(mr.created_at, now).muted()
    );

    match status {
        DisplayStatus::Blocked => {
            if let Some(blocker) = mr.first_blocker() {
                println!("  {}", format!("             (waiting on {blocker})").muted());
            }
        }
        DisplayStatus::Failed => {
            let error = mr.error.as_deref().unwrap_or_default();
            println!("  {}", format!("             (error: {})", truncate(error, 60)).muted());
        }
        _ => {}
    }
}
