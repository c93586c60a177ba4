//! Submit command - queue the current branch for merging

use crate::cli::context::CommandContext;
use crate::cli::print_json;
use crate::cli::style::{Stylize, check};
use anstream::println;
use mq_refinery::error::Result;
use mq_refinery::queue::SubmitRequest;

/// Options for the submit command
#[derive(Debug, Clone, Default)]
pub struct SubmitOptions {
    /// Branch to submit (default: current branch)
    pub branch: Option<String>,
    /// Source issue (default: parsed from the branch)
    pub issue: Option<String>,
    /// Target `integration/<epic>` instead of `main`
    pub epic: Option<String>,
    /// Priority override
    pub priority: Option<u8>,
    /// Originating rig
    pub rig: Option<String>,
    /// Print JSON
    pub json: bool,
}

/// Run the submit command
pub async fn run_submit(ctx: &CommandContext, options: SubmitOptions) -> Result<()> {
    let tenant = match options.rig.as_deref() {
        Some(rig) => Some(ctx.tenant(Some(rig))?),
        None => None,
    };
    let mr = ctx
        .queue
        .submit(SubmitRequest {
            branch: options.branch,
            issue: options.issue,
            epic: options.epic,
            priority: options.priority,
            worker: None,
            rig: options.rig,
            tenant,
        })
        .await?;

    if options.json {
        return print_json(&mr);
    }

    println!("{} Created merge request", check());
    println!("  MR ID:    {}", mr.id.emphasis());
    println!("  Source:   {}", mr.branch.accent());
    println!("  Target:   {}", mr.target.accent());
    if let Some(ref issue) = mr.source_issue {
        println!("  Issue:    {issue}");
    }
    if let Some(ref worker) = mr.worker {
        println!("  Worker:   {worker}");
    }
    println!("  Priority: P{}", mr.priority);
    Ok(())
}
