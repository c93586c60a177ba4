//! Status command - detailed view of one merge request

use crate::cli::context::CommandContext;
use crate::cli::style::Stylize;
use crate::cli::{format_ago, print_json, truncate};
use anstream::println;
use chrono::{DateTime, Utc};
use mq_refinery::error::Result;
use mq_refinery::types::{IssueRef, IssueStatus, MrStatus};

/// Run the status command
pub async fn run_status(ctx: &CommandContext, id: &str, json: bool) -> Result<()> {
    let status = ctx.queue.status(id).await?;
    if json {
        return print_json(&status);
    }
    print_status(&status, Utc::now());
    Ok(())
}

fn print_status(status: &MrStatus, now: DateTime<Utc>) {
    let mr = &status.merge_request;
    println!("{} {}", "Merge Request:".emphasis(), mr.id.accent());
    println!("   {}\n", mr.title);

    println!("{}", "Status".emphasis());
    println!("   State:    {}", status.display_status);
    println!("   Priority: P{}", mr.priority);
    if !status.issue_type.is_empty() {
        println!("   Type:     {}", status.issue_type);
    }
    if let Some(ref assignee) = mr.assignee {
        println!("   Assignee: {assignee}");
    }

    println!("\n{}", "Timeline".emphasis());
    println!("   Created: {} {}", mr.created_at.to_rfc3339(), format_ago(mr.created_at, now).muted());
    println!("   Updated: {} {}", mr.updated_at.to_rfc3339(), format_ago(mr.updated_at, now).muted());
    if let Some(closed) = mr.closed_at {
        println!("   Closed:  {} {}", closed.to_rfc3339(), format_ago(closed, now).muted());
    }

    println!("\n{}", "Merge Details".emphasis());
    let details = [
        ("Branch", Some(mr.branch.as_str()).filter(|b| !b.is_empty())),
        ("Target", Some(mr.target.as_str())),
        ("Source Issue", mr.source_issue.as_deref()),
        ("Worker", mr.worker.as_deref()),
        ("Rig", mr.rig.as_deref()),
        ("Merge Commit", mr.merge_commit.as_deref()),
        ("Close Reason", mr.close_reason.as_deref()),
        ("Error", mr.error.as_deref()),
    ];
    for (label, value) in details {
        if let Some(value) = value {
            println!("   {:<13} {value}", format!("{label}:"));
        }
    }

    print_refs("Waiting On", &mr.dependencies);
    print_refs("Blocking", &mr.dependents);

    if !mr.notes.is_empty() {
        println!("\n{}", "Notes".emphasis());
        for line in mr.notes.lines() {
            println!("   {line}");
        }
    }
}

fn print_refs(heading: &str, refs: &[IssueRef]) {
    if refs.is_empty() {
        return;
    }
    println!("\n{}", heading.emphasis());
    for dep in refs {
        let icon = match dep.status {
            IssueStatus::Open => "○",
            IssueStatus::InProgress => "▶",
            IssueStatus::Closed => "✓",
        };
        println!(
            "   {icon} {}: {} {}",
            dep.id,
            truncate(&dep.title, 50),
            format!("[{}]", dep.status).muted()
        );
    }
}
