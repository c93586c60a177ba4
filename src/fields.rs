//! Merge request fields embedded in free-text descriptions
//!
//! The issue store only knows titles and descriptions, so merge metadata
//! rides inside the description as `key: value` lines:
//!
//! ```text
//! branch: worker/nix/gt-42
//! target: main
//! source_issue: gt-42
//!
//! Anything else is kept as notes.
//! ```
//!
//! Keys match case-insensitively and ignore `_`/`-` separators, so
//! `source_issue`, `source-issue` and `SourceIssue` are the same field.
//! Lines that are not recognized fields are kept, in order and with their
//! original whitespace, as notes.

use serde::{Deserialize, Serialize};

/// Merge request metadata stored in a description
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MrFields {
    /// Source branch
    pub branch: Option<String>,
    /// Destination branch
    pub target: Option<String>,
    /// Issue the merge request fulfils
    pub source_issue: Option<String>,
    /// Author of the branch
    pub worker: Option<String>,
    /// Originating workspace
    pub rig: Option<String>,
    /// Commit created by the merge
    pub merge_commit: Option<String>,
    /// Reason the record was closed
    pub close_reason: Option<String>,
    /// Failure detail of the last merge attempt
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Branch,
    Target,
    SourceIssue,
    Worker,
    Rig,
    MergeCommit,
    CloseReason,
    Error,
}

impl Field {
    const ALL: [Self; 8] = [
        Self::Branch,
        Self::Target,
        Self::SourceIssue,
        Self::Worker,
        Self::Rig,
        Self::MergeCommit,
        Self::CloseReason,
        Self::Error,
    ];

    const fn key(self) -> &'static str {
        match self {
            Self::Branch => "branch",
            Self::Target => "target",
            Self::SourceIssue => "source_issue",
            Self::Worker => "worker",
            Self::Rig => "rig",
            Self::MergeCommit => "merge_commit",
            Self::CloseReason => "close_reason",
            Self::Error => "error",
        }
    }

    /// Match a raw key against the synonym table
    fn from_key(raw: &str) -> Option<Self> {
        match normalize_key(raw).as_str() {
            "branch" => Some(Self::Branch),
            "target" => Some(Self::Target),
            "sourceissue" => Some(Self::SourceIssue),
            "worker" => Some(Self::Worker),
            "rig" => Some(Self::Rig),
            "mergecommit" => Some(Self::MergeCommit),
            "closereason" => Some(Self::CloseReason),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

fn normalize_key(raw: &str) -> String {
    raw.trim()
        .chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

impl MrFields {
    fn slot(&mut self, field: Field) -> &mut Option<String> {
        match field {
            Field::Branch => &mut self.branch,
            Field::Target => &mut self.target,
            Field::SourceIssue => &mut self.source_issue,
            Field::Worker => &mut self.worker,
            Field::Rig => &mut self.rig,
            Field::MergeCommit => &mut self.merge_commit,
            Field::CloseReason => &mut self.close_reason,
            Field::Error => &mut self.error,
        }
    }

    fn get(&self, field: Field) -> Option<&str> {
        match field {
            Field::Branch => self.branch.as_deref(),
            Field::Target => self.target.as_deref(),
            Field::SourceIssue => self.source_issue.as_deref(),
            Field::Worker => self.worker.as_deref(),
            Field::Rig => self.rig.as_deref(),
            Field::MergeCommit => self.merge_commit.as_deref(),
            Field::CloseReason => self.close_reason.as_deref(),
            Field::Error => self.error.as_deref(),
        }
    }

    /// Parse fields from a description; `None` when no field line is present
    pub fn parse(description: &str) -> Option<Self> {
        decode(description).fields
    }
}

/// Result of decoding a description
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Decoded {
    /// Recognized fields, `None` if the description has none
    pub fields: Option<MrFields>,
    /// Remaining lines, with surrounding whitespace trimmed
    pub notes: String,
}

/// Split a description into fields and notes
///
/// The value is everything after the first `:`, so values may themselves
/// contain colons. When a key repeats, the last occurrence wins.
pub fn decode(description: &str) -> Decoded {
    let mut fields = MrFields::default();
    let mut recognized = false;
    let mut notes = Vec::new();

    for line in description.split('\n') {
        let field = line
            .split_once(':')
            .and_then(|(key, value)| Field::from_key(key).map(|f| (f, value.trim())));

        match field {
            Some((field, value)) => {
                recognized = true;
                *fields.slot(field) = (!value.is_empty()).then(|| value.to_string());
            }
            None => notes.push(line),
        }
    }

    Decoded {
        fields: recognized.then_some(fields),
        notes: notes.join("\n").trim().to_string(),
    }
}

/// Notes of a description with all field lines removed
pub fn notes(description: &str) -> String {
    decode(description).notes
}

/// Render fields as `key: value` lines, skipping empty values
///
/// Multi-line values (typically merge error output) are folded onto one
/// line with ` | ` separators so they decode back as a single field.
pub fn encode(fields: &MrFields) -> String {
    Field::ALL
        .iter()
        .filter_map(|&field| {
            let value = fold_lines(fields.get(field)?);
            (!value.is_empty()).then(|| format!("{}: {value}", field.key()))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Full description for the given fields followed by notes
pub fn compose(fields: &MrFields, notes: &str) -> String {
    let head = encode(fields);
    let notes = notes.trim();
    match (head.is_empty(), notes.is_empty()) {
        (_, true) => head,
        (true, false) => notes.to_string(),
        (false, false) => format!("{head}\n\n{notes}"),
    }
}

fn fold_lines(value: &str) -> String {
    value
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" | ")
}
