//! Issue status values and the rule guarding transitions to `Done`.

use std::fmt;

use crate::error::ToolError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IssueStatus {
    /// No status assigned; rendered as the empty string.
    Unset,
    Triage,
    Backlog,
    UpNext,
    InProgress,
    PrReady,
    ReadyForVerification,
    InVerification,
    Done,
}

impl IssueStatus {
    pub const ALL: [IssueStatus; 9] = [
        IssueStatus::Unset,
        IssueStatus::Triage,
        IssueStatus::Backlog,
        IssueStatus::UpNext,
        IssueStatus::InProgress,
        IssueStatus::PrReady,
        IssueStatus::ReadyForVerification,
        IssueStatus::InVerification,
        IssueStatus::Done,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unset => "",
            Self::Triage => "Triage",
            Self::Backlog => "Backlog",
            Self::UpNext => "Up Next",
            Self::InProgress => "In Progress",
            Self::PrReady => "PR Ready",
            Self::ReadyForVerification => "Ready for Verification",
            Self::InVerification => "In Verification",
            Self::Done => "Done",
        }
    }

    /// Exact, case-sensitive match against the canonical names.
    pub fn parse(raw: &str) -> Result<Self, ToolError> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == raw)
            .ok_or_else(|| {
                ToolError::validation(format!(
                    "Invalid status: {raw}. Must be one of: {}",
                    Self::allowed_values().join(", ")
                ))
            })
    }

    pub fn allowed_values() -> Vec<&'static str> {
        Self::ALL.into_iter().map(Self::as_str).collect()
    }

    /// Position in the usual workflow; `Backlog` and `Up Next` share a rung.
    ///
    /// Advisory only: [`validate_transition`] never rejects a move because of
    /// its direction.
    pub fn progression_index(self) -> usize {
        match self {
            Self::Unset => 0,
            Self::Triage => 1,
            Self::Backlog | Self::UpNext => 2,
            Self::InProgress => 3,
            Self::PrReady => 4,
            Self::ReadyForVerification => 5,
            Self::InVerification => 6,
            Self::Done => 7,
        }
    }
}

impl fmt::Display for IssueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `Done` requires the issue to have been closed as completed.
pub fn validate_transition(
    suggested: IssueStatus,
    state_reason: Option<&str>,
) -> Result<(), ToolError> {
    if suggested == IssueStatus::Done && state_reason != Some("completed") {
        return Err(ToolError::validation(
            "Cannot set status to Done for non-completed issues",
        ));
    }
    Ok(())
}

/// Body text carrying the status annotation appended to `body`.
pub fn annotate_body(body: Option<&str>, status: IssueStatus, reason: &str) -> String {
    format!(
        "{}\n\nStatus: {}\nReason: {}",
        body.unwrap_or_default(),
        status.as_str(),
        reason
    )
}
