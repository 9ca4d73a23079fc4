//! Workflow states and transitions
//!
//! The closed set of feature statuses, the directory each status maps to,
//! and the legal transition table.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackerError};

/// Workflow status of a feature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    Backlog,
    InProgress,
    Blocked,
    Review,
    Done,
}

/// All registered statuses, in workflow order
pub const STATUSES: [Status; 5] = [
    Status::Backlog,
    Status::InProgress,
    Status::Blocked,
    Status::Review,
    Status::Done,
];

impl Status {
    /// Canonical slug as stored in record headers
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Backlog => "backlog",
            Status::InProgress => "in-progress",
            Status::Blocked => "blocked",
            Status::Review => "review",
            Status::Done => "done",
        }
    }

    /// Directory under the features root that holds records in this status
    pub fn dir_name(&self) -> &'static str {
        self.as_str()
    }

    /// Parse a status slug, case-insensitively
    pub fn parse(s: &str) -> Option<Status> {
        match s.trim().to_lowercase().as_str() {
            "backlog" => Some(Status::Backlog),
            "in-progress" => Some(Status::InProgress),
            "blocked" => Some(Status::Blocked),
            "review" => Some(Status::Review),
            "done" => Some(Status::Done),
            _ => None,
        }
    }

    /// Statuses reachable from this one in a single move
    pub fn transitions(&self) -> &'static [Status] {
        match self {
            Status::Backlog => &[Status::InProgress],
            Status::InProgress => &[Status::Blocked, Status::Review],
            Status::Blocked => &[Status::InProgress],
            Status::Review => &[Status::InProgress, Status::Done],
            Status::Done => &[],
        }
    }

    /// Whether `to` is reachable from this status in one hop
    pub fn can_transition_to(&self, to: Status) -> bool {
        self.transitions().contains(&to)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolve a status slug or fail with `UnknownStatus`
pub fn validate_status(s: &str) -> Result<Status> {
    Status::parse(s).ok_or_else(|| TrackerError::UnknownStatus(s.to_string()))
}

/// Check that `from -> to` is a legal move.
///
/// An unknown `from` slug is an invalid transition, not an unknown status:
/// the record already carries it, so the move is what gets rejected.
pub fn validate_transition(from: &str, to: Status) -> Result<Status> {
    let rejected = || TrackerError::InvalidTransition {
        from: from.to_string(),
        to: to.as_str().to_string(),
    };
    let from_status = Status::parse(from).ok_or_else(rejected)?;
    if from_status.can_transition_to(to) {
        Ok(from_status)
    } else {
        Err(rejected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_statuses() {
        assert_eq!(Status::parse("backlog"), Some(Status::Backlog));
        assert_eq!(Status::parse("In-Progress"), Some(Status::InProgress));
        assert_eq!(Status::parse(" done "), Some(Status::Done));
        assert_eq!(Status::parse("shipped"), None);
    }

    #[test]
    fn test_validate_status_unknown() {
        let err = validate_status("shipped").unwrap_err();
        assert!(matches!(err, TrackerError::UnknownStatus(s) if s == "shipped"));
    }

    #[test]
    fn test_transition_table_is_exact() {
        let allowed = [
            (Status::Backlog, Status::InProgress),
            (Status::InProgress, Status::Blocked),
            (Status::InProgress, Status::Review),
            (Status::Blocked, Status::InProgress),
            (Status::Review, Status::InProgress),
            (Status::Review, Status::Done),
        ];

        for from in STATUSES {
            for to in STATUSES {
                let expected = allowed.contains(&(from, to));
                let result = validate_transition(from.as_str(), to);
                assert_eq!(
                    result.is_ok(),
                    expected,
                    "transition {} -> {} should be {}",
                    from,
                    to,
                    if expected { "legal" } else { "rejected" }
                );
            }
        }
    }

    #[test]
    fn test_done_is_terminal() {
        assert!(Status::Done.transitions().is_empty());
    }

    #[test]
    fn test_unknown_from_is_invalid_transition() {
        let err = validate_transition("shipped", Status::Done).unwrap_err();
        assert!(matches!(err, TrackerError::InvalidTransition { .. }));
    }
}
