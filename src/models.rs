use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::store::StoreError;

/// A persisted Root Cause Analysis record.
///
/// Wire format is camelCase to preserve the public API's JSON field names.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: Uuid,
    pub title: String,
    pub category: Category,
    pub symptoms: String,
    pub root_cause: String,
    pub solution: String,
    #[serde(default)]
    pub prevention: String,
    pub severity: Severity,
    pub status: Status,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Server,
    Database,
    Network,
    App,
    Security,
    Other,
}

/// Ordered by escalation so records can be sorted by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    Open,
    #[serde(rename = "In Progress")]
    InProgress,
    Resolved,
    Closed,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Server,
        Category::Database,
        Category::Network,
        Category::App,
        Category::Security,
        Category::Other,
    ];
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Low,
        Severity::Medium,
        Severity::High,
        Severity::Critical,
    ];
}

impl Status {
    pub const ALL: [Status; 4] = [
        Status::Open,
        Status::InProgress,
        Status::Resolved,
        Status::Closed,
    ];
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Category::Server => "Server",
            Category::Database => "Database",
            Category::Network => "Network",
            Category::App => "App",
            Category::Security => "Security",
            Category::Other => "Other",
        };
        f.write_str(s)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Low => "Low",
            Severity::Medium => "Medium",
            Severity::High => "High",
            Severity::Critical => "Critical",
        };
        f.write_str(s)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Open => "Open",
            Status::InProgress => "In Progress",
            Status::Resolved => "Resolved",
            Status::Closed => "Closed",
        };
        f.write_str(s)
    }
}

impl FromStr for Category {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Server" => Ok(Category::Server),
            "Database" => Ok(Category::Database),
            "Network" => Ok(Category::Network),
            "App" => Ok(Category::App),
            "Security" => Ok(Category::Security),
            "Other" => Ok(Category::Other),
            other => Err(StoreError::Validation {
                field: "category",
                message: format!("Invalid category: {other}"),
            }),
        }
    }
}

impl FromStr for Severity {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Low" => Ok(Severity::Low),
            "Medium" => Ok(Severity::Medium),
            "High" => Ok(Severity::High),
            "Critical" => Ok(Severity::Critical),
            other => Err(StoreError::Validation {
                field: "severity",
                message: format!("Invalid severity: {other}"),
            }),
        }
    }
}

impl FromStr for Status {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Open" => Ok(Status::Open),
            "In Progress" => Ok(Status::InProgress),
            "Resolved" => Ok(Status::Resolved),
            "Closed" => Ok(Status::Closed),
            other => Err(StoreError::Validation {
                field: "status",
                message: format!("Invalid status: {other}"),
            }),
        }
    }
}

/// Write payload for create and update.
///
/// Enums arrive as plain strings and are parsed in [`RecordInput::validate`]
/// so an out-of-enum value becomes a 400 validation error rather than a
/// deserialization rejection.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordInput {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub symptoms: String,
    #[serde(default)]
    pub root_cause: String,
    #[serde(default)]
    pub solution: String,
    pub prevention: Option<String>,
    pub severity: Option<String>,
    pub status: Option<String>,
    pub tags: Option<Vec<String>>,
    pub created_by: Option<String>,
}

/// Validated and normalized form of [`RecordInput`], ready for persistence.
#[derive(Debug, Clone)]
pub struct ValidatedRecord {
    pub title: String,
    pub category: Category,
    pub symptoms: String,
    pub root_cause: String,
    pub solution: String,
    pub prevention: String,
    pub severity: Severity,
    pub status: Status,
    pub tags: Vec<String>,
    pub created_by: String,
}

const MAX_TITLE_LEN: usize = 200;

impl RecordInput {
    /// Enforce the record invariants: required fields non-empty after
    /// trimming, title length capped, enums within their value sets.
    /// Omitted severity defaults to Medium, status to Resolved.
    pub fn validate(&self) -> Result<ValidatedRecord, StoreError> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(StoreError::Validation {
                field: "title",
                message: "Issue title is required".to_string(),
            });
        }
        if title.chars().count() > MAX_TITLE_LEN {
            return Err(StoreError::Validation {
                field: "title",
                message: "Title cannot exceed 200 characters".to_string(),
            });
        }

        let symptoms = self.symptoms.trim();
        if symptoms.is_empty() {
            return Err(StoreError::Validation {
                field: "symptoms",
                message: "Symptoms are required".to_string(),
            });
        }

        let root_cause = self.root_cause.trim();
        if root_cause.is_empty() {
            return Err(StoreError::Validation {
                field: "rootCause",
                message: "Root cause is required".to_string(),
            });
        }

        let solution = self.solution.trim();
        if solution.is_empty() {
            return Err(StoreError::Validation {
                field: "solution",
                message: "Solution is required".to_string(),
            });
        }

        if self.category.is_empty() {
            return Err(StoreError::Validation {
                field: "category",
                message: "Category is required".to_string(),
            });
        }
        let category = Category::from_str(&self.category)?;

        let severity = match self.severity.as_deref() {
            None | Some("") => Severity::Medium,
            Some(s) => Severity::from_str(s)?,
        };
        let status = match self.status.as_deref() {
            None | Some("") => Status::Resolved,
            Some(s) => Status::from_str(s)?,
        };

        let tags = self
            .tags
            .clone()
            .unwrap_or_default()
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();

        let created_by = self
            .created_by
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or("Anonymous")
            .to_string();

        Ok(ValidatedRecord {
            title: title.to_string(),
            category,
            symptoms: symptoms.to_string(),
            root_cause: root_cause.to_string(),
            solution: solution.to_string(),
            prevention: self
                .prevention
                .as_deref()
                .map(str::trim)
                .unwrap_or_default()
                .to_string(),
            severity,
            status,
            tags,
            created_by,
        })
    }
}

/// A single chat turn (user or assistant).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
    /// Set by the client on apologetic assistant turns the server emitted
    /// after a gateway failure. Such turns are excluded from the history
    /// replayed to the provider and never serialized outbound.
    #[serde(default, rename = "isError", skip_serializing)]
    pub is_error: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_input() -> RecordInput {
        RecordInput {
            title: "DB timeout".into(),
            category: "Database".into(),
            symptoms: "conn pool exhausted".into(),
            root_cause: "leak".into(),
            solution: "fix leak".into(),
            severity: Some("Critical".into()),
            ..RecordInput::default()
        }
    }

    #[test]
    fn test_status_in_progress_serializes_with_space() {
        let json = serde_json::to_value(Status::InProgress).unwrap();
        assert_eq!(json, "In Progress");
    }

    #[test]
    fn test_status_in_progress_round_trips() {
        let json = serde_json::to_string(&Status::InProgress).unwrap();
        let back: Status = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Status::InProgress);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Low < Severity::Critical);
        assert!(Severity::Medium < Severity::High);
    }

    #[test]
    fn test_validate_accepts_valid_input() {
        let v = valid_input().validate().unwrap();
        assert_eq!(v.category, Category::Database);
        assert_eq!(v.severity, Severity::Critical);
        assert_eq!(v.status, Status::Resolved); // default
        assert_eq!(v.created_by, "Anonymous");
    }

    #[test]
    fn test_validate_rejects_missing_title() {
        let input = RecordInput {
            title: "   ".into(),
            ..valid_input()
        };
        let err = input.validate().unwrap_err();
        assert!(err.to_string().contains("title is required"));
    }

    #[test]
    fn test_validate_rejects_long_title() {
        let input = RecordInput {
            title: "x".repeat(201),
            ..valid_input()
        };
        assert!(input.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_category() {
        let input = RecordInput {
            category: "Hardware".into(),
            ..valid_input()
        };
        let err = input.validate().unwrap_err();
        assert!(err.to_string().contains("Invalid category"));
    }

    #[test]
    fn test_validate_rejects_unknown_severity() {
        let input = RecordInput {
            severity: Some("Catastrophic".into()),
            ..valid_input()
        };
        assert!(input.validate().is_err());
    }

    #[test]
    fn test_validate_defaults_severity_to_medium() {
        let input = RecordInput {
            severity: None,
            ..valid_input()
        };
        assert_eq!(input.validate().unwrap().severity, Severity::Medium);
    }

    #[test]
    fn test_validate_drops_empty_tags() {
        let input = RecordInput {
            tags: Some(vec!["db".into(), "  ".into(), "timeout".into()]),
            ..valid_input()
        };
        assert_eq!(input.validate().unwrap().tags, vec!["db", "timeout"]);
    }
}
