use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::CodeLocation;

/// A known issue: a test error that is expected, tracked by an issue level
/// and an optional issue tracker reference.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KnownIssue {
    /// Free-text description of the issue.
    pub message: String,
    /// Issue level, compared with the configured error and ignore thresholds.
    pub level: Option<i32>,
    /// Issue identifier in the issue tracker.
    pub id: Option<String>,
    /// Link to the issue in the issue tracker.
    pub url: Option<String>,
}

impl KnownIssue {
    /// A known issue with no level and no identifier.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    /// Sets the issue level.
    #[must_use]
    pub const fn with_level(mut self, level: i32) -> Self {
        self.level = Some(level);
        self
    }

    /// Sets the issue identifier.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets the issue URL.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}

impl fmt::Display for KnownIssue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("Issue")?;
        if let Some(level) = self.level {
            write!(f, "({level})")?;
        }
        if let Some(id) = &self.id {
            write!(f, " {id}")?;
        }
        write!(f, "! {}", self.message)
    }
}

/// What produced a [`TestError`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestErrorKind {
    /// An assertion failed.
    Failure,
    /// A known issue was declared.
    KnownIssue {
        /// Issue level.
        level: Option<i32>,
        /// Issue identifier.
        id: Option<String>,
        /// Issue URL.
        url: Option<String>,
    },
    /// Test code raised an unexpected error, e.g. panicked.
    Exception {
        /// Short name of the error type.
        type_name: String,
    },
}

/// A test error record, attached to the execution records it occurred in.
///
/// Test errors never cross a step boundary: the runner stores them and
/// carries on according to the stop policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestError {
    kind: TestErrorKind,
    message: String,
    location: Option<CodeLocation>,
}

impl TestError {
    /// An assertion failure.
    #[must_use]
    pub fn failure(message: impl Into<String>, location: Option<CodeLocation>) -> Self {
        Self {
            kind: TestErrorKind::Failure,
            message: message.into(),
            location,
        }
    }

    /// A known issue located at `location`.
    #[must_use]
    pub fn known_issue(issue: KnownIssue, location: Option<CodeLocation>) -> Self {
        Self {
            kind: TestErrorKind::KnownIssue {
                level: issue.level,
                id: issue.id,
                url: issue.url,
            },
            message: issue.message,
            location,
        }
    }

    /// An unexpected error raised by test code.
    #[must_use]
    pub fn exception(
        type_name: impl Into<String>,
        message: impl Into<String>,
        location: Option<CodeLocation>,
    ) -> Self {
        Self {
            kind: TestErrorKind::Exception {
                type_name: type_name.into(),
            },
            message: message.into(),
            location,
        }
    }

    /// The kind of error.
    #[must_use]
    pub const fn kind(&self) -> &TestErrorKind {
        &self.kind
    }

    /// The error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Where the error was raised, when known.
    #[must_use]
    pub const fn location(&self) -> Option<&CodeLocation> {
        self.location.as_ref()
    }

    /// Whether this error is a known issue.
    #[must_use]
    pub const fn is_known_issue(&self) -> bool {
        matches!(self.kind, TestErrorKind::KnownIssue { .. })
    }

    /// The known issue this error carries, if any.
    #[must_use]
    pub fn as_known_issue(&self) -> Option<KnownIssue> {
        match &self.kind {
            TestErrorKind::KnownIssue { level, id, url } => Some(KnownIssue {
                message: self.message.clone(),
                level: *level,
                id: id.clone(),
                url: url.clone(),
            }),
            _ => None,
        }
    }
}

impl fmt::Display for TestError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.kind {
            TestErrorKind::Failure => f.write_str(&self.message)?,
            TestErrorKind::KnownIssue { .. } => {
                if let Some(issue) = self.as_known_issue() {
                    write!(f, "{issue}")?;
                }
            }
            TestErrorKind::Exception { type_name } => write!(f, "{type_name}: {}", self.message)?,
        }
        if let Some(location) = &self.location {
            write!(f, " ({}:{})", location.file_name(), location.line())?;
        }
        Ok(())
    }
}

impl std::error::Error for TestError {}

/// Serialized form of a [`TestError`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestErrorRecord {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    kind: Option<String>,
    message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    location: Option<CodeLocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    level: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    url: Option<String>,
}

const KNOWN_ISSUE_TYPE: &str = "known-issue";

impl From<&TestError> for TestErrorRecord {
    fn from(error: &TestError) -> Self {
        let mut record = Self {
            kind: None,
            message: error.message.clone(),
            location: error.location.clone(),
            level: None,
            id: None,
            url: None,
        };
        match &error.kind {
            TestErrorKind::Failure => {}
            TestErrorKind::KnownIssue { level, id, url } => {
                record.kind = Some(KNOWN_ISSUE_TYPE.to_string());
                record.level = *level;
                record.id.clone_from(id);
                record.url.clone_from(url);
            }
            TestErrorKind::Exception { type_name } => record.kind = Some(type_name.clone()),
        }
        record
    }
}

impl From<TestErrorRecord> for TestError {
    fn from(record: TestErrorRecord) -> Self {
        let kind = match record.kind.as_deref() {
            None => TestErrorKind::Failure,
            Some(KNOWN_ISSUE_TYPE) => TestErrorKind::KnownIssue {
                level: record.level,
                id: record.id,
                url: record.url,
            },
            Some(type_name) => TestErrorKind::Exception {
                type_name: type_name.to_string(),
            },
        };
        Self {
            kind,
            message: record.message,
            location: record.location,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_issue_display() {
        let issue = KnownIssue::new("flaky timing")
            .with_level(10)
            .with_id("#42");
        assert_eq!(issue.to_string(), "Issue(10) #42! flaky timing");
        assert_eq!(KnownIssue::new("bare").to_string(), "Issue! bare");
    }

    #[test]
    fn known_issue_survives_record_conversion() {
        let issue = KnownIssue::new("flaky")
            .with_level(20)
            .with_url("https://issues.invalid/42");
        let error = TestError::known_issue(issue.clone(), Some(CodeLocation::new("a.rs", 3, "s")));

        let record = TestErrorRecord::from(&error);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["type"], "known-issue");
        assert_eq!(json["location"], "a.rs:3:s");

        let back = TestError::from(record);
        assert_eq!(back, error);
        assert_eq!(back.as_known_issue(), Some(issue));
    }

    #[test]
    fn failure_record_has_no_type() {
        let error = TestError::failure("1 != 2", None);
        let json = serde_json::to_value(TestErrorRecord::from(&error)).unwrap();
        assert_eq!(json, serde_json::json!({ "message": "1 != 2" }));
    }
}
