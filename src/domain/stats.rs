use std::{fmt, ops::AddAssign};

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Start and end times of an execution record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeStats {
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
}

impl TimeStats {
    /// Time statistics with the given bounds.
    #[must_use]
    pub const fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        Self { start, end }
    }

    /// Time statistics started now.
    #[must_use]
    pub fn started() -> Self {
        Self {
            start: Some(Utc::now()),
            end: None,
        }
    }

    /// The start time, if started.
    #[must_use]
    pub const fn start(&self) -> Option<DateTime<Utc>> {
        self.start
    }

    /// The end time, if ended.
    #[must_use]
    pub const fn end(&self) -> Option<DateTime<Utc>> {
        self.end
    }

    /// Records the start time.
    pub fn set_start_time(&mut self) {
        self.start = Some(Utc::now());
    }

    /// Records the end time.
    pub fn set_end_time(&mut self) {
        self.end = Some(Utc::now());
    }

    /// The elapsed time, once both ends are known.
    #[must_use]
    pub fn elapsed(&self) -> Option<TimeDelta> {
        Some(self.end? - self.start?)
    }
}

/// Serialized form of [`TimeStats`]; `elapsed` is in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct TimeStatsRecord {
    #[serde(default)]
    start: Option<DateTime<Utc>>,
    #[serde(default)]
    end: Option<DateTime<Utc>>,
    #[serde(default)]
    elapsed: Option<f64>,
}

impl From<&TimeStats> for TimeStatsRecord {
    #[allow(clippy::cast_precision_loss)]
    fn from(stats: &TimeStats) -> Self {
        Self {
            start: stats.start,
            end: stats.end,
            elapsed: stats
                .elapsed()
                .and_then(|elapsed| elapsed.num_microseconds())
                .map(|micros| micros as f64 / 1_000_000.0),
        }
    }
}

impl From<TimeStatsRecord> for TimeStats {
    fn from(record: TimeStatsRecord) -> Self {
        Self {
            start: record.start,
            end: record.end,
        }
    }
}

/// Executed versus total counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExecTotalStats {
    /// Number of items executed at least once.
    pub executed: usize,
    /// Number of items defined.
    pub total: usize,
}

impl ExecTotalStats {
    /// Counts one item, executed or not.
    pub const fn add(&mut self, executed: bool) {
        self.total += 1;
        if executed {
            self.executed += 1;
        }
    }
}

impl AddAssign for ExecTotalStats {
    fn add_assign(&mut self, rhs: Self) {
        self.executed += rhs.executed;
        self.total += rhs.total;
    }
}

impl fmt::Display for TimeStats {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let bound = |time: Option<DateTime<Utc>>| time.map_or_else(|| "?".to_string(), |t| t.to_rfc3339());
        write!(f, "[{} -> {}]", bound(self.start), bound(self.end))
    }
}

impl fmt::Display for ExecTotalStats {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.executed, self.total)
    }
}

/// Step, action and result counters of a scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScenarioStats {
    /// Numbered steps.
    pub steps: ExecTotalStats,
    /// Action declarations.
    pub actions: ExecTotalStats,
    /// Expected result declarations.
    pub results: ExecTotalStats,
}

/// Outcome of a scenario execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExecutionStatus {
    /// Executed with no error and no warning.
    Success,
    /// Executed with warnings only.
    Warnings,
    /// At least one error.
    Fail,
    /// Not executed on purpose.
    Skipped,
    /// Not executed, or still running.
    Unknown,
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Self::Success => "SUCCESS",
            Self::Warnings => "WARNINGS",
            Self::Fail => "FAIL",
            Self::Skipped => "SKIPPED",
            Self::Unknown => "UNKNOWN",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_needs_both_ends() {
        let mut stats = TimeStats::default();
        assert_eq!(stats.elapsed(), None);
        stats.set_start_time();
        assert_eq!(stats.elapsed(), None);
        stats.set_end_time();
        assert!(stats.elapsed().unwrap() >= TimeDelta::zero());
    }

    #[test]
    fn status_serializes_uppercase() {
        let json = serde_json::to_string(&ExecutionStatus::Warnings).unwrap();
        assert_eq!(json, "\"WARNINGS\"");
    }

    #[test]
    fn counters_accumulate() {
        let mut stats = ExecTotalStats::default();
        stats.add(true);
        stats.add(false);
        stats += ExecTotalStats {
            executed: 1,
            total: 1,
        };
        assert_eq!(stats.to_string(), "2/3");
    }
}
