use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::domain::{TestError, TestErrorKind};

/// Configuration of scenario executions and traceability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Versions", into = "Versions")]
pub struct Config {
    /// Whether scenario executions carry on after an error.
    ///
    /// Scenarios may override this setting.
    pub continue_on_error: bool,

    /// Whether every requirement verified by a scenario is expected to be
    /// refined by at least one of its steps.
    ///
    /// Scenarios may override this setting.
    pub expect_step_req_refinement: bool,

    /// Attributes every main scenario must define.
    expected_scenario_attributes: Vec<String>,

    /// Named issue levels, e.g. `minor = 10`.
    issue_levels: BTreeMap<String, i32>,

    /// Known issues at or above this level are errors.
    ///
    /// Known issues with no level are errors too when this is set.
    issue_level_error: Option<i32>,

    /// Known issues at or below this level are ignored.
    issue_level_ignored: Option<i32>,

    /// Requirement database files loaded before traceability computations.
    req_db_files: Vec<PathBuf>,

    /// Pause between two steps, in seconds.
    delay_between_steps: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            continue_on_error: false,
            expect_step_req_refinement: false,
            expected_scenario_attributes: Vec::new(),
            issue_levels: BTreeMap::new(),
            issue_level_error: None,
            issue_level_ignored: None,
            req_db_files: Vec::new(),
            delay_between_steps: 0.0,
        }
    }
}

/// How a test error is accounted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Recorded as an error.
    Error,
    /// Recorded as a warning.
    Warning,
    /// Dropped.
    Ignored,
}

impl Config {
    /// Loads the configuration from a TOML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or if the TOML content is
    /// invalid.
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {e}"))?;
        toml::from_str(&content).map_err(|e| format!("Failed to parse config file: {e}"))
    }

    /// Saves the configuration to a TOML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be serialized to TOML or if
    /// the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), String> {
        let content =
            toml::to_string_pretty(self).map_err(|e| format!("Failed to serialize config: {e}"))?;
        std::fs::write(path, content).map_err(|e| format!("Failed to write config file: {e}"))
    }

    /// Attributes every main scenario must define.
    #[must_use]
    pub fn expected_scenario_attributes(&self) -> &[String] {
        &self.expected_scenario_attributes
    }

    /// Adds an expected scenario attribute.
    ///
    /// Returns `false` if it was already expected.
    pub fn expect_scenario_attribute(&mut self, name: impl Into<String>) -> bool {
        let name = name.into();
        if self.expected_scenario_attributes.contains(&name) {
            false
        } else {
            self.expected_scenario_attributes.push(name);
            true
        }
    }

    /// Requirement database files.
    #[must_use]
    pub fn req_db_files(&self) -> &[PathBuf] {
        &self.req_db_files
    }

    /// Pause between two steps.
    #[must_use]
    pub fn delay_between_steps(&self) -> Duration {
        Duration::try_from_secs_f64(self.delay_between_steps).unwrap_or_default()
    }

    /// Sets the pause between two steps.
    pub const fn set_delay_between_steps(&mut self, delay: Duration) {
        self.delay_between_steps = delay.as_secs_f64();
    }

    /// The error threshold for known issues.
    #[must_use]
    pub const fn issue_level_error(&self) -> Option<i32> {
        self.issue_level_error
    }

    /// Sets the error threshold for known issues.
    pub const fn set_issue_level_error(&mut self, level: Option<i32>) {
        self.issue_level_error = level;
    }

    /// The ignore threshold for known issues.
    #[must_use]
    pub const fn issue_level_ignored(&self) -> Option<i32> {
        self.issue_level_ignored
    }

    /// Sets the ignore threshold for known issues.
    pub const fn set_issue_level_ignored(&mut self, level: Option<i32>) {
        self.issue_level_ignored = level;
    }

    /// Names an issue level.
    pub fn add_issue_level(&mut self, name: impl Into<String>, level: i32) {
        self.issue_levels.insert(name.into(), level);
    }

    /// Parses an issue level given either by name or as an integer.
    #[must_use]
    pub fn parse_issue_level(&self, value: &str) -> Option<i32> {
        let value = value.trim();
        self.issue_levels
            .get(value)
            .copied()
            .or_else(|| value.parse().ok())
    }

    /// The name of an issue level, if it has one.
    #[must_use]
    pub fn issue_level_name(&self, level: i32) -> Option<&str> {
        self.issue_levels
            .iter()
            .find(|(_, value)| **value == level)
            .map(|(name, _)| name.as_str())
    }

    /// How `error` is accounted for.
    ///
    /// Failures and exceptions are always errors. Known issues depend on
    /// their level and the configured thresholds.
    #[must_use]
    pub fn severity(&self, error: &TestError) -> Severity {
        let TestErrorKind::KnownIssue { level, .. } = error.kind() else {
            return Severity::Error;
        };
        if let Some(threshold) = self.issue_level_error {
            if level.is_none_or(|level| level >= threshold) {
                return Severity::Error;
            }
        }
        if let (Some(threshold), Some(level)) = (self.issue_level_ignored, level) {
            if *level <= threshold {
                return Severity::Ignored;
            }
        }
        Severity::Warning
    }
}

/// The serialized versions of the configuration.
/// This allows for future changes to the configuration format and to the domain
/// type without breaking compatibility.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "_version")]
enum Versions {
    #[serde(rename = "1")]
    V1 {
        #[serde(default)]
        continue_on_error: bool,

        #[serde(default)]
        expect_step_req_refinement: bool,

        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        expected_scenario_attributes: Vec<String>,

        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        issue_levels: BTreeMap<String, i32>,

        #[serde(default, skip_serializing_if = "Option::is_none")]
        issue_level_error: Option<i32>,

        #[serde(default, skip_serializing_if = "Option::is_none")]
        issue_level_ignored: Option<i32>,

        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        req_db_files: Vec<PathBuf>,

        /// Seconds.
        #[serde(default)]
        delay_between_steps: f64,
    },
}

impl From<Versions> for super::Config {
    fn from(versions: Versions) -> Self {
        match versions {
            Versions::V1 {
                continue_on_error,
                expect_step_req_refinement,
                expected_scenario_attributes,
                issue_levels,
                issue_level_error,
                issue_level_ignored,
                req_db_files,
                delay_between_steps,
            } => Self {
                continue_on_error,
                expect_step_req_refinement,
                expected_scenario_attributes,
                issue_levels,
                issue_level_error,
                issue_level_ignored,
                req_db_files,
                delay_between_steps,
            },
        }
    }
}

impl From<super::Config> for Versions {
    fn from(config: super::Config) -> Self {
        Self::V1 {
            continue_on_error: config.continue_on_error,
            expect_step_req_refinement: config.expect_step_req_refinement,
            expected_scenario_attributes: config.expected_scenario_attributes,
            issue_levels: config.issue_levels,
            issue_level_error: config.issue_level_error,
            issue_level_ignored: config.issue_level_ignored,
            req_db_files: config.req_db_files,
            delay_between_steps: config.delay_between_steps,
        }
    }
}
