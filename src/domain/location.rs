use std::{fmt, panic::Location, path::Path, str::FromStr, sync::LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

static LONG_STRING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.*):([0-9]+):(.*)$").expect("code location pattern is valid")
});

/// Separator between the scenario name and the step name in a qualified
/// step name.
pub const QUALNAME_SEPARATOR: &str = "::";

/// Where a definition, a known issue or an assertion was written.
///
/// Serialized as the long string `file:line:qualname`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CodeLocation {
    file: String,
    line: u32,
    qualname: String,
}

impl CodeLocation {
    /// Creates a location from its parts.
    #[must_use]
    pub fn new(file: impl Into<String>, line: u32, qualname: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line,
            qualname: qualname.into(),
        }
    }

    /// The location of the caller of the enclosing `#[track_caller]`
    /// function, named `qualname`.
    #[must_use]
    #[track_caller]
    pub fn caller(qualname: impl Into<String>) -> Self {
        let location = Location::caller();
        Self::new(location.file(), location.line(), qualname)
    }

    /// The source file.
    #[must_use]
    pub fn file(&self) -> &str {
        &self.file
    }

    /// The line number in the source file.
    #[must_use]
    pub const fn line(&self) -> u32 {
        self.line
    }

    /// The qualified name of the located item.
    #[must_use]
    pub fn qualname(&self) -> &str {
        &self.qualname
    }

    /// The last segment of the qualified name.
    ///
    /// Falls back to the whole qualified name when it has no separator.
    #[must_use]
    pub fn short_name(&self) -> &str {
        self.qualname
            .rsplit(QUALNAME_SEPARATOR)
            .next()
            .unwrap_or(&self.qualname)
    }

    /// The file name without its directories, for display.
    #[must_use]
    pub fn file_name(&self) -> &str {
        Path::new(&self.file)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(&self.file)
    }

    /// The `file:line:qualname` form.
    #[must_use]
    pub fn to_long_string(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CodeLocation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.qualname)
    }
}

impl FromStr for CodeLocation {
    type Err = InvalidLocationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let captures = LONG_STRING
            .captures(s)
            .ok_or_else(|| InvalidLocationError(s.to_string()))?;
        let line = captures[2]
            .parse()
            .map_err(|_| InvalidLocationError(s.to_string()))?;
        Ok(Self::new(&captures[1], line, &captures[3]))
    }
}

impl TryFrom<String> for CodeLocation {
    type Error = InvalidLocationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CodeLocation> for String {
    fn from(location: CodeLocation) -> Self {
        location.to_long_string()
    }
}

/// Error returned when a string is not a `file:line:qualname` location.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("Invalid code location '{0}': expected 'file:line:qualname'")]
pub struct InvalidLocationError(String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_long_string() {
        let location: CodeLocation = "tests/goto.rs:42:goto::step010".parse().unwrap();
        assert_eq!(location.file(), "tests/goto.rs");
        assert_eq!(location.line(), 42);
        assert_eq!(location.qualname(), "goto::step010");
        assert_eq!(location.short_name(), "step010");
        assert_eq!(location.to_long_string(), "tests/goto.rs:42:goto::step010");
    }

    #[test]
    fn file_may_contain_colons() {
        let location: CodeLocation = r"C:\tests\goto.rs:7:goto".parse().unwrap();
        assert_eq!(location.file(), r"C:\tests\goto.rs");
        assert_eq!(location.line(), 7);
    }

    #[test]
    fn reject_missing_line() {
        "goto.rs:goto".parse::<CodeLocation>().unwrap_err();
    }

    #[test]
    fn caller_points_at_this_file() {
        let location = CodeLocation::caller("here");
        assert!(location.file().ends_with("location.rs"));
        assert_eq!(location.short_name(), "here");
    }
}
