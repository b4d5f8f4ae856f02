//! Traceability documents, JSON or YAML depending on the file extension.

use std::{fmt, path::Path};

use serde::Serialize;
use tracing::{debug, instrument};

use crate::storage::{Error, json_error, write as write_file};

/// Which projection a document holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceabilityKind {
    /// Requirement to scenarios and steps.
    Downstream,
    /// Scenario to requirements.
    Upstream,
}

impl fmt::Display for TraceabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Self::Downstream => "downstream",
            Self::Upstream => "upstream",
        })
    }
}

#[derive(Serialize)]
struct Document<'a, T> {
    #[serde(rename = "$encoding")]
    encoding: &'static str,
    #[serde(rename = "$schema")]
    schema: String,
    #[serde(rename = "$version")]
    version: &'static str,
    #[serde(flatten)]
    content: &'a T,
}

/// Writes a traceability projection.
///
/// `.json` files get pretty JSON, `.yml` and `.yaml` files get YAML.
///
/// # Errors
///
/// Returns [`Error::UnknownExtension`] for any other extension, or an
/// error if the content cannot be serialized or written.
#[instrument(level = "debug", skip(content))]
pub fn write<T: Serialize>(path: &Path, kind: TraceabilityKind, content: &T) -> Result<(), Error> {
    let document = Document {
        encoding: "utf-8",
        schema: format!("schema/{kind}-traceability.schema.json"),
        version: env!("CARGO_PKG_VERSION"),
        content,
    };
    let extension = path
        .extension()
        .and_then(|extension| extension.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let text = match extension.as_str() {
        "json" => serde_json::to_string_pretty(&document).map_err(json_error(path))?,
        "yml" | "yaml" => serde_yaml::to_string(&document).map_err(|source| Error::Yaml {
            path: path.to_path_buf(),
            source,
        })?,
        _ => {
            return Err(Error::UnknownExtension {
                path: path.to_path_buf(),
                extension,
            });
        }
    };
    debug!("{} bytes", text.len());
    write_file(path, &text)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use tempfile::tempdir;
    use test_case::test_case;

    use super::*;

    fn content() -> BTreeMap<&'static str, &'static str> {
        BTreeMap::from([("REQ-1", "covered")])
    }

    #[test]
    fn json_documents_carry_metadata() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("downstream.json");
        write(&path, TraceabilityKind::Downstream, &content()).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["$encoding"], "utf-8");
        assert_eq!(
            value["$schema"],
            "schema/downstream-traceability.schema.json"
        );
        assert_eq!(value["$version"], env!("CARGO_PKG_VERSION"));
        assert_eq!(value["REQ-1"], "covered");
    }

    #[test_case("upstream.yml" ; "yml")]
    #[test_case("upstream.YAML" ; "yaml upper case")]
    fn yaml_documents_carry_metadata(name: &str) {
        let dir = tempdir().unwrap();
        let path = dir.path().join(name);
        write(&path, TraceabilityKind::Upstream, &content()).unwrap();

        let value: serde_yaml::Value =
            serde_yaml::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(
            value["$schema"].as_str(),
            Some("schema/upstream-traceability.schema.json")
        );
        assert_eq!(value["REQ-1"].as_str(), Some("covered"));
    }

    #[test_case("upstream.txt", "txt" ; "other extension")]
    #[test_case("upstream", "" ; "no extension")]
    fn unknown_extensions_are_rejected(name: &str, expected: &str) {
        let dir = tempdir().unwrap();
        let error = write(&dir.path().join(name), TraceabilityKind::Upstream, &content())
            .unwrap_err();
        assert!(
            matches!(error, Error::UnknownExtension { extension, .. } if extension == expected)
        );
        assert!(!dir.path().join(name).exists());
    }
}
