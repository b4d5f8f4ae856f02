//! Requirement database files.
//!
//! A JSON object holding one entry per requirement, keyed by identifier,
//! next to `$schema` and `$version` metadata.

use std::{collections::BTreeMap, path::Path};

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::{
    domain::{Req, ReqDatabase, ReqId, ReqRef},
    storage::{Error, json_error, read_to_string, write},
};

const SCHEMA: &str = "schema/req-db.schema.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct ReqDbDocument {
    #[serde(rename = "$schema", default, skip_serializing_if = "Option::is_none")]
    schema: Option<String>,
    #[serde(rename = "$version", default, skip_serializing_if = "Option::is_none")]
    version: Option<String>,
    #[serde(flatten)]
    reqs: BTreeMap<String, ReqRecord>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ReqRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(default)]
    title: String,
    #[serde(default)]
    text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    sub_refs: Vec<String>,
}

/// Loads a requirement database file into `req_db`.
///
/// A key that disagrees with the `id` of its entry is reported as a
/// warning, the key wins.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, if an
/// identifier or sub-reference is malformed, or if a requirement clashes
/// with a different one already known.
#[instrument(level = "debug", skip(req_db))]
pub fn load(req_db: &mut ReqDatabase, path: &Path) -> Result<(), Error> {
    let content = read_to_string(path)?;
    let document: ReqDbDocument = serde_json::from_str(&content).map_err(json_error(path))?;
    debug!(
        "{} requirements, version {:?}",
        document.reqs.len(),
        document.version
    );

    for (key, record) in document.reqs {
        let id: ReqId = key.parse().map_err(|error| Error::Content {
            path: path.to_path_buf(),
            message: format!("{error}"),
        })?;
        if let Some(record_id) = record.id.as_deref().filter(|record_id| *record_id != key) {
            warn!(
                "{}: requirement {key} declares id {record_id:?}",
                path.display()
            );
        }
        req_db.push_req(
            Req::new(id.clone())
                .with_title(record.title)
                .with_text(record.text),
        )?;

        for sub_ref in record.sub_refs {
            let req_ref: ReqRef = sub_ref.parse().map_err(|error| Error::Content {
                path: path.to_path_buf(),
                message: format!("{error}"),
            })?;
            if *req_ref.req() != id || req_ref.is_main() {
                return Err(Error::Content {
                    path: path.to_path_buf(),
                    message: format!("{sub_ref:?} is not a sub-reference of {id}"),
                });
            }
            req_db.push_ref(req_ref);
        }
    }
    Ok(())
}

/// Writes every requirement of `req_db` with its sub-references.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn dump(req_db: &ReqDatabase, path: &Path) -> Result<(), Error> {
    let document = ReqDbDocument {
        schema: Some(SCHEMA.to_string()),
        version: Some(env!("CARGO_PKG_VERSION").to_string()),
        reqs: req_db
            .all_reqs()
            .map(|req| {
                let record = ReqRecord {
                    id: Some(req.id().to_string()),
                    title: req.title().to_string(),
                    text: req.text().to_string(),
                    sub_refs: req_db.subrefs(req.id()).map(ReqRef::id).collect(),
                };
                (req.id().to_string(), record)
            })
            .collect(),
    };
    let content = serde_json::to_string_pretty(&document).map_err(json_error(path))?;
    write(path, &content)
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    const DB: &str = r#"{
        "$schema": "schema/req-db.schema.json",
        "$version": "1.0.0",
        "REQ-1": {
            "id": "REQ-1",
            "title": "First",
            "text": "The first requirement.",
            "sub-refs": ["REQ-1/a", "REQ-1/b"]
        },
        "REQ-2": {"id": "REQ-OTHER", "title": "Second"}
    }"#;

    fn loaded(content: &str) -> Result<ReqDatabase, Error> {
        let dir = tempdir().unwrap();
        let path = dir.path().join("reqs.json");
        std::fs::write(&path, content).unwrap();
        let mut req_db = ReqDatabase::new();
        load(&mut req_db, &path)?;
        Ok(req_db)
    }

    #[test]
    fn requirements_and_subrefs_are_loaded() {
        let req_db = loaded(DB).unwrap();

        let first = req_db.req(&"REQ-1".parse().unwrap()).unwrap();
        assert_eq!(first.title(), "First");
        assert_eq!(first.text(), "The first requirement.");
        let refs: Vec<_> = req_db.all_refs().map(ReqRef::id).collect();
        assert_eq!(refs, ["REQ-1", "REQ-1/a", "REQ-1/b", "REQ-2"]);
    }

    #[test]
    fn mismatched_ids_keep_the_key() {
        let req_db = loaded(DB).unwrap();
        assert_eq!(
            req_db.req(&"REQ-2".parse().unwrap()).unwrap().title(),
            "Second"
        );
        assert!(req_db.req(&"REQ-OTHER".parse().unwrap()).is_none());
    }

    #[test]
    fn foreign_subrefs_are_rejected() {
        let error = loaded(r#"{"REQ-1": {"sub-refs": ["REQ-2/a"]}}"#).unwrap_err();
        assert!(matches!(error, Error::Content { .. }));
    }

    #[test]
    fn dumped_databases_load_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dump.json");
        let req_db = loaded(DB).unwrap();
        dump(&req_db, &path).unwrap();

        let mut reloaded = ReqDatabase::new();
        load(&mut reloaded, &path).unwrap();
        let refs: Vec<_> = reloaded.all_refs().map(ReqRef::id).collect();
        assert_eq!(refs, ["REQ-1", "REQ-1/a", "REQ-1/b", "REQ-2"]);
        assert_eq!(
            reloaded.req(&"REQ-1".parse().unwrap()).unwrap().title(),
            "First"
        );
    }
}
