use std::fmt;

use crate::domain::{ReqId, ReqRef};

/// Identity of a requirement link in the requirement database.
///
/// Links have reference identity: two links with the same reference and
/// comments are still two distinct links.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LinkId(pub(crate) usize);

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "link#{}", self.0)
    }
}

/// A requirement link: a requirement reference plus justification comments.
///
/// The trackers attached to a link are held by the requirement database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReqLink {
    req_ref: ReqRef,
    comments: String,
}

impl ReqLink {
    pub(crate) const fn new(req_ref: ReqRef, comments: String) -> Self {
        Self { req_ref, comments }
    }

    /// The linked requirement reference.
    #[must_use]
    pub const fn req_ref(&self) -> &ReqRef {
        &self.req_ref
    }

    /// The linked requirement.
    #[must_use]
    pub const fn req(&self) -> &ReqId {
        self.req_ref.req()
    }

    /// Justification comments, empty when none were given.
    #[must_use]
    pub fn comments(&self) -> &str {
        &self.comments
    }

    /// Whether this link targets `req_ref`, or one of its sub-references
    /// when `walk_subrefs` is set.
    #[must_use]
    pub fn matches(&self, req_ref: &ReqRef, walk_subrefs: bool) -> bool {
        req_ref.covers(&self.req_ref, walk_subrefs)
    }
}

/// How a tracker designates a requirement link.
///
/// Textual references are resolved, and created in the requirement database
/// when unknown, at declaration time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkSpec {
    /// A textual requirement reference, with optional comments.
    Ref {
        /// Reference such as `REQ-001/a`.
        req_ref: String,
        /// Justification comments.
        comments: Option<String>,
    },
    /// An existing link, shared with the trackers it is already attached
    /// to.
    Link(LinkId),
}

impl From<&str> for LinkSpec {
    fn from(req_ref: &str) -> Self {
        Self::Ref {
            req_ref: req_ref.to_string(),
            comments: None,
        }
    }
}

impl From<String> for LinkSpec {
    fn from(req_ref: String) -> Self {
        Self::Ref {
            req_ref,
            comments: None,
        }
    }
}

impl From<(&str, &str)> for LinkSpec {
    fn from((req_ref, comments): (&str, &str)) -> Self {
        Self::Ref {
            req_ref: req_ref.to_string(),
            comments: Some(comments.to_string()),
        }
    }
}

impl From<&ReqRef> for LinkSpec {
    fn from(req_ref: &ReqRef) -> Self {
        Self::from(req_ref.id())
    }
}

impl From<&ReqId> for LinkSpec {
    fn from(req: &ReqId) -> Self {
        Self::from(req.as_str())
    }
}

impl From<LinkId> for LinkSpec {
    fn from(link: LinkId) -> Self {
        Self::Link(link)
    }
}
