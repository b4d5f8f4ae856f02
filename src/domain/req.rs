use std::{fmt, ops::Deref, str::FromStr};

use non_empty_string::NonEmptyString;
use serde::{Deserialize, Serialize};

/// Separator between a requirement identifier and its sub-item keywords.
pub const SUBREF_SEPARATOR: char = '/';

/// A validated requirement identifier, e.g. `REQ-001`.
///
/// Identifiers are non-empty, carry no surrounding whitespace and never
/// contain the sub-reference separator.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ReqId(NonEmptyString);

impl ReqId {
    /// Creates a new requirement identifier.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidReqIdError`] if the string is empty, has leading or
    /// trailing whitespace, or contains a `/`.
    pub fn new(s: String) -> Result<Self, InvalidReqIdError> {
        if s.trim() != s || s.contains(SUBREF_SEPARATOR) {
            return Err(InvalidReqIdError(s));
        }
        let non_empty = NonEmptyString::new(s).map_err(InvalidReqIdError)?;
        Ok(Self(non_empty))
    }

    /// Returns the string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl TryFrom<String> for ReqId {
    type Error = InvalidReqIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for ReqId {
    type Error = InvalidReqIdError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value.to_string())
    }
}

impl FromStr for ReqId {
    type Err = InvalidReqIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl From<ReqId> for String {
    fn from(id: ReqId) -> Self {
        id.0.as_str().to_string()
    }
}

impl AsRef<str> for ReqId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl Deref for ReqId {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        self.as_str()
    }
}

impl fmt::Display for ReqId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string is not a valid requirement identifier.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("Invalid requirement id '{0}': must be non-empty, trimmed and contain no '/'")]
pub struct InvalidReqIdError(String);

/// A requirement: identity plus optional title and text.
///
/// The links that reference a requirement are held by the requirement
/// database, not by the requirement itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Req {
    id: ReqId,
    title: String,
    text: String,
}

impl Req {
    /// Creates a requirement with no title and no text.
    #[must_use]
    pub const fn new(id: ReqId) -> Self {
        Self {
            id,
            title: String::new(),
            text: String::new(),
        }
    }

    /// Sets the title.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Sets the text.
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// The requirement identifier.
    #[must_use]
    pub const fn id(&self) -> &ReqId {
        &self.id
    }

    /// The requirement title, empty when unknown.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// The requirement text, empty when unknown.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Replaces the title.
    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
    }

    /// Replaces the text.
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    /// Whether the requirement only carries its identity.
    ///
    /// Requirements created lazily by a reference are bare until a database
    /// file fills them in.
    #[must_use]
    pub fn is_bare(&self) -> bool {
        self.title.is_empty() && self.text.is_empty()
    }

    /// The main reference to this requirement.
    #[must_use]
    pub fn main_ref(&self) -> ReqRef {
        ReqRef::main(self.id.clone())
    }
}

/// A reference to a requirement, or to one of its sub-items.
///
/// The ordering sorts by requirement first, then by sub-item path, so that
/// every sub-reference directly follows the main reference of its
/// requirement.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ReqRef {
    req: ReqId,
    subs: Vec<String>,
}

impl ReqRef {
    /// The main reference of a requirement.
    #[must_use]
    pub const fn main(req: ReqId) -> Self {
        Self {
            req,
            subs: Vec::new(),
        }
    }

    /// A reference to a sub-item path of a requirement.
    ///
    /// # Errors
    ///
    /// Returns [`ReqRefError::InvalidSubItem`] if a keyword is empty or
    /// contains a `/`.
    pub fn with_subs<I, S>(req: ReqId, subs: I) -> Result<Self, ReqRefError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let subs = subs
            .into_iter()
            .map(|sub| {
                let sub: String = sub.into();
                let trimmed = sub.trim();
                if trimmed.is_empty() || trimmed.contains(SUBREF_SEPARATOR) {
                    Err(ReqRefError::InvalidSubItem(sub))
                } else {
                    Ok(trimmed.to_string())
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { req, subs })
    }

    /// The referenced requirement identifier.
    #[must_use]
    pub const fn req(&self) -> &ReqId {
        &self.req
    }

    /// The sub-item keywords, empty for a main reference.
    #[must_use]
    pub fn subs(&self) -> &[String] {
        &self.subs
    }

    /// Whether this reference designates the requirement as a whole.
    #[must_use]
    pub fn is_main(&self) -> bool {
        self.subs.is_empty()
    }

    /// Whether this reference designates a sub-item of the requirement.
    #[must_use]
    pub fn is_subref(&self) -> bool {
        !self.is_main()
    }

    /// Whether `other` is this reference or one of its sub-references.
    ///
    /// Only main references have sub-references.
    #[must_use]
    pub fn covers(&self, other: &Self, walk_subrefs: bool) -> bool {
        self == other || (walk_subrefs && self.is_main() && self.req == other.req)
    }

    /// The textual identifier, e.g. `REQ-001/a/b`.
    #[must_use]
    pub fn id(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ReqRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.req.as_str())?;
        for sub in &self.subs {
            write!(f, "{SUBREF_SEPARATOR}{sub}")?;
        }
        Ok(())
    }
}

impl FromStr for ReqRef {
    type Err = ReqRefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(SUBREF_SEPARATOR);
        let req = parts.next().unwrap_or_default().trim();
        let req = ReqId::new(req.to_string())?;
        Self::with_subs(req, parts)
    }
}

impl From<ReqId> for ReqRef {
    fn from(req: ReqId) -> Self {
        Self::main(req)
    }
}

/// Errors raised while parsing a requirement reference.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ReqRefError {
    /// The requirement part is not a valid identifier.
    #[error(transparent)]
    InvalidId(#[from] InvalidReqIdError),
    /// A sub-item keyword is empty or malformed.
    #[error("Invalid sub-item keyword '{0}'")]
    InvalidSubItem(String),
}
