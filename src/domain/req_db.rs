//! In-memory requirement database with a bidirectional link graph.
//!
//! The [`ReqDatabase`] stores requirements, references and links in a
//! decomposed format:
//! - Requirements: `BTreeMap<ReqId, Req>`
//! - References: `BTreeMap<ReqRef, RefIndex>`, ordered for range queries
//! - Links: `Vec<ReqLink>` indexed by [`LinkId`]
//! - Relationships: `DiGraphMap<Node, ()>` with edges tracker → link and
//!   link → reference
//!
//! The graph is the sole source of truth for associations, so the set of
//! trackers of a link and the set of links of a tracker can never disagree.

use std::collections::{BTreeMap, BTreeSet};

use petgraph::{Direction, graphmap::DiGraphMap};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::domain::{LinkId, Req, ReqId, ReqLink, ReqRef, ReqRefError, Tracker};

/// Index of a reference in the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct RefIndex(usize);

/// Graph node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum Node {
    Ref(RefIndex),
    Link(LinkId),
    Tracker(Tracker),
}

/// Errors raised by the requirement database.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReqDbError {
    /// A different requirement with the same identifier already exists.
    #[error("duplicate requirement {0}")]
    DuplicateRequirement(ReqId),
    /// The reference is not known and unknown references are not
    /// registered.
    #[error("unknown requirement reference {0}")]
    UnknownReference(String),
    /// The link identifier does not belong to this database.
    #[error("unknown requirement link {0}")]
    UnknownLink(LinkId),
    /// The reference is malformed.
    #[error(transparent)]
    InvalidReference(#[from] ReqRefError),
}

/// Registry of requirements, references, links and their trackers.
#[derive(Debug, Default)]
pub struct ReqDatabase {
    reqs: BTreeMap<ReqId, Req>,
    ref_index: BTreeMap<ReqRef, RefIndex>,
    links: Vec<ReqLink>,
    graph: DiGraphMap<Node, ()>,
}

impl ReqDatabase {
    /// Creates an empty database.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes every requirement, reference and link.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Registers a requirement.
    ///
    /// Pushing a requirement equal to a known one is a no-op. A bare
    /// requirement (created by a reference before its definition was loaded)
    /// takes the title and text of the pushed one.
    ///
    /// # Errors
    ///
    /// Returns [`ReqDbError::DuplicateRequirement`] if a different, non-bare
    /// requirement with the same identifier is already known.
    pub fn push_req(&mut self, req: Req) -> Result<&Req, ReqDbError> {
        let id = req.id().clone();
        self.ensure_ref(ReqRef::main(id.clone()));
        let known = self
            .reqs
            .entry(id.clone())
            .or_insert_with(|| Req::new(id.clone()));
        if known.is_bare() {
            *known = req;
        } else if *known != req && !req.is_bare() {
            return Err(ReqDbError::DuplicateRequirement(id));
        }
        Ok(known)
    }

    /// Registers a requirement reference, and its requirement if needed.
    ///
    /// Idempotent.
    pub fn push_ref(&mut self, req_ref: ReqRef) {
        self.ensure_ref(req_ref);
    }

    fn ensure_ref(&mut self, req_ref: ReqRef) -> RefIndex {
        if let Some(index) = self.ref_index.get(&req_ref) {
            return *index;
        }
        if !self.reqs.contains_key(req_ref.req()) {
            debug!("New requirement {}", req_ref.req());
            self.reqs
                .insert(req_ref.req().clone(), Req::new(req_ref.req().clone()));
            if req_ref.is_subref() {
                self.ensure_ref(ReqRef::main(req_ref.req().clone()));
            }
        }
        let index = RefIndex(self.ref_index.len());
        self.ref_index.insert(req_ref, index);
        self.graph.add_node(Node::Ref(index));
        index
    }

    /// Looks a requirement up.
    #[must_use]
    pub fn req(&self, id: &ReqId) -> Option<&Req> {
        self.reqs.get(id)
    }

    /// Looks a requirement up for modification.
    pub fn req_mut(&mut self, id: &ReqId) -> Option<&mut Req> {
        self.reqs.get_mut(id)
    }

    /// Whether `req_ref` is registered.
    #[must_use]
    pub fn contains_ref(&self, req_ref: &ReqRef) -> bool {
        self.ref_index.contains_key(req_ref)
    }

    /// Parses a textual reference and checks that it is known.
    ///
    /// When `push_unknown` is set, unknown references (and their
    /// requirement) are registered instead of rejected.
    ///
    /// # Errors
    ///
    /// Returns an error if the reference is malformed, or unknown while
    /// `push_unknown` is not set.
    pub fn resolve_ref(&mut self, req_ref: &str, push_unknown: bool) -> Result<ReqRef, ReqDbError> {
        let parsed: ReqRef = req_ref.parse()?;
        if !self.contains_ref(&parsed) {
            if !push_unknown {
                return Err(ReqDbError::UnknownReference(req_ref.to_string()));
            }
            self.ensure_ref(parsed.clone());
        }
        Ok(parsed)
    }

    /// All requirements, ordered by identifier.
    pub fn all_reqs(&self) -> impl Iterator<Item = &Req> {
        self.reqs.values()
    }

    /// All references, ordered by requirement then sub-item path.
    pub fn all_refs(&self) -> impl Iterator<Item = &ReqRef> {
        self.ref_index.keys()
    }

    /// The sub-references of a requirement, ordered.
    pub fn subrefs<'a>(&'a self, req: &ReqId) -> impl Iterator<Item = &'a ReqRef> + use<'a> {
        let req = req.clone();
        self.ref_index
            .range(ReqRef::main(req.clone())..)
            .map(|(req_ref, _)| req_ref)
            .take_while(move |req_ref| *req_ref.req() == req)
            .filter(|req_ref| req_ref.is_subref())
    }

    /// All links, in creation order.
    pub fn all_links(&self) -> impl Iterator<Item = (LinkId, &ReqLink)> {
        self.links
            .iter()
            .enumerate()
            .map(|(index, link)| (LinkId(index), link))
    }

    /// All trackers attached to at least one link.
    #[must_use]
    pub fn all_trackers(&self) -> BTreeSet<Tracker> {
        self.graph
            .nodes()
            .filter_map(|node| match node {
                Node::Tracker(tracker) => Some(tracker),
                _ => None,
            })
            .collect()
    }

    /// Creates a new link to `req_ref`, registering the reference if needed.
    ///
    /// The link is not attached to any tracker yet.
    pub fn create_link(&mut self, req_ref: ReqRef, comments: impl Into<String>) -> LinkId {
        self.ensure_ref(req_ref.clone());
        let id = LinkId(self.links.len());
        self.links.push(ReqLink::new(req_ref, comments.into()));
        self.graph.add_node(Node::Link(id));
        id
    }

    /// Looks a link up.
    #[must_use]
    pub fn link(&self, id: LinkId) -> Option<&ReqLink> {
        self.links.get(id.0)
    }

    /// Attaches a link to a tracker, in both directions, and registers the
    /// link in its reference's link set.
    ///
    /// Returns `true` if the link was new to the tracker.
    ///
    /// # Errors
    ///
    /// Returns [`ReqDbError::UnknownLink`] if the link does not belong to
    /// this database.
    #[instrument(level = "debug", skip(self))]
    pub fn attach(&mut self, link: LinkId, tracker: Tracker) -> Result<bool, ReqDbError> {
        let req_ref = self
            .link(link)
            .ok_or(ReqDbError::UnknownLink(link))?
            .req_ref()
            .clone();
        let ref_index = self.ensure_ref(req_ref);
        self.graph.add_edge(Node::Link(link), Node::Ref(ref_index), ());
        let is_new = self
            .graph
            .add_edge(Node::Tracker(tracker), Node::Link(link), ())
            .is_none();
        Ok(is_new)
    }

    /// The links attached to a tracker, in link creation order.
    #[must_use]
    pub fn tracker_links(&self, tracker: Tracker) -> Vec<LinkId> {
        let node = Node::Tracker(tracker);
        if !self.graph.contains_node(node) {
            return Vec::new();
        }
        let mut links: Vec<_> = self
            .graph
            .neighbors_directed(node, Direction::Outgoing)
            .filter_map(|node| match node {
                Node::Link(link) => Some(link),
                _ => None,
            })
            .collect();
        links.sort_unstable();
        links
    }

    /// The trackers a link is attached to.
    #[must_use]
    pub fn link_trackers(&self, link: LinkId) -> Vec<Tracker> {
        let node = Node::Link(link);
        if !self.graph.contains_node(node) {
            return Vec::new();
        }
        let mut trackers: Vec<_> = self
            .graph
            .neighbors_directed(node, Direction::Incoming)
            .filter_map(|node| match node {
                Node::Tracker(tracker) => Some(tracker),
                _ => None,
            })
            .collect();
        trackers.sort_unstable();
        trackers
    }

    /// The attached links targeting `req_ref`, in link creation order.
    #[must_use]
    pub fn ref_links(&self, req_ref: &ReqRef) -> Vec<LinkId> {
        let Some(index) = self.ref_index.get(req_ref) else {
            return Vec::new();
        };
        let mut links: Vec<_> = self
            .graph
            .neighbors_directed(Node::Ref(*index), Direction::Incoming)
            .filter_map(|node| match node {
                Node::Link(link) => Some(link),
                _ => None,
            })
            .collect();
        links.sort_unstable();
        links
    }

    /// The attached links targeting a requirement, through its main
    /// reference and, when `walk_subrefs` is set, its sub-references.
    #[must_use]
    pub fn req_links(&self, req: &ReqId, walk_subrefs: bool) -> Vec<LinkId> {
        let main = ReqRef::main(req.clone());
        let mut links = self.ref_links(&main);
        if walk_subrefs {
            for subref in self.subrefs(req) {
                links.extend(self.ref_links(subref));
            }
            links.sort_unstable();
        }
        links
    }

    /// The link of `tracker` to `req_ref` with exactly `comments`, if any.
    #[must_use]
    pub fn find_link(&self, tracker: Tracker, req_ref: &ReqRef, comments: &str) -> Option<LinkId> {
        self.tracker_links(tracker).into_iter().find(|link| {
            self.link(*link)
                .is_some_and(|link| link.req_ref() == req_ref && link.comments() == comments)
        })
    }

    /// Direct trackers of the given links, each with the subset of links
    /// connecting it.
    ///
    /// A tracker linked several times keeps all its links.
    #[must_use]
    pub fn trackers_with_links(&self, links: &[LinkId]) -> BTreeMap<Tracker, Vec<LinkId>> {
        let mut trackers: BTreeMap<Tracker, Vec<LinkId>> = BTreeMap::new();
        for link in links {
            for tracker in self.link_trackers(*link) {
                let entry = trackers.entry(tracker).or_default();
                if !entry.contains(link) {
                    entry.push(*link);
                }
            }
        }
        trackers
    }

    /// The references targeted by the given links, each with the subset of
    /// links targeting it, ordered by reference.
    #[must_use]
    pub fn refs_with_links(&self, links: &[LinkId]) -> BTreeMap<ReqRef, Vec<LinkId>> {
        let mut refs: BTreeMap<ReqRef, Vec<LinkId>> = BTreeMap::new();
        for link in links {
            if let Some(req_link) = self.link(*link) {
                let entry = refs.entry(req_link.req_ref().clone()).or_default();
                if !entry.contains(link) {
                    entry.push(*link);
                }
            }
        }
        refs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ScenarioId, StepId};

    fn req_ref(s: &str) -> ReqRef {
        s.parse().unwrap()
    }

    #[test]
    fn references_register_their_requirement_lazily() {
        let mut db = ReqDatabase::new();
        db.push_ref(req_ref("REQ-1/a"));

        let req = db.req(&"REQ-1".parse().unwrap()).unwrap();
        assert!(req.is_bare());
        let refs: Vec<_> = db.all_refs().map(ReqRef::id).collect();
        assert_eq!(refs, ["REQ-1", "REQ-1/a"]);
    }

    #[test]
    fn bare_requirement_is_filled_in() {
        let mut db = ReqDatabase::new();
        db.push_ref(req_ref("REQ-1"));
        let req = Req::new("REQ-1".parse().unwrap()).with_title("Login");

        assert_eq!(db.push_req(req.clone()).unwrap(), &req);
        // pushing the same requirement again is a no-op
        db.push_req(req).unwrap();
    }

    #[test]
    fn conflicting_requirement_is_rejected() {
        let mut db = ReqDatabase::new();
        db.push_req(Req::new("REQ-1".parse().unwrap()).with_title("Login"))
            .unwrap();

        let error = db
            .push_req(Req::new("REQ-1".parse().unwrap()).with_title("Logout"))
            .expect_err("conflicting requirement should be rejected");
        assert!(matches!(error, ReqDbError::DuplicateRequirement(_)));
    }

    #[test]
    fn resolve_unknown_reference() {
        let mut db = ReqDatabase::new();
        let error = db.resolve_ref("REQ-1", false).expect_err("unknown reference");
        assert_eq!(error, ReqDbError::UnknownReference("REQ-1".to_string()));

        let resolved = db.resolve_ref("REQ-1", true).unwrap();
        assert!(db.contains_ref(&resolved));
        assert_eq!(db.resolve_ref("REQ-1", false).unwrap(), resolved);
    }

    #[test]
    fn links_and_trackers_are_consistent() {
        let mut db = ReqDatabase::new();
        let scenario = Tracker::Scenario(ScenarioId(0));
        let step = Tracker::Step(StepId(0));
        let link = db.create_link(req_ref("REQ-1/a"), "shared");

        assert!(db.attach(link, scenario).unwrap());
        assert!(db.attach(link, step).unwrap());
        assert!(!db.attach(link, step).unwrap());

        assert_eq!(db.link_trackers(link), [scenario, step]);
        assert_eq!(db.tracker_links(scenario), [link]);
        assert_eq!(db.tracker_links(step), [link]);
        assert_eq!(db.ref_links(&req_ref("REQ-1/a")), [link]);
        assert!(db.ref_links(&req_ref("REQ-1")).is_empty());
        assert_eq!(db.req_links(&"REQ-1".parse().unwrap(), true), [link]);
        assert_eq!(db.all_trackers().len(), 2);
    }

    #[test]
    fn unattached_links_have_no_reference_edge() {
        let mut db = ReqDatabase::new();
        db.create_link(req_ref("REQ-1"), "");
        assert!(db.ref_links(&req_ref("REQ-1")).is_empty());
        assert!(db.all_trackers().is_empty());
    }

    #[test]
    fn trackers_keep_every_link() {
        let mut db = ReqDatabase::new();
        let scenario = Tracker::Scenario(ScenarioId(0));
        let first = db.create_link(req_ref("REQ-1"), "first");
        let second = db.create_link(req_ref("REQ-1"), "second");
        db.attach(first, scenario).unwrap();
        db.attach(second, scenario).unwrap();

        let trackers = db.trackers_with_links(&db.ref_links(&req_ref("REQ-1")));
        assert_eq!(trackers[&scenario], [first, second]);
        assert_eq!(
            db.find_link(scenario, &req_ref("REQ-1"), "second"),
            Some(second)
        );
    }
}
