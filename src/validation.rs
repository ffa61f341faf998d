//! Route endpoint resolution and advisory label validation.
//!
//! Route start/end fields are free text that must end up naming either a
//! point id or a spot name. Resolution runs when a field is committed; the
//! resulting issues are advisory and handed to a [`ValidationFeedback`]
//! collaborator. Nothing in this module blocks an edit.

use crate::store::{EntityStore, PointStore, SpotStore, StoredEntity};
use crate::types::{EntityKind, Route};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use thiserror::Error;

/// Loose label format: a letter, an optional separator and one or two digits.
static LOOSE_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Z])\s*[-_ ]?\s*(\d{1,2})$").expect("valid loose label regex"));

/// Strict display format `LETTER-NN`.
static CANONICAL_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z]-\d{2}$").expect("valid canonical label regex"));

/// Which end of a route a field refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Endpoint {
    /// The start referent
    Start,
    /// The end referent
    End,
}

/// Identifies an input field that validation feedback is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FieldRef {
    /// Id field of the point at the index
    PointId(usize),
    /// Name field of the spot at the index
    SpotName(usize),
    /// Start field of the route at the index
    RouteStart(usize),
    /// End field of the route at the index
    RouteEnd(usize),
}

impl FieldRef {
    /// The label field of an entity held in a store of `kind`.
    pub fn label_of(kind: EntityKind, index: usize) -> Option<Self> {
        match kind {
            EntityKind::Point => Some(FieldRef::PointId(index)),
            EntityKind::Spot => Some(FieldRef::SpotName(index)),
            EntityKind::Waypoint | EntityKind::AreaVertex => None,
        }
    }

    /// The start or end field of a route.
    pub fn route(endpoint: Endpoint, index: usize) -> Self {
        match endpoint {
            Endpoint::Start => FieldRef::RouteStart(index),
            Endpoint::End => FieldRef::RouteEnd(index),
        }
    }
}

/// Failures raised by models and validation.
///
/// Only [`ValidationError::EndpointsRequired`] blocks an operation; every other
/// variant is advisory.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// An index no longer refers to an entity
    #[error("no {kind} at index {index}")]
    InvalidIndex {
        /// Collection that was indexed
        kind: EntityKind,
        /// The stale index
        index: usize,
    },
    /// Endpoint text partially matches more than one spot name
    #[error("\"{text}\" matches several spots: {}", .candidates.join(", "))]
    AmbiguousReference {
        /// Text as typed
        text: String,
        /// Every spot name containing the text
        candidates: Vec<String>,
    },
    /// Two entities of the same kind share a label
    #[error("{kind} label \"{label}\" is used more than once")]
    DuplicateLabel {
        /// Point or spot
        kind: EntityKind,
        /// The shared label
        label: String,
    },
    /// Endpoint text names neither a point id nor a spot name
    #[error("\"{text}\" does not match any point id or spot name")]
    UnresolvedEndpoint {
        /// Text as typed
        text: String,
    },
    /// Start and end refer to the same referent
    #[error("start and end both refer to \"{text}\"")]
    IdenticalEndpoints {
        /// The shared referent
        text: String,
    },
    /// Waypoints were edited before both endpoints were set
    #[error("set both start and end before editing waypoints")]
    EndpointsRequired,
    /// A route operation was attempted without a selected route
    #[error("no route is selected")]
    NoRouteSelected,
    /// An area operation was attempted without a selected area
    #[error("no area is selected")]
    NoAreaSelected,
}

/// A validation error attached to the field that caused it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// Offending field
    pub field: FieldRef,
    /// What is wrong with it
    pub error: ValidationError,
}

impl ValidationIssue {
    /// Human-readable reason for display.
    pub fn reason(&self) -> String {
        self.error.to_string()
    }
}

/// Receives validation results for presentation.
pub trait ValidationFeedback {
    /// Marks `field` as invalid for `reason`.
    fn report(&mut self, field: FieldRef, reason: &str);
    /// Clears any feedback shown for `field`.
    fn clear(&mut self, field: FieldRef);
}

/// Feedback collaborator that keeps the current message per field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IssueBoard {
    messages: BTreeMap<FieldRef, String>,
}

impl IssueBoard {
    /// Creates an empty board.
    pub fn new() -> Self {
        Self::default()
    }

    /// Message currently attached to `field`.
    pub fn message(&self, field: FieldRef) -> Option<&str> {
        self.messages.get(&field).map(String::as_str)
    }

    /// All messages ordered by field.
    pub fn messages(&self) -> impl Iterator<Item = (&FieldRef, &String)> {
        self.messages.iter()
    }

    /// Whether no field has feedback.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Drops every message.
    pub fn clear_all(&mut self) {
        self.messages.clear();
    }
}

impl ValidationFeedback for IssueBoard {
    fn report(&mut self, field: FieldRef, reason: &str) {
        self.messages.insert(field, reason.to_string());
    }

    fn clear(&mut self, field: FieldRef) {
        self.messages.remove(&field);
    }
}

/// Point ids and spot names a route endpoint can resolve against.
#[derive(Debug, Clone, Default)]
pub struct Referents<'a> {
    /// Non-empty point ids
    pub point_ids: Vec<&'a str>,
    /// Non-empty spot names
    pub spot_names: Vec<&'a str>,
}

impl<'a> Referents<'a> {
    /// Collects the non-empty labels of both stores.
    pub fn from_stores(points: &'a PointStore, spots: &'a SpotStore) -> Self {
        Self {
            point_ids: points.labels().filter(|l| !l.is_empty()).collect(),
            spot_names: spots.labels().filter(|l| !l.is_empty()).collect(),
        }
    }

    /// Whether `text` exactly names a point or a spot.
    pub fn contains(&self, text: &str) -> bool {
        self.point_ids.iter().any(|id| *id == text) || self.spot_names.iter().any(|name| *name == text)
    }

    /// Spot names whose normalized form contains `normalized`, without duplicates.
    fn partial_spot_matches(&self, normalized: &str) -> Vec<String> {
        let mut matches: Vec<String> = Vec::new();
        for name in &self.spot_names {
            if normalize(name).contains(normalized) && !matches.iter().any(|m| m == name) {
                matches.push(name.to_string());
            }
        }
        matches
    }
}

/// Outcome of resolving committed endpoint text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointResolution {
    /// The field is empty
    Empty,
    /// Exactly one spot matched; holds its exact name
    Spot(String),
    /// The text was coerced into the `LETTER-NN` form
    Coerced(String),
    /// A point id matched case-insensitively; holds its exact id
    Point(String),
    /// Several spots matched; the raw text is kept verbatim
    Ambiguous {
        /// Text as typed
        raw: String,
        /// Every matching spot name
        candidates: Vec<String>,
    },
    /// Nothing matched; the raw text is kept verbatim
    Unmatched(String),
}

impl EndpointResolution {
    /// The text to store in the route field.
    pub fn text(&self) -> &str {
        match self {
            EndpointResolution::Empty => "",
            EndpointResolution::Spot(text)
            | EndpointResolution::Coerced(text)
            | EndpointResolution::Point(text)
            | EndpointResolution::Unmatched(text) => text,
            EndpointResolution::Ambiguous { raw, .. } => raw,
        }
    }
}

/// Trims and uppercases ASCII letters.
pub fn normalize(text: &str) -> String {
    text.trim().to_ascii_uppercase()
}

/// Coerces loosely formatted labels such as `a1`, `B 7` or `c-12` into `LETTER-NN`.
pub fn coerce_label(text: &str) -> Option<String> {
    let normalized = normalize(text);
    let caps = LOOSE_LABEL.captures(&normalized)?;
    let letter = caps.get(1)?.as_str();
    let number: u32 = caps.get(2)?.as_str().parse().ok()?;
    Some(format!("{letter}-{number:02}"))
}

/// Whether `text` already has the strict `LETTER-NN` form.
pub fn is_canonical_label(text: &str) -> bool {
    CANONICAL_LABEL.is_match(text)
}

/// Resolves committed endpoint text against the referents.
///
/// Resolution order: a case-insensitive exact spot name, then a unique partial
/// spot match. Several partial matches are ambiguous and keep the raw text.
/// Without any spot match, a case-insensitive point id wins, then loose format
/// coercion; anything else is kept verbatim for validation to flag.
pub fn resolve_endpoint(raw: &str, referents: &Referents<'_>) -> EndpointResolution {
    let normalized = normalize(raw);
    if normalized.is_empty() {
        return EndpointResolution::Empty;
    }

    if let Some(name) = referents
        .spot_names
        .iter()
        .find(|name| normalize(name) == normalized)
    {
        return EndpointResolution::Spot(name.to_string());
    }

    let mut matches = referents.partial_spot_matches(&normalized);
    match matches.len() {
        0 => {}
        1 => return EndpointResolution::Spot(matches.remove(0)),
        _ => {
            log::debug!("Endpoint \"{}\" is ambiguous: {:?}", raw, matches);
            return EndpointResolution::Ambiguous {
                raw: raw.to_string(),
                candidates: matches,
            };
        }
    }

    if let Some(id) = referents
        .point_ids
        .iter()
        .find(|id| normalize(id) == normalized)
    {
        return EndpointResolution::Point(id.to_string());
    }

    match coerce_label(&normalized) {
        Some(label) => EndpointResolution::Coerced(label),
        None => EndpointResolution::Unmatched(raw.to_string()),
    }
}

/// Checks both endpoints of a route.
///
/// A non-empty endpoint must exactly name a point or a spot, and the two
/// endpoints must differ.
pub fn validate_endpoints(
    route: &Route,
    route_index: usize,
    referents: &Referents<'_>,
) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    for (endpoint, text) in [
        (Endpoint::Start, route.start_ref.as_str()),
        (Endpoint::End, route.end_ref.as_str()),
    ] {
        if text.is_empty() || referents.contains(text) {
            continue;
        }
        let candidates = referents.partial_spot_matches(&normalize(text));
        let error = if candidates.len() > 1 {
            ValidationError::AmbiguousReference {
                text: text.to_string(),
                candidates,
            }
        } else {
            ValidationError::UnresolvedEndpoint {
                text: text.to_string(),
            }
        };
        issues.push(ValidationIssue {
            field: FieldRef::route(endpoint, route_index),
            error,
        });
    }

    if !route.start_ref.is_empty() && route.start_ref == route.end_ref {
        for endpoint in [Endpoint::Start, Endpoint::End] {
            let field = FieldRef::route(endpoint, route_index);
            if issues.iter().any(|issue| issue.field == field) {
                continue;
            }
            issues.push(ValidationIssue {
                field,
                error: ValidationError::IdenticalEndpoints {
                    text: route.start_ref.clone(),
                },
            });
        }
    }
    issues
}

/// Reports every entity whose non-empty label is shared with another entity.
pub fn validate_labels<T: StoredEntity>(store: &EntityStore<T>) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    for group in store.duplicate_groups() {
        for index in group {
            let (Some(field), Some(item)) = (FieldRef::label_of(T::KIND, index), store.get(index))
            else {
                continue;
            };
            issues.push(ValidationIssue {
                field,
                error: ValidationError::DuplicateLabel {
                    kind: T::KIND,
                    label: item.label().to_string(),
                },
            });
        }
    }
    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CanvasPos;

    fn referents<'a>(points: &[&'a str], spots: &[&'a str]) -> Referents<'a> {
        Referents {
            point_ids: points.to_vec(),
            spot_names: spots.to_vec(),
        }
    }

    #[test]
    fn test_partial_match_on_two_spots_is_ambiguous() {
        let refs = referents(&[], &["GateA", "GateB"]);
        match resolve_endpoint("Gate", &refs) {
            EndpointResolution::Ambiguous { raw, candidates } => {
                assert_eq!(raw, "Gate");
                assert_eq!(candidates, vec!["GateA".to_string(), "GateB".to_string()]);
            }
            other => panic!("expected ambiguity, got {other:?}"),
        }
    }

    #[test]
    fn test_full_name_is_an_exact_match() {
        let refs = referents(&[], &["GateA", "GateB"]);
        assert_eq!(
            resolve_endpoint("GateA", &refs),
            EndpointResolution::Spot("GateA".into())
        );
        assert_eq!(
            resolve_endpoint("  gatea ", &refs),
            EndpointResolution::Spot("GateA".into())
        );
    }

    #[test]
    fn test_exact_name_wins_over_longer_partial_matches() {
        let refs = referents(&[], &["Gate", "GateA"]);
        assert_eq!(
            resolve_endpoint("gate", &refs),
            EndpointResolution::Spot("Gate".into())
        );
        assert_eq!(
            resolve_endpoint("GATEA", &refs),
            EndpointResolution::Spot("GateA".into())
        );

        // A prefix of both names is still ambiguous
        match resolve_endpoint("gat", &refs) {
            EndpointResolution::Ambiguous { candidates, .. } => {
                assert_eq!(candidates, vec!["Gate".to_string(), "GateA".to_string()]);
            }
            other => panic!("expected ambiguity, got {other:?}"),
        }
    }

    #[test]
    fn test_unique_partial_match_adopts_spot_name() {
        let refs = referents(&[], &["North Dock", "GateA"]);
        assert_eq!(
            resolve_endpoint("dock", &refs),
            EndpointResolution::Spot("North Dock".into())
        );
    }

    #[test]
    fn test_format_coercion_without_spots() {
        let refs = referents(&["A-01", "B-02"], &[]);
        assert_eq!(
            resolve_endpoint("a1", &refs),
            EndpointResolution::Coerced("A-01".into())
        );
        assert_eq!(
            resolve_endpoint("b 2", &refs),
            EndpointResolution::Coerced("B-02".into())
        );
    }

    #[test]
    fn test_point_id_matches_case_insensitively() {
        let refs = referents(&["Tower"], &[]);
        assert_eq!(
            resolve_endpoint("tower", &refs),
            EndpointResolution::Point("Tower".into())
        );
    }

    #[test]
    fn test_unmatched_text_is_kept_verbatim() {
        let refs = referents(&["A-01"], &["Gate"]);
        assert_eq!(
            resolve_endpoint("Warehouse 9", &refs),
            EndpointResolution::Unmatched("Warehouse 9".into())
        );
        assert_eq!(resolve_endpoint("   ", &refs), EndpointResolution::Empty);
    }

    #[test]
    fn test_coerce_label_variants() {
        assert_eq!(coerce_label("a1").as_deref(), Some("A-01"));
        assert_eq!(coerce_label("C-12").as_deref(), Some("C-12"));
        assert_eq!(coerce_label("d_7").as_deref(), Some("D-07"));
        assert_eq!(coerce_label("AB1"), None);
        assert_eq!(coerce_label("A123"), None);
        assert!(is_canonical_label("A-01"));
        assert!(!is_canonical_label("A-1"));
    }

    #[test]
    fn test_validate_endpoints_flags_unknown_and_identical() {
        let refs = referents(&["A-01"], &["GateA", "GateB"]);
        let mut route = Route::new("R");
        route.start_ref = "A-01".into();
        route.end_ref = "Gate".into();

        let issues = validate_endpoints(&route, 3, &refs);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].field, FieldRef::RouteEnd(3));
        assert!(matches!(
            issues[0].error,
            ValidationError::AmbiguousReference { .. }
        ));

        route.end_ref = "A-01".into();
        let issues = validate_endpoints(&route, 3, &refs);
        assert_eq!(issues.len(), 2);
        assert!(issues
            .iter()
            .all(|i| matches!(i.error, ValidationError::IdenticalEndpoints { .. })));

        route.end_ref = "Nowhere".into();
        let issues = validate_endpoints(&route, 3, &refs);
        assert_eq!(
            issues[0].error,
            ValidationError::UnresolvedEndpoint {
                text: "Nowhere".into()
            }
        );
    }

    #[test]
    fn test_validate_labels_reports_each_duplicate() {
        let mut spots = SpotStore::new();
        spots.add(CanvasPos::new(0, 0), "Gate");
        spots.add(CanvasPos::new(5, 5), "Dock");
        spots.add(CanvasPos::new(9, 9), "Gate");

        let issues = validate_labels(&spots);
        let fields: Vec<FieldRef> = issues.iter().map(|i| i.field).collect();
        assert_eq!(fields, vec![FieldRef::SpotName(0), FieldRef::SpotName(2)]);
        assert_eq!(
            issues[0].reason(),
            "spot label \"Gate\" is used more than once"
        );
    }

    #[test]
    fn test_issue_board_tracks_latest_message() {
        let mut board = IssueBoard::new();
        board.report(FieldRef::PointId(1), "first");
        board.report(FieldRef::PointId(1), "second");
        assert_eq!(board.message(FieldRef::PointId(1)), Some("second"));
        board.clear(FieldRef::PointId(1));
        assert!(board.is_empty());
    }
}
