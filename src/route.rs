//! Route collection, selection and waypoint editing.
//!
//! A route connects two referents (point ids or spot names) and carries an
//! ordered list of waypoints. Waypoints can only be edited once both endpoints
//! are set; changing an endpoint of a route that already has waypoints needs
//! the caller's confirmation and clears them.

use crate::events::{BusEvent, EventBus, SyncHint};
use crate::types::{CanvasPos, Route, Waypoint};
use crate::validation::{
    resolve_endpoint, validate_endpoints, Endpoint, EndpointResolution, Referents,
    ValidationError, ValidationIssue,
};

/// Progress of a route towards accepting waypoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteState {
    /// No start referent yet (an end-only route is also reported as empty)
    Empty,
    /// Start set, end missing
    StartSet,
    /// Both referents set; waypoints are editable
    BothSet,
}

impl Route {
    /// Current state derived from the endpoint fields.
    pub fn state(&self) -> RouteState {
        match (self.start_ref.is_empty(), self.end_ref.is_empty()) {
            (true, _) => RouteState::Empty,
            (false, true) => RouteState::StartSet,
            (false, false) => RouteState::BothSet,
        }
    }

    /// Whether waypoints may be added, moved or removed.
    pub fn accepts_waypoints(&self) -> bool {
        self.state() == RouteState::BothSet
    }

    /// The text of one endpoint field.
    pub fn endpoint(&self, endpoint: Endpoint) -> &str {
        match endpoint {
            Endpoint::Start => &self.start_ref,
            Endpoint::End => &self.end_ref,
        }
    }

    fn endpoint_mut(&mut self, endpoint: Endpoint) -> &mut String {
        match endpoint {
            Endpoint::Start => &mut self.start_ref,
            Endpoint::End => &mut self.end_ref,
        }
    }
}

/// Notifications raised by [`RouteModel`].
#[derive(Debug, Clone, PartialEq)]
pub enum RouteEvent {
    /// Routes were added, removed, renamed or had an endpoint changed
    RoutesChanged {
        /// Number of routes after the change
        count: usize,
    },
    /// The selection changed; `None` means no route is selected
    SelectionChanged {
        /// Newly selected index
        index: Option<usize>,
    },
    /// A selection was requested while no route exists
    NoRouteAvailable,
    /// The waypoints of a route changed
    WaypointsChanged {
        /// Route index
        route: usize,
        /// Whether widgets must be rebuilt
        hint: SyncHint,
    },
}

/// Discriminant of [`RouteEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteEventKind {
    /// See [`RouteEvent::RoutesChanged`]
    RoutesChanged,
    /// See [`RouteEvent::SelectionChanged`]
    SelectionChanged,
    /// See [`RouteEvent::NoRouteAvailable`]
    NoRouteAvailable,
    /// See [`RouteEvent::WaypointsChanged`]
    WaypointsChanged,
}

impl BusEvent for RouteEvent {
    type Kind = RouteEventKind;

    fn kind(&self) -> RouteEventKind {
        match self {
            RouteEvent::RoutesChanged { .. } => RouteEventKind::RoutesChanged,
            RouteEvent::SelectionChanged { .. } => RouteEventKind::SelectionChanged,
            RouteEvent::NoRouteAvailable => RouteEventKind::NoRouteAvailable,
            RouteEvent::WaypointsChanged { .. } => RouteEventKind::WaypointsChanged,
        }
    }
}

/// Result of changing an endpoint field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointOutcome {
    /// The field was written
    Applied {
        /// Whether existing waypoints were dropped
        cleared_waypoints: bool,
    },
    /// The new text equals the current text
    Unchanged,
    /// The caller declined dropping the waypoints; nothing changed
    Declined,
    /// The route index does not exist
    InvalidIndex,
}

/// Result of committing endpoint text.
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointCommit {
    /// How the raw text was resolved
    pub resolution: EndpointResolution,
    /// Whether the field was written
    pub outcome: EndpointOutcome,
    /// Issues found when re-validating both endpoints
    pub issues: Vec<ValidationIssue>,
}

/// Route collection with a single selection.
#[derive(Debug, Default)]
pub struct RouteModel {
    routes: Vec<Route>,
    selected: Option<usize>,
    events: EventBus<RouteEvent>,
}

impl RouteModel {
    /// Creates an empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Listener registry for route notifications.
    pub fn events_mut(&mut self) -> &mut EventBus<RouteEvent> {
        &mut self.events
    }

    /// All routes.
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Route at `index`.
    pub fn get(&self, index: usize) -> Option<&Route> {
        self.routes.get(index)
    }

    /// Number of routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether there are no routes.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Selected index, only if it is valid for the current collection.
    pub fn selected_index(&self) -> Option<usize> {
        self.selected.filter(|&index| index < self.routes.len())
    }

    /// The selected route.
    pub fn selected(&self) -> Option<&Route> {
        self.selected_index().and_then(|index| self.routes.get(index))
    }

    /// Appends a route, selects it and returns its index.
    pub fn add_route(&mut self, route_name: impl Into<String>) -> usize {
        let mut route = Route::new(route_name);
        route.is_modified = true;
        self.routes.push(route);
        let index = self.routes.len() - 1;
        log::debug!("Added route #{}", index);
        self.emit_routes_changed();
        self.select(Some(index));
        index
    }

    /// Removes a route, keeping the selection pointed at the same route where possible.
    pub fn delete_route(&mut self, index: usize) -> Option<Route> {
        if index >= self.routes.len() {
            return None;
        }
        let previous = self.selected_index();
        let removed = self.routes.remove(index);
        self.selected = match previous {
            Some(selected) if selected == index => None,
            Some(selected) if selected > index => Some(selected - 1),
            other => other,
        };
        self.emit_routes_changed();
        if previous != self.selected_index() {
            self.events.emit(RouteEvent::SelectionChanged {
                index: self.selected_index(),
            });
        }
        Some(removed)
    }

    /// Renames a route. Returns `false` for an invalid index.
    pub fn rename_route(&mut self, index: usize, route_name: impl Into<String>) -> bool {
        let Some(route) = self.routes.get_mut(index) else {
            return false;
        };
        route.route_name = route_name.into();
        route.is_modified = true;
        self.emit_routes_changed();
        true
    }

    /// Replaces every route and clears the selection.
    pub fn replace_all(&mut self, mut routes: Vec<Route>) {
        for route in &mut routes {
            route.reindex_waypoints();
        }
        self.routes = routes;
        self.selected = None;
        self.emit_routes_changed();
        self.events.emit(RouteEvent::SelectionChanged { index: None });
    }

    /// Selects a route, or clears the selection with `None`.
    ///
    /// Selecting while the collection is empty raises
    /// [`RouteEvent::NoRouteAvailable`] instead; an out-of-range index clears
    /// the selection. Returns whether a route is selected afterwards.
    pub fn select(&mut self, index: Option<usize>) -> bool {
        if index.is_some() && self.routes.is_empty() {
            self.selected = None;
            self.events.emit(RouteEvent::NoRouteAvailable);
            return false;
        }
        self.selected = index.filter(|&i| i < self.routes.len());
        self.events.emit(RouteEvent::SelectionChanged {
            index: self.selected,
        });
        self.selected.is_some()
    }

    /// Sets the start referent. See [`RouteModel::set_endpoint`].
    pub fn set_start(
        &mut self,
        index: usize,
        text: impl Into<String>,
        confirm: impl FnOnce(&Route) -> bool,
    ) -> EndpointOutcome {
        self.set_endpoint(index, Endpoint::Start, text, confirm)
    }

    /// Sets the end referent. See [`RouteModel::set_endpoint`].
    pub fn set_end(
        &mut self,
        index: usize,
        text: impl Into<String>,
        confirm: impl FnOnce(&Route) -> bool,
    ) -> EndpointOutcome {
        self.set_endpoint(index, Endpoint::End, text, confirm)
    }

    /// Writes an endpoint field verbatim.
    ///
    /// When the route already has waypoints and the text changes, `confirm` is
    /// asked first; declining leaves the route untouched, confirming clears the
    /// waypoints.
    pub fn set_endpoint(
        &mut self,
        index: usize,
        endpoint: Endpoint,
        text: impl Into<String>,
        confirm: impl FnOnce(&Route) -> bool,
    ) -> EndpointOutcome {
        let text = text.into();
        let Some(route) = self.routes.get_mut(index) else {
            return EndpointOutcome::InvalidIndex;
        };
        if route.endpoint(endpoint) == text {
            return EndpointOutcome::Unchanged;
        }

        let cleared_waypoints = !route.waypoints.is_empty();
        if cleared_waypoints {
            if !confirm(route) {
                log::debug!("Endpoint change on route #{} declined", index);
                return EndpointOutcome::Declined;
            }
            route.waypoints.clear();
        }
        *route.endpoint_mut(endpoint) = text;
        route.is_modified = true;

        if cleared_waypoints {
            self.events.emit(RouteEvent::WaypointsChanged {
                route: index,
                hint: SyncHint::Full,
            });
        }
        self.emit_routes_changed();
        EndpointOutcome::Applied { cleared_waypoints }
    }

    /// Resolves committed endpoint text, stores it and re-validates both endpoints.
    pub fn commit_endpoint(
        &mut self,
        index: usize,
        endpoint: Endpoint,
        raw: &str,
        referents: &Referents<'_>,
        confirm: impl FnOnce(&Route) -> bool,
    ) -> EndpointCommit {
        let resolution = resolve_endpoint(raw, referents);
        let outcome = self.set_endpoint(index, endpoint, resolution.text(), confirm);
        let issues = self
            .routes
            .get(index)
            .map(|route| validate_endpoints(route, index, referents))
            .unwrap_or_default();
        log::debug!(
            "Committed {:?} of route #{}: {:?} -> {:?}",
            endpoint,
            index,
            raw,
            resolution.text()
        );
        EndpointCommit {
            resolution,
            outcome,
            issues,
        }
    }

    /// Appends a waypoint to the selected route.
    ///
    /// Rejected without a selection or while an endpoint is empty.
    pub fn add_waypoint(&mut self, pos: CanvasPos) -> Result<usize, ValidationError> {
        let route_index = self.editable_route()?;
        let route = &mut self.routes[route_index];
        let index = route.waypoints.len();
        route.waypoints.push(Waypoint {
            x: pos.x,
            y: pos.y,
            index,
        });
        route.is_modified = true;
        self.emit_waypoints_changed(route_index, SyncHint::Full);
        Ok(index)
    }

    /// Moves a waypoint of the selected route. Returns whether a write happened.
    pub fn update_waypoint(&mut self, index: usize, pos: CanvasPos, hint: SyncHint) -> bool {
        let Ok(route_index) = self.editable_route() else {
            return false;
        };
        let route = &mut self.routes[route_index];
        let Some(waypoint) = route.waypoints.get_mut(index) else {
            return false;
        };
        waypoint.x = pos.x;
        waypoint.y = pos.y;
        route.is_modified = true;
        self.emit_waypoints_changed(route_index, hint);
        true
    }

    /// Removes a waypoint of the selected route and re-sequences the rest.
    pub fn remove_waypoint(&mut self, index: usize) -> Option<Waypoint> {
        let route_index = self.editable_route().ok()?;
        let route = &mut self.routes[route_index];
        if index >= route.waypoints.len() {
            return None;
        }
        let removed = route.waypoints.remove(index);
        route.reindex_waypoints();
        route.is_modified = true;
        self.emit_waypoints_changed(route_index, SyncHint::Full);
        Some(removed)
    }

    /// Removes several waypoints of the selected route. Returns how many were removed.
    pub fn remove_waypoints(&mut self, indices: &[usize]) -> usize {
        let Ok(route_index) = self.editable_route() else {
            return 0;
        };
        let route = &mut self.routes[route_index];
        let mut sorted: Vec<usize> = indices
            .iter()
            .copied()
            .filter(|&i| i < route.waypoints.len())
            .collect();
        sorted.sort_unstable();
        sorted.dedup();
        for &index in sorted.iter().rev() {
            route.waypoints.remove(index);
        }
        if sorted.is_empty() {
            return 0;
        }
        route.reindex_waypoints();
        route.is_modified = true;
        self.emit_waypoints_changed(route_index, SyncHint::Full);
        sorted.len()
    }

    /// Index of the waypoint of the selected route closest to `pos`, within `max_distance`.
    pub fn find_nearest(&self, pos: egui::Pos2, max_distance: f32) -> Option<usize> {
        let route = self.selected()?;
        route
            .waypoints
            .iter()
            .map(|w| (w.index, w.pos().distance_to(pos)))
            .filter(|&(_, distance)| distance <= max_distance)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(index, _)| index)
    }

    /// Lowest-index waypoint of the selected route within `radius` of `pos`.
    pub fn find_waypoint_at(&self, pos: egui::Pos2, radius: f32) -> Option<usize> {
        self.selected()?
            .waypoints
            .iter()
            .position(|w| w.pos().distance_to(pos) <= radius)
    }

    /// Waypoints of the selected route inside the box spanned by two corners.
    ///
    /// Corners may be given in any order; bounds are inclusive.
    pub fn find_within_rectangle(&self, corner_a: egui::Pos2, corner_b: egui::Pos2) -> Vec<usize> {
        let Some(route) = self.selected() else {
            return Vec::new();
        };
        let bounds = egui::Rect::from_two_pos(corner_a, corner_b);
        route
            .waypoints
            .iter()
            .filter(|w| {
                let p = w.pos().to_pos2();
                p.x >= bounds.min.x && p.x <= bounds.max.x && p.y >= bounds.min.y && p.y <= bounds.max.y
            })
            .map(|w| w.index)
            .collect()
    }

    /// Records the handle of the persisted copy of a route.
    pub fn set_external_ref(&mut self, index: usize, external_ref: Option<String>) -> bool {
        let Some(route) = self.routes.get_mut(index) else {
            return false;
        };
        route.external_ref = external_ref;
        true
    }

    /// Clears the modified flag after a successful save.
    pub fn mark_saved(&mut self, index: usize) -> bool {
        let Some(route) = self.routes.get_mut(index) else {
            return false;
        };
        route.is_modified = false;
        true
    }

    /// Indices of routes changed since they were last saved.
    pub fn modified_routes(&self) -> Vec<usize> {
        self.routes
            .iter()
            .enumerate()
            .filter(|(_, route)| route.is_modified)
            .map(|(index, _)| index)
            .collect()
    }

    fn editable_route(&self) -> Result<usize, ValidationError> {
        let index = self.selected_index().ok_or(ValidationError::NoRouteSelected)?;
        if self.routes[index].accepts_waypoints() {
            Ok(index)
        } else {
            Err(ValidationError::EndpointsRequired)
        }
    }

    fn emit_routes_changed(&mut self) {
        self.events.emit(RouteEvent::RoutesChanged {
            count: self.routes.len(),
        });
    }

    fn emit_waypoints_changed(&mut self, route: usize, hint: SyncHint) {
        self.events.emit(RouteEvent::WaypointsChanged { route, hint });
    }
}
