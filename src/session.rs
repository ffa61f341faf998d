//! The editing session: one context object owning every model.
//!
//! [`EditorSession`] is what the shell talks to. Pointer input arrives here
//! already converted to canvas space; the session hit-tests, drives the drag
//! controller or creates entities according to the current [`EditMode`], and
//! queues persistence operations for the shell to run.

use crate::area::{AreaEvent, AreaModel};
use crate::constants::WAYPOINT_PICK_DISTANCE;
use crate::drag::{DragController, DragOutcome, DragTargets};
use crate::events::{EventBus, SyncHint};
use crate::hit_test::{Hit, HitLayers, HitTester};
use crate::persistence::{DuplicateConflict, PersistenceOp, PersistenceResult, Record, RecordKind};
use crate::route::{EndpointCommit, EndpointOutcome, RouteEvent, RouteModel};
use crate::store::{EntityStore, EntityUpdate, PointStore, SpotStore, StoredEntity};
use crate::transform::{ImageFrame, PanDirection, Viewport, ZoomDirection};
use crate::types::{Annotations, Area, CanvasPos, EditMode, EntityKind, Point, Route, Spot};
use crate::validation::{
    coerce_label, validate_endpoints, validate_labels, Endpoint, FieldRef, Referents,
    ValidationError, ValidationFeedback, ValidationIssue,
};

/// What a pointer press did.
#[derive(Debug, Clone, PartialEq)]
pub enum PointerDown {
    /// An existing entity was armed for dragging
    Grabbed(Hit),
    /// A new entity was created at the pointer
    Created(Hit),
    /// A press inside an area selected it
    AreaSelected(usize),
    /// Creation was refused
    Rejected(ValidationError),
}

/// What a pointer release did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerUp {
    /// Nothing was held
    Idle,
    /// The held entity was released without crossing the drag threshold
    Clicked(Hit),
    /// The held entity was moved; `index` is its final index
    Moved(DragOutcome),
}

/// Everything a renderer needs for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderSnapshot {
    /// All annotations in canvas space
    pub annotations: Annotations,
    /// Selected route
    pub selected_route: Option<usize>,
    /// Selected area
    pub selected_area: Option<usize>,
    /// Entity last clicked, created or moved
    pub selection: Option<Hit>,
    /// Waypoints of the selected route picked with a selection box
    pub selected_waypoints: Vec<usize>,
    /// Current zoom and pan
    pub viewport: Viewport,
    /// Current edit mode
    pub mode: EditMode,
}

/// Label of a point or spot before and after a commit.
struct LabelChange<T> {
    previous: String,
    /// `None` when the entity was removed
    current: Option<T>,
}

/// Editing session state.
#[derive(Debug, Default)]
pub struct EditorSession {
    mode: EditMode,
    viewport: Viewport,
    frame: ImageFrame,
    points: PointStore,
    spots: SpotStore,
    routes: RouteModel,
    areas: AreaModel,
    drag: DragController,
    hit_tester: HitTester,
    selection: Option<Hit>,
    selected_waypoints: Vec<usize>,
    pending: Vec<PersistenceOp>,
}

impl EditorSession {
    /// Creates an empty session in point mode.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a session with custom hit radii.
    pub fn with_hit_tester(hit_tester: HitTester) -> Self {
        Self {
            hit_tester,
            ..Self::default()
        }
    }

    // --- accessors ---

    /// Current edit mode.
    pub fn mode(&self) -> EditMode {
        self.mode
    }

    /// Switches the edit mode, aborting any drag in progress.
    pub fn set_mode(&mut self, mode: EditMode) {
        if mode == self.mode {
            return;
        }
        self.cancel_drag();
        self.selection = None;
        self.selected_waypoints.clear();
        log::debug!("Edit mode: {:?} -> {:?}", self.mode, mode);
        self.mode = mode;
    }

    /// Current viewport.
    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    /// Mutable viewport, for drag-to-pan and restoring saved views.
    pub fn viewport_mut(&mut self) -> &mut Viewport {
        &mut self.viewport
    }

    /// One zoom step around the viewport origin.
    pub fn zoom(&mut self, direction: ZoomDirection) -> bool {
        self.viewport.zoom(direction)
    }

    /// One zoom step keeping the canvas point under `anchor` in place.
    pub fn zoom_at(&mut self, anchor: egui::Pos2, direction: ZoomDirection) -> bool {
        self.viewport.zoom_at(anchor, direction)
    }

    /// One pan step.
    pub fn pan(&mut self, direction: PanDirection) -> bool {
        self.viewport.pan(direction)
    }

    /// Canvas and image dimensions used at the storage boundary.
    pub fn frame(&self) -> ImageFrame {
        self.frame
    }

    /// Replaces the frame after loading an image.
    pub fn set_frame(&mut self, frame: ImageFrame) {
        self.frame = frame;
    }

    /// Labeled points.
    pub fn points(&self) -> &PointStore {
        &self.points
    }

    /// Named spots.
    pub fn spots(&self) -> &SpotStore {
        &self.spots
    }

    /// Routes.
    pub fn routes(&self) -> &RouteModel {
        &self.routes
    }

    /// Areas.
    pub fn areas(&self) -> &AreaModel {
        &self.areas
    }

    /// Drag controller, for registering completion callbacks.
    pub fn drag_mut(&mut self) -> &mut DragController {
        &mut self.drag
    }

    /// Whether an entity is armed or being dragged.
    pub fn is_dragging(&self) -> bool {
        self.drag.is_active()
    }

    /// Installs the point change listener.
    pub fn on_points_changed(&mut self, listener: impl FnMut(&[Point], SyncHint) + 'static) {
        self.points.on_change(listener);
    }

    /// Installs the spot change listener.
    pub fn on_spots_changed(&mut self, listener: impl FnMut(&[Spot], SyncHint) + 'static) {
        self.spots.on_change(listener);
    }

    /// Route notification registry.
    pub fn route_events_mut(&mut self) -> &mut EventBus<RouteEvent> {
        self.routes.events_mut()
    }

    /// Area notification registry.
    pub fn area_events_mut(&mut self) -> &mut EventBus<AreaEvent> {
        self.areas.events_mut()
    }

    /// Entity last clicked, created or moved.
    pub fn selection(&self) -> Option<Hit> {
        self.selection
    }

    /// Waypoints picked with [`EditorSession::select_waypoints_within`].
    pub fn selected_waypoints(&self) -> &[usize] {
        &self.selected_waypoints
    }

    /// Takes every queued persistence operation.
    pub fn take_pending_ops(&mut self) -> Vec<PersistenceOp> {
        std::mem::take(&mut self.pending)
    }

    /// Number of queued persistence operations.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    // --- pointer flow ---

    /// Handles a primary press at a canvas-space position.
    ///
    /// An entity under the pointer is armed for dragging. Otherwise the mode
    /// decides: point and spot modes create an unlabeled entity, route mode
    /// appends a waypoint to the selected route, area mode appends a vertex to
    /// the selected area or selects the area under the pointer.
    pub fn pointer_down(&mut self, pos: egui::Pos2) -> PointerDown {
        if self.drag.is_active() {
            // Press without a matching release
            let (drag, mut targets) = self.split_drag();
            drag.end_drag(&mut targets);
        }

        let grabbed = {
            let layers = self.layers();
            self.hit_tester
                .hit(pos, self.mode, layers)
                .and_then(|hit| layers.position_of(hit).map(|entity_pos| (hit, entity_pos)))
        };
        if let Some((hit, entity_pos)) = grabbed {
            self.drag.start_drag(hit.kind, hit.index, pos, entity_pos);
            return PointerDown::Grabbed(hit);
        }

        let at = CanvasPos::from_pos2(pos);
        let created = match self.mode {
            EditMode::Point => Ok(Hit::new(EntityKind::Point, self.points.add(at, ""))),
            EditMode::Spot => Ok(Hit::new(EntityKind::Spot, self.spots.add(at, ""))),
            EditMode::Route => self.routes.add_waypoint(at).map(|index| {
                self.queue_selected_route();
                Hit::new(EntityKind::Waypoint, index)
            }),
            EditMode::Area => match self.areas.add_vertex(at) {
                Ok(index) => {
                    self.queue_selected_area();
                    Ok(Hit::new(EntityKind::AreaVertex, index))
                }
                Err(error) => match self.areas.find_area_containing(pos) {
                    Some(area) => {
                        self.select_area(Some(area));
                        return PointerDown::AreaSelected(area);
                    }
                    None => Err(error),
                },
            },
        };

        match created {
            Ok(hit) => {
                self.selection = Some(hit);
                self.selected_waypoints.clear();
                PointerDown::Created(hit)
            }
            Err(error) => {
                log::debug!("Rejected {:?} click: {}", self.mode, error);
                PointerDown::Rejected(error)
            }
        }
    }

    /// Handles pointer motion. Returns whether an entity moved.
    pub fn pointer_move(&mut self, pos: egui::Pos2) -> bool {
        let (drag, mut targets) = self.split_drag();
        drag.update_drag(pos, &mut targets)
    }

    /// Handles the primary release.
    ///
    /// A release without travel is a click. A moved area vertex is reinserted
    /// into the outline and the moved entity is queued for persistence.
    pub fn pointer_up(&mut self, pos: egui::Pos2) -> PointerUp {
        if !self.drag.is_active() {
            return PointerUp::Idle;
        }
        self.pointer_move(pos);

        let (drag, mut targets) = self.split_drag();
        let Some(outcome) = drag.end_drag(&mut targets) else {
            return PointerUp::Idle;
        };

        if !outcome.has_moved {
            let hit = Hit::new(outcome.kind, outcome.index);
            self.selection = Some(hit);
            self.selected_waypoints.clear();
            return PointerUp::Clicked(hit);
        }

        let index = match outcome.kind {
            EntityKind::AreaVertex => self
                .areas
                .reorder_vertices(outcome.index)
                .unwrap_or(outcome.index),
            _ => outcome.index,
        };
        self.selection = Some(Hit::new(outcome.kind, index));
        self.queue_moved(outcome.kind, index);
        PointerUp::Moved(DragOutcome { index, ..outcome })
    }

    /// Aborts a drag, restoring the entity's position.
    pub fn cancel_drag(&mut self) -> bool {
        let (drag, mut targets) = self.split_drag();
        drag.cancel_drag(&mut targets)
    }

    /// Picks the selected route's waypoints inside a box. Returns how many were picked.
    pub fn select_waypoints_within(&mut self, corner_a: egui::Pos2, corner_b: egui::Pos2) -> usize {
        self.selected_waypoints = self.routes.find_within_rectangle(corner_a, corner_b);
        self.selection = None;
        self.selected_waypoints.len()
    }

    /// Removes the selected route's waypoint nearest to `pos`, if one is close enough.
    pub fn remove_nearest_waypoint(&mut self, pos: egui::Pos2) -> Option<usize> {
        let index = self.routes.find_nearest(pos, WAYPOINT_PICK_DISTANCE)?;
        self.routes.remove_waypoint(index)?;
        self.selected_waypoints.clear();
        self.selection = None;
        self.queue_selected_route();
        Some(index)
    }

    /// Deletes the picked waypoints, or else the selected entity.
    ///
    /// Returns whether anything was removed.
    pub fn delete_selection(&mut self) -> bool {
        if !self.selected_waypoints.is_empty() {
            let indices = std::mem::take(&mut self.selected_waypoints);
            let removed = self.routes.remove_waypoints(&indices);
            if removed > 0 {
                self.queue_selected_route();
            }
            return removed > 0;
        }
        match self.selection.take() {
            Some(hit) => self.delete_entity(hit),
            None => false,
        }
    }

    /// Deletes one entity. Out-of-range indices are ignored.
    pub fn delete_entity(&mut self, hit: Hit) -> bool {
        match hit.kind {
            EntityKind::Point => match self.points.remove(hit.index) {
                Some(point) => {
                    self.forget_removed(hit);
                    self.queue_delete(RecordKind::Point, point.id);
                    true
                }
                None => false,
            },
            EntityKind::Spot => match self.spots.remove(hit.index) {
                Some(spot) => {
                    self.forget_removed(hit);
                    self.queue_delete(RecordKind::Spot, spot.name);
                    true
                }
                None => false,
            },
            EntityKind::Waypoint => {
                let removed = self.routes.remove_waypoint(hit.index).is_some();
                if removed {
                    self.forget_removed(hit);
                    self.queue_selected_route();
                }
                removed
            }
            EntityKind::AreaVertex => {
                let removed = self.areas.remove_vertex(hit.index).is_some();
                if removed {
                    self.forget_removed(hit);
                    self.queue_selected_area();
                }
                removed
            }
        }
    }

    // --- field commits ---

    /// Commits a point id typed into the properties panel.
    ///
    /// Loosely formatted ids such as `a1` are stored as `A-01`. An empty id
    /// removes the point. Duplicate ids are reported to `feedback` but kept.
    pub fn commit_point_label(
        &mut self,
        index: usize,
        raw: &str,
        feedback: &mut dyn ValidationFeedback,
    ) -> Result<Vec<ValidationIssue>, ValidationError> {
        let trimmed = raw.trim();
        let label = coerce_label(trimmed).unwrap_or_else(|| trimmed.to_string());
        let (change, issues) = commit_label(&mut self.points, index, label, feedback)?;
        if let Some(change) = change {
            if change.current.is_none() {
                self.forget_removed(Hit::new(EntityKind::Point, index));
            }
            let frame = self.frame;
            self.queue_label_change(RecordKind::Point, change, |point| {
                Record::Point(point_in_image(point, &frame))
            });
        }
        Ok(issues)
    }

    /// Commits a spot name. An empty name removes the spot.
    pub fn commit_spot_name(
        &mut self,
        index: usize,
        raw: &str,
        feedback: &mut dyn ValidationFeedback,
    ) -> Result<Vec<ValidationIssue>, ValidationError> {
        let (change, issues) = commit_label(&mut self.spots, index, raw.trim().to_string(), feedback)?;
        if let Some(change) = change {
            if change.current.is_none() {
                self.forget_removed(Hit::new(EntityKind::Spot, index));
            }
            let frame = self.frame;
            self.queue_label_change(RecordKind::Spot, change, |spot| {
                Record::Spot(spot_in_image(spot, &frame))
            });
        }
        Ok(issues)
    }

    /// Commits route start or end text.
    ///
    /// The text is resolved against the current point ids and spot names.
    /// `confirm` is asked before waypoints would be dropped; see
    /// [`RouteModel::set_endpoint`]. Issues for both endpoints replace the
    /// route's previous feedback.
    pub fn commit_route_endpoint(
        &mut self,
        index: usize,
        endpoint: Endpoint,
        raw: &str,
        confirm: impl FnOnce(&Route) -> bool,
        feedback: &mut dyn ValidationFeedback,
    ) -> EndpointCommit {
        let referents = Referents::from_stores(&self.points, &self.spots);
        let commit = self
            .routes
            .commit_endpoint(index, endpoint, raw, &referents, confirm);

        for side in [Endpoint::Start, Endpoint::End] {
            feedback.clear(FieldRef::route(side, index));
        }
        for issue in &commit.issues {
            feedback.report(issue.field, &issue.reason());
        }
        if matches!(commit.outcome, EndpointOutcome::Applied { .. }) {
            self.queue_route(index);
        }
        commit
    }

    /// Re-runs every validation and replaces all feedback.
    pub fn validate_all(&self, feedback: &mut dyn ValidationFeedback) -> Vec<ValidationIssue> {
        let referents = Referents::from_stores(&self.points, &self.spots);
        let mut issues = validate_labels(&self.points);
        issues.extend(validate_labels(&self.spots));
        for (index, route) in self.routes.routes().iter().enumerate() {
            issues.extend(validate_endpoints(route, index, &referents));
        }

        for index in 0..self.points.len() {
            feedback.clear(FieldRef::PointId(index));
        }
        for index in 0..self.spots.len() {
            feedback.clear(FieldRef::SpotName(index));
        }
        for index in 0..self.routes.len() {
            feedback.clear(FieldRef::RouteStart(index));
            feedback.clear(FieldRef::RouteEnd(index));
        }
        for issue in &issues {
            feedback.report(issue.field, &issue.reason());
        }
        issues
    }

    // --- routes and areas ---

    /// Adds and selects a route.
    pub fn add_route(&mut self, route_name: &str) -> usize {
        let index = self.routes.add_route(route_name);
        self.selected_waypoints.clear();
        self.forget_kind(EntityKind::Waypoint);
        self.queue_route(index);
        index
    }

    /// Renames a route.
    pub fn rename_route(&mut self, index: usize, route_name: &str) -> bool {
        let renamed = self.routes.rename_route(index, route_name);
        if renamed {
            self.queue_route(index);
        }
        renamed
    }

    /// Deletes a route.
    pub fn delete_route(&mut self, index: usize) -> bool {
        let owned_selection = self.routes.selected_index() == Some(index);
        match self.routes.delete_route(index) {
            Some(route) => {
                if owned_selection {
                    self.selected_waypoints.clear();
                    self.forget_kind(EntityKind::Waypoint);
                }
                self.queue_delete(RecordKind::Route, route.route_name);
                true
            }
            None => false,
        }
    }

    /// Selects a route or clears the selection.
    pub fn select_route(&mut self, index: Option<usize>) -> bool {
        if index != self.routes.selected_index() {
            self.selected_waypoints.clear();
            self.forget_kind(EntityKind::Waypoint);
        }
        self.routes.select(index)
    }

    /// Adds and selects an area.
    pub fn add_area(&mut self, area_name: &str) -> usize {
        let index = self.areas.add_area(area_name);
        self.forget_kind(EntityKind::AreaVertex);
        self.queue_area(index);
        index
    }

    /// Renames an area.
    pub fn rename_area(&mut self, index: usize, area_name: &str) -> bool {
        let renamed = self.areas.rename_area(index, area_name);
        if renamed {
            self.queue_area(index);
        }
        renamed
    }

    /// Deletes an area.
    pub fn delete_area(&mut self, index: usize) -> bool {
        let owned_selection = self.areas.selected_index() == Some(index);
        match self.areas.delete_area(index) {
            Some(area) => {
                if owned_selection {
                    self.forget_kind(EntityKind::AreaVertex);
                }
                self.queue_delete(RecordKind::Area, area.area_name);
                true
            }
            None => false,
        }
    }

    /// Selects an area or clears the selection.
    pub fn select_area(&mut self, index: Option<usize>) -> bool {
        if index != self.areas.selected_index() {
            self.forget_kind(EntityKind::AreaVertex);
        }
        self.areas.select(index)
    }

    // --- persistence feedback ---

    /// Folds a finished persistence operation back into the models.
    ///
    /// Returns the conflict when creation hit an existing record so the shell
    /// can offer a choice.
    pub fn apply_persistence_result(
        &mut self,
        result: PersistenceResult,
    ) -> Option<DuplicateConflict> {
        match result {
            PersistenceResult::Added {
                kind: RecordKind::Route,
                key,
                handle,
            } => {
                let index = self
                    .routes
                    .routes()
                    .iter()
                    .position(|route| route.route_name == key && route.external_ref.is_none());
                if let Some(index) = index {
                    self.routes.set_external_ref(index, Some(handle));
                    self.routes.mark_saved(index);
                }
                None
            }
            PersistenceResult::Updated {
                kind: RecordKind::Route,
                key,
            } => {
                if let Some(index) = self
                    .routes
                    .routes()
                    .iter()
                    .position(|route| route.route_name == key)
                {
                    self.routes.mark_saved(index);
                }
                None
            }
            PersistenceResult::Added {
                kind: RecordKind::Area,
                key,
                handle,
            } => {
                let index = self
                    .areas
                    .areas()
                    .iter()
                    .position(|area| area.area_name == key && area.external_ref.is_none());
                if let Some(index) = index {
                    self.areas.set_external_ref(index, Some(handle));
                }
                None
            }
            PersistenceResult::Conflict(conflict) => {
                log::info!(
                    "A {} named \"{}\" is already stored",
                    conflict.attempted.kind(),
                    conflict.attempted.key()
                );
                Some(conflict)
            }
            _ => None,
        }
    }

    /// Resolves a conflict by overwriting the stored record.
    pub fn overwrite_conflict(&mut self, conflict: DuplicateConflict) {
        self.queue(PersistenceOp::Update(conflict.attempted));
    }

    // --- documents and rendering ---

    /// Snapshot of everything a renderer draws.
    pub fn snapshot(&self) -> RenderSnapshot {
        RenderSnapshot {
            annotations: self.annotations(),
            selected_route: self.routes.selected_index(),
            selected_area: self.areas.selected_index(),
            selection: self.selection,
            selected_waypoints: self.selected_waypoints.clone(),
            viewport: self.viewport,
            mode: self.mode,
        }
    }

    /// All annotations in canvas space.
    pub fn annotations(&self) -> Annotations {
        Annotations {
            points: self.points.items().to_vec(),
            spots: self.spots.items().to_vec(),
            routes: self.routes.routes().to_vec(),
            areas: self.areas.areas().to_vec(),
        }
    }

    /// Serializes the annotations in image space.
    pub fn export_document(&self) -> Result<String, serde_json::Error> {
        self.annotations().to_image_space(&self.frame).to_json()
    }

    /// Replaces every annotation from an image-space document.
    ///
    /// Parsing happens before anything is replaced, so a bad document leaves
    /// the session untouched.
    pub fn import_document(&mut self, json: &str) -> Result<(), serde_json::Error> {
        let document = Annotations::from_json(json)?.to_canvas_space(&self.frame);
        self.load(document);
        Ok(())
    }

    /// Replaces every annotation with canvas-space data.
    pub fn load(&mut self, annotations: Annotations) {
        self.cancel_drag();
        self.selection = None;
        self.selected_waypoints.clear();
        self.pending.clear();
        log::info!(
            "Loaded {} points, {} spots, {} routes, {} areas",
            annotations.points.len(),
            annotations.spots.len(),
            annotations.routes.len(),
            annotations.areas.len()
        );
        self.points.replace_all(annotations.points);
        self.spots.replace_all(annotations.spots);
        self.routes.replace_all(annotations.routes);
        self.areas.replace_all(annotations.areas);
    }

    // --- internals ---

    fn layers(&self) -> HitLayers<'_> {
        HitLayers {
            points: &self.points,
            spots: &self.spots,
            routes: &self.routes,
            areas: &self.areas,
        }
    }

    fn split_drag(&mut self) -> (&mut DragController, DragTargets<'_>) {
        (
            &mut self.drag,
            DragTargets {
                points: &mut self.points,
                spots: &mut self.spots,
                routes: &mut self.routes,
                areas: &mut self.areas,
            },
        )
    }

    fn queue(&mut self, op: PersistenceOp) {
        if op.key().trim().is_empty() {
            log::debug!("Not persisting unnamed {}", op.kind());
            return;
        }
        self.pending.push(op);
    }

    fn queue_delete(&mut self, kind: RecordKind, key: String) {
        self.queue(PersistenceOp::Delete { kind, key });
    }

    fn queue_moved(&mut self, kind: EntityKind, index: usize) {
        match kind {
            EntityKind::Point => {
                if let Some(point) = self.points.get(index) {
                    let record = Record::Point(point_in_image(point, &self.frame));
                    self.queue(PersistenceOp::Update(record));
                }
            }
            EntityKind::Spot => {
                if let Some(spot) = self.spots.get(index) {
                    let record = Record::Spot(spot_in_image(spot, &self.frame));
                    self.queue(PersistenceOp::Update(record));
                }
            }
            EntityKind::Waypoint => self.queue_selected_route(),
            EntityKind::AreaVertex => self.queue_selected_area(),
        }
    }

    fn queue_route(&mut self, index: usize) {
        if let Some(route) = self.routes.get(index) {
            let record = Record::Route(route_in_image(route, &self.frame));
            self.queue(PersistenceOp::Update(record));
        }
    }

    fn queue_selected_route(&mut self) {
        if let Some(index) = self.routes.selected_index() {
            self.queue_route(index);
        }
    }

    fn queue_area(&mut self, index: usize) {
        if let Some(area) = self.areas.get(index) {
            let record = Record::Area(area_in_image(area, &self.frame));
            self.queue(PersistenceOp::Update(record));
        }
    }

    fn queue_selected_area(&mut self) {
        if let Some(index) = self.areas.selected_index() {
            self.queue_area(index);
        }
    }

    /// Keeps the selection on the same entity after `removed` left its list.
    fn forget_removed(&mut self, removed: Hit) {
        self.selection = match self.selection {
            Some(hit) if hit.kind == removed.kind && hit.index == removed.index => None,
            Some(hit) if hit.kind == removed.kind && hit.index > removed.index => {
                Some(Hit::new(hit.kind, hit.index - 1))
            }
            other => other,
        };
    }

    /// Drops a selection of `kind`; used when its owning route or area changes.
    fn forget_kind(&mut self, kind: EntityKind) {
        if self.selection.is_some_and(|hit| hit.kind == kind) {
            self.selection = None;
        }
    }

    fn queue_label_change<T>(
        &mut self,
        kind: RecordKind,
        change: LabelChange<T>,
        to_record: impl Fn(&T) -> Record,
    ) {
        if !change.previous.trim().is_empty() {
            self.queue_delete(kind, change.previous);
        }
        if let Some(current) = change.current {
            self.queue(PersistenceOp::Create(to_record(&current)));
        }
    }
}

/// Applies a committed label and refreshes duplicate feedback for the store.
fn commit_label<T: StoredEntity>(
    store: &mut EntityStore<T>,
    index: usize,
    label: String,
    feedback: &mut dyn ValidationFeedback,
) -> Result<(Option<LabelChange<T>>, Vec<ValidationIssue>), ValidationError> {
    let previous = store
        .get(index)
        .ok_or(ValidationError::InvalidIndex {
            kind: T::KIND,
            index,
        })?
        .label()
        .to_string();
    let old_len = store.len();

    let change = if label.is_empty() {
        store.remove(index);
        log::debug!("Removed {} #{} with empty label", T::KIND, index);
        Some(LabelChange {
            previous,
            current: None,
        })
    } else if label == previous {
        None
    } else {
        store.update(index, EntityUpdate::Label(label), SyncHint::Full);
        Some(LabelChange {
            previous,
            current: store.get(index).cloned(),
        })
    };

    let issues = validate_labels(store);
    for stale in 0..old_len {
        if let Some(field) = FieldRef::label_of(T::KIND, stale) {
            feedback.clear(field);
        }
    }
    for issue in &issues {
        feedback.report(issue.field, &issue.reason());
    }
    Ok((change, issues))
}

fn point_in_image(point: &Point, frame: &ImageFrame) -> Point {
    let pos = frame.canvas_to_image(point.pos());
    Point {
        x: pos.x,
        y: pos.y,
        ..point.clone()
    }
}

fn spot_in_image(spot: &Spot, frame: &ImageFrame) -> Spot {
    let pos = frame.canvas_to_image(spot.pos());
    Spot {
        x: pos.x,
        y: pos.y,
        ..spot.clone()
    }
}

fn route_in_image(route: &Route, frame: &ImageFrame) -> Route {
    let mut route = route.clone();
    for waypoint in &mut route.waypoints {
        let pos = frame.canvas_to_image(waypoint.pos());
        waypoint.x = pos.x;
        waypoint.y = pos.y;
    }
    route
}

fn area_in_image(area: &Area, frame: &ImageFrame) -> Area {
    let mut area = area.clone();
    for vertex in &mut area.vertices {
        let pos = frame.canvas_to_image(vertex.pos());
        vertex.x = pos.x;
        vertex.y = pos.y;
    }
    area
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::{EndpointResolution, IssueBoard};

    fn labeled_point(session: &mut EditorSession, x: f32, y: f32, label: &str) -> usize {
        let mut board = IssueBoard::new();
        let PointerDown::Created(hit) = session.pointer_down(egui::pos2(x, y)) else {
            panic!("expected a new point at ({x}, {y})");
        };
        session.pointer_up(egui::pos2(x, y));
        session
            .commit_point_label(hit.index, label, &mut board)
            .unwrap();
        hit.index
    }

    fn labeled_spot(session: &mut EditorSession, x: f32, y: f32, name: &str) -> usize {
        let mut board = IssueBoard::new();
        session.set_mode(EditMode::Spot);
        let PointerDown::Created(hit) = session.pointer_down(egui::pos2(x, y)) else {
            panic!("expected a new spot at ({x}, {y})");
        };
        session.commit_spot_name(hit.index, name, &mut board).unwrap();
        session.set_mode(EditMode::Point);
        hit.index
    }

    /// Point A-01, spot Gate and a selected route between them.
    fn routed_session() -> EditorSession {
        let mut session = EditorSession::new();
        labeled_point(&mut session, 100.0, 100.0, "A-01");
        labeled_spot(&mut session, 400.0, 100.0, "Gate");
        session.set_mode(EditMode::Route);
        let route = session.add_route("R1");
        let mut board = IssueBoard::new();
        session.commit_route_endpoint(route, Endpoint::Start, "a1", |_| true, &mut board);
        session.commit_route_endpoint(route, Endpoint::End, "gate", |_| true, &mut board);
        assert!(board.is_empty());
        session.take_pending_ops();
        session
    }

    #[test]
    fn test_click_creates_point_and_commit_coerces_label() {
        let mut session = EditorSession::new();
        let down = session.pointer_down(egui::pos2(100.0, 100.0));
        assert_eq!(down, PointerDown::Created(Hit::new(EntityKind::Point, 0)));
        assert_eq!(session.pending_len(), 0, "unlabeled points are not persisted");

        let mut board = IssueBoard::new();
        let issues = session.commit_point_label(0, " a1 ", &mut board).unwrap();
        assert!(issues.is_empty());
        assert_eq!(session.points().get(0).unwrap().id, "A-01");

        let ops = session.take_pending_ops();
        assert_eq!(ops.len(), 1);
        assert!(matches!(&ops[0], PersistenceOp::Create(Record::Point(p)) if p.id == "A-01"));
    }

    #[test]
    fn test_drag_moves_point_and_queues_update() {
        let mut session = EditorSession::new();
        labeled_point(&mut session, 100.0, 100.0, "A-01");
        session.take_pending_ops();

        let down = session.pointer_down(egui::pos2(101.0, 100.0));
        assert_eq!(down, PointerDown::Grabbed(Hit::new(EntityKind::Point, 0)));
        assert!(session.pointer_move(egui::pos2(121.0, 100.0)));
        let up = session.pointer_up(egui::pos2(121.0, 100.0));

        let PointerUp::Moved(outcome) = up else {
            panic!("expected a move, got {up:?}");
        };
        assert!(outcome.has_moved);
        assert_eq!(session.points().get(0).unwrap().pos(), CanvasPos::new(120, 100));
        assert_eq!(session.points().len(), 1, "dragging never creates");

        let ops = session.take_pending_ops();
        assert!(matches!(&ops[..], [PersistenceOp::Update(Record::Point(p))] if p.x == 120));
    }

    #[test]
    fn test_press_and_release_selects_without_persisting() {
        let mut session = EditorSession::new();
        labeled_point(&mut session, 100.0, 100.0, "A-01");
        session.take_pending_ops();

        session.pointer_down(egui::pos2(100.0, 100.0));
        let up = session.pointer_up(egui::pos2(101.0, 101.0));
        assert_eq!(up, PointerUp::Clicked(Hit::new(EntityKind::Point, 0)));
        assert_eq!(session.selection(), Some(Hit::new(EntityKind::Point, 0)));
        assert_eq!(session.pending_len(), 0);
        assert_eq!(session.pointer_up(egui::pos2(0.0, 0.0)), PointerUp::Idle);
    }

    #[test]
    fn test_cancel_drag_restores_position() {
        let mut session = EditorSession::new();
        labeled_point(&mut session, 100.0, 100.0, "A-01");
        session.take_pending_ops();

        session.pointer_down(egui::pos2(100.0, 100.0));
        session.pointer_move(egui::pos2(150.0, 170.0));
        assert!(session.cancel_drag());
        assert_eq!(session.points().get(0).unwrap().pos(), CanvasPos::new(100, 100));
        assert!(!session.is_dragging());
        assert_eq!(session.pending_len(), 0);
    }

    #[test]
    fn test_records_are_persisted_in_image_space() {
        let mut session = EditorSession::new();
        session.set_frame(ImageFrame::new(500, 500, 1000, 1000));
        labeled_point(&mut session, 100.0, 50.0, "B-02");

        let ops = session.take_pending_ops();
        let [PersistenceOp::Create(Record::Point(point))] = &ops[..] else {
            panic!("expected one create, got {ops:?}");
        };
        assert_eq!((point.x, point.y), (200, 100));
        assert_eq!(session.points().get(0).unwrap().pos(), CanvasPos::new(100, 50));
    }

    #[test]
    fn test_duplicate_labels_are_reported_not_reverted() {
        let mut session = EditorSession::new();
        let mut board = IssueBoard::new();
        labeled_point(&mut session, 100.0, 100.0, "A-01");
        session.pointer_down(egui::pos2(300.0, 300.0));
        let issues = session.commit_point_label(1, "A-01", &mut board).unwrap();

        assert_eq!(issues.len(), 2);
        assert_eq!(session.points().get(1).unwrap().id, "A-01");
        assert!(board.message(FieldRef::PointId(0)).is_some());
        assert!(board.message(FieldRef::PointId(1)).is_some());

        session.commit_point_label(1, "A-02", &mut board).unwrap();
        assert!(board.is_empty());
    }

    #[test]
    fn test_empty_label_removes_entity() {
        let mut session = EditorSession::new();
        let mut board = IssueBoard::new();
        labeled_point(&mut session, 100.0, 100.0, "A-01");
        labeled_point(&mut session, 200.0, 100.0, "A-02");
        session.take_pending_ops();

        session.commit_point_label(0, "   ", &mut board).unwrap();
        assert_eq!(session.points().len(), 1);
        assert_eq!(session.points().get(0).unwrap().id, "A-02");
        assert_eq!(session.points().get(0).unwrap().index, 0);
        assert_eq!(
            session.take_pending_ops(),
            vec![PersistenceOp::Delete {
                kind: RecordKind::Point,
                key: "A-01".into()
            }]
        );

        assert_eq!(
            session.commit_point_label(4, "X", &mut board),
            Err(ValidationError::InvalidIndex {
                kind: EntityKind::Point,
                index: 4
            })
        );
    }

    #[test]
    fn test_waypoints_need_both_endpoints() {
        let mut session = EditorSession::new();
        labeled_point(&mut session, 100.0, 100.0, "A-01");
        session.set_mode(EditMode::Route);
        assert_eq!(
            session.pointer_down(egui::pos2(200.0, 200.0)),
            PointerDown::Rejected(ValidationError::NoRouteSelected)
        );

        let route = session.add_route("R1");
        let mut board = IssueBoard::new();
        session.commit_route_endpoint(route, Endpoint::Start, "A-01", |_| true, &mut board);
        assert_eq!(
            session.pointer_down(egui::pos2(200.0, 200.0)),
            PointerDown::Rejected(ValidationError::EndpointsRequired)
        );
        assert!(session.routes().get(route).unwrap().waypoints.is_empty());
    }

    #[test]
    fn test_route_endpoints_resolve_and_waypoints_persist() {
        let mut session = routed_session();
        let route = session.routes().get(0).unwrap();
        assert_eq!(route.start_ref, "A-01");
        assert_eq!(route.end_ref, "Gate");

        let down = session.pointer_down(egui::pos2(250.0, 200.0));
        assert_eq!(down, PointerDown::Created(Hit::new(EntityKind::Waypoint, 0)));
        session.pointer_up(egui::pos2(250.0, 200.0));
        let ops = session.take_pending_ops();
        assert!(matches!(&ops[..], [PersistenceOp::Update(Record::Route(r))] if r.waypoints.len() == 1));

        // Drag the waypoint
        assert_eq!(
            session.pointer_down(egui::pos2(251.0, 201.0)),
            PointerDown::Grabbed(Hit::new(EntityKind::Waypoint, 0))
        );
        session.pointer_move(egui::pos2(271.0, 221.0));
        session.pointer_up(egui::pos2(271.0, 221.0));
        let waypoint = session.routes().selected().unwrap().waypoints[0];
        assert_eq!(waypoint.pos(), CanvasPos::new(270, 220));
    }

    #[test]
    fn test_endpoint_change_asks_before_dropping_waypoints() {
        let mut session = routed_session();
        session.pointer_down(egui::pos2(250.0, 200.0));
        session.pointer_up(egui::pos2(250.0, 200.0));
        let mut board = IssueBoard::new();

        let commit =
            session.commit_route_endpoint(0, Endpoint::End, "Dock", |_| false, &mut board);
        assert_eq!(commit.outcome, EndpointOutcome::Declined);
        assert_eq!(session.routes().get(0).unwrap().end_ref, "Gate");
        assert_eq!(session.routes().get(0).unwrap().waypoints.len(), 1);

        let commit = session.commit_route_endpoint(0, Endpoint::End, "Dock", |_| true, &mut board);
        assert_eq!(
            commit.outcome,
            EndpointOutcome::Applied {
                cleared_waypoints: true
            }
        );
        assert_eq!(commit.resolution, EndpointResolution::Unmatched("Dock".into()));
        assert!(board.message(FieldRef::RouteEnd(0)).is_some());
        assert!(session.routes().get(0).unwrap().waypoints.is_empty());
    }

    #[test]
    fn test_box_selected_waypoints_are_deleted_together() {
        let mut session = routed_session();
        for x in [200.0, 240.0, 280.0, 320.0] {
            session.pointer_down(egui::pos2(x, 200.0));
            session.pointer_up(egui::pos2(x, 200.0));
        }
        session.take_pending_ops();

        let picked = session.select_waypoints_within(egui::pos2(290.0, 190.0), egui::pos2(230.0, 210.0));
        assert_eq!(picked, 2);
        assert_eq!(session.selected_waypoints(), &[1, 2]);
        assert!(session.delete_selection());

        let xs: Vec<i32> = session.routes().selected().unwrap().waypoints.iter().map(|w| w.x).collect();
        assert_eq!(xs, vec![200, 320]);
        assert_eq!(session.pending_len(), 1);
    }

    #[test]
    fn test_remove_nearest_waypoint() {
        let mut session = routed_session();
        for x in [200.0, 230.0] {
            session.pointer_down(egui::pos2(x, 200.0));
            session.pointer_up(egui::pos2(x, 200.0));
        }
        session.take_pending_ops();

        assert_eq!(session.remove_nearest_waypoint(egui::pos2(222.0, 205.0)), Some(1));
        assert_eq!(session.remove_nearest_waypoint(egui::pos2(260.0, 200.0)), None);
        assert_eq!(session.routes().selected().unwrap().waypoints.len(), 1);
        assert_eq!(session.pending_len(), 1);
    }

    #[test]
    fn test_switching_routes_drops_waypoint_selection() {
        let mut session = routed_session();
        for x in [200.0, 250.0] {
            session.pointer_down(egui::pos2(x, 200.0));
            session.pointer_up(egui::pos2(x, 200.0));
        }
        let second = session.add_route("R2");
        let mut board = IssueBoard::new();
        session.commit_route_endpoint(second, Endpoint::Start, "A-01", |_| true, &mut board);
        session.commit_route_endpoint(second, Endpoint::End, "Gate", |_| true, &mut board);
        session.pointer_down(egui::pos2(300.0, 300.0));
        session.pointer_up(egui::pos2(300.0, 300.0));

        session.select_route(Some(0));
        session.pointer_down(egui::pos2(200.0, 200.0));
        assert_eq!(
            session.pointer_up(egui::pos2(200.0, 200.0)),
            PointerUp::Clicked(Hit::new(EntityKind::Waypoint, 0))
        );

        session.select_route(Some(second));
        assert_eq!(session.selection(), None);
        assert!(!session.delete_selection());
        assert_eq!(session.routes().get(0).unwrap().waypoints.len(), 2);
        assert_eq!(session.routes().get(second).unwrap().waypoints.len(), 1);

        // Deleting the owning route also forgets its waypoint
        session.select_route(Some(0));
        session.pointer_down(egui::pos2(250.0, 200.0));
        session.pointer_up(egui::pos2(250.0, 200.0));
        assert!(session.selection().is_some());
        session.delete_route(0);
        assert_eq!(session.selection(), None);
    }

    #[test]
    fn test_selection_follows_point_after_earlier_removal() {
        let mut session = EditorSession::new();
        let mut board = IssueBoard::new();
        for (x, label) in [(100.0, "P-00"), (200.0, "P-01"), (300.0, "P-02")] {
            labeled_point(&mut session, x, 100.0, label);
        }
        session.pointer_down(egui::pos2(200.0, 100.0));
        session.pointer_up(egui::pos2(200.0, 100.0));
        assert_eq!(session.selection(), Some(Hit::new(EntityKind::Point, 1)));

        session.commit_point_label(0, "", &mut board).unwrap();
        assert_eq!(session.selection(), Some(Hit::new(EntityKind::Point, 0)));

        assert!(session.delete_selection());
        let remaining: Vec<&str> = session.points().labels().collect();
        assert_eq!(remaining, vec!["P-02"]);
    }

    #[test]
    fn test_removing_selected_point_clears_selection() {
        let mut session = EditorSession::new();
        labeled_point(&mut session, 100.0, 100.0, "A-01");
        labeled_point(&mut session, 200.0, 100.0, "A-02");
        session.pointer_down(egui::pos2(100.0, 100.0));
        session.pointer_up(egui::pos2(100.0, 100.0));

        assert!(session.delete_entity(Hit::new(EntityKind::Point, 0)));
        assert_eq!(session.selection(), None);
        assert!(!session.delete_selection());
        assert_eq!(session.points().len(), 1);
    }

    #[test]
    fn test_area_vertices_and_reorder_after_drag() {
        let mut session = EditorSession::new();
        session.set_mode(EditMode::Area);
        assert_eq!(
            session.pointer_down(egui::pos2(0.0, 0.0)),
            PointerDown::Rejected(ValidationError::NoAreaSelected)
        );

        session.add_area("Yard");
        for (x, y) in [(0.0, 0.0), (100.0, 0.0), (100.0, 100.0), (0.0, 100.0)] {
            session.pointer_down(egui::pos2(x, y));
            session.pointer_up(egui::pos2(x, y));
        }
        assert_eq!(session.areas().selected().unwrap().vertices.len(), 4);

        session.pointer_down(egui::pos2(100.0, 0.0));
        session.pointer_move(egui::pos2(50.0, 120.0));
        let PointerUp::Moved(outcome) = session.pointer_up(egui::pos2(50.0, 120.0)) else {
            panic!("vertex did not move");
        };
        assert_eq!(outcome.index, 2);
        let order: Vec<CanvasPos> = session
            .areas()
            .selected()
            .unwrap()
            .vertices
            .iter()
            .map(|v| v.pos())
            .collect();
        assert_eq!(
            order,
            vec![
                CanvasPos::new(0, 0),
                CanvasPos::new(100, 100),
                CanvasPos::new(50, 120),
                CanvasPos::new(0, 100),
            ]
        );

        // Clicking inside an area selects it when none is selected
        session.select_area(None);
        assert_eq!(
            session.pointer_down(egui::pos2(40.0, 60.0)),
            PointerDown::AreaSelected(0)
        );
    }

    #[test]
    fn test_export_import_uses_image_space() {
        let frame = ImageFrame::new(500, 500, 1000, 1000);
        let mut session = EditorSession::new();
        session.set_frame(frame);
        labeled_point(&mut session, 100.0, 50.0, "A-01");

        let json = session.export_document().unwrap();
        let document = Annotations::from_json(&json).unwrap();
        assert_eq!((document.points[0].x, document.points[0].y), (200, 100));

        let mut restored = EditorSession::new();
        restored.set_frame(frame);
        restored.import_document(&json).unwrap();
        assert_eq!(restored.points().get(0).unwrap().pos(), CanvasPos::new(100, 50));

        assert!(restored.import_document("{ not json").is_err());
        assert_eq!(restored.points().len(), 1);
    }

    #[test]
    fn test_persistence_results_update_routes() {
        let mut session = routed_session();
        session.apply_persistence_result(PersistenceResult::Added {
            kind: RecordKind::Route,
            key: "R1".into(),
            handle: "h-1".into(),
        });
        let route = session.routes().get(0).unwrap();
        assert_eq!(route.external_ref.as_deref(), Some("h-1"));
        assert!(!route.is_modified);

        let conflict = DuplicateConflict {
            existing: crate::persistence::StoredRecord {
                handle: "h-2".into(),
                record: Record::Spot(Spot::default()),
            },
            attempted: Record::Spot(Spot {
                name: "Gate".into(),
                ..Spot::default()
            }),
        };
        let surfaced = session.apply_persistence_result(PersistenceResult::Conflict(conflict.clone()));
        assert_eq!(surfaced, Some(conflict.clone()));
        session.overwrite_conflict(conflict);
        assert!(matches!(
            &session.take_pending_ops()[..],
            [PersistenceOp::Update(Record::Spot(s))] if s.name == "Gate"
        ));
    }

    #[test]
    fn test_snapshot_reflects_selection_and_viewport() {
        let mut session = routed_session();
        session.zoom(ZoomDirection::In);
        let snapshot = session.snapshot();
        assert_eq!(snapshot.selected_route, Some(0));
        assert_eq!(snapshot.mode, EditMode::Route);
        assert_eq!(snapshot.viewport.scale, 1.25);
        assert_eq!(snapshot.annotations.points.len(), 1);
        assert_eq!(snapshot.annotations.spots.len(), 1);
    }
}
