//! Generic drag-and-drop of points, spots, waypoints and area vertices.
//!
//! The controller moves through `Idle -> Armed -> Dragging -> Idle`. A press
//! on an entity arms it; the drag only starts once the pointer travels past
//! [`DRAG_THRESHOLD`], so a press and release without travel stays a click.

use crate::area::AreaModel;
use crate::constants::DRAG_THRESHOLD;
use crate::events::SyncHint;
use crate::route::RouteModel;
use crate::store::{EntityUpdate, PointStore, SpotStore};
use crate::types::{CanvasPos, EntityKind};
use std::collections::HashMap;

/// Phase of the drag state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DragPhase {
    /// Nothing is held
    #[default]
    Idle,
    /// Pointer pressed on an entity but not moved past the threshold
    Armed,
    /// Entity follows the pointer
    Dragging,
}

/// Mutable access to every collection a drag can write into.
pub struct DragTargets<'a> {
    /// Labeled points
    pub points: &'a mut PointStore,
    /// Named spots
    pub spots: &'a mut SpotStore,
    /// Routes; waypoints of the selected route are moved
    pub routes: &'a mut RouteModel,
    /// Areas; vertices of the selected area are moved
    pub areas: &'a mut AreaModel,
}

impl DragTargets<'_> {
    /// Writes `pos` into the owning collection. Returns whether a write happened.
    pub fn write(&mut self, kind: EntityKind, index: usize, pos: CanvasPos, hint: SyncHint) -> bool {
        match kind {
            EntityKind::Point => self.points.update(index, EntityUpdate::Position(pos), hint),
            EntityKind::Spot => self.spots.update(index, EntityUpdate::Position(pos), hint),
            EntityKind::Waypoint => self.routes.update_waypoint(index, pos, hint),
            EntityKind::AreaVertex => self.areas.update_vertex(index, pos, hint),
        }
    }
}

/// Summary of a finished drag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DragOutcome {
    /// Kind of the dragged entity
    pub kind: EntityKind,
    /// Index of the dragged entity
    pub index: usize,
    /// Whether the pointer crossed the drag threshold; `false` means a click
    pub has_moved: bool,
    /// Entity position when the drag started
    pub from: CanvasPos,
    /// Entity position when the drag ended
    pub to: CanvasPos,
}

/// Callback invoked when an entity of a given kind was moved.
pub type DragCompletion = Box<dyn FnMut(&DragOutcome)>;

/// Drag state machine.
pub struct DragController {
    phase: DragPhase,
    kind: Option<EntityKind>,
    index: usize,
    /// Pointer minus entity position at press time
    grab_offset: egui::Vec2,
    press_pos: egui::Pos2,
    origin: CanvasPos,
    current: CanvasPos,
    has_moved: bool,
    completions: HashMap<EntityKind, DragCompletion>,
}

impl Default for DragController {
    fn default() -> Self {
        Self {
            phase: DragPhase::Idle,
            kind: None,
            index: 0,
            grab_offset: egui::Vec2::ZERO,
            press_pos: egui::Pos2::ZERO,
            origin: CanvasPos::default(),
            current: CanvasPos::default(),
            has_moved: false,
            completions: HashMap::new(),
        }
    }
}

impl std::fmt::Debug for DragController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DragController")
            .field("phase", &self.phase)
            .field("kind", &self.kind)
            .field("index", &self.index)
            .field("has_moved", &self.has_moved)
            .finish()
    }
}

impl DragController {
    /// Creates an idle controller.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the completion callback for `kind`, replacing any previous one.
    pub fn on_complete(&mut self, kind: EntityKind, callback: impl FnMut(&DragOutcome) + 'static) {
        self.completions.insert(kind, Box::new(callback));
    }

    /// Current phase.
    pub fn phase(&self) -> DragPhase {
        self.phase
    }

    /// Whether an entity is armed or being dragged.
    pub fn is_active(&self) -> bool {
        self.phase != DragPhase::Idle
    }

    /// Whether the pointer crossed the threshold since the press.
    pub fn has_moved(&self) -> bool {
        self.has_moved
    }

    /// The entity currently held, if any.
    pub fn target(&self) -> Option<(EntityKind, usize)> {
        self.kind.map(|kind| (kind, self.index))
    }

    /// Arms a drag of the entity at `entity_pos`, grabbed at `pointer`.
    ///
    /// The grab offset is kept for the whole drag so the entity does not snap
    /// its origin to the pointer.
    pub fn start_drag(
        &mut self,
        kind: EntityKind,
        index: usize,
        pointer: egui::Pos2,
        entity_pos: CanvasPos,
    ) {
        self.phase = DragPhase::Armed;
        self.kind = Some(kind);
        self.index = index;
        self.grab_offset = pointer - entity_pos.to_pos2();
        self.press_pos = pointer;
        self.origin = entity_pos;
        self.current = entity_pos;
        self.has_moved = false;
        log::debug!("Armed drag of {} #{}", kind, index);
    }

    /// Moves the held entity to follow `pointer`.
    ///
    /// Returns whether a write happened: `false` while idle, before the
    /// threshold is crossed, or when the entity no longer exists.
    pub fn update_drag(&mut self, pointer: egui::Pos2, targets: &mut DragTargets<'_>) -> bool {
        let Some(kind) = self.kind else {
            return false;
        };
        if self.phase == DragPhase::Armed {
            if pointer.distance(self.press_pos) <= DRAG_THRESHOLD {
                return false;
            }
            self.phase = DragPhase::Dragging;
            self.has_moved = true;
        }

        let new_pos = CanvasPos::from_pos2(pointer - self.grab_offset);
        let written = targets.write(kind, self.index, new_pos, SyncHint::Incremental);
        if written {
            self.current = new_pos;
        }
        written
    }

    /// Finishes the drag and resets the controller.
    ///
    /// When the entity moved, its final position is written once more with a
    /// full resync and the completion callback for its kind is invoked. The
    /// controller is reset even when nothing was held or nothing moved.
    pub fn end_drag(&mut self, targets: &mut DragTargets<'_>) -> Option<DragOutcome> {
        let outcome = self.kind.map(|kind| DragOutcome {
            kind,
            index: self.index,
            has_moved: self.has_moved,
            from: self.origin,
            to: self.current,
        });
        self.reset();

        let outcome = outcome?;
        if outcome.has_moved && targets.write(outcome.kind, outcome.index, outcome.to, SyncHint::Full)
        {
            log::debug!(
                "Moved {} #{} from ({}, {}) to ({}, {})",
                outcome.kind,
                outcome.index,
                outcome.from.x,
                outcome.from.y,
                outcome.to.x,
                outcome.to.y
            );
            if let Some(callback) = self.completions.get_mut(&outcome.kind) {
                callback(&outcome);
            }
        }
        Some(outcome)
    }

    /// Aborts the drag, putting the entity back where it started.
    ///
    /// Returns whether the entity had to be restored.
    pub fn cancel_drag(&mut self, targets: &mut DragTargets<'_>) -> bool {
        let restore = self.kind.filter(|_| self.has_moved);
        let (index, origin) = (self.index, self.origin);
        self.reset();
        match restore {
            Some(kind) => targets.write(kind, index, origin, SyncHint::Full),
            None => false,
        }
    }

    fn reset(&mut self) {
        self.phase = DragPhase::Idle;
        self.kind = None;
        self.index = 0;
        self.grab_offset = egui::Vec2::ZERO;
        self.press_pos = egui::Pos2::ZERO;
        self.has_moved = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoredEntity;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Collections {
        points: PointStore,
        spots: SpotStore,
        routes: RouteModel,
        areas: AreaModel,
    }

    impl Collections {
        fn targets(&mut self) -> DragTargets<'_> {
            DragTargets {
                points: &mut self.points,
                spots: &mut self.spots,
                routes: &mut self.routes,
                areas: &mut self.areas,
            }
        }
    }

    fn with_point() -> Collections {
        let mut c = Collections::default();
        c.points.add(CanvasPos::new(100, 100), "A-01");
        c
    }

    #[test]
    fn test_drag_keeps_grab_offset() {
        let mut c = with_point();
        let mut drag = DragController::new();
        // Grab 4px right and 2px below the point
        drag.start_drag(EntityKind::Point, 0, egui::pos2(104.0, 102.0), CanvasPos::new(100, 100));
        assert_eq!(drag.phase(), DragPhase::Armed);

        assert!(drag.update_drag(egui::pos2(124.0, 132.0), &mut c.targets()));
        assert_eq!(drag.phase(), DragPhase::Dragging);
        assert_eq!(c.points.get(0).unwrap().x, 120);
        assert_eq!(c.points.get(0).unwrap().y, 130);
    }

    #[test]
    fn test_movement_past_threshold_reports_moved() {
        let mut c = with_point();
        let mut drag = DragController::new();
        drag.start_drag(EntityKind::Point, 0, egui::pos2(100.0, 100.0), CanvasPos::new(100, 100));
        drag.update_drag(egui::pos2(110.0, 100.0), &mut c.targets());

        let outcome = drag.end_drag(&mut c.targets()).unwrap();
        assert!(outcome.has_moved);
        assert_eq!(outcome.from, CanvasPos::new(100, 100));
        assert_eq!(outcome.to, CanvasPos::new(110, 100));
        assert_eq!(drag.phase(), DragPhase::Idle);
        assert!(!drag.has_moved());
    }

    #[test]
    fn test_press_and_release_is_a_click() {
        let mut c = with_point();
        let mut drag = DragController::new();
        drag.start_drag(EntityKind::Point, 0, egui::pos2(100.0, 100.0), CanvasPos::new(100, 100));
        let outcome = drag.end_drag(&mut c.targets()).unwrap();
        assert!(!outcome.has_moved);
        assert_eq!(c.points.get(0).unwrap().pos(), CanvasPos::new(100, 100));
    }

    #[test]
    fn test_jitter_within_threshold_does_not_move() {
        let mut c = with_point();
        let mut drag = DragController::new();
        drag.start_drag(EntityKind::Point, 0, egui::pos2(100.0, 100.0), CanvasPos::new(100, 100));
        assert!(!drag.update_drag(egui::pos2(102.0, 102.0), &mut c.targets()));
        assert_eq!(drag.phase(), DragPhase::Armed);
        assert!(!drag.end_drag(&mut c.targets()).unwrap().has_moved);
        assert_eq!(c.points.get(0).unwrap().pos(), CanvasPos::new(100, 100));
    }

    #[test]
    fn test_deleted_entity_mid_drag_is_tolerated() {
        let mut c = with_point();
        let mut drag = DragController::new();
        drag.start_drag(EntityKind::Point, 0, egui::pos2(100.0, 100.0), CanvasPos::new(100, 100));
        c.points.remove(0);

        assert!(!drag.update_drag(egui::pos2(150.0, 150.0), &mut c.targets()));
        let outcome = drag.end_drag(&mut c.targets()).unwrap();
        assert!(outcome.has_moved);
        assert!(c.points.is_empty());
        assert_eq!(drag.phase(), DragPhase::Idle);
    }

    #[test]
    fn test_end_without_start_resets_and_returns_none() {
        let mut c = Collections::default();
        let mut drag = DragController::new();
        assert!(!drag.update_drag(egui::pos2(1.0, 1.0), &mut c.targets()));
        assert!(drag.end_drag(&mut c.targets()).is_none());
        assert_eq!(drag.phase(), DragPhase::Idle);
    }

    #[test]
    fn test_completion_callback_is_kind_specific() {
        let seen: Rc<RefCell<Vec<EntityKind>>> = Rc::new(RefCell::new(Vec::new()));
        let mut c = with_point();
        c.spots.add(CanvasPos::new(300, 300), "Gate");
        let mut drag = DragController::new();
        let sink = seen.clone();
        drag.on_complete(EntityKind::Spot, move |o| sink.borrow_mut().push(o.kind));

        drag.start_drag(EntityKind::Point, 0, egui::pos2(100.0, 100.0), CanvasPos::new(100, 100));
        drag.update_drag(egui::pos2(120.0, 100.0), &mut c.targets());
        drag.end_drag(&mut c.targets());
        assert!(seen.borrow().is_empty());

        drag.start_drag(EntityKind::Spot, 0, egui::pos2(300.0, 300.0), CanvasPos::new(300, 300));
        drag.end_drag(&mut c.targets());
        assert!(seen.borrow().is_empty(), "clicks do not complete a move");

        drag.start_drag(EntityKind::Spot, 0, egui::pos2(300.0, 300.0), CanvasPos::new(300, 300));
        drag.update_drag(egui::pos2(280.0, 290.0), &mut c.targets());
        drag.end_drag(&mut c.targets());
        assert_eq!(*seen.borrow(), vec![EntityKind::Spot]);
        assert_eq!(c.spots.get(0).unwrap().pos(), CanvasPos::new(280, 290));
    }

    #[test]
    fn test_cancel_restores_origin() {
        let mut c = with_point();
        let mut drag = DragController::new();
        drag.start_drag(EntityKind::Point, 0, egui::pos2(100.0, 100.0), CanvasPos::new(100, 100));
        drag.update_drag(egui::pos2(160.0, 100.0), &mut c.targets());
        assert_eq!(c.points.get(0).unwrap().x, 160);

        assert!(drag.cancel_drag(&mut c.targets()));
        assert_eq!(c.points.get(0).unwrap().pos(), CanvasPos::new(100, 100));
        assert_eq!(drag.phase(), DragPhase::Idle);
    }

    #[test]
    fn test_waypoint_drag_writes_selected_route() {
        let mut c = Collections::default();
        let r = c.routes.add_route("R");
        c.routes.set_start(r, "A", |_| true);
        c.routes.set_end(r, "B", |_| true);
        c.routes.add_waypoint(CanvasPos::new(10, 10)).unwrap();

        let mut drag = DragController::new();
        drag.start_drag(EntityKind::Waypoint, 0, egui::pos2(10.0, 10.0), CanvasPos::new(10, 10));
        assert!(drag.update_drag(egui::pos2(40.0, 10.0), &mut c.targets()));
        drag.end_drag(&mut c.targets());
        assert_eq!(c.routes.selected().unwrap().waypoints[0].pos(), CanvasPos::new(40, 10));
    }
}
