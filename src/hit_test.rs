//! Mode-aware lookup of the entity under the pointer.

use crate::area::AreaModel;
use crate::constants::{POINT_RADIUS, SPOT_RADIUS, VERTEX_RADIUS, WAYPOINT_RADIUS};
use crate::route::RouteModel;
use crate::store::{PointStore, SpotStore, StoredEntity};
use crate::types::{CanvasPos, EditMode, EntityKind};

/// The single entity found under the pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hit {
    /// Kind of the entity
    pub kind: EntityKind,
    /// Index within its store, route or area
    pub index: usize,
}

impl Hit {
    /// Creates a hit.
    pub fn new(kind: EntityKind, index: usize) -> Self {
        Self { kind, index }
    }
}

/// Read-only view over every hit-testable collection.
#[derive(Clone, Copy)]
pub struct HitLayers<'a> {
    /// Labeled points
    pub points: &'a PointStore,
    /// Named spots
    pub spots: &'a SpotStore,
    /// Routes; only the selected route's waypoints are tested
    pub routes: &'a RouteModel,
    /// Areas; only the selected area's vertices are tested
    pub areas: &'a AreaModel,
}

impl HitLayers<'_> {
    /// Current position of the entity a hit refers to.
    pub fn position_of(&self, hit: Hit) -> Option<CanvasPos> {
        match hit.kind {
            EntityKind::Point => self.points.get(hit.index).map(|p| p.pos()),
            EntityKind::Spot => self.spots.get(hit.index).map(|s| s.pos()),
            EntityKind::Waypoint => self
                .routes
                .selected()
                .and_then(|r| r.waypoints.get(hit.index))
                .map(|w| w.pos()),
            EntityKind::AreaVertex => self
                .areas
                .selected()
                .and_then(|a| a.vertices.get(hit.index))
                .map(|v| v.pos()),
        }
    }
}

/// Per-kind hit radii in canvas units.
///
/// Radii are fixed and do not follow the zoom level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitTester {
    /// Spot radius
    pub spot_radius: f32,
    /// Point radius
    pub point_radius: f32,
    /// Route waypoint radius
    pub waypoint_radius: f32,
    /// Area vertex radius
    pub vertex_radius: f32,
}

impl Default for HitTester {
    fn default() -> Self {
        Self {
            spot_radius: SPOT_RADIUS,
            point_radius: POINT_RADIUS,
            waypoint_radius: WAYPOINT_RADIUS,
            vertex_radius: VERTEX_RADIUS,
        }
    }
}

impl HitTester {
    /// Creates a tester with caller-supplied waypoint and vertex radii.
    pub fn new(waypoint_radius: f32, vertex_radius: f32) -> Self {
        Self {
            waypoint_radius,
            vertex_radius,
            ..Default::default()
        }
    }

    /// Returns the entity under `pos` for the active mode.
    ///
    /// Point and spot modes test spots before points so the larger spot marker
    /// wins overlaps. Route mode tests the selected route's waypoints and area
    /// mode the selected area's vertices.
    pub fn hit(&self, pos: egui::Pos2, mode: EditMode, layers: HitLayers<'_>) -> Option<Hit> {
        match mode {
            EditMode::Point | EditMode::Spot => layers
                .spots
                .find_at(pos, self.spot_radius)
                .map(|index| Hit::new(EntityKind::Spot, index))
                .or_else(|| {
                    layers
                        .points
                        .find_at(pos, self.point_radius)
                        .map(|index| Hit::new(EntityKind::Point, index))
                }),
            EditMode::Route => layers
                .routes
                .find_waypoint_at(pos, self.waypoint_radius)
                .map(|index| Hit::new(EntityKind::Waypoint, index)),
            EditMode::Area => layers
                .areas
                .find_vertex_at(pos, self.vertex_radius)
                .map(|index| Hit::new(EntityKind::AreaVertex, index)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        points: PointStore,
        spots: SpotStore,
        routes: RouteModel,
        areas: AreaModel,
    }

    impl Fixture {
        fn new() -> Self {
            let mut points = PointStore::new();
            points.add(CanvasPos::new(100, 100), "A-01");
            points.add(CanvasPos::new(200, 100), "A-02");
            let mut spots = SpotStore::new();
            spots.add(CanvasPos::new(106, 100), "Gate");

            let mut routes = RouteModel::new();
            let r = routes.add_route("R");
            routes.set_start(r, "A-01", |_| true);
            routes.set_end(r, "Gate", |_| true);
            routes.add_waypoint(CanvasPos::new(150, 150)).unwrap();

            let mut areas = AreaModel::new();
            areas.add_area("Yard");
            areas.add_vertex(CanvasPos::new(300, 300)).unwrap();

            Self {
                points,
                spots,
                routes,
                areas,
            }
        }

        fn layers(&self) -> HitLayers<'_> {
            HitLayers {
                points: &self.points,
                spots: &self.spots,
                routes: &self.routes,
                areas: &self.areas,
            }
        }
    }

    #[test]
    fn test_spot_wins_overlap_with_point() {
        let fixture = Fixture::new();
        let tester = HitTester::default();
        // 3px from the point and 3px from the spot
        let hit = tester.hit(egui::pos2(103.0, 100.0), EditMode::Point, fixture.layers());
        assert_eq!(hit, Some(Hit::new(EntityKind::Spot, 0)));
    }

    #[test]
    fn test_point_found_outside_spot_radius() {
        let fixture = Fixture::new();
        let tester = HitTester::default();
        let hit = tester.hit(egui::pos2(95.0, 100.0), EditMode::Spot, fixture.layers());
        assert_eq!(hit, Some(Hit::new(EntityKind::Point, 0)));

        let miss = tester.hit(egui::pos2(200.0, 110.0), EditMode::Point, fixture.layers());
        assert_eq!(miss, None);
    }

    #[test]
    fn test_route_and_area_modes_test_their_own_layer() {
        let fixture = Fixture::new();
        let tester = HitTester::new(5.0, 5.0);

        let on_waypoint = egui::pos2(152.0, 151.0);
        assert_eq!(
            tester.hit(on_waypoint, EditMode::Route, fixture.layers()),
            Some(Hit::new(EntityKind::Waypoint, 0))
        );
        assert_eq!(tester.hit(on_waypoint, EditMode::Area, fixture.layers()), None);

        // Points are not hit in route mode
        assert_eq!(
            tester.hit(egui::pos2(100.0, 100.0), EditMode::Route, fixture.layers()),
            None
        );
        assert_eq!(
            tester.hit(egui::pos2(300.0, 304.0), EditMode::Area, fixture.layers()),
            Some(Hit::new(EntityKind::AreaVertex, 0))
        );
    }

    #[test]
    fn test_radius_is_independent_of_zoom() {
        let fixture = Fixture::new();
        let tester = HitTester::default();
        // Exactly at the point radius from A-02
        let hit = tester.hit(egui::pos2(200.0, 108.0), EditMode::Point, fixture.layers());
        assert_eq!(hit, Some(Hit::new(EntityKind::Point, 1)));
    }

    #[test]
    fn test_position_of_hit() {
        let fixture = Fixture::new();
        let layers = fixture.layers();
        assert_eq!(
            layers.position_of(Hit::new(EntityKind::Waypoint, 0)),
            Some(CanvasPos::new(150, 150))
        );
        assert_eq!(layers.position_of(Hit::new(EntityKind::Point, 9)), None);
    }
}
