//! Shared application-wide constants.
//! Centralizes tweakable values used across hit-testing, dragging and the viewport.

// Marker hit radii (canvas units, independent of zoom)
/// Hit radius for spots. Spots render larger than points and win overlaps.
pub const SPOT_RADIUS: f32 = 10.0;
/// Hit radius for points.
pub const POINT_RADIUS: f32 = 8.0;
/// Default hit radius for route waypoints.
pub const WAYPOINT_RADIUS: f32 = 6.0;
/// Default hit radius for area vertices.
pub const VERTEX_RADIUS: f32 = 6.0;

// Viewport
/// Smallest allowed zoom scale.
pub const MIN_SCALE: f32 = 0.25;
/// Largest allowed zoom scale.
pub const MAX_SCALE: f32 = 5.0;
/// Scale increment applied by a single zoom step.
pub const ZOOM_STEP: f32 = 0.25;
/// Offset increment (backing-store pixels) applied by a single pan step.
pub const PAN_STEP: f32 = 50.0;

// Canvas interactions
/// Pointer travel (canvas units) that turns an armed press into a drag.
pub const DRAG_THRESHOLD: f32 = 3.0;
/// Maximum distance used when looking up the nearest waypoint for removal.
pub const WAYPOINT_PICK_DISTANCE: f32 = 12.0;

// Canvas backing store
/// Canvas width used before any image is loaded.
pub const DEFAULT_CANVAS_WIDTH: u32 = 1200;
/// Canvas height used before any image is loaded.
pub const DEFAULT_CANVAS_HEIGHT: u32 = 800;
/// Longest canvas edge; larger images are scaled down to fit.
pub const MAX_CANVAS_EDGE: u32 = 1600;
