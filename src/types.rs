//! Core data types and structures for the site annotator.
//!
//! This module defines the annotation entities placed on the reference image
//! (points, spots, routes and areas) together with the serializable document
//! that bundles them for rendering and export.

use crate::transform::ImageFrame;
use serde::{Deserialize, Serialize};

/// Integer pixel position in canvas space.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CanvasPos {
    /// Horizontal canvas pixel
    pub x: i32,
    /// Vertical canvas pixel
    pub y: i32,
}

impl CanvasPos {
    /// Creates a new canvas position.
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Rounds a floating-point canvas position to the nearest pixel.
    pub fn from_pos2(pos: egui::Pos2) -> Self {
        Self {
            x: pos.x.round() as i32,
            y: pos.y.round() as i32,
        }
    }

    /// Returns the position as an `egui::Pos2`.
    pub fn to_pos2(self) -> egui::Pos2 {
        egui::pos2(self.x as f32, self.y as f32)
    }

    /// Euclidean distance to a floating-point canvas position.
    pub fn distance_to(self, pos: egui::Pos2) -> f32 {
        self.to_pos2().distance(pos)
    }
}

/// The interaction mode selecting which entity kind the pointer creates and edits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EditMode {
    /// Create and move labeled points
    #[default]
    Point,
    /// Create and move named spots
    Spot,
    /// Add and move waypoints of the selected route
    Route,
    /// Add and move vertices of the selected area
    Area,
}

impl EditMode {
    /// All modes in toolbar order.
    pub const ALL: [EditMode; 4] = [
        EditMode::Point,
        EditMode::Spot,
        EditMode::Route,
        EditMode::Area,
    ];

    /// Human readable label for the mode.
    pub fn label(self) -> &'static str {
        match self {
            EditMode::Point => "Points",
            EditMode::Spot => "Spots",
            EditMode::Route => "Routes",
            EditMode::Area => "Areas",
        }
    }
}

/// Kinds of entities that can be hit, dragged and committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    /// A labeled point
    Point,
    /// A named spot
    Spot,
    /// A waypoint of the selected route
    Waypoint,
    /// A vertex of the selected area
    AreaVertex,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EntityKind::Point => "point",
            EntityKind::Spot => "spot",
            EntityKind::Waypoint => "waypoint",
            EntityKind::AreaVertex => "area vertex",
        };
        f.write_str(name)
    }
}

/// A labeled point placed on the image.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Canvas x
    pub x: i32,
    /// Canvas y
    pub y: i32,
    /// Free-text label, expected to be unique among non-empty ids
    pub id: String,
    /// Position of the point within its store
    pub index: usize,
}

/// A named spot. Same shape as [`Point`], keyed by `name`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Spot {
    /// Canvas x
    pub x: i32,
    /// Canvas y
    pub y: i32,
    /// Free-text name, expected to be unique among non-empty names
    pub name: String,
    /// Position of the spot within its store
    pub index: usize,
}

/// An intermediate position along a route.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Waypoint {
    /// Canvas x
    pub x: i32,
    /// Canvas y
    pub y: i32,
    /// Position within the route
    pub index: usize,
}

/// A corner of an area polygon.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vertex {
    /// Canvas x
    pub x: i32,
    /// Canvas y
    pub y: i32,
    /// Position within the polygon
    pub index: usize,
}

impl Waypoint {
    /// Position of the waypoint.
    pub fn pos(&self) -> CanvasPos {
        CanvasPos::new(self.x, self.y)
    }
}

impl Vertex {
    /// Position of the vertex.
    pub fn pos(&self) -> CanvasPos {
        CanvasPos::new(self.x, self.y)
    }
}

/// A route between two referents with intermediate waypoints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Route {
    /// Display name of the route
    pub route_name: String,
    /// Start referent, a point id or spot name
    pub start_ref: String,
    /// End referent, a point id or spot name
    pub end_ref: String,
    /// Ordered intermediate positions
    pub waypoints: Vec<Waypoint>,
    /// Whether the route changed since it was last persisted
    #[serde(default)]
    pub is_modified: bool,
    /// Handle of the persisted copy, if any
    #[serde(default)]
    pub external_ref: Option<String>,
}

impl Route {
    /// Creates an empty route with the given name.
    pub fn new(route_name: impl Into<String>) -> Self {
        Self {
            route_name: route_name.into(),
            ..Default::default()
        }
    }

    /// Reassigns waypoint indices to match their array positions.
    pub fn reindex_waypoints(&mut self) {
        for (index, waypoint) in self.waypoints.iter_mut().enumerate() {
            waypoint.index = index;
        }
    }
}

/// A polygonal region.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Area {
    /// Display name of the area
    pub area_name: String,
    /// Ordered polygon corners
    pub vertices: Vec<Vertex>,
    /// Handle of the persisted copy, if any
    #[serde(default)]
    pub external_ref: Option<String>,
}

impl Area {
    /// Creates an area without vertices.
    pub fn new(area_name: impl Into<String>) -> Self {
        Self {
            area_name: area_name.into(),
            ..Default::default()
        }
    }

    /// Reassigns vertex indices to match their array positions.
    pub fn reindex_vertices(&mut self) {
        for (index, vertex) in self.vertices.iter_mut().enumerate() {
            vertex.index = index;
        }
    }
}

/// All annotations of a session.
///
/// Used as the payload of render snapshots and as the on-disk document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Annotations {
    /// Labeled points
    pub points: Vec<Point>,
    /// Named spots
    pub spots: Vec<Spot>,
    /// Routes
    pub routes: Vec<Route>,
    /// Areas
    pub areas: Vec<Area>,
}

impl Annotations {
    /// Serialize the annotations to a JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize annotations from a JSON string
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Returns a copy with every coordinate converted from canvas to image space.
    pub fn to_image_space(&self, frame: &ImageFrame) -> Self {
        self.map_positions(|pos| frame.canvas_to_image(pos))
    }

    /// Returns a copy with every coordinate converted from image to canvas space.
    pub fn to_canvas_space(&self, frame: &ImageFrame) -> Self {
        self.map_positions(|pos| frame.image_to_canvas(pos))
    }

    fn map_positions(&self, convert: impl Fn(CanvasPos) -> CanvasPos) -> Self {
        let mut out = self.clone();
        for point in &mut out.points {
            let pos = convert(CanvasPos::new(point.x, point.y));
            point.x = pos.x;
            point.y = pos.y;
        }
        for spot in &mut out.spots {
            let pos = convert(CanvasPos::new(spot.x, spot.y));
            spot.x = pos.x;
            spot.y = pos.y;
        }
        for waypoint in out.routes.iter_mut().flat_map(|r| r.waypoints.iter_mut()) {
            let pos = convert(waypoint.pos());
            waypoint.x = pos.x;
            waypoint.y = pos.y;
        }
        for vertex in out.areas.iter_mut().flat_map(|a| a.vertices.iter_mut()) {
            let pos = convert(vertex.pos());
            vertex.x = pos.x;
            vertex.y = pos.y;
        }
        out
    }
}
