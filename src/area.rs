//! Polygonal areas with vertex editing.
//!
//! Areas share the route collection shape: an ordered list with at most one
//! selected entry. Vertices are appended to the selected area; polygons with
//! fewer than three vertices are exposed as open polylines.

use crate::events::{BusEvent, EventBus, SyncHint};
use crate::types::{Area, CanvasPos, Vertex};
use crate::validation::ValidationError;

/// How an area should be drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AreaShape {
    /// No vertices yet
    Empty,
    /// One or two vertices; drawn as an open line
    Polyline,
    /// Three or more vertices; drawn as a filled region
    Polygon,
}

impl Area {
    /// Drawing shape for the current vertex count.
    pub fn shape(&self) -> AreaShape {
        match self.vertices.len() {
            0 => AreaShape::Empty,
            1 | 2 => AreaShape::Polyline,
            _ => AreaShape::Polygon,
        }
    }

    /// Even-odd point-in-polygon test. Open polylines contain nothing.
    pub fn contains(&self, pos: egui::Pos2) -> bool {
        if self.shape() != AreaShape::Polygon {
            return false;
        }
        let mut inside = false;
        let count = self.vertices.len();
        let mut j = count - 1;
        for i in 0..count {
            let a = self.vertices[i].pos().to_pos2();
            let b = self.vertices[j].pos().to_pos2();
            if (a.y > pos.y) != (b.y > pos.y) {
                let cross_x = (b.x - a.x) * (pos.y - a.y) / (b.y - a.y) + a.x;
                if pos.x < cross_x {
                    inside = !inside;
                }
            }
            j = i;
        }
        inside
    }
}

/// Notifications raised by [`AreaModel`].
#[derive(Debug, Clone, PartialEq)]
pub enum AreaEvent {
    /// Areas were added, removed or renamed
    AreasChanged {
        /// Number of areas after the change
        count: usize,
    },
    /// The selection changed; `None` means no area is selected
    SelectionChanged {
        /// Newly selected index
        index: Option<usize>,
    },
    /// A selection was requested while no area exists
    NoAreaAvailable,
    /// The vertices of an area changed
    VerticesChanged {
        /// Area index
        area: usize,
        /// Whether widgets must be rebuilt
        hint: SyncHint,
    },
}

/// Discriminant of [`AreaEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AreaEventKind {
    /// See [`AreaEvent::AreasChanged`]
    AreasChanged,
    /// See [`AreaEvent::SelectionChanged`]
    SelectionChanged,
    /// See [`AreaEvent::NoAreaAvailable`]
    NoAreaAvailable,
    /// See [`AreaEvent::VerticesChanged`]
    VerticesChanged,
}

impl BusEvent for AreaEvent {
    type Kind = AreaEventKind;

    fn kind(&self) -> AreaEventKind {
        match self {
            AreaEvent::AreasChanged { .. } => AreaEventKind::AreasChanged,
            AreaEvent::SelectionChanged { .. } => AreaEventKind::SelectionChanged,
            AreaEvent::NoAreaAvailable => AreaEventKind::NoAreaAvailable,
            AreaEvent::VerticesChanged { .. } => AreaEventKind::VerticesChanged,
        }
    }
}

/// Area collection with a single selection.
#[derive(Debug, Default)]
pub struct AreaModel {
    areas: Vec<Area>,
    selected: Option<usize>,
    events: EventBus<AreaEvent>,
}

impl AreaModel {
    /// Creates an empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Listener registry for area notifications.
    pub fn events_mut(&mut self) -> &mut EventBus<AreaEvent> {
        &mut self.events
    }

    /// All areas.
    pub fn areas(&self) -> &[Area] {
        &self.areas
    }

    /// Area at `index`.
    pub fn get(&self, index: usize) -> Option<&Area> {
        self.areas.get(index)
    }

    /// Number of areas.
    pub fn len(&self) -> usize {
        self.areas.len()
    }

    /// Whether there are no areas.
    pub fn is_empty(&self) -> bool {
        self.areas.is_empty()
    }

    /// Selected index, only if it is valid for the current collection.
    pub fn selected_index(&self) -> Option<usize> {
        self.selected.filter(|&index| index < self.areas.len())
    }

    /// The selected area.
    pub fn selected(&self) -> Option<&Area> {
        self.selected_index().and_then(|index| self.areas.get(index))
    }

    /// Appends an area, selects it and returns its index.
    pub fn add_area(&mut self, area_name: impl Into<String>) -> usize {
        self.areas.push(Area::new(area_name));
        let index = self.areas.len() - 1;
        log::debug!("Added area #{}", index);
        self.emit_areas_changed();
        self.select(Some(index));
        index
    }

    /// Removes an area, keeping the selection pointed at the same area where possible.
    pub fn delete_area(&mut self, index: usize) -> Option<Area> {
        if index >= self.areas.len() {
            return None;
        }
        let previous = self.selected_index();
        let removed = self.areas.remove(index);
        self.selected = match previous {
            Some(selected) if selected == index => None,
            Some(selected) if selected > index => Some(selected - 1),
            other => other,
        };
        self.emit_areas_changed();
        if previous != self.selected_index() {
            self.events.emit(AreaEvent::SelectionChanged {
                index: self.selected_index(),
            });
        }
        Some(removed)
    }

    /// Renames an area. Returns `false` for an invalid index.
    pub fn rename_area(&mut self, index: usize, area_name: impl Into<String>) -> bool {
        let Some(area) = self.areas.get_mut(index) else {
            return false;
        };
        area.area_name = area_name.into();
        self.emit_areas_changed();
        true
    }

    /// Replaces every area and clears the selection.
    pub fn replace_all(&mut self, mut areas: Vec<Area>) {
        for area in &mut areas {
            area.reindex_vertices();
        }
        self.areas = areas;
        self.selected = None;
        self.emit_areas_changed();
        self.events.emit(AreaEvent::SelectionChanged { index: None });
    }

    /// Selects an area, or clears the selection with `None`.
    ///
    /// Mirrors [`crate::route::RouteModel::select`].
    pub fn select(&mut self, index: Option<usize>) -> bool {
        if index.is_some() && self.areas.is_empty() {
            self.selected = None;
            self.events.emit(AreaEvent::NoAreaAvailable);
            return false;
        }
        self.selected = index.filter(|&i| i < self.areas.len());
        self.events.emit(AreaEvent::SelectionChanged {
            index: self.selected,
        });
        self.selected.is_some()
    }

    /// Appends a vertex to the selected area.
    ///
    /// Without a selection this is a reported no-op.
    pub fn add_vertex(&mut self, pos: CanvasPos) -> Result<usize, ValidationError> {
        let area_index = self.selected_index().ok_or(ValidationError::NoAreaSelected)?;
        let area = &mut self.areas[area_index];
        let index = area.vertices.len();
        area.vertices.push(Vertex {
            x: pos.x,
            y: pos.y,
            index,
        });
        self.emit_vertices_changed(area_index, SyncHint::Full);
        Ok(index)
    }

    /// Moves a vertex of the selected area. Returns whether a write happened.
    pub fn update_vertex(&mut self, index: usize, pos: CanvasPos, hint: SyncHint) -> bool {
        let Some(area_index) = self.selected_index() else {
            return false;
        };
        let Some(vertex) = self.areas[area_index].vertices.get_mut(index) else {
            return false;
        };
        vertex.x = pos.x;
        vertex.y = pos.y;
        self.emit_vertices_changed(area_index, hint);
        true
    }

    /// Removes a vertex of the selected area and re-sequences the rest.
    pub fn remove_vertex(&mut self, index: usize) -> Option<Vertex> {
        let area_index = self.selected_index()?;
        let area = &mut self.areas[area_index];
        if index >= area.vertices.len() {
            return None;
        }
        let removed = area.vertices.remove(index);
        area.reindex_vertices();
        self.emit_vertices_changed(area_index, SyncHint::Full);
        Some(removed)
    }

    /// Lowest-index vertex of the selected area within `radius` of `pos`.
    pub fn find_vertex_at(&self, pos: egui::Pos2, radius: f32) -> Option<usize> {
        self.selected()?
            .vertices
            .iter()
            .position(|v| v.pos().distance_to(pos) <= radius)
    }

    /// Topmost (highest-index) area whose polygon contains `pos`.
    pub fn find_area_containing(&self, pos: egui::Pos2) -> Option<usize> {
        self.areas.iter().rposition(|area| area.contains(pos))
    }

    /// Re-inserts a dragged vertex where it lengthens the outline the least.
    ///
    /// The vertex at `index` is taken out of the selected polygon and put back
    /// on the edge `a -> b` minimizing `|a v| + |v b| - |a b|`; ties go to the
    /// lowest edge. The other vertices keep their relative order. Polygons with
    /// fewer than four vertices are left alone. Returns the vertex's new index.
    pub fn reorder_vertices(&mut self, index: usize) -> Option<usize> {
        let area_index = self.selected_index()?;
        let area = &mut self.areas[area_index];
        if index >= area.vertices.len() {
            return None;
        }
        if area.vertices.len() < 4 {
            return Some(index);
        }

        let moved = area.vertices.remove(index);
        let v = moved.pos().to_pos2();
        let count = area.vertices.len();
        let mut best_edge = 0;
        let mut best_cost = f32::INFINITY;
        for i in 0..count {
            let a = area.vertices[i].pos().to_pos2();
            let b = area.vertices[(i + 1) % count].pos().to_pos2();
            let cost = a.distance(v) + v.distance(b) - a.distance(b);
            if cost < best_cost {
                best_cost = cost;
                best_edge = i;
            }
        }
        let new_index = best_edge + 1;
        area.vertices.insert(new_index, moved);
        area.reindex_vertices();
        if new_index != index {
            log::debug!(
                "Reordered vertex {} -> {} in area #{}",
                index,
                new_index,
                area_index
            );
        }
        self.emit_vertices_changed(area_index, SyncHint::Full);
        Some(new_index)
    }

    /// Records the handle of the persisted copy of an area.
    pub fn set_external_ref(&mut self, index: usize, external_ref: Option<String>) -> bool {
        let Some(area) = self.areas.get_mut(index) else {
            return false;
        };
        area.external_ref = external_ref;
        true
    }

    fn emit_areas_changed(&mut self) {
        self.events.emit(AreaEvent::AreasChanged {
            count: self.areas.len(),
        });
    }

    fn emit_vertices_changed(&mut self, area: usize, hint: SyncHint) {
        self.events.emit(AreaEvent::VerticesChanged { area, hint });
    }
}
