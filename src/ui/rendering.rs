//! Canvas rendering for the reference image and every annotation layer.
//!
//! Drawing reads a [`RenderSnapshot`] so nothing here can mutate the session.
//! Layers are painted back to front: image, areas, routes, spots and points,
//! then the selection box.

use super::state::AnnotatorApp;
use crate::area::AreaShape;
use crate::constants::{POINT_RADIUS, SPOT_RADIUS, VERTEX_RADIUS, WAYPOINT_RADIUS};
use crate::hit_test::Hit;
use crate::session::RenderSnapshot;
use crate::types::{Annotations, Area, CanvasPos, EntityKind, Route};
use eframe::egui;
use eframe::epaint::StrokeKind;

const POINT_COLOR: egui::Color32 = egui::Color32::from_rgb(66, 135, 245);
const SPOT_COLOR: egui::Color32 = egui::Color32::from_rgb(245, 166, 35);
const ROUTE_COLOR: egui::Color32 = egui::Color32::from_rgb(80, 200, 120);
const AREA_COLOR: egui::Color32 = egui::Color32::from_rgb(200, 90, 200);
const HIGHLIGHT_COLOR: egui::Color32 = egui::Color32::from_rgb(255, 230, 0);

/// Position of the point id or spot name a route endpoint refers to.
///
/// Spots win when a point and a spot share the label.
pub fn referent_position(annotations: &Annotations, text: &str) -> Option<CanvasPos> {
    if text.is_empty() {
        return None;
    }
    annotations
        .spots
        .iter()
        .find(|spot| spot.name == text)
        .map(|spot| CanvasPos::new(spot.x, spot.y))
        .or_else(|| {
            annotations
                .points
                .iter()
                .find(|point| point.id == text)
                .map(|point| CanvasPos::new(point.x, point.y))
        })
}

/// Screen-space polyline of a route: start referent, waypoints, end referent.
fn route_path(
    route: &Route,
    annotations: &Annotations,
    to_screen: &impl Fn(CanvasPos) -> egui::Pos2,
) -> Vec<egui::Pos2> {
    let start = referent_position(annotations, &route.start_ref);
    let end = referent_position(annotations, &route.end_ref);
    start
        .into_iter()
        .chain(route.waypoints.iter().map(|w| w.pos()))
        .chain(end)
        .map(to_screen)
        .collect()
}

impl AnnotatorApp {
    /// Renders the reference image and all annotations on the canvas.
    ///
    /// # Arguments
    ///
    /// * `painter` - Painter clipped to the canvas
    /// * `canvas_rect` - The screen-space rectangle of the canvas area
    pub fn render_annotations(&self, painter: &egui::Painter, canvas_rect: egui::Rect) {
        let snapshot = self.session.snapshot();
        let to_screen = |pos: CanvasPos| self.canvas_to_screen(pos.to_pos2(), canvas_rect);
        let zoom = self.screen_units_per_canvas_unit(canvas_rect);

        self.draw_background(painter, canvas_rect, &to_screen);

        for (index, area) in snapshot.annotations.areas.iter().enumerate() {
            let selected = snapshot.selected_area == Some(index);
            self.draw_area(painter, area, selected, &snapshot, zoom, &to_screen);
        }

        for (index, route) in snapshot.annotations.routes.iter().enumerate() {
            let selected = snapshot.selected_route == Some(index);
            self.draw_route(painter, route, selected, &snapshot, zoom, &to_screen);
        }

        for (index, spot) in snapshot.annotations.spots.iter().enumerate() {
            let highlighted = snapshot.selection == Some(Hit::new(EntityKind::Spot, index));
            self.draw_marker(
                painter,
                to_screen(CanvasPos::new(spot.x, spot.y)),
                SPOT_RADIUS * zoom,
                SPOT_COLOR,
                highlighted,
                &spot.name,
            );
        }

        for (index, point) in snapshot.annotations.points.iter().enumerate() {
            let highlighted = snapshot.selection == Some(Hit::new(EntityKind::Point, index));
            self.draw_marker(
                painter,
                to_screen(CanvasPos::new(point.x, point.y)),
                POINT_RADIUS * zoom,
                POINT_COLOR,
                highlighted,
                &point.id,
            );
        }

        if let Some((start, end)) = self.edit.selection_box {
            let rect = egui::Rect::from_two_pos(
                self.canvas_to_screen(start, canvas_rect),
                self.canvas_to_screen(end, canvas_rect),
            );
            painter.rect_filled(rect, 0.0, egui::Color32::from_rgba_unmultiplied(100, 150, 255, 40));
            painter.rect_stroke(
                rect,
                0.0,
                egui::Stroke::new(1.5, egui::Color32::from_rgb(100, 150, 255)),
                StrokeKind::Inside,
            );
        }
    }

    fn draw_background(
        &self,
        painter: &egui::Painter,
        canvas_rect: egui::Rect,
        to_screen: &impl Fn(CanvasPos) -> egui::Pos2,
    ) {
        let background = if self.settings.dark_mode {
            egui::Color32::from_gray(30)
        } else {
            egui::Color32::from_gray(235)
        };
        painter.rect_filled(canvas_rect, 0.0, background);

        let Some(image) = &self.image else {
            return;
        };
        let frame = self.session.frame();
        let image_rect = egui::Rect::from_min_max(
            to_screen(CanvasPos::new(0, 0)),
            to_screen(CanvasPos::new(frame.canvas_width as i32, frame.canvas_height as i32)),
        );
        let uv = egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0));
        painter.image(image.texture.id(), image_rect, uv, egui::Color32::WHITE);
    }

    fn draw_area(
        &self,
        painter: &egui::Painter,
        area: &Area,
        selected: bool,
        snapshot: &RenderSnapshot,
        zoom: f32,
        to_screen: &impl Fn(CanvasPos) -> egui::Pos2,
    ) {
        let outline: Vec<egui::Pos2> = area.vertices.iter().map(|v| to_screen(v.pos())).collect();
        let width = if selected { 2.5 } else { 1.5 };
        let stroke = egui::Stroke::new(width, AREA_COLOR);

        match area.shape() {
            AreaShape::Empty => return,
            AreaShape::Polyline => {
                painter.add(egui::Shape::line(outline.clone(), stroke));
            }
            AreaShape::Polygon => {
                painter.add(egui::Shape::closed_line(outline.clone(), stroke));
                if let Some(anchor) = outline.first() {
                    painter.text(
                        *anchor + egui::vec2(4.0, -4.0),
                        egui::Align2::LEFT_BOTTOM,
                        &area.area_name,
                        egui::FontId::proportional(12.0),
                        AREA_COLOR,
                    );
                }
            }
        }

        if !selected {
            return;
        }
        for (index, pos) in outline.iter().enumerate() {
            let highlighted = snapshot.selection == Some(Hit::new(EntityKind::AreaVertex, index));
            self.draw_handle(painter, *pos, VERTEX_RADIUS * zoom, AREA_COLOR, highlighted);
        }
    }

    fn draw_route(
        &self,
        painter: &egui::Painter,
        route: &Route,
        selected: bool,
        snapshot: &RenderSnapshot,
        zoom: f32,
        to_screen: &impl Fn(CanvasPos) -> egui::Pos2,
    ) {
        let path = route_path(route, &snapshot.annotations, to_screen);
        let color = if selected {
            ROUTE_COLOR
        } else {
            ROUTE_COLOR.gamma_multiply(0.5)
        };
        if path.len() >= 2 {
            let width = if selected { 3.0 } else { 1.5 };
            painter.add(egui::Shape::line(path, egui::Stroke::new(width, color)));
        }

        if !selected {
            return;
        }
        for (index, waypoint) in route.waypoints.iter().enumerate() {
            let highlighted = snapshot.selection == Some(Hit::new(EntityKind::Waypoint, index))
                || snapshot.selected_waypoints.contains(&index);
            self.draw_handle(
                painter,
                to_screen(waypoint.pos()),
                WAYPOINT_RADIUS * zoom,
                color,
                highlighted,
            );
        }
    }

    fn draw_marker(
        &self,
        painter: &egui::Painter,
        center: egui::Pos2,
        radius: f32,
        color: egui::Color32,
        highlighted: bool,
        label: &str,
    ) {
        painter.circle_filled(center, radius, color);
        let outline = if highlighted {
            egui::Stroke::new(2.5, HIGHLIGHT_COLOR)
        } else {
            egui::Stroke::new(1.0, egui::Color32::BLACK)
        };
        painter.circle_stroke(center, radius, outline);

        if self.settings.show_labels && !label.is_empty() {
            let text_color = if self.settings.dark_mode {
                egui::Color32::from_gray(230)
            } else {
                egui::Color32::from_gray(30)
            };
            painter.text(
                center + egui::vec2(radius + 3.0, 0.0),
                egui::Align2::LEFT_CENTER,
                label,
                egui::FontId::proportional(12.0),
                text_color,
            );
        }
    }

    fn draw_handle(
        &self,
        painter: &egui::Painter,
        center: egui::Pos2,
        radius: f32,
        color: egui::Color32,
        highlighted: bool,
    ) {
        let fill = if highlighted { HIGHLIGHT_COLOR } else { egui::Color32::WHITE };
        painter.circle_filled(center, radius, fill);
        painter.circle_stroke(center, radius, egui::Stroke::new(1.5, color));
    }
}
