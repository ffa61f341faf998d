//! Canvas interaction and navigation functionality.
//!
//! This module turns egui pointer input into session calls. Every pointer
//! position is converted to canvas space with [`screen_to_canvas`] before the
//! session sees it; panning and zooming only touch the viewport.

use super::state::AnnotatorApp;
use crate::session::{PointerDown, PointerUp};
use crate::transform::{canvas_to_screen, screen_to_canvas, ZoomDirection};
use crate::types::EditMode;
use eframe::egui;

/// Largest rectangle with the backing store's aspect ratio that fits `available`.
///
/// The result shares `available`'s top-left corner.
pub fn fit_canvas_rect(available: egui::Rect, backing_size: egui::Vec2) -> egui::Rect {
    if backing_size.x <= 0.0 || backing_size.y <= 0.0 {
        return available;
    }
    let scale = (available.width() / backing_size.x).min(available.height() / backing_size.y);
    egui::Rect::from_min_size(available.min, backing_size * scale.max(0.0))
}

impl AnnotatorApp {
    /// Converts a screen position to canvas space for the displayed canvas.
    ///
    /// # Arguments
    ///
    /// * `screen_pos` - Position in screen space (pixels)
    /// * `canvas_rect` - Where the canvas is displayed
    pub fn screen_to_canvas(&self, screen_pos: egui::Pos2, canvas_rect: egui::Rect) -> egui::Pos2 {
        screen_to_canvas(
            screen_pos,
            canvas_rect,
            self.backing_size(),
            self.session.viewport(),
        )
    }

    /// Converts a canvas position to screen space for the displayed canvas.
    pub fn canvas_to_screen(&self, canvas_pos: egui::Pos2, canvas_rect: egui::Rect) -> egui::Pos2 {
        canvas_to_screen(
            canvas_pos,
            canvas_rect,
            self.backing_size(),
            self.session.viewport(),
        )
    }

    /// Screen pixels per canvas unit at the current zoom.
    pub fn screen_units_per_canvas_unit(&self, canvas_rect: egui::Rect) -> f32 {
        let backing = self.backing_size();
        if backing.x <= 0.0 {
            return self.session.viewport().scale;
        }
        canvas_rect.width() / backing.x * self.session.viewport().scale
    }

    /// Allocates the canvas, routes input to the session and draws the annotations.
    pub fn draw_canvas(&mut self, ui: &mut egui::Ui) {
        let canvas_rect = fit_canvas_rect(ui.available_rect_before_wrap(), self.backing_size());
        let response = ui.allocate_rect(canvas_rect, egui::Sense::click_and_drag());
        let painter = ui.painter_at(canvas_rect);

        // Dialogs waiting for an answer freeze the canvas
        let blocked = self.edit.pending_endpoint_change.is_some() || self.edit.pending_conflict.is_some();
        if !blocked {
            self.handle_canvas_panning(ui, &response);
            self.handle_canvas_zoom(ui, &response);
            if !self.edit.is_panning {
                self.handle_pointer(ui, &response);
            }
        }

        self.render_annotations(&painter, canvas_rect);
    }

    /// Handles middle-click or Cmd/Ctrl+left-click panning.
    ///
    /// # Arguments
    ///
    /// * `ui` - The egui UI context
    /// * `response` - The response from the canvas widget
    pub fn handle_canvas_panning(&mut self, ui: &mut egui::Ui, response: &egui::Response) {
        let should_pan = ui.input(|i| {
            i.pointer.middle_down() || (i.pointer.primary_down() && i.modifiers.command)
        });

        if !should_pan {
            self.edit.is_panning = false;
            self.edit.last_pan_pos = None;
            return;
        }
        let Some(current_pos) = ui.input(|i| i.pointer.latest_pos()) else {
            return;
        };
        match self.edit.last_pan_pos {
            Some(last_pos) if self.edit.is_panning => {
                // Screen delta converted to backing-store pixels
                let ratio = self.backing_size().x / response.rect.width().max(1.0);
                self.session.viewport_mut().pan_by((current_pos - last_pos) * ratio);
            }
            _ => {
                if !response.rect.contains(current_pos) {
                    return;
                }
                self.session.cancel_drag();
                self.edit.is_panning = true;
            }
        }
        self.edit.last_pan_pos = Some(current_pos);
    }

    /// Handles scroll wheel zooming around the cursor.
    ///
    /// One zoom step per scroll event; only while the cursor is over the canvas.
    pub fn handle_canvas_zoom(&mut self, ui: &mut egui::Ui, response: &egui::Response) {
        let scroll_delta = ui.input(|i| i.raw_scroll_delta.y);
        if scroll_delta == 0.0 {
            return;
        }
        let Some(mouse_pos) = ui.input(|i| i.pointer.hover_pos()) else {
            return;
        };
        if !response.rect.contains(mouse_pos) {
            return;
        }

        let direction = if scroll_delta > 0.0 {
            ZoomDirection::In
        } else {
            ZoomDirection::Out
        };
        let canvas_pos = self.screen_to_canvas(mouse_pos, response.rect);
        let anchor = self.session.viewport().canvas_to_backing(canvas_pos);
        self.session.zoom_at(anchor, direction);
    }

    /// Feeds primary and secondary button input to the session.
    fn handle_pointer(&mut self, ui: &mut egui::Ui, response: &egui::Response) {
        let rect = response.rect;
        let (pressed, released, pointer_pos, shift, command) = ui.input(|i| {
            (
                i.pointer.primary_pressed(),
                i.pointer.primary_released(),
                i.pointer.latest_pos(),
                i.modifiers.shift,
                i.modifiers.command,
            )
        });
        let Some(pointer_pos) = pointer_pos else {
            return;
        };
        let canvas_pos = self.screen_to_canvas(pointer_pos, rect);
        let mode = self.session.mode();

        if response.secondary_clicked() && mode == EditMode::Route {
            if let Some(index) = self.session.remove_nearest_waypoint(canvas_pos) {
                log::debug!("Removed waypoint {index}");
            }
        }

        if pressed && rect.contains(pointer_pos) && !command {
            if shift && mode == EditMode::Route {
                self.edit.selection_box = Some((canvas_pos, canvas_pos));
            } else {
                self.press_at(canvas_pos);
            }
        }

        if let Some((start, _)) = self.edit.selection_box {
            self.edit.selection_box = Some((start, canvas_pos));
            if released {
                self.edit.selection_box = None;
                let picked = self.session.select_waypoints_within(start, canvas_pos);
                self.status = Some(format!("{picked} waypoints selected"));
            }
            return;
        }

        if self.session.is_dragging() {
            self.session.pointer_move(canvas_pos);
            if released {
                if let PointerUp::Moved(outcome) = self.session.pointer_up(canvas_pos) {
                    log::debug!("Moved {} #{}", outcome.kind, outcome.index);
                }
            }
        }
    }

    fn press_at(&mut self, canvas_pos: egui::Pos2) {
        match self.session.pointer_down(canvas_pos) {
            PointerDown::Rejected(error) => {
                self.status = Some(error.to_string());
            }
            PointerDown::AreaSelected(index) => {
                self.edit.buffers.clear();
                self.status = self
                    .session
                    .areas()
                    .get(index)
                    .map(|area| format!("Selected area \"{}\"", area.area_name));
            }
            PointerDown::Created(_) | PointerDown::Grabbed(_) => {
                self.status = None;
            }
        }
    }
}
