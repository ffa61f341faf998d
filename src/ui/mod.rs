//! User interface for the site annotator.
//!
//! This module contains the eframe application: toolbar, properties panel,
//! canvas and the modal prompts that wait for a user decision.
//!
//! # Module Organization
//!
//! - `state` - Application state structures and the main AnnotatorApp
//! - `file_ops` - Document, image and backend operations
//! - `canvas` - Pointer routing, zooming and panning
//! - `rendering` - Drawing the image and annotation layers

mod canvas;
mod file_ops;
mod rendering;
mod state;

pub use state::{AnnotatorApp, EditorSettings};

use self::state::{EditField, PendingEndpointChange};
use crate::route::{EndpointOutcome, RouteState};
use crate::transform::{PanDirection, ZoomDirection};
use crate::types::{EditMode, EntityKind};
use crate::validation::{Endpoint, FieldRef};
use eframe::egui;
use std::collections::HashMap;

/// Key under which settings are stored between restarts.
const STORAGE_KEY: &str = "app_state";

/// Shows a text field whose value is only applied when it loses focus.
///
/// While focused the typed text lives in `buffers`; otherwise the field shows
/// `current`. Returns the typed text when focus is lost on a changed value.
fn commit_field(
    ui: &mut egui::Ui,
    buffers: &mut HashMap<EditField, String>,
    field: EditField,
    current: &str,
    hint: &str,
) -> Option<String> {
    let mut text = buffers
        .get(&field)
        .cloned()
        .unwrap_or_else(|| current.to_string());
    let response = ui.add(
        egui::TextEdit::singleline(&mut text)
            .hint_text(hint)
            .desired_width(f32::INFINITY),
    );

    if response.lost_focus() {
        buffers.remove(&field);
        return (text != current).then_some(text);
    }
    if response.has_focus() {
        buffers.insert(field, text);
    } else {
        buffers.remove(&field);
    }
    None
}

impl eframe::App for AnnotatorApp {
    /// Persist settings between restarts.
    fn save(&mut self, storage: &mut dyn eframe::Storage) {
        self.capture_settings();
        match self.settings.to_json() {
            Ok(json) => storage.set_string(STORAGE_KEY, json),
            Err(err) => log::error!("Failed to serialize settings: {err}"),
        }
    }

    /// Main update function called by egui for each frame.
    ///
    /// # Arguments
    ///
    /// * `ctx` - The egui context
    /// * `_frame` - The eframe frame
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let visuals = if self.settings.dark_mode {
            egui::Visuals::dark()
        } else {
            egui::Visuals::light()
        };
        ctx.set_visuals(visuals);

        self.handle_pending_operations(ctx);
        self.handle_keyboard(ctx);

        egui::TopBottomPanel::top("top_toolbar").show(ctx, |ui| {
            self.draw_toolbar(ui);
        });

        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            self.draw_status_bar(ui);
        });

        let viewport_width = ctx.input(|i| i.content_rect().width());
        let max_allowed = (viewport_width * 0.9).max(180.0);
        let clamped_width = self.settings.properties_panel_width.clamp(180.0, max_allowed);

        egui::SidePanel::right("properties_panel")
            .resizable(true)
            .default_width(clamped_width)
            .show(ctx, |ui| {
                self.settings.properties_panel_width = ui.available_width().clamp(180.0, max_allowed);
                self.draw_properties_panel(ui);
            });

        egui::CentralPanel::default().show(ctx, |ui| {
            self.draw_canvas(ui);
        });

        self.draw_endpoint_confirmation(ctx);
        self.draw_conflict_dialog(ctx);

        // Edits made this frame reach the backend without waiting for more input
        self.flush_persistence(ctx);
    }
}

impl AnnotatorApp {
    /// Creates the app, restoring settings saved by a previous run.
    pub fn new(cc: &eframe::CreationContext<'_>) -> Self {
        let settings = cc
            .storage
            .and_then(|storage| storage.get_string(STORAGE_KEY))
            .and_then(|json| match EditorSettings::from_json(&json) {
                Ok(settings) => Some(settings),
                Err(err) => {
                    log::warn!("Ignoring unreadable saved settings: {err}");
                    None
                }
            })
            .unwrap_or_default();
        Self::with_settings(settings)
    }

    /// Switches the edit mode from the toolbar or keyboard.
    pub fn set_mode(&mut self, mode: EditMode) {
        self.session.set_mode(mode);
        self.edit.buffers.clear();
        self.edit.selection_box = None;
    }

    /// Handles editor keyboard shortcuts.
    ///
    /// Skipped while a text field has focus.
    fn handle_keyboard(&mut self, ctx: &egui::Context) {
        if ctx.wants_keyboard_input() {
            return;
        }
        let (command, shift) = ctx.input(|i| (i.modifiers.command, i.modifiers.shift));
        let pressed = |key: egui::Key| ctx.input(|i| i.key_pressed(key));

        if command {
            if pressed(egui::Key::S) {
                if shift {
                    self.save_document_as();
                } else {
                    self.save_document();
                }
            }
            if pressed(egui::Key::O) {
                self.open_document();
            }
            return;
        }

        if pressed(egui::Key::Escape) {
            if self.session.cancel_drag() {
                self.status = Some("Drag cancelled".to_string());
            }
            self.edit.selection_box = None;
        }
        if pressed(egui::Key::Delete) || pressed(egui::Key::Backspace) {
            if self.session.delete_selection() {
                self.edit.buffers.clear();
                self.session.validate_all(&mut self.issues);
            }
        }

        for (key, direction) in [
            (egui::Key::ArrowLeft, PanDirection::Left),
            (egui::Key::ArrowRight, PanDirection::Right),
            (egui::Key::ArrowUp, PanDirection::Up),
            (egui::Key::ArrowDown, PanDirection::Down),
        ] {
            if pressed(key) {
                self.session.pan(direction);
            }
        }
        if pressed(egui::Key::Plus) || pressed(egui::Key::Equals) {
            self.session.zoom(ZoomDirection::In);
        }
        if pressed(egui::Key::Minus) {
            self.session.zoom(ZoomDirection::Out);
        }
        if pressed(egui::Key::Num0) {
            self.session.viewport_mut().reset();
        }

        for (key, mode) in [
            egui::Key::Num1,
            egui::Key::Num2,
            egui::Key::Num3,
            egui::Key::Num4,
        ]
        .into_iter()
        .zip(EditMode::ALL)
        {
            if pressed(key) {
                self.set_mode(mode);
            }
        }
    }

    /// Renders the toolbar with file operations, edit modes and view options.
    fn draw_toolbar(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            if ui.button("Open…").clicked() {
                self.open_document();
            }
            if ui.button("Save").clicked() {
                self.save_document();
            }
            if ui.button("Save As…").clicked() {
                self.save_document_as();
            }
            if ui.button("Load Image…").clicked() {
                self.open_image();
            }

            ui.separator();

            let mut mode = self.session.mode();
            for candidate in EditMode::ALL {
                ui.selectable_value(&mut mode, candidate, candidate.label());
            }
            if mode != self.session.mode() {
                self.set_mode(mode);
            }

            ui.separator();

            if ui.button("−").on_hover_text("Zoom out").clicked() {
                self.session.zoom(ZoomDirection::Out);
            }
            ui.label(format!("{:.0}%", self.session.viewport().scale * 100.0));
            if ui.button("+").on_hover_text("Zoom in").clicked() {
                self.session.zoom(ZoomDirection::In);
            }
            for (label, direction) in [
                ("⬅", PanDirection::Left),
                ("➡", PanDirection::Right),
                ("⬆", PanDirection::Up),
                ("⬇", PanDirection::Down),
            ] {
                if ui.button(label).on_hover_text("Pan").clicked() {
                    self.session.pan(direction);
                }
            }
            if ui.button("Reset View").clicked() {
                self.session.viewport_mut().reset();
            }

            ui.separator();

            ui.checkbox(&mut self.settings.show_labels, "Labels");
            let theme_label = if self.settings.dark_mode { "Light" } else { "Dark" };
            if ui.button(theme_label).clicked() {
                self.settings.dark_mode = !self.settings.dark_mode;
            }
        });
    }

    fn draw_status_bar(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            let name = self
                .file
                .current_path
                .as_deref()
                .unwrap_or("Untitled");
            let marker = if self.has_unsaved_changes() { " •" } else { "" };
            ui.label(format!("{name}{marker}"));
            if let Some(status) = &self.status {
                ui.separator();
                ui.label(status.as_str());
            }
        });
    }

    /// Renders the right-side panel for the current edit mode.
    fn draw_properties_panel(&mut self, ui: &mut egui::Ui) {
        egui::ScrollArea::vertical().show(ui, |ui| {
            match self.session.mode() {
                EditMode::Point => self.draw_point_list(ui),
                EditMode::Spot => self.draw_spot_list(ui),
                EditMode::Route => self.draw_route_properties(ui),
                EditMode::Area => self.draw_area_properties(ui),
            }

            ui.separator();
            ui.horizontal(|ui| {
                ui.heading("Validation");
                if ui.button("Check All").clicked() {
                    self.session.validate_all(&mut self.issues);
                }
            });
            if self.issues.is_empty() {
                ui.label("No problems found");
            }
            let error_color = ui.visuals().error_fg_color;
            for (field, message) in self.issues.messages() {
                ui.colored_label(error_color, format!("{}: {message}", describe_field(*field)));
            }
        });
    }

    fn draw_field_issue(&self, ui: &mut egui::Ui, field: FieldRef) {
        if let Some(message) = self.issues.message(field) {
            let error_color = ui.visuals().error_fg_color;
            ui.colored_label(error_color, message);
        }
    }

    fn draw_point_list(&mut self, ui: &mut egui::Ui) {
        ui.heading("Points");
        if self.session.points().is_empty() {
            ui.label("Click the canvas to place a point.");
        }
        let selection = self.session.selection();
        for index in 0..self.session.points().len() {
            let Some(point) = self.session.points().get(index) else {
                break;
            };
            let current = point.id.clone();
            let position = format!("({}, {})", point.x, point.y);
            let mut committed = None;
            ui.horizontal(|ui| {
                let selected = selection.is_some_and(|hit| hit.kind == EntityKind::Point && hit.index == index);
                ui.label(if selected { "▶" } else { " " });
                ui.label(position);
                committed = commit_field(ui, &mut self.edit.buffers, EditField::PointLabel(index), &current, "A-01");
            });
            self.draw_field_issue(ui, FieldRef::PointId(index));
            if let Some(raw) = committed {
                if let Err(error) = self.session.commit_point_label(index, &raw, &mut self.issues) {
                    self.status = Some(error.to_string());
                }
                // Removal shifts indices
                self.edit.buffers.clear();
                break;
            }
        }
    }

    fn draw_spot_list(&mut self, ui: &mut egui::Ui) {
        ui.heading("Spots");
        if self.session.spots().is_empty() {
            ui.label("Click the canvas to place a spot.");
        }
        let selection = self.session.selection();
        for index in 0..self.session.spots().len() {
            let Some(spot) = self.session.spots().get(index) else {
                break;
            };
            let current = spot.name.clone();
            let position = format!("({}, {})", spot.x, spot.y);
            let mut committed = None;
            ui.horizontal(|ui| {
                let selected = selection.is_some_and(|hit| hit.kind == EntityKind::Spot && hit.index == index);
                ui.label(if selected { "▶" } else { " " });
                ui.label(position);
                committed = commit_field(ui, &mut self.edit.buffers, EditField::SpotName(index), &current, "Name");
            });
            self.draw_field_issue(ui, FieldRef::SpotName(index));
            if let Some(raw) = committed {
                if let Err(error) = self.session.commit_spot_name(index, &raw, &mut self.issues) {
                    self.status = Some(error.to_string());
                }
                self.edit.buffers.clear();
                break;
            }
        }
    }

    fn draw_route_properties(&mut self, ui: &mut egui::Ui) {
        ui.heading("Routes");
        if ui.button("Add Route").clicked() {
            let name = format!("Route {}", self.session.routes().len() + 1);
            self.session.add_route(&name);
            self.edit.buffers.clear();
        }

        let selected = self.session.routes().selected_index();
        let mut clicked = None;
        for (index, route) in self.session.routes().routes().iter().enumerate() {
            let marker = if route.is_modified { " •" } else { "" };
            let label = format!("{}{marker}", route.route_name);
            if ui.selectable_label(selected == Some(index), label).clicked() {
                clicked = Some(index);
            }
        }
        if let Some(index) = clicked {
            self.session.select_route(Some(index));
            self.edit.buffers.clear();
        }

        let Some(index) = self.session.routes().selected_index() else {
            ui.label("Select or add a route to edit it.");
            return;
        };
        let Some(route) = self.session.routes().get(index).cloned() else {
            return;
        };

        ui.separator();
        ui.label("Name");
        if let Some(name) = commit_field(ui, &mut self.edit.buffers, EditField::RouteName(index), &route.route_name, "Route name") {
            self.session.rename_route(index, name.trim());
        }

        for (endpoint, title) in [(Endpoint::Start, "Start"), (Endpoint::End, "End")] {
            ui.label(title);
            let field = EditField::RouteEndpoint(index, endpoint);
            if let Some(raw) = commit_field(ui, &mut self.edit.buffers, field, route.endpoint(endpoint), "Point id or spot name") {
                self.commit_endpoint(index, endpoint, raw);
            }
            self.draw_field_issue(ui, FieldRef::route(endpoint, index));
        }

        let state = match route.state() {
            RouteState::Empty => "Set a start and end",
            RouteState::StartSet => "Set an end",
            RouteState::BothSet => "Click the canvas to add waypoints",
        };
        ui.label(state);
        ui.label(format!("{} waypoints", route.waypoints.len()));
        if !self.session.selected_waypoints().is_empty() {
            ui.label(format!(
                "{} selected, press Delete to remove",
                self.session.selected_waypoints().len()
            ));
        }

        if ui.button("Delete Route").clicked() {
            self.session.delete_route(index);
            self.edit.buffers.clear();
            self.session.validate_all(&mut self.issues);
        }
    }

    /// Commits endpoint text, asking first when waypoints would be dropped.
    pub fn commit_endpoint(&mut self, route: usize, endpoint: Endpoint, raw: String) {
        let mut waypoint_count = None;
        let commit = self.session.commit_route_endpoint(
            route,
            endpoint,
            &raw,
            |existing| {
                waypoint_count = Some(existing.waypoints.len());
                false
            },
            &mut self.issues,
        );

        match (commit.outcome, waypoint_count) {
            (EndpointOutcome::Declined, Some(waypoint_count)) => {
                self.edit.pending_endpoint_change = Some(PendingEndpointChange {
                    route,
                    endpoint,
                    raw,
                    waypoint_count,
                });
            }
            (EndpointOutcome::InvalidIndex, _) => {
                self.status = Some(format!("Route #{route} no longer exists"));
            }
            _ => {}
        }
    }

    fn draw_area_properties(&mut self, ui: &mut egui::Ui) {
        ui.heading("Areas");
        if ui.button("Add Area").clicked() {
            let name = format!("Area {}", self.session.areas().len() + 1);
            self.session.add_area(&name);
            self.edit.buffers.clear();
        }

        let selected = self.session.areas().selected_index();
        let mut clicked = None;
        for (index, area) in self.session.areas().areas().iter().enumerate() {
            if ui.selectable_label(selected == Some(index), area.area_name.as_str()).clicked() {
                clicked = Some(index);
            }
        }
        if let Some(index) = clicked {
            self.session.select_area(Some(index));
            self.edit.buffers.clear();
        }

        let Some(index) = self.session.areas().selected_index() else {
            ui.label("Select an area, or click inside one on the canvas.");
            return;
        };
        let Some(area) = self.session.areas().get(index).cloned() else {
            return;
        };

        ui.separator();
        ui.label("Name");
        if let Some(name) = commit_field(ui, &mut self.edit.buffers, EditField::AreaName(index), &area.area_name, "Area name") {
            self.session.rename_area(index, name.trim());
        }
        ui.label(format!("{} vertices", area.vertices.len()));
        if ui.button("Delete Area").clicked() {
            self.session.delete_area(index);
            self.edit.buffers.clear();
        }
    }

    /// Asks whether an endpoint change may drop the route's waypoints.
    fn draw_endpoint_confirmation(&mut self, ctx: &egui::Context) {
        let Some(pending) = self.edit.pending_endpoint_change.clone() else {
            return;
        };
        let mut answer = None;
        egui::Window::new("Change endpoint?")
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, egui::vec2(0.0, 0.0))
            .show(ctx, |ui| {
                ui.label(format!(
                    "Changing this endpoint removes the route's {} waypoints.",
                    pending.waypoint_count
                ));
                ui.horizontal(|ui| {
                    if ui.button("Change and Clear").clicked() {
                        answer = Some(true);
                    }
                    if ui.button("Cancel").clicked() {
                        answer = Some(false);
                    }
                });
            });

        match answer {
            Some(true) => {
                self.edit.pending_endpoint_change = None;
                self.session.commit_route_endpoint(
                    pending.route,
                    pending.endpoint,
                    &pending.raw,
                    |_| true,
                    &mut self.issues,
                );
            }
            Some(false) => {
                self.edit.pending_endpoint_change = None;
                self.edit
                    .buffers
                    .remove(&EditField::RouteEndpoint(pending.route, pending.endpoint));
            }
            None => {}
        }
    }

    /// Offers overwriting a stored record that a creation collided with.
    fn draw_conflict_dialog(&mut self, ctx: &egui::Context) {
        let Some(conflict) = self.edit.pending_conflict.clone() else {
            return;
        };
        let mut overwrite = None;
        egui::Window::new("Already stored")
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, egui::vec2(0.0, 0.0))
            .show(ctx, |ui| {
                ui.label(format!(
                    "A {} named \"{}\" is already stored. Overwrite it?",
                    conflict.attempted.kind(),
                    conflict.attempted.key()
                ));
                ui.horizontal(|ui| {
                    if ui.button("Overwrite").clicked() {
                        overwrite = Some(true);
                    }
                    if ui.button("Keep Stored").clicked() {
                        overwrite = Some(false);
                    }
                });
            });

        match overwrite {
            Some(true) => {
                self.edit.pending_conflict = None;
                self.session.overwrite_conflict(conflict);
            }
            Some(false) => self.edit.pending_conflict = None,
            None => {}
        }
    }
}

/// Short description of a field for the validation list.
fn describe_field(field: FieldRef) -> String {
    match field {
        FieldRef::PointId(index) => format!("Point #{}", index + 1),
        FieldRef::SpotName(index) => format!("Spot #{}", index + 1),
        FieldRef::RouteStart(index) => format!("Route #{} start", index + 1),
        FieldRef::RouteEnd(index) => format!("Route #{} end", index + 1),
    }
}
