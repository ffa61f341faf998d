//! Application state management structures.
//!
//! This module contains the state the desktop shell keeps around the editing
//! session: persisted settings, file operations, text-field buffers, dialogs
//! waiting for an answer and the loaded reference image.

use crate::area::AreaEventKind;
use crate::constants::{DEFAULT_CANVAS_HEIGHT, DEFAULT_CANVAS_WIDTH};
use crate::persistence::{AnnotationBackend, DuplicateConflict, MemoryBackend, PersistenceResult};
use crate::route::RouteEventKind;
use crate::session::EditorSession;
use crate::transform::{ImageFrame, Viewport};
use crate::types::EditMode;
use crate::validation::{Endpoint, IssueBoard};
use eframe::egui;
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;

/// User preferences persisted between restarts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorSettings {
    /// Whether dark mode visuals are enabled
    pub dark_mode: bool,
    /// Whether point ids and spot names are drawn next to their markers
    pub show_labels: bool,
    /// Remembered width of the properties panel
    pub properties_panel_width: f32,
    /// Edit mode active when the app was closed
    pub last_mode: EditMode,
    /// Zoom and pan active when the app was closed
    pub viewport: Viewport,
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            dark_mode: true,
            show_labels: true,
            properties_panel_width: 300.0,
            last_mode: EditMode::Point,
            viewport: Viewport::default(),
        }
    }
}

impl EditorSettings {
    /// Serializes the settings to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserializes settings from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// State related to file operations.
///
/// Manages document paths, unsaved changes tracking and async results.
pub struct FileState {
    /// Path of the open annotation document
    pub current_path: Option<String>,
    /// Path of the loaded reference image
    pub image_path: Option<String>,
    /// Set by the session's change listeners, cleared on save or load
    pub has_unsaved_changes: Rc<Cell<bool>>,
    /// Save requested this frame
    pub pending_save_operation: Option<PendingSaveOperation>,
    /// Load requested this frame
    pub pending_load_operation: Option<PendingLoadOperation>,
    /// Channel for receiving results from async contexts
    pub file_operation_sender: Option<Sender<FileOperationResult>>,
    /// Receiving end of the result channel
    pub file_operation_receiver: Option<Receiver<FileOperationResult>>,
}

impl Default for FileState {
    fn default() -> Self {
        let (sender, receiver) = channel();
        Self {
            current_path: None,
            image_path: None,
            has_unsaved_changes: Rc::new(Cell::new(false)),
            pending_save_operation: None,
            pending_load_operation: None,
            file_operation_sender: Some(sender),
            file_operation_receiver: Some(receiver),
        }
    }
}

/// Represents a pending save operation type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingSaveOperation {
    /// Save with a new file path (show file picker)
    SaveAs,
    /// Save to the existing file path
    Save,
}

/// Represents a pending load operation type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingLoadOperation {
    /// Open an annotation document
    Document,
    /// Open a reference image
    Image,
}

/// Decoded reference image ready to upload as a texture.
pub struct DecodedImage {
    /// Source path
    pub path: String,
    /// RGBA pixels
    pub pixels: egui::ColorImage,
}

impl std::fmt::Debug for DecodedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodedImage")
            .field("path", &self.path)
            .field("size", &self.pixels.size)
            .finish()
    }
}

/// Messages sent from async operations back to the main app.
#[derive(Debug)]
pub enum FileOperationResult {
    /// Document saved to the given path
    SaveCompleted(String),
    /// Document read from path with its content
    LoadCompleted(String, String),
    /// Reference image decoded
    ImageLoaded(DecodedImage),
    /// A persistence operation finished
    Persisted(PersistenceResult),
    /// Operation failed with an error message
    OperationFailed(String),
}

/// Text fields whose content is only applied on commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EditField {
    /// Id of the point at the index
    PointLabel(usize),
    /// Name of the spot at the index
    SpotName(usize),
    /// Name of the route at the index
    RouteName(usize),
    /// Start or end of the route at the index
    RouteEndpoint(usize, Endpoint),
    /// Name of the area at the index
    AreaName(usize),
}

/// An endpoint edit waiting for the user to accept dropping waypoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEndpointChange {
    /// Route index
    pub route: usize,
    /// Which field was edited
    pub endpoint: Endpoint,
    /// Text as typed
    pub raw: String,
    /// Number of waypoints that would be dropped
    pub waypoint_count: usize,
}

/// State of text editing and modal prompts.
#[derive(Default)]
pub struct EditState {
    /// Uncommitted text per field
    pub buffers: HashMap<EditField, String>,
    /// Endpoint change waiting for confirmation
    pub pending_endpoint_change: Option<PendingEndpointChange>,
    /// Creation conflict reported by the backend
    pub pending_conflict: Option<DuplicateConflict>,
    /// Selection box corners in canvas space while shift-dragging in route mode
    pub selection_box: Option<(egui::Pos2, egui::Pos2)>,
    /// Whether the middle button is panning the canvas
    pub is_panning: bool,
    /// Last pointer position while panning
    pub last_pan_pos: Option<egui::Pos2>,
}

/// The reference image uploaded to the GPU.
pub struct ReferenceImage {
    /// Texture drawn under the annotations
    pub texture: egui::TextureHandle,
    /// Native pixel size
    pub size: [usize; 2],
}

/// The main application structure.
///
/// Implements `eframe::App`; owns the editing session and everything the
/// shell needs around it.
pub struct AnnotatorApp {
    /// Editing session with every annotation
    pub session: EditorSession,
    /// Persisted preferences
    pub settings: EditorSettings,
    /// File operations state
    pub file: FileState,
    /// Text buffers and prompts
    pub edit: EditState,
    /// Current validation messages per field
    pub issues: IssueBoard,
    /// Where annotations are persisted
    pub backend: Arc<dyn AnnotationBackend>,
    /// Loaded reference image
    pub image: Option<ReferenceImage>,
    /// Last status line message
    pub status: Option<String>,
}

impl Default for AnnotatorApp {
    fn default() -> Self {
        Self::with_settings(EditorSettings::default())
    }
}

impl AnnotatorApp {
    /// Creates an app with restored settings and an in-process backend.
    pub fn with_settings(settings: EditorSettings) -> Self {
        Self::with_backend(settings, Arc::new(MemoryBackend::new()))
    }

    /// Creates an app persisting through `backend`.
    pub fn with_backend(settings: EditorSettings, backend: Arc<dyn AnnotationBackend>) -> Self {
        let mut session = EditorSession::new();
        session.set_mode(settings.last_mode);
        *session.viewport_mut() = settings.viewport;
        session.set_frame(ImageFrame::identity(DEFAULT_CANVAS_WIDTH, DEFAULT_CANVAS_HEIGHT));

        let mut app = Self {
            session,
            settings,
            file: FileState::default(),
            edit: EditState::default(),
            issues: IssueBoard::new(),
            backend,
            image: None,
            status: None,
        };
        app.install_change_watchers();
        app
    }

    /// Marks the document dirty whenever any collection changes.
    fn install_change_watchers(&mut self) {
        let dirty = self.file.has_unsaved_changes.clone();
        self.session.on_points_changed(move |_, _| dirty.set(true));
        let dirty = self.file.has_unsaved_changes.clone();
        self.session.on_spots_changed(move |_, _| dirty.set(true));

        for kind in [RouteEventKind::RoutesChanged, RouteEventKind::WaypointsChanged] {
            let dirty = self.file.has_unsaved_changes.clone();
            self.session.route_events_mut().on(kind, move |_| dirty.set(true));
        }
        for kind in [AreaEventKind::AreasChanged, AreaEventKind::VerticesChanged] {
            let dirty = self.file.has_unsaved_changes.clone();
            self.session.area_events_mut().on(kind, move |_| dirty.set(true));
        }
    }

    /// Whether the document changed since it was last saved or loaded.
    pub fn has_unsaved_changes(&self) -> bool {
        self.file.has_unsaved_changes.get()
    }

    /// Copies session state that should survive a restart into the settings.
    pub fn capture_settings(&mut self) {
        self.settings.last_mode = self.session.mode();
        self.settings.viewport = *self.session.viewport();
    }

    /// Canvas backing-store size for the current frame.
    pub fn backing_size(&self) -> egui::Vec2 {
        self.session.frame().canvas_size()
    }
}
