//! # Site Annotator
//!
//! An editor for placing spatial annotations on a reference image: labeled
//! points, named spots, routes that run between them through waypoints, and
//! polygonal areas.
//!
//! ## Features
//! - Point, spot, route and area edit modes sharing one pointer pipeline
//! - Drag to move with a small activation threshold; Escape cancels
//! - Zoom and pan that keep hit-testing in canvas units
//! - Route endpoint resolution against point ids and spot names
//! - Annotations stored in image space, independent of the displayed size
//! - Asynchronous persistence with duplicate detection
//!
//! The library modules hold no UI state; [`session::EditorSession`] can be
//! driven headlessly with canvas-space positions.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod area;
pub mod constants;
pub mod drag;
pub mod events;
pub mod hit_test;
pub mod persistence;
pub mod route;
pub mod session;
pub mod store;
pub mod transform;
pub mod types;
pub mod validation;
mod ui;

// Re-export the types most callers need
pub use session::{EditorSession, PointerDown, PointerUp, RenderSnapshot};
pub use transform::{ImageFrame, Viewport};
pub use types::*;
use ui::AnnotatorApp;

/// Runs the annotator with default window settings.
///
/// Settings saved by a previous run are restored from eframe storage.
///
/// # Returns
///
/// Returns `Ok(())` if the application runs successfully, or an `eframe::Error` if
/// initialization fails.
///
/// # Example
///
/// ```no_run
/// fn main() -> Result<(), eframe::Error> {
///     site_annotator::run_app()
/// }
/// ```
pub fn run_app() -> Result<(), eframe::Error> {
    let options = eframe::NativeOptions::default();
    eframe::run_native(
        "Site Annotator",
        options,
        Box::new(|cc| Ok(Box::new(AnnotatorApp::new(cc)))),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_annotations_default() {
        let annotations = Annotations::default();
        assert!(annotations.points.is_empty());
        assert!(annotations.routes.is_empty());
    }

    #[test]
    fn test_session_starts_in_point_mode() {
        let session = EditorSession::new();
        assert_eq!(session.mode(), EditMode::Point);
        assert_eq!(*session.viewport(), Viewport::default());
    }
}
