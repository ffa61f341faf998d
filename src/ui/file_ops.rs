//! File operations for documents, reference images and the annotation backend.
//!
//! Dialogs and disk access run on the tokio runtime; results come back to the
//! UI thread over the app's channel and are applied at the start of a frame.

use super::state::{
    AnnotatorApp, DecodedImage, FileOperationResult, PendingLoadOperation, PendingSaveOperation,
    ReferenceImage,
};
use crate::constants::MAX_CANVAS_EDGE;
use crate::persistence::{dispatch, PersistenceResult};
use crate::transform::ImageFrame;
use eframe::egui;
use std::future::Future;
use std::path::Path;
use thiserror::Error;

/// Failures while reading or writing files.
#[derive(Debug, Error)]
pub enum DocumentError {
    /// Reading or writing the file failed
    #[error("file access failed: {0}")]
    Io(#[from] std::io::Error),
    /// The document is not valid annotation JSON
    #[error("invalid annotation document: {0}")]
    Json(#[from] serde_json::Error),
    /// The image could not be decoded
    #[error("could not decode image: {0}")]
    Image(#[from] image::ImageError),
}

/// Reads a document from disk.
pub fn read_document(path: &Path) -> Result<String, DocumentError> {
    Ok(std::fs::read_to_string(path)?)
}

/// Writes a document to disk.
pub fn write_document(path: &Path, json: &str) -> Result<(), DocumentError> {
    std::fs::write(path, json)?;
    Ok(())
}

/// Decodes an image file into RGBA pixels.
pub fn decode_image(path: &Path) -> Result<DecodedImage, DocumentError> {
    let rgba = image::open(path)?.to_rgba8();
    let size = [rgba.width() as usize, rgba.height() as usize];
    Ok(DecodedImage {
        path: path.display().to_string(),
        pixels: egui::ColorImage::from_rgba_unmultiplied(size, rgba.as_raw()),
    })
}

/// Runs a task on the current tokio runtime, or inline when there is none.
fn spawn_task(task: impl Future<Output = ()> + Send + 'static) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(task);
        }
        Err(_) => futures::executor::block_on(task),
    }
}

impl AnnotatorApp {
    /// Requests saving to the current path, or Save As when there is none.
    pub fn save_document(&mut self) {
        self.file.pending_save_operation = Some(PendingSaveOperation::Save);
    }

    /// Requests saving to a newly picked path.
    pub fn save_document_as(&mut self) {
        self.file.pending_save_operation = Some(PendingSaveOperation::SaveAs);
    }

    /// Requests opening an annotation document.
    pub fn open_document(&mut self) {
        self.file.pending_load_operation = Some(PendingLoadOperation::Document);
    }

    /// Requests loading a reference image.
    pub fn open_image(&mut self) {
        self.file.pending_load_operation = Some(PendingLoadOperation::Image);
    }

    /// Handles pending file operations and flushes queued persistence.
    ///
    /// Completed results are applied first so a save that finished last frame
    /// is visible before anything new starts.
    ///
    /// # Arguments
    ///
    /// * `ctx` - The egui context for requesting repaints and uploading textures
    pub fn handle_pending_operations(&mut self, ctx: &egui::Context) {
        let mut completed = Vec::new();
        if let Some(receiver) = &self.file.file_operation_receiver {
            while let Ok(result) = receiver.try_recv() {
                completed.push(result);
            }
        }
        for result in completed {
            self.apply_operation_result(ctx, result);
        }

        if let Some(save_op) = self.file.pending_save_operation.take() {
            self.start_save(ctx, save_op);
        }
        if let Some(load_op) = self.file.pending_load_operation.take() {
            self.start_load(ctx, load_op);
        }
        self.flush_persistence(ctx);
    }

    /// Applies one result received from an async operation.
    pub fn apply_operation_result(&mut self, ctx: &egui::Context, result: FileOperationResult) {
        match result {
            FileOperationResult::SaveCompleted(path) => {
                log::info!("Saved annotations to {path}");
                self.status = Some(format!("Saved {path}"));
                self.file.current_path = Some(path);
                self.file.has_unsaved_changes.set(false);
            }
            FileOperationResult::LoadCompleted(path, content) => {
                match self.session.import_document(&content) {
                    Ok(()) => {
                        self.issues.clear_all();
                        self.session.validate_all(&mut self.issues);
                        self.edit.buffers.clear();
                        self.status = Some(format!("Opened {path}"));
                        self.file.current_path = Some(path);
                        self.file.has_unsaved_changes.set(false);
                    }
                    Err(e) => {
                        let error = DocumentError::from(e);
                        log::error!("Failed to open {path}: {error}");
                        self.status = Some(error.to_string());
                    }
                }
            }
            FileOperationResult::ImageLoaded(decoded) => self.apply_reference_image(ctx, decoded),
            FileOperationResult::Persisted(result) => self.apply_persisted(result),
            FileOperationResult::OperationFailed(error) => {
                log::error!("File operation failed: {error}");
                self.status = Some(error);
            }
        }
    }

    /// Uploads a decoded image and fits the canvas to it.
    ///
    /// Existing annotations keep their image-space coordinates.
    pub fn apply_reference_image(&mut self, ctx: &egui::Context, decoded: DecodedImage) {
        let [width, height] = decoded.pixels.size;
        let frame = ImageFrame::fitted(width as u32, height as u32, MAX_CANVAS_EDGE);
        let previous = self.session.frame();
        if frame != previous {
            let document = self.session.annotations().to_image_space(&previous);
            self.session.set_frame(frame);
            self.session.load(document.to_canvas_space(&frame));
        }

        let texture = ctx.load_texture(
            "reference_image",
            decoded.pixels,
            egui::TextureOptions::LINEAR,
        );
        log::info!(
            "Loaded image {} ({}x{}, canvas {}x{})",
            decoded.path,
            width,
            height,
            frame.canvas_width,
            frame.canvas_height
        );
        self.image = Some(ReferenceImage {
            texture,
            size: [width, height],
        });
        self.status = Some(format!("Image {}", decoded.path));
        self.file.image_path = Some(decoded.path);
    }

    fn apply_persisted(&mut self, result: PersistenceResult) {
        if let PersistenceResult::Failed { kind, key, error } = &result {
            self.status = Some(format!("Could not store {kind} \"{key}\": {error}"));
        }
        if let Some(conflict) = self.session.apply_persistence_result(result) {
            self.edit.pending_conflict = Some(conflict);
        }
    }

    fn start_save(&mut self, ctx: &egui::Context, save_op: PendingSaveOperation) {
        let json = match self.session.export_document() {
            Ok(json) => json,
            Err(e) => {
                log::error!("Failed to serialize annotations: {e}");
                self.status = Some(DocumentError::from(e).to_string());
                return;
            }
        };
        let ctx = ctx.clone();
        let sender = self.file.file_operation_sender.clone();

        let path = match (save_op, self.file.current_path.clone()) {
            (PendingSaveOperation::Save, Some(path)) => Some(path),
            _ => None,
        };
        spawn_task(async move {
            let target = match path {
                Some(path) => Some(std::path::PathBuf::from(path)),
                None => rfd::AsyncFileDialog::new()
                    .add_filter("JSON", &["json"])
                    .set_file_name("annotations.json")
                    .save_file()
                    .await
                    .map(|handle| handle.path().to_path_buf()),
            };
            if let Some(target) = target {
                let result = match write_document(&target, &json) {
                    Ok(()) => FileOperationResult::SaveCompleted(target.display().to_string()),
                    Err(e) => FileOperationResult::OperationFailed(format!(
                        "Failed to save {}: {e}",
                        target.display()
                    )),
                };
                if let Some(tx) = sender {
                    let _ = tx.send(result);
                }
            }
            ctx.request_repaint();
        });
    }

    fn start_load(&mut self, ctx: &egui::Context, load_op: PendingLoadOperation) {
        let ctx = ctx.clone();
        let sender = self.file.file_operation_sender.clone();

        spawn_task(async move {
            let dialog = match load_op {
                PendingLoadOperation::Document => {
                    rfd::AsyncFileDialog::new().add_filter("JSON", &["json"])
                }
                PendingLoadOperation::Image => {
                    rfd::AsyncFileDialog::new().add_filter("Images", &["png", "jpg", "jpeg"])
                }
            };
            if let Some(handle) = dialog.pick_file().await {
                let path = handle.path();
                let result = match load_op {
                    PendingLoadOperation::Document => match read_document(path) {
                        Ok(json) => {
                            FileOperationResult::LoadCompleted(path.display().to_string(), json)
                        }
                        Err(e) => FileOperationResult::OperationFailed(format!(
                            "Failed to read {}: {e}",
                            path.display()
                        )),
                    },
                    PendingLoadOperation::Image => match decode_image(path) {
                        Ok(decoded) => FileOperationResult::ImageLoaded(decoded),
                        Err(e) => FileOperationResult::OperationFailed(e.to_string()),
                    },
                };
                if let Some(tx) = sender {
                    let _ = tx.send(result);
                }
            }
            ctx.request_repaint();
        });
    }

    /// Sends queued persistence operations to the backend.
    ///
    /// Operations of one frame run in order on a single task, so a rename's
    /// delete always reaches the backend before its create.
    pub fn flush_persistence(&mut self, ctx: &egui::Context) {
        let ops = self.session.take_pending_ops();
        if ops.is_empty() {
            return;
        }
        log::debug!("Flushing {} persistence operations", ops.len());
        let backend = self.backend.clone();
        let sender = self.file.file_operation_sender.clone();
        let ctx = ctx.clone();

        spawn_task(async move {
            for op in ops {
                let result = dispatch(backend.as_ref(), op).await;
                if let Some(tx) = &sender {
                    let _ = tx.send(FileOperationResult::Persisted(result));
                }
            }
            ctx.request_repaint();
        });
    }
}
