#[tokio::main]
async fn main() -> Result<(), eframe::Error> {
    // Set up logging for development
    env_logger::init();

    // File dialogs and the backend run on the tokio runtime
    site_annotator::run_app()
}
