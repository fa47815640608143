use log::info;
use std::error::Error;
use std::io;
use std::path::{Path, PathBuf};

const OUTPUT_DIR_NAME: &str = "OpenWeather";

/// `~/Downloads/OpenWeather` on desktop systems, `./outputs` where no download
/// directory exists (servers, containers).
pub fn default_outputs_dir() -> PathBuf {
    dirs::download_dir()
        .map(|p| p.join(OUTPUT_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from("outputs"))
}

pub async fn ensure_dir_exists(path: &Path) -> io::Result<()> {
    match tokio::fs::metadata(path).await {
        Ok(metadata) => {
            if !metadata.is_dir() {
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("Path exists but is not a directory: {}", path.display()),
                ));
            }
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            info!("Creating output directory: {}", path.display());
            tokio::fs::create_dir_all(path).await
        }
        Err(e) => Err(e),
    }
}

/// Renders an error and all of its sources as `outer: inner: innermost`.
pub fn error_chain(error: &dyn Error) -> String {
    let mut text = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        // Transparent wrappers repeat their source's message.
        if !text.ends_with(&cause_text) {
            text.push_str(": ");
            text.push_str(&cause_text);
        }
        source = cause.source();
    }
    text
}
