use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Ensure the output directory exists, creating any missing parents
pub fn ensure_output_dir(path: &Path) -> io::Result<()> {
    if path.is_dir() {
        debug!("Output directory ready: {}", path.display());
        return Ok(());
    }

    fs::create_dir_all(path)?;
    info!("Created directory: {}", path.display());
    Ok(())
}

/// List input files in `dir` whose names match `prefix*suffix`, sorted by name
pub fn discover_sources(dir: &Path, prefix: &str, suffix: &str) -> io::Result<Vec<PathBuf>> {
    let mut sources: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| {
            let entry = entry.ok()?;
            if !entry.file_type().ok()?.is_file() {
                return None;
            }
            let name = entry.file_name();
            let name = name.to_str()?;
            if name.starts_with(prefix) && name.ends_with(suffix) {
                Some(entry.path())
            } else {
                None
            }
        })
        .collect();

    sources.sort();
    Ok(sources)
}
