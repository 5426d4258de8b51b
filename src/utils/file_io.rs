use anyhow::{bail, Context, Result};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Definition files (`ripple.dependencies.config`, `packages.config`) are a
/// few lines long. Anything past this is not one.
pub const MAX_DEFINITION_FILE_SIZE: u64 = 4 * 1024 * 1024;

pub fn read_config_file(path: &Path) -> Result<String> {
    read_config_file_with_limit(path, MAX_DEFINITION_FILE_SIZE)
}

pub fn read_config_file_with_limit(path: &Path, max_size: u64) -> Result<String> {
    let mut file =
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?;

    let metadata = file
        .metadata()
        .with_context(|| format!("failed to get metadata for {}", path.display()))?;

    if metadata.len() > max_size {
        bail!(
            "definition file {} is too large ({} bytes, max {} bytes)",
            path.display(),
            metadata.len(),
            max_size
        );
    }

    let mut contents = String::with_capacity(metadata.len() as usize);
    file.read_to_string(&mut contents)
        .with_context(|| format!("failed to read {}", path.display()))?;

    // Tools on Windows like to write a byte-order mark.
    if let Some(stripped) = contents.strip_prefix('\u{feff}') {
        contents = stripped.to_owned();
    }

    Ok(contents)
}
