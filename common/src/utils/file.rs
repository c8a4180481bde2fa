//! Path helpers for user-supplied filesystem locations.

use std::io::{Error, ErrorKind};
use std::path::{Path, PathBuf};

/// Expands a leading "~" to the user's home directory.
fn expand_tilde<P: AsRef<Path>>(input: P) -> PathBuf {
    let path = input.as_ref();
    if let Some(first) = path.components().next() {
        if first.as_os_str() == "~" {
            if let Some(home) = dirs::home_dir() {
                return home.join(path.strip_prefix("~").unwrap());
            }
        }
    }
    path.to_path_buf()
}

/// Resolve a user-supplied path to an absolute, existing location.
pub fn resolve_path(input: &str) -> Result<PathBuf, Error> {
    let path = expand_tilde(input.trim());
    path.canonicalize()
        .map_err(|_| Error::new(ErrorKind::NotFound, format!("path not found: {input}")))
}

/// Validate a store directory: it must exist and be a directory.
pub fn resolve_store_dir(input: &str) -> Result<PathBuf, Error> {
    let path = resolve_path(input)?;
    if !path.is_dir() {
        return Err(Error::new(
            ErrorKind::InvalidInput,
            format!("path is not a directory: {}", path.display()),
        ));
    }
    Ok(path)
}
