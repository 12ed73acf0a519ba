//! URL modeling and filename derivation (§4.5, §6 `download()` filename
//! resolution).
//!
//! Derives a candidate filename from Content-Disposition or the URL path,
//! then resolves it against the validity rule: `^[A-Za-z0-9._-]+$` or a
//! random 32-hex-character replacement carrying the derived extension.

mod content_disposition;
mod extension;
mod path;
mod sanitize;

pub use content_disposition::parse_content_disposition_filename;
pub use extension::derive_file_type;
pub use path::filename_from_url_path;
pub use sanitize::{is_valid_filename, random_filename_with_extension};

/// Picks a filename candidate: Content-Disposition first, else the URL
/// path's last segment, else `None` (caller falls back to a random name).
pub fn candidate_filename(url: &str, content_disposition: Option<&str>) -> Option<String> {
    content_disposition
        .and_then(parse_content_disposition_filename)
        .filter(|s| !s.is_empty())
        .or_else(|| filename_from_url_path(url))
}

/// Resolves a final filename per §4.5: if `candidate` is valid, use it as
/// given; otherwise substitute a random 32-hex-character base with
/// `extension` appended.
pub fn resolve_filename(candidate: Option<&str>, extension: &str) -> String {
    match candidate {
        Some(name) if is_valid_filename(name) => name.to_string(),
        _ => random_filename_with_extension(extension),
    }
}
