//! Filename validity and the random-base fallback (§4.5).
//!
//! Replaces a general Linux-safe sanitizer (which rewrote disallowed
//! characters in place) with a stricter all-or-nothing rule: a candidate
//! filename is either already valid, or it is discarded wholesale in favor
//! of a random base.

use rand::Rng;

/// A filename is valid iff it matches `^[A-Za-z0-9._-]+$` (§4.5).
pub fn is_valid_filename(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-')
}

/// Replaces an invalid filename with a random 32-hex-character base plus the
/// extension derived from `extension_hint` (the dotted `file_type`, e.g.
/// `.bin`), per §4.5's fallback rule.
pub fn random_filename_with_extension(extension_hint: &str) -> String {
    let mut rng = rand::thread_rng();
    let base: String = (0..32)
        .map(|_| std::char::from_digit(rng.gen_range(0..16), 16).unwrap())
        .collect();
    if extension_hint.is_empty() {
        base
    } else if extension_hint.starts_with('.') {
        format!("{}{}", base, extension_hint)
    } else {
        format!("{}.{}", base, extension_hint)
    }
}
