//! `file_type` derivation for the URL prober (§4.5): the dotted extension
//! taken from the URL path if present, else from the MIME subtype, else the
//! literal `.unknow` fallback (deliberate, not a typo).

/// Derives the dotted extension (e.g. `.iso`) for a probed resource.
///
/// Tries the URL path's last segment first (`archive.tar.gz` → `.gz`),
/// then the MIME subtype (`application/pdf` → `.pdf`), then `.unknow`.
pub fn derive_file_type(url: &str, content_type: &str) -> String {
    if let Some(ext) = extension_from_url(url) {
        return ext;
    }
    if let Some(ext) = extension_from_mime(content_type) {
        return ext;
    }
    ".unknow".to_string()
}

fn extension_from_url(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let segment = parsed.path().split('/').filter(|s| !s.is_empty()).last()?;
    let dot = segment.rfind('.')?;
    if dot + 1 >= segment.len() {
        return None;
    }
    Some(format!(".{}", &segment[dot + 1..]))
}

fn extension_from_mime(content_type: &str) -> Option<String> {
    let token = content_type.split(';').next()?.trim();
    let subtype = token.split('/').nth(1)?.trim();
    if subtype.is_empty() {
        None
    } else {
        Some(format!(".{}", subtype))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_url_extension() {
        assert_eq!(
            derive_file_type("https://example.com/archive.tar.gz", "application/gzip"),
            ".gz"
        );
    }

    #[test]
    fn falls_back_to_mime_subtype() {
        assert_eq!(derive_file_type("https://example.com/dl", "application/pdf"), ".pdf");
    }

    #[test]
    fn falls_back_to_unknow() {
        assert_eq!(derive_file_type("https://example.com/", ""), ".unknow");
    }

    #[test]
    fn ignores_mime_parameters() {
        assert_eq!(
            derive_file_type("https://example.com/dl", "text/plain; charset=utf-8"),
            ".plain"
        );
    }
}
