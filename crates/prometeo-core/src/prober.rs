//! URL Metadata Prober (§4.5, §11): issues a blocking HEAD via `curl` inside
//! `spawn_blocking`, parses the headers needed to build a Plan, and derives
//! the final filename per §4.5's validity rule.
//!
//! Grounded on `fetch_head/{mod.rs,parse.rs}`, trimmed to the headers
//! actually needed (`Content-Type`, `Content-Length`, `Accept-Ranges`,
//! `Content-Disposition`) — ETag/Last-Modified resume revalidation is folded
//! into the Coordinator's own resume path instead of being a Prober concern.

use crate::error::PrometeoError;
use crate::url_model::{candidate_filename, derive_file_type, resolve_filename};
use anyhow::Context;
use std::str;
use std::time::Duration;

/// Parsed HEAD response plus the derived filename (§4.5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub file_type: String,
    pub size: u64,
    pub accept_range: bool,
    pub file_name: String,
    pub content_type: String,
}

/// `true` iff `url` is a syntactically valid absolute HTTP/HTTPS URL.
pub fn validate(url: &str) -> bool {
    match url::Url::parse(url) {
        Ok(parsed) => parsed.scheme() == "http" || parsed.scheme() == "https",
        Err(_) => false,
    }
}

/// Issues a blocking HEAD request and derives `ProbeResult` from it.
/// Must be called from inside `spawn_blocking` (§5, §11); this function
/// performs no `.await` itself.
pub fn get_data_blocking(url: &str, user_agent: &str) -> Result<ProbeResult, PrometeoError> {
    if !validate(url) {
        return Err(PrometeoError::BadURLError(format!("not a valid absolute URL: {url}")));
    }

    let raw_headers = perform_head(url, user_agent)
        .map_err(|e| PrometeoError::BadURLError(e.to_string()))?;
    let parsed = parse_headers(&raw_headers);

    let file_type = derive_file_type(url, &parsed.content_type);
    let candidate = candidate_filename(url, parsed.content_disposition.as_deref());
    let file_name = resolve_filename(candidate.as_deref(), &file_type);

    Ok(ProbeResult {
        file_type,
        size: parsed.content_length,
        accept_range: parsed.accept_ranges,
        file_name,
        content_type: parsed.content_type,
    })
}

fn perform_head(url: &str, user_agent: &str) -> anyhow::Result<Vec<String>> {
    let mut headers: Vec<String> = Vec::new();

    let mut easy = curl::easy::Easy::new();
    easy.url(url).context("invalid URL")?;
    easy.useragent(user_agent)?;
    easy.nobody(true)?;
    easy.follow_location(true)?;
    easy.connect_timeout(Duration::from_secs(15))?;
    easy.timeout(Duration::from_secs(30))?;

    {
        let mut transfer = easy.transfer();
        transfer.header_function(|data| {
            if let Ok(s) = str::from_utf8(data) {
                headers.push(s.trim_end().to_string());
            }
            true
        })?;
        transfer.perform().context("HEAD request failed")?;
    }

    let code = easy.response_code().context("no response code")?;
    if !(200..300).contains(&code) {
        anyhow::bail!("HEAD {} returned HTTP {}", url, code);
    }

    Ok(headers)
}

struct RawHeaders {
    content_length: u64,
    accept_ranges: bool,
    content_type: String,
    content_disposition: Option<String>,
}

fn parse_headers(lines: &[String]) -> RawHeaders {
    let mut content_length = 0u64;
    let mut accept_ranges = false;
    let mut content_type = String::new();
    let mut content_disposition = None;

    for line in lines {
        let line = line.trim();
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim();
        let value = value.trim();

        if name.eq_ignore_ascii_case("content-length") {
            content_length = value.parse().unwrap_or(0);
        } else if name.eq_ignore_ascii_case("accept-ranges") {
            accept_ranges = value.eq_ignore_ascii_case("bytes");
        } else if name.eq_ignore_ascii_case("content-type") {
            content_type = value.split(';').next().unwrap_or("").trim().to_string();
        } else if name.eq_ignore_ascii_case("content-disposition") {
            content_disposition = Some(value.to_string());
        }
    }

    RawHeaders {
        content_length,
        accept_ranges,
        content_type,
        content_disposition,
    }
}
