//! Link validation and `thunder://` decoding.

use crate::error::TransferError;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use reqwest::Url;
use tracing::info;

/// Prefix marking an obfuscated thunder link.
pub const THUNDER_SCHEME: &str = "thunder://";

/// Schemes accepted on the command line.
pub const SUPPORTED_SCHEMES: [&str; 3] = ["http://", "https://", THUNDER_SCHEME];

// Thunder links are produced with and without trailing `=` padding.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

fn has_prefix(url: &str, prefix: &str) -> bool {
    url.get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

/// Whether `url` is a thunder link.
pub fn is_thunder_link(url: &str) -> bool {
    has_prefix(url, THUNDER_SCHEME)
}

/// Decodes `thunder://<base64>` into the HTTP(S) URL it wraps.
///
/// The payload decodes to `AA<url-encoded link>ZZ`; the sentinels are
/// stripped after URL decoding. Input without the thunder prefix is
/// returned unchanged.
pub fn decode_thunder(url: &str) -> Result<String, TransferError> {
    if !is_thunder_link(url) {
        return Ok(url.to_string());
    }

    let payload = url[THUNDER_SCHEME.len()..].trim();
    let bytes = LENIENT_BASE64
        .decode(payload)
        .map_err(|e| TransferError::InvalidLink(e.to_string()))?;
    let text = String::from_utf8(bytes).map_err(|e| TransferError::InvalidLink(e.to_string()))?;
    let decoded = urlencoding::decode(&text)
        .map_err(|e| TransferError::InvalidLink(e.to_string()))?
        .into_owned();

    let stripped = decoded.strip_prefix("AA").unwrap_or(&decoded);
    let stripped = stripped.strip_suffix("ZZ").unwrap_or(stripped);

    info!("Thunder link decoded to {}", stripped);
    Ok(stripped.to_string())
}

/// Validates a user-supplied link and turns it into a canonical HTTP(S) URL.
///
/// Rejects blank input and schemes outside [`SUPPORTED_SCHEMES`] before any
/// I/O happens.
pub fn normalize(raw: &str) -> Result<Url, TransferError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(TransferError::EmptyUrl);
    }
    if !SUPPORTED_SCHEMES.iter().any(|p| has_prefix(raw, p)) {
        return Err(TransferError::UnsupportedScheme(raw.to_string()));
    }

    let decoded = decode_thunder(raw)?;
    let url = Url::parse(&decoded).map_err(|e| TransferError::InvalidUrl {
        url: decoded.clone(),
        reason: e.to_string(),
    })?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        _ => Err(TransferError::UnsupportedScheme(decoded)),
    }
}

/// Local file name for `url`: its last non-empty path segment, percent-decoded.
pub fn file_name_from_url(url: &Url) -> Result<String, TransferError> {
    let last = url
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .ok_or_else(|| TransferError::InvalidFileName(url.to_string()))?;

    let name = urlencoding::decode(last)
        .map(|n| n.into_owned())
        .unwrap_or_else(|_| last.to_string());

    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(TransferError::InvalidFileName(url.to_string()));
    }
    Ok(name)
}
