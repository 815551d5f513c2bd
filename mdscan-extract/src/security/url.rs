//! URL policy
//!
//! Link and image destinations go through a fixed sequence of checks and the first failing
//! check rejects the URL. Nothing here uses regular expressions on the raw text; every layer
//! is a character or byte scan, with the `url` crate doing host parsing and IDNA.
//!
//!     1. control, zero-width and bidi code points (raw and percent-decoded)
//!     2. bare fragments are accepted
//!     3. protocol-relative `//host` is rejected
//!     4. scheme allow-list
//!     5. IDNA host encoding and the mixed-script host heuristic
//!     6. malformed percent-encoding, backslashes and `..` segments
//!
//! Scheme-less relative references skip layers 3 to 5 but still go through 1 and 6.

use serde::Serialize;
use thiserror::Error;
use url::{Host, Url};

/// Why a URL was refused. Serialized as the snake_case reason string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Error)]
#[serde(rename_all = "snake_case")]
pub enum UrlRejection {
    #[error("control, zero-width or bidi character")]
    ControlCharacter,
    #[error("protocol-relative URL")]
    ProtocolRelative,
    #[error("scheme not in allow-list")]
    DisallowedScheme,
    #[error("host failed IDNA encoding")]
    InvalidHost,
    #[error("host label mixes ASCII and non-ASCII letters")]
    MixedScriptHost,
    #[error("malformed percent-encoding")]
    MalformedPercentEncoding,
    #[error("backslash in URL")]
    BackslashSmuggling,
    #[error("path traversal segment")]
    PathTraversal,
    #[error("data URI is not an image")]
    NonImageDataUri,
}

impl UrlRejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            UrlRejection::ControlCharacter => "control_character",
            UrlRejection::ProtocolRelative => "protocol_relative",
            UrlRejection::DisallowedScheme => "disallowed_scheme",
            UrlRejection::InvalidHost => "invalid_host",
            UrlRejection::MixedScriptHost => "mixed_script_host",
            UrlRejection::MalformedPercentEncoding => "malformed_percent_encoding",
            UrlRejection::BackslashSmuggling => "backslash_smuggling",
            UrlRejection::PathTraversal => "path_traversal",
            UrlRejection::NonImageDataUri => "non_image_data_uri",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkKind {
    Anchor,
    Relative,
    External,
    Email,
}

/// A URL that passed every layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedUrl {
    /// The URL as written, or its IDNA-encoded form when the host was not ASCII.
    pub url: String,
    pub kind: LinkKind,
}

/// Percent-decoding rounds applied before the decoded-text checks. Catches `%252e%252e`.
const DECODE_ROUNDS: usize = 3;

/// Run `raw` through the URL policy.
pub fn validate_url(raw: &str, allowed_schemes: &[String]) -> Result<ValidatedUrl, UrlRejection> {
    let raw = raw.trim_matches(|c: char| c == ' ' || c == '\t');

    // 1
    if has_forbidden_characters(raw) {
        return Err(UrlRejection::ControlCharacter);
    }

    // 2
    if raw.starts_with('#') {
        return Ok(ValidatedUrl {
            url: raw.to_string(),
            kind: LinkKind::Anchor,
        });
    }

    // 3
    if raw.starts_with("//") {
        return Err(UrlRejection::ProtocolRelative);
    }

    let mut url = raw.to_string();
    let kind = match scheme_of(raw) {
        None => LinkKind::Relative,
        Some(scheme) => {
            // 4
            let scheme = scheme.to_ascii_lowercase();
            if !allowed_schemes.iter().any(|s| s.eq_ignore_ascii_case(&scheme)) {
                return Err(UrlRejection::DisallowedScheme);
            }
            // 5
            let parsed = Url::parse(raw).map_err(|_| UrlRejection::InvalidHost)?;
            if let Some(Host::Domain(_)) = parsed.host() {
                if authority_host(raw).is_some_and(has_mixed_script_label) {
                    return Err(UrlRejection::MixedScriptHost);
                }
            }
            if !raw.is_ascii() && parsed.has_host() {
                url = parsed.to_string();
            }
            if scheme == "mailto" {
                LinkKind::Email
            } else {
                LinkKind::External
            }
        }
    };

    // 6
    let decoded = decode_rounds(raw);
    if !percent_encoding_is_well_formed(raw) {
        return Err(UrlRejection::MalformedPercentEncoding);
    }
    if raw.contains('\\') || decoded.iter().any(|layer| layer.contains(&b'\\')) {
        return Err(UrlRejection::BackslashSmuggling);
    }
    let path_end = |text: &[u8]| {
        text.iter()
            .position(|&b| b == b'?' || b == b'#')
            .unwrap_or(text.len())
    };
    let traverses = |text: &[u8]| {
        text[..path_end(text)]
            .split(|&b| b == b'/')
            .any(|segment| segment == b"..")
    };
    if traverses(raw.as_bytes()) || decoded.iter().any(|layer| traverses(layer)) {
        return Err(UrlRejection::PathTraversal);
    }

    Ok(ValidatedUrl { url, kind })
}

/// Check an inline `data:` image source: the character layer applies as for any URL, and
/// the media type must be `image/*`. The scheme, host and path layers do not apply.
pub fn validate_image_data_uri(raw: &str, media_type: &str) -> Result<String, UrlRejection> {
    let raw = raw.trim_matches(|c: char| c == ' ' || c == '\t');
    if has_forbidden_characters(raw) {
        return Err(UrlRejection::ControlCharacter);
    }
    if !media_type.starts_with("image/") {
        return Err(UrlRejection::NonImageDataUri);
    }
    Ok(raw.to_string())
}

/// Forbidden characters in the raw text or in any percent-decoded round of it.
fn has_forbidden_characters(raw: &str) -> bool {
    raw.chars().any(is_forbidden_char)
        || decode_rounds(raw)
            .iter()
            .any(|layer| contains_forbidden(layer))
}

fn is_forbidden_char(c: char) -> bool {
    c.is_control()
        || matches!(
            c,
            '\u{200B}'..='\u{200F}'
                | '\u{202A}'..='\u{202E}'
                | '\u{2060}'..='\u{2064}'
                | '\u{2066}'..='\u{2069}'
                | '\u{061C}'
                | '\u{FEFF}'
        )
}

fn contains_forbidden(bytes: &[u8]) -> bool {
    bytes.iter().any(|b| b.is_ascii_control())
        || String::from_utf8_lossy(bytes)
            .chars()
            .any(is_forbidden_char)
}

/// Successive percent-decodings of `raw`, stopping once a round changes nothing.
fn decode_rounds(raw: &str) -> Vec<Vec<u8>> {
    let mut layers = Vec::new();
    let mut current = raw.as_bytes().to_vec();
    for _ in 0..DECODE_ROUNDS {
        let next = percent_decode(&current);
        if next == current {
            break;
        }
        layers.push(next.clone());
        current = next;
    }
    layers
}

/// Lenient decoder: a `%` not followed by two hex digits is kept literally.
fn percent_decode(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;
    while i < input.len() {
        if input[i] == b'%' && i + 2 < input.len() {
            if let (Some(hi), Some(lo)) = (hex_value(input[i + 1]), hex_value(input[i + 2])) {
                out.push(hi << 4 | lo);
                i += 3;
                continue;
            }
        }
        out.push(input[i]);
        i += 1;
    }
    out
}

fn hex_value(byte: u8) -> Option<u8> {
    (byte as char).to_digit(16).map(|d| d as u8)
}

fn percent_encoding_is_well_formed(raw: &str) -> bool {
    let bytes = raw.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let valid = bytes.get(i + 1).copied().and_then(hex_value).is_some()
                && bytes.get(i + 2).copied().and_then(hex_value).is_some();
            if !valid {
                return false;
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    true
}

/// RFC 3986 scheme, if `raw` starts with one.
fn scheme_of(raw: &str) -> Option<&str> {
    let colon = raw.find(':')?;
    let candidate = &raw[..colon];
    let mut chars = candidate.chars();
    let first = chars.next()?;
    if !first.is_ascii_alphabetic() {
        return None;
    }
    chars
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        .then_some(candidate)
}

/// Host as written in the authority, before any IDNA mapping.
fn authority_host(raw: &str) -> Option<&str> {
    let rest = &raw[raw.find("://")? + 3..];
    let authority = &rest[..rest.find(['/', '?', '#']).unwrap_or(rest.len())];
    let host = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
    let host = match host.rfind(':') {
        Some(colon) if !host.ends_with(']') => &host[..colon],
        _ => host,
    };
    Some(host)
}

/// A label with ASCII letters next to letters from a non-Latin script (`pаypal` with a
/// Cyrillic `а`). Accented Latin such as `bücher` is fine.
fn has_mixed_script_label(host: &str) -> bool {
    host.split('.').any(|label| {
        let ascii = label.chars().any(|c| c.is_ascii_alphabetic());
        let foreign = label
            .chars()
            .any(|c| !c.is_ascii() && c.is_alphabetic() && !is_latin_extended(c));
        ascii && foreign
    })
}

fn is_latin_extended(c: char) -> bool {
    matches!(c, '\u{00C0}'..='\u{024F}' | '\u{1E00}'..='\u{1EFF}')
}
