//! Data-URI size budget
//!
//! The decoded size of a `data:` URI is estimated from the encoded payload without decoding
//! it. Base64 size follows from the length and padding. Percent-encoded payloads are counted
//! byte by byte and the count stops as soon as it passes the budget.

/// Outcome of checking one URL against the budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataUriCheck {
    /// Not a `data:` URI at all.
    NotDataUri,
    Within { media_type: String, bytes: usize },
    /// `bytes` is a lower bound once counting short-circuited.
    OverBudget { media_type: String, bytes: usize },
}

impl DataUriCheck {
    pub fn is_data_uri(&self) -> bool {
        !matches!(self, DataUriCheck::NotDataUri)
    }

    pub fn media_type(&self) -> Option<&str> {
        match self {
            DataUriCheck::NotDataUri => None,
            DataUriCheck::Within { media_type, .. }
            | DataUriCheck::OverBudget { media_type, .. } => Some(media_type),
        }
    }
}

const DEFAULT_MEDIA_TYPE: &str = "text/plain";

pub fn check_data_uri(url: &str, budget: usize) -> DataUriCheck {
    let trimmed = url.trim_start();
    let Some(prefix) = trimmed.get(..5) else {
        return DataUriCheck::NotDataUri;
    };
    if !prefix.eq_ignore_ascii_case("data:") {
        return DataUriCheck::NotDataUri;
    }
    let rest = &trimmed[5..];
    let Some((header, payload)) = rest.split_once(',') else {
        return DataUriCheck::OverBudget {
            media_type: DEFAULT_MEDIA_TYPE.to_string(),
            bytes: 0,
        };
    };

    let mut params = header.split(';');
    let media_type = match params.next().map(str::trim) {
        Some(kind) if !kind.is_empty() => kind.to_ascii_lowercase(),
        _ => DEFAULT_MEDIA_TYPE.to_string(),
    };
    let base64 = params.any(|p| p.trim().eq_ignore_ascii_case("base64"));

    let (bytes, over) = if base64 {
        let size = base64_decoded_len(payload);
        (size, size > budget)
    } else {
        percent_decoded_len(payload, budget)
    };

    if over {
        DataUriCheck::OverBudget { media_type, bytes }
    } else {
        DataUriCheck::Within { media_type, bytes }
    }
}

/// Decoded length of a base64 payload: three bytes per four symbols, minus padding.
/// Whitespace inside the payload is ignored.
pub fn base64_decoded_len(payload: &str) -> usize {
    let mut symbols = 0usize;
    let mut padding = 0usize;
    for byte in payload.bytes() {
        match byte {
            b'=' => padding += 1,
            b' ' | b'\t' | b'\n' | b'\r' => {}
            _ => symbols += 1,
        }
    }
    let total = symbols + padding;
    let full = total / 4 * 3;
    let partial = match total % 4 {
        2 => 1,
        3 => 2,
        _ => 0,
    };
    (full + partial).saturating_sub(padding.min(2))
}

/// Decoded length of a percent-encoded payload. Returns `(count, over_budget)`; counting
/// stops at the first byte past `budget`.
pub fn percent_decoded_len(payload: &str, budget: usize) -> (usize, bool) {
    let bytes = payload.as_bytes();
    let mut count = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        let escaped = bytes[i] == b'%'
            && bytes.get(i + 1).is_some_and(u8::is_ascii_hexdigit)
            && bytes.get(i + 2).is_some_and(u8::is_ascii_hexdigit);
        i += if escaped { 3 } else { 1 };
        count += 1;
        if count > budget {
            return (count, true);
        }
    }
    (count, false)
}
