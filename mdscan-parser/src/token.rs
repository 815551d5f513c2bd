//! The flat token model
//!
//! Tokens follow the markdown-it shape: block structure is a flat list of open/close/self
//! tokens, and the inline content of a block lives in the `children` of a single `inline`
//! token. The whole type is plain serializable data so a token list can be produced in a
//! worker process and shipped back as JSON.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Flat token list as produced by the tokenizer.
pub type TokenStream = Vec<Token>;

/// Structural role of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i8", try_from = "i8")]
pub enum Nesting {
    Open,
    SelfContained,
    Close,
}

impl From<Nesting> for i8 {
    fn from(nesting: Nesting) -> Self {
        match nesting {
            Nesting::Open => 1,
            Nesting::SelfContained => 0,
            Nesting::Close => -1,
        }
    }
}

impl TryFrom<i8> for Nesting {
    type Error = String;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Nesting::Open),
            0 => Ok(Nesting::SelfContained),
            -1 => Ok(Nesting::Close),
            other => Err(format!("invalid nesting value {}", other)),
        }
    }
}

/// One markdown construct boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub attrs: Vec<(String, String)>,
    pub nesting: Nesting,
    /// `[start, end)` line range in the normalized text, 0-based.
    #[serde(default)]
    pub map: Option<(usize, usize)>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub markup: String,
    #[serde(default)]
    pub info: String,
    #[serde(default)]
    pub children: Vec<Token>,
}

impl Token {
    pub fn new(kind: impl Into<String>, tag: impl Into<String>, nesting: Nesting) -> Self {
        Token {
            kind: kind.into(),
            tag: tag.into(),
            attrs: Vec::new(),
            nesting,
            map: None,
            content: String::new(),
            markup: String::new(),
            info: String::new(),
            children: Vec::new(),
        }
    }

    pub fn open(kind: impl Into<String>, tag: impl Into<String>) -> Self {
        Token::new(kind, tag, Nesting::Open)
    }

    pub fn close(kind: impl Into<String>, tag: impl Into<String>) -> Self {
        Token::new(kind, tag, Nesting::Close)
    }

    pub fn leaf(kind: impl Into<String>, tag: impl Into<String>) -> Self {
        Token::new(kind, tag, Nesting::SelfContained)
    }

    pub fn with_map(mut self, map: Option<(usize, usize)>) -> Self {
        self.map = map;
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn with_markup(mut self, markup: impl Into<String>) -> Self {
        self.markup = markup.into();
        self
    }

    pub fn with_info(mut self, info: impl Into<String>) -> Self {
        self.info = info.into();
        self
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.push((name.into(), value.into()));
        self
    }

    pub fn with_children(mut self, children: Vec<Token>) -> Self {
        self.children = children;
        self
    }

    /// First value of the named attribute.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn is(&self, kind: &str) -> bool {
        self.kind == kind
    }

    pub fn is_open(&self) -> bool {
        self.nesting == Nesting::Open
    }

    pub fn is_close(&self) -> bool {
        self.nesting == Nesting::Close
    }

    /// Heading level parsed from the `hN` tag.
    pub fn heading_level(&self) -> Option<u8> {
        let digits = self.tag.strip_prefix('h')?;
        digits.parse::<u8>().ok().filter(|level| (1..=6).contains(level))
    }

    pub fn start_line(&self) -> Option<usize> {
        self.map.map(|(start, _)| start)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = match self.nesting {
            Nesting::Open => "+",
            Nesting::SelfContained => "=",
            Nesting::Close => "-",
        };
        write!(f, "{}{}", sign, self.kind)?;
        if let Some((start, end)) = self.map {
            write!(f, "@{}..{}", start, end)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nesting_serializes_as_integer() {
        let token = Token::close("paragraph_close", "p");
        let json = serde_json::to_value(&token).unwrap();
        assert_eq!(json["nesting"], serde_json::json!(-1));
        assert_eq!(json["type"], serde_json::json!("paragraph_close"));
    }

    #[test]
    fn rejects_unknown_nesting() {
        let json = r#"{"type":"x","nesting":2}"#;
        assert!(serde_json::from_str::<Token>(json).is_err());
    }

    #[test]
    fn minimal_json_fills_defaults() {
        let token: Token = serde_json::from_str(r#"{"type":"hr","nesting":0}"#).unwrap();
        assert_eq!(token.nesting, Nesting::SelfContained);
        assert!(token.children.is_empty());
        assert_eq!(token.map, None);
    }

    #[test]
    fn attribute_lookup_returns_first_match() {
        let token = Token::open("link_open", "a")
            .with_attr("href", "https://a.example")
            .with_attr("href", "https://b.example");
        assert_eq!(token.attr("href"), Some("https://a.example"));
        assert_eq!(token.attr("title"), None);
    }

    #[test]
    fn heading_level_from_tag() {
        assert_eq!(Token::open("heading_open", "h3").heading_level(), Some(3));
        assert_eq!(Token::open("heading_open", "h9").heading_level(), None);
        assert_eq!(Token::open("paragraph_open", "p").heading_level(), None);
    }

    #[test]
    fn display_is_compact() {
        let token = Token::open("heading_open", "h1").with_map(Some((0, 1)));
        assert_eq!(token.to_string(), "+heading_open@0..1");
    }
}
