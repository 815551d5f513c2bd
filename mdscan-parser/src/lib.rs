//! # mdscan-parser
//!
//! The indexing half of mdscan: everything between raw markdown bytes and a read-only
//! [`Warehouse`] that extractors can query.
//!
//! Layout
//!
//!     src
//!     ├── normalize.rs        Canonical text (LF line endings, NFC, no BOM)
//!     ├── token.rs            The flat token model shared by every stage
//!     ├── tokenizer.rs        comrak AST → flat token list adapter
//!     ├── warehouse.rs        Derived indices built once per parse
//!     └── transforms          Runnable stages and their standard compositions
//!
//! Ordering is the one rule that cannot bend: text is normalized before it is tokenized,
//! so every `Token::map` line range points into the normalized text. The standard
//! transforms in [`transforms::standard`] encode that order, so callers should prefer
//! them over calling the tokenizer directly.

pub mod normalize;
pub mod token;
pub mod tokenizer;
pub mod transforms;
pub mod warehouse;

pub use normalize::{line_count, normalize};
pub use token::{Nesting, Token, TokenStream};
pub use tokenizer::{tokenize, TokenizeError, TokenizerOptions};
pub use warehouse::{Section, Warehouse, WarehouseError};
