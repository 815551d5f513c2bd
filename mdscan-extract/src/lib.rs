//! # mdscan-extract
//!
//! Single-pass extraction over an indexed markdown document, with security validation and a
//! timeout/isolation harness around the whole parse.
//!
//! Layout
//!
//!     src
//!     ├── extractor.rs        The protected parse: normalize → tokenize → index → dispatch
//!     ├── options.rs          Per-parse options resolved from a configuration profile
//!     ├── stages.rs           Pre-index stages (raw HTML removal)
//!     ├── collector.rs        The Collector trait and capped item lists
//!     ├── registry.rs         Caller-built, ordered collector registry
//!     ├── dispatch.rs         Token-major dispatch with per-collector failure isolation
//!     ├── inline_text.rs      Compound inline text of links and other inline containers
//!     ├── collectors          Built-in collectors, one output section each
//!     ├── security            URL policy, data-URI budget, HTML sanitizer
//!     ├── harness             Deadline guard, worker thread, worker process
//!     ├── worker.rs           The plain-data worker protocol
//!     └── result.rs           ExtractionResult, TimeoutReport, ParseOutcome
//!
//! Typical use:
//!
//! ```rust,ignore
//! let config = mdscan_config::load_defaults()?;
//! let options = ExtractOptions::from_config(&config, "moderate")?;
//! let outcome = Extractor::new(options).extract_default(&markdown)?;
//! ```
//!
//! Custom collectors implement [`Collector`] and are registered on a [`CollectorRegistry`]
//! built for that one parse. There is no global registry.

pub mod collector;
pub mod collectors;
pub mod dispatch;
pub mod error;
pub mod extractor;
pub mod harness;
pub mod inline_text;
pub mod options;
pub mod registry;
pub mod result;
pub mod security;
pub mod stages;
pub mod worker;

pub use collector::{CappedList, Collector, CollectorError};
pub use dispatch::{CollectorFailure, DispatchContext, DispatchReport, Dispatcher, Phase};
pub use error::ExtractError;
pub use extractor::Extractor;
pub use harness::{Harness, HarnessOutcome, HarnessState, WorkerCommand};
pub use options::ExtractOptions;
pub use registry::{shared, CollectorRegistry, RegistryError, SharedCollector};
pub use result::{
    ExtractionResult, IsolationMode, Metadata, ParseOutcome, TimeoutReport, TimeoutStage, Timing,
};
pub use security::{SecurityPolicy, SecurityWarning, WarningKind};
pub use worker::{WorkerRequest, WorkerResponse};
