//! Built-in collectors
//!
//! One module per output section. Each collector is an independent type implementing
//! [`Collector`](crate::collector::Collector); none of them share state or look at each
//! other's output. [`CollectorRegistry::with_defaults`](crate::CollectorRegistry::with_defaults)
//! builds a fresh set for every parse.

mod code_blocks;
mod frontmatter;
mod headings;
mod html;
mod images;
mod links;
mod lists;
mod plain_text;
mod tables;

pub use code_blocks::CodeBlocksCollector;
pub use frontmatter::FrontmatterCollector;
pub use headings::HeadingsCollector;
pub use html::HtmlCollector;
pub use images::ImagesCollector;
pub use links::LinksCollector;
pub use lists::ListsCollector;
pub use plain_text::PlainTextCollector;
pub use tables::TablesCollector;
