//! Collector registry
//!
//! An ordered list of collectors, keyed by object identity. Registration order is dispatch
//! order. The registry is built by the caller for each parse; there is no global instance.

use crate::collector::Collector;
use crate::collectors::{
    CodeBlocksCollector, FrontmatterCollector, HeadingsCollector, HtmlCollector,
    ImagesCollector, LinksCollector, ListsCollector, PlainTextCollector, TablesCollector,
};
use crate::options::ExtractOptions;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

/// A collector as held by the registry. Identity is the `Arc` allocation.
pub type SharedCollector = Arc<Mutex<dyn Collector>>;

/// Wrap a collector for registration.
pub fn shared<C: Collector + 'static>(collector: C) -> SharedCollector {
    Arc::new(Mutex::new(collector))
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("a different collector named '{0}' is already registered")]
    DuplicateName(String),
}

#[derive(Default)]
pub struct CollectorRegistry {
    entries: Vec<(String, SharedCollector)>,
}

impl CollectorRegistry {
    pub fn new() -> Self {
        CollectorRegistry {
            entries: Vec::new(),
        }
    }

    /// Register a collector
    ///
    /// Registering the same object again is a no-op and keeps its first position. A
    /// different object under a name that is already taken is rejected, since outputs are
    /// keyed by name.
    pub fn register(&mut self, collector: SharedCollector) -> Result<(), RegistryError> {
        let name = collector
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .name()
            .to_string();

        if self.entries.iter().any(|(_, c)| same_collector(c, &collector)) {
            log::debug!("collector '{}' already registered, keeping its position", name);
            return Ok(());
        }
        if self.entries.iter().any(|(existing, _)| *existing == name) {
            return Err(RegistryError::DuplicateName(name));
        }
        log::debug!("registered collector '{}' at position {}", name, self.entries.len());
        self.entries.push((name, collector));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Names in dispatch order.
    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|(name, _)| name.clone()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&SharedCollector> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, collector)| collector)
    }

    /// Collectors in dispatch order.
    pub fn collectors(&self) -> impl Iterator<Item = &SharedCollector> {
        self.entries.iter().map(|(_, collector)| collector)
    }

    /// A fresh set of the built-in collectors, capped per `options`.
    ///
    /// The `html` collector is only present when the profile allows HTML.
    pub fn with_defaults(options: &ExtractOptions) -> Self {
        let caps = &options.caps;
        let mut defaults: Vec<SharedCollector> = vec![
            shared(LinksCollector::new(caps.links)),
            shared(ImagesCollector::new(caps.images)),
            shared(HeadingsCollector::new(caps.headings)),
            shared(CodeBlocksCollector::new(caps.code_blocks)),
            shared(TablesCollector::new(caps.tables)),
            shared(ListsCollector::new(caps.lists)),
        ];
        if options.policy.allow_html {
            defaults.push(shared(HtmlCollector::new(caps.html)));
        }
        defaults.push(shared(FrontmatterCollector::new()));
        defaults.push(shared(PlainTextCollector::new(caps.plain_text)));

        let mut registry = Self::new();
        registry.entries = defaults
            .into_iter()
            .map(|collector| {
                let name = collector
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .name()
                    .to_string();
                (name, collector)
            })
            .collect();
        registry
    }
}

fn same_collector(a: &SharedCollector, b: &SharedCollector) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::DispatchContext;
    use mdscan_parser::{Token, Warehouse};
    use serde_json::Value;

    struct Named(&'static str);

    impl Collector for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn on_token(
            &mut self,
            _index: usize,
            _token: &Token,
            _ctx: &DispatchContext<'_>,
            _warehouse: &Warehouse,
        ) -> Result<(), crate::collector::CollectorError> {
            Ok(())
        }

        fn finalize(
            &mut self,
            _warehouse: &Warehouse,
        ) -> Result<Value, crate::collector::CollectorError> {
            Ok(Value::Null)
        }
    }

    #[test]
    fn same_object_registers_once_in_first_position() {
        let a = shared(Named("a"));
        let b = shared(Named("b"));
        let mut registry = CollectorRegistry::new();
        registry.register(a.clone()).unwrap();
        registry.register(b.clone()).unwrap();
        registry.register(a.clone()).unwrap();
        assert_eq!(registry.names(), vec!["a", "b"]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn different_object_with_taken_name_is_rejected() {
        let mut registry = CollectorRegistry::new();
        registry.register(shared(Named("links"))).unwrap();
        let err = registry.register(shared(Named("links"))).unwrap_err();
        assert_eq!(err, RegistryError::DuplicateName("links".to_string()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn defaults_follow_profile() {
        let config = mdscan_config::load_defaults().unwrap();

        let strict = ExtractOptions::from_config(&config, "strict").unwrap();
        let names = CollectorRegistry::with_defaults(&strict).names();
        assert_eq!(
            names,
            vec![
                "links",
                "images",
                "headings",
                "code_blocks",
                "tables",
                "lists",
                "frontmatter",
                "plain_text"
            ]
        );

        let permissive = ExtractOptions::from_config(&config, "permissive").unwrap();
        let registry = CollectorRegistry::with_defaults(&permissive);
        assert!(registry.get("html").is_some());
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn default_sets_are_fresh_objects() {
        let config = mdscan_config::load_defaults().unwrap();
        let options = ExtractOptions::from_config(&config, "moderate").unwrap();
        let first = CollectorRegistry::with_defaults(&options);
        let second = CollectorRegistry::with_defaults(&options);
        let a = first.get("links").unwrap();
        let b = second.get("links").unwrap();
        assert!(!same_collector(a, b));
    }
}
