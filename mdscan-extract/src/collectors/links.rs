use crate::collector::{CappedList, Collector, CollectorError};
use crate::dispatch::DispatchContext;
use crate::inline_text::{CompoundText, InlineSpan};
use crate::security::{LinkKind, WarningKind};
use mdscan_parser::{Token, Warehouse};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Serialize)]
struct LinkRecord {
    text: String,
    /// Normalized URL, `None` when it was rejected.
    url: Option<String>,
    title: Option<String>,
    line: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<LinkKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rejected: Option<&'static str>,
}

/// Links with their full visible text and a validated URL.
pub struct LinksCollector {
    links: CappedList<LinkRecord>,
    text: CompoundText,
}

impl LinksCollector {
    pub fn new(cap: usize) -> Self {
        LinksCollector {
            links: CappedList::new(cap),
            text: CompoundText::links(),
        }
    }

    fn record(&mut self, span: InlineSpan, ctx: &DispatchContext<'_>) {
        let raw = span.target.unwrap_or_default();
        let mut record = LinkRecord {
            text: span.text,
            url: None,
            title: span.title,
            line: span.line,
            kind: None,
            rejected: None,
        };
        match ctx.policy().validate_url(&raw) {
            Ok(validated) => {
                record.url = Some(validated.url);
                record.kind = Some(validated.kind);
            }
            Err(rejection) => {
                ctx.warn(
                    WarningKind::UrlRejected,
                    format!("link target {:?} rejected: {}", raw, rejection),
                    record.line,
                );
                record.rejected = Some(rejection.as_str());
            }
        }
        self.links.push(record);
    }
}

impl Collector for LinksCollector {
    fn name(&self) -> &str {
        "links"
    }

    fn on_token(
        &mut self,
        _index: usize,
        token: &Token,
        ctx: &DispatchContext<'_>,
        _warehouse: &Warehouse,
    ) -> Result<(), CollectorError> {
        if !token.is("inline") {
            return Ok(());
        }
        self.text.reset();
        for child in &token.children {
            if let Some(mut span) = self.text.feed(child) {
                span.line = span.line.or(token.start_line());
                self.record(span, ctx);
            }
        }
        self.text.reset();
        Ok(())
    }

    fn finalize(&mut self, _warehouse: &Warehouse) -> Result<Value, CollectorError> {
        self.links.to_value()
    }

    fn truncated(&self) -> Option<usize> {
        self.links.truncated()
    }
}
