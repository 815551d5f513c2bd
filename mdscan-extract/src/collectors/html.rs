use crate::collector::{CappedList, Collector, CollectorError};
use crate::dispatch::DispatchContext;
use crate::security::WarningKind;
use mdscan_parser::{Token, Warehouse};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum FragmentKind {
    Block,
    Inline,
}

#[derive(Debug, Clone, Serialize)]
struct HtmlFragment {
    kind: FragmentKind,
    line: Option<usize>,
    content: String,
}

/// Raw HTML, sanitized. Only registered when the profile allows HTML; otherwise the
/// tokens never reach the dispatcher.
pub struct HtmlCollector {
    fragments: CappedList<HtmlFragment>,
}

impl HtmlCollector {
    pub fn new(cap: usize) -> Self {
        HtmlCollector {
            fragments: CappedList::new(cap),
        }
    }

    fn record(
        &mut self,
        kind: FragmentKind,
        raw: &str,
        line: Option<usize>,
        ctx: &DispatchContext<'_>,
    ) {
        let sanitized = ctx.policy().sanitize_html(raw);
        if sanitized.changed() {
            ctx.warn(
                WarningKind::HtmlSanitized,
                format!(
                    "removed {} element(s) and {} attribute(s) from raw HTML",
                    sanitized.removed_elements, sanitized.removed_attributes
                ),
                line,
            );
        }
        let content = sanitized.html.trim();
        if content.is_empty() {
            return;
        }
        self.fragments.push(HtmlFragment {
            kind,
            line,
            content: content.to_string(),
        });
    }
}

impl Collector for HtmlCollector {
    fn name(&self) -> &str {
        "html"
    }

    fn on_token(
        &mut self,
        _index: usize,
        token: &Token,
        ctx: &DispatchContext<'_>,
        _warehouse: &Warehouse,
    ) -> Result<(), CollectorError> {
        if token.is("html_block") {
            self.record(FragmentKind::Block, &token.content, token.start_line(), ctx);
        } else if token.is("inline") {
            let mut pending: Vec<&Token> = token.children.iter().rev().collect();
            while let Some(child) = pending.pop() {
                if child.is("html_inline") {
                    let line = child.start_line().or(token.start_line());
                    self.record(FragmentKind::Inline, &child.content, line, ctx);
                }
                pending.extend(child.children.iter().rev());
            }
        }
        Ok(())
    }

    fn finalize(&mut self, _warehouse: &Warehouse) -> Result<Value, CollectorError> {
        self.fragments.to_value()
    }

    fn truncated(&self) -> Option<usize> {
        self.fragments.truncated()
    }
}
