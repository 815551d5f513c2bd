use crate::collector::{CappedList, Collector, CollectorError};
use crate::dispatch::DispatchContext;
use crate::inline_text::plain_text;
use mdscan_parser::{Token, Warehouse};
use serde_json::{json, Value};

/// Visible text of the document: the inline text of every block, in order, joined by blank
/// lines. Code blocks and raw HTML are not text. The cap counts blocks.
pub struct PlainTextCollector {
    blocks: CappedList<String>,
}

impl PlainTextCollector {
    pub fn new(cap: usize) -> Self {
        PlainTextCollector {
            blocks: CappedList::new(cap),
        }
    }
}

impl Collector for PlainTextCollector {
    fn name(&self) -> &str {
        "plain_text"
    }

    fn on_token(
        &mut self,
        _index: usize,
        token: &Token,
        _ctx: &DispatchContext<'_>,
        _warehouse: &Warehouse,
    ) -> Result<(), CollectorError> {
        if token.is("inline") {
            let text = plain_text(&token.children);
            if !text.is_empty() {
                self.blocks.push(text);
            }
        }
        Ok(())
    }

    fn finalize(&mut self, _warehouse: &Warehouse) -> Result<Value, CollectorError> {
        Ok(json!({
            "text": self.blocks.items().join("\n\n"),
            "blocks": self.blocks.items().len(),
        }))
    }

    fn truncated(&self) -> Option<usize> {
        self.blocks.truncated()
    }
}
