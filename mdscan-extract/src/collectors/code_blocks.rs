use crate::collector::{CappedList, Collector, CollectorError};
use crate::dispatch::DispatchContext;
use mdscan_parser::{Token, Warehouse};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Serialize)]
struct CodeBlockRecord {
    language: Option<String>,
    content: String,
    start_line: Option<usize>,
    /// Inclusive, fence lines included.
    end_line: Option<usize>,
    fenced: bool,
}

pub struct CodeBlocksCollector {
    blocks: CappedList<CodeBlockRecord>,
}

impl CodeBlocksCollector {
    pub fn new(cap: usize) -> Self {
        CodeBlocksCollector {
            blocks: CappedList::new(cap),
        }
    }
}

impl Collector for CodeBlocksCollector {
    fn name(&self) -> &str {
        "code_blocks"
    }

    fn on_token(
        &mut self,
        _index: usize,
        token: &Token,
        _ctx: &DispatchContext<'_>,
        _warehouse: &Warehouse,
    ) -> Result<(), CollectorError> {
        let fenced = match token.kind.as_str() {
            "fence" => true,
            "code_block" => false,
            _ => return Ok(()),
        };
        let language = token
            .info
            .split_whitespace()
            .next()
            .map(str::to_string);
        self.blocks.push(CodeBlockRecord {
            language,
            content: token.content.clone(),
            start_line: token.start_line(),
            end_line: token.map.map(|(start, end)| end.saturating_sub(1).max(start)),
            fenced,
        });
        Ok(())
    }

    fn finalize(&mut self, _warehouse: &Warehouse) -> Result<Value, CollectorError> {
        self.blocks.to_value()
    }

    fn truncated(&self) -> Option<usize> {
        self.blocks.truncated()
    }
}
