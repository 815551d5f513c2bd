use crate::collector::{CappedList, Collector, CollectorError};
use crate::dispatch::DispatchContext;
use mdscan_parser::{Token, Warehouse};
use serde::Serialize;
use serde_json::{json, Value};

#[derive(Debug, Clone, Serialize)]
struct HeadingRecord {
    level: u8,
    text: String,
    line: Option<usize>,
    setext: bool,
}

/// Headings, plus the section table the warehouse derived from them.
pub struct HeadingsCollector {
    headings: CappedList<HeadingRecord>,
}

impl HeadingsCollector {
    pub fn new(cap: usize) -> Self {
        HeadingsCollector {
            headings: CappedList::new(cap),
        }
    }
}

impl Collector for HeadingsCollector {
    fn name(&self) -> &str {
        "headings"
    }

    fn on_token(
        &mut self,
        index: usize,
        token: &Token,
        _ctx: &DispatchContext<'_>,
        warehouse: &Warehouse,
    ) -> Result<(), CollectorError> {
        if !token.is("heading_open") {
            return Ok(());
        }
        let level = token
            .heading_level()
            .ok_or_else(|| CollectorError::UnexpectedToken {
                index,
                reason: format!("heading tag `{}` has no level", token.tag),
            })?;
        self.headings.push(HeadingRecord {
            level,
            text: warehouse.get_heading_title(index),
            line: token.start_line(),
            setext: matches!(token.markup.as_str(), "=" | "-"),
        });
        Ok(())
    }

    fn finalize(&mut self, warehouse: &Warehouse) -> Result<Value, CollectorError> {
        Ok(json!({
            "headings": self.headings.to_value()?,
            "sections": serde_json::to_value(warehouse.sections())?,
        }))
    }

    fn truncated(&self) -> Option<usize> {
        self.headings.truncated()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::testing::output;

    const DOC: &str = "# One *big*   title\n\ntext\n\nTwo\n---\n\n\
                       | a | b |\n|---|---|\n| 1 | 2 |\n";

    #[test]
    fn records_atx_and_setext_headings() {
        let headings = output(HeadingsCollector::new(10), DOC);
        assert_eq!(
            headings["headings"],
            json!([
                { "level": 1, "text": "One big title", "line": 0, "setext": false },
                { "level": 2, "text": "Two", "line": 4, "setext": true }
            ])
        );
    }

    #[test]
    fn sections_cover_the_document() {
        let headings = output(HeadingsCollector::new(10), DOC);
        let sections = headings["sections"].as_array().unwrap();
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0]["start_line"], 0);
        assert_eq!(sections[0]["end_line"], 3);
        assert_eq!(sections[1]["title"], "Two");
        // the table separator row is not a heading boundary
        assert_eq!(sections[1]["end_line"], 9);
    }

    #[test]
    fn sections_are_not_capped_with_items() {
        let headings = output(HeadingsCollector::new(1), DOC);
        assert_eq!(headings["headings"].as_array().unwrap().len(), 1);
        assert_eq!(headings["sections"].as_array().unwrap().len(), 2);
    }
}
