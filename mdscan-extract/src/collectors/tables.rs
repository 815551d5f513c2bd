use crate::collector::{CappedList, Collector, CollectorError};
use crate::dispatch::DispatchContext;
use crate::inline_text::plain_text;
use mdscan_parser::{Token, Warehouse};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Default, Serialize)]
struct TableRecord {
    header: Vec<String>,
    rows: Vec<Vec<String>>,
    /// Per header column: `left`, `center`, `right` or `null`.
    align: Vec<Option<String>>,
    start_line: Option<usize>,
}

/// Tables as header text, row text and column alignment.
///
/// GFM tables never nest, so one table is open at a time.
pub struct TablesCollector {
    tables: CappedList<TableRecord>,
    current: Option<TableRecord>,
    row: Vec<String>,
    in_head: bool,
}

impl TablesCollector {
    pub fn new(cap: usize) -> Self {
        TablesCollector {
            tables: CappedList::new(cap),
            current: None,
            row: Vec::new(),
            in_head: false,
        }
    }
}

impl Collector for TablesCollector {
    fn name(&self) -> &str {
        "tables"
    }

    fn on_token(
        &mut self,
        index: usize,
        token: &Token,
        _ctx: &DispatchContext<'_>,
        warehouse: &Warehouse,
    ) -> Result<(), CollectorError> {
        match token.kind.as_str() {
            "table_open" => {
                if self.current.is_some() {
                    return Err(CollectorError::UnexpectedToken {
                        index,
                        reason: "table opened inside a table".to_string(),
                    });
                }
                self.current = Some(TableRecord {
                    start_line: token.start_line(),
                    ..TableRecord::default()
                });
            }
            "thead_open" => self.in_head = true,
            "thead_close" => self.in_head = false,
            "tr_open" => self.row.clear(),
            "th_open" => {
                if let Some(table) = self.current.as_mut() {
                    table.align.push(token.attr("align").map(str::to_string));
                }
            }
            "inline" => {
                let in_cell = warehouse
                    .parent(index)
                    .and_then(|parent| warehouse.token(parent))
                    .is_some_and(|parent| parent.is("th_open") || parent.is("td_open"));
                if in_cell {
                    self.row.push(plain_text(&token.children));
                }
            }
            "tr_close" => {
                let row = std::mem::take(&mut self.row);
                if let Some(table) = self.current.as_mut() {
                    if self.in_head {
                        table.header = row;
                    } else {
                        table.rows.push(row);
                    }
                }
            }
            "table_close" => {
                if let Some(table) = self.current.take() {
                    self.tables.push(table);
                }
                self.in_head = false;
            }
            _ => {}
        }
        Ok(())
    }

    fn finalize(&mut self, _warehouse: &Warehouse) -> Result<Value, CollectorError> {
        self.tables.to_value()
    }

    fn truncated(&self) -> Option<usize> {
        self.tables.truncated()
    }
}
