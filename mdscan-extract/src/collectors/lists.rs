use crate::collector::{CappedList, Collector, CollectorError};
use crate::dispatch::DispatchContext;
use crate::inline_text::plain_text;
use mdscan_parser::{Token, Warehouse};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Serialize)]
struct ListItem {
    text: String,
    /// Task state for GFM task items, `None` for plain items.
    checked: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
struct ListRecord {
    ordered: bool,
    start: Option<u64>,
    /// Number of lists this one is nested in.
    depth: usize,
    line: Option<usize>,
    items: Vec<ListItem>,
}

/// An open list item: its token index and where it lives in the output, if anywhere.
#[derive(Debug, Clone, Copy)]
struct OpenItem {
    index: usize,
    slot: Option<(usize, usize)>,
    has_text: bool,
}

/// Every list, nested ones included, each with the text of its items.
///
/// The cap counts lists, not items. An item's text is the text of its first paragraph.
pub struct ListsCollector {
    lists: CappedList<ListRecord>,
    open_lists: Vec<Option<usize>>,
    open_items: Vec<OpenItem>,
}

impl ListsCollector {
    pub fn new(cap: usize) -> Self {
        ListsCollector {
            lists: CappedList::new(cap),
            open_lists: Vec::new(),
            open_items: Vec::new(),
        }
    }
}

impl Collector for ListsCollector {
    fn name(&self) -> &str {
        "lists"
    }

    fn on_token(
        &mut self,
        index: usize,
        token: &Token,
        _ctx: &DispatchContext<'_>,
        warehouse: &Warehouse,
    ) -> Result<(), CollectorError> {
        match token.kind.as_str() {
            "bullet_list_open" | "ordered_list_open" => {
                let ordered = token.is("ordered_list_open");
                let start = if ordered {
                    match token.attr("start") {
                        Some(raw) => Some(raw.parse::<u64>().map_err(|_| {
                            CollectorError::UnexpectedToken {
                                index,
                                reason: format!("list start {:?} is not a number", raw),
                            }
                        })?),
                        None => Some(1),
                    }
                } else {
                    None
                };
                let slot = self.lists.push(ListRecord {
                    ordered,
                    start,
                    depth: self.open_lists.len(),
                    line: token.start_line(),
                    items: Vec::new(),
                });
                self.open_lists.push(slot);
            }
            "bullet_list_close" | "ordered_list_close" => {
                self.open_lists.pop();
            }
            "list_item_open" => {
                let list_slot = self.open_lists.last().copied().flatten();
                let slot = list_slot.and_then(|list| {
                    let record = self.lists.get_mut(list)?;
                    record.items.push(ListItem {
                        text: String::new(),
                        checked: token.attr("checked").map(|value| value == "true"),
                    });
                    Some((list, record.items.len() - 1))
                });
                self.open_items.push(OpenItem {
                    index,
                    slot,
                    has_text: false,
                });
            }
            "list_item_close" => {
                self.open_items.pop();
            }
            "inline" => {
                let Some(item) = self.open_items.last_mut() else {
                    return Ok(());
                };
                if item.has_text {
                    return Ok(());
                }
                let paragraph = warehouse
                    .parent(index)
                    .filter(|&p| warehouse.token(p).is_some_and(|t| t.is("paragraph_open")));
                if paragraph.and_then(|p| warehouse.parent(p)) != Some(item.index) {
                    return Ok(());
                }
                item.has_text = true;
                if let Some((list, position)) = item.slot {
                    if let Some(entry) = self
                        .lists
                        .get_mut(list)
                        .and_then(|record| record.items.get_mut(position))
                    {
                        entry.text = plain_text(&token.children);
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn finalize(&mut self, _warehouse: &Warehouse) -> Result<Value, CollectorError> {
        self.lists.to_value()
    }

    fn truncated(&self) -> Option<usize> {
        self.lists.truncated()
    }
}
