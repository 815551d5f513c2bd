//! Compound inline text
//!
//! The visible text of a link (or any other inline container) is everything between its
//! open and its matching close, not just the first text token after the open. Emphasis,
//! code spans and nested image alt text all contribute, and line breaks become one space.

use mdscan_parser::Token;

/// One finished container span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineSpan {
    /// Target attribute of the opening token (`href` for links).
    pub target: Option<String>,
    pub title: Option<String>,
    pub text: String,
    pub line: Option<usize>,
}

#[derive(Debug)]
struct Pending {
    target: Option<String>,
    title: Option<String>,
    text: String,
    line: Option<usize>,
}

/// Accumulates the text of `open_kind` ... `close_kind` spans from a stream of inline
/// children. Only the outermost span is reported; nested spans add to its text.
#[derive(Debug)]
pub struct CompoundText {
    open_kind: &'static str,
    close_kind: &'static str,
    target_attr: &'static str,
    depth: usize,
    pending: Option<Pending>,
}

impl CompoundText {
    pub fn new(
        open_kind: &'static str,
        close_kind: &'static str,
        target_attr: &'static str,
    ) -> Self {
        CompoundText {
            open_kind,
            close_kind,
            target_attr,
            depth: 0,
            pending: None,
        }
    }

    pub fn links() -> Self {
        CompoundText::new("link_open", "link_close", "href")
    }

    pub fn is_open(&self) -> bool {
        self.depth > 0
    }

    /// Feed the next inline child. Returns the span when its top-level close arrives.
    pub fn feed(&mut self, child: &Token) -> Option<InlineSpan> {
        if child.kind == self.open_kind {
            self.depth += 1;
            if self.depth == 1 {
                self.pending = Some(Pending {
                    target: child.attr(self.target_attr).map(str::to_string),
                    title: child.attr("title").map(str::to_string),
                    text: String::new(),
                    line: child.start_line(),
                });
            }
            return None;
        }
        if child.kind == self.close_kind {
            if self.depth == 0 {
                return None;
            }
            self.depth -= 1;
            if self.depth > 0 {
                return None;
            }
            let pending = self.pending.take()?;
            return Some(InlineSpan {
                target: pending.target,
                title: pending.title,
                text: collapse_whitespace(&pending.text),
                line: pending.line,
            });
        }
        if let Some(pending) = self.pending.as_mut() {
            push_text(&mut pending.text, child);
        }
        None
    }

    /// Forget a span left open at the end of an inline token.
    pub fn reset(&mut self) {
        self.depth = 0;
        self.pending = None;
    }
}

fn push_text(buffer: &mut String, child: &Token) {
    match child.kind.as_str() {
        "text" | "code_inline" | "image" => buffer.push_str(&child.content),
        "softbreak" | "hardbreak" => buffer.push(' '),
        _ => {}
    }
}

/// Whitespace-collapsed text of a whole inline child list.
pub fn plain_text(children: &[Token]) -> String {
    let mut buffer = String::new();
    for child in children {
        push_text(&mut buffer, child);
    }
    collapse_whitespace(&buffer)
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
