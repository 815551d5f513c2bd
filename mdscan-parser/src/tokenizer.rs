//! comrak → flat token adapter
//!
//!     comrak produces an arena tree. The rest of mdscan wants a flat, markdown-it shaped
//!     token list: block containers become open/close pairs, leaf blocks become
//!     self-contained tokens, and the inline content of paragraphs, headings and table cells
//!     is folded into one `inline` token whose `children` carry the inline stream.
//!
//!     The walk uses comrak's `traverse()` edge iterator, never recursion, so arbitrarily deep
//!     blockquote or list nesting costs heap, not stack.
//!
//!     Markdown grammar is entirely comrak's business. This module only decides how each node
//!     is spelled as tokens and where its line range points.

use crate::token::{Token, TokenStream};
use comrak::arena_tree::NodeEdge;
use comrak::nodes::{AstNode, ListType, NodeValue, TableAlignment};
use comrak::{parse_document, Arena, Options};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tokenizer settings. Plain data so a worker process can rebuild the tokenizer from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenizerOptions {
    /// GFM tables, strikethrough, autolinks and task lists.
    pub gfm: bool,
    pub footnotes: bool,
    /// Recognise a leading `---` delimited front matter block.
    pub front_matter: bool,
    pub superscript: bool,
    /// Inputs larger than this are refused before comrak sees them.
    pub max_input_bytes: Option<usize>,
}

impl Default for TokenizerOptions {
    fn default() -> Self {
        TokenizerOptions {
            gfm: true,
            footnotes: true,
            front_matter: true,
            superscript: false,
            max_input_bytes: None,
        }
    }
}

impl TokenizerOptions {
    fn to_comrak(&self) -> Options<'static> {
        let mut options = Options::default();
        options.extension.table = self.gfm;
        options.extension.strikethrough = self.gfm;
        options.extension.autolink = self.gfm;
        options.extension.tasklist = self.gfm;
        options.extension.footnotes = self.footnotes;
        options.extension.superscript = self.superscript;
        if self.front_matter {
            options.extension.front_matter_delimiter = Some(FRONT_MATTER_DELIMITER.to_string());
        }
        options
    }
}

const FRONT_MATTER_DELIMITER: &str = "---";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenizeError {
    #[error("input of {size} bytes exceeds the {limit} byte limit")]
    InputTooLarge { size: usize, limit: usize },
}

/// Tokenize normalized text.
pub fn tokenize(text: &str, options: &TokenizerOptions) -> Result<TokenStream, TokenizeError> {
    if let Some(limit) = options.max_input_bytes {
        if text.len() > limit {
            return Err(TokenizeError::InputTooLarge {
                size: text.len(),
                limit,
            });
        }
    }

    let arena = Arena::new();
    let root = parse_document(&arena, text, &options.to_comrak());

    let mut builder = BlockBuilder::default();
    builder.walk(root);
    log::debug!("tokenized {} bytes into {} tokens", text.len(), builder.tokens.len());
    Ok(builder.tokens)
}

#[derive(Debug, Default)]
struct TableState {
    alignments: Vec<TableAlignment>,
    header_row: bool,
    body_open: bool,
    column: usize,
}

#[derive(Default)]
struct BlockBuilder {
    tokens: TokenStream,
    tables: Vec<TableState>,
}

impl BlockBuilder {
    fn walk<'a>(&mut self, root: &'a AstNode<'a>) {
        // Set while inside a paragraph/heading/cell whose inline content was already emitted.
        let mut inline_owner: Option<&'a AstNode<'a>> = None;

        for edge in root.traverse() {
            match edge {
                NodeEdge::Start(node) => {
                    if inline_owner.is_some() {
                        continue;
                    }
                    if self.enter(node) {
                        inline_owner = Some(node);
                    }
                }
                NodeEdge::End(node) => {
                    if let Some(owner) = inline_owner {
                        if !std::ptr::eq(owner, node) {
                            continue;
                        }
                        inline_owner = None;
                    }
                    self.leave(node);
                }
            }
        }
    }

    /// Emit tokens for entering `node`. Returns true when the node's inline descendants were
    /// consumed into an `inline` token and must be skipped by the block walk.
    fn enter<'a>(&mut self, node: &'a AstNode<'a>) -> bool {
        let ast = node.data.borrow();
        let map = line_map(node);

        match &ast.value {
            NodeValue::FrontMatter(raw) => {
                self.tokens.push(
                    Token::leaf("front_matter", "")
                        .with_map(map)
                        .with_markup(FRONT_MATTER_DELIMITER)
                        .with_content(strip_front_matter_delimiters(raw)),
                );
                false
            }
            NodeValue::BlockQuote => {
                self.tokens
                    .push(Token::open("blockquote_open", "blockquote").with_map(map));
                false
            }
            NodeValue::List(list) => {
                let token = if list.list_type == ListType::Ordered {
                    let token = Token::open("ordered_list_open", "ol");
                    if list.start != 1 {
                        token.with_attr("start", list.start.to_string())
                    } else {
                        token
                    }
                } else {
                    Token::open("bullet_list_open", "ul")
                };
                self.tokens.push(token.with_map(map));
                false
            }
            NodeValue::Item(_) => {
                self.tokens
                    .push(Token::open("list_item_open", "li").with_map(map));
                false
            }
            NodeValue::TaskItem(symbol) => {
                let checked = if symbol.is_some() { "true" } else { "false" };
                self.tokens.push(
                    Token::open("list_item_open", "li")
                        .with_map(map)
                        .with_attr("checked", checked),
                );
                false
            }
            NodeValue::CodeBlock(code) => {
                let kind = if code.fenced { "fence" } else { "code_block" };
                self.tokens.push(
                    Token::leaf(kind, "code")
                        .with_map(map)
                        .with_info(code.info.trim())
                        .with_content(code.literal.clone()),
                );
                false
            }
            NodeValue::HtmlBlock(html) => {
                self.tokens.push(
                    Token::leaf("html_block", "")
                        .with_map(map)
                        .with_content(html.literal.clone()),
                );
                false
            }
            NodeValue::ThematicBreak => {
                self.tokens.push(Token::leaf("hr", "hr").with_map(map));
                false
            }
            NodeValue::Paragraph => {
                self.tokens
                    .push(Token::open("paragraph_open", "p").with_map(map));
                self.tokens.push(inline_token(node, map));
                true
            }
            NodeValue::Heading(heading) => {
                let markup = match (heading.setext, heading.level) {
                    (true, 1) => "=".to_string(),
                    (true, _) => "-".to_string(),
                    (false, level) => "#".repeat(level as usize),
                };
                let tag = format!("h{}", heading.level);
                self.tokens.push(
                    Token::open("heading_open", tag)
                        .with_map(map)
                        .with_markup(markup),
                );
                self.tokens.push(inline_token(node, map));
                true
            }
            NodeValue::Table(table) => {
                self.tables.push(TableState {
                    alignments: table.alignments.clone(),
                    ..TableState::default()
                });
                self.tokens
                    .push(Token::open("table_open", "table").with_map(map));
                false
            }
            NodeValue::TableRow(header) => {
                let header = *header;
                if let Some(state) = self.tables.last_mut() {
                    state.header_row = header;
                    state.column = 0;
                    if header {
                        self.tokens
                            .push(Token::open("thead_open", "thead").with_map(map));
                    } else if !state.body_open {
                        state.body_open = true;
                        self.tokens
                            .push(Token::open("tbody_open", "tbody").with_map(map));
                    }
                }
                self.tokens.push(Token::open("tr_open", "tr").with_map(map));
                false
            }
            NodeValue::TableCell => {
                let (kind, tag, align) = match self.tables.last_mut() {
                    Some(state) => {
                        let column = state.column;
                        state.column += 1;
                        let align = state.alignments.get(column).and_then(|a| alignment_name(*a));
                        if state.header_row {
                            ("th_open", "th", align)
                        } else {
                            ("td_open", "td", align)
                        }
                    }
                    None => ("td_open", "td", None),
                };
                let mut cell = Token::open(kind, tag).with_map(map);
                if let Some(align) = align {
                    cell = cell.with_attr("align", align);
                }
                self.tokens.push(cell);
                self.tokens.push(inline_token(node, map));
                true
            }
            NodeValue::FootnoteDefinition(definition) => {
                self.tokens.push(
                    Token::open("footnote_open", "")
                        .with_map(map)
                        .with_attr("label", definition.name.clone()),
                );
                false
            }
            _ => false,
        }
    }

    fn leave<'a>(&mut self, node: &'a AstNode<'a>) {
        let ast = node.data.borrow();
        match &ast.value {
            NodeValue::BlockQuote => {
                self.tokens.push(Token::close("blockquote_close", "blockquote"));
            }
            NodeValue::List(list) => {
                let token = if list.list_type == ListType::Ordered {
                    Token::close("ordered_list_close", "ol")
                } else {
                    Token::close("bullet_list_close", "ul")
                };
                self.tokens.push(token);
            }
            NodeValue::Item(_) | NodeValue::TaskItem(_) => {
                self.tokens.push(Token::close("list_item_close", "li"));
            }
            NodeValue::Paragraph => {
                self.tokens.push(Token::close("paragraph_close", "p"));
            }
            NodeValue::Heading(heading) => {
                self.tokens
                    .push(Token::close("heading_close", format!("h{}", heading.level)));
            }
            NodeValue::Table(_) => {
                if let Some(state) = self.tables.pop() {
                    if state.body_open {
                        self.tokens.push(Token::close("tbody_close", "tbody"));
                    }
                }
                self.tokens.push(Token::close("table_close", "table"));
            }
            NodeValue::TableRow(header) => {
                self.tokens.push(Token::close("tr_close", "tr"));
                if *header {
                    self.tokens.push(Token::close("thead_close", "thead"));
                }
            }
            NodeValue::TableCell => {
                let header = self.tables.last().map(|s| s.header_row).unwrap_or(false);
                if header {
                    self.tokens.push(Token::close("th_close", "th"));
                } else {
                    self.tokens.push(Token::close("td_close", "td"));
                }
            }
            NodeValue::FootnoteDefinition(_) => {
                self.tokens.push(Token::close("footnote_close", ""));
            }
            _ => {}
        }
    }
}

fn line_map<'a>(node: &'a AstNode<'a>) -> Option<(usize, usize)> {
    let pos = node.data.borrow().sourcepos;
    if pos.start.line == 0 {
        return None;
    }
    Some((pos.start.line - 1, pos.end.line.max(pos.start.line)))
}

fn alignment_name(alignment: TableAlignment) -> Option<&'static str> {
    match alignment {
        TableAlignment::Left => Some("left"),
        TableAlignment::Center => Some("center"),
        TableAlignment::Right => Some("right"),
        TableAlignment::None => None,
    }
}

fn strip_front_matter_delimiters(raw: &str) -> String {
    let mut lines: Vec<&str> = raw.lines().collect();
    while lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines.pop();
    }
    if lines.first().map(|l| l.trim()) == Some(FRONT_MATTER_DELIMITER) {
        lines.remove(0);
    }
    if lines.last().map(|l| l.trim()) == Some(FRONT_MATTER_DELIMITER) {
        lines.pop();
    }
    let mut body = lines.join("\n");
    if !body.is_empty() {
        body.push('\n');
    }
    body
}

fn inline_token<'a>(owner: &'a AstNode<'a>, map: Option<(usize, usize)>) -> Token {
    let children = inline_children(owner);
    let content = plain_text(&children);
    Token::leaf("inline", "")
        .with_map(map)
        .with_content(content)
        .with_children(children)
}

/// Flatten the inline subtree of `owner`. Images collect their alt tokens as children, so
/// each open image keeps its own output frame until its end edge.
fn inline_children<'a>(owner: &'a AstNode<'a>) -> Vec<Token> {
    let mut frames: Vec<(Option<Token>, Vec<Token>)> = vec![(None, Vec::new())];

    fn emit(frames: &mut [(Option<Token>, Vec<Token>)], token: Token) {
        if let Some((_, out)) = frames.last_mut() {
            out.push(token);
        }
    }

    for edge in owner.traverse() {
        match edge {
            NodeEdge::Start(node) => {
                if std::ptr::eq(node, owner) {
                    continue;
                }
                let map = line_map(node);
                let ast = node.data.borrow();
                let token = match &ast.value {
                    NodeValue::Text(text) => Token::leaf("text", "").with_content(text.clone()),
                    NodeValue::SoftBreak => Token::leaf("softbreak", "br"),
                    NodeValue::LineBreak => Token::leaf("hardbreak", "br"),
                    NodeValue::Code(code) => Token::leaf("code_inline", "code")
                        .with_markup("`")
                        .with_content(code.literal.clone()),
                    NodeValue::HtmlInline(html) => {
                        Token::leaf("html_inline", "").with_content(html.clone())
                    }
                    NodeValue::Emph => Token::open("em_open", "em").with_markup("*"),
                    NodeValue::Strong => Token::open("strong_open", "strong").with_markup("**"),
                    NodeValue::Strikethrough => Token::open("s_open", "s").with_markup("~~"),
                    NodeValue::Superscript => Token::open("sup_open", "sup").with_markup("^"),
                    NodeValue::Link(link) => {
                        let mut token =
                            Token::open("link_open", "a").with_attr("href", link.url.clone());
                        if !link.title.is_empty() {
                            token = token.with_attr("title", link.title.clone());
                        }
                        token
                    }
                    NodeValue::Image(link) => {
                        let mut image =
                            Token::leaf("image", "img").with_attr("src", link.url.clone());
                        if !link.title.is_empty() {
                            image = image.with_attr("title", link.title.clone());
                        }
                        frames.push((Some(image.with_map(map)), Vec::new()));
                        continue;
                    }
                    NodeValue::FootnoteReference(reference) => Token::leaf("footnote_ref", "")
                        .with_attr("label", reference.name.clone()),
                    _ => continue,
                };
                emit(&mut frames, token.with_map(map));
            }
            NodeEdge::End(node) => {
                if std::ptr::eq(node, owner) {
                    continue;
                }
                let ast = node.data.borrow();
                let token = match &ast.value {
                    NodeValue::Emph => Token::close("em_close", "em").with_markup("*"),
                    NodeValue::Strong => Token::close("strong_close", "strong").with_markup("**"),
                    NodeValue::Strikethrough => Token::close("s_close", "s").with_markup("~~"),
                    NodeValue::Superscript => Token::close("sup_close", "sup").with_markup("^"),
                    NodeValue::Link(_) => Token::close("link_close", "a"),
                    NodeValue::Image(_) => {
                        if frames.len() < 2 {
                            continue;
                        }
                        match frames.pop() {
                            Some((Some(image), alt)) => {
                                let text = plain_text(&alt);
                                image.with_content(text).with_children(alt)
                            }
                            _ => continue,
                        }
                    }
                    _ => continue,
                };
                emit(&mut frames, token);
            }
        }
    }

    frames
        .into_iter()
        .next()
        .map(|(_, tokens)| tokens)
        .unwrap_or_default()
}

fn plain_text(children: &[Token]) -> String {
    let mut text = String::new();
    for child in children {
        match child.kind.as_str() {
            "text" | "code_inline" | "image" => text.push_str(&child.content),
            "softbreak" | "hardbreak" => text.push(' '),
            _ => {}
        }
    }
    text
}
