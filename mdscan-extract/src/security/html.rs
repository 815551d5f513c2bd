//! Allow-list HTML sanitizer
//!
//! Raw HTML from `html_block` / `html_inline` tokens is parsed with html5ever into an
//! `RcDom`, then copied into a fresh tree that only contains allow-listed elements and
//! attributes. Elements that are not allow-listed are unwrapped (their children are kept),
//! except the ones in [`DROPPED_WITH_CONTENT`], which disappear together with everything
//! inside them. The copy is serialized back to a string.
//!
//! Regardless of allow-lists, `on*` attributes are always removed, `javascript:` and
//! `vbscript:` URLs are always removed, and `data:` URLs only survive on `img src` when
//! they are images within the data-URI budget.

use crate::security::data_uri::{check_data_uri, DataUriCheck};
use crate::security::url::{validate_image_data_uri, validate_url};
use crate::security::SecurityPolicy;
use html5ever::serialize::{SerializeOpts, TraversalScope};
use html5ever::tendril::TendrilSink;
use html5ever::{ns, parse_document, serialize, Attribute, LocalName, QualName};
use markup5ever_rcdom::{Handle, Node, NodeData, RcDom, SerializableHandle};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Elements removed along with their content.
pub const DROPPED_WITH_CONTENT: &[&str] = &[
    "script", "style", "iframe", "frame", "frameset", "object", "embed", "applet", "noscript",
    "template", "svg", "math", "form", "textarea", "select", "button", "input", "title",
    "meta", "link", "base",
];

const ALLOWED_ELEMENTS: &[&str] = &[
    "a", "abbr", "b", "blockquote", "br", "code", "dd", "del", "details", "div", "dl", "dt",
    "em", "h1", "h2", "h3", "h4", "h5", "h6", "hr", "i", "img", "ins", "kbd", "li", "mark",
    "ol", "p", "pre", "q", "s", "samp", "small", "span", "strike", "strong", "sub", "summary",
    "sup", "table", "tbody", "td", "tfoot", "th", "thead", "tr", "u", "ul", "var",
];

const GLOBAL_ATTRIBUTES: &[&str] = &["title", "lang", "class"];

fn element_attributes(element: &str) -> &'static [&'static str] {
    match element {
        "a" => &["href"],
        "img" => &["src", "alt", "width", "height"],
        "td" | "th" => &["align", "colspan", "rowspan"],
        "ol" => &["start"],
        "details" => &["open"],
        _ => &[],
    }
}

/// Result of sanitizing one fragment.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SanitizedHtml {
    pub html: String,
    /// Elements dropped with their content.
    pub removed_elements: usize,
    /// Attributes removed for any reason.
    pub removed_attributes: usize,
}

impl SanitizedHtml {
    pub fn changed(&self) -> bool {
        self.removed_elements > 0 || self.removed_attributes > 0
    }
}

pub fn sanitize_html(input: &str, policy: &SecurityPolicy) -> SanitizedHtml {
    let dom = parse_document(RcDom::default(), Default::default()).one(input);
    let mut report = SanitizedHtml::default();

    let output = create_element("div", Vec::new());
    if let Some(body) = find_element(&dom.document, "body") {
        copy_allowed(&body, &output, policy, &mut report);
    }
    // html5ever moves head-only content (script, style, title, meta) out of the body.
    if let Some(head) = find_element(&dom.document, "head") {
        report.removed_elements += head.children.borrow().len();
    }
    report.html = serialize_children(&output);
    report
}

/// First element called `name`, breadth-first from `root`.
fn find_element(root: &Handle, name: &str) -> Option<Handle> {
    let mut queue = std::collections::VecDeque::from([root.clone()]);
    while let Some(node) = queue.pop_front() {
        if let NodeData::Element { name: qual, .. } = &node.data {
            if &*qual.local == name {
                return Some(node);
            }
        }
        queue.extend(node.children.borrow().iter().cloned());
    }
    None
}

/// Copy the children of `source` under `target`, one explicit frame per open element.
fn copy_allowed(
    source: &Handle,
    target: &Handle,
    policy: &SecurityPolicy,
    report: &mut SanitizedHtml,
) {
    // (children being copied, next child position, destination)
    let mut frames: Vec<(Vec<Handle>, usize, Handle)> =
        vec![(source.children.borrow().clone(), 0, target.clone())];

    while let Some((children, position, destination)) = frames.last_mut() {
        let Some(child) = children.get(*position).cloned() else {
            frames.pop();
            continue;
        };
        *position += 1;
        let destination = destination.clone();

        match &child.data {
            NodeData::Text { contents } => {
                append(&destination, create_text(&contents.borrow()));
            }
            NodeData::Element { name, attrs, .. } => {
                let tag: &str = &name.local;
                if DROPPED_WITH_CONTENT.contains(&tag) {
                    report.removed_elements += 1;
                    continue;
                }
                let grandchildren = child.children.borrow().clone();
                if ALLOWED_ELEMENTS.contains(&tag) {
                    let kept = filter_attributes(tag, &attrs.borrow(), policy, report);
                    let copy = create_element(tag, kept);
                    append(&destination, copy.clone());
                    frames.push((grandchildren, 0, copy));
                } else {
                    frames.push((grandchildren, 0, destination));
                }
            }
            _ => {}
        }
    }
}

fn filter_attributes(
    tag: &str,
    attrs: &[Attribute],
    policy: &SecurityPolicy,
    report: &mut SanitizedHtml,
) -> Vec<(String, String)> {
    let mut kept = Vec::new();
    for attr in attrs {
        let name = str::to_ascii_lowercase(&attr.name.local);
        let value: &str = &attr.value;
        let allowed = GLOBAL_ATTRIBUTES.contains(&name.as_str())
            || element_attributes(tag).contains(&name.as_str());

        let keep = allowed
            && !name.starts_with("on")
            && match name.as_str() {
                "href" => url_is_safe(value, false, policy),
                "src" => url_is_safe(value, tag == "img", policy),
                _ => true,
            };
        if keep {
            kept.push((name, value.to_string()));
        } else {
            report.removed_attributes += 1;
        }
    }
    kept
}

fn url_is_safe(value: &str, image: bool, policy: &SecurityPolicy) -> bool {
    let squashed: String = value
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect::<String>()
        .to_ascii_lowercase();
    if squashed.starts_with("javascript:") || squashed.starts_with("vbscript:") {
        return false;
    }
    match check_data_uri(value, policy.max_data_uri_bytes) {
        DataUriCheck::NotDataUri => validate_url(value, &policy.allowed_schemes).is_ok(),
        DataUriCheck::Within { media_type, .. } => {
            image && validate_image_data_uri(value, &media_type).is_ok()
        }
        DataUriCheck::OverBudget { .. } => false,
    }
}

fn append(parent: &Handle, child: Handle) {
    child.parent.set(Some(Rc::downgrade(parent)));
    parent.children.borrow_mut().push(child);
}

fn create_element(tag: &str, attrs: Vec<(String, String)>) -> Handle {
    let qual_name = QualName::new(None, ns!(html), LocalName::from(tag));
    let attributes = attrs
        .into_iter()
        .map(|(name, value)| Attribute {
            name: QualName::new(None, ns!(), LocalName::from(name.as_str())),
            value: value.into(),
        })
        .collect();

    Rc::new(Node {
        parent: Cell::new(None),
        children: RefCell::new(Vec::new()),
        data: NodeData::Element {
            name: qual_name,
            attrs: RefCell::new(attributes),
            template_contents: Default::default(),
            mathml_annotation_xml_integration_point: false,
        },
    })
}

fn create_text(text: &str) -> Handle {
    Rc::new(Node {
        parent: Cell::new(None),
        children: RefCell::new(Vec::new()),
        data: NodeData::Text {
            contents: RefCell::new(text.into()),
        },
    })
}

fn serialize_children(container: &Handle) -> String {
    let mut output = Vec::new();
    let opts = SerializeOpts {
        traversal_scope: TraversalScope::ChildrenOnly(None),
        ..Default::default()
    };
    let serializable = SerializableHandle::from(container.clone());
    if let Err(err) = serialize(&mut output, &serializable, opts) {
        log::warn!("html serialization failed: {}", err);
        return String::new();
    }
    String::from_utf8_lossy(&output).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> SecurityPolicy {
        SecurityPolicy {
            allowed_schemes: vec!["http".into(), "https".into(), "mailto".into()],
            allow_html: true,
            max_data_uri_bytes: 64,
        }
    }

    fn clean(html: &str) -> String {
        sanitize_html(html, &policy()).html
    }

    #[test]
    fn keeps_allowed_markup() {
        insta::assert_snapshot!(
            clean("<p>Hello <strong>there</strong></p>"),
            @"<p>Hello <strong>there</strong></p>"
        );
    }

    #[test]
    fn drops_script_with_its_content() {
        let report = sanitize_html("<div>ok<script>alert(1)</script></div>", &policy());
        assert_eq!(report.html, "<div>ok</div>");
        assert!(report.changed());
    }

    #[test]
    fn drops_leading_script_that_lands_in_head() {
        let report = sanitize_html("<script>steal()</script><p>x</p>", &policy());
        assert_eq!(report.html, "<p>x</p>");
        assert_eq!(report.removed_elements, 1);
    }

    #[test]
    fn strips_event_handlers() {
        assert_eq!(
            clean(r#"<span title="t" onclick="evil()">x</span>"#),
            r#"<span title="t">x</span>"#
        );
        assert_eq!(clean(r#"<img src="a.png" onerror="evil()">"#), r#"<img src="a.png">"#);
    }

    #[test]
    fn strips_script_urls_even_when_obfuscated() {
        assert_eq!(clean(r#"<a href="javascript:alert(1)">x</a>"#), "<a>x</a>");
        assert_eq!(clean("<a href=\"java\tscript:alert(1)\">x</a>"), "<a>x</a>");
        assert_eq!(
            clean(r#"<a href="https://example.com">x</a>"#),
            r#"<a href="https://example.com">x</a>"#
        );
    }

    #[test]
    fn data_urls_only_survive_on_small_images() {
        assert_eq!(
            clean(r#"<img src="data:image/png;base64,QUJD">"#),
            r#"<img src="data:image/png;base64,QUJD">"#
        );
        assert_eq!(clean(r#"<a href="data:text/html,hi">x</a>"#), "<a>x</a>");
        let big = format!(r#"<img src="data:image/png;base64,{}">"#, "QUJD".repeat(100));
        assert_eq!(clean(&big), "<img>");
        assert_eq!(clean(r#"<img src="data:text/html,hi">"#), "<img>");
    }

    #[test]
    fn unknown_elements_are_unwrapped() {
        assert_eq!(clean("<custom-tag><em>kept</em></custom-tag>"), "<em>kept</em>");
        assert_eq!(clean("<center>mid</center>"), "mid");
    }

    #[test]
    fn comments_are_removed() {
        assert_eq!(clean("<p>a<!-- hidden -->b</p>"), "<p>ab</p>");
    }

    #[test]
    fn deep_nesting_does_not_recurse() {
        let depth = 2_000;
        let html = format!("{}x{}", "<span>".repeat(depth), "</span>".repeat(depth));
        let out = clean(&html);
        assert!(out.contains('x'));
    }
}
