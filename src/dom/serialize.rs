use super::{Document, NodeId, NodeKind};

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "basefont", "bgsound", "br", "col", "embed", "frame", "hr", "img", "input",
    "keygen", "link", "meta", "param", "source", "track", "wbr",
];

/// 解析時會吃掉開頭換行的元素，輸出時要補回
const LEADING_NEWLINE_ELEMENTS: &[&str] = &["pre", "textarea", "listing"];

const RAW_TEXT_ELEMENTS: &[&str] = &[
    "style", "script", "xmp", "iframe", "noembed", "noframes", "plaintext",
];

enum Visit {
    Open(NodeId),
    Close(NodeId),
}

/// 將整份文件轉回 HTML 字串
pub fn serialize(doc: &Document) -> String {
    serialize_node(doc, doc.root())
}

/// 輸出 `id` 本身與其子樹；文件根節點只輸出子節點
pub fn serialize_node(doc: &Document, id: NodeId) -> String {
    let mut out = String::new();
    let mut stack = vec![Visit::Open(id)];

    while let Some(visit) = stack.pop() {
        match visit {
            Visit::Close(node) => {
                if let Some(name) = doc.tag_name(node) {
                    out.push_str("</");
                    out.push_str(name);
                    out.push('>');
                }
            }
            Visit::Open(node) => match doc.kind(node) {
                NodeKind::Document => {
                    push_children(&mut stack, doc, node);
                }
                NodeKind::Doctype { name } => {
                    out.push_str("<!DOCTYPE ");
                    out.push_str(name);
                    out.push('>');
                }
                NodeKind::Comment(text) => {
                    out.push_str("<!--");
                    out.push_str(text);
                    out.push_str("-->");
                }
                NodeKind::Text(text) => {
                    let raw = doc
                        .parent(node)
                        .and_then(|parent| doc.tag_name(parent))
                        .is_some_and(|tag| RAW_TEXT_ELEMENTS.contains(&tag));
                    if raw {
                        out.push_str(text);
                    } else {
                        escape_into(&mut out, text, false);
                    }
                }
                NodeKind::Element { name, attrs } => {
                    out.push('<');
                    out.push_str(name);
                    for attr in attrs {
                        out.push(' ');
                        out.push_str(&attr.name);
                        out.push_str("=\"");
                        escape_into(&mut out, &attr.value, true);
                        out.push('"');
                    }
                    out.push('>');
                    if LEADING_NEWLINE_ELEMENTS.contains(&name.as_str())
                        && starts_with_newline(doc, node)
                    {
                        out.push('\n');
                    }
                    if !VOID_ELEMENTS.contains(&name.as_str()) {
                        stack.push(Visit::Close(node));
                        push_children(&mut stack, doc, node);
                    }
                }
            },
        }
    }

    out
}

fn push_children(stack: &mut Vec<Visit>, doc: &Document, node: NodeId) {
    stack.extend(doc.children(node).iter().rev().map(|&child| Visit::Open(child)));
}

fn starts_with_newline(doc: &Document, node: NodeId) -> bool {
    doc.children(node)
        .first()
        .and_then(|&child| doc.text(child))
        .is_some_and(|text| text.starts_with('\n'))
}

fn escape_into(out: &mut String, text: &str, attribute: bool) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            '"' if attribute => out.push_str("&quot;"),
            '<' if !attribute => out.push_str("&lt;"),
            '>' if !attribute => out.push_str("&gt;"),
            c => out.push(c),
        }
    }
}
