use super::{Attribute, Document, NodeId, NodeKind};
use ego_tree::NodeId as MarkupId;
use scraper::{ElementRef, Html, Node, Selector};
use std::collections::HashMap;

/// 解析後的 HTML 頁面：可修改的 arena 樹，加上供 CSS 選擇器查詢的原始解析結果。
///
/// 選擇器看到的是解析當下的結構；之後對 arena 的文字或屬性修改不影響查詢。
pub struct Page {
    markup: Html,
    document: Document,
    origin: Vec<MarkupId>,
    lookup: HashMap<MarkupId, NodeId>,
}

impl Page {
    pub fn parse(markup: &str) -> Self {
        Self::from_html(Html::parse_document(markup))
    }

    fn from_html(markup: Html) -> Self {
        let root = markup.tree.root();
        let mut document = Document::with_root(convert(root.value()).unwrap_or(NodeKind::Document));
        let mut origin = vec![root.id()];
        let mut lookup = HashMap::from([(root.id(), document.root())]);

        let mut stack = vec![(root, document.root())];
        while let Some((node, parent)) = stack.pop() {
            for child in node.children() {
                let Some(kind) = convert(child.value()) else {
                    continue;
                };
                let id = document.append(parent, kind);
                origin.push(child.id());
                lookup.insert(child.id(), id);
                stack.push((child, id));
            }
        }

        Self {
            markup,
            document,
            origin,
            lookup,
        }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.document
    }

    /// 全文件查詢，依文件順序回傳
    pub fn select(&self, selector: &Selector) -> Vec<NodeId> {
        self.markup
            .select(selector)
            .filter_map(|element| self.lookup.get(&element.id()).copied())
            .collect()
    }

    /// 只查 `scope` 的後代（不含本身）
    pub fn select_within(&self, scope: NodeId, selector: &Selector) -> Vec<NodeId> {
        let Some(scope) = self
            .origin
            .get(scope.index())
            .and_then(|&id| self.markup.tree.get(id))
            .and_then(ElementRef::wrap)
        else {
            return Vec::new();
        };

        scope
            .select(selector)
            .filter_map(|element| self.lookup.get(&element.id()).copied())
            .collect()
    }
}

fn convert(node: &Node) -> Option<NodeKind> {
    match node {
        Node::Document | Node::Fragment => Some(NodeKind::Document),
        Node::Doctype(doctype) => Some(NodeKind::Doctype {
            name: doctype.name().to_string(),
        }),
        Node::Comment(comment) => Some(NodeKind::Comment(owned(comment))),
        Node::Text(text) => Some(NodeKind::Text(owned(text))),
        Node::Element(element) => Some(NodeKind::Element {
            name: element.name().to_string(),
            // 保留命名空間前綴，例如 xlink:href
            attrs: element
                .attrs
                .iter()
                .map(|(name, value)| {
                    let qualified = match &name.prefix {
                        Some(prefix) => format!("{}:{}", prefix, name.local),
                        None => name.local.to_string(),
                    };
                    Attribute::new(qualified, &**value)
                })
                .collect(),
        }),
        Node::ProcessingInstruction(_) => None,
    }
}

fn owned(text: &str) -> String {
    text.to_owned()
}
