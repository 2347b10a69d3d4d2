pub mod parse;
pub mod serialize;

pub use parse::Page;
pub use serialize::{serialize, serialize_node};

use std::cell::OnceCell;

/// 節點在所屬文件 arena 中的索引
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

impl Attribute {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Document,
    Doctype { name: String },
    Element { name: String, attrs: Vec<Attribute> },
    Text(String),
    Comment(String),
}

impl NodeKind {
    pub fn element(name: &str, attrs: &[(&str, &str)]) -> Self {
        NodeKind::Element {
            name: name.to_string(),
            attrs: attrs
                .iter()
                .map(|(key, value)| Attribute::new(*key, *value))
                .collect(),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        NodeKind::Text(text.into())
    }
}

#[derive(Debug, Clone)]
struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// 每個節點的前序進入/離開編號；`enter[a] <= enter[n] < exit[a]` 代表 a 是 n 的祖先或本身
#[derive(Debug, Clone)]
pub struct SubtreeIndex {
    enter: Vec<usize>,
    exit: Vec<usize>,
}

impl SubtreeIndex {
    fn build(doc: &Document) -> Self {
        let mut enter = vec![0; doc.nodes.len()];
        let mut exit = vec![0; doc.nodes.len()];
        let mut counter = 0;
        let mut stack = vec![(doc.root(), false)];

        while let Some((id, finished)) = stack.pop() {
            if finished {
                exit[id.0] = counter;
                continue;
            }
            enter[id.0] = counter;
            counter += 1;
            stack.push((id, true));
            stack.extend(doc.children(id).iter().rev().map(|&child| (child, false)));
        }

        Self { enter, exit }
    }

    pub fn enter(&self, id: NodeId) -> usize {
        self.enter[id.0]
    }

    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        self.enter[ancestor.0] <= self.enter[node.0] && self.enter[node.0] < self.exit[ancestor.0]
    }
}

/// 以 arena 儲存的文件樹。
///
/// 節點放在同一個 `Vec`，以 [`NodeId`] 互相參照；子節點清單有序，父節點只存索引。
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<NodeData>,
    index: OnceCell<SubtreeIndex>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        Self::with_root(NodeKind::Document)
    }

    pub fn with_root(kind: NodeKind) -> Self {
        Self {
            nodes: vec![NodeData {
                kind,
                parent: None,
                children: Vec::new(),
            }],
            index: OnceCell::new(),
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len()).map(NodeId)
    }

    pub fn append(&mut self, parent: NodeId, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(NodeData {
            kind,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent.0].children.push(id);
        // 結構改變，舊的子樹索引失效
        self.index.take();
        id
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.0].kind
    }

    /// 只能改節點內容，樹的結構不受影響
    pub fn kind_mut(&mut self, id: NodeId) -> &mut NodeKind {
        &mut self.nodes[id.0].kind
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn next_siblings(&self, id: NodeId) -> &[NodeId] {
        let Some(parent) = self.parent(id) else {
            return &[];
        };
        let siblings = self.children(parent);
        match siblings.iter().position(|&sibling| sibling == id) {
            Some(position) => &siblings[position + 1..],
            None => &[],
        }
    }

    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), move |&current| self.parent(current))
    }

    /// 前序走訪，包含 `id` 本身
    pub fn descendants(&self, id: NodeId) -> Descendants<'_> {
        Descendants {
            doc: self,
            stack: vec![id],
        }
    }

    pub fn tag_name(&self, id: NodeId) -> Option<&str> {
        match self.kind(id) {
            NodeKind::Element { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        match self.kind(id) {
            NodeKind::Element { attrs, .. } => attrs
                .iter()
                .find(|attr| attr.name == name)
                .map(|attr| attr.value.as_str()),
            _ => None,
        }
    }

    pub fn attrs_mut(&mut self, id: NodeId) -> Option<&mut Vec<Attribute>> {
        match self.kind_mut(id) {
            NodeKind::Element { attrs, .. } => Some(attrs),
            _ => None,
        }
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        match self.kind(id) {
            NodeKind::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn text_mut(&mut self, id: NodeId) -> Option<&mut String> {
        match self.kind_mut(id) {
            NodeKind::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn is_text(&self, id: NodeId) -> bool {
        matches!(self.kind(id), NodeKind::Text(_))
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(self.kind(id), NodeKind::Element { .. })
    }

    /// 子樹內所有文字節點串接
    pub fn text_content(&self, id: NodeId) -> String {
        self.descendants(id)
            .filter_map(|node| self.text(node))
            .collect()
    }

    pub fn subtree_index(&self) -> &SubtreeIndex {
        self.index.get_or_init(|| SubtreeIndex::build(self))
    }

    /// 比較兩棵子樹的種類、屬性、文字與順序
    pub fn same_structure(&self, id: NodeId, other: &Document, other_id: NodeId) -> bool {
        let mut stack = vec![(id, other_id)];
        while let Some((left, right)) = stack.pop() {
            if self.kind(left) != other.kind(right) {
                return false;
            }
            let (left_children, right_children) = (self.children(left), other.children(right));
            if left_children.len() != right_children.len() {
                return false;
            }
            stack.extend(left_children.iter().copied().zip(right_children.iter().copied()));
        }
        true
    }
}

pub struct Descendants<'a> {
    doc: &'a Document,
    stack: Vec<NodeId>,
}

impl Iterator for Descendants<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.stack.pop()?;
        self.stack
            .extend(self.doc.children(id).iter().rev().copied());
        Some(id)
    }
}
