use crate::dom::{Document, NodeId, NodeKind};

/// 判斷節點是否相關
pub enum Relevance<'a> {
    /// 任意條件，每次投影時逐節點快取可達性
    Predicate(Box<dyn Fn(&Document, NodeId) -> bool + 'a>),
    /// 指定節點集合，其子樹整個相關
    Designated(DesignatedSet),
}

impl<'a> Relevance<'a> {
    pub fn predicate(test: impl Fn(&Document, NodeId) -> bool + 'a) -> Self {
        Relevance::Predicate(Box::new(test))
    }

    pub fn everything() -> Self {
        Self::predicate(|_, _| true)
    }

    pub fn nothing() -> Self {
        Self::predicate(|_, _| false)
    }

    pub fn designated(doc: &Document, members: impl IntoIterator<Item = NodeId>) -> Self {
        Relevance::Designated(DesignatedSet::new(doc, members))
    }
}

/// 指定節點集合，依前序排列並只保留最外層的成員。
///
/// 可達性查詢直接使用文件的子樹索引，索引在同一份文件的所有查詢之間共用。
#[derive(Debug, Clone)]
pub struct DesignatedSet {
    members: Vec<NodeId>,
}

impl DesignatedSet {
    pub fn new(doc: &Document, members: impl IntoIterator<Item = NodeId>) -> Self {
        let index = doc.subtree_index();
        let mut sorted: Vec<NodeId> = members.into_iter().collect();
        sorted.sort_by_key(|&id| index.enter(id));
        sorted.dedup();

        let mut outermost: Vec<NodeId> = Vec::with_capacity(sorted.len());
        for id in sorted {
            match outermost.last() {
                Some(&last) if index.contains(last, id) => {}
                _ => outermost.push(id),
            }
        }

        Self { members: outermost }
    }

    pub fn members(&self) -> &[NodeId] {
        &self.members
    }

    /// `node` 本身相關，或子樹內有相關節點
    pub fn reaches(&self, doc: &Document, node: NodeId) -> bool {
        let index = doc.subtree_index();
        let position = self
            .members
            .partition_point(|&member| index.enter(member) < index.enter(node));

        if let Some(&next) = self.members.get(position) {
            if index.contains(node, next) {
                return true;
            }
        }
        position > 0 && index.contains(self.members[position - 1], node)
    }
}

/// 以文件根節點為起點投影。
///
/// 複製相關節點、它們的所有祖先，以及每個被複製節點的文字子節點；結果是可單獨輸出的新文件。
pub fn project(doc: &Document, relevance: &Relevance<'_>) -> Document {
    project_from(doc, doc.root(), relevance)
}

/// 投影 `root` 的子樹，`root` 一定會被複製成新文件的根節點。
///
/// 沒有任何相關節點時，結果只有根節點。
pub fn project_from(doc: &Document, root: NodeId, relevance: &Relevance<'_>) -> Document {
    let mut reach = Reachability::new(doc, relevance);
    let mut projected = Document::with_root(doc.kind(root).clone());
    let keeps_root_text = reach.reaches(root);

    let mut stack = vec![(root, projected.root(), keeps_root_text)];
    while let Some((source, copy, keeps_text)) = stack.pop() {
        let mut next = Vec::new();
        for &child in doc.children(source) {
            if reach.reaches(child) {
                let id = projected.append(copy, doc.kind(child).clone());
                next.push((child, id, true));
            } else if keeps_text && doc.is_text(child) {
                projected.append(copy, doc.kind(child).clone());
            }
        }
        stack.extend(next.into_iter().rev());
    }

    projected
}

/// 宣告節點加上其後的段落兄弟節點。
///
/// 跳過空白文字與註解，收集 `p`，遇到其他節點即停止。
pub fn collect_with_paragraphs(doc: &Document, node: NodeId) -> Vec<NodeId> {
    let mut collected = vec![node];
    for &sibling in doc.next_siblings(node) {
        if is_insignificant(doc, sibling) {
            continue;
        }
        if doc.tag_name(sibling) == Some("p") {
            collected.push(sibling);
        } else {
            break;
        }
    }
    collected
}

fn is_insignificant(doc: &Document, node: NodeId) -> bool {
    match doc.kind(node) {
        NodeKind::Text(text) => text.trim().is_empty(),
        NodeKind::Comment(_) => true,
        _ => false,
    }
}

/// 一次投影期間的可達性查詢
struct Reachability<'d, 'r, 'a> {
    doc: &'d Document,
    relevance: &'r Relevance<'a>,
    memo: Vec<Option<bool>>,
}

impl<'d, 'r, 'a> Reachability<'d, 'r, 'a> {
    fn new(doc: &'d Document, relevance: &'r Relevance<'a>) -> Self {
        let memo = match relevance {
            Relevance::Predicate(_) => vec![None; doc.len()],
            Relevance::Designated(_) => Vec::new(),
        };
        Self {
            doc,
            relevance,
            memo,
        }
    }

    fn reaches(&mut self, node: NodeId) -> bool {
        let relevance = self.relevance;
        match relevance {
            Relevance::Designated(set) => set.reaches(self.doc, node),
            Relevance::Predicate(test) => {
                if let Some(known) = self.memo[node.index()] {
                    return known;
                }
                self.evaluate(node, test.as_ref())
            }
        }
    }

    /// 後序計算 `node` 子樹內每個節點的可達性，條件對每個節點至多呼叫一次
    fn evaluate(&mut self, node: NodeId, test: &dyn Fn(&Document, NodeId) -> bool) -> bool {
        let doc = self.doc;
        let mut stack = vec![(node, false)];

        while let Some((current, expanded)) = stack.pop() {
            if self.memo[current.index()].is_some() {
                continue;
            }
            if !expanded {
                stack.push((current, true));
                stack.extend(
                    doc.children(current)
                        .iter()
                        .filter(|child| self.memo[child.index()].is_none())
                        .map(|&child| (child, false)),
                );
                continue;
            }

            let reached = test(doc, current)
                || doc
                    .children(current)
                    .iter()
                    .any(|child| self.memo[child.index()] == Some(true));
            self.memo[current.index()] = Some(reached);
        }

        self.memo[node.index()].unwrap_or(false)
    }
}
