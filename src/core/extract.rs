use crate::core::selection::{collect_with_paragraphs, project, Relevance};
use crate::dom::{serialize, Document, NodeId, Page};
use crate::domain::model::{Card, Category, DeckName};
use crate::utils::error::{DeckError, Result};
use scraper::Selector;
use serde::{Deserialize, Serialize};
use url::Url;

/// 各類宣告的 CSS 選擇器
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorSettings {
    pub variable_block: String,
    pub variable_marker: String,
    pub constant_block: String,
    pub constant_marker: String,
    pub function_container: String,
    pub function_header: String,
    pub type_container: String,
    pub type_header: String,
    pub source_link: String,
}

impl Default for SelectorSettings {
    fn default() -> Self {
        Self {
            variable_block: "section.Documentation-variables div.Documentation-declaration"
                .to_string(),
            variable_marker: "span[data-kind='variable']".to_string(),
            constant_block: "section.Documentation-constants div.Documentation-declaration"
                .to_string(),
            constant_marker: "span[data-kind='constant']".to_string(),
            function_container: "div.Documentation-function".to_string(),
            function_header: "div.Documentation-function h4.Documentation-functionHeader"
                .to_string(),
            type_container: "div.Documentation-type".to_string(),
            type_header: "div.Documentation-type h4.Documentation-typeHeader".to_string(),
            source_link: "a.Documentation-source".to_string(),
        }
    }
}

struct CompiledSelector {
    raw: String,
    selector: Selector,
}

impl CompiledSelector {
    fn compile(raw: &str) -> Result<Self> {
        let selector = Selector::parse(raw).map_err(|e| DeckError::SelectorError {
            selector: raw.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            raw: raw.to_string(),
            selector,
        })
    }
}

/// 變數與常數：宣告區塊加上標記識別字的 span
struct DeclarationRule {
    category: Category,
    block: CompiledSelector,
    marker: CompiledSelector,
}

/// 函式與型別：容器加上標題，兩者依位置配對
struct ContainerRule {
    category: Category,
    container: CompiledSelector,
    header: CompiledSelector,
}

/// 從文件頁面抽取卡片的規則，編譯一次後由所有抽取 worker 共用
pub struct Extractor {
    declarations: [DeclarationRule; 2],
    containers: [ContainerRule; 2],
    source_link: CompiledSelector,
}

impl Extractor {
    pub fn new() -> Result<Self> {
        Self::from_settings(&SelectorSettings::default())
    }

    pub fn from_settings(settings: &SelectorSettings) -> Result<Self> {
        Ok(Self {
            declarations: [
                DeclarationRule {
                    category: Category::Variable,
                    block: CompiledSelector::compile(&settings.variable_block)?,
                    marker: CompiledSelector::compile(&settings.variable_marker)?,
                },
                DeclarationRule {
                    category: Category::Constant,
                    block: CompiledSelector::compile(&settings.constant_block)?,
                    marker: CompiledSelector::compile(&settings.constant_marker)?,
                },
            ],
            containers: [
                ContainerRule {
                    category: Category::Function,
                    container: CompiledSelector::compile(&settings.function_container)?,
                    header: CompiledSelector::compile(&settings.function_header)?,
                },
                ContainerRule {
                    category: Category::Type,
                    container: CompiledSelector::compile(&settings.type_container)?,
                    header: CompiledSelector::compile(&settings.type_header)?,
                },
            ],
            source_link: CompiledSelector::compile(&settings.source_link)?,
        })
    }

    /// 依變數、常數、函式、型別的順序產生卡片
    pub fn extract(&self, markup: &str, url: &str, deck: &DeckName) -> Result<Vec<Card>> {
        let mut page = Page::parse(markup);
        let normalized = normalize_links(page.document_mut(), url);
        let namespace = deck.namespace_path();

        let mut cards = Vec::new();
        let mut counts = Vec::with_capacity(Category::ORDER.len());

        for rule in &self.declarations {
            let before = cards.len();
            self.declaration_cards(&mut page, rule, url, &namespace, &mut cards)?;
            counts.push((rule.category, cards.len() - before));
        }
        for rule in &self.containers {
            let before = cards.len();
            self.container_cards(&mut page, rule, url, &namespace, &mut cards)?;
            counts.push((rule.category, cards.len() - before));
        }

        let summary = counts
            .iter()
            .map(|(category, count)| format!("{} {}", count, category))
            .collect::<Vec<_>>()
            .join(", ");
        tracing::info!(
            "'{}' found {} ({} links normalized), generated {} cards",
            deck,
            summary,
            normalized,
            cards.len()
        );

        Ok(cards)
    }

    fn declaration_cards(
        &self,
        page: &mut Page,
        rule: &DeclarationRule,
        url: &str,
        namespace: &str,
        cards: &mut Vec<Card>,
    ) -> Result<()> {
        for block in page.select(&rule.block.selector) {
            for marker in page.select_within(block, &rule.marker.selector) {
                let doc = page.document();
                let id = match doc.attr(marker, "id") {
                    Some(id) if !id.is_empty() => id.to_string(),
                    _ => {
                        return Err(DeckError::MissingAttribute {
                            url: url.to_string(),
                            element: doc.tag_name(marker).unwrap_or_default().to_string(),
                            attribute: "id".to_string(),
                        })
                    }
                };
                qualify_identifier(page.document_mut(), marker, &id, namespace);
            }

            let doc = page.document();
            let relevance = Relevance::designated(doc, collect_with_paragraphs(doc, block));
            let fragment = serialize(&project(doc, &relevance));
            cards.push(Card::same_sided(rule.category, fragment));
        }
        Ok(())
    }

    fn container_cards(
        &self,
        page: &mut Page,
        rule: &ContainerRule,
        url: &str,
        namespace: &str,
        cards: &mut Vec<Card>,
    ) -> Result<()> {
        let containers = page.select(&rule.container.selector);
        let headers = page.select(&rule.header.selector);
        if containers.len() != headers.len() {
            return Err(DeckError::StructureMismatch {
                category: rule.category,
                url: url.to_string(),
                containers: containers.len(),
                headers: headers.len(),
            });
        }

        for (index, (&container, &header)) in containers.iter().zip(&headers).enumerate() {
            if !page.document().subtree_index().contains(container, header) {
                return Err(DeckError::MisplacedHeader {
                    category: rule.category,
                    url: url.to_string(),
                    index,
                });
            }

            let anchors = page.select_within(header, &self.source_link.selector);
            if anchors.is_empty() {
                return Err(DeckError::MissingElement {
                    category: rule.category,
                    url: url.to_string(),
                    selector: self.source_link.raw.clone(),
                });
            }
            for anchor in anchors {
                prefix_first_text(page.document_mut(), anchor, namespace);
            }

            let doc = page.document();
            let back = serialize(&project(doc, &Relevance::designated(doc, [container])));
            let front = serialize(&project(doc, &Relevance::designated(doc, [header])));
            cards.push(Card::new(rule.category, front, back));
        }
        Ok(())
    }
}

/// 將相對的 `href`/`src` 轉成絕對網址，回傳改寫的屬性數量
pub fn normalize_links(doc: &mut Document, base: &str) -> usize {
    let base = match Url::parse(base) {
        Ok(base) => base,
        Err(e) => {
            tracing::warn!("Cannot use '{}' as base for links: {}", base, e);
            return 0;
        }
    };

    let mut normalized = 0;
    let nodes: Vec<NodeId> = doc.node_ids().collect();
    for node in nodes {
        let Some(attrs) = doc.attrs_mut(node) else {
            continue;
        };
        for attr in attrs
            .iter_mut()
            .filter(|attr| attr.name == "href" || attr.name == "src")
        {
            match Url::parse(&attr.value) {
                Ok(_) => {}
                Err(url::ParseError::RelativeUrlWithoutBase) => match base.join(&attr.value) {
                    Ok(resolved) => {
                        attr.value = resolved.to_string();
                        normalized += 1;
                    }
                    Err(e) => {
                        tracing::debug!("Leaving link '{}' unchanged: {}", attr.value, e)
                    }
                },
                Err(e) => tracing::debug!("Leaving link '{}' unchanged: {}", attr.value, e),
            }
        }
    }
    normalized
}

/// `id` 在標記文字中的每次出現都改成 `<namespace>.<id>`
fn qualify_identifier(doc: &mut Document, marker: NodeId, id: &str, namespace: &str) {
    let qualified = format!("{}.{}", namespace, id);
    let texts: Vec<NodeId> = doc
        .descendants(marker)
        .filter(|&node| doc.is_text(node))
        .collect();
    for node in texts {
        if let Some(text) = doc.text_mut(node) {
            if text.contains(id) {
                *text = text.replace(id, &qualified);
            }
        }
    }
}

fn prefix_first_text(doc: &mut Document, anchor: NodeId, namespace: &str) {
    let first = doc.descendants(anchor).find(|&node| doc.is_text(node));
    match first.and_then(|node| doc.text_mut(node)) {
        Some(text) => text.insert_str(0, &format!("{}.", namespace)),
        None => tracing::debug!("Source link without text, nothing to prefix"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://pkg.go.dev/io";

    const PAGE: &str = r##"<!DOCTYPE html>
<html><head><title>io</title></head><body>
<div class="Documentation-index"><a href="#Copy">func Copy</a></div>
<section class="Documentation-constants">
<div class="Documentation-declaration"><pre>const <span id="SeekStart" data-kind="constant">SeekStart</span> = 0</pre></div>
<p>Seek whence values.</p>
</section>
<section class="Documentation-variables">
<div class="Documentation-declaration"><pre>var <span id="EOF" data-kind="variable">EOF</span> = errors.New("EOF")</pre></div>
<p>EOF is the error returned by Read when no more input is available.</p>
<div class="Documentation-declaration"><pre>var <span id="ErrShortWrite" data-kind="variable">ErrShortWrite</span> = errors.New("short write")</pre></div>
</section>
<section class="Documentation-functions">
<div class="Documentation-function">
<h4 class="Documentation-functionHeader" id="Copy"><span>func <a class="Documentation-source" href="/src/io/io.go#L1">Copy</a></span></h4>
<div class="Documentation-declaration"><pre>func Copy(dst Writer, src Reader) (written int64, err error)</pre></div>
<p>Copy copies from src to dst.</p>
</div>
</section>
<section class="Documentation-types">
<div class="Documentation-type">
<h4 class="Documentation-typeHeader" id="Reader"><span>type <a class="Documentation-source" href="/src/io/io.go#L2">Reader</a></span></h4>
<div class="Documentation-declaration"><pre>type Reader interface { Read(p []byte) (n int, err error) }</pre></div>
</div>
</section>
</body></html>"##;

    fn deck() -> DeckName {
        DeckName::parse("Root::pkg::example::sub").unwrap()
    }

    #[test]
    fn test_cards_follow_category_order() {
        let cards = Extractor::new().unwrap().extract(PAGE, URL, &deck()).unwrap();
        let categories: Vec<Category> = cards.iter().map(Card::category).collect();
        assert_eq!(
            categories,
            vec![
                Category::Variable,
                Category::Variable,
                Category::Constant,
                Category::Function,
                Category::Type,
            ]
        );
    }

    #[test]
    fn test_variable_identifier_is_qualified() {
        let cards = Extractor::new().unwrap().extract(PAGE, URL, &deck()).unwrap();
        let eof = &cards[0];

        assert_eq!(eof.front(), eof.back());
        assert!(eof
            .front()
            .contains(r#"<span id="EOF" data-kind="variable">example.sub.EOF</span>"#));
        assert!(eof.front().contains("<p>EOF is the error returned by Read"));
        assert!(!eof.front().contains("ErrShortWrite"));
        assert!(!eof.front().contains("<title>"));
        assert!(eof.implementation().is_none());

        let short_write = &cards[1];
        assert!(short_write.front().contains("example.sub.ErrShortWrite"));
        assert!(!short_write.front().contains("<p>"));
    }

    #[test]
    fn test_function_front_is_header_and_back_is_container() {
        let cards = Extractor::new().unwrap().extract(PAGE, URL, &deck()).unwrap();
        let copy = &cards[3];

        assert!(copy.front().contains(
            r#"<a class="Documentation-source" href="https://pkg.go.dev/src/io/io.go#L1">example.sub.Copy</a>"#
        ));
        assert!(!copy.front().contains("Copy copies from src to dst."));
        assert!(copy.back().contains("example.sub.Copy</a>"));
        assert!(copy.back().contains("Copy copies from src to dst."));

        let reader = &cards[4];
        assert!(reader.front().contains(">example.sub.Reader</a>"));
        assert!(!reader.back().contains("func Copy"));
    }

    #[test]
    fn test_header_count_mismatch_is_structural() {
        let page = r#"<body>
<div class="Documentation-function"><h4 class="Documentation-functionHeader"><a class="Documentation-source" href="/a">A</a></h4></div>
<div class="Documentation-function"><pre>func B()</pre></div>
</body>"#;
        let err = Extractor::new().unwrap().extract(page, URL, &deck()).unwrap_err();
        match err {
            DeckError::StructureMismatch {
                category,
                containers,
                headers,
                ..
            } => {
                assert_eq!(category, Category::Function);
                assert_eq!(containers, 2);
                assert_eq!(headers, 1);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_header_outside_its_positional_container() {
        let page = r#"<body>
<div class="Documentation-type"><pre>type A int</pre></div>
<div class="Documentation-type">
<h4 class="Documentation-typeHeader"><a class="Documentation-source" href="/b">B</a></h4>
<h4 class="Documentation-typeHeader"><a class="Documentation-source" href="/c">C</a></h4>
</div>
</body>"#;
        let err = Extractor::new().unwrap().extract(page, URL, &deck()).unwrap_err();
        assert!(err.is_structural());
        assert!(matches!(
            err,
            DeckError::MisplacedHeader {
                category: Category::Type,
                index: 0,
                ..
            }
        ));
    }

    #[test]
    fn test_missing_marker_id_and_source_link() {
        let extractor = Extractor::new().unwrap();

        let page = r#"<section class="Documentation-constants"><div class="Documentation-declaration"><span data-kind="constant">X</span></div></section>"#;
        let err = extractor.extract(page, URL, &deck()).unwrap_err();
        assert!(matches!(err, DeckError::MissingAttribute { .. }));

        let page = r#"<div class="Documentation-function"><h4 class="Documentation-functionHeader">func F</h4></div>"#;
        let err = extractor.extract(page, URL, &deck()).unwrap_err();
        assert!(matches!(err, DeckError::MissingElement { .. }));
        assert!(err.is_structural());
    }

    #[test]
    fn test_page_without_declarations_is_valid() {
        let cards = Extractor::new()
            .unwrap()
            .extract("<html><body><p>nothing here</p></body></html>", URL, &deck())
            .unwrap();
        assert!(cards.is_empty());
    }

    #[test]
    fn test_invalid_selector_is_rejected() {
        let settings = SelectorSettings {
            type_header: "div..broken".to_string(),
            ..SelectorSettings::default()
        };
        match Extractor::from_settings(&settings) {
            Err(DeckError::SelectorError { selector, .. }) => assert_eq!(selector, "div..broken"),
            Err(other) => panic!("unexpected error {:?}", other),
            Ok(_) => panic!("selector should not compile"),
        }
    }

    #[test]
    fn test_normalize_links_only_touches_relative_values() {
        let mut page = Page::parse(
            r#"<body><a href="/src/io">a</a><img src="img/logo.png"><a href="https://go.dev/">b</a><a href="http://[bad">c</a><a name="x">d</a></body>"#,
        );
        let normalized = normalize_links(page.document_mut(), "https://pkg.go.dev/io/fs");
        assert_eq!(normalized, 2);

        let html = serialize(page.document());
        assert!(html.contains(r#"href="https://pkg.go.dev/src/io""#));
        assert!(html.contains(r#"src="https://pkg.go.dev/io/img/logo.png""#));
        assert!(html.contains(r#"href="https://go.dev/""#));
        assert!(html.contains(r#"href="http://[bad""#));
    }

    #[test]
    fn test_fragment_links_resolve_against_page() {
        let mut page = Page::parse(PAGE);
        normalize_links(page.document_mut(), URL);

        let html = serialize(page.document());
        assert!(html.contains(r##"<a href="https://pkg.go.dev/io#Copy">func Copy</a>"##));
        assert!(html.contains(r##"href="https://pkg.go.dev/src/io/io.go#L2""##));
    }

    #[test]
    fn test_namespaced_links_are_not_rewritten() {
        let mut page = Page::parse(r##"<body><svg><use xlink:href="#icon"></use></svg></body>"##);
        assert_eq!(normalize_links(page.document_mut(), URL), 0);
        assert!(serialize(page.document()).contains(r##"xlink:href="#icon""##));
    }

    #[test]
    fn test_unusable_base_leaves_links_alone() {
        let mut page = Page::parse(r#"<a href="/src/io">a</a>"#);
        assert_eq!(normalize_links(page.document_mut(), "not a url"), 0);
        assert!(serialize(page.document()).contains(r#"href="/src/io""#));
    }
}
