use crate::utils::error::{DeckError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// 牌組名稱的階層分隔符號
pub const DECK_SEPARATOR: &str = "::";

const MIN_DECK_SEGMENTS: usize = 3;

/// 驗證過的牌組名稱，例如 `Go::std::io::fs`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeckName(String);

impl DeckName {
    pub fn parse(raw: &str) -> Result<Self> {
        let segments: Vec<&str> = raw.split(DECK_SEPARATOR).collect();
        if segments.len() < MIN_DECK_SEGMENTS {
            return Err(DeckError::InvalidDeckName {
                name: raw.to_string(),
                reason: format!(
                    "expected at least {} segments separated by '{}', got {}",
                    MIN_DECK_SEGMENTS,
                    DECK_SEPARATOR,
                    segments.len()
                ),
            });
        }
        if segments.iter().any(|segment| segment.trim().is_empty()) {
            return Err(DeckError::InvalidDeckName {
                name: raw.to_string(),
                reason: "segments cannot be empty".to_string(),
            });
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split(DECK_SEPARATOR)
    }

    /// 識別字前綴：第三段之後轉小寫並以 `.` 串接
    pub fn namespace_path(&self) -> String {
        self.segments()
            .skip(MIN_DECK_SEGMENTS - 1)
            .map(str::to_lowercase)
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl fmt::Display for DeckName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 宣告區塊的種類，同時也是卡片輸出的固定順序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Variable,
    Constant,
    Function,
    Type,
}

impl Category {
    pub const ORDER: [Category; 4] = [
        Category::Variable,
        Category::Constant,
        Category::Function,
        Category::Type,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Variable => "variable",
            Category::Constant => "constant",
            Category::Function => "function",
            Category::Type => "type",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一張抽取出的卡片，建立後不再變動
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Card {
    category: Category,
    front: String,
    back: String,
    /// pkg.go.dev 頁面沒有實作片段，抽取時一律為 None
    implementation: Option<String>,
}

impl Card {
    pub fn new(category: Category, front: String, back: String) -> Self {
        Self {
            category,
            front,
            back,
            implementation: None,
        }
    }

    /// 正反面相同的卡片（變數與常數）
    pub fn same_sided(category: Category, fragment: String) -> Self {
        Self::new(category, fragment.clone(), fragment)
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn front(&self) -> &str {
        &self.front
    }

    pub fn back(&self) -> &str {
        &self.back
    }

    pub fn implementation(&self) -> Option<&str> {
        self.implementation.as_deref()
    }
}

/// 任務清單中的一行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSpec {
    pub deck: DeckName,
    pub url: String,
    pub line_number: usize,
}

/// 在管線各階段之間傳遞的工作單位；同一時間只屬於一個階段
#[derive(Debug)]
pub struct Task {
    pub sequence: usize,
    pub url: String,
    pub deck: DeckName,
    pub payload: Option<String>,
    pub cards: Option<Vec<Card>>,
    pub error: Option<DeckError>,
}

impl Task {
    pub fn new(sequence: usize, spec: TaskSpec) -> Self {
        Self {
            sequence,
            url: spec.url,
            deck: spec.deck,
            payload: None,
            cards: None,
            error: None,
        }
    }

    pub fn card_count(&self) -> usize {
        self.cards.as_ref().map_or(0, Vec::len)
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error {
            Some(error) => write!(f, "Task{{ deck: {}, url: {}, err: {} }}", self.deck, self.url, error),
            None => write!(f, "Task{{ deck: {}, url: {} }}", self.deck, self.url),
        }
    }
}

/// Anki 卡片模型：模型名稱與三個欄位名稱
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CardModel {
    pub name: String,
    pub front_field: String,
    pub back_field: String,
    pub implementation_field: String,
}

impl Default for CardModel {
    fn default() -> Self {
        Self {
            name: "Golang".to_string(),
            front_field: "Identifier".to_string(),
            back_field: "Declaration".to_string(),
            implementation_field: "Implementation".to_string(),
        }
    }
}

impl CardModel {
    pub fn note_for(&self, deck: &DeckName, card: &Card) -> Note {
        let mut fields = BTreeMap::new();
        fields.insert(self.front_field.clone(), card.front().to_string());
        fields.insert(self.back_field.clone(), card.back().to_string());
        fields.insert(
            self.implementation_field.clone(),
            card.implementation().unwrap_or_default().to_string(),
        );
        Note {
            deck_name: deck.as_str().to_string(),
            model_name: self.name.clone(),
            fields,
        }
    }
}

/// 送往筆記服務的筆記
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub deck_name: String,
    pub model_name: String,
    pub fields: BTreeMap<String, String>,
}
