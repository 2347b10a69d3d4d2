use crate::domain::model::{DeckName, TaskSpec};
use crate::utils::error::{DeckError, Result};
use crate::utils::validation::validate_url;
use std::path::Path;

/// 解析任務清單：每行 `<deck> <url>`，空行與 `#` 開頭的行略過
pub fn parse_task_list(content: &str) -> Result<Vec<TaskSpec>> {
    let mut specs = Vec::new();

    for (index, raw) in content.lines().enumerate() {
        let line_number = index + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let malformed = |reason: String| DeckError::MalformedTaskLine {
            line_number,
            line: line.to_string(),
            reason,
        };

        let fields: Vec<&str> = line.split_whitespace().collect();
        let [deck, url] = fields.as_slice() else {
            return Err(malformed(format!(
                "expected '<deck> <url>', found {} fields",
                fields.len()
            )));
        };

        let deck = DeckName::parse(deck).map_err(|e| malformed(e.to_string()))?;
        validate_url("url", url).map_err(|e| malformed(e.to_string()))?;

        specs.push(TaskSpec {
            deck,
            url: url.to_string(),
            line_number,
        });
    }

    Ok(specs)
}

pub async fn load_task_list(path: impl AsRef<Path>) -> Result<Vec<TaskSpec>> {
    let path = path.as_ref();
    let content = tokio::fs::read_to_string(path).await.map_err(|e| DeckError::ConfigError {
        message: format!("cannot read task list {}: {}", path.display(), e),
    })?;
    let specs = parse_task_list(&content)?;
    tracing::info!("'{}' loaded file, {} tasks created", path.display(), specs.len());
    Ok(specs)
}
