//! Structured checklist-item records.
//!
//! Checklists arrive as JSONL with loosely typed, bilingual field names: the
//! original authoring tools write Chinese keys (`分类`, `专项施工方案严重缺陷情形`, ...),
//! while some exports use English aliases. Rather than dynamic dictionary
//! lookups scattered through the checking layer, this module resolves each
//! field once, Chinese key first, then the English alias; absent fields are
//! `None`, never an error.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, RetrievalError};

/// One checklist item with all fields optional.
///
/// Content-check items carry `category` + `scenario`; structure-check items
/// carry `name` / `required` / `kind` / `notes`. A single record type covers
/// both since producers mix them freely.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChecklistItem {
    /// Item number (`序号`). Numbers are coerced to strings.
    pub item_number: Option<String>,
    /// Check category (`分类`).
    pub category: Option<String>,
    /// Defect scenario to check for (`专项施工方案严重缺陷情形`).
    pub scenario: Option<String>,
    /// Section/structural item name (`名称`).
    pub name: Option<String>,
    /// Whether the item is mandatory (`必有`). Booleans are coerced to strings.
    pub required: Option<String>,
    /// Item type (`类型`).
    pub kind: Option<String>,
    /// Free-form notes (`说明`).
    pub notes: Option<String>,
}

/// Resolution order per field: Chinese key, then English alias.
const FIELD_ALIASES: [(&str, &str); 7] = [
    ("序号", "item_number"),
    ("分类", "category"),
    ("专项施工方案严重缺陷情形", "scenario"),
    ("名称", "name"),
    ("必有", "required"),
    ("类型", "kind"),
    ("说明", "notes"),
];

impl ChecklistItem {
    /// Build an item from a parsed JSON object, applying the bilingual
    /// fallback resolution order.
    pub fn from_value(value: &Value) -> Self {
        let mut resolved = FIELD_ALIASES.iter().map(|(zh, en)| field(value, zh, en));
        // Same order as FIELD_ALIASES.
        Self {
            item_number: resolved.next().flatten(),
            category: resolved.next().flatten(),
            scenario: resolved.next().flatten(),
            name: resolved.next().flatten(),
            required: resolved.next().flatten(),
            kind: resolved.next().flatten(),
            notes: resolved.next().flatten(),
        }
    }

    /// Parse a JSONL document: one JSON object per non-blank line.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::Checklist`] on the first line that is not a
    /// JSON object, reporting its 1-based line number.
    pub fn parse_jsonl(text: &str) -> Result<Vec<ChecklistItem>> {
        let mut items = Vec::new();
        for (line_no, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let value: Value = serde_json::from_str(line).map_err(|e| {
                RetrievalError::Checklist(format!("line {}: {e}", line_no + 1))
            })?;
            if !value.is_object() {
                return Err(RetrievalError::Checklist(format!(
                    "line {}: expected a JSON object",
                    line_no + 1
                )));
            }
            items.push(ChecklistItem::from_value(&value));
        }
        Ok(items)
    }

    /// The query text to retrieve evidence for this item: the defect
    /// scenario for content checks, the section name for structure checks.
    pub fn query_text(&self) -> Option<&str> {
        self.scenario.as_deref().or(self.name.as_deref())
    }
}

fn field(value: &Value, zh: &str, en: &str) -> Option<String> {
    value.get(zh).or_else(|| value.get(en)).and_then(coerce)
}

/// Scalars only; strings pass through, numbers and booleans are stringified.
fn coerce(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chinese_keys_resolve_first() {
        let value = serde_json::json!({
            "序号": 3,
            "分类": "基坑工程",
            "专项施工方案严重缺陷情形": "未明确支护结构设计",
            "category": "shadowed"
        });
        let item = ChecklistItem::from_value(&value);
        assert_eq!(item.item_number.as_deref(), Some("3"));
        assert_eq!(item.category.as_deref(), Some("基坑工程"));
        assert_eq!(item.query_text(), Some("未明确支护结构设计"));
    }

    #[test]
    fn english_aliases_fall_back() {
        let value = serde_json::json!({
            "item_number": "7",
            "category": "scaffolding",
            "scenario": "missing anchor design"
        });
        let item = ChecklistItem::from_value(&value);
        assert_eq!(item.item_number.as_deref(), Some("7"));
        assert_eq!(item.scenario.as_deref(), Some("missing anchor design"));
    }

    #[test]
    fn structure_items_use_name_as_query() {
        let value = serde_json::json!({ "名称": "应急预案", "必有": true, "类型": "章节" });
        let item = ChecklistItem::from_value(&value);
        assert_eq!(item.query_text(), Some("应急预案"));
        assert_eq!(item.required.as_deref(), Some("true"));
        assert_eq!(item.kind.as_deref(), Some("章节"));
        assert_eq!(item.scenario, None);
    }

    #[test]
    fn jsonl_skips_blank_lines_and_reports_bad_ones() {
        let good = "{\"分类\": \"a\"}\n\n{\"分类\": \"b\"}\n";
        let items = ChecklistItem::parse_jsonl(good).unwrap();
        assert_eq!(items.len(), 2);

        let bad = "{\"分类\": \"a\"}\nnot json\n";
        let err = ChecklistItem::parse_jsonl(bad).unwrap_err();
        assert!(matches!(err, RetrievalError::Checklist(ref m) if m.starts_with("line 2")));
    }
}
