use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A checklist parsed from markdown: `# ` title, `## ` sections, `- [ ]` items.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checklist {
    pub name: String,
    pub title: String,
    pub sections: Vec<ChecklistSection>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistSection {
    pub title: String,
    pub items: Vec<ChecklistItem>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistItem {
    pub text: String,
    pub checked: bool,
}

/// Outcome of validating a set of responses against a checklist.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistResult {
    pub checklist_name: String,
    pub total_items: usize,
    pub completed_items: usize,
    pub completion_percentage: u8,
    pub responses: Map<String, Value>,
    pub completed_at: DateTime<Utc>,
}

impl Checklist {
    pub fn parse(name: &str, markdown: &str) -> Self {
        let mut checklist = Checklist {
            name: name.to_owned(),
            ..Default::default()
        };
        let mut current: Option<ChecklistSection> = None;

        for line in markdown.lines().map(str::trim) {
            if let Some(title) = line.strip_prefix("# ") {
                checklist.title = title.trim().to_owned();
            } else if let Some(title) = line.strip_prefix("## ") {
                if let Some(done) = current.take() {
                    checklist.sections.push(done);
                }
                current = Some(ChecklistSection {
                    title: title.trim().to_owned(),
                    items: Vec::new(),
                });
            } else if let Some(item) = parse_item(line) {
                current
                    .get_or_insert_with(ChecklistSection::default)
                    .items
                    .push(item);
            }
        }
        if let Some(done) = current {
            checklist.sections.push(done);
        }
        checklist
    }

    pub fn total_items(&self) -> usize {
        self.sections.iter().map(|s| s.items.len()).sum()
    }

    /// Score `responses` against this checklist. Every truthy response counts
    /// as one completed item, capped at the number of items.
    pub fn validate(&self, responses: Map<String, Value>, now: DateTime<Utc>) -> ChecklistResult {
        let total_items = self.total_items();
        let completed_items = responses
            .values()
            .filter(|v| is_truthy(v))
            .count()
            .min(total_items);
        ChecklistResult {
            checklist_name: self.name.clone(),
            total_items,
            completed_items,
            completion_percentage: percentage(completed_items, total_items),
            responses,
            completed_at: now,
        }
    }
}

fn parse_item(line: &str) -> Option<ChecklistItem> {
    let rest = line.strip_prefix("- [").or_else(|| line.strip_prefix("* ["))?;
    let mut chars = rest.chars();
    let mark = chars.next()?;
    let text = chars.as_str().strip_prefix(']')?;
    let checked = match mark {
        ' ' => false,
        'x' | 'X' => true,
        _ => return None,
    };
    Some(ChecklistItem {
        text: text.trim().to_owned(),
        checked,
    })
}

/// `round(part / whole * 100)`, or 0 when `whole` is zero.
pub fn percentage(part: usize, whole: usize) -> u8 {
    if whole == 0 {
        return 0;
    }
    ((part as f64 / whole as f64) * 100.0).round().clamp(0.0, 100.0) as u8
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
