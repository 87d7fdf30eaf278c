//! Outline structuring for plan blocks.

/// One top-level outline line and its directly nested sub-lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanItem {
    pub title: String,
    pub steps: Vec<String>,
}

impl PlanItem {
    /// Title followed by each step on its own line.
    pub fn content(&self) -> String {
        std::iter::once(self.title.as_str())
            .chain(self.steps.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Split an indented outline into top-level items in document order.
///
/// - Unindented lines start a new item.
/// - Indented lines become steps of the most recent item, trimmed. Deeper
///   indentation is not decomposed further.
/// - Blank lines are dropped.
/// - An indented line before any top-level line starts an item of its own.
pub fn structure_plan(outline: &str) -> Vec<PlanItem> {
    let mut items: Vec<PlanItem> = Vec::new();
    for raw in outline.lines() {
        let line = raw.trim_end();
        if line.is_empty() {
            continue;
        }
        let indented = line.starts_with([' ', '\t']);
        match items.last_mut() {
            Some(item) if indented => item.steps.push(line.trim_start().to_string()),
            _ => items.push(PlanItem {
                title: line.trim_start().to_string(),
                steps: Vec::new(),
            }),
        }
    }
    items
}
