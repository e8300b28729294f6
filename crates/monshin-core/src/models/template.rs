use serde::{Deserialize, Serialize};

/// A questionnaire template, identified by `(template_id, visit_type)`.
///
/// The same `template_id` may exist for several visit types ("first",
/// "return", ...); each pair is its own template with its own item list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub template_id: String,
    pub visit_type: String,
    /// Question items in declaration order. Order is preserved end-to-end.
    pub items: Vec<QuestionItem>,
    /// Whether LLM follow-up question generation is enabled for sessions
    /// answering this template.
    #[serde(default)]
    pub followup_enabled: bool,
    /// Upper bound on generated follow-up questions per session.
    #[serde(default)]
    pub max_followups: u32,
}

impl Template {
    /// Return a copy with every legacy item type normalized.
    /// Adapters apply this on both read and write so `single` never
    /// survives a round trip.
    pub fn normalized(mut self) -> Self {
        for item in &mut self.items {
            item.normalize();
        }
        self
    }
}

/// One question in a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionItem {
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub input_type: ItemType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub options: Vec<String>,
    /// Whether a free-text answer is accepted alongside the options.
    #[serde(default)]
    pub allow_free_text: bool,
    /// Display condition: the item is shown only when the referenced item's
    /// answer is one of the listed values. `None` means always shown.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_when: Option<DisplayCondition>,
}

impl QuestionItem {
    /// Fold the legacy `single` type into `multi` in place.
    pub fn normalize(&mut self) {
        if self.input_type == ItemType::Single {
            self.input_type = ItemType::Multi;
        }
    }
}

/// Input type of a question item. `Single` is a legacy value kept only so
/// old persisted templates still deserialize; it is normalized to `Multi`
/// on read and write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    Multi,
    Single,
    Text,
    Number,
    Date,
}

/// Condition controlling whether an item is displayed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayCondition {
    /// Id of the item whose answer drives the condition.
    pub item_id: String,
    /// Values of that answer that enable display.
    pub values: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, input_type: ItemType) -> QuestionItem {
        QuestionItem {
            id: id.to_string(),
            label: format!("label-{id}"),
            input_type,
            required: false,
            options: vec![],
            allow_free_text: false,
            show_when: None,
        }
    }

    #[test]
    fn normalized_folds_single_into_multi() {
        let template = Template {
            template_id: "general".to_string(),
            visit_type: "first".to_string(),
            items: vec![item("q1", ItemType::Single), item("q2", ItemType::Text)],
            followup_enabled: true,
            max_followups: 3,
        }
        .normalized();

        assert_eq!(template.items[0].input_type, ItemType::Multi);
        assert_eq!(template.items[1].input_type, ItemType::Text);
    }

    #[test]
    fn legacy_single_deserializes() {
        let json = r#"{"id":"q1","label":"symptom","type":"single"}"#;
        let item: QuestionItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.input_type, ItemType::Single);
    }

    #[test]
    fn item_order_survives_round_trip() {
        let items: Vec<QuestionItem> = (0..20)
            .map(|i| item(&format!("q{i}"), ItemType::Text))
            .collect();
        let json = serde_json::to_string(&items).unwrap();
        let back: Vec<QuestionItem> = serde_json::from_str(&json).unwrap();
        let ids: Vec<&str> = back.iter().map(|i| i.id.as_str()).collect();
        let expected: Vec<String> = (0..20).map(|i| format!("q{i}")).collect();
        assert_eq!(ids, expected.iter().map(String::as_str).collect::<Vec<_>>());
    }
}
