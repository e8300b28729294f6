//! Deterministic local fallback output, used by the gateway when the remote
//! provider fails. Never errs, never calls the network.

use std::collections::BTreeMap;

use monshin_core::models::template::QuestionItem;

use crate::provider::render_answer;

/// Generic follow-up questions for the unanswered items, capped at `max`.
pub fn fallback_followups(unanswered: &[QuestionItem], max: u32) -> Vec<String> {
    unanswered
        .iter()
        .take(max as usize)
        .map(|item| {
            format!(
                "「{}」についてもう少し詳しく教えてください。",
                item.label
            )
        })
        .collect()
}

/// One generic follow-up for a single item.
pub fn fallback_question(item: &QuestionItem) -> String {
    format!("「{}」についてもう少し詳しく教えてください。", item.label)
}

/// A plain question/answer listing in place of a generated summary.
pub fn fallback_summary(
    question_texts: &BTreeMap<String, String>,
    answers: &BTreeMap<String, serde_json::Value>,
) -> String {
    let mut lines = vec!["【自動要約は利用できませんでした。回答一覧】".to_string()];
    for (item_id, value) in answers {
        let question = question_texts
            .get(item_id)
            .map(String::as_str)
            .unwrap_or(item_id.as_str());
        lines.push(format!("・{question}: {}", render_answer(value)));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use monshin_core::models::template::ItemType;

    fn item(label: &str) -> QuestionItem {
        QuestionItem {
            id: label.to_string(),
            label: label.to_string(),
            input_type: ItemType::Text,
            required: true,
            options: vec![],
            allow_free_text: false,
            show_when: None,
        }
    }

    #[test]
    fn followups_are_capped_and_deterministic() {
        let items = vec![item("主訴"), item("発症時期"), item("既往歴")];
        let first = fallback_followups(&items, 2);
        let second = fallback_followups(&items, 2);
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
        assert!(first[0].contains("主訴"));
    }

    #[test]
    fn summary_lists_every_answer() {
        let mut texts = BTreeMap::new();
        texts.insert("q1".to_string(), "主訴".to_string());
        let mut answers = BTreeMap::new();
        answers.insert("q1".to_string(), serde_json::json!("頭痛"));
        answers.insert("q2".to_string(), serde_json::json!(["発熱"]));

        let summary = fallback_summary(&texts, &answers);
        assert!(summary.contains("主訴: 頭痛"));
        // Items without a known question text fall back to the item id.
        assert!(summary.contains("q2: 発熱"));
    }
}
