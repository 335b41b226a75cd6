//! Render favorited prompts as a downloadable Markdown or plain-text file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const COLLECTION_TITLE: &str = "My Medical Prompt Collection";
const RULE_WIDTH: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Markdown,
    Text,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Markdown => "md",
            ExportFormat::Text => "txt",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptInput {
    pub label: String,
    pub placeholder: String,
}

/// The catalog fields an export needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptSummary {
    pub id: String,
    pub title: String,
    pub category: String,
    pub description: String,
    #[serde(default)]
    pub risk_level: Option<String>,
    pub template: String,
    #[serde(default)]
    pub inputs: Vec<PromptInput>,
}

/// `medical-prompts-YYYY-MM-DD.<ext>`
pub fn export_file_name(format: ExportFormat, exported_at: DateTime<Utc>) -> String {
    format!(
        "medical-prompts-{}.{}",
        exported_at.format("%Y-%m-%d"),
        format.extension()
    )
}

/// Render the catalog entries whose ids are favorited, in catalog order.
///
/// Returns `None` when no catalog entry matches.
pub fn export_favorites(
    favorite_ids: &[String],
    catalog: &[PromptSummary],
    format: ExportFormat,
    exported_at: DateTime<Utc>,
) -> Option<String> {
    let selected: Vec<&PromptSummary> = catalog
        .iter()
        .filter(|p| favorite_ids.iter().any(|id| id == &p.id))
        .collect();

    if selected.is_empty() {
        return None;
    }

    let stamp = exported_at.format("%Y-%m-%d %H:%M UTC").to_string();
    Some(match format {
        ExportFormat::Markdown => render_markdown(&selected, &stamp),
        ExportFormat::Text => render_text(&selected, &stamp),
    })
}

fn render_markdown(prompts: &[&PromptSummary], stamp: &str) -> String {
    let mut out = String::new();
    out.push_str(&format!("# {COLLECTION_TITLE}\n\nExported: {stamp}\n\n---\n\n"));

    for (index, prompt) in prompts.iter().enumerate() {
        out.push_str(&format!("## {}. {}\n\n", index + 1, prompt.title));
        out.push_str(&format!("**Category:** {}\n\n", prompt.category));
        out.push_str(&format!("**Description:** {}\n\n", prompt.description));
        if let Some(risk) = &prompt.risk_level {
            out.push_str(&format!("**Risk level:** {risk}\n\n"));
        }
        out.push_str(&format!("### Prompt template\n\n```\n{}\n```\n\n", prompt.template));

        if !prompt.inputs.is_empty() {
            out.push_str("### Inputs\n\n");
            for input in &prompt.inputs {
                out.push_str(&format!("- **{}**: {}\n", input.label, input.placeholder));
            }
            out.push('\n');
        }
        out.push_str("---\n\n");
    }
    out
}

fn render_text(prompts: &[&PromptSummary], stamp: &str) -> String {
    let heavy = "=".repeat(RULE_WIDTH);
    let light = "-".repeat(RULE_WIDTH);

    let mut out = String::new();
    out.push_str(&format!("{COLLECTION_TITLE}\nExported: {stamp}\n\n{heavy}\n\n"));

    for (index, prompt) in prompts.iter().enumerate() {
        out.push_str(&format!("{}. {}\n", index + 1, prompt.title));
        out.push_str(&format!("Category: {}\n", prompt.category));
        out.push_str(&format!("Description: {}\n\n", prompt.description));
        if let Some(risk) = &prompt.risk_level {
            out.push_str(&format!("Risk level: {risk}\n\n"));
        }
        out.push_str(&format!("Prompt template:\n{light}\n{}\n{light}\n\n", prompt.template));

        if !prompt.inputs.is_empty() {
            out.push_str("Inputs:\n");
            for input in &prompt.inputs {
                out.push_str(&format!("  - {}: {}\n", input.label, input.placeholder));
            }
            out.push('\n');
        }
        out.push_str(&format!("{heavy}\n\n"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn catalog() -> Vec<PromptSummary> {
        vec![
            PromptSummary {
                id: "soap".into(),
                title: "SOAP note".into(),
                category: "Documentation".into(),
                description: "Structure a visit note".into(),
                risk_level: None,
                template: "Write a SOAP note for {{case}}".into(),
                inputs: vec![PromptInput {
                    label: "Case".into(),
                    placeholder: "65M with chest pain".into(),
                }],
            },
            PromptSummary {
                id: "ddx".into(),
                title: "Differential diagnosis".into(),
                category: "Diagnosis".into(),
                description: "List differentials".into(),
                risk_level: Some("high".into()),
                template: "List differentials for {{symptoms}}".into(),
                inputs: vec![],
            },
        ]
    }

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, 8, 30, 0).unwrap()
    }

    #[test]
    fn markdown_follows_catalog_order() {
        let ids = vec!["ddx".to_string(), "soap".to_string()];
        let md = export_favorites(&ids, &catalog(), ExportFormat::Markdown, at()).unwrap();

        let soap = md.find("## 1. SOAP note").unwrap();
        let ddx = md.find("## 2. Differential diagnosis").unwrap();
        assert!(soap < ddx);
        assert!(md.contains("- **Case**: 65M with chest pain"));
        assert!(md.contains("**Risk level:** high"));
        assert!(md.starts_with("# My Medical Prompt Collection"));
    }

    #[test]
    fn text_skips_unknown_ids() {
        let ids = vec!["missing".to_string(), "soap".to_string()];
        let text = export_favorites(&ids, &catalog(), ExportFormat::Text, at()).unwrap();

        assert!(text.contains("1. SOAP note"));
        assert!(!text.contains("Differential"));
        assert!(text.contains("  - Case: 65M with chest pain"));
    }

    #[test]
    fn text_layout() {
        let ids = vec!["ddx".to_string()];
        let text = export_favorites(&ids, &catalog(), ExportFormat::Text, at()).unwrap();
        let heavy = "=".repeat(60);
        let light = "-".repeat(60);

        let expected = format!(
            "My Medical Prompt Collection\nExported: 2025-06-02 08:30 UTC\n\n{heavy}\n\n\
             1. Differential diagnosis\nCategory: Diagnosis\nDescription: List differentials\n\n\
             Risk level: high\n\n\
             Prompt template:\n{light}\nList differentials for {{{{symptoms}}}}\n{light}\n\n\
             {heavy}\n\n"
        );
        assert_eq!(text, expected);
    }

    #[test]
    fn nothing_to_export() {
        assert!(export_favorites(&[], &catalog(), ExportFormat::Text, at()).is_none());
    }

    #[test]
    fn file_name_uses_date_and_extension() {
        assert_eq!(
            export_file_name(ExportFormat::Markdown, at()),
            "medical-prompts-2025-06-02.md"
        );
        assert_eq!(
            export_file_name(ExportFormat::Text, at()),
            "medical-prompts-2025-06-02.txt"
        );
    }
}
