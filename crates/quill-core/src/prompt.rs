//! Prompt assembly
//!
//! Prompts are a sequence of titled sections. An absent input still produces
//! its section with a visible placeholder so the model (and an operator
//! reading the transcript) can tell what was unavailable.

use std::fmt::Write as _;

/// Placeholder text for an absent input
#[must_use]
pub fn placeholder(label: &str) -> String {
    format!("[no {label} available]")
}

/// Section-by-section prompt builder
#[derive(Debug, Clone, Default)]
pub struct PromptBuilder {
    sections: Vec<(String, String)>,
}

impl PromptBuilder {
    /// Empty builder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Section with a known body
    #[must_use]
    pub fn section(mut self, title: &str, body: impl Into<String>) -> Self {
        self.sections.push((title.to_string(), body.into()));
        self
    }

    /// Section whose body may be absent or blank
    #[must_use]
    pub fn optional(self, title: &str, body: Option<&str>) -> Self {
        let body = body
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .map_or_else(|| placeholder(&title.to_lowercase()), str::to_string);
        self.section(title, body)
    }

    /// Bulleted section; an empty list renders the placeholder
    #[must_use]
    pub fn list<S: AsRef<str>>(self, title: &str, items: &[S]) -> Self {
        let lines: Vec<String> = items
            .iter()
            .map(|item| item.as_ref().trim())
            .filter(|item| !item.is_empty())
            .map(|item| format!("- {item}"))
            .collect();
        if lines.is_empty() {
            let body = placeholder(&title.to_lowercase());
            self.section(title, body)
        } else {
            self.section(title, lines.join("\n"))
        }
    }

    /// Render all sections
    #[must_use]
    pub fn build(&self) -> String {
        let mut out = String::new();
        for (i, (title, body)) in self.sections.iter().enumerate() {
            if i > 0 {
                out.push_str("\n\n");
            }
            let _ = write!(out, "## {title}\n{body}");
        }
        out
    }
}
