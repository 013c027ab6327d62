//! Prompt rendering for the lookup tool.

use anyhow::Result;
use minijinja::{Environment, context};

const LOOKUP_TEMPLATE: &str = include_str!("prompts/lookup.md");

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl Default for PromptEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_keep_trailing_newline(true);
        env.add_template("lookup", LOOKUP_TEMPLATE)
            .expect("lookup template should be valid");
        Self { env }
    }

    /// Render the lookup prompt. Either name may be empty, not both (the caller skips those rows).
    pub fn render_lookup(&self, primary: &str, secondary: &str) -> Result<String> {
        let template = self.env.get_template("lookup")?;
        let rendered = template.render(context! {
            primary => primary.trim(),
            secondary => secondary.trim(),
        })?;
        Ok(rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_both_names_deterministically() {
        let engine = PromptEngine::new();
        let first = engine.render_lookup("Acme Ltd", "甲公司").expect("render");
        let second = engine.render_lookup("Acme Ltd", "甲公司").expect("render");
        assert_eq!(first, second);
        assert!(first.contains("English name: Acme Ltd\n"));
        assert!(first.contains("Chinese name: 甲公司\n"));
        assert!(first.contains("\"Not Found\""));
    }

    #[test]
    fn missing_name_renders_blank() {
        let rendered = PromptEngine::new()
            .render_lookup("", "甲公司")
            .expect("render");
        assert!(rendered.contains("English name: \n"));
    }
}
