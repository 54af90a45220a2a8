//! `{{ name }}` prompt templates.

use std::collections::HashMap;

use chorus_core::TemplateError;
use once_cell::sync::Lazy;
use regex::Regex;

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("Invalid placeholder regex")
});

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Variable(String),
}

/// A parsed prompt template.
///
/// Placeholders are `{{ name }}` with optional inner whitespace. A `{{`
/// whose contents are not an identifier is kept as literal text; a `{{`
/// that is never closed is an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    segments: Vec<Segment>,
}

impl PromptTemplate {
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut text = String::new();
        let mut cursor = 0;

        while let Some(found) = source[cursor..].find("{{") {
            let start = cursor + found;
            text.push_str(&source[cursor..start]);

            let rest = &source[start..];
            if !rest.contains("}}") {
                return Err(TemplateError::Unterminated { offset: start });
            }

            match PLACEHOLDER.captures(rest) {
                Some(captures) => {
                    if !text.is_empty() {
                        segments.push(Segment::Text(std::mem::take(&mut text)));
                    }
                    segments.push(Segment::Variable(captures[1].to_string()));
                    cursor = start + captures[0].len();
                }
                None => {
                    text.push_str("{{");
                    cursor = start + 2;
                }
            }
        }

        text.push_str(&source[cursor..]);
        if !text.is_empty() {
            segments.push(Segment::Text(text));
        }
        Ok(Self { segments })
    }

    /// Distinct variable names in order of first use.
    pub fn variables(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for segment in &self.segments {
            if let Segment::Variable(name) = segment {
                if !names.contains(&name.as_str()) {
                    names.push(name);
                }
            }
        }
        names
    }

    pub fn render(&self, variables: &HashMap<String, String>) -> Result<String, TemplateError> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Variable(name) => {
                    let value = variables
                        .get(name)
                        .ok_or_else(|| TemplateError::MissingVariable { name: name.clone() })?;
                    out.push_str(value);
                }
            }
        }
        Ok(out)
    }
}

impl std::str::FromStr for PromptTemplate {
    type Err = TemplateError;

    fn from_str(source: &str) -> Result<Self, Self::Err> {
        Self::parse(source)
    }
}
