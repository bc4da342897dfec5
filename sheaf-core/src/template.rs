//! Output filename templates
//!
//! Supported placeholders: `[name]`, `[id]`, `[contenthash]`, `[hash]` and
//! `[ext]`. Hash placeholders accept a length, e.g. `[contenthash:8]`.

use crate::error::ConfigError;
use crate::hash::short_hash;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[(name|id|contenthash|hash|ext)(?::(\d+))?\]").expect("valid placeholder pattern")
});

/// Values substituted into a template
#[derive(Debug, Clone, Default)]
pub struct TemplateData<'a> {
    pub name: &'a str,
    pub id: Option<u32>,
    pub content_hash: &'a str,
    pub hash: &'a str,
    /// Extension including the leading dot
    pub ext: &'a str,
}

pub fn render(template: &str, data: &TemplateData<'_>) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| {
            let len = caps
                .get(2)
                .and_then(|m| m.as_str().parse::<usize>().ok())
                .unwrap_or(usize::MAX);
            match caps.get(1).map_or("", |m| m.as_str()) {
                "name" => data.name.to_string(),
                "id" => data.id.map(|id| id.to_string()).unwrap_or_default(),
                "contenthash" => short_hash(data.content_hash, len).to_string(),
                "hash" => short_hash(data.hash, len).to_string(),
                "ext" => data.ext.to_string(),
                _ => String::new(),
            }
        })
        .into_owned()
}

/// Check that `template` contains at least one of `placeholders`
pub fn require_placeholder(
    option: &str,
    template: &str,
    placeholders: &'static [&'static str],
    expected: &'static str,
) -> Result<(), ConfigError> {
    let present = PLACEHOLDER
        .captures_iter(template)
        .filter_map(|caps| caps.get(1))
        .any(|m| placeholders.contains(&m.as_str()));
    if present {
        Ok(())
    } else {
        Err(ConfigError::AmbiguousTemplate {
            option: option.to_string(),
            template: template.to_string(),
            expected,
        })
    }
}
