//! Import scanner
//!
//! Finds import specifiers in transformed artifacts. Script artifacts yield
//! ES `import`, `export ... from` and `require()` (static) plus `import()`
//! (dynamic). Style artifacts yield `@import` and `url()` references.

use crate::transform::{Artifact, ArtifactKind};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ImportKind {
    Static,
    /// Evaluated on demand at runtime; starts an async chunk boundary
    Dynamic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRef {
    pub specifier: String,
    pub kind: ImportKind,
}

static ES_IMPORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\bimport\s+(?:[\w$*{}\s,]+?\s+from\s+)?["']([^"'\n]+)["']"#)
        .expect("valid import pattern")
});
static ES_EXPORT_FROM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\bexport\s+(?:\*(?:\s+as\s+[\w$]+)?|\{[^}]*\})\s*from\s+["']([^"'\n]+)["']"#)
        .expect("valid export pattern")
});
static REQUIRE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\brequire\s*\(\s*["']([^"'\n]+)["']\s*\)"#).expect("valid require pattern")
});
static DYNAMIC_IMPORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\bimport\s*\(\s*(?:/\*.*?\*/\s*)?["']([^"'\n]+)["']\s*\)"#)
        .expect("valid dynamic import pattern")
});
static CSS_IMPORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"@import\s+(?:url\(\s*)?["']?([^"')\s;]+)["']?\s*\)?"#)
        .expect("valid css import pattern")
});
static CSS_IMPORT_RULE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"@import\s+(?:url\(\s*)?["']?([^"')\s;]+)["']?[ \t]*\)?[^;\n]*;?[ \t]*\n?"#)
        .expect("valid css import rule pattern")
});
static CSS_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"url\(\s*(["']?)([^"')]+?)(["']?)\s*\)"#).expect("valid css url pattern")
});

/// Imports of an artifact, in source order, without duplicates
pub fn scan(artifact: &Artifact) -> Vec<ImportRef> {
    let text = String::from_utf8_lossy(&artifact.content);
    match artifact.kind {
        ArtifactKind::Script => scan_script(&text),
        ArtifactKind::Style => scan_style(&text),
        ArtifactKind::Binary => Vec::new(),
    }
}

pub fn scan_script(source: &str) -> Vec<ImportRef> {
    let code = strip_script_comments(source);

    let mut found: Vec<(usize, ImportRef)> = Vec::new();
    let patterns: [(&Regex, ImportKind); 4] = [
        (&ES_IMPORT, ImportKind::Static),
        (&ES_EXPORT_FROM, ImportKind::Static),
        (&REQUIRE, ImportKind::Static),
        (&DYNAMIC_IMPORT, ImportKind::Dynamic),
    ];
    for (pattern, kind) in patterns {
        for caps in pattern.captures_iter(&code) {
            if let Some(m) = caps.get(1) {
                found.push((
                    m.start(),
                    ImportRef {
                        specifier: m.as_str().to_string(),
                        kind,
                    },
                ));
            }
        }
    }
    dedup_in_order(found)
}

pub fn scan_style(source: &str) -> Vec<ImportRef> {
    let css = strip_style_comments(source);

    let mut found: Vec<(usize, ImportRef)> = Vec::new();
    for caps in CSS_IMPORT.captures_iter(&css) {
        if let Some(m) = caps.get(1) {
            if let Some(specifier) = style_request(m.as_str()) {
                found.push((m.start(), static_import(specifier)));
            }
        }
    }
    for caps in CSS_URL.captures_iter(&css) {
        if let Some(m) = caps.get(2) {
            if let Some(specifier) = style_request(m.as_str()) {
                found.push((m.start(), static_import(specifier)));
            }
        }
    }
    dedup_in_order(found)
}

/// Keywords after which a `/` starts a regular expression literal
const REGEX_PREFIX_KEYWORDS: &[&str] = &[
    "return", "typeof", "instanceof", "in", "of", "new", "delete", "void", "throw", "case", "do",
    "else", "yield", "await",
];

/// Remove `//` and `/* */` comments from script source.
///
/// String, template and regular expression literals are copied verbatim, so
/// comment markers inside them are kept. Block comments become a single
/// space and keep their line breaks.
pub fn strip_script_comments(source: &str) -> String {
    let chars: Vec<char> = source.chars().collect();
    let mut out = String::with_capacity(source.len());
    // Brace depth at which each open `${` substitution closes
    let mut substitutions: Vec<usize> = Vec::new();
    let mut depth = 0usize;
    let mut regex_allowed = true;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match c {
            '/' if next == Some('/') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '/' if next == Some('*') => {
                i = skip_block_comment(&chars, i, &mut out);
            }
            '/' if regex_allowed => {
                i = copy_regex(&chars, i, &mut out);
                regex_allowed = false;
            }
            '"' | '\'' => {
                i = copy_quoted(&chars, i, &mut out);
                regex_allowed = false;
            }
            '`' => {
                out.push('`');
                let (end, opened) = copy_template_text(&chars, i + 1, &mut out);
                i = end;
                if opened {
                    depth += 1;
                    substitutions.push(depth);
                }
                regex_allowed = opened;
            }
            '}' if substitutions.last() == Some(&depth) => {
                substitutions.pop();
                depth -= 1;
                out.push('}');
                let (end, opened) = copy_template_text(&chars, i + 1, &mut out);
                i = end;
                if opened {
                    depth += 1;
                    substitutions.push(depth);
                }
                regex_allowed = opened;
            }
            c if c.is_alphanumeric() || c == '_' || c == '$' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '$') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                regex_allowed = REGEX_PREFIX_KEYWORDS.contains(&word.as_str());
                out.push_str(&word);
            }
            c if c.is_whitespace() => {
                out.push(c);
                i += 1;
            }
            c => {
                match c {
                    '{' => depth += 1,
                    '}' => depth = depth.saturating_sub(1),
                    _ => {}
                }
                regex_allowed = !matches!(c, ')' | ']' | '}');
                out.push(c);
                i += 1;
            }
        }
    }
    out
}

/// Remove `/* */` comments from a stylesheet, keeping quoted strings intact
pub fn strip_style_comments(source: &str) -> String {
    let chars: Vec<char> = source.chars().collect();
    let mut out = String::with_capacity(source.len());
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '/' if chars.get(i + 1) == Some(&'*') => i = skip_block_comment(&chars, i, &mut out),
            '"' | '\'' => i = copy_quoted(&chars, i, &mut out),
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    out
}

/// `start` is at `/*`; returns the index after the closing `*/`
fn skip_block_comment(chars: &[char], start: usize, out: &mut String) -> usize {
    out.push(' ');
    let mut i = start + 2;
    while i < chars.len() {
        if chars[i] == '*' && chars.get(i + 1) == Some(&'/') {
            return i + 2;
        }
        if chars[i] == '\n' {
            out.push('\n');
        }
        i += 1;
    }
    i
}

/// `start` is at the opening quote. An unterminated string ends at the line break.
fn copy_quoted(chars: &[char], start: usize, out: &mut String) -> usize {
    let quote = chars[start];
    out.push(quote);
    let mut i = start + 1;
    while i < chars.len() {
        let c = chars[i];
        if c == '\n' {
            return i;
        }
        out.push(c);
        i += 1;
        if c == '\\' {
            if let Some(&escaped) = chars.get(i) {
                out.push(escaped);
                i += 1;
            }
        } else if c == quote {
            break;
        }
    }
    i
}

/// `start` is at the opening `/`; flags are left to the caller
fn copy_regex(chars: &[char], start: usize, out: &mut String) -> usize {
    out.push('/');
    let mut i = start + 1;
    let mut in_class = false;
    while i < chars.len() {
        let c = chars[i];
        if c == '\n' {
            return i;
        }
        out.push(c);
        i += 1;
        match c {
            '\\' => {
                if let Some(&escaped) = chars.get(i) {
                    out.push(escaped);
                    i += 1;
                }
            }
            '[' => in_class = true,
            ']' => in_class = false,
            '/' if !in_class => break,
            _ => {}
        }
    }
    i
}

/// Copy template text up to the closing backtick or the next `${`.
/// Returns the next index and whether a substitution was opened.
fn copy_template_text(chars: &[char], start: usize, out: &mut String) -> (usize, bool) {
    let mut i = start;
    while i < chars.len() {
        let c = chars[i];
        out.push(c);
        i += 1;
        match c {
            '\\' => {
                if let Some(&escaped) = chars.get(i) {
                    out.push(escaped);
                    i += 1;
                }
            }
            '`' => return (i, false),
            '$' if chars.get(i) == Some(&'{') => {
                out.push('{');
                return (i + 1, true);
            }
            _ => {}
        }
    }
    (i, false)
}

/// Rewrite `import("x")` calls to the bundle runtime's loader
pub fn rewrite_dynamic_imports(code: &str) -> String {
    DYNAMIC_IMPORT
        .replace_all(code, |caps: &Captures| {
            let specifier = caps.get(1).map_or("", |m| m.as_str());
            format!("require.dynamic({})", js_string(specifier))
        })
        .into_owned()
}

/// Drop `@import` rules whose request `bundled` reports as already included
pub fn strip_style_imports<F>(css: &str, bundled: F) -> String
where
    F: Fn(&str) -> bool,
{
    CSS_IMPORT_RULE
        .replace_all(css, |caps: &Captures| {
            let raw = caps.get(1).map_or("", |m| m.as_str());
            match style_request(raw) {
                Some(request) if bundled(&request) => String::new(),
                _ => caps.get(0).map_or("", |m| m.as_str()).to_string(),
            }
        })
        .into_owned()
}

/// Rewrite `url()` references whose request `lookup` knows to the returned URL
pub fn rewrite_style_urls<F>(css: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    CSS_URL
        .replace_all(css, |caps: &Captures| {
            let original = caps.get(0).map_or("", |m| m.as_str()).to_string();
            let raw = caps.get(2).map_or("", |m| m.as_str());
            match style_request(raw).and_then(|request| lookup(&request)) {
                Some(url) => format!("url({})", js_string(&url)),
                None => original,
            }
        })
        .into_owned()
}

fn static_import(specifier: String) -> ImportRef {
    ImportRef {
        specifier,
        kind: ImportKind::Static,
    }
}

/// CSS requests are relative unless prefixed with `~` (module request).
/// Data URIs, remote URLs and fragments are not dependencies.
fn style_request(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty()
        || raw.starts_with("data:")
        || raw.starts_with("http://")
        || raw.starts_with("https://")
        || raw.starts_with("//")
        || raw.starts_with('#')
    {
        return None;
    }
    if let Some(module) = raw.strip_prefix('~') {
        return Some(module.to_string());
    }
    if raw.starts_with('.') || raw.starts_with('/') {
        return Some(raw.to_string());
    }
    Some(format!("./{}", raw))
}

fn dedup_in_order(mut found: Vec<(usize, ImportRef)>) -> Vec<ImportRef> {
    found.sort_by_key(|(offset, _)| *offset);
    let mut seen = HashSet::new();
    found
        .into_iter()
        .map(|(_, import)| import)
        .filter(|import| seen.insert((import.specifier.clone(), import.kind)))
        .collect()
}

fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| format!("\"{}\"", value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn specifiers(imports: &[ImportRef]) -> Vec<(&str, ImportKind)> {
        imports
            .iter()
            .map(|i| (i.specifier.as_str(), i.kind))
            .collect()
    }

    #[test]
    fn test_scan_script_forms() {
        let source = r#"
import Vue from "vue";
import { a, b as c } from './a.js';
import * as ns from "./ns";
import './side-effect.css';
export { x } from "./x";
export * from './all';
const fs = require("./legacy");
const lazy = () => import('./lazy');
const named = import(/* webpackChunkName: "n" */ "./named");
"#;
        let imports = scan_script(source);
        assert_eq!(
            specifiers(&imports),
            vec![
                ("vue", ImportKind::Static),
                ("./a.js", ImportKind::Static),
                ("./ns", ImportKind::Static),
                ("./side-effect.css", ImportKind::Static),
                ("./x", ImportKind::Static),
                ("./all", ImportKind::Static),
                ("./legacy", ImportKind::Static),
                ("./lazy", ImportKind::Dynamic),
                ("./named", ImportKind::Dynamic),
            ]
        );
    }

    #[test]
    fn test_scan_script_ignores_comments_and_duplicates() {
        let source = r#"
// import "./commented";
/* require("./blocked") */
import a from "./a";
import again from "./a";
"#;
        assert_eq!(
            specifiers(&scan_script(source)),
            vec![("./a", ImportKind::Static)]
        );
    }

    #[test]
    fn test_trailing_line_comment_is_not_an_import() {
        let source = "module.exports = 1; // require(\"./old-helper\") was removed\nrequire('./kept');";
        assert_eq!(
            specifiers(&scan_script(source)),
            vec![("./kept", ImportKind::Static)]
        );
    }

    #[test]
    fn test_comment_markers_inside_literals() {
        let source = r#"
const glob = "src/**/*.js";
import a from "./a";
const url = 'http://example.com/*';
const re = /\/\*+/g;
import b from "./b";
const t = `*/ ${require("./c")} /*`;
/* require("./blocked") */
"#;
        assert_eq!(
            specifiers(&scan_script(source)),
            vec![
                ("./a", ImportKind::Static),
                ("./b", ImportKind::Static),
                ("./c", ImportKind::Static),
            ]
        );
    }

    #[test]
    fn test_strip_script_comments() {
        let source = "let a = 1 / 2; // half\nlet b = a /* ratio */ / 4;\nconst s = \"// kept\";";
        assert_eq!(
            strip_script_comments(source),
            "let a = 1 / 2; \nlet b = a   / 4;\nconst s = \"// kept\";"
        );
    }

    #[test]
    fn test_strip_style_comments_keeps_strings() {
        let css = ".a { content: \"/*\"; } /* gone */ @import \"./b.css\";";
        assert_eq!(
            strip_style_comments(css),
            ".a { content: \"/*\"; }   @import \"./b.css\";"
        );
    }

    #[test]
    fn test_same_specifier_static_and_dynamic() {
        let source = "import a from './a';\nimport('./a');";
        assert_eq!(
            specifiers(&scan_script(source)),
            vec![("./a", ImportKind::Static), ("./a", ImportKind::Dynamic)]
        );
    }

    #[test]
    fn test_scan_style() {
        let css = r#"
@import "./base.css";
@import url('theme.css');
.logo { background: url(./img/logo.png); }
.icon { background: url("data:image/png;base64,AAAA"); }
.remote { background: url(https://cdn.example.com/x.png); }
.font { src: url(~typeface/font.woff2); }
"#;
        assert_eq!(
            specifiers(&scan_style(css)),
            vec![
                ("./base.css", ImportKind::Static),
                ("./theme.css", ImportKind::Static),
                ("./img/logo.png", ImportKind::Static),
                ("typeface/font.woff2", ImportKind::Static),
            ]
        );
    }

    #[test]
    fn test_binary_has_no_imports() {
        assert!(scan(&Artifact::binary("import './x'")).is_empty());
    }

    #[test]
    fn test_rewrite_dynamic_imports() {
        let code = "load(() => import('./c.js'));";
        assert_eq!(
            rewrite_dynamic_imports(code),
            r#"load(() => require.dynamic("./c.js"));"#
        );
    }

    #[test]
    fn test_strip_style_imports() {
        let css = "@import \"./base.css\";\n@import url(theme.css) screen;\n@import \"https://fonts.example.com/a.css\";\nbody { color: red; }";
        let out = strip_style_imports(css, |request| request == "./base.css" || request == "./theme.css");
        assert_eq!(out, "@import \"https://fonts.example.com/a.css\";\nbody { color: red; }");
    }

    #[test]
    fn test_rewrite_style_urls() {
        let css = ".a { background: url('./a.png'); } .b { background: url(./b.png); }";
        let out = rewrite_style_urls(css, |request| {
            (request == "./a.png").then(|| "/a.1234abcd.png".to_string())
        });
        assert_eq!(
            out,
            r#".a { background: url("/a.1234abcd.png"); } .b { background: url(./b.png); }"#
        );
    }
}
