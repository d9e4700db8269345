//! Documentation markup → markdown conversion.
//!
//! Documentation text arrives in Rd-style markup (`\code{x}`, `\link[pkg]{f}`,
//! `\itemize{\item ...}`); blueprints carry markdown. The converter is
//! brace-aware so nested macros like `\code{\link{f}}` come out as `` `f` ``.

use regex::Regex;
use std::sync::LazyLock;

static RE_PARAGRAPH_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n[ \t]*(?:\n[ \t]*)+").unwrap());

static RE_WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

static RE_BLANK_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

/// Convert a documentation fragment into markdown.
pub fn to_markdown(input: &str) -> String {
    let normalized = normalize_whitespace(input);
    let mut converter = Converter {
        chars: normalized.chars().collect(),
        pos: 0,
        lists: Vec::new(),
        code_depth: 0,
    };
    let converted = converter.group(false);
    tidy(&converted)
}

/// Collapse whitespace inside paragraphs, keep blank-line paragraph breaks.
fn normalize_whitespace(input: &str) -> String {
    RE_PARAGRAPH_BREAK
        .split(input.trim())
        .map(|para| RE_WHITESPACE.replace_all(para.trim(), " ").into_owned())
        .filter(|para| !para.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Trim every line and squeeze runs of blank lines.
fn tidy(text: &str) -> String {
    let trimmed: Vec<&str> = text.lines().map(str::trim).collect();
    RE_BLANK_RUN
        .replace_all(&trimmed.join("\n"), "\n\n")
        .trim()
        .to_string()
}

#[derive(Clone, Copy, PartialEq)]
enum ListKind {
    Bullet,
    Numbered,
    Definition,
}

struct Converter {
    chars: Vec<char>,
    pos: usize,
    lists: Vec<ListKind>,
    /// Nesting depth of code-like macros, where bare braces are literal.
    code_depth: usize,
}

impl Converter {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    /// Convert text up to the end of input, or up to the closing brace of the
    /// current group when `nested` (the brace is consumed).
    fn group(&mut self, nested: bool) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            self.pos += 1;
            match c {
                '}' if nested => return out,
                '{' if self.code_depth > 0 => {
                    out.push('{');
                    out.push_str(&self.group(true));
                    out.push('}');
                }
                '{' => out.push_str(&self.group(true)),
                '\\' => self.escape_or_macro(&mut out),
                _ => out.push(c),
            }
        }
        out
    }

    fn escape_or_macro(&mut self, out: &mut String) {
        match self.peek() {
            Some(c @ ('%' | '{' | '}' | '\\')) => {
                self.pos += 1;
                out.push(c);
            }
            Some(c) if c.is_ascii_alphabetic() => {
                let name = self.macro_name();
                self.expand(&name, out);
            }
            _ => out.push('\\'),
        }
    }

    fn macro_name(&mut self) -> String {
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if !c.is_ascii_alphanumeric() {
                break;
            }
            name.push(c);
            self.pos += 1;
        }
        name
    }

    /// `[...]` option, as in `\link[pkg]{topic}`.
    fn option(&mut self) -> Option<String> {
        if self.peek() != Some('[') {
            return None;
        }
        let start = self.pos + 1;
        let end = self.chars[start..].iter().position(|&c| c == ']')? + start;
        self.pos = end + 1;
        Some(self.chars[start..end].iter().collect())
    }

    fn arg(&mut self) -> Option<String> {
        if self.peek() != Some('{') {
            return None;
        }
        self.pos += 1;
        Some(self.group(true))
    }

    fn expand(&mut self, name: &str, out: &mut String) {
        match name {
            "code" | "eqn" | "file" | "env" | "option" | "command" | "samp" | "verb" | "kbd"
            | "preformatted" => {
                self.code_depth += 1;
                let inner = self.arg().unwrap_or_default();
                self.code_depth -= 1;
                out.push_str(&format!("`{}`", inner.trim()));
            }
            "emph" | "dfn" | "cite" => {
                let inner = self.arg().unwrap_or_default();
                out.push_str(&format!("*{}*", inner.trim()));
            }
            "strong" | "bold" => {
                let inner = self.arg().unwrap_or_default();
                out.push_str(&format!("**{}**", inner.trim()));
            }
            "link" | "linkS4class" => {
                self.option();
                out.push_str(&self.arg().unwrap_or_default());
            }
            "href" => {
                let url = self.arg().unwrap_or_default();
                let text = self.arg().unwrap_or_else(|| url.clone());
                out.push_str(&format!("[{}]({})", text.trim(), url.trim()));
            }
            "url" | "email" => {
                let inner = self.arg().unwrap_or_default();
                out.push_str(&format!("<{}>", inner.trim()));
            }
            "dQuote" => {
                let inner = self.arg().unwrap_or_default();
                out.push_str(&format!("\"{}\"", inner));
            }
            "sQuote" => {
                let inner = self.arg().unwrap_or_default();
                out.push_str(&format!("'{}'", inner));
            }
            "itemize" => self.list(ListKind::Bullet, out),
            "enumerate" => self.list(ListKind::Numbered, out),
            "describe" => self.list(ListKind::Definition, out),
            "item" => self.item(out),
            "cr" => out.push('\n'),
            "R" => out.push('R'),
            "ldots" | "dots" => out.push_str("..."),
            "tab" => out.push(' '),
            "enc" | "method" | "S3method" | "S4method" => {
                out.push_str(&self.arg().unwrap_or_default());
                self.arg();
            }
            _ => {
                // Unknown macro: keep the text of all its arguments.
                self.option();
                while let Some(inner) = self.arg() {
                    out.push_str(&inner);
                }
            }
        }
    }

    fn list(&mut self, kind: ListKind, out: &mut String) {
        self.lists.push(kind);
        let body = self.arg().unwrap_or_default();
        self.lists.pop();
        out.push_str("\n\n");
        out.push_str(body.trim());
        out.push_str("\n\n");
    }

    fn item(&mut self, out: &mut String) {
        match self.lists.last() {
            Some(ListKind::Numbered) => out.push_str("\n1. "),
            Some(ListKind::Definition) => {
                let term = self.arg().unwrap_or_default();
                let desc = self.arg().unwrap_or_default();
                out.push_str(&format!("\n- **{}**: {}", term.trim(), desc.trim()));
            }
            _ => out.push_str("\n- "),
        }
    }
}
