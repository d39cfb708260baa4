//! Keys of configuration files and headings of Markdown documents.
//!
//! JSON and TOML documents are validated with their own crates first; an
//! invalid document yields no symbols and sets `has_errors`. YAML has no
//! parser in the stack, so its keys come from indentation alone. Nesting
//! stops one level below the root for key formats; Markdown sections nest by
//! heading level.

use super::treesitter::attach_docs;
use super::{ParseOutput, ParsedSymbol, SymbolParser};
use crate::errors::ParseError;
use crate::index::model::{Span, SymbolKind};
use crate::lang::Language;
use std::path::Path;
use toml_edit::{Item, Table};

/// Upper bound on symbols taken from one file.
const MAX_KEYS: usize = 500;

#[derive(Debug, Clone, Copy)]
pub struct ConfigKeyParser {
    language: Language,
}

impl ConfigKeyParser {
    pub fn new(language: Language) -> Self {
        Self { language }
    }

    /// True when `content` parses as a document of `language`. Formats
    /// without a validating parser always pass.
    pub fn is_valid(language: Language, content: &str) -> bool {
        match language {
            Language::Json => serde_json::from_str::<serde::de::IgnoredAny>(content).is_ok(),
            Language::Toml => toml_edit::Document::parse(content).is_ok(),
            _ => true,
        }
    }
}

impl SymbolParser for ConfigKeyParser {
    fn language(&self) -> Language {
        self.language
    }

    fn parse(&self, path: &Path, content: &str) -> Result<ParseOutput, ParseError> {
        let nodes = match self.language {
            Language::Json => json_keys(content),
            Language::Toml => toml_keys(content),
            Language::Yaml => Some(yaml_keys(content)),
            Language::Markdown => Some(markdown_sections(content)),
            language => return Err(ParseError::Grammar { language }),
        };
        let mut output = ParseOutput::default();
        let Some(mut nodes) = nodes else {
            tracing::debug!(path = %path.display(), language = self.language.as_str(), "invalid document");
            output.has_errors = true;
            return Ok(output);
        };
        sort_nodes(&mut nodes);
        for node in nodes {
            flatten(node, None, content, &mut output.symbols);
        }
        if output.symbols.len() > MAX_KEYS {
            tracing::debug!(path = %path.display(), found = output.symbols.len(), "key limit reached");
            output.symbols.truncate(MAX_KEYS);
        }
        attach_docs(self.language, content, &mut output.symbols);
        Ok(output)
    }
}

/// A key or section before ids and parent indices are assigned.
#[derive(Debug)]
struct Node {
    kind: SymbolKind,
    name: String,
    qualified_name: String,
    span: Span,
    children: Vec<Node>,
}

impl Node {
    fn key(name: &str, qualified_name: String, span: Span) -> Self {
        Self {
            kind: SymbolKind::Key,
            name: name.to_string(),
            qualified_name,
            span,
            children: Vec::new(),
        }
    }
}

fn sort_nodes(nodes: &mut [Node]) {
    nodes.sort_by_key(|n| n.span.start);
    for node in nodes {
        sort_nodes(&mut node.children);
    }
}

/// Parents are pushed before their children.
fn flatten(node: Node, parent: Option<usize>, content: &str, out: &mut Vec<ParsedSymbol>) {
    let signature = content
        .get(node.span.start..node.span.end)
        .and_then(|text| text.lines().next())
        .unwrap_or_default()
        .trim()
        .to_string();
    let index = out.len();
    out.push(ParsedSymbol {
        kind: node.kind,
        name: node.name,
        qualified_name: node.qualified_name,
        span: node.span,
        signature,
        doc_span: None,
        doc_exclusive: true,
        parent,
    });
    for child in node.children {
        flatten(child, Some(index), content, out);
    }
}

fn line_start(content: &str, offset: usize) -> usize {
    content[..offset].rfind('\n').map(|i| i + 1).unwrap_or(0)
}

/// Lines of `content` with their starting offsets; the text excludes the
/// line break.
fn lines_with_offsets(content: &str) -> impl Iterator<Item = (usize, &str)> {
    content.split_inclusive('\n').scan(0, |offset, raw| {
        let start = *offset;
        *offset += raw.len();
        let line = raw.strip_suffix('\n').unwrap_or(raw);
        Some((start, line.strip_suffix('\r').unwrap_or(line)))
    })
}

// JSON

fn json_keys(content: &str) -> Option<Vec<Node>> {
    if !ConfigKeyParser::is_valid(Language::Json, content) {
        return None;
    }
    let json = JsonText {
        bytes: content.as_bytes(),
    };
    let open = json.skip_ws(0);
    if json.bytes.get(open) != Some(&b'{') {
        return Some(Vec::new());
    }
    let mut nodes = Vec::new();
    for member in json.members(open)? {
        let name = json.key_name(content, member.key);
        let mut node = Node::key(&name, name.clone(), Span::new(member.key.start, member.value.end));
        if json.bytes.get(member.value.start) == Some(&b'{') {
            for child in json.members(member.value.start)? {
                let child_name = json.key_name(content, child.key);
                node.children.push(Node::key(
                    &child_name,
                    format!("{name}.{child_name}"),
                    Span::new(child.key.start, child.value.end),
                ));
            }
        }
        nodes.push(node);
    }
    Some(nodes)
}

struct JsonMember {
    key: Span,
    value: Span,
}

/// Offsets into an already validated JSON document.
struct JsonText<'a> {
    bytes: &'a [u8],
}

impl JsonText<'_> {
    fn skip_ws(&self, mut at: usize) -> usize {
        while self.bytes.get(at).is_some_and(u8::is_ascii_whitespace) {
            at += 1;
        }
        at
    }

    /// `at` is on an opening quote; returns the offset past the closing one.
    fn string_end(&self, mut at: usize) -> Option<usize> {
        at += 1;
        loop {
            match self.bytes.get(at)? {
                b'\\' => at += 2,
                b'"' => return Some(at + 1),
                _ => at += 1,
            }
        }
    }

    fn value_end(&self, at: usize) -> Option<usize> {
        match self.bytes.get(at)? {
            b'"' => self.string_end(at),
            b'{' | b'[' => {
                let mut depth = 0usize;
                let mut i = at;
                loop {
                    match self.bytes.get(i)? {
                        b'"' => {
                            i = self.string_end(i)?;
                            continue;
                        }
                        b'{' | b'[' => depth += 1,
                        b'}' | b']' => {
                            depth = depth.saturating_sub(1);
                            if depth == 0 {
                                return Some(i + 1);
                            }
                        }
                        _ => {}
                    }
                    i += 1;
                }
            }
            _ => {
                let mut i = at;
                while self
                    .bytes
                    .get(i)
                    .is_some_and(|b| !matches!(b, b',' | b'}' | b']') && !b.is_ascii_whitespace())
                {
                    i += 1;
                }
                Some(i)
            }
        }
    }

    /// Members of the object whose `{` is at `open`.
    fn members(&self, open: usize) -> Option<Vec<JsonMember>> {
        let mut members = Vec::new();
        let mut at = self.skip_ws(open + 1);
        if self.bytes.get(at)? == &b'}' {
            return Some(members);
        }
        loop {
            if self.bytes.get(at)? != &b'"' {
                return None;
            }
            let key_end = self.string_end(at)?;
            let colon = self.skip_ws(key_end);
            if self.bytes.get(colon)? != &b':' {
                return None;
            }
            let value_start = self.skip_ws(colon + 1);
            let value_end = self.value_end(value_start)?;
            members.push(JsonMember {
                key: Span::new(at, key_end),
                value: Span::new(value_start, value_end),
            });
            let next = self.skip_ws(value_end);
            match self.bytes.get(next)? {
                b',' => at = self.skip_ws(next + 1),
                b'}' => return Some(members),
                _ => return None,
            }
        }
    }

    fn key_name(&self, content: &str, key: Span) -> String {
        let raw = &content[key.start..key.end];
        serde_json::from_str::<String>(raw).unwrap_or_else(|_| raw.trim_matches('"').to_string())
    }
}

// TOML

fn toml_keys(content: &str) -> Option<Vec<Node>> {
    let document = match toml_edit::Document::parse(content) {
        Ok(document) => document,
        Err(error) => {
            tracing::trace!(%error, "TOML parse failed");
            return None;
        }
    };
    let mut headers = Vec::new();
    collect_headers(&document, &mut headers);
    headers.sort_unstable();

    let mut nodes = Vec::new();
    toml_table(content, &document, "", &headers, false, &mut nodes);
    Some(nodes)
}

/// Start offsets of every `[table]` and `[[array]]` header.
fn collect_headers(table: &Table, out: &mut Vec<usize>) {
    for (_, item) in table.iter() {
        match item {
            Item::Table(child) => {
                if let Some(span) = header_span(child) {
                    out.push(span.start);
                }
                collect_headers(child, out);
            }
            Item::ArrayOfTables(array) => {
                for child in array.iter() {
                    if let Some(span) = header_span(child) {
                        out.push(span.start);
                    }
                    collect_headers(child, out);
                }
            }
            _ => {}
        }
    }
}

fn header_span(table: &Table) -> Option<std::ops::Range<usize>> {
    if table.is_implicit() || table.is_dotted() {
        return None;
    }
    table.span()
}

/// Emit the entries of `table`. Headed tables become nodes whose children
/// are their plain values; nested headed tables are emitted beside their
/// parent. Dotted and implicit tables are walked through so their leaves
/// carry the full dotted path.
fn toml_table(
    content: &str,
    table: &Table,
    prefix: &str,
    headers: &[usize],
    tables_only: bool,
    out: &mut Vec<Node>,
) {
    for (name, item) in table.iter() {
        let qualified = dotted(prefix, name);
        match item {
            Item::Value(value) if !tables_only => {
                if let Some(span) = entry_span(content, table, name, value) {
                    out.push(Node::key(name, qualified, span));
                }
            }
            Item::Value(_) | Item::None => {}
            Item::Table(child) => match header_span(child) {
                Some(header) => {
                    toml_section(content, child, name, qualified, header, headers, out);
                }
                None if child.is_dotted() && tables_only => {}
                None => toml_table(content, child, &qualified, headers, tables_only, out),
            },
            Item::ArrayOfTables(array) => {
                for (n, child) in array.iter().enumerate() {
                    if let Some(header) = header_span(child) {
                        let indexed = format!("{qualified}[{n}]");
                        toml_section(content, child, name, indexed, header, headers, out);
                    }
                }
            }
        }
    }
}

fn toml_section(
    content: &str,
    table: &Table,
    name: &str,
    qualified: String,
    header: std::ops::Range<usize>,
    headers: &[usize],
    out: &mut Vec<Node>,
) {
    let span = Span::new(header.start, section_end(content, header.end, headers));
    let mut node = Node::key(name, qualified.clone(), span);
    toml_values(content, table, &qualified, &mut node.children);
    out.push(node);
    toml_table(content, table, &qualified, headers, true, out);
}

/// Plain `key = value` entries of a headed table, dotted ones included.
fn toml_values(content: &str, table: &Table, prefix: &str, out: &mut Vec<Node>) {
    for (name, item) in table.iter() {
        match item {
            Item::Value(value) => {
                if let Some(span) = entry_span(content, table, name, value) {
                    out.push(Node::key(name, dotted(prefix, name), span));
                }
            }
            Item::Table(child) if child.is_dotted() => {
                toml_values(content, child, &dotted(prefix, name), out);
            }
            _ => {}
        }
    }
}

fn dotted(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

/// From the first non-blank byte of the key's line to the end of the value,
/// so `owner.name = ".."` keeps its dotted prefix.
fn entry_span(content: &str, table: &Table, name: &str, value: &toml_edit::Value) -> Option<Span> {
    let key = table.key(name)?.span()?;
    let value = value.span()?;
    let line = line_start(content, key.start);
    let indent = content[line..key.start].len() - content[line..key.start].trim_start().len();
    Some(Span::new(line + indent, value.end))
}

/// End of the section whose header ends at `header_end`: the next header,
/// minus the blank and comment lines right above it.
fn section_end(content: &str, header_end: usize, headers: &[usize]) -> usize {
    let next = headers
        .iter()
        .copied()
        .find(|&h| h >= header_end)
        .unwrap_or(content.len());
    let mut end = line_start(content, next);
    while end > header_end {
        let prev = line_start(content, end - 1);
        let line = content[prev..end].trim();
        if line.is_empty() || line.starts_with('#') {
            end = prev;
        } else {
            break;
        }
    }
    content[..end.max(header_end)].trim_end().len().max(header_end)
}

// YAML

fn yaml_keys(content: &str) -> Vec<Node> {
    let lines: Vec<(usize, &str)> = lines_with_offsets(content).collect();
    let mut nodes = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        let (offset, line) = lines[i];
        let Some(name) = yaml_key(line) else {
            i += 1;
            continue;
        };
        let body = block_end(&lines, i, 0);
        let mut node = Node::key(name, name.to_string(), Span::new(offset, block_span_end(&lines, i, body)));

        let child_indent = lines[i + 1..body]
            .iter()
            .map(|(_, l)| *l)
            .find(|l| !is_blank_or_comment(l))
            .map(indent_of);
        if let Some(indent) = child_indent.filter(|&n| n > 0) {
            let mut j = i + 1;
            while j < body {
                let (child_offset, child_line) = lines[j];
                let child = (indent_of(child_line) == indent)
                    .then(|| yaml_key(&child_line[indent..]))
                    .flatten();
                match child {
                    Some(child_name) => {
                        let child_body = block_end(&lines[..body], j, indent);
                        node.children.push(Node::key(
                            child_name,
                            format!("{name}.{child_name}"),
                            Span::new(child_offset + indent, block_span_end(&lines, j, child_body)),
                        ));
                        j = child_body;
                    }
                    None => j += 1,
                }
            }
        }
        nodes.push(node);
        i = body;
    }
    nodes
}

/// The key of a `key:` line with no leading indentation.
fn yaml_key(line: &str) -> Option<&str> {
    let first = line.chars().next()?;
    if !(first.is_ascii_alphanumeric() || matches!(first, '_' | '"' | '\'')) {
        return None;
    }
    let (key, rest) = match first {
        '"' | '\'' => {
            let close = line[1..].find(first)? + 1;
            (&line[1..close], &line[close + 1..])
        }
        _ => {
            let colon = line.find(':')?;
            let key = line[..colon].trim_end();
            let plain = key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
            if !plain {
                return None;
            }
            (key, &line[colon..])
        }
    };
    let rest = rest.trim_start();
    let after = rest.strip_prefix(':')?;
    (after.is_empty() || after.starts_with([' ', '\t'])).then_some(key)
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start_matches(' ').len()
}

fn is_blank_or_comment(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty() || trimmed.starts_with('#')
}

/// Index of the first line after `start` that is indented no deeper than
/// `indent`, ignoring blank and comment lines. Document markers end every
/// block.
fn block_end(lines: &[(usize, &str)], start: usize, indent: usize) -> usize {
    let mut i = start + 1;
    while i < lines.len() {
        let line = lines[i].1;
        if line.starts_with("---") || line.starts_with("...") {
            return i;
        }
        if !is_blank_or_comment(line) && indent_of(line) <= indent {
            return i;
        }
        i += 1;
    }
    lines.len()
}

/// End offset of the block spanning lines `start..end`, without trailing
/// blank or comment lines.
fn block_span_end(lines: &[(usize, &str)], start: usize, end: usize) -> usize {
    let mut last = end - 1;
    while last > start && is_blank_or_comment(lines[last].1) {
        last -= 1;
    }
    let (offset, line) = lines[last];
    offset + line.trim_end().len()
}

// Markdown

fn markdown_sections(content: &str) -> Vec<Node> {
    let mut headings = Vec::new();
    let mut fence: Option<&str> = None;
    for (offset, line) in lines_with_offsets(content) {
        let trimmed = line.trim_start();
        if let Some(open) = fence {
            if trimmed.starts_with(open) {
                fence = None;
            }
            continue;
        }
        if trimmed.starts_with("```") {
            fence = Some("```");
            continue;
        }
        if trimmed.starts_with("~~~") {
            fence = Some("~~~");
            continue;
        }
        if let Some((level, title)) = heading(line) {
            headings.push((offset, level, title));
        }
    }

    // Each section runs up to the next heading of the same or a higher level.
    let mut ends = Vec::with_capacity(headings.len());
    for (n, &(_, level, _)) in headings.iter().enumerate() {
        let next = headings[n + 1..]
            .iter()
            .find(|(_, other, _)| *other <= level)
            .map(|(offset, _, _)| *offset)
            .unwrap_or(content.len());
        ends.push(content[..next].trim_end().len());
    }

    let mut roots = Vec::new();
    // Open sections by level: (level, node)
    let mut stack: Vec<(usize, Node)> = Vec::new();
    for (n, &(offset, level, title)) in headings.iter().enumerate() {
        while stack.last().is_some_and(|(open, _)| *open >= level) {
            close_section(&mut stack, &mut roots);
        }
        let qualified = match stack.last() {
            Some((_, parent)) => format!("{}/{title}", parent.qualified_name),
            None => title.to_string(),
        };
        let node = Node {
            kind: SymbolKind::Section,
            name: title.to_string(),
            qualified_name: qualified,
            span: Span::new(offset, ends[n].max(offset)),
            children: Vec::new(),
        };
        stack.push((level, node));
    }
    while !stack.is_empty() {
        close_section(&mut stack, &mut roots);
    }
    roots
}

fn close_section(stack: &mut Vec<(usize, Node)>, roots: &mut Vec<Node>) {
    let Some((_, node)) = stack.pop() else {
        return;
    };
    match stack.last_mut() {
        Some((_, parent)) => parent.children.push(node),
        None => roots.push(node),
    }
}

/// `## Title ##` with at most three spaces of indentation.
fn heading(line: &str) -> Option<(usize, &str)> {
    let body = line.trim_start_matches(' ');
    if line.len() - body.len() > 3 {
        return None;
    }
    let level = body.len() - body.trim_start_matches('#').len();
    if !(1..=6).contains(&level) {
        return None;
    }
    let rest = &body[level..];
    if !(rest.is_empty() || rest.starts_with([' ', '\t'])) {
        return None;
    }
    let title = rest.trim().trim_end_matches('#').trim_end();
    (!title.is_empty()).then_some((level, title))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(language: Language, content: &str) -> ParseOutput {
        ConfigKeyParser::new(language)
            .parse(Path::new("config"), content)
            .unwrap()
    }

    fn names(out: &ParseOutput) -> Vec<&str> {
        out.symbols.iter().map(|s| s.qualified_name.as_str()).collect()
    }

    fn text<'a>(content: &'a str, symbol: &ParsedSymbol) -> &'a str {
        &content[symbol.span.start..symbol.span.end]
    }

    #[test]
    fn json_top_level_keys_and_their_members() {
        let content = r#"{
  "name": "demo",
  "scripts": {
    "build": "tsc",
    "te\"st": "jest"
  },
  "files": ["a", {"b": 1}]
}
"#;
        let out = parse(Language::Json, content);
        assert!(!out.has_errors);
        assert_eq!(
            names(&out),
            ["name", "scripts", "scripts.build", "scripts.te\"st", "files"]
        );
        assert_eq!(text(content, &out.symbols[0]), r#""name": "demo""#);
        assert!(text(content, &out.symbols[1]).ends_with("\"jest\"\n  }"));
        assert_eq!(out.symbols[2].parent, Some(1));
        assert_eq!(text(content, &out.symbols[4]), r#""files": ["a", {"b": 1}]"#);
        assert!(out.symbols.iter().all(|s| s.kind == SymbolKind::Key));
    }

    #[test]
    fn invalid_json_has_errors_and_no_keys() {
        let out = parse(Language::Json, "{\"a\": 1,");
        assert!(out.has_errors);
        assert!(out.symbols.is_empty());

        let out = parse(Language::Json, "[1, 2]");
        assert!(!out.has_errors);
        assert!(out.symbols.is_empty());
    }

    #[test]
    fn toml_tables_span_to_the_next_header() {
        let content = "\
title = \"demo\"
owner.name = \"ana\"

# Server settings
[server]
host = \"localhost\"
ports = [
  8000,
  8001,
]

# TLS
[server.tls]
cert = \"a.pem\"

[[bin]]
name = \"one\"
";
        let out = parse(Language::Toml, content);
        assert!(!out.has_errors);
        assert_eq!(
            names(&out),
            [
                "title",
                "owner.name",
                "server",
                "server.host",
                "server.ports",
                "server.tls",
                "server.tls.cert",
                "bin[0]",
                "bin[0].name",
            ]
        );
        let server = &out.symbols[2];
        assert!(text(content, server).starts_with("[server]"));
        assert!(text(content, server).ends_with("8001,\n]"));
        assert_eq!(text(content, &out.symbols[1]), "owner.name = \"ana\"");
        assert_eq!(text(content, &out.symbols[4]), "ports = [\n  8000,\n  8001,\n]");
        assert_eq!(out.symbols[4].parent, Some(2));
        assert_eq!(out.symbols[5].parent, None);

        let doc = server.doc_span.unwrap();
        assert_eq!(&content[doc.start..doc.end], "# Server settings");
        assert_eq!(out.symbols[7].name, "bin");
    }

    #[test]
    fn invalid_toml_has_errors() {
        let out = parse(Language::Toml, "[server\nhost = 1\n");
        assert!(out.has_errors);
        assert!(out.symbols.is_empty());
    }

    #[test]
    fn yaml_root_keys_cover_their_block() {
        let content = "\
# Build matrix
build:
  image: rust
  steps:
    - cargo test

deploy: manual
\"quoted key\": 1
- not a key
";
        let out = parse(Language::Yaml, content);
        assert_eq!(
            names(&out),
            ["build", "build.image", "build.steps", "deploy", "quoted key"]
        );
        assert_eq!(
            text(content, &out.symbols[0]),
            "build:\n  image: rust\n  steps:\n    - cargo test"
        );
        assert_eq!(text(content, &out.symbols[2]), "steps:\n    - cargo test");
        assert_eq!(text(content, &out.symbols[3]), "deploy: manual");
        let doc = out.symbols[0].doc_span.unwrap();
        assert_eq!(&content[doc.start..doc.end], "# Build matrix");
    }

    #[test]
    fn yaml_ignores_urls_and_document_markers() {
        let content = "url: http://example.com\nhttp://x: no\n---\nnext: 1\n";
        let out = parse(Language::Yaml, content);
        assert_eq!(names(&out), ["url", "next"]);
        assert_eq!(text(content, &out.symbols[0]), "url: http://example.com");
    }

    #[test]
    fn markdown_sections_nest_by_level() {
        let content = "\
# Guide

Intro.

## Install

```sh
# not a heading
cargo install
```

### From source

Build it.

## Usage ##

Run it.
";
        let out = parse(Language::Markdown, content);
        assert_eq!(
            names(&out),
            ["Guide", "Guide/Install", "Guide/Install/From source", "Guide/Usage"]
        );
        assert!(out.symbols.iter().all(|s| s.kind == SymbolKind::Section));
        assert_eq!(out.symbols[1].parent, Some(0));
        assert_eq!(out.symbols[2].parent, Some(1));
        assert_eq!(out.symbols[3].parent, Some(0));
        assert!(text(content, &out.symbols[1]).ends_with("Build it."));
        assert_eq!(text(content, &out.symbols[3]), "## Usage ##\n\nRun it.");
        assert_eq!(out.symbols[0].span.end, content.trim_end().len());
        assert!(out.symbols.iter().all(|s| s.doc_span.is_none()));
    }

    #[test]
    fn heading_requires_a_space() {
        assert_eq!(heading("#hashtag"), None);
        assert_eq!(heading("####### seven"), None);
        assert_eq!(heading("    # code"), None);
        assert_eq!(heading("  ## Two ##"), Some((2, "Two")));
    }

    #[test]
    fn validity_follows_the_format() {
        assert!(ConfigKeyParser::is_valid(Language::Json, "{}"));
        assert!(!ConfigKeyParser::is_valid(Language::Json, "{"));
        assert!(ConfigKeyParser::is_valid(Language::Toml, "a = 1"));
        assert!(!ConfigKeyParser::is_valid(Language::Toml, "a = "));
        assert!(ConfigKeyParser::is_valid(Language::Yaml, ": : :"));
    }

    #[test]
    fn code_languages_are_rejected() {
        let err = ConfigKeyParser::new(Language::Rust)
            .parse(Path::new("lib.rs"), "fn main() {}")
            .unwrap_err();
        assert_eq!(err, ParseError::Grammar { language: Language::Rust });
    }
}
