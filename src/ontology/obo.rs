//! Streaming parser for OBO-style term-graph definition files.
//!
//! The format is a sequence of `[Header]` stanzas of `tag: value` lines,
//! preceded by an optional header block of the same line grammar. Values may
//! be quoted strings with trailing modifier text (synonym scope,
//! cross-references); `!` starts a comment unless inside a quoted string; a
//! trailing backslash continues a line.

use std::collections::BTreeMap;
use std::io::BufRead;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Line {line}: {message}")]
    InvalidLine { line: usize, message: String },
}

impl ParseError {
    fn at(line: usize, message: impl Into<String>) -> Self {
        Self::InvalidLine {
            line,
            message: message.into(),
        }
    }
}

/// A tag value plus any trailing modifier text after a quoted value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagValue {
    pub value: String,
    pub modifiers: Option<String>,
}

impl TagValue {
    fn plain(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            modifiers: None,
        }
    }
}

/// One `[Header]` stanza and its tag/value lines.
///
/// A tag may appear multiple times, so every tag maps to a list of values.
#[derive(Debug, Clone, Default)]
pub struct Stanza {
    pub name: String,
    pub tags: BTreeMap<String, Vec<TagValue>>,
}

impl Stanza {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tags: BTreeMap::new(),
        }
    }

    /// All values for `tag`, as plain strings
    #[must_use]
    pub fn values(&self, tag: &str) -> Vec<&str> {
        self.tags
            .get(tag)
            .map(|vs| vs.iter().map(|v| v.value.as_str()).collect())
            .unwrap_or_default()
    }

    /// The first value for `tag`, if any
    #[must_use]
    pub fn first(&self, tag: &str) -> Option<&str> {
        self.tags
            .get(tag)
            .and_then(|vs| vs.first())
            .map(|v| v.value.as_str())
    }
}

/// Pull parser over a buffered reader: construct, then iterate stanzas.
pub struct Parser<R: BufRead> {
    reader: R,
    lineno: usize,
    headers: BTreeMap<String, Vec<String>>,
    /// First stanza-start line, read while scanning the header block
    carried: Option<String>,
    done: bool,
}

impl<R: BufRead> Parser<R> {
    /// Create a parser, consuming the header block up to the first stanza.
    ///
    /// # Errors
    ///
    /// Returns `ParseError` on IO failure or a malformed header line.
    pub fn new(reader: R) -> Result<Self, ParseError> {
        let mut parser = Self {
            reader,
            lineno: 0,
            headers: BTreeMap::new(),
            carried: None,
            done: false,
        };
        parser.read_headers()?;
        Ok(parser)
    }

    /// File-level header tags (e.g. `format-version`)
    #[must_use]
    pub fn headers(&self) -> &BTreeMap<String, Vec<String>> {
        &self.headers
    }

    fn read_headers(&mut self) -> Result<(), ParseError> {
        while let Some(line) = self.next_line()? {
            if line.is_empty() {
                continue;
            }
            if line.starts_with('[') {
                self.carried = Some(line);
                return Ok(());
            }
            let (tag, value) = self.parse_tag_line(&line)?;
            self.headers.entry(tag).or_default().push(value.value);
        }
        self.done = true;
        Ok(())
    }

    /// Next logical line: trimmed, comment-stripped, continuations merged.
    /// Returns `Ok(None)` at end of input.
    fn next_line(&mut self) -> Result<Option<String>, ParseError> {
        let mut raw = String::new();
        loop {
            raw.clear();
            self.lineno += 1;
            if self.reader.read_line(&mut raw)? == 0 {
                return Ok(None);
            }

            let line = raw.trim();
            if line.is_empty() {
                return Ok(Some(String::new()));
            }
            if line.starts_with('!') {
                continue;
            }

            if let Some(stripped) = line.strip_suffix('\\') {
                return Ok(Some(self.read_continuation(stripped)?));
            }

            return Ok(Some(strip_comment(line)));
        }
    }

    /// Merge backslash-continued lines into one, joined with spaces
    fn read_continuation(&mut self, first: &str) -> Result<String, ParseError> {
        let mut parts = vec![first.trim_end().to_string()];
        let mut raw = String::new();
        loop {
            raw.clear();
            self.lineno += 1;
            if self.reader.read_line(&mut raw)? == 0 {
                break;
            }
            let line = raw.trim();
            if line.starts_with('!') {
                continue;
            }
            match line.strip_suffix('\\') {
                Some(stripped) => parts.push(stripped.trim_end().to_string()),
                None => {
                    parts.push(line.to_string());
                    break;
                }
            }
        }
        Ok(parts.join(" "))
    }

    /// Split a `tag: value` line, decoding a quoted value and its modifiers
    fn parse_tag_line(&self, line: &str) -> Result<(String, TagValue), ParseError> {
        let Some((tag, rest)) = line.split_once(':') else {
            return Err(ParseError::at(self.lineno, format!("expected `tag: value`, found {line:?}")));
        };
        let tag = tag.trim().to_string();
        let rest = rest.trim();

        if let Some(quoted) = rest.strip_prefix('"') {
            let (value, remainder) = self.parse_quoted(quoted)?;
            let remainder = remainder.trim();
            let modifiers = (!remainder.is_empty()).then(|| remainder.to_string());
            Ok((tag, TagValue { value, modifiers }))
        } else {
            Ok((tag, TagValue::plain(rest)))
        }
    }

    /// Decode a quoted string body (opening quote already consumed),
    /// returning the unescaped value and the text after the closing quote
    fn parse_quoted<'a>(&self, body: &'a str) -> Result<(String, &'a str), ParseError> {
        let mut value = String::new();
        let mut chars = body.char_indices();
        while let Some((i, c)) = chars.next() {
            match c {
                '\\' => match chars.next() {
                    Some((_, escaped)) => value.push(escaped),
                    None => {
                        return Err(ParseError::at(self.lineno, "dangling escape in quoted value"))
                    }
                },
                '"' => return Ok((value, &body[i + 1..])),
                _ => value.push(c),
            }
        }
        Err(ParseError::at(self.lineno, "unterminated quoted value"))
    }

    fn read_stanza(&mut self) -> Result<Option<Stanza>, ParseError> {
        if self.done {
            return Ok(None);
        }

        let Some(header) = self.carried.take() else {
            self.done = true;
            return Ok(None);
        };
        let name = header
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();
        let mut stanza = Stanza::new(name);

        while let Some(line) = self.next_line()? {
            if line.is_empty() {
                continue;
            }
            if line.starts_with('[') {
                self.carried = Some(line);
                return Ok(Some(stanza));
            }
            let (tag, value) = self.parse_tag_line(&line)?;
            stanza.tags.entry(tag).or_default().push(value);
        }

        self.done = true;
        Ok(Some(stanza))
    }
}

impl<R: BufRead> Iterator for Parser<R> {
    type Item = Result<Stanza, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_stanza().transpose()
    }
}

/// Truncate at the first `!` that is outside a quoted string.
/// Backslash escapes the next character inside quotes.
fn strip_comment(line: &str) -> String {
    let mut in_quotes = false;
    let mut escape = false;
    for (i, c) in line.char_indices() {
        if escape {
            escape = false;
            continue;
        }
        match c {
            '"' => in_quotes = !in_quotes,
            '\\' if in_quotes => escape = true,
            '!' if !in_quotes => return line[..i].trim_end().to_string(),
            _ => {}
        }
    }
    line.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_all(text: &str) -> (BTreeMap<String, Vec<String>>, Vec<Stanza>) {
        let mut parser = Parser::new(text.as_bytes()).unwrap();
        let headers = parser.headers().clone();
        let stanzas: Vec<Stanza> = parser.by_ref().collect::<Result<_, _>>().unwrap();
        (headers, stanzas)
    }

    #[test]
    fn test_parse_headers_and_stanzas() {
        let text = "\
format-version: 1.2
data-version: releases/2024-01-01

[Term]
id: HP:0000001
name: All

[Term]
id: HP:0000118
name: Phenotypic abnormality
is_a: HP:0000001
";
        let (headers, stanzas) = parse_all(text);
        assert_eq!(headers.get("format-version").unwrap(), &vec!["1.2".to_string()]);
        assert_eq!(stanzas.len(), 2);
        assert_eq!(stanzas[0].name, "Term");
        assert_eq!(stanzas[0].first("id"), Some("HP:0000001"));
        assert_eq!(stanzas[1].values("is_a"), vec!["HP:0000001"]);
    }

    #[test]
    fn test_comment_stripped_outside_quotes() {
        let text = "\
[Term]
id: HP:0000252
is_a: HP:0000240 ! Abnormality of skull size
";
        let (_, stanzas) = parse_all(text);
        assert_eq!(stanzas[0].values("is_a"), vec!["HP:0000240"]);
    }

    #[test]
    fn test_quoted_value_with_modifiers() {
        let text = "\
[Term]
id: HP:0000252
synonym: \"Small head\" EXACT [ORCID:0000-0001-5208-3432]
synonym: \"A \\\"quoted\\\" synonym ! not a comment\" RELATED []
";
        let (_, stanzas) = parse_all(text);
        let synonyms = &stanzas[0].tags["synonym"];
        assert_eq!(synonyms[0].value, "Small head");
        assert_eq!(
            synonyms[0].modifiers.as_deref(),
            Some("EXACT [ORCID:0000-0001-5208-3432]")
        );
        assert_eq!(synonyms[1].value, "A \"quoted\" synonym ! not a comment");
    }

    #[test]
    fn test_line_continuation() {
        let text = "\
[Term]
id: HP:0000001
def: first part \\
second part
";
        let (_, stanzas) = parse_all(text);
        assert_eq!(stanzas[0].first("def"), Some("first part second part"));
    }

    #[test]
    fn test_unterminated_quote_is_error() {
        let text = "\
[Term]
id: HP:0000001
synonym: \"never closed
";
        let mut parser = Parser::new(text.as_bytes()).unwrap();
        let result: Result<Vec<Stanza>, ParseError> = parser.by_ref().collect();
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_input() {
        let (headers, stanzas) = parse_all("");
        assert!(headers.is_empty());
        assert!(stanzas.is_empty());
    }
}
