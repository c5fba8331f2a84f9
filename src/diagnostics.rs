//! Rendering violation events as readable, source-located report entries.

use std::fmt;

use crate::validator::ViolationEvent;

/// Messages are wrapped to this many characters.
pub const DEFAULT_WRAP_WIDTH: usize = 120;

/// Lines of source shown on either side of a violation.
pub const DEFAULT_CONTEXT_LINES: usize = 5;

/// Placed between entries when a report is rendered as one message.
pub const REPORT_SEPARATOR: &str = "\n-------------\n";

/// The lines of a validated document, for context lookups.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceLineIndex {
    lines: Vec<String>,
}

impl SourceLineIndex {
    /// Split on `\n`, `\r\n` and lone `\r`. A trailing terminator does not
    /// start another line.
    pub fn from_text(text: &str) -> Self {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let mut lines = Vec::new();
        let mut rest = text;

        while !rest.is_empty() {
            match rest.find(['\r', '\n']) {
                Some(pos) => {
                    lines.push(rest[..pos].to_string());
                    let skip = if rest[pos..].starts_with("\r\n") { 2 } else { 1 };
                    rest = &rest[pos + skip..];
                }
                None => {
                    lines.push(rest.to_string());
                    rest = "";
                }
            }
        }

        Self { lines }
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self::from_text(&String::from_utf8_lossy(bytes))
    }

    /// Zero-based access.
    pub fn line(&self, index: usize) -> Option<&str> {
        self.lines.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Greedy word wrap on single spaces.
///
/// Words are never split, so a word longer than `width` gets a line of its
/// own. Repeated spaces are kept inside a line; a line never starts with
/// a space.
pub fn wrap_text(message: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;
    let mut first = true;

    for word in message.split(' ') {
        let word_len = word.chars().count();

        if first {
            first = false;
        } else if current_len + 1 + word_len > width && current_len > 0 {
            lines.push(std::mem::take(&mut current));
            current_len = 0;
        } else if current_len > 0 {
            current.push(' ');
            current_len += 1;
        }

        current.push_str(word);
        current_len += word_len;
    }

    lines.push(current);
    lines
}

/// Turns violation events into report entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiagnosticFormatter {
    wrap_width: usize,
    context_lines: usize,
}

impl DiagnosticFormatter {
    pub fn new() -> Self {
        Self {
            wrap_width: DEFAULT_WRAP_WIDTH,
            context_lines: DEFAULT_CONTEXT_LINES,
        }
    }

    pub fn with_wrap_width(mut self, width: usize) -> Self {
        self.wrap_width = width.max(1);
        self
    }

    pub fn with_context_lines(mut self, lines: usize) -> Self {
        self.context_lines = lines;
        self
    }

    /// One entry per event, in event order.
    pub fn format(&self, events: &[ViolationEvent], source: &SourceLineIndex) -> DiagnosticReport {
        DiagnosticReport {
            entries: events
                .iter()
                .map(|event| self.format_event(event, source))
                .collect(),
        }
    }

    pub fn format_event(&self, event: &ViolationEvent, source: &SourceLineIndex) -> String {
        let mut entry = wrap_text(&event.message, self.wrap_width).join("\n");
        entry.push('\n');
        entry.push_str(&format!(
            "LineNumber: {}, LinePosition: {}\n",
            event.line, event.column
        ));

        for (number, text) in self.context_window(event.line, source) {
            entry.push_str(&format!("{}:{}\n", number, text));
        }

        entry
    }

    /// Source lines around a 1-based `line`, as `(1-based number, text)`.
    ///
    /// Covers zero-based indices `[line - K, line + K)`, so the reported
    /// line sits just past the middle. Out-of-range indices are dropped.
    pub fn context_window<'a>(&self, line: u32, source: &'a SourceLineIndex) -> Vec<(usize, &'a str)> {
        let line = line as usize;
        let start = line.saturating_sub(self.context_lines);
        let end = (line + self.context_lines).min(source.len());

        (start..end)
            .filter_map(|i| source.line(i).map(|text| (i + 1, text)))
            .collect()
    }
}

impl Default for DiagnosticFormatter {
    fn default() -> Self {
        Self::new()
    }
}

/// Ordered report entries; empty means the document conforms.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiagnosticReport {
    entries: Vec<String>,
}

impl DiagnosticReport {
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<String> {
        self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_conformant(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries joined with the report separator.
    pub fn render(&self) -> String {
        self.entries.join(REPORT_SEPARATOR)
    }
}

impl fmt::Display for DiagnosticReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl IntoIterator for DiagnosticReport {
    type Item = String;
    type IntoIter = std::vec::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
