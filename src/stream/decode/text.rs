use regex::Regex;

use crate::fs_op::error::Result;
use crate::stream::decode::{trim_line_ending, LineSource, RecordDecoder};
use crate::stream::record::Record;

/// Yields one `char` at a time. Invalid UTF-8 becomes U+FFFD.
pub struct CharacterDecoder {
    source: LineSource,
}

impl CharacterDecoder {
    pub fn new(source: LineSource) -> Self {
        CharacterDecoder { source }
    }
}

fn utf8_width(lead: u8) -> usize {
    match lead {
        0x00..=0x7F => 1,
        0xC2..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF4 => 4,
        _ => 0,
    }
}

impl RecordDecoder for CharacterDecoder {
    fn next_record(&mut self) -> Result<Option<Record>> {
        let Some(lead) = self.source.next_byte()? else {
            return Ok(None);
        };
        let width = utf8_width(lead);
        if width == 0 {
            return Ok(Some(Record::Char(char::REPLACEMENT_CHARACTER)));
        }
        let mut bytes = [lead, 0, 0, 0];
        for slot in bytes.iter_mut().take(width).skip(1) {
            match self.source.peek_byte()? {
                Some(b) if b & 0xC0 == 0x80 => {
                    *slot = b;
                    self.source.next_byte()?;
                }
                _ => return Ok(Some(Record::Char(char::REPLACEMENT_CHARACTER))),
            }
        }
        let c = std::str::from_utf8(&bytes[..width])
            .ok()
            .and_then(|s| s.chars().next())
            .unwrap_or(char::REPLACEMENT_CHARACTER);
        Ok(Some(Record::Char(c)))
    }
}

/// Yields each line with its terminator.
///
/// An unterminated whitespace-only fragment at end of file is not a line.
pub struct LineDecoder {
    source: LineSource,
}

impl LineDecoder {
    pub fn new(source: LineSource) -> Self {
        LineDecoder { source }
    }
}

impl RecordDecoder for LineDecoder {
    fn next_record(&mut self) -> Result<Option<Record>> {
        match self.source.next_line()? {
            Some(line) if !line.ends_with('\n') && line.trim().is_empty() => Ok(None),
            Some(line) => Ok(Some(Record::Line(line))),
            None => Ok(None),
        }
    }
}

/// Yields the captures of lines matching a pattern; other lines are skipped.
pub struct RegexDecoder {
    source: LineSource,
    pattern: Regex,
}

impl RegexDecoder {
    pub fn new(source: LineSource, pattern: Regex) -> Self {
        RegexDecoder { source, pattern }
    }
}

impl RecordDecoder for RegexDecoder {
    fn next_record(&mut self) -> Result<Option<Record>> {
        while let Some(line) = self.source.next_line()? {
            if let Some(caps) = self.pattern.captures(trim_line_ending(&line)) {
                let groups = caps
                    .iter()
                    .map(|m| m.map(|m| m.as_str().to_string()).unwrap_or_default())
                    .collect();
                return Ok(Some(Record::Captures(groups)));
            }
            tracing::trace!(line = self.source.line_number(), "no match, skipped");
        }
        Ok(None)
    }
}

/// Slices every line into fields of the configured `char` widths.
pub struct FixedWidthDecoder {
    source: LineSource,
    widths: Vec<usize>,
}

impl FixedWidthDecoder {
    pub fn new(source: LineSource, widths: Vec<usize>) -> Self {
        FixedWidthDecoder { source, widths }
    }
}

/// Cut `line` at cumulative offsets; fields past the end come back short or empty.
pub fn slice_fixed_width(line: &str, widths: &[usize]) -> Vec<String> {
    let chars: Vec<char> = line.chars().collect();
    let mut start = 0usize;
    let mut fields = Vec::with_capacity(widths.len());
    for &w in widths {
        let from = start.min(chars.len());
        let to = start.saturating_add(w).min(chars.len());
        fields.push(chars[from..to].iter().collect());
        start = start.saturating_add(w);
    }
    fields
}

impl RecordDecoder for FixedWidthDecoder {
    fn next_record(&mut self) -> Result<Option<Record>> {
        Ok(self
            .source
            .next_line()?
            .map(|line| Record::Fields(slice_fixed_width(trim_line_ending(&line), &self.widths))))
    }
}
