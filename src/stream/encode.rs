//! Format encoders. Each turns one record into the exact bytes to append.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use quick_xml::escape::escape;
use serde::Serialize;

use crate::fs_op::error::{Result, StreamError};
use crate::stream::format::{CsvDialect, FormatKind, LINE_ENDING};
use crate::stream::record::XmlElement;

pub fn line(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len() + LINE_ENDING.len());
    out.extend_from_slice(text.as_bytes());
    out.extend_from_slice(LINE_ENDING.as_bytes());
    out
}

fn csv_writer(dialect: &CsvDialect) -> ::csv::Writer<Vec<u8>> {
    let mut builder = ::csv::WriterBuilder::new();
    builder
        .has_headers(false)
        .delimiter(dialect.delimiter)
        .quote(dialect.quote)
        .double_quote(dialect.double_quote);
    if let Some(esc) = dialect.escape {
        builder.escape(esc);
    }
    builder.from_writer(Vec::new())
}

fn finish_csv(wtr: ::csv::Writer<Vec<u8>>) -> Result<Vec<u8>> {
    wtr.into_inner()
        .map_err(|e| StreamError::encode(FormatKind::Csv.as_str(), e.error()))
}

/// One delimited row, terminated by `\n`.
pub fn csv<I, T>(fields: I, dialect: &CsvDialect) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    let mut wtr = csv_writer(dialect);
    wtr.write_record(fields)
        .map_err(|e| StreamError::encode(FormatKind::Csv.as_str(), e))?;
    finish_csv(wtr)
}

/// One row built from any serde-serializable value (tuple, struct, ...).
pub fn csv_serialize<T: Serialize>(row: &T, dialect: &CsvDialect) -> Result<Vec<u8>> {
    let mut wtr = csv_writer(dialect);
    wtr.serialize(row)
        .map_err(|e| StreamError::encode(FormatKind::Csv.as_str(), e))?;
    finish_csv(wtr)
}

pub fn json<T: Serialize + ?Sized>(value: &T, pretty: bool) -> Result<Vec<u8>> {
    let mut out = json_document(value, pretty, FormatKind::Json)?;
    out.extend_from_slice(LINE_ENDING.as_bytes());
    Ok(out)
}

/// The whole slice as one JSON array document, no trailing terminator.
pub fn json_array<T: Serialize>(items: &[T], pretty: bool) -> Result<Vec<u8>> {
    json_document(items, pretty, FormatKind::JsonArray)
}

fn json_document<T: Serialize + ?Sized>(value: &T, pretty: bool, kind: FormatKind) -> Result<Vec<u8>> {
    let encoded = if pretty {
        serde_json::to_vec_pretty(value)
    } else {
        serde_json::to_vec(value)
    };
    encoded.map_err(|e| StreamError::encode(kind.as_str(), e))
}

/// Left-justify every field to its width and join them into one line.
///
/// Longer fields are written in full.
pub fn fixed_width<S: AsRef<str>>(fields: &[S], widths: &[usize]) -> Result<Vec<u8>> {
    if fields.len() != widths.len() {
        return Err(StreamError::Argument(format!(
            "fixed-width record has {} fields but {} widths",
            fields.len(),
            widths.len()
        )));
    }
    let mut out = String::new();
    for (field, &width) in fields.iter().zip(widths) {
        let field = field.as_ref();
        out.push_str(field);
        let used = field.chars().count();
        out.extend(std::iter::repeat(' ').take(width.saturating_sub(used)));
    }
    Ok(line(&out))
}

/// Textual XML for `element`, followed by a line terminator.
pub fn xml(element: &XmlElement) -> Result<Vec<u8>> {
    let mut out = String::new();
    write_element(element, &mut out)?;
    out.push_str(LINE_ENDING);
    Ok(out.into_bytes())
}

fn valid_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit() || c == '-' || c == '.')
        && !name
            .chars()
            .any(|c| c.is_whitespace() || "<>&\"'/=".contains(c))
}

fn write_element(element: &XmlElement, out: &mut String) -> Result<()> {
    if !valid_name(&element.name) {
        return Err(StreamError::encode(
            FormatKind::Xml.as_str(),
            format!("invalid element name {:?}", element.name),
        ));
    }
    out.push('<');
    out.push_str(&element.name);
    for (key, value) in &element.attributes {
        if !valid_name(key) {
            return Err(StreamError::encode(
                FormatKind::Xml.as_str(),
                format!("invalid attribute name {key:?}"),
            ));
        }
        out.push(' ');
        out.push_str(key);
        out.push_str("=\"");
        out.push_str(&escape(value.as_str()));
        out.push('"');
    }
    if element.text.is_empty() && element.children.is_empty() {
        out.push_str("/>");
        return Ok(());
    }
    out.push('>');
    out.push_str(&escape(element.text.as_str()));
    for child in &element.children {
        write_element(child, out)?;
    }
    out.push_str("</");
    out.push_str(&element.name);
    out.push('>');
    Ok(())
}

/// Postcard payload, base64 wrapped onto a single line.
pub fn serialized<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let bytes = postcard::to_allocvec(value)
        .map_err(|e| StreamError::encode(FormatKind::Serialized.as_str(), e))?;
    Ok(line(&STANDARD.encode(bytes)))
}
