use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use quick_xml::escape::unescape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::fs_op::error::{Result, StreamError};
use crate::stream::decode::RecordDecoder;
use crate::stream::record::{Record, XmlElement};

/// Yields every element named `tag`, wherever it occurs in the document.
///
/// A matching element is parsed whole, children included; matches nested
/// inside another match are part of the outer record.
pub struct XmlDecoder {
    reader: Reader<BufReader<File>>,
    tag: String,
    path: PathBuf,
    produced: u64,
}

impl XmlDecoder {
    pub fn new(file: File, path: PathBuf, tag: String) -> Self {
        XmlDecoder {
            reader: Reader::from_reader(BufReader::new(file)),
            tag,
            path,
            produced: 0,
        }
    }

    fn fail(&self, message: impl std::fmt::Display) -> StreamError {
        StreamError::decode(&self.path, self.produced, message)
    }

    fn text(&self, raw: &[u8]) -> Result<String> {
        let s = std::str::from_utf8(raw).map_err(|e| self.fail(e))?;
        Ok(unescape(s).map_err(|e| self.fail(e))?.into_owned())
    }

    fn begin(&self, start: &BytesStart<'_>) -> Result<XmlElement> {
        let name = std::str::from_utf8(start.name().as_ref())
            .map_err(|e| self.fail(e))?
            .to_string();
        let mut element = XmlElement::new(name);
        for attr in start.attributes() {
            let attr = attr.map_err(|e| self.fail(e))?;
            let key = std::str::from_utf8(attr.key.as_ref())
                .map_err(|e| self.fail(e))?
                .to_string();
            let value = self.text(&attr.value)?;
            element.attributes.push((key, value));
        }
        Ok(element)
    }

    /// Parse the body of an element whose start tag was just consumed.
    ///
    /// Text is kept verbatim, including whitespace between entity
    /// references. Text made only of layout whitespace is dropped.
    fn finish(&mut self, mut element: XmlElement) -> Result<XmlElement> {
        let mut buf = Vec::new();
        let mut significant = false;
        loop {
            buf.clear();
            let event = self
                .reader
                .read_event_into(&mut buf)
                .map_err(|e| self.fail(e))?;
            match event {
                Event::Start(child) => {
                    let child = self.begin(&child)?;
                    let child = self.finish(child)?;
                    element.children.push(child);
                }
                Event::Empty(child) => {
                    let child = self.begin(&child)?;
                    element.children.push(child);
                }
                Event::Text(t) => {
                    let text = self.text(&t)?;
                    significant |= !text.trim().is_empty();
                    element.text.push_str(&text);
                }
                Event::CData(c) => {
                    let s = std::str::from_utf8(&c).map_err(|e| self.fail(e))?;
                    significant = true;
                    element.text.push_str(s);
                }
                Event::GeneralRef(r) => {
                    let name = std::str::from_utf8(&r).map_err(|e| self.fail(e))?;
                    let resolved = self.text(format!("&{name};").as_bytes())?;
                    significant = true;
                    element.text.push_str(&resolved);
                }
                Event::End(_) => {
                    if !significant {
                        element.text.clear();
                    }
                    return Ok(element);
                }
                Event::Eof => {
                    return Err(self.fail(format!(
                        "unexpected end of file inside <{}>",
                        element.name
                    )))
                }
                _ => {}
            }
        }
    }
}

impl RecordDecoder for XmlDecoder {
    fn next_record(&mut self) -> Result<Option<Record>> {
        let mut buf = Vec::new();
        loop {
            buf.clear();
            let event = self
                .reader
                .read_event_into(&mut buf)
                .map_err(|e| self.fail(e))?;
            match event {
                Event::Start(start) if start.name().as_ref() == self.tag.as_bytes() => {
                    let element = self.begin(&start)?;
                    let element = self.finish(element)?;
                    self.produced += 1;
                    return Ok(Some(Record::Xml(element)));
                }
                Event::Empty(start) if start.name().as_ref() == self.tag.as_bytes() => {
                    let element = self.begin(&start)?;
                    self.produced += 1;
                    return Ok(Some(Record::Xml(element)));
                }
                Event::Eof => return Ok(None),
                _ => {}
            }
        }
    }
}
