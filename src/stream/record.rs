use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::fs_op::error::{Result, StreamError};

/// One decoded unit produced by a reader.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Record {
    Char(char),
    Line(String),
    /// CSV row or fixed-width slices.
    Fields(Vec<String>),
    Bytes(Vec<u8>),
    Json(serde_json::Value),
    /// Full match followed by every capture group.
    Captures(Vec<String>),
    Xml(XmlElement),
    /// Raw payload of a natively serialized value; see
    /// [`StreamReader::values`](crate::stream::reader::StreamReader::values).
    Serialized(Vec<u8>),
}

impl Record {
    pub fn as_line(&self) -> Option<&str> {
        match self {
            Record::Line(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_fields(&self) -> Option<&[String]> {
        match self {
            Record::Fields(f) | Record::Captures(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Record::Bytes(b) | Record::Serialized(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Record::Json(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_xml(&self) -> Option<&XmlElement> {
        match self {
            Record::Xml(e) => Some(e),
            _ => None,
        }
    }

    /// Decode a `Serialized` record into `T`.
    ///
    /// `path` and `index` locate the record in error reports.
    pub(crate) fn decode_serialized<T: DeserializeOwned>(&self, path: &Path, index: u64) -> Result<T> {
        match self {
            Record::Serialized(bytes) => postcard::from_bytes(bytes)
                .map_err(|e| StreamError::decode(path, index, format!("bad serialized payload: {e}"))),
            other => Err(StreamError::Argument(format!(
                "expected a serialized record, got {other:?}"
            ))),
        }
    }
}

/// Element extracted from an XML document.
///
/// Text is the concatenation of the element's own text nodes; mixed content
/// ordering relative to children is not kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        XmlElement {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_child(mut self, child: XmlElement) -> Self {
        self.children.push(child);
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }
}
