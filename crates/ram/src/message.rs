//! Payload rendering.
//!
//! JSON payloads are written with `", "` and `": "` separators and with every
//! non-ASCII character escaped as `\uXXXX`, so `{"id": 42}` is stored as
//! exactly those bytes and payloads stay readable by existing consumers that
//! expect this format.

use std::io;

use anyhow::Context as _;
use serde::Serialize;
use serde_json::ser::Formatter;

use crate::error::RamError;

/// Something a producer can enqueue.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Stored as spaced, ASCII-only JSON.
    Json(serde_json::Value),
    /// Stored as is.
    Text(String),
}

impl Message {
    /// Capture any serializable value as JSON, keeping field order.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Self, RamError> {
        Ok(serde_json::to_value(value)?.into())
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Text(text) if text.is_empty())
    }

    /// The text stored in the `payload` column.
    pub fn render(&self) -> Result<String, RamError> {
        match self {
            Self::Json(value) => to_spaced_json(value),
            Self::Text(text) => Ok(text.clone()),
        }
    }
}

impl From<serde_json::Value> for Message {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(text) => Self::Text(text),
            other => Self::Json(other),
        }
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

pub fn to_spaced_json<T: Serialize + ?Sized>(value: &T) -> Result<String, RamError> {
    let mut out = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, SpacedAsciiFormatter);
    value.serialize(&mut serializer)?;
    Ok(String::from_utf8(out).context("render JSON payload")?)
}

struct SpacedAsciiFormatter;

impl Formatter for SpacedAsciiFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        let mut units = [0u16; 2];
        for ch in fragment.chars() {
            if ch.is_ascii() {
                writer.write_all(&[ch as u8])?;
            } else {
                for unit in ch.encode_utf16(&mut units) {
                    write!(writer, "\\u{unit:04x}")?;
                }
            }
        }
        Ok(())
    }
}
