//! Typed block model and the engine-native raw form.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::ConversionError;

use super::markup;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListStyle {
    Ordered,
    Unordered,
}

impl ListStyle {
    pub fn as_str(self) -> &'static str {
        match self {
            ListStyle::Ordered => "ordered",
            ListStyle::Unordered => "unordered",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ordered" => Some(ListStyle::Ordered),
            "unordered" => Some(ListStyle::Unordered),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Block {
    Paragraph { text: String },
    Header { text: String, level: u8 },
    List { style: ListStyle, items: Vec<String> },
    Quote { text: String, caption: String },
    Code { text: String },
}

impl Block {
    pub const MIN_HEADER_LEVEL: u8 = 1;
    pub const MAX_HEADER_LEVEL: u8 = 3;

    pub fn paragraph(text: impl Into<String>) -> Self {
        Block::Paragraph { text: text.into() }
    }

    /// Header levels outside 1-3 are clamped into range.
    pub fn header(text: impl Into<String>, level: u8) -> Self {
        Block::Header {
            text: text.into(),
            level: level.clamp(Self::MIN_HEADER_LEVEL, Self::MAX_HEADER_LEVEL),
        }
    }

    pub fn list<I, S>(style: ListStyle, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Block::List {
            style,
            items: items.into_iter().map(Into::into).collect(),
        }
    }

    pub fn quote(text: impl Into<String>, caption: impl Into<String>) -> Self {
        Block::Quote {
            text: text.into(),
            caption: caption.into(),
        }
    }

    pub fn code(text: impl Into<String>) -> Self {
        Block::Code { text: text.into() }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Block::Paragraph { .. } => "paragraph",
            Block::Header { .. } => "header",
            Block::List { .. } => "list",
            Block::Quote { .. } => "quote",
            Block::Code { .. } => "code",
        }
    }
}

/// A block as an interactive block editor hands it back: `{ "type", "data" }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawBlock {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: Value,
}

impl RawBlock {
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }

    /// The `text` payload, if this block carries one. Paragraphs, headers and
    /// quotes do; lists and code do not.
    pub fn text(&self) -> Option<&str> {
        self.data.get("text").and_then(Value::as_str)
    }
}

impl From<&Block> for RawBlock {
    fn from(block: &Block) -> Self {
        let data = match block {
            Block::Paragraph { text } => json!({ "text": text }),
            Block::Header { text, level } => json!({ "text": text, "level": level }),
            Block::List { style, items } => json!({ "style": style.as_str(), "items": items }),
            Block::Quote { text, caption } => json!({ "text": text, "caption": caption }),
            Block::Code { text } => json!({ "code": text }),
        };
        RawBlock::new(block.kind(), data)
    }
}

impl TryFrom<&RawBlock> for Block {
    type Error = ConversionError;

    fn try_from(raw: &RawBlock) -> Result<Self, Self::Error> {
        let kind = raw.kind.as_str();
        let data = raw
            .data
            .as_object()
            .ok_or_else(|| ConversionError::NotAnObject {
                kind: kind.to_string(),
            })?;

        match kind {
            "paragraph" => Ok(Block::paragraph(string_field(kind, data, "text")?)),
            "header" => {
                let text = string_field(kind, data, "text")?;
                let level = match data.get("level") {
                    None => Block::MIN_HEADER_LEVEL as u64,
                    Some(v) => v.as_u64().ok_or_else(|| invalid(kind, "level"))?,
                };
                let level = u8::try_from(level).unwrap_or(Block::MAX_HEADER_LEVEL);
                Ok(Block::header(text, level))
            }
            "list" => {
                let style = match data.get("style") {
                    None => ListStyle::Unordered,
                    Some(v) => v
                        .as_str()
                        .and_then(ListStyle::parse)
                        .ok_or_else(|| invalid(kind, "style"))?,
                };
                let items = data
                    .get("items")
                    .ok_or_else(|| missing(kind, "items"))?
                    .as_array()
                    .ok_or_else(|| invalid(kind, "items"))?
                    .iter()
                    .map(|item| list_item_text(item).ok_or_else(|| invalid(kind, "items")))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Block::List { style, items })
            }
            "quote" => {
                let text = string_field(kind, data, "text")?;
                let caption = match data.get("caption") {
                    None | Some(Value::Null) => String::new(),
                    Some(v) => v.as_str().ok_or_else(|| invalid(kind, "caption"))?.to_string(),
                };
                Ok(Block::Quote { text, caption })
            }
            "code" => Ok(Block::code(string_field(kind, data, "code")?)),
            other => Err(ConversionError::UnknownKind(other.to_string())),
        }
    }
}

// Nested-list editors hand items back as `{ "content": ".." }` objects.
fn list_item_text(item: &Value) -> Option<String> {
    match item {
        Value::String(s) => Some(s.clone()),
        Value::Object(obj) => obj.get("content").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

fn string_field(
    kind: &str,
    data: &Map<String, Value>,
    field: &'static str,
) -> Result<String, ConversionError> {
    data.get(field)
        .ok_or_else(|| missing(kind, field))?
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| invalid(kind, field))
}

fn missing(kind: &str, field: &'static str) -> ConversionError {
    ConversionError::MissingField {
        kind: kind.to_string(),
        field,
    }
}

fn invalid(kind: &str, field: &'static str) -> ConversionError {
    ConversionError::InvalidField {
        kind: kind.to_string(),
        field,
    }
}

/// An ordered, never-empty sequence of blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    blocks: Vec<Block>,
}

impl Default for Document {
    fn default() -> Self {
        Self {
            blocks: vec![Block::paragraph("")],
        }
    }
}

impl Document {
    /// An empty block list is normalized to a single empty paragraph.
    pub fn new(blocks: Vec<Block>) -> Self {
        if blocks.is_empty() {
            Self::default()
        } else {
            Self { blocks }
        }
    }

    /// `None`, `""` and whitespace-only markup all yield the empty document.
    pub fn from_markup(markup: Option<&str>) -> Self {
        Self::new(markup.map(markup::to_blocks).unwrap_or_default())
    }

    pub fn from_raw(raw: &[RawBlock]) -> Result<Self, ConversionError> {
        let blocks = raw
            .iter()
            .map(Block::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(blocks))
    }

    pub fn to_markup(&self) -> String {
        markup::to_markup(&self.blocks)
    }

    pub fn to_raw(&self) -> Vec<RawBlock> {
        self.blocks.iter().map(RawBlock::from).collect()
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn into_blocks(self) -> Vec<Block> {
        self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Always false: construction normalizes to at least one block.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// True for the single-empty-paragraph document.
    pub fn is_blank(&self) -> bool {
        matches!(self.blocks.as_slice(), [Block::Paragraph { text }] if text.trim().is_empty())
    }
}
