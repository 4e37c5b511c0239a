//! Decoding of `/xmlapi2/thing` responses.
//!
//! The document shape is owned by the API. Only the pieces needed to find a
//! game's primary name are modelled; everything else is ignored.

use quick_xml::events::Event;
use quick_xml::Reader;
use serde::Deserialize;

use crate::error::LookupError;

const ROOT_ELEMENT: &[u8] = b"items";
const PRIMARY: &str = "primary";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GameRecord {
    #[serde(rename = "item", default)]
    pub items: Vec<GameItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GameItem {
    #[serde(rename = "@id", default)]
    pub id: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(rename = "name", default)]
    pub names: Vec<GameName>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GameName {
    #[serde(rename = "@type", default)]
    pub kind: String,
    #[serde(rename = "@value", default)]
    pub value: String,
}

impl GameRecord {
    /// Primary name of the first item.
    pub fn primary_name(&self) -> Result<&str, LookupError> {
        let first = self.items.first().ok_or(LookupError::GameNotFoundError)?;

        first
            .names
            .iter()
            .find(|name| name.kind == PRIMARY)
            .map(|name| name.value.as_str())
            .ok_or(LookupError::GameNameMissingError)
    }
}

pub fn decode(body: &[u8]) -> Result<GameRecord, LookupError> {
    let text = std::str::from_utf8(body)
        .map_err(|err| LookupError::MalformedResponseError(format!("invalid UTF-8: {err}")))?;

    check_root(text)?;
    Ok(quick_xml::de::from_str(text)?)
}

/// Decodes `body` and extracts the primary name in one step.
pub fn parse_primary_name(body: &[u8]) -> Result<String, LookupError> {
    decode(body)?.primary_name().map(str::to_owned)
}

// The serde deserializer accepts any root tag, so an HTML error page or an
// `<error>` document would silently decode as an empty record.
fn check_root(text: &str) -> Result<(), LookupError> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    loop {
        match reader.read_event()? {
            Event::Start(tag) | Event::Empty(tag) => {
                let name = tag.name();
                if name.as_ref() == ROOT_ELEMENT {
                    return Ok(());
                }
                return Err(LookupError::MalformedResponseError(format!(
                    "expected <items> root element, found <{}>",
                    String::from_utf8_lossy(name.as_ref())
                )));
            }
            Event::Decl(_) | Event::Comment(_) | Event::DocType(_) | Event::PI(_) => continue,
            Event::Eof => {
                return Err(LookupError::MalformedResponseError(
                    "document has no root element".to_string(),
                ))
            }
            _ => {
                return Err(LookupError::MalformedResponseError(
                    "unexpected content before root element".to_string(),
                ))
            }
        }
    }
}
