//! Reading generated bundles back: identifier stripping and mapping targets

use std::borrow::Cow;

use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};

use crate::BundleError;

const ID_ELEMENT: &[u8] = b"l7:Id";
const PROPERTY_ELEMENT: &[u8] = b"l7:Property";
const STRING_VALUE_ELEMENT: &[u8] = b"l7:StringValue";
const IDENTIFIER_ATTRIBUTES: &[&[u8]] = &[b"id", b"srcId"];

fn parse_error(e: impl std::fmt::Display) -> BundleError {
    BundleError::Parse(e.to_string())
}

/// Rewrite `xml` without generated identifiers: the `id` and `srcId`
/// attributes and the text of `l7:Id` elements.
pub fn strip_identifiers(xml: &str) -> Result<String, BundleError> {
    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Vec::new());
    let mut in_id = false;

    loop {
        let event = match reader.read_event().map_err(parse_error)? {
            Event::Eof => break,
            Event::Start(start) => {
                in_id = start.name().as_ref() == ID_ELEMENT;
                Event::Start(without_identifiers(&start)?)
            }
            Event::Empty(start) => Event::Empty(without_identifiers(&start)?),
            Event::Text(_) if in_id => continue,
            Event::End(end) => {
                in_id = false;
                Event::End(end)
            }
            other => other,
        };
        writer.write_event(event).map_err(parse_error)?;
    }

    String::from_utf8(writer.into_inner()).map_err(parse_error)
}

fn without_identifiers(start: &BytesStart<'_>) -> Result<BytesStart<'static>, BundleError> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut stripped = BytesStart::new(name);
    for attr in start.attributes() {
        let attr = attr.map_err(parse_error)?;
        if IDENTIFIER_ATTRIBUTES.contains(&attr.key.as_ref()) {
            continue;
        }
        stripped.push_attribute(attr);
    }
    Ok(stripped)
}

/// True when two bundles differ at most in generated identifiers.
///
/// Documents that fail to parse are compared byte for byte.
pub fn equivalent(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    match (strip_identifiers(a), strip_identifiers(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// The `MapTo` names of every mapping, in document order.
pub fn mapping_targets(xml: &str) -> Result<Vec<String>, BundleError> {
    let mut reader = Reader::from_str(xml);
    let mut targets = Vec::new();
    let mut in_map_to = false;
    let mut in_value = false;

    loop {
        match reader.read_event().map_err(parse_error)? {
            Event::Eof => break,
            Event::Start(start) if start.name().as_ref() == PROPERTY_ELEMENT => {
                in_map_to = start
                    .attributes()
                    .flatten()
                    .any(|a| a.key.as_ref() == b"key" && a.value.as_ref() == b"MapTo");
            }
            Event::Start(start) if in_map_to && start.name().as_ref() == STRING_VALUE_ELEMENT => {
                in_value = true;
            }
            Event::Text(text) if in_value => {
                let value: Cow<'_, str> = text.unescape().map_err(parse_error)?;
                targets.push(value.into_owned());
            }
            Event::End(end) => match end.name().as_ref() {
                STRING_VALUE_ELEMENT => in_value = false,
                PROPERTY_ELEMENT => in_map_to = false,
                _ => {}
            },
            _ => {}
        }
    }

    Ok(targets)
}
