//! INDI XML framing
//!
//! INDI is a stream of top-level XML elements without an enclosing
//! document. Incoming bytes are accumulated per connection and complete
//! elements are cut off the front of the buffer as they arrive.

use anyhow::Result;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::errors::{Error, SyntaxError};
use quick_xml::{Reader, Writer};

/// Pending input above this size is discarded
pub const MAX_PENDING: usize = 1 << 20;

/// One `oneText` member of a `newTextVector`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OneText {
    pub name: String,
    pub text: String,
}

/// Messages the server reacts to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndiMessage {
    GetProperties,
    NewTextVector {
        device: Option<String>,
        name: Option<String>,
        texts: Vec<OneText>,
    },
    /// Anything else, by tag name
    Other(String),
}

/// Remove every complete top-level element from the front of `pending`
///
/// An incomplete trailing element stays in `pending`. Ill-formed input
/// (mismatched or stray end tags) is dropped entirely; invalid markup is
/// skipped through its closing `>` and framing resumes after it.
pub fn split_elements(pending: &mut String) -> Vec<String> {
    let mut elements = Vec::new();

    loop {
        let mut consumed = 0;
        let mut resync = false;

        {
            let mut reader = Reader::from_str(pending.as_str());
            let mut depth = 0usize;
            let mut start = 0usize;

            loop {
                let before = reader.buffer_position() as usize;
                match reader.read_event() {
                    Ok(Event::Start(_)) => {
                        if depth == 0 {
                            start = before;
                        }
                        depth += 1;
                    }
                    Ok(Event::End(_)) => {
                        depth -= 1;
                        if depth == 0 {
                            let end = reader.buffer_position() as usize;
                            elements.push(pending[start..end].to_string());
                            consumed = end;
                        }
                    }
                    Ok(Event::Empty(_)) if depth == 0 => {
                        let end = reader.buffer_position() as usize;
                        elements.push(pending[before..end].to_string());
                        consumed = end;
                    }
                    Ok(Event::Eof) => {
                        if depth == 0 {
                            consumed = pending.len();
                        }
                        break;
                    }
                    Ok(_) => {
                        if depth == 0 {
                            consumed = reader.buffer_position() as usize;
                        }
                    }
                    Err(Error::IllFormed(e)) => {
                        tracing::debug!("Dropping ill-formed INDI input: {}", e);
                        consumed = pending.len();
                        break;
                    }
                    // a construct cut in half, wait for the rest
                    Err(Error::Syntax(e)) if is_unclosed(&e) => break,
                    Err(e) => {
                        tracing::debug!("Skipping invalid INDI markup: {}", e);
                        consumed = pending[before..]
                            .find('>')
                            .map_or(pending.len(), |i| before + i + 1);
                        resync = true;
                        break;
                    }
                }
            }
        }

        pending.drain(..consumed);
        if !resync || pending.is_empty() {
            return elements;
        }
    }
}

fn is_unclosed(error: &SyntaxError) -> bool {
    !matches!(error, SyntaxError::InvalidBangMarkup)
}

/// Decode one complete element
pub fn parse_message(element: &str) -> Result<IndiMessage> {
    let mut reader = Reader::from_str(element);

    loop {
        match reader.read_event()? {
            Event::Start(e) => return parse_root(&mut reader, &e, true),
            Event::Empty(e) => return parse_root(&mut reader, &e, false),
            Event::Eof => anyhow::bail!("empty INDI message"),
            _ => {}
        }
    }
}

fn parse_root(
    reader: &mut Reader<&[u8]>,
    root: &BytesStart<'_>,
    has_children: bool,
) -> Result<IndiMessage> {
    match root.name().as_ref() {
        b"getProperties" => Ok(IndiMessage::GetProperties),
        b"newTextVector" => {
            let texts = if has_children {
                parse_texts(reader)?
            } else {
                Vec::new()
            };
            Ok(IndiMessage::NewTextVector {
                device: attribute(root, "device")?,
                name: attribute(root, "name")?,
                texts,
            })
        }
        other => Ok(IndiMessage::Other(String::from_utf8_lossy(other).into_owned())),
    }
}

fn parse_texts(reader: &mut Reader<&[u8]>) -> Result<Vec<OneText>> {
    let mut texts = Vec::new();
    let mut current: Option<OneText> = None;
    let mut depth = 1usize;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                depth += 1;
                if depth == 2 && e.name().as_ref() == b"oneText" {
                    current = Some(OneText {
                        name: attribute(&e, "name")?.unwrap_or_default(),
                        text: String::new(),
                    });
                }
            }
            Event::Empty(e) => {
                if depth == 1 && e.name().as_ref() == b"oneText" {
                    texts.push(OneText {
                        name: attribute(&e, "name")?.unwrap_or_default(),
                        text: String::new(),
                    });
                }
            }
            Event::Text(t) => {
                if let Some(one) = current.as_mut() {
                    one.text.push_str(&t.unescape()?);
                }
            }
            Event::CData(c) => {
                if let Some(one) = current.as_mut() {
                    one.text.push_str(&String::from_utf8_lossy(&c));
                }
            }
            Event::End(_) => {
                depth -= 1;
                if depth == 1 {
                    texts.extend(current.take());
                }
                if depth == 0 {
                    break;
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(texts)
}

fn attribute(element: &BytesStart<'_>, key: &str) -> Result<Option<String>> {
    match element.try_get_attribute(key)? {
        Some(attr) => Ok(Some(attr.unescape_value()?.into_owned())),
        None => Ok(None),
    }
}

/// Render a text vector with one `item_tag` child per value, named `1..N`
pub fn render_vector(
    tag: &str,
    attributes: &[(&str, &str)],
    item_tag: &str,
    values: &[String],
) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

    writer.write_event(Event::Start(
        BytesStart::new(tag).with_attributes(attributes.iter().copied()),
    ))?;
    for (i, value) in values.iter().enumerate() {
        let name = (i + 1).to_string();
        writer.write_event(Event::Start(
            BytesStart::new(item_tag).with_attributes([("name", name.as_str())]),
        ))?;
        writer.write_event(Event::Text(BytesText::new(value)))?;
        writer.write_event(Event::End(BytesEnd::new(item_tag)))?;
    }
    writer.write_event(Event::End(BytesEnd::new(tag)))?;

    let mut xml = String::from_utf8(writer.into_inner())?;
    xml.push('\n');
    Ok(xml)
}

/// INDI streams are latin-1
pub fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

pub fn encode_latin1(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_complete_elements() {
        let mut pending =
            "<getProperties version=\"1.7\"/>\n<newTextVector device=\"D\" name=\"PORT\">\n  <oneText name=\"1\">on</oneText>\n</newTextVector>\n"
                .to_string();

        let elements = split_elements(&mut pending);
        assert_eq!(elements.len(), 2);
        assert_eq!(elements[0], "<getProperties version=\"1.7\"/>");
        assert!(elements[1].starts_with("<newTextVector"));
        assert!(elements[1].ends_with("</newTextVector>"));
        assert!(pending.is_empty());
    }

    #[test]
    fn test_split_keeps_partial_element() {
        let mut pending = "<newTextVector device=\"D\" name=\"PORT\"><oneText name=\"1\">o".to_string();
        assert!(split_elements(&mut pending).is_empty());
        assert!(pending.starts_with("<newTextVector"));

        pending.push_str("n</oneText></newTextVector><getProp");
        let elements = split_elements(&mut pending);
        assert_eq!(elements.len(), 1);
        assert_eq!(pending, "<getProp");

        pending.push_str("erties/>");
        assert_eq!(split_elements(&mut pending), vec!["<getProperties/>"]);
    }

    #[test]
    fn test_split_drops_ill_formed_input() {
        let mut pending = "<a></b><getProperties/>".to_string();
        assert!(split_elements(&mut pending).is_empty());
        assert!(pending.is_empty());
    }

    #[test]
    fn test_split_skips_invalid_markup() {
        let mut pending = "<!x><getProperties/><newText".to_string();
        assert_eq!(split_elements(&mut pending), vec!["<getProperties/>"]);
        assert_eq!(pending, "<newText");
    }

    #[test]
    fn test_parse_get_properties() {
        assert_eq!(
            parse_message("<getProperties version=\"1.7\"/>").unwrap(),
            IndiMessage::GetProperties
        );
    }

    #[test]
    fn test_parse_new_text_vector() {
        let message = parse_message(
            "<newTextVector device=\"USBWATCH_LAB\" name=\"PORT\">\
             <oneText name=\"1\"> Hard </oneText>\
             <oneText name=\"2\"></oneText>\
             <oneText name=\"3\"/>\
             </newTextVector>",
        )
        .unwrap();

        assert_eq!(
            message,
            IndiMessage::NewTextVector {
                device: Some("USBWATCH_LAB".to_string()),
                name: Some("PORT".to_string()),
                texts: vec![
                    OneText {
                        name: "1".to_string(),
                        text: " Hard ".to_string()
                    },
                    OneText {
                        name: "2".to_string(),
                        text: String::new()
                    },
                    OneText {
                        name: "3".to_string(),
                        text: String::new()
                    },
                ],
            }
        );
    }

    #[test]
    fn test_parse_other_message() {
        assert_eq!(
            parse_message("<enableBLOB device=\"x\">Never</enableBLOB>").unwrap(),
            IndiMessage::Other("enableBLOB".to_string())
        );
    }

    #[test]
    fn test_render_vector_escapes_values() {
        let xml = render_vector(
            "defTextVector",
            &[("device", "D"), ("name", "PORT")],
            "defText",
            &["1-01          [P]".to_string(), "a < b & c".to_string()],
        )
        .unwrap();

        assert!(xml.starts_with("<defTextVector device=\"D\" name=\"PORT\">"));
        assert!(xml.contains("<defText name=\"1\">1-01          [P]</defText>"));
        assert!(xml.contains("<defText name=\"2\">a &lt; b &amp; c</defText>"));
        assert!(xml.ends_with("</defTextVector>\n"));
    }

    #[test]
    fn test_latin1() {
        assert_eq!(decode_latin1(&[0x41, 0xe9]), "A\u{e9}");
        assert_eq!(encode_latin1("A\u{e9}\u{263a}"), vec![0x41, 0xe9, b'?']);
    }
}
