//! XML envelope extraction and reply building
//!
//! Callback bodies are attacker-controlled. A document type declaration is a
//! parse error as soon as the parser reports it, which happens before the
//! root element, so no declared entity is ever expanded. The parser never
//! loads external resources and undeclared entity references are errors.

use std::collections::HashMap;

use xml::escape::escape_str_pcdata;
use xml::reader::{EventReader, ParserConfig, XmlEvent};

use crate::error::{AesError, AesResult};

/// Flattened view of an XML document
///
/// Every leaf element is stored under its path relative to the root, e.g.
/// `MsgType` or `ScanCodeInfo/ScanResult`, in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlFields {
    root: String,
    entries: Vec<(String, String)>,
}

impl XmlFields {
    /// Name of the root element
    pub fn root(&self) -> &str {
        &self.root
    }

    /// First value stored under `path`
    pub fn get(&self, path: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == path)
            .map(|(_, v)| v.as_str())
    }

    /// All values stored under `path`, for repeated elements
    pub fn get_all<'a>(&'a self, path: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(k, _)| k == path)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Parse untrusted XML into a path-keyed field map
pub fn parse(raw: &str) -> AesResult<XmlFields> {
    let config = ParserConfig::new()
        .trim_whitespace(false)
        .whitespace_to_characters(false)
        .cdata_to_characters(false)
        .ignore_comments(true)
        .coalesce_characters(true);
    let reader = EventReader::new_with_config(raw.as_bytes(), config);

    struct Frame {
        name: String,
        text: String,
        has_children: bool,
    }

    let mut fields = XmlFields::default();
    let mut stack: Vec<Frame> = Vec::new();
    let mut seen_root = false;

    for event in reader {
        match event.map_err(|e| AesError::XmlParse(e.to_string()))? {
            XmlEvent::Doctype { .. } => {
                return Err(AesError::XmlParse(
                    "DOCTYPE declarations are not allowed".to_string(),
                ));
            }
            XmlEvent::StartElement { name, .. } => {
                if stack.is_empty() {
                    if seen_root {
                        return Err(AesError::XmlParse("multiple root elements".to_string()));
                    }
                    seen_root = true;
                    fields.root = name.local_name.clone();
                }
                if let Some(parent) = stack.last_mut() {
                    parent.has_children = true;
                }
                stack.push(Frame {
                    name: name.local_name,
                    text: String::new(),
                    has_children: false,
                });
            }
            XmlEvent::Characters(s) | XmlEvent::CData(s) | XmlEvent::Whitespace(s) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&s);
                }
            }
            XmlEvent::EndElement { .. } => {
                let Some(frame) = stack.pop() else {
                    return Err(AesError::XmlParse("unbalanced end element".to_string()));
                };
                // the root itself is never a field
                if stack.is_empty() || frame.has_children {
                    continue;
                }
                let mut path: Vec<&str> = stack[1..].iter().map(|f| f.name.as_str()).collect();
                path.push(&frame.name);
                fields.entries.push((path.join("/"), frame.text));
            }
            XmlEvent::EndDocument => break,
            _ => {}
        }
    }

    if !seen_root {
        return Err(AesError::XmlParse("document has no root element".to_string()));
    }

    Ok(fields)
}

/// Pull a fixed set of top-level tags out of an envelope
///
/// Every requested tag is present in the result; absent tags map to `None`.
pub fn extract(raw: &str, tags: &[&str]) -> AesResult<HashMap<String, Option<String>>> {
    let fields = parse(raw)?;
    Ok(tags
        .iter()
        .map(|tag| (tag.to_string(), fields.get(tag).map(str::to_string)))
        .collect())
}

/// Incremental writer for the platform's `<xml>` documents
#[derive(Debug)]
pub struct XmlBuilder {
    out: String,
}

impl Default for XmlBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl XmlBuilder {
    pub fn new() -> Self {
        Self {
            out: String::from("<xml>"),
        }
    }

    /// `<tag><![CDATA[value]]></tag>`
    pub fn cdata(mut self, tag: &str, value: &str) -> Self {
        self.out.push('<');
        self.out.push_str(tag);
        self.out.push_str("><![CDATA[");
        // a literal "]]>" has to be split across two sections
        self.out.push_str(&value.replace("]]>", "]]]]><![CDATA[>"));
        self.out.push_str("]]></");
        self.out.push_str(tag);
        self.out.push('>');
        self
    }

    /// CDATA element, skipped when `value` is `None`
    pub fn cdata_opt(self, tag: &str, value: Option<&str>) -> Self {
        match value {
            Some(value) => self.cdata(tag, value),
            None => self,
        }
    }

    /// `<tag>escaped value</tag>`
    pub fn text(mut self, tag: &str, value: &str) -> Self {
        self.out.push('<');
        self.out.push_str(tag);
        self.out.push('>');
        self.out.push_str(&escape_str_pcdata(value));
        self.out.push_str("</");
        self.out.push_str(tag);
        self.out.push('>');
        self
    }

    pub fn open(mut self, tag: &str) -> Self {
        self.out.push('<');
        self.out.push_str(tag);
        self.out.push('>');
        self
    }

    pub fn close(mut self, tag: &str) -> Self {
        self.out.push_str("</");
        self.out.push_str(tag);
        self.out.push('>');
        self
    }

    pub fn build(mut self) -> String {
        self.out.push_str("</xml>");
        self.out
    }
}

/// Build a flat `<xml>` document
///
/// Tags listed in `cdata_tags` are wrapped in CDATA, everything else is
/// escaped text. `None` values are omitted.
pub fn build(fields: &[(&str, Option<&str>)], cdata_tags: &[&str]) -> String {
    fields
        .iter()
        .fold(XmlBuilder::new(), |builder, (tag, value)| match value {
            Some(value) if cdata_tags.contains(tag) => builder.cdata(tag, value),
            Some(value) => builder.text(tag, value),
            None => builder,
        })
        .build()
}

/// Encrypted reply envelope
pub fn encrypted_reply(
    encrypt: &str,
    signature: &str,
    timestamp: &str,
    nonce: &str,
    agent_id: Option<&str>,
) -> String {
    build(
        &[
            ("Encrypt", Some(encrypt)),
            ("MsgSignature", Some(signature)),
            ("TimeStamp", Some(timestamp)),
            ("Nonce", Some(nonce)),
            ("AgentID", agent_id),
        ],
        &["Encrypt"],
    )
}
