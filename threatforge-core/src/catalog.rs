//! Catalog Loader - XML Threat Catalog to Groups
//!
//! Shape parsing only. The loader accepts
//! `RootNodes > ThreatsCatalog > ThreatClasses > ThreatClass` and ignores
//! everything else. Field content is never validated here.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

const ROOT_ELEMENT: &[u8] = b"RootNodes";
const GROUP_ELEMENT: &[u8] = b"ThreatsCatalog";
const CLASS_LIST_ELEMENT: &[u8] = b"ThreatClasses";
const CLASS_ELEMENT: &[u8] = b"ThreatClass";

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Malformed catalog document: {0}")]
    Malformed(String),

    #[error("Malformed catalog document: not valid UTF-8 ({0})")]
    Encoding(#[from] std::str::Utf8Error),

    #[error("Failed to read catalog {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogGroup {
    pub name: String,
    pub entries: Vec<ClassEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassEntry {
    pub raw_id: String,
    pub raw_name: String,
    pub raw_title: String,
}

impl ClassEntry {
    pub fn new(raw_id: &str, raw_name: &str, raw_title: &str) -> Self {
        Self {
            raw_id: raw_id.to_string(),
            raw_name: raw_name.to_string(),
            raw_title: raw_title.to_string(),
        }
    }
}

/// Read a catalog file. Bytes are decoded as UTF-8 before parsing.
pub fn load_from_path(path: &Path) -> Result<Vec<CatalogGroup>, LoadError> {
    let bytes = fs::read(path).map_err(|source| LoadError::Io {
        path: path.display().to_string(),
        source,
    })?;
    load_bytes(&bytes)
}

pub fn load_bytes(bytes: &[u8]) -> Result<Vec<CatalogGroup>, LoadError> {
    let text = std::str::from_utf8(bytes)?;
    load(text)
}

/// Parse a catalog document, preserving group and entry order.
pub fn load(document: &str) -> Result<Vec<CatalogGroup>, LoadError> {
    let mut reader = Reader::from_str(document);
    reader.config_mut().trim_text(true);

    // Open element names, outermost first.
    let mut path: Vec<Vec<u8>> = Vec::new();
    let mut groups: Vec<CatalogGroup> = Vec::new();
    let mut root_closed = false;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| LoadError::Malformed(e.to_string()))?;

        match event {
            Event::Start(e) => {
                open_element(&e, &path, &mut groups)?;
                path.push(e.local_name().as_ref().to_vec());
            }
            Event::Empty(e) => {
                open_element(&e, &path, &mut groups)?;
                if path.is_empty() {
                    root_closed = true;
                    break;
                }
            }
            Event::End(_) => {
                path.pop();
                if path.is_empty() {
                    root_closed = true;
                    break;
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !root_closed {
        return Err(match path.last() {
            Some(open) => LoadError::Malformed(format!(
                "unexpected end of document inside <{}>",
                String::from_utf8_lossy(open)
            )),
            None => LoadError::Malformed("document has no root element".into()),
        });
    }

    Ok(groups)
}

fn open_element(
    element: &BytesStart<'_>,
    path: &[Vec<u8>],
    groups: &mut Vec<CatalogGroup>,
) -> Result<(), LoadError> {
    let local = element.local_name();
    let name = local.as_ref();

    if path.is_empty() {
        if name != ROOT_ELEMENT {
            return Err(LoadError::Malformed(format!(
                "expected <RootNodes> root element, found <{}>",
                String::from_utf8_lossy(name)
            )));
        }
        return Ok(());
    }

    match (path.len(), name) {
        (1, GROUP_ELEMENT) => {
            let group_name = attribute(element, b"name")?;
            groups.push(CatalogGroup { name: group_name, entries: Vec::new() });
        }
        (3, CLASS_ELEMENT) if path[1] == GROUP_ELEMENT && path[2] == CLASS_LIST_ELEMENT => {
            let entry = ClassEntry {
                raw_id: attribute(element, b"id")?,
                raw_name: attribute(element, b"name")?,
                raw_title: attribute(element, b"title")?,
            };
            // path[1] is a group element, so a group was pushed when it opened.
            if let Some(group) = groups.last_mut() {
                group.entries.push(entry);
            }
        }
        _ => {}
    }

    Ok(())
}

/// Attribute value by local name; a missing attribute reads as empty.
fn attribute(element: &BytesStart<'_>, key: &[u8]) -> Result<String, LoadError> {
    for attr in element.attributes() {
        let attr = attr.map_err(|e| LoadError::Malformed(e.to_string()))?;
        if attr.key.local_name().as_ref() == key {
            let value = attr
                .unescape_value()
                .map_err(|e| LoadError::Malformed(e.to_string()))?;
            return Ok(value.into_owned());
        }
    }
    Ok(String::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_group_and_entry_order() {
        let doc = r#"<?xml version="1.0" encoding="UTF-8"?>
<RootNodes>
  <ThreatsCatalog name="Spoofing">
    <ThreatClasses>
      <ThreatClass id="TS001" name="B" title="Second"/>
      <ThreatClass id="TS000" name="A" title="First"/>
    </ThreatClasses>
  </ThreatsCatalog>
  <ThreatsCatalog name="Tampering">
    <ThreatClasses>
      <ThreatClass id="TT000" name="C" title="Third"></ThreatClass>
    </ThreatClasses>
  </ThreatsCatalog>
</RootNodes>"#;
        let groups = load(doc).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].name, "Spoofing");
        assert_eq!(groups[0].entries[0], ClassEntry::new("TS001", "B", "Second"));
        assert_eq!(groups[0].entries[1], ClassEntry::new("TS000", "A", "First"));
        assert_eq!(groups[1].entries, vec![ClassEntry::new("TT000", "C", "Third")]);
    }

    #[test]
    fn namespaced_attributes_match_by_local_name() {
        let doc = r#"<RootNodes xmlns:localRef="urn:x">
  <ThreatsCatalog name="G">
    <ThreatClasses>
      <ThreatClass localRef:id="TS000" name="Spoofing &amp; Co" />
    </ThreatClasses>
  </ThreatsCatalog>
</RootNodes>"#;
        let groups = load(doc).unwrap();
        let entry = &groups[0].entries[0];
        assert_eq!(entry.raw_id, "TS000");
        assert_eq!(entry.raw_name, "Spoofing & Co");
        assert_eq!(entry.raw_title, "");
    }

    #[test]
    fn classes_outside_the_expected_path_are_ignored() {
        let doc = r#"<RootNodes>
  <ThreatClass id="stray" name="Stray"/>
  <ThreatsCatalog name="G">
    <ThreatClass id="direct" name="Direct"/>
    <Notes>text</Notes>
  </ThreatsCatalog>
</RootNodes>"#;
        let groups = load(doc).unwrap();
        assert_eq!(groups.len(), 1);
        assert!(groups[0].entries.is_empty());
    }

    #[test]
    fn rejects_wrong_root() {
        let err = load("<Catalog></Catalog>").unwrap_err();
        assert!(err.to_string().contains("RootNodes"));
    }

    #[test]
    fn rejects_empty_and_truncated_documents() {
        assert!(matches!(load(""), Err(LoadError::Malformed(_))));
        assert!(matches!(load("<RootNodes><ThreatsCatalog name=\"G\">"), Err(LoadError::Malformed(_))));
        assert!(matches!(load("<RootNodes></ThreatsCatalog>"), Err(LoadError::Malformed(_))));
    }

    #[test]
    fn rejects_invalid_utf8() {
        let err = load_bytes(&[0x3c, 0xff, 0xfe, 0x3e]).unwrap_err();
        assert!(matches!(err, LoadError::Encoding(_)));
    }
}
