//! Thin wrapper over `quick_xml::Writer` used by the assembler and the
//! metadata crosswalks.

use anyhow::Result;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

/// Buffered, indented XML writer. Nothing reaches the client until
/// [`finish`](XmlWriter::finish) hands back the complete document.
pub struct XmlWriter {
    inner: Writer<Vec<u8>>,
}

impl XmlWriter {
    pub fn new() -> Self {
        Self {
            inner: Writer::new_with_indent(Vec::new(), b' ', 2),
        }
    }

    /// Writes `<?xml version="1.0" encoding="UTF-8"?>`.
    pub fn declaration(&mut self) -> Result<()> {
        self.inner
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        Ok(())
    }

    pub fn start(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<()> {
        self.inner.write_event(Event::Start(tag(name, attrs)))?;
        Ok(())
    }

    pub fn end(&mut self, name: &str) -> Result<()> {
        self.inner.write_event(Event::End(BytesEnd::new(name)))?;
        Ok(())
    }

    pub fn empty(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<()> {
        self.inner.write_event(Event::Empty(tag(name, attrs)))?;
        Ok(())
    }

    /// Writes `<name attrs>text</name>`, escaping `text`.
    pub fn element(&mut self, name: &str, attrs: &[(&str, &str)], text: &str) -> Result<()> {
        let text = sanitize(text);
        self.start(name, attrs)?;
        self.inner.write_event(Event::Text(BytesText::new(&text)))?;
        self.end(name)
    }

    /// Inserts an already-serialized fragment verbatim.
    pub fn raw(&mut self, fragment: &str) -> Result<()> {
        self.inner
            .write_event(Event::Text(BytesText::from_escaped(fragment.trim())))?;
        Ok(())
    }

    pub fn finish(self) -> Result<String> {
        Ok(String::from_utf8(self.inner.into_inner())?)
    }
}

impl Default for XmlWriter {
    fn default() -> Self {
        Self::new()
    }
}

fn tag<'a>(name: &'a str, attrs: &[(&'a str, &'a str)]) -> BytesStart<'a> {
    let mut start = BytesStart::new(name);
    for &(key, value) in attrs {
        start.push_attribute((key, sanitize(value).as_str()));
    }
    start
}

/// Drops characters XML 1.0 cannot represent, such as C0 control codes
/// pasted into metadata.
pub fn sanitize(text: &str) -> String {
    text.chars()
        .filter(|&c| {
            matches!(c, '\t' | '\n' | '\r')
                || ('\u{20}'..='\u{D7FF}').contains(&c)
                || ('\u{E000}'..='\u{FFFD}').contains(&c)
                || c >= '\u{10000}'
        })
        .collect()
}
