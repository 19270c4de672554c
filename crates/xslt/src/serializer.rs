//! Writes a [`ResultDocument`] as text following its `xsl:output` settings.

use crate::error::XsltError;
use crate::result::{
    OutputMethod, OutputName, OutputSettings, ResultDocument, ResultElement, ResultNode,
    XML_NAMESPACE,
};
use quick_xml::Writer;
use quick_xml::escape::partial_escape;
use quick_xml::events::{BytesEnd, BytesPI, BytesStart, BytesText, Event};

const HTML_VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Serializes a result document to a string.
pub fn serialize(doc: &ResultDocument) -> Result<String, XsltError> {
    let method = effective_method(doc);
    if method == OutputMethod::Text {
        return Ok(doc.text_content());
    }

    let mut out = Vec::new();
    write_prolog(&mut out, doc, method);

    let mut serializer = Serializer {
        writer: if doc.output.indent {
            Writer::new_with_indent(out, b' ', 2)
        } else {
            Writer::new(out)
        },
        html: method == OutputMethod::Html,
        scopes: Vec::new(),
        generated: 0,
    };
    for node in &doc.children {
        serializer.write_node(node, false)?;
    }

    let mut text = String::from_utf8(serializer.writer.into_inner())?;
    if !text.ends_with('\n') {
        text.push('\n');
    }
    Ok(text)
}

/// Without an explicit method, an `html` document element in no namespace selects html.
fn effective_method(doc: &ResultDocument) -> OutputMethod {
    if doc.output.method_explicit {
        return doc.output.method;
    }
    for node in &doc.children {
        match node {
            ResultNode::Text(text) if !text.trim().is_empty() => return OutputMethod::Xml,
            ResultNode::Element(el) => {
                return if el.name.namespace.is_none() && el.name.local.eq_ignore_ascii_case("html")
                {
                    OutputMethod::Html
                } else {
                    OutputMethod::Xml
                };
            }
            _ => {}
        }
    }
    OutputMethod::Xml
}

fn write_prolog(out: &mut Vec<u8>, doc: &ResultDocument, method: OutputMethod) {
    let settings: &OutputSettings = &doc.output;
    if method == OutputMethod::Xml && !settings.omit_xml_declaration {
        let encoding = settings.encoding.as_deref().unwrap_or("UTF-8");
        let standalone = match settings.standalone {
            Some(true) => " standalone=\"yes\"",
            Some(false) => " standalone=\"no\"",
            None => "",
        };
        out.extend_from_slice(
            format!("<?xml version=\"1.0\" encoding=\"{}\"{}?>\n", encoding, standalone).as_bytes(),
        );
    }

    let root_name = doc
        .document_element()
        .map(|el| el.name.qualified())
        .unwrap_or_else(|| "html".to_string());
    let doctype = match (&settings.doctype_public, &settings.doctype_system) {
        (Some(public), Some(system)) => Some(format!("PUBLIC \"{}\" \"{}\"", public, system)),
        (None, Some(system)) => Some(format!("SYSTEM \"{}\"", system)),
        (Some(public), None) if method == OutputMethod::Html => {
            Some(format!("PUBLIC \"{}\"", public))
        }
        _ => None,
    };
    if let Some(doctype) = doctype {
        out.extend_from_slice(format!("<!DOCTYPE {} {}>\n", root_name, doctype).as_bytes());
    }
}

struct Serializer {
    writer: Writer<Vec<u8>>,
    html: bool,
    /// Namespace bindings declared by each open element.
    scopes: Vec<Vec<(Option<String>, String)>>,
    generated: usize,
}

impl Serializer {
    fn write_node(&mut self, node: &ResultNode, raw_text: bool) -> Result<(), XsltError> {
        match node {
            ResultNode::Element(el) => self.write_element(el),
            ResultNode::Text(text) if raw_text => {
                self.writer.write_event(Event::Text(BytesText::from_escaped(text.as_str())))?;
                Ok(())
            }
            ResultNode::Text(text) => {
                self.writer.write_event(Event::Text(BytesText::from_escaped(partial_escape(
                    text.as_str(),
                ))))?;
                Ok(())
            }
            ResultNode::Comment(text) => {
                let mut sanitized = text.replace("--", "- -");
                if sanitized.ends_with('-') {
                    sanitized.push(' ');
                }
                self.writer.write_event(Event::Comment(BytesText::from_escaped(sanitized)))?;
                Ok(())
            }
            ResultNode::ProcessingInstruction { target, data } => {
                let content = if data.is_empty() {
                    target.clone()
                } else {
                    format!("{} {}", target, data.replace("?>", "? >"))
                };
                self.writer.write_event(Event::PI(BytesPI::new(content)))?;
                Ok(())
            }
        }
    }

    fn write_element(&mut self, el: &ResultElement) -> Result<(), XsltError> {
        let mut declared: Vec<(Option<String>, String)> = Vec::new();

        for (prefix, uri) in &el.namespaces {
            if self.resolve(&declared, prefix.as_deref()) != Some(uri.as_str())
                && !declared.iter().any(|(p, _)| p == prefix)
            {
                declared.push((prefix.clone(), uri.clone()));
            }
        }

        let element_prefix = match &el.name.namespace {
            Some(uri) => Some(self.bind(&mut declared, el.name.prefix.as_deref(), uri, true)),
            None => {
                if self.resolve(&declared, None).is_some_and(|uri| !uri.is_empty()) {
                    declared.retain(|(p, _)| p.is_some());
                    declared.push((None, String::new()));
                }
                None
            }
        };
        let element_name = qualified(element_prefix.flatten().as_deref(), &el.name.local);

        let mut attributes = Vec::with_capacity(el.attributes.len());
        for (name, value) in &el.attributes {
            let prefix = match name.namespace.as_deref() {
                None => None,
                Some(XML_NAMESPACE) => Some("xml".to_string()),
                Some(uri) => self.bind(&mut declared, name.prefix.as_deref(), uri, false),
            };
            attributes.push((qualified(prefix.as_deref(), &name.local), value.as_str()));
        }

        let mut start = BytesStart::new(element_name.as_str());
        for (prefix, uri) in &declared {
            let key = match prefix {
                Some(p) => format!("xmlns:{}", p),
                None => "xmlns".to_string(),
            };
            start.push_attribute((key.as_str(), uri.as_str()));
        }
        for (key, value) in &attributes {
            start.push_attribute((key.as_str(), *value));
        }

        let html_name = self.html && el.name.namespace.is_none();
        let lower = el.name.local.to_ascii_lowercase();
        if el.children.is_empty() {
            if html_name && HTML_VOID_ELEMENTS.contains(&lower.as_str()) {
                self.writer.write_event(Event::Start(start))?;
                return Ok(());
            }
            if !self.html {
                self.writer.write_event(Event::Empty(start))?;
                return Ok(());
            }
        }

        self.writer.write_event(Event::Start(start))?;
        self.scopes.push(declared);
        let raw_text = html_name && (lower == "script" || lower == "style");
        let mut result = Ok(());
        for child in &el.children {
            result = self.write_node(child, raw_text);
            if result.is_err() {
                break;
            }
        }
        self.scopes.pop();
        result?;
        self.writer.write_event(Event::End(BytesEnd::new(element_name.as_str())))?;
        Ok(())
    }

    /// The URI a prefix is bound to, looking at pending declarations first.
    fn resolve<'s>(
        &'s self,
        pending: &'s [(Option<String>, String)],
        prefix: Option<&str>,
    ) -> Option<&'s str> {
        pending
            .iter()
            .chain(self.scopes.iter().rev().flatten())
            .find(|(p, _)| p.as_deref() == prefix)
            .map(|(_, uri)| uri.as_str())
    }

    /// Picks a prefix that maps to `uri`, declaring it when needed. Attributes never use the
    /// default namespace, so they get a generated prefix when the hint is absent.
    fn bind(
        &mut self,
        pending: &mut Vec<(Option<String>, String)>,
        hint: Option<&str>,
        uri: &str,
        allow_default: bool,
    ) -> Option<String> {
        if hint.is_some() || allow_default {
            if self.resolve(pending, hint) == Some(uri) {
                return hint.map(str::to_string);
            }
            if !pending.iter().any(|(p, _)| p.as_deref() == hint) {
                pending.push((hint.map(str::to_string), uri.to_string()));
                return hint.map(str::to_string);
            }
        }
        if let Some((Some(prefix), _)) = pending
            .iter()
            .chain(self.scopes.iter().rev().flatten())
            .find(|(p, u)| p.is_some() && u == uri)
        {
            let prefix = prefix.clone();
            if self.resolve(pending, Some(&prefix)) == Some(uri) {
                return Some(prefix);
            }
        }
        loop {
            let candidate = format!("ns{}", self.generated);
            self.generated += 1;
            if self.resolve(pending, Some(&candidate)).is_none() {
                pending.push((Some(candidate.clone()), uri.to_string()));
                return Some(candidate);
            }
        }
    }
}

fn qualified(prefix: Option<&str>, local: &str) -> String {
    OutputName {
        prefix: prefix.map(str::to_string),
        local: local.to_string(),
        namespace: None,
    }
    .qualified()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{OutputBuilder, ResultTreeBuilder};

    fn build(settings: OutputSettings, f: impl FnOnce(&mut ResultTreeBuilder)) -> String {
        let mut builder = ResultTreeBuilder::new();
        f(&mut builder);
        serialize(&builder.finish(settings)).unwrap()
    }

    fn ns_name(prefix: Option<&str>, local: &str, uri: &str) -> OutputName {
        OutputName {
            prefix: prefix.map(str::to_string),
            local: local.to_string(),
            namespace: Some(uri.to_string()),
        }
    }

    #[test]
    fn xml_with_declaration_and_escaping() {
        let text = build(OutputSettings::default(), |b| {
            b.start_element(OutputName::local("r"));
            b.set_attribute(OutputName::local("q"), "a\"<b");
            b.add_text("1 < 2 & 3");
            b.start_element(OutputName::local("empty"));
            b.end_element();
            b.end_element();
        });
        assert_eq!(
            text,
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<r q=\"a&quot;&lt;b\">1 &lt; 2 &amp; 3<empty/></r>\n"
        );
    }

    #[test]
    fn indentation_nests_elements() {
        let settings = OutputSettings {
            indent: true,
            omit_xml_declaration: true,
            ..Default::default()
        };
        let text = build(settings, |b| {
            b.start_element(OutputName::local("a"));
            b.start_element(OutputName::local("b"));
            b.add_text("x");
            b.end_element();
            b.end_element();
        });
        assert_eq!(text, "<a>\n  <b>x</b>\n</a>\n");
    }

    #[test]
    fn namespaces_are_declared_once() {
        let settings = OutputSettings {
            omit_xml_declaration: true,
            ..Default::default()
        };
        let text = build(settings, |b| {
            b.start_element(ns_name(Some("a"), "root", "urn:a"));
            b.add_namespace(Some("a"), "urn:a");
            b.start_element(ns_name(Some("a"), "child", "urn:a"));
            b.set_attribute(ns_name(None, "flag", "urn:b"), "1");
            b.end_element();
            b.end_element();
        });
        assert_eq!(
            text,
            "<a:root xmlns:a=\"urn:a\"><a:child xmlns:ns0=\"urn:b\" ns0:flag=\"1\"/></a:root>\n"
        );
    }

    #[test]
    fn default_namespace_is_undeclared_for_plain_children() {
        let settings = OutputSettings {
            omit_xml_declaration: true,
            ..Default::default()
        };
        let text = build(settings, |b| {
            b.start_element(ns_name(None, "svg", "urn:svg"));
            b.start_element(OutputName::local("plain"));
            b.end_element();
            b.end_element();
        });
        assert_eq!(text, "<svg xmlns=\"urn:svg\"><plain xmlns=\"\"/></svg>\n");
    }

    #[test]
    fn html_is_detected_and_void_elements_stay_open() {
        let text = build(OutputSettings::default(), |b| {
            b.start_element(OutputName::local("html"));
            b.start_element(OutputName::local("br"));
            b.end_element();
            b.start_element(OutputName::local("script"));
            b.add_text("if (a < b) {}");
            b.end_element();
            b.start_element(OutputName::local("div"));
            b.end_element();
            b.end_element();
        });
        assert_eq!(
            text,
            "<html><br><script>if (a < b) {}</script><div></div></html>\n"
        );
    }

    #[test]
    fn text_method_keeps_only_text() {
        let settings = OutputSettings {
            method: OutputMethod::Text,
            method_explicit: true,
            ..Default::default()
        };
        let text = build(settings, |b| {
            b.start_element(OutputName::local("a"));
            b.add_text("one");
            b.add_comment("skip");
            b.add_text(" two");
            b.end_element();
        });
        assert_eq!(text, "one two");
    }

    #[test]
    fn comments_and_instructions() {
        let settings = OutputSettings {
            omit_xml_declaration: true,
            ..Default::default()
        };
        let text = build(settings, |b| {
            b.start_element(OutputName::local("a"));
            b.add_comment("a--b-");
            b.add_processing_instruction("pi", "data");
            b.end_element();
        });
        assert_eq!(text, "<a><!--a- -b- --><?pi data?></a>\n");
    }

    #[test]
    fn doctype_uses_the_document_element() {
        let settings = OutputSettings {
            omit_xml_declaration: true,
            doctype_system: Some("note.dtd".into()),
            ..Default::default()
        };
        let text = build(settings, |b| {
            b.start_element(OutputName::local("note"));
            b.end_element();
        });
        assert_eq!(text, "<!DOCTYPE note SYSTEM \"note.dtd\">\n<note/>\n");
    }
}
