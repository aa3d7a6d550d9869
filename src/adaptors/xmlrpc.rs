//! XML-RPC `methodResponse` reply parser.
//!
//! Walks `<methodResponse><params><param><value>…</value></param>…
//! </params></methodResponse>` with `quick_xml`'s pull parser (the same
//! event-loop shape used elsewhere in this retrieval pack for
//! extracting text from XML), producing a flat ordered table of either
//! structs or scalars. Any shape the walk doesn't recognize aborts
//! parsing and returns `None` rather than panicking.

use quick_xml::events::Event;
use quick_xml::Reader;

/// One entry of a decoded `<params>` list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlRpcValue {
    /// `<string>`/`<int>`/`<i4>` text content, whitespace-trimmed.
    Scalar(String),
    /// `<struct>` of ordered `(name, value)` members.
    Struct(Vec<(String, String)>),
}

const SCALAR_TAGS: [&str; 3] = ["string", "int", "i4"];

/// A single parser token, with text already unescaped and owned so it
/// can outlive the scratch buffer `quick_xml` reads into.
enum Tok {
    Start(String),
    End(String),
    Empty(String),
    Text(String),
    Eof,
}

fn next_tok(reader: &mut Reader<&[u8]>, buf: &mut Vec<u8>) -> Option<Tok> {
    loop {
        buf.clear();
        match reader.read_event_into(buf).ok()? {
            Event::Start(e) => return Some(Tok::Start(String::from_utf8_lossy(e.local_name().as_ref()).into_owned())),
            Event::End(e) => return Some(Tok::End(String::from_utf8_lossy(e.local_name().as_ref()).into_owned())),
            Event::Empty(e) => return Some(Tok::Empty(String::from_utf8_lossy(e.local_name().as_ref()).into_owned())),
            Event::Text(e) => {
                let text = e.unescape().ok()?.trim().to_string();
                if text.is_empty() {
                    continue;
                }
                return Some(Tok::Text(text));
            }
            Event::Eof => return Some(Tok::Eof),
            _ => continue,
        }
    }
}

fn expect_start(reader: &mut Reader<&[u8]>, buf: &mut Vec<u8>, name: &str) -> Option<()> {
    match next_tok(reader, buf)? {
        Tok::Start(n) if n == name => Some(()),
        _ => None,
    }
}

fn expect_end(reader: &mut Reader<&[u8]>, buf: &mut Vec<u8>, name: &str) -> Option<()> {
    match next_tok(reader, buf)? {
        Tok::End(n) if n == name => Some(()),
        _ => None,
    }
}

/// Parse a UTF-8 `methodResponse` document into its ordered params
/// table, or `None` on any structural violation.
pub fn parse_method_response(xml: &str) -> Option<Vec<XmlRpcValue>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    expect_start(&mut reader, &mut buf, "methodResponse")?;
    expect_start(&mut reader, &mut buf, "params")?;

    let mut params = Vec::new();
    loop {
        match next_tok(&mut reader, &mut buf)? {
            Tok::Start(n) if n == "param" => {
                expect_start(&mut reader, &mut buf, "value")?;
                let value = parse_value(&mut reader, &mut buf)?;
                expect_end(&mut reader, &mut buf, "value")?;
                expect_end(&mut reader, &mut buf, "param")?;
                params.push(value);
            }
            Tok::End(n) if n == "params" => break,
            _ => return None,
        }
    }
    expect_end(&mut reader, &mut buf, "methodResponse")?;
    Some(params)
}

/// Parse the content of an already-opened `<value>`: either a
/// `<struct>` of members, or a bare scalar tag.
fn parse_value(reader: &mut Reader<&[u8]>, buf: &mut Vec<u8>) -> Option<XmlRpcValue> {
    match next_tok(reader, buf)? {
        Tok::Empty(n) if n == "struct" => Some(XmlRpcValue::Struct(Vec::new())),
        Tok::Start(n) if n == "struct" => parse_struct_members(reader, buf).map(XmlRpcValue::Struct),
        Tok::Empty(n) if SCALAR_TAGS.contains(&n.as_str()) => Some(XmlRpcValue::Scalar(String::new())),
        Tok::Start(n) if SCALAR_TAGS.contains(&n.as_str()) => parse_scalar_body(reader, buf, &n).map(XmlRpcValue::Scalar),
        _ => None,
    }
}

fn parse_struct_members(reader: &mut Reader<&[u8]>, buf: &mut Vec<u8>) -> Option<Vec<(String, String)>> {
    let mut members = Vec::new();
    loop {
        match next_tok(reader, buf)? {
            Tok::Start(n) if n == "member" => {
                expect_start(reader, buf, "name")?;
                let name = match next_tok(reader, buf)? {
                    Tok::Text(t) => t,
                    Tok::End(ref n) if n == "name" => String::new(),
                    _ => return None,
                };
                if !name.is_empty() {
                    expect_end(reader, buf, "name")?;
                }
                expect_start(reader, buf, "value")?;
                let value = match parse_value(reader, buf)? {
                    XmlRpcValue::Scalar(s) => s,
                    XmlRpcValue::Struct(_) => return None,
                };
                expect_end(reader, buf, "value")?;
                expect_end(reader, buf, "member")?;
                members.push((name, value));
            }
            Tok::End(n) if n == "struct" => break,
            _ => return None,
        }
    }
    Some(members)
}

fn parse_scalar_body(reader: &mut Reader<&[u8]>, buf: &mut Vec<u8>, tag: &str) -> Option<String> {
    match next_tok(reader, buf)? {
        Tok::Text(text) => {
            expect_end(reader, buf, tag)?;
            Some(text)
        }
        Tok::End(n) if n == tag => Some(String::new()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scalar_param() {
        let xml = r#"<?xml version="1.0"?>
<methodResponse><params><param><value><string> hello </string></value></param></params></methodResponse>"#;
        let params = parse_method_response(xml).unwrap();
        assert_eq!(params, vec![XmlRpcValue::Scalar("hello".to_string())]);
    }

    #[test]
    fn parses_struct_param() {
        let xml = r#"<methodResponse><params><param><value><struct>
            <member><name>code</name><value><int>7</int></value></member>
            <member><name>msg</name><value><string>ok</string></value></member>
        </struct></value></param></params></methodResponse>"#;
        let params = parse_method_response(xml).unwrap();
        assert_eq!(
            params,
            vec![XmlRpcValue::Struct(vec![
                ("code".to_string(), "7".to_string()),
                ("msg".to_string(), "ok".to_string()),
            ])]
        );
    }

    #[test]
    fn multiple_params_preserve_order() {
        let xml = r#"<methodResponse><params>
            <param><value><int>1</int></value></param>
            <param><value><int>2</int></value></param>
        </params></methodResponse>"#;
        let params = parse_method_response(xml).unwrap();
        assert_eq!(params, vec![XmlRpcValue::Scalar("1".to_string()), XmlRpcValue::Scalar("2".to_string())]);
    }

    #[test]
    fn structural_violation_returns_none() {
        let xml = r#"<methodResponse><params><param><value><bogus>x</bogus></value></param></params></methodResponse>"#;
        assert!(parse_method_response(xml).is_none());
    }

    #[test]
    fn missing_methodresponse_wrapper_returns_none() {
        assert!(parse_method_response("<params></params>").is_none());
    }
}
