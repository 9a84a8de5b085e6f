use anyhow::{anyhow, Context};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// Prefix that marks an entry key as an XML attribute.
pub const ATTR_PREFIX: &str = "@_";
pub const TEXT_KEY: &str = "#text";
pub const CDATA_KEY: &str = "#cdata";
pub const COMMENT_KEY: &str = "#comment";
pub const PI_KEY: &str = "#pi";
pub const DOCTYPE_KEY: &str = "#doctype";

/// Parsed section XML.
///
/// An element is a `Map` whose entries keep source order: attributes (`@_name`, raw escaped
/// value), child elements (qualified tag name), character data (`#text`, `#cdata`) and the
/// remaining markup (`#comment`, `#pi`, `#doctype`). Consecutive siblings with the same tag are
/// grouped into one `Seq` entry.
#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    Text(String),
    Seq(Vec<Node>),
    Map(Vec<(String, Node)>),
}

/// Attribute entries are layout/structure data and never hold replaceable text.
pub fn is_structural_attribute_key(key: &str) -> bool {
    key.starts_with(ATTR_PREFIX)
}

pub fn is_element_key(key: &str) -> bool {
    !key.starts_with(ATTR_PREFIX) && !key.starts_with('#')
}

/// `hp:lineseg` -> `lineseg`
pub fn local_name(key: &str) -> &str {
    key.rsplit(':').next().unwrap_or(key)
}

impl Node {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Node::Text(t) => Some(t.as_str()),
            _ => None,
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        let Node::Map(entries) = self else {
            return None;
        };
        entries
            .iter()
            .find(|(k, _)| k.strip_prefix(ATTR_PREFIX) == Some(name))
            .and_then(|(_, v)| v.as_text())
    }

    /// Overwrites an attribute in place, or appends it after the existing attributes.
    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        let Node::Map(entries) = self else {
            return;
        };
        let value = value.into();
        if let Some((_, v)) = entries
            .iter_mut()
            .find(|(k, _)| k.strip_prefix(ATTR_PREFIX) == Some(name))
        {
            *v = Node::Text(value);
            return;
        }
        let pos = entries
            .iter()
            .take_while(|(k, _)| is_structural_attribute_key(k))
            .count();
        entries.insert(pos, (format!("{ATTR_PREFIX}{name}"), Node::Text(value)));
    }

    /// Child elements with the given local name, in document order.
    pub fn children<'a>(&'a self, local: &'a str) -> impl Iterator<Item = &'a Node> + 'a {
        let entries: &[(String, Node)] = match self {
            Node::Map(entries) => entries.as_slice(),
            _ => &[],
        };
        entries
            .iter()
            .filter(move |(k, _)| is_element_key(k) && local_name(k) == local)
            .flat_map(|(_, n)| match n {
                Node::Seq(items) => items.iter().collect::<Vec<_>>(),
                other => vec![other],
            })
    }

    pub fn children_mut(&mut self, local: &str) -> Vec<&mut Node> {
        let mut out = Vec::new();
        if let Node::Map(entries) = self {
            for (key, node) in entries.iter_mut() {
                if !is_element_key(key) || local_name(key) != local {
                    continue;
                }
                match node {
                    Node::Seq(items) => out.extend(items.iter_mut()),
                    other => out.push(other),
                }
            }
        }
        out
    }

    /// Replaces every child element named `local` with `nodes`, at the position of the first one.
    /// The qualified tag of the first replaced child is reused.
    pub fn replace_children(&mut self, local: &str, mut nodes: Vec<Node>) {
        let Node::Map(entries) = self else {
            return;
        };
        let Some(pos) = entries
            .iter()
            .position(|(k, _)| is_element_key(k) && local_name(k) == local)
        else {
            return;
        };
        let key = entries[pos].0.clone();
        entries.retain(|(k, _)| !(is_element_key(k) && local_name(k) == local));
        let node = if nodes.len() == 1 {
            nodes.remove(0)
        } else {
            Node::Seq(nodes)
        };
        entries.insert(pos, (key, node));
    }

    /// Concatenated character data of this subtree.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(self, &mut out);
        out
    }
}

fn collect_text(node: &Node, out: &mut String) {
    match node {
        Node::Text(_) => {}
        Node::Seq(items) => items.iter().for_each(|n| collect_text(n, out)),
        Node::Map(entries) => {
            for (key, child) in entries {
                match (key.as_str(), child) {
                    (TEXT_KEY | CDATA_KEY, Node::Text(t)) => out.push_str(t),
                    (k, _) if is_element_key(k) => collect_text(child, out),
                    _ => {}
                }
            }
        }
    }
}

/// Parses one XML document into a tree. The XML declaration is not kept; callers that need it
/// capture it from the source text.
pub fn parse_document(xml: &str) -> anyhow::Result<Node> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut stack: Vec<(String, Vec<(String, Node)>)> = vec![(String::new(), Vec::new())];
    loop {
        let ev = reader.read_event().context("read xml event")?;
        match ev {
            Event::Eof => break,
            Event::Decl(_) => {}
            Event::Start(s) => {
                let name = bytes_to_string(s.name().as_ref());
                stack.push((name, collect_attrs(&s)?));
            }
            Event::Empty(s) => {
                let name = bytes_to_string(s.name().as_ref());
                let node = Node::Map(collect_attrs(&s)?);
                append_child(current_entries(&mut stack)?, name, node);
            }
            Event::End(e) => {
                let name = bytes_to_string(e.name().as_ref());
                if stack.len() < 2 {
                    return Err(anyhow!("unexpected end tag </{name}>"));
                }
                let (open, entries) = stack.pop().context("element stack")?;
                if open != name {
                    return Err(anyhow!(
                        "mismatched end tag: expected </{open}>, found </{name}>"
                    ));
                }
                append_child(current_entries(&mut stack)?, open, Node::Map(entries));
            }
            Event::Text(t) => {
                let text = t.unescape().context("unescape text")?.into_owned();
                // Whitespace around the root element is not part of the tree.
                if stack.len() == 1 && text.trim().is_empty() {
                    continue;
                }
                current_entries(&mut stack)?.push((TEXT_KEY.to_string(), Node::Text(text)));
            }
            Event::CData(t) => {
                let text = bytes_to_string(t.into_inner());
                current_entries(&mut stack)?.push((CDATA_KEY.to_string(), Node::Text(text)));
            }
            Event::Comment(t) => {
                let text = bytes_to_string(t.into_inner());
                current_entries(&mut stack)?.push((COMMENT_KEY.to_string(), Node::Text(text)));
            }
            Event::PI(t) => {
                let target = bytes_to_string(t.target());
                let content = bytes_to_string(t.content());
                current_entries(&mut stack)?
                    .push((PI_KEY.to_string(), Node::Text(format!("{target}{content}"))));
            }
            Event::DocType(t) => {
                let text = bytes_to_string(t.into_inner());
                current_entries(&mut stack)?.push((DOCTYPE_KEY.to_string(), Node::Text(text)));
            }
        }
    }

    if stack.len() != 1 {
        let open = stack.last().map(|(n, _)| n.as_str()).unwrap_or("");
        return Err(anyhow!("unclosed element <{open}>"));
    }
    let (_, entries) = stack.pop().context("element stack")?;
    Ok(Node::Map(entries))
}

fn current_entries(
    stack: &mut [(String, Vec<(String, Node)>)],
) -> anyhow::Result<&mut Vec<(String, Node)>> {
    stack
        .last_mut()
        .map(|(_, entries)| entries)
        .context("element stack is empty")
}

fn append_child(entries: &mut Vec<(String, Node)>, key: String, node: Node) {
    if let Some((last_key, last)) = entries.last_mut() {
        if *last_key == key && is_element_key(&key) {
            match last {
                Node::Seq(items) => items.push(node),
                _ => {
                    let first = std::mem::replace(last, Node::Text(String::new()));
                    *last = Node::Seq(vec![first, node]);
                }
            }
            return;
        }
    }
    entries.push((key, node));
}

fn collect_attrs(s: &BytesStart<'_>) -> anyhow::Result<Vec<(String, Node)>> {
    let mut attrs = Vec::new();
    for a in s.attributes() {
        let a = a.context("attr")?;
        let key = bytes_to_string(a.key.as_ref());
        // Raw (still escaped) bytes: character references such as `&#13;&#10;` must survive
        // the round trip exactly, and nothing rewrites attribute text.
        let val = bytes_to_string(a.value.as_ref());
        attrs.push((format!("{ATTR_PREFIX}{key}"), Node::Text(val)));
    }
    Ok(attrs)
}

fn bytes_to_string(bytes: impl AsRef<[u8]>) -> String {
    String::from_utf8_lossy(bytes.as_ref()).into_owned()
}

/// Serializes a tree produced by [`parse_document`]. No XML declaration is emitted.
pub fn write_document(root: &Node) -> anyhow::Result<String> {
    let Node::Map(entries) = root else {
        return Err(anyhow!("document root must be an element mapping"));
    };
    let mut out = String::new();
    write_entries(&mut out, entries)?;
    Ok(out)
}

fn write_entries(out: &mut String, entries: &[(String, Node)]) -> anyhow::Result<()> {
    for (key, node) in entries {
        match key.as_str() {
            k if is_structural_attribute_key(k) => {}
            TEXT_KEY => escape_text_into(out, leaf(key, node)?),
            CDATA_KEY => {
                out.push_str("<![CDATA[");
                out.push_str(leaf(key, node)?);
                out.push_str("]]>");
            }
            COMMENT_KEY => {
                out.push_str("<!--");
                out.push_str(leaf(key, node)?);
                out.push_str("-->");
            }
            PI_KEY => {
                out.push_str("<?");
                out.push_str(leaf(key, node)?);
                out.push_str("?>");
            }
            DOCTYPE_KEY => {
                out.push_str("<!DOCTYPE");
                out.push_str(leaf(key, node)?);
                out.push('>');
            }
            k if k.starts_with('#') => return Err(anyhow!("unknown reserved key: {k}")),
            _ => write_element(out, key, node)?,
        }
    }
    Ok(())
}

fn leaf<'a>(key: &str, node: &'a Node) -> anyhow::Result<&'a str> {
    node.as_text()
        .ok_or_else(|| anyhow!("{key} entry must hold text"))
}

fn write_element(out: &mut String, name: &str, node: &Node) -> anyhow::Result<()> {
    match node {
        Node::Seq(items) => {
            for item in items {
                if matches!(item, Node::Seq(_)) {
                    return Err(anyhow!("nested sequence under <{name}>"));
                }
                write_element(out, name, item)?;
            }
        }
        Node::Text(text) => {
            out.push('<');
            out.push_str(name);
            out.push('>');
            escape_text_into(out, text);
            out.push_str("</");
            out.push_str(name);
            out.push('>');
        }
        Node::Map(entries) => {
            out.push('<');
            out.push_str(name);
            for (k, v) in entries {
                if let Some(attr) = k.strip_prefix(ATTR_PREFIX) {
                    // Attribute values are stored raw. Do NOT escape again, except for a bare
                    // `"` that came from a single-quoted source value.
                    let val = v
                        .as_text()
                        .ok_or_else(|| anyhow!("attribute {attr} on <{name}> must hold text"))?;
                    out.push(' ');
                    out.push_str(attr);
                    out.push_str("=\"");
                    for ch in val.chars() {
                        match ch {
                            '"' => out.push_str("&quot;"),
                            _ => out.push(ch),
                        }
                    }
                    out.push('"');
                }
            }
            if entries.iter().all(|(k, _)| is_structural_attribute_key(k)) {
                out.push_str("/>");
            } else {
                out.push('>');
                write_entries(out, entries)?;
                out.push_str("</");
                out.push_str(name);
                out.push('>');
            }
        }
    }
    Ok(())
}

fn escape_text_into(out: &mut String, text: &str) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
}
