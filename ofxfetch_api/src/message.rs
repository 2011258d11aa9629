//! Tag/field trees and their SGML text form.
//!
//! A [`Node`] is either an aggregate [`Node::Tag`] holding ordered children or a
//! leaf [`Node::Field`] holding a value. Leaves serialize as `<NAME>VALUE` with no
//! closing tag; aggregates as `<NAME>...</NAME>`. Whether an optional element is
//! present is decided while the tree is built (see [`TagBuilder::opt_field`]);
//! serialization never re-orders children, injects whitespace, or drops a
//! field that was added.

use std::collections::HashSet;
use std::fmt;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Number of decimal digits in a generated identifier.
const UID_DIGITS: usize = 24;

/// A single element of a protocol document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// Aggregate element. Children are serialized in order between `<NAME>` and `</NAME>`.
    Tag {
        name: &'static str,
        children: Vec<Node>,
    },
    /// Leaf element, serialized as `<NAME>VALUE`.
    Field { name: &'static str, value: String },
}

impl Node {
    /// Starts building an aggregate element.
    pub fn tag(name: &'static str) -> TagBuilder {
        TagBuilder {
            name,
            children: Vec::new(),
        }
    }

    /// Creates a leaf element.
    pub fn field(name: &'static str, value: impl Into<String>) -> Node {
        Node::Field {
            name,
            value: value.into(),
        }
    }

    /// Creates a leaf element only when `value` is present and non-empty.
    pub fn opt_field<S: Into<String>>(name: &'static str, value: Option<S>) -> Option<Node> {
        value
            .map(Into::into)
            .filter(|v: &String| !v.is_empty())
            .map(|value| Node::Field { name, value })
    }

    /// Returns the element name.
    pub fn name(&self) -> &'static str {
        match self {
            Node::Tag { name, .. } | Node::Field { name, .. } => name,
        }
    }

    /// Returns `true` when this node serializes to nothing: a tag left without
    /// any field below it. Fields always render, even with an empty value.
    pub fn is_empty(&self) -> bool {
        match self {
            Node::Field { .. } => false,
            Node::Tag { children, .. } => children.iter().all(Node::is_empty),
        }
    }

    /// Appends the canonical text of this node to `out`.
    pub fn write_to(&self, out: &mut String) {
        if self.is_empty() {
            return;
        }
        match self {
            Node::Field { name, value } => {
                if value.is_empty() {
                    tracing::debug!("required field <{}> rendered with an empty value", name);
                }
                out.push('<');
                out.push_str(name);
                out.push('>');
                out.push_str(value);
            }
            Node::Tag { name, children } => {
                out.push('<');
                out.push_str(name);
                out.push('>');
                for child in children {
                    child.write_to(out);
                }
                out.push_str("</");
                out.push_str(name);
                out.push('>');
            }
        }
    }

    /// Serializes this node to its canonical text.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.write_to(&mut out);
        out
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Fluent builder for [`Node::Tag`].
#[derive(Debug)]
pub struct TagBuilder {
    name: &'static str,
    children: Vec<Node>,
}

impl TagBuilder {
    /// Appends a leaf child.
    pub fn field(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.children.push(Node::field(name, value));
        self
    }

    /// Appends a leaf child only when `value` is present and non-empty.
    pub fn opt_field<S: Into<String>>(mut self, name: &'static str, value: Option<S>) -> Self {
        if let Some(node) = Node::opt_field(name, value) {
            self.children.push(node);
        }
        self
    }

    /// Appends a child node.
    pub fn child(mut self, node: impl Into<Node>) -> Self {
        self.children.push(node.into());
        self
    }

    /// Appends a child node when present.
    pub fn opt_child(mut self, node: Option<Node>) -> Self {
        if let Some(node) = node {
            self.children.push(node);
        }
        self
    }

    /// Appends every node from `nodes`, in order.
    pub fn children(mut self, nodes: impl IntoIterator<Item = Node>) -> Self {
        self.children.extend(nodes);
        self
    }

    pub fn build(self) -> Node {
        Node::Tag {
            name: self.name,
            children: self.children,
        }
    }
}

impl From<TagBuilder> for Node {
    fn from(builder: TagBuilder) -> Self {
        builder.build()
    }
}

/// Hands out opaque 24-digit identifiers for transaction and file ids.
///
/// Identifiers are random but tracked, so one generator never repeats itself.
pub struct UidGenerator {
    rng: StdRng,
    issued: HashSet<String>,
}

impl Default for UidGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl UidGenerator {
    /// Creates a generator seeded from OS entropy.
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
            issued: HashSet::new(),
        }
    }

    /// Creates a generator with a fixed seed. Used by tests that need repeatable ids.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            issued: HashSet::new(),
        }
    }

    /// Returns a fresh identifier not previously returned by this generator.
    pub fn next_uid(&mut self) -> String {
        loop {
            let uid: String = (0..UID_DIGITS)
                .map(|_| char::from(b'0' + self.rng.gen_range(0..10u8)))
                .collect();
            if self.issued.insert(uid.clone()) {
                return uid;
            }
        }
    }
}

/// Builds the fixed document preamble. Lines are CRLF-terminated.
pub fn document_header(version: &str, new_file_uid: &str) -> String {
    [
        "OFXHEADER:100".to_string(),
        "DATA:OFXSGML".to_string(),
        format!("VERSION:{}", version),
        "SECURITY:NONE".to_string(),
        "ENCODING:USASCII".to_string(),
        "CHARSET:1252".to_string(),
        "COMPRESSION:NONE".to_string(),
        "OLDFILEUID:NONE".to_string(),
        format!("NEWFILEUID:{}", new_file_uid),
        String::new(),
    ]
    .join("\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_has_no_closing_tag() {
        assert_eq!(Node::field("CODE", "0").render(), "<CODE>0");
    }

    #[test]
    fn tag_wraps_children_in_order() {
        let node = Node::tag("STATUS")
            .field("CODE", "0")
            .field("SEVERITY", "INFO")
            .build();
        assert_eq!(node.render(), "<STATUS><CODE>0<SEVERITY>INFO</STATUS>");
    }

    #[test]
    fn absent_optional_field_leaves_no_trace() {
        let node = Node::tag("SONRQ")
            .field("USERID", "me")
            .opt_field("CLIENTUID", None::<String>)
            .opt_field("APPID", Some(""))
            .build();
        let text = node.render();
        assert_eq!(text, "<SONRQ><USERID>me</SONRQ>");
        assert!(!text.contains("CLIENTUID"));
        assert!(!text.contains("APPID"));
    }

    #[test]
    fn tag_left_without_fields_is_elided() {
        let node = Node::tag("OUTER")
            .child(Node::tag("INNER").opt_field("EMPTY", Some("")))
            .field("KEEP", "1")
            .build();
        assert_eq!(node.render(), "<OUTER><KEEP>1</OUTER>");
    }

    #[test]
    fn required_field_renders_even_when_empty() {
        let node = Node::tag("SONRQ")
            .field("USERID", "me")
            .field("USERPASS", "")
            .build();
        assert_eq!(node.render(), "<SONRQ><USERID>me<USERPASS></SONRQ>");
    }

    #[test]
    fn nested_tags_render_verbatim() {
        let node = Node::tag("A")
            .child(Node::tag("B").field("C", "x y"))
            .field("D", "z")
            .build();
        assert_eq!(node.to_string(), "<A><B><C>x y</B><D>z</A>");
    }

    #[test]
    fn uids_are_24_digits_and_unique() {
        let mut uids = UidGenerator::new();
        let mut seen = HashSet::new();
        for _ in 0..500 {
            let uid = uids.next_uid();
            assert_eq!(uid.len(), 24);
            assert!(uid.chars().all(|c| c.is_ascii_digit()));
            assert!(seen.insert(uid));
        }
    }

    #[test]
    fn seeded_generators_repeat_sequence() {
        let mut a = UidGenerator::seeded(7);
        let mut b = UidGenerator::seeded(7);
        assert_eq!(a.next_uid(), b.next_uid());
    }

    #[test]
    fn header_lines_and_blank_terminator() {
        let header = document_header("102", "123");
        assert!(header.starts_with("OFXHEADER:100\r\nDATA:OFXSGML\r\nVERSION:102\r\n"));
        assert!(header.contains("SECURITY:NONE\r\n"));
        assert!(header.contains("ENCODING:USASCII\r\n"));
        assert!(header.ends_with("NEWFILEUID:123\r\n"));
    }
}
