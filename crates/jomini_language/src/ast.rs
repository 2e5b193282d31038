//! The position-annotated Jomini AST.
//!
//! The tree is uniform: every node is an [`Entry`] of `key op value`, and a
//! [`Value`] is a scalar, a block of entries, or a bare list of scalars. The
//! root of a document is a synthetic keyless [`Block`]. Insertion order of
//! entries is significant (field-order rules, duplicate detection), and
//! duplicate keys are permitted by the data model — semantic uniqueness is a
//! schema concern.

use jomini_base::Span;

use crate::token::Operator;

/// A scalar leaf: identifier, number, quoted string, `yes`/`no`, or a scope
/// reference. Stored as raw text; interpretation is context-dependent.
#[derive(Debug, Clone, PartialEq)]
pub struct Scalar {
    pub text: String,
    pub span: Span,
    /// `true` when the scalar came from a quoted string.
    pub quoted: bool,
}

impl Scalar {
    pub fn new(text: impl Into<String>, span: Span) -> Self {
        Scalar {
            text: text.into(),
            span,
            quoted: false,
        }
    }

    pub fn quoted(text: impl Into<String>, span: Span) -> Self {
        Scalar {
            text: text.into(),
            span,
            quoted: true,
        }
    }

    /// Numeric interpretation, if the text parses as one.
    pub fn as_number(&self) -> Option<f64> {
        self.text.parse().ok()
    }

    /// Boolean interpretation of `yes`/`no`.
    pub fn as_bool(&self) -> Option<bool> {
        match self.text.as_str() {
            "yes" => Some(true),
            "no" => Some(false),
            _ => None,
        }
    }
}

/// An ordered list of child entries with the covering byte range.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Block {
    pub entries: Vec<Entry>,
    pub span: Span,
}

impl Block {
    /// First entry with the given key, if any.
    pub fn get(&self, key: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.key == key)
    }

    /// All entries with the given key, in document order.
    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a Entry> {
        self.entries.iter().filter(move |e| e.key == key)
    }

    /// Scalar text of the first `key = scalar` entry.
    pub fn scalar_of(&self, key: &str) -> Option<&str> {
        match &self.get(key)?.value {
            Value::Scalar(s) => Some(&s.text),
            _ => None,
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}

/// The closed set of value shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(Scalar),
    Block(Block),
    /// A brace block containing only bare scalars (`{ 255 0 0 }`).
    List(Vec<Scalar>),
}

impl Value {
    pub fn span(&self) -> Span {
        match self {
            Value::Scalar(s) => s.span,
            Value::Block(b) => b.span,
            Value::List(items) => items
                .first()
                .map(|f| f.span.merge(items.last().map(|l| l.span).unwrap_or(f.span)))
                .unwrap_or_default(),
        }
    }

    pub fn as_block(&self) -> Option<&Block> {
        match self {
            Value::Block(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Value::Scalar(s) => Some(s),
            _ => None,
        }
    }
}

/// One `key op value` node.
///
/// A bare scalar inside a mixed block is represented as an entry whose value
/// is the scalar itself and whose `has_operator` flag is false.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub key: String,
    pub key_span: Span,
    pub op: Operator,
    /// False for bare list elements, where `=` was assumed.
    pub has_operator: bool,
    pub value: Value,
    /// Covers key through value.
    pub span: Span,
}

impl Entry {
    /// Scalar text of the value, if it is one.
    pub fn scalar_text(&self) -> Option<&str> {
        self.value.as_scalar().map(|s| s.text.as_str())
    }

    pub fn block(&self) -> Option<&Block> {
        self.value.as_block()
    }
}

/// Returns the ancestor chain from the root block down to the innermost entry
/// whose range contains `offset` (root-first). When the offset sits on an
/// entry's key, that entry wins over a child whose block range also starts
/// there.
pub fn node_at<'a>(root: &'a Block, offset: usize) -> Vec<&'a Entry> {
    let mut path = Vec::new();
    let mut current = root;
    'descend: loop {
        for entry in &current.entries {
            if entry.span.contains(offset) {
                path.push(entry);
                if entry.key_span.contains(offset) {
                    // On the key itself: do not descend into the value.
                    break 'descend;
                }
                if let Value::Block(block) = &entry.value {
                    current = block;
                    continue 'descend;
                }
                break 'descend;
            }
        }
        break;
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    #[test]
    fn block_get_finds_first_of_duplicates() {
        let doc = parse("a = 1\na = 2\n");
        let first = doc.root.get("a").expect("entry should exist");
        assert_eq!(first.scalar_text(), Some("1"));
        assert_eq!(doc.root.get_all("a").count(), 2);
    }

    #[test]
    fn scalar_bool_and_number() {
        let s = Scalar::new("yes", Span::new(0, 3));
        assert_eq!(s.as_bool(), Some(true));
        let n = Scalar::new("0.5", Span::new(0, 3));
        assert_eq!(n.as_number(), Some(0.5));
        assert_eq!(n.as_bool(), None);
    }

    #[test]
    fn node_at_returns_root_to_leaf_path() {
        let source = "outer = { inner = { leaf = 1 } }";
        let doc = parse(source);
        let offset = source.find("leaf").unwrap() + 1;
        let path = node_at(&doc.root, offset);
        let keys: Vec<&str> = path.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["outer", "inner", "leaf"]);
    }

    #[test]
    fn node_at_key_position_stops_at_entry() {
        let source = "outer = { inner = 1 }";
        let doc = parse(source);
        let path = node_at(&doc.root, 1); // on "outer"
        assert_eq!(path.len(), 1);
        assert_eq!(path[0].key, "outer");
    }

    #[test]
    fn node_at_outside_everything_is_empty() {
        let source = "a = 1";
        let doc = parse(source);
        assert!(node_at(&doc.root, 40).is_empty());
    }
}
