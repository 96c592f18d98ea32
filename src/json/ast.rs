//! Arena AST for tolerant JSON parsing.
//!
//! Nodes live in a flat `Vec` and refer to each other by [`NodeId`]. Every
//! node records its owning parent explicitly, so attaching a synthesized node
//! is a push plus an index update.

use std::ops::Range;

use serde_json::{Map, Number, Value};

/// Index of a node in a [`JsonDocument`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Object { properties: Vec<NodeId> },
    Array { items: Vec<NodeId> },
    Property {
        key: NodeId,
        value: Option<NodeId>,
        colon_offset: Option<usize>,
    },
    String { value: String },
    Number { value: f64, is_integer: bool },
    Boolean { value: bool },
    Null,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AstNode {
    pub offset: usize,
    pub length: usize,
    pub parent: Option<NodeId>,
    pub kind: NodeKind,
}

impl AstNode {
    pub fn span(&self) -> Range<usize> {
        self.offset..self.offset + self.length
    }

    pub fn end(&self) -> usize {
        self.offset + self.length
    }

    pub fn type_name(&self) -> &'static str {
        match &self.kind {
            NodeKind::Object { .. } => "object",
            NodeKind::Array { .. } => "array",
            NodeKind::Property { .. } => "property",
            NodeKind::String { .. } => "string",
            NodeKind::Number { .. } => "number",
            NodeKind::Boolean { .. } => "boolean",
            NodeKind::Null => "null",
        }
    }

    fn contains(&self, offset: usize, include_right_bound: bool) -> bool {
        (offset >= self.offset && offset < self.end())
            || (include_right_bound && offset == self.end())
    }
}

/// Error codes of JSON syntax problems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ErrorCode {
    Undefined = 0,
    InvalidSymbol = 0x101,
    InvalidNumberFormat = 0x102,
    PropertyExpected = 0x201,
    CommaExpected = 0x202,
    ColonExpected = 0x203,
    ValueExpected = 0x204,
    CommaOrCloseBracketExpected = 0x205,
    CommaOrCloseBraceExpected = 0x206,
    TrailingComma = 0x207,
    DuplicateKey = 0x208,
    CommentNotPermitted = 0x209,
    UnexpectedEndOfComment = 0x301,
    UnexpectedEndOfString = 0x302,
    InvalidEscapeCharacter = 0x305,
    InvalidCharacter = 0x306,
}

impl ErrorCode {
    pub fn code(self) -> u32 {
        self as u32
    }
}

/// A syntax problem found while parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    pub span: Range<usize>,
    pub message: String,
    pub code: ErrorCode,
}

/// One step of a JSON path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Index(usize),
}

/// A path step together with the node it reaches, if present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathStep {
    pub segment: Segment,
    pub node: Option<NodeId>,
}

/// Parsed JSON document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JsonDocument {
    nodes: Vec<AstNode>,
    pub(crate) root: Option<NodeId>,
    pub syntax_errors: Vec<SyntaxError>,
    pub comments: Vec<Range<usize>>,
}

impl JsonDocument {
    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &AstNode {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut AstNode {
        &mut self.nodes[id.0]
    }

    /// Append a node to the arena.
    pub fn push(&mut self, node: AstNode) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Children in document order: properties, items, or key then value.
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        match &self.node(id).kind {
            NodeKind::Object { properties } => properties.clone(),
            NodeKind::Array { items } => items.clone(),
            NodeKind::Property { key, value, .. } => {
                let mut children = vec![*key];
                children.extend(value);
                children
            }
            _ => Vec::new(),
        }
    }

    /// Deepest node containing `offset`. Zero-length nodes never match.
    pub fn node_at(&self, offset: usize, include_right_bound: bool) -> Option<NodeId> {
        let root = self.root?;
        self.find_at(root, offset, include_right_bound)
    }

    fn find_at(&self, id: NodeId, offset: usize, include_right_bound: bool) -> Option<NodeId> {
        let node = self.node(id);
        if node.length == 0 || !node.contains(offset, include_right_bound) {
            return None;
        }
        for child in self.children(id) {
            if self.node(child).offset > offset {
                break;
            }
            if let Some(found) = self.find_at(child, offset, include_right_bound) {
                return Some(found);
            }
        }
        Some(id)
    }

    /// Property node for `key` in an object node.
    pub fn property(&self, object: NodeId, key: &str) -> Option<NodeId> {
        let NodeKind::Object { properties } = &self.node(object).kind else {
            return None;
        };
        properties
            .iter()
            .copied()
            .find(|p| self.property_key(*p) == Some(key))
    }

    /// Key text of a property node.
    pub fn property_key(&self, property: NodeId) -> Option<&str> {
        match &self.node(property).kind {
            NodeKind::Property { key, .. } => match &self.node(*key).kind {
                NodeKind::String { value } => Some(value.as_str()),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn property_value(&self, property: NodeId) -> Option<NodeId> {
        match &self.node(property).kind {
            NodeKind::Property { value, .. } => *value,
            _ => None,
        }
    }

    /// Whether `node` is the key of its parent property.
    pub fn is_property_key(&self, node: NodeId) -> bool {
        self.node(node)
            .parent
            .is_some_and(|parent| matches!(self.node(parent).kind, NodeKind::Property { key, .. } if key == node))
    }

    /// Path from the root to `target`.
    ///
    /// A property key resolves to the path of its property.
    pub fn path_to(&self, target: NodeId) -> Vec<PathStep> {
        let mut steps = Vec::new();
        let mut current = target;
        if self.is_property_key(target) {
            if let Some(parent) = self.node(target).parent {
                current = parent;
            }
        }

        loop {
            let node = self.node(current);
            if let NodeKind::Property { value, .. } = &node.kind {
                let key = self.property_key(current).unwrap_or_default().to_string();
                steps.push(PathStep {
                    segment: Segment::Key(key),
                    node: *value,
                });
            }
            let Some(parent) = node.parent else {
                break;
            };
            if let NodeKind::Array { items } = &self.node(parent).kind {
                let index = items.iter().position(|i| *i == current).unwrap_or(0);
                steps.push(PathStep {
                    segment: Segment::Index(index),
                    node: Some(current),
                });
            }
            current = parent;
        }

        steps.reverse();
        steps
    }

    /// Convert a node to a `serde_json::Value`.
    ///
    /// Properties without a value are omitted.
    pub fn to_value(&self, id: NodeId) -> Value {
        match &self.node(id).kind {
            NodeKind::Object { properties } => {
                let mut map = Map::new();
                for property in properties {
                    let (Some(key), Some(value)) =
                        (self.property_key(*property), self.property_value(*property))
                    else {
                        continue;
                    };
                    map.insert(key.to_string(), self.to_value(value));
                }
                Value::Object(map)
            }
            NodeKind::Array { items } => {
                Value::Array(items.iter().map(|item| self.to_value(*item)).collect())
            }
            NodeKind::Property { value, .. } => {
                value.map(|v| self.to_value(v)).unwrap_or(Value::Null)
            }
            NodeKind::String { value } => Value::String(value.clone()),
            NodeKind::Number { value, is_integer } => {
                if *is_integer && value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
                    Value::Number(Number::from(*value as i64))
                } else {
                    Number::from_f64(*value)
                        .map(Value::Number)
                        .unwrap_or(Value::Null)
                }
            }
            NodeKind::Boolean { value } => Value::Bool(*value),
            NodeKind::Null => Value::Null,
        }
    }

    /// The whole document as a value, `None` without a root.
    pub fn root_value(&self) -> Option<Value> {
        self.root.map(|root| self.to_value(root))
    }
}
