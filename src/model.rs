//! Core data model: primitives, rows, schemas, hierarchical nodes, and the
//! differential change protocol.
//!
//! Mirrors the relational data model every operator in [`crate::operators`]
//! consumes and produces. Nothing here talks to a particular storage engine
//! or wire format — those are collaborators outside this crate's scope.

use indexmap::IndexMap;
use std::fmt;

/// One value in the restricted primitive domain the engine understands.
///
/// `undefined`-equivalents from upstream collaborators are expected to be
/// normalized to [`Primitive::Null`] before a [`Row`] enters the engine —
/// see [`Primitive::normalized`].
#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    /// Not part of the wire-level domain the AST's literals draw from —
    /// only ever produced as the output of an `array` aggregate.
    Array(Vec<Primitive>),
}

impl Primitive {
    /// Collapses any `undefined`-like representation to `Null`. Since Rust
    /// has no `undefined`, this is the identity function for every variant
    /// actually constructible — it exists so call sites that translate from
    /// a dynamically typed source (e.g. JSON) have one obvious place to
    /// route the coercion through.
    pub fn normalized(self) -> Primitive {
        self
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Primitive::Null)
    }

    /// Stable textual encoding used for composite-key hashing and storage
    /// keys. Distinct primitives never collide: each variant is tagged
    /// before its payload is appended.
    pub fn encode(&self) -> String {
        match self {
            Primitive::Null => "n:".to_string(),
            Primitive::Bool(b) => format!("b:{b}"),
            Primitive::Int(i) => format!("i:{i}"),
            Primitive::Float(f) => format!("f:{f}"),
            Primitive::String(s) => format!("s:{s}"),
            Primitive::Array(items) => {
                format!("a:[{}]", items.iter().map(Primitive::encode).collect::<Vec<_>>().join(","))
            }
        }
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Primitive::Null => write!(f, "null"),
            Primitive::Bool(b) => write!(f, "{b}"),
            Primitive::Int(i) => write!(f, "{i}"),
            Primitive::Float(x) => write!(f, "{x}"),
            Primitive::String(s) => write!(f, "{s}"),
            Primitive::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

/// A row: an insertion-ordered mapping from column name to value. Ordered
/// so that iteration order matches the declared schema order rather than
/// an arbitrary hash order.
pub type Row = IndexMap<String, Primitive>;

/// The declared type of a column, used only for `ConfigurationError` /
/// `SchemaError` validation at pipeline-build and first-push time. The
/// engine never coerces values to match a declared type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Bool,
    Int,
    Float,
    String,
    /// Accepts any primitive; used for columns whose upstream type is not
    /// worth narrowing (e.g. synthesized aggregate output columns).
    Any,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSchema {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
}

impl ColumnSchema {
    pub fn new(name: impl Into<String>, column_type: ColumnType, nullable: bool) -> Self {
        ColumnSchema {
            name: name.into(),
            column_type,
            nullable,
        }
    }
}

/// The schema shared by every [`Row`] a [`crate::source::Source`] or
/// operator produces: a typed column list plus a non-empty, always
/// non-null primary key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    pub columns: Vec<ColumnSchema>,
    pub primary_key: Vec<String>,
}

impl Schema {
    pub fn new(columns: Vec<ColumnSchema>, primary_key: Vec<String>) -> Self {
        assert!(
            !primary_key.is_empty(),
            "a schema's primary key must be non-empty"
        );
        Schema {
            columns,
            primary_key,
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }
}

/// A [`Schema`] plus the schemas of every named relationship a Join
/// operator has attached. Nests recursively for multi-level joins.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSchema {
    pub schema: Schema,
    pub relationships: IndexMap<String, NodeSchema>,
}

impl NodeSchema {
    pub fn leaf(schema: Schema) -> Self {
        NodeSchema {
            schema,
            relationships: IndexMap::new(),
        }
    }

    pub fn with_relationship(mut self, name: impl Into<String>, child: NodeSchema) -> Self {
        self.relationships.insert(name.into(), child);
        self
    }
}

/// A boxed, single-consumption stream of [`Node`]s. Iterating it fully is
/// the only way to observe its contents; a consumer that needs to replay
/// a relationship's children must collect it itself.
pub type NodeStream = Box<dyn Iterator<Item = Node>>;

/// Wraps a not-yet-materialized child stream so construction is deferred
/// until the consumer actually iterates the relationship — the producer
/// (a Join) never eagerly pulls a child subtree it wasn't asked for.
///
/// Because the inner closure is `FnOnce`, a [`LazyNodeStream`] can only
/// ever run its producer once, which is exactly the single-consumption
/// guarantee relationships are specified to have.
pub struct LazyNodeStream {
    state: LazyState,
}

enum LazyState {
    Pending(Box<dyn FnOnce() -> NodeStream>),
    Active(NodeStream),
    Done,
}

impl LazyNodeStream {
    pub fn new(produce: impl FnOnce() -> NodeStream + 'static) -> Self {
        LazyNodeStream {
            state: LazyState::Pending(Box::new(produce)),
        }
    }

    /// A relationship stream with no children at all.
    pub fn empty() -> Self {
        LazyNodeStream::new(|| Box::new(std::iter::empty()))
    }
}

impl Iterator for LazyNodeStream {
    type Item = Node;

    fn next(&mut self) -> Option<Node> {
        loop {
            match std::mem::replace(&mut self.state, LazyState::Done) {
                LazyState::Pending(produce) => {
                    self.state = LazyState::Active(produce());
                }
                LazyState::Active(mut inner) => match inner.next() {
                    Some(node) => {
                        self.state = LazyState::Active(inner);
                        return Some(node);
                    }
                    None => return None,
                },
                LazyState::Done => return None,
            }
        }
    }
}

/// The hierarchical output unit: a row plus its named relationships, each
/// a lazy stream of child nodes.
pub struct Node {
    pub row: Row,
    pub relationships: IndexMap<String, NodeStream>,
}

impl Node {
    pub fn new(row: Row) -> Self {
        Node {
            row,
            relationships: IndexMap::new(),
        }
    }

    pub fn with_relationship(
        mut self,
        name: impl Into<String>,
        stream: impl Iterator<Item = Node> + 'static,
    ) -> Self {
        self.relationships.insert(name.into(), Box::new(stream));
        self
    }

    /// Value of a primary-key column; panics if the schema's primary key
    /// names a column the row doesn't carry.
    pub fn pk_value<'a>(&'a self, pk_column: &str) -> &'a Primitive {
        self.row
            .get(pk_column)
            .unwrap_or_else(|| panic!("row missing primary-key column `{pk_column}`"))
    }

    /// Stable encoding of the full primary-key tuple, used to identify a
    /// node across add/remove/child events.
    pub fn pk_encoded(&self, primary_key: &[String]) -> String {
        encode_parts(primary_key.iter().map(|c| self.pk_value(c).encode()))
    }

    /// Duplicate a node for fan-out (e.g. broadcasting one Source push to
    /// several attached outputs, an OR-filter fanning one change into
    /// several branches, or a Join forwarding one child-side change to
    /// several matching parents). Each relationship stream is
    /// single-consumption, so this drains `self`'s copy once, reboxes it
    /// back onto `self` as a plain (no longer lazy) replay, and does the
    /// same recursively for the duplicate — both end up independently
    /// iterable exactly once, yielding the same nodes.
    pub fn duplicate(&mut self) -> Node {
        let mut dup = Node::new(self.row.clone());
        let names: Vec<String> = self.relationships.keys().cloned().collect();
        for name in names {
            let stream = self.relationships.shift_remove(&name).unwrap();
            let mut nodes: Vec<Node> = stream.collect();
            let dup_nodes: Vec<Node> = nodes.iter_mut().map(|n| n.duplicate()).collect();
            self.relationships.insert(name.clone(), Box::new(nodes.into_iter()));
            dup.relationships.insert(name, Box::new(dup_nodes.into_iter()));
        }
        dup
    }
}

/// Joins encoded parts with a separator that cannot appear inside any
/// single part's own encoding (each part is already tagged/escaped by
/// [`Primitive::encode`]), avoiding the classic `"ab" + "c"` vs `"a" +
/// "bc"` composite-key collision.
pub fn encode_parts(parts: impl IntoIterator<Item = String>) -> String {
    parts.into_iter().collect::<Vec<_>>().join("\u{1e}")
}

/// One differential event. `Child` is recursive: a change nested inside a
/// relationship of an existing parent, identified by the parent's row.
pub enum Change {
    Add { node: Node },
    Remove { node: Node },
    Child { row: Row, child: ChildChange },
}

pub struct ChildChange {
    pub relationship_name: String,
    pub change: Box<Change>,
}

impl Change {
    pub fn child(row: Row, relationship_name: impl Into<String>, change: Change) -> Change {
        Change::Child {
            row,
            child: ChildChange {
                relationship_name: relationship_name.into(),
                change: Box::new(change),
            },
        }
    }

    /// Row identifying the node this change concerns, regardless of
    /// variant.
    pub fn subject_row(&self) -> &Row {
        match self {
            Change::Add { node } | Change::Remove { node } => &node.row,
            Change::Child { row, .. } => row,
        }
    }

    /// Duplicate a change for fan-out. See [`Node::duplicate`] for how a
    /// carried relationship survives this.
    pub fn duplicate(&mut self) -> Change {
        match self {
            Change::Add { node } => Change::Add {
                node: node.duplicate(),
            },
            Change::Remove { node } => Change::Remove {
                node: node.duplicate(),
            },
            Change::Child { row, child } => Change::Child {
                row: row.clone(),
                child: ChildChange {
                    relationship_name: child.relationship_name.clone(),
                    change: Box::new(child.change.duplicate()),
                },
            },
        }
    }
}

/// Equality predicate used to narrow `fetch`/`cleanup` to rows matching a
/// single column value — the only constraint shape the engine needs, since
/// joins only ever key on equality.
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub key: String,
    pub value: Primitive,
}

#[derive(Debug, Clone, Default)]
pub struct FetchRequest {
    pub constraint: Option<Constraint>,
}

impl FetchRequest {
    pub fn all() -> Self {
        FetchRequest { constraint: None }
    }

    pub fn constrained(key: impl Into<String>, value: Primitive) -> Self {
        FetchRequest {
            constraint: Some(Constraint {
                key: key.into(),
                value,
            }),
        }
    }
}
