//! Query trees.
//!
//! A [`QueryTree`] stores its fields in an arena and addresses them by [`FieldId`]. The parent of a
//! field is recorded when it is inserted, so a tree never needs a parent repair pass after it has
//! been built or rewritten.
//!
//! [`Field`] is the detached, owned form of a subtree. It is how callers build trees and how
//! transforms describe the fields they replace or inject.

use std::collections::BTreeSet;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::json_ext::Object;
use crate::json_ext::Value;

pub mod alias;
pub(crate) mod document;

pub use alias::AliasAssigner;
pub use alias::AliasStrategy;
pub use alias::DeterministicAliases;
pub use alias::RandomAliases;

/// Name of the introspection field returning an object's concrete type.
pub const TYPENAME: &str = "__typename";

/// Marker child inserted by query normalization when every selection of an object field was
/// excluded by `@skip`/`@include`.
pub const SKIP_MARKER: &str = "__skip";

/// The kind of operation a tree belongs to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationKind {
    #[default]
    Query,
    Mutation,
    Subscription,
}

impl OperationKind {
    /// The keyword introducing the operation in a document.
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Query => "query",
            OperationKind::Mutation => "mutation",
            OperationKind::Subscription => "subscription",
        }
    }

    /// The default name of the root type for this operation kind.
    pub fn default_type_name(&self) -> &'static str {
        match self {
            OperationKind::Query => "Query",
            OperationKind::Mutation => "Mutation",
            OperationKind::Subscription => "Subscription",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Index of a field in its [`QueryTree`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldId(usize);

impl FieldId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A field of a [`QueryTree`].
#[derive(Clone, Debug, PartialEq)]
pub struct FieldNode {
    id: FieldId,
    parent: Option<FieldId>,
    children: Vec<FieldId>,
    /// The field name.
    pub name: String,
    /// The response key chosen by the query, if any.
    pub alias: Option<String>,
    /// Resolved argument values.
    pub arguments: Object,
    /// Concrete object types this field may be selected on.
    ///
    /// An empty set means the field is selected unconditionally.
    pub object_types: BTreeSet<String>,
    /// Concrete object types the field's value may have.
    ///
    /// Children selected on every one of them are printed without a type condition. Empty when
    /// unknown, and for leaf fields.
    pub possible_types: BTreeSet<String>,
}

impl FieldNode {
    pub fn id(&self) -> FieldId {
        self.id
    }

    pub fn parent(&self) -> Option<FieldId> {
        self.parent
    }

    pub fn children(&self) -> &[FieldId] {
        &self.children
    }

    /// The key under which the field appears in a response.
    pub fn result_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// A detached field and its subtree.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Field {
    /// The field name.
    pub name: String,
    /// The response key, if different from the name.
    pub alias: Option<String>,
    /// Resolved argument values.
    pub arguments: Object,
    /// Concrete object types this field may be selected on.
    pub object_types: BTreeSet<String>,
    /// Concrete object types the field's value may have.
    pub possible_types: BTreeSet<String>,
    /// Child fields.
    pub children: Vec<Field>,
    origin: Option<FieldId>,
}

impl Field {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// An aliased `__typename` field.
    pub fn typename(alias: impl Into<String>) -> Self {
        Field::new(TYPENAME).with_alias(alias)
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn with_argument(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.arguments.insert(name, value.into());
        self
    }

    pub fn with_arguments(mut self, arguments: Object) -> Self {
        self.arguments = arguments;
        self
    }

    pub fn with_object_types<I, S>(mut self, object_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.object_types = object_types.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_possible_types<I, S>(mut self, possible_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.possible_types = possible_types.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_child(mut self, child: Field) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_children(mut self, children: impl IntoIterator<Item = Field>) -> Self {
        self.children.extend(children);
        self
    }

    /// The key under which the field appears in a response.
    pub fn result_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    /// The field of the tree this one was detached from.
    pub fn origin(&self) -> Option<FieldId> {
        self.origin
    }

    /// Forgets where this subtree came from, so it can seed an unrelated tree.
    pub(crate) fn without_origin(mut self) -> Self {
        self.origin = None;
        self.children = self
            .children
            .into_iter()
            .map(Field::without_origin)
            .collect();
        self
    }
}

/// A query, stored as an arena of fields.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryTree {
    kind: OperationKind,
    nodes: Vec<FieldNode>,
    roots: Vec<FieldId>,
}

impl QueryTree {
    pub fn new(kind: OperationKind) -> Self {
        Self {
            kind,
            nodes: Vec::new(),
            roots: Vec::new(),
        }
    }

    /// A tree whose top-level fields are `roots`.
    ///
    /// Top-level fields selected on no type are placed on the operation's root type.
    pub fn from_fields(kind: OperationKind, roots: impl IntoIterator<Item = Field>) -> Self {
        let mut tree = QueryTree::new(kind);
        for root in roots {
            tree.add_root(root);
        }
        tree
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn roots(&self) -> &[FieldId] {
        &self.roots
    }

    pub fn add_root(&mut self, mut field: Field) -> FieldId {
        if field.object_types.is_empty() {
            field
                .object_types
                .insert(self.kind.default_type_name().to_string());
        }
        self.insert(None, field)
    }

    pub fn add_child(&mut self, parent: FieldId, field: Field) -> FieldId {
        self.insert(Some(parent), field)
    }

    /// Inserts `field` and its subtree, returning the id of `field`.
    pub(crate) fn insert(&mut self, parent: Option<FieldId>, field: Field) -> FieldId {
        let Field {
            name,
            alias,
            arguments,
            object_types,
            possible_types,
            children,
            origin: _,
        } = field;
        let id = FieldId(self.nodes.len());
        self.nodes.push(FieldNode {
            id,
            parent,
            children: Vec::new(),
            name,
            alias,
            arguments,
            object_types,
            possible_types,
        });
        match parent {
            Some(parent) => self.nodes[parent.0].children.push(id),
            None => self.roots.push(id),
        }
        for child in children {
            self.insert(Some(id), child);
        }
        id
    }

    /// The field with the given id.
    ///
    /// Ids are only valid for the tree that produced them.
    pub fn node(&self, id: FieldId) -> &FieldNode {
        &self.nodes[id.0]
    }

    pub fn get(&self, id: FieldId) -> Option<&FieldNode> {
        self.nodes.get(id.0)
    }

    pub fn parent(&self, id: FieldId) -> Option<&FieldNode> {
        self.node(id).parent.map(|parent| self.node(parent))
    }

    pub fn children(&self, id: FieldId) -> impl Iterator<Item = &FieldNode> {
        self.node(id).children.iter().map(|child| self.node(*child))
    }

    /// Number of ancestors of the field.
    pub fn depth(&self, id: FieldId) -> usize {
        let mut depth = 0;
        let mut current = self.node(id).parent;
        while let Some(parent) = current {
            depth += 1;
            current = self.node(parent).parent;
        }
        depth
    }

    /// Response keys from the top-level field down to `id`, inclusive.
    pub fn query_path(&self, id: FieldId) -> Vec<String> {
        let mut path = Vec::new();
        let mut current = Some(id);
        while let Some(field) = current {
            let node = self.node(field);
            path.push(node.result_key().to_string());
            current = node.parent;
        }
        path.reverse();
        path
    }

    /// The field reached by following response keys from the top level.
    pub fn field_at(&self, path: &[&str]) -> Option<&FieldNode> {
        let (first, rest) = path.split_first()?;
        let mut current = self
            .roots
            .iter()
            .map(|root| self.node(*root))
            .find(|node| node.result_key() == *first)?;
        for key in rest {
            current = self.children(current.id).find(|node| node.result_key() == *key)?;
        }
        Some(current)
    }

    /// An owned copy of the subtree rooted at `id`, each field remembering its origin.
    pub fn detach(&self, id: FieldId) -> Field {
        let node = self.node(id);
        Field {
            name: node.name.clone(),
            alias: node.alias.clone(),
            arguments: node.arguments.clone(),
            object_types: node.object_types.clone(),
            possible_types: node.possible_types.clone(),
            children: node.children.iter().map(|child| self.detach(*child)).collect(),
            origin: Some(id),
        }
    }

    /// The subtree rooted at `id` in depth-first pre-order.
    pub fn descendants(&self, id: FieldId) -> Vec<FieldId> {
        let mut visited = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            visited.push(current);
            stack.extend(self.node(current).children.iter().rev());
        }
        visited
    }
}
