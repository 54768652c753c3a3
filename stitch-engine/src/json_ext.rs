//! Performance oriented JSON manipulation.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json_bytes::ByteString;
use serde_json_bytes::Map;
pub use serde_json_bytes::Value;

/// A JSON object.
pub type Object = Map<ByteString, Value>;

macro_rules! extract_key_value_from_object {
    ($object:expr, $key:literal, $pattern:pat => $var:ident) => {{
        match $object.remove($key) {
            Some($pattern) => Ok(Some($var)),
            None | Some(crate::json_ext::Value::Null) => Ok(None),
            _ => Err(concat!("invalid type for key: ", $key)),
        }
    }};
    ($object:expr, $key:literal) => {{
        match $object.remove($key) {
            None | Some(crate::json_ext::Value::Null) => None,
            Some(value) => Some(value),
        }
    }};
}

macro_rules! ensure_object {
    ($value:expr) => {{
        match $value {
            crate::json_ext::Value::Object(o) => Ok(o),
            _ => Err("invalid type, expected an object"),
        }
    }};
}

/// One segment of a [`Path`]: an object key or an array index.
#[derive(Clone, Debug, Eq, Hash, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathElement {
    /// An array index.
    Index(usize),

    /// An object key.
    Key(String),
}

impl fmt::Display for PathElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathElement::Index(index) => write!(f, "{index}"),
            PathElement::Key(key) => f.write_str(key),
        }
    }
}

impl From<&str> for PathElement {
    fn from(key: &str) -> Self {
        PathElement::Key(key.to_string())
    }
}

impl From<usize> for PathElement {
    fn from(index: usize) -> Self {
        PathElement::Index(index)
    }
}

/// A location in a JSON document, serialized like a GraphQL error path (`["a", 0, "b"]`).
///
/// The empty path designates the document root.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Path(pub Vec<PathElement>);

impl Path {
    pub fn empty() -> Path {
        Path(Vec::new())
    }

    /// A path made only of object keys.
    pub fn from_keys<I, S>(keys: I) -> Path
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Path(
            keys.into_iter()
                .map(|key| PathElement::Key(key.into()))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PathElement> {
        self.0.iter()
    }

    pub fn last(&self) -> Option<&PathElement> {
        self.0.last()
    }

    pub fn push(&mut self, element: impl Into<PathElement>) {
        self.0.push(element.into())
    }

    pub fn with_key(&self, key: impl Into<String>) -> Path {
        let mut path = self.clone();
        path.0.push(PathElement::Key(key.into()));
        path
    }

    pub fn with_index(&self, index: usize) -> Path {
        let mut path = self.clone();
        path.0.push(PathElement::Index(index));
        path
    }

    /// Concatenates `other` after this path.
    pub fn join(&self, other: &Path) -> Path {
        let mut path = self.clone();
        path.0.extend(other.0.iter().cloned());
        path
    }

    /// Removes up to `count` trailing segments.
    pub fn drop_last(&self, count: usize) -> Path {
        let keep = self.0.len().saturating_sub(count);
        Path(self.0[..keep].to_vec())
    }

    /// The path without its last segment, `None` for the root path.
    pub fn parent(&self) -> Option<Path> {
        if self.0.is_empty() {
            None
        } else {
            Some(self.drop_last(1))
        }
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, element) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str("/")?;
            }
            write!(f, "{element}")?;
        }
        Ok(())
    }
}

impl From<&str> for Path {
    fn from(s: &str) -> Self {
        Path(
            s.split('/')
                .filter(|segment| !segment.is_empty())
                .map(|segment| match segment.parse::<usize>() {
                    Ok(index) => PathElement::Index(index),
                    Err(_) => PathElement::Key(segment.to_string()),
                })
                .collect(),
        )
    }
}

impl<T> From<Vec<T>> for Path
where
    T: Into<PathElement>,
{
    fn from(elements: Vec<T>) -> Self {
        Path(elements.into_iter().map(Into::into).collect())
    }
}

/// A value inside a response tree together with its location.
#[derive(Clone, Debug, PartialEq)]
pub struct JsonNode<'a> {
    pub path: Path,
    pub value: &'a Value,
}

impl<'a> JsonNode<'a> {
    pub fn new(path: Path, value: &'a Value) -> Self {
        Self { path, value }
    }

    pub fn as_object(&self) -> Option<&'a Object> {
        self.value.as_object()
    }

    /// Resolves the nodes reached by following `query_path` (a list of response keys) from
    /// `root`.
    ///
    /// Lists met along the way are always flattened, nested lists included. A list found at the
    /// very end is only flattened when `flatten_last` is set. Missing keys and `null`s along the
    /// way yield nothing.
    pub fn nodes_at(
        root: &'a Value,
        query_path: &[String],
        flatten_last: bool,
    ) -> Vec<JsonNode<'a>> {
        let mut nodes = Vec::new();
        collect_nodes(root, Path::empty(), query_path, flatten_last, &mut nodes);
        nodes
    }
}

fn collect_nodes<'a>(
    value: &'a Value,
    path: Path,
    rest: &[String],
    flatten_last: bool,
    nodes: &mut Vec<JsonNode<'a>>,
) {
    match value {
        Value::Array(items) if !rest.is_empty() || flatten_last => {
            for (index, item) in items.iter().enumerate() {
                collect_nodes(item, path.with_index(index), rest, flatten_last, nodes);
            }
        }
        _ if rest.is_empty() => nodes.push(JsonNode { path, value }),
        Value::Object(object) => {
            if let Some(child) = object.get(rest[0].as_str()) {
                collect_nodes(
                    child,
                    path.with_key(rest[0].as_str()),
                    &rest[1..],
                    flatten_last,
                    nodes,
                );
            }
        }
        _ => {}
    }
}

/// Extension trait for [`serde_json_bytes::Value`].
pub trait ValueExt {
    /// The value at `path`, if every segment resolves.
    fn get_path<'a>(&'a self, path: &Path) -> Option<&'a Value>;

    /// Mutable access to the value at `path`, if every segment resolves.
    fn get_path_mut<'a>(&'a mut self, path: &Path) -> Option<&'a mut Value>;

    /// Reads `keys` from this value, mapping over every list met on the way.
    ///
    /// Missing keys read as `null`.
    fn select_keys(&self, keys: &[String]) -> Value;
}

impl ValueExt for Value {
    fn get_path<'a>(&'a self, path: &Path) -> Option<&'a Value> {
        let mut current = self;
        for element in path.iter() {
            current = match (current, element) {
                (Value::Object(object), PathElement::Key(key)) => object.get(key.as_str())?,
                (Value::Array(items), PathElement::Index(index)) => items.get(*index)?,
                _ => return None,
            };
        }
        Some(current)
    }

    fn get_path_mut<'a>(&'a mut self, path: &Path) -> Option<&'a mut Value> {
        let mut current = self;
        for element in path.iter() {
            current = match (current, element) {
                (Value::Object(object), PathElement::Key(key)) => {
                    object.get_mut(key.as_str())?
                }
                (Value::Array(items), PathElement::Index(index)) => items.get_mut(*index)?,
                _ => return None,
            };
        }
        Some(current)
    }

    fn select_keys(&self, keys: &[String]) -> Value {
        match (self, keys.split_first()) {
            (value, None) => value.clone(),
            (Value::Array(items), Some(_)) => {
                Value::Array(items.iter().map(|item| item.select_keys(keys)).collect())
            }
            (Value::Object(object), Some((key, rest))) => object
                .get(key.as_str())
                .map(|child| child.select_keys(rest))
                .unwrap_or(Value::Null),
            _ => Value::Null,
        }
    }
}

/// A stable textual key for a JSON value, used to de-duplicate and correlate values.
pub(crate) fn value_key(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| format!("{value:?}"))
}
