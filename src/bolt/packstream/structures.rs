//! Graph structures carried in PackStream.
//!
//! Protocol 4.x sends integer ids only. 5.x appends string element ids to
//! every entity; both shapes are accepted on decode and the encoder emits
//! the 5.x shape whenever an element id is present.

use std::collections::HashMap;

use super::marker::*;
use super::types::{PackStreamStructure, PackStreamValue};
use super::PackStreamError;

/// Typed field access over a structure, producing uniform errors.
struct Fields<'a> {
    kind: &'static str,
    fields: &'a [PackStreamValue],
}

impl<'a> Fields<'a> {
    fn open(
        value: &'a PackStreamValue,
        tag: u8,
        kind: &'static str,
        arities: &[usize],
    ) -> Result<Self, PackStreamError> {
        let s = value
            .as_structure()
            .ok_or_else(|| invalid(format!("expected {} structure, got {}", kind, value.type_name())))?;
        if s.tag != tag {
            return Err(invalid(format!(
                "expected {} tag 0x{:02X}, got 0x{:02X}",
                kind, tag, s.tag
            )));
        }
        if !arities.contains(&s.fields.len()) {
            return Err(invalid(format!(
                "{} has {} fields, expected one of {:?}",
                kind,
                s.fields.len(),
                arities
            )));
        }
        Ok(Self {
            kind,
            fields: &s.fields,
        })
    }

    fn int(&self, idx: usize, name: &str) -> Result<i64, PackStreamError> {
        self.fields[idx]
            .as_int()
            .ok_or_else(|| self.wrong_type(name, "integer"))
    }

    fn string(&self, idx: usize, name: &str) -> Result<String, PackStreamError> {
        self.fields[idx]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| self.wrong_type(name, "string"))
    }

    fn optional_string(&self, idx: usize, name: &str) -> Result<Option<String>, PackStreamError> {
        match self.fields.get(idx) {
            None => Ok(None),
            Some(_) => self.string(idx, name).map(Some),
        }
    }

    fn map(&self, idx: usize, name: &str) -> Result<HashMap<String, PackStreamValue>, PackStreamError> {
        self.fields[idx]
            .as_map()
            .cloned()
            .ok_or_else(|| self.wrong_type(name, "map"))
    }

    fn list(&self, idx: usize, name: &str) -> Result<&'a [PackStreamValue], PackStreamError> {
        self.fields[idx]
            .as_list()
            .ok_or_else(|| self.wrong_type(name, "list"))
    }

    fn wrong_type(&self, name: &str, expected: &str) -> PackStreamError {
        invalid(format!("{} {} must be {}", self.kind, name, expected))
    }
}

fn invalid(msg: String) -> PackStreamError {
    PackStreamError::InvalidStructure(msg)
}

fn push_element_id(fields: &mut Vec<PackStreamValue>, id: &Option<String>) {
    if let Some(id) = id {
        fields.push(PackStreamValue::String(id.clone()));
    }
}

// ============================================================================
// Node
// ============================================================================

/// A Node structure (tag 0x4E).
#[derive(Debug, Clone, PartialEq)]
pub struct PackStreamNode {
    /// Server-assigned id
    pub id: i64,
    /// Labels in wire order
    pub labels: Vec<String>,
    /// Properties
    pub properties: HashMap<String, PackStreamValue>,
    /// Element id (5.x)
    pub element_id: Option<String>,
}

impl PackStreamNode {
    /// Create a node without an element id.
    pub fn new(id: i64, labels: Vec<String>, properties: HashMap<String, PackStreamValue>) -> Self {
        Self {
            id,
            labels,
            properties,
            element_id: None,
        }
    }

    /// Set the element id.
    pub fn with_element_id(mut self, element_id: impl Into<String>) -> Self {
        self.element_id = Some(element_id.into());
        self
    }

    /// Convert to a PackStream structure value.
    pub fn to_value(&self) -> PackStreamValue {
        let mut fields = vec![
            PackStreamValue::Integer(self.id),
            PackStreamValue::string_list(&self.labels),
            PackStreamValue::Map(self.properties.clone()),
        ];
        push_element_id(&mut fields, &self.element_id);
        PackStreamStructure::new(NODE_TAG, fields).into()
    }

    /// Parse from a PackStream value.
    pub fn from_value(value: &PackStreamValue) -> Result<Self, PackStreamError> {
        let f = Fields::open(value, NODE_TAG, "Node", &[3, 4])?;
        let labels = f
            .list(1, "labels")?
            .iter()
            .map(|v| {
                v.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| f.wrong_type("label", "string"))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            id: f.int(0, "id")?,
            labels,
            properties: f.map(2, "properties")?,
            element_id: f.optional_string(3, "element_id")?,
        })
    }
}

// ============================================================================
// Relationship
// ============================================================================

/// A Relationship structure (tag 0x52).
#[derive(Debug, Clone, PartialEq)]
pub struct PackStreamRelationship {
    /// Server-assigned id
    pub id: i64,
    /// Start node id
    pub start_node_id: i64,
    /// End node id
    pub end_node_id: i64,
    /// Relationship type
    pub rel_type: String,
    /// Properties
    pub properties: HashMap<String, PackStreamValue>,
    /// Element id (5.x)
    pub element_id: Option<String>,
    /// Start node element id (5.x)
    pub start_node_element_id: Option<String>,
    /// End node element id (5.x)
    pub end_node_element_id: Option<String>,
}

impl PackStreamRelationship {
    /// Create a relationship without element ids.
    pub fn new(
        id: i64,
        start_node_id: i64,
        end_node_id: i64,
        rel_type: impl Into<String>,
        properties: HashMap<String, PackStreamValue>,
    ) -> Self {
        Self {
            id,
            start_node_id,
            end_node_id,
            rel_type: rel_type.into(),
            properties,
            element_id: None,
            start_node_element_id: None,
            end_node_element_id: None,
        }
    }

    /// Convert to a PackStream structure value.
    pub fn to_value(&self) -> PackStreamValue {
        let mut fields = vec![
            PackStreamValue::Integer(self.id),
            PackStreamValue::Integer(self.start_node_id),
            PackStreamValue::Integer(self.end_node_id),
            PackStreamValue::String(self.rel_type.clone()),
            PackStreamValue::Map(self.properties.clone()),
        ];
        if self.element_id.is_some() {
            for id in [
                &self.element_id,
                &self.start_node_element_id,
                &self.end_node_element_id,
            ] {
                fields.push(PackStreamValue::String(id.clone().unwrap_or_default()));
            }
        }
        PackStreamStructure::new(RELATIONSHIP_TAG, fields).into()
    }

    /// Parse from a PackStream value.
    pub fn from_value(value: &PackStreamValue) -> Result<Self, PackStreamError> {
        let f = Fields::open(value, RELATIONSHIP_TAG, "Relationship", &[5, 8])?;
        Ok(Self {
            id: f.int(0, "id")?,
            start_node_id: f.int(1, "start_node_id")?,
            end_node_id: f.int(2, "end_node_id")?,
            rel_type: f.string(3, "type")?,
            properties: f.map(4, "properties")?,
            element_id: f.optional_string(5, "element_id")?,
            start_node_element_id: f.optional_string(6, "start_node_element_id")?,
            end_node_element_id: f.optional_string(7, "end_node_element_id")?,
        })
    }
}

// ============================================================================
// UnboundRelationship
// ============================================================================

/// A relationship without endpoints (tag 0x72), only found inside paths.
#[derive(Debug, Clone, PartialEq)]
pub struct PackStreamUnboundRelationship {
    /// Server-assigned id
    pub id: i64,
    /// Relationship type
    pub rel_type: String,
    /// Properties
    pub properties: HashMap<String, PackStreamValue>,
    /// Element id (5.x)
    pub element_id: Option<String>,
}

impl PackStreamUnboundRelationship {
    /// Create an unbound relationship.
    pub fn new(id: i64, rel_type: impl Into<String>, properties: HashMap<String, PackStreamValue>) -> Self {
        Self {
            id,
            rel_type: rel_type.into(),
            properties,
            element_id: None,
        }
    }

    /// Convert to a PackStream structure value.
    pub fn to_value(&self) -> PackStreamValue {
        let mut fields = vec![
            PackStreamValue::Integer(self.id),
            PackStreamValue::String(self.rel_type.clone()),
            PackStreamValue::Map(self.properties.clone()),
        ];
        push_element_id(&mut fields, &self.element_id);
        PackStreamStructure::new(UNBOUND_RELATIONSHIP_TAG, fields).into()
    }

    /// Parse from a PackStream value.
    pub fn from_value(value: &PackStreamValue) -> Result<Self, PackStreamError> {
        let f = Fields::open(value, UNBOUND_RELATIONSHIP_TAG, "UnboundRelationship", &[3, 4])?;
        Ok(Self {
            id: f.int(0, "id")?,
            rel_type: f.string(1, "type")?,
            properties: f.map(2, "properties")?,
            element_id: f.optional_string(3, "element_id")?,
        })
    }
}

// ============================================================================
// Path
// ============================================================================

/// A Path structure (tag 0x50) in its compact form.
///
/// `indices` alternates relationship and node indices. A relationship index
/// `i > 0` means `relationships[i - 1]` is walked forward from the previous
/// node; `i < 0` means `relationships[-i - 1]` is walked backward. Node
/// indices point into `nodes`; the walk always starts at `nodes[0]`.
#[derive(Debug, Clone, PartialEq)]
pub struct PackStreamPath {
    /// Distinct nodes
    pub nodes: Vec<PackStreamNode>,
    /// Distinct relationships
    pub relationships: Vec<PackStreamUnboundRelationship>,
    /// Traversal sequence
    pub indices: Vec<i64>,
}

impl PackStreamPath {
    /// Create a path, checking the traversal sequence against the entity lists.
    pub fn new(
        nodes: Vec<PackStreamNode>,
        relationships: Vec<PackStreamUnboundRelationship>,
        indices: Vec<i64>,
    ) -> Result<Self, PackStreamError> {
        validate_indices(nodes.len(), relationships.len(), &indices)?;
        Ok(Self {
            nodes,
            relationships,
            indices,
        })
    }

    /// Convert to a PackStream structure value.
    pub fn to_value(&self) -> PackStreamValue {
        PackStreamStructure::new(
            PATH_TAG,
            vec![
                PackStreamValue::List(self.nodes.iter().map(PackStreamNode::to_value).collect()),
                PackStreamValue::List(
                    self.relationships
                        .iter()
                        .map(PackStreamUnboundRelationship::to_value)
                        .collect(),
                ),
                PackStreamValue::List(self.indices.iter().copied().map(PackStreamValue::Integer).collect()),
            ],
        )
        .into()
    }

    /// Parse from a PackStream value.
    pub fn from_value(value: &PackStreamValue) -> Result<Self, PackStreamError> {
        let f = Fields::open(value, PATH_TAG, "Path", &[3])?;
        let nodes = f
            .list(0, "nodes")?
            .iter()
            .map(PackStreamNode::from_value)
            .collect::<Result<Vec<_>, _>>()?;
        let relationships = f
            .list(1, "relationships")?
            .iter()
            .map(PackStreamUnboundRelationship::from_value)
            .collect::<Result<Vec<_>, _>>()?;
        let indices = f
            .list(2, "indices")?
            .iter()
            .map(|v| v.as_int().ok_or_else(|| f.wrong_type("index", "integer")))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(nodes, relationships, indices)
    }
}

pub(crate) fn validate_indices(node_count: usize, rel_count: usize, indices: &[i64]) -> Result<(), PackStreamError> {
    if node_count == 0 {
        return Err(invalid("Path must contain at least one node".into()));
    }
    if indices.len() % 2 != 0 {
        return Err(invalid(format!(
            "Path index sequence has odd length {}",
            indices.len()
        )));
    }
    for pair in indices.chunks_exact(2) {
        let (rel, node) = (pair[0], pair[1]);
        if rel == 0 || rel.unsigned_abs() as usize > rel_count {
            return Err(invalid(format!("Path relationship index {} out of range", rel)));
        }
        if node < 0 || node as usize >= node_count {
            return Err(invalid(format!("Path node index {} out of range", node)));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bolt::packstream::{decode, encode};

    fn props(key: &str, value: PackStreamValue) -> HashMap<String, PackStreamValue> {
        HashMap::from([(key.to_string(), value)])
    }

    #[test]
    fn test_node_4x_and_5x_shapes() {
        let node = PackStreamNode::new(7, vec!["Person".into()], props("name", "Alice".into()));
        let v4 = node.to_value();
        assert_eq!(v4.as_structure().unwrap().len(), 3);
        assert_eq!(PackStreamNode::from_value(&v4).unwrap(), node);

        let node5 = node.clone().with_element_id("4:abc:7");
        let v5 = node5.to_value();
        assert_eq!(v5.as_structure().unwrap().len(), 4);
        let parsed = PackStreamNode::from_value(&decode(&encode(&v5).unwrap()).unwrap()).unwrap();
        assert_eq!(parsed.element_id.as_deref(), Some("4:abc:7"));
    }

    #[test]
    fn test_node_rejects_bad_shapes() {
        let wrong_arity = PackStreamStructure::new(NODE_TAG, vec![PackStreamValue::Integer(1)]).into();
        assert!(PackStreamNode::from_value(&wrong_arity).is_err());

        let bad_label = PackStreamStructure::new(
            NODE_TAG,
            vec![
                PackStreamValue::Integer(1),
                PackStreamValue::List(vec![PackStreamValue::Integer(3)]),
                PackStreamValue::Map(HashMap::new()),
            ],
        )
        .into();
        let err = PackStreamNode::from_value(&bad_label).unwrap_err();
        assert!(err.to_string().contains("label"));
    }

    #[test]
    fn test_relationship_shapes() {
        let rel = PackStreamRelationship::new(3, 1, 2, "KNOWS", props("since", 1999i64.into()));
        assert_eq!(PackStreamRelationship::from_value(&rel.to_value()).unwrap(), rel);

        let mut rel5 = rel.clone();
        rel5.element_id = Some("5:r:3".into());
        rel5.start_node_element_id = Some("5:n:1".into());
        rel5.end_node_element_id = Some("5:n:2".into());
        let v = rel5.to_value();
        assert_eq!(v.as_structure().unwrap().len(), 8);
        assert_eq!(PackStreamRelationship::from_value(&v).unwrap(), rel5);

        // Wrong tag is rejected.
        assert!(PackStreamUnboundRelationship::from_value(&rel.to_value()).is_err());
    }

    #[test]
    fn test_path_validation() {
        let nodes = vec![
            PackStreamNode::new(1, vec![], HashMap::new()),
            PackStreamNode::new(2, vec![], HashMap::new()),
        ];
        let rels = vec![PackStreamUnboundRelationship::new(10, "KNOWS", HashMap::new())];

        assert!(PackStreamPath::new(nodes.clone(), rels.clone(), vec![1, 1]).is_ok());
        assert!(PackStreamPath::new(nodes.clone(), rels.clone(), vec![-1, 1]).is_ok());
        assert!(PackStreamPath::new(nodes.clone(), rels.clone(), vec![]).is_ok());

        assert!(PackStreamPath::new(nodes.clone(), rels.clone(), vec![1]).is_err());
        assert!(PackStreamPath::new(nodes.clone(), rels.clone(), vec![0, 1]).is_err());
        assert!(PackStreamPath::new(nodes.clone(), rels.clone(), vec![2, 1]).is_err());
        assert!(PackStreamPath::new(nodes.clone(), rels, vec![1, 2]).is_err());
        assert!(PackStreamPath::new(vec![], vec![], vec![]).is_err());
    }

    #[test]
    fn test_path_survives_the_wire() {
        let path = PackStreamPath::new(
            vec![
                PackStreamNode::new(1, vec!["A".into()], HashMap::new()),
                PackStreamNode::new(2, vec!["B".into()], HashMap::new()),
            ],
            vec![PackStreamUnboundRelationship::new(9, "TO", HashMap::new())],
            vec![1, 1, -1, 0],
        )
        .unwrap();
        let bytes = encode(&path.to_value()).unwrap();
        assert_eq!(PackStreamPath::from_value(&decode(&bytes).unwrap()).unwrap(), path);
    }
}
