//! Driver Types
//!
//! 드라이버에서 사용하는 값 타입 정의
//!
//! # 식별자 안정성
//!
//! [`Node`]와 [`Relationship`]의 `id`/`element_id`는 서버가 부여하며
//! 한 서버의 수명 동안만 유일합니다. 서버 재시작 후 재사용될 수 있으므로
//! 세션을 넘어 영구 키로 저장하면 안 됩니다.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::{DriverError, DriverResult};
use crate::bolt::packstream::marker::{
    NODE_TAG, PATH_TAG, RELATIONSHIP_TAG, UNBOUND_RELATIONSHIP_TAG,
};
use crate::bolt::packstream::structures::validate_indices;
use crate::bolt::packstream::{
    PackStreamNode, PackStreamPath, PackStreamRelationship, PackStreamStructure,
    PackStreamUnboundRelationship, PackStreamValue,
};

// ============================================================================
// Value - 그래프 값
// ============================================================================

/// 그래프 값 타입
///
/// serde 표현은 untagged입니다. JSON에서 되읽을 때 바이트 배열은
/// 정수 리스트로, 그래프 엔티티는 형태가 일치하는 경우에만 복원됩니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Null
    Null,
    /// Boolean
    Boolean(bool),
    /// Integer (i64)
    Integer(i64),
    /// Float (f64)
    Float(f64),
    /// String
    String(String),
    /// List
    List(Vec<Value>),
    /// Bytes
    Bytes(Vec<u8>),
    /// Node
    Node(Node),
    /// Relationship
    Relationship(Relationship),
    /// UnboundRelationship (경로 내부)
    UnboundRelationship(UnboundRelationship),
    /// Path
    Path(Path),
    /// 알 수 없는 구조체 (시간/공간 타입 등)
    Structure(Structure),
    /// Map
    Map(HashMap<String, Value>),
}

impl Value {
    /// Null 여부
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Boolean으로 변환
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer로 변환
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Float로 변환 (Integer 승격 포함)
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// String으로 변환
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Bytes로 변환
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// List로 변환
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    /// Map으로 변환
    pub fn as_map(&self) -> Option<&HashMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Node로 변환
    pub fn as_node(&self) -> Option<&Node> {
        match self {
            Value::Node(n) => Some(n),
            _ => None,
        }
    }

    /// Relationship으로 변환
    pub fn as_relationship(&self) -> Option<&Relationship> {
        match self {
            Value::Relationship(r) => Some(r),
            _ => None,
        }
    }

    /// Path로 변환
    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Value::Path(p) => Some(p),
            _ => None,
        }
    }

    /// 그래프 엔티티 여부 (요청 파라미터로 보낼 수 없음)
    pub fn is_graph_entity(&self) -> bool {
        matches!(
            self,
            Value::Node(_) | Value::Relationship(_) | Value::UnboundRelationship(_) | Value::Path(_)
        )
    }

    /// 타입 이름
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Boolean(_) => "Boolean",
            Value::Integer(_) => "Integer",
            Value::Float(_) => "Float",
            Value::String(_) => "String",
            Value::Bytes(_) => "Bytes",
            Value::List(_) => "List",
            Value::Map(_) => "Map",
            Value::Node(_) => "Node",
            Value::Relationship(_) => "Relationship",
            Value::UnboundRelationship(_) => "UnboundRelationship",
            Value::Path(_) => "Path",
            Value::Structure(_) => "Structure",
        }
    }

    /// 요청 파라미터로 변환
    ///
    /// 그래프 엔티티는 응답에서만 유효하므로 중첩된 위치까지 검사해 거부합니다.
    pub fn into_parameter(self) -> DriverResult<PackStreamValue> {
        match self {
            Value::List(items) => items
                .into_iter()
                .map(Value::into_parameter)
                .collect::<DriverResult<Vec<_>>>()
                .map(PackStreamValue::List),
            Value::Map(entries) => into_parameters(entries).map(PackStreamValue::Map),
            Value::Structure(s) => Ok(PackStreamValue::Structure(PackStreamStructure::new(
                s.tag,
                s.fields
                    .into_iter()
                    .map(Value::into_parameter)
                    .collect::<DriverResult<Vec<_>>>()?,
            ))),
            v if v.is_graph_entity() => Err(DriverError::encoding(format!(
                "{} cannot be sent as a query parameter",
                v.type_name()
            ))),
            v => Ok(v.into()),
        }
    }
}

/// 파라미터 맵을 와이어 표현으로 변환
pub fn into_parameters(params: HashMap<String, Value>) -> DriverResult<HashMap<String, PackStreamValue>> {
    params
        .into_iter()
        .map(|(k, v)| v.into_parameter().map(|v| (k, v)))
        .collect()
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(fl) => write!(f, "{}", fl),
            Value::String(s) => write!(f, "\"{}\"", s),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Value::List(l) => write!(f, "[{} items]", l.len()),
            Value::Map(m) => write!(f, "{{{} entries}}", m.len()),
            Value::Node(n) => write!(f, "{}", n),
            Value::Relationship(r) => write!(f, "{}", r),
            Value::UnboundRelationship(r) => write!(f, "[:{} id: {}]", r.rel_type, r.id),
            Value::Path(p) => write!(f, "{}", p),
            Value::Structure(s) => write!(f, "<Structure 0x{:02X}: {} fields>", s.tag, s.fields.len()),
        }
    }
}

// From implementations
impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<i8> for Value {
    fn from(v: i8) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<u16> for Value {
    fn from(v: u16) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<u8> for Value {
    fn from(v: u8) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v as f64)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<HashMap<String, T>> for Value {
    fn from(v: HashMap<String, T>) -> Self {
        Value::Map(v.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Value::Null,
        }
    }
}

impl From<Node> for Value {
    fn from(v: Node) -> Self {
        Value::Node(v)
    }
}

impl From<Relationship> for Value {
    fn from(v: Relationship) -> Self {
        Value::Relationship(v)
    }
}

impl From<Path> for Value {
    fn from(v: Path) -> Self {
        Value::Path(v)
    }
}

fn integer_out_of_range(v: impl fmt::Display) -> DriverError {
    DriverError::encoding(format!("Integer {} is outside the 64-bit signed range", v))
}

impl TryFrom<u64> for Value {
    type Error = DriverError;

    fn try_from(v: u64) -> Result<Self, Self::Error> {
        i64::try_from(v).map(Value::Integer).map_err(|_| integer_out_of_range(v))
    }
}

impl TryFrom<i128> for Value {
    type Error = DriverError;

    fn try_from(v: i128) -> Result<Self, Self::Error> {
        i64::try_from(v).map(Value::Integer).map_err(|_| integer_out_of_range(v))
    }
}

impl TryFrom<u128> for Value {
    type Error = DriverError;

    fn try_from(v: u128) -> Result<Self, Self::Error> {
        i64::try_from(v).map(Value::Integer).map_err(|_| integer_out_of_range(v))
    }
}

// ============================================================================
// Node - 그래프 노드
// ============================================================================

/// 그래프 노드
///
/// 서버 상태의 스냅샷이며, 수정하려면 서버에 쿼리를 보내야 합니다.
/// `id`는 한 서버 수명 동안만 유일합니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// 노드 ID
    pub id: i64,
    /// 레이블 (순서 없음, 중복 없음)
    pub labels: BTreeSet<String>,
    /// 속성
    pub properties: HashMap<String, Value>,
    /// 엘리먼트 ID (5.x)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_id: Option<String>,
}

impl Node {
    /// 새 노드 생성
    pub fn new<L, S>(id: i64, labels: L, properties: HashMap<String, Value>) -> Self
    where
        L: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id,
            labels: labels.into_iter().map(Into::into).collect(),
            properties,
            element_id: None,
        }
    }

    /// 레이블 포함 여부
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.contains(label)
    }

    /// 속성 가져오기
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// 속성 가져오기 (타입 변환)
    pub fn get_as<T: TryFrom<Value, Error = DriverError>>(&self, key: &str) -> DriverResult<T> {
        self.properties
            .get(key)
            .cloned()
            .ok_or_else(|| DriverError::type_conversion(format!("Property '{}' not found", key)))
            .and_then(T::try_from)
    }

    fn from_wire(node: PackStreamNode) -> DriverResult<Self> {
        Ok(Self {
            id: node.id,
            labels: node.labels.into_iter().collect(),
            properties: hydrate_map(node.properties)?,
            element_id: node.element_id,
        })
    }

    fn to_wire(&self) -> PackStreamNode {
        PackStreamNode {
            id: self.id,
            labels: self.labels.iter().cloned().collect(),
            properties: wire_map(&self.properties),
            element_id: self.element_id.clone(),
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}", self.id)?;
        for label in &self.labels {
            write!(f, ":{}", label)?;
        }
        write!(f, ")")
    }
}

// ============================================================================
// Relationship - 그래프 관계
// ============================================================================

/// 그래프 관계 (방향 있음)
///
/// 노드와 같이 `id`는 한 서버 수명 동안만 유일합니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    /// 관계 ID
    pub id: i64,
    /// 시작 노드 ID
    pub start_node_id: i64,
    /// 끝 노드 ID
    pub end_node_id: i64,
    /// 타입
    #[serde(rename = "type")]
    pub rel_type: String,
    /// 속성
    pub properties: HashMap<String, Value>,
    /// 엘리먼트 ID (5.x)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_id: Option<String>,
    /// 시작 노드 엘리먼트 ID (5.x)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_node_element_id: Option<String>,
    /// 끝 노드 엘리먼트 ID (5.x)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_node_element_id: Option<String>,
}

impl Relationship {
    /// 새 관계 생성
    pub fn new(
        id: i64,
        start_node_id: i64,
        end_node_id: i64,
        rel_type: impl Into<String>,
        properties: HashMap<String, Value>,
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

    /// 속성 가져오기
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    fn from_wire(rel: PackStreamRelationship) -> DriverResult<Self> {
        Ok(Self {
            id: rel.id,
            start_node_id: rel.start_node_id,
            end_node_id: rel.end_node_id,
            rel_type: rel.rel_type,
            properties: hydrate_map(rel.properties)?,
            element_id: rel.element_id,
            start_node_element_id: rel.start_node_element_id,
            end_node_element_id: rel.end_node_element_id,
        })
    }

    fn to_wire(&self) -> PackStreamRelationship {
        PackStreamRelationship {
            id: self.id,
            start_node_id: self.start_node_id,
            end_node_id: self.end_node_id,
            rel_type: self.rel_type.clone(),
            properties: wire_map(&self.properties),
            element_id: self.element_id.clone(),
            start_node_element_id: self.start_node_element_id.clone(),
            end_node_element_id: self.end_node_element_id.clone(),
        }
    }
}

impl fmt::Display for Relationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({})-[:{}]->({})  [id: {}]",
            self.start_node_id, self.rel_type, self.end_node_id, self.id
        )
    }
}

/// 끝점 없는 관계 (경로 내부 표현)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnboundRelationship {
    /// 관계 ID
    pub id: i64,
    /// 타입
    #[serde(rename = "type")]
    pub rel_type: String,
    /// 속성
    pub properties: HashMap<String, Value>,
    /// 엘리먼트 ID (5.x)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_id: Option<String>,
}

impl UnboundRelationship {
    /// 새 관계 생성
    pub fn new(id: i64, rel_type: impl Into<String>, properties: HashMap<String, Value>) -> Self {
        Self {
            id,
            rel_type: rel_type.into(),
            properties,
            element_id: None,
        }
    }

    /// 두 노드 사이에 묶기
    pub fn bind(&self, start: &Node, end: &Node) -> Relationship {
        Relationship {
            id: self.id,
            start_node_id: start.id,
            end_node_id: end.id,
            rel_type: self.rel_type.clone(),
            properties: self.properties.clone(),
            element_id: self.element_id.clone(),
            start_node_element_id: start.element_id.clone(),
            end_node_element_id: end.element_id.clone(),
        }
    }

    fn from_wire(rel: PackStreamUnboundRelationship) -> DriverResult<Self> {
        Ok(Self {
            id: rel.id,
            rel_type: rel.rel_type,
            properties: hydrate_map(rel.properties)?,
            element_id: rel.element_id,
        })
    }

    fn to_wire(&self) -> PackStreamUnboundRelationship {
        PackStreamUnboundRelationship {
            id: self.id,
            rel_type: self.rel_type.clone(),
            properties: wire_map(&self.properties),
            element_id: self.element_id.clone(),
        }
    }
}

// ============================================================================
// Path - 그래프 경로
// ============================================================================

/// 그래프 경로 (압축 표현)
///
/// 노드/관계 목록과 부호 있는 인덱스 시퀀스로 보관해 끝점 데이터를
/// 중복하지 않습니다. 양수 관계 인덱스는 정방향, 음수는 역방향입니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Path {
    nodes: Vec<Node>,
    relationships: Vec<UnboundRelationship>,
    indices: Vec<i64>,
}

/// 경로의 한 구간
#[derive(Debug, Clone, PartialEq)]
pub struct Segment<'a> {
    /// 구간 시작 노드 (순회 방향 기준)
    pub start: &'a Node,
    /// 실제 방향이 반영된 관계
    pub relationship: Relationship,
    /// 구간 끝 노드 (순회 방향 기준)
    pub end: &'a Node,
}

impl Path {
    /// 새 경로 생성 (인덱스 검증)
    pub fn new(
        nodes: Vec<Node>,
        relationships: Vec<UnboundRelationship>,
        indices: Vec<i64>,
    ) -> DriverResult<Self> {
        validate_indices(nodes.len(), relationships.len(), &indices).map_err(malformed)?;
        Ok(Self {
            nodes,
            relationships,
            indices,
        })
    }

    /// 경로 길이 (관계 수)
    pub fn len(&self) -> usize {
        self.indices.len() / 2
    }

    /// 관계 없는 경로 여부
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// 시작 노드
    pub fn start(&self) -> &Node {
        &self.nodes[0]
    }

    /// 끝 노드
    pub fn end(&self) -> &Node {
        match self.indices.last() {
            Some(&last) => &self.nodes[last as usize],
            None => self.start(),
        }
    }

    /// 순회 순서의 노드 (반복 포함)
    pub fn nodes(&self) -> Vec<&Node> {
        std::iter::once(self.start())
            .chain(self.indices.chunks_exact(2).map(|pair| &self.nodes[pair[1] as usize]))
            .collect()
    }

    /// 순회 순서의 구간
    pub fn segments(&self) -> Vec<Segment<'_>> {
        let mut prev = self.start();
        let mut segments = Vec::with_capacity(self.len());
        for pair in self.indices.chunks_exact(2) {
            let (rel_index, node_index) = (pair[0], pair[1]);
            let next = &self.nodes[node_index as usize];
            let unbound = &self.relationships[rel_index.unsigned_abs() as usize - 1];
            let relationship = if rel_index > 0 {
                unbound.bind(prev, next)
            } else {
                unbound.bind(next, prev)
            };
            segments.push(Segment {
                start: prev,
                relationship,
                end: next,
            });
            prev = next;
        }
        segments
    }

    /// 순회 순서의 관계 (방향 반영)
    pub fn relationships(&self) -> Vec<Relationship> {
        self.segments().into_iter().map(|s| s.relationship).collect()
    }

    fn from_wire(path: PackStreamPath) -> DriverResult<Self> {
        Ok(Self {
            nodes: path.nodes.into_iter().map(Node::from_wire).collect::<DriverResult<_>>()?,
            relationships: path
                .relationships
                .into_iter()
                .map(UnboundRelationship::from_wire)
                .collect::<DriverResult<_>>()?,
            indices: path.indices,
        })
    }

    fn to_wire(&self) -> PackStreamPath {
        PackStreamPath {
            nodes: self.nodes.iter().map(Node::to_wire).collect(),
            relationships: self.relationships.iter().map(UnboundRelationship::to_wire).collect(),
            indices: self.indices.clone(),
        }
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.start())?;
        for segment in self.segments() {
            if segment.relationship.start_node_id == segment.start.id {
                write!(f, "-[:{}]->{}", segment.relationship.rel_type, segment.end)?;
            } else {
                write!(f, "<-[:{}]-{}", segment.relationship.rel_type, segment.end)?;
            }
        }
        Ok(())
    }
}

/// 모델에 없는 구조체 (태그와 필드를 그대로 보존)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Structure {
    /// 구조체 태그
    pub tag: u8,
    /// 필드
    pub fields: Vec<Value>,
}

// ============================================================================
// PackStreamValue conversions
// ============================================================================

fn hydrate_map(map: HashMap<String, PackStreamValue>) -> DriverResult<HashMap<String, Value>> {
    map.into_iter()
        .map(|(k, v)| Value::try_from(v).map(|v| (k, v)))
        .collect()
}

fn wire_map(map: &HashMap<String, Value>) -> HashMap<String, PackStreamValue> {
    map.iter().map(|(k, v)| (k.clone(), v.clone().into())).collect()
}

fn malformed(e: crate::bolt::PackStreamError) -> DriverError {
    DriverError::protocol(e.to_string())
}

/// 응답 값 복원. 형태가 잘못된 그래프 구조체는 프로토콜 에러입니다.
impl TryFrom<PackStreamValue> for Value {
    type Error = DriverError;

    fn try_from(value: PackStreamValue) -> Result<Self, Self::Error> {
        Ok(match value {
            PackStreamValue::Null => Value::Null,
            PackStreamValue::Boolean(b) => Value::Boolean(b),
            PackStreamValue::Integer(i) => Value::Integer(i),
            PackStreamValue::Float(f) => Value::Float(f),
            PackStreamValue::String(s) => Value::String(s),
            PackStreamValue::Bytes(b) => Value::Bytes(b),
            PackStreamValue::List(l) => {
                Value::List(l.into_iter().map(Value::try_from).collect::<DriverResult<_>>()?)
            }
            PackStreamValue::Map(m) => Value::Map(hydrate_map(m)?),
            PackStreamValue::Structure(s) => match s.tag {
                NODE_TAG => {
                    let node = PackStreamNode::from_value(&PackStreamValue::Structure(s)).map_err(malformed)?;
                    Value::Node(Node::from_wire(node)?)
                }
                RELATIONSHIP_TAG => {
                    let rel = PackStreamRelationship::from_value(&PackStreamValue::Structure(s))
                        .map_err(malformed)?;
                    Value::Relationship(Relationship::from_wire(rel)?)
                }
                UNBOUND_RELATIONSHIP_TAG => {
                    let rel = PackStreamUnboundRelationship::from_value(&PackStreamValue::Structure(s))
                        .map_err(malformed)?;
                    Value::UnboundRelationship(UnboundRelationship::from_wire(rel)?)
                }
                PATH_TAG => {
                    let path = PackStreamPath::from_value(&PackStreamValue::Structure(s)).map_err(malformed)?;
                    Value::Path(Path::from_wire(path)?)
                }
                tag => Value::Structure(Structure {
                    tag,
                    fields: s.fields.into_iter().map(Value::try_from).collect::<DriverResult<_>>()?,
                }),
            },
        })
    }
}

/// 무손실 변환. 요청 파라미터에는 [`Value::into_parameter`]를 사용합니다.
impl From<Value> for PackStreamValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => PackStreamValue::Null,
            Value::Boolean(b) => PackStreamValue::Boolean(b),
            Value::Integer(i) => PackStreamValue::Integer(i),
            Value::Float(f) => PackStreamValue::Float(f),
            Value::String(s) => PackStreamValue::String(s),
            Value::Bytes(b) => PackStreamValue::Bytes(b),
            Value::List(l) => PackStreamValue::List(l.into_iter().map(Into::into).collect()),
            Value::Map(m) => PackStreamValue::Map(m.into_iter().map(|(k, v)| (k, v.into())).collect()),
            Value::Node(n) => n.to_wire().to_value(),
            Value::Relationship(r) => r.to_wire().to_value(),
            Value::UnboundRelationship(r) => r.to_wire().to_value(),
            Value::Path(p) => p.to_wire().to_value(),
            Value::Structure(s) => PackStreamValue::Structure(PackStreamStructure::new(
                s.tag,
                s.fields.into_iter().map(Into::into).collect(),
            )),
        }
    }
}

// ============================================================================
// TryFrom implementations
// ============================================================================

fn conversion_error(value: &Value, target: &str) -> DriverError {
    DriverError::type_conversion(format!("Cannot convert {} to {}", value.type_name(), target))
}

impl TryFrom<Value> for bool {
    type Error = DriverError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        value.as_bool().ok_or_else(|| conversion_error(&value, "bool"))
    }
}

impl TryFrom<Value> for i64 {
    type Error = DriverError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        value.as_int().ok_or_else(|| conversion_error(&value, "i64"))
    }
}

impl TryFrom<Value> for i32 {
    type Error = DriverError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        value
            .as_int()
            .and_then(|i| i32::try_from(i).ok())
            .ok_or_else(|| conversion_error(&value, "i32"))
    }
}

impl TryFrom<Value> for f64 {
    type Error = DriverError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        value.as_float().ok_or_else(|| conversion_error(&value, "f64"))
    }
}

impl TryFrom<Value> for String {
    type Error = DriverError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::String(s) => Ok(s),
            other => Err(conversion_error(&other, "String")),
        }
    }
}

impl TryFrom<Value> for Node {
    type Error = DriverError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Node(n) => Ok(n),
            other => Err(conversion_error(&other, "Node")),
        }
    }
}

impl TryFrom<Value> for Relationship {
    type Error = DriverError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Relationship(r) => Ok(r),
            other => Err(conversion_error(&other, "Relationship")),
        }
    }
}

impl TryFrom<Value> for Path {
    type Error = DriverError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Path(p) => Ok(p),
            other => Err(conversion_error(&other, "Path")),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bolt::packstream::{decode, encode};

    fn person(id: i64, name: &str) -> Node {
        Node::new(id, ["Person"], HashMap::from([("name".to_string(), Value::from(name))]))
    }

    fn through_wire(value: Value) -> Value {
        let bytes = encode(&value.into()).unwrap();
        Value::try_from(decode(&bytes).unwrap()).unwrap()
    }

    #[test]
    fn test_value_accessors() {
        assert!(Value::Null.is_null());
        assert_eq!(Value::Boolean(true).as_bool(), Some(true));
        assert_eq!(Value::Integer(42).as_int(), Some(42));
        assert_eq!(Value::Integer(2).as_float(), Some(2.0));
        assert_eq!(Value::String("hello".into()).as_str(), Some("hello"));
        assert_eq!(Value::Bytes(vec![1, 2]).as_bytes(), Some(&[1u8, 2][..]));
        assert_eq!(Value::Float(1.5).as_int(), None);
    }

    #[test]
    fn test_value_from() {
        assert_eq!(Value::from(7i32), Value::Integer(7));
        assert_eq!(Value::from(255u8), Value::Integer(255));
        assert_eq!(Value::from(vec![1i64, 2]), Value::List(vec![1i64.into(), 2i64.into()]));
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from("x"), Value::String("x".into()));
    }

    #[test]
    fn test_wide_integers_are_range_checked() {
        assert_eq!(Value::try_from(5u64).unwrap(), Value::Integer(5));
        assert_eq!(Value::try_from(i64::MIN as i128).unwrap(), Value::Integer(i64::MIN));

        let err = Value::try_from(u64::MAX).unwrap_err();
        assert_eq!(err.kind(), "EncodingError");
        assert!(Value::try_from(i64::MAX as i128 + 1).is_err());
        assert!(Value::try_from(u128::MAX).is_err());
    }

    #[test]
    fn test_value_try_from() {
        assert!(bool::try_from(Value::Boolean(true)).unwrap());
        assert_eq!(i64::try_from(Value::Integer(42)).unwrap(), 42);
        assert_eq!(i32::try_from(Value::Integer(42)).unwrap(), 42);
        assert!(i32::try_from(Value::Integer(i64::MAX)).is_err());
        assert_eq!(String::try_from(Value::from("a")).unwrap(), "a");

        let err = i64::try_from(Value::from("a")).unwrap_err();
        assert_eq!(err.kind(), "TypeConversionError");
    }

    #[test]
    fn test_node_labels_are_a_set() {
        let node = Node::new(1, ["B", "A", "B"], HashMap::new());
        assert_eq!(node.labels.len(), 2);
        assert!(node.has_label("A"));
        assert_eq!(node.to_string(), "(1:A:B)");
    }

    #[test]
    fn test_graph_values_survive_the_wire() {
        let mut alice = person(1, "Alice");
        alice.element_id = Some("4:db:1".into());
        assert_eq!(through_wire(Value::Node(alice.clone())), Value::Node(alice));

        let rel = Relationship::new(9, 1, 2, "KNOWS", HashMap::from([("since".to_string(), Value::from(2020))]));
        assert_eq!(through_wire(Value::Relationship(rel.clone())), Value::Relationship(rel));

        let nested = Value::Map(HashMap::from([
            ("list".to_string(), Value::from(vec![Value::Null, Value::Float(f64::INFINITY)])),
            ("bytes".to_string(), Value::Bytes(vec![0, 255])),
        ]));
        assert_eq!(through_wire(nested.clone()), nested);
    }

    #[test]
    fn test_unknown_structure_is_preserved() {
        let date = Value::Structure(Structure {
            tag: 0x44,
            fields: vec![Value::Integer(19000)],
        });
        assert_eq!(through_wire(date.clone()), date);
    }

    #[test]
    fn test_malformed_graph_structure_is_protocol_error() {
        let bad = PackStreamValue::Structure(PackStreamStructure::new(NODE_TAG, vec![PackStreamValue::Null]));
        assert_eq!(Value::try_from(bad).unwrap_err().kind(), "ProtocolError");
    }

    #[test]
    fn test_path_traversal_directions() {
        // (a)-[:KNOWS]->(b)<-[:LIKES]-(c)
        let a = person(1, "a");
        let b = person(2, "b");
        let c = person(3, "c");
        let path = Path::new(
            vec![a, b, c],
            vec![
                UnboundRelationship::new(10, "KNOWS", HashMap::new()),
                UnboundRelationship::new(11, "LIKES", HashMap::new()),
            ],
            vec![1, 1, -2, 2],
        )
        .unwrap();

        assert_eq!(path.len(), 2);
        assert_eq!(path.start().id, 1);
        assert_eq!(path.end().id, 3);
        assert_eq!(path.nodes().iter().map(|n| n.id).collect::<Vec<_>>(), vec![1, 2, 3]);

        let rels = path.relationships();
        assert_eq!((rels[0].start_node_id, rels[0].end_node_id), (1, 2));
        assert_eq!((rels[1].start_node_id, rels[1].end_node_id), (3, 2));
        assert_eq!(path.to_string(), "(1:Person)-[:KNOWS]->(2:Person)<-[:LIKES]-(3:Person)");

        assert_eq!(through_wire(Value::Path(path.clone())), Value::Path(path));
    }

    #[test]
    fn test_path_rejects_bad_indices() {
        let nodes = vec![person(1, "a")];
        let rels = vec![UnboundRelationship::new(10, "R", HashMap::new())];
        assert!(Path::new(nodes.clone(), rels.clone(), vec![2, 0]).is_err());
        assert!(Path::new(nodes.clone(), rels.clone(), vec![1]).is_err());
        assert!(Path::new(vec![], rels, vec![]).is_err());
        let single = Path::new(nodes, vec![], vec![]).unwrap();
        assert!(single.is_empty());
        assert_eq!(single.end().id, 1);
    }

    #[test]
    fn test_graph_entities_rejected_as_parameters() {
        let ok = Value::from(vec![Value::from(1), Value::from("x")]);
        assert!(ok.into_parameter().is_ok());

        let nested = Value::Map(HashMap::from([(
            "n".to_string(),
            Value::List(vec![Value::Node(person(1, "a"))]),
        )]));
        let err = nested.into_parameter().unwrap_err();
        assert_eq!(err.kind(), "EncodingError");
    }

    #[test]
    fn test_serde_json() {
        let node = person(1, "Alice");
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["labels"], serde_json::json!(["Person"]));
        assert!(json.get("element_id").is_none());

        let value: Value = serde_json::from_str(r#"{"a": [1, 2.5, "x", null, true]}"#).unwrap();
        let list = value.as_map().unwrap()["a"].as_list().unwrap();
        assert_eq!(list[0], Value::Integer(1));
        assert_eq!(list[1], Value::Float(2.5));
        assert!(list[3].is_null());

        let back: Node = serde_json::from_value(json).unwrap();
        assert_eq!(back, node);
    }
}
