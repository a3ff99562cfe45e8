pub mod bitmap;
pub mod geo;
pub mod hash;
pub mod json;
pub mod order_tree;
pub mod sorted_set;

use hash::RedisHash;
use json::JsonNode;
use sorted_set::RedisSortedSet;

/// A value stored under a key. A key's type is fixed until it is deleted.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(Vec<u8>),
    Hash(RedisHash),
    SortedSet(RedisSortedSet),
    Json(JsonNode),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::String(_) => "string",
            Value::Hash(_) => "hash",
            Value::SortedSet(_) => "zset",
            Value::Json(_) => "ReJSON-RL",
        }
    }

    /// Whether an aggregate value has run out of elements. Strings and
    /// documents are never considered empty.
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Hash(h) => h.is_empty(),
            Value::SortedSet(z) => z.is_empty(),
            Value::String(_) | Value::Json(_) => false,
        }
    }

    pub fn has_volatile_fields(&self) -> bool {
        matches!(self, Value::Hash(h) if h.has_volatile_fields())
    }

    pub fn as_string(&self) -> Option<&Vec<u8>> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_string_mut(&mut self) -> Option<&mut Vec<u8>> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_hash_mut(&mut self) -> Option<&mut RedisHash> {
        match self {
            Value::Hash(h) => Some(h),
            _ => None,
        }
    }

    pub fn as_sorted_set_mut(&mut self) -> Option<&mut RedisSortedSet> {
        match self {
            Value::SortedSet(z) => Some(z),
            _ => None,
        }
    }

    pub fn as_json_mut(&mut self) -> Option<&mut JsonNode> {
        match self {
            Value::Json(j) => Some(j),
            _ => None,
        }
    }
}
