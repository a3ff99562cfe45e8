use std::collections::HashMap;
use std::collections::hash_map::Entry;

#[derive(Debug, Clone, PartialEq)]
struct Field {
    value: Vec<u8>,
    /// Absolute expiry in milliseconds since UNIX epoch.
    expires_at: Option<u64>,
}

/// Condition flags for the field-expiry commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExpireCondition {
    #[default]
    Always,
    /// Only when the field has no TTL.
    Nx,
    /// Only when the field already has a TTL.
    Xx,
    /// Only when the new expiry is later than the current one.
    Gt,
    /// Only when the new expiry is earlier than the current one.
    Lt,
}

impl ExpireCondition {
    pub fn parse(flag: &str) -> Option<Self> {
        match flag.to_ascii_uppercase().as_str() {
            "NX" => Some(ExpireCondition::Nx),
            "XX" => Some(ExpireCondition::Xx),
            "GT" => Some(ExpireCondition::Gt),
            "LT" => Some(ExpireCondition::Lt),
            _ => None,
        }
    }

    /// Whether a new absolute expiry may replace `current`. A missing TTL
    /// counts as infinitely far in the future, as it does for keys.
    pub fn allows(self, current: Option<u64>, new: u64) -> bool {
        match self {
            ExpireCondition::Always => true,
            ExpireCondition::Nx => current.is_none(),
            ExpireCondition::Xx => current.is_some(),
            ExpireCondition::Gt => current.is_some_and(|c| new > c),
            ExpireCondition::Lt => current.is_none_or(|c| new < c),
        }
    }
}

/// Per-field outcome of `HEXPIRE` and friends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldExpireResult {
    NoSuchField,
    ConditionNotMet,
    Set,
    Deleted,
}

impl FieldExpireResult {
    pub fn code(self) -> i64 {
        match self {
            FieldExpireResult::NoSuchField => 0,
            FieldExpireResult::ConditionNotMet => 0,
            FieldExpireResult::Set => 1,
            FieldExpireResult::Deleted => 2,
        }
    }
}

/// A hash whose fields may each carry their own expiry.
///
/// Elapsed fields are dropped by [`RedisHash::purge_expired`], which the
/// keyspace runs every time it hands the hash to a command. The hash itself
/// stays in place even if that leaves it empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RedisHash {
    fields: HashMap<Vec<u8>, Field>,
    volatile: usize,
}

impl RedisHash {
    pub fn new() -> Self {
        RedisHash::default()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Whether any field carries a TTL.
    pub fn has_volatile_fields(&self) -> bool {
        self.volatile > 0
    }

    pub fn purge_expired(&mut self, now: u64) -> usize {
        if self.volatile == 0 {
            return 0;
        }
        let before = self.fields.len();
        self.fields
            .retain(|_, f| !f.expires_at.is_some_and(|exp| now >= exp));
        let removed = before - self.fields.len();
        self.volatile -= removed;
        removed
    }

    pub fn get(&self, field: &[u8]) -> Option<&[u8]> {
        self.fields.get(field).map(|f| f.value.as_slice())
    }

    pub fn exists(&self, field: &[u8]) -> bool {
        self.fields.contains_key(field)
    }

    /// Set a field, clearing any TTL it had. Returns true if the field is new.
    pub fn set(&mut self, field: &[u8], value: Vec<u8>) -> bool {
        let new = Field {
            value,
            expires_at: None,
        };
        match self.fields.insert(field.to_vec(), new) {
            Some(old) => {
                if old.expires_at.is_some() {
                    self.volatile -= 1;
                }
                false
            }
            None => true,
        }
    }

    pub fn setnx(&mut self, field: &[u8], value: Vec<u8>) -> bool {
        match self.fields.entry(field.to_vec()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(e) => {
                e.insert(Field {
                    value,
                    expires_at: None,
                });
                true
            }
        }
    }

    pub fn del(&mut self, field: &[u8]) -> bool {
        match self.fields.remove(field) {
            Some(f) => {
                if f.expires_at.is_some() {
                    self.volatile -= 1;
                }
                true
            }
            None => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &[u8])> {
        self.fields
            .iter()
            .map(|(k, f)| (k.as_slice(), f.value.as_slice()))
    }

    /// Replace a field's value in place, keeping its TTL.
    fn update_value(&mut self, field: &[u8], value: Vec<u8>) {
        match self.fields.get_mut(field) {
            Some(f) => f.value = value,
            None => {
                self.set(field, value);
            }
        }
    }

    pub fn incr_by(&mut self, field: &[u8], delta: i64) -> Result<i64, &'static str> {
        let current = match self.get(field) {
            Some(v) => std::str::from_utf8(v)
                .ok()
                .and_then(|s| s.parse::<i64>().ok())
                .ok_or("hash value is not an integer")?,
            None => 0,
        };
        let new_val = current
            .checked_add(delta)
            .ok_or("increment or decrement would overflow")?;
        self.update_value(field, new_val.to_string().into_bytes());
        Ok(new_val)
    }

    pub fn incr_by_float(&mut self, field: &[u8], delta: f64) -> Result<f64, &'static str> {
        let current = match self.get(field) {
            Some(v) => std::str::from_utf8(v)
                .ok()
                .and_then(|s| s.trim().parse::<f64>().ok())
                .filter(|f| !f.is_nan())
                .ok_or("hash value is not a float")?,
            None => 0.0,
        };
        let new_val = current + delta;
        if !new_val.is_finite() {
            return Err("increment would produce NaN or Infinity");
        }
        self.update_value(field, crate::reply::format_double(new_val).into_bytes());
        Ok(new_val)
    }

    /// Apply an absolute expiry to one field. An expiry at or before `now`
    /// deletes the field immediately.
    pub fn expire_field(
        &mut self,
        field: &[u8],
        at: u64,
        condition: ExpireCondition,
        now: u64,
    ) -> FieldExpireResult {
        let Some(f) = self.fields.get_mut(field) else {
            return FieldExpireResult::NoSuchField;
        };
        if !condition.allows(f.expires_at, at) {
            return FieldExpireResult::ConditionNotMet;
        }
        if at <= now {
            self.del(field);
            return FieldExpireResult::Deleted;
        }
        if f.expires_at.replace(at).is_none() {
            self.volatile += 1;
        }
        FieldExpireResult::Set
    }

    /// Absolute expiry of a field. Outer None means the field is absent.
    pub fn field_expiry(&self, field: &[u8]) -> Option<Option<u64>> {
        self.fields.get(field).map(|f| f.expires_at)
    }

    /// Remove a field's TTL. Returns None if the field is absent,
    /// otherwise whether a TTL was removed.
    pub fn persist_field(&mut self, field: &[u8]) -> Option<bool> {
        let f = self.fields.get_mut(field)?;
        let had = f.expires_at.take().is_some();
        if had {
            self.volatile -= 1;
        }
        Some(had)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_overwrite_clears_ttl() {
        let mut h = RedisHash::new();
        assert!(h.set(b"f", b"1".to_vec()));
        assert_eq!(h.expire_field(b"f", 10_000, ExpireCondition::Always, 0), FieldExpireResult::Set);
        assert!(h.has_volatile_fields());
        assert!(!h.set(b"f", b"2".to_vec()));
        assert_eq!(h.field_expiry(b"f"), Some(None));
        assert!(!h.has_volatile_fields());
    }

    #[test]
    fn test_purge_leaves_siblings() {
        let mut h = RedisHash::new();
        h.set(b"a", b"1".to_vec());
        h.set(b"b", b"2".to_vec());
        h.expire_field(b"a", 100, ExpireCondition::Always, 0);
        assert_eq!(h.purge_expired(99), 0);
        assert_eq!(h.purge_expired(100), 1);
        assert_eq!(h.get(b"b"), Some(b"2".as_slice()));
        assert!(!h.exists(b"a"));
    }

    #[test]
    fn test_purge_can_empty_the_hash() {
        let mut h = RedisHash::new();
        h.set(b"a", b"1".to_vec());
        h.expire_field(b"a", 5, ExpireCondition::Always, 0);
        h.purge_expired(10);
        assert!(h.is_empty());
    }

    #[test]
    fn test_expire_conditions() {
        let mut h = RedisHash::new();
        h.set(b"f", b"v".to_vec());
        assert_eq!(h.expire_field(b"f", 500, ExpireCondition::Xx, 0), FieldExpireResult::ConditionNotMet);
        assert_eq!(h.expire_field(b"f", 500, ExpireCondition::Gt, 0), FieldExpireResult::ConditionNotMet);
        assert_eq!(h.expire_field(b"f", 500, ExpireCondition::Lt, 0), FieldExpireResult::Set);
        assert_eq!(h.expire_field(b"f", 600, ExpireCondition::Nx, 0), FieldExpireResult::ConditionNotMet);
        assert_eq!(h.expire_field(b"f", 600, ExpireCondition::Gt, 0), FieldExpireResult::Set);
        assert_eq!(h.expire_field(b"missing", 600, ExpireCondition::Always, 0), FieldExpireResult::NoSuchField);
    }

    #[test]
    fn test_past_expiry_deletes_field() {
        let mut h = RedisHash::new();
        h.set(b"f", b"v".to_vec());
        assert_eq!(h.expire_field(b"f", 10, ExpireCondition::Always, 10), FieldExpireResult::Deleted);
        assert!(h.is_empty());
    }

    #[test]
    fn test_persist_field() {
        let mut h = RedisHash::new();
        h.set(b"f", b"v".to_vec());
        assert_eq!(h.persist_field(b"f"), Some(false));
        h.expire_field(b"f", 100, ExpireCondition::Always, 0);
        assert_eq!(h.persist_field(b"f"), Some(true));
        assert_eq!(h.persist_field(b"nope"), None);
    }

    #[test]
    fn test_incr_keeps_ttl() {
        let mut h = RedisHash::new();
        h.set(b"n", b"5".to_vec());
        h.expire_field(b"n", 100, ExpireCondition::Always, 0);
        assert_eq!(h.incr_by(b"n", 3), Ok(8));
        assert_eq!(h.field_expiry(b"n"), Some(Some(100)));
        assert_eq!(h.incr_by(b"n", i64::MAX), Err("increment or decrement would overflow"));
    }

    #[test]
    fn test_incr_by_float() {
        let mut h = RedisHash::new();
        assert_eq!(h.incr_by_float(b"f", 1.5), Ok(1.5));
        assert_eq!(h.incr_by_float(b"f", 1.5), Ok(3.0));
        assert_eq!(h.get(b"f"), Some(b"3".as_slice()));
        h.set(b"s", b"abc".to_vec());
        assert!(h.incr_by_float(b"s", 1.0).is_err());
    }
}
