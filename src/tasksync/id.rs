//! # Entity Identity
//!
//! Every remote entity is addressed by an [`Id`] that takes one of two forms:
//!
//! - [`Id::Temp`]: a UUID generated on the client the moment an entity is built,
//!   before the server has ever seen it.
//! - [`Id::Permanent`]: the identifier the server issues once it accepts the
//!   creation command.
//!
//! Between those two moments both forms denote the same entity. The server
//! reports the pairing in its `temp_id_mapping`, which the flush collaborator
//! records in a shared [`TempIdMap`]. Identity checks go through that map
//! (see [`Id::same_entity`]) instead of comparing strings, so a cached record
//! still keyed by its temp id matches the server's echo keyed by the permanent
//! one.
//!
//! On the wire both forms are plain strings. Only the exact lowercase
//! hyphenated form a temp id displays as is read back as a temp id. Anything
//! else, including other spellings of a UUID, is a permanent id and keeps its
//! spelling.

use parking_lot::{RwLock, RwLockReadGuard};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Id {
    Temp(Uuid),
    Permanent(String),
}

impl Id {
    /// A fresh temporary id.
    pub fn new_temp() -> Self {
        Id::Temp(Uuid::new_v4())
    }

    pub fn permanent(value: impl Into<String>) -> Self {
        Id::Permanent(value.into())
    }

    pub fn is_temporary(&self) -> bool {
        matches!(self, Id::Temp(_))
    }

    pub fn as_temp(&self) -> Option<Uuid> {
        match self {
            Id::Temp(uuid) => Some(*uuid),
            Id::Permanent(_) => None,
        }
    }

    fn from_wire(s: &str) -> Self {
        match Uuid::try_parse(s) {
            Ok(uuid) if uuid.hyphenated().to_string() == s => Id::Temp(uuid),
            _ => Id::Permanent(s.to_string()),
        }
    }

    /// Whether `self` and `other` denote the same logical entity, taking
    /// temp-to-permanent mappings into account.
    pub fn same_entity(&self, other: &Id, ids: &TempIdMap) -> bool {
        self == other || ids.matcher(self).matches(other)
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Id::Temp(uuid) => write!(f, "{}", uuid.hyphenated()),
            Id::Permanent(value) => f.write_str(value),
        }
    }
}

impl FromStr for Id {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Id::from_wire(s))
    }
}

impl From<Uuid> for Id {
    fn from(uuid: Uuid) -> Self {
        Id::Temp(uuid)
    }
}

impl Serialize for Id {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(IdVisitor { permanent: false })
    }
}

/// Reads a `temp_id_mapping` table. Its values are issued by the server, so
/// they are permanent ids whatever they look like.
pub fn deserialize_mapping<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<HashMap<Uuid, Id>, D::Error> {
    struct PermanentId(Id);

    impl<'de> Deserialize<'de> for PermanentId {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            deserializer
                .deserialize_any(IdVisitor { permanent: true })
                .map(PermanentId)
        }
    }

    let raw = HashMap::<Uuid, PermanentId>::deserialize(deserializer)?;
    Ok(raw.into_iter().map(|(temp, id)| (temp, id.0)).collect())
}

struct IdVisitor {
    permanent: bool,
}

impl Visitor<'_> for IdVisitor {
    type Value = Id;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a string or integer id")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Id, E> {
        if v.is_empty() {
            return Err(E::invalid_value(de::Unexpected::Str(v), &self));
        }
        if self.permanent {
            Ok(Id::Permanent(v.to_string()))
        } else {
            Ok(Id::from_wire(v))
        }
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Id, E> {
        Ok(Id::Permanent(v.to_string()))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Id, E> {
        Ok(Id::Permanent(v.to_string()))
    }
}

/// Temp id to permanent id pairings reported by the server.
///
/// Shared between a client's cache and whatever applies sync responses, so
/// it sits behind a lock and is handed around as `Arc<TempIdMap>`.
#[derive(Debug, Default)]
pub struct TempIdMap {
    inner: RwLock<HashMap<Uuid, String>>,
}

impl TempIdMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `temp` is now known to the server as `permanent`.
    /// Mapping a temp id onto another temp id is refused. Returns whether the
    /// pairing was recorded.
    pub fn insert(&self, temp: Uuid, permanent: &Id) -> bool {
        match permanent {
            Id::Permanent(value) => {
                self.inner.write().insert(temp, value.clone());
                true
            }
            Id::Temp(target) => {
                warn!(%temp, %target, "refusing to map a temp id onto another temp id");
                false
            }
        }
    }

    pub fn get(&self, temp: &Uuid) -> Option<Id> {
        self.inner.read().get(temp).cloned().map(Id::Permanent)
    }

    /// The most permanent form of `id` currently known.
    pub fn resolve(&self, id: &Id) -> Id {
        resolve_with(&self.inner.read(), id)
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Resolves `id` once and holds a read lock for repeated comparisons,
    /// e.g. a linear scan over a cache.
    pub fn matcher(&self, id: &Id) -> IdMatcher<'_> {
        let guard = self.inner.read();
        let key = resolve_with(&guard, id);
        IdMatcher { guard, key }
    }
}

fn resolve_with(map: &HashMap<Uuid, String>, id: &Id) -> Id {
    match id {
        Id::Temp(uuid) => map
            .get(uuid)
            .map(|value| Id::Permanent(value.clone()))
            .unwrap_or_else(|| id.clone()),
        Id::Permanent(_) => id.clone(),
    }
}

pub struct IdMatcher<'a> {
    guard: RwLockReadGuard<'a, HashMap<Uuid, String>>,
    key: Id,
}

impl IdMatcher<'_> {
    pub fn matches(&self, other: &Id) -> bool {
        match other {
            Id::Temp(uuid) => match self.guard.get(uuid) {
                Some(value) => matches!(&self.key, Id::Permanent(key) if key == value),
                None => self.key == *other,
            },
            Id::Permanent(_) => self.key == *other,
        }
    }
}

/// Source of unique tokens for command idempotency keys.
pub trait TokenSource: Send + Sync {
    fn next_token(&self) -> Uuid;
}

/// Random v4 UUIDs. Collisions are negligible for a client's lifetime.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomTokens;

impl TokenSource for RandomTokens {
    fn next_token(&self) -> Uuid {
        Uuid::new_v4()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_ids_are_distinct() {
        let a = Id::new_temp();
        let b = Id::new_temp();
        assert!(a.is_temporary());
        assert_ne!(a, b);
    }

    #[test]
    fn parses_uuid_as_temp_and_other_as_permanent() {
        let uuid = Uuid::new_v4();
        assert_eq!(uuid.to_string().parse::<Id>().unwrap(), Id::Temp(uuid));
        assert_eq!("2203306141".parse::<Id>().unwrap(), Id::permanent("2203306141"));
    }

    #[test]
    fn display_is_plain_string_for_both_forms() {
        let uuid = Uuid::new_v4();
        assert_eq!(Id::Temp(uuid).to_string(), uuid.hyphenated().to_string());
        assert_eq!(Id::permanent("42").to_string(), "42");
    }

    #[test]
    fn deserializes_strings_and_integers() {
        let from_int: Id = serde_json::from_str("7025").unwrap();
        assert_eq!(from_int, Id::permanent("7025"));
        let from_str: Id = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(from_str, Id::permanent("abc"));
        assert!(serde_json::from_str::<Id>("\"\"").is_err());
    }

    #[test]
    fn unmapped_temp_only_matches_itself() {
        let ids = TempIdMap::new();
        let temp = Id::new_temp();
        assert!(temp.same_entity(&temp, &ids));
        assert!(!temp.same_entity(&Id::new_temp(), &ids));
        assert!(!temp.same_entity(&Id::permanent("1"), &ids));
    }

    #[test]
    fn mapped_temp_matches_permanent_both_ways() {
        let ids = TempIdMap::new();
        let uuid = Uuid::new_v4();
        let temp = Id::Temp(uuid);
        let permanent = Id::permanent("99");
        ids.insert(uuid, &permanent);

        assert!(temp.same_entity(&permanent, &ids));
        assert!(permanent.same_entity(&temp, &ids));
        assert!(!temp.same_entity(&Id::permanent("100"), &ids));
        assert_eq!(ids.resolve(&temp), permanent);
    }

    #[test]
    fn insert_refuses_temp_targets() {
        let ids = TempIdMap::new();
        let temp = Uuid::new_v4();
        assert!(!ids.insert(temp, &Id::new_temp()));
        assert!(ids.is_empty());
        assert!(ids.insert(temp, &Id::permanent("7")));
        assert_eq!(ids.get(&temp), Some(Id::permanent("7")));
    }

    #[test]
    fn other_uuid_spellings_stay_permanent_and_round_trip() {
        for raw in [
            "0123456789abcdef0123456789abcdef",
            "A1B2C3D4-E5F6-4789-ABCD-0123456789AB",
            "{a1b2c3d4-e5f6-4789-abcd-0123456789ab}",
            "urn:uuid:a1b2c3d4-e5f6-4789-abcd-0123456789ab",
        ] {
            let id: Id = raw.parse().unwrap();
            assert_eq!(id, Id::permanent(raw));
            assert_eq!(id.to_string(), raw);

            let json: Id = serde_json::from_value(serde_json::json!(raw)).unwrap();
            assert_eq!(json.to_string(), raw);
        }
    }

    #[test]
    fn temp_id_display_round_trips() {
        let temp = Id::new_temp();
        assert_eq!(temp.to_string().parse::<Id>().unwrap(), temp);
    }

    #[test]
    fn mapping_values_are_always_permanent() {
        #[derive(Deserialize)]
        struct Wrapper {
            #[serde(deserialize_with = "deserialize_mapping")]
            mapping: HashMap<Uuid, Id>,
        }

        let temp = Uuid::new_v4();
        let server = Uuid::new_v4().hyphenated().to_string();
        let wrapper: Wrapper = serde_json::from_value(serde_json::json!({
            "mapping": { temp.to_string(): server }
        }))
        .unwrap();
        assert_eq!(wrapper.mapping[&temp], Id::Permanent(server));
    }
}
