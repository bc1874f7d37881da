use crate::cache::Record;
use crate::error::{Result, SyncError};
use crate::id::{Id, TempIdMap};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Prefix used when rendering a section for display, and accepted (and
/// stripped) in front of name queries.
pub const SECTION_MARKER: char = '#';

/// Fields every synced entity carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: Id,
    #[serde(default, with = "int_bool", skip_serializing_if = "is_false")]
    pub is_deleted: bool,
    #[serde(default, with = "int_bool", skip_serializing_if = "is_false")]
    pub is_archived: bool,
}

impl Entity {
    pub fn new(id: Id) -> Self {
        Self {
            id,
            is_deleted: false,
            is_archived: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    #[serde(flatten)]
    pub entity: Entity,
    pub name: String,
    #[serde(
        default,
        deserialize_with = "id_or_empty",
        skip_serializing_if = "Option::is_none"
    )]
    pub project_id: Option<Id>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_order: Option<i64>,
    #[serde(default, with = "int_bool", skip_serializing_if = "is_false")]
    pub collapsed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_added: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_archived: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct NewSectionOpts {
    pub parent_id: Option<Id>,
}

impl Section {
    /// Builds a section with a fresh temporary id. Nothing is cached or
    /// queued until the section is passed to `SectionClient::add`.
    pub fn new(name: impl Into<String>, opts: NewSectionOpts) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(SyncError::Validation("name required".to_string()));
        }
        Ok(Self {
            entity: Entity::new(Id::new_temp()),
            name,
            project_id: opts.parent_id,
            section_order: None,
            collapsed: false,
            date_added: None,
            date_archived: None,
        })
    }

    pub fn id(&self) -> &Id {
        &self.entity.id
    }

    pub fn is_deleted(&self) -> bool {
        self.entity.is_deleted
    }

    /// Logical identity: same entity regardless of the other attributes.
    pub fn same_entity(&self, other: &Section, ids: &TempIdMap) -> bool {
        self.entity.id.same_entity(&other.entity.id, ids)
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", SECTION_MARKER, self.name)
    }
}

impl Record for Section {
    fn id(&self) -> &Id {
        &self.entity.id
    }

    fn is_deleted(&self) -> bool {
        self.entity.is_deleted
    }

    fn remap_ids(&mut self, ids: &TempIdMap) -> bool {
        let mut changed = remap(&mut self.entity.id, ids);
        if let Some(project_id) = self.project_id.as_mut() {
            changed |= remap(project_id, ids);
        }
        changed
    }
}

fn remap(id: &mut Id, ids: &TempIdMap) -> bool {
    if !id.is_temporary() {
        return false;
    }
    let resolved = ids.resolve(id);
    if resolved == *id {
        return false;
    }
    *id = resolved;
    true
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// The service sends absent parents as `null` or `""`.
fn id_or_empty<'de, D>(deserializer: D) -> std::result::Result<Option<Id>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    use serde_json::Value;

    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(value) => Id::deserialize(value).map(Some).map_err(D::Error::custom),
    }
}

/// Flags arrive as `0`/`1` or as JSON booleans; they are written back as
/// booleans.
mod int_bool {
    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bool(*value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        struct IntBoolVisitor;

        impl Visitor<'_> for IntBoolVisitor {
            type Value = bool;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a boolean or 0/1")
            }

            fn visit_bool<E: de::Error>(self, v: bool) -> Result<bool, E> {
                Ok(v)
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<bool, E> {
                match v {
                    0 => Ok(false),
                    1 => Ok(true),
                    _ => Err(E::invalid_value(de::Unexpected::Unsigned(v), &self)),
                }
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<bool, E> {
                match v {
                    0 => Ok(false),
                    1 => Ok(true),
                    _ => Err(E::invalid_value(de::Unexpected::Signed(v), &self)),
                }
            }
        }

        deserializer.deserialize_any(IntBoolVisitor)
    }
}
