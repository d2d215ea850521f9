//! Bans and their media gallery

use core_kernel::{Column, ColumnType, CoreError, Entity, EntityId, EntityMeta, Include, Predicate, Record};
use serde::{Deserialize, Serialize};

use crate::media::{Media, MEDIA_META};
use crate::NAME_MAX_LEN;

pub(crate) static BAN_META: EntityMeta = EntityMeta {
    name: "Ban",
    table: "bans",
    key: "id",
    columns: &[Column::required("name", ColumnType::Text).max_len(NAME_MAX_LEN)],
    foreign_keys: &[],
};

/// A vehicle body type listed in the catalog
///
/// `media` is navigation data: it is filled only when the `media` include is
/// requested and is never written back by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ban {
    #[serde(default)]
    pub id: EntityId,
    pub name: String,
    #[serde(default)]
    pub media: Vec<Media>,
}

impl Ban {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: EntityId::UNASSIGNED,
            name: name.into(),
            media: Vec::new(),
        }
    }

    /// Selects bans whose name contains `fragment`
    pub fn name_contains(fragment: impl Into<String>) -> Predicate<Ban> {
        Predicate::contains("name", fragment)
    }

    /// Loads every media row pointing at the ban
    pub fn media() -> Include<Ban> {
        Include::collection("media", &MEDIA_META, "ban_id", attach_media)
    }
}

fn attach_media(ban: &mut Ban, related: &[Record]) -> Result<(), CoreError> {
    ban.media = related
        .iter()
        .map(Media::from_record)
        .collect::<Result<_, _>>()?;
    Ok(())
}

impl Entity for Ban {
    fn meta() -> &'static EntityMeta {
        &BAN_META
    }

    fn id(&self) -> EntityId {
        self.id
    }

    fn set_id(&mut self, id: EntityId) {
        self.id = id;
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with("id", self.id)
            .with("name", self.name.as_str())
    }

    fn from_record(record: &Record) -> Result<Self, CoreError> {
        Ok(Self {
            id: EntityId::new(record.int("id")?),
            name: record.text("name")?,
            media: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_skips_navigation() {
        let mut ban = Ban::new("Sedan");
        ban.media.push(Media::image("front.png", 10));
        let record = ban.to_record();
        assert_eq!(record.len(), 2);
        assert_eq!(Ban::from_record(&record).unwrap().media, Vec::new());
    }

    #[test]
    fn test_media_include_is_valid() {
        assert!(Ban::media().validate().is_ok());
        assert_eq!(Ban::media().target().table, "media");
    }
}
