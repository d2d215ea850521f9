//! Media files attached to bans

use std::fmt;
use std::str::FromStr;

use core_kernel::{
    Column, ColumnType, CoreError, Entity, EntityId, EntityMeta, ForeignKey, Include, Predicate,
    Record,
};
use serde::{Deserialize, Serialize};

use crate::ban::{Ban, BAN_META};
use crate::FILE_NAME_MAX_LEN;

pub(crate) static MEDIA_META: EntityMeta = EntityMeta {
    name: "Media",
    table: "media",
    key: "id",
    columns: &[
        Column::required("media_type", ColumnType::Text),
        Column::required("file_size", ColumnType::Int),
        Column::required("file_name", ColumnType::Text).max_len(FILE_NAME_MAX_LEN),
        Column::optional("ban_id", ColumnType::Int),
    ],
    foreign_keys: &[ForeignKey {
        column: "ban_id",
        references: &BAN_META,
    }],
};

/// Kind of a stored media file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Image,
    Video,
    Document,
}

impl MediaType {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaType::Image => "image",
            MediaType::Video => "video",
            MediaType::Document => "document",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(MediaType::Image),
            "video" => Ok(MediaType::Video),
            "document" => Ok(MediaType::Document),
            other => Err(CoreError::validation(format!("unknown media type '{other}'"))),
        }
    }
}

/// A media file, optionally attached to a ban
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Media {
    #[serde(default)]
    pub id: EntityId,
    pub media_type: MediaType,
    /// Size in bytes
    pub file_size: i64,
    pub file_name: String,
    #[serde(default)]
    pub ban_id: Option<EntityId>,
    /// Loaded through [`Media::ban`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ban: Option<Box<Ban>>,
}

impl Media {
    pub fn new(media_type: MediaType, file_name: impl Into<String>, file_size: i64) -> Self {
        Self {
            id: EntityId::UNASSIGNED,
            media_type,
            file_size,
            file_name: file_name.into(),
            ban_id: None,
            ban: None,
        }
    }

    pub fn image(file_name: impl Into<String>, file_size: i64) -> Self {
        Self::new(MediaType::Image, file_name, file_size)
    }

    /// Attaches the media to a ban by key
    pub fn for_ban(mut self, ban_id: EntityId) -> Self {
        self.ban_id = Some(ban_id);
        self
    }

    pub fn of_type(media_type: MediaType) -> Predicate<Media> {
        Predicate::eq("media_type", media_type.as_str())
    }

    pub fn of_ban(ban_id: EntityId) -> Predicate<Media> {
        Predicate::eq("ban_id", ban_id)
    }

    /// Loads the owning ban
    pub fn ban() -> Include<Media> {
        Include::reference("ban", &BAN_META, "ban_id", attach_ban)
    }
}

fn attach_ban(media: &mut Media, related: &[Record]) -> Result<(), CoreError> {
    media.ban = related
        .first()
        .map(Ban::from_record)
        .transpose()?
        .map(Box::new);
    Ok(())
}

impl Entity for Media {
    fn meta() -> &'static EntityMeta {
        &MEDIA_META
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
            .with("media_type", self.media_type.as_str())
            .with("file_size", self.file_size)
            .with("file_name", self.file_name.as_str())
            .with("ban_id", self.ban_id)
    }

    fn from_record(record: &Record) -> Result<Self, CoreError> {
        Ok(Self {
            id: EntityId::new(record.int("id")?),
            media_type: record.text("media_type")?.parse()?,
            file_size: record.int("file_size")?,
            file_name: record.text("file_name")?,
            ban_id: record.opt_int("ban_id")?.map(EntityId::new),
            ban: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_type_round_trips_as_text() {
        for kind in [MediaType::Image, MediaType::Video, MediaType::Document] {
            assert_eq!(kind.as_str().parse::<MediaType>().unwrap(), kind);
        }
        assert!("gif".parse::<MediaType>().is_err());
    }

    #[test]
    fn test_unknown_media_type_fails_mapping() {
        let record = Media::image("a.png", 1).to_record().with("media_type", "gif");
        assert!(Media::from_record(&record).is_err());
    }

    #[test]
    fn test_detached_media_stores_null_ban() {
        let record = Media::image("a.png", 1).to_record();
        assert!(record.get("ban_id").is_null());
        assert!(record.contains("ban_id"));
    }
}
