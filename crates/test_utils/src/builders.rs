//! Test Data Builders
//!
//! Provides builder patterns for constructing test data with sensible defaults.
//! These builders allow tests to specify only the relevant fields while using
//! defaults for everything else.

use core_kernel::EntityId;
use domain_catalog::{Ban, Media, MediaType};

/// Builder for constructing test media
pub struct TestMediaBuilder {
    id: EntityId,
    media_type: MediaType,
    file_size: i64,
    file_name: String,
    ban_id: Option<EntityId>,
}

impl Default for TestMediaBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestMediaBuilder {
    /// Creates a new builder for an unattached 1 KiB image
    pub fn new() -> Self {
        Self {
            id: EntityId::UNASSIGNED,
            media_type: MediaType::Image,
            file_size: 1024,
            file_name: "photo.png".to_string(),
            ban_id: None,
        }
    }

    pub fn with_id(mut self, id: EntityId) -> Self {
        self.id = id;
        self
    }

    pub fn with_type(mut self, media_type: MediaType) -> Self {
        self.media_type = media_type;
        self
    }

    pub fn with_file_size(mut self, file_size: i64) -> Self {
        self.file_size = file_size;
        self
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = file_name.into();
        self
    }

    /// Attaches the media to a ban
    pub fn for_ban(mut self, ban_id: EntityId) -> Self {
        self.ban_id = Some(ban_id);
        self
    }

    /// Builds the media
    pub fn build(self) -> Media {
        Media {
            id: self.id,
            media_type: self.media_type,
            file_size: self.file_size,
            file_name: self.file_name,
            ban_id: self.ban_id,
            ban: None,
        }
    }
}

/// Builder for constructing test bans
pub struct TestBanBuilder {
    id: EntityId,
    name: String,
}

impl Default for TestBanBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestBanBuilder {
    pub fn new() -> Self {
        Self {
            id: EntityId::UNASSIGNED,
            name: "Sedan".to_string(),
        }
    }

    pub fn with_id(mut self, id: EntityId) -> Self {
        self.id = id;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn build(self) -> Ban {
        Ban {
            id: self.id,
            name: self.name,
            media: Vec::new(),
        }
    }
}
