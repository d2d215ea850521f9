//! Catalog domain entities
//!
//! The persisted types of the catalog application and their mapping
//! metadata. Each entity implements [`core_kernel::Entity`] so any of them can
//! be handed to the generic repository.

mod macros;

pub mod ban;
pub mod city;
pub mod fuel;
pub mod media;

pub use ban::Ban;
pub use city::City;
pub use fuel::Fuel;
pub use media::{Media, MediaType};

use core_kernel::{Entity, EntityMeta};

/// Maximum length of a name column
pub const NAME_MAX_LEN: usize = 100;

/// Maximum length of a media file name
pub const FILE_NAME_MAX_LEN: usize = 255;

/// Mapping metadata of every catalog entity
///
/// Referenced tables come before the tables referencing them, so the list can
/// be used as creation order.
pub fn schema() -> [&'static EntityMeta; 4] {
    [Fuel::meta(), City::meta(), Ban::meta(), Media::meta()]
}
