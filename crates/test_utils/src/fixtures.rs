//! Pre-built Test Fixtures
//!
//! Provides ready-to-use catalog entities and a small seed data set. The
//! fixtures are fixed values so tests stay predictable.

use core_kernel::EntityId;
use domain_catalog::{Ban, City, Fuel, Media, MediaType};
use infra_db::{DbContext, Repository, RepositoryError};
use serde::Deserialize;
use thiserror::Error;

/// Fixture for fuel test data
pub struct FuelFixtures;

impl FuelFixtures {
    pub fn diesel() -> Fuel {
        Fuel::new("Diesel")
    }

    pub fn petrol() -> Fuel {
        Fuel::new("Petrol")
    }

    /// A fuel whose name exceeds the column limit
    pub fn overlong() -> Fuel {
        Fuel::new("x".repeat(domain_catalog::NAME_MAX_LEN + 1))
    }

    /// A fuel carrying an identifier no store has handed out
    pub fn unknown() -> Fuel {
        Fuel {
            id: EntityId::new(9_999),
            name: "Hydrogen".to_string(),
        }
    }
}

/// Fixture for ban and media test data
pub struct BanFixtures;

impl BanFixtures {
    pub fn sedan() -> Ban {
        Ban::new("Sedan")
    }

    pub fn hatchback() -> Ban {
        Ban::new("Hatchback")
    }

    /// Two images and a video for the ban with `ban_id`
    pub fn gallery(ban_id: EntityId) -> Vec<Media> {
        vec![
            Media::image("front.png", 120_000).for_ban(ban_id),
            Media::image("rear.png", 98_000).for_ban(ban_id),
            Media::new(MediaType::Video, "tour.mp4", 4_500_000).for_ban(ban_id),
        ]
    }
}

/// Seed catalog used by scenario tests
pub const SEED_JSON: &str = r#"{
    "fuels": [{ "name": "Diesel" }, { "name": "Petrol" }, { "name": "Electric" }],
    "cities": [{ "name": "Baku" }, { "name": "Ganja" }, { "name": "Sumgait" }],
    "bans": [{ "name": "Sedan" }, { "name": "Hatchback" }]
}"#;

/// Deserialized seed data set
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogSeed {
    #[serde(default)]
    pub fuels: Vec<Fuel>,
    #[serde(default)]
    pub cities: Vec<City>,
    #[serde(default)]
    pub bans: Vec<Ban>,
}

/// Errors raised while loading seed data
#[derive(Debug, Error)]
pub enum SeedError {
    #[error("invalid seed document: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("seeding {0} hit a commit conflict")]
    Rejected(&'static str),
}

impl CatalogSeed {
    /// Parses the bundled [`SEED_JSON`]
    pub fn standard() -> Result<Self, SeedError> {
        Self::from_json(SEED_JSON)
    }

    pub fn from_json(json: &str) -> Result<Self, SeedError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Inserts every seed entity through the repositories of `context`
    pub fn load(&self, context: &DbContext) -> Result<(), SeedError> {
        insert_all(context, self.fuels.clone(), "fuels")?;
        insert_all(context, self.cities.clone(), "cities")?;
        insert_all(context, self.bans.clone(), "bans")?;
        Ok(())
    }
}

fn insert_all<T: core_kernel::Entity>(
    context: &DbContext,
    entities: Vec<T>,
    table: &'static str,
) -> Result<(), SeedError> {
    let affected = Repository::<T>::new(context.clone()).insert_bulk(entities)?;
    if affected == infra_db::COMMIT_FAILED {
        return Err(SeedError::Rejected(table));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_seed_parses() {
        let seed = CatalogSeed::standard().unwrap();
        assert_eq!(seed.fuels.len(), 3);
        assert_eq!(seed.cities[0].name, "Baku");
        assert!(seed.bans.iter().all(|ban| ban.media.is_empty()));
    }

    #[test]
    fn test_gallery_points_at_ban() {
        let gallery = BanFixtures::gallery(EntityId::new(3));
        assert!(gallery.iter().all(|media| media.ban_id == Some(EntityId::new(3))));
    }
}
