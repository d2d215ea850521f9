//! Property-Based Test Generators
//!
//! Provides proptest strategies for generating random catalog entities that
//! respect the column limits, plus `fake`-backed helpers for realistic names.

use domain_catalog::{City, Fuel, Media, MediaType, FILE_NAME_MAX_LEN, NAME_MAX_LEN};
use fake::faker::address::en::CityName;
use fake::faker::filesystem::en::FileName;
use fake::Fake;
use proptest::prelude::*;

/// Strategy for names within the name column limit
pub fn name_strategy() -> impl Strategy<Value = String> {
    proptest::string::string_regex(&format!("[A-Za-z][A-Za-z0-9 -]{{0,{}}}", NAME_MAX_LEN - 1))
        .expect("valid name regex")
}

/// Strategy for unsaved fuels
pub fn fuel_strategy() -> impl Strategy<Value = Fuel> {
    name_strategy().prop_map(Fuel::new)
}

/// Strategy for a set of unsaved fuels with distinct names
pub fn distinct_fuels_strategy(max: usize) -> impl Strategy<Value = Vec<Fuel>> {
    proptest::collection::btree_set(name_strategy(), 0..=max)
        .prop_map(|names| names.into_iter().map(Fuel::new).collect())
}

/// Strategy for media types
pub fn media_type_strategy() -> impl Strategy<Value = MediaType> {
    prop_oneof![
        Just(MediaType::Image),
        Just(MediaType::Video),
        Just(MediaType::Document),
    ]
}

/// Strategy for unsaved, unattached media
pub fn media_strategy() -> impl Strategy<Value = Media> {
    (
        media_type_strategy(),
        "[a-z]{1,20}\\.(png|mp4|pdf)",
        0i64..50_000_000,
    )
        .prop_map(|(media_type, file_name, file_size)| {
            Media::new(media_type, file_name, file_size)
        })
}

/// A city with a realistic random name
pub fn fake_city() -> City {
    City::new(CityName().fake::<String>())
}

/// `count` cities with distinct realistic names
pub fn fake_cities(count: usize) -> Vec<City> {
    let mut names = std::collections::BTreeSet::new();
    while names.len() < count {
        let name: String = CityName().fake();
        names.insert(format!("{} {}", name, names.len()));
    }
    names.into_iter().map(City::new).collect()
}

/// A realistic file name within the file name column limit
pub fn fake_file_name() -> String {
    let name: String = FileName().fake();
    name.chars().take(FILE_NAME_MAX_LEN).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn prop_names_respect_limit(name in name_strategy()) {
            prop_assert!(!name.is_empty());
            prop_assert!(name.chars().count() <= NAME_MAX_LEN);
        }
    }

    #[test]
    fn test_fake_cities_are_distinct() {
        let cities = fake_cities(5);
        assert_eq!(cities.len(), 5);
        let names: std::collections::BTreeSet<_> = cities.iter().map(|city| &city.name).collect();
        assert_eq!(names.len(), 5);
    }

    #[test]
    fn test_fake_file_name_fits_column() {
        assert!(fake_file_name().chars().count() <= FILE_NAME_MAX_LEN);
    }
}
