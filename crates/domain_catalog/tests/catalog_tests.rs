//! Tests for the catalog entity mappings

use core_kernel::{Entity, EntityId, Link, Record};
use domain_catalog::{schema, Ban, City, Fuel, Media, MediaType, FILE_NAME_MAX_LEN, NAME_MAX_LEN};
use proptest::prelude::*;

mod mapping_tests {
    use super::*;

    #[test]
    fn test_fuel_record_round_trip() {
        let mut fuel = Fuel::new("Diesel");
        fuel.set_id(EntityId::new(3));
        let record = fuel.to_record();
        assert_eq!(record.int("id").unwrap(), 3);
        assert_eq!(Fuel::from_record(&record).unwrap(), fuel);
    }

    #[test]
    fn test_missing_name_is_a_mapping_error() {
        let record = Record::new().with("id", 1i64);
        assert!(City::from_record(&record).is_err());
    }

    #[test]
    fn test_media_keeps_optional_ban() {
        let media = Media::new(MediaType::Video, "tour.mp4", 2048).for_ban(EntityId::new(9));
        let back = Media::from_record(&media.to_record()).unwrap();
        assert_eq!(back.ban_id, Some(EntityId::new(9)));
        assert_eq!(back.media_type, MediaType::Video);
        assert!(back.ban.is_none());
    }

    #[test]
    fn test_deserialize_without_id_is_unassigned() {
        let fuel: Fuel = serde_json::from_str(r#"{"name":"Petrol"}"#).unwrap();
        assert_eq!(fuel.id, EntityId::UNASSIGNED);

        let media: Media = serde_json::from_str(
            r#"{"media_type":"document","file_size":12,"file_name":"spec.pdf"}"#,
        )
        .unwrap();
        assert_eq!(media.media_type, MediaType::Document);
        assert_eq!(media.ban_id, None);
    }
}

mod schema_tests {
    use super::*;

    #[test]
    fn test_schema_orders_referenced_tables_first() {
        let tables: Vec<_> = schema().iter().map(|meta| meta.table).collect();
        assert_eq!(tables, vec!["fuels", "cities", "bans", "media"]);
    }

    #[test]
    fn test_column_limits() {
        let name = Fuel::meta().column("name").unwrap();
        assert_eq!(name.max_len, Some(NAME_MAX_LEN));
        assert!(name.unique);
        assert!(!Ban::meta().column("name").unwrap().unique);
        assert_eq!(
            Media::meta().column("file_name").unwrap().max_len,
            Some(FILE_NAME_MAX_LEN)
        );
        assert!(Media::meta().column("ban_id").unwrap().nullable);
    }

    #[test]
    fn test_media_references_bans() {
        let foreign_key = Media::meta().foreign_keys[0];
        assert_eq!(foreign_key.column, "ban_id");
        assert_eq!(foreign_key.references, Ban::meta());
    }
}

mod include_tests {
    use super::*;

    #[test]
    fn test_ban_media_is_collection() {
        assert_eq!(Ban::media().link(), Link::Collection { foreign_key: "ban_id" });
        assert!(Ban::media().validate().is_ok());
    }

    #[test]
    fn test_media_ban_attaches_first_record() {
        let mut media = Media::image("front.png", 64).for_ban(EntityId::new(2));
        let ban = Record::new().with("id", 2i64).with("name", "Hatchback");
        Media::ban().attach(&mut media, &[ban]).unwrap();
        assert_eq!(media.ban.as_ref().map(|ban| ban.name.as_str()), Some("Hatchback"));

        Media::ban().attach(&mut media, &[]).unwrap();
        assert!(media.ban.is_none());
    }

    #[test]
    fn test_ban_media_attaches_every_record() {
        let mut ban = Ban::new("Coupe");
        let rows = vec![
            Media::image("a.png", 1).for_ban(EntityId::new(1)).to_record().with("id", 1i64),
            Media::image("b.png", 2).for_ban(EntityId::new(1)).to_record().with("id", 2i64),
        ];
        Ban::media().attach(&mut ban, &rows).unwrap();
        assert_eq!(ban.media.len(), 2);
        assert_eq!(ban.media[1].file_name, "b.png");
    }

    #[test]
    fn test_predicate_helpers() {
        assert!(Fuel::named("Diesel").matches(&Fuel::new("Diesel")));
        assert!(!Fuel::named("Diesel").matches(&Fuel::new("Petrol")));
        assert!(Ban::name_contains("dan").matches(&Ban::new("Sedan")));
        let media = Media::image("a.png", 1).for_ban(EntityId::new(4));
        assert!(Media::of_ban(EntityId::new(4)).matches(&media));
        assert!(Media::of_type(MediaType::Image).and(Media::of_ban(EntityId::new(4))).validate().is_ok());
    }
}

proptest! {
    #[test]
    fn prop_city_record_round_trip(id in 1i64..10_000, name in "[A-Za-z ]{1,100}") {
        let mut city = City::new(name);
        city.set_id(EntityId::new(id));
        prop_assert_eq!(City::from_record(&city.to_record()).unwrap(), city);
    }
}
