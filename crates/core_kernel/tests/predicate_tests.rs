//! Tests for predicates and include paths

use core_kernel::{
    Column, ColumnType, CoreError, Entity, EntityId, EntityMeta, ForeignKey, Include, Predicate,
    Record, Value,
};
use proptest::prelude::*;

static SHELF: EntityMeta = EntityMeta {
    name: "Shelf",
    table: "shelves",
    key: "id",
    columns: &[Column::required("label", ColumnType::Text)],
    foreign_keys: &[],
};

static BOOK: EntityMeta = EntityMeta {
    name: "Book",
    table: "books",
    key: "id",
    columns: &[
        Column::required("title", ColumnType::Text),
        Column::required("pages", ColumnType::Int),
        Column::optional("shelf_id", ColumnType::Int),
    ],
    foreign_keys: &[ForeignKey {
        column: "shelf_id",
        references: &SHELF,
    }],
};

#[derive(Debug, Clone, PartialEq)]
struct Book {
    id: EntityId,
    title: String,
    pages: i64,
    shelf_id: Option<EntityId>,
    shelf_label: Option<String>,
}

impl Entity for Book {
    fn meta() -> &'static EntityMeta {
        &BOOK
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
            .with("title", self.title.as_str())
            .with("pages", self.pages)
            .with("shelf_id", self.shelf_id)
    }

    fn from_record(record: &Record) -> Result<Self, CoreError> {
        Ok(Self {
            id: EntityId::new(record.int("id")?),
            title: record.text("title")?,
            pages: record.int("pages")?,
            shelf_id: record.opt_int("shelf_id")?.map(EntityId::new),
            shelf_label: None,
        })
    }
}

fn attach_shelf(book: &mut Book, related: &[Record]) -> Result<(), CoreError> {
    book.shelf_label = related.first().map(|shelf| shelf.text("label")).transpose()?;
    Ok(())
}

fn book(id: i64, title: &str, pages: i64, shelf: Option<i64>) -> Book {
    Book {
        id: EntityId::new(id),
        title: title.to_string(),
        pages,
        shelf_id: shelf.map(EntityId::new),
        shelf_label: None,
    }
}

mod predicate_tests {
    use super::*;

    #[test]
    fn test_id_eq_uses_key_column() {
        let predicate = Predicate::<Book>::id_eq(EntityId::new(4));
        assert!(predicate.matches(&book(4, "Dune", 412, None)));
        assert!(!predicate.matches(&book(5, "Dune", 412, None)));
    }

    #[test]
    fn test_comparisons() {
        let long = Predicate::<Book>::ge("pages", 400);
        let short = Predicate::<Book>::lt("pages", 200);
        assert!(long.matches(&book(1, "Dune", 412, None)));
        assert!(short.matches(&book(2, "Siddhartha", 152, None)));
        assert!(!long.or(short).matches(&book(3, "Emma", 300, None)));
    }

    #[test]
    fn test_null_foreign_key_is_not_unequal() {
        let predicate = Predicate::<Book>::ne("shelf_id", 1);
        assert!(!predicate.matches(&book(1, "Loose", 10, None)));
        assert!(Predicate::<Book>::is_null("shelf_id").matches(&book(1, "Loose", 10, None)));
    }

    #[test]
    fn test_contains_and_not() {
        let predicate = !Predicate::<Book>::contains("title", "une");
        assert!(!predicate.matches(&book(1, "Dune", 412, None)));
        assert!(predicate.matches(&book(2, "Emma", 300, None)));
    }

    #[test]
    fn test_validate_rejects_unknown_columns() {
        let predicate = Predicate::<Book>::eq("title", "Dune").and(Predicate::eq("author", "Herbert"));
        assert_eq!(
            predicate.validate(),
            Err(CoreError::unknown_column("Book", "author"))
        );
        assert!(Predicate::<Book>::is_in("id", [1, 2]).validate().is_ok());
    }

    #[test]
    fn test_default_selects_everything() {
        assert!(Predicate::<Book>::default().matches(&book(1, "Dune", 412, None)));
    }
}

mod include_tests {
    use super::*;

    fn shelf_include() -> Include<Book> {
        Include::reference("shelf", &SHELF, "shelf_id", attach_shelf)
    }

    #[test]
    fn test_lookup_collects_distinct_foreign_keys() {
        let parents = vec![
            book(1, "Dune", 412, Some(7)).to_record(),
            book(2, "Emma", 300, Some(7)).to_record(),
            book(3, "Loose", 10, None).to_record(),
        ];
        let filter = shelf_include().lookup(&parents).unwrap();
        assert_eq!(filter.columns(), vec!["id"]);
        assert!(filter.matches(&Record::new().with("id", 7i64)));
        assert!(!filter.matches(&Record::new().with("id", 8i64)));
    }

    #[test]
    fn test_lookup_skipped_without_keys() {
        let parents = vec![book(3, "Loose", 10, None).to_record()];
        assert!(shelf_include().lookup(&parents).is_none());
    }

    #[test]
    fn test_is_related_and_attach() {
        let include = shelf_include();
        let mut dune = book(1, "Dune", 412, Some(7));
        let shelf = Record::new().with("id", 7i64).with("label", "Sci-fi");
        assert!(include.is_related(&dune.to_record(), &shelf));
        assert!(!include.is_related(&book(2, "Loose", 10, None).to_record(), &shelf));

        include.attach(&mut dune, &[shelf]).unwrap();
        assert_eq!(dune.shelf_label.as_deref(), Some("Sci-fi"));
    }

    #[test]
    fn test_validate_checks_foreign_key_column() {
        assert!(shelf_include().validate().is_ok());
        let broken: Include<Book> = Include::reference("shelf", &SHELF, "rack_id", attach_shelf);
        assert!(broken.validate().is_err());
    }
}

fn value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        (0i64..20).prop_map(Value::Int),
        "[a-c]{0,3}".prop_map(Value::Text),
    ]
}

proptest! {
    #[test]
    fn prop_predicate_and_negation_never_both_match(
        pages in value_strategy(),
        threshold in 0i64..20,
    ) {
        let record = Record::new().with("id", 1i64).with("pages", pages);
        let predicate = Predicate::<Book>::gt("pages", threshold);
        let negated = !predicate.clone();
        prop_assert!(!(predicate.filter().matches(&record) && negated.filter().matches(&record)));
    }

    #[test]
    fn prop_and_matches_iff_both_match(
        pages in value_strategy(),
        title in value_strategy(),
        threshold in 0i64..20,
    ) {
        let record = Record::new().with("pages", pages).with("title", title);
        let left = Predicate::<Book>::le("pages", threshold);
        let right = Predicate::<Book>::contains("title", "a");
        let both = left.clone().and(right.clone());
        prop_assert_eq!(
            both.filter().matches(&record),
            left.filter().matches(&record) && right.filter().matches(&record)
        );
    }
}
