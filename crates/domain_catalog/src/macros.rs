//! Declaration macro for entities that carry nothing but a name

/// Declares a catalog entity with an identifier and a unique, required name
///
/// Generates the struct, its static mapping metadata, the `Entity` impl and a
/// `named` predicate helper.
///
/// Uniqueness of the name is a constraint of this crate. The catalog itself
/// only asks for a required name within [`NAME_MAX_LEN`](crate::NAME_MAX_LEN);
/// the unique index keeps [`Fuel`](crate::Fuel) and [`City`](crate::City)
/// lookups by name unambiguous. [`Ban`](crate::Ban) names stay non-unique.
macro_rules! named_entity {
    ($(#[$doc:meta])* $name:ident, $meta:ident, $table:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
        pub struct $name {
            #[serde(default)]
            pub id: EntityId,
            pub name: String,
        }

        static $meta: EntityMeta = EntityMeta {
            name: stringify!($name),
            table: $table,
            key: "id",
            columns: &[Column::required("name", ColumnType::Text)
                .max_len($crate::NAME_MAX_LEN)
                .unique()],
            foreign_keys: &[],
        };

        impl $name {
            /// Creates an entity the store has not keyed yet
            pub fn new(name: impl Into<String>) -> Self {
                Self {
                    id: EntityId::UNASSIGNED,
                    name: name.into(),
                }
            }

            /// Selects the entity with exactly this name
            pub fn named(name: impl Into<String>) -> Predicate<$name> {
                Predicate::eq("name", name.into())
            }
        }

        impl Entity for $name {
            fn meta() -> &'static EntityMeta {
                &$meta
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
                })
            }
        }
    };
}

pub(crate) use named_entity;
