//! Cities referenced by catalog listings

use core_kernel::{Column, ColumnType, CoreError, Entity, EntityId, EntityMeta, Predicate, Record};
use serde::{Deserialize, Serialize};

use crate::macros::named_entity;

named_entity!(
    /// A city a listing can be located in
    City,
    CITY_META,
    "cities"
);
