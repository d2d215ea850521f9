//! Fuel types offered in the catalog

use core_kernel::{Column, ColumnType, CoreError, Entity, EntityId, EntityMeta, Predicate, Record};
use serde::{Deserialize, Serialize};

use crate::macros::named_entity;

named_entity!(
    /// A fuel type such as diesel or petrol
    Fuel,
    FUEL_META,
    "fuels"
);
