mod activation;
mod customer;
mod event;
mod license;
mod product;

pub use activation::*;
pub use customer::*;
pub use event::*;
pub use license::*;
pub use product::*;

use serde::{Deserialize, Deserializer};

/// Distinguishes an explicit `null` (clear the field) from an omitted field.
/// Use with `#[serde(default, deserialize_with = "nullable")]` on `Option<Option<T>>`.
pub(crate) fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
