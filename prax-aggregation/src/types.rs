//! Value-type markers for typed property references.
//!
//! Operators constrain the properties they accept by the property's value
//! type: `$abs` takes [`Numeric`] fields, `$add` and `$subtract` also take
//! [`Temporal`] ones.

use bson::Decimal128;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Value types the server treats as numbers.
pub trait Numeric {}

/// Value types the server treats as dates.
pub trait Temporal {}

/// Value types accepted by date-aware arithmetic (`$add`, `$subtract`).
pub trait Arithmetic {}

macro_rules! impl_markers {
    ($marker:ident: $($ty:ty),* $(,)?) => {
        $(
            impl $marker for $ty {}
            impl Arithmetic for $ty {}
        )*
    };
}

impl_markers!(Numeric: i8, i16, i32, i64, u8, u16, u32, u64, f32, f64, Decimal128);
impl_markers!(Temporal: DateTime<Utc>, NaiveDate, NaiveDateTime, bson::DateTime);

impl<T: Numeric> Numeric for Option<T> {}
impl<T: Temporal> Temporal for Option<T> {}
impl<T: Arithmetic> Arithmetic for Option<T> {}

#[cfg(test)]
mod tests {
    use super::*;

    fn numeric<T: Numeric>() {}
    fn temporal<T: Temporal>() {}
    fn arithmetic<T: Arithmetic>() {}

    #[test]
    fn test_marker_coverage() {
        numeric::<i32>();
        numeric::<Option<f64>>();
        numeric::<Decimal128>();
        temporal::<DateTime<Utc>>();
        temporal::<Option<bson::DateTime>>();
        arithmetic::<u64>();
        arithmetic::<Option<NaiveDate>>();
    }
}
