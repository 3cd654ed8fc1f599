//! Atlas Search facet definitions.
//!
//! Facets bucket search results by a field. Each definition renders to the
//! document expected under a `$searchMeta` facet operator's `facets` map.
//!
//! ```rust
//! use prax_aggregation::search::numeric_facet;
//! use bson::doc;
//!
//! let facet = numeric_facet(|f| f.path("price").boundaries([0, 100, 500]).default("other"))
//!     .unwrap();
//! assert_eq!(
//!     facet,
//!     doc! {
//!         "type": "number",
//!         "path": "price",
//!         "boundaries": [0, 100, 500],
//!         "default": "other",
//!     }
//! );
//! ```

use bson::{Bson, Document};

use crate::error::{AggregationError, AggregationResult};
use crate::path::IntoFieldPath;

/// Upper bound on `numBuckets` for string facets.
pub const MAX_STRING_BUCKETS: u32 = 1000;

/// Keys shared by the boundary-based facet kinds.
#[derive(Debug, Default)]
struct BoundaryFacet {
    path: Option<String>,
    boundaries: Option<Vec<Bson>>,
    default: Option<String>,
    error: Option<AggregationError>,
}

impl BoundaryFacet {
    fn path(&mut self, path: impl IntoFieldPath) {
        match path.into_field_path().and_then(|p| p.into_key()) {
            Ok(path) => self.path = Some(path),
            Err(err) => {
                self.error.get_or_insert(err);
            }
        }
    }

    fn boundaries<B: PartialOrd>(&mut self, values: Vec<B>, to_bson: impl Fn(B) -> Bson) {
        let ascending = values.windows(2).all(|pair| pair[0] < pair[1]);
        if ascending {
            self.boundaries = Some(values.into_iter().map(to_bson).collect());
        } else {
            self.error.get_or_insert(AggregationError::stage(
                "facet boundaries must be strictly ascending",
            ));
        }
    }

    fn finish(self, kind: &str) -> AggregationResult<Document> {
        if let Some(err) = self.error {
            return Err(err);
        }
        let mut doc = Document::new();
        doc.insert("type", kind);
        if let Some(path) = self.path {
            doc.insert("path", path);
        }
        if let Some(boundaries) = self.boundaries {
            doc.insert("boundaries", boundaries);
        }
        if let Some(default) = self.default {
            doc.insert("default", default);
        }
        Ok(doc)
    }
}

/// A numeric boundary value, ordered in its own type.
pub trait NumericBoundary: PartialOrd {
    /// The value as BSON.
    fn into_bson(self) -> Bson;
}

impl NumericBoundary for i32 {
    fn into_bson(self) -> Bson {
        Bson::Int32(self)
    }
}

impl NumericBoundary for i64 {
    fn into_bson(self) -> Bson {
        Bson::Int64(self)
    }
}

impl NumericBoundary for f64 {
    fn into_bson(self) -> Bson {
        Bson::Double(self)
    }
}

/// Builder for a `number` facet.
#[derive(Debug, Default)]
pub struct NumericFacetBuilder {
    inner: BoundaryFacet,
}

impl NumericFacetBuilder {
    /// The numeric field to bucket.
    pub fn path(mut self, path: impl IntoFieldPath) -> Self {
        self.inner.path(path);
        self
    }

    /// Bucket edges; each bucket includes its lower edge.
    pub fn boundaries<B: NumericBoundary>(mut self, values: impl IntoIterator<Item = B>) -> Self {
        let values: Vec<B> = values.into_iter().collect();
        self.inner.boundaries(values, B::into_bson);
        self
    }

    /// Name of the bucket for values outside the boundaries.
    pub fn default(mut self, bucket: impl Into<String>) -> Self {
        self.inner.default = Some(bucket.into());
        self
    }

    /// Build the facet definition.
    pub fn build(self) -> AggregationResult<Document> {
        self.inner.finish("number")
    }
}

/// Builder for a `date` facet.
#[derive(Debug, Default)]
pub struct DateFacetBuilder {
    inner: BoundaryFacet,
}

impl DateFacetBuilder {
    /// The date field to bucket.
    pub fn path(mut self, path: impl IntoFieldPath) -> Self {
        self.inner.path(path);
        self
    }

    /// Bucket edges; each bucket includes its lower edge.
    pub fn boundaries<D: Into<bson::DateTime>>(
        mut self,
        values: impl IntoIterator<Item = D>,
    ) -> Self {
        let millis: Vec<i64> = values
            .into_iter()
            .map(|value| Into::<bson::DateTime>::into(value).timestamp_millis())
            .collect();
        self.inner.boundaries(millis, |ms: i64| {
            Bson::DateTime(bson::DateTime::from_millis(ms))
        });
        self
    }

    /// Name of the bucket for dates outside the boundaries.
    pub fn default(mut self, bucket: impl Into<String>) -> Self {
        self.inner.default = Some(bucket.into());
        self
    }

    /// Build the facet definition.
    pub fn build(self) -> AggregationResult<Document> {
        self.inner.finish("date")
    }
}

/// Builder for a `string` facet.
#[derive(Debug, Default)]
pub struct StringFacetBuilder {
    path: Option<String>,
    num_buckets: Option<u32>,
    error: Option<AggregationError>,
}

impl StringFacetBuilder {
    /// The string field to bucket.
    pub fn path(mut self, path: impl IntoFieldPath) -> Self {
        match path.into_field_path().and_then(|p| p.into_key()) {
            Ok(path) => self.path = Some(path),
            Err(err) => {
                self.error.get_or_insert(err);
            }
        }
        self
    }

    /// Maximum number of buckets to return.
    pub fn num_buckets(mut self, n: u32) -> Self {
        if (1..=MAX_STRING_BUCKETS).contains(&n) {
            self.num_buckets = Some(n);
        } else {
            self.error.get_or_insert(AggregationError::stage(format!(
                "numBuckets must be between 1 and {}, got {}",
                MAX_STRING_BUCKETS, n
            )));
        }
        self
    }

    /// Build the facet definition.
    pub fn build(self) -> AggregationResult<Document> {
        if let Some(err) = self.error {
            return Err(err);
        }
        let mut doc = Document::new();
        doc.insert("type", "string");
        if let Some(path) = self.path {
            doc.insert("path", path);
        }
        if let Some(n) = self.num_buckets {
            doc.insert("numBuckets", i64::from(n));
        }
        Ok(doc)
    }
}

/// Build a `number` facet definition.
pub fn numeric_facet<F>(configure: F) -> AggregationResult<Document>
where
    F: FnOnce(NumericFacetBuilder) -> NumericFacetBuilder,
{
    configure(Default::default()).build()
}

/// Build a `date` facet definition.
pub fn date_facet<F>(configure: F) -> AggregationResult<Document>
where
    F: FnOnce(DateFacetBuilder) -> DateFacetBuilder,
{
    configure(Default::default()).build()
}

/// Build a `string` facet definition.
pub fn string_facet<F>(configure: F) -> AggregationResult<Document>
where
    F: FnOnce(StringFacetBuilder) -> StringFacetBuilder,
{
    configure(Default::default()).build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Property;
    use bson::doc;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    struct Listing;

    #[test]
    fn test_numeric_facet_boundaries() {
        let facet = numeric_facet(|f| f.boundaries([1, 2])).unwrap();
        assert_eq!(facet, doc! { "type": "number", "boundaries": [1, 2] });
    }

    #[test]
    fn test_numeric_facet_path_by_name() {
        let facet = numeric_facet(|f| f.path("path")).unwrap();
        assert_eq!(facet, doc! { "type": "number", "path": "path" });
    }

    #[test]
    fn test_numeric_facet_path_by_property() {
        let path: Property<Listing, i64> = Property::new("path");
        let facet = numeric_facet(|f| f.path(path)).unwrap();
        assert_eq!(facet, doc! { "type": "number", "path": "path" });
    }

    #[test]
    fn test_numeric_facet_default() {
        let facet = numeric_facet(|f| f.default("default")).unwrap();
        assert_eq!(facet, doc! { "type": "number", "default": "default" });
    }

    #[test]
    fn test_numeric_facet_key_order_is_fixed() {
        let facet = numeric_facet(|f| f.default("other").boundaries([0.5, 1.5]).path("score"))
            .unwrap();
        assert_eq!(
            facet.keys().collect::<Vec<_>>(),
            vec!["type", "path", "boundaries", "default"]
        );
    }

    #[test]
    fn test_numeric_facet_rejects_unordered_boundaries() {
        assert!(numeric_facet(|f| f.boundaries([5, 1])).is_err());
        assert!(numeric_facet(|f| f.boundaries([1, 1])).is_err());
        assert!(numeric_facet(|f| f.path("$$ROOT")).is_err());
    }

    #[test]
    fn test_numeric_facet_large_integer_boundaries() {
        let low = 1_i64 << 53;
        let facet = numeric_facet(|f| f.boundaries([low, low + 1])).unwrap();
        assert_eq!(
            facet,
            doc! { "type": "number", "boundaries": [low, low + 1] }
        );
        assert!(numeric_facet(|f| f.boundaries([low + 1, low])).is_err());
    }

    #[test]
    fn test_numeric_facet_rejects_nan() {
        assert!(numeric_facet(|f| f.boundaries([0.0, f64::NAN])).is_err());
    }

    #[test]
    fn test_date_facet() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let facet = date_facet(|f| f.path("released").boundaries([start, end])).unwrap();

        assert_eq!(
            facet,
            doc! {
                "type": "date",
                "path": "released",
                "boundaries": [bson::DateTime::from_chrono(start), bson::DateTime::from_chrono(end)],
            }
        );
        assert!(date_facet(|f| f.boundaries([end, start])).is_err());
    }

    #[test]
    fn test_string_facet() {
        let facet = string_facet(|f| f.path("genre").num_buckets(10)).unwrap();
        assert_eq!(
            facet,
            doc! { "type": "string", "path": "genre", "numBuckets": 10_i64 }
        );
        assert!(string_facet(|f| f.num_buckets(0)).is_err());
        assert!(string_facet(|f| f.num_buckets(1001)).is_err());
    }
}
