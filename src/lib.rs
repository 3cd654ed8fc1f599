//! # Prax Mongo DSL
//!
//! A type-safe builder for MongoDB aggregation documents.
//!
//! Prax Mongo DSL provides:
//! - Expression builders for arithmetic, literal and `$let` operators
//! - Operand resolution from field names, typed properties and values
//! - Pipeline stages and the `aggregate` command document
//! - Atlas Search facet definitions
//!
//! Nothing here talks to a server; every builder produces a
//! [`bson::Document`](crate::Document) for a driver to send.
//!
//! ## Quick Start
//!
//! ```rust
//! use prax_mongo_dsl::prelude::*;
//!
//! struct Order { total: f64, status: String }
//!
//! document_fields! {
//!     Order { total: f64, status: String }
//! }
//!
//! let pipeline = aggregation(|p| {
//!     p.match_stage(doc! { "status": "paid" })
//!         .set(|s| s.expression("rounded", expression(|e| e.ceil(Order::total()))))
//!         .group(Order::status(), |g| g.count("orders"))
//! })
//! .unwrap();
//!
//! assert_eq!(
//!     pipeline.stages()[1],
//!     doc! { "$set": { "rounded": { "$ceil": "$total" } } }
//! );
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

/// Aggregation expressions, pipelines and search facets.
pub mod aggregation {
    pub use prax_aggregation::*;
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use prax_aggregation::prelude::*;
}

// Re-export key types at the crate root
pub use prax_aggregation::{
    AggregationError, AggregationOptions, AggregationPipeline, AggregationResult, Bson, Document,
    Expression, ExpressionBuilder, FieldPath, IntoOperand, Operand, Operator, Property, doc,
    document_fields, expression, nested,
};
