//! # prax-aggregation
//!
//! Type-safe builders for MongoDB aggregation expressions and pipelines.
//!
//! This crate provides:
//! - An operator table with per-operator arity and rendering shape
//! - Operand resolution from field names, typed properties, literals and
//!   nested expressions
//! - Immutable [`Expression`] values that render to `bson::Document`
//! - A pipeline builder for common stages and the `aggregate` command
//! - Atlas Search facet definitions
//!
//! ## Example
//!
//! ```rust
//! use prax_aggregation::prelude::*;
//!
//! let expr = expression(|e| e.subtract(e.abs("$balance"), 10)).unwrap();
//! assert_eq!(
//!     expr.to_document(),
//!     doc! { "$subtract": [{ "$abs": "$balance" }, 10] }
//! );
//! ```
//!
//! ## Typed fields
//!
//! Models declare their field paths with [`document_fields!`]; the resulting
//! properties carry the field's Rust type, so numeric operators only accept
//! numeric fields:
//!
//! ```rust
//! use prax_aggregation::prelude::*;
//!
//! struct Account { balance: f64 }
//!
//! document_fields! { Account { balance: f64 } }
//!
//! let expr = expression(|e| e.sqrt(Account::balance())).unwrap();
//! assert_eq!(expr.to_document(), doc! { "$sqrt": "$balance" });
//! ```

#[macro_use]
mod macros;

pub mod config;
pub mod error;
pub mod expression;
pub mod operand;
pub mod operator;
pub mod path;
pub mod pipeline;
pub mod search;
pub mod types;

pub use bson::{Bson, Document, doc};
pub use config::{AggregationOptions, AggregationOptionsBuilder, Hint};
pub use error::{AggregationError, AggregationResult, Arity};
pub use expression::{Expression, ExpressionBuilder, expression};
pub use operand::{ArithmeticOperand, IntoOperand, NumericOperand, Operand, nested};
pub use operator::{Operator, Shape};
pub use path::{Embeds, FieldPath, IntoFieldPath, PathRoot, Property};
pub use pipeline::{AggregationPipeline, PipelineBuilder, SortDirection, aggregation};
pub use search::{date_facet, numeric_facet, string_facet};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::config::{AggregationOptions, Hint};
    pub use crate::document_fields;
    pub use crate::error::{AggregationError, AggregationResult};
    pub use crate::expression::{Expression, ExpressionBuilder, expression};
    pub use crate::operand::{IntoOperand, Operand, nested};
    pub use crate::operator::Operator;
    pub use crate::path::{FieldPath, Property};
    pub use crate::pipeline::{AggregationPipeline, SortDirection, aggregation};
    pub use crate::search::{date_facet, numeric_facet, string_facet};
    pub use bson::{Bson, Document, doc};
}
