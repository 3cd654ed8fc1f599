//! Aggregation pipeline building.
//!
//! A pipeline is an ordered list of stage documents. [`PipelineBuilder`]
//! offers typed helpers for the common stages and accepts raw stage
//! documents for everything else.
//!
//! # Example
//!
//! ```rust
//! use prax_aggregation::{aggregation, AggregationOptions};
//! use bson::doc;
//!
//! let pipeline = aggregation(|p| {
//!     p.set(|s| s.value("_id", "2017"))
//!         .union_with(|u| {
//!             u.coll("sales_2018")
//!                 .pipeline(|p| p.set(|s| s.value("_id", "2018")))
//!         })
//!         .sort(|s| s.asc("_id").asc("store").asc("item"))
//! })
//! .unwrap();
//!
//! assert_eq!(pipeline.len(), 3);
//! assert_eq!(
//!     pipeline.stages()[1],
//!     doc! {
//!         "$unionWith": {
//!             "coll": "sales_2018",
//!             "pipeline": [{ "$set": { "_id": "2018" } }],
//!         }
//!     }
//! );
//!
//! let command = pipeline
//!     .to_command("sales_2017", &AggregationOptions::default())
//!     .unwrap();
//! assert_eq!(command.get_str("aggregate").unwrap(), "sales_2017");
//! ```

use bson::{Bson, Document, doc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::AggregationOptions;
use crate::error::{AggregationError, AggregationResult};
use crate::expression::ExpressionBuilder;
use crate::operand::{IntoOperand, Operand};
use crate::path::IntoFieldPath;

/// An ordered list of aggregation stages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregationPipeline {
    stages: Vec<Document>,
}

impl AggregationPipeline {
    /// Wrap existing stage documents.
    pub fn new(stages: Vec<Document>) -> Self {
        Self { stages }
    }

    /// Create a pipeline builder.
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// The stages in execution order.
    pub fn stages(&self) -> &[Document] {
        &self.stages
    }

    /// Consume the pipeline, returning its stages.
    pub fn into_stages(self) -> Vec<Document> {
        self.stages
    }

    /// Number of stages.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Whether the pipeline has no stages.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// The stages as a BSON array.
    pub fn to_bson(&self) -> Bson {
        Bson::Array(self.stages.iter().cloned().map(Bson::Document).collect())
    }

    /// Generate the `aggregate` command document for this pipeline.
    pub fn to_command(
        &self,
        collection: &str,
        options: &AggregationOptions,
    ) -> AggregationResult<Document> {
        if collection.is_empty() {
            return Err(AggregationError::option("collection name is empty"));
        }

        let mut cmd = doc! {
            "aggregate": collection,
            "pipeline": self.to_bson(),
        };
        cmd.extend(options.to_document()?);

        debug!(collection, stages = self.len(), "built aggregate command");
        Ok(cmd)
    }
}

/// Keeps the first error raised while a builder is being configured.
#[derive(Debug, Default)]
struct Deferred(Option<AggregationError>);

impl Deferred {
    fn fail(&mut self, err: AggregationError) {
        self.0.get_or_insert(err);
    }

    fn record<T>(&mut self, result: AggregationResult<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                self.fail(err);
                None
            }
        }
    }

    fn check(self) -> AggregationResult<()> {
        match self.0 {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Builder for aggregation pipelines.
#[derive(Debug, Default)]
pub struct PipelineBuilder {
    stages: Vec<Document>,
    error: Deferred,
}

impl PipelineBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, stage: AggregationResult<Document>) -> Self {
        if let Some(stage) = self.error.record(stage) {
            self.stages.push(stage);
        }
        self
    }

    /// Add a raw stage document.
    pub fn stage(self, stage: Document) -> Self {
        self.push(Ok(stage))
    }

    /// Add a `$match` stage.
    pub fn match_stage(self, filter: Document) -> Self {
        self.push(Ok(doc! { "$match": filter }))
    }

    /// Add a `$project` stage.
    pub fn project(self, projection: Document) -> Self {
        self.push(Ok(doc! { "$project": projection }))
    }

    /// Add a `$set` stage.
    pub fn set<F>(self, configure: F) -> Self
    where
        F: FnOnce(SetStage) -> SetStage,
    {
        let stage = configure(SetStage::default()).finish();
        self.push(stage)
    }

    /// Add a `$group` stage keyed by `id`.
    pub fn group<F>(self, id: impl IntoOperand, configure: F) -> Self
    where
        F: FnOnce(GroupStage) -> GroupStage,
    {
        let stage = id
            .into_operand()
            .and_then(|id| configure(GroupStage::new(id.to_bson())).finish());
        self.push(stage)
    }

    /// Add a `$unionWith` stage.
    pub fn union_with<F>(self, configure: F) -> Self
    where
        F: FnOnce(UnionWithStage) -> UnionWithStage,
    {
        let stage = configure(UnionWithStage::default()).finish();
        self.push(stage)
    }

    /// Add a `$sort` stage.
    pub fn sort<F>(self, configure: F) -> Self
    where
        F: FnOnce(SortStage) -> SortStage,
    {
        let stage = configure(SortStage::default()).finish();
        self.push(stage)
    }

    /// Add a `$limit` stage.
    pub fn limit(self, n: i64) -> Self {
        let stage = if n > 0 {
            Ok(doc! { "$limit": n })
        } else {
            Err(AggregationError::stage(format!(
                "$limit must be positive, got {}",
                n
            )))
        };
        self.push(stage)
    }

    /// Add a `$skip` stage.
    pub fn skip(self, n: i64) -> Self {
        let stage = if n >= 0 {
            Ok(doc! { "$skip": n })
        } else {
            Err(AggregationError::stage(format!(
                "$skip must not be negative, got {}",
                n
            )))
        };
        self.push(stage)
    }

    /// Add an `$unwind` stage for an array field.
    pub fn unwind(self, path: impl IntoFieldPath) -> Self {
        let stage = path.into_field_path().and_then(|path| {
            if path.is_variable() {
                Err(AggregationError::invalid_path(
                    path.to_reference(),
                    "$unwind requires a document field",
                ))
            } else {
                Ok(doc! { "$unwind": path.to_reference() })
            }
        });
        self.push(stage)
    }

    /// Add a `$count` stage writing the document count to `field`.
    pub fn count(self, field: &str) -> Self {
        let stage = output_name(field).map(|field| doc! { "$count": field });
        self.push(stage)
    }

    /// Build the pipeline, reporting the first error raised by any stage.
    pub fn build(self) -> AggregationResult<AggregationPipeline> {
        self.error.check()?;
        debug!(stages = self.stages.len(), "built aggregation pipeline");
        Ok(AggregationPipeline::new(self.stages))
    }
}

/// Build a pipeline with a fresh [`PipelineBuilder`].
pub fn aggregation<F>(configure: F) -> AggregationResult<AggregationPipeline>
where
    F: FnOnce(PipelineBuilder) -> PipelineBuilder,
{
    configure(PipelineBuilder::new()).build()
}

/// A name for a computed output field: non-empty, undotted, not `$`-prefixed.
fn output_name(name: &str) -> AggregationResult<&str> {
    if name.is_empty() {
        Err(AggregationError::stage("output field name is empty"))
    } else if name.starts_with('$') {
        Err(AggregationError::stage(format!(
            "output field '{}' starts with '$'",
            name
        )))
    } else if name.contains('.') {
        Err(AggregationError::stage(format!(
            "output field '{}' contains '.'",
            name
        )))
    } else {
        Ok(name)
    }
}

/// Fields assigned by a `$set` stage.
#[derive(Debug, Default)]
pub struct SetStage {
    fields: Document,
    error: Deferred,
}

impl SetStage {
    /// Assign a literal value.
    ///
    /// Values the server would evaluate, such as strings starting with `$`,
    /// are wrapped in `$literal`.
    pub fn value(mut self, field: impl IntoFieldPath, value: impl Into<Bson>) -> Self {
        let value = Operand::value(value).to_bson();
        if let Some(key) = self.error.record(field.into_field_path().and_then(|p| p.into_key())) {
            self.fields.insert(key, value);
        }
        self
    }

    /// Assign a field reference or expression.
    pub fn expression(mut self, field: impl IntoFieldPath, value: impl IntoOperand) -> Self {
        let entry = field
            .into_field_path()
            .and_then(|p| p.into_key())
            .and_then(|key| value.into_operand().map(|operand| (key, operand)));
        if let Some((key, operand)) = self.error.record(entry) {
            self.fields.insert(key, operand.to_bson());
        }
        self
    }

    fn finish(self) -> AggregationResult<Document> {
        self.error.check()?;
        if self.fields.is_empty() {
            return Err(AggregationError::stage("$set requires at least one field"));
        }
        Ok(doc! { "$set": self.fields })
    }
}

/// Accumulators computed by a `$group` stage.
#[derive(Debug)]
pub struct GroupStage {
    body: Document,
    error: Deferred,
}

impl GroupStage {
    fn new(id: Bson) -> Self {
        Self {
            body: doc! { "_id": id },
            error: Deferred::default(),
        }
    }

    fn output(mut self, name: &str, value: AggregationResult<Bson>) -> Self {
        let entry = output_name(name).and_then(|name| {
            if name == "_id" {
                Err(AggregationError::stage("'_id' is reserved for the group key"))
            } else {
                value.map(|value| (name, value))
            }
        });
        if let Some((name, value)) = self.error.record(entry) {
            self.body.insert(name, value);
        }
        self
    }

    /// Add an output field computed by an arbitrary accumulator expression.
    pub fn accumulator(self, name: &str, expression: impl IntoOperand) -> Self {
        let value = expression.into_operand().map(|operand| operand.to_bson());
        self.output(name, value)
    }

    fn accumulate(self, name: &str, operator: &'static str, value: impl IntoOperand) -> Self {
        let value = value.into_operand().map(|operand| {
            let mut body = Document::new();
            body.insert(operator, operand.to_bson());
            Bson::Document(body)
        });
        self.output(name, value)
    }

    /// `$sum` of the values.
    pub fn sum(self, name: &str, value: impl IntoOperand) -> Self {
        self.accumulate(name, "$sum", value)
    }

    /// `$avg` of the values.
    pub fn avg(self, name: &str, value: impl IntoOperand) -> Self {
        self.accumulate(name, "$avg", value)
    }

    /// `$min` of the values.
    pub fn min(self, name: &str, value: impl IntoOperand) -> Self {
        self.accumulate(name, "$min", value)
    }

    /// `$max` of the values.
    pub fn max(self, name: &str, value: impl IntoOperand) -> Self {
        self.accumulate(name, "$max", value)
    }

    /// `$first` value in the group.
    pub fn first(self, name: &str, value: impl IntoOperand) -> Self {
        self.accumulate(name, "$first", value)
    }

    /// `$last` value in the group.
    pub fn last(self, name: &str, value: impl IntoOperand) -> Self {
        self.accumulate(name, "$last", value)
    }

    /// `$push` every value into an array.
    pub fn push(self, name: &str, value: impl IntoOperand) -> Self {
        self.accumulate(name, "$push", value)
    }

    /// `$addToSet` the distinct values into an array.
    pub fn add_to_set(self, name: &str, value: impl IntoOperand) -> Self {
        self.accumulate(name, "$addToSet", value)
    }

    /// Number of documents in the group.
    pub fn count(self, name: &str) -> Self {
        self.accumulator(name, ExpressionBuilder::new().count())
    }

    fn finish(self) -> AggregationResult<Document> {
        self.error.check()?;
        Ok(doc! { "$group": self.body })
    }
}

/// Source for a `$unionWith` stage.
#[derive(Debug, Default)]
pub struct UnionWithStage {
    coll: Option<String>,
    pipeline: Option<Vec<Document>>,
    error: Deferred,
}

impl UnionWithStage {
    /// The collection whose documents are appended.
    pub fn coll(mut self, collection: impl Into<String>) -> Self {
        let collection = collection.into();
        if collection.is_empty() {
            self.error
                .fail(AggregationError::stage("$unionWith collection is empty"));
        } else {
            self.coll = Some(collection);
        }
        self
    }

    /// A pipeline applied to the unioned collection first.
    pub fn pipeline<F>(mut self, configure: F) -> Self
    where
        F: FnOnce(PipelineBuilder) -> PipelineBuilder,
    {
        if let Some(pipeline) = self.error.record(aggregation(configure)) {
            self.pipeline = Some(pipeline.into_stages());
        }
        self
    }

    fn finish(self) -> AggregationResult<Document> {
        self.error.check()?;
        let mut body = Document::new();
        if let Some(coll) = self.coll {
            body.insert("coll", coll);
        }
        if let Some(stages) = self.pipeline {
            body.insert(
                "pipeline",
                stages.into_iter().map(Bson::Document).collect::<Vec<_>>(),
            );
        }
        if body.is_empty() {
            return Err(AggregationError::stage(
                "$unionWith requires a collection or a pipeline",
            ));
        }
        Ok(doc! { "$unionWith": body })
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    /// Smallest first.
    Ascending,
    /// Largest first.
    Descending,
}

impl SortDirection {
    fn as_i32(self) -> i32 {
        match self {
            Self::Ascending => 1,
            Self::Descending => -1,
        }
    }
}

/// Keys of a `$sort` stage, in priority order.
#[derive(Debug, Default)]
pub struct SortStage {
    keys: Document,
    error: Deferred,
}

impl SortStage {
    /// Sort by `field` in the given direction.
    pub fn by(mut self, field: impl IntoFieldPath, direction: SortDirection) -> Self {
        if let Some(key) = self.error.record(field.into_field_path().and_then(|p| p.into_key())) {
            self.keys.insert(key, direction.as_i32());
        }
        self
    }

    /// Sort ascending by `field`.
    pub fn asc(self, field: impl IntoFieldPath) -> Self {
        self.by(field, SortDirection::Ascending)
    }

    /// Sort descending by `field`.
    pub fn desc(self, field: impl IntoFieldPath) -> Self {
        self.by(field, SortDirection::Descending)
    }

    fn finish(self) -> AggregationResult<Document> {
        self.error.check()?;
        if self.keys.is_empty() {
            return Err(AggregationError::stage("$sort requires at least one key"));
        }
        Ok(doc! { "$sort": self.keys })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Property;
    use pretty_assertions::assert_eq;

    struct Sale;

    #[test]
    fn test_pipeline_builder() {
        let pipeline = AggregationPipeline::builder()
            .match_stage(doc! { "status": "active" })
            .project(doc! { "name": 1, "email": 1 })
            .limit(10)
            .skip(5)
            .build()
            .unwrap();

        assert_eq!(pipeline.len(), 4);
        assert_eq!(pipeline.stages()[2], doc! { "$limit": 10_i64 });
    }

    #[test]
    fn test_union_with_only_collection() {
        let pipeline = aggregation(|p| p.union_with(|u| u.coll("sales_2018"))).unwrap();
        assert_eq!(
            pipeline.stages()[0],
            doc! { "$unionWith": { "coll": "sales_2018" } }
        );
    }

    #[test]
    fn test_union_with_requires_source() {
        let err = aggregation(|p| p.union_with(|u| u)).unwrap_err();
        assert!(matches!(err, AggregationError::InvalidStage(_)));
    }

    #[test]
    fn test_group_with_accumulators() {
        let pipeline = aggregation(|p| {
            p.group("item", |g| g.sum("total", "quantity").count("orders"))
                .sort(|s| s.desc("total"))
        })
        .unwrap();

        assert_eq!(
            pipeline.into_stages(),
            vec![
                doc! {
                    "$group": {
                        "_id": "$item",
                        "total": { "$sum": "$quantity" },
                        "orders": { "$count": {} },
                    }
                },
                doc! { "$sort": { "total": -1 } },
            ]
        );
    }

    #[test]
    fn test_group_rejects_id_output() {
        let err = aggregation(|p| p.group("item", |g| g.sum("_id", 1))).unwrap_err();
        assert!(matches!(err, AggregationError::InvalidStage(_)));
    }

    #[test]
    fn test_set_values_and_expressions() {
        let e = ExpressionBuilder::new();
        let pipeline = aggregation(|p| {
            p.set(|s| {
                s.value("_id", "2017")
                    .value("marker", "$not_a_field")
                    .expression("net", e.subtract("gross", "tax"))
            })
        })
        .unwrap();

        assert_eq!(
            pipeline.stages()[0],
            doc! {
                "$set": {
                    "_id": "2017",
                    "marker": { "$literal": "$not_a_field" },
                    "net": { "$subtract": ["$gross", "$tax"] },
                }
            }
        );
    }

    #[test]
    fn test_bson_values_are_not_evaluated() {
        let pipeline = aggregation(|p| {
            p.group(Bson::String("$all".into()), |g| {
                g.accumulator("label", Bson::String("$total".into()))
            })
            .set(|s| s.expression("note", Bson::Document(doc! { "$ceil": 1 })))
        })
        .unwrap();

        assert_eq!(
            pipeline.into_stages(),
            vec![
                doc! {
                    "$group": {
                        "_id": { "$literal": "$all" },
                        "label": { "$literal": "$total" },
                    }
                },
                doc! { "$set": { "note": { "$literal": { "$ceil": 1 } } } },
            ]
        );
    }

    #[test]
    fn test_sort_with_property() {
        let store: Property<Sale, String> = Property::new("store");
        let pipeline = aggregation(|p| p.sort(|s| s.asc(store).desc("total"))).unwrap();
        assert_eq!(
            pipeline.stages()[0],
            doc! { "$sort": { "store": 1, "total": -1 } }
        );
    }

    #[test]
    fn test_first_error_wins() {
        let err = aggregation(|p| p.limit(0).sort(|s| s).skip(-1)).unwrap_err();
        assert_eq!(err, AggregationError::stage("$limit must be positive, got 0"));
    }

    #[test]
    fn test_nested_pipeline_error() {
        let err = aggregation(|p| p.union_with(|u| u.coll("a").pipeline(|p| p.sort(|s| s))))
            .unwrap_err();
        assert_eq!(err, AggregationError::stage("$sort requires at least one key"));
    }

    #[test]
    fn test_unwind_and_count() {
        let pipeline = aggregation(|p| p.unwind("items").count("total")).unwrap();
        assert_eq!(
            pipeline.into_stages(),
            vec![doc! { "$unwind": "$items" }, doc! { "$count": "total" }]
        );

        assert!(aggregation(|p| p.unwind("$$ROOT")).is_err());
        assert!(aggregation(|p| p.count("a.b")).is_err());
    }

    #[test]
    fn test_to_command() {
        let pipeline = aggregation(|p| p.limit(1)).unwrap();
        let options = AggregationOptions::builder()
            .allow_disk_use(true)
            .batch_size(50)
            .build()
            .unwrap();

        let cmd = pipeline.to_command("orders", &options).unwrap();
        assert_eq!(
            cmd,
            doc! {
                "aggregate": "orders",
                "pipeline": [{ "$limit": 1_i64 }],
                "allowDiskUse": true,
                "cursor": { "batchSize": 50 },
            }
        );

        assert!(pipeline.to_command("", &options).is_err());

        let unchecked = AggregationOptions {
            batch_size: Some(u32::MAX),
            ..options
        };
        assert!(pipeline.to_command("orders", &unchecked).is_err());
    }
}
