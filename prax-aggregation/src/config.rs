//! Options for the `aggregate` command.

use std::time::Duration;

use bson::{Bson, Document, doc};
use serde::{Deserialize, Serialize};

use crate::error::{AggregationError, AggregationResult};
use crate::path::validate_variable_name;

/// Index hint for the aggregate command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Hint {
    /// Index name.
    Name(String),
    /// Index key specification.
    Keys(Document),
}

impl From<&Hint> for Bson {
    fn from(hint: &Hint) -> Self {
        match hint {
            Hint::Name(name) => Bson::String(name.clone()),
            Hint::Keys(keys) => Bson::Document(keys.clone()),
        }
    }
}

/// Options sent alongside an aggregation pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregationOptions {
    /// Allow stages to write temporary files.
    pub allow_disk_use: Option<bool>,
    /// Documents per cursor batch.
    pub batch_size: Option<u32>,
    /// Server-side time limit.
    pub max_time: Option<Duration>,
    /// Skip schema validation for `$out` / `$merge`.
    pub bypass_document_validation: Option<bool>,
    /// Collation for string comparisons.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collation: Option<Document>,
    /// Index hint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<Hint>,
    /// Comment attached to the command in server logs.
    pub comment: Option<String>,
    /// Variables accessible as `$$name` in every stage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub let_vars: Option<Document>,
}

impl AggregationOptions {
    /// Create a builder for aggregation options.
    pub fn builder() -> AggregationOptionsBuilder {
        AggregationOptionsBuilder::new()
    }

    /// Check the limits the server imposes on option values.
    ///
    /// Run by [`AggregationOptionsBuilder::build`] and again by
    /// [`AggregationOptions::to_document`].
    pub fn validate(&self) -> AggregationResult<()> {
        if let Some(size) = self.batch_size {
            batch_size_i32(size)?;
        }
        if let Some(max_time) = self.max_time {
            max_time_ms(max_time)?;
        }
        if let Some(ref vars) = self.let_vars {
            for name in vars.keys() {
                validate_variable_name(name)?;
            }
        }
        if let Some(ref comment) = self.comment {
            if comment.is_empty() {
                return Err(AggregationError::option("comment is empty"));
            }
        }
        Ok(())
    }

    /// Render the options as command fields.
    ///
    /// `cursor` is always present, since the server requires it.
    pub fn to_document(&self) -> AggregationResult<Document> {
        self.validate()?;
        let mut doc = Document::new();

        if let Some(allow) = self.allow_disk_use {
            doc.insert("allowDiskUse", allow);
        }

        let cursor = match self.batch_size {
            Some(size) => doc! { "batchSize": batch_size_i32(size)? },
            None => Document::new(),
        };
        doc.insert("cursor", cursor);

        if let Some(max_time) = self.max_time {
            doc.insert("maxTimeMS", max_time_ms(max_time)?);
        }
        if let Some(bypass) = self.bypass_document_validation {
            doc.insert("bypassDocumentValidation", bypass);
        }
        if let Some(ref collation) = self.collation {
            doc.insert("collation", collation.clone());
        }
        if let Some(ref hint) = self.hint {
            doc.insert("hint", Bson::from(hint));
        }
        if let Some(ref comment) = self.comment {
            doc.insert("comment", comment.as_str());
        }
        if let Some(ref vars) = self.let_vars {
            doc.insert("let", vars.clone());
        }

        Ok(doc)
    }
}

fn batch_size_i32(size: u32) -> AggregationResult<i32> {
    i32::try_from(size).map_err(|_| {
        AggregationError::option(format!("batch size {} exceeds the 32-bit limit", size))
    })
}

fn max_time_ms(max_time: Duration) -> AggregationResult<i64> {
    i64::try_from(max_time.as_millis())
        .map_err(|_| AggregationError::option("max time does not fit in milliseconds"))
}

/// Builder for [`AggregationOptions`].
#[derive(Debug, Default)]
pub struct AggregationOptionsBuilder {
    allow_disk_use: Option<bool>,
    batch_size: Option<u32>,
    max_time: Option<Duration>,
    bypass_document_validation: Option<bool>,
    collation: Option<Document>,
    hint: Option<Hint>,
    comment: Option<String>,
    let_vars: Option<Document>,
}

impl AggregationOptionsBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow stages to spill to disk.
    pub fn allow_disk_use(mut self, allow: bool) -> Self {
        self.allow_disk_use = Some(allow);
        self
    }

    /// Set the cursor batch size.
    pub fn batch_size(mut self, size: u32) -> Self {
        self.batch_size = Some(size);
        self
    }

    /// Set the server-side time limit.
    pub fn max_time(mut self, duration: Duration) -> Self {
        self.max_time = Some(duration);
        self
    }

    /// Skip document validation for `$out` / `$merge`.
    pub fn bypass_document_validation(mut self, bypass: bool) -> Self {
        self.bypass_document_validation = Some(bypass);
        self
    }

    /// Set the collation.
    pub fn collation(mut self, collation: Document) -> Self {
        self.collation = Some(collation);
        self
    }

    /// Hint an index by name or key pattern.
    pub fn hint(mut self, hint: Hint) -> Self {
        self.hint = Some(hint);
        self
    }

    /// Attach a comment.
    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Define a pipeline-wide variable.
    pub fn let_var(mut self, name: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.let_vars
            .get_or_insert_with(Document::new)
            .insert(name.into(), value.into());
        self
    }

    /// Build the options.
    pub fn build(self) -> AggregationResult<AggregationOptions> {
        let options = AggregationOptions {
            allow_disk_use: self.allow_disk_use,
            batch_size: self.batch_size,
            max_time: self.max_time,
            bypass_document_validation: self.bypass_document_validation,
            collation: self.collation,
            hint: self.hint,
            comment: self.comment,
            let_vars: self.let_vars,
        };
        options.validate()?;
        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_options() {
        let options = AggregationOptions::default();
        assert_eq!(options.to_document().unwrap(), doc! { "cursor": {} });
    }

    #[test]
    fn test_options_builder() {
        let options = AggregationOptions::builder()
            .allow_disk_use(true)
            .batch_size(100)
            .max_time(Duration::from_secs(2))
            .comment("nightly report")
            .hint(Hint::Name("status_1".into()))
            .let_var("cutoff", 10)
            .build()
            .unwrap();

        assert_eq!(
            options.to_document().unwrap(),
            doc! {
                "allowDiskUse": true,
                "cursor": { "batchSize": 100 },
                "maxTimeMS": 2000_i64,
                "hint": "status_1",
                "comment": "nightly report",
                "let": { "cutoff": 10 },
            }
        );
    }

    #[test]
    fn test_options_builder_rejects_invalid() {
        assert!(AggregationOptions::builder().batch_size(u32::MAX).build().is_err());
        assert!(AggregationOptions::builder().max_time(Duration::MAX).build().is_err());
        assert!(AggregationOptions::builder().let_var("Cutoff", 1).build().is_err());
        assert!(AggregationOptions::builder().comment("").build().is_err());
    }

    #[test]
    fn test_unvalidated_options_are_rejected_when_rendered() {
        let options = AggregationOptions {
            batch_size: Some(u32::MAX),
            ..Default::default()
        };
        assert!(matches!(
            options.to_document(),
            Err(AggregationError::InvalidOption(_))
        ));

        let options = AggregationOptions {
            max_time: Some(Duration::MAX),
            ..Default::default()
        };
        assert!(options.validate().is_err());

        let options = AggregationOptions {
            let_vars: Some(doc! { "Cutoff": 1 }),
            ..Default::default()
        };
        assert!(options.to_document().unwrap_err().is_invalid_operand());
    }
}
