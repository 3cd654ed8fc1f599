//! Operand resolution.
//!
//! Builder methods accept several input shapes for the same slot: a field
//! name, a typed [`Property`], a literal value, or a nested expression. The
//! [`IntoOperand`] family normalizes all of them into one [`Operand`] so the
//! emitted fragment depends only on the resolved value.

use bson::{Bson, Decimal128, Document, doc};
use chrono::{DateTime, Utc};

use crate::error::{AggregationError, AggregationResult};
use crate::expression::{Expression, ExpressionBuilder};
use crate::path::{FieldPath, Property};
use crate::types::{Arithmetic, Numeric};

/// A resolved operand slot.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// A field referenced by name.
    Field(FieldPath),
    /// A field referenced through a typed property.
    Property(FieldPath),
    /// A literal value, emitted as-is.
    Value(Bson),
    /// A nested expression.
    Expression(Box<Expression>),
}

impl Operand {
    /// Reference a field by name.
    pub fn field(name: &str) -> AggregationResult<Self> {
        FieldPath::parse(name).map(Self::Field)
    }

    /// Wrap a literal value.
    ///
    /// Values the server would evaluate, such as `"$price"` or
    /// `{ "$ceil": 1 }`, become a `$literal` expression instead.
    pub fn value(value: impl Into<Bson>) -> Self {
        let value = value.into();
        if needs_literal(&value) {
            Self::Expression(Box::new(Expression::literal_value(value)))
        } else {
            Self::Value(value)
        }
    }

    /// The referenced path, for field and property operands.
    pub fn field_path(&self) -> Option<&FieldPath> {
        match self {
            Self::Field(path) | Self::Property(path) => Some(path),
            _ => None,
        }
    }

    /// The literal value, for value operands.
    pub fn as_value(&self) -> Option<&Bson> {
        match self {
            Self::Value(value) => Some(value),
            _ => None,
        }
    }

    /// The nested expression, for expression operands.
    pub fn as_expression(&self) -> Option<&Expression> {
        match self {
            Self::Expression(expr) => Some(expr),
            _ => None,
        }
    }

    /// Compare by emitted content, ignoring whether a path came from a name
    /// or a typed property.
    pub fn is_equivalent(&self, other: &Operand) -> bool {
        self.to_bson() == other.to_bson()
    }

    /// Render the operand as it appears inside a fragment.
    pub fn to_bson(&self) -> Bson {
        match self {
            Self::Field(path) | Self::Property(path) => Bson::String(path.to_reference()),
            Self::Value(value) if needs_literal(value) => {
                Bson::Document(doc! { "$literal": value.clone() })
            }
            Self::Value(value) => value.clone(),
            Self::Expression(expr) => Bson::Document(expr.to_document()),
        }
    }

    /// Recover an operand from its rendered form.
    ///
    /// `$`-prefixed strings become field paths and single-key `$`-operator
    /// documents become nested expressions. Other values are literals, as
    /// long as nothing inside them would be evaluated by the server.
    pub fn from_bson(value: &Bson) -> AggregationResult<Self> {
        match value {
            Bson::String(s) if s.starts_with('$') => FieldPath::parse(s).map(Self::Field),
            Bson::Document(doc) if doc.len() == 1 && has_operator_key(doc) => {
                Expression::from_document(doc).map(|expr| Self::Expression(Box::new(expr)))
            }
            other if needs_literal(other) => Err(AggregationError::malformed(
                "operand",
                "embedded field paths and operators are only supported as operator operands",
            )),
            other => Ok(Self::Value(other.clone())),
        }
    }
}

fn has_operator_key(doc: &Document) -> bool {
    doc.keys().any(|key| key.starts_with('$'))
}

/// Whether the server would evaluate part of `value` instead of taking it
/// verbatim.
fn needs_literal(value: &Bson) -> bool {
    match value {
        Bson::String(s) => s.starts_with('$'),
        Bson::Document(doc) => has_operator_key(doc) || doc.values().any(needs_literal),
        Bson::Array(items) => items.iter().any(needs_literal),
        _ => false,
    }
}

impl From<Operand> for Bson {
    fn from(operand: Operand) -> Self {
        operand.to_bson()
    }
}

/// A configuration block that builds a nested expression.
///
/// Created with [`nested`].
pub struct Nested<F>(F);

/// Use a builder block as an operand.
///
/// ```rust
/// use prax_aggregation::{expression, nested};
/// use bson::doc;
///
/// let expr = expression(|e| e.abs(nested(|e| e.ceil("x")))).unwrap();
/// assert_eq!(expr.to_document(), doc! { "$abs": { "$ceil": "$x" } });
/// ```
pub fn nested<F>(configure: F) -> Nested<F>
where
    F: FnOnce(&ExpressionBuilder) -> AggregationResult<Expression>,
{
    Nested(configure)
}

/// Anything that resolves into an [`Operand`].
pub trait IntoOperand {
    /// Resolve into an operand.
    fn into_operand(self) -> AggregationResult<Operand>;
}

/// Operands accepted by numeric operators.
pub trait NumericOperand: IntoOperand {}

/// Operands accepted by date-aware arithmetic.
pub trait ArithmeticOperand: IntoOperand {}

impl IntoOperand for Operand {
    fn into_operand(self) -> AggregationResult<Operand> {
        Ok(self)
    }
}

impl IntoOperand for &str {
    fn into_operand(self) -> AggregationResult<Operand> {
        Operand::field(self)
    }
}

impl IntoOperand for String {
    fn into_operand(self) -> AggregationResult<Operand> {
        Operand::field(&self)
    }
}

impl IntoOperand for &String {
    fn into_operand(self) -> AggregationResult<Operand> {
        Operand::field(self)
    }
}

impl IntoOperand for FieldPath {
    fn into_operand(self) -> AggregationResult<Operand> {
        Ok(Operand::Field(self))
    }
}

impl<Owner, T> IntoOperand for Property<Owner, T> {
    fn into_operand(self) -> AggregationResult<Operand> {
        self.to_field_path().map(Operand::Property)
    }
}

impl<Owner, T> IntoOperand for &Property<Owner, T> {
    fn into_operand(self) -> AggregationResult<Operand> {
        self.to_field_path().map(Operand::Property)
    }
}

impl IntoOperand for Expression {
    fn into_operand(self) -> AggregationResult<Operand> {
        Ok(Operand::Expression(Box::new(self)))
    }
}

impl IntoOperand for AggregationResult<Expression> {
    fn into_operand(self) -> AggregationResult<Operand> {
        self.map(|expr| Operand::Expression(Box::new(expr)))
    }
}

impl<F> IntoOperand for Nested<F>
where
    F: FnOnce(&ExpressionBuilder) -> AggregationResult<Expression>,
{
    fn into_operand(self) -> AggregationResult<Operand> {
        (self.0)(&ExpressionBuilder::new()).into_operand()
    }
}

impl IntoOperand for Bson {
    fn into_operand(self) -> AggregationResult<Operand> {
        Ok(Operand::value(self))
    }
}

impl IntoOperand for bool {
    fn into_operand(self) -> AggregationResult<Operand> {
        Ok(Operand::Value(Bson::Boolean(self)))
    }
}

macro_rules! literal_operands {
    ($($ty:ty => $conv:expr),* $(,)?) => {
        $(
            impl IntoOperand for $ty {
                fn into_operand(self) -> AggregationResult<Operand> {
                    let conv: fn($ty) -> Bson = $conv;
                    Ok(Operand::Value(conv(self)))
                }
            }
        )*
    };
}

literal_operands! {
    i32 => Bson::Int32,
    i64 => Bson::Int64,
    u32 => |v| Bson::Int64(i64::from(v)),
    f32 => |v| Bson::Double(f64::from(v)),
    f64 => Bson::Double,
    Decimal128 => Bson::Decimal128,
    bson::DateTime => Bson::DateTime,
    DateTime<Utc> => |v| Bson::DateTime(bson::DateTime::from_chrono(v)),
}

macro_rules! accept {
    ($marker:ident: $($ty:ty),* $(,)?) => {
        $( impl $marker for $ty {} )*
    };
}

accept!(NumericOperand: Operand, &str, String, &String, FieldPath, Expression, i32, i64, u32, f32, f64, Decimal128);
accept!(ArithmeticOperand: Operand, &str, String, &String, FieldPath, Expression, i32, i64, u32, f32, f64, Decimal128);
accept!(ArithmeticOperand: bson::DateTime, DateTime<Utc>);

impl NumericOperand for AggregationResult<Expression> {}
impl ArithmeticOperand for AggregationResult<Expression> {}

impl<F> NumericOperand for Nested<F> where
    F: FnOnce(&ExpressionBuilder) -> AggregationResult<Expression>
{
}
impl<F> ArithmeticOperand for Nested<F> where
    F: FnOnce(&ExpressionBuilder) -> AggregationResult<Expression>
{
}

impl<Owner, T: Numeric> NumericOperand for Property<Owner, T> {}
impl<Owner, T: Numeric> NumericOperand for &Property<Owner, T> {}
impl<Owner, T: Arithmetic> ArithmeticOperand for Property<Owner, T> {}
impl<Owner, T: Arithmetic> ArithmeticOperand for &Property<Owner, T> {}
