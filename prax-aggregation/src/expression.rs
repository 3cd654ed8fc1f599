//! Aggregation expressions and the expression builder.
//!
//! [`ExpressionBuilder`] exposes one method per operator in the
//! [`Operator`] table. Each method resolves its inputs through
//! [`IntoOperand`] and returns an immutable [`Expression`] that renders to a
//! `bson::Document`:
//!
//! ```rust
//! use prax_aggregation::expression;
//! use bson::doc;
//!
//! let expr = expression(|e| e.abs(e.ceil("x"))).unwrap();
//! assert_eq!(expr.to_document(), doc! { "$abs": { "$ceil": "$x" } });
//!
//! let total = expression(|e| e.add(|a| a.of("price").of("fee").of(5))).unwrap();
//! assert_eq!(total.to_document(), doc! { "$add": ["$price", "$fee", 5] });
//! ```

use std::fmt;

use bson::{Bson, Document};
use indexmap::IndexMap;
use serde::{Serialize, Serializer};
use smol_str::SmolStr;
use tracing::trace;

use crate::error::{AggregationError, AggregationResult};
use crate::operand::{ArithmeticOperand, IntoOperand, NumericOperand, Operand};
use crate::operator::{Operator, Shape};
use crate::path::validate_variable_name;

/// A single operator invocation with its resolved operands.
#[derive(Debug, Clone)]
pub struct Expression {
    operator: Operator,
    operands: Vec<Operand>,
    variables: IndexMap<SmolStr, Operand>,
}

impl Expression {
    /// Assemble an expression, checking the operator's arity.
    pub fn new(operator: Operator, operands: Vec<Operand>) -> AggregationResult<Self> {
        Self::assemble(operator, operands, IndexMap::new())
    }

    /// `{ "$literal": value }`, which always has exactly one operand.
    pub(crate) fn literal_value(value: Bson) -> Self {
        Self {
            operator: Operator::Literal,
            operands: vec![Operand::Value(value)],
            variables: IndexMap::new(),
        }
    }

    fn assemble(
        operator: Operator,
        operands: Vec<Operand>,
        variables: IndexMap<SmolStr, Operand>,
    ) -> AggregationResult<Self> {
        let arity = operator.arity();
        if !arity.accepts(operands.len()) {
            return Err(AggregationError::arity(
                operator.name(),
                arity,
                operands.len(),
            ));
        }
        trace!(
            operator = operator.name(),
            operands = operands.len(),
            "built aggregation expression"
        );
        Ok(Self {
            operator,
            operands,
            variables,
        })
    }

    /// The operator.
    pub fn operator(&self) -> Operator {
        self.operator
    }

    /// Positional operands in call-site order.
    pub fn operands(&self) -> &[Operand] {
        &self.operands
    }

    /// `$let` bindings in declaration order; empty for other operators.
    pub fn variables(&self) -> &IndexMap<SmolStr, Operand> {
        &self.variables
    }

    /// Compare by emitted content, ignoring operand provenance.
    pub fn is_equivalent(&self, other: &Expression) -> bool {
        self.operator == other.operator
            && self.operands.len() == other.operands.len()
            && self
                .operands
                .iter()
                .zip(&other.operands)
                .all(|(a, b)| a.is_equivalent(b))
            && self.variables.len() == other.variables.len()
            && self
                .variables
                .iter()
                .zip(&other.variables)
                .all(|((ka, va), (kb, vb))| ka == kb && va.is_equivalent(vb))
    }

    /// Render the expression fragment.
    pub fn to_document(&self) -> Document {
        let body = match self.operator.shape() {
            Shape::Single if self.operator == Operator::Literal => {
                match self.operands.first() {
                    Some(Operand::Value(value)) => value.clone(),
                    other => other.map_or(Bson::Null, Operand::to_bson),
                }
            }
            Shape::Single => self.operands.first().map_or(Bson::Null, Operand::to_bson),
            Shape::Array => Bson::Array(self.operands.iter().map(Operand::to_bson).collect()),
            Shape::Empty => Bson::Document(Document::new()),
            Shape::Let => {
                let mut vars = Document::new();
                for (name, value) in &self.variables {
                    vars.insert(name.as_str(), value.to_bson());
                }
                let mut body = Document::new();
                body.insert("vars", vars);
                body.insert(
                    "in",
                    self.operands.first().map_or(Bson::Null, Operand::to_bson),
                );
                Bson::Document(body)
            }
        };

        let mut doc = Document::new();
        doc.insert(self.operator.name(), body);
        doc
    }

    /// Render the fragment as relaxed extended JSON.
    pub fn to_json(&self) -> serde_json::Value {
        Bson::Document(self.to_document()).into_relaxed_extjson()
    }

    /// Recover an expression from a rendered fragment.
    ///
    /// `$literal` content is kept as an opaque value.
    pub fn from_document(doc: &Document) -> AggregationResult<Self> {
        let mut entries = doc.iter();
        let (key, body) = match (entries.next(), entries.next()) {
            (Some(entry), None) => entry,
            _ => {
                return Err(AggregationError::malformed(
                    "expression",
                    format!("expected exactly one operator key, found {}", doc.len()),
                ));
            }
        };
        let operator =
            Operator::from_name(key).ok_or_else(|| AggregationError::UnknownOperator(key.clone()))?;

        match operator.shape() {
            Shape::Single if operator == Operator::Literal => {
                Self::new(operator, vec![Operand::Value(body.clone())])
            }
            Shape::Single => {
                let operand = match body {
                    Bson::Array(items) if items.len() == 1 => &items[0],
                    single => single,
                };
                Self::new(operator, vec![Operand::from_bson(operand)?])
            }
            Shape::Array => {
                let operands = match body {
                    Bson::Array(items) => items
                        .iter()
                        .map(Operand::from_bson)
                        .collect::<AggregationResult<Vec<_>>>()?,
                    single => vec![Operand::from_bson(single)?],
                };
                Self::new(operator, operands)
            }
            Shape::Empty => match body {
                Bson::Document(inner) if inner.is_empty() => Self::new(operator, Vec::new()),
                _ => Err(AggregationError::malformed(
                    operator.name(),
                    "expected an empty document",
                )),
            },
            Shape::Let => Self::let_from_bson(body),
        }
    }

    fn let_from_bson(body: &Bson) -> AggregationResult<Self> {
        let body = body
            .as_document()
            .ok_or_else(|| AggregationError::malformed("$let", "expected a document"))?;
        let vars = match body.get("vars") {
            Some(Bson::Document(vars)) => vars,
            Some(_) => return Err(AggregationError::malformed("$let", "'vars' is not a document")),
            None => return Err(AggregationError::missing_argument("$let", "vars")),
        };
        let inner = body
            .get("in")
            .ok_or_else(|| AggregationError::missing_argument("$let", "in"))?;

        let mut variables = IndexMap::with_capacity(vars.len());
        for (name, value) in vars {
            validate_variable_name(name)?;
            variables.insert(SmolStr::new(name), Operand::from_bson(value)?);
        }
        Self::assemble(Operator::Let, vec![Operand::from_bson(inner)?], variables)
    }
}

impl PartialEq for Expression {
    fn eq(&self, other: &Self) -> bool {
        self.operator == other.operator
            && self.operands == other.operands
            && self.variables.iter().eq(other.variables.iter())
    }
}

impl From<Expression> for Document {
    fn from(expr: Expression) -> Self {
        expr.to_document()
    }
}

impl From<Expression> for Bson {
    fn from(expr: Expression) -> Self {
        Bson::Document(expr.to_document())
    }
}

impl Serialize for Expression {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_document().serialize(serializer)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

/// Collects operands for a variadic operator.
///
/// Operand order is call order. The first resolution error is kept and
/// reported when the expression is built.
#[derive(Debug, Default)]
struct OperandList {
    operands: Vec<Operand>,
    error: Option<AggregationError>,
}

impl OperandList {
    fn push(&mut self, operand: AggregationResult<Operand>) {
        match operand {
            Ok(operand) => self.operands.push(operand),
            Err(err) => {
                self.error.get_or_insert(err);
            }
        }
    }

    fn finish(self, operator: Operator) -> AggregationResult<Expression> {
        match self.error {
            Some(err) => Err(err),
            None => Expression::new(operator, self.operands),
        }
    }
}

/// Operands for `$add`: numbers, or numbers and at most one date.
#[derive(Debug, Default)]
pub struct ArithmeticOperands {
    list: OperandList,
}

impl ArithmeticOperands {
    /// Append an operand.
    pub fn of(mut self, operand: impl ArithmeticOperand) -> Self {
        self.list.push(operand.into_operand());
        self
    }
}

/// Operands for `$multiply`.
#[derive(Debug, Default)]
pub struct NumericOperands {
    list: OperandList,
}

impl NumericOperands {
    /// Append an operand.
    pub fn of(mut self, operand: impl NumericOperand) -> Self {
        self.list.push(operand.into_operand());
        self
    }
}

/// Bindings and body for `$let`.
#[derive(Debug, Default)]
pub struct LetBindings {
    variables: IndexMap<SmolStr, Operand>,
    body: Option<Operand>,
    error: Option<AggregationError>,
}

impl LetBindings {
    /// Bind a variable, referenced in the body as `$$name`.
    pub fn var(mut self, name: &str, value: impl IntoOperand) -> Self {
        let bound = validate_variable_name(name).and_then(|()| {
            if self.variables.contains_key(name) {
                Err(AggregationError::invalid_variable(
                    name,
                    "variable is already bound",
                ))
            } else {
                value.into_operand()
            }
        });
        match bound {
            Ok(operand) => {
                self.variables.insert(SmolStr::new(name), operand);
            }
            Err(err) => {
                self.error.get_or_insert(err);
            }
        }
        self
    }

    /// Set the expression evaluated with the bindings in scope.
    pub fn in_expression(mut self, body: impl IntoOperand) -> Self {
        match body.into_operand() {
            Ok(operand) => self.body = Some(operand),
            Err(err) => {
                self.error.get_or_insert(err);
            }
        }
        self
    }

    fn finish(self) -> AggregationResult<Expression> {
        if let Some(err) = self.error {
            return Err(err);
        }
        let body = self
            .body
            .ok_or_else(|| AggregationError::missing_argument("$let", "in"))?;
        Expression::assemble(Operator::Let, vec![body], self.variables)
    }
}

/// Builds aggregation expressions, one method per operator.
///
/// The builder holds no state; configuration blocks receive it by reference
/// so nested expressions read like the fragment they produce.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpressionBuilder;

impl ExpressionBuilder {
    /// Create a builder.
    pub fn new() -> Self {
        Self
    }

    fn unary(&self, operator: Operator, value: impl IntoOperand) -> AggregationResult<Expression> {
        Expression::new(operator, vec![value.into_operand()?])
    }

    fn binary(
        &self,
        operator: Operator,
        first: impl IntoOperand,
        second: impl IntoOperand,
    ) -> AggregationResult<Expression> {
        Expression::new(operator, vec![first.into_operand()?, second.into_operand()?])
    }

    /// Absolute value of a number (`$abs`).
    pub fn abs(&self, value: impl NumericOperand) -> AggregationResult<Expression> {
        self.unary(Operator::Abs, value)
    }

    /// Smallest integer greater than or equal to a number (`$ceil`).
    pub fn ceil(&self, value: impl NumericOperand) -> AggregationResult<Expression> {
        self.unary(Operator::Ceil, value)
    }

    /// Euler's number raised to a power (`$exp`).
    pub fn exp(&self, value: impl NumericOperand) -> AggregationResult<Expression> {
        self.unary(Operator::Exp, value)
    }

    /// Largest integer less than or equal to a number (`$floor`).
    pub fn floor(&self, value: impl NumericOperand) -> AggregationResult<Expression> {
        self.unary(Operator::Floor, value)
    }

    /// Natural logarithm (`$ln`).
    pub fn ln(&self, value: impl NumericOperand) -> AggregationResult<Expression> {
        self.unary(Operator::Ln, value)
    }

    /// Base-10 logarithm (`$log10`).
    pub fn log10(&self, value: impl NumericOperand) -> AggregationResult<Expression> {
        self.unary(Operator::Log10, value)
    }

    /// Square root (`$sqrt`).
    pub fn sqrt(&self, value: impl NumericOperand) -> AggregationResult<Expression> {
        self.unary(Operator::Sqrt, value)
    }

    /// Truncate to an integer (`$trunc`).
    pub fn trunc(&self, value: impl NumericOperand) -> AggregationResult<Expression> {
        self.unary(Operator::Trunc, value)
    }

    /// Sum of numbers, or a date plus milliseconds (`$add`).
    ///
    /// At most one operand may resolve to a date. Operands are emitted in
    /// the order they were added.
    pub fn add<F>(&self, configure: F) -> AggregationResult<Expression>
    where
        F: FnOnce(ArithmeticOperands) -> ArithmeticOperands,
    {
        configure(ArithmeticOperands::default())
            .list
            .finish(Operator::Add)
    }

    /// Product of numbers (`$multiply`).
    pub fn multiply<F>(&self, configure: F) -> AggregationResult<Expression>
    where
        F: FnOnce(NumericOperands) -> NumericOperands,
    {
        configure(NumericOperands::default())
            .list
            .finish(Operator::Multiply)
    }

    /// First number divided by the second (`$divide`).
    pub fn divide(
        &self,
        dividend: impl NumericOperand,
        divisor: impl NumericOperand,
    ) -> AggregationResult<Expression> {
        self.binary(Operator::Divide, dividend, divisor)
    }

    /// Remainder of the first number divided by the second (`$mod`).
    pub fn modulo(
        &self,
        dividend: impl NumericOperand,
        divisor: impl NumericOperand,
    ) -> AggregationResult<Expression> {
        self.binary(Operator::Mod, dividend, divisor)
    }

    /// A number raised to an exponent (`$pow`).
    pub fn pow(
        &self,
        base: impl NumericOperand,
        exponent: impl NumericOperand,
    ) -> AggregationResult<Expression> {
        self.binary(Operator::Pow, base, exponent)
    }

    /// Difference of two numbers or dates, or a date minus milliseconds
    /// (`$subtract`). Put the date first when mixing dates and numbers.
    pub fn subtract(
        &self,
        minuend: impl ArithmeticOperand,
        subtrahend: impl ArithmeticOperand,
    ) -> AggregationResult<Expression> {
        self.binary(Operator::Subtract, minuend, subtrahend)
    }

    /// Number of documents in a group: `{ "$count": {} }`.
    pub fn count(&self) -> AggregationResult<Expression> {
        Expression::new(Operator::Count, Vec::new())
    }

    /// Count of documents as a sum: `{ "$sum": 1 }`.
    pub fn sum(&self) -> AggregationResult<Expression> {
        Expression::new(Operator::Sum, vec![Operand::Value(Bson::Int32(1))])
    }

    /// A value the pipeline must not interpret (`$literal`).
    ///
    /// Strings are kept verbatim, so `"$price"` stays a string.
    pub fn literal(&self, value: impl Into<Bson>) -> AggregationResult<Expression> {
        Expression::new(Operator::Literal, vec![Operand::Value(value.into())])
    }

    /// Wrap the fragment built by `configure` in `$literal`.
    pub fn literal_of<F>(&self, configure: F) -> AggregationResult<Expression>
    where
        F: FnOnce(&ExpressionBuilder) -> AggregationResult<Expression>,
    {
        let inner = configure(self)?;
        self.literal(inner)
    }

    /// Bind variables for a subexpression (`$let`).
    pub fn let_in<F>(&self, configure: F) -> AggregationResult<Expression>
    where
        F: FnOnce(LetBindings) -> LetBindings,
    {
        configure(LetBindings::default()).finish()
    }
}

/// Build an expression with a fresh [`ExpressionBuilder`].
pub fn expression<F>(configure: F) -> AggregationResult<Expression>
where
    F: FnOnce(&ExpressionBuilder) -> AggregationResult<Expression>,
{
    configure(&ExpressionBuilder::new())
}
