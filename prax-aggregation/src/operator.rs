//! The operator table.
//!
//! Each supported aggregation operator has a fixed keyword, operand arity and
//! document shape. Emission and parsing both dispatch on this table, so a
//! fragment's layout never depends on how it was built.

use std::fmt;

use crate::error::Arity;

/// How an operator lays out its operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// `{ "$op": <operand> }`
    Single,
    /// `{ "$op": [<operand>, ...] }`
    Array,
    /// `{ "$let": { "vars": {...}, "in": <operand> } }`
    Let,
    /// `{ "$op": {} }`
    Empty,
}

/// A supported aggregation expression operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// `$abs`
    Abs,
    /// `$add`
    Add,
    /// `$ceil`
    Ceil,
    /// `$count` accumulator.
    Count,
    /// `$divide`
    Divide,
    /// `$exp`
    Exp,
    /// `$floor`
    Floor,
    /// `$let`
    Let,
    /// `$literal`
    Literal,
    /// `$ln`
    Ln,
    /// `$log10`
    Log10,
    /// `$mod`
    Mod,
    /// `$multiply`
    Multiply,
    /// `$pow`
    Pow,
    /// `$sqrt`
    Sqrt,
    /// `$subtract`
    Subtract,
    /// `$sum` accumulator.
    Sum,
    /// `$trunc`
    Trunc,
}

impl Operator {
    /// Every operator in the table.
    pub const ALL: [Operator; 18] = [
        Self::Abs,
        Self::Add,
        Self::Ceil,
        Self::Count,
        Self::Divide,
        Self::Exp,
        Self::Floor,
        Self::Let,
        Self::Literal,
        Self::Ln,
        Self::Log10,
        Self::Mod,
        Self::Multiply,
        Self::Pow,
        Self::Sqrt,
        Self::Subtract,
        Self::Sum,
        Self::Trunc,
    ];

    /// The operator keyword, including the `$`.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Abs => "$abs",
            Self::Add => "$add",
            Self::Ceil => "$ceil",
            Self::Count => "$count",
            Self::Divide => "$divide",
            Self::Exp => "$exp",
            Self::Floor => "$floor",
            Self::Let => "$let",
            Self::Literal => "$literal",
            Self::Ln => "$ln",
            Self::Log10 => "$log10",
            Self::Mod => "$mod",
            Self::Multiply => "$multiply",
            Self::Pow => "$pow",
            Self::Sqrt => "$sqrt",
            Self::Subtract => "$subtract",
            Self::Sum => "$sum",
            Self::Trunc => "$trunc",
        }
    }

    /// Positional operand count. `$let` bindings are not counted.
    pub const fn arity(self) -> Arity {
        match self.shape() {
            Shape::Empty => Arity::None,
            Shape::Single | Shape::Let => Arity::Exactly(1),
            Shape::Array => match self {
                Self::Add | Self::Multiply => Arity::AtLeast(1),
                _ => Arity::Exactly(2),
            },
        }
    }

    /// Document layout.
    pub const fn shape(self) -> Shape {
        match self {
            Self::Count => Shape::Empty,
            Self::Let => Shape::Let,
            Self::Add | Self::Divide | Self::Mod | Self::Multiply | Self::Pow | Self::Subtract => {
                Shape::Array
            }
            _ => Shape::Single,
        }
    }

    /// Look an operator up by keyword.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.name() == name)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
