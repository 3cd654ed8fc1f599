//! Field paths and typed property references.
//!
//! Every operand that addresses document data ends up as a [`FieldPath`]:
//! a validated dotted path rooted either at the current document (`$a.b`)
//! or at a variable (`$$name.b`).
//!
//! [`Property`] is the typed counterpart. It carries the owning model and the
//! value type, so nested access only composes when the types line up:
//!
//! ```rust
//! use prax_aggregation::{Property, document_fields};
//!
//! struct Order { price: f64, customer: Customer }
//! struct Customer { address: Address }
//! struct Address { city: String }
//!
//! document_fields! {
//!     Order { price: f64, customer: Customer }
//!     Customer { address: Address }
//!     Address { city: String => "city_name" }
//! }
//!
//! let city = Order::customer().then(Customer::address()).then(Address::city());
//! assert_eq!(city.path(), "customer.address.city_name");
//! ```

use std::borrow::Cow;
use std::fmt;
use std::marker::PhantomData;

use smol_str::SmolStr;

use crate::error::{AggregationError, AggregationResult};

/// Variables the server defines for every pipeline.
const SYSTEM_VARIABLES: &[&str] = &[
    "NOW",
    "CLUSTER_TIME",
    "ROOT",
    "CURRENT",
    "REMOVE",
    "DESCEND",
    "PRUNE",
    "KEEP",
    "SEARCH_META",
    "USER_ROLES",
];

/// Where a field path starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathRoot {
    /// The document flowing through the pipeline (`$path`).
    Document,
    /// A system or `$let` variable (`$$path`).
    Variable,
}

/// A validated dotted path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath {
    root: PathRoot,
    path: SmolStr,
}

impl FieldPath {
    /// Parse a field name as written in an aggregation expression.
    ///
    /// Accepts `"a.b"`, `"$a.b"` (the leading `$` is stripped) and
    /// `"$$var.b"` for variable references.
    pub fn parse(input: &str) -> AggregationResult<Self> {
        if let Some(rest) = input.strip_prefix("$$") {
            return Self::variable(rest);
        }
        Self::document(input.strip_prefix('$').unwrap_or(input))
    }

    /// Create a path rooted at the current document.
    ///
    /// Unlike [`FieldPath::parse`], no `$` prefix is accepted.
    pub fn document(path: &str) -> AggregationResult<Self> {
        validate_segments(path)?;
        Ok(Self {
            root: PathRoot::Document,
            path: SmolStr::new(path),
        })
    }

    /// Create a variable reference, e.g. `total` or `ROOT.items`.
    pub fn variable(path: &str) -> AggregationResult<Self> {
        validate_segments(path)?;
        let name = path.split('.').next().unwrap_or_default();
        if !SYSTEM_VARIABLES.contains(&name) {
            validate_variable_name(name)?;
        }
        Ok(Self {
            root: PathRoot::Variable,
            path: SmolStr::new(path),
        })
    }

    /// The path root.
    pub fn root(&self) -> PathRoot {
        self.root
    }

    /// The dotted path without any `$` prefix.
    pub fn as_str(&self) -> &str {
        &self.path
    }

    /// Whether this path refers to a variable.
    pub fn is_variable(&self) -> bool {
        self.root == PathRoot::Variable
    }

    /// Iterate over the path segments.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.path.split('.')
    }

    /// Render the path as an expression operand (`$a.b` or `$$v.b`).
    pub fn to_reference(&self) -> String {
        match self.root {
            PathRoot::Document => format!("${}", self.path),
            PathRoot::Variable => format!("$${}", self.path),
        }
    }

    /// The bare path used as a document key (sort keys, search paths).
    ///
    /// Variable references do not name a stored field and are rejected.
    pub fn into_key(self) -> AggregationResult<String> {
        match self.root {
            PathRoot::Document => Ok(self.path.to_string()),
            PathRoot::Variable => Err(AggregationError::invalid_path(
                self.to_reference(),
                "a variable does not name a document field",
            )),
        }
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_reference())
    }
}

fn validate_segments(path: &str) -> AggregationResult<()> {
    if path.is_empty() {
        return Err(AggregationError::invalid_path(path, "path is empty"));
    }
    if path.contains('\0') {
        return Err(AggregationError::invalid_path(path, "path contains a NUL byte"));
    }
    for segment in path.split('.') {
        if segment.is_empty() {
            return Err(AggregationError::invalid_path(path, "path has an empty segment"));
        }
        if segment.starts_with('$') {
            return Err(AggregationError::invalid_path(
                path,
                "path segment starts with '$'",
            ));
        }
    }
    Ok(())
}

/// Check a user variable name as bound by `$let`.
///
/// Names start with a lowercase ASCII letter or a non-ASCII character and
/// contain only ASCII letters, digits, underscores and non-ASCII characters.
pub fn validate_variable_name(name: &str) -> AggregationResult<()> {
    let mut chars = name.chars();
    match chars.next() {
        None => Err(AggregationError::invalid_variable(name, "name is empty")),
        Some(first) if !(first.is_ascii_lowercase() || !first.is_ascii()) => {
            Err(AggregationError::invalid_variable(
                name,
                "name must start with a lowercase letter",
            ))
        }
        Some(_) => {
            if chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || !c.is_ascii()) {
                Ok(())
            } else {
                Err(AggregationError::invalid_variable(
                    name,
                    "name may only contain letters, digits and '_'",
                ))
            }
        }
    }
}

/// A typed reference to a field of `Owner` holding a `T`.
///
/// Construction is free and `const`; the path is validated when the
/// property is resolved into an operand.
pub struct Property<Owner, T> {
    path: Cow<'static, str>,
    _marker: PhantomData<fn(&Owner) -> T>,
}

impl<Owner, T> Property<Owner, T> {
    /// Reference a top-level field by its stored name.
    pub const fn new(path: &'static str) -> Self {
        Self {
            path: Cow::Borrowed(path),
            _marker: PhantomData,
        }
    }

    /// Reference a field by a path computed at runtime.
    pub fn from_path(path: impl Into<String>) -> Self {
        Self {
            path: Cow::Owned(path.into()),
            _marker: PhantomData,
        }
    }

    /// The dotted path, unvalidated.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Step into a field of the embedded document.
    ///
    /// Optional embedded documents (`Option<T>`) are traversed like `T`.
    pub fn then<Inner, U>(self, next: Property<Inner, U>) -> Property<Owner, U>
    where
        T: Embeds<Inner>,
    {
        Property::from_path(format!("{}.{}", self.path, next.path))
    }

    /// Resolve into a validated document path.
    pub fn to_field_path(&self) -> AggregationResult<FieldPath> {
        FieldPath::document(&self.path)
    }
}

impl<Owner, E> Property<Owner, Vec<E>> {
    /// Step into a field of each array element.
    pub fn each<U>(self, next: Property<E, U>) -> Property<Owner, Vec<U>> {
        Property::from_path(format!("{}.{}", self.path, next.path))
    }
}

/// Value types whose fields are those of the model `Inner`.
pub trait Embeds<Inner> {}

impl<T> Embeds<T> for T {}
impl<T> Embeds<T> for Option<T> {}

impl<Owner, T> Clone for Property<Owner, T> {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            _marker: PhantomData,
        }
    }
}

impl<Owner, T> fmt::Debug for Property<Owner, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Property").field(&self.path).finish()
    }
}

impl<Owner, T> PartialEq for Property<Owner, T> {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl<Owner, T> Eq for Property<Owner, T> {}

/// Anything that names a stored field without the `$` operand prefix.
pub trait IntoFieldPath {
    /// Resolve into a validated path.
    fn into_field_path(self) -> AggregationResult<FieldPath>;
}

impl IntoFieldPath for FieldPath {
    fn into_field_path(self) -> AggregationResult<FieldPath> {
        Ok(self)
    }
}

impl IntoFieldPath for &str {
    fn into_field_path(self) -> AggregationResult<FieldPath> {
        FieldPath::parse(self)
    }
}

impl IntoFieldPath for String {
    fn into_field_path(self) -> AggregationResult<FieldPath> {
        FieldPath::parse(&self)
    }
}

impl IntoFieldPath for &String {
    fn into_field_path(self) -> AggregationResult<FieldPath> {
        FieldPath::parse(self)
    }
}

impl<Owner, T> IntoFieldPath for Property<Owner, T> {
    fn into_field_path(self) -> AggregationResult<FieldPath> {
        self.to_field_path()
    }
}

impl<Owner, T> IntoFieldPath for &Property<Owner, T> {
    fn into_field_path(self) -> AggregationResult<FieldPath> {
        self.to_field_path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Order;
    struct Customer;
    struct Line;

    #[test]
    fn test_parse_plain_and_prefixed() {
        let plain = FieldPath::parse("order.price").unwrap();
        let prefixed = FieldPath::parse("$order.price").unwrap();
        assert_eq!(plain, prefixed);
        assert_eq!(plain.to_reference(), "$order.price");
        assert_eq!(plain.segments().collect::<Vec<_>>(), vec!["order", "price"]);
    }

    #[test]
    fn test_parse_variable() {
        let var = FieldPath::parse("$$total.amount").unwrap();
        assert!(var.is_variable());
        assert_eq!(var.as_str(), "total.amount");
        assert_eq!(var.to_string(), "$$total.amount");

        let root = FieldPath::parse("$$ROOT").unwrap();
        assert_eq!(root.root(), PathRoot::Variable);
    }

    #[test]
    fn test_parse_rejects_invalid() {
        assert!(FieldPath::parse("").is_err());
        assert!(FieldPath::parse("$").is_err());
        assert!(FieldPath::parse("a..b").is_err());
        assert!(FieldPath::parse(".a").is_err());
        assert!(FieldPath::parse("a.").is_err());
        assert!(FieldPath::parse("a.$b").is_err());
        assert!(FieldPath::parse("$$Total").is_err());
        assert!(FieldPath::document("$a").is_err());
    }

    #[test]
    fn test_variable_names() {
        assert!(validate_variable_name("total").is_ok());
        assert!(validate_variable_name("t_2").is_ok());
        assert!(validate_variable_name("ünits").is_ok());
        assert!(validate_variable_name("Total").is_err());
        assert!(validate_variable_name("_total").is_err());
        assert!(validate_variable_name("to-tal").is_err());
        assert!(validate_variable_name("").is_err());
    }

    #[test]
    fn test_into_key_rejects_variables() {
        assert_eq!(FieldPath::parse("a.b").unwrap().into_key().unwrap(), "a.b");
        assert!(FieldPath::parse("$$ROOT").unwrap().into_key().is_err());
    }

    #[test]
    fn test_property_then() {
        let customer: Property<Order, Customer> = Property::new("customer");
        let name: Property<Customer, String> = Property::new("name");
        let path = customer.then(name);
        assert_eq!(path.path(), "customer.name");
        assert_eq!(path.to_field_path().unwrap().to_reference(), "$customer.name");
    }

    #[test]
    fn test_property_then_through_option() {
        let customer: Property<Order, Option<Customer>> = Property::new("customer");
        let name: Property<Customer, String> = Property::new("name");
        let path = customer.then(name);
        assert_eq!(path.path(), "customer.name");
        assert_eq!(path.to_field_path().unwrap().to_reference(), "$customer.name");
    }

    #[test]
    fn test_property_each() {
        let lines: Property<Order, Vec<Line>> = Property::new("lines");
        let qty: Property<Line, i32> = Property::new("qty");
        assert_eq!(lines.each(qty).path(), "lines.qty");
    }

    #[test]
    fn test_property_invalid_path() {
        let empty: Property<Order, f64> = Property::new("");
        let err = empty.to_field_path().unwrap_err();
        assert!(err.is_invalid_operand());

        let dollar: Property<Order, f64> = Property::new("$price");
        assert!(dollar.to_field_path().is_err());
    }
}
