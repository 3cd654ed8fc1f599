//! Declarative field-path tables.
//!
//! Typed property references are declared once per model instead of being
//! derived by reflection at runtime.

/// Declare typed [`Property`](crate::Property) accessors for model types.
///
/// For every listed field an associated `const fn` of the same name is added
/// to the model, returning `Property<Model, FieldType>`. A field stored under
/// a different name takes `=> "stored_name"`.
///
/// # Examples
///
/// ```rust
/// use prax_aggregation::{document_fields, expression};
/// use bson::doc;
///
/// struct Order { price: f64, placed_by: Customer }
/// struct Customer { name: String }
///
/// document_fields! {
///     Order {
///         price: f64,
///         placed_by: Customer => "customer",
///     }
///     Customer { name: String }
/// }
///
/// let expr = expression(|e| e.abs(Order::price())).unwrap();
/// assert_eq!(expr.to_document(), doc! { "$abs": "$price" });
///
/// let name = Order::placed_by().then(Customer::name());
/// assert_eq!(name.path(), "customer.name");
/// ```
#[macro_export]
macro_rules! document_fields {
    (@stored $field:ident) => {
        stringify!($field)
    };

    (@stored $field:ident, $stored:literal) => {
        $stored
    };

    ($( $owner:ty { $( $field:ident : $ty:ty $( => $stored:literal )? ),* $(,)? } )*) => {
        $(
            impl $owner {
                $(
                    #[doc = concat!("Typed reference to the `", stringify!($field), "` field.")]
                    #[allow(dead_code)]
                    pub const fn $field() -> $crate::Property<$owner, $ty> {
                        $crate::Property::new($crate::document_fields!(@stored $field $(, $stored)?))
                    }
                )*
            }
        )*
    };
}
