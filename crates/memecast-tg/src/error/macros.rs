/// Creates a crate-level [`Error`](crate::Error) from an [`ErrorKind`](crate::ErrorKind)
/// sub-error variant. Accepts the variant path and its fields, calling [`Into`]
/// on each of the field values.
macro_rules! err {
    (@val $variant_ident:ident $field_val:expr) => ($field_val);
    (@val $variant_ident:ident) => ($variant_ident);
    ($variant_path:path $({
        $( $field_ident:ident $(: $field_val:expr)? ),*
        $(,)?
    })?) => {{
        use $variant_path as Variant;

        $crate::error::Error::from(
            Variant $({$(
                $field_ident: ::std::convert::Into::into(
                    $crate::error::err!(@val $field_ident $($field_val)?)
                )
            ),*})?
        )
    }};
}

/// Shortcut for defining `map_err` closures that automatically forwards `source`
/// error to the variant.
macro_rules! err_ctx {
    ($variant_path:path $({ $($variant_fields:tt)* })?) => {
        |source| $crate::error::err!($variant_path { source, $($($variant_fields)*)? })
    };
}

/// Creates an [`ErrorKind::Fatal`](crate::ErrorKind::Fatal) error with the given
/// formatting string
macro_rules! fatal {
    ($($arg:tt)*) => {
        $crate::error::err!($crate::error::ErrorKind::Fatal {
            message: format!($($arg)*),
            source: None::<Box<$crate::util::DynError>>,
        })
    };
}

pub(crate) use err;
pub(crate) use err_ctx;
pub(crate) use fatal;
