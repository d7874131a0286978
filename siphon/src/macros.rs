//! Shorthands for building and returning [`crate::error::SiphonError`] values.

/// Creates a [`crate::error::SiphonError`] from a kind and a static description, with optional
/// dynamic detail and source error.
#[macro_export]
macro_rules! siphon_error {
    ($kind:expr, $desc:expr) => {
        $crate::error::SiphonError::from(($kind, $desc))
    };
    ($kind:expr, $desc:expr, source: $source:expr) => {
        $crate::error::SiphonError::from(($kind, $desc)).with_source($source)
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        $crate::error::SiphonError::from(($kind, $desc, $detail.to_string()))
    };
    ($kind:expr, $desc:expr, $detail:expr, source: $source:expr) => {
        $crate::error::SiphonError::from(($kind, $desc, $detail.to_string())).with_source($source)
    };
}

/// Returns early with a [`crate::error::SiphonError`], accepting the same arguments as
/// [`siphon_error!`].
#[macro_export]
macro_rules! bail {
    ($kind:expr, $desc:expr) => {
        return ::core::result::Result::Err($crate::siphon_error!($kind, $desc))
    };
    ($kind:expr, $desc:expr, source: $source:expr) => {
        return ::core::result::Result::Err($crate::siphon_error!($kind, $desc, source: $source))
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        return ::core::result::Result::Err($crate::siphon_error!($kind, $desc, $detail))
    };
    ($kind:expr, $desc:expr, $detail:expr, source: $source:expr) => {
        return ::core::result::Result::Err($crate::siphon_error!(
            $kind,
            $desc,
            $detail,
            source: $source
        ))
    };
}
