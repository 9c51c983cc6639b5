/// Returns the intended release as an `Option<Cow<'static, str>>`.
///
/// This can be used with `ClientOptions` to set the release name.  It uses
/// the information supplied by cargo to calculate a release.
///
/// # Examples
///
/// ```
/// let options = sentinel_core::ClientOptions {
///     release: sentinel_core::release_name!(),
///     ..Default::default()
/// };
/// assert!(options.release.is_some());
/// ```
#[macro_export]
macro_rules! release_name {
    () => {{
        use std::sync::OnceLock;
        static RELEASE: OnceLock<Option<String>> = OnceLock::new();
        RELEASE
            .get_or_init(|| {
                option_env!("CARGO_PKG_NAME").and_then(|name| {
                    option_env!("CARGO_PKG_VERSION").map(|version| format!("{}@{}", name, version))
                })
            })
            .as_deref()
            .map(::std::borrow::Cow::Borrowed)
    }};
}

/// Logs internal SDK diagnostics at debug level on the `sentinel` target.
#[macro_export]
#[doc(hidden)]
macro_rules! sentinel_debug {
    ($($arg:tt)*) => {
        $crate::__log::debug!(target: "sentinel", $($arg)*)
    };
}
