use crate::protocol::ClientSdkInfo;

/// The version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The name reported in the SDK info of every event.
pub const SDK_NAME: &str = "sentinel.rust";

/// The default user agent sent with every request.
pub const USER_AGENT: &str = concat!("sentinel.rust/", env!("CARGO_PKG_VERSION"));

pub(crate) fn sdk_info() -> ClientSdkInfo {
    ClientSdkInfo {
        name: SDK_NAME.into(),
        version: VERSION.into(),
    }
}
