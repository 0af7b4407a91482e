//! A thin, `figment`-based environment-variable config loader shared by the
//! auctionhouse services.
//!
//! A service defines its own `Config` struct, derives `Deserialize` /
//! `Serialize`, marks it `#[serde(deny_unknown_fields)]`, and implements
//! [`Config`] to declare the environment variable prefix it reads from.
//! [`get`] then does the rest.

#[cfg(feature = "tests")]
pub mod tests;

use figment::{
    providers::Env,
    Figment,
};
use serde::de::DeserializeOwned;

#[doc(hidden)]
pub mod _internal {
    /// A sealing token preventing external crates from overriding
    /// [`super::Config::get_with_prefix`]'s default implementation.
    pub struct Internal;
}

/// A service configuration loadable from environment variables sharing a
/// common prefix.
pub trait Config: DeserializeOwned {
    /// The prefix every environment variable for this config is expected to
    /// carry, for example `"AUCTIONHOUSE_"`.
    const PREFIX: &'static str;

    #[doc(hidden)]
    fn get_with_prefix(prefix: &str, _: _internal::Internal) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Env::prefixed(prefix).split("__"))
            .extract()
    }
}

/// Reads `C` from the environment using `C::PREFIX`.
///
/// # Errors
/// Returns an error if a required variable is missing, a variable fails to
/// parse into its target type, or an unknown variable is set (for configs
/// using `#[serde(deny_unknown_fields)]`).
pub fn get<C: Config>() -> Result<C, figment::Error> {
    C::get_with_prefix(C::PREFIX, _internal::Internal)
}
