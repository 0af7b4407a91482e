//! The service's environment-provided configuration.
//!
//! Every tunable named in the external-interfaces section of the design is a
//! field here; there are no secondary config files and no hot reload. Secret
//! fields are wrapped in [`secrecy::SecretString`] so that a `Debug`/`Serialize`
//! of the whole config (logged once at startup) never leaks a credential.

use secrecy::{
    zeroize::ZeroizeOnDrop,
    ExposeSecret as _,
    SecretString,
};
use serde::{
    Deserialize,
    Serialize,
    Serializer,
};

/// The high-level config for creating an auctionhouse-server service.
#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Log filter directives, e.g. `auctionhouse_server=debug,info`.
    pub log: String,
    /// Forces JSON-formatted trace output to stdout even when not a tty.
    pub force_stdout: bool,
    /// Uses pretty-printed (human-readable) trace output instead of JSON.
    pub pretty_print: bool,
    /// Disables the Prometheus metrics HTTP listener.
    pub no_metrics: bool,
    /// The address the Prometheus metrics exporter listens on.
    pub metrics_http_listener_addr: String,

    /// The address the command surface's HTTP/WebSocket API listens on.
    pub api_listen_addr: String,
    /// The end-to-end deadline for a single command, in seconds.
    pub command_timeout_seconds: u64,

    /// Connection string for the persistent store.
    #[serde(serialize_with = "serialize_secret")]
    pub database_url: SecretString,
    /// Shared secret used to sign and verify bearer credentials (HS256).
    #[serde(serialize_with = "serialize_secret")]
    pub jwt_signing_secret: SecretString,

    /// Anti-snipe extension length, in seconds (`T_extend`).
    pub auction_extend_seconds: i64,
    /// Anti-snipe trigger window, in seconds (`T_snipe`).
    pub auction_extend_threshold_seconds: i64,
    /// Payment deadline window after an order is created, in seconds (`Δpay`).
    pub order_payment_window_seconds: i64,
    /// Platform fee in basis points (`700` = 7.00%).
    pub platform_fee_bps: u32,

    /// Chat rate limit as `<count>/<window>`, e.g. `10/60s`.
    pub message_rate_limit: String,
    /// Maximum length, in Unicode scalar values, of a chat message.
    pub message_max_len: usize,

    /// Bound on a subscriber's outbound event queue (`Q_max`).
    pub subscriber_queue_max: usize,
    /// Idle timeout for a subscription connection, in seconds (`T_idle`).
    pub subscriber_idle_seconds: u64,

    /// Scheduler poll interval, in milliseconds.
    pub scheduler_poll_ms: u64,
    /// Scheduler claim lease, in seconds (`T_lease`).
    pub scheduler_lease_seconds: i64,
    /// Maximum scheduler retries before a deadline is dead-lettered (`R_max`).
    pub scheduler_max_retries: i32,

    /// Opaque passthrough credential for the conferencing SDK's token signing
    /// key. Never parsed or used by the core; present so the config surface
    /// is complete for a real deployment (see the non-goals in the design).
    #[serde(serialize_with = "serialize_secret")]
    pub conferencing_api_key: SecretString,
    /// Opaque passthrough credential for the streaming provider.
    #[serde(serialize_with = "serialize_secret")]
    pub streaming_provider_api_key: SecretString,
    /// Opaque passthrough credential for the payment provider.
    #[serde(serialize_with = "serialize_secret")]
    pub payment_provider_api_key: SecretString,
}

impl ZeroizeOnDrop for Config {}

impl config::Config for Config {
    const PREFIX: &'static str = "AUCTIONHOUSE_";
}

/// Parses a `<count>/<window>` rate limit spec, e.g. `"10/60s"`, using
/// [`humantime`] for the window so that `"10/1m"` and `"10/60s"` are
/// equivalent.
///
/// # Errors
/// Returns an error if the spec is not of the form `<non-zero count>/<duration>`.
pub fn parse_rate_limit(spec: &str) -> Result<(u32, std::time::Duration), String> {
    let (count, window) = spec
        .split_once('/')
        .ok_or_else(|| format!("rate limit {spec:?} must be of the form <count>/<window>"))?;
    let count: u32 = count
        .parse()
        .map_err(|_| format!("rate limit count {count:?} is not a valid integer"))?;
    if count == 0 {
        return Err("rate limit count must be nonzero".to_string());
    }
    let window = humantime::parse_duration(window)
        .map_err(|e| format!("rate limit window {window:?} is not a valid duration: {e}"))?;
    Ok((count, window))
}

fn serialize_secret<S>(secret: &SecretString, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let _ = secret.expose_secret();
    serializer.serialize_str("<redacted>")
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE_ENV: &str = include_str!("../local.env.example");

    #[test]
    fn example_env_config_is_up_to_date() {
        config::tests::example_env_config_is_up_to_date::<Config>(EXAMPLE_ENV);
    }

    #[test]
    #[should_panic]
    fn config_should_reject_unknown_var() {
        config::tests::config_should_reject_unknown_var::<Config>(EXAMPLE_ENV);
    }

    #[test]
    fn parses_count_slash_humantime_window() {
        let (count, window) = parse_rate_limit("10/60s").unwrap();
        assert_eq!(count, 10);
        assert_eq!(window, std::time::Duration::from_secs(60));

        let (count, window) = parse_rate_limit("10/1m").unwrap();
        assert_eq!(count, 10);
        assert_eq!(window, std::time::Duration::from_secs(60));
    }

    #[test]
    fn rejects_zero_count() {
        assert!(parse_rate_limit("0/60s").is_err());
    }

    #[test]
    fn rejects_missing_separator() {
        assert!(parse_rate_limit("10-60s").is_err());
    }
}
