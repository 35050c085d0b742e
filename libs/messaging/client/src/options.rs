//! Configuration option names understood by the bus client

use config::Config;

/// Middleware binding to load. `loopback` is built in.
pub const MW_ID: &str = "mw-id";
/// Broker instance to join. Loopback connections sharing a server share traffic.
pub const MW_SERVER: &str = "mw-server";
pub const DEFAULT_SERVER: &str = "default";

pub const MSG_CONTENT_VALIDATE: &str = "msg-content-validate";
pub const MSG_CONTENT_VALIDATE_ALL: &str = "msg-content-validate-all";
pub const MSG_CONTENT_VALIDATE_SEND: &str = "msg-content-validate-send";

/// Stamp PUBLISH-TIME on outgoing messages
pub const TRACKING_PUBLISH_TIME: &str = "tracking-publish-time";

/// Identity used for COMPONENT on replies when no standard field provides one
pub const COMPONENT: &str = "component";

pub const SIM_CONNECT_FAILURE: &str = "mw-sim-connect-failure";
pub const SIM_PUBLISH_FAILURE: &str = "mw-sim-publish-failure";
pub const SIM_SUBSCRIBE_FAILURE: &str = "mw-sim-subscribe-failure";
pub const SIM_RECEIVE_FAILURE: &str = "mw-sim-receive-failure";
pub const SIM_PUBLISH_DELAY_MS: &str = "mw-sim-publish-delay-ms";

pub const LOG_LEVEL: &str = "loglevel";

/// True when any of the content validation options is enabled
pub fn validation_enabled(config: &Config) -> bool {
    [
        MSG_CONTENT_VALIDATE,
        MSG_CONTENT_VALIDATE_ALL,
        MSG_CONTENT_VALIDATE_SEND,
    ]
    .iter()
    .any(|key| config.get_boolean_value(key, false))
}
