//! Connection options supplied by the caller

use crate::endpoint::TransferKind;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default Read timeout when the caller passes zero
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(5000);

/// What the caller intends to talk to
///
/// Endpoint addresses are only treated as declared when both `endpoint_in`
/// and `endpoint_out` are set; otherwise they are discovered from the active
/// configuration and the discovered interface is claimed instead of
/// `interface`.
///
/// # Example Configuration
/// ```toml
/// interface = 0
/// configuration = 1
/// endpoint_in = 0x81
/// endpoint_out = 0x01
/// transfer_in = "interrupt"
/// debug = false
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Interface to claim when endpoints are declared
    pub interface: u8,
    /// Configuration to select; `None` keeps whatever the device has
    pub configuration: Option<u8>,
    pub endpoint_in: Option<u8>,
    pub endpoint_out: Option<u8>,
    /// Expected transfer type of the IN endpoint, checked against the descriptor
    pub transfer_in: Option<TransferKind>,
    /// Expected transfer type of the OUT endpoint, checked against the descriptor
    pub transfer_out: Option<TransferKind>,
    /// Log every transfer buffer at debug level
    pub debug: bool,
    /// Treat a zero-length transfer as "try again" until data arrives or the
    /// session closes
    pub retry_zero_length: bool,
    /// Replaces [`DEFAULT_READ_TIMEOUT`] for reads passing a zero timeout;
    /// `0` in a config file leaves the default in place
    #[serde(with = "millis", skip_serializing_if = "Option::is_none")]
    pub read_timeout: Option<Duration>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            interface: 0,
            configuration: None,
            endpoint_in: None,
            endpoint_out: None,
            transfer_in: None,
            transfer_out: None,
            debug: false,
            retry_zero_length: false,
            read_timeout: None,
        }
    }
}

impl Options {
    /// Declared `(in, out)` endpoint pair, if both halves are set
    pub fn declared_endpoints(&self) -> Option<(u8, u8)> {
        Some((self.endpoint_in?, self.endpoint_out?))
    }

    pub fn default_read_timeout(&self) -> Duration {
        self.read_timeout.unwrap_or(DEFAULT_READ_TIMEOUT)
    }
}

/// `Option<Duration>` as whole milliseconds
mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_u64(d.as_millis() as u64),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        // Zero would reach the host as "wait forever"
        Ok(Option::<u64>::deserialize(deserializer)?
            .filter(|&ms| ms > 0)
            .map(Duration::from_millis))
    }
}
