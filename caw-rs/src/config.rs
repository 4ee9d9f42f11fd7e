//! Binding configuration.
//!
//! Read from JSON by the C ABI and assembled from flags by the `caw` binary.
//! Every field has a default, so `{}` is a valid configuration.

use crate::audio::{ActivationContext, Apartment};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BindingConfig {
    /// COM apartment the owning thread is initialized with.
    pub apartment: Apartment,

    /// CLSCTX used for enumerator creation and interface activation.
    pub activation: ActivationContext,

    /// Log filter (tracing-subscriber EnvFilter syntax). `RUST_LOG` wins
    /// when set.
    pub log_filter: Option<String>,
}

impl BindingConfig {
    /// Parse a JSON configuration. Unknown fields are ignored.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
