//! Layered configuration: built-in defaults, overridable by a TOML file,
//! overridable by environment variables (`AGENT_*`). Every documented
//! protocol default (8 KiB stack/heap budgets, 5 s upload timeout, etc.)
//! is still the built-in default. Operators only need the layering when
//! deviating from spec.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Reported in the `HELLO` greeting.
    pub device_id: String,
    pub rtos: String,
    pub runtime: String,
    pub fw_version: String,

    /// Guest execution environment budgets (§4.4 step 9: "8 KiB each").
    pub guest_stack_bytes: u32,
    pub guest_heap_bytes: u32,

    /// §4.4 step 6: "5-second timeout".
    pub binary_upload_timeout_secs: u64,

    /// §4.5 `gpio_toggle` native: "sleeps 1000 ms on the runner thread".
    pub gpio_toggle_sleep_ms: u64,

    /// Serial port path and baud rate for the real transport (ignored by
    /// tests, which substitute an in-memory transport).
    pub serial_port: String,
    pub baud_rate: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            device_id: "stm32f4_01".to_string(),
            rtos: "Zephyr".to_string(),
            runtime: "wasmi".to_string(),
            fw_version: "1.0.0".to_string(),
            guest_stack_bytes: 8192,
            guest_heap_bytes: 8192,
            binary_upload_timeout_secs: 5,
            gpio_toggle_sleep_ms: 1000,
            serial_port: "/dev/ttyUSB0".to_string(),
            baud_rate: 115_200,
        }
    }
}

impl AgentConfig {
    pub fn binary_upload_timeout(&self) -> Duration {
        Duration::from_secs(self.binary_upload_timeout_secs)
    }

    pub fn gpio_toggle_sleep(&self) -> Duration {
        Duration::from_millis(self.gpio_toggle_sleep_ms)
    }

    /// Loads configuration: built-in defaults, then `path` if it exists,
    /// then `AGENT_*` environment variables, each layer overriding the
    /// last.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let defaults = AgentConfig::default();
        let mut builder = config::Config::builder().add_source(
            config::Config::try_from(&defaults)?,
        );

        if let Some(path) = path {
            if std::path::Path::new(path).exists() {
                builder = builder.add_source(config::File::with_name(path));
            }
        }

        builder = builder.add_source(
            config::Environment::with_prefix("AGENT").separator("_"),
        );

        builder.build()?.try_deserialize()
    }
}
