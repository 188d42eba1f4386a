//! Registry configuration

/// Base name given to devices that register with an empty name
pub const DEFAULT_DEVICE_NAME: &str = "1";

/// Configuration for the device registry
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Base name used when a config request carries an empty name
    pub default_name: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            default_name: DEFAULT_DEVICE_NAME.to_owned(),
        }
    }
}

impl RegistryConfig {
    /// Set the base name for unnamed devices
    pub fn default_name(mut self, name: impl Into<String>) -> Self {
        self.default_name = name.into();
        self
    }
}
