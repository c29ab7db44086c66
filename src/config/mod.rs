mod connection;
mod settings;

use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};

use settings::PartialSettings;

pub use connection::{ConnectionConfig, Credentials};
pub use settings::{
    AuthSettings, CheckSettings, DeviceSettings, LoggingSettings, ReportSettings,
    ServerSettings, Settings,
};

/// Prefix of the environment variables read by [`load_config`], e.g.
/// `PUBSUB_VERIFY_SERVER__ADDRESSES=nats://a:4222,nats://b:4222`.
pub const ENV_PREFIX: &str = "PUBSUB_VERIFY";

/// Loads the configuration from `config/default` (if present) and the
/// environment, merged over the default values.
pub fn load_config() -> Result<Settings, ConfigError> {
    load_config_from(None)
}

/// Like [`load_config`], but reads `path` instead of `config/default`. An
/// explicit file must exist.
pub fn load_config_from(path: Option<&Path>) -> Result<Settings, ConfigError> {
    let file = match path {
        Some(path) => File::from(path).required(true),
        None => File::with_name("config/default").required(false),
    };

    let builder = Config::builder().add_source(file).add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("server.addresses")
            .try_parsing(true),
    );

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    Ok(partial.merge(Settings::default()))
}

impl Settings {
    /// Connection parameters of the connectivity scenario.
    pub fn connection_config(&self) -> Result<ConnectionConfig, ConfigError> {
        ConnectionConfig::new(
            self.server.addresses.clone(),
            Credentials::from_parts(
                self.auth.username.clone(),
                self.auth.password.clone(),
                self.auth.token.clone(),
            ),
            Duration::from_millis(self.server.connect_timeout_ms),
        )
    }

    /// Connection parameters of the device scenario. The device identity
    /// replaces the main credentials only when a device username is set.
    pub fn device_connection_config(&self) -> Result<ConnectionConfig, ConfigError> {
        let base = self.connection_config()?;
        Ok(match &self.device.username {
            Some(username) => base.with_credentials(Credentials::UserPassword {
                username: username.clone(),
                password: self.device.password.clone().unwrap_or_default(),
            }),
            None => base,
        })
    }
}
