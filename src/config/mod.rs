mod settings;

use std::path::Path;

use config::{Config, Environment, File};

use crate::utils::error::ConfigError;

pub use settings::{BrokerSettings, CredentialSettings, FleetSettings, PartialSettings, Settings};

/// Loads the configuration from `config/default` and environment variables.
///
/// Environment variables win over the file; anything still missing falls
/// back to the defaults in `Settings::from_partial`.
pub fn load_config() -> Result<Settings, ConfigError> {
    load_config_from(Path::new("config/default"))
}

/// Same as `load_config`, reading the optional file from `path` (extension
/// may be omitted).
///
/// Environment values stay strings until deserialization, so numeric keys
/// are parsed there and string keys keep their exact spelling.
pub fn load_config_from(path: &Path) -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name(&path.to_string_lossy()).required(false))
        .add_source(Environment::default());

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    Settings::from_partial(partial)
}
