use std::{
    borrow::Cow,
    fmt, io,
    path::{Path, PathBuf},
};

use rust_cli_config::builder::{ConfigBuilder, DefaultState};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::environment::Environment;

/// Directory containing configuration files relative to application root.
const CONFIGURATION_DIR: &str = "configuration";

/// Supported extensions for base and environment configuration files.
const CONFIG_FILE_EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

/// Prefix for environment variable configuration overrides.
const ENV_PREFIX: &str = "APP";

/// Separator between environment variable prefix and key segments.
const ENV_PREFIX_SEPARATOR: &str = "_";

/// Separator for nested configuration keys in environment variables.
const ENV_SEPARATOR: &str = "__";

/// Separator for list elements in environment variables.
const LIST_SEPARATOR: &str = ",";

/// Trait implemented by configuration structures that can be loaded with [`load_config`].
pub trait Config {
    /// Keys whose values should be parsed as lists when loading the configuration.
    const LIST_PARSE_KEYS: &'static [&'static str];
}

/// Identifies which configuration file is currently being loaded.
#[derive(Debug, Clone, Copy)]
enum ConfigFileKind {
    /// Always-present base configuration.
    Base,
    /// Environment-specific overrides.
    Environment(Environment),
}

impl ConfigFileKind {
    fn stem(&self) -> Cow<'static, str> {
        match self {
            ConfigFileKind::Base => Cow::Borrowed("base"),
            ConfigFileKind::Environment(env) => Cow::Borrowed(env.as_str()),
        }
    }

    /// Whether a missing file of this kind aborts loading.
    fn is_required(&self) -> bool {
        matches!(self, ConfigFileKind::Base)
    }
}

impl fmt::Display for ConfigFileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigFileKind::Base => f.write_str("base configuration"),
            ConfigFileKind::Environment(env) => write!(f, "{env} environment configuration"),
        }
    }
}

/// Errors that can occur while loading configuration files and overrides.
#[derive(Debug, Error)]
pub enum LoadConfigError {
    /// Failed to determine the current working directory.
    #[error("failed to determine the current directory: {0}")]
    CurrentDir(#[source] io::Error),

    /// The configuration directory does not exist.
    #[error("configuration directory `{0}` does not exist")]
    MissingConfigurationDirectory(PathBuf),

    /// Could not locate the base configuration file.
    #[error("could not locate {kind_description} in `{directory}`; attempted: {attempted}")]
    ConfigurationFileMissing {
        kind_description: String,
        directory: PathBuf,
        attempted: String,
    },

    /// A configuration file existed but could not be parsed.
    #[error("failed to load {kind_description} from `{path}`: {source}")]
    ConfigurationFileLoad {
        kind_description: String,
        path: PathBuf,
        source: rust_cli_config::ConfigError,
    },

    /// The configuration files were parsed but deserialization failed.
    #[error("failed to deserialize configuration: {0}")]
    Deserialization(#[source] rust_cli_config::ConfigError),

    /// Failed to determine the runtime environment (`APP_ENVIRONMENT`).
    #[error("failed to determine runtime environment: {0}")]
    Environment(#[from] io::Error),

    /// Failed to initialize the configuration builder.
    #[error("failed to initialize configuration builder: {0}")]
    Builder(#[source] rust_cli_config::ConfigError),
}

/// Loads hierarchical configuration from the `configuration` directory of the current
/// working directory.
///
/// See [`load_config_from`] for the layering rules.
pub fn load_config<T>() -> Result<T, LoadConfigError>
where
    T: Config + DeserializeOwned,
{
    let base_path = std::env::current_dir().map_err(LoadConfigError::CurrentDir)?;
    load_config_from(&base_path.join(CONFIGURATION_DIR))
}

/// Loads hierarchical configuration from `directory`.
///
/// Loads `base.(yaml|yml|json)`, then the optional `{environment}.(yaml|yml|json)` overlay,
/// then overrides from `APP_`-prefixed environment variables. Nested keys use double
/// underscores (`APP_SETTING__MAX_PAGE_SIZE`), and list values are comma-separated.
pub fn load_config_from<T>(directory: &Path) -> Result<T, LoadConfigError>
where
    T: Config + DeserializeOwned,
{
    if !directory.is_dir() {
        return Err(LoadConfigError::MissingConfigurationDirectory(
            directory.to_path_buf(),
        ));
    }

    let environment = Environment::load().map_err(LoadConfigError::Environment)?;

    let mut environment_source = rust_cli_config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator(ENV_PREFIX_SEPARATOR)
        .separator(ENV_SEPARATOR)
        .try_parsing(true);

    if !T::LIST_PARSE_KEYS.is_empty() {
        environment_source = environment_source.list_separator(LIST_SEPARATOR);

        for key in <T as Config>::LIST_PARSE_KEYS {
            environment_source = environment_source.with_list_parse_key(key);
        }
    }

    let mut builder = rust_cli_config::Config::builder();
    for kind in [
        ConfigFileKind::Base,
        ConfigFileKind::Environment(environment),
    ] {
        let Some(file) = find_configuration_file(directory, kind)? else {
            continue;
        };

        builder = builder.add_source(rust_cli_config::File::from(file.clone()));
        validate_configuration_source(&builder, kind, &file)?;
    }

    let settings = builder
        .add_source(environment_source)
        .build()
        .map_err(LoadConfigError::Builder)?;

    settings
        .try_deserialize::<T>()
        .map_err(LoadConfigError::Deserialization)
}

/// Finds the configuration file that matches the requested kind and supported extensions.
///
/// Returns `Ok(None)` for optional kinds that have no file on disk.
fn find_configuration_file(
    directory: &Path,
    kind: ConfigFileKind,
) -> Result<Option<PathBuf>, LoadConfigError> {
    let stem = kind.stem();
    let mut attempted_paths = Vec::with_capacity(CONFIG_FILE_EXTENSIONS.len());

    for extension in CONFIG_FILE_EXTENSIONS {
        let path = directory.join(format!("{stem}.{extension}"));
        if path.is_file() {
            return Ok(Some(path));
        }

        attempted_paths.push(path);
    }

    if !kind.is_required() {
        return Ok(None);
    }

    let attempted = attempted_paths
        .iter()
        .map(|path| format!("`{}`", path.display()))
        .collect::<Vec<_>>()
        .join(", ");

    Err(LoadConfigError::ConfigurationFileMissing {
        kind_description: kind.to_string(),
        directory: directory.to_path_buf(),
        attempted,
    })
}

fn validate_configuration_source(
    builder: &ConfigBuilder<DefaultState>,
    kind: ConfigFileKind,
    path: &Path,
) -> Result<(), LoadConfigError> {
    builder
        .clone()
        .build()
        .map_err(|source| LoadConfigError::ConfigurationFileLoad {
            kind_description: kind.to_string(),
            path: path.to_path_buf(),
            source,
        })
        .map(|_| ())
}
