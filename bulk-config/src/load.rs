//! Layered loading: `configuration/base.*`, then `configuration/{environment}.*`, then `APP_`
//! environment variables.

use std::io;
use std::path::{Path, PathBuf};

use rust_cli_config::{Config as Settings, ConfigError, File};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::environment::Environment;
use crate::shared::{BulkConfig, ValidationError};

const CONFIGURATION_DIR: &str = "configuration";

const BASE_STEM: &str = "base";

/// Extensions tried for each layer, in order.
const EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

/// Overrides are read from `APP_<SECTION>__<KEY>`, e.g. `APP_QUEUE__RETRY_ATTEMPTS`.
const ENV_PREFIX: &str = "APP";

const ENV_PREFIX_SEPARATOR: &str = "_";

const ENV_SEPARATOR: &str = "__";

const LIST_SEPARATOR: &str = ",";

/// Implemented by the configuration roots that can be loaded with [`load_config_from`].
pub trait Config {
    /// Keys whose environment values are split on commas.
    const LIST_PARSE_KEYS: &'static [&'static str];
}

#[derive(Debug, Error)]
pub enum LoadConfigError {
    #[error("failed to determine the current directory: {0}")]
    CurrentDir(#[source] io::Error),

    /// `APP_ENVIRONMENT` holds an unsupported value.
    #[error("failed to determine runtime environment: {0}")]
    Environment(#[source] io::Error),

    #[error("configuration directory `{0}` does not exist")]
    MissingDirectory(PathBuf),

    /// Only the base layer is mandatory.
    #[error("no base.yaml, base.yml or base.json in `{0}`")]
    MissingBaseFile(PathBuf),

    #[error("configuration file `{path}` is malformed: {source}")]
    MalformedFile {
        path: PathBuf,
        #[source]
        source: ConfigError,
    },

    /// Merging the environment variable overrides or deserializing the merged tree failed.
    #[error("failed to build configuration: {0}")]
    Build(#[source] ConfigError),

    #[error("loaded configuration is invalid: {0}")]
    Invalid(#[from] ValidationError),
}

/// Loads and validates the [`BulkConfig`] of the process.
///
/// Files are read from `configuration/` under the current directory, and the environment comes
/// from `APP_ENVIRONMENT`.
pub fn load_bulk_config() -> Result<BulkConfig, LoadConfigError> {
    let root = std::env::current_dir().map_err(LoadConfigError::CurrentDir)?;
    let environment = Environment::load().map_err(LoadConfigError::Environment)?;

    load_bulk_config_from(&root.join(CONFIGURATION_DIR), environment)
}

/// Same as [`load_bulk_config`] with an explicit directory and environment.
pub fn load_bulk_config_from(
    directory: &Path,
    environment: Environment,
) -> Result<BulkConfig, LoadConfigError> {
    let config: BulkConfig = load_config_from(directory, environment)?;
    config.validate()?;

    Ok(config)
}

/// Merges the layers found in `directory` into `T` without validating the result.
///
/// An environment layer that does not exist is skipped.
pub fn load_config_from<T>(directory: &Path, environment: Environment) -> Result<T, LoadConfigError>
where
    T: Config + DeserializeOwned,
{
    if !directory.is_dir() {
        return Err(LoadConfigError::MissingDirectory(directory.to_path_buf()));
    }

    let base = locate(directory, BASE_STEM)
        .ok_or_else(|| LoadConfigError::MissingBaseFile(directory.to_path_buf()))?;
    let layers = std::iter::once(base).chain(locate(directory, environment.as_str()));

    let mut builder = Settings::builder();
    for path in layers {
        ensure_well_formed(&path)?;
        builder = builder.add_source(File::from(path));
    }

    builder
        .add_source(env_overrides::<T>())
        .build()
        .and_then(|settings| settings.try_deserialize())
        .map_err(LoadConfigError::Build)
}

fn locate(directory: &Path, stem: &str) -> Option<PathBuf> {
    EXTENSIONS
        .iter()
        .map(|extension| directory.join(format!("{stem}.{extension}")))
        .find(|path| path.is_file())
}

/// Parses a single layer on its own so syntax errors name the offending file.
fn ensure_well_formed(path: &Path) -> Result<(), LoadConfigError> {
    Settings::builder()
        .add_source(File::from(path))
        .build()
        .map(drop)
        .map_err(|source| LoadConfigError::MalformedFile {
            path: path.to_path_buf(),
            source,
        })
}

fn env_overrides<T: Config>() -> rust_cli_config::Environment {
    let source = rust_cli_config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator(ENV_PREFIX_SEPARATOR)
        .separator(ENV_SEPARATOR);

    if T::LIST_PARSE_KEYS.is_empty() {
        return source;
    }

    T::LIST_PARSE_KEYS.iter().fold(
        source.try_parsing(true).list_separator(LIST_SEPARATOR),
        |source, key| source.with_list_parse_key(key),
    )
}
