use config::{
    Config, ConfigBuilder, ConfigError, Environment, File, FileFormat, FileStoredFormat, Format,
    Map, Source, Value, ValueKind, builder::DefaultState,
};
use serde::de::DeserializeOwned;
use std::{
    io::{Error, ErrorKind},
    path::{Path, PathBuf},
};
use tracing::debug;

use crate::{
    error::{ConfigLoaderError, ConfigLoaderResult},
    section::{ConfigSection, bind_section, lowercase_keys},
};

/// Separator between prefix, section and key in environment variables,
/// e.g. `APP__SQL__SQLCONNECTIONSTRING`.
pub const ENV_SEPARATOR: &str = "__";

/// Layers configuration sources; later sources override earlier ones.
///
/// Keys are matched case-insensitively: every layer is lowercased before it
/// is merged, so `Sql.SQLConnectionString` in one layer and
/// `sql.sqlconnectionstring` in the next address the same setting.
#[derive(Debug, Default)]
pub struct ConfigLoader {
    builder: ConfigBuilder<DefaultState>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a required file. The format is picked from the extension.
    pub fn with_file(self, path: impl AsRef<Path>) -> ConfigLoaderResult<Self> {
        let path = path.as_ref();
        let config_path =
            std::fs::canonicalize(path).map_err(|e| ConfigLoaderError::io(path, e))?;
        debug!(path = %config_path.display(), "adding configuration file");

        Ok(self.add_file(config_path, true))
    }

    /// Adds a file that is skipped when it does not exist.
    pub fn with_optional_file(self, path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        debug!(path = %path.display(), "adding optional configuration file");

        self.add_file(path, false)
    }

    pub fn with_str(self, text: &str, format: FileFormat) -> Self {
        self.add_layer(File::from_str(text, format))
    }

    pub fn with_properties_str(self, text: &str) -> Self {
        self.add_layer(File::from_str(text, PropertiesFile))
    }

    /// Adds environment variables named `{prefix}__{Section}__{Key}`.
    pub fn with_env(self, prefix: &str) -> Self {
        self.with_env_source(
            Environment::with_prefix(prefix)
                .prefix_separator(ENV_SEPARATOR)
                .separator(ENV_SEPARATOR),
        )
    }

    pub fn with_env_source(self, environment: Environment) -> Self {
        self.add_layer(environment)
    }

    pub fn build(self) -> ConfigLoaderResult<Config> {
        Ok(self.builder.build()?)
    }

    /// Builds the configuration and binds a single section from it.
    pub fn bind<T: ConfigSection>(self) -> ConfigLoaderResult<T> {
        bind_section(&self.build()?)
    }

    fn add_file(self, path: PathBuf, required: bool) -> Self {
        let is_properties = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| PropertiesFile.file_extensions().contains(&ext));

        if is_properties {
            self.add_layer(File::new(&path.to_string_lossy(), PropertiesFile).required(required))
        } else {
            self.add_layer(File::from(path).required(required))
        }
    }

    fn add_layer<S>(self, source: S) -> Self
    where
        S: Source + Clone + Send + Sync + 'static,
    {
        Self {
            builder: self.builder.add_source(CaseFolded(source)),
        }
    }
}

/// Lowercases the keys of one layer before it is merged with the others.
#[derive(Debug, Clone)]
struct CaseFolded<S>(S);

impl<S> Source for CaseFolded<S>
where
    S: Source + Clone + Send + Sync + 'static,
{
    fn clone_into_box(&self) -> Box<dyn Source + Send + Sync> {
        Box::new(self.clone())
    }

    fn collect(&self) -> Result<Map<String, Value>, ConfigError> {
        Ok(lowercase_keys(self.0.collect()?))
    }
}

/// Deserializes a whole configuration file into `T`.
///
/// Keys reach `T` lowercased, so field names of `T` must be lowercase.
pub fn load_config<T>(path: impl AsRef<Path>) -> ConfigLoaderResult<T>
where
    T: DeserializeOwned,
{
    let settings = ConfigLoader::new().with_file(path)?.build()?;

    Ok(settings.try_deserialize::<T>()?)
}

/// Binds the section `T` from a single configuration file.
pub fn load_section<T>(path: impl AsRef<Path>) -> ConfigLoaderResult<T>
where
    T: ConfigSection,
{
    ConfigLoader::new().with_file(path)?.bind()
}

/// `key=value` files. `:` in keys is read as a nesting separator, so
/// `Sql:SQLConnectionString` and `Sql.SQLConnectionString` are equivalent.
/// Dotted keys are expanded into tables when the source is collected.
#[derive(Debug, Clone)]
pub struct PropertiesFile;

impl Format for PropertiesFile {
    fn parse(
        &self,
        uri: Option<&String>,
        text: &str,
    ) -> Result<Map<String, Value>, Box<dyn std::error::Error + Send + Sync>> {
        let mut result = Map::new();

        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();

            // Skip empty lines and comments (# or !)
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }

            // Split on the first '=' only, values may contain more
            let (key, value) = match line.split_once('=') {
                Some((k, v)) => (k.trim(), v.trim()),
                None => {
                    return Err(Box::new(Error::new(
                        ErrorKind::InvalidData,
                        format!("Invalid line {}: '{}'", lineno + 1, line),
                    )));
                }
            };

            if key.is_empty() {
                return Err(Box::new(Error::new(
                    ErrorKind::InvalidData,
                    format!("Missing key on line {}", lineno + 1),
                )));
            }

            result.insert(
                key.replace(':', "."),
                Value::new(uri, ValueKind::String(value.to_string())),
            );
        }

        Ok(result)
    }
}

impl FileStoredFormat for PropertiesFile {
    fn file_extensions(&self) -> &'static [&'static str] {
        &["properties"]
    }
}
