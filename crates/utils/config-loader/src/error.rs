use config::ConfigError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigLoaderError {
    /// A configuration source failed to load or parse.
    #[error("failed to load configuration: {0}")]
    Source(#[from] ConfigError),

    #[error("failed to resolve configuration path '{}'", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The section exists but its values do not fit the target type.
    #[error("failed to bind configuration section '{section}'")]
    Binding {
        section: String,
        #[source]
        source: ConfigError,
    },
}

impl ConfigLoaderError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn binding(section: impl Into<String>, source: ConfigError) -> Self {
        Self::Binding {
            section: section.into(),
            source,
        }
    }
}

pub type ConfigLoaderResult<T> = Result<T, ConfigLoaderError>;
