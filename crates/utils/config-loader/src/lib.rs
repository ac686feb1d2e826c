pub mod de;
pub mod error;
pub mod loader;
pub mod section;
pub mod sql;

pub use error::{ConfigLoaderError, ConfigLoaderResult};
pub use loader::{ConfigLoader, PropertiesFile, load_config, load_section};
pub use section::{ConfigSection, SectionSource, bind_section};
pub use sql::SqlConfig;

// Re-exports
pub use config::{Config, Environment, FileFormat};
