use serde::{Deserialize, Serialize};

use crate::section::ConfigSection;

/// SQL settings bound from the `Sql` section.
///
/// Both values are optional and unvalidated; an unset key stays `None` and
/// an empty value stays `Some("")`. Instances are immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[non_exhaustive]
pub struct SqlConfig {
    #[serde(
        rename(
            serialize = "SQLAdministratorLoginName",
            deserialize = "sqladministratorloginname"
        ),
        alias = "SQLAdministratorLoginName",
        default,
        deserialize_with = "crate::de::optional_string",
        skip_serializing_if = "Option::is_none"
    )]
    administrator_login_name: Option<String>,
    #[serde(
        rename(serialize = "SQLConnectionString", deserialize = "sqlconnectionstring"),
        alias = "SQLConnectionString",
        default,
        deserialize_with = "crate::de::optional_string",
        skip_serializing_if = "Option::is_none"
    )]
    connection_string: Option<String>,
}

impl SqlConfig {
    pub fn new(administrator_login_name: Option<String>, connection_string: Option<String>) -> Self {
        Self {
            administrator_login_name,
            connection_string,
        }
    }

    pub fn administrator_login_name(&self) -> Option<&str> {
        self.administrator_login_name.as_deref()
    }

    pub fn connection_string(&self) -> Option<&str> {
        self.connection_string.as_deref()
    }
}

impl ConfigSection for SqlConfig {
    const SECTION_NAME: &'static str = "Sql";
}
