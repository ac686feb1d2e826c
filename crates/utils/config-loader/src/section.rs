use config::{Config, Map, Value, ValueKind};
use serde::de::DeserializeOwned;
use tracing::{debug, trace};

use crate::error::{ConfigLoaderError, ConfigLoaderResult};

/// A typed view over one named subtree of the configuration.
pub trait ConfigSection: DeserializeOwned + Default {
    const SECTION_NAME: &'static str;

    fn bind<S>(source: &S) -> ConfigLoaderResult<Self>
    where
        S: SectionSource + ?Sized,
    {
        bind_section(source)
    }
}

/// Anything that can hand out a configuration section by name.
pub trait SectionSource {
    /// Returns `Ok(None)` when the section does not exist.
    fn section(&self, name: &str) -> ConfigLoaderResult<Option<Value>>;
}

impl SectionSource for Config {
    fn section(&self, name: &str) -> ConfigLoaderResult<Option<Value>> {
        let root: Map<String, Value> = self.clone().try_deserialize()?;
        find_section(root, name)
    }
}

impl SectionSource for Map<String, Value> {
    fn section(&self, name: &str) -> ConfigLoaderResult<Option<Value>> {
        find_section(self.clone(), name)
    }
}

/// Binds `T` from its section, falling back to `T::default()` when the
/// section is absent.
pub fn bind_section<T, S>(source: &S) -> ConfigLoaderResult<T>
where
    T: ConfigSection,
    S: SectionSource + ?Sized,
{
    let Some(value) = source.section(T::SECTION_NAME)? else {
        debug!(
            section = T::SECTION_NAME,
            "configuration section not present, using defaults"
        );
        return Ok(T::default());
    };

    let bound = value
        .try_deserialize::<T>()
        .map_err(|e| ConfigLoaderError::binding(T::SECTION_NAME, e))?;
    debug!(section = T::SECTION_NAME, "configuration section bound");
    Ok(bound)
}

/// Case-insensitive lookup of a root section.
///
/// A source that was merged without case folding can hold the same section
/// or field under several spellings. They are folded in key order, so the
/// result is the same on every run. `ConfigLoader` folds each layer before
/// merging, which leaves only one spelling here.
fn find_section(root: Map<String, Value>, name: &str) -> ConfigLoaderResult<Option<Value>> {
    let mut matches: Vec<(String, Value)> = root
        .into_iter()
        .filter(|(key, _)| key.eq_ignore_ascii_case(name))
        .collect();

    if matches.is_empty() {
        return Ok(None);
    }

    matches.sort_by(|(a, _), (b, _)| a.cmp(b));

    let mut merged = Map::new();
    for (key, value) in matches {
        if matches!(value.kind, ValueKind::Nil) {
            continue;
        }
        let table = value
            .into_table()
            .map_err(|e| ConfigLoaderError::binding(name, e))?;
        trace!(section = %key, entries = table.len(), "merging configuration section");
        for (field, field_value) in lowercase_keys(table) {
            insert_folded(&mut merged, field, field_value);
        }
    }

    Ok(Some(Value::new(None, ValueKind::Table(merged))))
}

/// Lowercases every key of `table`, recursing into nested tables and arrays.
///
/// Entries are visited in key order; when two spellings collide the later
/// one wins, and colliding tables are merged key by key.
pub(crate) fn lowercase_keys(table: Map<String, Value>) -> Map<String, Value> {
    let mut entries: Vec<(String, Value)> = table.into_iter().collect();
    entries.sort_by(|(a, _), (b, _)| a.cmp(b));

    let mut folded = Map::new();
    for (key, value) in entries {
        insert_folded(&mut folded, key.to_lowercase(), lowercase_value(value));
    }
    folded
}

fn lowercase_value(mut value: Value) -> Value {
    value.kind = match std::mem::replace(&mut value.kind, ValueKind::Nil) {
        ValueKind::Table(table) => ValueKind::Table(lowercase_keys(table)),
        ValueKind::Array(items) => {
            ValueKind::Array(items.into_iter().map(lowercase_value).collect())
        }
        other => other,
    };
    value
}

fn insert_folded(target: &mut Map<String, Value>, key: String, value: Value) {
    let existing_is_table = matches!(
        target.get(&key).map(|existing| &existing.kind),
        Some(ValueKind::Table(_))
    );
    if !existing_is_table || !matches!(value.kind, ValueKind::Table(_)) {
        target.insert(key, value);
        return;
    }

    let ValueKind::Table(incoming) = value.kind else {
        return;
    };
    if let Some(ValueKind::Table(into)) = target.get_mut(&key).map(|existing| &mut existing.kind) {
        for (field, field_value) in incoming {
            insert_folded(into, field, field_value);
        }
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Default, PartialEq, Deserialize)]
    struct CacheSection {
        #[serde(default)]
        host: Option<String>,
        #[serde(default)]
        port: Option<u16>,
    }

    impl ConfigSection for CacheSection {
        const SECTION_NAME: &'static str = "Cache";
    }

    fn string(value: &str) -> Value {
        Value::new(None, ValueKind::String(value.to_string()))
    }

    fn table(entries: &[(&str, Value)]) -> Value {
        let map = entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect::<Map<_, _>>();
        Value::new(None, ValueKind::Table(map))
    }

    #[test]
    fn test_missing_section_yields_default() {
        let root = Map::new();
        let section = CacheSection::bind(&root).unwrap();
        assert_eq!(section, CacheSection::default());
    }

    #[test]
    fn test_section_name_is_case_insensitive() {
        let mut root = Map::new();
        root.insert("CACHE".to_string(), table(&[("Host", string("localhost"))]));

        let section: CacheSection = bind_section(&root).unwrap();
        assert_eq!(section.host.as_deref(), Some("localhost"));
        assert_eq!(section.port, None);
    }

    #[test]
    fn test_colliding_section_spellings_are_merged() {
        let mut root = Map::new();
        root.insert(
            "Cache".to_string(),
            table(&[("host", string("file-host")), ("port", string("6379"))]),
        );
        root.insert("cache".to_string(), table(&[("host", string("env-host"))]));

        let section = CacheSection::bind(&root).unwrap();
        assert_eq!(section.host.as_deref(), Some("env-host"));
        assert_eq!(section.port, Some(6379));
    }

    #[test]
    fn test_nil_section_yields_default() {
        let mut root = Map::new();
        root.insert("Cache".to_string(), Value::new(None, ValueKind::Nil));

        let section = CacheSection::bind(&root).unwrap();
        assert_eq!(section, CacheSection::default());
    }

    #[test]
    fn test_scalar_section_is_binding_error() {
        let mut root = Map::new();
        root.insert("Cache".to_string(), string("not a table"));

        let err = CacheSection::bind(&root).unwrap_err();
        assert!(matches!(err, ConfigLoaderError::Binding { ref section, .. } if section == "Cache"));
    }

    #[test]
    fn test_unrelated_sections_are_ignored() {
        let mut root = Map::new();
        root.insert("Caches".to_string(), table(&[("host", string("wrong"))]));

        assert!(root.section("Cache").unwrap().is_none());
    }

    #[test]
    fn test_colliding_field_spellings_resolve_the_same_every_time() {
        for _ in 0..100 {
            let mut root = Map::new();
            root.insert(
                "Cache".to_string(),
                table(&[
                    ("HOST", string("upper")),
                    ("Host", string("mixed")),
                    ("host", string("lower")),
                ]),
            );

            let section = CacheSection::bind(&root).unwrap();
            assert_eq!(section.host.as_deref(), Some("lower"));
        }
    }

    #[test]
    fn test_lowercase_keys_folds_nested_tables() {
        let mut map = Map::new();
        map.insert("Cache".to_string(), table(&[("Host", string("a"))]));
        map.insert("cache".to_string(), table(&[("PORT", string("1"))]));

        let folded = lowercase_keys(map);
        assert_eq!(folded.len(), 1);

        let cache = folded.get("cache").cloned().unwrap().into_table().unwrap();
        assert_eq!(cache.get("host").cloned().unwrap().into_string().unwrap(), "a");
        assert_eq!(cache.get("port").cloned().unwrap().into_string().unwrap(), "1");
    }
}
