//! Property-source loaders and the config-data loading step.

use indexmap::IndexMap;
use serde::Deserialize;

use crate::data::{ConfigData, Options, PropertySourceOptions};
use crate::error::{Error, NotFoundError};
use crate::properties::PropertySet;
use crate::resource::ConfigResource;

/// Decodes the text of one resource into an ordered list of property sets.
///
/// A loader is selected by matching a resource's file extension against
/// [`Loader::extensions`]. Multi-document formats may return more than one
/// set; sets keep document order.
pub trait Loader {
    fn extensions(&self) -> &[&'static str];

    fn load(&self, name: &str, content: &str) -> Result<Vec<PropertySet>, Error>;
}

/// Loader for `.properties` files.
///
/// Supports `#` and `!` comments and both `=` and `:` key separators. Keys
/// are taken verbatim, so dotted keys line up with the flattened form the
/// other loaders produce.
#[derive(Debug, Default)]
pub struct PropertiesLoader;

impl Loader for PropertiesLoader {
    fn extensions(&self) -> &[&'static str] {
        &["properties"]
    }

    fn load(&self, name: &str, content: &str) -> Result<Vec<PropertySet>, Error> {
        let mut set = PropertySet::new(name);
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }
            let split = line
                .char_indices()
                .find(|(_, ch)| *ch == '=' || *ch == ':')
                .map(|(i, _)| i);
            match split {
                Some(i) => set.insert(line[..i].trim_end(), line[i + 1..].trim_start()),
                None => set.insert(line, ""),
            }
        }
        if set.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![set])
    }
}

/// Loader for `.yaml` / `.yml` files, one property set per document.
#[derive(Debug, Default)]
pub struct YamlLoader;

impl Loader for YamlLoader {
    fn extensions(&self) -> &[&'static str] {
        &["yml", "yaml"]
    }

    fn load(&self, name: &str, content: &str) -> Result<Vec<PropertySet>, Error> {
        let mut documents = Vec::new();
        for document in serde_yaml::Deserializer::from_str(content) {
            let value = serde_yaml::Value::deserialize(document).map_err(|e| Error::Parse {
                name: name.to_string(),
                message: e.to_string(),
            })?;
            if value.is_null() {
                continue;
            }
            let mut entries = IndexMap::new();
            flatten_yaml(&value, "", &mut entries);
            documents.push(entries);
        }
        let multi = documents.len() > 1;
        Ok(documents
            .into_iter()
            .enumerate()
            .map(|(i, entries)| {
                let set_name = if multi {
                    format!("{name} (document #{i})")
                } else {
                    name.to_string()
                };
                PropertySet::from_entries(set_name, entries)
            })
            .collect())
    }
}

/// Loader for `.toml` files.
#[derive(Debug, Default)]
pub struct TomlLoader;

impl Loader for TomlLoader {
    fn extensions(&self) -> &[&'static str] {
        &["toml"]
    }

    fn load(&self, name: &str, content: &str) -> Result<Vec<PropertySet>, Error> {
        let table: toml::Table = toml::from_str(content).map_err(|e| Error::Parse {
            name: name.to_string(),
            message: e.to_string(),
        })?;
        let mut entries = IndexMap::new();
        flatten_toml_table(&table, "", &mut entries);
        if entries.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![PropertySet::from_entries(name, entries)])
    }
}

fn join_key(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

fn flatten_yaml(value: &serde_yaml::Value, prefix: &str, out: &mut IndexMap<String, String>) {
    use serde_yaml::Value;
    match value {
        Value::Mapping(mapping) => {
            for (key, value) in mapping {
                let key = yaml_scalar_to_string(key);
                flatten_yaml(value, &join_key(prefix, &key), out);
            }
        }
        Value::Sequence(items) => {
            for (i, item) in items.iter().enumerate() {
                flatten_yaml(item, &format!("{prefix}[{i}]"), out);
            }
        }
        Value::Tagged(tagged) => flatten_yaml(&tagged.value, prefix, out),
        scalar => {
            out.insert(prefix.to_string(), yaml_scalar_to_string(scalar));
        }
    }
}

fn yaml_scalar_to_string(value: &serde_yaml::Value) -> String {
    use serde_yaml::Value;
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

fn flatten_toml_table(table: &toml::Table, prefix: &str, out: &mut IndexMap<String, String>) {
    for (key, value) in table {
        flatten_toml(value, &join_key(prefix, key), out);
    }
}

fn flatten_toml(value: &toml::Value, prefix: &str, out: &mut IndexMap<String, String>) {
    use toml::Value;
    match value {
        Value::Table(table) => flatten_toml_table(table, prefix, out),
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                flatten_toml(item, &format!("{prefix}[{i}]"), out);
            }
        }
        Value::String(s) => {
            out.insert(prefix.to_string(), s.clone());
        }
        Value::Integer(i) => {
            out.insert(prefix.to_string(), i.to_string());
        }
        Value::Float(f) => {
            out.insert(prefix.to_string(), f.to_string());
        }
        Value::Boolean(b) => {
            out.insert(prefix.to_string(), b.to_string());
        }
        Value::Datetime(dt) => {
            out.insert(prefix.to_string(), dt.to_string());
        }
    }
}

/// Loads a [`ConfigData`] from a resolved resource via the loader recorded
/// on its reference.
#[derive(Debug, Default)]
pub struct DataLoader;

impl DataLoader {
    pub fn new() -> Self {
        Self
    }

    /// Empty-directory markers yield the constant empty data; everything
    /// else is read and handed to the reference's loader. Each produced set
    /// is marked profile-specific when the reference carries a profile.
    pub fn load(&self, resource: &ConfigResource) -> Result<ConfigData, Error> {
        if resource.is_empty_directory() {
            return Ok(ConfigData::empty());
        }
        if !resource.raw().exists() {
            return Err(NotFoundError::Resource {
                resource: resource.to_string(),
                location: resource.location().to_string(),
            }
            .into());
        }
        let name = format!(
            "Config resource '{}' via location '{}'",
            resource,
            resource.location()
        );
        let content = std::fs::read_to_string(resource.raw().path()).map_err(|source| Error::Load {
            name: name.clone(),
            source,
        })?;
        let sets = resource.reference().loader().load(&name, &content)?;
        let options = if resource.profile().is_some() {
            PropertySourceOptions::Always(Options::PROFILE_SPECIFIC)
        } else {
            PropertySourceOptions::ALWAYS_NONE
        };
        Ok(ConfigData::new(sets, options))
    }
}
