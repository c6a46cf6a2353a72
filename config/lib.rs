/*!
This crate defines how features are named. Trees refer to features by their index in the feature vector, but documents refer to them by name. The [`FeatureLookup`] trait converts between the two, and [`Config`] is a feature table that implements it.

# Example

```
use boosting_config::{Config, FeatureLookup};

let config = Config::from_json_str(r#"{ "features": ["age", "income"] }"#).unwrap();
assert_eq!(config.feature_index("income"), Some(1));
assert_eq!(config.feature_name(0), Some("age"));
assert_eq!(config.feature_index("height"), None);
```
*/

use fnv::FnvBuildHasher;
use std::{collections::HashMap, convert::TryFrom};
use thiserror::Error;

/// A `FeatureLookup` maps feature names to indexes in the feature vector and back.
pub trait FeatureLookup {
	/// Find the index of the feature named `name`, or `None` if there is no such feature.
	fn feature_index(&self, name: &str) -> Option<usize>;
	/// Find the name of the feature at `index`, or `None` if the index is out of range.
	fn feature_name(&self, index: usize) -> Option<&str>;
}

impl<L> FeatureLookup for &L
where
	L: FeatureLookup + ?Sized,
{
	fn feature_index(&self, name: &str) -> Option<usize> {
		(**self).feature_index(name)
	}

	fn feature_name(&self, index: usize) -> Option<&str> {
		(**self).feature_name(index)
	}
}

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("feature \"{0}\" appears more than once")]
	DuplicateFeature(String),
	#[error("the feature at index {0} has an empty name")]
	EmptyFeatureName(usize),
	#[error("failed to parse config: {0}")]
	Json(#[from] serde_json::Error),
	#[error("failed to parse config: {0}")]
	Yaml(#[from] serde_yaml::Error),
}

/// A `Config` holds the ordered list of feature names. The index of a name in the list is the index of that feature in the feature vector.
#[derive(Clone, Debug, serde::Deserialize)]
#[serde(try_from = "ConfigFile")]
pub struct Config {
	feature_names: Vec<String>,
	feature_indexes: HashMap<String, usize, FnvBuildHasher>,
}

#[derive(serde::Deserialize)]
struct ConfigFile {
	features: Vec<String>,
}

impl TryFrom<ConfigFile> for Config {
	type Error = ConfigError;
	fn try_from(file: ConfigFile) -> Result<Self, Self::Error> {
		Config::new(file.features)
	}
}

impl Config {
	/// Create a `Config` from feature names given in feature vector order.
	pub fn new<I, S>(feature_names: I) -> Result<Config, ConfigError>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		let feature_names: Vec<String> = feature_names.into_iter().map(Into::into).collect();
		let mut feature_indexes =
			HashMap::with_capacity_and_hasher(feature_names.len(), FnvBuildHasher::default());
		for (index, name) in feature_names.iter().enumerate() {
			if name.is_empty() {
				return Err(ConfigError::EmptyFeatureName(index));
			}
			if feature_indexes.insert(name.clone(), index).is_some() {
				return Err(ConfigError::DuplicateFeature(name.clone()));
			}
		}
		Ok(Config {
			feature_names,
			feature_indexes,
		})
	}

	/// Parse a `Config` from a JSON document of the form `{ "features": [...] }`.
	pub fn from_json_str(json: &str) -> Result<Config, ConfigError> {
		Ok(serde_json::from_str(json)?)
	}

	/// Parse a `Config` from a YAML document with a `features` list.
	pub fn from_yaml_str(yaml: &str) -> Result<Config, ConfigError> {
		Ok(serde_yaml::from_str(yaml)?)
	}

	pub fn n_features(&self) -> usize {
		self.feature_names.len()
	}

	pub fn feature_names(&self) -> &[String] {
		&self.feature_names
	}
}

impl FeatureLookup for Config {
	fn feature_index(&self, name: &str) -> Option<usize> {
		self.feature_indexes.get(name).copied()
	}

	fn feature_name(&self, index: usize) -> Option<&str> {
		self.feature_names.get(index).map(String::as_str)
	}
}

#[test]
fn test_lookup() {
	let config = Config::new(vec!["age", "income", "height"]).unwrap();
	assert_eq!(config.n_features(), 3);
	assert_eq!(config.feature_index("age"), Some(0));
	assert_eq!(config.feature_index("height"), Some(2));
	assert_eq!(config.feature_index("weight"), None);
	assert_eq!(config.feature_name(1), Some("income"));
	assert_eq!(config.feature_name(3), None);
}

#[test]
fn test_names_round_trip() {
	let config = Config::new(vec!["a", "b", "c", "d"]).unwrap();
	for (index, name) in config.feature_names().iter().enumerate() {
		assert_eq!(config.feature_index(name), Some(index));
		assert_eq!(config.feature_name(index), Some(name.as_str()));
	}
}

#[test]
fn test_duplicate_feature() {
	let error = Config::new(vec!["age", "income", "age"]).unwrap_err();
	insta::assert_snapshot!(error.to_string(), @r###"feature "age" appears more than once"###);
}

#[test]
fn test_empty_feature_name() {
	let error = Config::new(vec!["age", ""]).unwrap_err();
	insta::assert_snapshot!(error.to_string(), @"the feature at index 1 has an empty name");
}

#[test]
fn test_from_json() {
	let config = Config::from_json_str(r#"{ "features": ["x0", "x1"] }"#).unwrap();
	assert_eq!(config.feature_names(), &["x0".to_owned(), "x1".to_owned()]);
	assert!(matches!(
		Config::from_json_str(r#"{ "features": ["x0", "x0"] }"#),
		Err(ConfigError::Json(_))
	));
	assert!(matches!(
		Config::from_json_str(r#"{ "columns": [] }"#),
		Err(ConfigError::Json(_))
	));
}

#[test]
fn test_from_yaml() {
	let yaml = "features:\n  - age\n  - income\n";
	let config = Config::from_yaml_str(yaml).unwrap();
	assert_eq!(config.feature_index("income"), Some(1));
}

#[test]
fn test_lookup_through_reference() {
	fn index_of(lookup: impl FeatureLookup, name: &str) -> Option<usize> {
		lookup.feature_index(name)
	}
	let config = Config::new(vec!["age"]).unwrap();
	assert_eq!(index_of(&config, "age"), Some(0));
}
