/*!
This module reads and writes trees as JSON documents.

```text
leaf:   { "index": -1, "vote": <number> }
branch: { "index": <integer>, "value": <number>, "vote": <number>,
          "feature": <string>, "left": <node>, "right": <node> }
```

A node is a branch if and only if it has a `"feature"` field. Features are written by name and resolved to indexes with a [`FeatureLookup`] when read. The `"index"` field is written for readers of the document and ignored when reading.
*/

use crate::tree::{BranchNode, FeatureValue, LeafNode, Node, Tree};
use boosting_config::FeatureLookup;
use num_traits::NumCast;
use serde_json::{json, Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeserializeError {
	#[error("expected a node object but found {0}")]
	NotAnObject(&'static str),
	#[error("expected an array of trees but found {0}")]
	NotAnArray(&'static str),
	#[error("node is missing the \"{0}\" field")]
	MissingField(&'static str),
	#[error("the \"{field}\" field must be {expected}")]
	InvalidField {
		field: &'static str,
		expected: &'static str,
	},
	#[error("failed to find feature \"{0}\" in config")]
	UnknownFeature(String),
	#[error("failed to load tree {index}: {source}")]
	Tree {
		index: usize,
		source: Box<DeserializeError>,
	},
	#[error("failed to parse json: {0}")]
	Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum SerializeError {
	#[error("feature index {0} has no name in config")]
	UnknownFeatureIndex(usize),
	#[error("the \"{field}\" field is not finite")]
	NotFinite { field: &'static str },
	#[error("failed to write tree {index}: {source}")]
	Tree {
		index: usize,
		source: Box<SerializeError>,
	},
	#[error("failed to write json: {0}")]
	Json(#[from] serde_json::Error),
}

/// Read a tree from a JSON document, resolving feature names with `config`.
pub fn from_json<T, C>(value: &Value, config: &C) -> Result<Tree<T>, DeserializeError>
where
	T: FeatureValue,
	C: FeatureLookup + ?Sized,
{
	let mut nodes = Vec::new();
	read_node(value, config, &mut nodes)?;
	log::debug!("loaded a tree with {} nodes", nodes.len());
	Ok(Tree::from_nodes(nodes))
}

/// Parse `json` and read a tree from it.
pub fn from_json_str<T, C>(json: &str, config: &C) -> Result<Tree<T>, DeserializeError>
where
	T: FeatureValue,
	C: FeatureLookup + ?Sized,
{
	let value: Value = serde_json::from_str(json)?;
	from_json(&value, config)
}

/// Read every tree of an ensemble from a JSON array of tree documents.
pub fn trees_from_json<T, C>(value: &Value, config: &C) -> Result<Vec<Tree<T>>, DeserializeError>
where
	T: FeatureValue,
	C: FeatureLookup + ?Sized,
{
	let trees = value
		.as_array()
		.ok_or_else(|| DeserializeError::NotAnArray(kind(value)))?
		.iter()
		.enumerate()
		.map(|(index, value)| {
			from_json(value, config).map_err(|source| DeserializeError::Tree {
				index,
				source: Box::new(source),
			})
		})
		.collect::<Result<Vec<_>, _>>()?;
	log::debug!("loaded {} trees", trees.len());
	Ok(trees)
}

/// Write a tree as a JSON document, naming features with `config`.
pub fn to_json<T, C>(tree: &Tree<T>, config: &C) -> Result<Value, SerializeError>
where
	T: FeatureValue,
	C: FeatureLookup + ?Sized,
{
	// Every branch precedes its children, so writing the nodes in reverse order writes each child before its parent.
	let mut documents = vec![Value::Null; tree.nodes().len()];
	for node_index in (0..documents.len()).rev() {
		let document = write_node(tree, node_index, config, &mut documents)?;
		documents[node_index] = document;
	}
	Ok(std::mem::take(&mut documents[0]))
}

/// Write a tree as a pretty-printed JSON string.
pub fn to_json_string<T, C>(tree: &Tree<T>, config: &C) -> Result<String, SerializeError>
where
	T: FeatureValue,
	C: FeatureLookup + ?Sized,
{
	let value = to_json(tree, config)?;
	Ok(serde_json::to_string_pretty(&value)?)
}

/// Write every tree of an ensemble as a JSON array.
pub fn trees_to_json<T, C>(trees: &[Tree<T>], config: &C) -> Result<Value, SerializeError>
where
	T: FeatureValue,
	C: FeatureLookup + ?Sized,
{
	let trees = trees
		.iter()
		.enumerate()
		.map(|(index, tree)| {
			to_json(tree, config).map_err(|source| SerializeError::Tree {
				index,
				source: Box::new(source),
			})
		})
		.collect::<Result<Vec<_>, _>>()?;
	log::debug!("wrote {} trees", trees.len());
	Ok(Value::Array(trees))
}

/// Read the node in `value` and its subtree into `nodes`, returning the node's index. A branch's slot is reserved before its children are read so that every parent precedes its children.
fn read_node<T, C>(
	value: &Value,
	config: &C,
	nodes: &mut Vec<Node<T>>,
) -> Result<usize, DeserializeError>
where
	T: FeatureValue,
	C: FeatureLookup + ?Sized,
{
	let object = value
		.as_object()
		.ok_or_else(|| DeserializeError::NotAnObject(kind(value)))?;
	let vote = read_vote(object)?;
	let node_index = nodes.len();
	let feature = match object.get("feature") {
		Some(feature) => feature,
		None => {
			nodes.push(Node::Leaf(LeafNode { vote }));
			return Ok(node_index);
		}
	};
	let feature_name = feature
		.as_str()
		.ok_or(DeserializeError::InvalidField {
			field: "feature",
			expected: "a string",
		})?;
	let feature_index = match config.feature_index(feature_name) {
		Some(feature_index) => feature_index,
		None => return Err(DeserializeError::UnknownFeature(feature_name.to_owned())),
	};
	let split_value = read_split_value(object)?;
	let left = object
		.get("left")
		.ok_or(DeserializeError::MissingField("left"))?;
	let right = object
		.get("right")
		.ok_or(DeserializeError::MissingField("right"))?;
	nodes.push(Node::Leaf(LeafNode { vote }));
	let left_child_index = read_node(left, config, nodes)?;
	let right_child_index = read_node(right, config, nodes)?;
	nodes[node_index] = Node::Branch(BranchNode {
		feature_index,
		split_value,
		vote,
		left_child_index,
		right_child_index,
	});
	Ok(node_index)
}

fn read_vote(object: &Map<String, Value>) -> Result<f64, DeserializeError> {
	object
		.get("vote")
		.ok_or(DeserializeError::MissingField("vote"))?
		.as_f64()
		.ok_or(DeserializeError::InvalidField {
			field: "vote",
			expected: "a number",
		})
}

/// Integer encodings are converted as integers so that large integer split values are not rounded through `f64`.
fn read_split_value<T>(object: &Map<String, Value>) -> Result<T, DeserializeError>
where
	T: FeatureValue,
{
	let number = match object.get("value") {
		Some(Value::Number(number)) => number,
		Some(_) => {
			return Err(DeserializeError::InvalidField {
				field: "value",
				expected: "a number",
			})
		}
		None => return Err(DeserializeError::MissingField("value")),
	};
	let split_value = if let Some(value) = number.as_i64() {
		<T as NumCast>::from(value)
	} else if let Some(value) = number.as_u64() {
		<T as NumCast>::from(value)
	} else {
		number.as_f64().and_then(<T as NumCast>::from)
	};
	split_value.ok_or(DeserializeError::InvalidField {
		field: "value",
		expected: "representable as the feature type",
	})
}

/// Write the node at `node_index`, taking its children's documents out of `documents`.
fn write_node<T, C>(
	tree: &Tree<T>,
	node_index: usize,
	config: &C,
	documents: &mut [Value],
) -> Result<Value, SerializeError>
where
	T: FeatureValue,
	C: FeatureLookup + ?Sized,
{
	match tree.node(node_index) {
		Node::Leaf(LeafNode { vote }) => {
			let vote = finite(*vote, "vote")?;
			Ok(json!({
				"index": -1,
				"vote": vote,
			}))
		}
		Node::Branch(BranchNode {
			feature_index,
			split_value,
			vote,
			left_child_index,
			right_child_index,
		}) => {
			let feature_name = config
				.feature_name(*feature_index)
				.ok_or(SerializeError::UnknownFeatureIndex(*feature_index))?;
			// serde_json turns NaN and infinities into null.
			let split_value: Value = (*split_value).into();
			if split_value.is_null() {
				return Err(SerializeError::NotFinite { field: "value" });
			}
			let vote = finite(*vote, "vote")?;
			let left = std::mem::take(&mut documents[*left_child_index]);
			let right = std::mem::take(&mut documents[*right_child_index]);
			Ok(json!({
				"index": feature_index,
				"value": split_value,
				"left": left,
				"right": right,
				"vote": vote,
				"feature": feature_name,
			}))
		}
	}
}

fn finite(value: f64, field: &'static str) -> Result<f64, SerializeError> {
	if value.is_finite() {
		Ok(value)
	} else {
		Err(SerializeError::NotFinite { field })
	}
}

fn kind(value: &Value) -> &'static str {
	match value {
		Value::Null => "null",
		Value::Bool(_) => "a boolean",
		Value::Number(_) => "a number",
		Value::String(_) => "a string",
		Value::Array(_) => "an array",
		Value::Object(_) => "an object",
	}
}

#[cfg(test)]
fn test_config() -> boosting_config::Config {
	boosting_config::Config::new(vec!["age", "income", "height"]).unwrap()
}

#[test]
fn test_read_leaf() {
	let tree: Tree<f64> = from_json(&json!({ "vote": 2.5 }), &test_config()).unwrap();
	assert_eq!(tree, Tree::leaf(2.5));
}

#[test]
fn test_read_branch() {
	let document = json!({
		"feature": "age",
		"value": 30,
		"vote": 1.0,
		"left": { "vote": 0 },
		"right": { "vote": 1 },
	});
	let tree: Tree<i32> = from_json(&document, &test_config()).unwrap();
	assert_eq!(
		tree,
		Tree::branch(0, 30, Tree::leaf(0.0), Tree::leaf(1.0)).with_vote(1.0)
	);
	let tree: Tree<f32> = from_json(&document, &test_config()).unwrap();
	match tree.root() {
		Node::Branch(branch) => assert_eq!(branch.split_value, 30.0),
		Node::Leaf(_) => panic!("expected a branch"),
	}
}

#[test]
fn test_leaf_ignores_other_fields() {
	let document = json!({
		"index": 4,
		"value": 12.5,
		"vote": -0.5,
		"left": { "vote": 100.0 },
		"right": "not a node",
	});
	let tree: Tree<f64> = from_json(&document, &test_config()).unwrap();
	assert_eq!(tree, Tree::leaf(-0.5));
}

#[test]
fn test_float_value_for_integer_features() {
	let document = json!({
		"feature": "income",
		"value": 7.9,
		"vote": 0.0,
		"left": { "vote": 1.0 },
		"right": { "vote": 2.0 },
	});
	let tree: Tree<i64> = from_json(&document, &test_config()).unwrap();
	assert_eq!(tree.evaluate(&[0, 7]), 1.0);
	assert_eq!(tree.evaluate(&[0, 8]), 2.0);
}

#[test]
fn test_value_out_of_range() {
	let document = json!({
		"feature": "age",
		"value": 300,
		"vote": 0.0,
		"left": { "vote": 1.0 },
		"right": { "vote": 2.0 },
	});
	let error = from_json::<u8, _>(&document, &test_config()).unwrap_err();
	insta::assert_snapshot!(error.to_string(), @r###"the "value" field must be representable as the feature type"###);
}

#[test]
fn test_unknown_feature() {
	let document = json!({
		"feature": "weight",
		"value": 70,
		"vote": 0.0,
		"left": { "vote": 1.0 },
		"right": { "vote": 2.0 },
	});
	let error = from_json::<i32, _>(&document, &test_config()).unwrap_err();
	assert!(matches!(error, DeserializeError::UnknownFeature(ref name) if name == "weight"));
	insta::assert_snapshot!(error.to_string(), @r###"failed to find feature "weight" in config"###);
}

#[test]
fn test_unknown_feature_in_subtree() {
	let document = json!({
		"feature": "age",
		"value": 30,
		"vote": 0.0,
		"left": { "vote": 1.0 },
		"right": {
			"feature": "weight",
			"value": 70,
			"vote": 0.0,
			"left": { "vote": 1.0 },
			"right": { "vote": 2.0 },
		},
	});
	let result = from_json::<i32, _>(&document, &test_config());
	assert!(matches!(result, Err(DeserializeError::UnknownFeature(_))));
}

#[test]
fn test_malformed_branches() {
	let config = test_config();
	let missing_right = json!({
		"feature": "age",
		"value": 30,
		"vote": 0.0,
		"left": { "vote": 1.0 },
	});
	let error = from_json::<i32, _>(&missing_right, &config).unwrap_err();
	insta::assert_snapshot!(error.to_string(), @r###"node is missing the "right" field"###);
	let missing_value = json!({
		"feature": "age",
		"vote": 0.0,
		"left": { "vote": 1.0 },
		"right": { "vote": 2.0 },
	});
	let error = from_json::<i32, _>(&missing_value, &config).unwrap_err();
	insta::assert_snapshot!(error.to_string(), @r###"node is missing the "value" field"###);
	let null_feature = json!({
		"feature": null,
		"value": 30,
		"vote": 0.0,
		"left": { "vote": 1.0 },
		"right": { "vote": 2.0 },
	});
	let error = from_json::<i32, _>(&null_feature, &config).unwrap_err();
	insta::assert_snapshot!(error.to_string(), @r###"the "feature" field must be a string"###);
	let child_not_object = json!({
		"feature": "age",
		"value": 30,
		"vote": 0.0,
		"left": [1.0],
		"right": { "vote": 2.0 },
	});
	let error = from_json::<i32, _>(&child_not_object, &config).unwrap_err();
	insta::assert_snapshot!(error.to_string(), @"expected a node object but found an array");
}

#[test]
fn test_malformed_votes() {
	let config = test_config();
	let error = from_json::<f64, _>(&json!({ "index": -1 }), &config).unwrap_err();
	insta::assert_snapshot!(error.to_string(), @r###"node is missing the "vote" field"###);
	let error = from_json::<f64, _>(&json!({ "vote": "0.5" }), &config).unwrap_err();
	insta::assert_snapshot!(error.to_string(), @r###"the "vote" field must be a number"###);
}

#[test]
fn test_write_tree() {
	let tree = Tree::branch(
		2,
		1.5f64,
		Tree::leaf(-1.0),
		Tree::branch(0, 40.0, Tree::leaf(0.5), Tree::leaf(2.0)).with_vote(1.25),
	)
	.with_vote(0.75);
	let json = to_json_string(&tree, &test_config()).unwrap();
	insta::assert_snapshot!(json, @r###"
 {
   "feature": "height",
   "index": 2,
   "left": {
     "index": -1,
     "vote": -1.0
   },
   "right": {
     "feature": "age",
     "index": 0,
     "left": {
       "index": -1,
       "vote": 0.5
     },
     "right": {
       "index": -1,
       "vote": 2.0
     },
     "value": 40.0,
     "vote": 1.25
   },
   "value": 1.5,
   "vote": 0.75
 }
 "###);
}

#[test]
fn test_write_integer_split_value() {
	let tree = Tree::branch(1, 30u32, Tree::leaf(0.0), Tree::leaf(1.0));
	let value = to_json(&tree, &test_config()).unwrap();
	assert_eq!(value["value"], json!(30));
	assert!(value["value"].is_u64());
	assert_eq!(value["feature"], json!("income"));
	assert_eq!(value["index"], json!(1));
	assert_eq!(value["left"], json!({ "index": -1, "vote": 0.0 }));
}

#[test]
fn test_write_unknown_feature_index() {
	let tree = Tree::branch(7, 1, Tree::leaf(0.0), Tree::leaf(1.0));
	let error = to_json(&tree, &test_config()).unwrap_err();
	assert!(matches!(error, SerializeError::UnknownFeatureIndex(7)));
}

#[test]
fn test_write_not_finite() {
	let config = test_config();
	let tree = Tree::branch(0, std::f64::INFINITY, Tree::leaf(1.0), Tree::leaf(2.0));
	let error = to_json(&tree, &config).unwrap_err();
	insta::assert_snapshot!(error.to_string(), @r###"the "value" field is not finite"###);
	let tree = Tree::branch(0, 1.0f64, Tree::leaf(std::f64::NAN), Tree::leaf(2.0));
	let error = to_json(&tree, &config).unwrap_err();
	assert!(matches!(error, SerializeError::NotFinite { field: "vote" }));
	let mut tree = Tree::branch(0, 1.0f64, Tree::leaf(1.0), Tree::leaf(2.0));
	tree.scale(std::f64::INFINITY);
	assert!(matches!(
		to_json(&tree, &config),
		Err(SerializeError::NotFinite { field: "vote" })
	));
	let tree = Tree::<f32>::branch(0, std::f32::NAN, Tree::leaf(1.0), Tree::leaf(2.0));
	assert!(matches!(
		to_json(&tree, &config),
		Err(SerializeError::NotFinite { field: "value" })
	));
}

#[test]
fn test_write_deep_tree() {
	// A chain of branches, each with a leaf on the left and the next branch on the right.
	let depth = 500;
	let mut nodes = Vec::with_capacity(2 * depth + 1);
	for i in 0..depth {
		nodes.push(Node::Branch(BranchNode {
			feature_index: 0,
			split_value: i as i32,
			vote: 0.0,
			left_child_index: 2 * i + 1,
			right_child_index: 2 * i + 2,
		}));
		nodes.push(Node::Leaf(LeafNode { vote: i as f64 }));
	}
	nodes.push(Node::Leaf(LeafNode { vote: -1.0 }));
	let tree = Tree::from_nodes(nodes);
	assert_eq!(tree.depth(), depth);
	let document = to_json(&tree, &test_config()).unwrap();
	let mut node = &document;
	let mut n_branches = 0;
	while node.get("feature").is_some() {
		assert_eq!(node["value"], json!(n_branches));
		assert_eq!(node["left"]["vote"], json!(n_branches as f64));
		node = &node["right"];
		n_branches += 1;
	}
	assert_eq!(n_branches, depth);
	assert_eq!(node["vote"], json!(-1.0));
}

#[test]
fn test_round_trip() {
	let config = test_config();
	let tree = Tree::branch(
		1,
		50_000.0f64,
		Tree::branch(0, 30.0, Tree::leaf(0.1), Tree::leaf(0.2)).with_vote(0.15),
		Tree::branch(2, 180.5, Tree::leaf(0.3), Tree::leaf(0.4)).with_vote(0.35),
	)
	.with_vote(0.25);
	let document = to_json(&tree, &config).unwrap();
	let loaded: Tree<f64> = from_json(&document, &config).unwrap();
	assert_eq!(loaded, tree);
	let examples = [
		[29.0, 10_000.0, 170.0],
		[30.0, 50_000.0, 170.0],
		[31.0, 49_999.0, 200.0],
		[18.0, 60_000.0, 180.5],
		[90.0, 60_000.0, 181.0],
	];
	for example in examples.iter() {
		assert_eq!(loaded.evaluate(example), tree.evaluate(example));
	}
}

#[test]
fn test_round_trip_string() {
	let config = test_config();
	let tree = Tree::branch(0, -3i16, Tree::leaf(1.0), Tree::leaf(2.0)).with_vote(1.5);
	let json = to_json_string(&tree, &config).unwrap();
	let loaded: Tree<i16> = from_json_str(&json, &config).unwrap();
	assert_eq!(loaded, tree);
}

#[test]
fn test_from_json_str_invalid() {
	let result = from_json_str::<f64, _>("{ \"vote\": ", &test_config());
	assert!(matches!(result, Err(DeserializeError::Json(_))));
}

#[test]
fn test_trees_round_trip() {
	let config = test_config();
	let trees = vec![
		Tree::leaf(0.5),
		Tree::branch(0, 2.0f32, Tree::leaf(1.0), Tree::leaf(-1.0)),
	];
	let document = trees_to_json(&trees, &config).unwrap();
	assert_eq!(document.as_array().map(Vec::len), Some(2));
	let loaded: Vec<Tree<f32>> = trees_from_json(&document, &config).unwrap();
	assert_eq!(loaded, trees);
}

#[test]
fn test_trees_from_json_errors() {
	let config = test_config();
	let error = trees_from_json::<f64, _>(&json!({ "vote": 1.0 }), &config).unwrap_err();
	insta::assert_snapshot!(error.to_string(), @"expected an array of trees but found an object");
	let document = json!([{ "vote": 1.0 }, { "feature": "weight", "value": 1, "vote": 0.0 }]);
	let error = trees_from_json::<f64, _>(&document, &config).unwrap_err();
	insta::assert_snapshot!(error.to_string(), @r###"failed to load tree 1: failed to find feature "weight" in config"###);
}
