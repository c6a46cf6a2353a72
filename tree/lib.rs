/*!
This crate implements the decision trees that make up a boosted tree ensemble. A tree scores a numeric feature vector, can be re-weighted by scaling its votes, and can be written to and read from JSON documents that name features through a [`boosting_config::FeatureLookup`].

# Example

```
use boosting_config::Config;
use boosting_tree::{from_json_str, predict, Tree};

let config = Config::new(vec!["age"]).unwrap();
let tree: Tree<i32> = from_json_str(
	r#"{
		"feature": "age",
		"value": 30,
		"vote": 1.0,
		"left": { "vote": 0 },
		"right": { "vote": 1 }
	}"#,
	&config,
)
.unwrap();
assert_eq!(tree.evaluate(&[30]), 0.0);
assert_eq!(tree.evaluate(&[31]), 1.0);
assert_eq!(predict(&[tree.clone(), tree], &[40]), 2.0);
```
*/

#![allow(clippy::tabs_in_doc_comments)]

mod json;
mod predict;
mod tree;

pub use self::json::{
	from_json, from_json_str, to_json, to_json_string, trees_from_json, trees_to_json,
	DeserializeError, SerializeError,
};
pub use self::predict::{
	cumulative_predictions, predict, predict_many, predict_with_trace, scale_trees,
};
pub use self::tree::{BranchNode, EvaluateError, FeatureValue, LeafNode, Node, Tree};

#[test]
fn test_tree_is_send_and_sync() {
	fn assert_send_sync<S: Send + Sync>() {}
	assert_send_sync::<Tree<f32>>();
	assert_send_sync::<Tree<i64>>();
}

#[test]
fn test_shared_evaluation() {
	use std::{sync::Arc, thread};
	let tree = Arc::new(Tree::branch(0, 5, Tree::leaf(1.0), Tree::leaf(2.0)));
	let handles: Vec<_> = (0..4)
		.map(|i| {
			let tree = Arc::clone(&tree);
			thread::spawn(move || tree.evaluate(&[i * 3]))
		})
		.collect();
	let results: Vec<f64> = handles
		.into_iter()
		.map(|handle| handle.join().unwrap())
		.collect();
	assert_eq!(results, vec![1.0, 1.0, 2.0, 2.0]);
}
