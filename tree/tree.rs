use num_traits::NumCast;
use std::fmt::Debug;
use thiserror::Error;

/**
`FeatureValue` is the numeric type of the elements of a feature vector and of the split values of a tree's branches. Any primitive integer or floating point type is a `FeatureValue`.

Split values read from documents may be encoded as integers or floats, so a `FeatureValue` must be convertible from both with [`NumCast`]. It must also convert into a JSON number so that trees can be written back out.
*/
pub trait FeatureValue: Copy + Debug + PartialOrd + NumCast + Into<serde_json::Value> {}

impl<T> FeatureValue for T where T: Copy + Debug + PartialOrd + NumCast + Into<serde_json::Value> {}

/// Trees are stored as a `Vec` of `Node`s with the root at index 0. Each branch in the tree has two indexes into the `Vec`, one for each of its children.
#[derive(Clone, Debug, PartialEq)]
pub struct Tree<T> {
	nodes: Vec<Node<T>>,
}

/// A node is either a branch or a leaf.
#[derive(Clone, Debug, PartialEq)]
pub enum Node<T> {
	Branch(BranchNode<T>),
	Leaf(LeafNode),
}

/// A `BranchNode` sends an example to its left child if the value of feature `feature_index` is <= `split_value`, and to its right child otherwise.
#[derive(Clone, Debug, PartialEq)]
pub struct BranchNode<T> {
	/// This is the index of the feature to get the value for.
	pub feature_index: usize,
	/// This is the threshold value of the split.
	pub split_value: T,
	/// Branches carry a vote too. It is scaled and written out with the tree, but never used to make a prediction.
	pub vote: f64,
	/// This is the index in the tree's node vector for this node's left child.
	pub left_child_index: usize,
	/// This is the index in the tree's node vector for this node's right child.
	pub right_child_index: usize,
}

/// The leaves in a tree hold the values to output for examples that get sent to them.
#[derive(Clone, Debug, PartialEq)]
pub struct LeafNode {
	pub vote: f64,
}

#[derive(Debug, Error, PartialEq)]
pub enum EvaluateError {
	#[error("feature index {feature_index} is out of bounds for a feature vector of length {n_features}")]
	FeatureIndexOutOfBounds {
		feature_index: usize,
		n_features: usize,
	},
}

impl<T> Node<T> {
	pub fn vote(&self) -> f64 {
		match self {
			Node::Branch(BranchNode { vote, .. }) => *vote,
			Node::Leaf(LeafNode { vote }) => *vote,
		}
	}

	fn vote_mut(&mut self) -> &mut f64 {
		match self {
			Node::Branch(BranchNode { vote, .. }) => vote,
			Node::Leaf(LeafNode { vote }) => vote,
		}
	}

	pub fn is_leaf(&self) -> bool {
		matches!(self, Node::Leaf(_))
	}

	/// Shift the child indexes of a branch so the node can be moved `offset` places further into a node vector.
	fn offset(self, offset: usize) -> Node<T> {
		match self {
			Node::Branch(branch) => Node::Branch(BranchNode {
				left_child_index: branch.left_child_index + offset,
				right_child_index: branch.right_child_index + offset,
				..branch
			}),
			leaf => leaf,
		}
	}
}

impl<T> Tree<T>
where
	T: FeatureValue,
{
	/// Create a tree with a single leaf.
	pub fn leaf(vote: f64) -> Tree<T> {
		Tree {
			nodes: vec![Node::Leaf(LeafNode { vote })],
		}
	}

	/// Create a tree whose root is a branch on `feature_index` at `split_value`, taking ownership of `left` and `right` as its subtrees. The root's vote is 0.
	///
	/// Both subtrees are copied into the new node vector, so building a tree of depth n one branch at a time is O(n²).
	pub fn branch(feature_index: usize, split_value: T, left: Tree<T>, right: Tree<T>) -> Tree<T> {
		let left_child_index = 1;
		let right_child_index = left_child_index + left.nodes.len();
		let mut nodes = Vec::with_capacity(right_child_index + right.nodes.len());
		nodes.push(Node::Branch(BranchNode {
			feature_index,
			split_value,
			vote: 0.0,
			left_child_index,
			right_child_index,
		}));
		nodes.extend(left.nodes.into_iter().map(|node| node.offset(left_child_index)));
		nodes.extend(right.nodes.into_iter().map(|node| node.offset(right_child_index)));
		Tree { nodes }
	}

	/// Set the vote of the root node.
	pub fn with_vote(mut self, vote: f64) -> Tree<T> {
		if let Some(root) = self.nodes.first_mut() {
			*root.vote_mut() = vote;
		}
		self
	}

	/// The caller must guarantee that `nodes` is a strictly binary tree rooted at index 0 in which every node but the root is the child of exactly one branch, and every branch precedes its children.
	pub(crate) fn from_nodes(nodes: Vec<Node<T>>) -> Tree<T> {
		Tree { nodes }
	}

	pub fn root(&self) -> &Node<T> {
		&self.nodes[0]
	}

	/// Get the node at `node_index`. Panics if the index is out of range.
	pub fn node(&self, node_index: usize) -> &Node<T> {
		&self.nodes[node_index]
	}

	pub fn nodes(&self) -> &[Node<T>] {
		&self.nodes
	}

	/**
	Compute this tree's contribution for `features`.

	Every feature index used by a branch in the tree must be in range for `features`. Violating this is a bug in the caller, so this function panics. Use [`Tree::try_evaluate`] to get an error instead.
	*/
	pub fn evaluate(&self, features: &[T]) -> f64 {
		match self.try_evaluate(features) {
			Ok(vote) => vote,
			Err(error) => panic!("{}", error),
		}
	}

	/// Compute this tree's contribution for `features`, returning an error if a branch reads a feature that `features` does not have.
	pub fn try_evaluate(&self, features: &[T]) -> Result<f64, EvaluateError> {
		// Start at the root node.
		let mut node_index = 0;
		// Traverse the tree until we get to a leaf.
		loop {
			match &self.nodes[node_index] {
				Node::Branch(BranchNode {
					feature_index,
					split_value,
					left_child_index,
					right_child_index,
					..
				}) => {
					let feature_value = features.get(*feature_index).ok_or(
						EvaluateError::FeatureIndexOutOfBounds {
							feature_index: *feature_index,
							n_features: features.len(),
						},
					)?;
					// NaN compares false, so it is sent right.
					node_index = if *feature_value <= *split_value {
						*left_child_index
					} else {
						*right_child_index
					};
				}
				// We made it to a leaf! The prediction is the leaf's vote.
				Node::Leaf(LeafNode { vote }) => return Ok(*vote),
			}
		}
	}

	/// Multiply the vote of every node in the tree, branches included, by `weight`.
	pub fn scale(&mut self, weight: f64) {
		for node in self.nodes.iter_mut() {
			*node.vote_mut() *= weight;
		}
	}

	pub fn n_leaves(&self) -> usize {
		self.nodes.iter().filter(|node| node.is_leaf()).count()
	}

	/// The number of branches on the longest path from the root to a leaf. A single leaf has depth 0.
	pub fn depth(&self) -> usize {
		let mut max_depth = 0;
		let mut stack = vec![(0, 0)];
		while let Some((node_index, depth)) = stack.pop() {
			match &self.nodes[node_index] {
				Node::Branch(branch) => {
					stack.push((branch.left_child_index, depth + 1));
					stack.push((branch.right_child_index, depth + 1));
				}
				Node::Leaf(_) => max_depth = max_depth.max(depth),
			}
		}
		max_depth
	}

	/// The largest feature index used by any branch. A feature vector must be longer than this to evaluate the tree.
	pub fn max_feature_index(&self) -> Option<usize> {
		self.nodes
			.iter()
			.filter_map(|node| match node {
				Node::Branch(branch) => Some(branch.feature_index),
				Node::Leaf(_) => None,
			})
			.max()
	}
}

#[cfg(test)]
fn stump() -> Tree<i32> {
	Tree::branch(0, 5, Tree::leaf(1.0), Tree::leaf(2.0))
}

#[test]
fn test_leaf() {
	let tree = Tree::<f32>::leaf(0.75);
	assert_eq!(tree.evaluate(&[]), 0.75);
	assert_eq!(tree.evaluate(&[1.0, 2.0]), 0.75);
	assert_eq!(tree.depth(), 0);
	assert_eq!(tree.n_leaves(), 1);
	assert_eq!(tree.max_feature_index(), None);
}

#[test]
fn test_stump() {
	let tree = stump();
	assert_eq!(tree.evaluate(&[3]), 1.0);
	assert_eq!(tree.evaluate(&[5]), 1.0);
	assert_eq!(tree.evaluate(&[6]), 2.0);
}

#[test]
fn test_evaluate_is_deterministic() {
	let tree = stump();
	let first = tree.evaluate(&[4]);
	for _ in 0..10 {
		assert_eq!(tree.evaluate(&[4]), first);
	}
}

#[test]
fn test_branch_layout() {
	let tree = Tree::branch(
		1,
		0.5f64,
		Tree::branch(0, -1.0, Tree::leaf(1.0), Tree::leaf(2.0)),
		Tree::leaf(3.0),
	)
	.with_vote(0.25);
	insta::assert_debug_snapshot!(tree, @r###"
 Tree {
     nodes: [
         Branch(
             BranchNode {
                 feature_index: 1,
                 split_value: 0.5,
                 vote: 0.25,
                 left_child_index: 1,
                 right_child_index: 4,
             },
         ),
         Branch(
             BranchNode {
                 feature_index: 0,
                 split_value: -1.0,
                 vote: 0.0,
                 left_child_index: 2,
                 right_child_index: 3,
             },
         ),
         Leaf(
             LeafNode {
                 vote: 1.0,
             },
         ),
         Leaf(
             LeafNode {
                 vote: 2.0,
             },
         ),
         Leaf(
             LeafNode {
                 vote: 3.0,
             },
         ),
     ],
 }
 "###);
	assert_eq!(tree.depth(), 2);
	assert_eq!(tree.n_leaves(), 3);
	assert_eq!(tree.max_feature_index(), Some(1));
	assert_eq!(tree.evaluate(&[-2.0, 0.0]), 1.0);
	assert_eq!(tree.evaluate(&[0.0, 0.5]), 2.0);
	assert_eq!(tree.evaluate(&[-2.0, 0.7]), 3.0);
}

#[test]
fn test_nan_goes_right() {
	let tree = Tree::branch(0, 0.0f32, Tree::leaf(-1.0), Tree::leaf(1.0));
	assert_eq!(tree.evaluate(&[std::f32::NAN]), 1.0);
}

#[test]
fn test_scale() {
	let mut tree = Tree::branch(0, 5, Tree::leaf(1.0), Tree::leaf(-2.0)).with_vote(4.0);
	tree.scale(0.5);
	let votes: Vec<f64> = tree.nodes().iter().map(Node::vote).collect();
	assert_eq!(votes, vec![2.0, 0.5, -1.0]);
	assert_eq!(tree.evaluate(&[0]), 0.5);
	assert_eq!(tree.evaluate(&[10]), -1.0);
}

#[test]
fn test_scale_composes() {
	let weights = [(0.5, 4.0), (2.0, 0.25), (-1.0, 3.0), (0.0, 7.0)];
	for (w1, w2) in weights.iter() {
		let mut twice = Tree::branch(0, 5, Tree::leaf(1.5), Tree::leaf(-3.0)).with_vote(6.0);
		let mut once = twice.clone();
		twice.scale(*w1);
		twice.scale(*w2);
		once.scale(w1 * w2);
		assert_eq!(twice, once);
	}
}

#[test]
fn test_try_evaluate_out_of_bounds() {
	let tree = Tree::branch(3, 5, Tree::leaf(1.0), Tree::leaf(2.0));
	assert_eq!(
		tree.try_evaluate(&[1, 2]),
		Err(EvaluateError::FeatureIndexOutOfBounds {
			feature_index: 3,
			n_features: 2,
		})
	);
	assert_eq!(tree.try_evaluate(&[1, 2, 3, 4]), Ok(1.0));
}

#[test]
#[should_panic(expected = "feature index 3 is out of bounds for a feature vector of length 2")]
fn test_evaluate_out_of_bounds_panics() {
	let tree = Tree::branch(3, 5, Tree::leaf(1.0), Tree::leaf(2.0));
	tree.evaluate(&[1, 2]);
}
