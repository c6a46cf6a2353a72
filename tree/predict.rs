use crate::tree::{FeatureValue, Tree};
use rayon::prelude::*;

/// Make a prediction with an ensemble by summing the contribution of each tree.
pub fn predict<T>(trees: &[Tree<T>], features: &[T]) -> f64
where
	T: FeatureValue,
{
	trees
		.iter()
		.fold(0.0, |total, tree| total + tree.evaluate(features))
}

/// Lazily yield the running total of the ensemble's prediction after each tree is added.
pub fn cumulative_predictions<'a, T>(
	trees: &'a [Tree<T>],
	features: &'a [T],
) -> impl Iterator<Item = f64> + 'a
where
	T: FeatureValue,
{
	trees.iter().scan(0.0, move |total, tree| {
		*total += tree.evaluate(features);
		Some(*total)
	})
}

/// Make a prediction with an ensemble and also return the running total after each tree. The last running total is the prediction.
pub fn predict_with_trace<T>(trees: &[Tree<T>], features: &[T]) -> (f64, Vec<f64>)
where
	T: FeatureValue,
{
	let trace: Vec<f64> = cumulative_predictions(trees, features).collect();
	let prediction = trace.last().copied().unwrap_or(0.0);
	(prediction, trace)
}

/// Make a prediction for each example in parallel. Trees are only read, so every thread shares them.
pub fn predict_many<T, E>(trees: &[Tree<T>], examples: &[E]) -> Vec<f64>
where
	T: FeatureValue + Sync,
	E: AsRef<[T]> + Sync,
{
	examples
		.par_iter()
		.map(|example| predict(trees, example.as_ref()))
		.collect()
}

/// Re-weight every tree in an ensemble.
pub fn scale_trees<T>(trees: &mut [Tree<T>], weight: f64)
where
	T: FeatureValue,
{
	for tree in trees.iter_mut() {
		tree.scale(weight);
	}
}

#[cfg(test)]
fn test_trees() -> Vec<Tree<f32>> {
	vec![
		Tree::leaf(0.5),
		Tree::branch(0, 1.0, Tree::leaf(1.0), Tree::leaf(-1.0)),
		Tree::branch(
			1,
			10.0,
			Tree::leaf(0.25),
			Tree::branch(0, 3.0, Tree::leaf(2.0), Tree::leaf(4.0)),
		),
	]
}

#[test]
fn test_predict() {
	let trees = test_trees();
	assert_eq!(predict(&trees, &[0.0, 0.0]), 1.75);
	assert_eq!(predict(&trees, &[2.0, 11.0]), 1.5);
	assert_eq!(predict(&trees, &[5.0, 11.0]), 3.5);
}

#[test]
fn test_predict_is_sum_of_trees() {
	let trees = test_trees();
	let examples: [[f32; 2]; 5] = [[0.0, 0.0], [1.0, 10.0], [2.0, 11.0], [3.0, 20.0], [5.0, -1.0]];
	for example in examples.iter() {
		let sum: f64 = trees.iter().map(|tree| tree.evaluate(example)).sum();
		assert_eq!(predict(&trees, example), sum);
	}
}

#[test]
fn test_predict_with_trace() {
	let trees = test_trees();
	let (prediction, trace) = predict_with_trace(&trees, &[2.0, 11.0]);
	insta::assert_debug_snapshot!(trace, @r###"
 [
     0.5,
     -0.5,
     1.5,
 ]
 "###);
	assert_eq!(prediction, 1.5);
	assert_eq!(trace.last().copied(), Some(predict(&trees, &[2.0, 11.0])));
}

#[test]
fn test_predict_many() {
	let trees = test_trees();
	let examples: Vec<Vec<f32>> = vec![vec![0.0, 0.0], vec![2.0, 11.0], vec![5.0, 11.0]];
	assert_eq!(predict_many(&trees, &examples), vec![1.75, 1.5, 3.5]);
}

#[test]
fn test_empty_ensemble() {
	let trees: Vec<Tree<f32>> = Vec::new();
	assert_eq!(predict(&trees, &[1.0]), 0.0);
	assert_eq!(predict_with_trace(&trees, &[1.0]), (0.0, Vec::new()));
}

#[test]
fn test_cumulative_predictions_is_lazy() {
	let trees = vec![
		Tree::leaf(1.0),
		Tree::branch(5, 0, Tree::leaf(2.0), Tree::leaf(3.0)),
	];
	// Only the first tree is evaluated, so the out of range feature index in the second is never read.
	let first = cumulative_predictions(&trees, &[0]).next();
	assert_eq!(first, Some(1.0));
}

#[test]
fn test_scale_trees() {
	let mut trees = test_trees();
	let before = predict(&trees, &[5.0, 11.0]);
	scale_trees(&mut trees, 0.5);
	assert_eq!(predict(&trees, &[5.0, 11.0]), before * 0.5);
}
