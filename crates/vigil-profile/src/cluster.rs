//! K-means clustering of embeddings and the vector math shared by the
//! classifier.

use std::collections::HashSet;

use linfa::prelude::*;
use linfa_clustering::{KMeans, KMeansInit};
use ndarray::{Array1, Array2};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::debug;

use crate::{EngineConfig, EngineError};
use vigil_store::Embedding;

/// One group produced by [`Clusterer::cluster`].
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    pub member_ids: Vec<String>,
    pub centroid: Embedding,
    /// Share of the input in `[0, 1]`; by weight when weights were supplied.
    pub proportion: f64,
}

/// Number of clusters for `n` items: `clamp(round(sqrt(n)), min, max)`.
pub fn choose_k(n: usize, min: usize, max: usize) -> usize {
    ((n as f64).sqrt().round() as usize).clamp(min, max)
}

/// Cosine similarity of two vectors. Zero-length or zero-norm input gives 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Fold `embedding` into a centroid that currently summarizes `count` tweets.
pub fn blend_centroid(centroid: &mut [f32], embedding: &[f32], count: u64) {
    let w = 1.0 / (count as f64 + 1.0);
    for (c, e) in centroid.iter_mut().zip(embedding) {
        *c = ((1.0 - w) * *c as f64 + w * *e as f64) as f32;
    }
}

/// Weighted mean of `vectors`. Falls back to the plain mean when the weights
/// sum to zero.
fn weighted_mean(vectors: &[&Embedding], weights: &[f64], dims: usize) -> Embedding {
    let total: f64 = weights.iter().sum();
    let uniform = total <= 0.0;
    let mut sum = vec![0.0f64; dims];
    for (v, w) in vectors.iter().zip(weights) {
        let w = if uniform { 1.0 } else { *w };
        for (s, x) in sum.iter_mut().zip(v.iter()) {
            *s += w * *x as f64;
        }
    }
    let denom = if uniform { vectors.len() as f64 } else { total };
    sum.into_iter().map(|s| (s / denom) as f32).collect()
}

/// Groups embeddings with k-means++ seeded from the configuration.
#[derive(Debug, Clone)]
pub struct Clusterer {
    min_k: usize,
    max_k: usize,
    seed: u64,
    max_iterations: u64,
    tolerance: f64,
}

impl Clusterer {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            min_k: config.min_clusters,
            max_k: config.max_clusters,
            seed: config.kmeans_seed,
            max_iterations: config.kmeans_max_iterations,
            tolerance: config.kmeans_tolerance,
        }
    }

    /// Cluster `(id, embedding)` items.
    ///
    /// With `weights`, centroids are the weighted mean of each cluster's
    /// members and proportions are weight shares; otherwise the k-means
    /// centroid and member counts are used. The result is sorted by
    /// proportion, largest first.
    pub fn cluster(
        &self,
        items: &[(String, Embedding)],
        weights: Option<&[f64]>,
    ) -> Result<Vec<Cluster>, EngineError> {
        if let Some(w) = weights {
            if w.len() != items.len() {
                return Err(EngineError::Clustering(format!(
                    "{} weights for {} items",
                    w.len(),
                    items.len()
                )));
            }
        }

        let dims = items.first().map(|(_, e)| e.len()).unwrap_or(0);
        for (_, embedding) in items {
            if embedding.len() != dims {
                return Err(EngineError::DimensionMismatch {
                    expected: dims,
                    actual: embedding.len(),
                });
            }
        }

        let n = items.len();
        let distinct = items
            .iter()
            .map(|(_, e)| e.iter().map(|x| x.to_bits()).collect::<Vec<_>>())
            .collect::<HashSet<_>>()
            .len();

        if n < 2 || dims == 0 || distinct < 2 {
            // Fewer than two distinct points cannot be split.
            return Ok(vec![Cluster {
                member_ids: items.iter().map(|(id, _)| id.clone()).collect(),
                centroid: items.first().map(|(_, e)| e.clone()).unwrap_or_default(),
                proportion: if n == 0 { 0.0 } else { 1.0 },
            }]);
        }

        let k = choose_k(n, self.min_k, self.max_k).min(distinct);
        let (labels, centroids) = self.fit(items, dims, k)?;

        let mut groups: Vec<Vec<usize>> = vec![Vec::new(); k];
        for (index, label) in labels.iter().enumerate() {
            groups[*label].push(index);
        }

        let total_weight: f64 = weights.map(|w| w.iter().sum()).unwrap_or(n as f64);
        let by_weight = weights.is_some() && total_weight > 0.0;

        let mut clusters = Vec::with_capacity(k);
        for (label, members) in groups.into_iter().enumerate() {
            if members.is_empty() {
                debug!(label, "dropping empty cluster");
                continue;
            }

            let vectors: Vec<&Embedding> = members.iter().map(|i| &items[*i].1).collect();
            let (centroid, proportion) = match weights {
                Some(w) if by_weight => {
                    let member_weights: Vec<f64> = members.iter().map(|i| w[*i]).collect();
                    let share = member_weights.iter().sum::<f64>() / total_weight;
                    (weighted_mean(&vectors, &member_weights, dims), share)
                }
                _ => (centroids[label].clone(), members.len() as f64 / n as f64),
            };

            clusters.push(Cluster {
                member_ids: members.iter().map(|i| items[*i].0.clone()).collect(),
                centroid,
                proportion,
            });
        }

        clusters.sort_by(|a, b| {
            b.proportion
                .partial_cmp(&a.proportion)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        debug!(items = n, k, clusters = clusters.len(), "clustered embeddings");
        Ok(clusters)
    }

    /// Run k-means, returning each item's label and the fitted centroids.
    fn fit(
        &self,
        items: &[(String, Embedding)],
        dims: usize,
        k: usize,
    ) -> Result<(Vec<usize>, Vec<Embedding>), EngineError> {
        let n = items.len();
        let mut matrix_data = Vec::with_capacity(n * dims);
        for (_, embedding) in items {
            matrix_data.extend(embedding.iter().map(|x| *x as f64));
        }

        let matrix = Array2::from_shape_vec((n, dims), matrix_data)
            .map_err(|e| EngineError::Clustering(format!("failed to build matrix: {}", e)))?;
        let dataset = DatasetBase::new(matrix, Array1::from_elem(n, ()));

        let rng = StdRng::seed_from_u64(self.seed);
        let model = KMeans::params_with_rng(k, rng)
            .init_method(KMeansInit::KMeansPlusPlus)
            .max_n_iterations(self.max_iterations)
            .tolerance(self.tolerance)
            .fit(&dataset)
            .map_err(|e| EngineError::Clustering(format!("k-means failed: {}", e)))?;

        let predictions = model.predict(&dataset);
        let labels = predictions.iter().cloned().collect();
        let centroids = model
            .centroids()
            .rows()
            .into_iter()
            .map(|row| row.iter().map(|x| *x as f32).collect())
            .collect();
        Ok((labels, centroids))
    }
}
