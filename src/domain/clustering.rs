//! Monthly k-means clustering of the feature cross-section.
//!
//! Each month is clustered on its own: mean imputation per column, z-score
//! standardization, then k-means with k-means++ seeding. Restarts share one
//! seeded RNG so a run is reproducible.

use crate::domain::features::FeatureRow;
use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub struct ClusterConfig {
    pub n_clusters: usize,
    pub seed: u64,
    pub n_init: usize,
    pub max_iter: usize,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            n_clusters: 4,
            seed: 42,
            n_init: 10,
            max_iter: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct KMeansFit {
    pub labels: Vec<usize>,
    pub centroids: Vec<Vec<f64>>,
    pub inertia: f64,
}

/// Replace missing entries with the column mean. Columns with no values at
/// all are dropped from the returned matrix.
pub fn impute_mean(rows: &[Vec<Option<f64>>]) -> Vec<Vec<f64>> {
    let n_cols = rows.first().map_or(0, Vec::len);
    let means: Vec<Option<f64>> = (0..n_cols)
        .map(|c| {
            let present: Vec<f64> = rows.iter().filter_map(|r| r[c]).collect();
            (!present.is_empty()).then(|| present.iter().sum::<f64>() / present.len() as f64)
        })
        .collect();

    rows.iter()
        .map(|r| {
            r.iter()
                .zip(&means)
                .filter_map(|(v, mean)| mean.map(|m| v.unwrap_or(m)))
                .collect()
        })
        .collect()
}

/// Z-score each column with the population std; zero-variance columns are
/// only centered.
pub fn standardize(matrix: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let n = matrix.len();
    if n == 0 {
        return Vec::new();
    }
    let n_cols = matrix[0].len();
    let stats: Vec<(f64, f64)> = (0..n_cols)
        .map(|c| {
            let mean = matrix.iter().map(|r| r[c]).sum::<f64>() / n as f64;
            let var = matrix.iter().map(|r| (r[c] - mean).powi(2)).sum::<f64>() / n as f64;
            let std = var.sqrt();
            (mean, if std > 0.0 { std } else { 1.0 })
        })
        .collect();

    matrix
        .iter()
        .map(|r| r.iter().zip(&stats).map(|(v, (m, s))| (v - m) / s).collect())
        .collect()
}

fn sq_dist(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

fn nearest(point: &[f64], centroids: &[Vec<f64>]) -> (usize, f64) {
    centroids
        .iter()
        .enumerate()
        .map(|(i, c)| (i, sq_dist(point, c)))
        .fold((0, f64::INFINITY), |best, cur| if cur.1 < best.1 { cur } else { best })
}

fn kmeans_plus_plus(points: &[Vec<f64>], k: usize, rng: &mut StdRng) -> Vec<Vec<f64>> {
    let mut centroids = vec![points[rng.gen_range(0..points.len())].clone()];
    while centroids.len() < k {
        let weights: Vec<f64> = points.iter().map(|p| nearest(p, &centroids).1).collect();
        let total: f64 = weights.iter().sum();
        let next = if total <= 0.0 {
            rng.gen_range(0..points.len())
        } else {
            let mut target = rng.gen_range(0.0..total);
            weights
                .iter()
                .position(|w| {
                    target -= w;
                    target < 0.0
                })
                .unwrap_or(points.len() - 1)
        };
        centroids.push(points[next].clone());
    }
    centroids
}

fn lloyd(points: &[Vec<f64>], mut centroids: Vec<Vec<f64>>, max_iter: usize) -> KMeansFit {
    let dims = points[0].len();
    let mut labels = vec![0usize; points.len()];

    for iter in 0..max_iter.max(1) {
        let mut changed = false;
        for (i, p) in points.iter().enumerate() {
            let (label, _) = nearest(p, &centroids);
            if label != labels[i] {
                changed = true;
                labels[i] = label;
            }
        }

        let mut sums = vec![vec![0.0; dims]; centroids.len()];
        let mut counts = vec![0usize; centroids.len()];
        for (p, &l) in points.iter().zip(&labels) {
            counts[l] += 1;
            for (s, v) in sums[l].iter_mut().zip(p) {
                *s += v;
            }
        }
        for (c, (sum, count)) in centroids.iter_mut().zip(sums.into_iter().zip(counts)) {
            // an emptied cluster keeps its previous centroid
            if count > 0 {
                *c = sum.into_iter().map(|s| s / count as f64).collect();
            }
        }

        if iter > 0 && !changed {
            break;
        }
    }

    let inertia = points
        .iter()
        .zip(&labels)
        .map(|(p, &l)| sq_dist(p, &centroids[l]))
        .sum();
    KMeansFit {
        labels,
        centroids,
        inertia,
    }
}

/// Best-of-`n_init` k-means fit. `k` is capped at the number of points.
pub fn kmeans(points: &[Vec<f64>], k: usize, config: &ClusterConfig, rng: &mut StdRng) -> KMeansFit {
    if points.is_empty() || k == 0 {
        return KMeansFit {
            labels: vec![0; points.len()],
            centroids: Vec::new(),
            inertia: 0.0,
        };
    }
    let k = k.min(points.len());

    (0..config.n_init.max(1))
        .map(|_| lloyd(points, kmeans_plus_plus(points, k, rng), config.max_iter))
        .fold(None::<KMeansFit>, |best, fit| match best {
            Some(b) if b.inertia <= fit.inertia => Some(b),
            _ => Some(fit),
        })
        .unwrap_or_else(|| KMeansFit {
            labels: vec![0; points.len()],
            centroids: Vec::new(),
            inertia: 0.0,
        })
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonthSummary {
    pub date: NaiveDate,
    pub tickers: usize,
    pub clusters: usize,
}

/// Assign a cluster label to every row, one independent fit per month.
/// Returns the labelled rows (sorted by date, input order within a month) and
/// one summary per month.
pub fn cluster_by_month(rows: Vec<FeatureRow>, config: &ClusterConfig) -> (Vec<FeatureRow>, Vec<MonthSummary>) {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut by_month: BTreeMap<NaiveDate, Vec<FeatureRow>> = BTreeMap::new();
    for row in rows {
        by_month.entry(row.date).or_default().push(row);
    }

    let mut labelled = Vec::new();
    let mut summaries = Vec::new();
    for (date, mut group) in by_month {
        let raw: Vec<Vec<Option<f64>>> = group.iter().map(|r| r.feature_vector().to_vec()).collect();
        let points = standardize(&impute_mean(&raw));

        let fit = if points.first().is_some_and(|p| !p.is_empty()) {
            kmeans(&points, config.n_clusters, config, &mut rng)
        } else {
            KMeansFit {
                labels: vec![0; group.len()],
                centroids: Vec::new(),
                inertia: 0.0,
            }
        };

        for (row, label) in group.iter_mut().zip(&fit.labels) {
            row.cluster = Some(*label);
        }
        summaries.push(MonthSummary {
            date,
            tickers: group.len(),
            clusters: fit.centroids.len().max(1),
        });
        labelled.extend(group);
    }
    (labelled, summaries)
}
