//! Keyword-balanced training sample selection.
//!
//! Search keywords return very different numbers of videos. To keep the
//! labeled sample from being dominated by a few popular keywords, each
//! candidate is weighted by `Σ 1 / count(keyword)` over the keywords that
//! found it, where `count` is the number of candidates sharing that keyword.
//! Candidates are then drawn without replacement with a fixed seed.

use std::collections::{BTreeMap, HashMap};

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::index::sample_weighted;

use crate::error::AppError;
use crate::models::SampleCandidate;

/// Sample size and seed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleConfig {
    pub size: usize,
    pub seed: u64,
}

impl Default for SampleConfig {
    fn default() -> Self {
        Self {
            size: 3000,
            seed: 42,
        }
    }
}

/// Number of candidates per keyword.
pub fn keyword_counts(candidates: &[SampleCandidate]) -> HashMap<&str, usize> {
    let mut counts = HashMap::new();
    for candidate in candidates {
        for keyword in &candidate.keywords {
            *counts.entry(keyword.as_str()).or_insert(0) += 1;
        }
    }
    counts
}

/// Sampling weight for every candidate, in input order.
pub fn sampling_weights(candidates: &[SampleCandidate]) -> Vec<f64> {
    let counts = keyword_counts(candidates);
    candidates
        .iter()
        .map(|c| {
            c.keywords
                .iter()
                .filter_map(|k| counts.get(k.as_str()))
                .map(|&n| 1.0 / n as f64)
                .sum()
        })
        .collect()
}

/// Draws up to `config.size` candidates, weighted by keyword rarity.
///
/// Candidates without keywords have zero weight and are never drawn. The
/// order of the returned ids is unspecified.
pub fn weighted_sample(
    candidates: &[SampleCandidate],
    config: &SampleConfig,
) -> Result<Vec<String>, AppError> {
    let weights = sampling_weights(candidates);
    let eligible: Vec<usize> = (0..candidates.len())
        .filter(|&i| weights[i] > 0.0)
        .collect();

    let amount = config.size.min(eligible.len());
    if amount == 0 {
        return Ok(Vec::new());
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let drawn = sample_weighted(&mut rng, eligible.len(), |i| weights[eligible[i]], amount)
        .map_err(|e| AppError::Generic(format!("weighted sampling failed: {}", e)))?;

    Ok(drawn
        .into_iter()
        .map(|i| candidates[eligible[i]].video_id.clone())
        .collect())
}

/// Keyword distribution of a sample, for logging.
pub fn keyword_distribution<'a>(
    candidates: &'a [SampleCandidate],
    sample: &[String],
) -> BTreeMap<&'a str, usize> {
    let by_id: HashMap<&str, &SampleCandidate> = candidates
        .iter()
        .map(|c| (c.video_id.as_str(), c))
        .collect();

    let mut distribution = BTreeMap::new();
    for id in sample {
        if let Some(candidate) = by_id.get(id.as_str()) {
            for keyword in &candidate.keywords {
                *distribution.entry(keyword.as_str()).or_insert(0) += 1;
            }
        }
    }
    distribution
}
