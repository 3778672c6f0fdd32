//! Core value types of the retrieval and answer pipeline.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use shared_types::{AnswerOutcome, AnswerResponse};

/// Distance function a collection was built with.
///
/// Distances are dissimilarities: lower is more relevant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// Squared Euclidean distance
    #[default]
    L2,
    /// `1 - cosine_similarity`, clamped to `[0, 2]`
    Cosine,
    /// `1 - dot_product`; negative when the dot product exceeds 1, which
    /// keeps the order among strongly aligned vectors.
    Ip,
}

impl DistanceMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::L2 => "l2",
            Self::Cosine => "cosine",
            Self::Ip => "ip",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "l2" | "euclidean" => Some(Self::L2),
            "cosine" => Some(Self::Cosine),
            "ip" | "inner_product" => Some(Self::Ip),
            _ => None,
        }
    }

    /// Distance between two vectors of equal length.
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Self::L2 => a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum(),
            Self::Cosine => {
                let (mut dot, mut na, mut nb) = (0f32, 0f32, 0f32);
                for (x, y) in a.iter().zip(b) {
                    dot += x * y;
                    na += x * x;
                    nb += y * y;
                }
                if na == 0.0 || nb == 0.0 {
                    return 1.0;
                }
                (1.0 - dot / (na.sqrt() * nb.sqrt())).clamp(0.0, 2.0)
            }
            Self::Ip => 1.0 - a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>(),
        }
    }
}

impl std::fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Loosely-shaped passage metadata: string keys, nullable string values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(BTreeMap<String, Option<String>>);

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), Some(value.into()));
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Option<String>) {
        self.0.insert(key.into(), value);
    }

    /// Value for `key`, or `None` when the key is absent or null.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.as_deref())
    }

    /// Value for `key`, falling back to `default` when absent or null.
    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Metadata {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), Some(v.into())))
                .collect(),
        )
    }
}

/// One nearest-neighbor hit from a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub id: String,
    /// Name of the collection the hit came from
    pub collection: String,
    pub distance: f32,
    pub document: String,
    pub metadata: Metadata,
}

/// Matches from all ready collections, ascending by distance, truncated to top-k.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RankedResult {
    matches: Vec<Match>,
}

impl RankedResult {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Stable-sort a pool by ascending distance and keep the first `k`.
    ///
    /// Ties keep pool order, so the first-inserted match wins.
    pub fn rank(mut pool: Vec<Match>, k: usize) -> Self {
        pool.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        pool.truncate(k);
        Self { matches: pool }
    }

    pub fn matches(&self) -> &[Match] {
        &self.matches
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Match> {
        self.matches.iter()
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn distances(&self) -> Vec<f32> {
        self.matches.iter().map(|m| m.distance).collect()
    }

    pub fn documents(&self) -> impl Iterator<Item = &str> {
        self.matches.iter().map(|m| m.document.as_str())
    }

    pub fn into_matches(self) -> Vec<Match> {
        self.matches
    }
}

impl<'a> IntoIterator for &'a RankedResult {
    type Item = &'a Match;
    type IntoIter = std::slice::Iter<'a, Match>;

    fn into_iter(self) -> Self::IntoIter {
        self.matches.iter()
    }
}

/// Final answer handed back to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub text: String,
    pub source_count: usize,
    pub outcome: AnswerOutcome,
}

impl Answer {
    pub fn new(text: impl Into<String>, source_count: usize, outcome: AnswerOutcome) -> Self {
        Self {
            text: text.into(),
            source_count,
            outcome,
        }
    }
}

impl From<Answer> for AnswerResponse {
    fn from(answer: Answer) -> Self {
        AnswerResponse {
            answer: answer.text,
            source_count: answer.source_count,
            outcome: answer.outcome,
        }
    }
}
