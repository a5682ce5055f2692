/// Embedding vector math
///
/// Pure, stateless helpers shared by retrieval and preference adjustment:
/// normalization, weighted combination, batch averaging, L2 distance and
/// coercion of stored vector representations into numbers.
///
/// All arithmetic is done in f64. Provider and pgvector boundaries use f32;
/// see `widen` / `narrow`.

use std::collections::HashMap;

use thiserror::Error;

use crate::errors::Warning;

/// Errors raised by vector operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VectorError {
    /// Two vectors that must share a length do not.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A stored representation is neither a numeric array nor a bracketed list.
    #[error("Invalid vector format: {0}")]
    Format(String),
}

/// Result of averaging a batch of vectors.
#[derive(Debug, Clone, PartialEq)]
pub struct Averaged {
    /// Normalized mean, or None when no vector could be used.
    pub vector: Option<Vec<f64>>,
    /// One entry per skipped vector.
    pub warnings: Vec<Warning>,
}

/// Euclidean norm.
pub fn norm(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum::<f64>().sqrt()
}

/// Scale `v` to unit length. A zero vector maps to itself.
pub fn normalize(v: &[f64]) -> Vec<f64> {
    let n = norm(v);
    if n == 0.0 {
        return vec![0.0; v.len()];
    }
    v.iter().map(|x| x / n).collect()
}

/// `w_a * a + w_b * b`, normalized.
///
/// The weights need not sum to 1; normalization puts the result back on the unit sphere.
pub fn weighted_combine(a: &[f64], b: &[f64], w_a: f64, w_b: f64) -> Result<Vec<f64>, VectorError> {
    ensure_same_len(a, b)?;
    let combined: Vec<f64> = a
        .iter()
        .zip(b)
        .map(|(x, y)| w_a * x + w_b * y)
        .collect();
    Ok(normalize(&combined))
}

/// Elementwise mean of the vectors sharing the most common length, normalized.
///
/// Vectors of any other length are skipped and reported as warnings. When two
/// lengths are equally common the one seen first wins.
pub fn average_vectors(vectors: &[Vec<f64>]) -> Averaged {
    let Some(expected) = majority_len(vectors) else {
        return Averaged { vector: None, warnings: Vec::new() };
    };

    let mut sum = vec![0.0; expected];
    let mut used = 0usize;
    let mut warnings = Vec::new();

    for (index, v) in vectors.iter().enumerate() {
        if v.len() != expected {
            tracing::warn!(
                index,
                expected,
                actual = v.len(),
                "Skipping embedding with mismatched length"
            );
            warnings.push(Warning::MismatchedLength { index, expected, actual: v.len() });
            continue;
        }
        for (acc, x) in sum.iter_mut().zip(v) {
            *acc += x;
        }
        used += 1;
    }

    if used == 0 {
        return Averaged { vector: None, warnings };
    }

    let mean: Vec<f64> = sum.into_iter().map(|x| x / used as f64).collect();
    Averaged { vector: Some(normalize(&mean)), warnings }
}

/// Euclidean (L2) distance. Lengths must match.
pub fn l2_distance(a: &[f64], b: &[f64]) -> Result<f64, VectorError> {
    ensure_same_len(a, b)?;
    Ok(a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt())
}

/// Turn a stored vector into numbers.
///
/// Accepts a JSON array of numbers or a bracketed, comma-separated string such as
/// `"[0.1,0.2]"` (the text form of a pgvector column). Anything else is a format error.
pub fn coerce_to_vector(raw: &serde_json::Value) -> Result<Vec<f64>, VectorError> {
    match raw {
        serde_json::Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                item.as_f64()
                    .ok_or_else(|| VectorError::Format(format!("element {} is not a number: {}", i, item)))
            })
            .collect(),
        serde_json::Value::String(text) => parse_bracketed(text),
        other => Err(VectorError::Format(format!("expected array or string, got {}", kind_of(other)))),
    }
}

fn parse_bracketed(text: &str) -> Result<Vec<f64>, VectorError> {
    let trimmed = text.trim();
    let inner = trimmed
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .ok_or_else(|| VectorError::Format(format!("not a bracketed list: {:?}", truncate(trimmed))))?;

    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }

    inner
        .split(',')
        .map(|part| {
            let part = part.trim();
            part.parse::<f64>()
                .ok()
                .filter(|x| x.is_finite())
                .ok_or_else(|| VectorError::Format(format!("invalid component {:?}", part)))
        })
        .collect()
}

/// f32 provider output into f64 working precision.
pub fn widen(v: &[f32]) -> Vec<f64> {
    v.iter().map(|&x| x as f64).collect()
}

/// f64 back to the f32 storage precision of pgvector.
pub fn narrow(v: &[f64]) -> Vec<f32> {
    v.iter().map(|&x| x as f32).collect()
}

fn ensure_same_len(a: &[f64], b: &[f64]) -> Result<(), VectorError> {
    if a.len() != b.len() {
        return Err(VectorError::DimensionMismatch { expected: a.len(), actual: b.len() });
    }
    Ok(())
}

fn majority_len(vectors: &[Vec<f64>]) -> Option<usize> {
    let mut counts: HashMap<usize, usize> = HashMap::new();
    let mut order: Vec<usize> = Vec::new();
    for v in vectors {
        let count = counts.entry(v.len()).or_insert(0);
        if *count == 0 {
            order.push(v.len());
        }
        *count += 1;
    }
    // max_by_key keeps the last maximum, so scan in reverse to prefer the first-seen length
    order.into_iter().rev().max_by_key(|len| counts[len])
}

fn kind_of(v: &serde_json::Value) -> &'static str {
    match v {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

fn truncate(s: &str) -> String {
    s.chars().take(32).collect()
}
