//! Per-feature bounds used to scale raw feature vectors into `[lb, ub]`.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read limits from '{0}'")]
    Read(PathBuf, #[source] std::io::Error),
    #[error("failed to parse limits")]
    Parse(#[from] serde_json::Error),
    #[error("invalid feature index '{0}' in limits")]
    BadIndex(String),
    #[error("limits cover {limits} features but the vector has {features}")]
    DimensionMismatch { limits: usize, features: usize },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Bounds per feature index. An absent index or a `None` entry marks a
/// feature that is constant or unknown across the knowledge base; such
/// features are dropped from the normalized vector.
#[derive(Debug, Clone, PartialEq)]
pub struct Limits(BTreeMap<usize, Option<(f64, f64)>>);

#[derive(Deserialize)]
#[serde(untagged)]
enum LimitsFile {
    Indexed(BTreeMap<String, Option<(f64, f64)>>),
    Ordered(Vec<Option<(f64, f64)>>),
}

#[derive(Debug, Clone, Copy)]
pub struct NormalizeOptions {
    pub lb: f64,
    pub ub: f64,
    /// Raw value substituted for NaN components before scaling.
    pub default: f64,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            lb: -1.0,
            ub: 1.0,
            default: -1.0,
        }
    }
}

impl Limits {
    pub fn new(bounds: Vec<Option<(f64, f64)>>) -> Self {
        Self(bounds.into_iter().enumerate().collect())
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::Read(path.to_path_buf(), e))?;
        Self::parse(&content)
    }

    /// Accepts either `{"<index>": [min, max] | null}` or a positional array.
    pub fn parse(content: &str) -> Result<Self> {
        let bounds = match serde_json::from_str(content)? {
            LimitsFile::Ordered(bounds) => bounds.into_iter().enumerate().collect(),
            LimitsFile::Indexed(bounds) => bounds
                .into_iter()
                .map(|(index, bound)| {
                    index
                        .trim()
                        .parse::<usize>()
                        .map(|index| (index, bound))
                        .map_err(|_| Error::BadIndex(index))
                })
                .collect::<Result<_>>()?,
        };
        Ok(Self(bounds))
    }

    /// Number of features the limits were computed over.
    pub fn len(&self) -> usize {
        self.0.last_key_value().map_or(0, |(index, _)| index + 1)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Scales `raw` component-wise into `[options.lb, options.ub]`.
    ///
    /// Components whose bounds are absent or degenerate (`min == max`) are
    /// dropped. Values outside the recorded bounds are clamped.
    pub fn normalize(&self, raw: &[f64], options: NormalizeOptions) -> Result<Vec<f64>> {
        if self.len() > raw.len() {
            return Err(Error::DimensionMismatch {
                limits: self.len(),
                features: raw.len(),
            });
        }

        let NormalizeOptions { lb, ub, default } = options;
        let normalized = raw
            .iter()
            .enumerate()
            .filter_map(|(index, &value)| {
                let (min, max) = self.0.get(&index).copied().flatten()?;
                if min == max {
                    return None;
                }
                let value = if value.is_nan() { default } else { value };
                let scaled = lb + (ub - lb) * (value - min) / (max - min);
                Some(scaled.clamp(lb, ub))
            })
            .collect();
        Ok(normalized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scales_into_bounds() {
        let limits = Limits::new(vec![Some((0.0, 10.0)), Some((-5.0, 5.0))]);
        let out = limits
            .normalize(&[5.0, 5.0], NormalizeOptions::default())
            .unwrap();
        assert_eq!(out, vec![0.0, 1.0]);
    }

    #[test]
    fn test_clamps_values_outside_limits() {
        let limits = Limits::new(vec![Some((0.0, 10.0)), Some((0.0, 10.0))]);
        let out = limits
            .normalize(&[-20.0, 42.0], NormalizeOptions::default())
            .unwrap();
        assert_eq!(out, vec![-1.0, 1.0]);
    }

    #[test]
    fn test_drops_constant_and_unknown_features() {
        let limits = Limits::new(vec![None, Some((3.0, 3.0)), Some((0.0, 2.0))]);
        let out = limits
            .normalize(&[1.0, 3.0, 2.0], NormalizeOptions::default())
            .unwrap();
        assert_eq!(out, vec![1.0]);
    }

    #[test]
    fn test_nan_is_scaled_as_default() {
        let limits = Limits::new(vec![Some((0.0, 1.0)), Some((-3.0, 1.0)), Some((0.0, 4.0))]);
        let options = NormalizeOptions {
            default: 0.25,
            ..Default::default()
        };
        let out = limits.normalize(&[f64::NAN; 3], options).unwrap();
        // -1 + 2 * (0.25 - 0) / 1, -1 + 2 * (0.25 + 3) / 4, -1 + 2 * 0.25 / 4
        assert_eq!(out, vec![-0.5, 0.625, -0.875]);

        // The default -1 lies below [0, 4] and is clamped to lb.
        let out = limits
            .normalize(&[0.5, f64::NAN, f64::NAN], NormalizeOptions::default())
            .unwrap();
        assert_eq!(out, vec![0.0, 0.0, -1.0]);
    }

    #[test]
    fn test_normalize_is_idempotent_on_unit_limits() {
        let limits = Limits::new(vec![Some((-1.0, 1.0)); 4]);
        let options = NormalizeOptions::default();
        let once = limits.normalize(&[0.5, -7.0, -0.25, 2.0], options).unwrap();
        let twice = limits.normalize(&once, options).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_parse_json_with_nulls() {
        let limits = Limits::parse("[[0.0, 1.0], null, [2, 4]]").unwrap();
        assert_eq!(
            limits,
            Limits::new(vec![Some((0.0, 1.0)), None, Some((2.0, 4.0))])
        );
    }

    #[test]
    fn test_parse_indexed_object() {
        let limits = Limits::parse(r#"{"0": [0.0, 4.0], "2": [1.0, 3.0], "1": null}"#).unwrap();
        assert_eq!(limits.len(), 3);
        let out = limits
            .normalize(&[2.0, 100.0, 3.0, 9.0], NormalizeOptions::default())
            .unwrap();
        assert_eq!(out, vec![0.0, 1.0]);
        assert!(matches!(
            Limits::parse(r#"{"x": [0, 1]}"#),
            Err(Error::BadIndex(_))
        ));
    }

    #[test]
    fn test_dimension_mismatch() {
        let limits = Limits::new(vec![Some((0.0, 1.0))]);
        assert!(matches!(
            limits.normalize(&[], NormalizeOptions::default()),
            Err(Error::DimensionMismatch { .. })
        ));
    }
}
