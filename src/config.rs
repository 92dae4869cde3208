/*!
 * Set Configuration
 *
 * Variant selection and sizing, loadable from JSON
 */

use crate::errors::{SetError, SetResult};
use crate::set::{CoarseGrainedSet, RefinableSet, SequentialSet, Set, StripedSet};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;
use std::str::FromStr;

/// Set implementation selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetKind {
    /// Unsynchronized reference implementation
    Sequential,
    /// One mutex around the whole table
    CoarseGrained,
    /// Fixed array of stripe locks
    Striped,
    /// Per-bucket locks behind a resize reader/writer lock
    Refinable,
}

impl SetKind {
    pub const ALL: [SetKind; 4] = [
        SetKind::Sequential,
        SetKind::CoarseGrained,
        SetKind::Striped,
        SetKind::Refinable,
    ];

    /// Whether instances may be shared across threads
    pub const fn is_concurrent(self) -> bool {
        !matches!(self, SetKind::Sequential)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            SetKind::Sequential => "sequential",
            SetKind::CoarseGrained => "coarse_grained",
            SetKind::Striped => "striped",
            SetKind::Refinable => "refinable",
        }
    }
}

impl fmt::Display for SetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SetKind {
    type Err = SetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "sequential" => Ok(SetKind::Sequential),
            "coarse_grained" | "coarse" => Ok(SetKind::CoarseGrained),
            "striped" => Ok(SetKind::Striped),
            "refinable" => Ok(SetKind::Refinable),
            other => Err(SetError::invalid(format!("unknown set kind '{}'", other))),
        }
    }
}

/// Set construction parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SetConfig {
    /// Which implementation to build
    pub kind: SetKind,
    /// Initial bucket count (must be positive)
    pub initial_capacity: usize,
    /// Stripe count for `Striped`; defaults to `initial_capacity`
    pub stripes: Option<usize>,
}

impl Default for SetConfig {
    fn default() -> Self {
        Self {
            kind: SetKind::Refinable,
            initial_capacity: 16,
            stripes: None,
        }
    }
}

impl SetConfig {
    pub const fn new(kind: SetKind, initial_capacity: usize) -> Self {
        Self {
            kind,
            initial_capacity,
            stripes: None,
        }
    }

    pub fn with_stripes(mut self, stripes: usize) -> Self {
        self.stripes = Some(stripes);
        self
    }

    /// Effective stripe count
    pub fn stripe_count(&self) -> usize {
        self.stripes.unwrap_or(self.initial_capacity)
    }

    /// Parse a JSON document; missing fields take their defaults
    pub fn from_json(json: &str) -> SetResult<Self> {
        let config: SetConfig = serde_json::from_str(json)
            .map_err(|e| SetError::invalid(format!("malformed set config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> SetResult<()> {
        if self.initial_capacity == 0 {
            return Err(SetError::invalid("initial capacity must be at least 1"));
        }
        if self.kind == SetKind::Striped {
            let stripes = self.stripe_count();
            if stripes == 0 {
                return Err(SetError::invalid("stripe count must be at least 1"));
            }
            if self.initial_capacity % stripes != 0 {
                return Err(SetError::invalid(format!(
                    "stripe count {} must divide initial capacity {}",
                    stripes, self.initial_capacity
                )));
            }
        }
        Ok(())
    }

    /// Build a thread-safe set
    ///
    /// Fails for `Sequential`, which cannot be shared; use [`build_local`](Self::build_local).
    pub fn build<T>(&self) -> SetResult<Box<dyn Set<T> + Send + Sync>>
    where
        T: Hash + Eq + Send + 'static,
    {
        self.validate()?;
        let set: Box<dyn Set<T> + Send + Sync> = match self.kind {
            SetKind::Sequential => {
                return Err(SetError::invalid(
                    "sequential set is single-threaded; use build_local",
                ))
            }
            SetKind::CoarseGrained => Box::new(CoarseGrainedSet::new(self.initial_capacity)?),
            SetKind::Striped => Box::new(StripedSet::with_stripes(
                self.initial_capacity,
                self.stripe_count(),
                ahash::RandomState::new(),
            )?),
            SetKind::Refinable => Box::new(RefinableSet::new(self.initial_capacity)?),
        };
        Ok(set)
    }

    /// Build any variant for use on the current thread
    pub fn build_local<T>(&self) -> SetResult<Box<dyn Set<T>>>
    where
        T: Hash + Eq + Send + 'static,
    {
        match self.kind {
            SetKind::Sequential => {
                self.validate()?;
                Ok(Box::new(SequentialSet::new(self.initial_capacity)?))
            }
            _ => {
                let set: Box<dyn Set<T>> = self.build()?;
                Ok(set)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SetConfig::default();
        assert_eq!(config.kind, SetKind::Refinable);
        assert_eq!(config.stripe_count(), 16);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_kind_parse_roundtrip() {
        for kind in SetKind::ALL {
            assert_eq!(kind.to_string().parse::<SetKind>().unwrap(), kind);
        }
        assert_eq!("Coarse-Grained".parse::<SetKind>().unwrap(), SetKind::CoarseGrained);
        assert!("lockfree".parse::<SetKind>().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_sizes() {
        assert!(SetConfig::new(SetKind::CoarseGrained, 0).validate().is_err());
        assert!(SetConfig::new(SetKind::Striped, 8).with_stripes(0).validate().is_err());
        assert!(SetConfig::new(SetKind::Striped, 8).with_stripes(3).validate().is_err());
        assert!(SetConfig::new(SetKind::Striped, 8).with_stripes(4).validate().is_ok());
        // Stripe count is irrelevant for other kinds
        assert!(SetConfig::new(SetKind::Refinable, 8).with_stripes(3).validate().is_ok());
    }

    #[test]
    fn test_from_json() {
        let config = SetConfig::from_json(r#"{"kind":"striped","initial_capacity":32,"stripes":8}"#)
            .unwrap();
        assert_eq!(config, SetConfig::new(SetKind::Striped, 32).with_stripes(8));

        let partial = SetConfig::from_json(r#"{"kind":"coarse_grained"}"#).unwrap();
        assert_eq!(partial.initial_capacity, 16);

        assert!(SetConfig::from_json(r#"{"initial_capacity":0}"#).is_err());
        assert!(SetConfig::from_json("not json").is_err());
    }

    #[test]
    fn test_build_selects_variant() {
        for kind in SetKind::ALL {
            let config = SetConfig::new(kind, 4);
            let local = config.build_local::<u32>().unwrap();
            assert_eq!(local.kind(), kind);

            match config.build::<u32>() {
                Ok(set) => assert_eq!(set.kind(), kind),
                Err(_) => assert!(!kind.is_concurrent()),
            }
        }
    }
}
