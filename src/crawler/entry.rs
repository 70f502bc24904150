//! Entry-mode routing
//!
//! Each task arrives at the listing site through one entry mode: a search-engine
//! referral or direct navigation. Modes are drawn from a weighted distribution to
//! diversify traffic fingerprints.

use crate::config::DEFAULT_ENTRY_FLOW_RATIOS;
use crate::crawler::RandomSource;
use crate::record::Task;
use crate::ConfigError;
use std::fmt;
use std::sync::Arc;

/// Search engines usable as referral sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchEngine {
    Google,
    Bing,
}

impl SearchEngine {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Bing => "bing",
        }
    }

    pub fn origin(&self) -> &'static str {
        match self {
            Self::Google => "https://www.google.com",
            Self::Bing => "https://www.bing.com",
        }
    }

    /// Builds a site-restricted search URL, e.g. `site:yelp.com plumbers Austin`
    pub fn search_url(&self, listing_host: &str, terms: &str) -> String {
        let host = listing_host.strip_prefix("www.").unwrap_or(listing_host);
        let query: String = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("q", &format!("site:{} {}", host, terms))
            .finish();
        format!("{}/search?{}", self.origin(), query)
    }
}

/// How a task arrives at the listing site
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryMode {
    Direct,
    SearchEngine(SearchEngine),
}

impl EntryMode {
    /// Parses a mode name as used in the ratio string
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "direct" => Some(Self::Direct),
            "google" => Some(Self::SearchEngine(SearchEngine::Google)),
            "bing" => Some(Self::SearchEngine(SearchEngine::Bing)),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::SearchEngine(engine) => engine.name(),
        }
    }
}

impl fmt::Display for EntryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Normalized probability distribution over entry modes
///
/// Immutable for the run. Probabilities always sum to 1.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryFlowWeights {
    weights: Vec<(EntryMode, f64)>,
}

impl EntryFlowWeights {
    /// Parses a ratio string such as `"google:0.6,direct:0.3,bing:0.1"`
    ///
    /// # Rules
    ///
    /// - Unknown mode names are dropped with a warning
    /// - Repeated names accumulate
    /// - Negative or non-numeric weights are a validation error
    /// - Weights are renormalized to sum to 1
    /// - An empty or all-zero distribution falls back to the default ratios
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let mut weights: Vec<(EntryMode, f64)> = Vec::new();

        for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (name, value) = part.split_once(':').ok_or_else(|| {
                ConfigError::Validation(format!(
                    "entry flow ratio '{}' must look like name:weight",
                    part
                ))
            })?;

            let weight: f64 = value.trim().parse().map_err(|_| {
                ConfigError::Validation(format!(
                    "entry flow weight for '{}' is not a number: '{}'",
                    name.trim(),
                    value.trim()
                ))
            })?;

            if !weight.is_finite() || weight < 0.0 {
                return Err(ConfigError::Validation(format!(
                    "entry flow weight for '{}' must be >= 0, got {}",
                    name.trim(),
                    weight
                )));
            }

            let mode = match EntryMode::from_name(name) {
                Some(mode) => mode,
                None => {
                    tracing::warn!("Ignoring unknown entry mode '{}'", name.trim());
                    continue;
                }
            };

            match weights.iter_mut().find(|(m, _)| *m == mode) {
                Some((_, w)) => *w += weight,
                None => weights.push((mode, weight)),
            }
        }

        let total: f64 = weights.iter().map(|(_, w)| w).sum();
        if total <= 0.0 {
            tracing::warn!(
                "Entry flow ratios '{}' are empty, using {}",
                raw,
                DEFAULT_ENTRY_FLOW_RATIOS
            );
            return Ok(Self::default());
        }

        weights.retain(|(_, w)| *w > 0.0);
        for (_, w) in weights.iter_mut() {
            *w /= total;
        }

        Ok(Self { weights })
    }

    /// Probability of a mode; zero if absent
    pub fn probability(&self, mode: EntryMode) -> f64 {
        self.weights
            .iter()
            .find(|(m, _)| *m == mode)
            .map(|(_, w)| *w)
            .unwrap_or(0.0)
    }

    /// Modes with non-zero probability, in configuration order
    pub fn modes(&self) -> impl Iterator<Item = (EntryMode, f64)> + '_ {
        self.weights.iter().copied()
    }

    /// Maps a uniform sample in [0, 1) to a mode
    pub fn sample(&self, u: f64) -> EntryMode {
        let mut cumulative = 0.0;
        for (mode, weight) in &self.weights {
            cumulative += weight;
            if u < cumulative {
                return *mode;
            }
        }
        self.weights
            .last()
            .map(|(mode, _)| *mode)
            .unwrap_or(EntryMode::Direct)
    }
}

impl Default for EntryFlowWeights {
    fn default() -> Self {
        Self {
            weights: vec![
                (EntryMode::SearchEngine(SearchEngine::Google), 0.6),
                (EntryMode::Direct, 0.3),
                (EntryMode::SearchEngine(SearchEngine::Bing), 0.1),
            ],
        }
    }
}

/// Chooses an entry mode per task
pub struct EntryRouter {
    weights: EntryFlowWeights,
    rng: Arc<dyn RandomSource>,
}

impl EntryRouter {
    pub fn new(weights: EntryFlowWeights, rng: Arc<dyn RandomSource>) -> Self {
        Self { weights, rng }
    }

    pub fn weights(&self) -> &EntryFlowWeights {
        &self.weights
    }

    /// Draws an entry mode for a task
    pub fn choose(&self, task: &Task) -> EntryMode {
        let mode = self.weights.sample(self.rng.next_f64());
        tracing::debug!(task = task.id, mode = %mode, "Chose entry mode");
        mode
    }
}
