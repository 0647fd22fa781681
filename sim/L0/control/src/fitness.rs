//! Kinematic match fitness.
//!
//! [`KinematicMatch`] scores every data target once per step and keeps two
//! running totals:
//!
//! ```text
//! fitness         = Σ steps Σ targets score
//! minimax_fitness = Σ steps min over targets scored that step
//! ```
//!
//! Punctuated targets only score on the step that lands on one of their
//! target times (within half a step); continuous targets score every step.

use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use sim_skeleton::Skeleton;
use tracing::{debug, warn};

use crate::target::{DataTarget, InterpolationType};
use crate::Result;

/// Fraction of a step within which a target time counts as hit.
const MATCH_WINDOW: f64 = 0.500_000_000_01;

/// Running fitness over a set of data targets.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KinematicMatch {
    fitness: f64,
    minimax_fitness: f64,
    scored: u64,
    last_index: BTreeMap<String, usize>,
    aborted_by: BTreeSet<String>,
}

impl KinematicMatch {
    /// Create an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Score `targets` against the skeleton at `time`.
    ///
    /// Returns the lowest score of the step, or `None` if no target scored.
    pub fn accumulate<'a>(
        &mut self,
        targets: impl IntoIterator<Item = &'a Rc<DataTarget>>,
        skeleton: &Skeleton,
        time: f64,
        timestep: f64,
    ) -> Result<Option<f64>> {
        let mut lowest: Option<f64> = None;
        for target in targets {
            let value = match target.interpolation() {
                InterpolationType::Continuous => target.match_value_at_time(skeleton, time)?,
                InterpolationType::Punctuated => {
                    let Some(index) = target.target_match(time, timestep * MATCH_WINDOW) else {
                        continue;
                    };
                    // rounding can hit the same target time on two steps
                    if self.last_index.get(target.name()) == Some(&index) {
                        continue;
                    }
                    self.last_index.insert(target.name().to_string(), index);
                    target.match_value_at_index(skeleton, index)?
                }
            };
            self.fitness += value.score;
            self.scored += 1;
            lowest = Some(lowest.map_or(value.score, |low| low.min(value.score)));
            if value.abort && self.aborted_by.insert(target.name().to_string()) {
                warn!(target = target.name(), time, score = value.score, "data target requested abort");
            }
        }
        if let Some(low) = lowest {
            self.minimax_fitness += low;
            debug!(time, lowest = low, fitness = self.fitness, "kinematic match");
        }
        Ok(lowest)
    }

    /// Sum of every score so far.
    #[must_use]
    pub fn fitness(&self) -> f64 {
        self.fitness
    }

    /// Sum of the per-step lowest scores.
    #[must_use]
    pub fn minimax_fitness(&self) -> f64 {
        self.minimax_fitness
    }

    /// Number of individual scores accumulated.
    #[must_use]
    pub fn scored(&self) -> u64 {
        self.scored
    }

    /// Whether any target crossed its abort bound.
    #[must_use]
    pub fn abort_requested(&self) -> bool {
        !self.aborted_by.is_empty()
    }

    /// Targets that crossed their abort bound.
    pub fn aborted_by(&self) -> impl Iterator<Item = &str> {
        self.aborted_by.iter().map(String::as_str)
    }

    /// Start again from zero.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
