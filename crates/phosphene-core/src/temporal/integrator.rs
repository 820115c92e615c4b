//! First-order leaky integration and per-location state.
//!
//! Every stage of the cascade obeys `dy/dt = (x − y)/τ` and is stepped with
//! the same [`StepScheme`]:
//!
//! | Scheme | Update | Limit |
//! |--------|--------|-------|
//! | Exponential Euler | `y ← y + (1 − e^{−dt/τ})(x − y)` | none; exact for piecewise-constant `x` |
//! | Forward Euler | `y ← y + (dt/τ)(x − y)` | `dt/τ ≤ 1` (overshoots beyond) |

use serde::{Deserialize, Serialize};

/// Discretisation used for every leaky stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepScheme {
    #[default]
    ExponentialEuler,
    ForwardEuler,
}

impl StepScheme {
    pub fn name(self) -> &'static str {
        match self {
            StepScheme::ExponentialEuler => "exponential Euler",
            StepScheme::ForwardEuler => "forward Euler",
        }
    }

    /// Largest `dt/τ` the scheme accepts.
    pub fn max_step_ratio(self) -> f64 {
        match self {
            StepScheme::ExponentialEuler => f64::INFINITY,
            StepScheme::ForwardEuler => 1.0,
        }
    }

    /// Relaxation coefficient `c` in `y ← y + c (x − y)`.
    pub fn coefficient(self, dt: f64, tau: f64) -> f64 {
        match self {
            StepScheme::ExponentialEuler => -(-dt / tau).exp_m1(),
            StepScheme::ForwardEuler => dt / tau,
        }
    }
}

/// One discretised leaky integrator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LeakyStage {
    coefficient: f64,
}

impl LeakyStage {
    pub fn new(scheme: StepScheme, dt: f64, tau: f64) -> Self {
        Self {
            coefficient: scheme.coefficient(dt, tau),
        }
    }

    /// Advance `state` one step towards `input` and return the new value.
    #[inline]
    pub fn step(&self, state: &mut f64, input: f64) -> f64 {
        *state += self.coefficient * (input - *state);
        *state
    }
}

/// State of the stages ahead of the output nonlinearity for one location.
///
/// The slow stages run after the nonlinearity has seen the whole trace and
/// keep their state on the stack.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct IntegratorState {
    /// Fast response `r`.
    pub fast: f64,
    /// Running integral of rectified current (µA·s).
    pub charge: f64,
    /// Gain-control adaptation level.
    pub adaptation: f64,
}

/// Integrator record for one simulation location.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationRecord {
    pub location: usize,
    pub state: IntegratorState,
}

/// Per-location integrator records, indexed in the same order as the
/// activation rows they consume. Records never share state.
#[derive(Debug, Clone, Default)]
pub struct LocationArena {
    records: Vec<LocationRecord>,
}

impl LocationArena {
    /// One record at rest for each location.
    pub fn at_rest(locations: &[usize]) -> Self {
        Self {
            records: locations
                .iter()
                .map(|&location| LocationRecord {
                    location,
                    state: IntegratorState::default(),
                })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[LocationRecord] {
        &self.records
    }

    pub fn records_mut(&mut self) -> &mut [LocationRecord] {
        &mut self.records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_exponential_euler_is_exact_for_step_input() {
        let (dt, tau) = (1e-4, 2e-3);
        let stage = LeakyStage::new(StepScheme::ExponentialEuler, dt, tau);
        let mut y = 0.0;
        for _ in 0..50 {
            stage.step(&mut y, 1.0);
        }
        let exact = 1.0 - (-50.0 * dt / tau).exp();
        assert_relative_eq!(y, exact, epsilon = 1e-12);
    }

    #[test]
    fn test_exponential_euler_stays_bounded_for_huge_steps() {
        let stage = LeakyStage::new(StepScheme::ExponentialEuler, 1.0, 1e-3);
        let mut y = 0.0;
        for _ in 0..10 {
            let v = stage.step(&mut y, 5.0);
            assert!((0.0..=5.0).contains(&v));
        }
    }

    #[test]
    fn test_forward_euler_overshoots_past_its_limit() {
        let stage = LeakyStage::new(StepScheme::ForwardEuler, 1.5e-3, 1e-3);
        let mut y = 0.0;
        assert!(stage.step(&mut y, 1.0) > 1.0);
    }

    #[test]
    fn test_arena_starts_at_rest() {
        let arena = LocationArena::at_rest(&[4, 9, 11]);
        assert_eq!(arena.len(), 3);
        assert_eq!(arena.records()[1].location, 9);
        assert!(arena
            .records()
            .iter()
            .all(|r| r.state == IntegratorState::default()));
    }
}
