//! Outcome bias engine.
//!
//! Every chance-based draw in the house funnels through a [`BiasPolicy`]
//! so that game logic stays deterministic given a policy, and tests can
//! substitute a scripted policy. The production implementation,
//! [`HouseBias`], composes two Bernoulli levels: a round-level toggle
//! drawn once per round, and per-game override draws consulted at each
//! biased decision point.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::Mutex;

// ---------------------------------------------------------------------------
// Policy trait
// ---------------------------------------------------------------------------

/// Source of all randomness and bias decisions for game rounds.
///
/// `&self` methods so a single policy can be shared behind an `Arc`
/// across concurrent rounds.
#[cfg_attr(test, mockall::automock)]
pub trait BiasPolicy: Send + Sync {
    /// Draw the round-level toggle. Fires with the configured round
    /// probability; a round drawn `true` is eligible for adversarial
    /// overrides at its decision points.
    fn round_toggle(&self) -> bool;

    /// Bernoulli draw with probability `q`, used for per-game overrides.
    fn chance(&self, q: f64) -> bool;

    /// Uniform index into a collection of length `len`. `len` must be
    /// nonzero.
    fn pick(&self, len: usize) -> usize;

    /// Uniformly shuffle a slice of cards in place.
    fn shuffle(&self, cards: &mut Vec<u8>);
}

// ---------------------------------------------------------------------------
// Production policy
// ---------------------------------------------------------------------------

/// ChaCha8-backed policy. Seeded from entropy in production; a fixed
/// seed makes whole rounds reproducible in tests.
pub struct HouseBias {
    round_probability: f64,
    rng: Mutex<ChaCha8Rng>,
}

impl HouseBias {
    pub fn new(round_probability: f64) -> Self {
        Self {
            round_probability,
            rng: Mutex::new(ChaCha8Rng::from_entropy()),
        }
    }

    pub fn seeded(round_probability: f64, seed: u64) -> Self {
        Self {
            round_probability,
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(seed)),
        }
    }
}

impl BiasPolicy for HouseBias {
    fn round_toggle(&self) -> bool {
        self.chance(self.round_probability)
    }

    fn chance(&self, q: f64) -> bool {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        rng.gen_bool(q.clamp(0.0, 1.0))
    }

    fn pick(&self, len: usize) -> usize {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        rng.gen_range(0..len)
    }

    fn shuffle(&self, cards: &mut Vec<u8>) {
        use rand::seq::SliceRandom;
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        cards.shuffle(&mut *rng);
    }
}

// ---------------------------------------------------------------------------
// Skewed draws
// ---------------------------------------------------------------------------

/// Draw an outcome from `space`, optionally forced into `losing`.
///
/// When `biased` is set, the override fires with probability `q`; a
/// fired override draws uniformly from `losing` instead of `space`.
/// An empty losing set (the player covered every outcome) falls back
/// to a fair draw. Returns the drawn outcome and whether it was forced.
pub fn skewed_draw<T: Copy>(
    space: &[T],
    losing: &[T],
    biased: bool,
    q: f64,
    policy: &dyn BiasPolicy,
) -> (T, bool) {
    if biased && !losing.is_empty() && policy.chance(q) {
        (losing[policy.pick(losing.len())], true)
    } else {
        (space[policy.pick(space.len())], false)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_policy_is_reproducible() {
        let a = HouseBias::seeded(0.2, 42);
        let b = HouseBias::seeded(0.2, 42);
        for _ in 0..100 {
            assert_eq!(a.pick(52), b.pick(52));
            assert_eq!(a.chance(0.5), b.chance(0.5));
        }
    }

    #[test]
    fn test_shuffle_is_permutation() {
        let policy = HouseBias::seeded(0.2, 7);
        let mut cards: Vec<u8> = (1..=52).map(|v| (v % 13) + 1).collect();
        let mut sorted_before = cards.clone();
        policy.shuffle(&mut cards);
        let mut sorted_after = cards.clone();
        sorted_before.sort_unstable();
        sorted_after.sort_unstable();
        assert_eq!(sorted_before, sorted_after);
    }

    #[test]
    fn test_round_toggle_rate_converges() {
        let policy = HouseBias::seeded(0.2, 99);
        let n = 20_000;
        let fired = (0..n).filter(|_| policy.round_toggle()).count();
        let rate = fired as f64 / n as f64;
        assert!((rate - 0.2).abs() < 0.02, "rate {rate} too far from 0.2");
    }

    #[test]
    fn test_skewed_draw_unbiased_covers_space() {
        let policy = HouseBias::seeded(0.2, 1);
        let space = [1u8, 2, 3, 4, 5, 6];
        let losing = [4u8, 5, 6];
        let mut seen = std::collections::HashSet::new();
        for _ in 0..500 {
            let (v, forced) = skewed_draw(&space, &losing, false, 0.8, &policy);
            assert!(!forced);
            seen.insert(v);
        }
        assert_eq!(seen.len(), 6);
    }

    #[test]
    fn test_skewed_draw_forced_stays_in_losing_set() {
        let mut policy = MockBiasPolicy::new();
        policy.expect_chance().return_const(true);
        policy.expect_pick().returning(|len| len - 1);

        let space = [1u8, 2, 3, 4, 5, 6];
        let losing = [4u8, 5, 6];
        let (v, forced) = skewed_draw(&space, &losing, true, 0.8, &policy);
        assert!(forced);
        assert_eq!(v, 6);
    }

    #[test]
    fn test_skewed_draw_empty_losing_set_is_fair() {
        let mut policy = MockBiasPolicy::new();
        // chance() must not even be consulted when nothing can lose
        policy.expect_chance().never();
        policy.expect_pick().returning(|_| 0);

        let space = [1u8, 2, 3];
        let losing: [u8; 0] = [];
        let (v, forced) = skewed_draw(&space, &losing, true, 1.0, &policy);
        assert!(!forced);
        assert_eq!(v, 1);
    }

    #[test]
    fn test_forced_rate_converges_to_q_given_bias() {
        let policy = HouseBias::seeded(0.2, 5);
        let space = [1u8, 2, 3, 4, 5, 6];
        let losing = [4u8, 5, 6];
        let n = 20_000;
        let forced = (0..n)
            .filter(|_| skewed_draw(&space, &losing, true, 0.8, &policy).1)
            .count();
        let rate = forced as f64 / n as f64;
        assert!((rate - 0.8).abs() < 0.02, "rate {rate} too far from 0.8");
    }
}
