//! European roulette, single zero.
//!
//! Outside bets (color, parity, half-range) pay the configured outside
//! multiplier on the stake; dozen bets pay the dozen multiplier. Zero
//! loses every supported bet.

use crate::bias::{skewed_draw, BiasPolicy};
use crate::config::RouletteConfig;
use crate::games::ResolvedRound;
use crate::types::{CasinoError, Chips, GameKind};

/// Red pockets on a European wheel.
pub const RED_NUMBERS: [u8; 18] = [
    1, 3, 5, 7, 9, 12, 14, 16, 18, 19, 21, 23, 25, 27, 30, 32, 34, 36,
];

/// Supported player choices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouletteChoice {
    Red,
    Black,
    Even,
    Odd,
    /// 1..18
    Low,
    /// 19..36
    High,
    /// Dozen 1, 2, or 3.
    Dozen(u8),
}

impl RouletteChoice {
    /// Parse a transport-level token. Dozens arrive as "dozen1".."dozen3".
    pub fn parse(token: &str) -> Result<Self, CasinoError> {
        match token {
            "red" => Ok(Self::Red),
            "black" => Ok(Self::Black),
            "even" => Ok(Self::Even),
            "odd" => Ok(Self::Odd),
            "low" => Ok(Self::Low),
            "high" => Ok(Self::High),
            "dozen1" => Ok(Self::Dozen(1)),
            "dozen2" => Ok(Self::Dozen(2)),
            "dozen3" => Ok(Self::Dozen(3)),
            other => Err(CasinoError::InvalidChoice(format!(
                "unknown roulette choice: {other}"
            ))),
        }
    }

    /// Does this choice cover pocket `n`? Zero is covered by nothing.
    pub fn covers(&self, n: u8) -> bool {
        if n == 0 {
            return false;
        }
        match self {
            Self::Red => RED_NUMBERS.contains(&n),
            Self::Black => !RED_NUMBERS.contains(&n),
            Self::Even => n % 2 == 0,
            Self::Odd => n % 2 == 1,
            Self::Low => n <= 18,
            Self::High => n >= 19,
            Self::Dozen(d) => (n - 1) / 12 + 1 == *d,
        }
    }

    fn multiplier(&self, cfg: &RouletteConfig) -> i64 {
        match self {
            Self::Dozen(_) => cfg.dozen_multiplier,
            _ => cfg.outside_multiplier,
        }
    }
}

/// Spin the wheel. `biased` is the round-level toggle; `override_q`
/// the per-game override probability.
pub fn spin(
    bet: Chips,
    choice: RouletteChoice,
    biased: bool,
    override_q: f64,
    cfg: &RouletteConfig,
    policy: &dyn BiasPolicy,
) -> Result<ResolvedRound, CasinoError> {
    if let RouletteChoice::Dozen(d) = choice {
        if !(1..=3).contains(&d) {
            return Err(CasinoError::InvalidChoice(format!("dozen must be 1-3, got {d}")));
        }
    }

    let space: Vec<u8> = (0..=36).collect();
    let losing: Vec<u8> = space.iter().copied().filter(|n| !choice.covers(*n)).collect();
    let (pocket, forced) = skewed_draw(&space, &losing, biased, override_q, policy);

    let won = choice.covers(pocket);
    let payout = if won {
        bet * (choice.multiplier(cfg) - 1)
    } else {
        -bet
    };
    let result = format!(
        "{} number={pocket}",
        if won { "WIN" } else { "LOSS" }
    );
    Ok(ResolvedRound {
        game: GameKind::Roulette,
        bet,
        payout,
        result,
        forced,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bias::MockBiasPolicy;
    use crate::config::AppConfig;

    fn cfg() -> RouletteConfig {
        AppConfig::default().roulette
    }

    fn scripted(pocket: u8) -> MockBiasPolicy {
        let mut policy = MockBiasPolicy::new();
        policy.expect_chance().return_const(false);
        policy.expect_pick().returning(move |_| pocket as usize);
        policy
    }

    #[test]
    fn test_red_black_partition_the_wheel() {
        assert_eq!(RED_NUMBERS.len(), 18);
        let blacks = (1u8..=36).filter(|n| RouletteChoice::Black.covers(*n)).count();
        assert_eq!(blacks, 18);
        assert!(!RouletteChoice::Red.covers(0));
        assert!(!RouletteChoice::Black.covers(0));
    }

    #[test]
    fn test_dozen_boundaries() {
        assert!(RouletteChoice::Dozen(1).covers(1));
        assert!(RouletteChoice::Dozen(1).covers(12));
        assert!(RouletteChoice::Dozen(2).covers(13));
        assert!(RouletteChoice::Dozen(3).covers(36));
        assert!(!RouletteChoice::Dozen(2).covers(25));
    }

    #[test]
    fn test_outside_win_pays_even_money() {
        // pocket 18 is low/even/red
        let policy = scripted(18);
        let round = spin(100, RouletteChoice::Low, false, 0.7, &cfg(), &policy).unwrap();
        assert_eq!(round.payout, 100);
        assert!(round.result.starts_with("WIN"));
    }

    #[test]
    fn test_dozen_win_pays_two_to_one() {
        let policy = scripted(14);
        let round = spin(100, RouletteChoice::Dozen(2), false, 0.7, &cfg(), &policy).unwrap();
        assert_eq!(round.payout, 200);
    }

    #[test]
    fn test_zero_loses_outside_bets() {
        let policy = scripted(0);
        for choice in [
            RouletteChoice::Red,
            RouletteChoice::Black,
            RouletteChoice::Even,
            RouletteChoice::Odd,
            RouletteChoice::Low,
            RouletteChoice::High,
        ] {
            let round = spin(100, choice, false, 0.7, &cfg(), &policy).unwrap();
            assert_eq!(round.payout, -100);
        }
    }

    #[test]
    fn test_forced_draw_always_loses() {
        let mut policy = MockBiasPolicy::new();
        policy.expect_chance().return_const(true);
        policy.expect_pick().returning(|_| 0);
        let round = spin(100, RouletteChoice::Red, true, 0.7, &cfg(), &policy).unwrap();
        assert!(round.forced);
        assert_eq!(round.payout, -100);
    }

    #[test]
    fn test_parse_tokens() {
        assert_eq!(RouletteChoice::parse("red").unwrap(), RouletteChoice::Red);
        assert_eq!(RouletteChoice::parse("dozen3").unwrap(), RouletteChoice::Dozen(3));
        assert!(RouletteChoice::parse("green").is_err());
    }
}
