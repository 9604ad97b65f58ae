//! Coin flip.
//!
//! A win pays the configured multiplier in percent of stake, kept
//! below 200 so the house retains an edge even on fair flips.

use crate::bias::{skewed_draw, BiasPolicy};
use crate::config::CoinflipConfig;
use crate::games::ResolvedRound;
use crate::types::{CasinoError, Chips, GameKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoinSide {
    Heads,
    Tails,
}

impl CoinSide {
    pub fn parse(token: &str) -> Result<Self, CasinoError> {
        match token {
            "heads" => Ok(Self::Heads),
            "tails" => Ok(Self::Tails),
            other => Err(CasinoError::InvalidChoice(format!("unknown side: {other}"))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Heads => "heads",
            Self::Tails => "tails",
        }
    }

    fn other(&self) -> Self {
        match self {
            Self::Heads => Self::Tails,
            Self::Tails => Self::Heads,
        }
    }
}

/// Flip the coin. `biased` is the round-level toggle; `override_q` the
/// per-game override probability.
pub fn play(
    bet: Chips,
    side: CoinSide,
    biased: bool,
    override_q: f64,
    cfg: &CoinflipConfig,
    policy: &dyn BiasPolicy,
) -> Result<ResolvedRound, CasinoError> {
    let space = [CoinSide::Heads, CoinSide::Tails];
    let losing = [side.other()];
    let (landed, forced) = skewed_draw(&space, &losing, biased, override_q, policy);

    let won = landed == side;
    // gross win is bet * pct / 100; payout is net of the stake
    let payout = if won {
        bet * (cfg.win_multiplier_pct - 100) / 100
    } else {
        -bet
    };
    let result = format!(
        "{} landed={}",
        if won { "WIN" } else { "LOSS" },
        landed.as_str()
    );
    Ok(ResolvedRound {
        game: GameKind::Coinflip,
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

    fn cfg() -> CoinflipConfig {
        AppConfig::default().coinflip
    }

    #[test]
    fn test_win_pays_below_double() {
        let mut policy = MockBiasPolicy::new();
        policy.expect_chance().return_const(false);
        policy.expect_pick().returning(|_| 0); // heads
        let round = play(100, CoinSide::Heads, false, 0.7, &cfg(), &policy).unwrap();
        // 195% gross on a 100 stake nets 95
        assert_eq!(round.payout, 95);
        assert!(round.result.contains("heads"));
    }

    #[test]
    fn test_loss_forfeits_stake() {
        let mut policy = MockBiasPolicy::new();
        policy.expect_chance().return_const(false);
        policy.expect_pick().returning(|_| 1); // tails
        let round = play(100, CoinSide::Heads, false, 0.7, &cfg(), &policy).unwrap();
        assert_eq!(round.payout, -100);
    }

    #[test]
    fn test_forced_flip_lands_on_other_side() {
        let mut policy = MockBiasPolicy::new();
        policy.expect_chance().return_const(true);
        policy.expect_pick().returning(|_| 0);
        let round = play(100, CoinSide::Heads, true, 0.7, &cfg(), &policy).unwrap();
        assert!(round.forced);
        assert!(round.result.contains("tails"));
        assert_eq!(round.payout, -100);
    }

    #[test]
    fn test_parse_sides() {
        assert_eq!(CoinSide::parse("heads").unwrap(), CoinSide::Heads);
        assert_eq!(CoinSide::parse("tails").unwrap(), CoinSide::Tails);
        assert!(CoinSide::parse("edge").is_err());
    }
}
