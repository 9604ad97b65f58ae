//! Game engines.
//!
//! Each engine is pure: given a bet, a typed choice, and a
//! [`crate::bias::BiasPolicy`], it produces a [`ResolvedRound`] without
//! touching balances. The service settles the result through the
//! ledger afterwards, so a validation error here mutates nothing.

pub mod blackjack;
pub mod coinflip;
pub mod dice;
pub mod roulette;

use crate::types::{CasinoError, Chips, GameKind};

/// Outcome of a single-shot round, before settlement.
#[derive(Debug, Clone)]
pub struct ResolvedRound {
    pub game: GameKind,
    pub bet: Chips,
    /// Net balance change for the player.
    pub payout: Chips,
    /// Human-readable result label, e.g. "LOSS roll=3".
    pub result: String,
    /// Whether an adversarial override fired this round.
    pub forced: bool,
}

/// Shared bet precondition: at least the table minimum, covered by the
/// player's balance.
pub fn validate_bet(bet: Chips, min_bet: Chips, balance: Chips) -> Result<(), CasinoError> {
    if bet < min_bet {
        return Err(CasinoError::InvalidBet(format!(
            "minimum bet is {min_bet}, got {bet}"
        )));
    }
    if bet > balance {
        return Err(CasinoError::InsufficientBalance {
            needed: bet,
            available: balance,
        });
    }
    Ok(())
}
