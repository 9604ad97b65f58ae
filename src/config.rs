//! Configuration loading from TOML.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Every value that has drifted across deployments (starting balance,
//! bias probabilities, paytables, minimums, history cap) is
//! configuration here, never a literal in game code.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;

use crate::types::Chips;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub economy: EconomyConfig,
    pub bias: BiasConfig,
    pub table: TableConfig,
    pub roulette: RouletteConfig,
    pub dice: DiceConfig,
    pub coinflip: CoinflipConfig,
    pub cashout: CashoutConfig,
    pub work: WorkConfig,
    pub operators: OperatorsConfig,
    pub storage: StorageConfig,
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EconomyConfig {
    /// Balance granted to an account created on first reference.
    pub starting_balance: Chips,
    /// Initial house balance when the database is created fresh.
    pub house_balance: Chips,
    /// Display label only; chips never settle to real money.
    pub currency: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BiasConfig {
    /// Probability the round-level bias toggle fires (observed 0.20–0.37).
    pub round_probability: f64,
    /// Per-game adversarial override probabilities, given a biased round.
    pub roulette_override: f64,
    pub dice_override: f64,
    pub coinflip_override: f64,
    /// Blackjack resolution-time probabilities.
    pub blackjack_rescue: f64,
    pub blackjack_improve: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TableConfig {
    pub min_bet: Chips,
    pub blackjack_decks: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RouletteConfig {
    /// Stake multiplier for outside bets (color/parity/half-range).
    pub outside_multiplier: i64,
    /// Stake multiplier for dozen bets.
    pub dozen_multiplier: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DiceConfig {
    /// Stake multipliers by selection size: larger selections pay less.
    pub single_multiplier: i64,
    pub double_multiplier: i64,
    pub triple_multiplier: i64,
}

impl DiceConfig {
    /// Multiplier for a selection of `n` faces, if `n` is playable.
    pub fn multiplier(&self, n: usize) -> Option<i64> {
        match n {
            1 => Some(self.single_multiplier),
            2 => Some(self.double_multiplier),
            3 => Some(self.triple_multiplier),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CoinflipConfig {
    /// Win multiplier in percent of stake. Kept below 200 to embed the
    /// house edge (195 pays 1.95× the stake).
    pub win_multiplier_pct: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CashoutConfig {
    pub minimum: Chips,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkConfig {
    /// Chips granted per work claim.
    pub grant: Chips,
    pub cooldown_hours: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OperatorsConfig {
    /// User ids allowed to run operator-only actions.
    pub ids: Vec<i64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// SQLite database file path.
    pub db_path: String,
    /// Maximum retained history entries; oldest evicted first.
    pub history_cap: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub port: u16,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        Ok(config)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            economy: EconomyConfig {
                starting_balance: 1000,
                house_balance: 100_000,
                currency: "chips".into(),
            },
            bias: BiasConfig {
                round_probability: 0.20,
                roulette_override: 0.70,
                dice_override: 0.80,
                coinflip_override: 0.70,
                blackjack_rescue: 0.85,
                blackjack_improve: 0.75,
            },
            table: TableConfig {
                min_bet: 10,
                blackjack_decks: 6,
            },
            roulette: RouletteConfig {
                outside_multiplier: 2,
                dozen_multiplier: 3,
            },
            dice: DiceConfig {
                single_multiplier: 6,
                double_multiplier: 3,
                triple_multiplier: 2,
            },
            coinflip: CoinflipConfig {
                win_multiplier_pct: 195,
            },
            cashout: CashoutConfig { minimum: 1000 },
            work: WorkConfig {
                grant: 250,
                cooldown_hours: 24,
            },
            operators: OperatorsConfig { ids: Vec::new() },
            storage: StorageConfig {
                db_path: "chiphouse.db".into(),
                history_cap: 1000,
            },
            dashboard: DashboardConfig {
                enabled: true,
                port: 8080,
            },
        }
    }
}
