//! Shared types for the CHIPHOUSE backend.
//!
//! These types form the data model used across all modules.
//! They are designed to be stable so that ledger, game, and service
//! modules can depend on them without circular references.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Player identity as handed to us by the transport layer.
pub type UserId = i64;

/// Virtual currency amount. Signed integer units, no floats in balances.
pub type Chips = i64;

// ---------------------------------------------------------------------------
// Games
// ---------------------------------------------------------------------------

/// The games the house runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameKind {
    Blackjack,
    Roulette,
    Dice,
    Coinflip,
}

impl GameKind {
    /// All known games (useful for iteration and reporting).
    pub const ALL: &'static [GameKind] = &[
        GameKind::Blackjack,
        GameKind::Roulette,
        GameKind::Dice,
        GameKind::Coinflip,
    ];

    /// Stable lowercase identifier used in storage and stats keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            GameKind::Blackjack => "blackjack",
            GameKind::Roulette => "roulette",
            GameKind::Dice => "dice",
            GameKind::Coinflip => "coinflip",
        }
    }
}

impl fmt::Display for GameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for GameKind {
    type Err = CasinoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "blackjack" => Ok(GameKind::Blackjack),
            "roulette" => Ok(GameKind::Roulette),
            "dice" => Ok(GameKind::Dice),
            "coinflip" => Ok(GameKind::Coinflip),
            other => Err(CasinoError::Corrupt(format!("unknown game: {other}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Round results
// ---------------------------------------------------------------------------

/// Settled outcome of a single game round, returned to the acting user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundReceipt {
    pub game: GameKind,
    pub bet: Chips,
    /// Human-readable result label, e.g. "WIN number=17".
    pub result: String,
    /// Net balance change for the player (negative on a loss).
    pub payout: Chips,
    pub new_balance: Chips,
}

impl fmt::Display for RoundReceipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] bet={} {} payout={:+} balance={}",
            self.game, self.bet, self.result, self.payout, self.new_balance,
        )
    }
}

/// Append-only record of a settled round. Capped ring-buffer semantics are
/// enforced by the storage layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub at: DateTime<Utc>,
    pub user_id: UserId,
    pub game: GameKind,
    pub bet: Chips,
    pub result: String,
    pub payout: Chips,
    /// Whether the round-level bias toggle fired for this round.
    pub biased: bool,
}

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

/// A user account row. Created lazily on first reference, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: UserId,
    pub balance: Chips,
    pub total_wagered: Chips,
    pub total_won: Chips,
    pub last_work_at: Option<DateTime<Utc>>,
}

impl fmt::Display for UserAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "user {} | balance={} wagered={} won={}",
            self.id, self.balance, self.total_wagered, self.total_won,
        )
    }
}

// ---------------------------------------------------------------------------
// Cashouts
// ---------------------------------------------------------------------------

/// Cashout lifecycle. There is deliberately no reject/expire/refund state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CashoutStatus {
    Pending,
    Approved,
}

impl CashoutStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CashoutStatus::Pending => "pending",
            CashoutStatus::Approved => "approved",
        }
    }
}

impl fmt::Display for CashoutStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CashoutStatus {
    type Err = CasinoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(CashoutStatus::Pending),
            "approved" => Ok(CashoutStatus::Approved),
            other => Err(CasinoError::Corrupt(format!(
                "unknown cashout status: {other}"
            ))),
        }
    }
}

/// A cashout request. Funds are reserved (debited) at request time, which
/// is the mechanism preventing double-withdrawal while pending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CashoutRequest {
    pub id: String,
    pub user_id: UserId,
    pub amount: Chips,
    pub status: CashoutStatus,
    /// Redemption code, attached on approval.
    pub code: Option<String>,
    pub requested_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
}

impl fmt::Display for CashoutRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cashout {} | user={} amount={} status={}",
            self.id, self.user_id, self.amount, self.status,
        )
    }
}

// ---------------------------------------------------------------------------
// Promo codes
// ---------------------------------------------------------------------------

/// A promo code granting chips, redeemable at most once per user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromoCode {
    pub code: String,
    pub amount: Chips,
    pub max_uses: i64,
    pub uses: i64,
    pub expires_at: Option<DateTime<Utc>>,
    pub active: bool,
}

impl PromoCode {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|e| now >= e).unwrap_or(false)
    }

    pub fn uses_left(&self) -> i64 {
        (self.max_uses - self.uses).max(0)
    }
}

impl fmt::Display for PromoCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "promo {} | amount={} uses={}/{} active={}",
            self.code, self.amount, self.uses, self.max_uses, self.active,
        )
    }
}

/// One redemption of a promo code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromoUsage {
    pub code: String,
    pub user_id: UserId,
    pub used_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Stats & reports
// ---------------------------------------------------------------------------

/// Cumulative per-game counters, updated inside every settlement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameStats {
    pub game: GameKind,
    pub rounds: i64,
    /// House profit = negative sum of player payouts.
    pub house_profit: Chips,
    pub wagered: Chips,
}

impl GameStats {
    /// Actual house edge: fraction of total wagers retained by the house.
    pub fn house_edge(&self) -> f64 {
        if self.wagered == 0 {
            0.0
        } else {
            self.house_profit as f64 / self.wagered as f64
        }
    }
}

impl fmt::Display for GameStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: rounds={} profit={} wagered={} edge={:.2}%",
            self.game,
            self.rounds,
            self.house_profit,
            self.wagered,
            self.house_edge() * 100.0,
        )
    }
}

/// Aggregate report across all games.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsReport {
    pub per_game: Vec<GameStats>,
    pub total_rounds: i64,
    pub total_profit: Chips,
    pub total_wagered: Chips,
    pub house_edge: f64,
}

/// Operator-facing snapshot of the whole house.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HouseReport {
    pub house_balance: Chips,
    pub user_count: i64,
    pub total_user_balance: Chips,
    pub history_len: i64,
    /// Biased rounds among the 10 most recent history entries.
    pub recent_biased: i64,
}

impl fmt::Display for HouseReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "house={} users={} user_total={} biased_recent={}/10",
            self.house_balance, self.user_count, self.total_user_balance, self.recent_biased,
        )
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for CHIPHOUSE.
///
/// Validation and authorization variants abort the operation with zero
/// state mutation. `Storage` means the settlement transaction was rolled
/// back: persist-or-abort, never apply-then-log.
#[derive(Debug, thiserror::Error)]
pub enum CasinoError {
    #[error("Invalid bet: {0}")]
    InvalidBet(String),

    #[error("Invalid choice: {0}")]
    InvalidChoice(String),

    #[error("Insufficient balance: need {needed}, have {available}")]
    InsufficientBalance { needed: Chips, available: Chips },

    #[error("A game is already open for user {0}")]
    SessionAlreadyOpen(UserId),

    #[error("No open game for user {0}")]
    SessionNotFound(UserId),

    #[error("This game belongs to another player")]
    NotSessionOwner,

    #[error("Another action is already in flight for this game")]
    ActionInFlight,

    #[error("Cashout below minimum of {minimum}")]
    CashoutBelowMinimum { minimum: Chips },

    #[error("Cashout request not found: {0}")]
    CashoutNotFound(String),

    #[error("Cashout request already processed: {0}")]
    CashoutAlreadyProcessed(String),

    #[error("Operator privileges required")]
    Unauthorized,

    #[error("Promo code not found: {0}")]
    PromoNotFound(String),

    #[error("Promo code already exists: {0}")]
    PromoAlreadyExists(String),

    #[error("Promo code is inactive: {0}")]
    PromoInactive(String),

    #[error("Promo code expired: {0}")]
    PromoExpired(String),

    #[error("Promo code has no uses left: {0}")]
    PromoExhausted(String),

    #[error("Promo code already redeemed: {0}")]
    PromoAlreadyRedeemed(String),

    #[error("Work grant on cooldown until {until}")]
    WorkCooldown { until: DateTime<Utc> },

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
