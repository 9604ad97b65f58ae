//! SQLite persistence layer.
//!
//! All SQL lives here. Every money movement (settlement, transfer,
//! promo grant, cashout reservation) runs inside a single transaction
//! together with its bookkeeping rows, so a crash mid-operation leaves
//! either the complete mutation or none of it.

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::info;

use crate::types::{
    CashoutRequest, CasinoError, Chips, GameKind, GameStats, HistoryEntry, PromoCode,
    UserAccount, UserId,
};

/// Schema version written to `PRAGMA user_version`. Bump when the
/// schema changes and add a migration arm in `migrate`.
const SCHEMA_VERSION: i64 = 1;

pub struct Store {
    pool: SqlitePool,
    history_cap: i64,
}

impl Store {
    /// Open (creating if missing) the database file and run migrations.
    pub async fn open(path: &str, house_seed: Chips, history_cap: i64) -> Result<Self, CasinoError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(CasinoError::Storage)?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        let store = Self { pool, history_cap };
        store.migrate(house_seed).await?;
        info!(path, "Database opened");
        Ok(store)
    }

    /// In-memory database for tests. A single connection keeps the
    /// database alive for the lifetime of the pool.
    pub async fn open_in_memory(house_seed: Chips, history_cap: i64) -> Result<Self, CasinoError> {
        let options = SqliteConnectOptions::new().in_memory(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        let store = Self { pool, history_cap };
        store.migrate(house_seed).await?;
        Ok(store)
    }

    async fn migrate(&self, house_seed: Chips) -> Result<(), CasinoError> {
        let version: i64 = sqlx::query_scalar("PRAGMA user_version")
            .fetch_one(&self.pool)
            .await?;
        if version >= SCHEMA_VERSION {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id            INTEGER PRIMARY KEY,
                balance       INTEGER NOT NULL,
                total_wagered INTEGER NOT NULL DEFAULT 0,
                total_won     INTEGER NOT NULL DEFAULT 0,
                last_work_at  TEXT
            )
            "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS house (
                id      INTEGER PRIMARY KEY CHECK (id = 0),
                balance INTEGER NOT NULL
            )
            "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query("INSERT OR IGNORE INTO house (id, balance) VALUES (0, ?)")
            .bind(house_seed)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS cashout_requests (
                id           TEXT PRIMARY KEY,
                user_id      INTEGER NOT NULL,
                amount       INTEGER NOT NULL,
                status       TEXT NOT NULL,
                code         TEXT,
                requested_at TEXT NOT NULL,
                approved_at  TEXT
            )
            "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS promo_codes (
                code       TEXT PRIMARY KEY,
                amount     INTEGER NOT NULL,
                max_uses   INTEGER NOT NULL,
                uses       INTEGER NOT NULL DEFAULT 0,
                expires_at TEXT,
                active     INTEGER NOT NULL DEFAULT 1
            )
            "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS promo_usage (
                code    TEXT NOT NULL,
                user_id INTEGER NOT NULL,
                used_at TEXT NOT NULL,
                PRIMARY KEY (code, user_id)
            )
            "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS history (
                id      INTEGER PRIMARY KEY AUTOINCREMENT,
                at      TEXT NOT NULL,
                user_id INTEGER NOT NULL,
                game    TEXT NOT NULL,
                bet     INTEGER NOT NULL,
                result  TEXT NOT NULL,
                payout  INTEGER NOT NULL,
                biased  INTEGER NOT NULL
            )
            "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS game_stats (
                game         TEXT PRIMARY KEY,
                rounds       INTEGER NOT NULL DEFAULT 0,
                house_profit INTEGER NOT NULL DEFAULT 0,
                wagered      INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(&format!("PRAGMA user_version = {SCHEMA_VERSION}"))
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        info!(version = SCHEMA_VERSION, "Schema migrated");
        Ok(())
    }

    // ---- users ----

    /// Create the account with the given starting balance if it does
    /// not exist yet, then return it.
    pub async fn ensure_user(
        &self,
        user: UserId,
        starting_balance: Chips,
    ) -> Result<UserAccount, CasinoError> {
        sqlx::query("INSERT OR IGNORE INTO users (id, balance) VALUES (?, ?)")
            .bind(user)
            .bind(starting_balance)
            .execute(&self.pool)
            .await?;
        self.user_row(user)
            .await?
            .ok_or_else(|| CasinoError::Corrupt(format!("user {user} missing after insert")))
    }

    pub async fn user_row(&self, user: UserId) -> Result<Option<UserAccount>, CasinoError> {
        let row = sqlx::query_as::<_, (i64, i64, i64, i64, Option<DateTime<Utc>>)>(
            "SELECT id, balance, total_wagered, total_won, last_work_at FROM users WHERE id = ?",
        )
        .bind(user)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(id, balance, total_wagered, total_won, last_work_at)| UserAccount {
            id,
            balance,
            total_wagered,
            total_won,
            last_work_at,
        }))
    }

    // ---- settlement ----

    /// Apply one settled game round: user payout, inverse house
    /// movement, wager counters, per-game stats, and the capped history
    /// append, all in one transaction. Returns the user's new balance.
    ///
    /// `reserved` is the stake already transferred to the house when
    /// the round opened (blackjack); it is returned to the user here
    /// together with the net payout. Single-shot games pass zero.
    #[allow(clippy::too_many_arguments)]
    pub async fn settle_round(
        &self,
        user: UserId,
        game: GameKind,
        bet: Chips,
        payout: Chips,
        reserved: Chips,
        result: &str,
        biased: bool,
        now: DateTime<Utc>,
    ) -> Result<Chips, CasinoError> {
        let credit = reserved + payout;
        let mut tx = self.pool.begin().await?;

        let affected = sqlx::query(
            r#"
            UPDATE users
               SET balance = balance + ?,
                   total_wagered = total_wagered + ?,
                   total_won = total_won + MAX(?, 0)
             WHERE id = ? AND balance + ? >= 0
            "#,
        )
        .bind(credit)
        .bind(bet)
        .bind(payout)
        .bind(user)
        .bind(credit)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if affected == 0 {
            let available: Chips = sqlx::query_scalar("SELECT balance FROM users WHERE id = ?")
                .bind(user)
                .fetch_optional(&mut *tx)
                .await?
                .unwrap_or(0);
            return Err(CasinoError::InsufficientBalance {
                needed: -credit,
                available,
            });
        }

        sqlx::query("UPDATE house SET balance = balance - ? WHERE id = 0")
            .bind(credit)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO game_stats (game, rounds, house_profit, wagered)
            VALUES (?, 1, ?, ?)
            ON CONFLICT(game) DO UPDATE SET
                rounds = rounds + 1,
                house_profit = house_profit + excluded.house_profit,
                wagered = wagered + excluded.wagered
            "#,
        )
        .bind(game.as_str())
        .bind(-payout)
        .bind(bet)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO history (at, user_id, game, bet, result, payout, biased)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(now)
        .bind(user)
        .bind(game.as_str())
        .bind(bet)
        .bind(result)
        .bind(payout)
        .bind(biased)
        .execute(&mut *tx)
        .await?;

        // Oldest entries are evicted once the cap is exceeded.
        sqlx::query(
            r#"
            DELETE FROM history
             WHERE id NOT IN (SELECT id FROM history ORDER BY id DESC LIMIT ?)
            "#,
        )
        .bind(self.history_cap)
        .execute(&mut *tx)
        .await?;

        let new_balance: Chips = sqlx::query_scalar("SELECT balance FROM users WHERE id = ?")
            .bind(user)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(new_balance)
    }

    /// Move `delta` chips to a user from the house (negative `delta`
    /// moves chips the other way). Used for admin grants, promo and
    /// work credits, and cashout reservations. The user balance is
    /// never allowed below zero; the house balance may go negative.
    pub async fn transfer(&self, user: UserId, delta: Chips) -> Result<Chips, CasinoError> {
        let mut tx = self.pool.begin().await?;
        let new_balance = Self::transfer_in_tx(&mut tx, user, delta).await?;
        tx.commit().await?;
        Ok(new_balance)
    }

    async fn transfer_in_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        user: UserId,
        delta: Chips,
    ) -> Result<Chips, CasinoError> {
        let affected = sqlx::query(
            "UPDATE users SET balance = balance + ? WHERE id = ? AND balance + ? >= 0",
        )
        .bind(delta)
        .bind(user)
        .bind(delta)
        .execute(&mut **tx)
        .await?
        .rows_affected();
        if affected == 0 {
            let available: Chips = sqlx::query_scalar("SELECT balance FROM users WHERE id = ?")
                .bind(user)
                .fetch_optional(&mut **tx)
                .await?
                .unwrap_or(0);
            return Err(CasinoError::InsufficientBalance {
                needed: -delta,
                available,
            });
        }
        sqlx::query("UPDATE house SET balance = balance - ? WHERE id = 0")
            .bind(delta)
            .execute(&mut **tx)
            .await?;
        sqlx::query_scalar("SELECT balance FROM users WHERE id = ?")
            .bind(user)
            .fetch_one(&mut **tx)
            .await
            .map_err(CasinoError::Storage)
    }

    /// Credit the work grant and stamp `last_work_at` atomically.
    pub async fn apply_work_grant(
        &self,
        user: UserId,
        grant: Chips,
        now: DateTime<Utc>,
    ) -> Result<Chips, CasinoError> {
        let mut tx = self.pool.begin().await?;
        let new_balance = Self::transfer_in_tx(&mut tx, user, grant).await?;
        sqlx::query("UPDATE users SET last_work_at = ? WHERE id = ?")
            .bind(now)
            .bind(user)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(new_balance)
    }

    // ---- cashouts ----

    /// Debit the requested amount (the reservation) and record the
    /// pending request in the same transaction.
    pub async fn reserve_cashout(&self, req: &CashoutRequest) -> Result<Chips, CasinoError> {
        let mut tx = self.pool.begin().await?;
        let new_balance = Self::transfer_in_tx(&mut tx, req.user_id, -req.amount).await?;
        sqlx::query(
            r#"
            INSERT INTO cashout_requests (id, user_id, amount, status, code, requested_at, approved_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&req.id)
        .bind(req.user_id)
        .bind(req.amount)
        .bind(req.status.as_str())
        .bind(&req.code)
        .bind(req.requested_at)
        .bind(req.approved_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(new_balance)
    }

    pub async fn cashout(&self, id: &str) -> Result<Option<CashoutRequest>, CasinoError> {
        let row = sqlx::query_as::<
            _,
            (
                String,
                i64,
                i64,
                String,
                Option<String>,
                DateTime<Utc>,
                Option<DateTime<Utc>>,
            ),
        >(
            r#"
            SELECT id, user_id, amount, status, code, requested_at, approved_at
              FROM cashout_requests WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Self::cashout_from_row).transpose()
    }

    fn cashout_from_row(
        (id, user_id, amount, status, code, requested_at, approved_at): (
            String,
            i64,
            i64,
            String,
            Option<String>,
            DateTime<Utc>,
            Option<DateTime<Utc>>,
        ),
    ) -> Result<CashoutRequest, CasinoError> {
        Ok(CashoutRequest {
            id,
            user_id,
            amount,
            status: status.parse()?,
            code,
            requested_at,
            approved_at,
        })
    }

    /// Transition a pending request to approved, attaching the
    /// redemption code. Already-approved requests are rejected, which
    /// makes approval idempotence-safe under operator double-clicks.
    pub async fn approve_cashout(
        &self,
        id: &str,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<CashoutRequest, CasinoError> {
        let mut tx = self.pool.begin().await?;
        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM cashout_requests WHERE id = ?")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        match status.as_deref() {
            None => return Err(CasinoError::CashoutNotFound(id.to_string())),
            Some("pending") => {}
            Some(_) => return Err(CasinoError::CashoutAlreadyProcessed(id.to_string())),
        }
        // the status predicate re-checks under the write, so a racing
        // approval that read 'pending' loses cleanly here
        let affected = sqlx::query(
            r#"
            UPDATE cashout_requests
               SET status = 'approved', code = ?, approved_at = ?
             WHERE id = ? AND status = 'pending'
            "#,
        )
        .bind(code)
        .bind(now)
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if affected == 0 {
            return Err(CasinoError::CashoutAlreadyProcessed(id.to_string()));
        }
        tx.commit().await?;
        self.cashout(id)
            .await?
            .ok_or_else(|| CasinoError::Corrupt(format!("cashout {id} missing after approve")))
    }

    pub async fn pending_cashouts(&self) -> Result<Vec<CashoutRequest>, CasinoError> {
        let rows = sqlx::query_as::<
            _,
            (
                String,
                i64,
                i64,
                String,
                Option<String>,
                DateTime<Utc>,
                Option<DateTime<Utc>>,
            ),
        >(
            r#"
            SELECT id, user_id, amount, status, code, requested_at, approved_at
              FROM cashout_requests WHERE status = 'pending' ORDER BY requested_at
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::cashout_from_row).collect()
    }

    // ---- promo codes ----

    pub async fn insert_promo(&self, promo: &PromoCode) -> Result<(), CasinoError> {
        let affected = sqlx::query(
            r#"
            INSERT OR IGNORE INTO promo_codes (code, amount, max_uses, uses, expires_at, active)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&promo.code)
        .bind(promo.amount)
        .bind(promo.max_uses)
        .bind(promo.uses)
        .bind(promo.expires_at)
        .bind(promo.active)
        .execute(&self.pool)
        .await?
        .rows_affected();
        if affected == 0 {
            return Err(CasinoError::PromoAlreadyExists(promo.code.clone()));
        }
        Ok(())
    }

    pub async fn promo(&self, code: &str) -> Result<Option<PromoCode>, CasinoError> {
        let row = sqlx::query_as::<_, (String, i64, i64, i64, Option<DateTime<Utc>>, bool)>(
            "SELECT code, amount, max_uses, uses, expires_at, active FROM promo_codes WHERE code = ?",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(code, amount, max_uses, uses, expires_at, active)| PromoCode {
            code,
            amount,
            max_uses,
            uses,
            expires_at,
            active,
        }))
    }

    pub async fn user_redeemed(&self, code: &str, user: UserId) -> Result<bool, CasinoError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM promo_usage WHERE code = ? AND user_id = ?",
        )
        .bind(code)
        .bind(user)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    /// Credit the promo grant, increment the use counter, and append
    /// the usage row in one transaction. The usage primary key and the
    /// guarded counter update make double-redemption impossible even
    /// if a race slips past the service-level lock.
    pub async fn apply_redemption(
        &self,
        code: &str,
        user: UserId,
        amount: Chips,
        now: DateTime<Utc>,
    ) -> Result<Chips, CasinoError> {
        let mut tx = self.pool.begin().await?;

        let affected = sqlx::query(
            "UPDATE promo_codes SET uses = uses + 1 WHERE code = ? AND uses < max_uses",
        )
        .bind(code)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if affected == 0 {
            return Err(CasinoError::PromoExhausted(code.to_string()));
        }

        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO promo_usage (code, user_id, used_at) VALUES (?, ?, ?)",
        )
        .bind(code)
        .bind(user)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if inserted == 0 {
            return Err(CasinoError::PromoAlreadyRedeemed(code.to_string()));
        }

        let new_balance = Self::transfer_in_tx(&mut tx, user, amount).await?;
        tx.commit().await?;
        Ok(new_balance)
    }

    // ---- reporting ----

    pub async fn stats(&self) -> Result<Vec<GameStats>, CasinoError> {
        let rows = sqlx::query_as::<_, (String, i64, i64, i64)>(
            "SELECT game, rounds, house_profit, wagered FROM game_stats ORDER BY game",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|(game, rounds, house_profit, wagered)| {
                Ok(GameStats {
                    game: game.parse()?,
                    rounds,
                    house_profit,
                    wagered,
                })
            })
            .collect()
    }

    pub async fn recent_history(&self, limit: i64) -> Result<Vec<HistoryEntry>, CasinoError> {
        let rows = sqlx::query_as::<_, (DateTime<Utc>, i64, String, i64, String, i64, bool)>(
            r#"
            SELECT at, user_id, game, bet, result, payout, biased
              FROM history ORDER BY id DESC LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|(at, user_id, game, bet, result, payout, biased)| {
                Ok(HistoryEntry {
                    at,
                    user_id,
                    game: game.parse()?,
                    bet,
                    result,
                    payout,
                    biased,
                })
            })
            .collect()
    }

    pub async fn house_balance(&self) -> Result<Chips, CasinoError> {
        sqlx::query_scalar("SELECT balance FROM house WHERE id = 0")
            .fetch_one(&self.pool)
            .await
            .map_err(CasinoError::Storage)
    }

    pub async fn user_count(&self) -> Result<i64, CasinoError> {
        sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await
            .map_err(CasinoError::Storage)
    }

    pub async fn total_user_balance(&self) -> Result<Chips, CasinoError> {
        sqlx::query_scalar("SELECT COALESCE(SUM(balance), 0) FROM users")
            .fetch_one(&self.pool)
            .await
            .map_err(CasinoError::Storage)
    }

    pub async fn history_len(&self) -> Result<i64, CasinoError> {
        sqlx::query_scalar("SELECT COUNT(*) FROM history")
            .fetch_one(&self.pool)
            .await
            .map_err(CasinoError::Storage)
    }

    /// Biased rounds among the `n` most recent history entries.
    pub async fn recent_biased(&self, n: i64) -> Result<i64, CasinoError> {
        sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(biased), 0)
              FROM (SELECT biased FROM history ORDER BY id DESC LIMIT ?)
            "#,
        )
        .bind(n)
        .fetch_one(&self.pool)
        .await
        .map_err(CasinoError::Storage)
    }

    /// Shared read access for modules that layer on top of the store.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
