//! Request boundary.
//!
//! `Casino` is what the transport talks to: one method per inbound
//! operation, typed records out. Validation happens before any money
//! moves; every settlement goes through the ledger under the acting
//! user's lock.

use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::bias::BiasPolicy;
use crate::config::AppConfig;
use crate::games::blackjack::{BlackjackOdds, BlackjackTable, PlayerAction};
use crate::games::coinflip::CoinSide;
use crate::games::roulette::RouletteChoice;
use crate::games::{coinflip, dice, roulette, validate_bet, ResolvedRound};
use crate::ledger::{Ledger, LockMap};
use crate::notify::{Notifier, OperatorNote, UserNote};
use crate::session::SessionRegistry;
use crate::storage::Store;
use crate::types::{
    CashoutRequest, CashoutStatus, CasinoError, Chips, GameKind, HistoryEntry, HouseReport,
    PromoCode, RoundReceipt, StatsReport, UserAccount, UserId,
};

/// What the player sees while a blackjack round is open.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BlackjackView {
    pub bet: Chips,
    pub player: Vec<u8>,
    pub player_value: u32,
    pub dealer_upcard: u8,
}

/// A blackjack step either leaves the round open or settles it.
#[derive(Debug, Clone)]
pub enum BlackjackProgress {
    Open(BlackjackView),
    Settled(RoundReceipt),
}

pub struct Casino {
    config: AppConfig,
    ledger: Ledger,
    sessions: SessionRegistry,
    promo_locks: LockMap<String>,
    policy: Arc<dyn BiasPolicy>,
    notifier: Arc<dyn Notifier>,
}

impl Casino {
    pub fn new(
        config: AppConfig,
        store: Arc<Store>,
        policy: Arc<dyn BiasPolicy>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let starting_balance = config.economy.starting_balance;
        Self {
            config,
            ledger: Ledger::new(store, starting_balance),
            sessions: SessionRegistry::new(),
            promo_locks: LockMap::new(),
            policy,
            notifier,
        }
    }

    fn require_operator(&self, id: UserId) -> Result<(), CasinoError> {
        if self.config.operators.ids.contains(&id) {
            Ok(())
        } else {
            warn!(user = id, "Operator action denied");
            Err(CasinoError::Unauthorized)
        }
    }

    pub async fn account(&self, user: UserId) -> Result<UserAccount, CasinoError> {
        self.ledger.account(user).await
    }

    // ---- single-shot games ----

    async fn settle(
        &self,
        user: UserId,
        round: ResolvedRound,
        reserved: Chips,
        biased: bool,
    ) -> Result<RoundReceipt, CasinoError> {
        let new_balance = self
            .ledger
            .settle_round(
                user,
                round.game,
                round.bet,
                round.payout,
                reserved,
                &round.result,
                biased,
                Utc::now(),
            )
            .await?;
        info!(
            user,
            game = %round.game,
            bet = round.bet,
            payout = round.payout,
            biased,
            forced = round.forced,
            "Round settled"
        );
        Ok(RoundReceipt {
            game: round.game,
            bet: round.bet,
            result: round.result,
            payout: round.payout,
            new_balance,
        })
    }

    pub async fn play_roulette(
        &self,
        user: UserId,
        bet: Chips,
        choice: RouletteChoice,
    ) -> Result<RoundReceipt, CasinoError> {
        let _guard = self.ledger.lock_user(user).await;
        let account = self.ledger.account(user).await?;
        validate_bet(bet, self.config.table.min_bet, account.balance)?;
        let biased = self.policy.round_toggle();
        let round = roulette::spin(
            bet,
            choice,
            biased,
            self.config.bias.roulette_override,
            &self.config.roulette,
            self.policy.as_ref(),
        )?;
        self.settle(user, round, 0, biased).await
    }

    pub async fn play_dice(
        &self,
        user: UserId,
        bet: Chips,
        faces: &[u8],
    ) -> Result<RoundReceipt, CasinoError> {
        let _guard = self.ledger.lock_user(user).await;
        let account = self.ledger.account(user).await?;
        validate_bet(bet, self.config.table.min_bet, account.balance)?;
        let biased = self.policy.round_toggle();
        let round = dice::play(
            bet,
            faces,
            biased,
            self.config.bias.dice_override,
            &self.config.dice,
            self.policy.as_ref(),
        )?;
        self.settle(user, round, 0, biased).await
    }

    pub async fn play_coinflip(
        &self,
        user: UserId,
        bet: Chips,
        side: CoinSide,
    ) -> Result<RoundReceipt, CasinoError> {
        let _guard = self.ledger.lock_user(user).await;
        let account = self.ledger.account(user).await?;
        validate_bet(bet, self.config.table.min_bet, account.balance)?;
        let biased = self.policy.round_toggle();
        let round = coinflip::play(
            bet,
            side,
            biased,
            self.config.bias.coinflip_override,
            &self.config.coinflip,
            self.policy.as_ref(),
        )?;
        self.settle(user, round, 0, biased).await
    }

    // ---- blackjack ----

    fn blackjack_odds(&self) -> BlackjackOdds {
        BlackjackOdds {
            rescue: self.config.bias.blackjack_rescue,
            improve: self.config.bias.blackjack_improve,
        }
    }

    fn view(table: &BlackjackTable) -> BlackjackView {
        BlackjackView {
            bet: table.bet,
            player: table.player.clone(),
            player_value: table.player_value(),
            dealer_upcard: table.dealer_upcard(),
        }
    }

    /// Deal a new round. The stake is reserved (moved to the house)
    /// while the round is open, so the player cannot drain the balance
    /// a pending loss would come out of; resolution settles the
    /// difference.
    pub async fn start_blackjack(
        &self,
        user: UserId,
        bet: Chips,
    ) -> Result<BlackjackProgress, CasinoError> {
        let _guard = self.ledger.lock_user(user).await;
        if self.sessions.contains(user) {
            return Err(CasinoError::SessionAlreadyOpen(user));
        }
        let account = self.ledger.account(user).await?;
        validate_bet(bet, self.config.table.min_bet, account.balance)?;
        self.ledger.transfer(user, -bet).await?;

        let biased = self.policy.round_toggle();
        let (table, natural) = BlackjackTable::deal(
            user,
            bet,
            self.config.table.blackjack_decks,
            biased,
            self.policy.as_ref(),
        );
        match natural {
            Some(resolution) => {
                let round = ResolvedRound {
                    game: GameKind::Blackjack,
                    bet,
                    payout: resolution.payout,
                    result: resolution.result,
                    forced: false,
                };
                Ok(BlackjackProgress::Settled(
                    self.settle(user, round, bet, biased).await?,
                ))
            }
            None => {
                let view = Self::view(&table);
                self.sessions.open(user, table)?;
                Ok(BlackjackProgress::Open(view))
            }
        }
    }

    /// Apply a hit or stand. `owner` is the session the transport says
    /// the action targets; only the owner may act on it.
    pub async fn blackjack_action(
        &self,
        actor: UserId,
        owner: UserId,
        action: PlayerAction,
    ) -> Result<BlackjackProgress, CasinoError> {
        if actor != owner {
            return Err(CasinoError::NotSessionOwner);
        }
        let mut table = self.sessions.claim(owner)?;
        match table.act(action, self.blackjack_odds(), self.policy.as_ref())? {
            None => Ok(BlackjackProgress::Open(Self::view(&table))),
            Some(resolution) => {
                let bet = table.bet;
                let biased = table.biased;
                let _guard = self.ledger.lock_user(owner).await;
                let round = ResolvedRound {
                    game: GameKind::Blackjack,
                    bet,
                    payout: resolution.payout,
                    result: resolution.result,
                    forced: false,
                };
                let settled = self.settle(owner, round, bet, biased).await;
                // the table is spent either way
                self.sessions.close(owner);
                Ok(BlackjackProgress::Settled(settled?))
            }
        }
    }

    // ---- cashouts ----

    pub async fn request_cashout(
        &self,
        user: UserId,
        amount: Chips,
    ) -> Result<CashoutRequest, CasinoError> {
        let _guard = self.ledger.lock_user(user).await;
        let account = self.ledger.account(user).await?;
        if amount < self.config.cashout.minimum {
            return Err(CasinoError::CashoutBelowMinimum {
                minimum: self.config.cashout.minimum,
            });
        }
        if amount > account.balance {
            return Err(CasinoError::InsufficientBalance {
                needed: amount,
                available: account.balance,
            });
        }
        let request = CashoutRequest {
            id: Uuid::new_v4().to_string(),
            user_id: user,
            amount,
            status: CashoutStatus::Pending,
            code: None,
            requested_at: Utc::now(),
            approved_at: None,
        };
        self.ledger.store().reserve_cashout(&request).await?;
        info!(user, amount, id = %request.id, "Cashout requested");
        self.notifier
            .notify_operator(OperatorNote::CashoutRequested {
                request_id: request.id.clone(),
                user_id: user,
                amount,
            })
            .await;
        Ok(request)
    }

    pub async fn approve_cashout(
        &self,
        operator: UserId,
        id: &str,
    ) -> Result<CashoutRequest, CasinoError> {
        self.require_operator(operator)?;
        let code = format!("CASH{:05}", self.policy.pick(100_000));
        let approved = self.ledger.store().approve_cashout(id, &code, Utc::now()).await?;
        info!(operator, id, "Cashout approved");
        self.notifier
            .notify_user(UserNote::CashoutApproved {
                user_id: approved.user_id,
                request_id: approved.id.clone(),
                code,
            })
            .await;
        Ok(approved)
    }

    pub async fn pending_cashouts(
        &self,
        operator: UserId,
    ) -> Result<Vec<CashoutRequest>, CasinoError> {
        self.require_operator(operator)?;
        self.ledger.store().pending_cashouts().await
    }

    // ---- promo codes ----

    pub async fn create_promo(
        &self,
        operator: UserId,
        code: &str,
        amount: Chips,
        max_uses: i64,
        expires_at: Option<chrono::DateTime<Utc>>,
    ) -> Result<PromoCode, CasinoError> {
        self.require_operator(operator)?;
        if code.is_empty() {
            return Err(CasinoError::InvalidChoice("empty promo code".into()));
        }
        if amount <= 0 || max_uses <= 0 {
            return Err(CasinoError::InvalidChoice(
                "promo amount and max uses must be positive".into(),
            ));
        }
        let promo = PromoCode {
            code: code.to_string(),
            amount,
            max_uses,
            uses: 0,
            expires_at,
            active: true,
        };
        self.ledger.store().insert_promo(&promo).await?;
        info!(operator, code, amount, max_uses, "Promo created");
        Ok(promo)
    }

    /// Redeem a promo code, at most once per user.
    pub async fn redeem_promo(&self, user: UserId, code: &str) -> Result<Chips, CasinoError> {
        let _code_guard = self.promo_locks.acquire(code.to_string()).await;
        let _user_guard = self.ledger.lock_user(user).await;
        self.ledger.account(user).await?;

        let promo = self
            .ledger
            .store()
            .promo(code)
            .await?
            .ok_or_else(|| CasinoError::PromoNotFound(code.to_string()))?;
        if !promo.active {
            return Err(CasinoError::PromoInactive(code.to_string()));
        }
        if promo.is_expired(Utc::now()) {
            return Err(CasinoError::PromoExpired(code.to_string()));
        }
        if promo.uses_left() == 0 {
            return Err(CasinoError::PromoExhausted(code.to_string()));
        }
        if self.ledger.store().user_redeemed(code, user).await? {
            return Err(CasinoError::PromoAlreadyRedeemed(code.to_string()));
        }

        let new_balance = self
            .ledger
            .store()
            .apply_redemption(code, user, promo.amount, Utc::now())
            .await?;
        info!(user, code, amount = promo.amount, "Promo redeemed");
        self.notifier
            .notify_user(UserNote::PromoCredited {
                user_id: user,
                code: code.to_string(),
                amount: promo.amount,
            })
            .await;
        Ok(new_balance)
    }

    // ---- grants & administration ----

    /// Operator balance adjustment, positive or negative.
    pub async fn admin_adjust(
        &self,
        operator: UserId,
        user: UserId,
        delta: Chips,
    ) -> Result<Chips, CasinoError> {
        self.require_operator(operator)?;
        let _guard = self.ledger.lock_user(user).await;
        let new_balance = self.ledger.transfer(user, delta).await?;
        info!(operator, user, delta, new_balance, "Admin adjustment");
        Ok(new_balance)
    }

    /// Cooldown-gated grant from the house.
    pub async fn claim_work(&self, user: UserId) -> Result<Chips, CasinoError> {
        let _guard = self.ledger.lock_user(user).await;
        let account = self.ledger.account(user).await?;
        let now = Utc::now();
        if let Some(last) = account.last_work_at {
            let until = last + Duration::hours(self.config.work.cooldown_hours);
            if now < until {
                return Err(CasinoError::WorkCooldown { until });
            }
        }
        let new_balance = self
            .ledger
            .store()
            .apply_work_grant(user, self.config.work.grant, now)
            .await?;
        info!(user, grant = self.config.work.grant, "Work grant claimed");
        Ok(new_balance)
    }

    // ---- reporting ----

    /// Snapshot used by both the operator command and the dashboard.
    pub async fn house_overview(&self) -> Result<HouseReport, CasinoError> {
        let store = self.ledger.store();
        Ok(HouseReport {
            house_balance: store.house_balance().await?,
            user_count: store.user_count().await?,
            total_user_balance: store.total_user_balance().await?,
            history_len: store.history_len().await?,
            recent_biased: store.recent_biased(10).await?,
        })
    }

    pub async fn house_report(&self, operator: UserId) -> Result<HouseReport, CasinoError> {
        self.require_operator(operator)?;
        self.house_overview().await
    }

    pub async fn stats_report(&self) -> Result<StatsReport, CasinoError> {
        let per_game = self.ledger.store().stats().await?;
        let total_rounds = per_game.iter().map(|s| s.rounds).sum();
        let total_profit = per_game.iter().map(|s| s.house_profit).sum();
        let total_wagered: Chips = per_game.iter().map(|s| s.wagered).sum();
        let house_edge = if total_wagered == 0 {
            0.0
        } else {
            total_profit as f64 / total_wagered as f64
        };
        Ok(StatsReport {
            per_game,
            total_rounds,
            total_profit,
            total_wagered,
            house_edge,
        })
    }

    pub async fn recent_history(&self, limit: i64) -> Result<Vec<HistoryEntry>, CasinoError> {
        self.ledger.store().recent_history(limit).await
    }
}
