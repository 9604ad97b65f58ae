//! Blackjack state machine.
//!
//! One table per open session. Cards are stored by value: aces as 1,
//! face cards as 10. The table is pure with respect to balances; the
//! service settles the resolution through the ledger.
//!
//! Bias hooks, active only on rounds where the round toggle fired:
//! at deal time a weak dealer upcard pair gets its hole card swapped
//! for a strong card; at resolution a busting dealer may be rescued
//! with a small card, and a losing dealer may have its last card
//! improved to match or beat the player.

use crate::bias::BiasPolicy;
use crate::types::{CasinoError, Chips, UserId};

/// Cards a biased deal may slip under a weak dealer hand.
const STRONG_CARDS: [u8; 5] = [6, 7, 8, 9, 10];

/// Dealer stands at this total and above (soft 17 included).
const DEALER_STAND: u32 = 17;

/// Resolution-time bias probabilities.
#[derive(Debug, Clone, Copy)]
pub struct BlackjackOdds {
    pub rescue: f64,
    pub improve: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerAction {
    Hit,
    Stand,
}

impl PlayerAction {
    pub fn parse(token: &str) -> Result<Self, CasinoError> {
        match token {
            "hit" => Ok(Self::Hit),
            "stand" => Ok(Self::Stand),
            other => Err(CasinoError::InvalidChoice(format!("unknown action: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TableState {
    PlayerTurn,
    Resolved,
}

/// Final outcome of a blackjack round, before settlement.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub result: String,
    /// Net balance change for the player.
    pub payout: Chips,
}

/// Best value of a hand: aces count 1, then upgrade to 11 one at a
/// time while the total stays at or below 11.
pub fn hand_value(cards: &[u8]) -> u32 {
    let mut total: u32 = cards.iter().map(|&c| c as u32).sum();
    let aces = cards.iter().filter(|&&c| c == 1).count();
    for _ in 0..aces {
        if total <= 11 {
            total += 10;
        }
    }
    total
}

#[derive(Debug)]
pub struct BlackjackTable {
    pub user_id: UserId,
    pub bet: Chips,
    pub biased: bool,
    shoe: Vec<u8>,
    decks: usize,
    pub player: Vec<u8>,
    pub dealer: Vec<u8>,
    state: TableState,
}

impl BlackjackTable {
    /// Deal a fresh round. Returns the table and, when the player is
    /// dealt a natural, the immediate resolution.
    pub fn deal(
        user_id: UserId,
        bet: Chips,
        decks: usize,
        biased: bool,
        policy: &dyn BiasPolicy,
    ) -> (Self, Option<Resolution>) {
        let mut shoe = build_shoe(decks);
        policy.shuffle(&mut shoe);

        let mut table = Self {
            user_id,
            bet,
            biased,
            shoe,
            decks,
            player: Vec::new(),
            dealer: Vec::new(),
            state: TableState::PlayerTurn,
        };
        let p1 = table.draw(policy);
        let p2 = table.draw(policy);
        let d1 = table.draw(policy);
        let d2 = table.draw(policy);
        table.player = vec![p1, p2];
        table.dealer = vec![d1, d2];

        // A weak dealer start gets a strong hole card on biased rounds.
        if biased && hand_value(&table.dealer) < DEALER_STAND {
            table.dealer[1] = STRONG_CARDS[policy.pick(STRONG_CARDS.len())];
        }

        let resolution = if hand_value(&table.player) == 21 {
            Some(table.resolve_natural())
        } else {
            None
        };
        (table, resolution)
    }

    pub fn player_value(&self) -> u32 {
        hand_value(&self.player)
    }

    pub fn dealer_value(&self) -> u32 {
        hand_value(&self.dealer)
    }

    /// The card shown to the player while the round is open.
    pub fn dealer_upcard(&self) -> u8 {
        self.dealer[0]
    }

    pub fn is_resolved(&self) -> bool {
        self.state == TableState::Resolved
    }

    /// Apply a player action. `None` means the round is still open.
    pub fn act(
        &mut self,
        action: PlayerAction,
        odds: BlackjackOdds,
        policy: &dyn BiasPolicy,
    ) -> Result<Option<Resolution>, CasinoError> {
        if self.state == TableState::Resolved {
            return Err(CasinoError::Corrupt("action on a resolved table".into()));
        }
        match action {
            PlayerAction::Hit => {
                let card = self.draw(policy);
                self.player.push(card);
                let value = self.player_value();
                if value > 21 {
                    self.state = TableState::Resolved;
                    Ok(Some(Resolution {
                        result: format!("BUST player={value}"),
                        payout: -self.bet,
                    }))
                } else if value == 21 {
                    // nothing left to decide, stand automatically
                    Ok(Some(self.resolve(odds, policy)))
                } else {
                    Ok(None)
                }
            }
            PlayerAction::Stand => Ok(Some(self.resolve(odds, policy))),
        }
    }

    fn resolve_natural(&mut self) -> Resolution {
        self.state = TableState::Resolved;
        if hand_value(&self.dealer) == 21 && self.dealer.len() == 2 {
            Resolution {
                result: "PUSH blackjack both".into(),
                payout: 0,
            }
        } else {
            Resolution {
                result: "BLACKJACK player=21".into(),
                payout: self.bet * 3 / 2,
            }
        }
    }

    /// Dealer plays out, bias hooks apply, hands are compared.
    fn resolve(&mut self, odds: BlackjackOdds, policy: &dyn BiasPolicy) -> Resolution {
        self.state = TableState::Resolved;
        let player = self.player_value();

        while hand_value(&self.dealer) < DEALER_STAND {
            let card = self.draw(policy);
            self.dealer.push(card);
        }

        if self.biased && hand_value(&self.dealer) > 21 && policy.chance(odds.rescue) {
            // before the last draw the dealer held at most 16, so any
            // card up to 5 keeps the hand at or below 21
            let last = self.dealer.len() - 1;
            self.dealer[last] = 1 + policy.pick(5) as u8;
        }

        let dealer = hand_value(&self.dealer);
        if self.biased && dealer <= 21 && dealer < player && policy.chance(odds.improve) {
            let last = self.dealer.len() - 1;
            let base = hand_value(&self.dealer[..last]);
            let needed = player as i64 - base as i64;
            if (1..=10).contains(&needed) {
                self.dealer[last] = needed as u8;
            }
        }

        let dealer = hand_value(&self.dealer);
        let (result, payout) = if dealer > 21 {
            (format!("WIN dealer_bust={dealer}"), self.bet)
        } else if player > dealer {
            (format!("WIN player={player} dealer={dealer}"), self.bet)
        } else if player < dealer {
            (format!("LOSS player={player} dealer={dealer}"), -self.bet)
        } else {
            (format!("PUSH player={player} dealer={dealer}"), 0)
        };
        Resolution { result, payout }
    }

    fn draw(&mut self, policy: &dyn BiasPolicy) -> u8 {
        if self.shoe.is_empty() {
            self.shoe = build_shoe(self.decks);
            policy.shuffle(&mut self.shoe);
        }
        self.shoe.pop().unwrap_or(10)
    }
}

/// One shoe: per deck and suit, ace through nine plus four ten-valued
/// cards (ten, jack, queen, king).
fn build_shoe(decks: usize) -> Vec<u8> {
    let mut shoe = Vec::with_capacity(decks * 52);
    for _ in 0..decks {
        for _ in 0..4 {
            shoe.extend(1..=9);
            shoe.extend([10, 10, 10, 10]);
        }
    }
    shoe
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bias::MockBiasPolicy;

    const ODDS: BlackjackOdds = BlackjackOdds {
        rescue: 0.85,
        improve: 0.75,
    };

    /// Policy that stacks the shoe so pops yield `cards` in order.
    fn stacked(cards: Vec<u8>) -> MockBiasPolicy {
        let mut policy = MockBiasPolicy::new();
        policy.expect_shuffle().returning(move |shoe| {
            let mut deck: Vec<u8> = cards.iter().rev().copied().collect();
            std::mem::swap(shoe, &mut deck);
        });
        policy.expect_chance().return_const(false);
        policy.expect_pick().returning(|_| 0);
        policy
    }

    #[test]
    fn test_hand_values() {
        assert_eq!(hand_value(&[1, 10]), 21);
        assert_eq!(hand_value(&[1, 1, 9]), 21);
        assert_eq!(hand_value(&[10, 10, 2]), 22);
        assert_eq!(hand_value(&[1]), 11);
        assert_eq!(hand_value(&[1, 1]), 12);
        assert_eq!(hand_value(&[5, 6]), 11);
    }

    #[test]
    fn test_shoe_composition() {
        let shoe = build_shoe(6);
        assert_eq!(shoe.len(), 6 * 52);
        let tens = shoe.iter().filter(|&&c| c == 10).count();
        assert_eq!(tens, 6 * 16);
        let aces = shoe.iter().filter(|&&c| c == 1).count();
        assert_eq!(aces, 6 * 4);
    }

    #[test]
    fn test_natural_blackjack_pays_three_to_two_floored() {
        // player A + 10, dealer 9 + 8
        let policy = stacked(vec![1, 10, 9, 8]);
        let (table, resolution) = BlackjackTable::deal(1, 101, 1, false, &policy);
        assert!(table.is_resolved());
        let resolution = resolution.unwrap();
        assert_eq!(resolution.payout, 151);
        assert!(resolution.result.contains("BLACKJACK"));
    }

    #[test]
    fn test_both_naturals_push() {
        let policy = stacked(vec![1, 10, 10, 1]);
        let (_, resolution) = BlackjackTable::deal(1, 100, 1, false, &policy);
        let resolution = resolution.unwrap();
        assert_eq!(resolution.payout, 0);
        assert!(resolution.result.contains("PUSH"));
    }

    #[test]
    fn test_player_bust_loses_bet() {
        // player 10 + 6, dealer 10 + 7, hit draws 10
        let policy = stacked(vec![10, 6, 10, 7, 10]);
        let (mut table, resolution) = BlackjackTable::deal(1, 100, 1, false, &policy);
        assert!(resolution.is_none());
        let resolution = table.act(PlayerAction::Hit, ODDS, &policy).unwrap().unwrap();
        assert_eq!(resolution.payout, -100);
        assert!(resolution.result.contains("BUST"));
        assert!(table.is_resolved());
    }

    #[test]
    fn test_hit_below_21_keeps_round_open() {
        let policy = stacked(vec![5, 6, 10, 7, 2]);
        let (mut table, _) = BlackjackTable::deal(1, 100, 1, false, &policy);
        let resolution = table.act(PlayerAction::Hit, ODDS, &policy).unwrap();
        assert!(resolution.is_none());
        assert_eq!(table.player_value(), 13);
    }

    #[test]
    fn test_hit_to_21_stands_automatically() {
        // player 10 + 6 then draws 5 for 21; dealer 10 + 8 stands at 18
        let policy = stacked(vec![10, 6, 10, 8, 5]);
        let (mut table, _) = BlackjackTable::deal(1, 100, 1, false, &policy);
        let resolution = table.act(PlayerAction::Hit, ODDS, &policy).unwrap().unwrap();
        assert_eq!(resolution.payout, 100);
        assert!(resolution.result.contains("WIN"));
    }

    #[test]
    fn test_dealer_draws_to_seventeen() {
        // player 10 + 9 stands on 19; dealer 10 + 2 draws 5 for 17
        let policy = stacked(vec![10, 9, 10, 2, 5]);
        let (mut table, _) = BlackjackTable::deal(1, 100, 1, false, &policy);
        let resolution = table.act(PlayerAction::Stand, ODDS, &policy).unwrap().unwrap();
        assert_eq!(table.dealer_value(), 17);
        assert_eq!(resolution.payout, 100);
    }

    #[test]
    fn test_dealer_bust_pays_player() {
        // dealer 10 + 6 draws 10 and busts
        let policy = stacked(vec![10, 8, 10, 6, 10]);
        let (mut table, _) = BlackjackTable::deal(1, 100, 1, false, &policy);
        let resolution = table.act(PlayerAction::Stand, ODDS, &policy).unwrap().unwrap();
        assert_eq!(resolution.payout, 100);
        assert!(resolution.result.contains("dealer_bust"));
    }

    #[test]
    fn test_push_on_equal_totals() {
        // player 10 + 8, dealer 10 + 8
        let policy = stacked(vec![10, 8, 10, 8]);
        let (mut table, _) = BlackjackTable::deal(1, 100, 1, false, &policy);
        let resolution = table.act(PlayerAction::Stand, ODDS, &policy).unwrap().unwrap();
        assert_eq!(resolution.payout, 0);
    }

    #[test]
    fn test_biased_deal_swaps_weak_hole_card() {
        // dealer 2 + 3 is weak; pick(5) -> 0 selects the 6
        let policy = stacked(vec![10, 8, 2, 3]);
        let (table, _) = BlackjackTable::deal(1, 100, 1, true, &policy);
        assert_eq!(table.dealer, vec![2, 6]);
    }

    #[test]
    fn test_biased_deal_leaves_strong_dealer_alone() {
        let policy = stacked(vec![10, 8, 10, 7]);
        let (table, _) = BlackjackTable::deal(1, 100, 1, true, &policy);
        assert_eq!(table.dealer, vec![10, 7]);
    }

    #[test]
    fn test_rescue_replaces_busting_card() {
        // dealer 10 + 7 stands, so stack a weak dealer that busts:
        // dealer 10 + 6 draws 10 -> 26, rescue fires, pick(5) -> 0
        // replaces the 10 with an ace for 17
        let mut policy = MockBiasPolicy::new();
        let cards = vec![10u8, 8, 10, 6, 10];
        policy.expect_shuffle().returning(move |shoe| {
            *shoe = cards.iter().rev().copied().collect();
        });
        policy.expect_pick().returning(|_| 0);
        policy
            .expect_chance()
            .returning(|q| (q - ODDS.rescue).abs() < 1e-9);
        let (mut table, _) = BlackjackTable::deal(1, 100, 1, true, &policy);
        // deal-time swap: dealer 10 + 6 has value 16, hole card becomes 6 again
        let resolution = table.act(PlayerAction::Stand, ODDS, &policy).unwrap().unwrap();
        assert!(table.dealer_value() <= 21);
        assert_eq!(*table.dealer.last().unwrap(), 1);
        // player 18 vs dealer 17 after rescue
        assert_eq!(resolution.payout, 100);
    }

    #[test]
    fn test_improve_lifts_losing_dealer_to_player_total() {
        // player 10 + 9 = 19; dealer 10 + 7 = 17 would lose
        let cards = vec![10u8, 9, 10, 7];
        let mut policy = MockBiasPolicy::new();
        policy.expect_shuffle().returning(move |shoe| {
            *shoe = cards.iter().rev().copied().collect();
        });
        policy.expect_pick().returning(|_| 0);
        policy
            .expect_chance()
            .returning(|q| (q - ODDS.improve).abs() < 1e-9);
        let (mut table, _) = BlackjackTable::deal(1, 100, 1, true, &policy);
        let resolution = table.act(PlayerAction::Stand, ODDS, &policy).unwrap().unwrap();
        // last card lifted from 7 to 9 to match the player
        assert_eq!(table.dealer_value(), 19);
        assert_eq!(resolution.payout, 0);
        assert!(resolution.result.contains("PUSH"));
    }

    #[test]
    fn test_improve_capped_at_ten_leaves_hand() {
        // player 21 in three cards; dealer 10 + 7 = 17 would need a
        // 11-valued lift, which no card provides
        let cards = vec![10u8, 6, 10, 7, 5];
        let mut policy = MockBiasPolicy::new();
        policy.expect_shuffle().returning(move |shoe| {
            *shoe = cards.iter().rev().copied().collect();
        });
        policy.expect_pick().returning(|_| 0);
        policy.expect_chance().return_const(true);
        let (mut table, _) = BlackjackTable::deal(1, 100, 1, true, &policy);
        // player 16 draws 5 for 21 and stands automatically
        let resolution = table.act(PlayerAction::Hit, ODDS, &policy).unwrap().unwrap();
        assert_eq!(table.dealer, vec![10, 7]);
        assert_eq!(resolution.payout, 100);
    }

    #[test]
    fn test_action_parse() {
        assert_eq!(PlayerAction::parse("hit").unwrap(), PlayerAction::Hit);
        assert_eq!(PlayerAction::parse("stand").unwrap(), PlayerAction::Stand);
        assert!(PlayerAction::parse("double").is_err());
    }
}
