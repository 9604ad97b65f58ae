//! Single die roll against a player-chosen set of faces.
//!
//! The player covers one to three distinct faces; smaller selections
//! pay a larger multiplier on the stake.

use crate::bias::{skewed_draw, BiasPolicy};
use crate::config::DiceConfig;
use crate::games::ResolvedRound;
use crate::types::{CasinoError, Chips, GameKind};

const FACES: [u8; 6] = [1, 2, 3, 4, 5, 6];

fn validate_faces(faces: &[u8]) -> Result<(), CasinoError> {
    if faces.is_empty() || faces.len() > 3 {
        return Err(CasinoError::InvalidChoice(format!(
            "pick 1 to 3 faces, got {}",
            faces.len()
        )));
    }
    for (i, face) in faces.iter().enumerate() {
        if !(1..=6).contains(face) {
            return Err(CasinoError::InvalidChoice(format!("face out of range: {face}")));
        }
        if faces[..i].contains(face) {
            return Err(CasinoError::InvalidChoice(format!("duplicate face: {face}")));
        }
    }
    Ok(())
}

/// Roll the die. `biased` is the round-level toggle; `override_q` the
/// per-game override probability.
pub fn play(
    bet: Chips,
    faces: &[u8],
    biased: bool,
    override_q: f64,
    cfg: &DiceConfig,
    policy: &dyn BiasPolicy,
) -> Result<ResolvedRound, CasinoError> {
    validate_faces(faces)?;
    let multiplier = cfg
        .multiplier(faces.len())
        .ok_or_else(|| CasinoError::InvalidChoice(format!("unplayable selection size {}", faces.len())))?;

    let losing: Vec<u8> = FACES.iter().copied().filter(|f| !faces.contains(f)).collect();
    let (roll, forced) = skewed_draw(&FACES, &losing, biased, override_q, policy);

    let won = faces.contains(&roll);
    let payout = if won { bet * (multiplier - 1) } else { -bet };
    let result = format!("{} roll={roll}", if won { "WIN" } else { "LOSS" });
    Ok(ResolvedRound {
        game: GameKind::Dice,
        bet,
        payout,
        result,
        forced,
    })
}
