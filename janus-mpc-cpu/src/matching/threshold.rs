//! Threshold tests: shared distances or shared scores to shared match bits.

use crate::{
    error::Error,
    execution::{player::Role, session::Session},
    matching::distance::DistanceShare,
    protocol::{
        binary::{input_ints, select_many},
        ops::{
            add_many, ge_many, is_zero_many, lt_const_many, lt_many, scale_and_shift_many,
            sub_many, Rounding,
        },
    },
    shares::{BitShare, IntShare},
};
use eyre::Result;
use janus_mpc_common::{
    config::{BioSetting, ThresholdTest},
    FIXED_POINT_FRAC_BITS, SCORE_BITS,
};
use tracing::instrument;

/// `distance < threshold` for every distance.
pub async fn distance_below(
    session: &mut Session,
    distances: &[DistanceShare],
    threshold: u64,
) -> Result<Vec<BitShare>> {
    let distances: Vec<IntShare> = distances.iter().map(|d| d.distance.clone()).collect();
    lt_const_many(session, &distances, threshold).await
}

/// `distance / mask_count < numerator / 2^7`, evaluated as
/// `distance < ceil(mask_count * numerator / 2^7)`. A zero mask count never
/// matches.
#[instrument(level = "trace", target = "janus::network", skip_all, fields(batch = distances.len()))]
pub async fn masked_distance_below(
    session: &mut Session,
    distances: &[DistanceShare],
    numerator: u64,
) -> Result<Vec<BitShare>> {
    let mut dist = Vec::with_capacity(distances.len());
    let mut mask_counts = Vec::with_capacity(distances.len());
    for d in distances {
        let mask_count = d
            .mask_count
            .clone()
            .ok_or_else(|| Error::InvalidInput("masked distance without a mask count".into()))?;
        dist.push(d.distance.clone());
        mask_counts.push(mask_count);
    }
    let scaled = scale_and_shift_many(
        session,
        &mask_counts,
        numerator,
        FIXED_POINT_FRAC_BITS,
        Rounding::Ceil,
    )
    .await?;
    lt_many(session, &dist, &scaled).await
}

/// Reconstructs `(s1 + s2) mod P` inside the circuit. Both shares are below
/// `P < 2^27`, so their sum fits [`SCORE_BITS`] bits and at most one
/// subtraction of `P` is needed.
#[instrument(level = "trace", target = "janus::network", skip_all, fields(batch = s1.len()))]
pub async fn reduce_mod_prime(
    session: &mut Session,
    s1: &[IntShare],
    s2: &[IntShare],
    prime_mod: u64,
) -> Result<Vec<IntShare>> {
    let role = session.own_role();
    let sum = add_many(session, s1, s2).await?;
    let primes: Vec<IntShare> = sum
        .iter()
        .map(|_| IntShare::from_const(prime_mod, SCORE_BITS, role))
        .collect();
    let overflow = ge_many(session, &sum, &primes).await?;
    let zeros = vec![IntShare::zero(SCORE_BITS); sum.len()];
    let correction = select_many(session, &overflow, &primes, &zeros).await?;
    sub_many(session, &sum, &correction).await
}

/// Classifies reconstructed scores.
pub async fn score_matches(
    session: &mut Session,
    scores: &[IntShare],
    test: ThresholdTest,
) -> Result<Vec<BitShare>> {
    match test {
        ThresholdTest::LessThan(threshold) => lt_const_many(session, scores, threshold).await,
        ThresholdTest::HighBitsZero { top_bits } => {
            let top: Vec<IntShare> = scores
                .iter()
                .map(|s| s.clone().shr(SCORE_BITS - top_bits))
                .collect();
            is_zero_many(session, &top).await
        }
    }
}

/// Threshold-only path: every party holds one additive share modulo the
/// public prime of every template's similarity score.
#[instrument(level = "debug", skip_all, fields(db_size = setting.db_size()))]
pub async fn shared_scores_match(
    session: &mut Session,
    setting: &BioSetting,
    own_scores: &[u64],
) -> Result<Vec<BitShare>> {
    let n = setting.db_size();
    if own_scores.len() != n {
        return Err(Error::InvalidInput(format!(
            "expected {n} score shares, got {}",
            own_scores.len()
        ))
        .into());
    }
    let prime_mod = setting.prime_mod();
    if let Some(bad) = own_scores.iter().find(|s| **s >= prime_mod) {
        return Err(Error::InvalidInput(format!("score share {bad} is not below {prime_mod}")).into());
    }
    let test = setting.score_threshold_test().map_err(Error::from)?;

    let me = session.own_role();
    let mine = Some(own_scores);
    let s1 = input_ints(
        session,
        Role::RegistrationStation,
        mine.filter(|_| me == Role::RegistrationStation),
        n,
        SCORE_BITS,
    )?;
    let s2 = input_ints(
        session,
        Role::BiometricProvider,
        mine.filter(|_| me == Role::BiometricProvider),
        n,
        SCORE_BITS,
    )?;
    let scores = reduce_mod_prime(session, &s1, &s2, prime_mod).await?;
    score_matches(session, &scores, test).await
}
