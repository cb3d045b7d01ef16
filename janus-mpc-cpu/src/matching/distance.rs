//! Oblivious distance engines.
//!
//! Each engine turns one party's view of the shared database (and, on the
//! registration station, the plaintext query) into one shared distance per
//! enrolled template, then into one shared match bit per template.

use crate::{
    error::Error,
    execution::{player::Role, session::Session},
    matching::{threshold, PartyInput},
    protocol::{
        binary::{and_many, input_bits, input_ints},
        ops::{add_many, mul_many, popcount_many, sub_many, sum_many},
    },
    shares::{BitShare, IntShare},
};
use async_trait::async_trait;
use eyre::Result;
use itertools::izip;
use janus_mpc_common::{
    config::{BioSetting, DistanceMetric},
    template::BiometricTemplate,
    HAMMING_DISTANCE_BITS,
};
use tracing::instrument;

/// Shared distance of one enrolled template to the query.
#[derive(Clone, Debug)]
pub struct DistanceShare {
    pub distance: IntShare,
    /// Number of slots valid in both masks. Only masked metrics set it.
    pub mask_count: Option<IntShare>,
}

impl DistanceShare {
    pub fn new(distance: IntShare) -> Self {
        Self {
            distance,
            mask_count: None,
        }
    }

    pub fn masked(distance: IntShare, mask_count: IntShare) -> Self {
        Self {
            distance,
            mask_count: Some(mask_count),
        }
    }
}

#[async_trait]
pub trait DistanceEngine: Send + Sync {
    fn metric(&self) -> DistanceMetric;

    /// One distance per enrolled template, in database order.
    async fn compute_distances(
        &self,
        session: &mut Session,
        setting: &BioSetting,
        input: &PartyInput,
    ) -> Result<Vec<DistanceShare>>;

    /// One match bit per distance.
    async fn threshold_test(
        &self,
        session: &mut Session,
        setting: &BioSetting,
        distances: &[DistanceShare],
    ) -> Result<Vec<BitShare>>;
}

/// Picks the engine for `metric`.
pub fn engine_for(metric: DistanceMetric) -> Box<dyn DistanceEngine> {
    match metric {
        DistanceMetric::Hamming => Box::new(HammingEngine),
        DistanceMetric::MaskedHamming => Box::new(MaskedHammingEngine),
        DistanceMetric::Euclidean => Box::new(EuclideanEngine),
    }
}

/// Registration station: its share slots XORed with the query. Biometric
/// provider: its share slots. XORing both parties' inputs yields
/// `enrolled ^ query` per slot.
fn xor_slot_inputs(session: &Session, input: &PartyInput) -> Result<Vec<bool>> {
    let mut bits = Vec::with_capacity(input.database.len() * input.template_size());
    match (session.own_role(), &input.query) {
        (Role::RegistrationStation, Some(query)) => {
            for share in &input.database {
                bits.extend(izip!(share.slots(), query.slots()).map(|(s, q)| (s ^ q) & 1 == 1));
            }
        }
        (Role::RegistrationStation, None) => {
            return Err(Error::InvalidInput("the registration station needs a query".into()).into())
        }
        (Role::BiometricProvider, _) => {
            for share in &input.database {
                bits.extend(share.slots().iter().map(|s| s & 1 == 1));
            }
        }
    }
    Ok(bits)
}

fn owned<T>(me: Role, owner: Role, values: &[T]) -> Option<&[T]> {
    (me == owner).then_some(values)
}

/// Shares both parties' slot bits and XORs them locally.
fn shared_slot_diffs(
    session: &mut Session,
    setting: &BioSetting,
    input: &PartyInput,
) -> Result<Vec<BitShare>> {
    let len = setting.db_size() * setting.template_size();
    let me = session.own_role();
    let own = xor_slot_inputs(session, input)?;
    let rs = input_bits(
        session,
        Role::RegistrationStation,
        owned(me, Role::RegistrationStation, &own),
        len,
    )?;
    let bp = input_bits(
        session,
        Role::BiometricProvider,
        owned(me, Role::BiometricProvider, &own),
        len,
    )?;
    Ok(izip!(rs, bp).map(|(a, b)| a ^ b).collect())
}

fn template_groups(bits: &[BitShare], template_size: usize) -> Vec<Vec<BitShare>> {
    bits.chunks(template_size).map(<[BitShare]>::to_vec).collect()
}

/// Popcount of the XOR of the two reconstructed templates.
pub struct HammingEngine;

#[async_trait]
impl DistanceEngine for HammingEngine {
    fn metric(&self) -> DistanceMetric {
        DistanceMetric::Hamming
    }

    #[instrument(level = "debug", skip_all, fields(db_size = setting.db_size()))]
    async fn compute_distances(
        &self,
        session: &mut Session,
        setting: &BioSetting,
        input: &PartyInput,
    ) -> Result<Vec<DistanceShare>> {
        let diffs = shared_slot_diffs(session, setting, input)?;
        let groups = template_groups(&diffs, setting.template_size());
        let counts = popcount_many(session, &groups, HAMMING_DISTANCE_BITS).await?;
        Ok(counts.into_iter().map(DistanceShare::new).collect())
    }

    async fn threshold_test(
        &self,
        session: &mut Session,
        setting: &BioSetting,
        distances: &[DistanceShare],
    ) -> Result<Vec<BitShare>> {
        threshold::distance_below(session, distances, setting.threshold()).await
    }
}

/// Hamming distance restricted to slots valid in the enrolled mask and in the
/// query mask, plus the number of such slots.
pub struct MaskedHammingEngine;

impl MaskedHammingEngine {
    fn mask_inputs(
        session: &Session,
        input: &PartyInput,
    ) -> Result<(Vec<bool>, Option<Vec<bool>>)> {
        let mut enrolled = Vec::with_capacity(input.database.len() * input.template_size());
        for share in &input.database {
            let mask = share
                .mask()
                .ok_or_else(|| Error::InvalidInput("enrolled share without a mask".into()))?;
            enrolled.extend_from_slice(mask);
        }
        let query_mask = match (session.own_role(), &input.query) {
            (Role::RegistrationStation, Some(query)) => Some(
                query
                    .mask()
                    .ok_or_else(|| Error::InvalidInput("query without a mask".into()))?
                    .to_vec(),
            ),
            _ => None,
        };
        Ok((enrolled, query_mask))
    }
}

#[async_trait]
impl DistanceEngine for MaskedHammingEngine {
    fn metric(&self) -> DistanceMetric {
        DistanceMetric::MaskedHamming
    }

    #[instrument(level = "debug", skip_all, fields(db_size = setting.db_size()))]
    async fn compute_distances(
        &self,
        session: &mut Session,
        setting: &BioSetting,
        input: &PartyInput,
    ) -> Result<Vec<DistanceShare>> {
        let ts = setting.template_size();
        let len = setting.db_size() * ts;
        let diffs = shared_slot_diffs(session, setting, input)?;

        let me = session.own_role();
        let (enrolled, query_mask) = Self::mask_inputs(session, input)?;
        let rs_mask = input_bits(
            session,
            Role::RegistrationStation,
            owned(me, Role::RegistrationStation, &enrolled),
            len,
        )?;
        let bp_mask = input_bits(
            session,
            Role::BiometricProvider,
            owned(me, Role::BiometricProvider, &enrolled),
            len,
        )?;
        let query_mask = input_bits(
            session,
            Role::RegistrationStation,
            query_mask.as_deref(),
            ts,
        )?;

        let enrolled_mask: Vec<BitShare> = izip!(rs_mask, bp_mask).map(|(a, b)| a ^ b).collect();
        let query_mask: Vec<BitShare> = query_mask.iter().cycle().take(len).copied().collect();
        let mask = and_many(session, &enrolled_mask, &query_mask).await?;
        let masked_diffs = and_many(session, &diffs, &mask).await?;

        // distances and mask counts share one adder tree
        let mut groups = template_groups(&masked_diffs, ts);
        groups.extend(template_groups(&mask, ts));
        let mut counts = popcount_many(session, &groups, HAMMING_DISTANCE_BITS).await?;
        let mask_counts = counts.split_off(setting.db_size());
        Ok(izip!(counts, mask_counts)
            .map(|(d, m)| DistanceShare::masked(d, m))
            .collect())
    }

    async fn threshold_test(
        &self,
        session: &mut Session,
        setting: &BioSetting,
        distances: &[DistanceShare],
    ) -> Result<Vec<BitShare>> {
        threshold::masked_distance_below(session, distances, setting.fraction_numerator()).await
    }
}

/// Sum of squared slot differences between the reconstructed enrolled
/// template and the query.
pub struct EuclideanEngine;

#[async_trait]
impl DistanceEngine for EuclideanEngine {
    fn metric(&self) -> DistanceMetric {
        DistanceMetric::Euclidean
    }

    #[instrument(level = "debug", skip_all, fields(db_size = setting.db_size()))]
    async fn compute_distances(
        &self,
        session: &mut Session,
        setting: &BioSetting,
        input: &PartyInput,
    ) -> Result<Vec<DistanceShare>> {
        let me = session.own_role();
        let k = setting.bits_per_slot() as usize;
        let ts = setting.template_size();
        let count = setting.db_size() * ts;
        let own: Vec<u64> = input
            .database
            .iter()
            .flat_map(|share| share.slots().iter().map(|s| u64::from(*s)))
            .collect();
        let query: Option<Vec<u64>> = match (session.own_role(), &input.query) {
            (Role::RegistrationStation, Some(q)) => {
                Some(q.slots().iter().map(|s| u64::from(*s)).collect())
            }
            (Role::RegistrationStation, None) => {
                return Err(
                    Error::InvalidInput("the registration station needs a query".into()).into(),
                )
            }
            (Role::BiometricProvider, _) => None,
        };

        let rs = input_ints(
            session,
            Role::RegistrationStation,
            owned(me, Role::RegistrationStation, &own),
            count,
            k,
        )?;
        let bp = input_ints(
            session,
            Role::BiometricProvider,
            owned(me, Role::BiometricProvider, &own),
            count,
            k,
        )?;
        let query = input_ints(session, Role::RegistrationStation, query.as_deref(), ts, k)?;

        // additive shares mod 2^k
        let enrolled = add_many(session, &rs, &bp).await?;
        let enrolled: Vec<IntShare> = enrolled.into_iter().map(|v| v.resize(k + 1)).collect();
        let query: Vec<IntShare> = query
            .iter()
            .cycle()
            .take(count)
            .map(|v| v.clone().resize(k + 1))
            .collect();
        let diffs: Vec<IntShare> = sub_many(session, &enrolled, &query)
            .await?
            .into_iter()
            .map(|v| v.sign_extend(2 * k + 2))
            .collect();
        let squares = mul_many(session, &diffs, &diffs).await?;

        let width = setting.euclidean_distance_bits();
        let mut squares = squares.into_iter().map(|v| v.resize(width));
        let groups = (0..setting.db_size())
            .map(|_| squares.by_ref().take(ts).collect())
            .collect();
        let sums = sum_many(session, groups, width).await?;
        Ok(sums.into_iter().map(DistanceShare::new).collect())
    }

    async fn threshold_test(
        &self,
        session: &mut Session,
        setting: &BioSetting,
        distances: &[DistanceShare],
    ) -> Result<Vec<BitShare>> {
        threshold::distance_below(session, distances, setting.threshold()).await
    }
}

/// Plaintext distances of `query` to every template, in the same
/// representation the engines produce. Used to check engines.
pub fn plain_distances(
    setting: &BioSetting,
    query: &BiometricTemplate,
    database: &[BiometricTemplate],
) -> Vec<(u64, Option<u64>)> {
    database
        .iter()
        .map(|t| match setting.metric() {
            DistanceMetric::Hamming => (query.hamming_distance(t), None),
            DistanceMetric::Euclidean => (query.euclidean_distance(t), None),
            DistanceMetric::MaskedHamming => {
                let (d, m) = query.masked_hamming_distance(t);
                (d, Some(m))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        database_generators::{generate_database, split_inputs},
        execution::local::LocalRuntime,
        protocol::binary::open_ints,
    };
    use janus_mpc_common::config::BioKind;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use rstest::rstest;
    use std::sync::Arc;

    async fn opened_distances(setting: BioSetting, seed: u64) -> Result<()> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let (database, query) = generate_database(&mut rng, &setting, Some((1, 5)));
        let expected = plain_distances(&setting, &query, &database);
        let inputs = Arc::new(split_inputs(&mut rng, &database, &query));
        let setting = Arc::new(setting);

        let runtime = LocalRuntime::mock_setup().await?;
        let res = runtime
            .run(|mut session| {
                let inputs = inputs.clone();
                let setting = setting.clone();
                async move {
                    let input = &inputs[session.own_role().index()];
                    let engine = engine_for(setting.metric());
                    let dist = engine
                        .compute_distances(&mut session, &setting, input)
                        .await?;
                    let d: Vec<IntShare> = dist.iter().map(|d| d.distance.clone()).collect();
                    let m: Vec<IntShare> =
                        dist.iter().filter_map(|d| d.mask_count.clone()).collect();
                    let d = open_ints(&mut session, &d).await?;
                    let m = open_ints(&mut session, &m).await?;
                    Ok::<_, eyre::Report>((d, m))
                }
            })
            .await?;

        for (d, m) in res {
            let got: Vec<(u64, Option<u64>)> = if m.is_empty() {
                d.into_iter().map(|d| (d, None)).collect()
            } else {
                izip!(d, m).map(|(d, m)| (d, Some(m))).collect()
            };
            assert_eq!(got, expected);
        }
        Ok(())
    }

    #[rstest]
    #[case::hamming(DistanceMetric::Hamming, BioKind::Iris, 1)]
    #[case::masked(DistanceMetric::MaskedHamming, BioKind::Iris, 1)]
    #[case::euclidean_3bit(DistanceMetric::Euclidean, BioKind::Finger, 3)]
    #[case::euclidean_8bit(DistanceMetric::Euclidean, BioKind::Finger, 8)]
    #[tokio::test]
    async fn test_distances_match_plaintext(
        #[case] metric: DistanceMetric,
        #[case] kind: BioKind,
        #[case] bits: u8,
    ) -> Result<()> {
        let setting = BioSetting::new(kind, 3, 2, 24, 10, janus_mpc_common::PRIME_MOD, bits)?
            .with_metric(metric)?;
        opened_distances(setting, 7).await
    }

    #[tokio::test]
    async fn test_missing_query_is_rejected() -> Result<()> {
        let setting = BioSetting::with_defaults(BioKind::Iris, 1, 1, 8)?
            .with_metric(DistanceMetric::Hamming)?;
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let (database, query) = generate_database(&mut rng, &setting, None);
        let [rs, _bp] = split_inputs(&mut rng, &database, &query);
        let input = PartyInput {
            query: None,
            ..rs
        };
        let runtime = LocalRuntime::mock_setup().await?;
        let mut sessions = runtime.sessions.into_iter();
        let mut session = sessions.next().ok_or_else(|| eyre::eyre!("no session"))?;
        let res = HammingEngine
            .compute_distances(&mut session, &setting, &input)
            .await;
        assert!(matches!(
            res.err().and_then(|e| e.downcast::<Error>().ok()),
            Some(Error::InvalidInput(_))
        ));
        Ok(())
    }
}
