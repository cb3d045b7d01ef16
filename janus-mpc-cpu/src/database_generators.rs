//! Synthetic databases, queries and score shares for tests, benchmarks and
//! the binaries.

use crate::matching::PartyInput;
use janus_mpc_common::{
    config::BioSetting,
    sharing::{share_database, share_score},
    template::BiometricTemplate,
    MAX_SIMILARITY_SCORE,
};
use rand::Rng;

/// Plaintext database of `db_size` templates and a query.
///
/// With `near = Some((index, count))` the query is template `index` with
/// `count` slots changed, otherwise it is drawn independently.
pub fn generate_database<R: Rng>(
    rng: &mut R,
    setting: &BioSetting,
    near: Option<(usize, usize)>,
) -> (Vec<BiometricTemplate>, BiometricTemplate) {
    let database: Vec<BiometricTemplate> = (0..setting.db_size())
        .map(|_| BiometricTemplate::random_for(rng, setting))
        .collect();
    let query = match near.and_then(|(i, count)| database.get(i).map(|t| (t, count))) {
        Some((template, count)) => template.perturbed(rng, count),
        None => BiometricTemplate::random_for(rng, setting),
    };
    (database, query)
}

/// Shares the database and hands the query to the registration station.
/// Indexed by [`Role::index`](crate::execution::player::Role::index).
pub fn split_inputs<R: Rng>(
    rng: &mut R,
    database: &[BiometricTemplate],
    query: &BiometricTemplate,
) -> [PartyInput; 2] {
    let (rs, bp) = share_database(database, rng);
    [
        PartyInput {
            database: rs,
            query: Some(query.clone()),
        },
        PartyInput {
            database: bp,
            query: None,
        },
    ]
}

/// Random similarity scores, one per template, below [`MAX_SIMILARITY_SCORE`].
pub fn generate_scores<R: Rng>(rng: &mut R, setting: &BioSetting) -> Vec<u64> {
    let max = MAX_SIMILARITY_SCORE.min(setting.prime_mod());
    (0..setting.db_size())
        .map(|_| rng.gen::<u64>() % max)
        .collect()
}

/// Additive shares of `scores` modulo the setting's prime, indexed by role.
pub fn share_scores<R: Rng>(rng: &mut R, setting: &BioSetting, scores: &[u64]) -> [Vec<u64>; 2] {
    let (rs, bp): (Vec<u64>, Vec<u64>) = scores
        .iter()
        .map(|s| share_score(*s, setting.prime_mod(), rng))
        .unzip();
    [rs, bp]
}
