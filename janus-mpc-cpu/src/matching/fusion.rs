//! Fusion of per-template match bits into one membership bit.
//!
//! Templates of one identity are contiguous: identity `i` owns the match
//! bits `[i * fuse, (i + 1) * fuse)`. An identity matches when all of its
//! templates match, the query is a member when any identity matches.

use crate::{
    error::Error,
    execution::session::Session,
    protocol::binary::{and_many, or_many},
    shares::BitShare,
};
use eyre::Result;
use tracing::instrument;

/// AND over the `fuse` match bits of every identity. Runs `fuse - 1` rounds of
/// `user_num` gates each.
#[instrument(level = "trace", target = "janus::network", skip_all, fields(user_num = user_num, fuse = fuse))]
pub async fn fuse_identities(
    session: &mut Session,
    matches: &[BitShare],
    user_num: usize,
    fuse: usize,
) -> Result<Vec<BitShare>> {
    if fuse == 0 || matches.len() != user_num * fuse {
        return Err(Error::InvalidInput(format!(
            "{} match bits cannot be grouped into {user_num} identities of {fuse}",
            matches.len()
        ))
        .into());
    }
    let mut acc: Vec<BitShare> = (0..user_num).map(|i| matches[i * fuse]).collect();
    for t in 1..fuse {
        let next: Vec<BitShare> = (0..user_num).map(|i| matches[i * fuse + t]).collect();
        acc = and_many(session, &acc, &next).await?;
    }
    Ok(acc)
}

/// OR over all identity bits, folded pairwise into a balanced tree whose
/// leaves start with the public `false` literal. Evaluates exactly
/// `identities.len()` OR gates.
#[instrument(level = "trace", target = "janus::network", skip_all, fields(len = identities.len()))]
pub async fn any_identity(session: &mut Session, identities: &[BitShare]) -> Result<BitShare> {
    let mut level = Vec::with_capacity(identities.len() + 1);
    level.push(BitShare::from_const(false, session.own_role()));
    level.extend_from_slice(identities);
    while level.len() > 1 {
        let pairs = level.len() / 2;
        let lhs: Vec<BitShare> = level.iter().step_by(2).take(pairs).copied().collect();
        let rhs: Vec<BitShare> = level.iter().skip(1).step_by(2).copied().collect();
        let mut next = or_many(session, &lhs, &rhs).await?;
        if level.len() % 2 == 1 {
            next.extend(level.last().copied());
        }
        level = next;
    }
    level
        .pop()
        .ok_or_else(|| Error::Other("empty OR tree".to_string()).into())
}

/// Conjunctive then disjunctive fusion.
pub async fn membership(
    session: &mut Session,
    matches: &[BitShare],
    user_num: usize,
    fuse: usize,
) -> Result<BitShare> {
    let identities = fuse_identities(session, matches, user_num, fuse).await?;
    any_identity(session, &identities).await
}
