//! Membership protocol: distances, threshold tests, fusion and a single
//! reveal to the registration station.

pub mod distance;
pub mod fusion;
pub mod threshold;

use crate::{
    error::Error,
    execution::{player::Role, session::Session},
    protocol::{binary::reveal_bit_to, perf_stats::ProtocolStats},
};
use distance::engine_for;
use eyre::Result;
use janus_mpc_common::{config::BioSetting, sharing::TemplateShare, template::BiometricTemplate};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

/// One party's input to the membership protocol: its share of every
/// enrolled template and, for the registration station only, the query.
#[derive(Clone, Debug)]
pub struct PartyInput {
    pub database: Vec<TemplateShare>,
    pub query: Option<BiometricTemplate>,
}

impl PartyInput {
    pub fn template_size(&self) -> usize {
        self.database
            .first()
            .map_or(0, TemplateShare::template_size)
    }

    /// Checks that the input has the shape `setting` describes.
    pub fn validate(&self, setting: &BioSetting, role: Role) -> Result<(), Error> {
        if self.database.len() != setting.db_size() {
            return Err(Error::InvalidInput(format!(
                "expected {} enrolled shares, got {}",
                setting.db_size(),
                self.database.len()
            )));
        }
        let uses_mask = setting.metric().uses_mask();
        for (i, share) in self.database.iter().enumerate() {
            if share.template_size() != setting.template_size()
                || share.bits_per_slot() != setting.bits_per_slot()
            {
                return Err(Error::InvalidInput(format!(
                    "share {i} has {} slots of {} bits, expected {} of {}",
                    share.template_size(),
                    share.bits_per_slot(),
                    setting.template_size(),
                    setting.bits_per_slot()
                )));
            }
            if uses_mask && share.mask().is_none() {
                return Err(Error::InvalidInput(format!("share {i} has no mask")));
            }
        }
        match (role, &self.query) {
            (Role::RegistrationStation, Some(query)) => {
                if query.template_size() != setting.template_size()
                    || query.bits_per_slot() != setting.bits_per_slot()
                {
                    return Err(Error::InvalidInput(
                        "query does not match the template shape".to_string(),
                    ));
                }
                if uses_mask && query.mask().is_none() {
                    return Err(Error::InvalidInput("query has no mask".to_string()));
                }
            }
            (Role::RegistrationStation, None) => {
                return Err(Error::InvalidInput(
                    "the registration station needs a query".to_string(),
                ))
            }
            (Role::BiometricProvider, Some(_)) => {
                return Err(Error::InvalidInput(
                    "only the registration station holds the query".to_string(),
                ))
            }
            (Role::BiometricProvider, None) => {}
        }
        Ok(())
    }
}

/// Result of one protocol run on one party.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipOutcome {
    /// `Some` on the registration station only.
    pub membership: Option<bool>,
    /// Bytes this party sent during the run.
    pub bytes_sent: u64,
    pub stats: ProtocolStats,
}

impl MembershipOutcome {
    fn new(membership: Option<bool>, before: &ProtocolStats, session: &Session) -> Self {
        let stats = session.stats().since(before);
        Self {
            membership,
            bytes_sent: stats.bytes_sent,
            stats,
        }
    }
}

/// Full protocol: is the query within the threshold of every template of
/// some enrolled identity?
#[instrument(level = "info", skip_all, fields(role = %session.own_role(), %setting))]
pub async fn run_membership(
    session: &mut Session,
    setting: &BioSetting,
    input: &PartyInput,
) -> Result<MembershipOutcome> {
    input.validate(setting, session.own_role())?;
    let before = session.stats();
    let engine = engine_for(setting.metric());
    info!(metric = %engine.metric(), "inputs set");

    let distances = engine.compute_distances(session, setting, input).await?;
    info!("distances computed");
    let matches = engine.threshold_test(session, setting, &distances).await?;
    info!("matches computed");

    let bit = fusion::membership(session, &matches, setting.user_num(), setting.fuse()).await?;
    let membership = reveal_bit_to(session, Role::QUERIER, bit).await?;
    session.network_session.flush().await?;
    info!(?membership, "membership revealed");

    Ok(MembershipOutcome::new(membership, &before, session))
}

/// Threshold-only path: every party holds one additive share of each
/// template's similarity score modulo the public prime.
#[instrument(level = "info", skip_all, fields(role = %session.own_role(), %setting))]
pub async fn run_threshold_membership(
    session: &mut Session,
    setting: &BioSetting,
    own_scores: &[u64],
) -> Result<MembershipOutcome> {
    let before = session.stats();
    let matches = threshold::shared_scores_match(session, setting, own_scores).await?;
    info!("matches computed");

    let bit = fusion::membership(session, &matches, setting.user_num(), setting.fuse()).await?;
    let membership = reveal_bit_to(session, Role::QUERIER, bit).await?;
    session.network_session.flush().await?;
    info!(?membership, "membership revealed");

    Ok(MembershipOutcome::new(membership, &before, session))
}
