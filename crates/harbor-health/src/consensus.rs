//! Split-brain detection across load-balancer witnesses.
//!
//! Every load-balancer node reports which backend it currently routes the
//! VIP to. The aggregate is a pure function of the set of distinct reported
//! candidates, so probe order and completion order never change the outcome.

use std::collections::BTreeSet;

use harbor_core::{ConsensusResult, LvsProbeResult, NodeAddress};

/// Fold load-balancer results into a consensus verdict.
///
/// - no candidates: no active writer known, not a conflict
/// - one candidate: that backend is the active writer
/// - two or more: conflict, no active writer
pub fn aggregate(results: &[LvsProbeResult]) -> ConsensusResult {
    let observed_candidates: BTreeSet<NodeAddress> = results
        .iter()
        .filter_map(|r| r.candidate_backend.clone())
        .collect();

    let mut candidates = observed_candidates.iter();
    match (candidates.next(), candidates.next()) {
        (None, _) => ConsensusResult {
            active_writer: None,
            conflict: false,
            observed_candidates,
        },
        (Some(only), None) => ConsensusResult {
            active_writer: Some(only.clone()),
            conflict: false,
            observed_candidates,
        },
        (Some(_), Some(_)) => ConsensusResult {
            active_writer: None,
            conflict: true,
            observed_candidates,
        },
    }
}
