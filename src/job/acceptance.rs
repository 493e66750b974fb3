//! Admission check: may a job be dispatched to a given channel right now?

use tracing::trace;

use crate::channel::ChannelDescriptor;

use super::server_job::ServerJob;

/// Decide whether `job` accepts a dispatch to `channel`.
///
/// Checks run cheapest-first: terminal state, pending start schedule,
/// expiration, then the per-client channel quota, and only then the
/// user-supplied execution policies against the channel's capability
/// snapshot. The check is pure; a rejection here has no side effects and the
/// same pair may be re-evaluated on the next dispatch round.
pub fn accepts_channel(job: &ServerJob, channel: &ChannelDescriptor) -> bool {
    if job.is_done() {
        trace!(job = %job.uuid(), channel = %channel.id, "rejected: job already ended");
        return false;
    }
    if job.is_pending() {
        trace!(job = %job.uuid(), channel = %channel.id, "rejected: start schedule pending");
        return false;
    }
    if job.is_expired() {
        trace!(job = %job.uuid(), channel = %channel.id, "rejected: job expired");
        return false;
    }
    let max_channels = job.client_sla().max_channels;
    if job.channel_count() >= max_channels {
        trace!(
            job = %job.uuid(),
            channel = %channel.id,
            max_channels,
            "rejected: channel quota reached"
        );
        return false;
    }
    let max_nodes = job.sla().max_nodes;
    if max_nodes > 0 && job.channel_count() >= max_nodes {
        trace!(job = %job.uuid(), channel = %channel.id, max_nodes, "rejected: node quota reached");
        return false;
    }
    if let Some(policy) = &job.sla().execution_policy {
        if !policy.evaluate(&channel.system_information) {
            trace!(job = %job.uuid(), channel = %channel.id, "rejected by job execution policy");
            return false;
        }
    }
    if let Some(policy) = &job.client_sla().execution_policy {
        if !policy.evaluate(&channel.system_information) {
            trace!(job = %job.uuid(), channel = %channel.id, "rejected by client execution policy");
            return false;
        }
    }
    true
}

#[cfg(test)]
#[path = "acceptance_tests.rs"]
mod tests;
