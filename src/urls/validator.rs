//! Concurrent reachability validation of composed URLs.
//!
//! Every URL is probed independently. Results land in a pre-sized table
//! indexed by input position, so output order always matches input order.

use crate::models::ProbeOutcome;
use crate::probe::ReachabilityProber;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// Probe all `urls` concurrently and return one outcome per URL, in input order.
///
/// A failing probe never cancels its siblings. If `cancel` fires, probes that
/// have not finished are reported as unreachable with a cancellation error.
#[instrument(skip(prober, urls, cancel), fields(count = urls.len()))]
pub async fn validate_all(
    prober: &dyn ReachabilityProber,
    urls: &[String],
    cancel: &CancellationToken,
) -> Vec<ProbeOutcome> {
    let mut outcomes: Vec<Option<ProbeOutcome>> = vec![None; urls.len()];

    let mut probes: FuturesUnordered<_> = urls
        .iter()
        .enumerate()
        .map(|(index, url)| {
            let token = cancel.child_token();
            async move { (index, prober.probe(url, token).await) }
        })
        .collect();

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("Validation cancelled with {} probes outstanding", probes.len());
                break;
            }
            next = probes.next() => match next {
                Some((index, outcome)) => {
                    debug!(
                        "Probe {} -> reachable={} {:?}",
                        outcome.url, outcome.reachable, outcome.error
                    );
                    outcomes[index] = Some(outcome);
                }
                None => break,
            },
        }
    }

    outcomes
        .into_iter()
        .zip(urls)
        .map(|(outcome, url)| {
            outcome.unwrap_or_else(|| ProbeOutcome::unreachable(url.as_str(), "Probe cancelled"))
        })
        .collect()
}
