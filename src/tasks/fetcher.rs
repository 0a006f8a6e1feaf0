use std::sync::Arc;

use tokio::select;
use tokio::sync::mpsc::Sender;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::api::{Params, SearchApi};
use crate::events::{PageAck, PageDelivered, SearchKind};
use crate::record::PhotoPage;

/// Everything one fetch run needs; fixed for the lifetime of the run.
#[derive(Debug, Clone)]
pub struct FetchRun {
    pub kind: SearchKind,
    pub generation: u64,
    pub method: String,
    pub params: Params,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    BufferFull,
    PagesExhausted,
    NoResults,
    /// A newer search of the same kind took over the buffer.
    Superseded,
    Failed(String),
    CoordinatorGone,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct FetchSummary {
    pub kind: SearchKind,
    pub generation: u64,
    pub pages_fetched: u32,
    pub records_received: usize,
    pub stop: StopReason,
}

/// Pull pages 1, 2, 3... and hand each one to the coordinator.
///
/// The coordinator owns the buffer, so after every page the run waits for a
/// [`PageAck`] telling it whether there is still room. The run ends when:
/// - the buffer is full,
/// - the service reports no pages beyond the one just fetched,
/// - a page comes back empty,
/// - a request or its response fails (no retry),
/// - the coordinator marks the run stale or goes away, or
/// - `cancel` fires.
#[instrument(skip_all, fields(kind = %job.kind, generation = job.generation))]
pub async fn run(
    job: FetchRun,
    api: Arc<dyn SearchApi>,
    to_coordinator: Sender<PageDelivered>,
    cancel: CancellationToken,
) -> FetchSummary {
    let mut summary = FetchSummary {
        kind: job.kind,
        generation: job.generation,
        pages_fetched: 0,
        records_received: 0,
        stop: StopReason::Cancelled,
    };
    let mut page: u32 = 1;

    let stop = loop {
        let mut params = job.params.clone();
        params.insert("page".into(), page.to_string());

        let response = select! {
            biased;
            _ = cancel.cancelled() => break StopReason::Cancelled,
            res = api.call(&job.method, &params) => res,
        };
        let parsed = response.and_then(|body| PhotoPage::from_response(&body));
        let PhotoPage { records, pages } = match parsed {
            Ok(p) => p,
            Err(err) => {
                warn!(page, error = %err, "page fetch failed; stopping run");
                break StopReason::Failed(err.to_string());
            }
        };

        let count = records.len();
        debug!(page, pages, count, "page received");
        summary.pages_fetched += 1;
        summary.records_received += count;

        let (reply_tx, reply_rx) = oneshot::channel();
        let delivered = PageDelivered {
            kind: job.kind,
            generation: job.generation,
            page,
            records,
            reply: reply_tx,
        };
        if to_coordinator.send(delivered).await.is_err() {
            break StopReason::CoordinatorGone;
        }
        let ack = select! {
            biased;
            _ = cancel.cancelled() => break StopReason::Cancelled,
            ack = reply_rx => match ack {
                Ok(ack) => ack,
                Err(_) => break StopReason::CoordinatorGone,
            },
        };

        match ack {
            PageAck::Stale => break StopReason::Superseded,
            PageAck::Accepted { .. } if count == 0 => break StopReason::NoResults,
            PageAck::Accepted { full: true } => break StopReason::BufferFull,
            PageAck::Accepted { full: false } if pages <= page => {
                break StopReason::PagesExhausted;
            }
            PageAck::Accepted { full: false } => page += 1,
        }
    };

    info!(
        pages = summary.pages_fetched,
        records = summary.records_received,
        stop = ?stop,
        "fetch run finished"
    );
    summary.stop = stop;
    summary
}
