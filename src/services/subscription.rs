use crate::adapters::collection::{MessageCollection, ParticipantFilter};
use crate::domain::message::Message;
use crate::domain::notification::ChangeEvent;
use crate::error::Result;
use crate::services::notification::ChangeNotifier;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Full result sets, one per change. Query failures arrive as `Err` items and
/// do not end the stream.
pub type SnapshotStream = ReceiverStream<Result<Vec<Message>>>;

/// Owns a live subscription. Cancelling or dropping it stops the query task.
#[derive(Debug)]
pub struct SubscriptionHandle {
    token: CancellationToken,
}

impl SubscriptionHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Starts a live query over every message matching `filter`.
///
/// The first item is the current result set; each change event for the
/// filtered participant triggers one re-query. Events that pile up while a
/// query runs collapse into a single re-query.
pub fn subscribe(
    collection: Arc<dyn MessageCollection>,
    notifier: Arc<dyn ChangeNotifier>,
    filter: ParticipantFilter,
) -> (SnapshotStream, SubscriptionHandle) {
    let (tx, rx) = mpsc::channel(1);
    let token = CancellationToken::new();

    // Watch before the first query so no change can slip between the two.
    let changes = notifier.watch(filter.participant);

    tokio::spawn(
        run(collection, filter, changes, tx, token.clone())
            .instrument(tracing::debug_span!("snapshot_subscription", participant = %filter.participant)),
    );

    (ReceiverStream::new(rx), SubscriptionHandle { token })
}

async fn run(
    collection: Arc<dyn MessageCollection>,
    filter: ParticipantFilter,
    mut changes: broadcast::Receiver<ChangeEvent>,
    tx: mpsc::Sender<Result<Vec<Message>>>,
    token: CancellationToken,
) {
    tracing::debug!("Subscription started");

    loop {
        let snapshot = tokio::select! {
            () = token.cancelled() => break,
            result = collection.query(filter) => result,
        };
        if let Err(e) = &snapshot {
            tracing::warn!(error = %e, "Snapshot query failed");
        }

        tokio::select! {
            () = token.cancelled() => break,
            sent = tx.send(snapshot) => if sent.is_err() { break },
        }

        tokio::select! {
            () = token.cancelled() => break,
            () = tx.closed() => break,
            event = changes.recv() => match event {
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => drain(&mut changes),
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    tracing::debug!("Subscription ended");
}

fn drain(changes: &mut broadcast::Receiver<ChangeEvent>) {
    loop {
        match changes.try_recv() {
            Ok(_) | Err(broadcast::error::TryRecvError::Lagged(_)) => {}
            Err(_) => break,
        }
    }
}
