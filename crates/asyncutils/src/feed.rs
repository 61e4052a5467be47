use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Push every item of `items` into a fresh channel from a background task.
///
/// The feeder stops early (and closes the channel) when `cancel` fires or the
/// receiver goes away.
pub fn spawn_feeder<I>(items: I, capacity: usize, cancel: CancellationToken) -> mpsc::Receiver<I::Item>
where
    I: IntoIterator + Send + 'static,
    I::IntoIter: Send,
    I::Item: Send + 'static,
{
    let (tx, rx) = mpsc::channel(capacity.max(1));
    tokio::spawn(async move {
        for item in items {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                sent = tx.send(item) => if sent.is_err() {
                    break;
                },
            }
        }
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_feeds_everything_then_closes() {
        let mut rx = spawn_feeder(vec!["a", "b", "c"], 1, CancellationToken::new());
        let mut seen = Vec::new();
        while let Some(item) = rx.recv().await {
            seen.push(item);
        }
        assert_eq!(seen, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_cancelled_feeder_closes_early() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut rx = spawn_feeder(0..1_000, 1, cancel);
        assert!(rx.recv().await.is_none());
    }
}
