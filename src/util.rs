//! Small internal helpers shared across modules.

use tokio::sync::watch;

/// Resolves once the cancellation signal fires.
///
/// Never resolves if the sender side has been dropped without signalling, so
/// a run whose caller discards the handle simply runs to completion.
pub(crate) async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_resolves_on_signal() {
        let (tx, mut rx) = watch::channel(false);
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), cancelled(&mut rx))
            .await
            .expect("should resolve once signalled");
    }

    #[tokio::test]
    async fn test_pending_without_signal() {
        let (_tx, mut rx) = watch::channel(false);
        let result = tokio::time::timeout(Duration::from_millis(20), cancelled(&mut rx)).await;
        assert!(result.is_err(), "should not resolve without a signal");
    }

    #[tokio::test]
    async fn test_pending_after_sender_dropped() {
        let (tx, mut rx) = watch::channel(false);
        drop(tx);
        let result = tokio::time::timeout(Duration::from_millis(20), cancelled(&mut rx)).await;
        assert!(result.is_err(), "dropped sender must not read as cancellation");
    }
}
