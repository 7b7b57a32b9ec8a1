// One-shot signals: worker shutdown and per-job cancellation

use tokio::sync::watch;

/// Receiving side of a signal; cheap to clone
#[derive(Clone)]
pub struct SignalToken {
    rx: watch::Receiver<bool>,
}

impl SignalToken {
    /// Token that is never raised
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_raised(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once the signal is raised
    ///
    /// Pends forever if the sender is dropped without raising.
    pub async fn wait(&mut self) {
        while !*self.rx.borrow_and_update() {
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

pub struct SignalSender {
    tx: watch::Sender<bool>,
}

impl SignalSender {
    pub fn raise(&self) {
        let _ = self.tx.send(true);
    }

    /// Additional token observing this sender
    pub fn token(&self) -> SignalToken {
        SignalToken {
            rx: self.tx.subscribe(),
        }
    }
}

pub fn signal_channel() -> (SignalSender, SignalToken) {
    let (tx, rx) = watch::channel(false);
    (SignalSender { tx }, SignalToken { rx })
}

/// Worker shutdown
pub type ShutdownToken = SignalToken;
/// Job cancellation observed by the import executor
pub type CancelToken = SignalToken;
