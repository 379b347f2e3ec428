use std::future::Future;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

/// One reconciliation loop body.
pub trait PollJob: Send + 'static {
    /// Runs one cycle. `first` is true only for the poll made right after spawn.
    fn poll(&mut self, first: bool) -> impl Future<Output = ()> + Send;
}

/// Owned, cancellable handle to a periodic poll loop.
///
/// The loop polls once immediately, then once per `period`. A poll that runs
/// past its tick does not queue catch-up polls. Cancelling stops the loop even
/// in the middle of a fetch; dropping the handle aborts it.
pub struct PollTask {
    name: &'static str,
    shutdown: Option<oneshot::Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl PollTask {
    pub fn spawn<J: PollJob>(name: &'static str, period: Duration, mut job: J) -> Self {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let join = tokio::spawn(async move {
            let mut ticker = time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut first = true;

            loop {
                tokio::select! {
                    biased;
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {}
                }
                tokio::select! {
                    biased;
                    _ = &mut shutdown_rx => break,
                    _ = job.poll(first) => {}
                }
                first = false;
            }

            log::debug!("Poll loop `{name}` stopped");
        });

        log::debug!("Poll loop `{name}` started ({period:?})");
        Self {
            name,
            shutdown: Some(shutdown_tx),
            join: Some(join),
        }
    }

    /// Stop the loop and wait until it has exited.
    pub async fn cancel(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(join) = self.join.take() {
            if let Err(err) = join.await {
                if !err.is_cancelled() {
                    log::warn!("Poll loop `{}` ended abnormally: {err}", self.name);
                }
            }
        }
    }
}

impl Drop for PollTask {
    fn drop(&mut self) {
        if let Some(join) = self.join.take() {
            join.abort();
        }
    }
}
