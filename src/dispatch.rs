//! Deferred execution of work that must not run on the caller's thread.
//!
//! A [`WorkerPool`] owns a bounded queue and a pump task on a tokio runtime.
//! Anything holding a [`Dispatcher`] can submit jobs to it from any thread,
//! including threads the runtime knows nothing about; submission never
//! blocks.

use std::future::Future;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error};

use crate::config::SinkConfig;

type Job = BoxFuture<'static, ()>;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchError {
    #[error("the dispatch queue is full")]
    QueueFull,
    #[error("the worker pool has shut down")]
    ShutDown,
}

/// Handle used to submit jobs to a [`WorkerPool`].
#[derive(Debug, Clone)]
pub struct Dispatcher {
    tx: mpsc::Sender<Job>,
}

impl Dispatcher {
    /// Queues `job` for execution on the pool.
    pub fn submit<F>(&self, job: F) -> Result<(), DispatchError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tx.try_send(job.boxed()).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => DispatchError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => DispatchError::ShutDown,
        })
    }
}

pub struct WorkerPool {
    dispatcher: Dispatcher,
    shutdown: oneshot::Sender<()>,
    pump: JoinHandle<()>,
}

impl WorkerPool {
    /// Starts the pool on `handle`, sized by `config.workers` and
    /// `config.queue_depth`.
    pub fn start(handle: &Handle, config: &SinkConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_depth.max(1));
        let (shutdown, shutdown_rx) = oneshot::channel();
        let pump = handle.spawn(pump(rx, shutdown_rx, config.workers.max(1)));

        WorkerPool {
            dispatcher: Dispatcher { tx },
            shutdown,
            pump,
        }
    }

    pub fn dispatcher(&self) -> Dispatcher {
        self.dispatcher.clone()
    }

    /// Stops accepting jobs, runs the ones already queued and waits for every
    /// job to finish.
    pub async fn shutdown(self) {
        let WorkerPool { shutdown, pump, .. } = self;
        let _ = shutdown.send(());

        if let Err(err) = pump.await {
            error!("dispatch pump failed: {}", err);
        }
    }
}

fn reap(result: Result<(), tokio::task::JoinError>) {
    if let Err(err) = result {
        if err.is_panic() {
            error!("dispatched job panicked");
        }
    }
}

async fn pump(mut rx: mpsc::Receiver<Job>, mut shutdown: oneshot::Receiver<()>, workers: usize) {
    let mut running = JoinSet::new();

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => {
                debug!("worker pool draining {} running job(s)", running.len());
                rx.close();
                break;
            }

            Some(result) = running.join_next(), if !running.is_empty() => reap(result),

            job = rx.recv(), if running.len() < workers => match job {
                Some(job) => {
                    running.spawn(job);
                }
                None => break,
            },
        }
    }

    // the queue is closed now; whatever is still buffered still runs
    while let Some(job) = rx.recv().await {
        while running.len() >= workers {
            if let Some(result) = running.join_next().await {
                reap(result);
            }
        }
        running.spawn(job);
    }

    while let Some(result) = running.join_next().await {
        reap(result);
    }
}
