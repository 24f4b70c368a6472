//! Fixed-size execution pool.
//!
//! Workers pull boxed jobs from one shared channel. Each job runs in its own
//! task so a panicking job takes down neither its worker nor its siblings.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use {
    futures::future::BoxFuture,
    tokio::{
        sync::{Mutex, mpsc},
        task::JoinHandle,
    },
    tokio_util::sync::CancellationToken,
    tracing::{debug, error},
};

use crate::error::{Error, Result};

pub type Job = BoxFuture<'static, ()>;

pub struct ExecutionPool {
    size: usize,
    tx: mpsc::UnboundedSender<Job>,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<Job>>>,
    shutdown: CancellationToken,
    workers: std::sync::Mutex<Vec<JoinHandle<()>>>,
    busy: Arc<AtomicUsize>,
}

impl ExecutionPool {
    pub fn new(size: usize) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            size,
            tx,
            rx: Arc::new(Mutex::new(rx)),
            shutdown: CancellationToken::new(),
            workers: std::sync::Mutex::new(Vec::new()),
            busy: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Spawn the workers on the current runtime. Calling it again is a no-op.
    pub fn start(&self) {
        let mut workers = self.workers.lock().unwrap_or_else(|e| e.into_inner());
        if !workers.is_empty() || self.shutdown.is_cancelled() {
            return;
        }
        for index in 0..self.size {
            workers.push(tokio::spawn(worker_loop(
                index,
                Arc::clone(&self.rx),
                self.shutdown.clone(),
                Arc::clone(&self.busy),
            )));
        }
        debug!(workers = self.size, "execution pool started");
    }

    /// Hand a job to the pool. Never blocks.
    pub fn submit(&self, job: Job) -> Result<()> {
        if self.shutdown.is_cancelled() {
            return Err(Error::PoolClosed);
        }
        self.tx.send(job).map_err(|_| Error::PoolClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Jobs currently executing.
    pub fn busy(&self) -> usize {
        self.busy.load(Ordering::Acquire)
    }

    /// Stop accepting jobs, wait for running jobs to finish, and drop the
    /// ones that never started.
    pub async fn close(&self) {
        self.shutdown.cancel();
        let workers = std::mem::take(&mut *self.workers.lock().unwrap_or_else(|e| e.into_inner()));
        for worker in workers {
            if let Err(e) = worker.await {
                error!(error = %e, "execution pool worker failed");
            }
        }

        let mut rx = self.rx.lock().await;
        rx.close();
        let mut dropped = 0usize;
        while rx.try_recv().is_ok() {
            dropped += 1;
        }
        debug!(dropped, "execution pool closed");
    }
}

async fn worker_loop(
    index: usize,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<Job>>>,
    shutdown: CancellationToken,
    busy: Arc<AtomicUsize>,
) {
    loop {
        let job = {
            let mut rx = tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                rx = rx.lock() => rx,
            };
            tokio::select! {
                biased;
                () = shutdown.cancelled() => None,
                job = rx.recv() => job,
            }
        };
        let Some(job) = job else {
            break;
        };

        busy.fetch_add(1, Ordering::AcqRel);
        let result = tokio::spawn(job).await;
        busy.fetch_sub(1, Ordering::AcqRel);
        if let Err(e) = result {
            error!(worker = index, error = %e, "job panicked");
        }
    }
    debug!(worker = index, "execution pool worker stopped");
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        std::{sync::atomic::AtomicBool, time::Duration},
        tokio::sync::oneshot,
    };

    #[tokio::test]
    async fn runs_submitted_jobs() {
        let pool = ExecutionPool::new(2);
        pool.start();
        let (tx, rx) = oneshot::channel();
        pool.submit(Box::pin(async move {
            let _ = tx.send(42);
        }))
        .unwrap();
        assert_eq!(rx.await.unwrap(), 42);
        pool.close().await;
    }

    #[tokio::test]
    async fn panicking_job_does_not_kill_worker() {
        let pool = ExecutionPool::new(1);
        pool.start();
        pool.submit(Box::pin(async { panic!("boom") })).unwrap();
        let (tx, rx) = oneshot::channel();
        pool.submit(Box::pin(async move {
            let _ = tx.send(());
        }))
        .unwrap();
        tokio::time::timeout(Duration::from_secs(1), rx)
            .await
            .unwrap()
            .unwrap();
        pool.close().await;
    }

    #[tokio::test]
    async fn close_waits_for_running_job() {
        let pool = ExecutionPool::new(1);
        pool.start();
        let done = Arc::new(AtomicBool::new(false));
        let (started_tx, started_rx) = oneshot::channel();
        {
            let done = Arc::clone(&done);
            pool.submit(Box::pin(async move {
                let _ = started_tx.send(());
                tokio::time::sleep(Duration::from_millis(50)).await;
                done.store(true, Ordering::SeqCst);
            }))
            .unwrap();
        }
        started_rx.await.unwrap();
        assert_eq!(pool.busy(), 1);
        pool.close().await;
        assert!(done.load(Ordering::SeqCst));
        assert_eq!(pool.busy(), 0);
    }

    #[tokio::test]
    async fn submit_after_close_fails() {
        let pool = ExecutionPool::new(1);
        pool.start();
        pool.close().await;
        assert!(pool.is_closed());
        let err = pool.submit(Box::pin(async {})).unwrap_err();
        assert!(matches!(err, Error::PoolClosed));
    }

    #[tokio::test]
    async fn unstarted_jobs_are_dropped_on_close() {
        let pool = ExecutionPool::new(1);
        // Never started: the job stays queued until close drops it.
        let (tx, rx) = oneshot::channel::<()>();
        pool.submit(Box::pin(async move {
            let _ = tx.send(());
        }))
        .unwrap();
        pool.close().await;
        assert!(rx.await.is_err());
    }
}
