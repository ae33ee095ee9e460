use std::io;
use std::panic::{ self, AssertUnwindSafe };
use std::sync::Arc;
use std::thread::{ self, JoinHandle };

use crossbeam_channel::{ Receiver, Sender };
use mio::Waker;
use tracing::{ debug, error, warn };

use crate::error::ConnectionError;
use crate::handlers::static_files::DocumentRoot;
use crate::server::connection::{ Connection, ProcessOutcome };
use crate::server::metrics::ServerMetrics;
use crate::server::slab::SlotKey;

/// A connection handed to the pool. The worker owns it until it sends
/// the matching [`Completion`] back.
pub struct Job {
    pub key: SlotKey,
    pub conn: Box<Connection>,
}

pub struct Completion {
    pub key: SlotKey,
    pub conn: Box<Connection>,
    pub outcome: ProcessOutcome,
}

/// Fixed set of threads running [`Connection::process`] off the reactor.
pub struct WorkerPool {
    jobs: Option<Sender<Job>>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(
        workers: usize,
        docs: Arc<DocumentRoot>,
        metrics: Arc<ServerMetrics>,
        done: Sender<Completion>,
        waker: Arc<Waker>
    ) -> io::Result<Self> {
        let (jobs, queue) = crossbeam_channel::unbounded::<Job>();
        let mut handles = Vec::with_capacity(workers);

        for id in 0..workers {
            let queue = queue.clone();
            let docs = Arc::clone(&docs);
            let metrics = Arc::clone(&metrics);
            let done = done.clone();
            let waker = Arc::clone(&waker);

            let handle = thread::Builder
                ::new()
                .name(format!("http-worker-{}", id))
                .spawn(move || run_worker(id, queue, &docs, &metrics, done, &waker))?;
            handles.push(handle);
        }

        Ok(Self { jobs: Some(jobs), handles })
    }

    /// Queues a connection for processing. Fails, returning the job, once
    /// the pool is shut down.
    pub fn submit(&self, job: Job) -> Result<(), Job> {
        match &self.jobs {
            Some(jobs) => jobs.send(job).map_err(|e| e.into_inner()),
            None => Err(job),
        }
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Lets queued jobs finish, then joins every worker.
    pub fn shutdown(&mut self) {
        self.jobs.take();
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                error!("worker thread panicked");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(
    id: usize,
    queue: Receiver<Job>,
    docs: &DocumentRoot,
    metrics: &ServerMetrics,
    done: Sender<Completion>,
    waker: &Waker
) {
    debug!(worker = id, "worker started");

    for Job { key, mut conn } in queue.iter() {
        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| conn.process(docs))) {
            Ok(outcome) => outcome,
            Err(_) => {
                error!(worker = id, slot = key.index, "panic while processing request");
                ProcessOutcome::Close(ConnectionError::WorkerPanic)
            }
        };

        if let ProcessOutcome::ResponseReady(status) = &outcome {
            metrics.inc_req();
            debug!(
                worker = id,
                slot = key.index,
                status = status.as_u16(),
                url = %String::from_utf8_lossy(conn.request().url().unwrap_or_default()),
                "response staged"
            );
        }

        if done.send(Completion { key, conn, outcome }).is_err() {
            break;
        }
        if let Err(e) = waker.wake() {
            warn!(worker = id, error = %e, "failed to wake reactor");
        }
    }

    debug!(worker = id, "worker exiting");
}
