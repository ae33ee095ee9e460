use std::sync::atomic::{ AtomicU64, AtomicUsize, Ordering };

/// Counters shared by the reactor and the worker threads.
#[derive(Debug, Default)]
pub struct ServerMetrics {
    active_conns: AtomicUsize,
    req_count: AtomicU64,
}

impl ServerMetrics {
    pub fn inc_conn(&self) {
        self.active_conns.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec_conn(&self) {
        self.active_conns.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn inc_req(&self) {
        self.req_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn active_conns(&self) -> usize {
        self.active_conns.load(Ordering::Relaxed)
    }

    pub fn req_count(&self) -> u64 {
        self.req_count.load(Ordering::Relaxed)
    }
}
