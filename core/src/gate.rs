//! Admission control for in-flight requests.
//!
//! # Design
//! `ureq` pools idle connections but does not cap how many requests run at
//! once. `RequestGate` adds that cap: at most `max_total` exchanges in flight
//! across the transport and at most `max_per_route` to a single host:port.
//! Callers over either bound block on a condition variable until a `Permit`
//! is dropped.

use std::collections::HashMap;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use ureq::http::Uri;

#[derive(Debug, Default)]
struct Counts {
    total: usize,
    per_route: HashMap<String, usize>,
}

/// Counting guard shared by every request on one transport.
#[derive(Debug)]
pub struct RequestGate {
    max_total: usize,
    max_per_route: usize,
    counts: Mutex<Counts>,
    released: Condvar,
}

impl RequestGate {
    pub fn new(max_total: usize, max_per_route: usize) -> Self {
        Self {
            max_total,
            max_per_route,
            counts: Mutex::new(Counts::default()),
            released: Condvar::new(),
        }
    }

    /// Block until both bounds allow one more request to `route`.
    pub fn acquire(&self, route: &str) -> Permit<'_> {
        let mut counts = self.lock();
        loop {
            let on_route = counts.per_route.get(route).copied().unwrap_or(0);
            if counts.total < self.max_total && on_route < self.max_per_route {
                break;
            }
            counts = self
                .released
                .wait(counts)
                .unwrap_or_else(PoisonError::into_inner);
        }
        counts.total += 1;
        *counts.per_route.entry(route.to_string()).or_insert(0) += 1;
        Permit {
            gate: self,
            route: route.to_string(),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.lock().total
    }

    pub fn in_flight_on(&self, route: &str) -> usize {
        self.lock().per_route.get(route).copied().unwrap_or(0)
    }

    fn release(&self, route: &str) {
        let mut counts = self.lock();
        counts.total = counts.total.saturating_sub(1);
        if let Some(n) = counts.per_route.get_mut(route) {
            *n -= 1;
            if *n == 0 {
                counts.per_route.remove(route);
            }
        }
        drop(counts);
        self.released.notify_all();
    }

    fn lock(&self) -> MutexGuard<'_, Counts> {
        self.counts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One admitted request. Dropping it frees the slot.
#[derive(Debug)]
pub struct Permit<'a> {
    gate: &'a RequestGate,
    route: String,
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        self.gate.release(&self.route);
    }
}

/// `host:port` of a URL, with the scheme's default port filled in.
pub fn route_of(url: &str) -> String {
    let Ok(uri) = url.parse::<Uri>() else {
        return url.to_string();
    };
    let host = uri.host().unwrap_or_default();
    let port = uri.port_u16().unwrap_or(match uri.scheme_str() {
        Some("https") => 443,
        _ => 80,
    });
    format!("{host}:{port}")
}
