//! DNS resolution seam
//!
//! The validator and the fetcher never call the system resolver directly;
//! they go through [`Resolver`] so a single answer can be validated and then
//! pinned, and so rebinding can be reproduced deterministically in tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::io;
use std::net::IpAddr;

/// Resolves a host name to the addresses it currently points at
#[async_trait]
pub trait Resolver: Send + Sync + fmt::Debug {
    /// Looks up `host` for a connection to `port`
    ///
    /// An empty answer is allowed here; the validator treats it as a
    /// resolution failure.
    async fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<IpAddr>>;
}

/// Resolver backed by the operating system (`getaddrinfo`)
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

#[async_trait]
impl Resolver for SystemResolver {
    async fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<IpAddr>> {
        let addrs = tokio::net::lookup_host((host, port)).await?;
        Ok(addrs.map(|addr| addr.ip()).collect())
    }
}

/// Resolver with fixed answers
///
/// Each host holds a queue of answers. Every lookup consumes the front
/// answer until one remains, which then repeats forever. Queuing two
/// answers therefore models a host whose DNS record changes between the
/// first and second lookup.
///
/// # Examples
///
/// ```
/// use network_shield::destination::{Resolver, StaticResolver};
/// use std::net::IpAddr;
///
/// # tokio_test_block(async {
/// let resolver = StaticResolver::new()
///     .with_host("jobs.example.com", ["93.184.216.34".parse::<IpAddr>().unwrap()])
///     .with_host("jobs.example.com", ["127.0.0.1".parse::<IpAddr>().unwrap()]);
///
/// let first = resolver.resolve("jobs.example.com", 443).await.unwrap();
/// let second = resolver.resolve("jobs.example.com", 443).await.unwrap();
/// assert_ne!(first, second);
/// assert_eq!(resolver.lookups("jobs.example.com"), 2);
/// # });
/// # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Runtime::new().unwrap().block_on(f)
/// # }
/// ```
#[derive(Debug, Default)]
pub struct StaticResolver {
    answers: Mutex<HashMap<String, VecDeque<Vec<IpAddr>>>>,
    lookups: Mutex<HashMap<String, usize>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an answer for `host`
    pub fn with_host<I>(self, host: &str, addrs: I) -> Self
    where
        I: IntoIterator<Item = IpAddr>,
    {
        self.answers
            .lock()
            .entry(host.to_ascii_lowercase())
            .or_default()
            .push_back(addrs.into_iter().collect());
        self
    }

    /// Number of lookups performed for `host` so far
    pub fn lookups(&self, host: &str) -> usize {
        self.lookups
            .lock()
            .get(&host.to_ascii_lowercase())
            .copied()
            .unwrap_or(0)
    }

    /// Total number of lookups across all hosts
    pub fn total_lookups(&self) -> usize {
        self.lookups.lock().values().sum()
    }
}

#[async_trait]
impl Resolver for StaticResolver {
    async fn resolve(&self, host: &str, _port: u16) -> io::Result<Vec<IpAddr>> {
        let host = host.to_ascii_lowercase();
        *self.lookups.lock().entry(host.clone()).or_insert(0) += 1;

        let mut answers = self.answers.lock();
        let queue = answers.get_mut(&host).ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no such host: {}", host))
        })?;

        let answer = if queue.len() > 1 {
            queue.pop_front().unwrap_or_default()
        } else {
            queue.front().cloned().unwrap_or_default()
        };
        Ok(answer)
    }
}
