//! Common test utilities for billedhenter integration tests

use async_trait::async_trait;
use billedhenter::{ClientError, IcrtClient, ImageReference};
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// CSV fixture with a header row and three data rows
pub const SIMPLE_CSV: &str = "\
Webkode,Produkt
IC23022-0072-00,Vaskemaskine
IC23022-0050-00,Ovn
IC23022-0220-31,Opvaskemaskine
";

/// CSV fixture with a preamble block before the header row
pub const PREAMBLE_CSV: &str = "\
Prisark 2023,
,
Webkode,Pris
IC23022-0072-00,4999
IC23022-0050-00,7299
";

/// CSV fixture without a recognizable identifier column
pub const NO_IDENTIFIER_CSV: &str = "\
Produkt,Pris
Vaskemaskine,4999
";

/// Per-identifier scripted behavior
#[derive(Clone)]
#[allow(dead_code)]
pub enum Behavior {
    /// Lookup and fetch succeed
    Succeed,
    /// Lookup reports no match, with the given variant alternatives
    NotFound(Vec<String>),
    /// Lookup fails transiently this many times, then succeeds
    TransientTimes(u32),
    /// Lookup always fails transiently
    AlwaysTransient,
    /// Lookup reports rejected credentials
    Auth,
}

/// Latency injected before each lookup answer
#[derive(Clone, Copy)]
#[allow(dead_code)]
pub enum Latency {
    /// Answer immediately
    None,
    /// Fixed delay
    Fixed(Duration),
    /// Uniformly random delay up to the given bound
    RandomUpTo(Duration),
}

/// Scripted in-memory catalog with call accounting
pub struct ScriptedClient {
    behaviors: HashMap<String, Behavior>,
    latency: Latency,
    /// Timestamps of every API call (lookups and fetches)
    pub call_stamps: Mutex<Vec<Instant>>,
    /// Total lookup calls made
    pub lookups: AtomicU32,
    failures_seen: Mutex<HashMap<String, u32>>,
}

#[allow(dead_code)]
impl ScriptedClient {
    pub fn new(behaviors: &[(&str, Behavior)]) -> Arc<Self> {
        Self::with_latency(behaviors, Latency::None)
    }

    pub fn with_latency(behaviors: &[(&str, Behavior)], latency: Latency) -> Arc<Self> {
        Arc::new(Self {
            behaviors: behaviors
                .iter()
                .map(|(id, b)| (id.to_string(), b.clone()))
                .collect(),
            latency,
            call_stamps: Mutex::new(Vec::new()),
            lookups: AtomicU32::new(0),
            failures_seen: Mutex::new(HashMap::new()),
        })
    }

    async fn pause(&self) {
        let delay = match self.latency {
            Latency::None => return,
            Latency::Fixed(d) => d,
            Latency::RandomUpTo(bound) => {
                let micros = rand::thread_rng().gen_range(0..=bound.as_micros() as u64);
                Duration::from_micros(micros)
            }
        };
        tokio::time::sleep(delay).await;
    }

    async fn stamp(&self) {
        self.call_stamps.lock().await.push(Instant::now());
    }
}

#[async_trait]
impl IcrtClient for ScriptedClient {
    async fn lookup(&self, identifier: &str) -> Result<ImageReference, ClientError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.stamp().await;
        self.pause().await;

        let behavior = self
            .behaviors
            .get(identifier)
            .cloned()
            .unwrap_or(Behavior::Succeed);
        match behavior {
            Behavior::Succeed => Ok(reference(identifier)),
            Behavior::NotFound(alternatives) => Err(ClientError::NotFound {
                identifier: identifier.to_string(),
                alternatives,
            }),
            Behavior::TransientTimes(n) => {
                let mut seen = self.failures_seen.lock().await;
                let count = seen.entry(identifier.to_string()).or_insert(0);
                if *count < n {
                    *count += 1;
                    Err(ClientError::Transient("scripted glitch".to_string()))
                } else {
                    Ok(reference(identifier))
                }
            }
            Behavior::AlwaysTransient => {
                Err(ClientError::Transient("scripted outage".to_string()))
            }
            Behavior::Auth => Err(ClientError::Auth("token rejected".to_string())),
        }
    }

    async fn fetch(&self, reference: &ImageReference) -> Result<(Vec<u8>, String), ClientError> {
        self.stamp().await;
        Ok((
            reference.identifier.clone().into_bytes(),
            "image/jpeg".to_string(),
        ))
    }
}

fn reference(identifier: &str) -> ImageReference {
    ImageReference {
        identifier: identifier.to_string(),
        filename: format!("{identifier}_01.jpg"),
        url: format!("https://cdn.example/{identifier}.jpg"),
    }
}

/// Retry policy with millisecond delays so tests stay fast
#[allow(dead_code)]
pub fn fast_retry(max_attempts: u32) -> billedhenter::RetryConfig {
    billedhenter::RetryConfig {
        max_attempts,
        initial_delay: Duration::from_millis(2),
        max_delay: Duration::from_millis(10),
        backoff_multiplier: 2.0,
        jitter: false,
    }
}

/// Config tuned for tests: fast retries and a wide-open rate limit
#[allow(dead_code)]
pub fn test_config() -> billedhenter::Config {
    billedhenter::Config {
        retry: fast_retry(3),
        rate_limit: billedhenter::RateLimitConfig {
            max_calls: 10_000,
            interval: Duration::from_secs(1),
        },
        ..Default::default()
    }
}
