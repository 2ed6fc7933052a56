//! Long-run fetch session: courtesy delays, chunk breaks, user-agent rotation and an
//! explicit bounded retry loop. Every failure is absorbed into `None`.

use std::thread;
use std::time::Duration;

use anyhow::Result;
use reqwest::blocking::Client;
use scraper::Html;
use tracing::{info, warn};

use crate::error::FetchError;
use crate::http_client::{
    REQUEST_TIMEOUT_SECS, RawResponse, Transport, http_client, rotating_headers,
};
use crate::page_fetch::{PageSource, random_delay};

const RETRY_STATUSES: &[u16] = &[429, 500, 502, 503, 504];
const BACKOFF_MAX: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub max_retries: u32,
    pub backoff_factor: f64,
    pub chunk_size: u32,
    pub chunk_break: Duration,
    pub rate_limit_cooldown: Duration,
    pub timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_secs(15),
            max_delay: Duration::from_secs(30),
            max_retries: 3,
            backoff_factor: 2.0,
            chunk_size: 50,
            chunk_break: Duration::from_secs(300),
            rate_limit_cooldown: Duration::from_secs(60),
            timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PacingStep {
    pub delay: Duration,
    pub chunk_break: Option<Duration>,
}

/// Counts requests and decides how long to pause before each one.
#[derive(Debug, Clone)]
pub struct Pacer {
    min_delay: Duration,
    max_delay: Duration,
    chunk_size: u32,
    chunk_break: Duration,
    request_count: u64,
}

impl Pacer {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            min_delay: config.min_delay,
            max_delay: config.max_delay,
            chunk_size: config.chunk_size,
            chunk_break: config.chunk_break,
            request_count: 0,
        }
    }

    pub fn request_count(&self) -> u64 {
        self.request_count
    }

    pub fn next_step(&mut self) -> PacingStep {
        let delay = random_delay(self.min_delay, self.max_delay);
        self.request_count += 1;
        let chunk_break = (self.chunk_size > 0
            && self.request_count % u64::from(self.chunk_size) == 0)
            .then_some(self.chunk_break);
        PacingStep { delay, chunk_break }
    }
}

pub struct Session<T: Transport = Client> {
    transport: T,
    config: SessionConfig,
    pacer: Pacer,
}

impl Session<Client> {
    pub fn new(config: SessionConfig) -> Result<Self> {
        let client = http_client(config.timeout)?;
        Ok(Self::with_transport(client, config))
    }
}

impl<T: Transport> Session<T> {
    pub fn with_transport(transport: T, config: SessionConfig) -> Self {
        let pacer = Pacer::new(&config);
        Self {
            transport,
            config,
            pacer,
        }
    }

    pub fn request_count(&self) -> u64 {
        self.pacer.request_count()
    }

    pub fn fetch_enhanced(&mut self, url: &str) -> Option<Html> {
        let step = self.pacer.next_step();
        info!(delay_secs = step.delay.as_secs_f64(), "waiting before request");
        thread::sleep(step.delay);
        if let Some(pause) = step.chunk_break {
            info!(
                requests = self.pacer.request_count(),
                minutes = pause.as_secs_f64() / 60.0,
                "chunk break"
            );
            thread::sleep(pause);
            info!("resuming scraping");
        }

        match self.send_with_retry(url) {
            Ok(resp) if resp.is_success() => Some(Html::parse_document(&resp.body)),
            Err(FetchError::RateLimited { .. }) => {
                warn!(%url, "rate limited after retries, cooling down");
                thread::sleep(self.config.rate_limit_cooldown);
                None
            }
            Ok(resp) => {
                warn!(%url, status = resp.status, "error fetching page");
                None
            }
            Err(err) => {
                warn!(%url, error = %err, "error fetching page");
                if err.looks_rate_limited() {
                    let wait =
                        rate_limit_wait(self.config.rate_limit_cooldown, self.request_count());
                    warn!(
                        minutes = wait.as_secs_f64() / 60.0,
                        "rate limited, extended cool-down"
                    );
                    thread::sleep(wait);
                }
                None
            }
        }
    }

    fn send_with_retry(&self, url: &str) -> Result<RawResponse, FetchError> {
        let headers = rotating_headers();
        let mut retries = 0u32;
        loop {
            let outcome = self.transport.fetch_raw(url, &headers);
            let wait = match &outcome {
                Ok(resp) if RETRY_STATUSES.contains(&resp.status) => {
                    Some(retry_wait(self.config.backoff_factor, retries + 1, resp))
                }
                Err(FetchError::Transport(_)) => {
                    Some(backoff_delay(self.config.backoff_factor, retries + 1))
                }
                _ => None,
            };
            let Some(wait) = wait else {
                return outcome;
            };
            if retries >= self.config.max_retries {
                return match outcome {
                    Ok(resp) if resp.status == 429 => Err(FetchError::RateLimited {
                        retry_after: resp.retry_after,
                    }),
                    Ok(resp) => Err(FetchError::Status {
                        status: resp.status,
                    }),
                    other => other,
                };
            }
            retries += 1;
            warn!(%url, retry = retries, wait_secs = wait.as_secs_f64(), "retrying request");
            thread::sleep(wait);
        }
    }
}

impl<T: Transport> PageSource for Session<T> {
    fn fetch_page(&mut self, url: &str) -> Option<Html> {
        self.fetch_enhanced(url)
    }
}

/// Backoff before retry `n` (1-based): `factor * 2^(n-1)` seconds, capped.
pub fn backoff_delay(factor: f64, retry: u32) -> Duration {
    if retry == 0 || factor <= 0.0 {
        return Duration::ZERO;
    }
    let secs = factor * 2f64.powi(retry.min(32) as i32 - 1);
    Duration::from_secs_f64(secs.min(BACKOFF_MAX.as_secs_f64()))
}

fn retry_wait(factor: f64, retry: u32, resp: &RawResponse) -> Duration {
    match resp.retry_after {
        Some(hint) if resp.status == 429 || resp.status == 503 => hint,
        _ => backoff_delay(factor, retry),
    }
}

pub fn rate_limit_wait(base: Duration, request_count: u64) -> Duration {
    base * 2u32.pow((request_count % 3) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderMap;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    struct Scripted {
        replies: RefCell<VecDeque<Result<RawResponse, FetchError>>>,
        calls: RefCell<u32>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<RawResponse, FetchError>>) -> Self {
            Self {
                replies: RefCell::new(replies.into()),
                calls: RefCell::new(0),
            }
        }
    }

    impl Transport for Scripted {
        fn fetch_raw(&self, _url: &str, _headers: &HeaderMap) -> Result<RawResponse, FetchError> {
            *self.calls.borrow_mut() += 1;
            self.replies
                .borrow_mut()
                .pop_front()
                .unwrap_or(Err(FetchError::Transport("script exhausted".into())))
        }
    }

    fn reply(status: u16) -> Result<RawResponse, FetchError> {
        Ok(RawResponse {
            status,
            retry_after: None,
            body: "<html><body><p>ok</p></body></html>".to_string(),
        })
    }

    fn quiet_config() -> SessionConfig {
        SessionConfig {
            min_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            max_retries: 3,
            backoff_factor: 0.0,
            chunk_size: 50,
            chunk_break: Duration::ZERO,
            rate_limit_cooldown: Duration::ZERO,
            timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn chunk_break_every_chunk_size_requests() {
        let mut cfg = quiet_config();
        cfg.chunk_size = 3;
        cfg.chunk_break = Duration::from_secs(300);
        let mut pacer = Pacer::new(&cfg);
        let breaks: Vec<bool> = (0..7).map(|_| pacer.next_step().chunk_break.is_some()).collect();
        assert_eq!(breaks, vec![false, false, true, false, false, true, false]);
        assert_eq!(pacer.request_count(), 7);
    }

    #[test]
    fn zero_chunk_size_never_breaks() {
        let mut cfg = quiet_config();
        cfg.chunk_size = 0;
        let mut pacer = Pacer::new(&cfg);
        assert!((0..10).all(|_| pacer.next_step().chunk_break.is_none()));
    }

    #[test]
    fn backoff_doubles_and_caps() {
        assert_eq!(backoff_delay(2.0, 0), Duration::ZERO);
        assert_eq!(backoff_delay(2.0, 1), Duration::from_secs(2));
        assert_eq!(backoff_delay(2.0, 2), Duration::from_secs(4));
        assert_eq!(backoff_delay(2.0, 3), Duration::from_secs(8));
        assert_eq!(backoff_delay(2.0, 10), BACKOFF_MAX);
    }

    #[test]
    fn retry_after_hint_wins_for_429() {
        let resp = RawResponse {
            status: 429,
            retry_after: Some(Duration::from_secs(7)),
            body: String::new(),
        };
        assert_eq!(retry_wait(2.0, 1, &resp), Duration::from_secs(7));
        let resp = RawResponse {
            status: 500,
            retry_after: Some(Duration::from_secs(7)),
            body: String::new(),
        };
        assert_eq!(retry_wait(2.0, 1, &resp), Duration::from_secs(2));
    }

    #[test]
    fn rate_limit_wait_cycles_with_request_count() {
        let base = Duration::from_secs(60);
        assert_eq!(rate_limit_wait(base, 3), Duration::from_secs(60));
        assert_eq!(rate_limit_wait(base, 4), Duration::from_secs(120));
        assert_eq!(rate_limit_wait(base, 5), Duration::from_secs(240));
    }

    #[test]
    fn transient_statuses_are_retried_until_success() {
        let t = Scripted::new(vec![reply(503), reply(502), reply(200)]);
        let mut session = Session::with_transport(t, quiet_config());
        assert!(session.fetch_enhanced("https://example.test/m").is_some());
        assert_eq!(*session.transport.calls.borrow(), 3);
        assert_eq!(session.request_count(), 1);
    }

    #[test]
    fn persistent_429_returns_none_after_retries() {
        let t = Scripted::new(vec![reply(429), reply(429), reply(429), reply(429)]);
        let mut session = Session::with_transport(t, quiet_config());
        assert!(session.fetch_enhanced("https://example.test/m").is_none());
        assert_eq!(*session.transport.calls.borrow(), 4);
    }

    #[test]
    fn exhausted_429_becomes_rate_limited() {
        let limited = || -> Result<RawResponse, FetchError> {
            Ok(RawResponse {
                status: 429,
                retry_after: Some(Duration::ZERO),
                body: String::new(),
            })
        };
        let session = Session::with_transport(Scripted::new(vec![limited(), limited()]), cfg_one());
        let err = session.send_with_retry("https://example.test/m").unwrap_err();
        assert_eq!(
            err,
            FetchError::RateLimited {
                retry_after: Some(Duration::ZERO)
            }
        );
        assert!(err.looks_rate_limited());

        let scripted = Scripted::new(vec![reply(503), reply(503)]);
        let session = Session::with_transport(scripted, cfg_one());
        let err = session.send_with_retry("https://example.test/m").unwrap_err();
        assert_eq!(err, FetchError::Status { status: 503 });
    }

    fn cfg_one() -> SessionConfig {
        SessionConfig {
            max_retries: 1,
            ..quiet_config()
        }
    }

    #[test]
    fn client_errors_are_not_retried() {
        let t = Scripted::new(vec![reply(404), reply(200)]);
        let mut session = Session::with_transport(t, quiet_config());
        assert!(session.fetch_enhanced("https://example.test/m").is_none());
        assert_eq!(*session.transport.calls.borrow(), 1);
    }

    #[test]
    fn transport_errors_are_absorbed() {
        let err = || Err(FetchError::Transport("connection reset".into()));
        let t = Scripted::new(vec![err(), err(), err(), err()]);
        let mut session = Session::with_transport(t, quiet_config());
        assert!(session.fetch_enhanced("https://example.test/m").is_none());
        assert_eq!(*session.transport.calls.borrow(), 4);
    }
}
