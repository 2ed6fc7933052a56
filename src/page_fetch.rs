use std::thread;
use std::time::Duration;

use anyhow::Result;
use rand::Rng;
use reqwest::blocking::Client;
use reqwest::header::HeaderMap;
use scraper::Html;
use tracing::{debug, warn};

use crate::error::FetchError;
use crate::http_client::{REQUEST_TIMEOUT_SECS, Transport, default_headers, http_client};

pub const DEFAULT_DELAY_RANGE: (Duration, Duration) =
    (Duration::from_secs(2), Duration::from_secs(4));

/// Anything that can turn a URL into a parsed page. `None` means "no data for this URL".
pub trait PageSource {
    fn fetch_page(&mut self, url: &str) -> Option<Html>;
}

pub struct PageFetcher<T: Transport = Client> {
    transport: T,
    delay_range: (Duration, Duration),
    headers: HeaderMap,
}

impl PageFetcher<Client> {
    pub fn new() -> Result<Self> {
        let client = http_client(Duration::from_secs(REQUEST_TIMEOUT_SECS))?;
        Ok(Self::with_transport(client, DEFAULT_DELAY_RANGE))
    }
}

impl<T: Transport> PageFetcher<T> {
    pub fn with_transport(transport: T, delay_range: (Duration, Duration)) -> Self {
        Self {
            transport,
            delay_range,
            headers: default_headers(),
        }
    }

    pub fn fetch(&self, url: &str) -> Result<Html, FetchError> {
        fetch_page(&self.transport, url, self.delay_range, Some(&self.headers))
    }
}

impl<T: Transport> PageSource for PageFetcher<T> {
    fn fetch_page(&mut self, url: &str) -> Option<Html> {
        match self.fetch(url) {
            Ok(doc) => Some(doc),
            Err(err) => {
                warn!(%url, error = %err, "error fetching page");
                None
            }
        }
    }
}

pub fn fetch_page<T: Transport>(
    transport: &T,
    url: &str,
    delay_range: (Duration, Duration),
    headers: Option<&HeaderMap>,
) -> Result<Html, FetchError> {
    thread::sleep(random_delay(delay_range.0, delay_range.1));

    let fallback;
    let headers = match headers {
        Some(h) => h,
        None => {
            fallback = default_headers();
            &fallback
        }
    };

    debug!(%url, "GET");
    let resp = transport.fetch_raw(url, headers)?;
    if !resp.is_success() {
        return Err(FetchError::Status {
            status: resp.status,
        });
    }
    Ok(Html::parse_document(&resp.body))
}

pub fn random_delay(min: Duration, max: Duration) -> Duration {
    let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
    if lo == hi {
        return lo;
    }
    let secs = rand::thread_rng().gen_range(lo.as_secs_f64()..=hi.as_secs_f64());
    Duration::from_secs_f64(secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::RawResponse;
    use std::cell::RefCell;

    struct OneShot {
        status: u16,
        body: &'static str,
        seen: RefCell<Vec<String>>,
    }

    impl Transport for OneShot {
        fn fetch_raw(&self, url: &str, headers: &HeaderMap) -> Result<RawResponse, FetchError> {
            assert!(headers.contains_key(reqwest::header::USER_AGENT));
            self.seen.borrow_mut().push(url.to_string());
            Ok(RawResponse {
                status: self.status,
                retry_after: None,
                body: self.body.to_string(),
            })
        }
    }

    const NO_DELAY: (Duration, Duration) = (Duration::ZERO, Duration::ZERO);

    #[test]
    fn success_parses_document() {
        let t = OneShot {
            status: 200,
            body: "<html><body><table id='t'></table></body></html>",
            seen: RefCell::new(Vec::new()),
        };
        let doc = fetch_page(&t, "https://example.test/a", NO_DELAY, None).unwrap();
        let sel = scraper::Selector::parse("table#t").unwrap();
        assert!(doc.select(&sel).next().is_some());
        assert_eq!(t.seen.borrow().len(), 1);
    }

    #[test]
    fn non_success_status_is_failure_not_panic() {
        let t = OneShot {
            status: 404,
            body: "",
            seen: RefCell::new(Vec::new()),
        };
        let err = fetch_page(&t, "https://example.test/missing", NO_DELAY, None).unwrap_err();
        assert_eq!(err, FetchError::Status { status: 404 });

        let mut fetcher = PageFetcher::with_transport(t, NO_DELAY);
        assert!(fetcher.fetch_page("https://example.test/missing").is_none());
    }

    #[test]
    fn random_delay_stays_in_range() {
        let lo = Duration::from_millis(10);
        let hi = Duration::from_millis(20);
        for _ in 0..50 {
            let d = random_delay(lo, hi);
            assert!(d >= lo && d <= hi);
        }
        assert_eq!(random_delay(hi, hi), hi);
        let swapped = random_delay(hi, lo);
        assert!(swapped >= lo && swapped <= hi);
    }
}
