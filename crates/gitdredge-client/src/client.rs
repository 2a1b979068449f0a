use std::time::Duration;

use reqwest::{redirect, ClientBuilder, StatusCode};
use reqwest_middleware::ClientWithMiddleware;
use reqwest_retry::policies::ExponentialBackoff;
use reqwest_retry::RetryTransientMiddleware;
use tokio_util::sync::CancellationToken;
use tracing::trace;
use url::Url;

use crate::error::Error;
use crate::useragent::random_user_agent;

/// The largest response body a single GET will accept.
pub const MAX_BODY_BYTES: u64 = 20 * 1024 * 1024;

/// Retries for transient failures: exponential backoff between these bounds.
const RETRY_MIN_WAIT: Duration = Duration::from_secs(1);
const RETRY_MAX_WAIT: Duration = Duration::from_secs(30);
const DEFAULT_RETRIES: u32 = 4;

const POOL_MAX_IDLE_PER_HOST: usize = 10;
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// Hang guard for the whole request, body included.
const TOTAL_TIMEOUT: Duration = Duration::from_secs(300);

const MAX_REDIRECTS: usize = 10;

/// A builder for a [`FetchClient`].
#[derive(Debug, Clone)]
pub struct FetchClientBuilder {
    connect_timeout: Duration,
    retries: u32,
    user_agent: Option<String>,
}

impl Default for FetchClientBuilder {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            retries: DEFAULT_RETRIES,
            user_agent: None,
        }
    }
}

impl FetchClientBuilder {
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Pin the `User-Agent` instead of picking one from the pool.
    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn build(self) -> FetchClient {
        let user_agent = self
            .user_agent
            .unwrap_or_else(|| random_user_agent().to_string());

        let client_raw = ClientBuilder::new()
            .user_agent(user_agent)
            .danger_accept_invalid_certs(true)
            .connect_timeout(self.connect_timeout)
            .timeout(TOTAL_TIMEOUT)
            .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
            .pool_idle_timeout(POOL_IDLE_TIMEOUT)
            .redirect(same_host_redirects())
            .build()
            .expect("Fail to build HTTP client.");

        let retry_policy = ExponentialBackoff::builder()
            .retry_bounds(RETRY_MIN_WAIT, RETRY_MAX_WAIT)
            .build_with_max_retries(self.retries);
        let client = reqwest_middleware::ClientBuilder::new(client_raw)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        FetchClient { client }
    }
}

/// Redirects are followed within the responding host only; a redirect to
/// another host ends the chain and surfaces the 3xx response as-is.
fn same_host_redirects() -> redirect::Policy {
    redirect::Policy::custom(|attempt| {
        if attempt.previous().len() > MAX_REDIRECTS {
            return attempt.error("too many redirects");
        }
        let previous_host = attempt.previous().last().and_then(Url::host_str);
        if attempt.url().host_str() == previous_host {
            attempt.follow()
        } else {
            attempt.stop()
        }
    })
}

/// A client for pulling individual files off a remote web server.
///
/// The server is assumed to be hostile territory: certificates are not
/// verified, the `User-Agent` looks like a browser, and every response body
/// is capped at [`MAX_BODY_BYTES`].
#[derive(Debug, Clone)]
pub struct FetchClient {
    client: ClientWithMiddleware,
}

/// A completed GET: the final status line plus the (capped) body.
#[derive(Debug)]
pub struct Fetched {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

impl FetchClient {
    pub fn builder() -> FetchClientBuilder {
        FetchClientBuilder::default()
    }

    /// Issue a single GET, racing the cancellation token.
    ///
    /// Non-2xx statuses are not errors; the caller decides what a 404 means.
    pub async fn get(&self, url: Url, cancel: &CancellationToken) -> Result<Fetched, Error> {
        tokio::select! {
            () = cancel.cancelled() => Err(Error::Canceled),
            result = self.get_inner(url) => result,
        }
    }

    async fn get_inner(&self, url: Url) -> Result<Fetched, Error> {
        trace!("GET {url}");
        let mut response = self.client.get(url).send().await?;
        let status = response.status();

        if let Some(declared) = response.content_length() {
            if declared > MAX_BODY_BYTES {
                return Err(Error::TooLarge {
                    size: declared,
                    limit: MAX_BODY_BYTES,
                });
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if (body.len() + chunk.len()) as u64 > MAX_BODY_BYTES {
                return Err(Error::TooLarge {
                    size: (body.len() + chunk.len()) as u64,
                    limit: MAX_BODY_BYTES,
                });
            }
            body.extend_from_slice(&chunk);
        }

        Ok(Fetched { status, body })
    }
}
