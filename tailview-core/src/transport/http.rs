use futures_util::StreamExt;
use reqwest::{
    Client,
    header::{ACCEPT, CACHE_CONTROL, CONTENT_TYPE, HeaderMap},
};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use super::{NoticeSender, ReadyState, RetryPolicy, StreamHandle, Transport};
use crate::{
    error::{TailError, TailResult},
    request::with_last_event_id,
    sse::SseDecoder,
};

const EVENT_STREAM: &str = "text/event-stream";
const LAST_EVENT_ID_HEADER: &str = "Last-Event-ID";

/// Streams `text/event-stream` responses over HTTP with `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    retry: RetryPolicy,
    auth_token: Option<String>,
}

impl HttpTransport {
    /// Streams through `client`, retrying interrupted streams per `retry`.
    #[must_use]
    pub fn new(client: Client, retry: RetryPolicy) -> Self {
        Self {
            client,
            retry,
            auth_token: None,
        }
    }

    /// Sends `token` as a bearer credential on every request.
    #[must_use]
    pub fn with_auth_token(mut self, token: Option<String>) -> Self {
        self.auth_token = token.filter(|t| !t.is_empty());
        self
    }

    /// Policy applied when a stream is interrupted.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }
}

impl Transport for HttpTransport {
    fn open(&self, url: Url, notices: NoticeSender) -> TailResult<StreamHandle> {
        if !matches!(url.scheme(), "http" | "https") {
            return Err(TailError::transport_open(format!(
                "unsupported scheme '{}'",
                url.scheme()
            )));
        }
        let runtime = Handle::try_current().map_err(|err| TailError::transport_open(err.to_string()))?;

        let token = CancellationToken::new();
        let worker = StreamWorker {
            client: self.client.clone(),
            retry: self.retry,
            auth_token: self.auth_token.clone(),
            url,
            notices,
            decoder: SseDecoder::new(),
        };
        let task = runtime.spawn(worker.run(token.clone()));
        Ok(StreamHandle::new(token, task))
    }
}

/// How a single request ended.
enum Attempt {
    /// The server answered with something that is not an event stream.
    Rejected(String),
    /// The stream failed or ended and may be retried.
    Ended {
        opened: bool,
        detail: Option<String>,
    },
    /// Nobody is listening any more.
    Abandoned,
}

struct StreamWorker {
    client: Client,
    retry: RetryPolicy,
    auth_token: Option<String>,
    url: Url,
    notices: NoticeSender,
    decoder: SseDecoder,
}

impl StreamWorker {
    async fn run(mut self, token: CancellationToken) {
        let generation = self.notices.generation();
        tokio::select! {
            () = token.cancelled() => {
                debug!(generation, "stream cancelled");
            }
            () = self.stream_with_retries() => {
                debug!(generation, "stream worker finished");
            }
        }
    }

    async fn stream_with_retries(&mut self) {
        let mut attempt = 0u32;
        loop {
            match self.stream_once().await {
                Attempt::Abandoned => return,
                Attempt::Rejected(detail) => {
                    warn!(url = %self.url, %detail, "stream rejected");
                    self.notices.error(ReadyState::Closed, Some(detail));
                    return;
                }
                Attempt::Ended { opened, detail } => {
                    if opened {
                        attempt = 0;
                    }
                    if !self.retry.allows(attempt) {
                        info!(url = %self.url, attempts = attempt, "stream closed");
                        self.notices.error(ReadyState::Closed, detail);
                        return;
                    }

                    let delay = self
                        .retry
                        .delay_for(attempt, self.decoder.reconnection_time());
                    attempt += 1;
                    warn!(
                        url = %self.url,
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        detail = detail.as_deref().unwrap_or("end of stream"),
                        "stream interrupted, retrying"
                    );
                    if !self.notices.error(ReadyState::Connecting, detail) {
                        return;
                    }
                    tokio::time::sleep(delay).await;
                    self.decoder.reset_pending();
                }
            }
        }
    }

    /// The stream URL with `lastEventId` moved up to the last id seen.
    fn request_url(&self) -> Url {
        match self.decoder.last_event_id() {
            "" => self.url.clone(),
            id => with_last_event_id(&self.url, id),
        }
    }

    async fn stream_once(&mut self) -> Attempt {
        let mut request = self
            .client
            .get(self.request_url())
            .header(ACCEPT, EVENT_STREAM)
            .header(CACHE_CONTROL, "no-cache");
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }
        let last_event_id = self.decoder.last_event_id();
        if !last_event_id.is_empty() {
            request = request.header(LAST_EVENT_ID_HEADER, last_event_id);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => {
                return Attempt::Ended {
                    opened: false,
                    detail: Some(err.to_string()),
                };
            }
        };

        let status = response.status();
        if !status.is_success() {
            return Attempt::Rejected(format!("server responded with {status}"));
        }
        if !is_event_stream(response.headers()) {
            return Attempt::Rejected(format!("expected {EVENT_STREAM} response"));
        }

        if !self.notices.opened() {
            return Attempt::Abandoned;
        }

        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(bytes) => {
                    for frame in self.decoder.feed(&bytes) {
                        if !self.notices.frame(frame) {
                            return Attempt::Abandoned;
                        }
                    }
                }
                Err(err) => {
                    return Attempt::Ended {
                        opened: true,
                        detail: Some(err.to_string()),
                    };
                }
            }
        }

        Attempt::Ended {
            opened: true,
            detail: None,
        }
    }
}

fn is_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| {
            value
                .trim_start()
                .to_ascii_lowercase()
                .starts_with(EVENT_STREAM)
        })
}
