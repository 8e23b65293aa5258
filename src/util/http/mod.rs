use std::time::{Duration, Instant};

use once_cell::sync::{Lazy, OnceCell};
use reqwest::{header, Client, Method, RequestBuilder};
use serde::Serialize;
use tokio::sync::Semaphore;

use crate::logging::Logger;

pub mod element;
pub mod user_agent;

/// A semaphore for limiting concurrent requests.
///
/// At most 5 requests are in flight at once so upstream sites are not hammered.
static SEMAPHORE: Lazy<Semaphore> = Lazy::new(|| Semaphore::new(5));

/// A singleton instance of the reqwest client.
static CLIENT: OnceCell<Client> = OnceCell::new();

static LOGGER: Lazy<Logger> = Lazy::new(|| Logger::new("http"));

/// Status line and body of a completed request. Non-2xx statuses are not
/// errors at this layer; callers classify them.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Why a request produced no usable response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpErrorKind {
    /// Timeouts, refused connections and truncated bodies. Worth another try.
    Transport,
    /// The request could not be built, so it never will be.
    Invalid,
    /// The upstream answered with something unusable, such as a redirect loop
    /// or a body that does not decode.
    Unusable,
}

/// A request that produced no response.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct HttpError {
    pub message: String,
    pub kind: HttpErrorKind,
}

impl HttpError {
    fn from_reqwest(context: &str, why: reqwest::Error) -> Self {
        HttpError {
            kind: classify_reqwest(&why),
            // the raw url may carry an api key or bot token; context is already redacted
            message: format!("{} failed because {:?}", context, why.without_url()),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind == HttpErrorKind::Transport
    }
}

fn classify_reqwest(why: &reqwest::Error) -> HttpErrorKind {
    if why.is_builder() {
        HttpErrorKind::Invalid
    } else if why.is_timeout() || why.is_connect() || why.is_request() || why.is_body() {
        HttpErrorKind::Transport
    } else {
        HttpErrorKind::Unusable
    }
}

/// Returns the reqwest client singleton instance or creates one if it doesn't exist.
fn get_client() -> Result<&'static Client, HttpError> {
    CLIENT.get_or_try_init(|| {
        Client::builder()
            .brotli(true)
            .gzip(true)
            .connect_timeout(Duration::from_secs(8))
            .tcp_nodelay(true)
            .tcp_keepalive(Duration::from_secs(60))
            .http2_keep_alive_interval(Duration::from_secs(30))
            .http2_keep_alive_timeout(Duration::from_secs(10))
            .http2_keep_alive_while_idle(true)
            .pool_max_idle_per_host(20)
            .pool_idle_timeout(Duration::from_secs(90))
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::limited(5))
            .referer(true)
            .build()
            .map_err(|why| HttpError {
                message: format!("Failed to create reqwest client: {:?}", why),
                kind: HttpErrorKind::Invalid,
            })
    })
}

/// Performs an HTTP GET request and returns the status and body text.
///
/// # Arguments
///
/// * `url`: The URL to send the GET request to.
/// * `timeout`: Upper bound for the whole request, body included.
pub async fn get(url: &str, timeout: Duration) -> Result<HttpResponse, HttpError> {
    send(Method::GET, url, timeout, None::<fn(_) -> _>).await
}

/// Performs an HTTP POST request with a JSON body.
pub async fn post_json<REQ: Serialize + ?Sized>(
    url: &str,
    req: &REQ,
    timeout: Duration,
) -> Result<HttpResponse, HttpError> {
    send(
        Method::POST,
        url,
        timeout,
        Some(|rb: RequestBuilder| rb.json(req)),
    )
    .await
}

/// Removes query values that carry credentials before a URL reaches a log line.
pub fn redact_url(url: &str) -> String {
    match url.split_once('?') {
        None => url.to_string(),
        Some((path, query)) => {
            let query = query
                .split('&')
                .map(|pair| match pair.split_once('=') {
                    Some((key, _)) if is_secret_key(key) => format!("{}=***", key),
                    _ => pair.to_string(),
                })
                .collect::<Vec<_>>()
                .join("&");
            format!("{}?{}", path, query)
        }
    }
}

fn is_secret_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key.contains("key") || key.contains("token") || key.contains("secret")
}

/// Removes the bot token segment from a Telegram style `/bot<token>/method` URL.
pub fn redact_bot_token(url: &str) -> String {
    match url.find("/bot") {
        Some(start) => {
            let token_start = start + 4;
            match url[token_start..].find('/') {
                Some(end) => format!("{}***{}", &url[..token_start], &url[token_start + end..]),
                None => format!("{}***", &url[..token_start]),
            }
        }
        None => url.to_string(),
    }
}

/// Sends one HTTP request with a fresh identity.
///
/// Every call gets its own `User-Agent` and `Accept-Language` and an explicit
/// timeout. No retry happens here; the caller owns the retry policy.
async fn send(
    method: Method,
    url: &str,
    timeout: Duration,
    body: Option<impl FnOnce(RequestBuilder) -> RequestBuilder>,
) -> Result<HttpResponse, HttpError> {
    let visit_log = format!("{}:{}", method, redact_bot_token(&redact_url(url)));
    let client = get_client()?;
    let mut rb = client
        .request(method, url)
        .timeout(timeout)
        .header(header::USER_AGENT, user_agent::gen_random_ua())
        .header(header::ACCEPT_LANGUAGE, user_agent::gen_accept_language());

    if let Some(body_fn) = body {
        rb = body_fn(rb);
    }

    let permit = SEMAPHORE.acquire().await;
    let start = Instant::now();
    let res = rb.send().await;
    let response = match res {
        Ok(response) => response,
        Err(why) => {
            drop(permit);
            let err = HttpError::from_reqwest(&visit_log, why);
            LOGGER.error(format!("{} {} ms", err.message, start.elapsed().as_millis()));
            return Err(err);
        }
    };

    let status = response.status().as_u16();
    let text = response.text().await;
    let elapsed = start.elapsed().as_millis();
    drop(permit);

    match text {
        Ok(body) => {
            LOGGER.info(format!("{} {} {} ms", visit_log, status, elapsed));
            Ok(HttpResponse { status, body })
        }
        Err(why) => {
            let err = HttpError::from_reqwest(&visit_log, why);
            LOGGER.error(format!("{} {} ms", err.message, elapsed));
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use wiremock::{
        matchers::{header_exists, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use super::*;

    #[tokio::test]
    async fn test_get_returns_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/quote"))
            .and(header_exists("user-agent"))
            .and(header_exists("accept-language"))
            .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
            .mount(&server)
            .await;

        let res = get(&format!("{}/quote", server.uri()), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(res.status, 503);
        assert_eq!(res.body, "busy");
        assert!(!res.is_success());
    }

    #[tokio::test]
    async fn test_get_times_out_as_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let err = get(&server.uri(), Duration::from_millis(50)).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_redirect_loop_is_unusable() {
        let server = MockServer::start().await;
        let target = format!("{}/loop", server.uri());
        Mock::given(method("GET"))
            .and(path("/loop"))
            .respond_with(ResponseTemplate::new(302).insert_header("location", target.as_str()))
            .mount(&server)
            .await;

        let err = get(&target, Duration::from_secs(5)).await.unwrap_err();
        assert_eq!(err.kind, HttpErrorKind::Unusable);
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_unbuildable_request_is_invalid() {
        let err = get("not a url", Duration::from_secs(5)).await.unwrap_err();
        assert_eq!(err.kind, HttpErrorKind::Invalid);
    }

    #[tokio::test]
    async fn test_post_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/send"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"ok":true}"#))
            .mount(&server)
            .await;

        let res = post_json(
            &format!("{}/send", server.uri()),
            &serde_json::json!({"text": "hi"}),
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        assert!(res.is_success());
        assert_eq!(res.body, r#"{"ok":true}"#);
    }

    #[test]
    fn test_redact_url() {
        assert_eq!(
            redact_url("https://api.example.com/price?symbol=DAX&apikey=abc123"),
            "https://api.example.com/price?symbol=DAX&apikey=***"
        );
        assert_eq!(redact_url("https://example.com/page"), "https://example.com/page");
    }

    #[test]
    fn test_redact_bot_token() {
        assert_eq!(
            redact_bot_token("https://api.telegram.org/bot123:ABC/sendMessage"),
            "https://api.telegram.org/bot***/sendMessage"
        );
    }
}
