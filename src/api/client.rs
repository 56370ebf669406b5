use std::io::{BufRead, Write};
use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, ORIGIN, REFERER};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::api::in_flight::InFlightGauge;
use crate::api::latency::{CallStage, LatencyStats};
use crate::config::client_headers;
use crate::error::{AppError, Result};

// ---------------------------------------------------------------------------
// BearerToken
// ---------------------------------------------------------------------------

/// Opaque bearer credential. Parsed once; never logged beyond a short prefix.
#[derive(Clone)]
pub struct BearerToken {
    raw: String,
    header: HeaderValue,
}

impl BearerToken {
    /// Accepts the token as copied from a browser: surrounding quotes and a
    /// leading `Bearer ` are stripped.
    pub fn parse(input: &str) -> Result<Self> {
        let unquote = |s: &str| s.trim().trim_matches(|c| c == '\'' || c == '"').trim().to_string();
        let quoted = unquote(input);
        let token = match quoted.split_once(char::is_whitespace) {
            Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => unquote(rest),
            None if quoted.eq_ignore_ascii_case("bearer") => String::new(),
            _ => quoted.clone(),
        };
        if token.is_empty() {
            return Err(AppError::Auth("bearer token is empty".to_string()));
        }
        if token.chars().any(char::is_whitespace) {
            return Err(AppError::Auth("bearer token contains whitespace".to_string()));
        }
        let mut header = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| AppError::Auth(format!("bearer token is not a valid header value: {e}")))?;
        header.set_sensitive(true);
        Ok(Self { raw: token.to_string(), header })
    }

    pub fn preview(&self) -> String {
        let prefix: String = self.raw.chars().take(12).collect();
        format!("{prefix}...")
    }
}

impl std::fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BearerToken({})", self.preview())
    }
}

/// Ask for the token on the terminal. The read blocks, so it runs on the
/// blocking pool rather than a runtime worker.
pub async fn prompt_token() -> Result<BearerToken> {
    prompt_with(|| std::io::stdin().lock(), std::io::stdout()).await
}

async fn prompt_with<F, R, W>(open_input: F, mut output: W) -> Result<BearerToken>
where
    F: FnOnce() -> R + Send + 'static,
    R: BufRead,
    W: Write + Send + 'static,
{
    let token = tokio::task::spawn_blocking(move || read_token(open_input(), &mut output))
        .await
        .map_err(|e| AppError::Internal(format!("token prompt task failed: {e}")))??;
    info!("Using bearer token '{}'", token.preview());
    Ok(token)
}

fn read_token(mut input: impl BufRead, output: &mut impl Write) -> Result<BearerToken> {
    writeln!(output, "Paste your bearer token (the Authorization header of a logged-in session)")?;
    write!(output, "Bearer Header: ")?;
    output.flush()?;

    let mut line = String::new();
    input.read_line(&mut line)?;
    BearerToken::parse(&line)
}

// ---------------------------------------------------------------------------
// ApiClient
// ---------------------------------------------------------------------------

/// Status and fully read body of one GET.
#[derive(Debug)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }
}

/// Shared HTTP client. Sends the client-identification headers on every call
/// and the bearer token when one is configured; instruments every call with
/// the latency histogram and the in-flight gauge.
pub struct ApiClient {
    http: reqwest::Client,
    bearer: Option<BearerToken>,
    latency: LatencyStats,
    in_flight: InFlightGauge,
}

impl ApiClient {
    pub fn new(timeout: Duration, bearer: Option<BearerToken>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ORIGIN, HeaderValue::from_static(client_headers::ORIGIN));
        headers.insert(REFERER, HeaderValue::from_static(client_headers::REFERER));
        headers.insert(
            HeaderName::from_static("x-app"),
            HeaderValue::from_static(client_headers::X_APP),
        );
        headers.insert(
            HeaderName::from_static("x-lang"),
            HeaderValue::from_static(client_headers::X_LANG),
        );

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(client_headers::USER_AGENT)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http,
            bearer,
            latency: LatencyStats::new(),
            in_flight: InFlightGauge::new(),
        })
    }

    /// GET and read the whole body. Errors are transport-level only (timeout,
    /// connection, body read); any HTTP status is returned as a response.
    pub async fn get(
        &self,
        url: &str,
        stage: CallStage,
    ) -> std::result::Result<ApiResponse, reqwest::Error> {
        let _guard = self.in_flight.enter();
        let started = Instant::now();

        let result = self.send(url).await;

        self.latency.record(stage, started.elapsed());
        if let Ok(resp) = &result {
            debug!(url, %stage, status = resp.status.as_u16(), in_flight = self.in_flight.current(), "GET");
        }
        result
    }

    async fn send(&self, url: &str) -> std::result::Result<ApiResponse, reqwest::Error> {
        let mut req = self.http.get(url);
        if let Some(token) = &self.bearer {
            req = req.header(AUTHORIZATION, token.header.clone());
        }
        let resp = req.send().await?;
        let status = resp.status();
        let body = resp.bytes().await?.to_vec();
        Ok(ApiResponse { status, body })
    }

    /// GET a resource the run cannot do without; any non-2xx is an error.
    pub async fn get_required<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let resp = self.get(url, CallStage::Bootstrap).await?;
        if !resp.status.is_success() {
            return Err(AppError::Bootstrap(format!("GET {url} returned {}", resp.status)));
        }
        info!("Request {url} OK");
        Ok(resp.json()?)
    }

    pub fn latency(&self) -> &LatencyStats {
        &self.latency
    }

    pub fn in_flight(&self) -> &InFlightGauge {
        &self.in_flight
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_strips_quotes_and_scheme() {
        let t = BearerToken::parse("  'Bearer eyJhbGciOiJSUzI1NiJ9.payload.sig'\n").unwrap();
        assert_eq!(t.raw, "eyJhbGciOiJSUzI1NiJ9.payload.sig");
        assert_eq!(t.preview(), "eyJhbGciOiJS...");
        assert!(t.header.is_sensitive());
    }

    #[test]
    fn token_rejects_empty_and_garbage() {
        assert!(matches!(BearerToken::parse("  ''  "), Err(AppError::Auth(_))));
        assert!(matches!(BearerToken::parse("Bearer   \"\""), Err(AppError::Auth(_))));
        assert!(matches!(BearerToken::parse("abc def"), Err(AppError::Auth(_))));
        assert!(matches!(BearerToken::parse("abc\u{7f}"), Err(AppError::Auth(_))));
    }

    struct SlowReader {
        delay: std::time::Duration,
        data: std::io::Cursor<Vec<u8>>,
    }

    impl std::io::Read for SlowReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            std::thread::sleep(std::mem::take(&mut self.delay));
            std::io::Read::read(&mut self.data, buf)
        }
    }

    #[test]
    fn read_token_prompts_then_parses_line() {
        let mut out = Vec::new();
        let t = read_token(std::io::Cursor::new("\"Bearer abc.def\"\nignored\n"), &mut out).unwrap();
        assert_eq!(t.raw, "abc.def");
        assert!(String::from_utf8(out).unwrap().ends_with("Bearer Header: "));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn prompt_does_not_stall_the_runtime() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let ticks = Arc::new(AtomicUsize::new(0));
        let ticker = {
            let ticks = Arc::clone(&ticks);
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                    ticks.fetch_add(1, Ordering::SeqCst);
                }
            })
        };

        let reader = SlowReader {
            delay: std::time::Duration::from_millis(300),
            data: std::io::Cursor::new(b"Bearer tok123\n".to_vec()),
        };
        let token = prompt_with(move || std::io::BufReader::new(reader), Vec::new()).await.unwrap();
        ticker.abort();

        assert_eq!(token.raw, "tok123");
        // The single runtime thread kept running timers while the read blocked.
        assert!(ticks.load(Ordering::SeqCst) >= 5, "ticks {}", ticks.load(Ordering::SeqCst));
    }

    #[test]
    fn debug_does_not_leak_token() {
        let t = BearerToken::parse("0123456789abcdefSECRET").unwrap();
        assert!(!format!("{t:?}").contains("SECRET"));
    }
}
