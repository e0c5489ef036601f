//! Answer providers - interchangeable ways to answer a request.
//!
//! The worker asks them in order and takes the first non-empty answer.
//! A provider that fails, times out or has nothing to say just hands the
//! request to the next one.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::record::RequestRecord;
use crate::config::QueueConfig;

/// History entries passed to the CLI.
const CLI_CONTEXT_ENTRIES: usize = 5;

#[async_trait]
pub trait AnswerProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Upper bound on one `answer` call.
    fn timeout(&self) -> Duration;

    /// `Ok(None)` means "no answer", `Err` a failure worth logging.
    async fn answer(&self, request: &RequestRecord) -> Result<Option<String>, String>;
}

/// POSTs the request record to a remote endpoint.
pub struct HttpProvider {
    url: String,
    timeout: Duration,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct HttpAnswer {
    response: Option<String>,
    answer: Option<String>,
}

impl HttpProvider {
    pub fn new(url: String, timeout: Duration) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| format!("Failed to build HTTP client: {e}"))?;
        Ok(Self { url, timeout, client })
    }
}

#[async_trait]
impl AnswerProvider for HttpProvider {
    fn name(&self) -> &str {
        "http"
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn answer(&self, request: &RequestRecord) -> Result<Option<String>, String> {
        let response = self
            .client
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(|e| format!("HTTP error: {e}"))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| format!("Failed to read response: {e}"))?;

        if !status.is_success() {
            return Err(format!("API error {status}: {}", truncate(&body, 200)));
        }

        Ok(Some(extract_answer(&body)))
    }
}

/// `response`, then `answer`, then the raw body.
fn extract_answer(body: &str) -> String {
    match serde_json::from_str::<HttpAnswer>(body) {
        Ok(HttpAnswer { response: Some(text), .. }) => text,
        Ok(HttpAnswer { answer: Some(text), .. }) => text,
        _ => body.to_string(),
    }
}

/// Runs a local CLI: `<program> --prompt <payload> --context <history>`.
pub struct CliProvider {
    program: String,
    timeout: Duration,
}

impl CliProvider {
    pub fn new(program: String, timeout: Duration) -> Self {
        Self { program, timeout }
    }
}

/// Render recent history as `role: content` lines.
pub fn render_context(request: &RequestRecord) -> String {
    let skip = request.context.len().saturating_sub(CLI_CONTEXT_ENTRIES);
    let mut context = String::new();
    for entry in request.context.iter().skip(skip) {
        context.push_str(&entry.role);
        context.push_str(": ");
        context.push_str(&entry.content);
        context.push('\n');
    }
    context
}

#[async_trait]
impl AnswerProvider for CliProvider {
    fn name(&self) -> &str {
        "cli"
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn answer(&self, request: &RequestRecord) -> Result<Option<String>, String> {
        let context = render_context(request);
        debug!("Running {} (prompt len={})", self.program, request.payload.len());

        // kill_on_drop: the chain's timeout drops this future, which must not
        // leave the child running.
        let output = Command::new(&self.program)
            .args(["--prompt", &request.payload, "--context", &context])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| format!("Failed to run {}: {e}", self.program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!("{} exited with {}: {}", self.program, output.status, truncate(stderr.trim(), 200)));
        }

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok(Some(stdout))
    }
}

/// Always answers. Counts as a successful answer, not an error.
pub struct FallbackProvider;

pub fn fallback_text(payload: &str) -> String {
    format!("[fallback] {payload}")
}

#[async_trait]
impl AnswerProvider for FallbackProvider {
    fn name(&self) -> &str {
        "fallback"
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(1)
    }

    async fn answer(&self, request: &RequestRecord) -> Result<Option<String>, String> {
        Ok(Some(fallback_text(&request.payload)))
    }
}

/// A provider's answer and who gave it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainAnswer {
    pub provider: String,
    pub text: String,
}

/// Providers in priority order.
pub struct ProviderChain {
    providers: Vec<Box<dyn AnswerProvider>>,
}

impl ProviderChain {
    pub fn new(providers: Vec<Box<dyn AnswerProvider>>) -> Self {
        Self { providers }
    }

    /// HTTP (if a URL is set), then CLI (if enabled), then fallback (if enabled).
    pub fn from_config(config: &QueueConfig) -> Result<Self, String> {
        let mut providers: Vec<Box<dyn AnswerProvider>> = Vec::new();
        if let Some(url) = &config.provider_url {
            providers.push(Box::new(HttpProvider::new(url.clone(), config.http_timeout())?));
        }
        if config.cli_enabled {
            providers.push(Box::new(CliProvider::new(
                config.cli_program.clone(),
                config.provider_timeout(),
            )));
        }
        if config.fallback_enabled {
            providers.push(Box::new(FallbackProvider));
        }
        Ok(Self::new(providers))
    }

    /// Longest one `answer` call can take.
    pub fn worst_case(&self) -> Duration {
        self.providers.iter().map(|p| p.timeout()).sum()
    }

    pub fn names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// First non-blank answer, or `None` if every provider came up empty.
    pub async fn answer(&self, request: &RequestRecord) -> Option<ChainAnswer> {
        for provider in &self.providers {
            let name = provider.name();
            match tokio::time::timeout(provider.timeout(), provider.answer(request)).await {
                Ok(Ok(Some(text))) if !text.trim().is_empty() => {
                    info!("Request {} answered by {}", request.id, name);
                    return Some(ChainAnswer {
                        provider: name.to_string(),
                        text,
                    });
                }
                Ok(Ok(_)) => debug!("Provider {} had no answer for {}", name, request.id),
                Ok(Err(e)) => warn!("Provider {} failed for {}: {}", name, request.id, e),
                Err(_) => warn!(
                    "Provider {} timed out after {}s for {}",
                    name,
                    provider.timeout().as_secs_f32(),
                    request.id
                ),
            }
        }
        None
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_chars).collect();
        format!("{head}...")
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedProvider;
    use super::*;
    use crate::queue::record::{HistoryEntry, ROLE_ASSISTANT, ROLE_USER};
    use std::sync::atomic::Ordering;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    fn request(prompt: &str) -> RequestRecord {
        RequestRecord::new(1, prompt, vec![])
    }

    #[tokio::test]
    async fn test_first_answer_wins() {
        let second = ScriptedProvider::new("second", Ok(Some("later".into())));
        let second_calls = second.calls.clone();
        let chain = ProviderChain::new(vec![
            Box::new(ScriptedProvider::new("first", Ok(Some("early".into())))),
            Box::new(second),
        ]);

        let answer = chain.answer(&request("q")).await.unwrap();
        assert_eq!(answer.provider, "first");
        assert_eq!(answer.text, "early");
        assert_eq!(second_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failures_and_blanks_fall_through() {
        let chain = ProviderChain::new(vec![
            Box::new(ScriptedProvider::new("broken", Err("boom".into()))),
            Box::new(ScriptedProvider::new("silent", Ok(None))),
            Box::new(ScriptedProvider::new("blank", Ok(Some("  \n".into())))),
            Box::new(FallbackProvider),
        ]);

        let answer = chain.answer(&request("2+2")).await.unwrap();
        assert_eq!(answer.provider, "fallback");
        assert_eq!(answer.text, "[fallback] 2+2");
    }

    #[tokio::test]
    async fn test_slow_provider_times_out() {
        let mut slow = ScriptedProvider::new("slow", Ok(Some("too late".into())));
        slow.delay = Duration::from_millis(500);
        slow.timeout = Duration::from_millis(20);

        let chain = ProviderChain::new(vec![Box::new(slow), Box::new(FallbackProvider)]);
        let answer = chain.answer(&request("q")).await.unwrap();
        assert_eq!(answer.provider, "fallback");
    }

    #[test]
    fn test_worst_case_sums_timeouts() {
        let mut slow = ScriptedProvider::new("slow", Ok(None));
        slow.timeout = Duration::from_secs(30);
        let chain = ProviderChain::new(vec![Box::new(slow), Box::new(FallbackProvider)]);
        assert_eq!(chain.worst_case(), Duration::from_secs(31));
    }

    #[tokio::test]
    async fn test_empty_chain_has_no_answer() {
        let chain = ProviderChain::new(vec![]);
        assert!(chain.answer(&request("q")).await.is_none());
    }

    #[tokio::test]
    async fn test_missing_cli_is_a_failure() {
        let cli = CliProvider::new("voxrelay-no-such-binary".into(), Duration::from_secs(5));
        let result = cli.answer(&request("q")).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_render_context_uses_last_five() {
        let mut req = request("q");
        for i in 0..7 {
            let role = if i % 2 == 0 { ROLE_USER } else { ROLE_ASSISTANT };
            req.context.push(HistoryEntry::new(role, format!("m{i}")));
        }

        let ctx = render_context(&req);
        let lines: Vec<_> = ctx.lines().collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], "user: m2");
        assert_eq!(lines[4], "user: m6");
    }

    /// Serves one HTTP exchange on a local port. Yields the request body.
    async fn serve_once(status: &'static str, body: &'static str) -> (String, oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            let received = loop {
                let n = socket.read(&mut chunk).await.unwrap();
                buf.extend_from_slice(&chunk[..n]);
                if let Some(body) = complete_body(&buf) {
                    break body;
                }
                if n == 0 {
                    break String::new();
                }
            };
            let reply = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(reply.as_bytes()).await.unwrap();
            let _ = tx.send(received);
        });
        (format!("http://{addr}/ask"), rx)
    }

    fn complete_body(buf: &[u8]) -> Option<String> {
        let text = String::from_utf8_lossy(buf);
        let (head, body) = text.split_once("\r\n\r\n")?;
        let len = head
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        (body.len() >= len).then(|| body.to_string())
    }

    #[tokio::test]
    async fn test_http_posts_record_and_reads_answer() {
        let (url, received) = serve_once("200 OK", r#"{"response":"x"}"#).await;
        let http = HttpProvider::new(url, Duration::from_secs(5)).unwrap();

        let answer = http.answer(&request("ping")).await;
        assert_eq!(answer, Ok(Some("x".to_string())));

        let posted: serde_json::Value = serde_json::from_str(&received.await.unwrap()).unwrap();
        assert_eq!(posted["prompt"], "ping");
        assert_eq!(posted["user_id"], 1);
    }

    #[tokio::test]
    async fn test_http_error_status_is_a_failure() {
        let (url, _received) = serve_once("500 Internal Server Error", r#"{"detail":"down"}"#).await;
        let http = HttpProvider::new(url, Duration::from_secs(5)).unwrap();

        let err = http.answer(&request("ping")).await.unwrap_err();
        assert!(err.contains("500"), "{err}");
        assert!(err.contains("down"), "{err}");
    }

    #[test]
    fn test_extract_answer() {
        assert_eq!(extract_answer(r#"{"response":"a"}"#), "a");
        assert_eq!(extract_answer(r#"{"answer":"b"}"#), "b");
        assert_eq!(extract_answer(r#"{"other":1}"#), r#"{"other":1}"#);
        assert_eq!(extract_answer("plain"), "plain");
    }

    #[test]
    fn test_from_config_order() {
        let config = QueueConfig {
            provider_url: Some("http://127.0.0.1:1/ask".into()),
            ..QueueConfig::default()
        };
        let chain = ProviderChain::from_config(&config).unwrap();
        assert_eq!(chain.names(), vec!["http", "cli", "fallback"]);

        let config = QueueConfig {
            cli_enabled: false,
            ..QueueConfig::default()
        };
        let chain = ProviderChain::from_config(&config).unwrap();
        assert_eq!(chain.names(), vec!["fallback"]);
    }
}
