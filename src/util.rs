use std::{path::Path, sync::Arc};

use chrono::{DateTime, Duration, FixedOffset, Timelike};
use reqwest_cookie_store::CookieStoreMutex;
use tokio::{fs::File, io::AsyncWriteExt};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/58.0.3029.110 Safari/537.36";

/// Every request is sent once. Callers that want a retry own it.
pub struct HttpClient {
    pub client: reqwest::Client,
}

#[derive(thiserror::Error, Debug)]
pub enum HttpError {
    #[error("reqwest error: {0}")]
    ReqwestError(#[from] reqwest::Error),
    #[error("unexpected status {0}")]
    Status(reqwest::StatusCode),
}

impl HttpClient {
    pub fn new() -> reqwest::Result<HttpClient> {
        // Keeps consent cookies between channel pages.
        let cookies = Arc::new(CookieStoreMutex::default());

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .cookie_provider(cookies)
            .build()?;

        Ok(HttpClient { client })
    }

    pub async fn fetch_text(&self, url: &str) -> Result<String, HttpError> {
        let resp = self.client.get(url).send().await?;
        if !resp.status().is_success() {
            return Err(HttpError::Status(resp.status()));
        }
        resp.text().await.map_err(|e| e.into())
    }

    pub async fn post_text(&self, url: &str, body: String) -> Result<(), HttpError> {
        let resp = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(body)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(HttpError::Status(resp.status()));
        }
        Ok(())
    }
}

/// Writes `contents` next to `path` and renames it into place.
pub async fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let temp_path = path.with_extension("tmp");
    let mut file = File::create(&temp_path).await?;
    file.write_all(contents).await?;
    file.flush().await?;
    tokio::fs::rename(temp_path, path).await
}

const CLOCK_FACES: [&str; 24] = [
    "🕛", "🕧", "🕐", "🕜", "🕑", "🕝", "🕒", "🕞", "🕓", "🕟", "🕔", "🕠", "🕕", "🕡", "🕖",
    "🕢", "🕗", "🕣", "🕘", "🕤", "🕙", "🕥", "🕚", "🕦",
];

/// Clock face closest to the given wall time.
pub fn clock_emoji(dt: &DateTime<FixedOffset>) -> &'static str {
    let minute = dt.minute();
    let index = (dt.hour() % 12 * 2 + u32::from(minute >= 15) + u32::from(minute >= 45)) as usize;
    CLOCK_FACES[index % CLOCK_FACES.len()]
}

/// Human form of a signed duration, e.g. `1 day, 2:05:09` or `-0:03:00`.
pub fn format_delta(delta: Duration) -> String {
    let sign = if delta < Duration::zero() { "-" } else { "" };
    let total = delta.num_seconds().abs();
    let (days, rest) = (total / 86_400, total % 86_400);
    let (h, m, s) = (rest / 3600, rest % 3600 / 60, rest % 60);

    match days {
        0 => format!("{}{}:{:02}:{:02}", sign, h, m, s),
        1 => format!("{}1 day, {}:{:02}:{:02}", sign, h, m, s),
        d => format!("{}{} days, {}:{:02}:{:02}", sign, d, h, m, s),
    }
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;

    use super::*;
    use chrono::TimeZone;
    use tokio::{io::AsyncReadExt, net::TcpListener};

    /// Local HTTP server answering every request with `response`. Returns
    /// its base URL and the raw request heads it received.
    pub(crate) async fn serve(response: &'static str) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));

        let seen = requests.clone();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                let mut head = Vec::new();
                let mut buf = [0u8; 1024];
                while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => head.extend_from_slice(&buf[..n]),
                    }
                }
                seen.lock()
                    .unwrap()
                    .push(String::from_utf8_lossy(&head).into_owned());
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        (format!("http://{}", addr), requests)
    }

    #[tokio::test]
    async fn failed_fetch_is_sent_once() {
        let (url, requests) =
            serve("HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n").await;
        let client = HttpClient::new().unwrap();

        let result = client.fetch_text(&format!("{}/@alpha", url)).await;
        assert!(matches!(result, Err(HttpError::Status(s)) if s.as_u16() == 503));
        assert_eq!(requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn cookies_carry_over() {
        let (url, requests) = serve(
            "HTTP/1.1 200 OK\r\nSet-Cookie: CONSENT=YES+1; Path=/\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok",
        )
        .await;
        let client = HttpClient::new().unwrap();

        assert_eq!(client.fetch_text(&url).await.unwrap(), "ok");
        client.fetch_text(&url).await.unwrap();

        let requests = requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert!(!requests[0].contains("CONSENT=YES+1"));
        assert!(requests[1].contains("CONSENT=YES+1"));
    }

    #[test]
    fn clock_rounding() {
        let tz = FixedOffset::east_opt(7 * 3600).unwrap();
        let at = |h, m| tz.with_ymd_and_hms(2024, 2, 15, h, m, 0).unwrap();

        assert_eq!(clock_emoji(&at(0, 0)), "🕛");
        assert_eq!(clock_emoji(&at(12, 14)), "🕛");
        assert_eq!(clock_emoji(&at(12, 15)), "🕧");
        assert_eq!(clock_emoji(&at(12, 50)), "🕐");
        assert_eq!(clock_emoji(&at(23, 59)), "🕛");
    }

    #[test]
    fn delta_format() {
        assert_eq!(format_delta(Duration::seconds(65)), "0:01:05");
        assert_eq!(format_delta(Duration::minutes(-3)), "-0:03:00");
        assert_eq!(
            format_delta(Duration::days(1) + Duration::hours(2)),
            "1 day, 2:00:00"
        );
        assert_eq!(format_delta(Duration::days(3)), "3 days, 0:00:00");
    }

    #[test]
    fn escapes_markup() {
        assert_eq!(escape_html(r#"<b>"Tom" & 'Jerry'</b>"#), "&lt;b&gt;&quot;Tom&quot; &amp; &#39;Jerry&#39;&lt;/b&gt;");
    }
}
