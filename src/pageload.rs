/// End-to-end page load measurement against the dev server's local URL.
use std::time::{Duration, Instant};

/// Errors from the page-load collaborator.
#[derive(Debug)]
pub enum PageLoadError {
    /// Building the HTTP client failed.
    Client { source: reqwest::Error },
    /// The page request failed or timed out.
    Request { url: String, source: reqwest::Error },
}

impl std::fmt::Display for PageLoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PageLoadError::Client { source } => {
                write!(f, "failed to build HTTP client: {}", source)
            }
            PageLoadError::Request { url, source } => {
                write!(f, "failed to load {}: {}", url, source)
            }
        }
    }
}

impl std::error::Error for PageLoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PageLoadError::Client { source } => Some(source),
            PageLoadError::Request { source, .. } => Some(source),
        }
    }
}

/// Measures how long one page load takes, in milliseconds.
///
/// Seam between the session run loop and the browser/HTTP collaborator;
/// tests substitute a scripted loader.
pub trait PageLoader: Send + Sync {
    fn load(
        &self,
        url: &str,
    ) -> impl std::future::Future<Output = Result<f64, PageLoadError>> + Send;
}

/// Fetches the page over HTTP and reports elapsed wall-clock time.
pub struct HttpPageLoader {
    client: reqwest::Client,
}

impl HttpPageLoader {
    pub fn new(timeout: Duration) -> Result<Self, PageLoadError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PageLoadError::Client { source: e })?;
        Ok(Self { client })
    }
}

impl PageLoader for HttpPageLoader {
    async fn load(&self, url: &str) -> Result<f64, PageLoadError> {
        let start = Instant::now();
        let response = self.client.get(url).send().await.map_err(|e| {
            PageLoadError::Request {
                url: url.to_string(),
                source: e,
            }
        })?;
        // Pull the full document so the measurement covers the whole response
        response.bytes().await.map_err(|e| PageLoadError::Request {
            url: url.to_string(),
            source: e,
        })?;
        let elapsed = start.elapsed().as_secs_f64() * 1000.0;
        Ok((elapsed * 100.0).round() / 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_load_measures_a_local_page() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\nConnection: close\r\n\r\nhello")
                .await
                .unwrap();
        });

        let loader = HttpPageLoader::new(Duration::from_secs(5)).unwrap();
        let elapsed = loader.load(&format!("http://{}/", addr)).await.unwrap();
        assert!(elapsed >= 0.0);
        assert!(elapsed < 5000.0);
    }

    #[tokio::test]
    async fn test_load_unreachable_server_is_an_error() {
        let loader = HttpPageLoader::new(Duration::from_secs(1)).unwrap();
        // Port 1 is essentially never listening locally
        let err = loader.load("http://127.0.0.1:1/").await.unwrap_err();
        assert!(matches!(err, PageLoadError::Request { .. }));
        assert!(err.to_string().contains("failed to load"));
    }
}
