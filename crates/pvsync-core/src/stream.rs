//! HTTP streaming with gzip decompression and read timeout.
//!
//! Uses async reqwest internally with tokio::time::timeout for stall detection,
//! but presents a sync `Read` so the engine loop stays single-threaded.

use std::io::{self, BufReader, Read};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, OnceLock};
use std::task::Context;
use std::time::Duration;

use flate2::read::MultiGzDecoder;
use futures_util::StreamExt;
use tokio::io::{AsyncRead, ReadBuf};

/// HTTP timeouts, set once by the binary before the first request.
#[derive(Debug, Clone, Copy)]
pub struct HttpConfig {
    /// No data for this long = stall
    pub read_timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(30),
        }
    }
}

static HTTP_CONFIG: OnceLock<HttpConfig> = OnceLock::new();

/// Install HTTP timeouts. Only the first call has any effect.
pub fn set_http_config(config: HttpConfig) {
    if HTTP_CONFIG.set(config).is_err() {
        log::debug!("HTTP config already set, ignoring");
    }
}

fn http_config() -> HttpConfig {
    *HTTP_CONFIG.get_or_init(HttpConfig::default)
}

/// Failure to open or read a remote stream
#[derive(Debug)]
pub enum StreamError {
    /// Server answered with a non-success status
    Status { code: u16, url: String },
    /// Connection, TLS or protocol failure before a status was received
    Request { message: String },
    /// Local I/O, including read stalls
    Io(io::Error),
}

impl std::fmt::Display for StreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Status { code, url } => write!(f, "HTTP {code} for {url}"),
            Self::Request { message } => write!(f, "request failed: {message}"),
            Self::Io(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl std::error::Error for StreamError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl StreamError {
    pub fn from_reqwest(e: &reqwest::Error) -> Self {
        match e.status() {
            Some(status) => Self::Status {
                code: status.as_u16(),
                url: e.url().map_or_else(String::new, |u| u.to_string()),
            },
            None => Self::Request {
                message: e.to_string(),
            },
        }
    }

    /// Whether the remote resource is missing rather than temporarily unreachable.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Status { code: 404 | 410, .. })
    }
}

impl From<io::Error> for StreamError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

/// Shared async HTTP client with connection pooling.
static SHARED_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .connect_timeout(http_config().connect_timeout)
        .user_agent(concat!("pvsync/", env!("CARGO_PKG_VERSION")))
        .pool_max_idle_per_host(1)
        .build()
        .expect("failed to build HTTP client")
});

/// Shared tokio runtime driving the one in-flight download.
pub static SHARED_RUNTIME: LazyLock<tokio::runtime::Runtime> = LazyLock::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
});

/// Buffer for decompressed lines (256KB)
const GZIP_BUF_SIZE: usize = 256 * 1024;

/// Compressed bytes consumed so far, shared with progress bars
pub type ByteCounter = Arc<AtomicU64>;

/// Decompressed, buffered view of a gzip byte source
pub type GzipLines<R> = BufReader<MultiGzDecoder<CountingReader<R>>>;

/// Decompressed HTTP response body
pub type GzipReader = GzipLines<TimeoutReader>;

/// Wrap any gzip byte source, counting compressed bytes as they are consumed.
pub fn gzip_lines<R: Read>(inner: R) -> (GzipLines<R>, ByteCounter) {
    let counter = ByteCounter::default();
    let counting = CountingReader::new(inner, Arc::clone(&counter));
    let reader = BufReader::with_capacity(GZIP_BUF_SIZE, MultiGzDecoder::new(counting));
    (reader, counter)
}

/// An opened download.
pub struct Download {
    pub reader: GzipReader,
    pub counter: ByteCounter,
    /// Content-Length of the compressed body, if sent
    pub total_bytes: Option<u64>,
}

/// HTTP GET a gzip file and return a streaming decompressed reader.
///
/// Only the response head is awaited here; the body is pulled lazily by reads.
pub fn open_gzip_reader(url: &str) -> Result<Download, StreamError> {
    let (body, total_bytes) = SHARED_RUNTIME.handle().block_on(async {
        let response = SHARED_CLIENT
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| StreamError::from_reqwest(&e))?;

        let total_bytes = response.content_length();
        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(io::Error::other));
        let body = tokio_util::io::StreamReader::new(stream);

        Ok::<_, StreamError>((TimeoutReader::new(Box::pin(body)), total_bytes))
    })?;

    let (reader, counter) = gzip_lines(body);
    Ok(Download {
        reader,
        counter,
        total_bytes,
    })
}

/// Reader wrapper that tracks bytes read
pub struct CountingReader<R> {
    inner: R,
    count: ByteCounter,
}

impl<R> CountingReader<R> {
    pub fn new(inner: R, count: ByteCounter) -> Self {
        Self { inner, count }
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count.fetch_add(n as u64, Ordering::Relaxed);
        Ok(n)
    }
}

/// Async-to-sync bridge; a read that sees no data within the configured
/// read timeout fails with `TimedOut`.
pub struct TimeoutReader {
    inner: Pin<Box<dyn AsyncRead + Send + Sync>>,
    timeout: Duration,
}

impl TimeoutReader {
    fn new(inner: Pin<Box<dyn AsyncRead + Send + Sync>>) -> Self {
        Self {
            inner,
            timeout: http_config().read_timeout,
        }
    }
}

impl Read for TimeoutReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let timeout = self.timeout;
        let inner = &mut self.inner;
        SHARED_RUNTIME.handle().block_on(async {
            let mut read_buf = ReadBuf::new(buf);
            let poll = std::future::poll_fn(|cx: &mut Context<'_>| {
                inner.as_mut().poll_read(cx, &mut read_buf)
            });
            match tokio::time::timeout(timeout, poll).await {
                Ok(result) => result.map(|()| read_buf.filled().len()),
                Err(_) => Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("no data for {}s", timeout.as_secs()),
                )),
            }
        })
    }
}
