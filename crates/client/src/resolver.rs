//! Favicon resolution pipeline.
//!
//! Resolution order for one canonical base URL:
//!
//! 1. Fresh cache entry — returned without any network traffic.
//! 2. `<base>/favicon.ico`, following redirects to its real location.
//! 3. `<link rel="icon">` declarations in the page head.
//!
//! Whatever wins is made absolute, verified with one more probe
//! (servers lie: a 200 page behind a redirect-to-login is not an
//! icon), and written back to the cache. Every not-found condition
//! collapses into the configured default value.

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use favik_core::cache::cache_key;
use favik_core::{AppConfig, CacheStore, Error, FileCache};

use crate::extract::{DomHeadExtractor, HeadExtractor, select_icon};
use crate::fetch::url::base_url;
use crate::fetch::{HttpTransport, Transport, TransportConfig};

/// Outcome of following redirects for one target URL.
///
/// Both fields `None` means the transport produced no usable response
/// for the very first request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpProbeResult {
    /// Final numeric status, once redirects are exhausted.
    pub status: Option<u16>,
    /// URL the final status was observed at.
    pub url: Option<String>,
}

impl HttpProbeResult {
    fn unavailable() -> Self {
        Self { status: None, url: None }
    }

    /// Whether the probe ended on a 200.
    pub fn is_success(&self) -> bool {
        self.status == Some(200)
    }
}

/// Shape of the value returned by [`Resolver::get`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Absolute favicon URL.
    Url,
    /// Raw image bytes fetched from the resolved URL.
    RawImage,
    /// On-disk cache path for this URL, whether or not caching is on.
    CachedFilePath,
}

/// A resolved favicon, shaped by [`OutputMode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    Url(String),
    Image(Bytes),
    CachedFilePath(PathBuf),
}

/// Favicon resolver over injected transport, parser, and cache.
///
/// Each `get` call performs a strictly sequential chain of probes;
/// instances share no state beyond the cache directory on disk.
pub struct Resolver {
    config: AppConfig,
    transport: Arc<dyn Transport>,
    extractor: Arc<dyn HeadExtractor>,
    cache: Arc<dyn CacheStore>,
}

impl Resolver {
    /// Build a resolver with production collaborators.
    pub fn new(config: AppConfig) -> Result<Self, Error> {
        let transport = HttpTransport::new(TransportConfig {
            user_agent: config.user_agent.clone(),
            timeout: config.timeout(),
            max_redirects: config.max_redirects,
        })?;
        let cache = FileCache::new(config.cache_dir.clone());

        Ok(Self::with_collaborators(config, Arc::new(transport), Arc::new(DomHeadExtractor), Arc::new(cache)))
    }

    /// Build a resolver with explicit collaborators.
    pub fn with_collaborators(
        config: AppConfig,
        transport: Arc<dyn Transport>,
        extractor: Arc<dyn HeadExtractor>,
        cache: Arc<dyn CacheStore>,
    ) -> Self {
        Self { config, transport, extractor, cache }
    }

    /// Discover the real status of `url` by following redirects.
    ///
    /// A 301/302 response with a `Location` header moves the probe to
    /// that target (the last value, when the header repeats); a
    /// redirect without one terminates the loop at the current
    /// status and URL. The loop is bounded by `max_redirects`, so a
    /// redirect cycle reports its non-200 status instead of hanging.
    pub async fn probe(&self, url: &str) -> HttpProbeResult {
        if url.is_empty() {
            return HttpProbeResult::unavailable();
        }

        let mut current = url.to_string();
        let mut status: Option<u16> = None;
        let mut hops = 0;

        loop {
            let header = match self.transport.retrieve_header(&current).await {
                Some(header) => header,
                None if status.is_none() => return HttpProbeResult::unavailable(),
                None => break,
            };

            match header.status() {
                Some(code) => status = Some(code),
                None if status.is_none() => return HttpProbeResult::unavailable(),
                None => break,
            }

            if !matches!(status, Some(301) | Some(302)) {
                break;
            }

            let Some(target) = header.location.as_ref().and_then(|location| location.target()) else {
                break;
            };

            hops += 1;
            if hops > self.config.max_redirects {
                tracing::debug!("redirect cap of {} reached at {}", self.config.max_redirects, current);
                break;
            }

            current = target.to_string();
        }

        HttpProbeResult { status, url: Some(current) }
    }

    /// Resolve the favicon for `url_override`, or for the configured
    /// URL when no override is given.
    ///
    /// # Errors
    ///
    /// `NoUrl` when both the override and the configured URL are
    /// empty; `InvalidUrl` when the effective URL is not an absolute
    /// http(s) URL. A favicon that cannot be found is not an error:
    /// the configured default value is returned instead.
    pub async fn get(&self, url_override: Option<&str>, mode: OutputMode) -> Result<Resolved, Error> {
        let effective = match url_override {
            Some(url) if !url.is_empty() => url,
            _ if !self.config.url.is_empty() => self.config.url.as_str(),
            _ => return Err(Error::NoUrl),
        };

        // Base URL without its trailing slash, for clean concatenations.
        let base = base_url(effective, false).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        let base = base.trim_end_matches('/').to_string();
        let key = cache_key(&base);

        let mut favicon: Option<String> = None;
        let mut from_cache = false;

        if self.config.cache_enabled()
            && self.cache.is_readable(&key)
            && self.cache.is_fresh(&key, self.config.cache_timeout())
            && let Some(value) = self.cache.read(&key)
        {
            favicon = Some(String::from_utf8_lossy(&value).into_owned());
            from_cache = true;
            tracing::debug!("cache hit for {}", base);
        }

        // Try the conventional location first.
        if favicon.is_none() {
            let probe = self.probe(&format!("{base}/favicon.ico")).await;
            if probe.is_success() {
                favicon = probe.url;
            }
        }

        // Fall back to whatever the page head declares.
        if favicon.is_none()
            && let Some(body) = self.transport.retrieve_url(&format!("{base}/")).await
        {
            let html = String::from_utf8_lossy(&body);
            let candidates = self.extractor.link_candidates(&html);
            favicon = select_icon(&candidates).map(str::to_string);
            if favicon.is_some() {
                tracing::debug!("favicon declared in head of {}", base);
            }
        }

        let Some(mut favicon) = favicon else {
            return Ok(self.fallback());
        };

        if !from_cache {
            // A relative or root-relative href hangs off the base URL.
            // Plain concatenation, not an RFC 3986 merge.
            if !has_scheme(&favicon) {
                favicon = format!("{base}/{}", favicon.trim_start_matches('/'));
            }

            let verify = self.probe(&favicon).await;
            if !verify.is_success() {
                tracing::debug!("verification of {} failed with status {:?}", favicon, verify.status);
                return Ok(self.fallback());
            }

            if self.config.cache_enabled() {
                let stale = !self.cache.is_fresh(&key, self.config.cache_timeout());
                if !self.cache.exists(&key) || (stale && self.cache.is_writable(&key)) {
                    if let Err(e) = self.cache.write(&key, favicon.as_bytes()) {
                        tracing::warn!("cache write for {} failed: {}", base, e);
                    }
                }
            }
        }

        self.shape(favicon, &key, mode).await
    }

    fn fallback(&self) -> Resolved {
        Resolved::Url(self.config.default_value.clone())
    }

    async fn shape(&self, favicon: String, key: &str, mode: OutputMode) -> Result<Resolved, Error> {
        match mode {
            OutputMode::Url => Ok(Resolved::Url(favicon)),
            OutputMode::RawImage => match self.transport.retrieve_url(&favicon).await {
                Some(bytes) => Ok(Resolved::Image(bytes)),
                None => Ok(self.fallback()),
            },
            OutputMode::CachedFilePath => Ok(Resolved::CachedFilePath(self.cache.entry_path(key))),
        }
    }
}

fn has_scheme(url: &str) -> bool {
    url::Url::parse(url).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{Location, RawHeader};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, SystemTime};

    #[derive(Default)]
    struct FakeTransport {
        headers: HashMap<String, RawHeader>,
        bodies: HashMap<String, &'static str>,
        header_calls: AtomicUsize,
        body_calls: AtomicUsize,
    }

    impl FakeTransport {
        fn status(mut self, url: &str, code: u16) -> Self {
            self.headers
                .insert(url.to_string(), RawHeader { status_line: format!("HTTP/1.1 {code} X"), location: None });
            self
        }

        fn redirect(mut self, url: &str, target: &str) -> Self {
            self.headers.insert(
                url.to_string(),
                RawHeader {
                    status_line: "HTTP/1.1 302 Found".into(),
                    location: Some(Location::Single(target.to_string())),
                },
            );
            self
        }

        fn redirect_multi(mut self, url: &str, targets: &[&str]) -> Self {
            self.headers.insert(
                url.to_string(),
                RawHeader {
                    status_line: "HTTP/1.1 302 Found".into(),
                    location: Some(Location::Multiple(targets.iter().map(|t| t.to_string()).collect())),
                },
            );
            self
        }

        fn redirect_without_location(mut self, url: &str) -> Self {
            self.headers
                .insert(url.to_string(), RawHeader { status_line: "HTTP/1.1 301 Moved Permanently".into(), location: None });
            self
        }

        fn body(mut self, url: &str, html: &'static str) -> Self {
            self.bodies.insert(url.to_string(), html);
            self
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn retrieve_header(&self, url: &str) -> Option<RawHeader> {
            self.header_calls.fetch_add(1, Ordering::SeqCst);
            self.headers.get(url).cloned()
        }

        async fn retrieve_url(&self, url: &str) -> Option<Bytes> {
            self.body_calls.fetch_add(1, Ordering::SeqCst);
            self.bodies.get(url).map(|html| Bytes::from_static(html.as_bytes()))
        }
    }

    fn config(default: &str) -> AppConfig {
        AppConfig {
            default_value: default.into(),
            cache_timeout_secs: 0,
            ..Default::default()
        }
    }

    fn resolver(config: AppConfig, transport: FakeTransport) -> Resolver {
        let cache = FileCache::new(config.cache_dir.clone());
        Resolver::with_collaborators(config, Arc::new(transport), Arc::new(DomHeadExtractor), Arc::new(cache))
    }

    fn cached_resolver(config: AppConfig, transport: FakeTransport, cache: FileCache) -> Resolver {
        Resolver::with_collaborators(config, Arc::new(transport), Arc::new(DomHeadExtractor), Arc::new(cache))
    }

    #[tokio::test]
    async fn test_probe_empty_url() {
        let r = resolver(config(""), FakeTransport::default());
        assert_eq!(r.probe("").await, HttpProbeResult::unavailable());
    }

    #[tokio::test]
    async fn test_probe_transport_failure() {
        let r = resolver(config(""), FakeTransport::default());
        assert_eq!(r.probe("http://down.tld/").await, HttpProbeResult::unavailable());
    }

    #[tokio::test]
    async fn test_probe_follows_redirect_chain() {
        let transport = FakeTransport::default()
            .redirect("http://a.tld/", "http://b.tld/")
            .redirect("http://b.tld/", "http://c.tld/")
            .status("http://c.tld/", 200);
        let r = resolver(config(""), transport);

        let result = r.probe("http://a.tld/").await;
        assert_eq!(result.status, Some(200));
        assert_eq!(result.url.as_deref(), Some("http://c.tld/"));
    }

    #[tokio::test]
    async fn test_probe_multi_location_follows_last() {
        let transport = FakeTransport::default()
            .redirect_multi("http://a.tld/", &["http://first.tld/", "http://last.tld/"])
            .status("http://last.tld/", 200);
        let r = resolver(config(""), transport);

        let result = r.probe("http://a.tld/").await;
        assert_eq!(result.status, Some(200));
        assert_eq!(result.url.as_deref(), Some("http://last.tld/"));
    }

    #[tokio::test]
    async fn test_probe_redirect_without_location() {
        let transport = FakeTransport::default().redirect_without_location("http://a.tld/");
        let r = resolver(config(""), transport);

        let result = r.probe("http://a.tld/").await;
        assert_eq!(result.status, Some(301));
        assert_eq!(result.url.as_deref(), Some("http://a.tld/"));
    }

    #[tokio::test]
    async fn test_probe_redirect_cycle_terminates() {
        let transport = FakeTransport::default()
            .redirect("http://a.tld/", "http://b.tld/")
            .redirect("http://b.tld/", "http://a.tld/");
        let r = resolver(config(""), transport);

        let result = r.probe("http://a.tld/").await;
        assert_eq!(result.status, Some(302));
        assert_ne!(result.status, Some(200));
        assert!(result.url.is_some());
    }

    #[tokio::test]
    async fn test_get_favicon_ico_hit() {
        let transport = FakeTransport::default().status("http://domain.tld/favicon.ico", 200);
        let r = resolver(config("fallback.png"), transport);

        let resolved = r.get(Some("http://domain.tld/"), OutputMode::Url).await.unwrap();
        assert_eq!(resolved, Resolved::Url("http://domain.tld/favicon.ico".into()));
    }

    #[tokio::test]
    async fn test_get_favicon_ico_behind_redirect() {
        // The probe's final URL, not the original, is what gets returned.
        let transport = FakeTransport::default()
            .redirect("http://domain.tld/favicon.ico", "http://cdn.tld/icon.ico")
            .status("http://cdn.tld/icon.ico", 200);
        let r = resolver(config("fallback.png"), transport);

        let resolved = r.get(Some("http://domain.tld/"), OutputMode::Url).await.unwrap();
        assert_eq!(resolved, Resolved::Url("http://cdn.tld/icon.ico".into()));
    }

    #[tokio::test]
    async fn test_get_html_fallback() {
        let transport = FakeTransport::default()
            .status("http://domain.tld/favicon.ico", 404)
            .body(
                "http://domain.tld/",
                r#"<html><head><link rel="icon" href="default.ico"></head><body></body></html>"#,
            )
            .status("http://domain.tld/default.ico", 200);
        let r = resolver(config("fallback.png"), transport);

        let resolved = r.get(Some("http://domain.tld/"), OutputMode::Url).await.unwrap();
        assert_eq!(resolved, Resolved::Url("http://domain.tld/default.ico".into()));
    }

    #[tokio::test]
    async fn test_get_html_fallback_root_relative() {
        let transport = FakeTransport::default()
            .status("http://domain.tld/favicon.ico", 404)
            .body(
                "http://domain.tld/",
                r#"<html><head><link rel="shortcut icon" href="/img/fav.png"></head></html>"#,
            )
            .status("http://domain.tld/img/fav.png", 200);
        let r = resolver(config("fallback.png"), transport);

        let resolved = r.get(Some("http://domain.tld/"), OutputMode::Url).await.unwrap();
        assert_eq!(resolved, Resolved::Url("http://domain.tld/img/fav.png".into()));
    }

    #[tokio::test]
    async fn test_get_html_fallback_absolute_href() {
        let transport = FakeTransport::default()
            .status("http://domain.tld/favicon.ico", 404)
            .body(
                "http://domain.tld/",
                r#"<html><head><link rel="icon" href="https://static.tld/fav.ico"></head></html>"#,
            )
            .status("https://static.tld/fav.ico", 200);
        let r = resolver(config("fallback.png"), transport);

        let resolved = r.get(Some("http://domain.tld/"), OutputMode::Url).await.unwrap();
        assert_eq!(resolved, Resolved::Url("https://static.tld/fav.ico".into()));
    }

    #[tokio::test]
    async fn test_get_returns_default_when_nothing_found() {
        let transport = FakeTransport::default()
            .status("http://domain.tld/favicon.ico", 404)
            .body("http://domain.tld/", "<html><head><title>bare</title></head></html>");
        let r = resolver(config("fallback.png"), transport);

        let resolved = r.get(Some("http://domain.tld/"), OutputMode::Url).await.unwrap();
        assert_eq!(resolved, Resolved::Url("fallback.png".into()));
    }

    #[tokio::test]
    async fn test_get_returns_default_when_page_unreachable() {
        let r = resolver(config("fallback.png"), FakeTransport::default());
        let resolved = r.get(Some("http://domain.tld/"), OutputMode::Url).await.unwrap();
        assert_eq!(resolved, Resolved::Url("fallback.png".into()));
    }

    #[tokio::test]
    async fn test_get_verification_failure_returns_default() {
        // The head declares an icon, but probing it yields a 404.
        let transport = FakeTransport::default()
            .status("http://domain.tld/favicon.ico", 404)
            .body(
                "http://domain.tld/",
                r#"<html><head><link rel="icon" href="gone.ico"></head></html>"#,
            )
            .status("http://domain.tld/gone.ico", 404);
        let r = resolver(config("fallback.png"), transport);

        let resolved = r.get(Some("http://domain.tld/"), OutputMode::Url).await.unwrap();
        assert_eq!(resolved, Resolved::Url("fallback.png".into()));
    }

    #[tokio::test]
    async fn test_get_no_url() {
        let r = resolver(config("fallback.png"), FakeTransport::default());
        assert!(matches!(r.get(None, OutputMode::Url).await, Err(Error::NoUrl)));
        assert!(matches!(r.get(Some(""), OutputMode::Url).await, Err(Error::NoUrl)));
    }

    #[tokio::test]
    async fn test_get_uses_configured_url() {
        let transport = FakeTransport::default().status("http://configured.tld/favicon.ico", 200);
        let mut cfg = config("fallback.png");
        cfg.url = "http://configured.tld/some/page".into();
        let r = resolver(cfg, transport);

        let resolved = r.get(None, OutputMode::Url).await.unwrap();
        assert_eq!(resolved, Resolved::Url("http://configured.tld/favicon.ico".into()));
    }

    #[tokio::test]
    async fn test_get_invalid_url() {
        let r = resolver(config("fallback.png"), FakeTransport::default());
        assert!(matches!(r.get(Some("ftp://domain.tld/"), OutputMode::Url).await, Err(Error::InvalidUrl(_))));
        assert!(matches!(r.get(Some("not a url"), OutputMode::Url).await, Err(Error::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn test_get_raw_image() {
        let transport = FakeTransport::default()
            .status("http://domain.tld/favicon.ico", 200)
            .body("http://domain.tld/favicon.ico", "ICONBYTES");
        let r = resolver(config("fallback.png"), transport);

        let resolved = r.get(Some("http://domain.tld/"), OutputMode::RawImage).await.unwrap();
        assert_eq!(resolved, Resolved::Image(Bytes::from_static(b"ICONBYTES")));
    }

    #[tokio::test]
    async fn test_get_cached_file_path_with_caching_disabled() {
        let transport = FakeTransport::default().status("http://domain.tld/favicon.ico", 200);
        let cfg = config("fallback.png");
        let expected = FileCache::new(cfg.cache_dir.clone()).entry_path(&cache_key("http://domain.tld"));
        let r = resolver(cfg, transport);

        let resolved = r.get(Some("http://domain.tld/"), OutputMode::CachedFilePath).await.unwrap();
        assert_eq!(resolved, Resolved::CachedFilePath(expected));
    }

    #[tokio::test]
    async fn test_fresh_cache_hit_skips_probes() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path());
        let key = cache_key("http://domain.tld");
        cache.write(&key, b"http://domain.tld/cached.ico").unwrap();

        let transport = Arc::new(FakeTransport::default());
        let mut cfg = config("fallback.png");
        cfg.cache_timeout_secs = 3600;
        cfg.cache_dir = dir.path().to_path_buf();
        let r = Resolver::with_collaborators(cfg, transport.clone(), Arc::new(DomHeadExtractor), Arc::new(cache));

        let resolved = r.get(Some("http://domain.tld/"), OutputMode::Url).await.unwrap();
        assert_eq!(resolved, Resolved::Url("http://domain.tld/cached.ico".into()));
        assert_eq!(transport.header_calls.load(Ordering::SeqCst), 0);
        assert_eq!(transport.body_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_successful_resolution_writes_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path());
        let key = cache_key("http://domain.tld");

        let transport = FakeTransport::default().status("http://domain.tld/favicon.ico", 200);
        let mut cfg = config("fallback.png");
        cfg.cache_timeout_secs = 3600;
        cfg.cache_dir = dir.path().to_path_buf();
        let r = cached_resolver(cfg, transport, cache.clone());

        let resolved = r.get(Some("http://domain.tld/"), OutputMode::Url).await.unwrap();
        assert_eq!(resolved, Resolved::Url("http://domain.tld/favicon.ico".into()));
        assert!(cache.exists(&key));
        assert_eq!(cache.read(&key).unwrap(), b"http://domain.tld/favicon.ico");
    }

    /// File cache whose entries always look older than any timeout.
    struct BackdatedCache {
        inner: FileCache,
    }

    impl CacheStore for BackdatedCache {
        fn exists(&self, key: &str) -> bool {
            self.inner.exists(key)
        }

        fn is_readable(&self, key: &str) -> bool {
            self.inner.is_readable(key)
        }

        fn is_writable(&self, key: &str) -> bool {
            self.inner.is_writable(key)
        }

        fn mtime(&self, key: &str) -> Option<SystemTime> {
            self.inner.mtime(key).map(|_| SystemTime::now() - Duration::from_secs(1_000_000))
        }

        fn read(&self, key: &str) -> Option<Vec<u8>> {
            self.inner.read(key)
        }

        fn write(&self, key: &str, value: &[u8]) -> std::io::Result<()> {
            self.inner.write(key, value)
        }

        fn entry_path(&self, key: &str) -> std::path::PathBuf {
            self.inner.entry_path(key)
        }
    }

    #[tokio::test]
    async fn test_stale_entry_overwritten_on_success() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path());
        let key = cache_key("http://domain.tld");
        cache.write(&key, b"http://domain.tld/old.ico").unwrap();

        let transport = FakeTransport::default().status("http://domain.tld/favicon.ico", 200);
        let mut cfg = config("fallback.png");
        cfg.cache_timeout_secs = 3600;
        cfg.cache_dir = dir.path().to_path_buf();
        let r = Resolver::with_collaborators(
            cfg,
            Arc::new(transport),
            Arc::new(DomHeadExtractor),
            Arc::new(BackdatedCache { inner: cache.clone() }),
        );

        // The stale entry is ignored for resolution and replaced on success.
        let resolved = r.get(Some("http://domain.tld/"), OutputMode::Url).await.unwrap();
        assert_eq!(resolved, Resolved::Url("http://domain.tld/favicon.ico".into()));
        assert_eq!(cache.read(&key).unwrap(), b"http://domain.tld/favicon.ico");
    }

    #[tokio::test]
    async fn test_failed_resolution_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path());
        let key = cache_key("http://domain.tld");

        let transport = FakeTransport::default().status("http://domain.tld/favicon.ico", 404);
        let mut cfg = config("fallback.png");
        cfg.cache_timeout_secs = 3600;
        cfg.cache_dir = dir.path().to_path_buf();
        let r = cached_resolver(cfg, transport, cache.clone());

        let resolved = r.get(Some("http://domain.tld/"), OutputMode::Url).await.unwrap();
        assert_eq!(resolved, Resolved::Url("fallback.png".into()));
        assert!(!cache.exists(&key));
    }
}
