//! Remote loader: fetches bundles over HTTPS with SSRF, size, and checksum
//! defenses, backed by a content-addressed cache.
//!
//! Validation happens before any bytes move: the URL must be HTTPS with the
//! bundle suffix, and the host must not fall in a blocked range (loopback,
//! link-local, RFC1918, or a configured pattern). Downloads stream into a
//! temporary file that is renamed into the cache only after the size cap and
//! the expected checksum have both held.

use std::io::Write;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use url::{Host, Url};

use scribe_core::{ErrorKind, PluginError, PluginResult};
use scribe_security::SecurityManager;

use crate::bundle::{BUNDLE_SUFFIX, Bundle};
use crate::digest::{sha256_file, sha256_hex};
use crate::local::{LoadedPlugin, LocalLoader};

/// Hard cap on bundle size: 50 MiB.
pub const MAX_BUNDLE_SIZE: u64 = 50 * 1024 * 1024;

/// Hex length of the cache key (truncated SHA-256 of the URL).
const CACHE_KEY_LEN: usize = 16;

/// Whether a path argument names a remote bundle rather than a local file.
pub fn is_remote_path(path: &str) -> bool {
    path.starts_with("https://") || path.starts_with("http://")
}

// ─── Configuration ───────────────────────────────────────────────────────────

/// Remote loader configuration.
#[derive(Debug, Clone)]
pub struct RemoteLoaderConfig {
    /// Directory holding cached bundles.
    pub cache_root: PathBuf,
    /// Maximum accepted bundle size in bytes.
    pub max_bundle_size: u64,
    /// TCP connect deadline.
    pub connect_timeout: Duration,
    /// Read deadline for the response body.
    pub read_timeout: Duration,
    /// Host patterns refused before any network I/O. Each pattern is an exact
    /// host, a `*.suffix` domain glob, or an IPv4 CIDR.
    pub blocked_host_patterns: Vec<String>,
}

impl Default for RemoteLoaderConfig {
    fn default() -> Self {
        Self {
            cache_root: std::env::temp_dir().join("remote-plugins"),
            max_bundle_size: MAX_BUNDLE_SIZE,
            connect_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(60),
            blocked_host_patterns: default_blocked_patterns(),
        }
    }
}

/// The default block list: loopback, link-local, and RFC1918 ranges plus the
/// local hostname forms.
pub fn default_blocked_patterns() -> Vec<String> {
    [
        "127.0.0.0/8",
        "10.0.0.0/8",
        "172.16.0.0/12",
        "192.168.0.0/16",
        "169.254.0.0/16",
        "localhost",
        "*.local",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

// ─── RemoteLoader ────────────────────────────────────────────────────────────

/// Fetches and loads bundles from HTTPS URLs.
pub struct RemoteLoader {
    config: RemoteLoaderConfig,
    client: reqwest::Client,
    local: LocalLoader,
    security: Arc<SecurityManager>,
}

impl RemoteLoader {
    /// Creates a loader with the given configuration.
    pub fn new(config: RemoteLoaderConfig, security: Arc<SecurityManager>) -> PluginResult<Self> {
        // Redirects are not followed: a redirect target would bypass the host
        // screen below.
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| PluginError::internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            config,
            client,
            local: LocalLoader::new(),
            security,
        })
    }

    /// Creates a loader with default configuration.
    pub fn with_defaults(security: Arc<SecurityManager>) -> PluginResult<Self> {
        Self::new(RemoteLoaderConfig::default(), security)
    }

    // ─── URL validation ──────────────────────────────────────────────────────

    /// Validates a candidate bundle URL without performing any I/O.
    ///
    /// Scheme must be exactly `https`, the path must end in the bundle
    /// suffix, and the host must not be blocked.
    pub fn validate_url(&self, raw: &str) -> PluginResult<Url> {
        let url = Url::parse(raw)
            .map_err(|e| PluginError::invalid("url", format!("{raw}: {e}")))?;

        if url.scheme() != "https" {
            return Err(PluginError::invalid(
                "url",
                format!("scheme '{}' is not https", url.scheme()),
            ));
        }
        if !url.path().ends_with(&format!(".{BUNDLE_SUFFIX}")) {
            return Err(PluginError::invalid(
                "url",
                format!("path does not end in .{BUNDLE_SUFFIX}"),
            ));
        }

        let host = url
            .host()
            .ok_or_else(|| PluginError::invalid("url", "missing host"))?;
        if let Some(reason) = blocked_host_reason(&host, &self.config.blocked_host_patterns) {
            return Err(PluginError::security(format!(
                "host {host} refused: {reason}"
            )));
        }

        Ok(url)
    }

    /// Cache file for `url`, whether or not it exists yet.
    pub fn cache_path(&self, url: &str) -> PathBuf {
        let key = &sha256_hex(url.as_bytes())[..CACHE_KEY_LEN];
        self.config.cache_root.join(format!("{key}.{BUNDLE_SUFFIX}"))
    }

    // ─── Fetch ───────────────────────────────────────────────────────────────

    /// Fetches the bundle at `raw_url`, returning the cached file path.
    ///
    /// A cached file is reused when no checksum was requested or when its
    /// SHA-256 matches the expected value; otherwise the bundle is
    /// re-downloaded. A finished download whose checksum does not match the
    /// expectation is deleted and reported as IntegrityFailed. Every result,
    /// cached or fresh, passes the static screen before it is returned; a
    /// flagged bundle is removed from the cache and rejected.
    pub async fn fetch(
        &self,
        raw_url: &str,
        expected_checksum: Option<&str>,
    ) -> PluginResult<PathBuf> {
        let url = self.validate_url(raw_url)?;
        let cache_path = self.cache_path(raw_url);

        if cache_path.is_file() {
            let reuse = match expected_checksum {
                None => true,
                Some(expected) => sha256_file(&cache_path)?.eq_ignore_ascii_case(expected),
            };
            if reuse {
                self.screen_bundle(raw_url, &cache_path)?;
                debug!(url = %url, path = %cache_path.display(), "Cache hit");
                return Ok(cache_path);
            }
            warn!(
                url = %url,
                path = %cache_path.display(),
                "Cached bundle fails checksum; re-downloading"
            );
        }

        std::fs::create_dir_all(&self.config.cache_root)?;
        let downloaded = self.download(&url, expected_checksum, &cache_path).await?;
        self.screen_bundle(raw_url, &downloaded)?;
        Ok(downloaded)
    }

    /// Runs the post-fetch static screen over every artifact in the bundle.
    /// A bundle the screen rejects is deleted so the cache cannot re-serve
    /// it.
    fn screen_bundle(&self, url: &str, path: &Path) -> PluginResult<()> {
        let result = self.collect_and_screen(url, path);
        if let Err(e) = &result {
            if e.kind() == ErrorKind::SecurityViolation {
                let _ = std::fs::remove_file(path);
            }
        }
        result
    }

    fn collect_and_screen(&self, url: &str, path: &Path) -> PluginResult<()> {
        let bundle = Bundle::open(path)?;
        let mut artifacts = Vec::new();
        for name in bundle.artifact_names()? {
            let bytes = bundle.read_artifact(&name)?;
            artifacts.push((name, bytes));
        }
        self.security.screen_remote_bundle(url, artifacts)
    }

    /// Fetches the bundle and delegates to the local loader.
    pub async fn load(
        &self,
        raw_url: &str,
        expected_checksum: Option<&str>,
    ) -> PluginResult<LoadedPlugin> {
        let path = self.fetch(raw_url, expected_checksum).await?;
        self.local.load(&path)
    }

    async fn download(
        &self,
        url: &Url,
        expected_checksum: Option<&str>,
        cache_path: &Path,
    ) -> PluginResult<PathBuf> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| PluginError::network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PluginError::network(format!(
                "GET {url} returned HTTP {}",
                status.as_u16()
            )));
        }

        if let Some(advertised) = response.content_length() {
            if advertised > self.config.max_bundle_size {
                return Err(PluginError::integrity(format!(
                    "advertised size {advertised} exceeds cap {}",
                    self.config.max_bundle_size
                )));
            }
        }

        // Stream into a temp file in the cache dir so the final publish is a
        // same-filesystem rename.
        let mut temp = tempfile::NamedTempFile::new_in(&self.config.cache_root)?;
        let mut hasher = Sha256::new();
        let mut total: u64 = 0;
        let mut response = response;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| PluginError::network(e.to_string()))?
        {
            total += chunk.len() as u64;
            if total > self.config.max_bundle_size {
                // Dropping `temp` removes the partial file.
                return Err(PluginError::integrity(format!(
                    "download exceeded cap {} bytes",
                    self.config.max_bundle_size
                )));
            }
            hasher.update(&chunk);
            temp.write_all(&chunk)?;
        }
        temp.flush()?;

        let actual = hex::encode(hasher.finalize());
        if let Some(expected) = expected_checksum {
            if !actual.eq_ignore_ascii_case(expected) {
                return Err(PluginError::integrity(format!(
                    "checksum mismatch: expected {expected}, got {actual}"
                )));
            }
        }

        temp.persist(cache_path)
            .map_err(|e| PluginError::internal(format!("failed to publish download: {e}")))?;
        info!(url = %url, path = %cache_path.display(), bytes = total, "Downloaded bundle");
        Ok(cache_path.to_path_buf())
    }

    // ─── Cache maintenance ───────────────────────────────────────────────────

    /// Deletes every cached bundle; returns how many files were removed.
    pub fn clear_cache(&self) -> PluginResult<usize> {
        let mut removed = 0;
        let entries = match std::fs::read_dir(&self.config.cache_root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some(BUNDLE_SUFFIX) {
                std::fs::remove_file(&path)?;
                removed += 1;
            }
        }
        info!(removed, "Cleared bundle cache");
        Ok(removed)
    }
}

// ─── Host blocking ───────────────────────────────────────────────────────────

/// Why a host is refused, or `None` when it is acceptable.
///
/// Literal IPs are checked against the well-known non-public ranges; domain
/// names are checked against the configured patterns. No DNS resolution
/// happens here.
fn blocked_host_reason(host: &Host<&str>, patterns: &[String]) -> Option<String> {
    match host {
        Host::Ipv4(ip) => blocked_ipv4_reason(*ip, patterns),
        Host::Ipv6(ip) => blocked_ipv6_reason(*ip, patterns),
        Host::Domain(name) => blocked_domain_reason(name, patterns),
    }
}

fn blocked_ipv4_reason(ip: Ipv4Addr, patterns: &[String]) -> Option<String> {
    if ip.is_loopback() {
        return Some("loopback address".into());
    }
    if ip.is_link_local() {
        return Some("link-local address".into());
    }
    if ip.is_private() {
        return Some("private (RFC1918) address".into());
    }
    if ip.is_unspecified() || ip.is_broadcast() {
        return Some("non-routable address".into());
    }
    for pattern in patterns {
        if pattern.contains('/') && ipv4_in_cidr(ip, pattern) {
            return Some(format!("matches blocked range {pattern}"));
        }
        if pattern.parse::<Ipv4Addr>() == Ok(ip) {
            return Some(format!("matches blocked host {pattern}"));
        }
    }
    None
}

fn blocked_ipv6_reason(ip: Ipv6Addr, patterns: &[String]) -> Option<String> {
    if ip.is_loopback() || ip.is_unspecified() {
        return Some("loopback address".into());
    }
    // fe80::/10 link-local.
    if (ip.segments()[0] & 0xffc0) == 0xfe80 {
        return Some("link-local address".into());
    }
    // fc00::/7 unique-local, the RFC1918 analogue.
    if (ip.segments()[0] & 0xfe00) == 0xfc00 {
        return Some("unique-local address".into());
    }
    if let Some(mapped) = ip.to_ipv4_mapped() {
        return blocked_ipv4_reason(mapped, patterns);
    }
    None
}

fn blocked_domain_reason(name: &str, patterns: &[String]) -> Option<String> {
    let name = name.to_ascii_lowercase();
    for pattern in patterns {
        let pattern = pattern.to_ascii_lowercase();
        if let Some(suffix) = pattern.strip_prefix("*.") {
            if name == suffix || name.ends_with(&format!(".{suffix}")) {
                return Some(format!("matches blocked pattern {pattern}"));
            }
        } else if name == pattern {
            return Some(format!("matches blocked host {pattern}"));
        }
    }
    None
}

/// IPv4 membership in an `a.b.c.d/len` range. Malformed ranges never match.
fn ipv4_in_cidr(ip: Ipv4Addr, cidr: &str) -> bool {
    let Some((net, len)) = cidr.split_once('/') else {
        return false;
    };
    let Ok(net) = net.parse::<Ipv4Addr>() else {
        return false;
    };
    let Ok(len) = len.parse::<u32>() else {
        return false;
    };
    if len > 32 {
        return false;
    }
    if len == 0 {
        return true;
    }
    let mask = u32::MAX << (32 - len);
    (u32::from(ip) & mask) == (u32::from(net) & mask)
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;
    use wiremock::matchers::{method, path as url_path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn loader(cache_root: &Path) -> RemoteLoader {
        loader_with_cap(cache_root, MAX_BUNDLE_SIZE)
    }

    fn loader_with_cap(cache_root: &Path, max_bundle_size: u64) -> RemoteLoader {
        let config = RemoteLoaderConfig {
            cache_root: cache_root.to_path_buf(),
            max_bundle_size,
            ..RemoteLoaderConfig::default()
        };
        RemoteLoader::new(config, Arc::new(SecurityManager::new())).unwrap()
    }

    /// Packs a one-artifact bundle and returns the archive path.
    fn packed_bundle(dir: &Path, artifact_body: &[u8]) -> PathBuf {
        let src = dir.join("bundle-src");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(
            src.join(crate::bundle::MANIFEST_NAME),
            "name: sample\nversion: 1.0.0\napi-version: 1.0.0\nentry:\n  - sample\n",
        )
        .unwrap();
        std::fs::write(src.join("sample.wasm"), artifact_body).unwrap();
        let dest = dir.join("sample.qpk");
        Bundle::pack(&src, &dest).unwrap();
        dest
    }

    #[test]
    fn http_scheme_is_invalid() {
        let tmp = TempDir::new().unwrap();
        let err = loader(tmp.path())
            .validate_url("http://example.com/x.qpk")
            .unwrap_err();
        assert_eq!(err.kind(), scribe_core::ErrorKind::Invalid);
    }

    #[test]
    fn wrong_suffix_is_invalid() {
        let tmp = TempDir::new().unwrap();
        let err = loader(tmp.path())
            .validate_url("https://example.com/x.zip")
            .unwrap_err();
        assert_eq!(err.kind(), scribe_core::ErrorKind::Invalid);
    }

    #[test]
    fn private_hosts_are_security_violations() {
        let tmp = TempDir::new().unwrap();
        let loader = loader(tmp.path());
        for url in [
            "https://192.168.5.5/x.qpk",
            "https://10.0.0.5/x.qpk",
            "https://172.20.1.1/x.qpk",
            "https://127.0.0.1/x.qpk",
            "https://169.254.1.1/x.qpk",
            "https://localhost/x.qpk",
            "https://printer.local/x.qpk",
            "https://[::1]/x.qpk",
            "https://[fe80::1]/x.qpk",
            "https://[fd00::1]/x.qpk",
        ] {
            let err = loader.validate_url(url).unwrap_err();
            assert_eq!(
                err.kind(),
                scribe_core::ErrorKind::SecurityViolation,
                "expected violation for {url}"
            );
        }
    }

    #[test]
    fn public_host_is_accepted() {
        let tmp = TempDir::new().unwrap();
        assert!(loader(tmp.path())
            .validate_url("https://plugins.example.com/dist/x.qpk")
            .is_ok());
    }

    #[test]
    fn cidr_matching() {
        assert!(ipv4_in_cidr("172.16.0.1".parse().unwrap(), "172.16.0.0/12"));
        assert!(!ipv4_in_cidr("172.32.0.1".parse().unwrap(), "172.16.0.0/12"));
        assert!(!ipv4_in_cidr("8.8.8.8".parse().unwrap(), "not-a-cidr"));
    }

    #[tokio::test]
    async fn cache_hit_returns_without_network() {
        let tmp = TempDir::new().unwrap();
        let loader = loader(&tmp.path().join("cache"));

        // example.invalid never resolves: any network attempt would error, so
        // a successful fetch proves the cache short-circuited.
        let url = "https://plugins.example.invalid/dist/sample.qpk";
        let cache_path = loader.cache_path(url);
        std::fs::create_dir_all(cache_path.parent().unwrap()).unwrap();
        let bundle = packed_bundle(tmp.path(), b"\0asm ordinary module");
        std::fs::copy(&bundle, &cache_path).unwrap();

        let got = loader.fetch(url, None).await.unwrap();
        assert_eq!(got, cache_path);

        // With the matching checksum the cached copy is still served.
        let checksum = sha256_file(&cache_path).unwrap();
        let got = loader.fetch(url, Some(&checksum)).await.unwrap();
        assert_eq!(got, cache_path);

        // Uppercase hex matches too.
        let got = loader.fetch(url, Some(&checksum.to_uppercase())).await.unwrap();
        assert_eq!(got, cache_path);
    }

    #[tokio::test]
    async fn cached_bundle_failing_screen_is_rejected_and_evicted() {
        let tmp = TempDir::new().unwrap();
        let loader = loader(&tmp.path().join("cache"));

        let url = "https://plugins.example.invalid/dist/sample.qpk";
        let cache_path = loader.cache_path(url);
        std::fs::create_dir_all(cache_path.parent().unwrap()).unwrap();
        let bundle = packed_bundle(tmp.path(), b"uses std::process::Command at runtime");
        std::fs::copy(&bundle, &cache_path).unwrap();

        let err = loader.fetch(url, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SecurityViolation);
        assert!(!cache_path.exists());
    }

    #[tokio::test]
    async fn download_accepts_exact_cap_and_rejects_one_byte_over() {
        let server = MockServer::start().await;
        let cap: u64 = 1024;
        Mock::given(method("GET"))
            .and(url_path("/at-cap.qpk"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; cap as usize]))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(url_path("/over-cap.qpk"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; cap as usize + 1]))
            .mount(&server)
            .await;

        let tmp = TempDir::new().unwrap();
        let loader = loader_with_cap(tmp.path(), cap);

        let at_cap = Url::parse(&format!("{}/at-cap.qpk", server.uri())).unwrap();
        let at_cap_path = tmp.path().join("at-cap.qpk");
        loader.download(&at_cap, None, &at_cap_path).await.unwrap();
        assert_eq!(std::fs::metadata(&at_cap_path).unwrap().len(), cap);

        let over_cap = Url::parse(&format!("{}/over-cap.qpk", server.uri())).unwrap();
        let over_cap_path = tmp.path().join("over-cap.qpk");
        let err = loader
            .download(&over_cap, None, &over_cap_path)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IntegrityFailed);
        assert!(!over_cap_path.exists());
    }

    #[tokio::test]
    async fn download_checksum_mismatch_deletes_the_file() {
        let server = MockServer::start().await;
        let body = vec![0u8; 1024];
        Mock::given(method("GET"))
            .and(url_path("/x.qpk"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .mount(&server)
            .await;

        let tmp = TempDir::new().unwrap();
        let loader = loader(tmp.path());
        let url = Url::parse(&format!("{}/x.qpk", server.uri())).unwrap();

        let cache_path = tmp.path().join("x.qpk");
        let err = loader
            .download(&url, Some(&"aa".repeat(32)), &cache_path)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IntegrityFailed);
        assert!(!cache_path.exists());

        // The real checksum is accepted.
        let ok = loader
            .download(&url, Some(&sha256_hex(&body)), &cache_path)
            .await
            .unwrap();
        assert_eq!(ok, cache_path);
    }

    #[test]
    fn clear_cache_removes_only_bundles() {
        let tmp = TempDir::new().unwrap();
        let loader = loader(tmp.path());
        std::fs::write(tmp.path().join("aaaa.qpk"), b"x").unwrap();
        std::fs::write(tmp.path().join("keep.txt"), b"x").unwrap();

        assert_eq!(loader.clear_cache().unwrap(), 1);
        assert!(tmp.path().join("keep.txt").exists());
    }
}
