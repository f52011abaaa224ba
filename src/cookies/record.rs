use cookie::Cookie;
use time::OffsetDateTime;

/// One `Set-Cookie` line as tracked by the security guard.
/// Modeled after NoScript's `Cookie` wrapper around `nsICookie2`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedCookie {
    /// The raw line as received, before any patching.
    pub source: String,
    pub name: String,
    pub value: String,
    /// Domain attribute when present, else the setting host.
    pub host: String,
    /// `host` without the leading dot.
    pub raw_host: String,
    pub path: String,
    pub secure: bool,
    pub http_only: bool,
    /// No Domain attribute: the cookie only ever matches its host.
    pub host_only: bool,
    pub expires: Option<OffsetDateTime>,
}

impl TrackedCookie {
    /// Parses one response line. Unparseable input degrades to a
    /// host-only record so the guard can still account for it.
    pub fn parse(source: &str, default_host: &str) -> Self {
        let trimmed = source.trim();
        match Cookie::parse(trimmed) {
            Ok(c) => {
                let host = c
                    .domain()
                    .map(str::to_owned)
                    .unwrap_or_else(|| default_host.to_owned());
                let raw_host = host.trim_start_matches('.').to_ascii_lowercase();
                let expires = c
                    .max_age()
                    .map(|ma| OffsetDateTime::now_utc() + ma)
                    .or_else(|| c.expires_datetime());
                Self {
                    source: trimmed.to_owned(),
                    name: c.name().to_owned(),
                    value: c.value().to_owned(),
                    host_only: c.domain().is_none(),
                    host,
                    raw_host,
                    path: c.path().unwrap_or("/").to_owned(),
                    secure: c.secure().unwrap_or(false),
                    http_only: c.http_only().unwrap_or(false),
                    expires,
                }
            }
            Err(_) => {
                let first = trimmed.split(';').next().unwrap_or("");
                let (name, value) = match first.split_once('=') {
                    Some((n, v)) => (n.trim().to_owned(), v.trim().to_owned()),
                    None => (first.trim().to_owned(), String::new()),
                };
                Self {
                    source: trimmed.to_owned(),
                    name,
                    value,
                    host: default_host.to_owned(),
                    raw_host: default_host.trim_start_matches('.').to_ascii_lowercase(),
                    path: "/".to_owned(),
                    secure: false,
                    http_only: false,
                    host_only: true,
                    expires: None,
                }
            }
        }
    }

    /// Stable registry key derived from host, path and name.
    pub fn id(&self) -> String {
        format!("{}|{}|{}", self.raw_host, self.path, self.name)
    }

    /// RFC 6265 domain matching against a request host. A Domain
    /// attribute naming a public suffix never matches anything.
    pub fn belongs_to(&self, host: &str) -> bool {
        let host = host.trim_start_matches('.').to_ascii_lowercase();
        if self.host_only {
            return self.raw_host == host;
        }
        if crate::cookies::suffix::is_public_suffix(&self.raw_host) {
            return false;
        }
        host == self.raw_host
            || (host.len() > self.raw_host.len()
                && host.ends_with(&self.raw_host)
                && host.as_bytes()[host.len() - self.raw_host.len() - 1] == b'.')
    }

    /// Domain plus RFC 6265 path matching.
    pub fn belongs_to_path(&self, host: &str, path: &str) -> bool {
        self.belongs_to(host) && path_match(path, &self.path)
    }

    /// Identity comparison: same name, host and path.
    pub fn same_identity(&self, other: &TrackedCookie) -> bool {
        self.name == other.name && self.raw_host == other.raw_host && self.path == other.path
    }

    /// The line to re-emit when forcing the Secure attribute on.
    pub fn set_cookie_with_secure(&self) -> String {
        format!("{};Secure", self.source)
    }

    /// `name=value` for an outgoing `Cookie` header.
    pub fn cookie_pair(&self) -> String {
        format!("{}={}", self.name, self.value)
    }

    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expires.map(|e| e < now).unwrap_or(false)
    }
}

fn path_match(request_path: &str, cookie_path: &str) -> bool {
    request_path == cookie_path
        || (request_path.starts_with(cookie_path)
            && (cookie_path.ends_with('/')
                || request_path[cookie_path.len()..].starts_with('/')))
}
