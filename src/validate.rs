//! Source URL validation: the service's outbound security boundary.
//!
//! Every upstream fetch, including each redirect hop, passes through
//! [`SourceValidator::check`]. A source must be an absolute `http`/`https` URL
//! without credentials. When an allowlist is configured, its host must match
//! one of the entries.
//!
//! ## Allowlist entries
//!
//! | Entry | Meaning |
//! |---|---|
//! | `images.example.com` | exact hostname |
//! | `images.example.com:8080` | exact host and non-default port |
//! | `*.cdn.example.com` | glob, `*` matches any run of characters |
//! | `re:^img[0-9]+\.example\.org$` | regular expression |
//!
//! Matching is case-insensitive. Each entry is tried against the bare hostname
//! and, when the URL carries a non-default port, against `host:port`. Glob
//! entries are anchored at both ends; `re:` entries are matched as written, so
//! anchor them yourself.
//!
//! No allowlist means every host is allowed. An empty allowlist allows none.

use regex::{Regex, RegexBuilder};
use thiserror::Error;
use url::Url;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("source is not an absolute URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("source has no host")]
    MissingHost,
    #[error("unsupported source scheme '{0}'")]
    UnsupportedScheme(String),
    #[error("source URL must not carry credentials")]
    Credentials,
    #[error("source host '{0}' is not allowed")]
    HostNotAllowed(String),
}

impl ValidationError {
    /// Policy rejection (403) as opposed to a malformed request (400).
    pub fn is_forbidden(&self) -> bool {
        matches!(self, ValidationError::HostNotAllowed(_))
    }
}

#[derive(Debug, Error)]
#[error("invalid allowlist entry '{entry}': {source}")]
pub struct PatternError {
    pub entry: String,
    #[source]
    pub source: regex::Error,
}

/// One compiled allowlist entry.
#[derive(Debug, Clone)]
pub enum HostMatcher {
    Exact(String),
    Pattern(Regex),
}

impl HostMatcher {
    pub fn parse(entry: &str) -> Result<Self, PatternError> {
        let pattern = if let Some(re) = entry.strip_prefix("re:") {
            re.to_string()
        } else if entry.contains('*') {
            glob_to_regex(entry)
        } else {
            return Ok(HostMatcher::Exact(entry.to_ascii_lowercase()));
        };
        RegexBuilder::new(&pattern)
            .case_insensitive(true)
            .build()
            .map(HostMatcher::Pattern)
            .map_err(|source| PatternError {
                entry: entry.to_string(),
                source,
            })
    }

    pub fn matches(&self, candidate: &str) -> bool {
        match self {
            HostMatcher::Exact(host) => host.eq_ignore_ascii_case(candidate),
            HostMatcher::Pattern(re) => re.is_match(candidate),
        }
    }
}

fn glob_to_regex(glob: &str) -> String {
    let parts: Vec<String> = glob.split('*').map(regex::escape).collect();
    format!("^{}$", parts.join(".*"))
}

/// Checks sources against scheme, credential and host rules.
#[derive(Debug, Clone, Default)]
pub struct SourceValidator {
    allowed_hosts: Option<Vec<HostMatcher>>,
}

impl SourceValidator {
    /// A validator with no allowlist.
    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn new<S: AsRef<str>>(allowed_hosts: Option<&[S]>) -> Result<Self, PatternError> {
        let allowed_hosts = allowed_hosts
            .map(|entries| {
                entries
                    .iter()
                    .map(|e| HostMatcher::parse(e.as_ref()))
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?;
        Ok(Self { allowed_hosts })
    }

    /// Parse and check a source string.
    pub fn validate(&self, source: &str) -> Result<Url, ValidationError> {
        let url = Url::parse(source)?;
        self.check(&url)?;
        Ok(url)
    }

    /// Check an already parsed URL, e.g. a redirect target.
    pub fn check(&self, url: &Url) -> Result<(), ValidationError> {
        match url.scheme() {
            "http" | "https" => {}
            other => return Err(ValidationError::UnsupportedScheme(other.to_string())),
        }
        if !url.username().is_empty() || url.password().is_some() {
            return Err(ValidationError::Credentials);
        }
        let host = url.host_str().ok_or(ValidationError::MissingHost)?;

        let Some(matchers) = &self.allowed_hosts else {
            return Ok(());
        };
        let with_port = url.port().map(|port| format!("{host}:{port}"));
        let allowed = matchers.iter().any(|m| {
            m.matches(host) || with_port.as_deref().is_some_and(|hp| m.matches(hp))
        });
        if allowed {
            Ok(())
        } else {
            Err(ValidationError::HostNotAllowed(
                with_port.unwrap_or_else(|| host.to_string()),
            ))
        }
    }
}
