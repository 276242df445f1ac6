//! Static attack-signature matching.
//!
//! Stateless classification of a request's path and user agent against fixed
//! signature lists. A path match is an attack indicator and terminal for the
//! pipeline; a user-agent match is only worth recording.

use regex::RegexSet;
use std::fmt;

/// Directory traversal, script injection, SQL injection, admin-panel probing
/// and sensitive file access.
pub const BUILTIN_PATH_PATTERNS: &[&str] = &[
    // traversal
    r"\.\.[/\\]",
    r"(?i)(%2e%2e|\.%2e|%2e\.)(%2f|%5c|/|\\)",
    r"(?i)\.\.(%2f|%5c)",
    // script injection
    r"(?i)<\s*script",
    r"(?i)%3c\s*script",
    r"(?i)javascript:",
    r"(?i)\bon(error|load|mouseover)\s*=",
    // sql injection
    r"(?i)union(\s|%20|\+|/\*.*?\*/)+(all(\s|%20|\+)+)?select",
    r"(?i)('|%27)\s*(or|and)(\s|%20|\+)+\d+\s*=\s*\d+",
    r"(?i)(;|%3b)\s*(drop|truncate|delete)(\s|%20|\+)+",
    r"(?i)information_schema",
    r"(?i)\b(sleep|benchmark|pg_sleep)\s*\(",
    r"(?i)('|%27)\s*(--|%2d%2d|#)",
    // admin-panel probing
    r"(?i)/(wp-admin|wp-login\.php|phpmyadmin|pma|administrator|adminer\.php|xmlrpc\.php)(/|\?|$)",
    r"(?i)/(server-status|server-info|actuator|debug/pprof)(/|\?|$)",
    // sensitive files
    r"(?i)/\.(env|git|svn|hg|htaccess|htpasswd|aws|docker|ssh)(/|\?|$)",
    r"(?i)/etc/(passwd|shadow|hosts)",
    r"(?i)/proc/self/",
    r"(?i)wp-config\.php",
    r"(?i)\.(sql|bak|swp)(\?|$)",
];

/// Scanner, fuzzer and scraping tool signatures (substring, case-insensitive).
pub const BUILTIN_USER_AGENT_SIGNATURES: &[&str] = &[
    "sqlmap",
    "nikto",
    "nmap",
    "masscan",
    "zgrab",
    "gobuster",
    "dirbuster",
    "dirb",
    "wfuzz",
    "ffuf",
    "hydra",
    "nessus",
    "openvas",
    "nuclei",
    "acunetix",
    "burpsuite",
    "w3af",
    "havij",
    "metasploit",
    "whatweb",
    "scrapy",
    "headlesschrome",
    "phantomjs",
    "python-requests",
    "libwww-perl",
    "curl/",
    "wget/",
];

/// Error returned when a signature fails to compile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternError {
    /// A path pattern is not a valid regular expression
    InvalidPathPattern(String),
    /// A user-agent pattern is not a valid regular expression
    InvalidUserAgentPattern(String),
}

impl fmt::Display for PatternError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatternError::InvalidPathPattern(reason) => {
                write!(f, "invalid path pattern: {}", reason)
            }
            PatternError::InvalidUserAgentPattern(reason) => {
                write!(f, "invalid user-agent pattern: {}", reason)
            }
        }
    }
}

impl std::error::Error for PatternError {}

/// Result of classifying one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    pub suspicious_user_agent: bool,
    pub attack_path: bool,
    /// First path signature that matched.
    pub path_signature: Option<String>,
    /// First user-agent signature that matched.
    pub user_agent_signature: Option<String>,
}

impl Classification {
    pub fn is_clean(&self) -> bool {
        !self.suspicious_user_agent && !self.attack_path
    }
}

/// Compiled signature sets.
#[derive(Debug, Clone)]
pub struct PatternDetector {
    paths: RegexSet,
    path_sources: Vec<String>,
    user_agents: RegexSet,
    user_agent_sources: Vec<String>,
}

impl PatternDetector {
    /// Compile the built-in signature lists.
    pub fn builtin() -> Result<Self, PatternError> {
        Self::with_extra(&[], &[])
    }

    /// Compile the built-in lists plus additional regular expressions.
    ///
    /// Extra user-agent entries are full regular expressions; built-in
    /// user-agent signatures are literal substrings.
    pub fn with_extra(
        extra_paths: &[String],
        extra_user_agents: &[String],
    ) -> Result<Self, PatternError> {
        let path_sources: Vec<String> = BUILTIN_PATH_PATTERNS
            .iter()
            .map(|p| p.to_string())
            .chain(extra_paths.iter().cloned())
            .collect();

        let user_agent_sources: Vec<String> = BUILTIN_USER_AGENT_SIGNATURES
            .iter()
            .map(|s| format!("(?i){}", regex::escape(s)))
            .chain(extra_user_agents.iter().map(|p| format!("(?i){}", p)))
            .collect();

        let paths = RegexSet::new(&path_sources)
            .map_err(|e| PatternError::InvalidPathPattern(e.to_string()))?;
        let user_agents = RegexSet::new(&user_agent_sources)
            .map_err(|e| PatternError::InvalidUserAgentPattern(e.to_string()))?;

        Ok(Self {
            paths,
            path_sources,
            user_agents,
            user_agent_sources,
        })
    }

    /// Classify a request by path and optional user agent.
    pub fn classify(&self, path: &str, user_agent: Option<&str>) -> Classification {
        let path_signature = self
            .paths
            .matches(path)
            .iter()
            .next()
            .map(|i| self.path_sources[i].clone());

        let user_agent_signature = user_agent.and_then(|ua| {
            self.user_agents
                .matches(ua)
                .iter()
                .next()
                .map(|i| self.user_agent_sources[i].clone())
        });

        Classification {
            suspicious_user_agent: user_agent_signature.is_some(),
            attack_path: path_signature.is_some(),
            path_signature,
            user_agent_signature,
        }
    }

    pub fn path_pattern_count(&self) -> usize {
        self.path_sources.len()
    }

    pub fn user_agent_pattern_count(&self) -> usize {
        self.user_agent_sources.len()
    }
}
