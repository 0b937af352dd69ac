//! Strategy identities and attempt outcomes
//!
//! The strategy list is closed and totally ordered by cost: a strategy with a
//! higher index is more expensive and leaves a bigger footprint on the target
//! site than every strategy before it.

use crate::model::RawPayload;
use crate::validate::ValidationError;
use std::fmt;

/// The five retrieval strategies, in funnel priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StrategyKind {
    /// Previously accepted result from the cache store
    Cached,

    /// Structured search endpoint (JSON)
    RemoteApi,

    /// Plain HTTP request with a desktop browser profile
    DesktopFetch,

    /// Plain HTTP request with a mobile browser profile
    MobileFetch,

    /// Full headless browser session
    StealthBrowser,
}

impl StrategyKind {
    /// Every strategy, in the order the funnel tries them
    pub const ALL: [StrategyKind; 5] = [
        Self::Cached,
        Self::RemoteApi,
        Self::DesktopFetch,
        Self::MobileFetch,
        Self::StealthBrowser,
    ];

    /// Position of this strategy in the funnel (0 = cheapest)
    pub fn index(&self) -> usize {
        match self {
            Self::Cached => 0,
            Self::RemoteApi => 1,
            Self::DesktopFetch => 2,
            Self::MobileFetch => 3,
            Self::StealthBrowser => 4,
        }
    }

    /// Name used for this strategy in configuration files
    pub fn config_name(&self) -> &'static str {
        match self {
            Self::Cached => "cached",
            Self::RemoteApi => "remote-api",
            Self::DesktopFetch => "desktop-fetch",
            Self::MobileFetch => "mobile-fetch",
            Self::StealthBrowser => "stealth-browser",
        }
    }

    /// Parses a strategy from its configuration name
    pub fn from_config_name(s: &str) -> Option<Self> {
        match s {
            "cached" => Some(Self::Cached),
            "remote-api" => Some(Self::RemoteApi),
            "desktop-fetch" => Some(Self::DesktopFetch),
            "mobile-fetch" => Some(Self::MobileFetch),
            "stealth-browser" => Some(Self::StealthBrowser),
            _ => None,
        }
    }

    /// Returns true for the strategies that go over the network
    pub fn is_remote(&self) -> bool {
        !matches!(self, Self::Cached)
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Cached => "Cached",
            Self::RemoteApi => "RemoteAPI",
            Self::DesktopFetch => "DesktopFetch",
            Self::MobileFetch => "MobileFetch",
            Self::StealthBrowser => "StealthBrowser",
        };
        write!(f, "{}", name)
    }
}

/// Kinds of anti-bot responses recognised in fetched pages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeKind {
    /// A CAPTCHA form was served instead of results
    Captcha,

    /// A "are you a robot" interstitial
    RobotCheck,

    /// Redirected somewhere that is not a results page
    SuspiciousRedirect,

    /// 200 response with no usable content
    EmptyBody,
}

impl fmt::Display for ChallengeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Captcha => "captcha",
            Self::RobotCheck => "robot check",
            Self::SuspiciousRedirect => "suspicious redirect",
            Self::EmptyBody => "empty body",
        };
        write!(f, "{}", name)
    }
}

/// Why a strategy attempt did not produce an accepted payload
#[derive(Debug, Clone, PartialEq)]
pub enum FailureReason {
    /// No fresh cache entry for the target
    CacheMiss,

    /// A cache entry existed but its payload could not be decoded
    CorruptCacheEntry,

    /// The strategy cannot serve this platform at all
    Unsupported(String),

    /// Non-success HTTP status
    HttpStatus(u16),

    /// The site served a bot challenge
    Challenge(ChallengeKind),

    /// Connection-level failure
    Network(String),

    /// Request or navigation exceeded its deadline
    Timeout,

    /// Transient browser navigation failure
    Navigation(String),

    /// The site explicitly blocked the session
    Blocked(String),

    /// The body could not be parsed into listings
    Malformed(String),

    /// The page parsed but held no listings
    NoListings,

    /// Every listing in the payload failed validation
    Rejected(ValidationError),
}

impl FailureReason {
    /// Returns true if this failure was a bot challenge
    pub fn is_challenge(&self) -> bool {
        matches!(self, Self::Challenge(_))
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CacheMiss => write!(f, "cache miss"),
            Self::CorruptCacheEntry => write!(f, "corrupt cache entry"),
            Self::Unsupported(why) => write!(f, "unsupported: {}", why),
            Self::HttpStatus(code) => write!(f, "HTTP {}", code),
            Self::Challenge(kind) => write!(f, "bot challenge ({})", kind),
            Self::Network(e) => write!(f, "network error: {}", e),
            Self::Timeout => write!(f, "timeout"),
            Self::Navigation(e) => write!(f, "navigation error: {}", e),
            Self::Blocked(e) => write!(f, "blocked: {}", e),
            Self::Malformed(e) => write!(f, "malformed payload: {}", e),
            Self::NoListings => write!(f, "no listings"),
            Self::Rejected(e) => write!(f, "rejected by validator: {}", e),
        }
    }
}

/// Result of a single strategy attempt
#[derive(Debug, Clone, PartialEq)]
pub enum StrategyOutcome {
    /// The strategy obtained a payload in this attempt
    Success(RawPayload),

    /// Transient failure; the same strategy may be retried
    RetryableFailure(FailureReason),

    /// Retrying this strategy cannot help
    TerminalFailure(FailureReason),
}

impl StrategyOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Short description used in attempt logs
    pub fn summary(&self) -> String {
        match self {
            Self::Success(payload) => format!("success ({} listings)", payload.listings.len()),
            Self::RetryableFailure(reason) => format!("retryable: {}", reason),
            Self::TerminalFailure(reason) => format!("terminal: {}", reason),
        }
    }
}
