//! Outcome classification for fetch strategies
//!
//! Maps fetcher errors, HTTP statuses, bot challenges and parse results onto
//! `StrategyOutcome`. The rules differ by strategy:
//!
//! | Condition | RemoteApi | Desktop/Mobile | StealthBrowser |
//! |-----------|-----------|----------------|----------------|
//! | `Unsupported` | terminal | terminal | terminal |
//! | timeout | retryable | retryable | terminal |
//! | network / navigation error | retryable | retryable | retryable |
//! | `Blocked` | terminal | terminal | terminal |
//! | HTTP 429, 5xx | retryable | retryable | retryable |
//! | HTTP 403 | retryable | challenge | challenge |
//! | other non-2xx | retryable | terminal | terminal |
//! | bot challenge | n/a | retryable | terminal |
//! | parse error | retryable | retryable | retryable |
//! | zero listings | retryable | retryable | retryable |
//! | "no results" page | terminal | terminal | terminal |
//!
//! Repeated challenges on Desktop/Mobile are escalated to terminal by the
//! funnel once its challenge limit is reached.

use crate::model::{
    ChallengeKind, FailureReason, FetchTarget, RawPayload, StrategyKind, StrategyOutcome,
};
use crate::strategy::{FetchError, FetchedPage, ListingParser};
use scraper::{Html, Selector};

/// Path fragments that mark a redirect onto a verification page
const CHALLENGE_PATH_MARKERS: &[&str] = &[
    "/errors/validatecaptcha",
    "captcha",
    "account-verification",
];

/// Phrases found on robot-check interstitials
const ROBOT_CHECK_PHRASES: &[&str] = &[
    "robot check",
    "are you a robot",
    "not a robot",
    "automated access",
];

/// Classifies the result of one fetch attempt
///
/// # Arguments
///
/// * `kind` - Strategy that made the attempt
/// * `target` - The target fetched
/// * `result` - What the fetcher returned
/// * `parser` - Parser used on a successful page
pub fn classify_fetch(
    kind: StrategyKind,
    target: &FetchTarget,
    result: Result<FetchedPage, FetchError>,
    parser: &dyn ListingParser,
) -> StrategyOutcome {
    match result {
        Ok(page) => classify_page(kind, target, &page, parser),
        Err(e) => classify_error(kind, e),
    }
}

/// Classifies a page the fetcher did return
pub fn classify_page(
    kind: StrategyKind,
    target: &FetchTarget,
    page: &FetchedPage,
    parser: &dyn ListingParser,
) -> StrategyOutcome {
    if let Some(outcome) = classify_status(kind, page.status) {
        return outcome;
    }

    if kind != StrategyKind::RemoteApi {
        if let Some(challenge) = detect_challenge(page) {
            let reason = FailureReason::Challenge(challenge);
            return if kind == StrategyKind::StealthBrowser {
                StrategyOutcome::TerminalFailure(reason)
            } else {
                StrategyOutcome::RetryableFailure(reason)
            };
        }
    }

    match parser.parse(target, kind, page) {
        Ok(parsed) if parsed.no_results => {
            StrategyOutcome::TerminalFailure(FailureReason::NoListings)
        }
        Ok(parsed) if parsed.listings.is_empty() => {
            StrategyOutcome::RetryableFailure(FailureReason::NoListings)
        }
        Ok(parsed) => StrategyOutcome::Success(RawPayload::new(kind, parsed.listings)),
        Err(e) => StrategyOutcome::RetryableFailure(FailureReason::Malformed(e.to_string())),
    }
}

fn classify_error(kind: StrategyKind, error: FetchError) -> StrategyOutcome {
    use StrategyOutcome::{RetryableFailure, TerminalFailure};

    match error {
        FetchError::Unsupported(msg) => TerminalFailure(FailureReason::Unsupported(msg)),
        FetchError::Blocked(msg) => TerminalFailure(FailureReason::Blocked(msg)),
        FetchError::Timeout if kind == StrategyKind::StealthBrowser => {
            TerminalFailure(FailureReason::Timeout)
        }
        FetchError::Timeout => RetryableFailure(FailureReason::Timeout),
        FetchError::Network(msg) => RetryableFailure(FailureReason::Network(msg)),
        FetchError::Navigation(msg) => RetryableFailure(FailureReason::Navigation(msg)),
    }
}

/// Returns an outcome for any non-2xx status, `None` to keep going
fn classify_status(kind: StrategyKind, status: u16) -> Option<StrategyOutcome> {
    if (200..300).contains(&status) {
        return None;
    }

    let reason = FailureReason::HttpStatus(status);
    if kind == StrategyKind::RemoteApi || is_retryable_status(status) {
        return Some(StrategyOutcome::RetryableFailure(reason));
    }

    if status == 403 {
        let reason = FailureReason::Challenge(ChallengeKind::RobotCheck);
        return Some(if kind == StrategyKind::StealthBrowser {
            StrategyOutcome::TerminalFailure(reason)
        } else {
            StrategyOutcome::RetryableFailure(reason)
        });
    }

    Some(StrategyOutcome::TerminalFailure(reason))
}

/// Rate limiting and server-side (including CDN 52x) failures
fn is_retryable_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

/// Looks for signs that the page is a bot challenge rather than listings
pub fn detect_challenge(page: &FetchedPage) -> Option<ChallengeKind> {
    if page.body.trim().is_empty() {
        return Some(ChallengeKind::EmptyBody);
    }

    let final_url = page.final_url.to_lowercase();
    let path = final_url
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(&final_url);
    if CHALLENGE_PATH_MARKERS.iter().any(|m| path.contains(m)) {
        return Some(ChallengeKind::SuspiciousRedirect);
    }

    let document = Html::parse_document(&page.body);
    if let Ok(selector) = Selector::parse(r#"form[action*="validateCaptcha"], form[action*="captcha"]"#) {
        if document.select(&selector).next().is_some() {
            return Some(ChallengeKind::Captcha);
        }
    }

    let lowered = page.body.to_lowercase();
    if ROBOT_CHECK_PHRASES.iter().any(|p| lowered.contains(p)) {
        return Some(ChallengeKind::RobotCheck);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Platform, RawListing};
    use crate::strategy::{ParseError, ParsedPage};

    /// Parser returning a fixed result
    struct FixedParser(fn() -> Result<ParsedPage, ParseError>);

    impl ListingParser for FixedParser {
        fn parse(
            &self,
            _target: &FetchTarget,
            _kind: StrategyKind,
            _page: &FetchedPage,
        ) -> Result<ParsedPage, ParseError> {
            (self.0)()
        }
    }

    fn one_listing() -> Result<ParsedPage, ParseError> {
        Ok(ParsedPage {
            listings: vec![RawListing {
                id: Some("X1".to_string()),
                ..Default::default()
            }],
            no_results: false,
        })
    }

    fn empty() -> Result<ParsedPage, ParseError> {
        Ok(ParsedPage::default())
    }

    fn no_results() -> Result<ParsedPage, ParseError> {
        Ok(ParsedPage {
            listings: Vec::new(),
            no_results: true,
        })
    }

    fn target() -> FetchTarget {
        FetchTarget::new(Platform::Amazon, "widget", 1)
    }

    fn page(status: u16, body: &str) -> FetchedPage {
        FetchedPage {
            status,
            body: body.to_string(),
            final_url: "https://www.amazon.com/s?k=widget".to_string(),
        }
    }

    fn classify(kind: StrategyKind, result: Result<FetchedPage, FetchError>) -> StrategyOutcome {
        classify_fetch(kind, &target(), result, &FixedParser(one_listing))
    }

    #[test]
    fn test_success_carries_strategy() {
        match classify(StrategyKind::DesktopFetch, Ok(page(200, "<html></html>"))) {
            StrategyOutcome::Success(payload) => {
                assert_eq!(payload.strategy, StrategyKind::DesktopFetch)
            }
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[test]
    fn test_retryable_statuses() {
        for status in [429, 500, 502, 503, 504, 520, 524] {
            assert_eq!(
                classify(StrategyKind::DesktopFetch, Ok(page(status, "x"))),
                StrategyOutcome::RetryableFailure(FailureReason::HttpStatus(status)),
                "status {}",
                status
            );
        }
    }

    #[test]
    fn test_forbidden_is_challenge() {
        assert_eq!(
            classify(StrategyKind::MobileFetch, Ok(page(403, "x"))),
            StrategyOutcome::RetryableFailure(FailureReason::Challenge(ChallengeKind::RobotCheck))
        );
        assert_eq!(
            classify(StrategyKind::StealthBrowser, Ok(page(403, "x"))),
            StrategyOutcome::TerminalFailure(FailureReason::Challenge(ChallengeKind::RobotCheck))
        );
    }

    #[test]
    fn test_not_found_is_terminal_for_html() {
        assert_eq!(
            classify(StrategyKind::DesktopFetch, Ok(page(404, "x"))),
            StrategyOutcome::TerminalFailure(FailureReason::HttpStatus(404))
        );
    }

    #[test]
    fn test_api_non_success_is_retryable() {
        assert_eq!(
            classify(StrategyKind::RemoteApi, Ok(page(404, "x"))),
            StrategyOutcome::RetryableFailure(FailureReason::HttpStatus(404))
        );
    }

    #[test]
    fn test_error_mapping_by_strategy() {
        assert_eq!(
            classify(StrategyKind::DesktopFetch, Err(FetchError::Timeout)),
            StrategyOutcome::RetryableFailure(FailureReason::Timeout)
        );
        assert_eq!(
            classify(StrategyKind::StealthBrowser, Err(FetchError::Timeout)),
            StrategyOutcome::TerminalFailure(FailureReason::Timeout)
        );
        assert!(matches!(
            classify(StrategyKind::StealthBrowser, Err(FetchError::Navigation("x".into()))),
            StrategyOutcome::RetryableFailure(FailureReason::Navigation(_))
        ));
        assert!(matches!(
            classify(StrategyKind::StealthBrowser, Err(FetchError::Blocked("x".into()))),
            StrategyOutcome::TerminalFailure(FailureReason::Blocked(_))
        ));
        assert!(matches!(
            classify(StrategyKind::RemoteApi, Err(FetchError::Unsupported("x".into()))),
            StrategyOutcome::TerminalFailure(FailureReason::Unsupported(_))
        ));
    }

    #[test]
    fn test_captcha_form_detected() {
        let body = r#"<html><body><form action="/errors/validateCaptcha"></form></body></html>"#;
        assert_eq!(
            detect_challenge(&page(200, body)),
            Some(ChallengeKind::Captcha)
        );
        assert_eq!(
            classify(StrategyKind::DesktopFetch, Ok(page(200, body))),
            StrategyOutcome::RetryableFailure(FailureReason::Challenge(ChallengeKind::Captcha))
        );
    }

    #[test]
    fn test_robot_text_and_redirect_detected() {
        assert_eq!(
            detect_challenge(&page(200, "<title>Robot Check</title>")),
            Some(ChallengeKind::RobotCheck)
        );

        let mut redirected = page(200, "<html>ok</html>");
        redirected.final_url = "https://www.amazon.com/errors/validateCaptcha?x=1".to_string();
        assert_eq!(
            detect_challenge(&redirected),
            Some(ChallengeKind::SuspiciousRedirect)
        );
    }

    #[test]
    fn test_empty_body_is_challenge() {
        assert_eq!(
            detect_challenge(&page(200, "  \n")),
            Some(ChallengeKind::EmptyBody)
        );
    }

    #[test]
    fn test_product_titles_are_not_challenges() {
        let body = "<html><h2>Robot vacuum cleaner</h2></html>";
        assert_eq!(detect_challenge(&page(200, body)), None);
    }

    #[test]
    fn test_parse_results() {
        let t = target();
        assert_eq!(
            classify_fetch(StrategyKind::DesktopFetch, &t, Ok(page(200, "x")), &FixedParser(empty)),
            StrategyOutcome::RetryableFailure(FailureReason::NoListings)
        );
        assert_eq!(
            classify_fetch(StrategyKind::DesktopFetch, &t, Ok(page(200, "x")), &FixedParser(no_results)),
            StrategyOutcome::TerminalFailure(FailureReason::NoListings)
        );

        let broken = FixedParser(|| Err(ParseError::Structure("no container".to_string())));
        assert!(matches!(
            classify_fetch(StrategyKind::RemoteApi, &t, Ok(page(200, "{}")), &broken),
            StrategyOutcome::RetryableFailure(FailureReason::Malformed(_))
        ));
    }
}
