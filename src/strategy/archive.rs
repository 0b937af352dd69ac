//! Copies of fetched pages that could not be used
//!
//! When `[debug] save-pages-dir` is set, bot challenges, "no results" pages
//! and bodies that yielded no listings are written there so selector drift
//! and new challenge layouts can be inspected after the run.

use crate::model::{FailureReason, FetchTarget, StrategyKind, StrategyOutcome};
use crate::strategy::FetchedPage;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Directory of saved pages
#[derive(Debug)]
pub struct PageArchive {
    dir: PathBuf,
    seq: AtomicU64,
}

impl PageArchive {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            seq: AtomicU64::new(0),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Saves `page` when `outcome` shows the page was unusable
    ///
    /// Returns the path written, if any. Write failures are logged and
    /// otherwise ignored; they never change the attempt's outcome.
    pub fn keep_if_unusable(
        &self,
        target: &FetchTarget,
        kind: StrategyKind,
        page: &FetchedPage,
        outcome: &StrategyOutcome,
    ) -> Option<PathBuf> {
        let label = unusable_label(outcome)?;
        match self.save(target, kind, label, &page.body) {
            Ok(path) => {
                tracing::info!("{}: saved {} page to {}", target, label, path.display());
                Some(path)
            }
            Err(e) => {
                tracing::error!("{}: could not save {} page: {}", target, label, e);
                None
            }
        }
    }

    /// Writes one body into the archive directory
    pub fn save(
        &self,
        target: &FetchTarget,
        kind: StrategyKind,
        label: &str,
        body: &str,
    ) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;

        let extension = if kind == StrategyKind::RemoteApi {
            "json"
        } else {
            "html"
        };
        let name = format!(
            "{}_{}_p{}_{}_{}_{}_{}.{}",
            target.platform.as_str(),
            slug(&target.normalized_query()),
            target.page,
            kind.config_name(),
            label,
            chrono::Local::now().format("%Y%m%d_%H%M%S"),
            self.seq.fetch_add(1, Ordering::Relaxed),
            extension
        );

        let path = self.dir.join(name);
        std::fs::write(&path, body)?;
        Ok(path)
    }
}

/// File label for outcomes worth keeping, `None` for the rest
fn unusable_label(outcome: &StrategyOutcome) -> Option<&'static str> {
    match outcome {
        StrategyOutcome::RetryableFailure(reason) | StrategyOutcome::TerminalFailure(reason) => {
            match reason {
                FailureReason::Challenge(_) => Some("challenge"),
                FailureReason::Malformed(_) => Some("unparseable"),
                FailureReason::NoListings if matches!(outcome, StrategyOutcome::TerminalFailure(_)) => {
                    Some("no-results")
                }
                FailureReason::NoListings => Some("empty"),
                _ => None,
            }
        }
        StrategyOutcome::Success(_) => None,
    }
}

fn slug(query: &str) -> String {
    let slug: String = query
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .take(40)
        .collect();
    if slug.is_empty() {
        "query".to_string()
    } else {
        slug
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ChallengeKind, Platform, RawPayload};
    use tempfile::TempDir;

    fn page(body: &str) -> FetchedPage {
        FetchedPage {
            status: 200,
            body: body.to_string(),
            final_url: "https://www.amazon.com/s?k=echo".to_string(),
        }
    }

    #[test]
    fn test_challenge_page_is_saved() {
        let dir = TempDir::new().unwrap();
        let archive = PageArchive::new(dir.path().join("pages"));
        let target = FetchTarget::new(Platform::Amazon, "Echo Dot", 2);
        let outcome =
            StrategyOutcome::RetryableFailure(FailureReason::Challenge(ChallengeKind::Captcha));

        let path = archive
            .keep_if_unusable(&target, StrategyKind::DesktopFetch, &page("<form>captcha</form>"), &outcome)
            .unwrap();

        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("amazon_echo-dot_p2_desktop-fetch_challenge_"));
        assert!(name.ends_with(".html"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "<form>captcha</form>");
    }

    #[test]
    fn test_labels_by_outcome() {
        let dir = TempDir::new().unwrap();
        let archive = PageArchive::new(dir.path());
        let target = FetchTarget::new(Platform::MercadoLibre, "portatil", 1);
        let body = page("<html></html>");

        let no_results = StrategyOutcome::TerminalFailure(FailureReason::NoListings);
        let empty = StrategyOutcome::RetryableFailure(FailureReason::NoListings);
        let broken = StrategyOutcome::RetryableFailure(FailureReason::Malformed("x".into()));

        let name = |outcome: &StrategyOutcome, kind: StrategyKind| {
            archive
                .keep_if_unusable(&target, kind, &body, outcome)
                .unwrap()
                .file_name()
                .unwrap()
                .to_string_lossy()
                .to_string()
        };
        assert!(name(&no_results, StrategyKind::DesktopFetch).contains("_no-results_"));
        assert!(name(&empty, StrategyKind::MobileFetch).contains("_empty_"));
        let api = name(&broken, StrategyKind::RemoteApi);
        assert!(api.contains("_unparseable_"));
        assert!(api.ends_with(".json"));

        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 3);
    }

    #[test]
    fn test_usable_or_transport_outcomes_are_not_saved() {
        let dir = TempDir::new().unwrap();
        let archive = PageArchive::new(dir.path());
        let target = FetchTarget::new(Platform::Amazon, "echo", 1);
        let body = page("<html></html>");

        for outcome in [
            StrategyOutcome::Success(RawPayload::new(StrategyKind::DesktopFetch, Vec::new())),
            StrategyOutcome::RetryableFailure(FailureReason::HttpStatus(503)),
            StrategyOutcome::TerminalFailure(FailureReason::HttpStatus(404)),
        ] {
            assert!(archive
                .keep_if_unusable(&target, StrategyKind::DesktopFetch, &body, &outcome)
                .is_none());
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_write_failure_is_ignored() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "file").unwrap();
        let archive = PageArchive::new(&blocker);
        let outcome = StrategyOutcome::TerminalFailure(FailureReason::NoListings);

        assert!(archive
            .keep_if_unusable(
                &FetchTarget::new(Platform::Amazon, "echo", 1),
                StrategyKind::DesktopFetch,
                &page("x"),
                &outcome
            )
            .is_none());
    }
}
