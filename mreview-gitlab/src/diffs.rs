//! Paginated retrieval of merge request diffs
//!
//! GitLab's `x-total-pages` header is optional and not always reliable, so an
//! empty page is the signal that ends pagination. The header only confirms
//! completion early when it parses as an integer. Every failure stops the
//! walk and keeps what earlier pages returned; nothing is retried.

use mreview_core::DiffRecord;
use reqwest::header::HeaderMap;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::client::PRIVATE_TOKEN_HEADER;
use crate::GitLabClient;

/// Response header carrying the total page count
const TOTAL_PAGES_HEADER: &str = "x-total-pages";

/// Longest response body excerpt kept in a failure
const BODY_EXCERPT_CHARS: usize = 300;

/// Why a page could not be used
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchFailure {
    /// The request did not complete
    Transport(String),
    /// The server answered with a non-2xx status
    HttpStatus { status: u16, body: String },
    /// The body is not JSON
    InvalidJson(String),
    /// The body is JSON but not an array
    NotAnArray(String),
    /// An array element is not a diff record
    InvalidRecord { index: usize, message: String },
}

impl std::fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchFailure::Transport(e) => write!(f, "request failed: {}", e),
            FetchFailure::HttpStatus { status, body } => {
                write!(f, "HTTP {}: {}", status, body)
            }
            FetchFailure::InvalidJson(e) => write!(f, "invalid JSON body: {}", e),
            FetchFailure::NotAnArray(body) => write!(f, "expected a JSON array, got: {}", body),
            FetchFailure::InvalidRecord { index, message } => {
                write!(f, "element {} is not a diff record: {}", index, message)
            }
        }
    }
}

/// How pagination ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageOutcome {
    /// A page came back empty
    Exhausted,
    /// The page named by `x-total-pages` was reached
    LastPage { total_pages: u32 },
    /// A page failed; records of earlier pages are kept
    Stopped(FetchFailure),
}

/// Result of walking every page of a merge request's diffs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffCollection {
    /// Records in page order, server order within a page
    pub diffs: Vec<DiffRecord>,
    /// Number of requests made
    pub pages_fetched: u32,
    pub outcome: PageOutcome,
}

impl DiffCollection {
    /// Whether pagination ended normally rather than on a failure
    pub fn is_complete(&self) -> bool {
        !matches!(self.outcome, PageOutcome::Stopped(_))
    }
}

/// What to do after looking at one page
#[derive(Debug, PartialEq, Eq)]
enum PageStep {
    /// Keep the records, then either fetch the next page or stop
    Append {
        records: Vec<DiffRecord>,
        last_page: Option<u32>,
    },
    /// Stop without keeping anything from this page
    Stop(PageOutcome),
}

impl GitLabClient {
    /// Fetch every diff of a merge request
    ///
    /// Never fails: transport, status and decoding problems end pagination and
    /// are reported in [`DiffCollection::outcome`] next to the records
    /// gathered up to that point.
    pub async fn collect_mr_diffs(&self, mr_iid: u64) -> DiffCollection {
        let mut diffs = Vec::new();
        let mut page: u32 = 1;

        let url = match self.mr_diffs_url(mr_iid) {
            Ok(url) => url,
            Err(e) => {
                error!(mr_iid, error = %e, "Could not build diff listing URL");
                return DiffCollection {
                    diffs,
                    pages_fetched: 0,
                    outcome: PageOutcome::Stopped(FetchFailure::Transport(e.to_string())),
                };
            }
        };

        let outcome = loop {
            debug!(mr_iid, page, per_page = self.per_page(), "Fetching diff page");

            let step = match self.fetch_page(url.clone(), page).await {
                Ok((status, headers, body)) => evaluate_page(page, status, &headers, &body),
                Err(failure) => PageStep::Stop(PageOutcome::Stopped(failure)),
            };

            match step {
                PageStep::Append { records, last_page } => {
                    debug!(page, count = records.len(), "Received diff page");
                    diffs.extend(records);
                    if let Some(total_pages) = last_page {
                        break PageOutcome::LastPage { total_pages };
                    }
                    page += 1;
                }
                PageStep::Stop(outcome) => break outcome,
            }
        };

        match &outcome {
            PageOutcome::Stopped(failure) => {
                error!(mr_iid, page, error = %failure, "Stopped fetching merge request diffs");
            }
            _ => info!(mr_iid, pages = page, count = diffs.len(), "Fetched merge request diffs"),
        }

        DiffCollection {
            diffs,
            pages_fetched: page,
            outcome,
        }
    }

    async fn fetch_page(
        &self,
        url: url::Url,
        page: u32,
    ) -> std::result::Result<(u16, HeaderMap, String), FetchFailure> {
        let response = self
            .http()
            .get(url)
            .header(PRIVATE_TOKEN_HEADER, self.token())
            .query(&[("page", page), ("per_page", self.per_page())])
            .send()
            .await
            .map_err(|e| FetchFailure::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response
            .text()
            .await
            .map_err(|e| FetchFailure::Transport(e.to_string()))?;

        Ok((status, headers, body))
    }
}

/// Apply the termination rules to one fetched page
fn evaluate_page(page: u32, status: u16, headers: &HeaderMap, body: &str) -> PageStep {
    if !(200..300).contains(&status) {
        return PageStep::Stop(PageOutcome::Stopped(FetchFailure::HttpStatus {
            status,
            body: excerpt(body),
        }));
    }

    let value: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(e) => {
            return PageStep::Stop(PageOutcome::Stopped(FetchFailure::InvalidJson(format!(
                "{} (body: {})",
                e,
                excerpt(body)
            ))))
        }
    };

    let items = match value {
        Value::Array(items) => items,
        other => {
            return PageStep::Stop(PageOutcome::Stopped(FetchFailure::NotAnArray(excerpt(
                &other.to_string(),
            ))))
        }
    };

    if items.is_empty() {
        return PageStep::Stop(PageOutcome::Exhausted);
    }

    let mut records = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        match serde_json::from_value::<DiffRecord>(item) {
            Ok(record) => records.push(record),
            Err(e) => {
                return PageStep::Stop(PageOutcome::Stopped(FetchFailure::InvalidRecord {
                    index,
                    message: e.to_string(),
                }))
            }
        }
    }

    let last_page = total_pages(headers).filter(|&total| page >= total);
    PageStep::Append { records, last_page }
}

/// Parse `x-total-pages`, treating anything but an integer as absent
///
/// Negative values are ignored too; pagination then ends on the empty page.
fn total_pages(headers: &HeaderMap) -> Option<u32> {
    let raw = headers.get(TOTAL_PAGES_HEADER)?;
    let parsed = raw.to_str().ok().and_then(|s| s.trim().parse().ok());
    if parsed.is_none() {
        warn!(value = ?raw, "Ignoring malformed {} header", TOTAL_PAGES_HEADER);
    }
    parsed
}

fn excerpt(body: &str) -> String {
    if body.chars().count() <= BODY_EXCERPT_CHARS {
        body.to_string()
    } else {
        let cut: String = body.chars().take(BODY_EXCERPT_CHARS).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server, ServerGuard};
    use mreview_core::config::GitLabConfig;
    use reqwest::header::HeaderValue;

    const DIFFS_PATH: &str = "/api/v4/projects/7/merge_requests/3/diffs";

    fn headers(total: Option<&str>) -> HeaderMap {
        let mut map = HeaderMap::new();
        if let Some(total) = total {
            map.insert(TOTAL_PAGES_HEADER, HeaderValue::from_str(total).unwrap());
        }
        map
    }

    fn page_body(paths: &[&str]) -> String {
        let items: Vec<Value> = paths
            .iter()
            .map(|p| serde_json::json!({"new_path": p, "old_path": p, "diff": format!("+{}", p)}))
            .collect();
        Value::Array(items).to_string()
    }

    fn client(server: &ServerGuard) -> GitLabClient {
        let config = GitLabConfig {
            url: server.url(),
            project_id: 7,
            per_page: 2,
        };
        GitLabClient::new(&config, "glpat-test").unwrap()
    }

    fn page_query(page: u32) -> Matcher {
        Matcher::AllOf(vec![
            Matcher::UrlEncoded("page".into(), page.to_string()),
            Matcher::UrlEncoded("per_page".into(), "2".into()),
        ])
    }

    fn paths(collection: &DiffCollection) -> Vec<&str> {
        collection.diffs.iter().map(|d| d.new_path.as_str()).collect()
    }

    #[test]
    fn test_evaluate_empty_page_exhausts() {
        let step = evaluate_page(1, 200, &headers(Some("1")), "[]");
        assert_eq!(step, PageStep::Stop(PageOutcome::Exhausted));
    }

    #[test]
    fn test_evaluate_last_page_from_header() {
        let step = evaluate_page(3, 200, &headers(Some("3")), &page_body(&["a"]));
        match step {
            PageStep::Append { records, last_page } => {
                assert_eq!(records, vec![DiffRecord::new("a", "+a")]);
                assert_eq!(last_page, Some(3));
            }
            other => panic!("unexpected step: {:?}", other),
        }
    }

    #[test]
    fn test_evaluate_before_last_page_continues() {
        let step = evaluate_page(1, 200, &headers(Some("3")), &page_body(&["a"]));
        assert!(matches!(step, PageStep::Append { last_page: None, .. }));
    }

    #[test]
    fn test_evaluate_malformed_header_is_absent() {
        for value in ["many", "", "-1", "2.5"] {
            let step = evaluate_page(5, 200, &headers(Some(value)), &page_body(&["a"]));
            assert!(
                matches!(step, PageStep::Append { last_page: None, .. }),
                "header {:?}",
                value
            );
        }
    }

    #[test]
    fn test_total_pages_ignores_negative_values() {
        assert_eq!(total_pages(&headers(Some("-3"))), None);
        assert_eq!(total_pages(&headers(Some(" 7 "))), Some(7));
        assert_eq!(total_pages(&headers(None)), None);
    }

    #[test]
    fn test_evaluate_failures() {
        assert!(matches!(
            evaluate_page(1, 404, &headers(None), "{\"message\":\"404 Not found\"}"),
            PageStep::Stop(PageOutcome::Stopped(FetchFailure::HttpStatus { status: 404, .. }))
        ));
        assert!(matches!(
            evaluate_page(1, 200, &headers(None), "<html>"),
            PageStep::Stop(PageOutcome::Stopped(FetchFailure::InvalidJson(_)))
        ));
        assert!(matches!(
            evaluate_page(1, 200, &headers(None), "{\"diffs\": []}"),
            PageStep::Stop(PageOutcome::Stopped(FetchFailure::NotAnArray(_)))
        ));
    }

    #[test]
    fn test_evaluate_schema_mismatch() {
        let body = r#"[{"new_path": "a", "diff": "+a"}, {"new_path": 5}]"#;
        assert!(matches!(
            evaluate_page(1, 200, &headers(None), body),
            PageStep::Stop(PageOutcome::Stopped(FetchFailure::InvalidRecord { index: 1, .. }))
        ));
    }

    #[test]
    fn test_excerpt_truncates_on_char_boundary() {
        let long = "é".repeat(BODY_EXCERPT_CHARS + 10);
        let cut = excerpt(&long);
        assert!(cut.ends_with("..."));
        assert_eq!(cut.chars().count(), BODY_EXCERPT_CHARS + 3);
    }

    #[tokio::test]
    async fn test_empty_page_ends_pagination_without_header() {
        let mut server = Server::new_async().await;
        let p1 = server
            .mock("GET", DIFFS_PATH)
            .match_query(page_query(1))
            .match_header("private-token", "glpat-test")
            .with_body(page_body(&["a", "b"]))
            .expect(1)
            .create_async()
            .await;
        let p2 = server
            .mock("GET", DIFFS_PATH)
            .match_query(page_query(2))
            .with_body(page_body(&["c"]))
            .expect(1)
            .create_async()
            .await;
        let p3 = server
            .mock("GET", DIFFS_PATH)
            .match_query(page_query(3))
            .with_body("[]")
            .expect(1)
            .create_async()
            .await;
        let p4 = server
            .mock("GET", DIFFS_PATH)
            .match_query(page_query(4))
            .with_body(page_body(&["never"]))
            .expect(0)
            .create_async()
            .await;

        let collection = client(&server).collect_mr_diffs(3).await;

        p1.assert_async().await;
        p2.assert_async().await;
        p3.assert_async().await;
        p4.assert_async().await;
        assert_eq!(paths(&collection), vec!["a", "b", "c"]);
        assert_eq!(collection.pages_fetched, 3);
        assert_eq!(collection.outcome, PageOutcome::Exhausted);
        assert!(collection.is_complete());
    }

    #[tokio::test]
    async fn test_first_page_empty() {
        let mut server = Server::new_async().await;
        let _p1 = server
            .mock("GET", DIFFS_PATH)
            .match_query(page_query(1))
            .with_body("[]")
            .create_async()
            .await;

        let collection = client(&server).collect_mr_diffs(3).await;
        assert!(collection.diffs.is_empty());
        assert_eq!(collection.pages_fetched, 1);
        assert_eq!(collection.outcome, PageOutcome::Exhausted);
    }

    #[tokio::test]
    async fn test_total_pages_header_stops_on_non_empty_page() {
        let mut server = Server::new_async().await;
        let p1 = server
            .mock("GET", DIFFS_PATH)
            .match_query(page_query(1))
            .with_header("x-total-pages", "2")
            .with_body(page_body(&["a", "b"]))
            .expect(1)
            .create_async()
            .await;
        let p2 = server
            .mock("GET", DIFFS_PATH)
            .match_query(page_query(2))
            .with_header("x-total-pages", "2")
            .with_body(page_body(&["c", "d"]))
            .expect(1)
            .create_async()
            .await;
        let p3 = server
            .mock("GET", DIFFS_PATH)
            .match_query(page_query(3))
            .with_body("[]")
            .expect(0)
            .create_async()
            .await;

        let collection = client(&server).collect_mr_diffs(3).await;

        p1.assert_async().await;
        p2.assert_async().await;
        p3.assert_async().await;
        assert_eq!(paths(&collection), vec!["a", "b", "c", "d"]);
        assert_eq!(collection.pages_fetched, 2);
        assert_eq!(collection.outcome, PageOutcome::LastPage { total_pages: 2 });
    }

    #[tokio::test]
    async fn test_malformed_header_falls_back_to_empty_page() {
        let mut server = Server::new_async().await;
        let _p1 = server
            .mock("GET", DIFFS_PATH)
            .match_query(page_query(1))
            .with_header("x-total-pages", "one")
            .with_body(page_body(&["a"]))
            .create_async()
            .await;
        let _p2 = server
            .mock("GET", DIFFS_PATH)
            .match_query(page_query(2))
            .with_header("x-total-pages", "one")
            .with_body("[]")
            .create_async()
            .await;

        let collection = client(&server).collect_mr_diffs(3).await;
        assert_eq!(paths(&collection), vec!["a"]);
        assert_eq!(collection.outcome, PageOutcome::Exhausted);
    }

    #[tokio::test]
    async fn test_error_status_keeps_earlier_pages() {
        for status in [404, 500] {
            let mut server = Server::new_async().await;
            let _p1 = server
                .mock("GET", DIFFS_PATH)
                .match_query(page_query(1))
                .with_body(page_body(&["a", "b"]))
                .create_async()
                .await;
            let _p2 = server
                .mock("GET", DIFFS_PATH)
                .match_query(page_query(2))
                .with_status(status)
                .with_body("{\"message\":\"error\"}")
                .create_async()
                .await;

            let collection = client(&server).collect_mr_diffs(3).await;
            assert_eq!(paths(&collection), vec!["a", "b"]);
            assert_eq!(collection.pages_fetched, 2);
            assert!(!collection.is_complete());
            match collection.outcome {
                PageOutcome::Stopped(FetchFailure::HttpStatus { status: got, .. }) => {
                    assert_eq!(usize::from(got), status)
                }
                other => panic!("unexpected outcome: {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_invalid_json_keeps_earlier_pages() {
        let mut server = Server::new_async().await;
        let _p1 = server
            .mock("GET", DIFFS_PATH)
            .match_query(page_query(1))
            .with_body(page_body(&["a"]))
            .create_async()
            .await;
        let _p2 = server
            .mock("GET", DIFFS_PATH)
            .match_query(page_query(2))
            .with_body("[{\"new_path\": ")
            .create_async()
            .await;

        let collection = client(&server).collect_mr_diffs(3).await;
        assert_eq!(paths(&collection), vec!["a"]);
        assert!(matches!(
            collection.outcome,
            PageOutcome::Stopped(FetchFailure::InvalidJson(_))
        ));
    }

    #[tokio::test]
    async fn test_object_body_stops_immediately() {
        let mut server = Server::new_async().await;
        let _p1 = server
            .mock("GET", DIFFS_PATH)
            .match_query(page_query(1))
            .with_body("{\"message\": \"401 Unauthorized\"}")
            .create_async()
            .await;

        let collection = client(&server).collect_mr_diffs(3).await;
        assert!(collection.diffs.is_empty());
        assert_eq!(collection.pages_fetched, 1);
        assert!(matches!(
            collection.outcome,
            PageOutcome::Stopped(FetchFailure::NotAnArray(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transport_failure() {
        let config = GitLabConfig {
            url: "http://127.0.0.1:1".to_string(),
            project_id: 7,
            per_page: 2,
        };
        let client = GitLabClient::new(&config, "t").unwrap();

        let collection = client.collect_mr_diffs(3).await;
        assert!(collection.diffs.is_empty());
        assert!(matches!(
            collection.outcome,
            PageOutcome::Stopped(FetchFailure::Transport(_))
        ));
    }
}
