// In crates/database/src/github.rs

//! A results repository on GitHub, driven through the contents API.
//!
//! The state lives in `state/{key}.json`; the blob `sha` GitHub returns is its version, and the
//! `sha` precondition on `PUT` is the compare-and-swap. Cycle records are committed under
//! `outputs/{YYYY-MM-DD}/{name}.json`.

use crate::{Error, Persistence, Result, Version};
use app_config::types::GithubSettings;
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const USER_AGENT: &str = "rsi-agent";

#[derive(Debug, Clone)]
pub struct GithubStore {
    client: Client,
    api_url: String,
    repo: String,
    branch: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct ContentResponse {
    sha: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct PutRequest<'a> {
    message: String,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct PutResponse {
    content: PutContent,
}

#[derive(Debug, Deserialize)]
struct PutContent {
    sha: String,
}

fn state_path(key: &str) -> String {
    format!("state/{key}.json")
}

fn record_path(name: &str, day: &str) -> String {
    format!("outputs/{day}/{name}.json")
}

/// GitHub wraps base64 content at 60 columns.
fn decode_content(content: &str) -> Result<String> {
    let compact: String = content.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD
        .decode(compact)
        .map_err(|e| Error::Corrupt(format!("content is not base64: {e}")))?;
    String::from_utf8(bytes).map_err(|e| Error::Corrupt(format!("content is not UTF-8: {e}")))
}

fn unavailable(e: reqwest::Error) -> Error {
    Error::Unavailable(format!("GitHub request failed: {e}"))
}

impl GithubStore {
    pub fn new(settings: &GithubSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()
            .map_err(unavailable)?;
        Ok(Self {
            client,
            api_url: settings.api_url.trim_end_matches('/').to_string(),
            repo: settings.repo.clone(),
            branch: settings.branch.clone(),
            token: settings.token.clone(),
        })
    }

    fn contents_url(&self, path: &str) -> String {
        format!("{}/repos/{}/contents/{}", self.api_url, self.repo, path)
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("Authorization", format!("token {}", self.token))
            .header("Accept", "application/vnd.github.v3+json")
    }

    async fn put(&self, path: &str, payload: &str, sha: Option<&str>, message: String) -> Result<reqwest::Response> {
        let body = PutRequest { message, content: STANDARD.encode(payload), branch: &self.branch, sha };
        self.request(reqwest::Method::PUT, &self.contents_url(path))
            .json(&body)
            .send()
            .await
            .map_err(unavailable)
    }
}

#[async_trait]
impl Persistence for GithubStore {
    fn name(&self) -> &'static str {
        "github"
    }

    async fn read(&self, key: &str) -> Result<Option<(String, Version)>> {
        let url = format!("{}?ref={}", self.contents_url(&state_path(key)), self.branch);
        let response = self.request(reqwest::Method::GET, &url).send().await.map_err(unavailable)?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let body: ContentResponse = response.json().await.map_err(unavailable)?;
                Ok(Some((decode_content(&body.content)?, Version::Tag(body.sha))))
            }
            status => {
                let text = response.text().await.unwrap_or_default();
                Err(Error::Unavailable(format!("GitHub read returned {status}: {text}")))
            }
        }
    }

    async fn write(&self, key: &str, payload: &str, expected: &Version) -> Result<Version> {
        let sha = match expected {
            Version::Absent => None,
            Version::Tag(sha) => Some(sha.as_str()),
        };
        let message = format!("chore: update {key} at {}", Utc::now().format("%Y%m%d_%H%M%S"));
        let response = self.put(&state_path(key), payload, sha, message).await?;

        match response.status() {
            // 409: sha no longer matches the branch head; 422: file exists but no sha was given.
            StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => {
                let actual = match self.read(key).await {
                    Ok(Some((_, version))) => version.to_string(),
                    Ok(None) => Version::Absent.to_string(),
                    Err(_) => "unknown".to_string(),
                };
                Err(Error::ConcurrentModification { key: key.to_string(), expected: expected.to_string(), actual })
            }
            status if status.is_success() => {
                let body: PutResponse = response.json().await.map_err(unavailable)?;
                Ok(Version::Tag(body.content.sha))
            }
            status => {
                let text = response.text().await.unwrap_or_default();
                Err(Error::Unavailable(format!("GitHub write returned {status}: {text}")))
            }
        }
    }

    async fn write_record(&self, name: &str, payload: &str) -> Result<()> {
        let path = record_path(name, &Utc::now().format("%Y-%m-%d").to_string());
        let message = format!("feat: log cycle record {name}");
        let response = self.put(&path, payload, None, message).await?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Unavailable(format!("GitHub record write returned {status}: {text}")));
        }
        tracing::debug!(repo = %self.repo, %path, "Committed cycle record.");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path, path_regex, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const STATE_PATH: &str = "/repos/owner/results/contents/state/trading_state.json";

    fn store_for(server: &MockServer) -> GithubStore {
        GithubStore::new(&GithubSettings {
            token: "t0ken".into(),
            repo: "owner/results".into(),
            branch: "main".into(),
            api_url: server.uri(),
        })
        .unwrap()
    }

    async fn mount_current(server: &MockServer, payload: &str, sha: &str) {
        Mock::given(method("GET"))
            .and(path(STATE_PATH))
            .and(query_param("ref", "main"))
            .and(header("Authorization", "token t0ken"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"sha": sha, "content": STANDARD.encode(payload)})),
            )
            .mount(server)
            .await;
    }

    #[test]
    fn test_paths() {
        assert_eq!(state_path("trading_state"), "state/trading_state.json");
        assert_eq!(record_path("cycle_42", "2025-08-01"), "outputs/2025-08-01/cycle_42.json");
    }

    #[test]
    fn test_decode_wrapped_content() {
        let encoded = STANDARD.encode(r#"{"ledger":{"total_budget":"40"}}"#);
        let (head, tail) = encoded.split_at(10);
        let wrapped = format!("{head}\n{tail}\n");
        assert_eq!(decode_content(&wrapped).unwrap(), r#"{"ledger":{"total_budget":"40"}}"#);
    }

    #[test]
    fn test_garbage_content_is_corrupt() {
        assert!(matches!(decode_content("@@@"), Err(Error::Corrupt(_))));
    }

    #[test]
    fn test_put_body_omits_sha_on_create() {
        let body = PutRequest { message: "m".into(), content: "e30=".into(), branch: "main", sha: None };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("sha").is_none());
        assert_eq!(json["branch"], "main");
    }

    #[tokio::test]
    async fn test_read_missing_state_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(STATE_PATH))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({"message": "Not Found"})))
            .mount(&server)
            .await;

        assert!(store_for(&server).read("trading_state").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_uses_blob_sha_as_version() {
        let server = MockServer::start().await;
        mount_current(&server, r#"{"a":1}"#, "sha-1").await;

        let (payload, version) = store_for(&server).read("trading_state").await.unwrap().unwrap();
        assert_eq!(payload, r#"{"a":1}"#);
        assert_eq!(version, Version::Tag("sha-1".into()));
    }

    #[tokio::test]
    async fn test_write_sends_expected_sha_and_returns_new_one() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path(STATE_PATH))
            .and(body_partial_json(serde_json::json!({
                "sha": "sha-1",
                "branch": "main",
                "content": STANDARD.encode(r#"{"a":2}"#)
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"content": {"sha": "sha-2"}})))
            .expect(1)
            .mount(&server)
            .await;

        let version = store_for(&server)
            .write("trading_state", r#"{"a":2}"#, &Version::Tag("sha-1".into()))
            .await
            .unwrap();
        assert_eq!(version, Version::Tag("sha-2".into()));
    }

    #[tokio::test]
    async fn test_stale_sha_is_a_conflict() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path(STATE_PATH))
            .respond_with(ResponseTemplate::new(409).set_body_json(serde_json::json!({"message": "does not match"})))
            .mount(&server)
            .await;
        mount_current(&server, r#"{"a":3}"#, "sha-3").await;

        let err = store_for(&server)
            .write("trading_state", r#"{"a":2}"#, &Version::Tag("sha-1".into()))
            .await
            .unwrap_err();
        match err {
            Error::ConcurrentModification { expected, actual, .. } => {
                assert_eq!(expected, "sha-1");
                assert_eq!(actual, "sha-3");
            }
            other => panic!("expected a conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_create_over_existing_file_is_a_conflict() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path(STATE_PATH))
            .respond_with(ResponseTemplate::new(422).set_body_json(serde_json::json!({"message": "sha wasn't supplied"})))
            .mount(&server)
            .await;
        mount_current(&server, "{}", "sha-9").await;

        let err = store_for(&server).write("trading_state", "{}", &Version::Absent).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_record_is_committed_under_dated_outputs() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path_regex(r"^/repos/owner/results/contents/outputs/\d{4}-\d{2}-\d{2}/cycle_7\.json$"))
            .and(body_partial_json(serde_json::json!({"branch": "main", "content": STANDARD.encode("{}")})))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"content": {"sha": "r1"}})))
            .expect(1)
            .mount(&server)
            .await;

        store_for(&server).write_record("cycle_7", "{}").await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_record_write_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let err = store_for(&server).write_record("cycle_7", "{}").await.unwrap_err();
        assert!(matches!(err, Error::Unavailable(_)));
    }
}
