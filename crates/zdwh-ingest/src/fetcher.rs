//! Helpdesk API fetcher
//!
//! List endpoints return one page per request together with an absolute
//! `next_page` URL; a `null` cursor ends the stream. Pages are fetched lazily
//! and strictly one at a time. A cursor must stay on the configured API
//! origin, since every request carries the account credentials.

use futures::stream::{self, Stream};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::{debug, info};
use url::Url;

use crate::config::ZendeskConfig;
use crate::entity::EntityConfig;
use crate::error::{ProjectionError, Result, SyncError};

/// One list response
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// Raw records, in response order
    pub records: Vec<Value>,
    /// Cursor to the following page; `None` on the last page
    pub next_page: Option<Url>,
}

impl Page {
    /// Split a decoded response body into records and cursor
    pub fn from_body(body: Value, envelope: &str) -> Result<Self> {
        let mut body = match body {
            Value::Object(map) => map,
            _ => {
                return Err(ProjectionError::MissingEnvelope {
                    envelope: envelope.to_string(),
                }
                .into())
            },
        };

        let records = match body.remove(envelope) {
            Some(Value::Array(records)) => records,
            _ => {
                return Err(ProjectionError::MissingEnvelope {
                    envelope: envelope.to_string(),
                }
                .into())
            },
        };

        let next_page = match body.remove("next_page") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) if s.trim().is_empty() => None,
            Some(Value::String(s)) => Some(Url::parse(&s).map_err(|e| ProjectionError::InvalidCursor {
                value: s.clone(),
                reason: e.to_string(),
            })?),
            Some(other) => {
                return Err(ProjectionError::InvalidCursor {
                    value: other.to_string(),
                    reason: "expected a URL string".to_string(),
                }
                .into())
            },
        };

        Ok(Self { records, next_page })
    }
}

/// Authenticated client for the helpdesk REST API
#[derive(Clone)]
pub struct HelpdeskClient {
    http: Client,
    base_url: Url,
    auth_user: String,
    api_token: String,
}

impl std::fmt::Debug for HelpdeskClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HelpdeskClient")
            .field("base_url", &self.base_url.as_str())
            .field("auth_user", &self.auth_user)
            .finish_non_exhaustive()
    }
}

impl HelpdeskClient {
    pub fn new(config: &ZendeskConfig) -> Result<Self> {
        let mut base_url = Url::parse(&config.base_url)
            .map_err(|e| SyncError::config(format!("Invalid zendesk.base_url: {}", e)))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let mut builder = Client::builder().user_agent(concat!("zdwh-ingest/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            http: builder.build()?,
            base_url,
            auth_user: config.auth_user(),
            api_token: config.api_token.clone(),
        })
    }

    /// `{base}/api/v2/{resource}.json` with the entity's fixed query
    pub fn endpoint(&self, entity: &EntityConfig) -> Result<Url> {
        let mut url = self
            .base_url
            .join(&format!("api/v2/{}.json", entity.resource))
            .map_err(|e| SyncError::config(format!("Cannot build URL for {}: {}", entity.kind, e)))?;

        if !entity.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &entity.query {
                pairs.append_pair(key, value);
            }
        }

        Ok(url)
    }

    /// GET one page; anything but 200 is an auth/transport failure
    pub async fn get_page(&self, url: &Url, envelope: &str) -> Result<Page> {
        debug!(url = %url, "Requesting page");

        let response = self
            .http
            .get(url.clone())
            .basic_auth(&self.auth_user, Some(&self.api_token))
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(SyncError::UnexpectedStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body: Value = response.json().await?;
        Page::from_body(body, envelope)
    }

    /// Reject a cursor whose scheme, host or port differs from the base URL
    fn check_cursor(&self, cursor: &Url) -> Result<()> {
        if cursor.origin() != self.base_url.origin() {
            return Err(ProjectionError::InvalidCursor {
                value: cursor.to_string(),
                reason: format!("outside the API origin {}", self.base_url.origin().ascii_serialization()),
            }
            .into());
        }
        Ok(())
    }

    /// Lazily walk every page of `entity`
    pub fn pages<'a>(&'a self, entity: &'a EntityConfig) -> Result<PageFetcher<'a>> {
        Ok(PageFetcher {
            client: self,
            envelope: entity.envelope,
            next: Some(self.endpoint(entity)?),
            fetched: 0,
        })
    }
}

/// Cursor over the pages of one resource
#[derive(Debug)]
pub struct PageFetcher<'a> {
    client: &'a HelpdeskClient,
    envelope: &'a str,
    next: Option<Url>,
    fetched: usize,
}

impl<'a> PageFetcher<'a> {
    /// Fetch the next page, or `None` once the cursor is exhausted
    pub async fn next_page(&mut self) -> Result<Option<Page>> {
        let Some(url) = self.next.take() else {
            return Ok(None);
        };

        let page = self.client.get_page(&url, self.envelope).await?;
        if let Some(cursor) = &page.next_page {
            self.client.check_cursor(cursor)?;
        }
        self.fetched += 1;
        self.next = page.next_page.clone();

        info!(
            page = self.fetched,
            records = page.records.len(),
            last = self.next.is_none(),
            "Fetched page"
        );

        Ok(Some(page))
    }

    /// Pages fetched so far
    pub fn fetched(&self) -> usize {
        self.fetched
    }

    /// Adapt into a `Stream`; ends after the first error
    pub fn into_stream(self) -> impl Stream<Item = Result<Page>> + 'a {
        stream::try_unfold(self, |mut fetcher| async move {
            Ok::<_, SyncError>(fetcher.next_page().await?.map(|page| (page, fetcher)))
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::entity::EntityKind;
    use serde_json::json;

    fn client(base: &str) -> HelpdeskClient {
        HelpdeskClient::new(&ZendeskConfig {
            base_url: base.to_string(),
            email: "reporting@example.com".to_string(),
            api_token: "token".to_string(),
            user_roles: vec![],
            request_timeout_secs: 0,
        })
        .unwrap()
    }

    #[test]
    fn test_page_with_cursor() {
        let page = Page::from_body(
            json!({
                "brands": [{"id": 1}, {"id": 2}],
                "next_page": "https://example.zendesk.com/api/v2/brands.json?page=2",
                "count": 3
            }),
            "brands",
        )
        .unwrap();
        assert_eq!(page.records.len(), 2);
        assert_eq!(
            page.next_page.unwrap().as_str(),
            "https://example.zendesk.com/api/v2/brands.json?page=2"
        );
    }

    #[test]
    fn test_null_absent_or_empty_cursor_ends_stream() {
        for body in [
            json!({"brands": [], "next_page": null}),
            json!({"brands": []}),
            json!({"brands": [], "next_page": ""}),
        ] {
            assert_eq!(Page::from_body(body, "brands").unwrap().next_page, None);
        }
    }

    #[test]
    fn test_missing_envelope() {
        let err = Page::from_body(json!({"users": []}), "brands").unwrap_err();
        assert!(matches!(
            err,
            SyncError::Projection(ProjectionError::MissingEnvelope { .. })
        ));
        assert!(Page::from_body(json!([1, 2]), "brands").is_err());
    }

    #[test]
    fn test_bad_cursor() {
        let err = Page::from_body(json!({"brands": [], "next_page": 7}), "brands").unwrap_err();
        assert!(matches!(
            err,
            SyncError::Projection(ProjectionError::InvalidCursor { .. })
        ));
        assert!(Page::from_body(json!({"brands": [], "next_page": "not a url"}), "brands").is_err());
    }

    #[test]
    fn test_cursor_must_share_base_origin() {
        let client = client("https://example.zendesk.com/proxy");
        let same = Url::parse("https://example.zendesk.com/api/v2/brands.json?page=2").unwrap();
        assert!(client.check_cursor(&same).is_ok());

        for other in [
            "https://attacker.example.net/api/v2/brands.json?page=2",
            "http://example.zendesk.com/api/v2/brands.json?page=2",
            "https://example.zendesk.com:8443/api/v2/brands.json?page=2",
        ] {
            let err = client.check_cursor(&Url::parse(other).unwrap()).unwrap_err();
            assert!(matches!(
                err,
                SyncError::Projection(ProjectionError::InvalidCursor { .. })
            ));
        }
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let brands = EntityConfig::build(EntityKind::Brands, "dbo", &[]).unwrap();
        let client = client("https://example.zendesk.com/proxy");
        assert_eq!(
            client.endpoint(&brands).unwrap().as_str(),
            "https://example.zendesk.com/proxy/api/v2/brands.json"
        );
    }

    #[test]
    fn test_endpoint_role_filter() {
        let users = EntityConfig::build(
            EntityKind::Users,
            "dbo",
            &["admin".to_string(), "agent".to_string()],
        )
        .unwrap();
        let url = client("https://example.zendesk.com").endpoint(&users).unwrap();
        let pairs: Vec<_> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("role[]".to_string(), "admin".to_string()),
                ("role[]".to_string(), "agent".to_string()),
            ]
        );
    }
}
