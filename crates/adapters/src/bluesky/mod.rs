//! Bluesky (AT Protocol) publishing adapter

pub mod richtext;

use archive_poster_domain::{CaptionResult, ImagePost, PublishError, PublishReceipt, Publisher};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use richtext::{Facet, FacetFeature, find_hashtags, find_links, find_mentions};

pub const DEFAULT_SERVICE_URL: &str = "https://bsky.social";
pub const DEFAULT_REPLY_PREFIX: &str = "DPL Archive post: ";

/// Bluesky publisher posting one image with a threaded source-link reply
pub struct BlueskyPublisher {
    client: Client,
    service_url: String,
    identifier: String,
    password: SecretString,
    reply_prefix: String,
    enabled: bool,
}

impl BlueskyPublisher {
    pub fn new(identifier: String, password: SecretString) -> Self {
        Self::with_service_url(
            DEFAULT_SERVICE_URL.to_string(),
            identifier,
            password,
            DEFAULT_REPLY_PREFIX.to_string(),
        )
    }

    pub fn with_service_url(
        service_url: String,
        identifier: String,
        password: SecretString,
        reply_prefix: String,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            service_url: service_url.trim_end_matches('/').to_string(),
            identifier,
            password,
            reply_prefix,
            enabled: true,
        }
    }

    /// Create a disabled publisher (missing credentials or dry-run)
    pub fn disabled() -> Self {
        Self {
            client: Client::new(),
            service_url: String::new(),
            identifier: String::new(),
            password: SecretString::new("".into()),
            reply_prefix: DEFAULT_REPLY_PREFIX.to_string(),
            enabled: false,
        }
    }

    fn xrpc(&self, method: &str) -> String {
        format!("{}/xrpc/{}", self.service_url, method)
    }

    async fn create_session(&self) -> Result<Session, PublishError> {
        let response = self
            .client
            .post(self.xrpc("com.atproto.server.createSession"))
            .json(&json!({
                "identifier": self.identifier,
                "password": self.password.expose_secret(),
            }))
            .send()
            .await
            .map_err(|e| PublishError::Api(e.to_string()))?;

        let session: Session = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| PublishError::Api(format!("Invalid session response: {}", e)))?;

        tracing::debug!(did = %session.did, "Created Bluesky session");
        Ok(session)
    }

    async fn upload_blob(
        &self,
        session: &Session,
        post: &ImagePost,
    ) -> Result<Value, PublishError> {
        let bytes = tokio::fs::read(&post.image_path).await?;
        let mime = mime_guess::from_path(&post.image_path).first_or_octet_stream();

        let response = self
            .client
            .post(self.xrpc("com.atproto.repo.uploadBlob"))
            .bearer_auth(&session.access_jwt)
            .header("Content-Type", mime.essence_str())
            .body(bytes)
            .send()
            .await
            .map_err(|e| PublishError::Api(e.to_string()))?;

        let upload: UploadBlobResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| PublishError::Api(format!("Invalid upload response: {}", e)))?;

        Ok(upload.blob)
    }

    async fn create_post(
        &self,
        session: &Session,
        record: Value,
    ) -> Result<StrongRef, PublishError> {
        let response = self
            .client
            .post(self.xrpc("com.atproto.repo.createRecord"))
            .bearer_auth(&session.access_jwt)
            .json(&json!({
                "repo": session.did,
                "collection": "app.bsky.feed.post",
                "record": record,
            }))
            .send()
            .await
            .map_err(|e| PublishError::Api(e.to_string()))?;

        check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| PublishError::Api(format!("Invalid createRecord response: {}", e)))
    }

    async fn resolve_handle(&self, handle: &str) -> Option<String> {
        let response = self
            .client
            .get(self.xrpc("com.atproto.identity.resolveHandle"))
            .query(&[("handle", handle)])
            .send()
            .await
            .ok()?;

        if !response.status().is_success() {
            tracing::debug!(handle, status = %response.status(), "Could not resolve handle");
            return None;
        }

        response
            .json::<ResolveHandleResponse>()
            .await
            .ok()
            .map(|resolved| resolved.did)
    }

    /// Link, hashtag and mention facets for `text`; unresolvable mentions stay plain
    async fn detect_facets(&self, text: &str) -> Vec<Facet> {
        let mut facets: Vec<Facet> = find_links(text)
            .iter()
            .map(|span| {
                Facet::new(
                    span,
                    FacetFeature::Link {
                        uri: span.value.clone(),
                    },
                )
            })
            .collect();

        for span in find_mentions(text) {
            if let Some(did) = self.resolve_handle(&span.value).await {
                facets.push(Facet::new(&span, FacetFeature::Mention { did }));
            }
        }

        facets.extend(find_hashtags(text).iter().map(|span| {
            Facet::new(
                span,
                FacetFeature::Tag {
                    tag: span.value.clone(),
                },
            )
        }));

        facets.sort_by_key(|facet| facet.index.byte_start);
        facets
    }

    async fn post_record(&self, text: &str) -> Result<Value, PublishError> {
        let created_at = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .map_err(|e| PublishError::Api(e.to_string()))?;

        let mut record = json!({
            "$type": "app.bsky.feed.post",
            "text": text,
            "createdAt": created_at,
        });

        let facets = self.detect_facets(text).await;
        if !facets.is_empty() {
            record["facets"] = serde_json::to_value(&facets)
                .map_err(|e| PublishError::Api(e.to_string()))?;
        }

        Ok(record)
    }

    async fn reply_with_source(
        &self,
        session: &Session,
        parent: &StrongRef,
        post: &ImagePost,
        source_url: &str,
    ) -> Result<StrongRef, PublishError> {
        let text = reply_text(&self.reply_prefix, source_url, &post.caption);
        let mut record = self.post_record(&text).await?;
        record["reply"] = json!({ "root": parent, "parent": parent });

        self.create_post(session, record).await
    }
}

/// Reply body: source link, then the tags line, then the attribution line
pub fn reply_text(prefix: &str, source_url: &str, caption: &CaptionResult) -> String {
    let mut text = format!("{prefix}{source_url}");

    if !caption.tags.is_empty() {
        text.push_str("\n\n");
        text.push_str(&caption.tags.join(" "));
    }

    if let Some(creator) = &caption.creator_name {
        text.push_str("\n\nCreator: ");
        text.push_str(creator);
    }

    text
}

async fn check_status(response: Response) -> Result<Response, PublishError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    match status {
        StatusCode::UNAUTHORIZED => Err(PublishError::Auth(body)),
        StatusCode::TOO_MANY_REQUESTS => Err(PublishError::RateLimited),
        _ => Err(PublishError::Api(format!(
            "Bluesky API returned {}: {}",
            status, body
        ))),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Session {
    access_jwt: String,
    did: String,
}

#[derive(Deserialize)]
struct UploadBlobResponse {
    blob: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StrongRef {
    uri: String,
    cid: String,
}

#[derive(Deserialize)]
struct ResolveHandleResponse {
    did: String,
}

#[async_trait]
impl Publisher for BlueskyPublisher {
    async fn publish(&self, post: &ImagePost) -> Result<PublishReceipt, PublishError> {
        if !self.enabled {
            return Err(PublishError::Disabled);
        }

        let session = self.create_session().await?;
        let blob = self.upload_blob(&session, post).await?;

        let mut record = self.post_record(&post.caption.text).await?;
        record["embed"] = json!({
            "$type": "app.bsky.embed.images",
            "images": [{ "alt": post.caption.text, "image": blob }],
        });

        let main = self.create_post(&session, record).await?;
        tracing::info!(uri = %main.uri, record_id = %post.record_id, "Posted image to Bluesky");

        let reply_uri = match post.source_url.as_deref().filter(|url| !url.is_empty()) {
            Some(source_url) => {
                match self
                    .reply_with_source(&session, &main, post, source_url)
                    .await
                {
                    Ok(reply) => {
                        tracing::info!(uri = %reply.uri, "Posted source reply");
                        Some(reply.uri)
                    }
                    Err(e) => {
                        // The image post is already visible
                        tracing::error!(
                            error = %e,
                            post_uri = %main.uri,
                            "Failed to post source reply"
                        );
                        None
                    }
                }
            }
            None => None,
        };

        Ok(PublishReceipt {
            uri: main.uri,
            cid: main.cid,
            reply_uri,
        })
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn platform(&self) -> &'static str {
        "bluesky"
    }
}
