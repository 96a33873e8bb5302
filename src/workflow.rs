// workflow.rs - Add GIF Workflow Module
// Runs one /addgif invocation: normalize the name, check for an existing asset,
// validate the source URL, download it and publish it over SFTP.
//
// Key Features:
// - Sequential pipeline: every step returns Ok(value) to continue or Err(Halt) to stop
// - Exactly one user-facing message per halt, routed as initial response or follow-up
// - No retries; the user re-runs the command after fixing the problem
// - HTTP, SFTP and chat access go through traits so the whole flow runs on fakes in tests
//
// Used by: commands/addgif.rs

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, error, info, warn};
use reqwest::StatusCode;
use serenity::model::id::{ChannelId, UserId};
use thiserror::Error;
use uuid::Uuid;

use crate::assets::{public_asset_url, CanonicalAssetName};
use crate::fetch::{is_gif_content_type, AssetHttp, FetchError};
use crate::sftp::{AssetPublisher, PublishError};

// ============================================================================
// REQUEST / STATE TYPES
// ============================================================================

/// One /addgif invocation; built once and never mutated
#[derive(Debug, Clone)]
pub struct AddGifRequest {
    pub raw_name: String,
    pub source_url: String,
    pub requesting_user: UserId,
    pub reply_channel: ChannelId,
}

/// Workflow states, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Received,
    Normalized,
    ExistenceChecked,
    ContentValidated,
    Downloaded,
    Published,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let label = match self {
            Stage::Received => "received",
            Stage::Normalized => "normalized",
            Stage::ExistenceChecked => "existence-checked",
            Stage::ContentValidated => "content-validated",
            Stage::Downloaded => "downloaded",
            Stage::Published => "published",
        };
        f.write_str(label)
    }
}

/// How a message reaches the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The interaction's one initial response
    Initial,
    /// A plain message in the invoking channel
    FollowUp,
}

/// Why a run stopped. Display is the exact text shown to the user.
#[derive(Debug, Error)]
pub enum Halt {
    #[error("A file with the same name already exists: {url}")]
    Collision { url: String },

    #[error(
        "Is this accessible/a GIF? Content Type: {}, Server Response: {}",
        .content_type.as_deref().unwrap_or("none"),
        .status.as_u16()
    )]
    NotGif {
        content_type: Option<String>,
        status: StatusCode,
    },

    #[error("Failed to get details of the file from {url}: {source}")]
    Unreachable { url: String, source: FetchError },

    #[error("<@{user}>: Failed to download the file from {url}: {source}")]
    DownloadFailed {
        user: UserId,
        url: String,
        source: FetchError,
    },

    #[error("<@{user}>: Failed to download the file from {url}: {}", .status.as_u16())]
    DownloadStatus {
        user: UserId,
        url: String,
        status: StatusCode,
    },

    #[error("<@{user}>: Failed to upload the last GIF: {source}")]
    PublishFailed { user: UserId, source: PublishError },
}

impl Halt {
    /// Last stage completed before the halt
    pub fn halted_after(&self) -> Stage {
        match self {
            Halt::Collision { .. } => Stage::Normalized,
            Halt::NotGif { .. } | Halt::Unreachable { .. } => Stage::ExistenceChecked,
            Halt::DownloadFailed { .. } | Halt::DownloadStatus { .. } => Stage::ContentValidated,
            Halt::PublishFailed { .. } => Stage::Downloaded,
        }
    }

    /// Validation results answer the interaction itself; everything else goes to the channel
    pub fn delivery(&self) -> Delivery {
        match self {
            Halt::NotGif { .. } | Halt::Unreachable { .. } => Delivery::Initial,
            _ => Delivery::FollowUp,
        }
    }
}

#[derive(Debug)]
pub enum Outcome {
    Published { url: String },
    Halted { after: Stage, reason: Halt },
}

// ============================================================================
// CHAT OUTPUT
// ============================================================================

/// Where workflow messages go. Implemented over a Discord interaction in commands/addgif.rs.
#[async_trait]
pub trait Replies: Send + Sync {
    async fn initial_response(&self, content: &str) -> Result<(), serenity::Error>;
    async fn follow_up(&self, content: &str) -> Result<(), serenity::Error>;
}

async fn deliver(replies: &dyn Replies, delivery: Delivery, content: &str, invocation: Uuid) {
    let sent = match delivery {
        Delivery::Initial => replies.initial_response(content).await,
        Delivery::FollowUp => replies.follow_up(content).await,
    };

    if let Err(e) = sent {
        error!("❌ [ADDGIF {}] Failed to send {:?} message: {}", invocation, delivery, e);
    }
}

// ============================================================================
// WORKFLOW
// ============================================================================

/// Services shared by every /addgif invocation
pub struct AddGifWorkflow {
    http: Arc<dyn AssetHttp>,
    publisher: Arc<dyn AssetPublisher>,
    assets_base_url: String,
}

impl AddGifWorkflow {
    pub fn new(http: Arc<dyn AssetHttp>, publisher: Arc<dyn AssetPublisher>, assets_base_url: impl Into<String>) -> Self {
        AddGifWorkflow {
            http,
            publisher,
            assets_base_url: assets_base_url.into(),
        }
    }

    /// Run one invocation to completion. Sends exactly one terminal message
    /// (the success notice or the halt reason) plus the acknowledgment on the happy path.
    pub async fn run(&self, request: &AddGifRequest, replies: &dyn Replies) -> Outcome {
        let invocation = Uuid::new_v4();
        info!(
            "🎞️ [ADDGIF {}] name='{}' url='{}' user={} channel={}",
            invocation, request.raw_name, request.source_url, request.requesting_user, request.reply_channel
        );
        debug!("[ADDGIF {}] stage: {}", invocation, Stage::Received);

        let name = CanonicalAssetName::normalize(&request.raw_name);
        debug!("[ADDGIF {}] stage: {} ({})", invocation, Stage::Normalized, name);

        match self.advance(request, &name, replies, invocation).await {
            Ok(url) => {
                debug!("[ADDGIF {}] stage: {}", invocation, Stage::Published);
                info!("✅ [ADDGIF {}] Published {}", invocation, url);
                let message = format!("<@{}>: New GIF added: {}", request.requesting_user, url);
                deliver(replies, Delivery::FollowUp, &message, invocation).await;
                Outcome::Published { url }
            }
            Err(reason) => {
                let after = reason.halted_after();
                warn!("⚠️ [ADDGIF {}] Halted after {}: {}", invocation, after, reason);
                deliver(replies, reason.delivery(), &reason.to_string(), invocation).await;
                Outcome::Halted { after, reason }
            }
        }
    }

    async fn advance(
        &self,
        request: &AddGifRequest,
        name: &CanonicalAssetName,
        replies: &dyn Replies,
        invocation: Uuid,
    ) -> Result<String, Halt> {
        self.check_existing(name, invocation).await?;
        debug!("[ADDGIF {}] stage: {}", invocation, Stage::ExistenceChecked);

        self.validate_source(&request.source_url, name, replies, invocation).await?;
        debug!("[ADDGIF {}] stage: {}", invocation, Stage::ContentValidated);

        let payload = self.download(request).await?;
        debug!("[ADDGIF {}] stage: {} ({} bytes)", invocation, Stage::Downloaded, payload.len());

        self.publish(request, name, payload).await
    }

    /// HEAD the public URL; a success status means the name is taken.
    /// A failed probe is logged and treated as "not existing".
    async fn check_existing(&self, name: &CanonicalAssetName, invocation: Uuid) -> Result<(), Halt> {
        let url = public_asset_url(&self.assets_base_url, name);

        match self.http.head(&url).await {
            Ok(response) if response.status.is_success() => Err(Halt::Collision { url }),
            Ok(response) => {
                debug!("[ADDGIF {}] {} not present ({})", invocation, url, response.status);
                Ok(())
            }
            Err(e) => {
                warn!("⚠️ [ADDGIF {}] Existence probe for {} failed, continuing: {}", invocation, url, e);
                Ok(())
            }
        }
    }

    /// HEAD the source URL and require a GIF; acknowledges the interaction on success
    async fn validate_source(
        &self,
        source_url: &str,
        name: &CanonicalAssetName,
        replies: &dyn Replies,
        invocation: Uuid,
    ) -> Result<(), Halt> {
        let response = self.http.head(source_url).await.map_err(|source| Halt::Unreachable {
            url: source_url.to_string(),
            source,
        })?;

        if !response.status.is_success() || !is_gif_content_type(response.content_type.as_deref()) {
            return Err(Halt::NotGif {
                content_type: response.content_type,
                status: response.status,
            });
        }

        let ack = format!("Attempting to upload {} to assets...", name);
        deliver(replies, Delivery::Initial, &ack, invocation).await;
        Ok(())
    }

    /// GET the source URL into memory. No size cap.
    async fn download(&self, request: &AddGifRequest) -> Result<Vec<u8>, Halt> {
        let response = self.http.get(&request.source_url).await.map_err(|source| Halt::DownloadFailed {
            user: request.requesting_user,
            url: request.source_url.clone(),
            source,
        })?;

        if !response.status.is_success() {
            return Err(Halt::DownloadStatus {
                user: request.requesting_user,
                url: request.source_url.clone(),
                status: response.status,
            });
        }

        Ok(response.body)
    }

    async fn publish(&self, request: &AddGifRequest, name: &CanonicalAssetName, payload: Vec<u8>) -> Result<String, Halt> {
        self.publisher
            .publish(name, payload)
            .await
            .map_err(|source| Halt::PublishFailed {
                user: request.requesting_user,
                source,
            })?;

        Ok(public_asset_url(&self.assets_base_url, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{GetResponse, HeadResponse};
    use std::collections::HashMap;
    use std::sync::Mutex;

    const BASE: &str = "https://assets.ledfx.app";
    const SOURCE: &str = "https://media.example/wave.gif";

    /// Scripted HTTP: per-URL HEAD and GET answers, every call recorded
    #[derive(Default)]
    struct FakeHttp {
        heads: HashMap<String, Result<HeadResponse, String>>,
        gets: HashMap<String, Result<GetResponse, String>>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeHttp {
        fn head_ok(mut self, url: &str, status: StatusCode, content_type: Option<&str>) -> Self {
            let response = HeadResponse {
                status,
                content_type: content_type.map(str::to_string),
            };
            self.heads.insert(url.to_string(), Ok(response));
            self
        }

        fn head_err(mut self, url: &str) -> Self {
            self.heads.insert(url.to_string(), Err(url.to_string()));
            self
        }

        fn get_ok(mut self, url: &str, status: StatusCode, body: &[u8]) -> Self {
            let response = GetResponse { status, body: body.to_vec() };
            self.gets.insert(url.to_string(), Ok(response));
            self
        }

        fn get_err(mut self, url: &str) -> Self {
            self.gets.insert(url.to_string(), Err(url.to_string()));
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AssetHttp for FakeHttp {
        async fn head(&self, url: &str) -> Result<HeadResponse, FetchError> {
            self.calls.lock().unwrap().push(format!("HEAD {}", url));
            match self.heads.get(url) {
                Some(Ok(response)) => Ok(response.clone()),
                Some(Err(bad)) => Err(FetchError::InvalidUrl(bad.clone())),
                None => Ok(HeadResponse { status: StatusCode::NOT_FOUND, content_type: None }),
            }
        }

        async fn get(&self, url: &str) -> Result<GetResponse, FetchError> {
            self.calls.lock().unwrap().push(format!("GET {}", url));
            match self.gets.get(url) {
                Some(Ok(response)) => Ok(response.clone()),
                Some(Err(bad)) => Err(FetchError::InvalidUrl(bad.clone())),
                None => Ok(GetResponse { status: StatusCode::NOT_FOUND, body: Vec::new() }),
            }
        }
    }

    /// Records open/close around every publish, like a real session guard would
    #[derive(Default)]
    struct FakePublisher {
        fail: bool,
        events: Mutex<Vec<String>>,
        uploads: Mutex<Vec<(String, Vec<u8>)>>,
    }

    #[async_trait]
    impl AssetPublisher for FakePublisher {
        async fn publish(&self, name: &CanonicalAssetName, payload: Vec<u8>) -> Result<(), PublishError> {
            self.events.lock().unwrap().push("open".to_string());
            let result = if self.fail {
                Err(PublishError::AuthRejected("uploader".to_string()))
            } else {
                self.uploads.lock().unwrap().push((name.to_string(), payload));
                Ok(())
            };
            self.events.lock().unwrap().push("close".to_string());
            result
        }
    }

    #[derive(Default)]
    struct RecordingReplies {
        sent: Mutex<Vec<(Delivery, String)>>,
    }

    impl RecordingReplies {
        fn sent(&self) -> Vec<(Delivery, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Replies for RecordingReplies {
        async fn initial_response(&self, content: &str) -> Result<(), serenity::Error> {
            self.sent.lock().unwrap().push((Delivery::Initial, content.to_string()));
            Ok(())
        }

        async fn follow_up(&self, content: &str) -> Result<(), serenity::Error> {
            self.sent.lock().unwrap().push((Delivery::FollowUp, content.to_string()));
            Ok(())
        }
    }

    fn request(name: &str) -> AddGifRequest {
        AddGifRequest {
            raw_name: name.to_string(),
            source_url: SOURCE.to_string(),
            requesting_user: UserId(1234),
            reply_channel: ChannelId(5678),
        }
    }

    fn reachable_gif() -> FakeHttp {
        FakeHttp::default()
            .head_ok(SOURCE, StatusCode::OK, Some("image/gif"))
            .get_ok(SOURCE, StatusCode::OK, b"GIF89a-bytes")
    }

    async fn run(http: FakeHttp, publisher: FakePublisher, name: &str) -> (Outcome, Arc<FakeHttp>, Arc<FakePublisher>, RecordingReplies) {
        let http = Arc::new(http);
        let publisher = Arc::new(publisher);
        let workflow = AddGifWorkflow::new(http.clone(), publisher.clone(), BASE);
        let replies = RecordingReplies::default();
        let outcome = workflow.run(&request(name), &replies).await;
        (outcome, http, publisher, replies)
    }

    #[tokio::test]
    async fn test_happy_path_messages_in_order() {
        let (outcome, _http, publisher, replies) = run(reachable_gif(), FakePublisher::default(), "Wave").await;

        match outcome {
            Outcome::Published { url } => assert_eq!(url, "https://assets.ledfx.app/gifs/wave.gif"),
            other => panic!("expected publish, got {:?}", other),
        }

        assert_eq!(
            replies.sent(),
            vec![
                (Delivery::Initial, "Attempting to upload wave.gif to assets...".to_string()),
                (
                    Delivery::FollowUp,
                    "<@1234>: New GIF added: https://assets.ledfx.app/gifs/wave.gif".to_string()
                ),
            ]
        );
        assert_eq!(*publisher.events.lock().unwrap(), vec!["open", "close"]);
        assert_eq!(
            *publisher.uploads.lock().unwrap(),
            vec![("wave.gif".to_string(), b"GIF89a-bytes".to_vec())]
        );
    }

    #[tokio::test]
    async fn test_same_canonical_name_for_probe_and_write() {
        let (outcome, http, publisher, _replies) = run(reachable_gif(), FakePublisher::default(), "My Cool Gif").await;

        assert!(matches!(outcome, Outcome::Published { ref url } if url == "https://assets.ledfx.app/gifs/my_cool_gif.gif"));
        assert_eq!(http.calls()[0], "HEAD https://assets.ledfx.app/gifs/my_cool_gif.gif");
        assert_eq!(publisher.uploads.lock().unwrap()[0].0, "my_cool_gif.gif");
    }

    #[tokio::test]
    async fn test_collision_halts_before_download_and_publish() {
        let http = reachable_gif().head_ok("https://assets.ledfx.app/gifs/foo.gif", StatusCode::OK, Some("image/gif"));
        let (outcome, http, publisher, replies) = run(http, FakePublisher::default(), "foo").await;

        assert!(matches!(outcome, Outcome::Halted { after: Stage::Normalized, reason: Halt::Collision { .. } }));
        assert_eq!(http.calls(), vec!["HEAD https://assets.ledfx.app/gifs/foo.gif"]);
        assert!(publisher.events.lock().unwrap().is_empty());
        assert_eq!(
            replies.sent(),
            vec![(
                Delivery::FollowUp,
                "A file with the same name already exists: https://assets.ledfx.app/gifs/foo.gif".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn test_failed_existence_probe_continues() {
        let http = reachable_gif().head_err("https://assets.ledfx.app/gifs/wave.gif");
        let (outcome, _http, publisher, _replies) = run(http, FakePublisher::default(), "wave").await;

        assert!(matches!(outcome, Outcome::Published { .. }));
        assert_eq!(publisher.uploads.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_wrong_content_type_halts() {
        let http = FakeHttp::default()
            .head_ok(SOURCE, StatusCode::OK, Some("text/html"))
            .get_ok(SOURCE, StatusCode::OK, b"<html>");
        let (outcome, http, publisher, replies) = run(http, FakePublisher::default(), "wave").await;

        assert!(matches!(outcome, Outcome::Halted { after: Stage::ExistenceChecked, reason: Halt::NotGif { .. } }));
        assert!(!http.calls().iter().any(|call| call.starts_with("GET")));
        assert!(publisher.events.lock().unwrap().is_empty());
        assert_eq!(
            replies.sent(),
            vec![(
                Delivery::Initial,
                "Is this accessible/a GIF? Content Type: text/html, Server Response: 200".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn test_gif_header_with_error_status_halts() {
        let http = FakeHttp::default().head_ok(SOURCE, StatusCode::FORBIDDEN, Some("image/gif"));
        let (outcome, _http, _publisher, replies) = run(http, FakePublisher::default(), "wave").await;

        assert!(matches!(outcome, Outcome::Halted { reason: Halt::NotGif { .. }, .. }));
        assert!(replies.sent()[0].1.contains("Server Response: 403"));
    }

    #[tokio::test]
    async fn test_unreachable_source_halts_with_error() {
        let http = FakeHttp::default().head_err(SOURCE);
        let (outcome, http, _publisher, replies) = run(http, FakePublisher::default(), "wave").await;

        assert!(matches!(outcome, Outcome::Halted { reason: Halt::Unreachable { .. }, .. }));
        assert_eq!(http.calls().len(), 2);
        let sent = replies.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, Delivery::Initial);
        assert!(sent[0].1.starts_with("Failed to get details of the file from https://media.example/wave.gif: "));
    }

    #[tokio::test]
    async fn test_download_404_halts_without_publish() {
        let http = FakeHttp::default()
            .head_ok(SOURCE, StatusCode::OK, Some("image/gif"))
            .get_ok(SOURCE, StatusCode::NOT_FOUND, b"");
        let (outcome, _http, publisher, replies) = run(http, FakePublisher::default(), "wave").await;

        assert!(matches!(outcome, Outcome::Halted { after: Stage::ContentValidated, reason: Halt::DownloadStatus { .. } }));
        assert!(publisher.events.lock().unwrap().is_empty());
        assert_eq!(
            replies.sent()[1],
            (
                Delivery::FollowUp,
                "<@1234>: Failed to download the file from https://media.example/wave.gif: 404".to_string()
            )
        );
    }

    #[tokio::test]
    async fn test_download_transport_error_halts() {
        let http = FakeHttp::default()
            .head_ok(SOURCE, StatusCode::OK, Some("image/gif"))
            .get_err(SOURCE);
        let (outcome, _http, publisher, replies) = run(http, FakePublisher::default(), "wave").await;

        assert!(matches!(outcome, Outcome::Halted { reason: Halt::DownloadFailed { .. }, .. }));
        assert!(publisher.events.lock().unwrap().is_empty());
        assert!(replies.sent()[1].1.starts_with("<@1234>: Failed to download the file from https://media.example/wave.gif: "));
    }

    #[tokio::test]
    async fn test_publish_failure_reports_and_releases_session() {
        let publisher = FakePublisher { fail: true, ..Default::default() };
        let (outcome, _http, publisher, replies) = run(reachable_gif(), publisher, "wave").await;

        assert!(matches!(outcome, Outcome::Halted { after: Stage::Downloaded, reason: Halt::PublishFailed { .. } }));
        assert_eq!(*publisher.events.lock().unwrap(), vec!["open", "close"]);
        assert_eq!(
            replies.sent()[1],
            (
                Delivery::FollowUp,
                "<@1234>: Failed to upload the last GIF: authentication failed for user `uploader`".to_string()
            )
        );
    }

    #[test]
    fn test_halt_routing() {
        let collision = Halt::Collision { url: "u".to_string() };
        assert_eq!(collision.delivery(), Delivery::FollowUp);

        let not_gif = Halt::NotGif { content_type: None, status: StatusCode::OK };
        assert_eq!(not_gif.delivery(), Delivery::Initial);
        assert_eq!(not_gif.to_string(), "Is this accessible/a GIF? Content Type: none, Server Response: 200");
    }
}
