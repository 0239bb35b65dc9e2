//! Incremental publishing of generated projection text.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use weft_mapping::ProjectionKind;

use crate::diff::{compute_edits, TextEdit};
use crate::error::PublishResult;

/// Outbound notification payload.
#[derive(Debug, Clone)]
pub struct TextUpdate {
    pub path: PathBuf,
    pub kind: ProjectionKind,
    pub edits: Vec<TextEdit>,
    pub version: i32,
    pub timestamp_millis: i64,
}

/// Destination for publish notifications. Awaited for backpressure,
/// otherwise fire-and-forget.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn publish_text_update(&self, update: TextUpdate) -> PublishResult<()>;
}

/// Channel implementation backed by an unbounded tokio queue. The
/// receiving half is handed to whatever transport forwards updates to
/// the client; dropping it turns further publishes into channel errors.
pub struct ChannelNotifier {
    tx: tokio::sync::mpsc::UnboundedSender<TextUpdate>,
}

impl ChannelNotifier {
    pub fn new() -> (Arc<Self>, tokio::sync::mpsc::UnboundedReceiver<TextUpdate>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

#[async_trait]
impl NotificationChannel for ChannelNotifier {
    async fn publish_text_update(&self, update: TextUpdate) -> PublishResult<()> {
        self.tx
            .send(update)
            .map_err(|_| crate::error::PublishError::Channel("update receiver dropped".into()))
    }
}

/// What a publish call decided to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// A notification with at least one edit was sent.
    Published { edit_count: usize },
    /// Text was unchanged; a zero-edit notification carried the new
    /// version so the client's counter stays in sync.
    VersionOnly,
    /// Text and version both unchanged; nothing was sent.
    Unchanged,
}

struct PublishedText {
    text: Arc<str>,
    version: i32,
}

/// Publishes generated projection text incrementally.
///
/// The last-published table is keyed by document path alone, so a
/// document moving between projects does not trigger a full republish
/// when its content is unchanged. Open/close transitions are
/// publish-neutral: closing keeps the record, and the next publish
/// still diffs against the pre-close text.
pub struct GeneratedTextPublisher {
    channel: Arc<dyn NotificationChannel>,
    published: Mutex<HashMap<PathBuf, HashMap<ProjectionKind, PublishedText>>>,
}

impl GeneratedTextPublisher {
    pub fn new(channel: Arc<dyn NotificationChannel>) -> Arc<Self> {
        Arc::new(Self {
            channel,
            published: Mutex::new(HashMap::new()),
        })
    }

    /// Publish a freshly generated projection text for `path`.
    pub async fn publish(
        &self,
        path: &Path,
        kind: ProjectionKind,
        new_text: Arc<str>,
        version: i32,
    ) -> PublishResult<PublishOutcome> {
        let edits = {
            let published = self.published.lock().expect("publish table lock poisoned");
            let prior = published.get(path).and_then(|by_kind| by_kind.get(&kind));

            match prior {
                None => {
                    // Never published: one edit covering the full text.
                    vec![TextEdit::new(
                        weft_common::TextSpan::new(0, 0),
                        new_text.to_string(),
                    )]
                }
                Some(prior) => {
                    let edits = compute_edits(&prior.text, &new_text);
                    if edits.is_empty() && prior.version == version {
                        tracing::debug!(
                            path = %path.display(),
                            ?kind,
                            version,
                            "publish skipped, text and version unchanged"
                        );
                        return Ok(PublishOutcome::Unchanged);
                    }
                    edits
                }
            }
        };

        let edit_count = edits.len();
        tracing::debug!(
            path = %path.display(),
            ?kind,
            version,
            edit_count,
            "publishing text update"
        );

        self.channel
            .publish_text_update(TextUpdate {
                path: path.to_path_buf(),
                kind,
                edits,
                version,
                timestamp_millis: chrono::Utc::now().timestamp_millis(),
            })
            .await?;

        // Only a delivered notification advances the diff base; a failed
        // send leaves it at the last text the client actually received.
        self.published
            .lock()
            .expect("publish table lock poisoned")
            .entry(path.to_path_buf())
            .or_default()
            .insert(
                kind,
                PublishedText {
                    text: new_text.clone(),
                    version,
                },
            );

        Ok(if edit_count == 0 {
            PublishOutcome::VersionOnly
        } else {
            PublishOutcome::Published { edit_count }
        })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tokio::sync::Mutex as AsyncMutex;

    use super::*;
    use crate::diff::apply_edits;
    use crate::error::PublishError;

    /// Records updates and replays edits onto a client-side shadow copy.
    pub(crate) struct ChannelFake {
        pub updates: AsyncMutex<Vec<TextUpdate>>,
        pub shadow: Mutex<HashMap<(PathBuf, ProjectionKind), String>>,
    }

    impl ChannelFake {
        pub(crate) fn new() -> Arc<Self> {
            Arc::new(Self {
                updates: AsyncMutex::new(Vec::new()),
                shadow: Mutex::new(HashMap::new()),
            })
        }
    }

    #[async_trait]
    impl NotificationChannel for ChannelFake {
        async fn publish_text_update(&self, update: TextUpdate) -> PublishResult<()> {
            {
                let mut shadow = self.shadow.lock().unwrap();
                let entry = shadow
                    .entry((update.path.clone(), update.kind))
                    .or_default();
                *entry = apply_edits(entry, &update.edits);
            }
            self.updates.lock().await.push(update);
            Ok(())
        }
    }

    fn path() -> PathBuf {
        PathBuf::from("/ws/app.weft")
    }

    #[tokio::test]
    async fn test_first_publish_is_replace_all() {
        let channel = ChannelFake::new();
        let publisher = GeneratedTextPublisher::new(channel.clone());

        let outcome = publisher
            .publish(&path(), ProjectionKind::Script, "let a = 1;".into(), 1)
            .await
            .unwrap();
        assert_eq!(outcome, PublishOutcome::Published { edit_count: 1 });

        let updates = channel.updates.lock().await;
        assert_eq!(updates[0].edits[0].new_text, "let a = 1;");
        assert_eq!(updates[0].edits[0].span.len, 0);
    }

    #[tokio::test]
    async fn test_second_publish_sends_only_the_delta() {
        let channel = ChannelFake::new();
        let publisher = GeneratedTextPublisher::new(channel.clone());

        publisher
            .publish(
                &path(),
                ProjectionKind::Script,
                "public void Method(){}".into(),
                1,
            )
            .await
            .unwrap();
        publisher
            .publish(
                &path(),
                ProjectionKind::Script,
                "public void Method(){ // comment }".into(),
                2,
            )
            .await
            .unwrap();

        let updates = channel.updates.lock().await;
        assert_eq!(updates[1].edits.len(), 1);
        assert_eq!(updates[1].edits[0].new_text, " // comment ");

        let shadow = channel.shadow.lock().unwrap();
        assert_eq!(
            shadow[&(path(), ProjectionKind::Script)],
            "public void Method(){ // comment }"
        );
    }

    #[tokio::test]
    async fn test_same_text_new_version_sends_zero_edits() {
        let channel = ChannelFake::new();
        let publisher = GeneratedTextPublisher::new(channel.clone());

        publisher
            .publish(&path(), ProjectionKind::Markup, "<div/>".into(), 1)
            .await
            .unwrap();
        let outcome = publisher
            .publish(&path(), ProjectionKind::Markup, "<div/>".into(), 2)
            .await
            .unwrap();
        assert_eq!(outcome, PublishOutcome::VersionOnly);

        let updates = channel.updates.lock().await;
        assert!(updates[1].edits.is_empty());
        assert_eq!(updates[1].version, 2);
    }

    #[tokio::test]
    async fn test_same_text_same_version_is_a_noop() {
        let channel = ChannelFake::new();
        let publisher = GeneratedTextPublisher::new(channel.clone());

        publisher
            .publish(&path(), ProjectionKind::Markup, "<div/>".into(), 1)
            .await
            .unwrap();
        let outcome = publisher
            .publish(&path(), ProjectionKind::Markup, "<div/>".into(), 1)
            .await
            .unwrap();
        assert_eq!(outcome, PublishOutcome::Unchanged);
        assert_eq!(channel.updates.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_projection_kinds_are_tracked_independently() {
        let channel = ChannelFake::new();
        let publisher = GeneratedTextPublisher::new(channel.clone());

        publisher
            .publish(&path(), ProjectionKind::Script, "s".into(), 1)
            .await
            .unwrap();
        let outcome = publisher
            .publish(&path(), ProjectionKind::Markup, "m".into(), 1)
            .await
            .unwrap();
        // Markup had never been published, so this is a replace-all.
        assert_eq!(outcome, PublishOutcome::Published { edit_count: 1 });
    }

    #[tokio::test]
    async fn test_channel_notifier_streams_updates() {
        let (channel, mut rx) = ChannelNotifier::new();
        let publisher = GeneratedTextPublisher::new(channel);

        publisher
            .publish(&path(), ProjectionKind::Script, "one".into(), 1)
            .await
            .unwrap();
        publisher
            .publish(&path(), ProjectionKind::Script, "two".into(), 2)
            .await
            .unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.version, 1);
        let second = rx.recv().await.unwrap();
        assert_eq!(second.version, 2);
    }

    #[tokio::test]
    async fn test_channel_notifier_dropped_receiver_is_an_error() {
        let (channel, rx) = ChannelNotifier::new();
        let publisher = GeneratedTextPublisher::new(channel);
        drop(rx);

        let result = publisher
            .publish(&path(), ProjectionKind::Script, "one".into(), 1)
            .await;
        assert!(matches!(result, Err(PublishError::Channel(_))));
    }

    /// Fails the next `failures` sends, then delegates to an inner fake.
    struct FlakyChannel {
        inner: Arc<ChannelFake>,
        failures: Mutex<u32>,
    }

    #[async_trait]
    impl NotificationChannel for FlakyChannel {
        async fn publish_text_update(&self, update: TextUpdate) -> PublishResult<()> {
            {
                let mut failures = self.failures.lock().unwrap();
                if *failures > 0 {
                    *failures -= 1;
                    return Err(PublishError::Channel("transport hiccup".into()));
                }
            }
            self.inner.publish_text_update(update).await
        }
    }

    #[tokio::test]
    async fn test_failed_send_does_not_advance_the_diff_base() {
        let inner = ChannelFake::new();
        let channel = Arc::new(FlakyChannel {
            inner: inner.clone(),
            failures: Mutex::new(0),
        });
        let publisher = GeneratedTextPublisher::new(channel.clone());

        publisher
            .publish(&path(), ProjectionKind::Script, "one".into(), 1)
            .await
            .unwrap();

        *channel.failures.lock().unwrap() = 1;
        let result = publisher
            .publish(&path(), ProjectionKind::Script, "two".into(), 2)
            .await;
        assert!(matches!(result, Err(PublishError::Channel(_))));

        // The retry diffs against "one", the last text the client saw,
        // so the shadow converges instead of splicing a stale delta.
        publisher
            .publish(&path(), ProjectionKind::Script, "three".into(), 3)
            .await
            .unwrap();

        let shadow = inner.shadow.lock().unwrap();
        assert_eq!(shadow[&(path(), ProjectionKind::Script)], "three");
    }

    #[tokio::test]
    async fn test_failed_first_publish_retries_as_replace_all() {
        let inner = ChannelFake::new();
        let channel = Arc::new(FlakyChannel {
            inner: inner.clone(),
            failures: Mutex::new(1),
        });
        let publisher = GeneratedTextPublisher::new(channel.clone());

        let result = publisher
            .publish(&path(), ProjectionKind::Script, "first".into(), 1)
            .await;
        assert!(result.is_err());

        let outcome = publisher
            .publish(&path(), ProjectionKind::Script, "first".into(), 1)
            .await
            .unwrap();
        assert_eq!(outcome, PublishOutcome::Published { edit_count: 1 });

        let shadow = inner.shadow.lock().unwrap();
        assert_eq!(shadow[&(path(), ProjectionKind::Script)], "first");
    }

    #[tokio::test]
    async fn test_publish_idempotence_property() {
        let channel = ChannelFake::new();
        let publisher = GeneratedTextPublisher::new(channel.clone());

        let first = publisher
            .publish(&path(), ProjectionKind::Script, "text".into(), 3)
            .await
            .unwrap();
        let second = publisher
            .publish(&path(), ProjectionKind::Script, "text".into(), 3)
            .await
            .unwrap();

        assert!(matches!(first, PublishOutcome::Published { .. }));
        assert_eq!(second, PublishOutcome::Unchanged);
        assert_eq!(channel.updates.lock().await.len(), 1);
    }
}
