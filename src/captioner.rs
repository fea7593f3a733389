use crate::error::CaptionError;
use crate::loader;
use crate::provider::{CaptionRequest, Provider, DESCRIBE_INSTRUCTION};
use crate::rules::RuleSet;
use crate::settings::{credential_env_var, Credential};
use crate::workflow::Workflow;
use futures_core::stream::BoxStream;
use futures_util::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

pub const MAX_IMAGES: usize = 150;

/// Inputs for one `caption_batch` call.
#[derive(Debug, Clone, Default)]
pub struct CaptionBatch {
    pub images: Vec<PathBuf>,
    pub topic_hint: Option<String>,
    pub rules_text: String,
    pub credential: Option<Credential>,

    /// Placeholder captions, one per image.
    pub initial_slots: Vec<String>,
}

/// Full caption list after one image completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Slot written by this completion.
    pub index: usize,
    pub slots: Vec<String>,
}

pub type SnapshotStream = BoxStream<'static, Result<Snapshot, CaptionError>>;

pub struct Captioner {
    provider: Arc<dyn Provider + Send + Sync>,
    model: String,
    concurrency: usize,
}

impl Captioner {
    pub fn new(provider: Arc<dyn Provider + Send + Sync>, model: impl Into<String>, concurrency: usize) -> Self {
        Self {
            provider,
            model: model.into(),
            concurrency,
        }
    }

    /// Caption every image in `batch`.
    ///
    /// Validation and image loading happen before anything is sent; their
    /// failures are returned directly. The stream then yields one snapshot
    /// per completed image, with slot `i` always holding the caption of
    /// image `i`. A provider failure is yielded as a single `Err` and ends
    /// the stream.
    pub async fn caption_batch(&self, batch: CaptionBatch) -> Result<SnapshotStream, CaptionError> {
        let CaptionBatch {
            images,
            topic_hint,
            rules_text,
            credential,
            initial_slots,
        } = batch;

        let credential = credential.ok_or(CaptionError::MissingCredential {
            env_var: credential_env_var(self.provider.name()),
        })?;
        if images.len() > MAX_IMAGES {
            return Err(CaptionError::TooManyImages {
                count: images.len(),
                max: MAX_IMAGES,
            });
        }
        if initial_slots.len() != images.len() {
            return Err(CaptionError::SlotCountMismatch {
                images: images.len(),
                slots: initial_slots.len(),
            });
        }

        let rules = RuleSet::parse(&rules_text);
        tracing::info!(
            images = images.len(),
            rules = rules.len(),
            topic_hint = ?topic_hint,
            provider = self.provider.name(),
            model = %self.model,
            "starting caption batch"
        );

        let mut workflow = Workflow::new(self.concurrency);
        for (index, path) in images.into_iter().enumerate() {
            let image = loader::load(&path).map_err(|source| CaptionError::Decode {
                path: path.clone(),
                source,
            })?;
            tracing::debug!(index, path = %path.display(), mime = image.mime_type, "loaded image");

            workflow.add_task(CaptionRequest {
                index,
                model: self.model.clone(),
                instruction: DESCRIBE_INSTRUCTION.to_string(),
                image,
                topic_hint: topic_hint.clone(),
                rules: rules.clone(),
                credential: credential.clone(),
            });
        }

        if workflow.is_empty() {
            return Ok(futures_util::stream::empty().boxed());
        }

        let (tx, rx) = mpsc::channel::<Result<Snapshot, CaptionError>>(16);
        let provider = Arc::clone(&self.provider);

        tokio::spawn(async move {
            let total = initial_slots.len();
            let mut slots = initial_slots;
            let mut filled = vec![false; total];
            let mut outputs = workflow.run(provider);

            while let Some(item) = outputs.next().await {
                let out = match item {
                    Ok(out) => out,
                    Err(e) => {
                        tracing::error!(error = %e, "caption batch failed");
                        let _ = tx.send(Err(CaptionError::Service(e))).await;
                        return;
                    }
                };

                match filled.get_mut(out.index) {
                    Some(done) if !*done => *done = true,
                    _ => {
                        let e = anyhow::anyhow!("unexpected result for slot {}", out.index);
                        let _ = tx.send(Err(CaptionError::Service(e))).await;
                        return;
                    }
                }
                let index = out.index;
                slots[index] = out.text;

                let completed = filled.iter().filter(|f| **f).count();
                tracing::info!(index, completed, total, "caption ready");

                let snapshot = Snapshot {
                    index,
                    slots: slots.clone(),
                };
                if tx.send(Ok(snapshot)).await.is_err() {
                    tracing::debug!("snapshot receiver dropped; cancelling batch");
                    return;
                }
            }
        });

        Ok(ReceiverStream::new(rx).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::tests::write_png;
    use crate::provider::stub::StubProvider;
    use crate::provider::{ChatChunk, ChunkStream};
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Captions by file stem, with a per-stem delay, failing on selected stems.
    #[derive(Default)]
    struct TestProvider {
        delays: HashMap<String, Duration>,
        fail: Vec<String>,
        calls: AtomicUsize,
    }

    impl Provider for TestProvider {
        fn name(&self) -> &'static str {
            "openai"
        }

        fn stream_chat(
            &self,
            req: CaptionRequest,
        ) -> std::pin::Pin<Box<dyn std::future::Future<Output = anyhow::Result<ChunkStream>> + Send>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let stem = req.image.path.file_stem().unwrap().to_string_lossy().into_owned();
            let delay = self.delays.get(&stem).copied();
            let fail = self.fail.contains(&stem);

            Box::pin(async move {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                if fail {
                    anyhow::bail!("model error for {stem}");
                }
                let chunks: Vec<anyhow::Result<ChatChunk>> = vec![Ok(ChatChunk {
                    text: format!("caption for {stem}"),
                })];
                anyhow::Ok(futures_util::stream::iter(chunks).boxed())
            })
        }
    }

    fn images(dir: &Path, names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(|n| write_png(dir, n)).collect()
    }

    fn batch(images: Vec<PathBuf>, rules: &str) -> CaptionBatch {
        let n = images.len();
        CaptionBatch {
            images,
            topic_hint: None,
            rules_text: rules.to_string(),
            credential: Credential::new("sk-test"),
            initial_slots: vec![String::new(); n],
        }
    }

    async fn collect_ok(stream: SnapshotStream) -> Vec<Vec<String>> {
        stream.map(|s| s.unwrap().slots).collect().await
    }

    #[tokio::test]
    async fn cat_and_dog_with_two_rules() {
        let dir = tempfile::tempdir().unwrap();
        let imgs = images(dir.path(), &["cat.png", "dog.png"]);
        let captioner = Captioner::new(Arc::new(StubProvider::new()), "gpt-4o", 1);

        let stream = captioner
            .caption_batch(batch(imgs, "Mention color\nMention pose"))
            .await
            .unwrap();
        let snapshots = collect_ok(stream).await;

        assert_eq!(snapshots.len(), 2);
        assert_eq!(
            snapshots[0],
            vec!["a photo of cat; Mention color; Mention pose".to_string(), String::new()]
        );
        assert_eq!(
            snapshots[1],
            vec![
                "a photo of cat; Mention color; Mention pose".to_string(),
                "a photo of dog; Mention color; Mention pose".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn one_snapshot_per_image_each_full_length() {
        let dir = tempfile::tempdir().unwrap();
        let names = ["a.png", "b.png", "c.png", "d.png", "e.png"];
        let imgs = images(dir.path(), &names);
        let captioner = Captioner::new(Arc::new(StubProvider::new()), "m", 3);

        let snapshots = collect_ok(captioner.caption_batch(batch(imgs, "")).await.unwrap()).await;
        assert_eq!(snapshots.len(), names.len());
        assert!(snapshots.iter().all(|s| s.len() == names.len()));
        assert_eq!(snapshots.last().unwrap()[4], "a photo of e");
    }

    #[tokio::test]
    async fn slots_follow_image_index_not_completion_order() {
        let dir = tempfile::tempdir().unwrap();
        let imgs = images(dir.path(), &["slow.png", "fast.png"]);
        let provider = TestProvider {
            delays: HashMap::from([("slow".to_string(), Duration::from_millis(150))]),
            ..Default::default()
        };
        let captioner = Captioner::new(Arc::new(provider), "m", 2);

        let mut b = batch(imgs, "");
        b.initial_slots = vec!["old slow".into(), "old fast".into()];
        let snapshots: Vec<Snapshot> = captioner
            .caption_batch(b)
            .await
            .unwrap()
            .map(|s| s.unwrap())
            .collect()
            .await;

        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].index, 1);
        assert_eq!(snapshots[0].slots, vec!["old slow".to_string(), "caption for fast".to_string()]);
        assert_eq!(snapshots[1].index, 0);
        assert_eq!(
            snapshots[1].slots,
            vec!["caption for slow".to_string(), "caption for fast".to_string()]
        );
    }

    #[tokio::test]
    async fn empty_batch_yields_nothing() {
        let captioner = Captioner::new(Arc::new(StubProvider::new()), "m", 1);
        let snapshots = collect_ok(captioner.caption_batch(batch(Vec::new(), "")).await.unwrap()).await;
        assert!(snapshots.is_empty());
    }

    #[tokio::test]
    async fn missing_credential_fails_before_decode() {
        let provider = Arc::new(TestProvider::default());
        let captioner = Captioner::new(provider.clone(), "m", 1);

        let mut b = batch(vec![PathBuf::from("/definitely/not/here.png")], "");
        b.credential = None;
        let err = captioner.caption_batch(b).await.err().unwrap();

        assert!(matches!(err, CaptionError::MissingCredential { env_var: "OPENAI_API_KEY" }));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_image_fails_before_any_request() {
        let dir = tempfile::tempdir().unwrap();
        let mut imgs = images(dir.path(), &["cat.png"]);
        imgs.push(dir.path().join("missing.png"));

        let provider = Arc::new(TestProvider::default());
        let captioner = Captioner::new(provider.clone(), "m", 1);
        let err = captioner.caption_batch(batch(imgs, "")).await.err().unwrap();

        match err {
            CaptionError::Decode { path, .. } => assert!(path.ends_with("missing.png")),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn rejects_bad_shapes() {
        let captioner = Captioner::new(Arc::new(StubProvider::new()), "m", 1);

        let mut b = batch(vec![PathBuf::from("a.png"), PathBuf::from("b.png")], "");
        b.initial_slots.pop();
        let err = captioner.caption_batch(b).await.err().unwrap();
        assert!(matches!(err, CaptionError::SlotCountMismatch { images: 2, slots: 1 }));

        let many = (0..=MAX_IMAGES).map(|i| PathBuf::from(format!("{i}.png"))).collect();
        let err = captioner.caption_batch(batch(many, "")).await.err().unwrap();
        assert!(matches!(err, CaptionError::TooManyImages { count: 151, max: 150 }));
    }

    #[tokio::test]
    async fn accepts_exactly_max_images() {
        let dir = tempfile::tempdir().unwrap();
        let names: Vec<String> = (0..MAX_IMAGES).map(|i| format!("img{i}.png")).collect();
        let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let imgs = images(dir.path(), &name_refs);
        let captioner = Captioner::new(Arc::new(StubProvider::new()), "m", 64);

        let snapshots: Vec<Snapshot> = captioner
            .caption_batch(batch(imgs, ""))
            .await
            .unwrap()
            .map(|s| s.unwrap())
            .collect()
            .await;

        assert_eq!(snapshots.len(), MAX_IMAGES);
        assert!(snapshots.iter().all(|s| s.slots.len() == MAX_IMAGES));

        let mut written: Vec<usize> = snapshots.iter().map(|s| s.index).collect();
        written.sort_unstable();
        assert_eq!(written, (0..MAX_IMAGES).collect::<Vec<_>>());

        let last = &snapshots.last().unwrap().slots;
        for (i, caption) in last.iter().enumerate() {
            assert_eq!(caption, &format!("a photo of img{i}"));
        }
    }

    #[tokio::test]
    async fn provider_failure_ends_stream_after_partial_results() {
        let dir = tempfile::tempdir().unwrap();
        let imgs = images(dir.path(), &["one.png", "two.png", "three.png"]);
        let provider = TestProvider {
            fail: vec!["two".to_string()],
            ..Default::default()
        };
        let captioner = Captioner::new(Arc::new(provider), "m", 1);

        let items: Vec<_> = captioner.caption_batch(batch(imgs, "")).await.unwrap().collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(
            items[0].as_ref().unwrap().slots,
            vec!["caption for one".to_string(), String::new(), String::new()]
        );
        match &items[1] {
            Err(CaptionError::Service(e)) => assert_eq!(e.to_string(), "model error for two"),
            other => panic!("unexpected item: {other:?}"),
        }
    }
}
