use super::*;
use crate::error::fatal;
use assert_matches::assert_matches;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use teloxide::types::InlineKeyboardMarkup;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Copy(u64),
    Photo { to: u64, source: Source, caption: String },
    Video { to: u64, source: Source, caption: String },
    Link(u64),
    Text(u64, String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Source {
    Local(PathBuf),
    Cached(String),
}

impl From<MediaSource<'_>> for Source {
    fn from(source: MediaSource<'_>) -> Self {
        match source {
            MediaSource::Local(path) => Self::Local(path.to_owned()),
            MediaSource::Cached(file_id) => Self::Cached(file_id.to_owned()),
        }
    }
}

#[derive(Default)]
struct FakeStore {
    posts: Mutex<Vec<Post>>,
    /// Recipient id to its `active` flag
    recipients: Mutex<BTreeMap<u64, bool>>,
    set_active_calls: Mutex<Vec<(u64, bool)>>,
}

impl FakeStore {
    fn with(posts: &[Post], recipients: &[u64]) -> Self {
        Self {
            posts: Mutex::new(posts.to_vec()),
            recipients: Mutex::new(recipients.iter().map(|&id| (id, true)).collect()),
            ..Default::default()
        }
    }

    fn is_active(&self, id: u64) -> bool {
        self.recipients.lock()[&id]
    }
}

#[async_trait]
impl PostStore for FakeStore {
    async fn get_random_post(&self) -> Result<Option<Post>> {
        Ok(self.posts.lock().first().cloned())
    }

    async fn get_active_recipients(&self) -> Result<Vec<UserId>> {
        Ok(self
            .recipients
            .lock()
            .iter()
            .filter(|(_, &active)| active)
            .map(|(&id, _)| UserId(id))
            .collect())
    }

    async fn is_privileged(&self, _id: UserId) -> Result<bool> {
        Ok(false)
    }

    async fn get_privileged_ids(&self) -> Result<Vec<UserId>> {
        Ok(vec![])
    }

    async fn set_active(&self, id: UserId, active: bool) -> Result {
        self.set_active_calls.lock().push((id.0, active));
        self.recipients.lock().insert(id.0, active);
        Ok(())
    }

    async fn delete_post(&self, post: &Post) -> Result<bool> {
        let mut posts = self.posts.lock();
        let len = posts.len();
        posts.retain(|existing| existing != post);
        Ok(posts.len() != len)
    }
}

enum FetchBehavior {
    Download { kind: MediaKind, caption: &'static str },
    NoMedia,
    Fail,
}

struct FakeFetcher {
    dir: tempfile::TempDir,
    behavior: FetchBehavior,
    calls: AtomicUsize,
    downloaded: Mutex<Vec<PathBuf>>,
}

impl FakeFetcher {
    fn new(behavior: FetchBehavior) -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
            behavior,
            calls: AtomicUsize::new(0),
            downloaded: Default::default(),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn downloaded(&self) -> Vec<PathBuf> {
        self.downloaded.lock().clone()
    }
}

#[async_trait]
impl MediaFetcher for FakeFetcher {
    async fn fetch(&self, post: &Post) -> Result<Option<FetchedMedia>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);

        let (kind, caption) = match self.behavior {
            FetchBehavior::Download { kind, caption } => (kind, caption),
            FetchBehavior::NoMedia => return Ok(None),
            FetchBehavior::Fail => return Err(fatal!("Network is down")),
        };

        let path = self
            .dir
            .path()
            .join(format!("{}-{}-{call}.bin", post.channel, post.message_id.0));

        fs_err::write(&path, b"media").unwrap();

        self.downloaded.lock().push(path.clone());

        Ok(Some(FetchedMedia {
            path,
            caption: caption.to_owned(),
            kind,
        }))
    }
}

#[derive(Default)]
struct FakeMessenger {
    copy_fails_for: HashSet<u64>,
    copy_fails_for_all: bool,
    upload_fails_for: HashSet<u64>,
    link_fails_for: HashSet<u64>,
    uploads: AtomicUsize,
    calls: Mutex<Vec<Call>>,
}

impl FakeMessenger {
    fn copy_fails_for_all() -> Self {
        Self {
            copy_fails_for_all: true,
            ..Default::default()
        }
    }

    fn copy_fails_for(ids: &[u64]) -> Self {
        Self {
            copy_fails_for: ids.iter().copied().collect(),
            ..Default::default()
        }
    }

    fn upload_fails_for(mut self, ids: &[u64]) -> Self {
        self.upload_fails_for = ids.iter().copied().collect();
        self
    }

    fn link_fails_for(mut self, ids: &[u64]) -> Self {
        self.link_fails_for = ids.iter().copied().collect();
        self
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    fn upload(&self, call: Call, to: UserId) -> Result<UploadedMedia> {
        self.calls.lock().push(call);

        if self.upload_fails_for.contains(&to.0) {
            return Err(fatal!("Forbidden: bot was blocked by the user"));
        }

        let file_id = format!("H{}", self.uploads.fetch_add(1, Ordering::SeqCst) + 1);

        Ok(UploadedMedia { file_id })
    }
}

#[async_trait]
impl Messenger for FakeMessenger {
    async fn copy(&self, to: UserId, _post: &Post) -> Result {
        self.calls.lock().push(Call::Copy(to.0));

        if self.copy_fails_for_all || self.copy_fails_for.contains(&to.0) {
            return Err(fatal!("Bad Request: message can't be copied"));
        }
        Ok(())
    }

    async fn send_photo(
        &self,
        to: UserId,
        source: MediaSource<'_>,
        caption: &str,
    ) -> Result<UploadedMedia> {
        let call = Call::Photo {
            to: to.0,
            source: source.into(),
            caption: caption.to_owned(),
        };
        self.upload(call, to)
    }

    async fn send_video(
        &self,
        to: UserId,
        source: MediaSource<'_>,
        caption: &str,
    ) -> Result<UploadedMedia> {
        let call = Call::Video {
            to: to.0,
            source: source.into(),
            caption: caption.to_owned(),
        };
        self.upload(call, to)
    }

    async fn send_text_with_markup(
        &self,
        to: UserId,
        _text: String,
        _markup: InlineKeyboardMarkup,
    ) -> Result {
        self.calls.lock().push(Call::Link(to.0));

        if self.link_fails_for.contains(&to.0) {
            return Err(fatal!("Forbidden: user is deactivated"));
        }
        Ok(())
    }

    async fn send_text(&self, to: UserId, text: String) -> Result {
        self.calls.lock().push(Call::Text(to.0, text));
        Ok(())
    }
}

struct Harness {
    store: Arc<FakeStore>,
    fetcher: Arc<FakeFetcher>,
    messenger: Arc<FakeMessenger>,
    broadcaster: Broadcaster,
}

impl Harness {
    fn new(store: FakeStore, fetcher: FakeFetcher, messenger: FakeMessenger) -> Self {
        let store = Arc::new(store);
        let fetcher = Arc::new(fetcher);
        let messenger = Arc::new(messenger);

        let broadcaster = Broadcaster::new(
            store.clone(),
            fetcher.clone(),
            messenger.clone(),
            Config { delay_ms: 0 },
        );

        Self {
            store,
            fetcher,
            messenger,
            broadcaster,
        }
    }

    async fn broadcast_random(&self) -> BatchOutcome {
        self.broadcaster
            .broadcast(PostSelector::Random, Audience::Subscribers)
            .await
            .unwrap()
    }
}

fn memes_post() -> Post {
    Post::new("memes", 42)
}

fn photo_fetcher() -> FakeFetcher {
    FakeFetcher::new(FetchBehavior::Download {
        kind: MediaKind::Photo,
        caption: "cap",
    })
}

fn completed(outcome: BatchOutcome) -> BatchReport {
    assert_matches!(outcome, BatchOutcome::Completed(report) => report)
}

#[test_log::test(tokio::test)]
async fn fallback_fetches_once_and_reuses_uploaded_handle() {
    let harness = Harness::new(
        FakeStore::with(&[memes_post()], &[1, 2, 3]),
        photo_fetcher(),
        FakeMessenger::copy_fails_for_all(),
    );

    let report = completed(harness.broadcast_random().await);

    assert_eq!(
        report,
        BatchReport {
            attempted: 3,
            delivered: 3,
            skipped: 0,
            deactivated: 0,
        }
    );

    assert_eq!(harness.fetcher.calls(), 1);

    let downloaded = harness.fetcher.downloaded();
    assert_eq!(downloaded.len(), 1);
    let file = downloaded[0].clone();

    let cached = |to| Call::Photo {
        to,
        source: Source::Cached("H1".to_owned()),
        caption: "cap".to_owned(),
    };

    assert_eq!(
        harness.messenger.calls(),
        [
            Call::Copy(1),
            Call::Photo {
                to: 1,
                source: Source::Local(file.clone()),
                caption: "cap".to_owned(),
            },
            Call::Link(1),
            Call::Copy(2),
            cached(2),
            Call::Link(2),
            Call::Copy(3),
            cached(3),
            Call::Link(3),
        ]
    );

    assert!(!file.exists(), "temporary file must be removed: {file:?}");
    assert!(harness.store.set_active_calls.lock().is_empty());
}

#[test_log::test(tokio::test)]
async fn empty_store_notifies_the_requester() {
    let harness = Harness::new(
        FakeStore::default(),
        photo_fetcher(),
        FakeMessenger::default(),
    );

    let outcome = harness
        .broadcaster
        .broadcast(PostSelector::Random, Audience::Single(UserId(99)))
        .await
        .unwrap();

    assert_eq!(outcome, BatchOutcome::NoContent);
    assert_eq!(
        harness.messenger.calls(),
        [Call::Text(99, NO_CONTENT_NOTICE.to_owned())]
    );
    assert!(harness.store.set_active_calls.lock().is_empty());
    assert!(harness.store.posts.lock().is_empty());
    assert_eq!(harness.fetcher.calls(), 0);
}

#[test_log::test(tokio::test)]
async fn empty_store_is_silent_for_scheduled_broadcasts() {
    let harness = Harness::new(
        FakeStore::with(&[], &[1, 2]),
        photo_fetcher(),
        FakeMessenger::default(),
    );

    assert_eq!(harness.broadcast_random().await, BatchOutcome::NoContent);
    assert!(harness.messenger.calls().is_empty());
}

#[test_log::test(tokio::test)]
async fn picking_from_empty_store_yields_nothing() {
    let harness = Harness::new(
        FakeStore::default(),
        photo_fetcher(),
        FakeMessenger::default(),
    );

    for _ in 0..3 {
        assert_eq!(harness.broadcaster.pick_random_post().await.unwrap(), None);
    }
}

#[test_log::test(tokio::test)]
async fn no_active_recipients() {
    let harness = Harness::new(
        FakeStore::with(&[memes_post()], &[]),
        photo_fetcher(),
        FakeMessenger::default(),
    );

    assert_eq!(harness.broadcast_random().await, BatchOutcome::NoRecipients);
    assert!(harness.messenger.calls().is_empty());
}

#[test_log::test(tokio::test)]
async fn unreachable_recipient_is_deactivated_without_affecting_others() {
    let harness = Harness::new(
        FakeStore::with(&[memes_post()], &[1, 2]),
        photo_fetcher(),
        FakeMessenger::copy_fails_for(&[1]).upload_fails_for(&[1]),
    );

    let report = completed(harness.broadcast_random().await);

    assert_eq!(report.delivered, 1);
    assert_eq!(report.deactivated, 1);

    assert!(!harness.store.is_active(1));
    assert!(harness.store.is_active(2));
    assert_eq!(*harness.store.set_active_calls.lock(), [(1, false)]);

    assert_eq!(
        harness.messenger.calls()[2..],
        [Call::Copy(2), Call::Link(2)]
    );

    for file in harness.fetcher.downloaded() {
        assert!(!file.exists(), "temporary file must be removed: {file:?}");
    }

    // The deactivated recipient is not a part of the next batches
    let report = completed(harness.broadcast_random().await);
    assert_eq!(report.attempted, 1);
}

#[test_log::test(tokio::test)]
async fn unavailable_media_skips_recipients_without_deactivation() {
    for behavior in [FetchBehavior::NoMedia, FetchBehavior::Fail] {
        let harness = Harness::new(
            FakeStore::with(&[memes_post()], &[1, 2]),
            FakeFetcher::new(behavior),
            FakeMessenger::copy_fails_for_all(),
        );

        let report = completed(harness.broadcast_random().await);

        assert_eq!(
            report,
            BatchReport {
                attempted: 2,
                delivered: 0,
                skipped: 2,
                deactivated: 0,
            }
        );

        // A failed fetch is not cached, every recipient retries it
        assert_eq!(harness.fetcher.calls(), 2);
        assert!(harness.store.is_active(1));
        assert!(harness.store.is_active(2));
        assert!(harness.store.set_active_calls.lock().is_empty());
        assert_eq!(harness.messenger.calls(), [Call::Copy(1), Call::Copy(2)]);
    }
}

#[test_log::test(tokio::test)]
async fn failed_upload_does_not_poison_the_cache() {
    let harness = Harness::new(
        FakeStore::with(&[memes_post()], &[1, 2, 3]),
        FakeFetcher::new(FetchBehavior::Download {
            kind: MediaKind::Video,
            caption: "",
        }),
        FakeMessenger::copy_fails_for_all().upload_fails_for(&[1]),
    );

    let report = completed(harness.broadcast_random().await);

    assert_eq!(report.delivered, 2);
    assert_eq!(report.deactivated, 1);

    // The downloaded file is kept for the next recipient
    assert_eq!(harness.fetcher.calls(), 1);
    let file = harness.fetcher.downloaded()[0].clone();

    let video = |to, source| Call::Video {
        to,
        source,
        caption: String::new(),
    };

    assert_eq!(
        harness.messenger.calls(),
        [
            Call::Copy(1),
            video(1, Source::Local(file.clone())),
            Call::Copy(2),
            video(2, Source::Local(file.clone())),
            Call::Link(2),
            Call::Copy(3),
            video(3, Source::Cached("H1".to_owned())),
            Call::Link(3),
        ]
    );

    assert!(!file.exists(), "temporary file must be removed: {file:?}");
}

#[test_log::test(tokio::test)]
async fn copy_is_attempted_for_every_recipient() {
    let harness = Harness::new(
        FakeStore::with(&[memes_post()], &[1, 2, 3]),
        photo_fetcher(),
        FakeMessenger::copy_fails_for(&[1]),
    );

    let report = completed(harness.broadcast_random().await);
    assert_eq!(report.delivered, 3);

    let calls = harness.messenger.calls();
    assert_eq!(
        calls[3..],
        [Call::Copy(2), Call::Link(2), Call::Copy(3), Call::Link(3)]
    );
    assert_eq!(harness.fetcher.calls(), 1);
}

#[test_log::test(tokio::test)]
async fn failed_source_link_counts_as_failed_delivery() {
    let harness = Harness::new(
        FakeStore::with(&[memes_post()], &[1, 2]),
        photo_fetcher(),
        FakeMessenger::default().link_fails_for(&[2]),
    );

    let report = completed(harness.broadcast_random().await);

    assert_eq!(report.delivered, 1);
    assert_eq!(report.deactivated, 1);
    assert!(report.delivered <= report.attempted);
    assert!(harness.store.is_active(1));
    assert!(!harness.store.is_active(2));
}

#[test_log::test(tokio::test)]
async fn targeted_delivery_ignores_subscription_state() {
    let store = FakeStore::with(&[memes_post()], &[]);
    store.recipients.lock().insert(7, false);

    let harness = Harness::new(store, photo_fetcher(), FakeMessenger::default());

    let outcome = harness
        .broadcaster
        .broadcast(
            PostSelector::Explicit(Post::new("cats", 1)),
            Audience::Single(UserId(7)),
        )
        .await
        .unwrap();

    assert_eq!(completed(outcome).delivered, 1);
    assert_eq!(harness.messenger.calls(), [Call::Copy(7), Call::Link(7)]);
}

#[test_log::test(tokio::test)]
async fn overlapping_subscriber_batches_are_skipped() {
    let harness = Harness::new(
        FakeStore::with(&[memes_post()], &[1]),
        photo_fetcher(),
        FakeMessenger::default(),
    );

    let guard = harness.broadcaster.subscribers_batch.lock().await;

    assert_eq!(harness.broadcast_random().await, BatchOutcome::AlreadyRunning);

    // Targeted deliveries are not blocked by the running batch
    let outcome = harness
        .broadcaster
        .broadcast(PostSelector::Random, Audience::Single(UserId(1)))
        .await
        .unwrap();
    assert_eq!(completed(outcome).delivered, 1);

    drop(guard);

    assert_eq!(completed(harness.broadcast_random().await).delivered, 1);
}
