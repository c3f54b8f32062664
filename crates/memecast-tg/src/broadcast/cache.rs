use super::{FetchedMedia, MediaKind};
use crate::prelude::*;

/// Lives only during one batch. Remembers the media downloaded for the post
/// and the handle of the file uploaded to telegram, so that the expensive
/// fallback path is taken at most once per batch when it succeeds.
#[derive(Debug, Default)]
pub(super) struct MediaCache {
    media: Option<FetchedMedia>,
    uploaded: Option<UploadedHandle>,
}

#[derive(Debug, Clone)]
pub(super) struct UploadedHandle {
    pub(super) file_id: String,
    pub(super) caption: String,
    pub(super) kind: MediaKind,
}

impl MediaCache {
    pub(super) fn uploaded(&self) -> Option<&UploadedHandle> {
        self.uploaded.as_ref()
    }

    pub(super) fn media(&self) -> Option<&FetchedMedia> {
        self.media.as_ref()
    }

    /// Only successful downloads are remembered. A failed fetch leaves the
    /// cache empty, so the next recipient tries to fetch again.
    pub(super) fn store_media(&mut self, media: FetchedMedia) -> &FetchedMedia {
        self.media.insert(media)
    }

    /// The first uploaded handle wins, the later ones are ignored
    pub(super) fn store_uploaded(&mut self, file_id: String) {
        let Some(media) = &self.media else {
            warn!("BUG: uploaded media handle is stored without downloaded media");
            return;
        };

        self.uploaded.get_or_insert_with(|| UploadedHandle {
            file_id,
            caption: media.caption.clone(),
            kind: media.kind,
        });
    }

    /// Deletes the downloaded file if there was one
    pub(super) async fn cleanup(self) {
        let Some(media) = self.media else {
            return;
        };

        let path = media.path.display();

        match fs_err::tokio::remove_file(&media.path).await {
            Ok(()) => info!(%path, "Temporary media file removed"),
            Err(err) => warn!(%path, err = tracing_err(&err), "Failed to remove temporary media file"),
        }
    }
}
