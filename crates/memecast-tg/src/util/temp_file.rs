use crate::error::{err_ctx, IoError};
use crate::Result;
use easy_ext::ext;
use std::path::PathBuf;
use tempfile::NamedTempFile;

/// Creates a named file in `dir` (creating the directory if needed). The file
/// is removed automatically only while it is owned by the returned handle.
pub(crate) async fn create_temp_file_in(dir: PathBuf, suffix: &'static str) -> Result<NamedTempFile> {
    super::tokio::spawn_blocking(move || {
        fs_err::create_dir_all(&dir)?;

        tempfile::Builder::new()
            .prefix("media-")
            .suffix(suffix)
            .tempfile_in(&dir)
            .map_err(err_ctx!(IoError::CreateTempFile {
                dir: dir.display().to_string()
            }))
    })
    .await
}

#[ext(NamedTempFileExt)]
pub(crate) impl NamedTempFile {
    fn into_tokio(self) -> (tokio::fs::File, tempfile::TempPath) {
        let (file, path) = self.into_parts();
        (tokio::fs::File::from_std(file), path)
    }
}
