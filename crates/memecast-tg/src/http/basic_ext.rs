use super::HttpClientError;
use crate::prelude::*;
use crate::util::display::human_size;
use crate::error::{err, err_ctx};
use crate::Result;
use async_trait::async_trait;
use easy_ext::ext;
use futures::prelude::*;
use reqwest::Response;
use reqwest_middleware::RequestBuilder;
use tokio::io::AsyncWriteExt;

#[ext(RequestBuilderBasicExt)]
#[async_trait]
pub(crate) impl RequestBuilder {
    /// Better version of [`RequestBuilder::send`] that returns an error
    /// if the error response status code is returned.
    async fn try_send(self) -> Result<Response> {
        let response = self
            .send()
            .await
            .map_err(err_ctx!(HttpClientError::Request))?;

        let status = response.status();

        if !status.is_client_error() && !status.is_server_error() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_else(|err| {
            format!(
                "Could not collect the error response body text: {}",
                err.display_chain()
            )
        });

        Err(err!(HttpClientError::BadResponseStatusCode { status, body }))
    }

    async fn read_text(self) -> Result<String> {
        self.try_send()
            .await?
            .text()
            .await
            .map_err(err_ctx!(HttpClientError::ReadPayload))
    }
}

#[ext(ResponseBasicExt)]
#[async_trait]
pub(crate) impl Response {
    /// Streams the response body into the file. Returns the number of bytes written.
    async fn read_to_file_handle(self, file_handle: &mut tokio::fs::File) -> Result<u64> {
        let mut stream = self.bytes_stream();

        let mut file_handle = tokio::io::BufWriter::with_capacity(
            1024 * 1024, // 1 MB
            file_handle,
        );

        let mut written = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(err_ctx!(HttpClientError::ReadPayload))?;
            file_handle
                .write_all(&chunk)
                .await
                .fatal_ctx(|| "Failed to write HTTP stream chunk to file")?;
            written += chunk.len() as u64;
        }

        file_handle
            .flush()
            .await
            .fatal_ctx(|| "Failed to flush file created for HTTP stream")?;

        debug!(size = human_size(written), "Downloaded HTTP stream to file");

        Ok(written)
    }
}
