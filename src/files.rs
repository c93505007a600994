//! File transfer helpers on top of the request executor.
//!
//! These are thin consumers of the executor's credential plumbing: they
//! borrow an authenticated request builder, put a multipart, octet-stream,
//! or streamed body on it, and let the executor's dispatch do status
//! handling. Chunked uploads retry per chunk, not per file.

use std::path::Path;
use std::time::Duration;

use reqwest::Method;
use reqwest::header::{CONTENT_RANGE, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::RequestError;
use crate::executor::RequestExecutor;
use crate::retry::{RetryPolicy, retry};

/// Default upload chunk size: 1 MiB.
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

const OCTET_STREAM: &str = "application/octet-stream";
const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

fn io_error(error: &std::io::Error) -> RequestError {
    RequestError::Io(error.to_string())
}

/// POST `body` to `url` and stream the response to `path`.
pub(crate) async fn download_file(
    executor: &RequestExecutor,
    url: &str,
    path: &Path,
    body: Option<String>,
    timeout: Duration,
) -> Result<(), RequestError> {
    let mut request = executor
        .authenticated_builder(Method::POST, url)
        .await?
        .timeout(timeout);
    if let Some(data) = body {
        request = request.header(CONTENT_TYPE, JSON_CONTENT_TYPE).body(data);
    }

    let mut response = executor.dispatch(request).await?;
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|error| io_error(&error))?;
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|error| RequestError::Transport(error.to_string()))?
    {
        file.write_all(&chunk)
            .await
            .map_err(|error| io_error(&error))?;
    }
    file.flush().await.map_err(|error| io_error(&error))?;
    Ok(())
}

/// Upload a whole file as a `multipart/form-data` part named `files`.
pub(crate) async fn upload_file(
    executor: &RequestExecutor,
    url: &str,
    path: &Path,
    timeout: Duration,
) -> Result<String, RequestError> {
    let data = tokio::fs::read(path)
        .await
        .map_err(|error| io_error(&error))?;
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("file")
        .to_owned();

    let part = Part::bytes(data)
        .file_name(file_name)
        .mime_str(OCTET_STREAM)
        .map_err(|error| RequestError::Transport(error.to_string()))?;
    let form = Form::new().part("files", part);

    let request = executor
        .authenticated_builder(Method::POST, url)
        .await?
        .timeout(timeout)
        .multipart(form);
    let response = executor.dispatch(request).await?;
    response
        .text()
        .await
        .map_err(|error| RequestError::Transport(error.to_string()))
}

/// Upload a file in sequential `Content-Range` chunks. Returns the response
/// body of the last chunk, which is what the server answers the completed
/// upload with.
pub(crate) async fn upload_file_by_chunks(
    executor: &RequestExecutor,
    url: &str,
    path: &Path,
    chunk_size: usize,
    timeout: Duration,
    policy: &RetryPolicy,
) -> Result<String, RequestError> {
    let chunk_size = chunk_size.max(1);
    let total = tokio::fs::metadata(path)
        .await
        .map_err(|error| io_error(&error))?
        .len();
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|error| io_error(&error))?;

    let mut buffer = vec![0_u8; chunk_size];
    let mut offset = 0_u64;
    let mut result = String::new();

    loop {
        let read = file
            .read(&mut buffer)
            .await
            .map_err(|error| io_error(&error))?;
        if read == 0 {
            break;
        }
        let chunk = &buffer[..read];
        result = retry(policy, || {
            upload_chunk(executor, url, chunk, offset, total, timeout)
        })
        .await?;
        offset += read as u64;
    }
    Ok(result)
}

async fn upload_chunk(
    executor: &RequestExecutor,
    url: &str,
    data: &[u8],
    offset: u64,
    total: u64,
    timeout: Duration,
) -> Result<String, RequestError> {
    let request = executor
        .authenticated_builder(Method::POST, url)
        .await?
        .timeout(timeout)
        .header(CONTENT_TYPE, OCTET_STREAM)
        .header(CONTENT_RANGE, content_range(offset, data.len() as u64, total))
        .body(data.to_vec());
    let response = executor.dispatch(request).await?;
    response
        .text()
        .await
        .map_err(|error| RequestError::Transport(error.to_string()))
}

/// Standard inclusive byte range for a chunk starting at `offset`.
fn content_range(offset: u64, len: u64, total: u64) -> String {
    format!("bytes {}-{}/{}", offset, offset + len.max(1) - 1, total)
}

#[cfg(test)]
#[path = "files_test.rs"]
mod tests;
