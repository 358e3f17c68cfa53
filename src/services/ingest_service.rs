//! Upload ingestion: multipart extraction and bounded spooling to disk.
//!
//! The client's Content-Length is treated as a hint, never a promise.
//! [`copy_bounded`] will not read past the declared count and will not
//! stall when the stream runs dry early; [`IngestService::extract_upload`]
//! walks the multipart framing only as far as the first file field and
//! leaves the rest of the body untouched.

use std::env;
use std::io::{self, SeekFrom};
use std::path::PathBuf;

use tokio::fs::{self, File, OpenOptions};
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWrite,
    AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

use crate::config::{self, Settings};
use crate::errors::{IngestError, IngestResult};
use crate::models::request::Request;
use crate::models::upload::Upload;

/// Read buffer size for the bounded copier.
const COPY_CHUNK_SIZE: usize = 64 * 1024;

/// Hard cap on a single multipart header line.
const MAX_PART_HEADER_LINE: usize = 8 * 1024;

/// Copy at most `max_bytes` bytes from `source` into `destination`.
///
/// Stops at the byte limit or at end-of-stream, whichever comes first:
/// a source longer than declared is truncated, a shorter one ends the
/// copy quietly. A length mismatch is a tolerated outcome, not an error;
/// only real I/O failures propagate. Returns the bytes actually written.
pub async fn copy_bounded<R, W>(
    source: &mut R,
    max_bytes: u64,
    destination: &mut W,
) -> io::Result<u64>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buf = vec![0u8; COPY_CHUNK_SIZE];
    let mut copied: u64 = 0;
    while copied < max_bytes {
        let want = u64::min(max_bytes - copied, buf.len() as u64) as usize;
        let read = source.read(&mut buf[..want]).await?;
        if read == 0 {
            break;
        }
        destination.write_all(&buf[..read]).await?;
        copied += read as u64;
    }
    Ok(copied)
}

/// Materializes uploaded files from request bodies into a spool directory.
///
/// Spool files are named `.upload-{uuid}`, so concurrent requests never
/// collide. The extracted [`Upload`] owns its spool file; this service
/// never deletes one except when bailing out of a failed extraction.
#[derive(Clone, Debug)]
pub struct IngestService {
    /// Directory spool files are created in.
    pub spool_dir: PathBuf,
}

impl IngestService {
    pub fn new(spool_dir: impl Into<PathBuf>) -> Self {
        Self {
            spool_dir: spool_dir.into(),
        }
    }

    /// Build from settings, falling back to the system temp directory
    /// when `poulda.spool_dir` is not configured.
    pub fn from_settings(settings: &Settings) -> Self {
        match settings.get(config::SPOOL_DIR_KEY) {
            Some(dir) => Self::new(dir),
            None => Self::new(env::temp_dir()),
        }
    }

    /// Extract the uploaded file from a multipart request body.
    ///
    /// Walks the framing to the first `Content-Disposition` sub-header
    /// carrying a `filename=` parameter, consumes that part's headers up
    /// to and including the blank separator line, then spools the payload
    /// through [`copy_bounded`]. The payload length is derived from the
    /// declared Content-Length minus the framing consumed so far and the
    /// closing delimiter; a body that ends early just produces a short
    /// spool file.
    ///
    /// Only the first file-bearing field is considered. Fields placed
    /// after the file field are not understood and inflate the derived
    /// length; the upload form puts the file last.
    pub async fn extract_upload(&self, request: &mut Request) -> IngestResult<Upload> {
        let declared_total = request
            .content_length()
            .ok_or(IngestError::MissingContentLength)?;
        let (size, filename) = scan_to_file_payload(&mut request.body, declared_total).await?;

        fs::create_dir_all(&self.spool_dir).await?;
        let path = self.spool_dir.join(format!(".upload-{}", Uuid::new_v4()));
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;

        let copied = match copy_bounded(&mut request.body, size, &mut file).await {
            Ok(copied) => copied,
            Err(err) => {
                let _ = fs::remove_file(&path).await;
                return Err(err.into());
            }
        };
        if copied < size {
            debug!(
                declared = size,
                received = copied,
                "upload body ended early, spool file is short"
            );
        }
        if let Err(err) = finalize_spool(&mut file).await {
            let _ = fs::remove_file(&path).await;
            return Err(err.into());
        }

        debug!(filename = %filename, size, spool = %path.display(), "spooled upload");
        Ok(Upload {
            file,
            size,
            filename,
            path,
        })
    }
}

async fn finalize_spool(file: &mut File) -> io::Result<()> {
    file.flush().await?;
    file.seek(SeekFrom::Start(0)).await?;
    Ok(())
}

/// Scan multipart framing up to the start of the file payload.
///
/// Returns the derived payload length and the sanitized filename. The
/// body is left positioned on the first payload byte.
async fn scan_to_file_payload<R>(body: &mut R, declared_total: u64) -> IngestResult<(u64, String)>
where
    R: AsyncBufRead + Unpin,
{
    let mut remaining = declared_total;

    let boundary_line = read_part_line(body).await?;
    if boundary_line.is_empty() {
        return Err(IngestError::MissingFileField);
    }
    remaining = remaining.saturating_sub(boundary_line.len() as u64);
    let boundary_len = trim_line_ending(&boundary_line).len() as u64;

    let mut filename: Option<String> = None;
    let filename = loop {
        let line = read_part_line(body).await?;
        if line.is_empty() {
            // end-of-stream before the file field's headers completed
            return Err(IngestError::MissingFileField);
        }
        remaining = remaining.saturating_sub(line.len() as u64);
        if filename.is_none() && line_names_file(&line) {
            filename = Some(parse_filename(&line)?);
        }
        if is_blank_line(&line) {
            if let Some(found) = filename.take() {
                break found;
            }
        }
    };

    // What is left of the declared total is the payload plus the closing
    // delimiter: CRLF, the boundary line with its trailing "--", CRLF.
    let size = remaining.saturating_sub(boundary_len + 6);
    Ok((size, filename))
}

/// Read one `\n`-terminated line, terminator included.
///
/// An empty return means end-of-stream. A line that hits
/// [`MAX_PART_HEADER_LINE`] without a terminator is rejected.
async fn read_part_line<R>(body: &mut R) -> IngestResult<Vec<u8>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    let mut limited = (&mut *body).take(MAX_PART_HEADER_LINE as u64);
    limited.read_until(b'\n', &mut line).await?;
    if line.len() >= MAX_PART_HEADER_LINE && line.last() != Some(&b'\n') {
        return Err(IngestError::PartHeaderTooLong(MAX_PART_HEADER_LINE));
    }
    Ok(line)
}

fn trim_line_ending(line: &[u8]) -> &[u8] {
    let mut end = line.len();
    while end > 0 && (line[end - 1] == b'\n' || line[end - 1] == b'\r') {
        end -= 1;
    }
    &line[..end]
}

fn is_blank_line(line: &[u8]) -> bool {
    !line.is_empty() && trim_line_ending(line).is_empty()
}

/// Whether this header line is a `Content-Disposition` naming a file.
fn line_names_file(line: &[u8]) -> bool {
    let lower = String::from_utf8_lossy(line).to_ascii_lowercase();
    lower.trim_start().starts_with("content-disposition") && lower.contains("filename=")
}

/// Pull the filename out of a `Content-Disposition` sub-header line.
///
/// Handles quoted and bare values; a quoted value ends at the first `"`.
/// Browsers may send a full client path, so everything up to the last
/// `/` or `\` is dropped before the name is sanitized.
fn parse_filename(line: &[u8]) -> IngestResult<String> {
    let text = String::from_utf8_lossy(line);
    let lower = text.to_ascii_lowercase();
    let idx = lower.find("filename=").ok_or(IngestError::MissingFilename)?;
    let value = &text[idx + "filename=".len()..];

    let name = if let Some(quoted) = value.strip_prefix('"') {
        quoted.split('"').next().unwrap_or_default()
    } else {
        value
            .split(';')
            .next()
            .unwrap_or_default()
            .trim_end_matches(['\r', '\n'])
            .trim()
    };

    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let safe = sanitize_filename::sanitize(base);
    if safe.is_empty() {
        return Err(IngestError::MissingFilename);
    }
    Ok(safe)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::request::Body;
    use http::{HeaderMap, HeaderValue, header};
    use tempfile::TempDir;

    const BOUNDARY: &str = "----poulda-test-boundary";

    fn file_body(filename: &str, payload: &[u8]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n")
                .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n");
        body.extend_from_slice(b"\r\n");
        body.extend_from_slice(payload);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn request_for(body: Vec<u8>, declared_total: usize) -> Request {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_LENGTH,
            HeaderValue::from_str(&declared_total.to_string()).unwrap(),
        );
        Request::new(headers, Body::from_bytes(body), Settings::new())
    }

    #[tokio::test]
    async fn copy_bounded_stops_at_the_declared_count() {
        let data: Vec<u8> = (0u8..=255).cycle().take(300).collect();
        let mut source: &[u8] = &data;
        let mut out = io::Cursor::new(Vec::new());

        let copied = copy_bounded(&mut source, 100, &mut out).await.unwrap();
        assert_eq!(copied, 100);
        assert_eq!(out.get_ref().as_slice(), &data[..100]);
        // the source is left positioned right after the copied prefix
        assert_eq!(source, &data[100..]);
    }

    #[tokio::test]
    async fn copy_bounded_tolerates_an_overcounted_length() {
        let data = b"short stream".to_vec();
        let mut source: &[u8] = &data;
        let mut out = io::Cursor::new(Vec::new());

        let copied = copy_bounded(&mut source, 100_000_000, &mut out).await.unwrap();
        assert_eq!(copied, data.len() as u64);
        assert_eq!(out.get_ref().as_slice(), data.as_slice());
    }

    #[tokio::test]
    async fn copy_bounded_with_zero_limit_writes_nothing() {
        let mut source: &[u8] = b"anything at all";
        let mut out = io::Cursor::new(Vec::new());

        let copied = copy_bounded(&mut source, 0, &mut out).await.unwrap();
        assert_eq!(copied, 0);
        assert!(out.get_ref().is_empty());
        assert_eq!(source, b"anything at all");
    }

    #[tokio::test]
    async fn extract_round_trips_a_small_file() {
        let payload = b"This is a test file.";
        let body = file_body("small.txt", payload);
        let total = body.len();
        let mut request = request_for(body, total);

        let spool = TempDir::new().unwrap();
        let service = IngestService::new(spool.path());
        let mut upload = service.extract_upload(&mut request).await.unwrap();

        assert_eq!(upload.filename, "small.txt");
        assert_eq!(upload.size, payload.len() as u64);
        assert!(upload.path.starts_with(spool.path()));

        let mut content = vec![0u8; payload.len()];
        upload.file.read_exact(&mut content).await.unwrap();
        assert_eq!(content, payload);

        let path = upload.path.clone();
        upload.discard().await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn extract_skips_leading_text_fields() {
        let payload = b"paste me";
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(b"Content-Disposition: form-data; name=\"expiry\"\r\n");
        body.extend_from_slice(b"\r\n");
        body.extend_from_slice(b"one_week\r\n");
        body.extend_from_slice(&file_body("notes.txt", payload));
        // the inner file_body starts with its own boundary line, so the
        // assembled body is: text field, boundary, file field, closing.
        let total = body.len();
        let mut request = request_for(body, total);

        let spool = TempDir::new().unwrap();
        let service = IngestService::new(spool.path());
        let mut upload = service.extract_upload(&mut request).await.unwrap();

        assert_eq!(upload.filename, "notes.txt");
        assert_eq!(upload.size, payload.len() as u64);
        let mut content = vec![0u8; payload.len()];
        upload.file.read_exact(&mut content).await.unwrap();
        assert_eq!(content, payload);
    }

    #[tokio::test]
    async fn extract_reduces_client_paths_to_base_names() {
        let body = file_body("C:\\fakepath\\report final.txt", b"data");
        let total = body.len();
        let mut request = request_for(body, total);

        let spool = TempDir::new().unwrap();
        let upload = IngestService::new(spool.path())
            .extract_upload(&mut request)
            .await
            .unwrap();
        assert_eq!(upload.filename, "report final.txt");
    }

    #[tokio::test]
    async fn extract_fails_without_content_length() {
        let body = file_body("small.txt", b"data");
        let mut request = Request::new(HeaderMap::new(), Body::from_bytes(body), Settings::new());

        let spool = TempDir::new().unwrap();
        let err = IngestService::new(spool.path())
            .extract_upload(&mut request)
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::MissingContentLength));
        assert!(err.is_client_error());
    }

    #[tokio::test]
    async fn extract_fails_when_no_file_field_exists() {
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(b"Content-Disposition: form-data; name=\"expiry\"\r\n");
        body.extend_from_slice(b"\r\n");
        body.extend_from_slice(b"one_week\r\n");
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        let total = body.len();
        let mut request = request_for(body, total);

        let spool = TempDir::new().unwrap();
        let err = IngestService::new(spool.path())
            .extract_upload(&mut request)
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::MissingFileField));
    }

    #[tokio::test]
    async fn extract_rejects_an_empty_filename() {
        let body = file_body("", b"data");
        let total = body.len();
        let mut request = request_for(body, total);

        let spool = TempDir::new().unwrap();
        let err = IngestService::new(spool.path())
            .extract_upload(&mut request)
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::MissingFilename));
    }

    #[tokio::test]
    async fn extract_rejects_oversized_header_lines() {
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(&vec![b'a'; MAX_PART_HEADER_LINE + 100]);
        let total = body.len();
        let mut request = request_for(body, total);

        let spool = TempDir::new().unwrap();
        let err = IngestService::new(spool.path())
            .extract_upload(&mut request)
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::PartHeaderTooLong(_)));
    }

    #[tokio::test]
    async fn extract_tolerates_a_body_shorter_than_declared() {
        let payload = b"This is a test file.";
        let full = file_body("small.txt", payload);
        let declared_total = full.len();
        // stream dies ten bytes into the payload
        let cut = full.len() - (payload.len() - 10) - (BOUNDARY.len() + 8);
        let mut request = request_for(full[..cut].to_vec(), declared_total);

        let spool = TempDir::new().unwrap();
        let mut upload = IngestService::new(spool.path())
            .extract_upload(&mut request)
            .await
            .unwrap();

        // the declared size is reported, but only the received bytes exist
        assert_eq!(upload.size, payload.len() as u64);
        let mut content = Vec::new();
        upload.file.read_to_end(&mut content).await.unwrap();
        assert_eq!(content, &payload[..10]);
    }

    #[tokio::test]
    async fn spool_dir_comes_from_settings() {
        let spool = TempDir::new().unwrap();
        let settings = Settings::from_pairs([(
            config::SPOOL_DIR_KEY,
            spool.path().to_str().unwrap(),
        )]);
        let service = IngestService::from_settings(&settings);
        assert_eq!(service.spool_dir, spool.path());

        let fallback = IngestService::from_settings(&Settings::new());
        assert_eq!(fallback.spool_dir, env::temp_dir());
    }

    #[test]
    fn filename_parsing_handles_quoted_and_bare_values() {
        let quoted = b"Content-Disposition: form-data; name=\"file\"; filename=\"a b.txt\"\r\n";
        assert_eq!(parse_filename(quoted).unwrap(), "a b.txt");

        let bare = b"Content-Disposition: form-data; name=\"file\"; filename=data.bin\r\n";
        assert_eq!(parse_filename(bare).unwrap(), "data.bin");

        let path = b"Content-Disposition: form-data; name=\"file\"; filename=\"/etc/passwd\"\r\n";
        assert_eq!(parse_filename(path).unwrap(), "passwd");
    }
}
