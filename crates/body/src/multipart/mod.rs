//! Streaming decoder for `multipart/form-data` bodies.
//!
//! The [`codec`] submodule demultiplexes the boundary grammar; this module
//! drives it over the inbound body. Field parts accumulate (bounded) and run
//! through the shared [`FieldAccumulator`]; file parts are spooled to a
//! unique temporary file as their bytes arrive, never buffered whole.
//! Field values and file descriptors are exposed side by side, never merged.
//!
//! Temporary files belong to the downstream consumer once decoding
//! succeeds. If decoding fails part-way, every file written for the request
//! is removed before the error surfaces.

mod codec;

use crate::charset;
use crate::config::MultipartLimits;
use crate::error::DecodeError;
use crate::form::{FieldAccumulator, FieldMap};
use crate::limit::{BoxError, LimitedBody};
use bytes::{Bytes, BytesMut};
use codec::{MultipartCodec, PartEvent, PartHead};
use http_body::Body;
use http_body_util::BodyExt;
use mime::Mime;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio_util::codec::Decoder;
use tracing::{debug, trace};

/// Uploaded files grouped by field name, in order of appearance.
pub type FileMap = BTreeMap<String, Vec<FileDescriptor>>;

/// Metadata of one uploaded file part, produced after its temporary file is
/// fully written and closed.
///
/// The descriptor does not remove the file on drop: ownership of the
/// temporary storage passes to whoever consumes the decoded request.
#[derive(Debug, Clone, PartialEq)]
pub struct FileDescriptor {
    field_name: String,
    original_name: String,
    content_type: String,
    transfer_encoding: String,
    size: u64,
    path: PathBuf,
}

impl FileDescriptor {
    /// The form field this file was posted under.
    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    /// The filename declared by the client.
    pub fn original_name(&self) -> &str {
        &self.original_name
    }

    /// The part's declared media type, `application/octet-stream` when the
    /// client sent none.
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// The part's transfer encoding, `7bit` when the client sent none.
    pub fn transfer_encoding(&self) -> &str {
        &self.transfer_encoding
    }

    /// Size of the stored file in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Location of the temporary file holding the part's bytes.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Decodes a multipart body into field values and file descriptors.
pub(crate) async fn decode_multipart<B>(
    mime: &Mime,
    body: B,
    limits: &MultipartLimits,
) -> Result<(FieldMap, FileMap), DecodeError>
where
    B: Body<Data = Bytes> + Unpin,
    B::Error: Into<BoxError>,
{
    let boundary = mime
        .get_param(mime::BOUNDARY)
        .ok_or_else(|| DecodeError::stream("multipart content-type without a boundary"))?;
    let codec = MultipartCodec::new(boundary.as_str())?;

    let mut written = Vec::new();
    let result = run(codec, body, limits, &mut written).await;

    if result.is_err() {
        for path in &written {
            if let Err(e) = tokio::fs::remove_file(path).await {
                debug!(path = %path.display(), cause = %e, "failed to remove partial upload");
            }
        }
    }

    result
}

async fn run<B>(
    mut codec: MultipartCodec,
    body: B,
    limits: &MultipartLimits,
    written: &mut Vec<PathBuf>,
) -> Result<(FieldMap, FileMap), DecodeError>
where
    B: Body<Data = Bytes> + Unpin,
    B::Error: Into<BoxError>,
{
    let mut body = LimitedBody::new(body, limits.total_limit.unwrap_or(usize::MAX));
    let mut src = BytesMut::new();
    let mut fields = FieldAccumulator::new();
    let mut files = FileMap::new();
    let mut current: Option<PartState> = None;
    let mut eof = false;

    loop {
        while let Some(event) = codec.decode(&mut src)? {
            match event {
                PartEvent::Head(head) => {
                    current = Some(PartState::open(head, limits, written).await?);
                }
                PartEvent::Data(data) => {
                    if let Some(part) = current.as_mut() {
                        part.write(&data, limits).await?;
                    }
                }
                PartEvent::End => {
                    if let Some(part) = current.take() {
                        part.finish(&mut fields, &mut files).await?;
                    }
                }
                PartEvent::Finished => {}
            }
        }

        if codec.is_finished() {
            break;
        }
        if eof {
            return Err(DecodeError::stream("truncated multipart body"));
        }

        match body.frame().await {
            Some(Ok(frame)) => {
                if let Ok(data) = frame.into_data() {
                    src.extend_from_slice(&data);
                }
            }
            Some(Err(e)) => return Err(e),
            None => eof = true,
        }
    }

    Ok((fields.finish(), files))
}

/// In-flight state of the part currently being read.
enum PartState {
    Field { head: PartHead, data: BytesMut },
    File { head: PartHead, file: File, path: PathBuf, size: u64 },
}

impl PartState {
    async fn open(head: PartHead, limits: &MultipartLimits, written: &mut Vec<PathBuf>) -> Result<Self, DecodeError> {
        if head.is_file() {
            let (path, file) = create_temp_file(&limits.temp_dir).await?;
            written.push(path.clone());
            trace!(field = %head.name, path = %path.display(), "spooling file part");
            Ok(Self::File { head, file, path, size: 0 })
        } else {
            Ok(Self::Field { head, data: BytesMut::new() })
        }
    }

    async fn write(&mut self, chunk: &[u8], limits: &MultipartLimits) -> Result<(), DecodeError> {
        match self {
            Self::Field { data, .. } => {
                let next = data.len() + chunk.len();
                if next > limits.field_limit {
                    return Err(DecodeError::entity_too_large(limits.field_limit, next));
                }
                data.extend_from_slice(chunk);
            }
            Self::File { file, size, .. } => {
                *size += chunk.len() as u64;
                if *size > limits.file_limit as u64 {
                    return Err(DecodeError::entity_too_large(limits.file_limit, *size as usize));
                }
                file.write_all(chunk).await?;
            }
        }
        Ok(())
    }

    async fn finish(self, fields: &mut FieldAccumulator, files: &mut FileMap) -> Result<(), DecodeError> {
        match self {
            Self::Field { head, data } => {
                let charset = part_charset(head.content_type.as_deref());
                let value = charset::decode(&data, charset.as_deref())?;
                fields.push(&head.name, value);
            }
            Self::File { head, mut file, path, size } => {
                // The file must be fully written and closed before its
                // descriptor becomes visible.
                file.flush().await?;
                drop(file);

                let descriptor = FileDescriptor {
                    field_name: head.name,
                    original_name: head.filename.unwrap_or_default(),
                    content_type: head.content_type.unwrap_or_else(|| mime::APPLICATION_OCTET_STREAM.to_string()),
                    transfer_encoding: head.transfer_encoding.unwrap_or_else(|| "7bit".to_string()),
                    size,
                    path,
                };
                debug!(field = %descriptor.field_name, size, "multipart file part stored");
                files.entry(descriptor.field_name.clone()).or_default().push(descriptor);
            }
        }
        Ok(())
    }
}

fn part_charset(content_type: Option<&str>) -> Option<String> {
    let mime: Mime = content_type?.parse().ok()?;
    mime.get_param(mime::CHARSET).map(|cs| cs.as_str().to_string())
}

static TEMP_FILE_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Creates a uniquely named file in `dir`, retrying on collisions.
async fn create_temp_file(dir: &Path) -> Result<(PathBuf, File), DecodeError> {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_nanos();

    for _ in 0..32 {
        let counter = TEMP_FILE_COUNTER.fetch_add(1, Ordering::Relaxed);
        let candidate = dir.join(format!("micro-body-{}-{nanos}-{counter}.part", process::id()));

        match OpenOptions::new().create_new(true).write(true).open(&candidate).await {
            Ok(file) => return Ok((candidate, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(e.into()),
        }
    }

    Err(DecodeError::from(io::Error::new(io::ErrorKind::AlreadyExists, "failed to allocate a unique upload file")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::Full;

    fn form_data() -> Mime {
        "multipart/form-data; boundary=boundary".parse().unwrap()
    }

    fn limits() -> MultipartLimits {
        MultipartLimits::from(crate::config::MultipartOptions::new())
    }

    async fn decode_bytes(body: Vec<u8>, limits: &MultipartLimits) -> Result<(FieldMap, FileMap), DecodeError> {
        decode_multipart(&form_data(), Full::new(Bytes::from(body)), limits).await
    }

    fn file_part(field: &str, filename: &str, content_type: &str, payload: &[u8]) -> Vec<u8> {
        let mut part = Vec::new();
        part.extend_from_slice(b"--boundary\r\n");
        part.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n").as_bytes(),
        );
        part.extend_from_slice(format!("Content-Type: {content_type}\r\n").as_bytes());
        part.extend_from_slice(b"\r\n");
        part.extend_from_slice(payload);
        part.extend_from_slice(b"\r\n");
        part
    }

    fn field_part(field: &str, value: &str) -> Vec<u8> {
        format!("--boundary\r\nContent-Disposition: form-data; name=\"{field}\"\r\n\r\n{value}\r\n").into_bytes()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_file_parts_without_fields() {
        let payload_one = vec![0xAAu8; 4096];
        let payload_two = vec![0x55u8; 1024];
        let mut body = Vec::new();
        body.extend_from_slice(&file_part("file1", "1MB.jpg", "image/jpeg", &payload_one));
        body.extend_from_slice(&file_part("file2", "MyFile.foobar", "image/jpeg", &payload_two));
        body.extend_from_slice(b"--boundary--\r\n");

        let (fields, files) = decode_bytes(body, &limits()).await.unwrap();

        assert!(fields.is_empty());
        assert_eq!(files.len(), 2);

        let first = &files["file1"];
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].field_name(), "file1");
        assert_eq!(first[0].original_name(), "1MB.jpg");
        assert_eq!(first[0].content_type(), "image/jpeg");
        assert_eq!(first[0].transfer_encoding(), "7bit");
        assert_eq!(first[0].size(), 4096);
        assert!(first[0].path().exists());

        let stored = std::fs::read(first[0].path()).unwrap();
        assert_eq!(stored, payload_one);

        let second = &files["file2"];
        assert_eq!(second[0].original_name(), "MyFile.foobar");
        assert_eq!(second[0].size(), 1024);
        assert_eq!(std::fs::read(second[0].path()).unwrap(), payload_two);

        for descriptors in files.values() {
            for descriptor in descriptors {
                std::fs::remove_file(descriptor.path()).unwrap();
            }
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_mixed_fields_and_files() {
        let mut body = Vec::new();
        body.extend_from_slice(&file_part("file1", "a.bin", "application/octet-stream", b"AAAA"));
        body.extend_from_slice(&field_part("foo", "bar"));
        body.extend_from_slice(&file_part("file2", "b.bin", "application/octet-stream", b"BB"));
        body.extend_from_slice(&field_part("biz", "42"));
        body.extend_from_slice(b"--boundary--\r\n");

        let (fields, files) = decode_bytes(body, &limits()).await.unwrap();

        assert_eq!(fields["foo"].as_text(), Some("bar"));
        assert_eq!(fields["biz"].as_text(), Some("42"));
        assert_eq!(files["file1"][0].size(), 4);
        assert_eq!(files["file2"][0].size(), 2);

        for descriptors in files.values() {
            for descriptor in descriptors {
                std::fs::remove_file(descriptor.path()).unwrap();
            }
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_field_names_reconstruct_nested_structure() {
        let mut body = Vec::new();
        for (key, value) in [
            ("foo", "bar"),
            ("biz", "42"),
            ("biz", "43"),
            ("baz[5]", "A"),
            ("baz[0]", "B"),
            ("bob[name]", "bob"),
        ] {
            body.extend_from_slice(&field_part(key, value));
        }
        body.extend_from_slice(b"--boundary--\r\n");

        let (fields, files) = decode_bytes(body, &limits()).await.unwrap();

        assert!(files.is_empty());
        assert_eq!(fields["foo"].as_text(), Some("bar"));
        assert_eq!(fields["biz"].as_seq().unwrap().len(), 2);
        let baz = fields["baz"].as_seq().unwrap();
        assert_eq!(baz.len(), 6);
        assert!(baz[1].is_none());
        assert_eq!(fields["bob"].as_map().unwrap()["name"].as_text(), Some("bob"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_same_field_collects_multiple_files() {
        let mut body = Vec::new();
        body.extend_from_slice(&file_part("docs", "a.txt", "text/plain", b"one"));
        body.extend_from_slice(&file_part("docs", "b.txt", "text/plain", b"two"));
        body.extend_from_slice(b"--boundary--\r\n");

        let (_, files) = decode_bytes(body, &limits()).await.unwrap();

        let docs = &files["docs"];
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].original_name(), "a.txt");
        assert_eq!(docs[1].original_name(), "b.txt");

        for descriptor in docs {
            std::fs::remove_file(descriptor.path()).unwrap();
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_missing_boundary_is_a_stream_error() {
        let mime: Mime = "multipart/form-data".parse().unwrap();
        let err = decode_multipart(&mime, Full::new(Bytes::from_static(b"ignored")), &limits()).await.unwrap_err();
        assert!(matches!(err, DecodeError::Stream { .. }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_truncated_body_cleans_up_spooled_files() {
        let dir = std::env::temp_dir().join(format!("micro-body-test-{}", process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let mut body = Vec::new();
        body.extend_from_slice(&file_part("file1", "done.bin", "application/octet-stream", b"complete"));
        // Second part never reaches a close delimiter.
        body.extend_from_slice(b"--boundary\r\nContent-Disposition: form-data; name=\"f2\"; filename=\"x\"\r\n\r\ntrunc");

        let limits = MultipartLimits::from(crate::config::MultipartOptions::new().temp_dir(&dir));
        let err = decode_bytes(body, &limits).await.unwrap_err();

        assert!(matches!(err, DecodeError::Stream { .. }));
        let leftover = std::fs::read_dir(&dir).unwrap().count();
        assert_eq!(leftover, 0, "partial uploads must be removed on failure");
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_file_limit_applies_per_part() {
        let mut body = Vec::new();
        body.extend_from_slice(&file_part("big", "big.bin", "application/octet-stream", &vec![0u8; 2048]));
        body.extend_from_slice(b"--boundary--\r\n");

        let limits = MultipartLimits::from(crate::config::MultipartOptions::new().file_limit(1024));
        let err = decode_bytes(body, &limits).await.unwrap_err();

        match err {
            DecodeError::EntityTooLarge { limit, .. } => assert_eq!(limit, 1024),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_total_limit_bounds_the_whole_request() {
        let mut body = Vec::new();
        body.extend_from_slice(&field_part("a", &"x".repeat(512)));
        body.extend_from_slice(&field_part("b", &"y".repeat(512)));
        body.extend_from_slice(b"--boundary--\r\n");

        let limits = MultipartLimits::from(crate::config::MultipartOptions::new().total_limit(256));
        let err = decode_bytes(body, &limits).await.unwrap_err();
        assert!(matches!(err, DecodeError::EntityTooLarge { .. }));
    }
}
