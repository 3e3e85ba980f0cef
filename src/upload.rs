//! Resumable upload state machine with exponential backoff and full jitter.
//!
//! ```text
//! Initiated -> ChunkSent -> { ChunkSent | Complete | RetryWait | Failed }
//! RetryWait -> ChunkSent ...
//! ```
//!
//! Opening the session counts as the first request. Chunk boundaries only
//! decide how much work a retry repeats. Transport faults and
//! 500/502/503/504 statuses are retried up to [`RetryPolicy::max_retries`]
//! times; anything else fails immediately.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::time::Duration;

use rand::Rng;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{CurationError, Result};
use crate::resources::VideoResource;

pub const DEFAULT_MAX_RETRIES: u32 = 10;
/// Google requires non-final chunks to be a multiple of 256 KiB.
pub const CHUNK_GRANULARITY: usize = 256 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Bytes per request; `0` sends the whole payload in one request.
    pub chunk_size: usize,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            chunk_size: 0,
        }
    }
}

impl RetryPolicy {
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = round_chunk_size(chunk_size);
        self
    }
}

/// Rounds a non-zero chunk size up to the next [`CHUNK_GRANULARITY`] multiple.
pub fn round_chunk_size(chunk_size: usize) -> usize {
    if chunk_size == 0 {
        return 0;
    }
    chunk_size.div_ceil(CHUNK_GRANULARITY) * CHUNK_GRANULARITY
}

/// What a single chunk request produced.
#[derive(Debug, Clone)]
pub enum ChunkProgress {
    /// The remote committed `committed` of `total` bytes and wants more.
    Partial { committed: u64, total: u64 },
    /// The final chunk landed and the remote answered with the created video.
    Complete(VideoResource),
}

/// One resumable upload session on the remote side.
pub trait ChunkTransport {
    fn next_chunk(&mut self) -> Result<ChunkProgress>;
}

impl<T: ChunkTransport + ?Sized> ChunkTransport for Box<T> {
    fn next_chunk(&mut self) -> Result<ChunkProgress> {
        (**self).next_chunk()
    }
}

pub trait Sleeper {
    fn sleep(&mut self, duration: Duration);
}

impl<S: Sleeper + ?Sized> Sleeper for &mut S {
    fn sleep(&mut self, duration: Duration) {
        (**self).sleep(duration);
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UploadState {
    Initiated,
    ChunkSent { committed: u64, total: u64 },
    RetryWait { retry: u32, delay: Duration },
    Complete { id: String },
    Failed,
}

/// Exponent at which the backoff window stops growing (about 17 minutes).
pub const MAX_BACKOFF_EXPONENT: u32 = 10;

/// Uniform draw from `[0, 2^retry)` seconds, with `retry` capped at
/// [`MAX_BACKOFF_EXPONENT`].
pub fn backoff_delay<R: Rng>(retry: u32, rng: &mut R) -> Duration {
    let max_sleep = f64::from(1u32 << retry.min(MAX_BACKOFF_EXPONENT));
    Duration::from_secs_f64(rng.gen_range(0.0..max_sleep))
}

pub struct ResumableUpload<T, S, R> {
    transport: T,
    policy: RetryPolicy,
    sleeper: S,
    rng: R,
    state: UploadState,
    retry: u32,
    attempts: u32,
}

impl<T, S, R> ResumableUpload<T, S, R>
where
    T: ChunkTransport,
    S: Sleeper,
    R: Rng,
{
    pub fn new(transport: T, policy: RetryPolicy, sleeper: S, rng: R) -> Self {
        Self {
            transport,
            policy,
            sleeper,
            rng,
            state: UploadState::Initiated,
            retry: 0,
            attempts: 0,
        }
    }

    pub fn state(&self) -> &UploadState {
        &self.state
    }

    /// Chunk requests issued so far, retries included.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn sleeper(&self) -> &S {
        &self.sleeper
    }

    /// Drives the session to a terminal state and returns the new video id.
    pub fn run(&mut self) -> Result<String> {
        loop {
            match self.state {
                UploadState::Complete { ref id } => return Ok(id.clone()),
                UploadState::Failed => {
                    return Err(CurationError::protocol("upload session already failed"));
                }
                _ => {}
            }

            self.attempts += 1;
            debug!(attempt = self.attempts, "sending upload chunk");
            match self.transport.next_chunk() {
                Ok(ChunkProgress::Partial { committed, total }) => {
                    debug!(committed, total, "chunk accepted");
                    self.state = UploadState::ChunkSent { committed, total };
                }
                Ok(ChunkProgress::Complete(resource)) => {
                    let Some(id) = resource.id.filter(|id| !id.is_empty()) else {
                        self.state = UploadState::Failed;
                        return Err(CurationError::protocol(
                            "upload finished without a video id in the response",
                        ));
                    };
                    info!(video_id = %id, attempts = self.attempts, "upload complete");
                    self.state = UploadState::Complete { id: id.clone() };
                    return Ok(id);
                }
                Err(err) if err.is_retriable() => {
                    self.retry += 1;
                    if self.retry > self.policy.max_retries {
                        warn!(error = %err, "no longer attempting to retry");
                        self.state = UploadState::Failed;
                        return Err(CurationError::RetriesExhausted {
                            attempts: self.attempts,
                            last_error: err.to_string(),
                        });
                    }
                    let delay = backoff_delay(self.retry, &mut self.rng);
                    warn!(
                        error = %err,
                        retry = self.retry,
                        sleep_secs = delay.as_secs_f64(),
                        "retriable upload error, sleeping before retry"
                    );
                    self.state = UploadState::RetryWait {
                        retry: self.retry,
                        delay,
                    };
                    self.sleeper.sleep(delay);
                }
                Err(err) => {
                    self.state = UploadState::Failed;
                    return Err(err);
                }
            }
        }
    }
}

/// Resumable session against the YouTube upload endpoint.
///
/// Nothing goes over the wire until the first [`ChunkTransport::next_chunk`]
/// call, which POSTs the metadata and keeps the `Location` URI. A failed
/// initiation is retried like any other chunk.
pub struct HttpChunkTransport {
    agent: ureq::Agent,
    access_token: String,
    initiate_url: String,
    metadata: Value,
    session_uri: Option<String>,
    content_type: String,
    file: File,
    total: u64,
    committed: u64,
    chunk_size: usize,
    needs_resync: bool,
}

impl HttpChunkTransport {
    pub fn new(
        agent: ureq::Agent,
        upload_base: &str,
        access_token: &str,
        part: &str,
        metadata: &Value,
        path: &Path,
        chunk_size: usize,
    ) -> Result<Self> {
        let file = File::open(path)?;
        let total = file.metadata()?.len();
        let content_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        let initiate_url = format!(
            "{}/videos?uploadType=resumable&part={}",
            upload_base.trim_end_matches('/'),
            part
        );

        Ok(Self {
            agent,
            access_token: access_token.to_string(),
            initiate_url,
            metadata: metadata.clone(),
            session_uri: None,
            content_type,
            file,
            total,
            committed: 0,
            chunk_size: round_chunk_size(chunk_size),
            needs_resync: false,
        })
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.access_token)
    }

    /// Returns the session URI, POSTing the metadata first if no session
    /// exists yet.
    fn session_uri(&mut self) -> Result<String> {
        if let Some(uri) = &self.session_uri {
            return Ok(uri.clone());
        }
        let response = self
            .agent
            .post(&self.initiate_url)
            .set("Authorization", &self.bearer())
            .set("X-Upload-Content-Type", &self.content_type)
            .set("X-Upload-Content-Length", &self.total.to_string())
            .send_json(&self.metadata)?;
        let uri = response
            .header("Location")
            .ok_or_else(|| {
                CurationError::protocol("upload initiation returned no Location header")
            })?
            .to_string();
        debug!(total = self.total, "opened resumable upload session");
        self.session_uri = Some(uri.clone());
        Ok(uri)
    }

    fn record_committed(&mut self, committed: u64) -> Result<()> {
        if committed > self.total {
            return Err(CurationError::protocol(format!(
                "upload session reports {committed} bytes committed of {}",
                self.total
            )));
        }
        self.committed = committed;
        Ok(())
    }

    /// Asks the session how many bytes it holds. Returns the finished video
    /// when the previous request actually completed the upload.
    fn resync(&mut self, session_uri: &str) -> Result<Option<VideoResource>> {
        let response = self
            .agent
            .put(session_uri)
            .set("Authorization", &self.bearer())
            .set("Content-Range", &format!("bytes */{}", self.total))
            .send_bytes(&[])?;
        if response.status() == 308 {
            let committed = response.header("Range").and_then(parse_committed).unwrap_or(0);
            self.record_committed(committed)?;
            debug!(committed, "resumed upload session");
            return Ok(None);
        }
        decode_video(response).map(Some)
    }
}

impl ChunkTransport for HttpChunkTransport {
    fn next_chunk(&mut self) -> Result<ChunkProgress> {
        let session_uri = self.session_uri()?;
        if self.needs_resync {
            let done = self.resync(&session_uri)?;
            self.needs_resync = false;
            if let Some(done) = done {
                return Ok(ChunkProgress::Complete(done));
            }
        }

        let remaining = self.total.saturating_sub(self.committed);
        let len = match self.chunk_size {
            0 => remaining,
            size => remaining.min(size as u64),
        };
        let content_range = if len == 0 {
            format!("bytes */{}", self.total)
        } else {
            format!(
                "bytes {}-{}/{}",
                self.committed,
                self.committed + len - 1,
                self.total
            )
        };

        let authorization = self.bearer();
        self.file.seek(SeekFrom::Start(self.committed))?;
        let body = (&mut self.file).take(len);
        let result = self
            .agent
            .put(&session_uri)
            .set("Authorization", &authorization)
            .set("Content-Type", &self.content_type)
            .set("Content-Length", &len.to_string())
            .set("Content-Range", &content_range)
            .send(body);

        match result {
            Ok(response) if response.status() == 308 => {
                let committed = response
                    .header("Range")
                    .and_then(parse_committed)
                    .unwrap_or(self.committed + len);
                self.record_committed(committed)?;
                Ok(ChunkProgress::Partial {
                    committed,
                    total: self.total,
                })
            }
            Ok(response) => decode_video(response).map(ChunkProgress::Complete),
            Err(err) => {
                self.needs_resync = true;
                Err(err.into())
            }
        }
    }
}

fn decode_video(response: ureq::Response) -> Result<VideoResource> {
    response
        .into_json::<VideoResource>()
        .map_err(|err| CurationError::protocol(format!("could not decode upload response: {err}")))
}

/// `Range: bytes=0-524287` means 524288 bytes are committed.
fn parse_committed(range: &str) -> Option<u64> {
    let (_, end) = range.trim().strip_prefix("bytes=")?.split_once('-')?;
    end.trim().parse::<u64>().ok().map(|end| end + 1)
}
