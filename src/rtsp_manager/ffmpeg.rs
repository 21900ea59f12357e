//! ffmpeg-backed transport
//!
//! One long-running ffmpeg child per open stream, decoding RTSP and
//! re-encoding every frame as JPEG on stdout. `kill_on_drop` ends the
//! child when the stream is dropped.

use super::{Frame, FrameStream, MjpegSplitter, OpenStreams, StreamClaim, VideoTransport};
use crate::error::{Error, Result};
use crate::models::CameraId;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};

const READ_CHUNK: usize = 64 * 1024;

pub struct FfmpegTransport {
    streams: Arc<OpenStreams>,
    /// Wait for the first frame, and max silence while streaming
    stall_timeout: Duration,
}

impl FfmpegTransport {
    pub fn new(stall_timeout: Duration) -> Self {
        Self {
            streams: OpenStreams::new(),
            stall_timeout,
        }
    }

    /// Check if ffmpeg is available
    pub async fn check_ffmpeg() -> Result<String> {
        let output = Command::new("ffmpeg")
            .arg("-version")
            .output()
            .await
            .map_err(|e| Error::Internal(format!("ffmpeg not found: {}", e)))?;

        if !output.status.success() {
            return Err(Error::Internal("ffmpeg version check failed".to_string()));
        }

        let version = String::from_utf8_lossy(&output.stdout);
        Ok(version.lines().next().unwrap_or("unknown").to_string())
    }

    fn spawn(url: &str) -> std::io::Result<Child> {
        // -an: video only; -q:v keeps MJPEG re-encoding close to source quality
        Command::new("ffmpeg")
            .args([
                "-rtsp_transport", "tcp",
                "-i", url,
                "-an",
                "-f", "image2pipe",
                "-vcodec", "mjpeg",
                "-q:v", "3",
                "-loglevel", "error",
                "-",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
    }
}

#[async_trait]
impl VideoTransport for FfmpegTransport {
    async fn open(&self, camera_id: &CameraId, url: &str) -> Result<Box<dyn FrameStream>> {
        let claim = self
            .streams
            .claim(camera_id)
            .ok_or_else(|| Error::transport(camera_id, "stream already open"))?;

        let mut child = Self::spawn(url)
            .map_err(|e| Error::transport(camera_id, format!("ffmpeg spawn failed: {e}")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::transport(camera_id, "ffmpeg stdout not captured"))?;

        let mut stream = FfmpegStream {
            camera_id: camera_id.clone(),
            _child: child,
            stdout,
            splitter: MjpegSplitter::new(),
            ready: VecDeque::new(),
            stall_timeout: self.stall_timeout,
            _claim: claim,
        };

        // Verified only once a frame arrives
        match stream.next_frame().await? {
            Some(first) => {
                stream.ready.push_front(first);
                tracing::debug!(camera_id = %camera_id, "Stream verified");
                Ok(Box::new(stream))
            }
            None => Err(Error::transport(camera_id, "stream closed before first frame")),
        }
    }
}

struct FfmpegStream {
    camera_id: CameraId,
    _child: Child,
    stdout: ChildStdout,
    splitter: MjpegSplitter,
    ready: VecDeque<Frame>,
    stall_timeout: Duration,
    _claim: StreamClaim,
}

#[async_trait]
impl FrameStream for FfmpegStream {
    async fn next_frame(&mut self) -> Result<Option<Frame>> {
        let mut chunk = vec![0u8; READ_CHUNK];

        loop {
            if let Some(frame) = self.ready.pop_front() {
                return Ok(Some(frame));
            }

            let read = tokio::time::timeout(self.stall_timeout, self.stdout.read(&mut chunk))
                .await
                .map_err(|_| {
                    Error::transport(
                        &self.camera_id,
                        format!("no data for {}s", self.stall_timeout.as_secs()),
                    )
                })?
                .map_err(|e| Error::transport(&self.camera_id, e))?;

            if read == 0 {
                return Ok(None);
            }

            self.ready
                .extend(self.splitter.push(&chunk[..read]).into_iter().map(Frame::new));
        }
    }
}
