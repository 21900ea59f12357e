//! MJPEG pipe splitter
//!
//! ffmpeg's `image2pipe` output is a plain concatenation of JPEG images.
//! Frames are cut at SOI (`FF D8`) / EOI (`FF D9`) markers.

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];

/// Upper bound for one buffered frame (32 MiB)
const DEFAULT_MAX_FRAME: usize = 32 * 1024 * 1024;

pub struct MjpegSplitter {
    buf: Vec<u8>,
    max_frame: usize,
}

impl MjpegSplitter {
    pub fn new() -> Self {
        Self::with_max_frame(DEFAULT_MAX_FRAME)
    }

    pub fn with_max_frame(max_frame: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_frame,
        }
    }

    /// Feed bytes, returning every frame completed by them
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        self.buf.extend_from_slice(chunk);
        let mut frames = Vec::new();

        loop {
            let Some(start) = find(&self.buf, &SOI, 0) else {
                // Keep a dangling 0xFF, it may start the next SOI
                let keep = usize::from(self.buf.last() == Some(&0xFF));
                let cut = self.buf.len() - keep;
                self.buf.drain(..cut);
                break;
            };

            let Some(end) = find(&self.buf, &EOI, start + SOI.len()) else {
                self.buf.drain(..start);
                if self.buf.len() > self.max_frame {
                    tracing::warn!(
                        buffered = self.buf.len(),
                        "MJPEG frame exceeds limit, dropping buffer"
                    );
                    self.buf.clear();
                }
                break;
            };

            let frame_end = end + EOI.len();
            frames.push(self.buf[start..frame_end].to_vec());
            self.buf.drain(..frame_end);
        }

        frames
    }

    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}

impl Default for MjpegSplitter {
    fn default() -> Self {
        Self::new()
    }
}

fn find(haystack: &[u8], needle: &[u8; 2], from: usize) -> Option<usize> {
    if haystack.len() < from + needle.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}
