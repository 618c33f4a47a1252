//! Decoded frame sampling over an ffmpeg rawvideo pipe.
//!
//! Frames are decoded by ffmpeg, scaled to a fixed analysis size and streamed
//! as packed RGB24 on stdout. Reading is blocking; callers run it on the
//! blocking pool.

use std::io::{ErrorKind, Read};
use std::path::Path;
use std::process::{Child, ChildStdout, Command, Stdio};

use image::RgbImage;

use crate::command::check_ffmpeg;
use crate::error::{MediaError, MediaResult};

/// What to decode and at which size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleSpec {
    /// Keep every `stride`-th frame (1 keeps all)
    pub stride: u32,
    pub width: u32,
    pub height: u32,
}

impl SampleSpec {
    pub fn new(stride: u32, width: u32, height: u32) -> Self {
        Self {
            stride: stride.max(1),
            width,
            height,
        }
    }

    fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }

    fn filter(&self) -> String {
        let scale = format!("scale={}:{}", self.width, self.height);
        if self.stride <= 1 {
            scale
        } else {
            format!("select='not(mod(n\\,{}))',{}", self.stride, scale)
        }
    }

    fn ffmpeg_args(&self, path: &Path) -> Vec<String> {
        vec![
            "-v".to_string(),
            "error".to_string(),
            "-nostdin".to_string(),
            "-i".to_string(),
            path.to_string_lossy().to_string(),
            "-an".to_string(),
            "-vf".to_string(),
            self.filter(),
            "-vsync".to_string(),
            "vfr".to_string(),
            "-f".to_string(),
            "rawvideo".to_string(),
            "-pix_fmt".to_string(),
            "rgb24".to_string(),
            "pipe:1".to_string(),
        ]
    }
}

/// Iterator over decoded frames.
///
/// The ffmpeg child is killed and reaped when the reader is dropped.
pub struct FrameReader {
    child: Child,
    stdout: ChildStdout,
    spec: SampleSpec,
    finished: bool,
}

impl FrameReader {
    /// Start decoding `path`.
    pub fn open(path: impl AsRef<Path>, spec: SampleSpec) -> MediaResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(MediaError::FileNotFound(path.to_path_buf()));
        }
        check_ffmpeg()?;

        let mut child = Command::new("ffmpeg")
            .args(spec.ffmpeg_args(path))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::internal("ffmpeg stdout not captured"))?;

        Ok(Self {
            child,
            stdout,
            spec,
            finished: false,
        })
    }

    fn read_frame(&mut self) -> MediaResult<Option<RgbImage>> {
        let mut buf = vec![0u8; self.spec.frame_len()];
        let mut filled = 0;
        while filled < buf.len() {
            match self.stdout.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        if filled == 0 {
            let status = self.child.wait()?;
            if !status.success() {
                return Err(MediaError::ffmpeg_failed(
                    "frame decoding failed",
                    None,
                    status.code(),
                ));
            }
            return Ok(None);
        }
        if filled < buf.len() {
            return Err(MediaError::invalid_media(format!(
                "truncated frame: got {} of {} bytes",
                filled,
                buf.len()
            )));
        }

        RgbImage::from_raw(self.spec.width, self.spec.height, buf)
            .map(Some)
            .ok_or_else(|| MediaError::internal("frame buffer size mismatch"))
    }
}

impl Iterator for FrameReader {
    type Item = MediaResult<RgbImage>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.read_frame() {
            Ok(Some(frame)) => Some(Ok(frame)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

impl Drop for FrameReader {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
