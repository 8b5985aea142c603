//! Frame capture for the scanner view.
//!
//! A [`FrameSource`] stands in for the camera. Access is scoped through
//! [`CaptureSession`]: the source is acquired when the session opens and
//! released exactly once when the session ends, on every exit path
//! (release happens in `Drop`).

use base64::Engine;
use image::ImageFormat;
use std::io::Read;
use std::path::PathBuf;

use crate::error::CaptureError;

/// An encoded raster image grabbed from a frame source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedFrame {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl CapturedFrame {
    /// Wrap encoded image bytes, detecting the MIME type from the content.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, CaptureError> {
        let format = image::guess_format(&bytes)
            .map_err(|e| CaptureError::UnsupportedFormat(e.to_string()))?;
        let mime_type = match format {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
            ImageFormat::WebP => "image/webp",
            ImageFormat::Gif => "image/gif",
            ImageFormat::Bmp => "image/bmp",
            other => {
                return Err(CaptureError::UnsupportedFormat(format!("{:?}", other)));
            }
        };
        Ok(Self {
            bytes,
            mime_type: mime_type.to_string(),
        })
    }

    /// Encode as a `data:` URL, the form stored in [`crate::models::BusinessCard::image`].
    pub fn to_data_url(&self) -> String {
        encode_data_url(&self.mime_type, &self.bytes)
    }

    /// Decode a `data:<mime>;base64,<payload>` URL.
    pub fn from_data_url(url: &str) -> Option<Self> {
        let rest = url.strip_prefix("data:")?;
        let (meta, payload) = rest.split_once(',')?;
        let mime_type = meta.strip_suffix(";base64")?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .ok()?;
        Some(Self {
            bytes,
            mime_type: mime_type.to_string(),
        })
    }
}

/// Encode bytes as a base64 `data:` URL.
pub fn encode_data_url(mime_type: &str, bytes: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        mime_type,
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

/// A device (or stand-in) that produces card images.
pub trait FrameSource {
    /// Acquire the underlying device.
    fn acquire(&mut self) -> Result<(), CaptureError>;

    /// Grab one frame. Only called between `acquire` and `release`.
    fn grab(&mut self) -> Result<CapturedFrame, CaptureError>;

    /// Release the device. Must be safe to call after a failed `grab`.
    fn release(&mut self);
}

/// Scoped access to a [`FrameSource`].
pub struct CaptureSession<'a> {
    source: &'a mut dyn FrameSource,
    released: bool,
}

impl<'a> CaptureSession<'a> {
    /// Acquire `source`. On failure nothing needs releasing.
    pub fn open(source: &'a mut dyn FrameSource) -> Result<Self, CaptureError> {
        source.acquire()?;
        tracing::debug!("frame source acquired");
        Ok(Self {
            source,
            released: false,
        })
    }

    /// Grab a frame and end the session.
    pub fn capture(mut self) -> Result<CapturedFrame, CaptureError> {
        let frame = self.source.grab();
        self.release();
        frame
    }

    /// End the session without capturing.
    pub fn cancel(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.source.release();
            tracing::debug!("frame source released");
        }
    }
}

impl Drop for CaptureSession<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Reads the frame from an image file, or from stdin when the path is `-`.
pub struct FileFrameSource {
    path: PathBuf,
    handle: Option<Box<dyn Read + Send>>,
}

impl FileFrameSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            handle: None,
        }
    }

    fn is_stdin(&self) -> bool {
        self.path.as_os_str() == "-"
    }
}

impl FrameSource for FileFrameSource {
    fn acquire(&mut self) -> Result<(), CaptureError> {
        let handle: Box<dyn Read + Send> = if self.is_stdin() {
            Box::new(std::io::stdin())
        } else {
            let file = std::fs::File::open(&self.path).map_err(|source| CaptureError::Read {
                path: self.path.clone(),
                source,
            })?;
            Box::new(file)
        };
        self.handle = Some(handle);
        Ok(())
    }

    fn grab(&mut self) -> Result<CapturedFrame, CaptureError> {
        let handle = self.handle.as_mut().ok_or(CaptureError::Released)?;
        let mut bytes = Vec::new();
        handle
            .read_to_end(&mut bytes)
            .map_err(|source| CaptureError::Read {
                path: self.path.clone(),
                source,
            })?;
        if bytes.is_empty() {
            return Err(CaptureError::Unavailable(format!(
                "{} produced no data",
                self.path.display()
            )));
        }
        CapturedFrame::from_bytes(bytes)
    }

    fn release(&mut self) {
        self.handle = None;
    }
}
