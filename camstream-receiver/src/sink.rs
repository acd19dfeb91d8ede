//! Writes received images to disk.
//!
//! Stills become numbered files (`capture-0001.jpg`, ...) that are never
//! overwritten; numbering resumes after the highest existing file. Video
//! frames optionally replace `latest.jpg` through a temporary file so a
//! reader never sees a partial image.
//!
//! File work runs through `tokio::fs`, off the session task's thread.

use std::io;
use std::path::{Path, PathBuf};

use tokio::fs;

use camstream_core::{Message, MessageKind};

const CAPTURE_PREFIX: &str = "capture-";
const LATEST: &str = "latest.jpg";

#[derive(Debug)]
pub struct FrameSink {
    dir: PathBuf,
    save_latest: bool,
    next_capture: u32,
}

impl FrameSink {
    /// Open (and create if needed) the output directory.
    pub async fn open(dir: impl Into<PathBuf>, save_latest: bool) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        let next_capture = highest_capture(&dir)
            .await?
            .map_or(1, |n| n.saturating_add(1));
        Ok(Self {
            dir,
            save_latest,
            next_capture,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Store `message`. Returns the file written, if any.
    pub async fn accept(&mut self, message: &Message) -> io::Result<Option<PathBuf>> {
        match message.kind {
            MessageKind::CapturedImage => {
                let path = self
                    .dir
                    .join(format!("{CAPTURE_PREFIX}{:04}.jpg", self.next_capture));
                fs::write(&path, &message.payload).await?;
                self.next_capture = self.next_capture.saturating_add(1);
                Ok(Some(path))
            }
            MessageKind::VideoFrame if self.save_latest => {
                let path = self.dir.join(LATEST);
                let tmp = self.dir.join(".latest.jpg.tmp");
                fs::write(&tmp, &message.payload).await?;
                fs::rename(&tmp, &path).await?;
                Ok(Some(path))
            }
            MessageKind::VideoFrame => Ok(None),
        }
    }
}

async fn highest_capture(dir: &Path) -> io::Result<Option<u32>> {
    let mut highest = None;
    let mut entries = fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let number = name
            .to_str()
            .and_then(|n| n.strip_prefix(CAPTURE_PREFIX))
            .and_then(|n| n.strip_suffix(".jpg"))
            .and_then(|n| n.parse::<u32>().ok());
        if let Some(n) = number {
            highest = highest.max(Some(n));
        }
    }
    Ok(highest)
}
