use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use image::RgbImage;

use crate::interfaces::{FrameSource, RawFrame};

/// File extensions recognized as frames of a clip directory.
pub const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

/// Nominal timestamp spacing for file-backed clips (the recorder writes at ~30 fps).
const FILE_FRAME_INTERVAL_S: f64 = 1.0 / 30.0;

pub fn is_frame_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.iter().any(|ext| e.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

/// Frame files directly inside `dir`, sorted by file name.
pub fn list_frame_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && is_frame_file(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// A clip stored as a directory of image frames. Frames are decoded lazily by the
/// normalizer, so an unreadable file only costs that one frame.
#[derive(Debug, Clone)]
pub struct ImageSequenceSource {
    name: String,
    files: VecDeque<PathBuf>,
    next_id: u64,
}

impl ImageSequenceSource {
    pub fn open(dir: &Path) -> io::Result<Self> {
        let files = list_frame_files(dir)?;
        let name = dir
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| dir.display().to_string());
        tracing::debug!(dir = %dir.display(), frames = files.len(), "opened image sequence");
        Ok(Self::from_files(name, files))
    }

    pub fn from_files(name: impl Into<String>, files: Vec<PathBuf>) -> Self {
        Self {
            name: name.into(),
            files: files.into(),
            next_id: 0,
        }
    }

    pub fn remaining(&self) -> usize {
        self.files.len()
    }
}

impl FrameSource for ImageSequenceSource {
    fn next_frame(&mut self) -> Option<RawFrame> {
        let path = self.files.pop_front()?;
        let id = self.next_id;
        self.next_id += 1;
        Some(RawFrame::from_path(id, id as f64 * FILE_FRAME_INTERVAL_S, path))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// In-memory clip, mostly for tests and synthetic data.
#[derive(Debug, Clone)]
pub struct MemorySource {
    name: String,
    frames: VecDeque<RawFrame>,
}

impl MemorySource {
    pub fn new(name: impl Into<String>, images: Vec<RgbImage>) -> Self {
        let frames = images
            .into_iter()
            .enumerate()
            .map(|(i, img)| RawFrame::from_rgb(i as u64, i as f64 * FILE_FRAME_INTERVAL_S, img))
            .collect();
        Self {
            name: name.into(),
            frames,
        }
    }

    pub fn from_raw(name: impl Into<String>, frames: Vec<RawFrame>) -> Self {
        Self {
            name: name.into(),
            frames: frames.into(),
        }
    }
}

impl FrameSource for MemorySource {
    fn next_frame(&mut self) -> Option<RawFrame> {
        self.frames.pop_front()
    }

    fn name(&self) -> &str {
        &self.name
    }
}
