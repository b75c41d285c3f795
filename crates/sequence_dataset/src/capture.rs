//! Indexing clip directories on disk: `root/<Class>/<clip>/frame_*.png`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use data_contracts::capture::CLIP_METADATA_FILE;
use data_contracts::{ClipMetadata, FallLabel, PipelineConfig};
use vision_core::prelude::{FrameSource, ImageSequenceSource};
use vision_core::source::list_frame_files;

use crate::builder::{Corpus, DatasetBuilder, LabeledSources};
use crate::types::{DatasetError, DatasetReport, DatasetResult};

#[derive(Debug, Clone)]
pub struct ClipIndex {
    pub label: FallLabel,
    pub dir: PathBuf,
    /// Frame files in temporal (file name) order.
    pub frames: Vec<PathBuf>,
    pub metadata: Option<ClipMetadata>,
}

impl ClipIndex {
    pub fn name(&self) -> String {
        self.dir
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.dir.display().to_string())
    }

    /// `(recorded, found)` when the clip's metadata records a different frame
    /// count than the directory holds.
    pub fn frame_count_mismatch(&self) -> Option<(usize, usize)> {
        let recorded = self.metadata.as_ref()?.frame_count;
        (recorded != self.frames.len()).then_some((recorded, self.frames.len()))
    }

    fn new(label: FallLabel, dir: PathBuf, frames: Vec<PathBuf>) -> Self {
        let clip = Self {
            label,
            metadata: read_clip_metadata(&dir, label),
            dir,
            frames,
        };
        if let Some((recorded, found)) = clip.frame_count_mismatch() {
            tracing::warn!(
                clip = %clip.dir.display(),
                recorded,
                found,
                "clip holds a different number of frames than its metadata records"
            );
        }
        clip
    }
}

fn read_clip_metadata(dir: &Path, label: FallLabel) -> Option<ClipMetadata> {
    let path = dir.join(CLIP_METADATA_FILE);
    if !path.exists() {
        return None;
    }
    let parsed = fs::read(&path)
        .map_err(|e| e.to_string())
        .and_then(|raw| serde_json::from_slice::<ClipMetadata>(&raw).map_err(|e| e.to_string()))
        .and_then(|meta| meta.validate().map(|_| meta).map_err(|e| e.to_string()));
    match parsed {
        Ok(meta) => {
            if meta.label != label {
                tracing::warn!(
                    clip = %dir.display(),
                    recorded = %meta.label,
                    directory = %label,
                    "clip metadata label disagrees with its class directory; using the directory"
                );
            }
            Some(meta)
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), "ignoring unreadable clip metadata: {e}");
            None
        }
    }
}

/// Index every declared class directory under `root`.
///
/// A class directory holding frames directly counts as one clip; otherwise each
/// subdirectory with at least one frame is a clip. A missing class directory
/// yields an empty clip list, which the builder reports as an empty class.
pub fn index_clip_root(
    root: &Path,
    classes: &[FallLabel],
) -> DatasetResult<BTreeMap<FallLabel, Vec<ClipIndex>>> {
    let mut out = BTreeMap::new();
    for &label in classes {
        let class_dir = root.join(label.as_str());
        let mut clips = Vec::new();
        if !class_dir.is_dir() {
            tracing::warn!(class = %label, dir = %class_dir.display(), "class directory not found");
            out.insert(label, clips);
            continue;
        }

        let direct = list_frame_files(&class_dir).map_err(|source| DatasetError::Io {
            path: class_dir.clone(),
            source,
        })?;
        if !direct.is_empty() {
            clips.push(ClipIndex::new(label, class_dir.clone(), direct));
        }

        let mut subdirs = Vec::new();
        let entries = fs::read_dir(&class_dir).map_err(|source| DatasetError::Io {
            path: class_dir.clone(),
            source,
        })?;
        for entry in entries {
            let entry = entry.map_err(|source| DatasetError::Io {
                path: class_dir.clone(),
                source,
            })?;
            let path = entry.path();
            if path.is_dir() {
                subdirs.push(path);
            }
        }
        subdirs.sort();
        for dir in subdirs {
            match list_frame_files(&dir) {
                Ok(frames) if frames.is_empty() => {
                    tracing::warn!(clip = %dir.display(), "clip directory has no frames; skipping");
                }
                Ok(frames) => clips.push(ClipIndex::new(label, dir, frames)),
                Err(e) => {
                    tracing::warn!(clip = %dir.display(), "failed to read clip directory: {e}");
                }
            }
        }
        tracing::info!(class = %label, clips = clips.len(), "indexed class directory");
        out.insert(label, clips);
    }
    Ok(out)
}

/// Turn an index into lazily-decoded frame sources.
pub fn open_sources(index: BTreeMap<FallLabel, Vec<ClipIndex>>) -> LabeledSources {
    index
        .into_iter()
        .map(|(label, clips)| {
            let sources = clips
                .into_iter()
                .map(|clip| {
                    let name = format!("{}/{}", label, clip.name());
                    Box::new(ImageSequenceSource::from_files(name, clip.frames))
                        as Box<dyn FrameSource>
                })
                .collect();
            (label, sources)
        })
        .collect()
}

/// Index `cfg.data_root`, then build the corpus.
pub fn load_corpus(cfg: &PipelineConfig) -> DatasetResult<(Corpus, DatasetReport)> {
    let index = index_clip_root(&cfg.data_root, &cfg.classes)?;
    DatasetBuilder::from_config(cfg).build(open_sources(index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn write_clip(dir: &Path, frames: usize) {
        fs::create_dir_all(dir).unwrap();
        for i in 0..frames {
            RgbImage::from_pixel(3, 3, Rgb([i as u8, 0, 0]))
                .save(dir.join(format!("frame_{i:05}.png")))
                .unwrap();
        }
    }

    #[test]
    fn indexes_subdirectory_clips_and_flat_class_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        write_clip(&tmp.path().join("Fall/clip_b"), 2);
        write_clip(&tmp.path().join("Fall/clip_a"), 3);
        fs::create_dir_all(tmp.path().join("Fall/empty")).unwrap();
        write_clip(&tmp.path().join("Normal"), 4);

        let index = index_clip_root(tmp.path(), &FallLabel::ALL).unwrap();
        let fall: Vec<(String, usize)> = index[&FallLabel::Fall]
            .iter()
            .map(|c| (c.name(), c.frames.len()))
            .collect();
        assert_eq!(
            fall,
            vec![("clip_a".to_string(), 3), ("clip_b".to_string(), 2)]
        );
        assert_eq!(index[&FallLabel::Normal].len(), 1);
        assert_eq!(index[&FallLabel::Normal][0].frames.len(), 4);
    }

    fn write_metadata(dir: &Path, label: FallLabel, frame_count: usize) {
        let meta = ClipMetadata {
            label,
            frame_count,
            frame_size: (3, 3),
            started_unix: 1_700_000_000.0,
            sequence_length: 2,
            frames: (0..frame_count).map(|i| format!("frame_{i:05}.png")).collect(),
        };
        fs::write(dir.join(CLIP_METADATA_FILE), serde_json::to_vec(&meta).unwrap()).unwrap();
    }

    #[test]
    fn metadata_frame_count_is_checked_against_the_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let intact = tmp.path().join("Fall/intact");
        let truncated = tmp.path().join("Fall/truncated");
        write_clip(&intact, 3);
        write_metadata(&intact, FallLabel::Fall, 3);
        write_clip(&truncated, 3);
        write_metadata(&truncated, FallLabel::Fall, 5);
        write_clip(&tmp.path().join("Fall/unrecorded"), 2);

        let index = index_clip_root(tmp.path(), &[FallLabel::Fall]).unwrap();
        let clips = &index[&FallLabel::Fall];
        assert_eq!(clips.len(), 3);
        assert_eq!(clips[0].name(), "intact");
        assert_eq!(clips[0].metadata.as_ref().map(|m| m.frame_count), Some(3));
        assert_eq!(clips[0].frame_count_mismatch(), None);
        assert_eq!(clips[1].name(), "truncated");
        assert_eq!(clips[1].frame_count_mismatch(), Some((5, 3)));
        assert!(clips[2].metadata.is_none());
        assert_eq!(clips[2].frame_count_mismatch(), None);
    }

    #[test]
    fn missing_class_directory_is_an_empty_class() {
        let tmp = tempfile::tempdir().unwrap();
        write_clip(&tmp.path().join("Fall/clip"), 2);
        let index = index_clip_root(tmp.path(), &FallLabel::ALL).unwrap();
        assert!(index[&FallLabel::Normal].is_empty());
    }
}
