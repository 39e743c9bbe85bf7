//! Atomic output files.
//!
//! Every file a worker produces is first written to a hidden `.partial`
//! sibling and renamed into place only once it is complete. A killed worker
//! therefore leaves either a finished file or a partial one, never a
//! truncated file under the final name.
//!
//! # Example
//!
//! ```no_run
//! use avprep_core::output::AtomicOutput;
//!
//! let out = AtomicOutput::new("video/spk1/00001.mp4")?;
//! std::fs::write(out.path(), b"...")?; // write into the partial path
//! out.promote()?; // rename to video/spk1/00001.mp4
//! # Ok::<(), std::io::Error>(())
//! ```

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::config::PathSettings;

/// Marker inserted into partial file names.
pub const PARTIAL_MARKER: &str = ".partial";

/// Where a worker puts per-clip and per-shard outputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    /// Shard-level files (counts, lists, failures).
    pub output_dir: PathBuf,
    pub video_dir: PathBuf,
    pub audio_dir: PathBuf,
    pub landmark_dir: PathBuf,
}

impl OutputLayout {
    pub fn from_settings(paths: &PathSettings) -> Self {
        Self {
            output_dir: paths.output_dir(),
            video_dir: paths.video_dir(),
            audio_dir: paths.audio_dir(),
            landmark_dir: paths.landmark_dir(),
        }
    }

    /// All outputs under one root (`root/video`, `root/audio`, ...).
    pub fn under(root: &Path) -> Self {
        Self {
            output_dir: root.to_path_buf(),
            video_dir: root.join("video"),
            audio_dir: root.join("audio"),
            landmark_dir: root.join("landmarks"),
        }
    }

    /// Cropped video of a clip: `<video_dir>/<id>.mp4`.
    pub fn video_path(&self, clip_id: &str) -> PathBuf {
        self.video_dir.join(format!("{}.mp4", clip_id))
    }

    /// Trimmed audio of a clip: `<audio_dir>/<id>.wav`.
    pub fn audio_path(&self, clip_id: &str) -> PathBuf {
        self.audio_dir.join(format!("{}.wav", clip_id))
    }

    /// Cached landmarks of a clip: `<landmark_dir>/<id>.txt`.
    pub fn landmark_path(&self, clip_id: &str) -> PathBuf {
        self.landmark_dir.join(format!("{}.txt", clip_id))
    }

    /// Shard-level file in the output directory.
    pub fn shard_file(&self, name: &str) -> PathBuf {
        self.output_dir.join(name)
    }

    /// Whether both final media outputs of a clip exist.
    pub fn is_complete(&self, clip_id: &str) -> bool {
        self.video_path(clip_id).is_file() && self.audio_path(clip_id).is_file()
    }

    /// Remove the finished video and audio of a clip, if present.
    pub fn remove_outputs(&self, clip_id: &str) -> io::Result<usize> {
        let mut removed = 0;
        for path in [self.video_path(clip_id), self.audio_path(clip_id)] {
            if remove_if_exists(&path)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Remove partial files from every per-clip directory.
    pub fn sweep_partials(&self) -> io::Result<usize> {
        let mut removed = 0;
        for dir in [&self.video_dir, &self.audio_dir, &self.landmark_dir] {
            removed += sweep_partials(dir)?;
        }
        Ok(removed)
    }
}

/// Scoped temporary output that is promoted to its final path on success.
///
/// Dropping an unpromoted output removes the partial file.
#[derive(Debug)]
pub struct AtomicOutput {
    final_path: PathBuf,
    partial_path: PathBuf,
    promoted: bool,
}

impl AtomicOutput {
    /// Reserve a partial path for `final_path`.
    ///
    /// Creates the parent directory and removes a stale partial file left by
    /// an earlier, interrupted run.
    pub fn new(final_path: impl Into<PathBuf>) -> io::Result<Self> {
        let final_path = final_path.into();
        if let Some(parent) = final_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let partial_path = partial_path_for(&final_path);
        if partial_path.exists() {
            fs::remove_file(&partial_path)?;
        }

        Ok(Self {
            final_path,
            partial_path,
            promoted: false,
        })
    }

    /// Path to write into.
    pub fn path(&self) -> &Path {
        &self.partial_path
    }

    /// Path the output is promoted to.
    pub fn final_path(&self) -> &Path {
        &self.final_path
    }

    /// Whether something has been written to the partial path.
    pub fn is_written(&self) -> bool {
        self.partial_path.is_file()
    }

    /// Rename the partial file to its final path.
    pub fn promote(mut self) -> io::Result<PathBuf> {
        if !self.partial_path.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("nothing was written to {}", self.partial_path.display()),
            ));
        }
        fs::rename(&self.partial_path, &self.final_path)?;
        self.promoted = true;
        Ok(self.final_path.clone())
    }
}

impl Drop for AtomicOutput {
    fn drop(&mut self) {
        if !self.promoted && self.partial_path.exists() {
            let _ = fs::remove_file(&self.partial_path);
        }
    }
}

/// Promote several outputs as one unit.
///
/// If any promotion fails, the outputs already moved into place are removed
/// again and the remaining partials are dropped.
pub fn promote_all(outputs: Vec<AtomicOutput>) -> io::Result<Vec<PathBuf>> {
    let mut promoted = Vec::with_capacity(outputs.len());
    for out in outputs {
        match out.promote() {
            Ok(path) => promoted.push(path),
            Err(e) => {
                for path in &promoted {
                    let _ = remove_if_exists(path);
                }
                return Err(e);
            }
        }
    }
    Ok(promoted)
}

fn remove_if_exists(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Partial sibling of `final_path`: `dir/.name.partial.ext`.
///
/// The extension is kept last so tools that pick a container from the file
/// name (ffmpeg) still do so.
pub fn partial_path_for(final_path: &Path) -> PathBuf {
    let stem = final_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match final_path.extension() {
        Some(ext) => format!(".{}{}.{}", stem, PARTIAL_MARKER, ext.to_string_lossy()),
        None => format!(".{}{}", stem, PARTIAL_MARKER),
    };
    final_path.with_file_name(name)
}

/// Whether a path names a partial file.
pub fn is_partial(path: &Path) -> bool {
    path.file_name()
        .map(|n| {
            let name = n.to_string_lossy();
            name.starts_with('.') && name.contains(PARTIAL_MARKER)
        })
        .unwrap_or(false)
}

/// Write `content` to `path` atomically.
pub fn write_atomic(path: &Path, content: &[u8]) -> io::Result<()> {
    let out = AtomicOutput::new(path)?;
    {
        let mut file = fs::File::create(out.path())?;
        file.write_all(content)?;
        file.sync_all()?; // Ensure data is flushed to disk
    }
    out.promote()?;
    Ok(())
}

/// Write one line per item to `path` atomically.
///
/// An empty iterator produces an empty file.
pub fn write_lines_atomic<I, S>(path: &Path, lines: I) -> io::Result<()>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut content = String::new();
    for line in lines {
        content.push_str(line.as_ref());
        content.push('\n');
    }
    write_atomic(path, content.as_bytes())
}

/// Remove partial files under `dir`, recursively.
///
/// Returns the number of files removed. A missing directory is not an error.
pub fn sweep_partials(dir: &Path) -> io::Result<usize> {
    if !dir.is_dir() {
        return Ok(0);
    }

    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            removed += sweep_partials(&path)?;
        } else if is_partial(&path) {
            fs::remove_file(&path)?;
            removed += 1;
        }
    }

    if removed > 0 {
        tracing::debug!("[Output] Removed {} partial files under {}", removed, dir.display());
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn layout_paths_keep_nested_ids() {
        let layout = OutputLayout::under(Path::new("/out"));
        assert_eq!(
            layout.video_path("spk1/00001"),
            PathBuf::from("/out/video/spk1/00001.mp4")
        );
        assert_eq!(
            layout.audio_path("spk1/00001"),
            PathBuf::from("/out/audio/spk1/00001.wav")
        );
        assert_eq!(layout.shard_file("nframes.video.0"), PathBuf::from("/out/nframes.video.0"));
    }

    #[test]
    fn partial_path_keeps_extension() {
        let partial = partial_path_for(Path::new("/out/spk1/00001.mp4"));
        assert_eq!(partial, PathBuf::from("/out/spk1/.00001.partial.mp4"));
        assert!(is_partial(&partial));
        assert!(!is_partial(Path::new("/out/spk1/00001.mp4")));
    }

    #[test]
    fn promote_moves_file_into_place() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("nested").join("clip.wav");

        let out = AtomicOutput::new(&target).unwrap();
        fs::write(out.path(), b"data").unwrap();
        assert!(!target.exists());

        let promoted = out.promote().unwrap();
        assert_eq!(promoted, target);
        assert_eq!(fs::read(&target).unwrap(), b"data");
        assert!(!partial_path_for(&target).exists());
    }

    #[test]
    fn drop_without_promote_cleans_up() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("clip.mp4");

        {
            let out = AtomicOutput::new(&target).unwrap();
            fs::write(out.path(), b"half a video").unwrap();
            assert!(out.is_written());
        }

        assert!(!target.exists());
        assert!(!partial_path_for(&target).exists());
    }

    #[test]
    fn promote_without_content_fails() {
        let dir = tempdir().unwrap();
        let out = AtomicOutput::new(dir.path().join("empty.mp4")).unwrap();
        assert!(out.promote().is_err());
    }

    #[test]
    fn promote_all_is_all_or_nothing() {
        let dir = tempdir().unwrap();
        let video = dir.path().join("clip.mp4");
        let audio = dir.path().join("clip.wav");

        let first = AtomicOutput::new(&video).unwrap();
        fs::write(first.path(), b"video").unwrap();
        let second = AtomicOutput::new(&audio).unwrap();
        assert!(promote_all(vec![first, second]).is_err());
        assert!(!video.exists());
        assert!(!partial_path_for(&video).exists());

        let first = AtomicOutput::new(&video).unwrap();
        fs::write(first.path(), b"video").unwrap();
        let second = AtomicOutput::new(&audio).unwrap();
        fs::write(second.path(), b"audio").unwrap();
        assert_eq!(promote_all(vec![first, second]).unwrap(), vec![video.clone(), audio.clone()]);
        assert!(video.is_file() && audio.is_file());
    }

    #[test]
    fn remove_outputs_ignores_missing_files() {
        let dir = tempdir().unwrap();
        let layout = OutputLayout::under(dir.path());
        fs::create_dir_all(&layout.video_dir).unwrap();
        fs::write(layout.video_path("c1"), b"video").unwrap();

        assert_eq!(layout.remove_outputs("c1").unwrap(), 1);
        assert!(!layout.video_path("c1").exists());
        assert_eq!(layout.remove_outputs("c1").unwrap(), 0);
    }

    #[test]
    fn sweep_removes_only_partials() {
        let dir = tempdir().unwrap();
        let sub = dir.path().join("spk1");
        fs::create_dir_all(&sub).unwrap();
        fs::write(sub.join("00001.mp4"), b"done").unwrap();
        fs::write(sub.join(".00002.partial.mp4"), b"half").unwrap();

        assert_eq!(sweep_partials(dir.path()).unwrap(), 1);
        assert!(sub.join("00001.mp4").exists());
        assert!(!sub.join(".00002.partial.mp4").exists());
    }

    #[test]
    fn write_lines_atomic_writes_trailing_newlines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nframes.video.0");
        write_lines_atomic(&path, ["10", "20"]).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "10\n20\n");

        write_lines_atomic(&path, Vec::<String>::new()).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "");
    }
}
