//! Per-shard clip id and label lists.
//!
//! After merging, line `i` of `file.list`, `label.list`, `nframes.audio`
//! and `nframes.video` all describe the same clip.

use std::path::Path;

use super::ManifestError;
use crate::models::ClipRecord;
use crate::output::write_lines_atomic;
use crate::shard::ShardSpec;

/// Base name of the clip id list.
pub const FILE_LIST: &str = "file.list";
/// Base name of the transcript list.
pub const LABEL_LIST: &str = "label.list";

/// Write `file.list.<rank>` and `label.list.<rank>` for `clips`.
///
/// Clips without a transcript get an empty label line.
pub fn write_shard_lists(
    dir: &Path,
    spec: &ShardSpec,
    clips: &[&ClipRecord],
) -> Result<(), ManifestError> {
    let files = dir.join(spec.suffixed(FILE_LIST));
    write_lines_atomic(&files, clips.iter().map(|c| c.id.as_str()))
        .map_err(|e| ManifestError::io(&files, e))?;

    let labels = dir.join(spec.suffixed(LABEL_LIST));
    write_lines_atomic(
        &labels,
        clips.iter().map(|c| c.transcript.as_deref().unwrap_or("")),
    )
    .map_err(|e| ManifestError::io(&labels, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn lists_pair_line_by_line() {
        let dir = tempdir().unwrap();
        let spec = ShardSpec::new(1, 2).unwrap();
        let a = ClipRecord::new("a", "a.mp4").with_transcript("HELLO");
        let b = ClipRecord::new("b", "b.mp4");

        write_shard_lists(dir.path(), &spec, &[&a, &b]).unwrap();
        assert_eq!(fs::read_to_string(dir.path().join("file.list.1")).unwrap(), "a\nb\n");
        assert_eq!(fs::read_to_string(dir.path().join("label.list.1")).unwrap(), "HELLO\n\n");
    }
}
