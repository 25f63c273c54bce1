//! Output bundles and the processed-folder checkpoint.
//!
//! Every folder is assembled in `<output>/.staging/<folder>`; the staging
//! directory is wiped when a folder starts, so a run that died halfway leaves
//! nothing that a later run would trip over. Only a complete bundle is renamed
//! to its title-derived name.
//!
//! Each bundle carries a `.source` marker with a fingerprint of the folder it
//! came from. Publishing replaces any bundle with the same fingerprint, which
//! is what a run that died between publishing and relocating leaves behind.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

/// File holding the rewritten body inside a bundle.
pub const BODY_FILE: &str = "正文.md";
/// File holding the generated title inside a bundle.
pub const TITLE_FILE: &str = "标题.txt";

const STAGING_DIR: &str = ".staging";
const SOURCE_MARKER: &str = ".source";
const MAX_TITLE_CHARS: usize = 100;
const TRIM_PUNCTUATION: &str =
    "《》\u{201c}\u{201d}\u{2018}\u{2019}「」【】()（）[]［］<>，。！？；：、,.\"'!?;:~`*#";
const INVALID_CHARS: &str = "<>:\"/\\|?*";

/// Turn a generated title into a usable directory name.
pub fn safe_title(title: &str) -> String {
    let trimmed = title
        .trim()
        .trim_matches(|c: char| c.is_whitespace() || TRIM_PUNCTUATION.contains(c));
    let cleaned: String = trimmed
        .chars()
        .filter(|c| !INVALID_CHARS.contains(*c) && !c.is_control())
        .take(MAX_TITLE_CHARS)
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        "untitled".to_string()
    } else {
        cleaned.to_string()
    }
}

/// First of `path`, `stem_1.ext`, `stem_2.ext`, ... that does not exist yet.
pub fn unique_path(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }
    let parent = path.parent().unwrap_or_else(|| Path::new(""));
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path.extension().map(|e| e.to_string_lossy().into_owned());

    (1u32..)
        .map(|n| match &ext {
            Some(ext) if !path.is_dir() => parent.join(format!("{stem}_{n}.{ext}")),
            _ => parent.join(format!(
                "{}_{n}",
                path.file_name().map(|s| s.to_string_lossy()).unwrap_or_default()
            )),
        })
        .find(|candidate| !candidate.exists())
        .unwrap_or_else(|| path.to_path_buf())
}

/// Writes result bundles under the output root.
#[derive(Debug, Clone)]
pub struct BundleWriter {
    output_root: PathBuf,
}

impl BundleWriter {
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
        }
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Create the output root and the staging area.
    pub fn ensure_root(&self) -> io::Result<()> {
        fs::create_dir_all(self.output_root.join(STAGING_DIR))
    }

    /// Fresh, empty staging directory for `folder`.
    pub fn prepare_staging(&self, folder: &str) -> io::Result<PathBuf> {
        let staging = self.staging_path(folder);
        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }
        fs::create_dir_all(&staging)?;
        Ok(staging)
    }

    pub fn discard_staging(&self, folder: &str) {
        let staging = self.staging_path(folder);
        if staging.exists() {
            if let Err(e) = fs::remove_dir_all(&staging) {
                tracing::warn!(path = %staging.display(), error = %e, "could not remove staging directory");
            }
        }
    }

    fn staging_path(&self, folder: &str) -> PathBuf {
        self.output_root.join(STAGING_DIR).join(folder)
    }

    /// Write body, title and source marker into `staging`, then publish it
    /// under the title.
    pub fn finalize(
        &self,
        staging: &Path,
        fingerprint: &str,
        title: &str,
        body: &str,
    ) -> io::Result<PathBuf> {
        fs::write(staging.join(BODY_FILE), body)?;
        fs::write(staging.join(TITLE_FILE), title)?;
        fs::write(staging.join(SOURCE_MARKER), fingerprint)?;

        self.remove_bundles_from(fingerprint)?;
        let target = unique_path(&self.output_root.join(safe_title(title)));
        fs::rename(staging, &target)?;
        Ok(target)
    }

    /// Delete published bundles whose marker matches `fingerprint`.
    fn remove_bundles_from(&self, fingerprint: &str) -> io::Result<()> {
        for entry in fs::read_dir(&self.output_root)? {
            let entry = entry?;
            if entry.file_name().to_string_lossy().starts_with('.') || !entry.file_type()?.is_dir() {
                continue;
            }
            let marker = entry.path().join(SOURCE_MARKER);
            match fs::read_to_string(&marker) {
                Ok(existing) if existing == fingerprint => {
                    tracing::info!(bundle = %entry.path().display(), "replacing bundle from an interrupted run");
                    fs::remove_dir_all(entry.path())?;
                }
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

/// Identity of a source folder: its name plus name, size and mtime of every
/// direct entry. A folder re-created later under the same name differs.
pub fn source_fingerprint(source: &Path) -> io::Result<String> {
    let mut lines = Vec::new();
    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let meta = entry.metadata()?;
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        lines.push(format!(
            "{}\t{}\t{}",
            entry.file_name().to_string_lossy(),
            meta.len(),
            mtime
        ));
    }
    lines.sort();

    let name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(format!("{name}\n{}", lines.join("\n")))
}

/// Move `source` into `processed_root`, suffixing on name collisions.
pub fn relocate(source: &Path, processed_root: &Path) -> io::Result<PathBuf> {
    fs::create_dir_all(processed_root)?;
    let name = source
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "source has no name"))?;
    let target = unique_path(&processed_root.join(name));

    match fs::rename(source, &target) {
        Ok(()) => Ok(target),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            move_across_devices(source, &target)?;
            Ok(target)
        }
        Err(e) => Err(e),
    }
}

/// Copy into a hidden sibling of `target`, publish it with a rename once
/// complete, then drop the source.
///
/// A failed copy leaves neither a partial `target` nor the temp directory.
fn move_across_devices(source: &Path, target: &Path) -> io::Result<()> {
    let parent = target.parent().unwrap_or_else(|| Path::new(""));
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let partial = parent.join(format!(".{name}.partial"));
    if partial.exists() {
        fs::remove_dir_all(&partial)?;
    }

    if let Err(e) = copy_dir(source, &partial).and_then(|()| fs::rename(&partial, target)) {
        if let Err(cleanup) = fs::remove_dir_all(&partial) {
            tracing::warn!(path = %partial.display(), error = %cleanup, "could not remove partial copy");
        }
        return Err(e);
    }

    // The processed copy is complete; leftovers in the input are only reported.
    if let Err(e) = fs::remove_dir_all(source) {
        tracing::warn!(
            source = %source.display(),
            target = %target.display(),
            error = %e,
            "folder copied but source could not be fully removed"
        );
    }
    Ok(())
}

fn copy_dir(from: &Path, to: &Path) -> io::Result<()> {
    fs::create_dir_all(to)?;
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let dest = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir(&entry.path(), &dest)?;
        } else {
            fs::copy(entry.path(), &dest)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_title_strips_punctuation_and_invalid_chars() {
        assert_eq!(safe_title("  《春日:野餐/指南》！ "), "春日野餐指南");
        assert_eq!(safe_title("\"Hello | World?\""), "Hello  World");
        assert_eq!(safe_title("【】"), "untitled");
        assert_eq!(safe_title("line\nbreak"), "linebreak");
    }

    #[test]
    fn safe_title_caps_length_in_chars() {
        let long = "标".repeat(150);
        assert_eq!(safe_title(&long).chars().count(), 100);
    }

    #[test]
    fn unique_path_suffixes_dirs_and_files() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("Title");
        assert_eq!(unique_path(&base), base);

        fs::create_dir(&base).unwrap();
        assert_eq!(unique_path(&base), dir.path().join("Title_1"));
        fs::create_dir(dir.path().join("Title_1")).unwrap();
        assert_eq!(unique_path(&base), dir.path().join("Title_2"));

        let file = dir.path().join("a.jpg");
        fs::write(&file, b"x").unwrap();
        assert_eq!(unique_path(&file), dir.path().join("a_1.jpg"));
    }

    #[test]
    fn dotted_directory_names_keep_their_full_name() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("v1.2 notes");
        fs::create_dir(&base).unwrap();
        assert_eq!(unique_path(&base), dir.path().join("v1.2 notes_1"));
    }

    #[test]
    fn staging_is_wiped_and_finalized_under_title() {
        let dir = tempfile::tempdir().unwrap();
        let writer = BundleWriter::new(dir.path().join("out"));
        writer.ensure_root().unwrap();

        let staging = writer.prepare_staging("Alpha").unwrap();
        fs::write(staging.join("leftover.jpg"), b"old").unwrap();
        let staging = writer.prepare_staging("Alpha").unwrap();
        assert_eq!(fs::read_dir(&staging).unwrap().count(), 0);

        fs::write(staging.join("img.jpg"), b"new").unwrap();
        let bundle = writer
            .finalize(&staging, "Alpha", "《好标题》", "body text")
            .unwrap();

        assert_eq!(bundle, dir.path().join("out").join("好标题"));
        assert_eq!(fs::read_to_string(bundle.join(BODY_FILE)).unwrap(), "body text");
        assert_eq!(fs::read_to_string(bundle.join(TITLE_FILE)).unwrap(), "《好标题》");
        assert!(bundle.join("img.jpg").exists());
        assert!(!staging.exists());
    }

    #[test]
    fn same_source_replaces_its_old_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let writer = BundleWriter::new(dir.path().join("out"));
        writer.ensure_root().unwrap();

        let first = writer.prepare_staging("Alpha").unwrap();
        let first = writer.finalize(&first, "fp-alpha", "Title", "v1").unwrap();
        let other = writer.prepare_staging("Beta").unwrap();
        let other = writer.finalize(&other, "fp-beta", "Title", "b").unwrap();
        assert_eq!(other, dir.path().join("out").join("Title_1"));

        let again = writer.prepare_staging("Alpha").unwrap();
        let again = writer.finalize(&again, "fp-alpha", "Title", "v2").unwrap();

        assert_eq!(again, first);
        assert_eq!(fs::read_to_string(again.join(BODY_FILE)).unwrap(), "v2");
        assert_eq!(fs::read_to_string(other.join(BODY_FILE)).unwrap(), "b");
        let names: Vec<_> = fs::read_dir(dir.path().join("out"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| !n.starts_with('.'))
            .collect();
        assert_eq!(names.len(), 2);
    }

    #[test]
    fn fingerprint_tracks_folder_contents() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("Alpha");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("a.jpg"), b"1").unwrap();

        let before = source_fingerprint(&src).unwrap();
        assert!(before.starts_with("Alpha\na.jpg\t1\t"));
        assert_eq!(source_fingerprint(&src).unwrap(), before);

        let moved = dir.path().join("elsewhere").join("Alpha");
        fs::create_dir_all(moved.parent().unwrap()).unwrap();
        fs::rename(&src, &moved).unwrap();
        assert_eq!(source_fingerprint(&moved).unwrap(), before);

        fs::write(moved.join("b.jpg"), b"22").unwrap();
        assert_ne!(source_fingerprint(&moved).unwrap(), before);
    }

    #[test]
    fn relocate_moves_and_avoids_collisions() {
        let dir = tempfile::tempdir().unwrap();
        let processed = dir.path().join("done");

        let first = dir.path().join("in").join("Alpha");
        fs::create_dir_all(&first).unwrap();
        fs::write(first.join("a.jpg"), b"x").unwrap();
        let moved = relocate(&first, &processed).unwrap();
        assert_eq!(moved, processed.join("Alpha"));
        assert!(!first.exists());
        assert!(moved.join("a.jpg").exists());

        fs::create_dir_all(&first).unwrap();
        let moved = relocate(&first, &processed).unwrap();
        assert_eq!(moved, processed.join("Alpha_1"));
    }

    #[test]
    fn cross_device_move_publishes_complete_copy() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("Alpha");
        fs::create_dir_all(src.join("nested")).unwrap();
        fs::write(src.join("nested").join("a.jpg"), b"1").unwrap();
        let processed = dir.path().join("done");
        fs::create_dir_all(&processed).unwrap();

        move_across_devices(&src, &processed.join("Alpha")).unwrap();
        assert!(!src.exists());
        assert_eq!(fs::read(processed.join("Alpha/nested/a.jpg")).unwrap(), b"1");
        assert_eq!(fs::read_dir(&processed).unwrap().count(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn failed_cross_device_copy_leaves_no_processed_entry() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("Alpha");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("a.jpg"), b"1").unwrap();
        // Dangling link: copying it fails whatever the privileges.
        std::os::unix::fs::symlink(dir.path().join("missing"), src.join("z.jpg")).unwrap();
        let processed = dir.path().join("done");
        fs::create_dir_all(&processed).unwrap();

        assert!(move_across_devices(&src, &processed.join("Alpha")).is_err());
        assert_eq!(fs::read_dir(&processed).unwrap().count(), 0);
        assert!(src.join("a.jpg").exists());

        // A later attempt reuses the plain name.
        fs::remove_file(src.join("z.jpg")).unwrap();
        move_across_devices(&src, &processed.join("Alpha")).unwrap();
        assert!(processed.join("Alpha/a.jpg").exists());
    }

    #[test]
    fn copy_dir_copies_nested_tree() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(src.join("nested")).unwrap();
        fs::write(src.join("top.txt"), b"1").unwrap();
        fs::write(src.join("nested").join("deep.txt"), b"2").unwrap();

        let dst = dir.path().join("dst");
        copy_dir(&src, &dst).unwrap();
        assert_eq!(fs::read(dst.join("nested").join("deep.txt")).unwrap(), b"2");
    }
}
