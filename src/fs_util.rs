use crate::error::{SwitchError, SwitchResult};
use std::fs;
use std::io::{ErrorKind, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

pub fn write_file_atomic(path: &Path, data: &[u8]) -> SwitchResult<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|err| SwitchError::io("failed to create dir", parent, err))?;

    let mut temp_file = NamedTempFile::new_in(parent)
        .map_err(|err| SwitchError::io("failed to create temp file in", parent, err))?;
    temp_file
        .as_file()
        .set_permissions(fs::Permissions::from_mode(0o600))
        .map_err(|err| SwitchError::io("failed to restrict permissions on temp file in", parent, err))?;
    temp_file
        .write_all(data)
        .map_err(|err| SwitchError::io("failed to write temp file in", parent, err))?;

    temp_file
        .persist(path)
        .map_err(|err| SwitchError::io("failed to persist", path, err.error))?;
    Ok(())
}

pub fn read_optional(path: &Path) -> SwitchResult<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(data) => Ok(Some(data)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(SwitchError::io("failed to read", path, err)),
    }
}

/// The file a write to `path` should land in: symlinks are followed, so a
/// dotfile-managed link keeps pointing at its target.
pub fn resolve_write_target(path: &Path) -> SwitchResult<PathBuf> {
    let is_link = fs::symlink_metadata(path)
        .map(|metadata| metadata.file_type().is_symlink())
        .unwrap_or(false);
    if !is_link {
        return Ok(path.to_path_buf());
    }

    match fs::canonicalize(path) {
        Ok(target) => Ok(target),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            let link = fs::read_link(path).map_err(|err| SwitchError::io("failed to read link", path, err))?;
            Ok(match path.parent() {
                Some(parent) => parent.join(link),
                None => link,
            })
        }
        Err(err) => Err(SwitchError::io("failed to resolve", path, err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn atomic_write_creates_parents_and_restricts_mode() {
        let temp = TempDir::new().expect("temp dir");
        let path = temp.path().join("nested/dir/file.json");
        write_file_atomic(&path, b"{}").expect("write");

        assert_eq!(fs::read(&path).expect("read"), b"{}");
        let mode = fs::metadata(&path).expect("metadata").permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn atomic_write_replaces_existing_content() {
        let temp = TempDir::new().expect("temp dir");
        let path = temp.path().join("file.json");
        write_file_atomic(&path, b"first").expect("first write");
        write_file_atomic(&path, b"second").expect("second write");
        assert_eq!(fs::read_to_string(&path).expect("read"), "second");
    }

    #[test]
    fn read_optional_maps_missing_file_to_none() {
        let temp = TempDir::new().expect("temp dir");
        let missing = temp.path().join("absent.json");
        assert!(read_optional(&missing).expect("read").is_none());

        fs::write(&missing, b"data").expect("seed");
        assert_eq!(read_optional(&missing).expect("read"), Some(b"data".to_vec()));
    }

    #[test]
    fn write_target_follows_symlinks() {
        let temp = TempDir::new().expect("temp dir");
        let plain = temp.path().join("plain.json");
        assert_eq!(resolve_write_target(&plain).expect("plain"), plain);

        let dotfiles = temp.path().join("dotfiles");
        fs::create_dir_all(&dotfiles).expect("mkdir");
        let target = dotfiles.join("claude.json");
        fs::write(&target, b"{}").expect("seed");
        let link = temp.path().join(".claude.json");
        std::os::unix::fs::symlink(&target, &link).expect("symlink");
        assert_eq!(
            resolve_write_target(&link).expect("link"),
            fs::canonicalize(&target).expect("canonical")
        );

        let dangling = temp.path().join("dangling.json");
        std::os::unix::fs::symlink("missing/target.json", &dangling).expect("symlink");
        assert_eq!(
            resolve_write_target(&dangling).expect("dangling"),
            temp.path().join("missing/target.json")
        );
    }

    #[test]
    fn symlink_loop_is_an_io_error() {
        let temp = TempDir::new().expect("temp dir");
        let looped = temp.path().join("loop.json");
        std::os::unix::fs::symlink(&looped, &looped).expect("symlink");
        assert!(matches!(
            resolve_write_target(&looped),
            Err(SwitchError::Io { .. })
        ));
    }
}
