use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use drive_core::FileInitItem;

const DEFAULT_MIME: &str = "application/octet-stream";

/// Where an item's bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadSource {
    File(PathBuf),
    Bytes(Vec<u8>),
}

/// One entry of a user selection. Folder selections carry a relative path
/// rooted at the selected folder's name; flat selections do not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionItem {
    pub source: UploadSource,
    pub name: String,
    pub relative_path: Option<String>,
    pub mime_type: Option<String>,
    pub size: u64,
}

impl SelectionItem {
    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let name = name.into();
        Self {
            size: bytes.len() as u64,
            mime_type: Some(guess_mime(&name)),
            source: UploadSource::Bytes(bytes),
            name,
            relative_path: None,
        }
    }

    pub fn with_relative_path(mut self, relative_path: impl Into<String>) -> Self {
        self.relative_path = Some(relative_path.into());
        self
    }

    /// Identity of the item inside its batch.
    pub fn path(&self) -> &str {
        self.relative_path.as_deref().unwrap_or(&self.name)
    }

    pub fn mime(&self) -> &str {
        self.mime_type.as_deref().unwrap_or(DEFAULT_MIME)
    }

    pub fn init_item(&self) -> FileInitItem {
        FileInitItem {
            file_name: self.name.clone(),
            file_type: self.mime().to_string(),
            relative_path: self.path().to_string(),
            size: self.size,
        }
    }
}

/// Builds a selection from a local file or directory. Directory entries get
/// relative paths beginning with the directory's own name, sorted so batches
/// are reproducible across resumes.
pub fn selection_from_path(root: &Path) -> io::Result<Vec<SelectionItem>> {
    let metadata = fs::metadata(root)?;
    let root_name = root
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;

    if metadata.is_file() {
        return Ok(vec![file_item(root.to_path_buf(), root_name, None, metadata.len())]);
    }

    let mut items = Vec::new();
    let mut stack = vec![(root.to_path_buf(), root_name)];
    while let Some((dir, prefix)) = stack.pop() {
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let relative = format!("{prefix}/{name}");
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                stack.push((entry.path(), relative));
            } else if file_type.is_file() {
                let size = entry.metadata()?.len();
                items.push(file_item(entry.path(), name, Some(relative), size));
            }
        }
    }
    items.sort_by(|a, b| a.path().cmp(b.path()));
    Ok(items)
}

fn file_item(path: PathBuf, name: String, relative_path: Option<String>, size: u64) -> SelectionItem {
    SelectionItem {
        mime_type: Some(guess_mime(&name)),
        source: UploadSource::File(path),
        name,
        relative_path,
        size,
    }
}

fn guess_mime(name: &str) -> String {
    mime_guess::from_path(name)
        .first_raw()
        .unwrap_or(DEFAULT_MIME)
        .to_string()
}

/// Rejects traversal segments, empty segments and absolute paths.
pub fn validate_relative_path(path: &str) -> bool {
    !path.is_empty()
        && !path.starts_with('/')
        && path
            .split('/')
            .all(|segment| !segment.is_empty() && segment != "..")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn path_defaults_to_display_name() {
        let flat = SelectionItem::from_bytes("a.txt", b"abc".to_vec());
        assert_eq!(flat.path(), "a.txt");
        assert_eq!(flat.size, 3);
        assert_eq!(flat.mime(), "text/plain");

        let nested = flat.with_relative_path("Docs/a.txt");
        assert_eq!(nested.path(), "Docs/a.txt");
    }

    #[test]
    fn unknown_extension_falls_back_to_octet_stream() {
        let item = SelectionItem::from_bytes("blob.zzzunknown", vec![]);
        assert_eq!(item.mime(), "application/octet-stream");
        let init = item.init_item();
        assert_eq!(init.file_type, "application/octet-stream");
        assert_eq!(init.relative_path, "blob.zzzunknown");
    }

    #[test]
    fn directory_selection_is_rooted_at_directory_name() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("Photos");
        std::fs::create_dir_all(root.join("2024")).unwrap();
        std::fs::write(root.join("b.jpg"), b"bb").unwrap();
        std::fs::write(root.join("2024/a.jpg"), b"a").unwrap();

        let items = selection_from_path(&root).unwrap();
        let paths: Vec<_> = items.iter().map(|item| item.path().to_string()).collect();
        assert_eq!(paths, vec!["Photos/2024/a.jpg", "Photos/b.jpg"]);
        assert_eq!(items[0].name, "a.jpg");
        assert_eq!(items[0].size, 1);
        assert_eq!(items[1].mime(), "image/jpeg");
    }

    #[test]
    fn single_file_selection_is_flat() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("notes.md");
        std::fs::write(&file, b"# hi").unwrap();

        let items = selection_from_path(&file).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].relative_path, None);
        assert_eq!(items[0].path(), "notes.md");
        assert_eq!(items[0].source, UploadSource::File(file));
    }

    #[test]
    fn validates_relative_paths() {
        assert!(validate_relative_path("a.txt"));
        assert!(validate_relative_path("Docs/sub/a.txt"));
        assert!(!validate_relative_path(""));
        assert!(!validate_relative_path("/etc/passwd"));
        assert!(!validate_relative_path("Docs/../a.txt"));
        assert!(!validate_relative_path("Docs//a.txt"));
    }
}
