use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;

const TEMPLATE_EXTENSION: &str = ".pptx";
const LOCK_FILE_PREFIX: &str = "~$";

/// Recursively collect template decks under `root`, or under `root/customer`
/// when a customer folder is given. A missing directory yields an empty list.
pub fn find_templates(root: &Path, customer: Option<&str>) -> Vec<PathBuf> {
    let base = match customer {
        Some(name) => root.join(name),
        None => root.to_path_buf(),
    };
    if !base.is_dir() {
        return Vec::new();
    }

    WalkDir::new(&base)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .is_some_and(is_template_file_name)
        })
        .map(|entry| entry.into_path())
        .collect()
}

fn is_template_file_name(name: &str) -> bool {
    name.to_lowercase().ends_with(TEMPLATE_EXTENSION) && !name.starts_with(LOCK_FILE_PREFIX)
}

/// The customer folder a template belongs to: the path component directly
/// under the template root.
pub fn customer_segment(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    match relative.components().next()? {
        Component::Normal(segment) => Some(segment.to_string_lossy().into_owned()),
        _ => None,
    }
}

/// Where a template's finished copy goes: the same position relative to the
/// template root, mirrored under the output root.
pub fn mirrored_output_path(root: &Path, out_root: &Path, path: &Path) -> Option<PathBuf> {
    let relative = path.strip_prefix(root).ok()?;
    Some(out_root.join(relative))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_on_extension_and_lock_prefix() {
        assert!(is_template_file_name("report.pptx"));
        assert!(is_template_file_name("REPORT.PPTX"));
        assert!(!is_template_file_name("~$report.pptx"));
        assert!(!is_template_file_name("report.docx"));
        assert!(!is_template_file_name("notes.txt"));
    }

    #[test]
    fn walks_customer_subfolders() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("kpmo/nested")).unwrap();
        std::fs::create_dir_all(root.join("GIT")).unwrap();
        std::fs::write(root.join("kpmo/july.pptx"), b"x").unwrap();
        std::fs::write(root.join("kpmo/nested/august.PPTX"), b"x").unwrap();
        std::fs::write(root.join("kpmo/~$july.pptx"), b"x").unwrap();
        std::fs::write(root.join("GIT/july.pptx"), b"x").unwrap();
        std::fs::write(root.join("GIT/readme.md"), b"x").unwrap();

        let mut all = find_templates(root, None);
        all.sort();
        assert_eq!(all.len(), 3);

        let scoped = find_templates(root, Some("GIT"));
        assert_eq!(scoped.len(), 1);
        assert!(scoped[0].ends_with("GIT/july.pptx"));
    }

    #[test]
    fn missing_directory_is_empty_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(find_templates(&dir.path().join("nope"), None).is_empty());
        assert!(find_templates(dir.path(), Some("nope")).is_empty());
    }

    #[test]
    fn customer_is_first_segment_under_root() {
        let root = Path::new("/reports/in");
        let path = Path::new("/reports/in/kpmo/2026/july.pptx");
        assert_eq!(customer_segment(root, path).as_deref(), Some("kpmo"));

        let flat = Path::new("/reports/in/loose.pptx");
        assert_eq!(customer_segment(root, flat).as_deref(), Some("loose.pptx"));

        let outside = Path::new("/elsewhere/july.pptx");
        assert_eq!(customer_segment(root, outside), None);
    }

    #[test]
    fn output_path_mirrors_relative_position() {
        let root = Path::new("/reports/in");
        let out = Path::new("/reports/out");
        let path = Path::new("/reports/in/kpmo/2026/july.pptx");
        assert_eq!(
            mirrored_output_path(root, out, path),
            Some(PathBuf::from("/reports/out/kpmo/2026/july.pptx"))
        );
    }
}
