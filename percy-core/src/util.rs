use std::path::Path;

/// Platform path separator as sent to the editor content.
pub fn path_separator() -> String {
    std::path::MAIN_SEPARATOR.to_string()
}

/// Application name shown by the editor for a file living in `dir`.
///
/// With `relative` set, the directory is reported relative to `project_root`
/// (the root itself becomes `"."`); directories outside the root, and the
/// default mode, report the absolute path.
pub fn app_name(dir: &Path, project_root: &Path, relative: bool) -> String {
    if relative {
        if let Ok(rel) = dir.strip_prefix(project_root) {
            if rel.as_os_str().is_empty() {
                return ".".to_string();
            }
            return rel.to_string_lossy().to_string();
        }
    }
    dir.to_string_lossy().to_string()
}
