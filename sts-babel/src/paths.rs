use pathdiff::diff_paths;
use std::path::Path;

/// Express `path` relative to `base` with forward slashes, the way resource
/// directories are recorded in a tree header. Paths that cannot be made
/// relative are kept as given.
pub(crate) fn relative_resource_dir(path: &Path, base: Option<&Path>) -> String {
    let candidate = match base {
        Some(base) => diff_paths(path, base).unwrap_or_else(|| path.to_path_buf()),
        None => path.to_path_buf(),
    };

    let converted = candidate.to_string_lossy().replace('\\', "/");
    if converted.is_empty() {
        return ".".to_string();
    }
    if converted.starts_with("./")
        || converted.starts_with("../")
        || converted.starts_with('/')
        || converted.contains(':')
        || converted == "."
        || converted == ".."
    {
        converted
    } else {
        format!("./{converted}")
    }
}
