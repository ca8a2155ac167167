use std::path::{Component, Path};

/// Lexical normalization of a slash-separated path: collapses repeated
/// separators, drops `.`, folds `..` into its parent. Does not touch the
/// filesystem; used for remote archive paths which only exist over there.
pub fn normalize(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for seg in path.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                if matches!(parts.last(), Some(p) if *p != "..") {
                    parts.pop();
                } else if !absolute {
                    parts.push("..");
                }
            }
            s => parts.push(s),
        }
    }
    let joined = parts.join("/");
    match (absolute, joined.is_empty()) {
        (true, _) => format!("/{joined}"),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}

/// Same as [`normalize`] for a local path, rendered with `/` separators.
pub fn normalize_path(path: &Path) -> String {
    let s: Vec<String> = path
        .components()
        .map(|c| match c {
            Component::RootDir => String::new(),
            other => other.as_os_str().to_string_lossy().into_owned(),
        })
        .collect();
    let mut joined = s.join("/");
    if path.has_root() && !joined.starts_with('/') {
        joined.insert(0, '/');
    }
    normalize(&joined)
}

/// Escape the characters the archiver would otherwise glob on.
pub fn escape_member(member: &str) -> String {
    member.replace(']', "\\]").replace('[', "\\[")
}
