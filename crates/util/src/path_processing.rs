use std::{env, path::PathBuf};

use dirs_next::home_dir;

/// Expands a leading `~` to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    let p = path.trim();
    if p == "~" {
        return home_dir().unwrap_or_else(|| PathBuf::from("~"));
    }
    if let Some(rest) = p.strip_prefix("~/") {
        return home_dir().unwrap_or_else(|| PathBuf::from("~")).join(rest);
    }
    if let Some(rest) = p.strip_prefix("~\\") {
        // Windows-style
        return home_dir().unwrap_or_else(|| PathBuf::from("~")).join(rest);
    }
    PathBuf::from(p)
}

/// Splits a `PATH`-style list (`:` on unix, `;` on windows) into tilde-expanded paths,
/// dropping empty segments.
pub fn split_path_list(raw: &str) -> Vec<PathBuf> {
    env::split_paths(raw)
        .filter(|path| !path.as_os_str().is_empty())
        .map(|path| expand_tilde(&path.to_string_lossy()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_home_prefix() {
        let home = home_dir().expect("home directory");
        assert_eq!(expand_tilde("~/providers"), home.join("providers"));
        assert_eq!(expand_tilde(" /opt/providers "), PathBuf::from("/opt/providers"));
    }

    #[cfg(unix)]
    #[test]
    fn splits_path_list_and_skips_empty_segments() {
        let paths = split_path_list("/a::/b");
        assert_eq!(paths, vec![PathBuf::from("/a"), PathBuf::from("/b")]);
    }
}
