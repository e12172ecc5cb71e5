use std::{io, path::PathBuf};

/// Creates a new uniquely named directory `<parent>/bake-action-<random>` and returns its path.
pub fn create_tmp_dir(parent: &std::path::Path) -> io::Result<PathBuf> {
    use rand::distributions::{Alphanumeric, DistString};

    const PREFIX: &str = "bake-action-";
    const LEN: usize = 12;

    let mut name = String::with_capacity(PREFIX.len() + LEN);
    name.push_str(PREFIX);
    Alphanumeric.append_string(&mut rand::thread_rng(), &mut name, LEN);

    let path = parent.join(name);
    std::fs::create_dir_all(&path)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_tmp_dir_creates_unique_dirs() {
        let parent = tempfile::tempdir().unwrap();
        let a = create_tmp_dir(parent.path()).unwrap();
        let b = create_tmp_dir(parent.path()).unwrap();
        assert_ne!(a, b);
        assert!(a.is_dir());
        assert!(a
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("bake-action-"));
    }
}
