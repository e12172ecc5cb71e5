use std::{io, path::Path};

use log::{debug, info, warn};

use crate::{
    github::{self, STATE_BUILD_REFS, STATE_TMP_DIR},
    Result,
};

pub fn post() -> Result<()> {
    if let Some(build_refs) = github::state(STATE_BUILD_REFS) {
        for build_ref in build_refs.split(',').filter(|value| !value.is_empty()) {
            info!("Build record: {build_ref}");
        }
    }

    if let Some(tmp_dir) = github::state(STATE_TMP_DIR) {
        remove_tmp_dir(Path::new(&tmp_dir));
    }

    Ok(())
}

/// Removes the per-run directory. Failing to do so does not fail the run.
fn remove_tmp_dir(dir: &Path) {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => debug!("removed temporary directory {dir:?}"),
        Err(error) if error.kind() == io::ErrorKind::NotFound => {
            debug!("temporary directory {dir:?} is already gone")
        }
        Err(error) => warn!("Failed to remove temporary directory {dir:?}: {error}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remove_tmp_dir_works() {
        let parent = tempfile::tempdir().unwrap();
        let dir = parent.path().join("bake-action-abc");
        std::fs::create_dir(&dir).unwrap();
        std::fs::write(dir.join("metadata-file"), "null").unwrap();

        remove_tmp_dir(&dir);
        assert!(!dir.exists());

        // Removing it again is not an error.
        remove_tmp_dir(&dir);
    }
}
