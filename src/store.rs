//! Durable storage for the gesture library.
//!
//! The engine only depends on the load/save contract; any backing store
//! works. The shipped implementation keeps a single pretty-printed JSON
//! file in the user's data directory.

use anyhow::{Result, anyhow};
use directories::UserDirs;
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::library::GestureLibrary;

pub trait GestureStore {
    fn load(&self) -> Result<GestureLibrary>;
    fn save(&self, library: &GestureLibrary) -> Result<()>;
}

pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn at_default_location() -> Self {
        Self::new(default_store_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

pub fn default_store_path() -> PathBuf {
    let home = UserDirs::new().unwrap().home_dir().to_path_buf();
    home.join(".local")
        .join("share")
        .join("gesturectl")
        .join("gestures.json")
}

impl GestureStore for JsonFileStore {
    fn load(&self) -> Result<GestureLibrary> {
        if !self.path.exists() {
            return Ok(GestureLibrary::new());
        }
        let txt = fs::read_to_string(&self.path)
            .map_err(|e| anyhow!("failed to read {}: {e}", self.path.display()))?;
        let library: GestureLibrary = serde_json::from_str(&txt)
            .map_err(|e| anyhow!("failed to parse {}: {e}", self.path.display()))?;
        Ok(library)
    }

    fn save(&self, library: &GestureLibrary) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        // Write-then-rename so a crash mid-save never truncates the library.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(library)?)?;
        fs::rename(&tmp, &self.path)
            .map_err(|e| anyhow!("failed to replace {}: {e}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::{sample_fist, sample_hand};
    use crate::library::testutil::{gesture, single_frame_gesture};

    fn temp_store(tag: &str) -> JsonFileStore {
        let path = std::env::temp_dir().join(format!(
            "gesturectl-test-{}-{}.json",
            tag,
            std::process::id()
        ));
        let _ = fs::remove_file(&path);
        JsonFileStore::new(path)
    }

    #[test]
    fn load_of_a_missing_file_yields_an_empty_library() {
        let store = temp_store("missing");
        let library = store.load().unwrap();
        assert!(library.is_empty());
    }

    #[test]
    fn save_then_load_round_trips_the_library() {
        let store = temp_store("roundtrip");

        let mut library = GestureLibrary::new();
        library.add(gesture(1, "wave", &[sample_hand(), sample_fist()]));
        library.add(single_frame_gesture(2, "fist"));

        store.save(&library).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded, library);

        let _ = fs::remove_file(store.path());
    }

    #[test]
    fn save_overwrites_previous_content() {
        let store = temp_store("overwrite");

        let mut library = GestureLibrary::new();
        library.add(single_frame_gesture(1, "old"));
        store.save(&library).unwrap();

        let mut replacement = GestureLibrary::new();
        replacement.add(single_frame_gesture(2, "new"));
        store.save(&replacement).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(loaded.find_by_name("new").is_some());

        let _ = fs::remove_file(store.path());
    }

    #[test]
    fn corrupt_files_surface_a_parse_error() {
        let store = temp_store("corrupt");
        fs::write(store.path(), "not json at all").unwrap();
        assert!(store.load().is_err());
        let _ = fs::remove_file(store.path());
    }
}
