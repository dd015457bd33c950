use anyhow::{Result, anyhow};
use directories::UserDirs;
use log::info;
use serde::{Deserialize, Deserializer};
use std::{
    collections::HashMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
};

#[derive(Debug, Clone, Deserialize)]
pub struct Meta {
    pub name: Option<String>,
    #[serde(default)]
    pub allow_commands: bool,
}

/// The engine tuning surface. Every threshold the matching pipeline uses
/// lives here rather than in the code.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Tunables {
    pub max_frames_per_gesture: usize,
    pub min_capture_quality: f64,
    pub recognition_tolerance: f64,
    pub recognition_buffer_capacity: usize,
    pub recognition_min_buffer: usize,
    pub similarity_threshold: f64,
    pub practice_check_interval_ms: u64,
    /// Distance-to-similarity factor; empirically tuned for the
    /// post-normalization coordinate range.
    pub similarity_scale: f64,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            max_frames_per_gesture: 10,
            min_capture_quality: 80.0,
            recognition_tolerance: 0.70,
            recognition_buffer_capacity: 10,
            recognition_min_buffer: 3,
            similarity_threshold: 80.0,
            practice_check_interval_ms: 100,
            similarity_scale: 1.5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Profile {
    pub meta: Meta,
    #[serde(default)]
    pub tunables: Tunables,

    // Accept nested/dotted tables and flatten them into "a.b" -> "value"
    #[serde(default, deserialize_with = "deserialize_bindings_flat")]
    pub bindings: HashMap<String, String>,
}

// --------- custom bindings deserializer (tolerant) ----------
fn deserialize_bindings_flat<'de, D>(
    de: D,
) -> std::result::Result<HashMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let val = toml::Value::deserialize(de)?;
    let table = match val {
        toml::Value::Table(t) => t,
        other => {
            return Err(serde::de::Error::custom(format!(
                "bindings must be a table, got {:?}",
                other.type_str()
            )));
        }
    };

    let mut out = HashMap::new();
    flatten_table("", &table, &mut out).map_err(serde::de::Error::custom)?;
    Ok(out)
}

fn flatten_table(
    prefix: &str,
    table: &toml::value::Table,
    out: &mut HashMap<String, String>,
) -> std::result::Result<(), String> {
    for (k, v) in table {
        let key = if prefix.is_empty() {
            k.clone()
        } else {
            format!("{prefix}.{k}")
        };
        match v {
            toml::Value::String(s) => {
                out.insert(key, s.clone());
            }
            toml::Value::Table(sub) => {
                flatten_table(&key, sub, out)?;
            }
            other => {
                return Err(format!(
                    "binding '{}' value must be a string, got {}",
                    key,
                    other.type_str()
                ));
            }
        }
    }
    Ok(())
}
// ------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct DaemonConfigState {
    pub active_name: String,
    pub profile: Profile,
    pub config_dir: PathBuf,
    pub profiles_dir: PathBuf,
    pub active_ptr: PathBuf,
}

fn config_dir() -> PathBuf {
    let home = UserDirs::new().unwrap().home_dir().to_path_buf();
    home.join(".config").join("gesturectl")
}

pub fn profiles_dir() -> PathBuf {
    config_dir().join("profiles")
}

fn active_ptr_path() -> PathBuf {
    config_dir().join("active")
}

fn default_profile_text() -> &'static str {
    include_str!("../profiles/default.toml")
}

impl DaemonConfigState {
    pub fn load_or_install_default() -> Result<Self> {
        let cfgdir = config_dir();
        let profdir = profiles_dir();
        fs::create_dir_all(&profdir)?;

        let def_path = profdir.join("default.toml");
        if !def_path.exists() {
            fs::write(&def_path, default_profile_text())?;
            info!("installed default profile at {}", def_path.display());
        }

        let active_ptr = active_ptr_path();
        if !active_ptr.exists() {
            let mut f = fs::File::create(&active_ptr)?;
            f.write_all(b"default")?;
        }

        let active_name = fs::read_to_string(&active_ptr)?.trim().to_string();
        let profile = Self::load_profile(&active_name)?;

        Ok(Self {
            active_name,
            profile,
            config_dir: cfgdir,
            profiles_dir: profdir,
            active_ptr,
        })
    }

    pub fn reload(&mut self) -> Result<()> {
        self.profile = Self::load_profile(&self.active_name)?;
        Ok(())
    }

    pub fn set_active(&mut self, name: &str) -> Result<()> {
        let p = self.profiles_dir.join(format!("{name}.toml"));
        if !p.exists() {
            return Err(anyhow!("profile not found: {}", p.display()));
        }
        fs::write(&self.active_ptr, name.as_bytes())?;
        self.active_name = name.to_string();
        self.reload()?;
        Ok(())
    }

    pub fn list_profiles(&self) -> Vec<String> {
        let mut v = Vec::new();
        if let Ok(rd) = fs::read_dir(&self.profiles_dir) {
            for e in rd.flatten() {
                if let Some(ext) = e.path().extension() {
                    if ext == "toml" {
                        if let Some(stem) = e.path().file_stem().and_then(|s| s.to_str()) {
                            v.push(stem.to_string());
                        }
                    }
                }
            }
        }
        v.sort();
        v
    }

    fn load_profile(name: &str) -> Result<Profile> {
        let path = profiles_dir().join(format!("{name}.toml"));
        let txt = fs::read_to_string(&path)
            .map_err(|e| anyhow!("failed to read {}: {e}", path.display()))?;
        let profile: Profile =
            toml::from_str(&txt).map_err(|e| anyhow!("failed to parse {}: {e}", path.display()))?;
        validate_profile(&profile)?;
        Ok(profile)
    }

    pub fn doctor_report(&self, store_path: &Path, socket: &Path) -> serde_json::Value {
        let store_parses = if store_path.exists() {
            fs::read_to_string(store_path)
                .ok()
                .and_then(|txt| serde_json::from_str::<serde_json::Value>(&txt).ok())
                .is_some()
        } else {
            true
        };
        serde_json::json!({
            "profiles_dir": self.profiles_dir,
            "active_profile": self.active_name,
            "store_path": store_path,
            "store_present": store_path.exists(),
            "store_parses": store_parses,
            "daemon_socket": socket,
            "daemon_running": socket.exists(),
            "hints": {
                "tracker_feed": "pipe tracker JSON lines into `gesturectl feed`",
                "profiles": "~/.config/gesturectl/profiles"
            }
        })
    }
}

pub fn validate_profile(p: &Profile) -> Result<()> {
    let t = &p.tunables;
    if t.max_frames_per_gesture == 0 {
        return Err(anyhow!("tunables.max_frames_per_gesture must be at least 1"));
    }
    if !(0.0..=100.0).contains(&t.min_capture_quality) {
        return Err(anyhow!("tunables.min_capture_quality must be in [0,100]"));
    }
    if !(0.0..=1.0).contains(&t.recognition_tolerance) {
        return Err(anyhow!("tunables.recognition_tolerance must be in [0,1]"));
    }
    if t.recognition_buffer_capacity == 0 {
        return Err(anyhow!(
            "tunables.recognition_buffer_capacity must be at least 1"
        ));
    }
    if t.recognition_min_buffer == 0 || t.recognition_min_buffer > t.recognition_buffer_capacity {
        return Err(anyhow!(
            "tunables.recognition_min_buffer must be in [1, recognition_buffer_capacity]"
        ));
    }
    if !(0.0..=100.0).contains(&t.similarity_threshold) {
        return Err(anyhow!("tunables.similarity_threshold must be in [0,100]"));
    }
    if t.practice_check_interval_ms == 0 {
        return Err(anyhow!("tunables.practice_check_interval_ms must be positive"));
    }
    if t.similarity_scale <= 0.0 {
        return Err(anyhow!("tunables.similarity_scale must be positive"));
    }

    for (k, v) in &p.bindings {
        if k.trim().is_empty() {
            return Err(anyhow!("empty binding key"));
        }
        if v.trim().is_empty() {
            return Err(anyhow!("binding '{}' has empty action", k));
        }

        let ok = v.starts_with("log:") || v.starts_with("cmd:") || v == "none";
        if !ok {
            return Err(anyhow!("binding '{}' has invalid action '{}'", k, v));
        }
        if v.starts_with("cmd:") && !p.meta.allow_commands {
            return Err(anyhow!("binding '{}' uses cmd: but allow_commands=false", k));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Profile {
        toml::from_str(text).expect("profile parses")
    }

    #[test]
    fn default_profile_parses_and_validates() {
        let profile = parse(default_profile_text());
        validate_profile(&profile).unwrap();
        assert_eq!(profile.tunables.max_frames_per_gesture, 10);
        assert!((profile.tunables.recognition_tolerance - 0.70).abs() < 1e-12);
        assert!((profile.tunables.similarity_threshold - 80.0).abs() < 1e-12);
        assert_eq!(profile.tunables.practice_check_interval_ms, 100);
        assert!((profile.tunables.similarity_scale - 1.5).abs() < 1e-12);
    }

    #[test]
    fn missing_tunables_fall_back_to_defaults() {
        let profile = parse("[meta]\nname = \"bare\"\n");
        validate_profile(&profile).unwrap();
        assert_eq!(profile.tunables.recognition_buffer_capacity, 10);
        assert_eq!(profile.tunables.recognition_min_buffer, 3);
        assert!((profile.tunables.min_capture_quality - 80.0).abs() < 1e-12);
    }

    #[test]
    fn nested_bindings_flatten_to_dotted_keys() {
        let profile = parse(
            r#"
[meta]
name = "nested"

[bindings]
wave = "log:hello"

[bindings.demo]
fist = "none"
"#,
        );
        assert_eq!(profile.bindings.get("wave").unwrap(), "log:hello");
        assert_eq!(profile.bindings.get("demo.fist").unwrap(), "none");
    }

    #[test]
    fn out_of_range_tolerance_fails_validation() {
        let mut profile = parse(default_profile_text());
        profile.tunables.recognition_tolerance = 1.3;
        assert!(validate_profile(&profile).is_err());
    }

    #[test]
    fn min_buffer_may_not_exceed_capacity() {
        let mut profile = parse(default_profile_text());
        profile.tunables.recognition_min_buffer = 20;
        assert!(validate_profile(&profile).is_err());
    }

    #[test]
    fn command_bindings_require_allow_commands() {
        let denied = parse(
            r#"
[meta]
name = "cmds"
allow_commands = false

[bindings]
wave = "cmd:notify-send hi"
"#,
        );
        assert!(validate_profile(&denied).is_err());

        let allowed = parse(
            r#"
[meta]
name = "cmds"
allow_commands = true

[bindings]
wave = "cmd:notify-send hi"
"#,
        );
        validate_profile(&allowed).unwrap();
    }

    #[test]
    fn unknown_binding_actions_are_refused() {
        let profile = parse(
            r#"
[meta]
name = "bad"

[bindings]
wave = "mouse:left"
"#,
        );
        assert!(validate_profile(&profile).is_err());
    }
}
