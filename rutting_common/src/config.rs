use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8000/predict/";
pub const DEFAULT_FIELD_NAME: &str = "files";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";
pub const DEFAULT_CAMERA: &str = "/dev/video0";

/// Client configuration. `Default` gives a local backend on port 8000;
/// `from_env` lets `RUTTING_*` variables override individual fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub endpoint: String,
    /// Multipart field every image part is posted under.
    pub field_name: String,
    /// `None` waits for the service indefinitely.
    pub request_timeout: Option<Duration>,
    pub output_dir: PathBuf,
    /// chrono format string used for the export date stamp and file name.
    pub date_format: String,
    /// Font for chart and export text; the bundled face when unset.
    pub font_path: Option<PathBuf>,
    pub camera: String,
    pub capture_width: u32,
    pub capture_height: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            field_name: DEFAULT_FIELD_NAME.to_string(),
            request_timeout: Some(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
            output_dir: PathBuf::from("."),
            date_format: DEFAULT_DATE_FORMAT.to_string(),
            font_path: None,
            camera: DEFAULT_CAMERA.to_string(),
            capture_width: 640,
            capture_height: 480,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            endpoint: lookup("RUTTING_ENDPOINT").unwrap_or(defaults.endpoint),
            field_name: lookup("RUTTING_FIELD_NAME").unwrap_or(defaults.field_name),
            request_timeout: match lookup("RUTTING_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
                Some(0) => None,
                Some(secs) => Some(Duration::from_secs(secs)),
                None => defaults.request_timeout,
            },
            output_dir: lookup("RUTTING_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            date_format: lookup("RUTTING_DATE_FORMAT").unwrap_or(defaults.date_format),
            font_path: lookup("RUTTING_FONT").map(PathBuf::from),
            camera: lookup("RUTTING_CAMERA").unwrap_or(defaults.camera),
            capture_width: lookup("RUTTING_CAPTURE_WIDTH")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.capture_width),
            capture_height: lookup("RUTTING_CAPTURE_HEIGHT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.capture_height),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_env() {
        assert_eq!(Config::from_lookup(lookup(&[])), Config::default());
    }

    #[test]
    fn test_env_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("RUTTING_ENDPOINT", "http://backend:9000/predict/"),
            ("RUTTING_TIMEOUT_SECS", "5"),
            ("RUTTING_DATE_FORMAT", "%d/%m/%Y"),
            ("RUTTING_CAPTURE_WIDTH", "1280"),
            ("RUTTING_FONT", "/usr/share/fonts/Roboto.ttf"),
        ]));
        assert_eq!(config.font_path, Some(PathBuf::from("/usr/share/fonts/Roboto.ttf")));
        assert_eq!(config.endpoint, "http://backend:9000/predict/");
        assert_eq!(config.request_timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.date_format, "%d/%m/%Y");
        assert_eq!(config.capture_width, 1280);
        assert_eq!(config.capture_height, 480);
    }

    #[test]
    fn test_zero_timeout_disables_it() {
        let config = Config::from_lookup(lookup(&[("RUTTING_TIMEOUT_SECS", "0")]));
        assert_eq!(config.request_timeout, None);
    }

    #[test]
    fn test_unparsable_numbers_fall_back() {
        let config = Config::from_lookup(lookup(&[("RUTTING_TIMEOUT_SECS", "soon")]));
        assert_eq!(config.request_timeout, Config::default().request_timeout);
    }
}
