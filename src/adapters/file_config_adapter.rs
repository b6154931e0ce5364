//! INI file configuration adapter.

use crate::domain::error::CalcError;
use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;

#[derive(Debug)]
pub struct FileConfigAdapter {
    config: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, CalcError> {
        let path = path.as_ref();
        let mut config = Ini::new();
        config.load(path).map_err(|reason| CalcError::ConfigParse {
            file: path.display().to_string(),
            reason,
        })?;
        Ok(Self { config })
    }

    pub fn from_string(content: &str) -> Result<Self, CalcError> {
        let mut config = Ini::new();
        config
            .read(content.to_string())
            .map_err(|reason| CalcError::ConfigParse {
                file: "<inline>".to_string(),
                reason,
            })?;
        Ok(Self { config })
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config.get(section, key)
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.config
            .getint(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    #[test]
    fn from_string_parses_config() {
        let content = r#"
[evaluation]
mode = strict
max_depth = 32

[data]
series_dir = /var/lib/mabis/series
"#;
        let adapter = FileConfigAdapter::from_string(content).unwrap();
        assert_eq!(
            adapter.get_string("evaluation", "mode"),
            Some("strict".to_string())
        );
        assert_eq!(
            adapter.get_string("data", "series_dir"),
            Some("/var/lib/mabis/series".to_string())
        );
    }

    #[test]
    fn section_and_key_names_are_case_insensitive() {
        let adapter = FileConfigAdapter::from_string("[Evaluation]\nMode = lenient\n").unwrap();
        assert_eq!(
            adapter.get_string("evaluation", "mode"),
            Some("lenient".to_string())
        );
    }

    #[test]
    fn get_string_returns_none_for_missing_key() {
        let adapter = FileConfigAdapter::from_string("[evaluation]\nmode = strict\n").unwrap();
        assert_eq!(adapter.get_string("evaluation", "missing"), None);
        assert_eq!(adapter.get_string("missing_section", "key"), None);
    }

    #[test]
    fn get_int_returns_value() {
        let adapter = FileConfigAdapter::from_string("[evaluation]\nmax_depth = 16\n").unwrap();
        assert_eq!(adapter.get_int("evaluation", "max_depth", 0), 16);
    }

    #[test]
    fn get_int_returns_default_for_missing() {
        let adapter = FileConfigAdapter::from_string("[evaluation]\n").unwrap();
        assert_eq!(adapter.get_int("evaluation", "precision", 3), 3);
    }

    #[test]
    fn get_int_returns_default_for_non_numeric() {
        let adapter = FileConfigAdapter::from_string("[evaluation]\nmax_depth = deep\n").unwrap();
        assert_eq!(adapter.get_int("evaluation", "max_depth", 64), 64);
    }

    #[test]
    fn from_file_reads_config() {
        let file = create_temp_config("[data]\nformula_dir = /srv/formulas\n");
        let adapter = FileConfigAdapter::from_file(file.path()).unwrap();
        assert_eq!(
            adapter.get_string("data", "formula_dir"),
            Some("/srv/formulas".to_string())
        );
    }

    #[test]
    fn from_file_returns_error_for_missing_file() {
        let err = FileConfigAdapter::from_file("/nonexistent/path/config.ini").unwrap_err();
        assert!(
            matches!(err, CalcError::ConfigParse { ref file, .. } if file.ends_with("config.ini"))
        );
    }
}
