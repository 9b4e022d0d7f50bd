//! INI file configuration adapter.

use crate::domain::error::PipelineError;
use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;

pub struct FileConfigAdapter {
    config: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let mut config = Ini::new();
        config
            .load(path)
            .map_err(|reason| PipelineError::ConfigParse {
                file: path.display().to_string(),
                reason,
            })?;
        Ok(Self { config })
    }

    pub fn from_string(content: &str) -> Result<Self, PipelineError> {
        let mut config = Ini::new();
        config
            .read(content.to_string())
            .map_err(|reason| PipelineError::ConfigParse {
                file: "<string>".to_string(),
                reason,
            })?;
        Ok(Self { config })
    }

    fn parse_bool(value: &str) -> Option<bool> {
        match value.to_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        }
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

    fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        self.config
            .getfloat(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.config
            .get(section, key)
            .as_ref()
            .and_then(|v| Self::parse_bool(v))
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
[backtest]
initial_capital = 1.0
trading_cost = 0.0005

[signals]
mode = extended
ema_fast = 20
"#;
        let adapter = FileConfigAdapter::from_string(content).unwrap();
        assert_eq!(
            adapter.get_string("signals", "mode"),
            Some("extended".to_string())
        );
        assert_eq!(adapter.get_int("signals", "ema_fast", 0), 20);
    }

    #[test]
    fn get_string_returns_none_for_missing_key() {
        let adapter = FileConfigAdapter::from_string("[backtest]\ninitial_capital = 1\n").unwrap();
        assert_eq!(adapter.get_string("backtest", "missing"), None);
        assert_eq!(adapter.get_string("missing_section", "key"), None);
    }

    #[test]
    fn get_int_returns_default_for_missing() {
        let adapter = FileConfigAdapter::from_string("[signals]\n").unwrap();
        assert_eq!(adapter.get_int("signals", "missing", 42), 42);
    }

    #[test]
    fn get_int_returns_default_for_non_numeric() {
        let adapter = FileConfigAdapter::from_string("[signals]\nema_fast = abc\n").unwrap();
        assert_eq!(adapter.get_int("signals", "ema_fast", 42), 42);
    }

    #[test]
    fn get_double_returns_value() {
        let adapter = FileConfigAdapter::from_string("[risk]\ntarget_vol = 0.12\n").unwrap();
        assert_eq!(adapter.get_double("risk", "target_vol", 0.0), 0.12);
    }

    #[test]
    fn get_double_returns_default_for_non_numeric() {
        let adapter = FileConfigAdapter::from_string("[risk]\ntarget_vol = high\n").unwrap();
        assert_eq!(adapter.get_double("risk", "target_vol", 0.15), 0.15);
    }

    #[test]
    fn get_bool_accepts_common_spellings() {
        let adapter = FileConfigAdapter::from_string(
            "[signals]\na = true\nb = yes\nc = 1\nd = false\ne = no\nf = 0\n",
        )
        .unwrap();
        assert!(adapter.get_bool("signals", "a", false));
        assert!(adapter.get_bool("signals", "b", false));
        assert!(adapter.get_bool("signals", "c", false));
        assert!(!adapter.get_bool("signals", "d", true));
        assert!(!adapter.get_bool("signals", "e", true));
        assert!(!adapter.get_bool("signals", "f", true));
        assert!(adapter.get_bool("signals", "missing", true));
    }

    #[test]
    fn get_date_parses_and_rejects() {
        let adapter = FileConfigAdapter::from_string(
            "[backtest]\ntrain_end = 2020-12-31\nval_end = 31/12/2021\n",
        )
        .unwrap();
        assert_eq!(
            adapter.get_date("backtest", "train_end").unwrap(),
            chrono::NaiveDate::from_ymd_opt(2020, 12, 31)
        );
        assert!(matches!(
            adapter.get_date("backtest", "val_end"),
            Err(PipelineError::ConfigInvalid { .. })
        ));
        assert_eq!(adapter.get_date("backtest", "missing").unwrap(), None);
    }

    #[test]
    fn from_file_reads_config() {
        let file = create_temp_config("[overlay]\nrating = SELL\n");
        let adapter = FileConfigAdapter::from_file(file.path()).unwrap();
        assert_eq!(
            adapter.get_string("overlay", "rating"),
            Some("SELL".to_string())
        );
    }

    #[test]
    fn from_file_returns_error_for_missing_file() {
        let result = FileConfigAdapter::from_file("/nonexistent/path/config.ini");
        assert!(matches!(result, Err(PipelineError::ConfigParse { .. })));
    }
}
