use dotenv::dotenv;
use rustyline::EditMode;
use std::env;
use std::fs;
use std::path::PathBuf;

pub struct Config {
    pub name: String,
    pub history_file: PathBuf,
    pub editor_mode: String,
    pub logger_level: String,
    pub logger_dir: PathBuf,
}

impl Config {
    fn config_dir() -> PathBuf {
        if let Ok(home) = env::var("HOME") {
            PathBuf::from(home).join(".config/autosh")
        } else {
            PathBuf::from("/tmp/autosh")
        }
    }

    fn default() -> Self {
        let config_dir = Self::config_dir();
        Config {
            name: String::from("autosh"),
            history_file: config_dir.join("history"),
            editor_mode: String::from("emacs"),
            logger_level: String::from("info"),
            logger_dir: config_dir.join("logs"),
        }
    }

    pub fn new() -> Self {
        if cfg!(debug_assertions) {
            dotenv::from_filename(".env.development").ok();
        } else {
            dotenv().ok();
        }

        let mut config = Config::default();

        if let Ok(history) = env::var("AUTOSH_HISTORY") {
            config.history_file = PathBuf::from(history);
        }
        if let Ok(editor) = env::var("AUTOSH_EDITOR") {
            config.editor_mode = editor;
        }
        if let Ok(level) = env::var("AUTOSH_LOG_LEVEL") {
            config.logger_level = level;
        }
        if let Ok(dir) = env::var("AUTOSH_LOG_DIR") {
            config.logger_dir = PathBuf::from(dir);
        }

        if let Some(parent) = config.history_file.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                eprintln!("autosh: cannot create {}: {}", parent.display(), e);
            }
        }

        config
    }

    pub fn get_edit_mode(&self) -> EditMode {
        match self.editor_mode.to_lowercase().as_str() {
            "vi" => EditMode::Vi,
            _ => EditMode::Emacs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edit_mode_mapping() {
        let mut config = Config::default();
        assert!(matches!(config.get_edit_mode(), EditMode::Emacs));
        config.editor_mode = String::from("vi");
        assert!(matches!(config.get_edit_mode(), EditMode::Vi));
        config.editor_mode = String::from("VI");
        assert!(matches!(config.get_edit_mode(), EditMode::Vi));
    }
}
