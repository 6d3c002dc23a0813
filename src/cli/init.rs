use super::config::{default_config_path, default_data_path, OriginBindConfig};
use std::path::PathBuf;

/// Write a default configuration file
///
/// Refuses to replace an existing file unless `force` is set.
pub fn execute(
    config_path: Option<String>,
    data_dir: Option<String>,
    force: bool,
) -> Result<String, Box<dyn std::error::Error>> {
    let data_dir = data_dir.map(PathBuf::from).unwrap_or_else(default_data_path);
    let config_path = config_path
        .map(PathBuf::from)
        .unwrap_or_else(|| default_config_path(&data_dir));

    if config_path.exists() && !force {
        return Err(format!(
            "Config file '{}' already exists (use --force to overwrite)",
            config_path.display()
        )
        .into());
    }

    OriginBindConfig::create_default(&config_path, &data_dir)?;

    Ok(format!(
        "Created {}\nData directory: {}",
        config_path.display(),
        data_dir.display()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_writes_loadable_config() {
        let temp_dir = TempDir::new().unwrap();
        let data_dir = temp_dir.path().to_string_lossy().to_string();

        let output = execute(None, Some(data_dir), false).unwrap();
        assert!(output.starts_with("Created"));

        let config = OriginBindConfig::load(&temp_dir.path().join("config.toml")).unwrap();
        assert_eq!(config.storage.data_dir, temp_dir.path());
    }

    #[test]
    fn test_init_refuses_overwrite_without_force() {
        let temp_dir = TempDir::new().unwrap();
        let data_dir = temp_dir.path().to_string_lossy().to_string();

        execute(None, Some(data_dir.clone()), false).unwrap();
        assert!(execute(None, Some(data_dir.clone()), false).is_err());
        assert!(execute(None, Some(data_dir), true).is_ok());
    }
}
