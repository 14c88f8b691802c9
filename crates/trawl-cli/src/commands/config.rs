//! Config command - show or initialise the configuration file.

use std::path::Path;
use trawl_core::Config;

/// Run the config command.
pub fn run(config: &Config, path: Option<&Path>, init: bool, force: bool) -> anyhow::Result<()> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => Config::default_config_path()?,
    };

    if init {
        if path.exists() && !force {
            anyhow::bail!(
                "{} already exists (use --force to overwrite)",
                path.display()
            );
        }
        Config::default().save_to(&path)?;
        println!("Wrote default configuration to {}", path.display());
        return Ok(());
    }

    println!("# {}", path.display());
    print!("{}", config.to_toml()?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_writes_default_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("trawl.toml");

        run(&Config::default(), Some(&path), true, false).unwrap();
        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.locate.program, "locate");
    }

    #[test]
    fn test_init_refuses_to_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("trawl.toml");
        std::fs::write(&path, "[general]\nmax_results = 9\n").unwrap();

        assert!(run(&Config::default(), Some(&path), true, false).is_err());
        assert_eq!(Config::load_from(&path).unwrap().general.max_results, 9);

        run(&Config::default(), Some(&path), true, true).unwrap();
        assert_eq!(Config::load_from(&path).unwrap().general.max_results, 0);
    }
}
