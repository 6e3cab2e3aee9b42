// ABOUTME: Init command implementation.
// ABOUTME: Writes a commented starter caravel.yml into the working directory.

use std::path::Path;

use caravel::config::CONFIG_FILENAME;
use caravel::error::{Error, Result};
use caravel::output::Output;

const TEMPLATE: &str = r#"server:
  host: app.example.com
  port: 22
  username: deploy
  # key_path: ~/.ssh/id_ed25519

repository:
  url: git@github.com:org/app.git
  branch: main

paths:
  deploy_to: /var/www/app

options:
  keep_releases: 5
  install_dependencies: true
  build_assets: false
  run_migrations: false

# hooks:
#   before_activate:
#     - php artisan config:cache
#   after_activate:
#     - php artisan queue:restart

# shared_paths:
#   public/uploads: uploads

# health_check:
#   enabled: true
#   url: https://app.example.com/up
#   timeout: 30s

# notifications:
#   webhook_url: https://hooks.slack.com/services/...
"#;

/// Write a starter configuration file.
pub fn init(dir: &Path, force: bool, output: Output) -> Result<()> {
    let config_path = dir.join(CONFIG_FILENAME);

    if config_path.exists() && !force {
        return Err(Error::AlreadyExists(config_path));
    }

    std::fs::write(&config_path, TEMPLATE)?;

    output.success(&format!("Created {}", config_path.display()));
    Ok(())
}
