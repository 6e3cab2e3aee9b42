// ABOUTME: Database backup settings for the optional pre-migration backup stage.
// ABOUTME: Credentials and connection kind for mysqldump / pg_dump.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub backup_enabled: bool,

    /// Connection kind: mysql, mariadb, pgsql or postgres.
    #[serde(default = "default_connection")]
    pub connection: String,

    #[serde(default)]
    pub host: Option<String>,

    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default)]
    pub database: Option<String>,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    #[serde(default = "default_keep_backups")]
    pub keep_backups: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backup_enabled: false,
            connection: default_connection(),
            host: None,
            port: None,
            database: None,
            username: None,
            password: None,
            keep_backups: default_keep_backups(),
        }
    }
}

fn default_connection() -> String {
    "mysql".to_string()
}

fn default_keep_backups() -> usize {
    5
}
