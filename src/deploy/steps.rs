// ABOUTME: Individual pipeline stages: requirement checks, source checkout, shared links,
// ABOUTME: dependency install, database backup, migrations, hooks, release validation.

use crate::config::{Config, HookStage};
use crate::exec::Executor;
use crate::ssh::Connection;

use super::error::{DeployError, Result};
use super::release::Release;
use super::store;

/// Minimum free disk space under the deploy root, in megabytes.
const MIN_DISK_SPACE_MB: u64 = 500;

/// Minimum PHP version the deployed application requires.
const MIN_PHP_VERSION: (u32, u32) = (8, 3);

/// Check that the server can host a deployment at all.
///
/// Disk space, parent-directory writability, the PHP runtime, git, and the
/// dependency manager (when the pipeline installs dependencies).
pub async fn validate_server_requirements<C: Connection + ?Sized>(
    exec: &Executor<'_, C>,
    config: &Config,
) -> Result<()> {
    tracing::info!("Validating server requirements...");

    let root = config.deploy_root();
    let mut failures = Vec::new();

    if !check_disk_space(exec, root).await? {
        failures.push("disk_space");
    }
    if !check_permissions(exec, root).await? {
        failures.push("permissions");
    }
    if !check_php_version(exec).await? {
        failures.push("php_version");
    }
    if !check_git_available(exec).await? {
        failures.push("git");
    }
    if config.options.install_dependencies && !check_composer_available(exec).await? {
        failures.push("composer");
    }

    if !failures.is_empty() {
        return Err(DeployError::Validation(format!(
            "Server requirements not met: {}",
            failures.join(", ")
        )));
    }

    tracing::info!("All server requirements validated");
    Ok(())
}

async fn check_disk_space<C: Connection + ?Sized>(
    exec: &Executor<'_, C>,
    root: &str,
) -> Result<bool> {
    let result = exec
        .run_unchecked(&format!("df -BM {} | awk 'NR==2 {{print $4}}'", root))
        .await?;

    if result.failed() {
        return Ok(false);
    }

    let available_mb: u64 = result
        .output
        .trim()
        .trim_end_matches('M')
        .parse()
        .unwrap_or(0);

    tracing::debug!("Available disk space: {}MB", available_mb);
    Ok(available_mb >= MIN_DISK_SPACE_MB)
}

async fn check_permissions<C: Connection + ?Sized>(
    exec: &Executor<'_, C>,
    root: &str,
) -> Result<bool> {
    let parent = parent_dir(root);
    let result = exec
        .run_unchecked(&format!("test -d {parent} && test -w {parent}"))
        .await?;
    Ok(result.success())
}

async fn check_php_version<C: Connection + ?Sized>(exec: &Executor<'_, C>) -> Result<bool> {
    let result = exec
        .run_unchecked("php -r 'echo PHP_VERSION;'")
        .await?;

    if result.failed() {
        return Ok(false);
    }

    let version = result.output.trim();
    tracing::debug!("PHP version: {}", version);
    Ok(version_at_least(version, MIN_PHP_VERSION))
}

async fn check_git_available<C: Connection + ?Sized>(exec: &Executor<'_, C>) -> Result<bool> {
    Ok(exec.run_unchecked("which git").await?.success())
}

async fn check_composer_available<C: Connection + ?Sized>(exec: &Executor<'_, C>) -> Result<bool> {
    Ok(exec.run_unchecked("which composer").await?.success())
}

/// Clone the repository into the release directory.
pub async fn clone_repository<C: Connection + ?Sized>(
    exec: &Executor<'_, C>,
    config: &Config,
    release: &Release,
) -> Result<()> {
    let url = &config.repository.url;

    tracing::info!("Cloning repository: {}", url);

    if let Some(host) = repository_host(url) {
        tracing::info!("Adding {} host key to known_hosts", host);
        exec.run_unchecked(&format!(
            "mkdir -p ~/.ssh && ssh-keyscan {} >> ~/.ssh/known_hosts 2>/dev/null || true",
            host
        ))
        .await?;
    }

    run_hooks(exec, config, HookStage::BeforeClone, &release.path).await?;

    exec.run(&format!("git clone {} {}", url, release.path))
        .await?;

    tracing::info!("Repository cloned successfully");

    run_hooks(exec, config, HookStage::AfterClone, &release.path).await?;
    Ok(())
}

/// Check out the configured branch and capture the resulting commit.
pub async fn checkout_branch<C: Connection + ?Sized>(
    exec: &Executor<'_, C>,
    config: &Config,
    release: Release,
) -> Result<Release> {
    let branch = &config.repository.branch;

    tracing::info!("Checking out branch: {}", branch);

    exec.run_in_dir(&release.path, &format!("git checkout {}", branch))
        .await?;
    exec.run_in_dir(&release.path, &format!("git pull origin {}", branch))
        .await?;

    let result = exec.run_in_dir(&release.path, "git rev-parse HEAD").await?;
    let commit_hash = result.output.trim().to_string();

    tracing::info!("Checked out commit: {}", commit_hash);

    Ok(release.with_branch(branch).with_commit_hash(commit_hash))
}

/// Copy the shared environment file into the release.
///
/// A missing shared file is a warning, not a failure: first deployments
/// legitimately run before anyone has provisioned one.
pub async fn sync_environment_file<C: Connection + ?Sized>(
    exec: &Executor<'_, C>,
    config: &Config,
    release: &Release,
) -> Result<()> {
    let shared_env = format!("{}/shared/.env", config.deploy_root());
    let release_env = format!("{}/.env", release.path);

    tracing::info!("Syncing environment file");

    let exists = exec
        .run_unchecked(&format!("test -f {}", shared_env))
        .await?;
    if exists.failed() {
        tracing::warn!(
            "Shared .env file not found at {}. Please create it manually.",
            shared_env
        );
        return Ok(());
    }

    let copy = exec
        .run_unchecked(&format!("cp {} {}", shared_env, release_env))
        .await?;
    if copy.failed() {
        return Err(DeployError::FileSync(format!(
            "failed to copy {} into the release: {}",
            shared_env, copy.output
        )));
    }

    exec.run_unchecked(&format!("chmod 600 {}", release_env))
        .await?;

    tracing::info!("Environment file synced");
    Ok(())
}

/// Replace the release's storage directory with a link into shared/.
pub async fn link_shared_storage<C: Connection + ?Sized>(
    exec: &Executor<'_, C>,
    config: &Config,
    release: &Release,
) -> Result<()> {
    let shared_storage = format!("{}/shared/storage", config.deploy_root());
    let release_storage = format!("{}/storage", release.path);

    tracing::info!("Linking shared storage");

    exec.run_unchecked(&format!("rm -rf {}", release_storage))
        .await?;

    store::activate(exec, &shared_storage, &release_storage).await?;

    tracing::info!("Shared storage linked");
    Ok(())
}

/// Link every configured extra shared path into the release.
pub async fn link_custom_shared_paths<C: Connection + ?Sized>(
    exec: &Executor<'_, C>,
    config: &Config,
    release: &Release,
) -> Result<()> {
    if config.shared_paths.is_empty() {
        return Ok(());
    }

    tracing::info!("Linking custom shared paths");

    for (release_path, shared_path) in &config.shared_paths {
        let shared_full = format!("{}/shared/{}", config.deploy_root(), shared_path);
        let release_full = format!("{}/{}", release.path, release_path);

        exec.run(&format!("mkdir -p {}", parent_dir(&shared_full)))
            .await?;

        let exists = exec
            .run_unchecked(&format!("test -e {}", shared_full))
            .await?;
        if exists.failed() {
            exec.run(&format!("mkdir -p {}", shared_full)).await?;
            tracing::info!("Created shared path: {}", shared_path);
        }

        exec.run_unchecked(&format!("rm -rf {}", release_full))
            .await?;
        exec.run(&format!("mkdir -p {}", parent_dir(&release_full)))
            .await?;

        store::activate(exec, &shared_full, &release_full).await?;

        tracing::info!("Linked {} -> shared/{}", release_path, shared_path);
    }

    tracing::info!("Custom shared paths linked");
    Ok(())
}

/// Install application dependencies into the release.
pub async fn install_dependencies<C: Connection + ?Sized>(
    exec: &Executor<'_, C>,
    release: &Release,
) -> Result<()> {
    tracing::info!("Installing dependencies...");

    exec.run_in_dir(
        &release.path,
        "composer install --no-dev --no-interaction --prefer-dist --optimize-autoloader",
    )
    .await?;

    tracing::info!("Dependencies installed");
    Ok(())
}

/// Build front-end assets inside the release.
pub async fn build_assets<C: Connection + ?Sized>(
    exec: &Executor<'_, C>,
    release: &Release,
) -> Result<()> {
    tracing::info!("Building assets...");

    exec.run_in_dir(&release.path, "npm ci").await?;
    exec.run_in_dir(&release.path, "npm run build").await?;

    tracing::info!("Assets built successfully");
    Ok(())
}

/// Dump the database to <root>/backups before migrations touch it.
pub async fn backup_database<C: Connection + ?Sized>(
    exec: &Executor<'_, C>,
    config: &Config,
    release: &Release,
) -> Result<()> {
    let db = &config.database;
    let backup_dir = format!("{}/backups", config.deploy_root());
    let backup_file = format!("{}/db-backup-{}.sql.gz", backup_dir, release.name);

    exec.run(&format!("mkdir -p {}", backup_dir)).await?;

    let command = match db.connection.as_str() {
        "mysql" | "mariadb" => mysql_backup_command(config, &backup_file)?,
        "pgsql" | "postgres" => postgres_backup_command(config, &backup_file)?,
        other => {
            return Err(DeployError::Backup(format!(
                "Unsupported database connection: {}",
                other
            )));
        }
    };

    let result = exec.run_unchecked(&command).await?;
    if result.failed() {
        return Err(DeployError::Backup(format!(
            "{} backup failed: {}",
            db.connection, result.output
        )));
    }

    tracing::info!("Database backup created: {}", backup_file);

    // Trim old backups to the configured keep count
    let keep = db.keep_backups.max(1);
    exec.run_unchecked(&format!(
        "cd {} && ls -t db-backup-*.sql.gz | tail -n +{} | xargs -r rm --",
        backup_dir,
        keep + 1
    ))
    .await?;

    tracing::debug!("Cleaned up old backups, keeping last {}", keep);
    Ok(())
}

fn mysql_backup_command(config: &Config, backup_file: &str) -> Result<String> {
    let db = &config.database;
    let (database, username) = backup_credentials(db)?;
    let host = db.host.as_deref().unwrap_or("localhost");
    let port = db.port.unwrap_or(3306);
    let password_env = db
        .password
        .as_deref()
        .map(|p| format!("MYSQL_PWD='{}' ", p))
        .unwrap_or_default();

    Ok(format!(
        "{}mysqldump -h {} -P {} -u {} --single-transaction --quick {} | gzip > {}",
        password_env, host, port, username, database, backup_file
    ))
}

fn postgres_backup_command(config: &Config, backup_file: &str) -> Result<String> {
    let db = &config.database;
    let (database, username) = backup_credentials(db)?;
    let host = db.host.as_deref().unwrap_or("localhost");
    let port = db.port.unwrap_or(5432);
    let password_env = db
        .password
        .as_deref()
        .map(|p| format!("PGPASSWORD='{}' ", p))
        .unwrap_or_default();

    Ok(format!(
        "{}pg_dump -h {} -p {} -U {} {} | gzip > {}",
        password_env, host, port, username, database, backup_file
    ))
}

fn backup_credentials(db: &crate::config::DatabaseConfig) -> Result<(&str, &str)> {
    match (db.database.as_deref(), db.username.as_deref()) {
        (Some(database), Some(username)) => Ok((database, username)),
        _ => Err(DeployError::Backup(
            "Database name and username are required for backup".to_string(),
        )),
    }
}

/// Run schema migrations inside the release.
pub async fn run_migrations<C: Connection + ?Sized>(
    exec: &Executor<'_, C>,
    release: &Release,
) -> Result<()> {
    tracing::info!("Running database migrations...");

    exec.run_in_dir(&release.path, "php artisan migrate --force")
        .await?;

    tracing::info!("Database migrations completed");
    Ok(())
}

/// Run the configured hook commands for a stage inside a directory.
pub async fn run_hooks<C: Connection + ?Sized>(
    exec: &Executor<'_, C>,
    config: &Config,
    stage: HookStage,
    dir: &str,
) -> Result<()> {
    for hook in config.hooks.for_stage(stage) {
        exec.run_in_dir(dir, hook).await?;
    }
    Ok(())
}

/// Sanity-check the new release before it is allowed to serve traffic.
pub async fn validate_release<C: Connection + ?Sized>(
    exec: &Executor<'_, C>,
    config: &Config,
    release: &Release,
) -> Result<()> {
    tracing::info!("Validating new release...");

    let dir_check = exec
        .run_unchecked(&format!("test -d {}", release.path))
        .await?;
    if dir_check.failed() {
        return Err(DeployError::Validation(
            "Release directory does not exist".to_string(),
        ));
    }

    let env_check = exec
        .run_unchecked(&format!("test -f {}/.env", release.path))
        .await?;
    if env_check.failed() {
        tracing::warn!(".env file not found in release");
    }

    if config.options.install_dependencies {
        let vendor_check = exec
            .run_unchecked(&format!("test -d {}/vendor", release.path))
            .await?;
        if vendor_check.failed() {
            return Err(DeployError::Validation(
                "Dependencies not installed in release".to_string(),
            ));
        }
    }

    tracing::info!("Release validation passed");
    Ok(())
}

/// Extract the host from an SSH or HTTP(S) repository URL for ssh-keyscan.
fn repository_host(url: &str) -> Option<&str> {
    let rest = if let Some(rest) = url.strip_prefix("git@") {
        rest
    } else if let Some(rest) = url.strip_prefix("https://") {
        rest
    } else if let Some(rest) = url.strip_prefix("http://") {
        rest
    } else if let Some(rest) = url.strip_prefix("ssh://git@") {
        rest
    } else {
        return None;
    };

    let host = rest.split(|c| c == ':' || c == '/').next()?;
    if host.is_empty() { None } else { Some(host) }
}

fn parent_dir(path: &str) -> &str {
    match path.trim_end_matches('/').rfind('/') {
        Some(0) => "/",
        Some(idx) => &path[..idx],
        None => ".",
    }
}

fn version_at_least(version: &str, min: (u32, u32)) -> bool {
    let mut parts = version.split(['.', '-']);
    let major: u32 = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    let minor: u32 = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);

    (major, minor) >= min
}
