// ABOUTME: End-to-end pipeline tests over a scripted connection.
// ABOUTME: Covers the happy path, lease contention, and both failure recovery branches.

mod support;

use std::time::Duration;

use caravel::deploy::{clean_up, deploy};
use caravel::exec::Executor;
use support::{FakeConnection, spawn_http_endpoint, test_config};

fn executor(fake: &FakeConnection) -> Executor<'_, FakeConnection> {
    Executor::new(fake, Duration::from_secs(300))
}

fn script_healthy_server(fake: &FakeConnection) {
    fake.on("test -f /var/www/app/.deploy.lock", 1, "");
    fake.on("df -BM", 0, "20000M\n");
    fake.on("php -r", 0, "8.4.2");
    fake.on("git rev-parse HEAD", 0, "4f2a9c1d8e3b7a6f5c4d3e2b1a0f9e8d7c6b5a43\n");
}

fn command_index(commands: &[String], needle: &str) -> usize {
    commands
        .iter()
        .position(|c| c.contains(needle))
        .unwrap_or_else(|| panic!("expected a command containing {needle:?}"))
}

#[tokio::test]
async fn successful_deploy_activates_and_records_the_release() {
    let fake = FakeConnection::new();
    script_healthy_server(&fake);
    let exec = executor(&fake);
    let config = test_config();

    let release = deploy(&exec, &config).await.expect("deploy should succeed");

    assert_eq!(release.branch.as_deref(), Some("main"));
    assert_eq!(
        release.commit_hash.as_deref(),
        Some("4f2a9c1d8e3b7a6f5c4d3e2b1a0f9e8d7c6b5a43")
    );

    assert_eq!(
        fake.link_target("/var/www/app/current").as_deref(),
        Some(release.path.as_str()),
        "current must point at the new release"
    );

    // The current link is only touched by the two-step cutover
    let link_writes = fake.commands_containing("current.tmp");
    assert_eq!(
        link_writes,
        vec![
            format!("ln -nfs {} /var/www/app/current.tmp", release.path),
            "mv -Tf /var/www/app/current.tmp /var/www/app/current".to_string(),
        ]
    );

    let journal = fake.commands_containing(">> /var/www/app/.meta/deployment.log");
    assert_eq!(journal.len(), 1);
    assert!(journal[0].contains("\"event\":\"deployment_success\""));
    assert!(journal[0].contains(&release.name));

    let commands = fake.commands();
    let lease_write = command_index(&commands, "> /var/www/app/.deploy.lock");
    let cutover = command_index(&commands, "mv -Tf /var/www/app/current.tmp");
    let lease_release = command_index(&commands, "rm -f /var/www/app/.deploy.lock");
    assert!(lease_write < cutover, "the lease is taken before cutover");
    assert!(cutover < lease_release, "the lease outlives the cutover");

    assert!(!fake.commands_containing("git clone git@github.com:org/app.git").is_empty());
    assert!(!fake.commands_containing("git checkout main").is_empty());
    assert!(!fake.commands_containing("composer install").is_empty());
    assert!(fake.commands_containing("npm").is_empty(), "assets are off by default");
    assert!(
        fake.commands_containing("artisan migrate").is_empty(),
        "migrations are off by default"
    );
}

#[tokio::test]
async fn optional_stages_run_when_enabled() {
    let fake = FakeConnection::new();
    script_healthy_server(&fake);
    let exec = executor(&fake);

    let mut config = test_config();
    config.options.build_assets = true;
    config.options.run_migrations = true;

    deploy(&exec, &config).await.expect("deploy should succeed");

    assert!(!fake.commands_containing("npm ci").is_empty());
    assert!(!fake.commands_containing("npm run build").is_empty());
    assert!(!fake.commands_containing("php artisan migrate --force").is_empty());
}

#[tokio::test]
async fn hooks_run_inside_the_release_directory() {
    let fake = FakeConnection::new();
    script_healthy_server(&fake);
    let exec = executor(&fake);

    let mut config = test_config();
    config.hooks.before_activate = vec!["php artisan config:cache".to_string()];

    let release = deploy(&exec, &config).await.unwrap();

    let hooks = fake.commands_containing("php artisan config:cache");
    assert_eq!(
        hooks,
        vec![format!("cd {} && php artisan config:cache", release.path)]
    );
}

#[tokio::test]
async fn unmet_server_requirements_abort_before_the_lease() {
    let fake = FakeConnection::new();
    fake.on("df -BM", 0, "100M\n");
    fake.on("php -r", 0, "8.4.2");
    let exec = executor(&fake);
    let config = test_config();

    let err = deploy(&exec, &config)
        .await
        .expect_err("insufficient disk space must abort");
    assert!(err.to_string().contains("disk_space"));

    assert!(
        fake.commands_containing(".deploy.lock").is_empty(),
        "validation failures never touch the lease"
    );
    assert!(fake.commands_containing("git clone").is_empty());
}

#[tokio::test]
async fn active_lease_blocks_deployment() {
    let fake = FakeConnection::new();
    fake.on("df -BM", 0, "20000M\n");
    fake.on("php -r", 0, "8.4.2");
    fake.on("test -f /var/www/app/.deploy.lock", 0, "");
    fake.on(
        "stat",
        0,
        &format!("{}\n", chrono::Utc::now().timestamp() - 120),
    );
    let exec = executor(&fake);
    let config = test_config();

    let err = deploy(&exec, &config)
        .await
        .expect_err("active lease must block");
    assert!(err.to_string().contains("Another deployment is in progress"));

    assert!(fake.commands_containing("git clone").is_empty());
    assert!(
        fake.commands_containing("rm -f /var/www/app/.deploy.lock").is_empty(),
        "a foreign lease is never deleted"
    );
}

#[tokio::test]
async fn first_deploy_failure_has_nothing_to_roll_back_to() {
    let fake = FakeConnection::new();
    script_healthy_server(&fake);
    fake.on("git clone", 1, "fatal: repository not found");
    let exec = executor(&fake);
    let config = test_config();

    let err = deploy(&exec, &config)
        .await
        .expect_err("failed clone must fail the deploy");
    assert!(
        err.to_string().contains("git clone"),
        "the clone failure must surface, not the recovery outcome"
    );

    assert!(
        fake.commands_containing("current.tmp").is_empty(),
        "with no previous release there is nothing to activate"
    );
    assert_eq!(
        fake.commands_containing("rm -f /var/www/app/.deploy.lock").len(),
        1,
        "the lease is released on failure"
    );
}

#[tokio::test]
async fn failure_before_cutover_reactivates_the_previous_release() {
    let fake = FakeConnection::new();
    script_healthy_server(&fake);
    fake.set_link("/var/www/app/current", "/var/www/app/releases/20240101000000");

    // The new release directory exists by the time the build fails, so the
    // listing shows it first, ahead of the release still serving traffic
    let commands = fake.commands_handle();
    fake.on_fn("ls -t /var/www/app/releases", move |_| {
        let name = commands
            .lock()
            .unwrap()
            .iter()
            .find_map(|c| c.strip_prefix("mkdir -p /var/www/app/releases/"))
            .map(str::to_string)
            .unwrap_or_default();
        caravel::ssh::CommandOutput {
            exit_code: 0,
            stdout: format!("{name}\n20240101000000\n"),
            stderr: String::new(),
        }
    });

    fake.on("composer install", 1, "package resolution failed");
    let exec = executor(&fake);
    let config = test_config();

    let err = deploy(&exec, &config)
        .await
        .expect_err("failed install must fail the deploy");
    assert!(err.to_string().contains("composer install"));

    assert_eq!(
        fake.link_target("/var/www/app/current").as_deref(),
        Some("/var/www/app/releases/20240101000000"),
        "the previously live release must be (re)activated"
    );

    let link_writes = fake.commands_containing("current.tmp");
    assert_eq!(
        link_writes,
        vec![
            "ln -nfs /var/www/app/releases/20240101000000 /var/www/app/current.tmp".to_string(),
            "mv -Tf /var/www/app/current.tmp /var/www/app/current".to_string(),
        ],
        "recovery goes through the same two-step cutover"
    );

    let journal = fake.commands_containing(">> /var/www/app/.meta/deployment.log");
    assert_eq!(journal.len(), 1);
    assert!(journal[0].contains("\"event\":\"rollback\""));
}

#[tokio::test]
async fn failure_after_cutover_rolls_back_to_the_previous_release() {
    let fake = FakeConnection::new();
    script_healthy_server(&fake);
    fake.set_link("/var/www/app/current", "/var/www/app/releases/20240101000000");

    // The listing always shows the live release first, then the old one
    let links = fake.links_handle();
    fake.on_fn("ls -t /var/www/app/releases", move |_| {
        let current = links
            .lock()
            .unwrap()
            .get("/var/www/app/current")
            .cloned()
            .unwrap_or_default();
        let name = current.rsplit('/').next().unwrap_or("").to_string();
        caravel::ssh::CommandOutput {
            exit_code: 0,
            stdout: format!("{name}\n20240101000000\n"),
            stderr: String::new(),
        }
    });

    // Reload fails only after the new release took traffic
    fake.on("systemctl reload php-fpm", 1, "");
    let exec = executor(&fake);

    let mut config = test_config();
    config.hooks.after_activate = vec!["systemctl reload php-fpm".to_string()];

    let err = deploy(&exec, &config)
        .await
        .expect_err("failed post-activation hook must fail the deploy");
    assert!(err.to_string().contains("systemctl reload php-fpm"));

    assert_eq!(
        fake.link_target("/var/www/app/current").as_deref(),
        Some("/var/www/app/releases/20240101000000"),
        "current must be rolled back to the previous release"
    );

    let journal = fake.commands_containing(">> /var/www/app/.meta/deployment.log");
    assert_eq!(journal.len(), 1);
    assert!(journal[0].contains("\"event\":\"rollback\""));
    assert!(journal[0].contains("20240101000000"));

    assert_eq!(
        fake.commands_containing("rm -f /var/www/app/.deploy.lock").len(),
        1,
        "the lease is released after recovery"
    );
}

#[tokio::test]
async fn database_backup_runs_independently_of_migrations() {
    let fake = FakeConnection::new();
    script_healthy_server(&fake);
    let exec = executor(&fake);

    let mut config = test_config();
    config.database.backup_enabled = true;
    config.database.database = Some("app".to_string());
    config.database.username = Some("app".to_string());

    deploy(&exec, &config).await.expect("deploy should succeed");

    assert!(
        !fake.commands_containing("mysqldump").is_empty(),
        "the backup runs even with migrations off"
    );
    assert!(
        fake.commands_containing("artisan migrate").is_empty(),
        "migrations stay off"
    );
}

#[tokio::test]
async fn failing_health_check_is_attempted_once() {
    let (url, requests) = spawn_http_endpoint("500 Internal Server Error").await;

    let fake = FakeConnection::new();
    script_healthy_server(&fake);
    let exec = executor(&fake);

    let mut config = test_config();
    config.health_check.enabled = true;
    config.health_check.url = Some(format!("{url}/health"));

    let err = deploy(&exec, &config)
        .await
        .expect_err("an unhealthy endpoint must fail the deploy");
    assert!(err.to_string().contains("endpoint returned 500"));

    assert_eq!(
        requests.lock().unwrap().len(),
        1,
        "the endpoint is hit exactly once"
    );
    assert_eq!(
        fake.commands_containing("rm -f /var/www/app/.deploy.lock").len(),
        1,
        "the lease is released on failure"
    );
}

#[tokio::test]
async fn deploy_leaves_incomplete_release_pruning_to_cleanup() {
    let fake = FakeConnection::new();
    script_healthy_server(&fake);
    fake.on("| tail -n +", 0, "");
    fake.on("ls /var/www/app/releases", 0, "20240101000000\n");
    fake.on("test -d /var/www/app/releases/20240101000000/vendor", 1, "");
    let exec = executor(&fake);
    let config = test_config();

    deploy(&exec, &config).await.expect("deploy should succeed");

    assert!(
        fake.commands_containing("rm -rf /var/www/app/releases/20240101000000").is_empty(),
        "a vendor-less old release is left for the cleanup command"
    );
}

#[tokio::test]
async fn cleanup_prunes_incomplete_before_old() {
    let fake = FakeConnection::new();
    fake.set_link("/var/www/app/current", "/var/www/app/releases/20250301000000");
    fake.on("| tail -n +", 0, "20250101000000\n");
    fake.on(
        "ls /var/www/app/releases",
        0,
        "20250301000000\n20250201000000\n20250101000000\n",
    );
    fake.on("test -d /var/www/app/releases/20250201000000/vendor", 1, "");
    let exec = executor(&fake);

    let mut config = test_config();
    config.options.keep_releases = 2;

    clean_up(&exec, &config).await.expect("cleanup should succeed");

    let commands = fake.commands();
    let incomplete = command_index(&commands, "rm -rf /var/www/app/releases/20250201000000");
    let keep_window = command_index(&commands, "| tail -n +3");
    let old = command_index(&commands, "rm -rf /var/www/app/releases/20250101000000");
    assert!(
        incomplete < keep_window,
        "incomplete releases go before the keep window is computed"
    );
    assert!(incomplete < old);

    assert!(
        fake.commands_containing("rm -rf /var/www/app/releases/20250301000000").is_empty(),
        "the current release is never pruned"
    );
}

#[tokio::test]
async fn started_notification_carries_the_prepared_release() {
    let (url, bodies) = spawn_http_endpoint("200 OK").await;

    let fake = FakeConnection::new();
    script_healthy_server(&fake);
    let exec = executor(&fake);

    let mut config = test_config();
    config.notifications.webhook_url = Some(url);

    let release = deploy(&exec, &config).await.expect("deploy should succeed");

    let bodies = bodies.lock().unwrap();
    assert_eq!(bodies.len(), 2, "started and success events are delivered");
    assert!(bodies[0].contains("\"status\":\"started\""));
    assert!(
        bodies[0].contains(&release.name),
        "the started event names the prepared release"
    );
    assert!(bodies[1].contains("\"status\":\"success\""));
}

#[tokio::test]
async fn missing_shared_env_file_is_a_warning_not_a_failure() {
    let fake = FakeConnection::new();
    script_healthy_server(&fake);
    fake.on("test -f /var/www/app/shared/.env", 1, "");
    let exec = executor(&fake);
    let config = test_config();

    deploy(&exec, &config)
        .await
        .expect("a missing shared .env must not fail the deploy");

    assert!(
        fake.commands_containing("cp /var/www/app/shared/.env").is_empty(),
        "nothing is copied when the shared file is absent"
    );
}
