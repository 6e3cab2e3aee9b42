// ABOUTME: Test support utilities.
// ABOUTME: Provides a scripted in-memory Connection for pipeline tests.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use async_trait::async_trait;
use caravel::ssh::{CommandOutput, Connection, Result};

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
#[allow(dead_code)]
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::from_default_env()
            .add_directive("caravel=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

type Responder = Box<dyn Fn(&str) -> CommandOutput + Send + Sync>;

enum Response {
    Fixed(CommandOutput),
    Dynamic(Responder),
}

struct Rule {
    pattern: String,
    response: Response,
}

/// Scripted remote host.
///
/// Commands are matched against registered rules by substring, first match
/// wins; anything unmatched succeeds with empty output. Symlink commands
/// (`ln -nfs`, `mv -Tf`, `readlink`) are emulated against an in-memory link
/// table so cutover and rollback flows behave like a real filesystem.
pub struct FakeConnection {
    rules: Mutex<Vec<Rule>>,
    commands: Arc<Mutex<Vec<String>>>,
    links: Arc<Mutex<HashMap<String, String>>>,
}

#[allow(dead_code)]
impl FakeConnection {
    pub fn new() -> Self {
        Self {
            rules: Mutex::new(Vec::new()),
            commands: Arc::new(Mutex::new(Vec::new())),
            links: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Script a fixed response for any command containing `pattern`.
    pub fn on(&self, pattern: &str, exit_code: u32, stdout: &str) {
        self.rules.lock().unwrap().push(Rule {
            pattern: pattern.to_string(),
            response: Response::Fixed(CommandOutput {
                exit_code,
                stdout: stdout.to_string(),
                stderr: String::new(),
            }),
        });
    }

    /// Script a computed response for any command containing `pattern`.
    pub fn on_fn<F>(&self, pattern: &str, responder: F)
    where
        F: Fn(&str) -> CommandOutput + Send + Sync + 'static,
    {
        self.rules.lock().unwrap().push(Rule {
            pattern: pattern.to_string(),
            response: Response::Dynamic(Box::new(responder)),
        });
    }

    /// Seed a symlink in the emulated link table.
    pub fn set_link(&self, link: &str, target: &str) {
        self.links
            .lock()
            .unwrap()
            .insert(link.to_string(), target.to_string());
    }

    /// Current target of an emulated symlink.
    pub fn link_target(&self, link: &str) -> Option<String> {
        self.links.lock().unwrap().get(link).cloned()
    }

    /// Shared handle to the link table, for responders that need to see
    /// post-cutover state.
    pub fn links_handle(&self) -> Arc<Mutex<HashMap<String, String>>> {
        Arc::clone(&self.links)
    }

    /// Shared handle to the command log, for responders that depend on
    /// commands issued earlier in the run.
    pub fn commands_handle(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.commands)
    }

    /// Every command issued so far, in order.
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    /// Commands issued so far that contain `needle`.
    pub fn commands_containing(&self, needle: &str) -> Vec<String> {
        self.commands()
            .into_iter()
            .filter(|c| c.contains(needle))
            .collect()
    }

    fn emulate_links(&self, command: &str) {
        let mut links = self.links.lock().unwrap();

        if let Some(rest) = command.strip_prefix("ln -nfs ") {
            let mut parts = rest.split_whitespace();
            if let (Some(target), Some(link)) = (parts.next(), parts.next()) {
                links.insert(link.to_string(), target.to_string());
            }
        } else if let Some(rest) = command.strip_prefix("mv -Tf ") {
            let mut parts = rest.split_whitespace();
            if let (Some(from), Some(to)) = (parts.next(), parts.next())
                && let Some(target) = links.remove(from)
            {
                links.insert(to.to_string(), target);
            }
        }
    }

    fn respond(&self, command: &str) -> CommandOutput {
        let rules = self.rules.lock().unwrap();
        for rule in rules.iter() {
            if command.contains(&rule.pattern) {
                return match &rule.response {
                    Response::Fixed(output) => output.clone(),
                    Response::Dynamic(responder) => responder(command),
                };
            }
        }
        drop(rules);

        if let Some(link) = command.strip_prefix("readlink ") {
            return match self.link_target(link.trim()) {
                Some(target) => CommandOutput {
                    exit_code: 0,
                    stdout: format!("{target}\n"),
                    stderr: String::new(),
                },
                None => CommandOutput {
                    exit_code: 1,
                    stdout: String::new(),
                    stderr: String::new(),
                },
            };
        }

        CommandOutput {
            exit_code: 0,
            stdout: String::new(),
            stderr: String::new(),
        }
    }
}

#[async_trait]
impl Connection for FakeConnection {
    async fn run(&self, command: &str, _timeout: Duration) -> Result<CommandOutput> {
        self.commands.lock().unwrap().push(command.to_string());
        self.emulate_links(command);
        Ok(self.respond(command))
    }

    async fn upload(&self, _local: &Path, remote: &str) -> Result<()> {
        self.commands
            .lock()
            .unwrap()
            .push(format!("upload {remote}"));
        Ok(())
    }

    async fn download(&self, remote: &str, _local: &Path) -> Result<()> {
        self.commands
            .lock()
            .unwrap()
            .push(format!("download {remote}"));
        Ok(())
    }
}

/// Spawn a one-shot-per-connection HTTP endpoint on a loopback port.
///
/// Every request body is captured in arrival order; the endpoint answers
/// each request with `status_line` and an empty body. Returns the base URL
/// and a handle to the captured bodies.
#[allow(dead_code)]
pub async fn spawn_http_endpoint(status_line: &'static str) -> (String, Arc<Mutex<Vec<String>>>) {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let bodies = Arc::new(Mutex::new(Vec::new()));

    let captured = Arc::clone(&bodies);
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let captured = Arc::clone(&captured);
            tokio::spawn(async move {
                let mut raw = Vec::new();
                let mut chunk = [0u8; 4096];
                loop {
                    match socket.read(&mut chunk).await {
                        Ok(0) => break,
                        Ok(n) => {
                            raw.extend_from_slice(&chunk[..n]);
                            if request_complete(&raw) {
                                break;
                            }
                        }
                        Err(_) => break,
                    }
                }

                let text = String::from_utf8_lossy(&raw);
                let body = text
                    .split_once("\r\n\r\n")
                    .map(|(_, body)| body.to_string())
                    .unwrap_or_default();
                captured.lock().unwrap().push(body);

                let response = format!(
                    "HTTP/1.1 {status_line}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n"
                );
                let _ = socket.write_all(response.as_bytes()).await;
            });
        }
    });

    (format!("http://{addr}"), bodies)
}

#[allow(dead_code)]
fn request_complete(raw: &[u8]) -> bool {
    let text = String::from_utf8_lossy(raw);
    let Some((head, body)) = text.split_once("\r\n\r\n") else {
        return false;
    };

    let expected = head
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())
                .flatten()
        })
        .unwrap_or(0);

    body.len() >= expected
}

/// A minimal config targeting /var/www/app, for pipeline tests.
#[allow(dead_code)]
pub fn test_config() -> caravel::config::Config {
    caravel::config::Config::from_yaml(
        r#"
server:
  host: app.example.com
  username: deploy
repository:
  url: git@github.com:org/app.git
paths:
  deploy_to: /var/www/app
"#,
    )
    .unwrap()
}
