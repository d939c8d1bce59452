use pacs_provision::config::PostgresConfig;
use pacs_provision::error::IsRetryable;
use pacs_provision::service::prompt::CredentialPrompt;
use pacs_provision::service::setup::{connect_or_start, retry_transient};
use pacs_provision::{InstanceConfig, InstanceManager, RunState, SetupError};
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

fn manager_on(port: u16) -> InstanceManager {
    manager_with(port, "password", Path::new("./postgres_files"))
}

fn manager_with(port: u16, password: &str, binary_dir: &Path) -> InstanceManager {
    let mut pg = PostgresConfig::default();
    pg.host = "127.0.0.1".to_string();
    pg.port = port;
    pg.password = password.to_string();
    pg.binary_dir = binary_dir.to_path_buf();
    InstanceManager::new(InstanceConfig::from(&pg), 1)
}

async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

/// `ErrorResponse` with SQLSTATE 28P01 (invalid_password).
fn auth_error() -> Vec<u8> {
    let mut fields = Vec::new();
    for (tag, value) in [
        (b'S', "FATAL"),
        (b'V', "FATAL"),
        (b'C', "28P01"),
        (b'M', "password authentication failed for user \"postgres\""),
    ] {
        fields.push(tag);
        fields.extend_from_slice(value.as_bytes());
        fields.push(0);
    }
    fields.push(0);
    message(b'E', &fields)
}

fn message(tag: u8, body: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    out.extend_from_slice(&(body.len() as i32 + 4).to_be_bytes());
    out.extend_from_slice(body);
    out
}

async fn read_message(sock: &mut TcpStream) -> io::Result<(u8, Vec<u8>)> {
    let tag = sock.read_u8().await?;
    let len = sock.read_i32().await?;
    let mut body = vec![0; (len - 4).max(0) as usize];
    sock.read_exact(&mut body).await?;
    Ok((tag, body))
}

/// One backend session: cleartext password auth against `accepted`, then
/// answer queries with an empty result until the client terminates.
async fn backend_session(mut sock: TcpStream, accepted: Option<&str>) -> io::Result<()> {
    let len = sock.read_i32().await?;
    let mut startup = vec![0; (len - 4).max(0) as usize];
    sock.read_exact(&mut startup).await?;

    let Some(accepted) = accepted else {
        return sock.write_all(&auth_error()).await;
    };

    sock.write_all(&message(b'R', &3i32.to_be_bytes())).await?;
    let (tag, body) = read_message(&mut sock).await?;
    if tag != b'p' || body.strip_suffix(b"\0") != Some(accepted.as_bytes()) {
        return sock.write_all(&auth_error()).await;
    }

    let mut reply = message(b'R', &0i32.to_be_bytes());
    reply.extend(message(b'Z', b"I"));
    sock.write_all(&reply).await?;

    loop {
        match read_message(&mut sock).await? {
            (b'Q', _) => {
                let mut reply = message(b'I', &[]);
                reply.extend(message(b'Z', b"I"));
                sock.write_all(&reply).await?;
            }
            (b'S', _) => sock.write_all(&message(b'Z', b"I")).await?,
            _ => return Ok(()),
        }
    }
}

/// Listener speaking just enough of the wire protocol to authenticate.
/// `None` rejects every login.
async fn mock_backend(accepted: Option<&'static str>) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        while let Ok((sock, _)) = listener.accept().await {
            tokio::spawn(backend_session(sock, accepted));
        }
    });
    port
}

#[derive(Clone)]
struct ScriptedPrompt {
    answer: &'static str,
    calls: Arc<AtomicUsize>,
}

impl ScriptedPrompt {
    fn new(answer: &'static str) -> Self {
        Self {
            answer,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CredentialPrompt for ScriptedPrompt {
    fn read_password(&self, _user: &str) -> io::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.answer.to_string())
    }

    fn pause(&self) {}
}

#[tokio::test]
async fn closed_port_is_not_running() {
    let state = manager_on(closed_port().await).is_running().await.unwrap();
    assert_eq!(state, RunState::NotRunning);
    assert!(!state.needs_password());
}

#[tokio::test]
async fn non_database_listener_is_a_generic_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        while let Ok((mut sock, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 512];
                let _ = sock.read(&mut buf).await;
                // Not a valid backend message type.
                let _ = sock.write_all(b"!\0\0\0\x04").await;
            });
        }
    });

    let result = manager_on(port).is_running().await;
    assert!(
        matches!(result, Err(SetupError::Database(_))),
        "expected a generic database error, got {result:?}"
    );
}

#[tokio::test]
async fn rejected_login_is_auth_failed() {
    let port = mock_backend(None).await;

    let state = manager_on(port).is_running().await.unwrap();
    assert_eq!(state, RunState::AuthFailed);
    assert!(state.is_running());
    assert!(state.needs_password());
}

#[tokio::test]
async fn accepted_login_is_reachable() {
    let port = mock_backend(Some("secret")).await;
    let dir = tempfile::tempdir().unwrap();

    let mut manager = manager_with(port, "secret", dir.path());
    assert_eq!(manager.is_running().await.unwrap(), RunState::Reachable);

    manager.set_password("nope");
    assert_eq!(manager.is_running().await.unwrap(), RunState::AuthFailed);
}

#[tokio::test]
async fn default_password_is_tried_before_prompting() {
    let port = mock_backend(Some("secret")).await;
    let dir = tempfile::tempdir().unwrap();
    let mut manager = manager_with(port, "stale", dir.path());
    let prompt = ScriptedPrompt::new("unused");

    let started = connect_or_start(&mut manager, "secret", &prompt)
        .await
        .unwrap();

    assert!(!started);
    assert_eq!(prompt.calls(), 0);
    assert_eq!(manager.config().password, "secret");
}

#[tokio::test]
async fn prompted_password_recovers_a_rejected_default() {
    let port = mock_backend(Some("hunter2")).await;
    let dir = tempfile::tempdir().unwrap();
    let mut manager = manager_with(port, "secret", dir.path());
    let prompt = ScriptedPrompt::new("hunter2");

    let started = connect_or_start(&mut manager, "secret", &prompt)
        .await
        .unwrap();

    assert!(!started);
    assert_eq!(prompt.calls(), 1);
    assert_eq!(manager.config().password, "hunter2");
}

#[tokio::test]
async fn second_rejection_is_fatal_after_one_prompt() {
    let port = mock_backend(Some("hunter2")).await;
    let dir = tempfile::tempdir().unwrap();
    let mut manager = manager_with(port, "secret", dir.path());
    let prompt = ScriptedPrompt::new("wrong");

    let err = connect_or_start(&mut manager, "secret", &prompt)
        .await
        .unwrap_err();

    assert!(matches!(err, SetupError::AuthenticationFailed { ref user } if user == "postgres"));
    assert_eq!(prompt.calls(), 1);
}

#[tokio::test]
async fn absent_instance_starts_with_default_password_without_prompting() {
    let dir = tempfile::tempdir().unwrap();
    let mut manager = manager_with(closed_port().await, "stale", dir.path());
    let prompt = ScriptedPrompt::new("unused");

    // No binaries in the temp dir, so the fresh start stops at initialize.
    let err = connect_or_start(&mut manager, "secret", &prompt)
        .await
        .unwrap_err();

    assert!(matches!(err, SetupError::MissingBinaries { .. }));
    assert_eq!(prompt.calls(), 0);
    assert_eq!(manager.config().password, "secret");
}

#[tokio::test]
async fn refused_provisioning_is_transient() {
    let manager = manager_on(closed_port().await);

    let err = manager.provision_schema(Duration::ZERO).await.unwrap_err();

    assert!(
        matches!(err, SetupError::TransientConnection { ref step, .. } if step == "connect to postgres database"),
        "expected a transient connection error, got {err:?}"
    );
    assert!(err.is_retryable());
}

#[tokio::test]
async fn refused_provisioning_is_retried_three_times() {
    let manager = manager_on(closed_port().await);
    let calls = Arc::new(AtomicUsize::new(0));

    let result = retry_transient(3, Duration::from_millis(5), || {
        let calls = calls.clone();
        let manager = &manager;
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            manager.provision_schema(Duration::ZERO).await
        }
    })
    .await;

    assert!(matches!(result, Err(SetupError::TransientConnection { .. })));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}
