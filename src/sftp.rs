// sftp.rs - Asset Publisher Module
// Uploads an in-memory GIF to the asset server over SFTP.
//
// Key Features:
// - AssetPublisher trait so the workflow can run against fakes in tests
// - libssh2 (ssh2 crate) with password auth, run on the blocking pool
// - Session guard that disconnects on every exit path
// - Connect and session timeouts so a silent server cannot pin a blocking thread
// - Existing remote files with the same name are overwritten
//
// Used by: workflow.rs, main.rs (publisher construction)

use std::io::{self, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use ssh2::Session;
use thiserror::Error;

use crate::assets::CanonicalAssetName;
use crate::config::SftpTarget;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("connection failed: {0}")]
    Connect(#[source] std::io::Error),
    #[error("authentication failed for user `{0}`")]
    AuthRejected(String),
    #[error(transparent)]
    Ssh(#[from] ssh2::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("upload task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[async_trait]
pub trait AssetPublisher: Send + Sync {
    /// Write `payload` to the remote asset directory as `name`, replacing any existing file
    async fn publish(&self, name: &CanonicalAssetName, payload: Vec<u8>) -> Result<(), PublishError>;
}

/// Full remote path for an asset: `{remote_path}/{name}`
pub fn remote_file_path(remote_path: &str, name: &CanonicalAssetName) -> String {
    format!("{}/{}", remote_path.trim_end_matches('/'), name)
}

// ============================================================================
// SSH SESSION GUARD
// ============================================================================

/// First resolved address that accepts within `timeout`
fn connect_tcp(host: &str, port: u16, timeout: Duration) -> io::Result<TcpStream> {
    let mut last_error = io::Error::new(io::ErrorKind::NotFound, format!("{} did not resolve", host));
    for addr in (host, port).to_socket_addrs()? {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(tcp) => return Ok(tcp),
            Err(e) => {
                debug!("[SFTP] Connect to {} failed: {}", addr, e);
                last_error = e;
            }
        }
    }
    Err(last_error)
}

/// Owns an SSH session and disconnects it when dropped
struct OpenSession {
    session: Session,
    host: String,
}

impl OpenSession {
    fn connect(target: &SftpTarget) -> Result<Self, PublishError> {
        let tcp = connect_tcp(&target.host, target.port, target.timeout).map_err(PublishError::Connect)?;

        let mut session = Session::new()?;
        // Applies to handshake, auth and every SFTP call made through this session
        session.set_timeout(u32::try_from(target.timeout.as_millis()).unwrap_or(u32::MAX));
        session.set_tcp_stream(tcp);
        session.handshake()?;

        let guard = OpenSession {
            session,
            host: target.host.clone(),
        };
        debug!("[SFTP] Session opened to {}:{}", target.host, target.port);

        guard.session.userauth_password(&target.username, &target.password)?;
        if !guard.session.authenticated() {
            return Err(PublishError::AuthRejected(target.username.clone()));
        }

        Ok(guard)
    }
}

impl Drop for OpenSession {
    fn drop(&mut self) {
        match self.session.disconnect(None, "gifbot upload finished", None) {
            Ok(()) => debug!("[SFTP] Session to {} closed", self.host),
            Err(e) => debug!("[SFTP] Session to {} closed with error: {}", self.host, e),
        }
    }
}

fn upload_blocking(target: &SftpTarget, remote_file: &str, payload: &[u8]) -> Result<(), PublishError> {
    let session = OpenSession::connect(target)?;
    let sftp = session.session.sftp()?;

    // create() opens with WRITE | CREATE | TRUNCATE, so an existing file is replaced
    let file = sftp.create(Path::new(remote_file))?;
    write_remote(file, payload)
}

/// A remote file handle whose close can fail (the server reports write errors there)
trait RemoteFile: Write {
    fn close(&mut self) -> Result<(), PublishError>;
}

impl RemoteFile for ssh2::File {
    fn close(&mut self) -> Result<(), PublishError> {
        ssh2::File::close(self)?;
        Ok(())
    }
}

fn write_remote<F: RemoteFile>(mut file: F, payload: &[u8]) -> Result<(), PublishError> {
    file.write_all(payload)?;
    file.flush()?;
    file.close()
}

// ============================================================================
// PUBLISHER
// ============================================================================

#[derive(Debug, Clone)]
pub struct SftpPublisher {
    target: SftpTarget,
}

impl SftpPublisher {
    pub fn new(target: SftpTarget) -> Self {
        SftpPublisher { target }
    }
}

#[async_trait]
impl AssetPublisher for SftpPublisher {
    async fn publish(&self, name: &CanonicalAssetName, payload: Vec<u8>) -> Result<(), PublishError> {
        let target = self.target.clone();
        let remote_file = remote_file_path(&target.remote_path, name);
        let size = payload.len();

        info!("📤 [SFTP] Uploading {} bytes to {}:{}", size, target.host, remote_file);

        let result = tokio::task::spawn_blocking(move || upload_blocking(&target, &remote_file, &payload)).await?;

        match &result {
            Ok(()) => info!("✅ [SFTP] Uploaded {} ({} bytes)", name, size),
            Err(e) => warn!("❌ [SFTP] Upload of {} failed: {}", name, e),
        }

        result
    }
}
