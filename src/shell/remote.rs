// SSH client side of the shell bridge

use async_trait::async_trait;
use russh::client::{self, Msg};
use russh::{Channel, ChannelMsg, Disconnect, Pty};
use russh_keys::key::{KeyPair, PublicKey};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::CHUNK_SIZE;
use crate::models::Server;

pub const TERM: &str = "xterm-256color";
pub const INITIAL_COLS: u32 = 80;
pub const INITIAL_ROWS: u32 = 40;

const PIPE_CAPACITY: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum ShellError {
    #[error("SSH username not configured for this server")]
    MissingUsername,
    #[error("Invalid SSH port {0}")]
    InvalidPort(i32),
    #[error("Failed to load SSH key {path}: {reason}")]
    Identity { path: String, reason: String },
    #[error("SSH connection failed: {0}")]
    Ssh(#[from] russh::Error),
    #[error("SSH authentication rejected for user {0}")]
    AuthRejected(String),
}

#[derive(Debug, Clone, Default)]
pub struct ShellOptions {
    /// Check host keys against ~/.ssh/known_hosts instead of accepting any key.
    pub strict_host_key_checking: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteTarget {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub key_path: Option<String>,
}

impl RemoteTarget {
    pub fn from_server(server: &Server) -> Result<Self, ShellError> {
        let username = server
            .ssh_username
            .as_deref()
            .filter(|u| !u.is_empty())
            .ok_or(ShellError::MissingUsername)?;
        let port = u16::try_from(server.ssh_port)
            .ok()
            .filter(|p| *p != 0)
            .ok_or(ShellError::InvalidPort(server.ssh_port))?;

        Ok(Self {
            host: server.ip_address.clone(),
            port,
            username: username.to_string(),
            key_path: server.ssh_key_path.clone().filter(|p| !p.is_empty()),
        })
    }
}

pub fn load_identity(path: &str) -> Result<KeyPair, ShellError> {
    russh_keys::load_secret_key(path, None).map_err(|e| ShellError::Identity {
        path: path.to_string(),
        reason: e.to_string(),
    })
}

struct HostKeyVerifier {
    host: String,
    port: u16,
    strict: bool,
}

#[async_trait]
impl client::Handler for HostKeyVerifier {
    type Error = russh::Error;

    async fn check_server_key(&mut self, server_public_key: &PublicKey) -> Result<bool, Self::Error> {
        if !self.strict {
            warn!(host = %self.host, port = self.port, "Accepting SSH host key without verification");
            return Ok(true);
        }

        match russh_keys::check_known_hosts(&self.host, self.port, server_public_key) {
            Ok(true) => Ok(true),
            Ok(false) => {
                warn!(host = %self.host, port = self.port, "SSH host key not in known_hosts");
                Ok(false)
            }
            Err(e) => {
                warn!(host = %self.host, port = self.port, "SSH host key check failed: {}", e);
                Ok(false)
            }
        }
    }
}

/// Local ends of the remote shell's standard streams.
pub struct ShellStreams {
    pub stdin: DuplexStream,
    pub stdout: DuplexStream,
    pub stderr: DuplexStream,
}

/// A live SSH connection with one interactive shell channel.
pub struct RemoteShell {
    handle: client::Handle<HostKeyVerifier>,
    pump: JoinHandle<()>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl RemoteShell {
    /// Dials the target, authenticates, requests a PTY and starts the login shell.
    pub async fn open(
        target: &RemoteTarget,
        options: &ShellOptions,
    ) -> Result<(Self, ShellStreams), ShellError> {
        let identity = target.key_path.as_deref().map(load_identity).transpose()?;

        let verifier = HostKeyVerifier {
            host: target.host.clone(),
            port: target.port,
            strict: options.strict_host_key_checking,
        };
        let config = Arc::new(client::Config::default());
        let mut handle =
            client::connect(config, (target.host.as_str(), target.port), verifier).await?;

        let authenticated = match identity {
            Some(key) => {
                handle
                    .authenticate_publickey(&target.username, Arc::new(key))
                    .await?
            }
            None => {
                warn!(host = %target.host, "No SSH key configured, trying empty password");
                handle.authenticate_password(&target.username, "").await?
            }
        };
        if !authenticated {
            return Err(ShellError::AuthRejected(target.username.clone()));
        }

        #[allow(unused_mut)]
        let mut channel = handle.channel_open_session().await?;
        channel
            .request_pty(
                false,
                TERM,
                INITIAL_COLS,
                INITIAL_ROWS,
                0,
                0,
                &[
                    (Pty::ECHO, 1),
                    (Pty::TTY_OP_ISPEED, 14400),
                    (Pty::TTY_OP_OSPEED, 14400),
                ],
            )
            .await?;
        channel.request_shell(false).await?;

        let (stdin_local, stdin_remote) = tokio::io::duplex(PIPE_CAPACITY);
        let (stdout_remote, stdout_local) = tokio::io::duplex(PIPE_CAPACITY);
        let (stderr_remote, stderr_local) = tokio::io::duplex(PIPE_CAPACITY);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let pump = tokio::spawn(pump_channel(
            channel,
            stdin_remote,
            stdout_remote,
            stderr_remote,
            shutdown_rx,
        ));

        Ok((
            Self {
                handle,
                pump,
                shutdown: Some(shutdown_tx),
            },
            ShellStreams {
                stdin: stdin_local,
                stdout: stdout_local,
                stderr: stderr_local,
            },
        ))
    }

    /// Closes the shell channel, then the connection.
    pub async fn close(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Err(e) = self.pump.await {
            debug!("SSH channel task ended abnormally: {}", e);
        }
        if let Err(e) = self
            .handle
            .disconnect(Disconnect::ByApplication, "", "English")
            .await
        {
            debug!("SSH disconnect failed: {}", e);
        }
    }
}

// Moves bytes between the SSH channel and the local pipes until either side ends.
async fn pump_channel(
    mut channel: Channel<Msg>,
    mut stdin: DuplexStream,
    mut stdout: DuplexStream,
    mut stderr: DuplexStream,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            read = stdin.read(&mut buf), if stdin_open => match read {
                Ok(0) | Err(_) => {
                    stdin_open = false;
                    let _ = channel.eof().await;
                }
                Ok(n) => {
                    if let Err(e) = channel.data(&buf[..n]).await {
                        debug!("Failed to write to SSH stdin: {}", e);
                        break;
                    }
                }
            },
            msg = channel.wait() => match msg {
                Some(ChannelMsg::Data { ref data }) => {
                    if stdout.write_all(data).await.is_err() {
                        break;
                    }
                }
                // ext 1 is SSH_EXTENDED_DATA_STDERR
                Some(ChannelMsg::ExtendedData { ref data, ext: 1 }) => {
                    if stderr.write_all(data).await.is_err() {
                        break;
                    }
                }
                Some(ChannelMsg::ExitStatus { exit_status }) => {
                    debug!(exit_status, "Remote shell exited");
                }
                Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => break,
                Some(_) => {}
            },
        }
    }

    let _ = channel.close().await;
}
