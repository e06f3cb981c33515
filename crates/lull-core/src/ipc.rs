use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::{atomic::AtomicBool, atomic::Ordering, Arc, Mutex, PoisonError},
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{UnixListener, UnixStream},
    sync::mpsc,
};

use crate::command::EngineCommand;
use crate::scheduler::SchedulerStatus;

/// IPC request from CLI to daemon
#[derive(Serialize, Deserialize, Debug)]
pub enum IpcRequest {
    Status,
    Command(EngineCommand),
    Shutdown,
}

/// IPC response from daemon to CLI
#[derive(Serialize, Deserialize, Debug)]
pub enum IpcResponse {
    /// `None` while the engine has not completed its first tick yet
    Status(Option<SchedulerStatus>),
    Ack,
    Error(String),
}

/// Last published scheduler snapshot, shared between the engine task and
/// the IPC handler so status requests never touch live engine state.
#[derive(Clone, Default)]
pub struct StatusMirror(Arc<Mutex<Option<SchedulerStatus>>>);

impl StatusMirror {
    pub fn set(&self, status: SchedulerStatus) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = Some(status);
    }

    #[must_use]
    pub fn get(&self) -> Option<SchedulerStatus> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[derive(Debug)]
pub struct IpcClient {
    sock_path: PathBuf,
}

impl IpcClient {
    #[must_use]
    pub fn new(sock_path: &Path) -> Self {
        Self {
            sock_path: sock_path.to_path_buf(),
        }
    }

    /// Send one request and wait for the daemon's response.
    ///
    /// # Errors
    ///
    /// Returns an error if the daemon is unreachable or the wire format
    /// cannot be decoded.
    pub async fn send_command(&self, request: IpcRequest) -> Result<IpcResponse> {
        let mut stream = UnixStream::connect(&self.sock_path).await?;

        let encoded = bincode::serialize(&request)?;
        stream.write_all(&encoded).await?;
        stream.shutdown().await?;

        let mut buffer = Vec::new();
        stream.read_to_end(&mut buffer).await?;
        let response: IpcResponse = bincode::deserialize(&buffer)?;

        Ok(response)
    }
}

/// Daemon-side request handler; only ever enqueues towards the engine.
pub struct EngineIpcHandler {
    commands: mpsc::UnboundedSender<EngineCommand>,
    status: StatusMirror,
    shutdown_signal: Arc<AtomicBool>,
}

impl EngineIpcHandler {
    #[must_use]
    pub fn new(
        commands: mpsc::UnboundedSender<EngineCommand>,
        status: StatusMirror,
        shutdown_signal: Arc<AtomicBool>,
    ) -> Self {
        Self {
            commands,
            status,
            shutdown_signal,
        }
    }

    fn response_for(&self, request: IpcRequest) -> IpcResponse {
        match request {
            IpcRequest::Status => IpcResponse::Status(self.status.get()),
            IpcRequest::Command(command) => {
                if self.commands.send(command).is_err() {
                    IpcResponse::Error(String::from("engine is not running"))
                } else {
                    IpcResponse::Ack
                }
            }
            IpcRequest::Shutdown => {
                self.shutdown_signal.store(true, Ordering::SeqCst);
                IpcResponse::Ack
            }
        }
    }

    async fn handle(&self, stream: &mut UnixStream, request: IpcRequest) -> Result<()> {
        let response = self.response_for(request);
        let encoded = bincode::serialize(&response)?;
        stream.write_all(&encoded).await?;
        Ok(())
    }
}

/// Accept loop for the daemon's control socket.
///
/// Undecodable payloads are answered with an explicit error response, never
/// silently dropped.
///
/// # Errors
///
/// Returns an error if the socket cannot be bound.
pub async fn listen(handler: Arc<EngineIpcHandler>, sock_path: &Path) -> io::Result<()> {
    if sock_path.exists() {
        fs::remove_file(sock_path)?;
    }
    if let Some(parent) = sock_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let listener = UnixListener::bind(sock_path)?;
    log::info!("IPC listening on {}", sock_path.display());

    loop {
        match listener.accept().await {
            Ok((mut stream, _)) => {
                let handler = handler.clone();
                tokio::spawn(async move {
                    let mut buf = Vec::new();
                    match stream.read_to_end(&mut buf).await {
                        Ok(n) if n > 0 => match bincode::deserialize::<IpcRequest>(&buf[..n]) {
                            Ok(request) => {
                                if let Err(e) = handler.handle(&mut stream, request).await {
                                    log::error!("IPC handle error: {e}");
                                }
                            }
                            Err(_) => {
                                let response =
                                    IpcResponse::Error(String::from("unknown command"));
                                if let Ok(encoded) = bincode::serialize(&response) {
                                    let _ = stream.write_all(&encoded).await;
                                }
                            }
                        },
                        Ok(_) => {} // Connection closed without payload
                        Err(e) => {
                            log::error!("IPC read error: {e}");
                        }
                    }
                });
            }
            Err(e) => {
                log::error!("IPC accept error: {e}");
            }
        }
    }
}
