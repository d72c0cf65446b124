//! TCP serving loop.
//!
//! Connections are handled strictly sequentially: accept, read one
//! length-prefixed request, reply, close. Request processing is
//! synchronous inside the handler, so a slow inference back-pressures
//! the listen queue instead of racing the model store.

use std::sync::Arc;

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::config::EnvConfig;
use crate::dispatch::Dispatcher;
use crate::wire::{self, Request, Response};

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub struct Server {
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
    frame_limit: usize,
}

impl Server {
    pub async fn bind(config: &EnvConfig, dispatcher: Arc<Dispatcher>) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(config.listen_addr()).await?;
        info!(addr = %listener.local_addr()?, "listening");
        Ok(Self {
            listener,
            dispatcher,
            frame_limit: config.frame_limit,
        })
    }

    pub fn local_addr(&self) -> Result<std::net::SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept and serve until a Shutdown request or Ctrl+C arrives.
    pub async fn run(self) -> Result<(), ServerError> {
        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, peer) = accepted?;
                    debug!(%peer, "connection accepted");
                    match self.serve_connection(stream).await {
                        Ok(shutdown) => {
                            if shutdown {
                                info!("shutdown requested over the wire");
                                break;
                            }
                        }
                        Err(error) => warn!(%peer, %error, "connection failed"),
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("shutdown signal received");
                    self.dispatcher.shutdown();
                    break;
                }
            }
        }
        Ok(())
    }

    /// Serve one request/response exchange. Returns true when the client
    /// asked the server to shut down.
    async fn serve_connection(&self, mut stream: TcpStream) -> Result<bool, ServerError> {
        let mut prefix = [0u8; 4];
        stream.read_exact(&mut prefix).await?;
        let length = u32::from_le_bytes(prefix) as usize;

        if length > self.frame_limit {
            let response = Response::Error(format!(
                "message of {length} bytes exceeds the {} byte limit",
                self.frame_limit
            ));
            self.reply(&mut stream, response).await?;
            return Ok(false);
        }

        let mut payload = vec![0u8; length];
        stream.read_exact(&mut payload).await?;

        let (response, shutdown) = match wire::decode_request(&payload) {
            Ok(request) => {
                let shutdown = matches!(request, Request::Shutdown);
                (self.dispatcher.handle(request), shutdown)
            }
            Err(error) => {
                warn!(%error, "undecodable request");
                (Response::Error(format!("malformed request: {error}")), false)
            }
        };

        self.reply(&mut stream, response).await?;
        Ok(shutdown)
    }

    async fn reply(&self, stream: &mut TcpStream, response: Response) -> Result<(), ServerError> {
        let framed = wire::frame(&response.into_bytes());
        stream.write_all(&framed).await?;
        stream.shutdown().await?;
        Ok(())
    }
}
