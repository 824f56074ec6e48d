//! UDP listeners
//!
//! Each datagram is decoded and handled in its own task. The handler runs
//! in a nested task so a panic inside it is observed through the
//! `JoinHandle` and answered with the handler's fallback reply instead of
//! leaving the NAS without a response.

use async_trait::async_trait;
use radius_proto::{sign_response, AttributeType, Code, Packet, PacketError};
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::UdpSocket;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Packet error: {0}")]
    Packet(#[from] PacketError),
}

/// Work that runs once the reply has been sent.
pub type Followup = Pin<Box<dyn Future<Output = ()> + Send>>;

/// A reply produced by a [`RequestHandler`], not yet signed.
pub struct Response {
    /// Built with [`Packet::reply_to`]
    pub packet: Packet,
    /// Shared secret the reply is signed with
    pub secret: String,
    pub followup: Option<Followup>,
}

impl Response {
    pub fn new(packet: Packet, secret: impl Into<String>) -> Self {
        Response {
            packet,
            secret: secret.into(),
            followup: None,
        }
    }

    pub fn with_followup(mut self, followup: Followup) -> Self {
        self.followup = Some(followup);
        self
    }
}

#[async_trait]
pub trait RequestHandler: Send + Sync + 'static {
    /// Packet codes this listener answers; anything else is dropped.
    fn accepts(&self, code: Code) -> bool;

    /// Process one request. `None` means no reply is sent.
    async fn handle(&self, request: Packet, source: SocketAddr) -> Option<Response>;

    /// Reply used when [`RequestHandler::handle`] panicked.
    async fn fallback(&self, request: &Packet, source: SocketAddr) -> Option<Response>;
}

pub struct RadiusServer<H> {
    socket: Arc<UdpSocket>,
    handler: Arc<H>,
    debug: bool,
}

impl<H: RequestHandler> RadiusServer<H> {
    pub async fn bind(addr: SocketAddr, handler: Arc<H>) -> Result<Self, ServerError> {
        let socket = UdpSocket::bind(addr).await?;
        info!("RADIUS server listening on {}", socket.local_addr()?);
        Ok(RadiusServer {
            socket: Arc::new(socket),
            handler,
            debug: false,
        })
    }

    /// Dump decoded requests and replies at debug level.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Useful when bound to port 0.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.socket.local_addr().map_err(ServerError::from)
    }

    pub async fn run(&self) -> Result<(), ServerError> {
        let mut buf = vec![0u8; Packet::MAX_PACKET_SIZE];

        loop {
            let (len, addr) = self.socket.recv_from(&mut buf).await?;
            let data = buf[..len].to_vec();

            let handler = Arc::clone(&self.handler);
            let socket = Arc::clone(&self.socket);
            let dump = self.debug;

            tokio::spawn(async move {
                if let Err(e) = Self::handle_datagram(data, addr, handler, socket, dump).await {
                    debug!("Error handling request from {}: {}", addr, e);
                }
            });
        }
    }

    async fn handle_datagram(
        data: Vec<u8>,
        addr: SocketAddr,
        handler: Arc<H>,
        socket: Arc<UdpSocket>,
        dump: bool,
    ) -> Result<(), ServerError> {
        let request = Packet::decode(&data)?;
        if dump {
            dump_packet("request", &request, addr);
        }

        if !handler.accepts(request.code) {
            warn!(packet_type = ?request.code, client_addr = %addr, "Unsupported packet type");
            return Ok(());
        }

        let task = {
            let handler = Arc::clone(&handler);
            let request = request.clone();
            tokio::spawn(async move { handler.handle(request, addr).await })
        };
        let response = match task.await {
            Ok(response) => response,
            Err(e) => {
                error!(client_addr = %addr, request_id = request.identifier, error = %e, "Request handler failed");
                handler.fallback(&request, addr).await
            }
        };

        let Some(Response {
            mut packet,
            secret,
            followup,
        }) = response
        else {
            return Ok(());
        };

        packet.copy_proxy_state(&request);
        sign_response(&mut packet, &request.authenticator, secret.as_bytes())?;
        socket.send_to(&packet.encode()?, addr).await?;

        if dump {
            dump_packet("response", &packet, addr);
        }
        debug!(
            response_type = ?packet.code,
            client_addr = %addr,
            request_id = packet.identifier,
            "Sent RADIUS response"
        );

        if let Some(followup) = followup {
            followup.await;
        }
        Ok(())
    }
}

fn dump_packet(direction: &str, packet: &Packet, addr: SocketAddr) {
    let attributes: Vec<String> = packet
        .attributes
        .iter()
        .map(|attr| match AttributeType::from_u8(attr.attr_type) {
            Some(known @ (AttributeType::UserPassword | AttributeType::ChapPassword)) => {
                format!("{:?}(len={}, hidden)", known, attr.value.len())
            }
            Some(known) => format!("{:?}(len={})", known, attr.value.len()),
            None => format!("Unknown-{}(len={})", attr.attr_type, attr.value.len()),
        })
        .collect();
    debug!(
        direction = direction,
        client_addr = %addr,
        code = ?packet.code,
        request_id = packet.identifier,
        attributes = %attributes.join(", "),
        "RADIUS packet"
    );
}
