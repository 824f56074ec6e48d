//! Disconnect-Request issuance (RFC 5176)

use crate::models::Nas;
use radius_proto::auth::generate_request_authenticator;
use radius_proto::{
    sign_request, verify_response_authenticator, Attribute, AttributeType, Code, Packet,
    PacketError,
};
use rand::Rng;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum DisconnectError {
    #[error("Acct-Session-Id is empty, not sending Disconnect-Request")]
    MissingSessionId,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("packet error: {0}")]
    Packet(#[from] PacketError),
    #[error("no response from {0} within {1:?}")]
    Timeout(SocketAddr, Duration),
    #[error("unexpected reply code {0} from {1}")]
    UnexpectedReply(Code, SocketAddr),
}

/// Sends Disconnect-Requests to a NAS's CoA port and waits a bounded time
/// for the answer. There are no retries.
#[derive(Debug, Clone)]
pub struct DisconnectIssuer {
    timeout: Duration,
}

impl DisconnectIssuer {
    pub fn new(timeout: Duration) -> Self {
        DisconnectIssuer { timeout }
    }

    /// Ask `nas` (reached at `target`) to tear down `session_id`.
    ///
    /// Returns the reply code, Disconnect-ACK or Disconnect-NAK.
    pub async fn disconnect(
        &self,
        nas: &Nas,
        target: IpAddr,
        username: &str,
        session_id: &str,
    ) -> Result<Code, DisconnectError> {
        if session_id.is_empty() {
            warn!(username = %username, nas_addr = %target, "Skipping disconnect without Acct-Session-Id");
            return Err(DisconnectError::MissingSessionId);
        }

        let secret = nas.secret.as_bytes();
        let identifier: u8 = rand::rng().random();
        let mut request = Packet::new(Code::DisconnectRequest, identifier, generate_request_authenticator());
        request.add_attribute(Attribute::string(AttributeType::UserName as u8, username)?);
        request.add_attribute(Attribute::string(
            AttributeType::AcctSessionId as u8,
            session_id,
        )?);
        sign_request(&mut request, secret)?;

        let addr = SocketAddr::new(target, nas.coa_port);
        let bind: SocketAddr = if addr.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(bind).await?;
        socket.send_to(&request.encode()?, addr).await?;
        info!(
            username = %username,
            acct_session_id = %session_id,
            nas_addr = %addr,
            identifier = identifier,
            "Disconnect-Request sent"
        );

        let mut buf = vec![0u8; Packet::MAX_PACKET_SIZE];
        let (len, from) = timeout(self.timeout, socket.recv_from(&mut buf))
            .await
            .map_err(|_| DisconnectError::Timeout(addr, self.timeout))??;

        let reply = Packet::decode(&buf[..len])?;
        if reply.identifier != identifier {
            debug!(expected = identifier, got = reply.identifier, "Disconnect reply identifier mismatch");
        }
        if !verify_response_authenticator(&reply, &request.authenticator, secret) {
            warn!(nas_addr = %from, "Disconnect reply authenticator mismatch");
        }

        match reply.code {
            Code::DisconnectAck | Code::DisconnectNak => {
                info!(
                    username = %username,
                    acct_session_id = %session_id,
                    nas_addr = %from,
                    code = %reply.code,
                    "Disconnect reply received"
                );
                Ok(reply.code)
            }
            other => Err(DisconnectError::UnexpectedReply(other, from)),
        }
    }
}
