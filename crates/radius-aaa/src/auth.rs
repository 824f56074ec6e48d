//! Access-Request pipeline
//!
//! Each step returns early with an [`AuthError`]; the error text becomes
//! the Reply-Message of the Access-Reject. Learned MAC/VLAN bindings are
//! persisted only after the Accept has been sent.

use crate::authorize::authorize;
use crate::binding::check_binding;
use crate::context::AaaContext;
use crate::directory::{get_user, resolve_nas};
use crate::error::{AuthError, StoreError};
use crate::models::{AuthLog, SubscriberUpdate};
use crate::password::{resolve_local_password, Credentials, PasswordVerifier};
use crate::server::{Followup, RequestHandler, Response};
use crate::vendor_parser::parse_vendor_request;
use async_trait::async_trait;
use chrono::Utc;
use radius_proto::{Attribute, AttributeType, Code, Packet};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

const MAX_REPLY_MESSAGE: usize = 253;

pub struct AuthService {
    ctx: Arc<AaaContext>,
}

/// Outcome of a successful pipeline run.
struct Accepted {
    packet: Packet,
    secret: String,
    followup: Option<Followup>,
}

/// Failure plus the secret the reject must be signed with.
struct Rejected {
    error: AuthError,
    secret: String,
}

impl AuthService {
    pub fn new(ctx: Arc<AaaContext>) -> Self {
        AuthService { ctx }
    }

    async fn access_request(&self, request: Packet, source: SocketAddr) -> Response {
        let start = Instant::now();
        let ip = source.ip();
        let username = request
            .string_attribute(AttributeType::UserName as u8)
            .unwrap_or_default();

        match self.authenticate(&request, ip, &username).await {
            Ok(accepted) => {
                let cast_ms = start.elapsed().as_millis() as u64;
                info!(username = %username, nas_addr = %ip, cast_ms = cast_ms, "Access-Accept");
                self.ctx
                    .audit
                    .log(AuthLog::success(&username, ip.to_string(), cast_ms));

                let response = Response::new(accepted.packet, accepted.secret);
                match accepted.followup {
                    Some(followup) => response.with_followup(followup),
                    None => response,
                }
            }
            Err(Rejected { error, secret }) => {
                let cast_ms = start.elapsed().as_millis() as u64;
                // Without a username the Calling-Station-Id identifies the client.
                let identity = if username.is_empty() {
                    request
                        .string_attribute(AttributeType::CallingStationId as u8)
                        .unwrap_or_default()
                } else {
                    username.clone()
                };
                warn!(
                    username = %identity,
                    nas_addr = %ip,
                    reason = error.kind(),
                    error = %error,
                    "Access-Reject"
                );
                self.ctx.audit.log(AuthLog::failure(
                    identity,
                    ip.to_string(),
                    error.to_string(),
                    cast_ms,
                ));
                Response::new(reject(&request, &error.to_string()), secret)
            }
        }
    }

    async fn authenticate(
        &self,
        request: &Packet,
        ip: IpAddr,
        username: &str,
    ) -> Result<Accepted, Rejected> {
        let placeholder = |error: AuthError| Rejected {
            error,
            secret: self.ctx.config.secret.clone(),
        };

        if username.is_empty() {
            return Err(placeholder(AuthError::EmptyUsername));
        }

        let identifier = request
            .string_attribute(AttributeType::NasIdentifier as u8)
            .unwrap_or_default();
        let nas = resolve_nas(self.ctx.nas_directory.as_ref(), ip, &identifier)
            .await
            .map_err(placeholder)?;

        // From here on the NAS secret signs every reply.
        let secret = nas.secret.clone();
        let fail = |error: AuthError| Rejected {
            error,
            secret: secret.clone(),
        };
        let config = &self.ctx.config;
        let now = Utc::now();

        let credentials = Credentials::from_request(request, secret.as_bytes());
        let vendor_request = parse_vendor_request(request, nas.vendor());
        let is_mac_auth = !vendor_request.macaddr.is_empty() && vendor_request.macaddr == username;
        debug!(
            username = %username,
            nas_addr = %ip,
            method = credentials.method(),
            mac_auth = is_mac_auth,
            "Authenticating"
        );

        let directory = self.ctx.subscribers_for(&nas);
        let subscriber = get_user(directory.as_ref(), username, is_mac_auth, now)
            .await
            .map_err(&fail)?;

        let mut update = SubscriberUpdate::default();
        if !is_mac_auth {
            let active_num = subscriber.profile.active_num;
            if active_num != 0 {
                let online = self
                    .ctx
                    .store
                    .count_online(username)
                    .await
                    .map_err(|e| fail(AuthError::from(e)))?;
                if online >= u64::from(active_num) {
                    return Err(fail(AuthError::SessionCapExceeded {
                        username: username.to_string(),
                        max: active_num,
                    }));
                }
            }
            update = check_binding(&subscriber, &vendor_request).map_err(&fail)?;
        }

        let local = resolve_local_password(
            &subscriber,
            is_mac_auth,
            config.radius.mfa_enabled,
            &config.aes_key,
            now,
        )
        .map_err(&fail)?;

        let verifier = PasswordVerifier {
            secret: secret.as_bytes(),
            ignore_password: config.radius.ignore_password,
            directory: directory.as_ref(),
        };
        let accept = Packet::reply_to(request, Code::AccessAccept);
        let accept = verifier
            .verify(&credentials, username, &local, accept, is_mac_auth)
            .await
            .map_err(&fail)?;

        let accept = authorize(
            subscriber.authorization_profile(),
            nas.vendor(),
            accept,
            now,
            config.radius.acct_interim_interval,
        )
        .map_err(|e| fail(AuthError::from(e)))?;

        let followup = if update.is_empty() {
            None
        } else {
            let username = subscriber.username.clone();
            let followup: Followup = Box::pin(async move {
                match directory.update_fields(&username, &update).await {
                    Ok(()) => debug!(username = %username, update = ?update, "Stored learned binding"),
                    Err(StoreError::Unsupported(what)) => {
                        debug!(username = %username, "{} not available, binding not stored", what)
                    }
                    Err(e) => warn!(username = %username, error = %e, "Failed to store learned binding"),
                }
            });
            Some(followup)
        };

        Ok(Accepted {
            packet: accept,
            secret,
            followup,
        })
    }

    async fn status_server(&self, request: &Packet, source: SocketAddr) -> Option<Response> {
        let identifier = request
            .string_attribute(AttributeType::NasIdentifier as u8)
            .unwrap_or_default();
        match resolve_nas(self.ctx.nas_directory.as_ref(), source.ip(), &identifier).await {
            Ok(nas) => {
                debug!(client_ip = %source.ip(), request_id = request.identifier, "Status-Server request received");
                Some(Response::new(
                    Packet::reply_to(request, Code::AccessAccept),
                    nas.secret,
                ))
            }
            Err(e) => {
                warn!(client_ip = %source.ip(), error = %e, "Ignoring Status-Server from unknown device");
                None
            }
        }
    }
}

/// Access-Reject carrying `message`, cut to fit one attribute.
fn reject(request: &Packet, message: &str) -> Packet {
    let mut packet = Packet::reply_to(request, Code::AccessReject);
    let mut end = message.len().min(MAX_REPLY_MESSAGE);
    while !message.is_char_boundary(end) {
        end -= 1;
    }
    if let Ok(attr) = Attribute::string(AttributeType::ReplyMessage as u8, &message[..end]) {
        packet.add_attribute(attr);
    }
    packet
}

#[async_trait]
impl RequestHandler for AuthService {
    fn accepts(&self, code: Code) -> bool {
        matches!(code, Code::AccessRequest | Code::StatusServer)
    }

    async fn handle(&self, request: Packet, source: SocketAddr) -> Option<Response> {
        match request.code {
            Code::StatusServer => self.status_server(&request, source).await,
            _ => Some(self.access_request(request, source).await),
        }
    }

    async fn fallback(&self, request: &Packet, source: SocketAddr) -> Option<Response> {
        if request.code != Code::AccessRequest {
            return None;
        }
        let identifier = request
            .string_attribute(AttributeType::NasIdentifier as u8)
            .unwrap_or_default();
        let secret = self.ctx.secret_for(source.ip(), &identifier).await;
        Some(Response::new(reject(request, "internal server error"), secret))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditLogger, AuthLogLevel};
    use crate::config::Config;
    use crate::crypto;
    use crate::directory::MemoryDirectory;
    use crate::models::{AuthResult, Nas, OnlineSession, Status, Subscriber, NA};
    use crate::store::{MemoryStore, SessionStore};
    use chrono::Duration;
    use radius_proto::auth::encrypt_user_password;
    use radius_proto::vendor::mikrotik;

    const NAS_SECRET: &str = "nas-secret";

    struct Fixture {
        service: AuthService,
        directory: Arc<MemoryDirectory>,
        store: Arc<MemoryStore>,
        audit: AuditLogger,
    }

    fn nas() -> Nas {
        Nas {
            identifier: "bras-1".into(),
            name: None,
            ipaddr: "127.0.0.1".parse().unwrap(),
            secret: NAS_SECRET.into(),
            vendor_code: mikrotik::VENDOR_ID,
            coa_port: 3799,
            ldap_id: None,
            status: Status::Enabled,
        }
    }

    fn alice(config: &Config) -> Subscriber {
        let mut sub = Subscriber::new("alice");
        sub.password = crypto::encrypt_to_b64("alice-secret", &config.aes_key).unwrap();
        sub.expire_time = Utc::now() + Duration::hours(1);
        sub.profile.up_rate_kbps = 1024;
        sub.profile.down_rate_kbps = 2048;
        sub.profile.active_num = 1;
        sub
    }

    fn fixture() -> Fixture {
        let config = Arc::new(Config::default());
        let directory = Arc::new(MemoryDirectory::new());
        directory.add_nas(nas());
        directory.add_subscriber(alice(&config));
        let store = Arc::new(MemoryStore::new());
        let audit = AuditLogger::spawn(store.clone(), AuthLogLevel::All, None, 64).unwrap();
        let ctx = AaaContext::new(
            config,
            directory.clone(),
            directory.clone(),
            store.clone(),
            audit.clone(),
        );
        Fixture {
            service: AuthService::new(Arc::new(ctx)),
            directory,
            store,
            audit,
        }
    }

    fn pap(username: &str, password: &str) -> Packet {
        let mut req = Packet::new(Code::AccessRequest, 3, [0x33; 16]);
        req.add_attribute(Attribute::string(AttributeType::UserName as u8, username).unwrap());
        let hidden = encrypt_user_password(password, NAS_SECRET.as_bytes(), &req.authenticator);
        req.add_attribute(Attribute::new(AttributeType::UserPassword as u8, hidden).unwrap());
        req
    }

    fn source() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    fn reply_message(packet: &Packet) -> String {
        packet
            .string_attribute(AttributeType::ReplyMessage as u8)
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn test_accept_with_mikrotik_rate_limit() {
        let f = fixture();
        let response = f.service.handle(pap("alice", "alice-secret"), source()).await.unwrap();
        assert_eq!(response.packet.code, Code::AccessAccept);
        assert_eq!(response.secret, NAS_SECRET);
        assert_eq!(
            response
                .packet
                .find_vendor_attribute(mikrotik::VENDOR_ID, mikrotik::RATE_LIMIT)
                .unwrap()
                .as_text(),
            "1024k/2048k"
        );
        let timeout = response
            .packet
            .integer_attribute(AttributeType::SessionTimeout as u8)
            .unwrap();
        assert!((3595..=3600).contains(&timeout), "timeout {}", timeout);

        f.audit.flush().await;
        let logs = f.store.auth_logs().await;
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].result, AuthResult::Success);
    }

    #[tokio::test]
    async fn test_wrong_password_rejected_with_reason() {
        let f = fixture();
        let response = f.service.handle(pap("alice", "nope"), source()).await.unwrap();
        assert_eq!(response.packet.code, Code::AccessReject);
        assert_eq!(reply_message(&response.packet), "user:alice pap password mismatch");

        f.audit.flush().await;
        let logs = f.store.auth_logs().await;
        assert_eq!(logs[0].result, AuthResult::Failure);
        assert_eq!(logs[0].reason, "user:alice pap password mismatch");
    }

    #[tokio::test]
    async fn test_session_cap() {
        let f = fixture();
        let now = Utc::now();
        f.store
            .insert_online(&OnlineSession {
                acct_session_id: "s1".into(),
                username: "alice".into(),
                nas_id: "bras-1".into(),
                nas_addr: "127.0.0.1".into(),
                nas_paddr: "127.0.0.1".into(),
                session_timeout: 0,
                framed_ipaddr: NA.into(),
                framed_netmask: NA.into(),
                mac_addr: NA.into(),
                nas_port: 0,
                nas_class: NA.into(),
                nas_port_id: NA.into(),
                nas_port_type: 0,
                service_type: 0,
                acct_session_time: 0,
                acct_input_total: 0,
                acct_output_total: 0,
                acct_input_packets: 0,
                acct_output_packets: 0,
                acct_start_time: now,
                last_update: now,
            })
            .await
            .unwrap();

        let response = f.service.handle(pap("alice", "alice-secret"), source()).await.unwrap();
        assert_eq!(response.packet.code, Code::AccessReject);
        assert_eq!(
            reply_message(&response.packet),
            "user:alice online count over limit (max=1)"
        );
    }

    #[tokio::test]
    async fn test_unknown_nas_and_empty_username() {
        let f = fixture();
        let stranger: SocketAddr = "10.99.0.1:5000".parse().unwrap();
        let response = f.service.handle(pap("alice", "alice-secret"), stranger).await.unwrap();
        assert_eq!(response.packet.code, Code::AccessReject);
        assert_eq!(response.secret, "testing123");
        assert!(reply_message(&response.packet).starts_with("unauthorized access to device"));

        let mut req = Packet::new(Code::AccessRequest, 4, [0u8; 16]);
        req.add_attribute(
            Attribute::string(AttributeType::CallingStationId as u8, "aa-bb-cc-dd-ee-ff").unwrap(),
        );
        let response = f.service.handle(req, source()).await.unwrap();
        assert_eq!(reply_message(&response.packet), "username is empty");

        f.audit.flush().await;
        let logs = f.store.auth_logs().await;
        assert_eq!(logs[1].username, "aa-bb-cc-dd-ee-ff");
    }

    #[tokio::test]
    async fn test_learned_mac_is_stored_after_accept() {
        let f = fixture();
        let mut req = pap("alice", "alice-secret");
        req.add_attribute(
            Attribute::string(AttributeType::CallingStationId as u8, "aa-bb-cc-dd-ee-ff").unwrap(),
        );
        let response = f.service.handle(req, source()).await.unwrap();
        assert_eq!(response.packet.code, Code::AccessAccept);
        assert_eq!(f.directory.subscriber("alice").unwrap().macaddr, "");

        response.followup.expect("binding update scheduled").await;
        assert_eq!(
            f.directory.subscriber("alice").unwrap().macaddr,
            "aa:bb:cc:dd:ee:ff"
        );
    }

    #[tokio::test]
    async fn test_mac_auth_skips_password() {
        let f = fixture();
        let mut sub = Subscriber::new("device-1");
        sub.macaddr = "11:22:33:44:55:66".into();
        f.directory.add_subscriber(sub);

        let mut req = Packet::new(Code::AccessRequest, 8, [0u8; 16]);
        req.add_attribute(
            Attribute::string(AttributeType::UserName as u8, "11:22:33:44:55:66").unwrap(),
        );
        req.add_attribute(
            Attribute::string(AttributeType::CallingStationId as u8, "11-22-33-44-55-66").unwrap(),
        );
        let response = f.service.handle(req, source()).await.unwrap();
        assert_eq!(response.packet.code, Code::AccessAccept);
    }

    #[tokio::test]
    async fn test_status_server() {
        let f = fixture();
        let req = Packet::new(Code::StatusServer, 1, [0u8; 16]);
        let response = f.service.handle(req.clone(), source()).await.unwrap();
        assert_eq!(response.packet.code, Code::AccessAccept);

        let stranger: SocketAddr = "10.99.0.1:5000".parse().unwrap();
        assert!(f.service.handle(req, stranger).await.is_none());
    }

    #[test]
    fn test_reply_message_truncated() {
        let req = Packet::new(Code::AccessRequest, 1, [0u8; 16]);
        let long = "é".repeat(200);
        let packet = reject(&req, &long);
        let message = packet.find_attribute(AttributeType::ReplyMessage as u8).unwrap();
        assert!(message.value.len() <= MAX_REPLY_MESSAGE);
        assert!(String::from_utf8(message.value.clone()).is_ok());
    }
}
