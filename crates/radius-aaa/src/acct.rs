//! Accounting-Request pipeline
//!
//! Session state lives entirely in the [`SessionStore`](crate::store::SessionStore).
//! Every request is answered with an Accounting-Response; processing
//! failures are logged and never reach the NAS.

use crate::context::AaaContext;
use crate::directory::{get_user_for_accounting, resolve_nas};
use crate::error::StoreError;
use crate::models::{or_na, AccountingRecord, Nas, OnlineSession, Status, NA};
use crate::server::{RequestHandler, Response};
use crate::vendor_parser::parse_vendor_request;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use radius_proto::{
    octets_with_gigawords, verify_accounting_request_authenticator, AcctStatusType, AttributeType,
    Code, Packet,
};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub struct AcctService {
    ctx: Arc<AaaContext>,
}

impl AcctService {
    pub fn new(ctx: Arc<AaaContext>) -> Self {
        AcctService { ctx }
    }

    async fn accounting_request(&self, request: &Packet, source: SocketAddr) -> Response {
        let ip = source.ip();
        let identifier = request
            .string_attribute(AttributeType::NasIdentifier as u8)
            .unwrap_or_default();
        let reply = Packet::reply_to(request, Code::AccountingResponse);

        let nas = match resolve_nas(self.ctx.nas_directory.as_ref(), ip, &identifier).await {
            Ok(nas) => nas,
            Err(e) => {
                warn!(nas_addr = %ip, error = %e, "Accounting from unauthorized device");
                return Response::new(reply, self.ctx.config.secret.clone());
            }
        };

        if !verify_accounting_request_authenticator(request, nas.secret.as_bytes()) {
            warn!(nas_addr = %ip, request_id = request.identifier, "Accounting-Request authenticator mismatch");
        }

        let status = request
            .integer_attribute(AttributeType::AcctStatusType as u8)
            .and_then(AcctStatusType::from_u32);
        match status {
            Some(status) => self.dispatch(status, request, &nas, ip).await,
            None => warn!(nas_addr = %ip, "Accounting-Request without a known Acct-Status-Type"),
        }

        Response::new(reply, nas.secret)
    }

    async fn dispatch(&self, status: AcctStatusType, request: &Packet, nas: &Nas, source: IpAddr) {
        match status {
            AcctStatusType::AccountingOn | AcctStatusType::AccountingOff => {
                self.clear_nas(status, request, nas).await;
                return;
            }
            _ => {}
        }

        let username = request
            .string_attribute(AttributeType::UserName as u8)
            .unwrap_or_default();
        if username.is_empty() {
            warn!(nas_addr = %source, status = ?status, "Accounting-Request without User-Name");
            return;
        }

        let now = Utc::now();
        let session = online_session_from(request, &username, nas, source, now);
        // Sessions are keyed by Acct-Session-Id; without one there is nothing to track.
        if session.acct_session_id.is_empty() {
            warn!(
                username = %username,
                nas_addr = %source,
                status = ?status,
                "Accounting-Request without Acct-Session-Id ignored"
            );
            return;
        }
        match status {
            AcctStatusType::Start => self.start(&session).await,
            AcctStatusType::InterimUpdate => self.interim(&session, nas, source).await,
            AcctStatusType::Stop => self.stop(session, now).await,
            _ => {}
        }
    }

    async fn start(&self, session: &OnlineSession) {
        match self.ctx.store.insert_online(session).await {
            Ok(()) => info!(
                username = %session.username,
                acct_session_id = %session.acct_session_id,
                nas_addr = %session.nas_addr,
                "Session started"
            ),
            Err(StoreError::Duplicate(id)) => {
                warn!(acct_session_id = %id, username = %session.username, "Duplicate Accounting-Start ignored")
            }
            Err(e) => error!(username = %session.username, error = %e, "Failed to record session start"),
        }
    }

    async fn interim(&self, session: &OnlineSession, nas: &Nas, source: IpAddr) {
        // LDAP-backed NAS are exempt: their account state lives in the
        // directory and is enforced there, not by disconnects from here.
        if nas.ldap_id.is_none() {
            self.enforce_policy(session, nas, source).await;
        }

        if let Err(e) = self.ctx.store.upsert_online(session).await {
            error!(
                username = %session.username,
                acct_session_id = %session.acct_session_id,
                error = %e,
                "Failed to update online session"
            );
        }
    }

    /// Disconnect sessions whose subscriber is gone, disabled or expired.
    async fn enforce_policy(&self, session: &OnlineSession, nas: &Nas, source: IpAddr) {
        let directory = self.ctx.subscribers_for(nas);
        let reason = match get_user_for_accounting(directory.as_ref(), &session.username).await {
            Ok(None) => "subscriber no longer exists",
            Ok(Some(sub)) if sub.status == Status::Disabled => "subscriber is disabled",
            Ok(Some(sub)) if sub.is_expired(Utc::now()) => "subscriber is expired",
            Ok(Some(_)) => return,
            Err(e) => {
                error!(username = %session.username, error = %e, "Subscriber lookup failed during interim update");
                return;
            }
        };

        info!(
            username = %session.username,
            acct_session_id = %session.acct_session_id,
            reason = reason,
            "Disconnecting session"
        );
        let disconnector = self.ctx.disconnector.clone();
        let nas = nas.clone();
        let username = session.username.clone();
        let session_id = session.acct_session_id.clone();
        tokio::spawn(async move {
            if let Err(e) = disconnector.disconnect(&nas, source, &username, &session_id).await {
                warn!(username = %username, acct_session_id = %session_id, error = %e, "Disconnect failed");
            }
        });
    }

    async fn stop(&self, session: OnlineSession, now: DateTime<Utc>) {
        let session_id = session.acct_session_id.clone();
        let username = session.username.clone();
        let record = AccountingRecord {
            session,
            acct_stop_time: now,
        };
        if let Err(e) = self.ctx.store.insert_accounting(&record).await {
            error!(username = %username, acct_session_id = %session_id, error = %e, "Failed to store accounting record");
        }
        match self.ctx.store.delete_online(&session_id).await {
            Ok(0) => debug!(acct_session_id = %session_id, "Stop for a session that was not online"),
            Ok(_) => info!(username = %username, acct_session_id = %session_id, "Session stopped"),
            Err(e) => error!(acct_session_id = %session_id, error = %e, "Failed to remove online session"),
        }
    }

    async fn clear_nas(&self, status: AcctStatusType, request: &Packet, nas: &Nas) {
        let nas_addr = nas.ipaddr.to_string();
        let nas_id = request
            .string_attribute(AttributeType::NasIdentifier as u8)
            .unwrap_or_default();
        match self.ctx.store.delete_online_by_nas(&nas_addr, &nas_id).await {
            Ok(removed) => info!(
                nas_addr = %nas_addr,
                nas_id = %nas_id,
                status = ?status,
                removed = removed,
                "Cleared online sessions of NAS"
            ),
            Err(e) => error!(nas_addr = %nas_addr, error = %e, "Failed to clear online sessions of NAS"),
        }
    }
}

/// Snapshot of the session described by an Accounting-Request.
pub fn online_session_from(
    request: &Packet,
    username: &str,
    nas: &Nas,
    source: IpAddr,
    now: DateTime<Utc>,
) -> OnlineSession {
    let text = |attr: AttributeType| {
        request
            .string_attribute(attr as u8)
            .map(or_na)
            .unwrap_or_else(|| NA.to_string())
    };
    let int = |attr: AttributeType| request.integer_attribute(attr as u8).unwrap_or(0);
    let ipv4 = |attr: AttributeType| {
        request
            .find_attribute(attr as u8)
            .and_then(|a| a.as_ipv4().ok())
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| NA.to_string())
    };

    let session_time = int(AttributeType::AcctSessionTime);
    let vendor_request = parse_vendor_request(request, nas.vendor());

    OnlineSession {
        acct_session_id: request
            .string_attribute(AttributeType::AcctSessionId as u8)
            .unwrap_or_default(),
        username: username.to_string(),
        nas_id: text(AttributeType::NasIdentifier),
        nas_addr: nas.ipaddr.to_string(),
        nas_paddr: source.to_string(),
        session_timeout: int(AttributeType::SessionTimeout),
        framed_ipaddr: ipv4(AttributeType::FramedIpAddress),
        framed_netmask: ipv4(AttributeType::FramedIpNetmask),
        mac_addr: or_na(vendor_request.macaddr),
        nas_port: int(AttributeType::NasPort),
        nas_class: text(AttributeType::Class),
        nas_port_id: text(AttributeType::NasPortId),
        nas_port_type: int(AttributeType::NasPortType),
        service_type: int(AttributeType::ServiceType),
        acct_session_time: session_time,
        acct_input_total: octets_with_gigawords(
            int(AttributeType::AcctInputOctets),
            int(AttributeType::AcctInputGigawords),
        ),
        acct_output_total: octets_with_gigawords(
            int(AttributeType::AcctOutputOctets),
            int(AttributeType::AcctOutputGigawords),
        ),
        acct_input_packets: u64::from(int(AttributeType::AcctInputPackets)),
        acct_output_packets: u64::from(int(AttributeType::AcctOutputPackets)),
        acct_start_time: now - Duration::seconds(i64::from(session_time)),
        last_update: now,
    }
}

#[async_trait]
impl RequestHandler for AcctService {
    fn accepts(&self, code: Code) -> bool {
        code == Code::AccountingRequest
    }

    async fn handle(&self, request: Packet, source: SocketAddr) -> Option<Response> {
        Some(self.accounting_request(&request, source).await)
    }

    async fn fallback(&self, request: &Packet, source: SocketAddr) -> Option<Response> {
        let identifier = request
            .string_attribute(AttributeType::NasIdentifier as u8)
            .unwrap_or_default();
        let secret = self.ctx.secret_for(source.ip(), &identifier).await;
        Some(Response::new(
            Packet::reply_to(request, Code::AccountingResponse),
            secret,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditLogger, AuthLogLevel};
    use crate::config::Config;
    use crate::directory::MemoryDirectory;
    use crate::models::Subscriber;
    use crate::store::{MemoryStore, SessionStore};
    use radius_proto::{sign_request, Attribute};

    const NAS_SECRET: &str = "nas-secret";

    struct Fixture {
        service: AcctService,
        directory: Arc<MemoryDirectory>,
        store: Arc<MemoryStore>,
    }

    fn nas() -> Nas {
        Nas {
            identifier: "bras-1".into(),
            name: None,
            ipaddr: "127.0.0.1".parse().unwrap(),
            secret: NAS_SECRET.into(),
            vendor_code: 0,
            // Nothing listens here; disconnects time out quietly.
            coa_port: 9,
            ldap_id: None,
            status: Status::Enabled,
        }
    }

    fn fixture() -> Fixture {
        let mut config = Config::default();
        config.radius.disconnect_timeout_secs = 1;
        let directory = Arc::new(MemoryDirectory::new());
        directory.add_nas(nas());
        directory.add_subscriber(Subscriber::new("alice"));
        let store = Arc::new(MemoryStore::new());
        let audit = AuditLogger::spawn(store.clone(), AuthLogLevel::None, None, 8).unwrap();
        let ctx = AaaContext::new(
            Arc::new(config),
            directory.clone(),
            directory.clone(),
            store.clone(),
            audit,
        );
        Fixture {
            service: AcctService::new(Arc::new(ctx)),
            directory,
            store,
        }
    }

    fn acct(status: AcctStatusType, session_id: &str, counters: (u32, u32, u32)) -> Packet {
        let (session_time, input, output) = counters;
        let mut req = Packet::new(Code::AccountingRequest, 1, [0u8; 16]);
        let attrs = [
            Attribute::integer(AttributeType::AcctStatusType as u8, status.as_u32()),
            Attribute::string(AttributeType::UserName as u8, "alice"),
            Attribute::string(AttributeType::AcctSessionId as u8, session_id),
            Attribute::string(AttributeType::NasIdentifier as u8, "bras-1"),
            Attribute::integer(AttributeType::AcctSessionTime as u8, session_time),
            Attribute::integer(AttributeType::AcctInputOctets as u8, input),
            Attribute::integer(AttributeType::AcctOutputOctets as u8, output),
            Attribute::integer(AttributeType::AcctInputPackets as u8, 10),
            Attribute::integer(AttributeType::AcctOutputPackets as u8, 20),
        ];
        for attr in attrs {
            req.add_attribute(attr.unwrap());
        }
        sign_request(&mut req, NAS_SECRET.as_bytes()).unwrap();
        req
    }

    fn source() -> SocketAddr {
        "127.0.0.1:40001".parse().unwrap()
    }

    #[tokio::test]
    async fn test_start_then_stop() {
        let f = fixture();
        let response = f
            .service
            .handle(acct(AcctStatusType::Start, "s1", (0, 0, 0)), source())
            .await
            .unwrap();
        assert_eq!(response.packet.code, Code::AccountingResponse);
        assert_eq!(response.secret, NAS_SECRET);
        assert_eq!(f.store.online_count(), 1);

        f.service
            .handle(acct(AcctStatusType::Stop, "s1", (600, 1_000_000, 500_000)), source())
            .await
            .unwrap();
        assert_eq!(f.store.online_count(), 0);

        let records = f.store.accounting_records().await;
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.session.acct_input_total, 1_000_000);
        assert_eq!(record.session.acct_output_total, 500_000);
        assert_eq!(record.session.acct_output_packets, 20);
        let elapsed = record.acct_stop_time - record.session.acct_start_time;
        assert!((elapsed.num_seconds() - 600).abs() <= 1);
    }

    #[tokio::test]
    async fn test_interim_is_additive_and_creates_missing_session() {
        let f = fixture();
        for _ in 0..3 {
            f.service
                .handle(acct(AcctStatusType::InterimUpdate, "s2", (60, 100, 50)), source())
                .await
                .unwrap();
        }
        let online = f.store.get_online("s2").await.unwrap().unwrap();
        assert_eq!(online.acct_input_total, 300);
        assert_eq!(online.acct_output_total, 150);
        assert_eq!(online.acct_input_packets, 30);
        assert_eq!(online.acct_output_packets, 60);
    }

    #[tokio::test]
    async fn test_duplicate_start_keeps_one_session() {
        let f = fixture();
        let start = acct(AcctStatusType::Start, "s3", (0, 5, 5));
        f.service.handle(start.clone(), source()).await.unwrap();
        f.service.handle(start, source()).await.unwrap();
        assert_eq!(f.store.online_count(), 1);
    }

    #[tokio::test]
    async fn test_accounting_on_clears_nas_sessions() {
        let f = fixture();
        f.service.handle(acct(AcctStatusType::Start, "a", (0, 0, 0)), source()).await;
        f.service.handle(acct(AcctStatusType::Start, "b", (0, 0, 0)), source()).await;
        assert_eq!(f.store.online_count(), 2);

        let mut on = Packet::new(Code::AccountingRequest, 2, [0u8; 16]);
        on.add_attribute(
            Attribute::integer(
                AttributeType::AcctStatusType as u8,
                AcctStatusType::AccountingOn.as_u32(),
            )
            .unwrap(),
        );
        let response = f.service.handle(on, source()).await.unwrap();
        assert_eq!(response.packet.code, Code::AccountingResponse);
        assert_eq!(f.store.online_count(), 0);
    }

    #[tokio::test]
    async fn test_accounting_off_clears_by_address_and_identifier() {
        let f = fixture();
        let now = Utc::now();
        let template = acct(AcctStatusType::Start, "x", (0, 0, 0));
        let session = |id: &str, nas_addr: &str, nas_id: &str| {
            let mut s = online_session_from(&template, "alice", &nas(), source().ip(), now);
            s.acct_session_id = id.into();
            s.nas_addr = nas_addr.into();
            s.nas_id = nas_id.into();
            s
        };
        f.store.insert_online(&session("by-addr", "127.0.0.1", "edge-7")).await.unwrap();
        f.store.insert_online(&session("by-id", "10.0.0.2", "bras-1")).await.unwrap();
        f.store.insert_online(&session("other", "10.0.0.3", "bras-2")).await.unwrap();

        let mut off = Packet::new(Code::AccountingRequest, 3, [0u8; 16]);
        let attrs = [
            Attribute::integer(
                AttributeType::AcctStatusType as u8,
                AcctStatusType::AccountingOff.as_u32(),
            ),
            Attribute::string(AttributeType::NasIdentifier as u8, "bras-1"),
        ];
        for attr in attrs {
            off.add_attribute(attr.unwrap());
        }
        let response = f.service.handle(off, source()).await.unwrap();
        assert_eq!(response.packet.code, Code::AccountingResponse);

        assert!(f.store.get_online("by-addr").await.unwrap().is_none());
        assert!(f.store.get_online("by-id").await.unwrap().is_none());
        assert!(f.store.get_online("other").await.unwrap().is_some());
        assert_eq!(f.store.online_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_session_id_is_not_tracked() {
        let f = fixture();
        let without_id = |status: AcctStatusType| {
            let mut req = acct(status, "unused", (60, 10, 10));
            req.attributes
                .retain(|a| a.attr_type != AttributeType::AcctSessionId as u8);
            sign_request(&mut req, NAS_SECRET.as_bytes()).unwrap();
            req
        };

        for status in [
            AcctStatusType::Start,
            AcctStatusType::Start,
            AcctStatusType::InterimUpdate,
            AcctStatusType::Stop,
        ] {
            let response = f.service.handle(without_id(status), source()).await.unwrap();
            assert_eq!(response.packet.code, Code::AccountingResponse);
        }

        assert!(f.store.get_online("").await.unwrap().is_none());
        assert_eq!(f.store.online_count(), 0);
        assert!(f.store.accounting_records().await.is_empty());
    }

    #[tokio::test]
    async fn test_disabled_subscriber_still_accounted() {
        let f = fixture();
        let mut alice = f.directory.subscriber("alice").unwrap();
        alice.status = Status::Disabled;
        f.directory.add_subscriber(alice);

        f.service
            .handle(acct(AcctStatusType::InterimUpdate, "s4", (60, 1, 1)), source())
            .await
            .unwrap();
        assert!(f.store.get_online("s4").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_ldap_backed_nas_is_not_disconnected() {
        let f = fixture();
        let listener = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut ldap_nas = nas();
        ldap_nas.coa_port = listener.local_addr().unwrap().port();
        ldap_nas.ldap_id = Some("corp".into());
        f.directory.add_nas(ldap_nas);

        let mut alice = f.directory.subscriber("alice").unwrap();
        alice.status = Status::Disabled;
        f.directory.add_subscriber(alice);

        f.service
            .handle(acct(AcctStatusType::InterimUpdate, "s7", (60, 1, 1)), source())
            .await
            .unwrap();
        assert!(f.store.get_online("s7").await.unwrap().is_some());

        let mut buf = [0u8; 512];
        let wait = std::time::Duration::from_millis(300);
        let received = tokio::time::timeout(wait, listener.recv_from(&mut buf)).await;
        assert!(received.is_err(), "LDAP-backed NAS received a Disconnect-Request");
    }

    #[tokio::test]
    async fn test_unknown_nas_still_answered() {
        let f = fixture();
        let stranger: SocketAddr = "10.99.0.1:1813".parse().unwrap();
        let response = f
            .service
            .handle(acct(AcctStatusType::Start, "s5", (0, 0, 0)), stranger)
            .await
            .unwrap();
        assert_eq!(response.packet.code, Code::AccountingResponse);
        assert_eq!(response.secret, "testing123");
        assert_eq!(f.store.online_count(), 0);
    }

    #[test]
    fn test_session_snapshot_defaults_and_gigawords() {
        let now = Utc::now();
        let mut req = acct(AcctStatusType::InterimUpdate, "s6", (30, 5, 7));
        req.add_attribute(Attribute::integer(AttributeType::AcctInputGigawords as u8, 1).unwrap());
        let session = online_session_from(&req, "alice", &nas(), "127.0.0.1".parse().unwrap(), now);
        assert_eq!(session.acct_input_total, (1u64 << 32) + 5);
        assert_eq!(session.acct_output_total, 7);
        assert_eq!(session.framed_ipaddr, NA);
        assert_eq!(session.mac_addr, NA);
        assert_eq!(session.nas_id, "bras-1");
        assert_eq!(session.acct_start_time, now - Duration::seconds(30));
    }
}
