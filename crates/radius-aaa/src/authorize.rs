//! Per-vendor authorization attributes for Access-Accept
//!
//! Every accept gets the baseline (Session-Timeout, Acct-Interim-Interval,
//! Framed-IP-Address, Framed-Pool); the NAS vendor then selects at most one
//! encoder for rate limits and QoS policy. Integer rates are clamped to
//! `i32::MAX` because several BRAS treat the value as signed.

use crate::models::{is_set, AuthorizationProfile, Vendor};
use chrono::{DateTime, Utc};
use radius_proto::vendor::{cisco, h3c, huawei, ikuai, mikrotik, radback, zte};
use radius_proto::{Attribute, AttributeType, Packet, PacketError, VendorAttribute};
use std::net::Ipv4Addr;
use tracing::warn;

const MAX_INT32: u64 = i32::MAX as u64;

fn clamp(value: u64) -> u32 {
    value.min(MAX_INT32) as u32
}

/// Append authorization attributes for `profile` to `accept`.
///
/// `default_interim` applies when the profile carries no interim interval.
pub fn authorize(
    profile: &dyn AuthorizationProfile,
    vendor: Vendor,
    mut accept: Packet,
    now: DateTime<Utc>,
    default_interim: u32,
) -> Result<Packet, PacketError> {
    baseline(profile, &mut accept, now, default_interim)?;

    match vendor {
        Vendor::Huawei => huawei_rates(profile, &mut accept)?,
        Vendor::H3c => h3c_rates(profile, &mut accept)?,
        Vendor::Zte => zte_rates(profile, &mut accept)?,
        Vendor::Radback => radback_policy(profile, &mut accept)?,
        Vendor::Cisco => cisco_policy(profile, &mut accept)?,
        Vendor::Mikrotik => mikrotik_rate_limit(profile, &mut accept)?,
        Vendor::Ikuai => ikuai_speed_limit(profile, &mut accept)?,
        Vendor::Standard | Vendor::Other(_) => {}
    }

    Ok(accept)
}

fn baseline(
    profile: &dyn AuthorizationProfile,
    accept: &mut Packet,
    now: DateTime<Utc>,
    default_interim: u32,
) -> Result<(), PacketError> {
    let remaining = (profile.expire_time() - now).num_seconds().clamp(0, i32::MAX as i64);
    accept.add_attribute(Attribute::integer(
        AttributeType::SessionTimeout as u8,
        remaining as u32,
    )?);

    let interim = match profile.interim_interval() {
        0 => default_interim,
        n => n,
    };
    accept.add_attribute(Attribute::integer(
        AttributeType::AcctInterimInterval as u8,
        interim,
    )?);

    if is_set(profile.addr_pool()) {
        accept.add_attribute(Attribute::string(
            AttributeType::FramedPool as u8,
            profile.addr_pool(),
        )?);
    }

    let ipaddr = profile.framed_ipaddr();
    if is_set(ipaddr) {
        match ipaddr.parse::<Ipv4Addr>() {
            Ok(ip) => accept.add_attribute(Attribute::ipv4(
                AttributeType::FramedIpAddress as u8,
                ip,
            )?),
            Err(_) => warn!(ipaddr = %ipaddr, "Ignoring malformed framed IP address"),
        }
    }
    Ok(())
}

/// Average and peak rates in bit/s, shared by Huawei and H3C.
fn bps_rates(profile: &dyn AuthorizationProfile) -> [u32; 4] {
    let up = profile.up_rate_kbps().saturating_mul(1000);
    let down = profile.down_rate_kbps().saturating_mul(1000);
    [
        clamp(up),
        clamp(up.saturating_mul(4)),
        clamp(down),
        clamp(down.saturating_mul(4)),
    ]
}

fn huawei_rates(
    profile: &dyn AuthorizationProfile,
    accept: &mut Packet,
) -> Result<(), PacketError> {
    let [up, up_peak, down, down_peak] = bps_rates(profile);
    let vid = huawei::VENDOR_ID;
    accept.add_vendor_attribute(VendorAttribute::integer(vid, huawei::INPUT_AVERAGE_RATE, up))?;
    accept.add_vendor_attribute(VendorAttribute::integer(vid, huawei::INPUT_PEAK_RATE, up_peak))?;
    accept.add_vendor_attribute(VendorAttribute::integer(vid, huawei::OUTPUT_AVERAGE_RATE, down))?;
    accept.add_vendor_attribute(VendorAttribute::integer(
        vid,
        huawei::OUTPUT_PEAK_RATE,
        down_peak,
    ))?;

    if is_set(profile.domain()) {
        accept.add_vendor_attribute(VendorAttribute::string(
            vid,
            huawei::DOMAIN_NAME,
            profile.domain(),
        ))?;
    }
    Ok(())
}

fn h3c_rates(
    profile: &dyn AuthorizationProfile,
    accept: &mut Packet,
) -> Result<(), PacketError> {
    let [up, up_peak, down, down_peak] = bps_rates(profile);
    let vid = h3c::VENDOR_ID;
    accept.add_vendor_attribute(VendorAttribute::integer(vid, h3c::INPUT_AVERAGE_RATE, up))?;
    accept.add_vendor_attribute(VendorAttribute::integer(vid, h3c::INPUT_PEAK_RATE, up_peak))?;
    accept.add_vendor_attribute(VendorAttribute::integer(vid, h3c::OUTPUT_AVERAGE_RATE, down))?;
    accept.add_vendor_attribute(VendorAttribute::integer(vid, h3c::OUTPUT_PEAK_RATE, down_peak))?;
    Ok(())
}

fn zte_rates(
    profile: &dyn AuthorizationProfile,
    accept: &mut Packet,
) -> Result<(), PacketError> {
    let up = clamp(profile.up_rate_kbps().saturating_mul(1000));
    let down = clamp(profile.down_rate_kbps().saturating_mul(1000));
    let vid = zte::VENDOR_ID;
    accept.add_vendor_attribute(VendorAttribute::integer(vid, zte::RATE_CTRL_SCR_UP, up))?;
    accept.add_vendor_attribute(VendorAttribute::integer(vid, zte::RATE_CTRL_SCR_DOWN, down))?;

    if is_set(profile.domain()) {
        accept.add_vendor_attribute(VendorAttribute::string(
            vid,
            zte::CONTEXT_NAME,
            profile.domain(),
        ))?;
    }
    Ok(())
}

fn radback_policy(
    profile: &dyn AuthorizationProfile,
    accept: &mut Packet,
) -> Result<(), PacketError> {
    let vid = radback::VENDOR_ID;
    if is_set(profile.limit_policy()) {
        accept.add_vendor_attribute(VendorAttribute::string(
            vid,
            radback::SUBSCRIBER_PROFILE_NAME,
            profile.limit_policy(),
        ))?;
    }
    if is_set(profile.domain()) {
        accept.add_vendor_attribute(VendorAttribute::string(
            vid,
            radback::CONTEXT_NAME,
            profile.domain(),
        ))?;
    }
    Ok(())
}

fn cisco_policy(
    profile: &dyn AuthorizationProfile,
    accept: &mut Packet,
) -> Result<(), PacketError> {
    let pairs = [
        ("sub-qos-policy-in", profile.up_limit_policy()),
        ("sub-qos-policy-out", profile.down_limit_policy()),
    ];
    for (key, policy) in pairs {
        if is_set(policy) {
            accept.add_vendor_attribute(VendorAttribute::string(
                cisco::VENDOR_ID,
                cisco::AV_PAIR,
                format!("{}={}", key, policy),
            ))?;
        }
    }
    Ok(())
}

fn mikrotik_rate_limit(
    profile: &dyn AuthorizationProfile,
    accept: &mut Packet,
) -> Result<(), PacketError> {
    let rate = format!("{}k/{}k", profile.up_rate_kbps(), profile.down_rate_kbps());
    accept.add_vendor_attribute(VendorAttribute::string(
        mikrotik::VENDOR_ID,
        mikrotik::RATE_LIMIT,
        rate,
    ))
}

fn ikuai_speed_limit(
    profile: &dyn AuthorizationProfile,
    accept: &mut Packet,
) -> Result<(), PacketError> {
    let up = clamp(profile.up_rate_kbps().saturating_mul(1024 * 8));
    let down = clamp(profile.down_rate_kbps().saturating_mul(1024 * 8));
    let vid = ikuai::VENDOR_ID;
    accept.add_vendor_attribute(VendorAttribute::integer(vid, ikuai::UPSTREAM_SPEED_LIMIT, up))?;
    accept.add_vendor_attribute(VendorAttribute::integer(
        vid,
        ikuai::DOWNSTREAM_SPEED_LIMIT,
        down,
    ))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DirectoryProfile, Subscriber, NA};
    use chrono::Duration;
    use radius_proto::Code;

    fn profile(up: u64, down: u64) -> Subscriber {
        let mut sub = Subscriber::new("alice");
        sub.expire_time = Utc::now() + Duration::hours(1);
        sub.profile.up_rate_kbps = up;
        sub.profile.down_rate_kbps = down;
        sub
    }

    fn encode(sub: &Subscriber, vendor: Vendor, now: DateTime<Utc>) -> Packet {
        let accept = Packet::new(Code::AccessAccept, 1, [0u8; 16]);
        authorize(sub.authorization_profile(), vendor, accept, now, 120).unwrap()
    }

    fn vsa_int(packet: &Packet, vid: u32, vtype: u8) -> Option<u32> {
        packet.find_vendor_attribute(vid, vtype).and_then(|v| v.as_integer())
    }

    #[test]
    fn test_baseline() {
        let now = Utc::now();
        let mut sub = profile(0, 0);
        sub.expire_time = now + Duration::seconds(3600);
        sub.ipaddr = "10.10.0.5".into();
        sub.profile.addr_pool = "pool-a".into();

        let accept = encode(&sub, Vendor::Standard, now);
        assert_eq!(accept.integer_attribute(AttributeType::SessionTimeout as u8), Some(3600));
        assert_eq!(accept.integer_attribute(AttributeType::AcctInterimInterval as u8), Some(120));
        assert_eq!(
            accept.string_attribute(AttributeType::FramedPool as u8).as_deref(),
            Some("pool-a")
        );
        let ip = accept.find_attribute(AttributeType::FramedIpAddress as u8).unwrap();
        assert_eq!(ip.as_ipv4().unwrap(), Ipv4Addr::new(10, 10, 0, 5));
        assert!(accept.vendor_attributes().is_empty());
    }

    #[test]
    fn test_baseline_skips_sentinels_and_uses_profile_interim() {
        let now = Utc::now();
        let mut sub = profile(0, 0);
        sub.ipaddr = NA.into();
        sub.profile.addr_pool = NA.into();
        sub.profile.interim_interval = 300;

        let accept = encode(&sub, Vendor::Other(4242), now);
        assert!(accept.find_attribute(AttributeType::FramedPool as u8).is_none());
        assert!(accept.find_attribute(AttributeType::FramedIpAddress as u8).is_none());
        assert_eq!(accept.integer_attribute(AttributeType::AcctInterimInterval as u8), Some(300));
    }

    #[test]
    fn test_session_timeout_is_clamped() {
        let now = Utc::now();
        let mut sub = profile(0, 0);
        sub.expire_time = now + Duration::days(365 * 100);
        let accept = encode(&sub, Vendor::Standard, now);
        assert_eq!(
            accept.integer_attribute(AttributeType::SessionTimeout as u8),
            Some(i32::MAX as u32)
        );

        sub.expire_time = now - Duration::hours(1);
        let accept = encode(&sub, Vendor::Standard, now);
        assert_eq!(accept.integer_attribute(AttributeType::SessionTimeout as u8), Some(0));
    }

    #[test]
    fn test_huawei_rates_and_domain() {
        let mut sub = profile(1024, 2048);
        sub.profile.domain = "isp.example".into();
        let accept = encode(&sub, Vendor::Huawei, Utc::now());
        let vid = huawei::VENDOR_ID;
        assert_eq!(vsa_int(&accept, vid, huawei::INPUT_AVERAGE_RATE), Some(1_024_000));
        assert_eq!(vsa_int(&accept, vid, huawei::INPUT_PEAK_RATE), Some(4_096_000));
        assert_eq!(vsa_int(&accept, vid, huawei::OUTPUT_AVERAGE_RATE), Some(2_048_000));
        assert_eq!(vsa_int(&accept, vid, huawei::OUTPUT_PEAK_RATE), Some(8_192_000));
        assert_eq!(
            accept.find_vendor_attribute(vid, huawei::DOMAIN_NAME).unwrap().as_text(),
            "isp.example"
        );
    }

    #[test]
    fn test_h3c_rates_clamped_without_domain() {
        let mut sub = profile(1_000_000, 10);
        sub.profile.domain = "isp.example".into();
        let accept = encode(&sub, Vendor::H3c, Utc::now());
        let vid = h3c::VENDOR_ID;
        assert_eq!(vsa_int(&accept, vid, h3c::INPUT_AVERAGE_RATE), Some(1_000_000_000));
        assert_eq!(vsa_int(&accept, vid, h3c::INPUT_PEAK_RATE), Some(i32::MAX as u32));
        assert_eq!(vsa_int(&accept, vid, h3c::OUTPUT_PEAK_RATE), Some(40_000));
        assert_eq!(accept.vendor_attributes().len(), 4);
    }

    #[test]
    fn test_zte_rates() {
        let mut sub = profile(u64::MAX, 512);
        sub.profile.domain = "ctx".into();
        let accept = encode(&sub, Vendor::Zte, Utc::now());
        let vid = zte::VENDOR_ID;
        assert_eq!(vsa_int(&accept, vid, zte::RATE_CTRL_SCR_UP), Some(i32::MAX as u32));
        assert_eq!(vsa_int(&accept, vid, zte::RATE_CTRL_SCR_DOWN), Some(512_000));
        assert_eq!(accept.find_vendor_attribute(vid, zte::CONTEXT_NAME).unwrap().as_text(), "ctx");
    }

    #[test]
    fn test_radback_policy() {
        let mut sub = profile(0, 0);
        sub.profile.limit_policy = "gold".into();
        let accept = encode(&sub, Vendor::Radback, Utc::now());
        let vid = radback::VENDOR_ID;
        assert_eq!(
            accept.find_vendor_attribute(vid, radback::SUBSCRIBER_PROFILE_NAME).unwrap().as_text(),
            "gold"
        );
        assert!(accept.find_vendor_attribute(vid, radback::CONTEXT_NAME).is_none());
    }

    #[test]
    fn test_cisco_av_pairs() {
        let mut sub = profile(0, 0);
        sub.profile.up_limit_policy = "up-10m".into();
        sub.profile.down_limit_policy = NA.into();
        let accept = encode(&sub, Vendor::Cisco, Utc::now());
        let pairs: Vec<String> = accept
            .vendor_attributes()
            .into_iter()
            .filter(|v| v.vendor_id == cisco::VENDOR_ID && v.vendor_type == cisco::AV_PAIR)
            .map(|v| v.as_text())
            .collect();
        assert_eq!(pairs, vec!["sub-qos-policy-in=up-10m".to_string()]);
    }

    #[test]
    fn test_mikrotik_rate_limit() {
        let accept = encode(&profile(1024, 2048), Vendor::Mikrotik, Utc::now());
        assert_eq!(
            accept
                .find_vendor_attribute(mikrotik::VENDOR_ID, mikrotik::RATE_LIMIT)
                .unwrap()
                .as_text(),
            "1024k/2048k"
        );
    }

    #[test]
    fn test_ikuai_speed_limit() {
        let accept = encode(&profile(1024, 1_000_000), Vendor::Ikuai, Utc::now());
        let vid = ikuai::VENDOR_ID;
        assert_eq!(vsa_int(&accept, vid, ikuai::UPSTREAM_SPEED_LIMIT), Some(8_388_608));
        assert_eq!(vsa_int(&accept, vid, ikuai::DOWNSTREAM_SPEED_LIMIT), Some(i32::MAX as u32));
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let now = Utc::now();
        let mut sub = profile(4096, 8192);
        sub.profile.domain = "isp".into();
        for vendor in [Vendor::Huawei, Vendor::Zte, Vendor::Mikrotik, Vendor::Ikuai] {
            let a = encode(&sub, vendor, now);
            let b = encode(&sub, vendor, now);
            assert_eq!(a.attributes, b.attributes);
        }
    }

    #[test]
    fn test_directory_profile_drives_accept() {
        let now = Utc::now();
        let expiry = now + Duration::seconds(600);
        let mut directory = DirectoryProfile::new("uid=alice,dc=example", expiry, 0);
        directory.ipaddr = "10.9.0.1".into();
        directory.profile.up_rate_kbps = 256;
        directory.profile.down_rate_kbps = 512;
        let sub = Subscriber::from_directory("alice", "", directory);

        let accept = encode(&sub, Vendor::Mikrotik, now);
        assert_eq!(accept.integer_attribute(AttributeType::SessionTimeout as u8), Some(600));
        let ip = accept.find_attribute(AttributeType::FramedIpAddress as u8).unwrap();
        assert_eq!(ip.as_ipv4().unwrap(), Ipv4Addr::new(10, 9, 0, 1));
        assert_eq!(accept.integer_attribute(AttributeType::AcctInterimInterval as u8), Some(120));
        assert_eq!(
            accept
                .find_vendor_attribute(mikrotik::VENDOR_ID, mikrotik::RATE_LIMIT)
                .unwrap()
                .as_text(),
            "256k/512k"
        );
    }
}
