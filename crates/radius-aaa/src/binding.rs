//! MAC and VLAN binding enforcement

use crate::error::AuthError;
use crate::models::{is_set, Subscriber, SubscriberUpdate, VendorRequest};

/// Enforce the subscriber's MAC and VLAN bindings against what the NAS reported.
///
/// A side that carries no value never causes a mismatch. The returned update
/// holds the observed values for fields the subscriber has not recorded yet;
/// the caller persists it once the Access-Accept is out.
pub fn check_binding(
    subscriber: &Subscriber,
    request: &VendorRequest,
) -> Result<SubscriberUpdate, AuthError> {
    let mut update = SubscriberUpdate::default();

    let stored_mac = is_set(&subscriber.macaddr);
    let request_mac = is_set(&request.macaddr);
    if subscriber.bind_mac
        && stored_mac
        && request_mac
        && !subscriber.macaddr.eq_ignore_ascii_case(&request.macaddr)
    {
        return Err(AuthError::MacBindMismatch(subscriber.username.clone()));
    }
    if !stored_mac && request_mac {
        update.macaddr = Some(request.macaddr.clone());
    }

    let slots = [
        (1u8, subscriber.vlanid1, request.vlanid1),
        (2u8, subscriber.vlanid2, request.vlanid2),
    ];
    for (slot, stored, observed) in slots {
        if subscriber.bind_vlan && stored != 0 && observed != 0 && stored != observed {
            return Err(AuthError::VlanBindMismatch {
                username: subscriber.username.clone(),
                slot,
            });
        }
        if stored == 0 && observed != 0 {
            match slot {
                1 => update.vlanid1 = Some(observed),
                _ => update.vlanid2 = Some(observed),
            }
        }
    }

    Ok(update)
}
