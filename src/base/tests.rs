use crate::base::status::{DnsRecovery, RequestStatus};

#[test]
fn test_status_roundtrip() {
    let original = RequestStatus::BindingAborted;
    let code = original.as_raw();
    assert_eq!(code, 0x804b_0002);
    let converted = RequestStatus::from(code);
    assert!(matches!(converted, RequestStatus::BindingAborted));

    let refused = RequestStatus::ConnectionRefused;
    assert_eq!(refused.as_raw(), 0x804b_000e);
    assert!(matches!(
        RequestStatus::from(0x804b_000e),
        RequestStatus::ConnectionRefused
    ));
}

#[test]
fn test_unknown_status() {
    let status = RequestStatus::from(0xdead_beef);
    assert!(matches!(status, RequestStatus::Unknown(0xdead_beef)));
    assert_eq!(status.as_raw(), 0xdead_beef);
}

#[test]
fn test_dns_recovery_classification() {
    assert_eq!(
        RequestStatus::UnknownHost.dns_recovery(),
        Some(DnsRecovery::Invalidate)
    );
    assert_eq!(
        RequestStatus::ConnectionRefused.dns_recovery(),
        Some(DnsRecovery::Evict)
    );
    assert_eq!(
        RequestStatus::NotAvailable.dns_recovery(),
        Some(DnsRecovery::Evict)
    );
    assert_eq!(RequestStatus::Ok.dns_recovery(), None);
    assert_eq!(RequestStatus::RedirectLoop.dns_recovery(), None);
    assert_eq!(RequestStatus::Unknown(42).dns_recovery(), None);
}
