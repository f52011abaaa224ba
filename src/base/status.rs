/// Request completion status delivered by the embedding network layer.
///
/// Modeled after Gecko's `nsresult` codes from the necko module; the raw
/// values are the ones browsers hand to progress listeners, so adapters
/// can pass them through unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    Ok,
    BindingAborted,
    BindingRedirected,
    ConnectionRefused,
    UnknownHost,
    RedirectLoop,
    NotAvailable,
    Unknown(u32),
}

/// What the DNS cache should do in response to a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DnsRecovery {
    /// Drop the cached entry entirely.
    Evict,
    /// Keep the entry but mark it unusable, so a rebinding host cannot
    /// revive the stale mapping.
    Invalidate,
}

impl RequestStatus {
    pub fn as_raw(&self) -> u32 {
        match self {
            RequestStatus::Ok => 0,
            RequestStatus::BindingAborted => 0x804b_0002,
            RequestStatus::BindingRedirected => 0x804b_0003,
            RequestStatus::ConnectionRefused => 0x804b_000e,
            RequestStatus::UnknownHost => 0x804b_001e,
            RequestStatus::RedirectLoop => 0x804b_001f,
            RequestStatus::NotAvailable => 0x804b_0111,
            RequestStatus::Unknown(code) => *code,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RequestStatus::Ok)
    }

    /// Classifies DNS-relevant failures. Name resolution failures keep a
    /// poisoned entry; connection-level failures drop it so the next
    /// attempt resolves fresh.
    pub fn dns_recovery(&self) -> Option<DnsRecovery> {
        match self {
            RequestStatus::UnknownHost => Some(DnsRecovery::Invalidate),
            RequestStatus::ConnectionRefused | RequestStatus::NotAvailable => {
                Some(DnsRecovery::Evict)
            }
            _ => None,
        }
    }
}

impl From<u32> for RequestStatus {
    fn from(code: u32) -> Self {
        match code {
            0 => RequestStatus::Ok,
            0x804b_0002 => RequestStatus::BindingAborted,
            0x804b_0003 => RequestStatus::BindingRedirected,
            0x804b_000e => RequestStatus::ConnectionRefused,
            0x804b_001e => RequestStatus::UnknownHost,
            0x804b_001f => RequestStatus::RedirectLoop,
            0x804b_0111 => RequestStatus::NotAvailable,
            other => RequestStatus::Unknown(other),
        }
    }
}
