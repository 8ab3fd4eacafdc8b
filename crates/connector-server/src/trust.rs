//! Trust classification for the document-serving handler (C10).
//!
//! A request is fully trusted if, in TLS mode, the client presented a
//! certificate whose Common Name is on the configured trust list, or,
//! in plain mode, its remote address resolves to a host on that list.
//! Trusted requests skip the authorization gate and receive the
//! crawl-time response headers described in the wire protocol.

use std::net::IpAddr;

use cidr::IpCidr;

/// The configured trust list: IP blocks for plain-mode connections, and
/// certificate Common Names for TLS-mode connections.
pub struct TrustClassifier {
    trusted_ips: Vec<IpCidr>,
    trusted_common_names: Vec<String>,
}

impl TrustClassifier {
    pub fn new(trusted_ips: Vec<IpCidr>, trusted_common_names: Vec<String>) -> Self {
        Self { trusted_ips, trusted_common_names }
    }

    /// Plain-mode trust: the peer's remote address is on the trust list.
    pub fn is_trusted_addr(&self, addr: IpAddr) -> bool {
        self.trusted_ips.iter().any(|cidr| cidr.contains(&addr))
    }

    /// TLS-mode trust: the peer presented a certificate whose Common
    /// Name is on the trust list.
    pub fn is_trusted_common_name(&self, cn: &str) -> bool {
        self.trusted_common_names.iter().any(|trusted| trusted == cn)
    }

    /// Resolve full trust for one request, given whichever identity the
    /// transport layer could establish: a certificate Common Name when
    /// serving TLS, or a remote address otherwise.
    pub fn is_fully_trusted(&self, peer: &PeerIdentity) -> bool {
        match peer {
            PeerIdentity::TlsCommonName(cn) => self.is_trusted_common_name(cn),
            PeerIdentity::RemoteAddr(addr) => self.is_trusted_addr(*addr),
        }
    }
}

/// However the connection layer identified the peer for trust purposes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PeerIdentity {
    TlsCommonName(String),
    RemoteAddr(IpAddr),
}
