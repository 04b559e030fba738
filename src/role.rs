//! Endpoint role (client or server).

/// Side of the connection this codec serves.
///
/// Decides masking per RFC 6455 and which half of a negotiated
/// permessage-deflate configuration applies to each direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Client role - must mask outgoing frames.
    Client,
    /// Server role - must not mask outgoing frames.
    Server,
}

impl Role {
    /// Check if this role must mask outgoing frames.
    #[inline]
    #[must_use]
    pub const fn must_mask(&self) -> bool {
        matches!(self, Role::Client)
    }

    /// Check if this role expects incoming frames to be masked.
    #[inline]
    #[must_use]
    pub const fn expects_masked(&self) -> bool {
        matches!(self, Role::Server)
    }

    /// Mask key for the next outgoing frame.
    ///
    /// A fresh random key for clients, `None` for servers.
    #[must_use]
    pub fn next_mask_key(&self) -> Option<u32> {
        self.must_mask().then(random_mask_key)
    }
}

/// Random 32-bit mask key.
///
/// Falls back to the system clock if the OS source is unavailable.
fn random_mask_key() -> u32 {
    let mut buf = [0u8; 4];
    if getrandom::getrandom(&mut buf).is_ok() {
        u32::from_le_bytes(buf)
    } else {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.subsec_nanos() ^ (d.as_secs() as u32))
            .unwrap_or(0x9e37_79b9)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Client => write!(f, "Client"),
            Role::Server => write!(f, "Server"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_must_mask() {
        assert!(Role::Client.must_mask());
        assert!(!Role::Client.expects_masked());
    }

    #[test]
    fn test_server_must_not_mask() {
        assert!(!Role::Server.must_mask());
        assert!(Role::Server.expects_masked());
    }

    #[test]
    fn test_next_mask_key() {
        assert!(Role::Server.next_mask_key().is_none());
        let keys: Vec<_> = (0..8).filter_map(|_| Role::Client.next_mask_key()).collect();
        assert_eq!(keys.len(), 8);
        // eight identical random keys would mean the source is broken
        assert!(keys.iter().any(|k| *k != keys[0]));
    }

    #[test]
    fn test_role_display() {
        assert_eq!(Role::Client.to_string(), "Client");
        assert_eq!(Role::Server.to_string(), "Server");
    }
}
