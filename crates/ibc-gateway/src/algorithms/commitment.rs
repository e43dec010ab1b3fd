//! # Packet Commitments
//!
//! ICS-04 commitment hashes stored in the channel datum and the state tree.

use crate::domain::{Acknowledgement, GatewayError, Hash, Packet};
use sha2::{Digest, Sha256};

/// `SHA-256(timeout_ts ‖ rev_number ‖ rev_height ‖ SHA-256(data))`, big-endian u64s.
pub fn commit_packet(packet: &Packet) -> Result<Hash, GatewayError> {
    let data = hex::decode(&packet.data)
        .map_err(|e| GatewayError::invalid(format!("packet data is not hex: {}", e)))?;
    let data_hash = Sha256::digest(&data);

    let mut hasher = Sha256::new();
    hasher.update(packet.timeout_timestamp.to_be_bytes());
    hasher.update(packet.timeout_height.revision_number.to_be_bytes());
    hasher.update(packet.timeout_height.revision_height.to_be_bytes());
    hasher.update(data_hash);
    Ok(hasher.finalize().into())
}

/// `SHA-256(ack_bytes)`.
pub fn commit_acknowledgement(ack_bytes: &[u8]) -> Hash {
    Sha256::digest(ack_bytes).into()
}

/// Commitment of the success acknowledgement written on recv.
pub fn success_ack_commitment() -> Hash {
    commit_acknowledgement(&Acknowledgement::success().to_json_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Height;

    #[test]
    fn test_success_ack_commitment_constant() {
        assert_eq!(
            hex::encode(success_ack_commitment()).to_uppercase(),
            "08F7557ED51826FE18D84512BF24EC75001EDBAF2123A477DF72A0A9F3640A7C"
        );
    }

    #[test]
    fn test_commit_packet_depends_on_timeout() {
        let mut packet = Packet {
            sequence: 1,
            data: hex::encode(b"{}"),
            timeout_height: Height::new(0, 100),
            ..Default::default()
        };
        let a = commit_packet(&packet).unwrap();
        packet.timeout_timestamp = 1;
        let b = commit_packet(&packet).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_commit_packet_layout() {
        let packet = Packet {
            data: "00".into(),
            timeout_height: Height::new(1, 2),
            timeout_timestamp: 3,
            ..Default::default()
        };
        let mut preimage = Vec::new();
        preimage.extend_from_slice(&3u64.to_be_bytes());
        preimage.extend_from_slice(&1u64.to_be_bytes());
        preimage.extend_from_slice(&2u64.to_be_bytes());
        preimage.extend_from_slice(&Sha256::digest([0u8]));
        let expected: Hash = Sha256::digest(&preimage).into();
        assert_eq!(commit_packet(&packet).unwrap(), expected);
    }

    #[test]
    fn test_commit_packet_rejects_non_hex() {
        let packet = Packet {
            data: "zz".into(),
            ..Default::default()
        };
        assert!(commit_packet(&packet).is_err());
    }
}
