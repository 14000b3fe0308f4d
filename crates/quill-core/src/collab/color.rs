//! Deterministic collaborator colors.

use crate::models::PeerId;

/// Palette shared by every client so observers agree without coordination.
pub const PEER_PALETTE: [&str; 8] = [
    "#FF6B6B", "#4ECDC4", "#45B7D1", "#FFA07A", "#98D8C8", "#F7DC6F", "#BB8FCE", "#85C1E9",
];

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Color for `peer_id`: FNV-1a over the id bytes, indexed into [`PEER_PALETTE`].
///
/// The hash is fixed (not `RandomState`) so every process computes the same
/// color for the same id.
#[must_use]
pub fn peer_color(peer_id: &PeerId) -> &'static str {
    let hash = peer_id
        .as_str()
        .bytes()
        .fold(FNV_OFFSET_BASIS, |hash, byte| {
            (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME)
        });
    let len = PEER_PALETTE.len() as u64;
    #[allow(clippy::cast_possible_truncation)] // remainder is < 8
    PEER_PALETTE[(hash % len) as usize]
}
