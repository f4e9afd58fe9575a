use std::time::Duration;

// ─── Protocol Parameters ─────────────────────────────────────────────────────

/// Wire protocol version. Bump this whenever a breaking change is made to
/// WireMessage variants or any borsh-serialized P2P type. Peers whose
/// versions differ are rejected during discovery.
pub const PROTOCOL_VERSION: u8 = 1;

/// Maximum message size in bytes.
pub const MAX_MESSAGE_SIZE: usize = 2_097_152; // 2 MB

// ─── Naming Parameters ───────────────────────────────────────────────────────

/// Maximum length of a service name in characters.
pub const MAX_SERVICE_NAME_LEN: usize = 15;

/// Maximum length of a peer display name in UTF-8 bytes.
pub const MAX_PEER_NAME_BYTES: usize = 63;

// ─── Discovery Parameters ────────────────────────────────────────────────────

/// Maximum encoded size of a DiscoveryInfo map in bytes. Discovery payloads
/// ride in small advertisement records, so the ceiling is tight.
pub const MAX_DISCOVERY_INFO_BYTES: usize = 400;

// ─── Session Parameters ──────────────────────────────────────────────────────

/// How long an invitation (and any other direct request, ownership requests
/// included) may remain unanswered before it expires.
pub const DEFAULT_INVITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Chunk size for resource transfers.
pub const DEFAULT_RESOURCE_CHUNK: usize = 65_536; // 64 KiB

/// Maximum total size of a single resource transfer.
pub const MAX_RESOURCE_BYTES: usize = 67_108_864; // 64 MiB
