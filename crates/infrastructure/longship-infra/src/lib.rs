pub mod hashing;
pub mod launcher;
pub mod net;

// Re-exports for convenience
pub use hashing::{
    checksum_bytes, checksum_reader, compute_file_checksum, HashError, StreamingChecksum,
};
pub use launcher::{LaunchError, Launcher, DEFAULT_LAUNCH_URL};
pub use net::{default_http_client, get_ok, mirror_file_url, NetError, ServerUrls};
