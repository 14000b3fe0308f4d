//! Supabase Realtime adapter for [`crate::channel::RealtimeChannel`].

mod socket;
pub mod wire;

pub use socket::{
    socket_url, RealtimeClient, RealtimeConfig, SocketChannel, DEFAULT_HEARTBEAT_INTERVAL,
    DEFAULT_JOIN_TIMEOUT,
};
