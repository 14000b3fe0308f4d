//! Collaborative editing: session state, presence, debounced saves and
//! peer colors.

mod color;
mod persist;
mod presence;
mod runner;
mod session;

pub use color::{peer_color, PEER_PALETTE};
pub use persist::{PersistController, PersistTimer, SaveStatus, DEFAULT_QUIET_PERIOD};
pub use presence::PresenceTable;
pub use runner::SessionHandle;
pub use session::{
    CollabSession, ConnectionState, EditField, SessionConfig, SessionError, SessionView,
};
