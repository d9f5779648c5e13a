pub mod bridge;
pub mod metrics;
pub mod protocol;

pub use bridge::{
    dispatch, run_bridge, BridgeConfig, CommandJournal, CommandOutcome, LineBuffer, QueuedLine,
};
pub use metrics::{init_metrics, serve_metrics, update_from_exchange};
pub use protocol::{ProtocolError, ProtocolVersion, ResponseMsg, SpindleCommand};
