//! Transaction Module
//!
//! Building, signing rounds, broadcasting and tracking, tied together by the
//! handoff file protocol and the lifecycle state machine.

pub mod broadcaster;
pub mod builder;
pub mod handoff;
pub mod signer;
pub mod state;
pub mod tracker;

pub use broadcaster::{send_file, SendOutcome};
pub use builder::{merge_payments, BuildOutcome, TxBuilder};
pub use handoff::{read_psbt_file, validate_file_path, write_psbt_file, HandoffFile};
pub use signer::{sign_file, SignRound};
pub use state::{cancel_tx, transition, validate_transition};
pub use tracker::{monitor_action, monitor_all, MonitorReport};
