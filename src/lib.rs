//! Single-decree Basic Paxos consensus core: Proposer, Acceptor and
//! Leader agents communicating over an in-process, lossy request/reply
//! transport. See `DESIGN.md` for the module map.

pub mod acceptor;
pub mod backoff;
pub mod config;
pub mod error;
pub mod ident;
pub mod leader;
pub mod message;
pub mod node;
pub mod outcome;
pub mod peers;
pub mod proposal_id;
pub mod proposer;
pub mod transport;
