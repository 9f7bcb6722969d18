//! Proposal directory adapters.

mod http;

pub use http::{HttpDirectoryConfig, HttpProposalDirectory};
