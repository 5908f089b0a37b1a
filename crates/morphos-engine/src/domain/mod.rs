//! Evolution domain: the cycle driver and the rules it applies between
//! operator application and commit
pub mod cycle;
pub mod phase;
pub mod search;
