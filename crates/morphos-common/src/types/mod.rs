//! Core data model

pub mod control;
pub mod operator;
pub mod state;
pub mod sweet_spot;
