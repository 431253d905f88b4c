//! Query functions organized by table.

pub mod attestations;
pub mod history;
pub mod settings;
