//! route-core - skill routing for the copilot.
//!
//! Pure matching and decision logic plus the collaborator traits the
//! daemon implements (skill catalog, embedder, similarity index).

pub mod config;
pub mod matcher;
pub mod routing;
pub mod semantic;
pub mod skills;
pub mod types;

pub use config::Config;
pub use routing::{Router, SkillCatalog};
pub use types::*;
