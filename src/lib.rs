//! Remote creation and cloud publication of platform infobase dumps.
//!
//! The chat front end drives everything through [`BackupService`]:
//! list the infobases on the host, check whether one is already being
//! dumped, and request a dump that ends up as a public cloud link.

pub mod backup;
pub mod cloud;
pub mod config;
pub mod errors;
pub mod inventory;
pub mod remote;
pub mod service;

pub use errors::{BackupError, Result};
pub use service::BackupService;
