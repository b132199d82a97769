// crates/core/src/lib.rs
//! File codecs for the deployment console: the shell parameter file
//! sourced by the deployment script and the cluster host list.

pub mod error;
pub mod hosts;
pub mod params;

pub use error::*;
pub use hosts::{load_hosts, save_hosts, HostEntry, HostTopology};
pub use params::{load_params, save_params, DeployParams, DEPLOY_TYPE_KEY};
