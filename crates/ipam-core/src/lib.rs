//! IPAM Core - pure IPv4 address-space algebra and the Space document model
//!
//! This crate provides:
//! - IPv4 prefix algebra and coalesced prefix sets
//! - Name/description/CIDR/host validators
//! - The Space/Block/External/Subnet/Endpoint/Reservation document model
//! - Pure size/used utilization rollup

pub mod algebra;
pub mod error;
pub mod model;
pub mod utilization;
pub mod validation;

pub use algebra::{Prefix, PrefixSet};
pub use error::{CoreError, Result};
pub use model::{
    Block, ExternalEndpoint, ExternalNetwork, ExternalSubnet, Reservation, Space, VNetRef,
    STATUS_CANCELLED_BY_USER, STATUS_WAIT,
};
pub use utilization::{block_utilization, space_utilization, sum_sizes, SpaceUtilization, Utilization};
