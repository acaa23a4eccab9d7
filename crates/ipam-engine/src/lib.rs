//! IPAM Engine - the public SpaceService operations (§4.7) and their
//! supporting machinery: allocation, request-scoped identity, allow-listed
//! patches, and optimistic-concurrency transactions.

pub mod allocator;
pub mod auth;
pub mod error;
pub mod patch;
pub mod space_service;
pub mod txn;

pub use allocator::{allocate, AllocRequest};
pub use auth::AuthContext;
pub use error::{EngineError, Result};
pub use space_service::{
    BlockView, MultiBlockReservationRequest, ReservationRequest, SpaceService, SpaceView,
    SubnetView, VNetView,
};
pub use txn::TxnRunner;
