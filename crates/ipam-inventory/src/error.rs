use miette::Diagnostic;
use thiserror::Error;

/// Error type for the network inventory collaborator (§6).
#[derive(Error, Debug, Diagnostic, Clone, PartialEq, Eq)]
pub enum InventoryError {
    #[error("Unknown tenant: {tenant_id}")]
    #[diagnostic(code(ipam_inventory::unknown_tenant))]
    UnknownTenant { tenant_id: String },

    #[error("Inventory provider unavailable: {message}")]
    #[diagnostic(code(ipam_inventory::unavailable))]
    Unavailable { message: String },
}

pub type Result<T> = std::result::Result<T, InventoryError>;
