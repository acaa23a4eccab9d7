/// Key encoding for Space documents.
///
/// Spaces are named unique case-insensitively within a tenant (I3), so the
/// storage key folds the name to lowercase; the document itself still
/// carries the caller's original-case `name`.
pub struct KeyEncoder;

impl KeyEncoder {
    /// `space/{tenant_id}/{name.lowercased()}`
    pub fn space_key(tenant_id: &str, name: &str) -> String {
        format!("space/{}/{}", tenant_id, name.to_lowercase())
    }

    /// Prefix matching every space belonging to a tenant.
    pub fn tenant_prefix(tenant_id: &str) -> String {
        format!("space/{}/", tenant_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn space_key_lowercases_name() {
        assert_eq!(KeyEncoder::space_key("t1", "Corp"), "space/t1/corp");
    }

    #[test]
    fn tenant_prefix_matches_space_key() {
        let key = KeyEncoder::space_key("t1", "Corp");
        assert!(key.starts_with(&KeyEncoder::tenant_prefix("t1")));
    }
}
