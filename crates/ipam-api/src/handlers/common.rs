use serde::Deserialize;

/// `?expand` / `?utilization` query flags shared by the Space and Block
/// read paths (§6).
#[derive(Debug, Clone, Deserialize)]
pub struct ExpandUtilQuery {
    #[serde(default)]
    pub expand: bool,
    #[serde(default)]
    pub utilization: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UtilQuery {
    #[serde(default)]
    pub utilization: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExpandQuery {
    #[serde(default)]
    pub expand: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForceQuery {
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SettledQuery {
    #[serde(default)]
    pub settled: bool,
}

pub async fn healthz() -> &'static str {
    "ok"
}
