use serde::{Deserialize, Serialize};

/// VRF result returned by the `/vrf` route once the reveal delay has
/// elapsed. Field names are part of the wire format consumed by
/// external clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VrfResult {
    #[serde(rename = "PI")]
    pub pi: String,
    #[serde(rename = "Beta")]
    pub beta: String,
}

/// Query parameters for `/blockhash` and `/vrf`.
///
/// The parameter is optional: a missing or malformed value is
/// answered with an empty body, never an error.
#[derive(Debug, Deserialize)]
pub struct BlockHashQuery {
    pub b: Option<String>,
}

/// Query parameters for the slave-only `/key` intake route.
#[derive(Debug, Deserialize)]
pub struct KeyQuery {
    pub k: Option<String>,
}
