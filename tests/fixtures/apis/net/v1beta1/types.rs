//! net.example.io/v1beta1; the storage version comes from netkit

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkSpec {
    pub peer: String,
    pub mtu_bytes: u32,
}
