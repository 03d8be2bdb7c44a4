use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// The two mutually exclusive parts a connection can play inside a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    Streamer,
    Viewer,
}
