use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
/// How a backend interprets a transcript entry when building prompts
pub enum Role {
    User,
    Assistant,
    Tool,
}
