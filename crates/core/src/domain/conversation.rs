use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    /// Mint `conv_{session_id}_{8 hex}`; the session id stays readable in
    /// logs while the suffix keeps parallel conversations distinct.
    pub fn mint(session_id: &str) -> Self {
        let hex = Uuid::new_v4().simple().to_string();
        Self(format!("conv_{session_id}_{}", &hex[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
