use serde::Deserialize;

use super::Id;

#[derive(Clone, Debug, Deserialize)]
pub struct UserInfo {
    id: Id,
    #[serde(default)]
    name: String,
}

impl UserInfo {
    pub fn new(id: impl Into<Id>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    pub const fn id(&self) -> &Id {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}
