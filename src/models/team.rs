use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Team {
    #[serde(default)]
    pub id: Option<i64>,
    pub name: String,
}

impl Team {
    /// Identity used for deduplication: id when present, name otherwise.
    pub fn identity(&self) -> String {
        match self.id {
            Some(id) => id.to_string(),
            None => self.name.clone(),
        }
    }
}

/// One entry of a filter dropdown (language, editor or team).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DropdownFilterItem {
    pub value: String,
    pub is_selected: bool,
}

impl DropdownFilterItem {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            is_selected: false,
        }
    }
}
