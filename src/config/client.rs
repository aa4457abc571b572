use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Client {
    pub name: String,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

impl Client {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: None,
            note: None,
        }
    }
}

/// Client names accepted in the client column, in registry order.
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct ClientRegistry {
    #[serde(default, rename = "client")]
    pub clients: Vec<Client>,
}

impl ClientRegistry {
    /// Trimmed, non-blank names in registry order.
    pub fn names(&self) -> Vec<String> {
        self.clients
            .iter()
            .map(|c| c.name.trim())
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        let name = name.trim();
        !name.is_empty() && self.clients.iter().any(|c| c.name.trim() == name)
    }

    pub fn len(&self) -> usize {
        self.names().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
