use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields needed to register a client. The store assigns `id` and `created_at`.
#[derive(Debug, Clone)]
pub struct NewClient {
    pub name: String,
    pub email: String,
    pub address: Option<String>,
}

/// Partial client edit; `None` leaves a field untouched and `Some(None)`
/// clears an optional one.
#[derive(Debug, Clone, Default)]
pub struct ClientUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub address: Option<Option<String>>,
}

impl ClientUpdate {
    pub fn apply(self, client: &mut Client) {
        if let Some(name) = self.name {
            client.name = name;
        }
        if let Some(email) = self.email {
            client.email = email;
        }
        if let Some(address) = self.address {
            client.address = address;
        }
    }
}
