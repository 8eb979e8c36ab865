use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ChatError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "superadmin")]
    SuperAdmin,
    #[serde(rename = "areamanager")]
    AreaManager,
    #[serde(rename = "property_owner", alias = "owner")]
    PropertyOwner,
    #[serde(rename = "tenant")]
    Tenant,
    #[serde(rename = "website_user")]
    WebsiteUser,
    /// Author of join/escalation notices. Never accepted from a client.
    #[serde(rename = "system")]
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "superadmin",
            Role::AreaManager => "areamanager",
            Role::PropertyOwner => "property_owner",
            Role::Tenant => "tenant",
            Role::WebsiteUser => "website_user",
            Role::System => "system",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "superadmin" => Ok(Role::SuperAdmin),
            "areamanager" => Ok(Role::AreaManager),
            "property_owner" | "owner" => Ok(Role::PropertyOwner),
            "tenant" => Ok(Role::Tenant),
            "website_user" => Ok(Role::WebsiteUser),
            "system" => Ok(Role::System),
            other => Err(ChatError::validation(format!("unknown role: {other}"))),
        }
    }
}

/// Who is acting: the authenticated identity bound to a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub login_id: String,
    pub name: String,
    pub role: Role,
}

impl Identity {
    pub fn new(login_id: impl Into<String>, name: impl Into<String>, role: Role) -> Self {
        Self {
            login_id: login_id.into(),
            name: name.into(),
            role,
        }
    }

    pub fn system() -> Self {
        Self {
            login_id: "system".to_string(),
            name: "System".to_string(),
            role: Role::System,
        }
    }

    pub fn participant(&self) -> Participant {
        Participant::new(self.login_id.clone(), self.role)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.login_id)
    }
}

/// A `{login_id, role}` pair authorized to be present in a room.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Participant {
    #[serde(alias = "loginId")]
    pub login_id: String,
    pub role: Role,
}

impl Participant {
    pub fn new(login_id: impl Into<String>, role: Role) -> Self {
        Self {
            login_id: login_id.into(),
            role,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trips_through_str() {
        for role in [
            Role::SuperAdmin,
            Role::AreaManager,
            Role::PropertyOwner,
            Role::Tenant,
            Role::WebsiteUser,
            Role::System,
        ] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
    }

    #[test]
    fn test_owner_alias() {
        assert_eq!("owner".parse::<Role>().unwrap(), Role::PropertyOwner);
        let role: Role = serde_json::from_str("\"owner\"").unwrap();
        assert_eq!(role, Role::PropertyOwner);
        assert_eq!(serde_json::to_string(&role).unwrap(), "\"property_owner\"");
    }

    #[test]
    fn test_unknown_role_is_validation_error() {
        let err = "landlord".parse::<Role>().unwrap_err();
        assert!(matches!(err, ChatError::Validation(_)));
    }

    #[test]
    fn test_identity_display() {
        let id = Identity::new("U1", "Alice", Role::WebsiteUser);
        assert_eq!(id.to_string(), "Alice (U1)");
        assert_eq!(Identity::system().to_string(), "System (system)");
    }

    #[test]
    fn test_participant_wire_name() {
        let p = Participant::new("P1", Role::PropertyOwner);
        assert_eq!(
            serde_json::to_value(&p).unwrap(),
            serde_json::json!({ "login_id": "P1", "role": "property_owner" })
        );
        let legacy: Participant =
            serde_json::from_str(r#"{"loginId":"P1","role":"owner"}"#).unwrap();
        assert_eq!(legacy, p);
    }
}
