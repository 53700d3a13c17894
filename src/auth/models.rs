use serde::{Deserialize, Serialize};

/// A logged-in creator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    /// Stable account identifier, compared against document owners.
    pub user_id: String,
    /// User email address.
    pub email: String,
    /// Name shown on the dashboard.
    pub display_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialization_roundtrip() {
        let user = AuthenticatedUser {
            user_id: "user-123".to_string(),
            email: "test@example.com".to_string(),
            display_name: "Test".to_string(),
        };
        let json = serde_json::to_string(&user).unwrap();
        let deserialized: AuthenticatedUser = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, user);
    }
}
