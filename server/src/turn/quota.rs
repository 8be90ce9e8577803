use crate::{db::models::UserSettings, errors::ApiError};

/// A user's current usage, as stored in their settings. An absent value means unrestricted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageQuota {
    pub message_count: Option<i32>,
    pub free_messages: Option<i32>,
}

impl UsageQuota {
    /// Whether the user may send another message
    pub fn allows_message(&self) -> bool {
        match (self.message_count, self.free_messages) {
            (Some(count), Some(allowance)) => count < allowance,
            _ => true,
        }
    }
}

impl From<&UserSettings> for UsageQuota {
    fn from(settings: &UserSettings) -> Self {
        UsageQuota {
            message_count: Some(settings.message_count),
            free_messages: settings.free_messages,
        }
    }
}

/// Reject the turn if the user has used up their free messages. Users without
/// any settings yet are unrestricted.
pub fn check_quota(quota: Option<&UsageQuota>) -> Result<(), ApiError> {
    match quota {
        Some(quota) if !quota.allows_message() => Err(ApiError::QuotaExceeded),
        _ => Ok(()),
    }
}
