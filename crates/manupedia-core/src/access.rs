//! Gating rules derived from the current session.
//!
//! Views ask these questions instead of inspecting roles themselves, so the
//! rules for "who may see or change what" live in one place.

use crate::auth::AuthSession;

/// Minimum session required to see or use something.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    Authenticated,
    Admin,
}

impl Access {
    pub fn permits(self, session: Option<&AuthSession>) -> bool {
        match self {
            Access::Public => true,
            Access::Authenticated => session.is_some(),
            Access::Admin => session.map_or(false, |s| s.identity.is_admin()),
        }
    }
}

/// Whether the session may edit or delete a manuscript uploaded by `owner_email`.
/// Admins may modify anything; other users only their own uploads.
pub fn can_modify(session: Option<&AuthSession>, owner_email: Option<&str>) -> bool {
    let Some(session) = session else {
        return false;
    };
    if session.identity.is_admin() {
        return true;
    }
    owner_email
        .map(|owner| owner.trim().eq_ignore_ascii_case(session.identity.email.trim()))
        .unwrap_or(false)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuickAccessItem {
    pub id: &'static str,
    pub label: &'static str,
    pub access: Access,
}

/// Quick-access navigation entries.
pub const QUICK_ACCESS: &[QuickAccessItem] = &[
    QuickAccessItem {
        id: "upload-manuscript",
        label: "Upload Manuscript",
        access: Access::Authenticated,
    },
    QuickAccessItem {
        id: "help-guidelines",
        label: "Help & Guidelines",
        access: Access::Public,
    },
    QuickAccessItem {
        id: "admin-panel",
        label: "Admin Panel",
        access: Access::Admin,
    },
];

pub fn visible_quick_access(session: Option<&AuthSession>) -> Vec<&'static QuickAccessItem> {
    QUICK_ACCESS
        .iter()
        .filter(|item| item.access.permits(session))
        .collect()
}
