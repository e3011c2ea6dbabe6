use std::fmt;

use bitflags::bitflags;

use super::error::JobError;

bitflags! {
    /// Permissions requested for a share
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SharePermissions: u8 {
        const READ = 1 << 0;
        const UPDATE = 1 << 1;
        const CREATE = 1 << 2;
        const DELETE = 1 << 3;
        const SHARE = 1 << 4;
    }
}

impl Default for SharePermissions {
    fn default() -> Self {
        SharePermissions::READ
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShareeKind {
    User,
    Group,
    Federated,
}

/// Who a folder is being shared with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sharee {
    /// User id on the server, also the key in the folder's member list
    pub id: String,
    pub display_name: String,
    pub kind: ShareeKind,
}

impl Sharee {
    pub fn user(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            id,
            kind: ShareeKind::User,
        }
    }
}

/// Subject of an add or remove operation
#[derive(Clone, PartialEq, Eq)]
pub struct UserData {
    pub sharee: Sharee,
    pub permissions: SharePermissions,
    /// Password for a share link issued alongside encryption access
    pub password: Option<String>,
}

impl fmt::Debug for UserData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserData")
            .field("sharee", &self.sharee)
            .field("permissions", &self.permissions)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl UserData {
    pub fn new(sharee: Sharee, permissions: SharePermissions) -> Self {
        Self {
            sharee,
            permissions,
            password: None,
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn user_id(&self) -> &str {
        &self.sharee.id
    }
}

/// Untyped operation kind, as received from callers that do not carry a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OperationKind {
    #[default]
    Invalid,
    Add,
    Remove,
    ReEncrypt,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Invalid => write!(f, "Invalid"),
            OperationKind::Add => write!(f, "Add"),
            OperationKind::Remove => write!(f, "Remove"),
            OperationKind::ReEncrypt => write!(f, "ReEncrypt"),
        }
    }
}

/// What a job does to a folder's member list
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipOperation {
    /// Give a user access, rotating the metadata key
    Add(UserData),
    /// Revoke a user's access, rotating the metadata key
    Remove(UserData),
    /// Rewrite a folder's metadata under a new key, keeping its members
    ReEncrypt,
}

impl MembershipOperation {
    /// Build an operation from an untyped kind and an optional payload
    pub fn from_kind(kind: OperationKind, user_data: Option<UserData>) -> Result<Self, JobError> {
        match (kind, user_data) {
            (OperationKind::Add, Some(user_data)) => Ok(MembershipOperation::Add(user_data)),
            (OperationKind::Remove, Some(user_data)) => Ok(MembershipOperation::Remove(user_data)),
            (OperationKind::ReEncrypt, None) => Ok(MembershipOperation::ReEncrypt),
            (OperationKind::ReEncrypt, Some(_)) => Err(JobError::InvalidRequest(
                "re-encryption does not take user data".to_string(),
            )),
            (OperationKind::Invalid, _) => {
                Err(JobError::InvalidRequest("invalid operation".to_string()))
            }
            (kind, None) => Err(JobError::InvalidRequest(format!(
                "{} requires user data",
                kind
            ))),
        }
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            MembershipOperation::Add(_) => OperationKind::Add,
            MembershipOperation::Remove(_) => OperationKind::Remove,
            MembershipOperation::ReEncrypt => OperationKind::ReEncrypt,
        }
    }

    pub fn user_data(&self) -> Option<&UserData> {
        match self {
            MembershipOperation::Add(user_data) | MembershipOperation::Remove(user_data) => {
                Some(user_data)
            }
            MembershipOperation::ReEncrypt => None,
        }
    }

    /// Whether the operation changes the member list (and so rotates the key)
    pub fn changes_members(&self) -> bool {
        !matches!(self, MembershipOperation::ReEncrypt)
    }
}
