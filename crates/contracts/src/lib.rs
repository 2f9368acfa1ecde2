use serde::{Deserialize, Serialize};

pub type AccountId = i64;

/// Closed role vocabulary. Unknown tags are rejected at account-creation
/// time but tolerated (ignored) when found in an already-issued token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Patient,
    Doctor,
    Admin,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Patient, Role::Doctor, Role::Admin];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Patient => "PATIENT",
            Role::Doctor => "DOCTOR",
            Role::Admin => "ADMIN",
        }
    }

    pub fn parse(tag: &str) -> Option<Role> {
        match tag {
            "PATIENT" => Some(Role::Patient),
            "DOCTOR" => Some(Role::Doctor),
            "ADMIN" => Some(Role::Admin),
            _ => None,
        }
    }

    fn bit(self) -> u8 {
        match self {
            Role::Patient => 1 << 0,
            Role::Doctor => 1 << 1,
            Role::Admin => 1 << 2,
        }
    }
}

/// Fixed-size set over the closed role vocabulary. Duplicates collapse and
/// order is irrelevant by construction; the raw bits are what lands in the
/// `accounts.roles` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RoleSet(u8);

impl RoleSet {
    pub const EMPTY: RoleSet = RoleSet(0);

    pub fn from_roles(roles: &[Role]) -> RoleSet {
        let mut set = RoleSet::EMPTY;
        for role in roles {
            set.insert(*role);
        }
        set
    }

    /// Strict parse for account creation and administrative role updates:
    /// any tag outside the closed vocabulary fails.
    pub fn parse_tags<S: AsRef<str>>(tags: &[S]) -> Result<RoleSet, ServiceError> {
        let mut set = RoleSet::EMPTY;
        for tag in tags {
            let tag = tag.as_ref();
            match Role::parse(tag) {
                Some(role) => set.insert(role),
                None => {
                    return Err(ServiceError::validation_failed(
                        format!("unknown role tag `{}`", tag),
                        Some(serde_json::json!({ "tag": tag })),
                    ));
                }
            }
        }
        Ok(set)
    }

    /// Lenient parse for tags carried in an old token: unknown tags are
    /// dropped instead of crashing the session.
    pub fn from_tags<S: AsRef<str>>(tags: &[S]) -> RoleSet {
        let mut set = RoleSet::EMPTY;
        for tag in tags {
            if let Some(role) = Role::parse(tag.as_ref()) {
                set.insert(role);
            }
        }
        set
    }

    pub fn insert(&mut self, role: Role) {
        self.0 |= role.bit();
    }

    pub fn contains(self, role: Role) -> bool {
        self.0 & role.bit() != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn iter(self) -> impl Iterator<Item = Role> {
        Role::ALL.into_iter().filter(move |role| self.contains(*role))
    }

    pub fn tags(self) -> Vec<&'static str> {
        self.iter().map(Role::as_str).collect()
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    /// Bits read back from storage; anything outside the known mask is
    /// dropped so a widened column can never produce phantom roles.
    pub fn from_bits(bits: u8) -> RoleSet {
        let mask = Role::ALL.iter().fold(0u8, |acc, role| acc | role.bit());
        RoleSet(bits & mask)
    }
}

/// Ephemeral, stateless claim set reconstructed from a verified token on
/// every request. Never stored server-side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub subject_id: AccountId,
    pub roles: RoleSet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Account,
    Patient,
    Doctor,
    Appointment,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Account => "account",
            EntityKind::Patient => "patient",
            EntityKind::Doctor => "doctor",
            EntityKind::Appointment => "appointment",
        }
    }
}

/// The two owning identities of an appointment, kept as a tagged pair so
/// two-sided authorization is written once instead of ad hoc destructuring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppointmentParties {
    pub patient_id: AccountId,
    pub doctor_id: AccountId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceOwnership {
    Single(AccountId),
    TwoSided(AppointmentParties),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Unauthenticated,
    Forbidden,
    NotFound,
    Conflict,
    ValidationFailed,
    Internal,
}

impl ErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::Unauthenticated => "ERR_UNAUTHENTICATED",
            ErrorKind::Forbidden => "ERR_FORBIDDEN",
            ErrorKind::NotFound => "ERR_NOT_FOUND",
            ErrorKind::Conflict => "ERR_CONFLICT",
            ErrorKind::ValidationFailed => "ERR_VALIDATION",
            ErrorKind::Internal => "ERR_INTERNAL",
        }
    }
}

/// The one error type service-level code surfaces to callers: a machine
/// readable code, a human message, and structured details naming the
/// offending id(s) so failures are diagnosable without a stack trace.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceError {
    pub kind: ErrorKind,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl ServiceError {
    pub fn unauthenticated(message: impl Into<String>) -> ServiceError {
        ServiceError {
            kind: ErrorKind::Unauthenticated,
            message: message.into(),
            details: None,
        }
    }

    pub fn forbidden(message: impl Into<String>) -> ServiceError {
        ServiceError {
            kind: ErrorKind::Forbidden,
            message: message.into(),
            details: None,
        }
    }

    pub fn not_found(entity: EntityKind, id: AccountId) -> ServiceError {
        ServiceError {
            kind: ErrorKind::NotFound,
            message: format!("no {} with id {} exists", entity.as_str(), id),
            details: Some(serde_json::json!({ "entity": entity.as_str(), "id": id })),
        }
    }

    pub fn conflict(message: impl Into<String>) -> ServiceError {
        ServiceError {
            kind: ErrorKind::Conflict,
            message: message.into(),
            details: None,
        }
    }

    pub fn validation_failed(
        message: impl Into<String>,
        details: Option<serde_json::Value>,
    ) -> ServiceError {
        ServiceError {
            kind: ErrorKind::ValidationFailed,
            message: message.into(),
            details,
        }
    }

    pub fn internal(message: impl Into<String>) -> ServiceError {
        ServiceError {
            kind: ErrorKind::Internal,
            message: message.into(),
            details: None,
        }
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    pub fn with_details(mut self, details: serde_json::Value) -> ServiceError {
        self.details = Some(details);
        self
    }
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code(), self.message)
    }
}

impl std::error::Error for ServiceError {}
