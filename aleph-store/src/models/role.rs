//! Roles: users, groups and the built-in system principals.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use tracing::debug;
use uuid::Uuid;

use aleph_index_shared::Authz;

use crate::error::{Result, StoreError};

/// Anyone, logged in or not.
pub const SYSTEM_GUEST: &str = "guest";
/// Every logged-in user.
pub const SYSTEM_USER: &str = "system:authenticated";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleType {
    User,
    Group,
    System,
}

impl RoleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Group => "group",
            Self::System => "system",
        }
    }
}

impl fmt::Display for RoleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoleType {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "user" => Ok(Self::User),
            "group" => Ok(Self::Group),
            "system" => Ok(Self::System),
            other => Err(StoreError::serialization(format!("unknown role type: {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Role {
    pub id: i64,
    pub foreign_id: String,
    #[serde(rename = "type")]
    pub role_type: RoleType,
    pub name: String,
    pub email: Option<String>,
    pub is_admin: bool,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields needed to create a role on demand.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewRole {
    pub foreign_id: String,
    #[serde(rename = "type", default = "default_role_type")]
    pub role_type: RoleType,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
}

fn default_role_type() -> RoleType {
    RoleType::User
}

impl NewRole {
    pub fn user(foreign_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            foreign_id: foreign_id.into(),
            role_type: RoleType::User,
            name: name.into(),
            email: None,
            is_admin: false,
        }
    }

    pub fn system(foreign_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            role_type: RoleType::System,
            ..Self::user(foreign_id, name)
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn admin(mut self) -> Self {
        self.is_admin = true;
        self
    }
}

/// The two system roles, resolved to their ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemRoles {
    pub guest: i64,
    pub authenticated: i64,
}

const COLUMNS: &str =
    "id, foreign_id, type, name, email, is_admin, api_key, created_at, updated_at";

fn new_api_key() -> String {
    Uuid::new_v4().simple().to_string()
}

impl Role {
    fn from_row(row: &SqliteRow) -> Result<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            foreign_id: row.try_get("foreign_id")?,
            role_type: row.try_get::<String, _>("type")?.parse()?,
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            is_admin: row.try_get("is_admin")?,
            api_key: row.try_get("api_key")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    pub async fn by_id(conn: &mut SqliteConnection, id: i64) -> Result<Option<Self>> {
        let row = sqlx::query(&format!("SELECT {} FROM roles WHERE id = ?", COLUMNS))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        row.as_ref().map(Self::from_row).transpose()
    }

    pub async fn by_foreign_id(
        conn: &mut SqliteConnection,
        foreign_id: &str,
    ) -> Result<Option<Self>> {
        let row = sqlx::query(&format!("SELECT {} FROM roles WHERE foreign_id = ?", COLUMNS))
            .bind(foreign_id)
            .fetch_optional(&mut *conn)
            .await?;
        row.as_ref().map(Self::from_row).transpose()
    }

    pub async fn by_api_key(conn: &mut SqliteConnection, api_key: &str) -> Result<Option<Self>> {
        if api_key.is_empty() {
            return Ok(None);
        }
        let row = sqlx::query(&format!("SELECT {} FROM roles WHERE api_key = ?", COLUMNS))
            .bind(api_key)
            .fetch_optional(&mut *conn)
            .await?;
        row.as_ref().map(Self::from_row).transpose()
    }

    /// Return the role with this foreign id, creating it if needed.
    ///
    /// An existing role is returned unchanged.
    pub async fn load_or_create(conn: &mut SqliteConnection, new: &NewRole) -> Result<Self> {
        if new.foreign_id.trim().is_empty() {
            return Err(StoreError::validation("role foreign_id is required"));
        }
        if let Some(role) = Self::by_foreign_id(conn, &new.foreign_id).await? {
            return Ok(role);
        }

        let now = Utc::now();
        // System roles cannot log in.
        let api_key = match new.role_type {
            RoleType::System => None,
            _ => Some(new_api_key()),
        };
        let id = sqlx::query(
            "INSERT INTO roles (foreign_id, type, name, email, is_admin, api_key, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&new.foreign_id)
        .bind(new.role_type.as_str())
        .bind(&new.name)
        .bind(&new.email)
        .bind(new.is_admin)
        .bind(&api_key)
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?
        .last_insert_rowid();

        debug!(role_id = id, foreign_id = %new.foreign_id, "Created role");
        Self::by_id(conn, id)
            .await?
            .ok_or_else(|| StoreError::not_found(format!("role {}", id)))
    }

    /// Replace the role's API key and return the new one.
    pub async fn rotate_api_key(conn: &mut SqliteConnection, id: i64) -> Result<String> {
        let api_key = new_api_key();
        let updated = sqlx::query("UPDATE roles SET api_key = ?, updated_at = ? WHERE id = ?")
            .bind(&api_key)
            .bind(Utc::now())
            .bind(id)
            .execute(&mut *conn)
            .await?
            .rows_affected();
        if updated == 0 {
            return Err(StoreError::not_found(format!("role {}", id)));
        }
        Ok(api_key)
    }

    /// Make sure the guest and authenticated roles exist.
    pub async fn create_system_roles(conn: &mut SqliteConnection) -> Result<SystemRoles> {
        let guest = NewRole::system(SYSTEM_GUEST, "All visitors");
        let authenticated = NewRole::system(SYSTEM_USER, "Logged-in users");
        let guest = Self::load_or_create(conn, &guest).await?;
        let authenticated = Self::load_or_create(conn, &authenticated).await?;
        Ok(SystemRoles {
            guest: guest.id,
            authenticated: authenticated.id,
        })
    }

    pub async fn system_roles(conn: &mut SqliteConnection) -> Result<SystemRoles> {
        let guest = Self::by_foreign_id(conn, SYSTEM_GUEST)
            .await?
            .ok_or_else(|| StoreError::not_found(SYSTEM_GUEST))?;
        let authenticated = Self::by_foreign_id(conn, SYSTEM_USER)
            .await?
            .ok_or_else(|| StoreError::not_found(SYSTEM_USER))?;
        Ok(SystemRoles {
            guest: guest.id,
            authenticated: authenticated.id,
        })
    }

    /// The role ids this role may read as: itself plus the system roles.
    pub async fn authz(conn: &mut SqliteConnection, role: &Role) -> Result<Authz> {
        if role.is_admin {
            return Ok(Authz::admin());
        }
        let system = Self::system_roles(conn).await?;
        let mut ids = vec![role.id, system.guest];
        if role.role_type != RoleType::System {
            ids.push(system.authenticated);
        }
        Ok(Authz::for_roles(ids))
    }

    /// What an unauthenticated request may read.
    pub async fn anonymous_authz(conn: &mut SqliteConnection) -> Result<Authz> {
        let system = Self::system_roles(conn).await?;
        Ok(Authz::for_roles([system.guest]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::memory_store;

    #[tokio::test]
    async fn test_load_or_create_is_idempotent() {
        let store = memory_store().await;
        let mut conn = store.acquire().await.unwrap();

        let new = NewRole::user("jane", "Jane Doe").with_email("jane@example.com");
        let first = Role::load_or_create(&mut conn, &new).await.unwrap();
        let second = Role::load_or_create(&mut conn, &NewRole::user("jane", "Other"))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.name, "Jane Doe");
        assert_eq!(second.role_type, RoleType::User);
        assert_eq!(first.api_key.as_ref().map(|k| k.len()), Some(32));
    }

    #[tokio::test]
    async fn test_rotate_api_key() {
        let store = memory_store().await;
        let mut conn = store.acquire().await.unwrap();
        let role = Role::load_or_create(&mut conn, &NewRole::user("a", "A"))
            .await
            .unwrap();
        let old = role.api_key.clone().unwrap();

        let new = Role::rotate_api_key(&mut conn, role.id).await.unwrap();
        assert_ne!(old, new);
        assert!(Role::by_api_key(&mut conn, &old).await.unwrap().is_none());
        assert_eq!(
            Role::by_api_key(&mut conn, &new).await.unwrap().map(|r| r.id),
            Some(role.id)
        );
        assert!(Role::rotate_api_key(&mut conn, 999).await.is_err());
    }

    #[tokio::test]
    async fn test_authz_includes_system_roles() {
        let store = memory_store().await;
        let mut conn = store.acquire().await.unwrap();
        let system = Role::create_system_roles(&mut conn).await.unwrap();
        let user = Role::load_or_create(&mut conn, &NewRole::user("u", "U"))
            .await
            .unwrap();
        let admin = Role::load_or_create(&mut conn, &NewRole::user("root", "Root").admin())
            .await
            .unwrap();

        let authz = Role::authz(&mut conn, &user).await.unwrap();
        let mut expected = vec![user.id, system.guest, system.authenticated];
        expected.sort();
        assert!(!authz.is_admin);
        assert_eq!(authz.role_ids.into_iter().collect::<Vec<_>>(), expected);
        assert!(Role::authz(&mut conn, &admin).await.unwrap().is_admin);

        let anonymous = Role::anonymous_authz(&mut conn).await.unwrap();
        assert!(anonymous.can_read(&[system.guest]));
        assert!(!anonymous.can_read(&[system.authenticated]));
    }

    #[tokio::test]
    async fn test_system_roles_have_no_api_key() {
        let store = memory_store().await;
        let mut conn = store.acquire().await.unwrap();
        Role::create_system_roles(&mut conn).await.unwrap();
        let again = Role::create_system_roles(&mut conn).await.unwrap();

        let guest = Role::by_id(&mut conn, again.guest).await.unwrap().unwrap();
        assert_eq!(guest.role_type, RoleType::System);
        assert!(guest.api_key.is_none());
    }
}
