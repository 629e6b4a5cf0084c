//! User directory. Credentials are not handled here; tokens are minted by
//! the operator CLI.

use tracing::info;

use cmx_policy::{Action, Target};
use cmx_schemas::{Actor, NewUser, User};

use crate::{authorize, Desk, DeskError};

fn normalize_email(raw: &str) -> Result<String, DeskError> {
    let email = raw.trim().to_ascii_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.contains('@'),
        None => false,
    };
    if !valid {
        return Err(DeskError::BadRequest(format!("invalid email: {raw}")));
    }
    Ok(email)
}

impl Desk {
    /// Register a user. A duplicate email is a conflict.
    pub async fn create_user(&self, new: NewUser) -> Result<User, DeskError> {
        let email = normalize_email(&new.email)?;
        let user = self
            .store
            .create_user(&NewUser {
                email,
                role: new.role,
            })
            .await
            .map_err(|e| match DeskError::from(e) {
                DeskError::Conflict(_) => DeskError::Conflict("Email already exists".to_string()),
                other => other,
            })?;
        info!(user_id = %user.id, role = %user.role, "user created");
        Ok(user)
    }

    /// Staff only.
    pub async fn list_users(&self, actor: &Actor) -> Result<Vec<User>, DeskError> {
        authorize(actor, Action::ListUsers, &Target::Collection)?;
        Ok(self.store.list_users().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emails_are_trimmed_and_lowercased() {
        assert_eq!(normalize_email("  Ana@Desk.Test ").unwrap(), "ana@desk.test");
        assert!(normalize_email("no-at-sign").is_err());
        assert!(normalize_email("@desk.test").is_err());
        assert!(normalize_email("a@localhost").is_err());
    }
}
