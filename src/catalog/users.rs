use tracing::info;

use super::{Catalog, Confirm};
use crate::error::{CatalogError, RecordKind, Result};
use crate::model::{BorrowRecord, Role, User};
use crate::storage::{ContextId, KeyValueStore};

/// Changes for [`Catalog::edit_user`]. Blank values leave the field as is; a
/// given role makes the user an admin only if it reads `admin`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

impl<S: KeyValueStore + Clone> Catalog<S> {
    pub fn edit_user(&self, origin: ContextId, user_id: u64, patch: UserPatch) -> Result<User> {
        let mut users = self.load::<User>(origin)?;

        let user = users
            .data
            .iter_mut()
            .find(|user| user.id == user_id)
            .ok_or(CatalogError::NotFound {
                kind: RecordKind::User,
                id: user_id,
            })?;

        if let Some(name) = non_blank(patch.name.as_deref()) {
            user.name = name.to_string();
        }
        if let Some(email) = non_blank(patch.email.as_deref()) {
            user.email = email.to_string();
        }
        if let Some(role) = patch.role.as_deref() {
            user.role = Role::parse_lenient(role);
        }
        let edited = user.clone();

        let write = self.stage(&users.data, users.version)?;
        self.commit(origin, vec![write])?;

        info!(user_id, role = %edited.role, "user edited");
        Ok(edited)
    }

    /// Delete a non-admin user. If the user still has books out, all of their
    /// borrow records go too. Returns the number of borrow records removed.
    pub fn delete_user(
        &self,
        origin: ContextId,
        user_id: u64,
        confirm: &dyn Confirm,
    ) -> Result<usize> {
        let mut users = self.load::<User>(origin)?;
        let mut records = self.load::<BorrowRecord>(origin)?;

        let index = users
            .data
            .iter()
            .position(|user| user.id == user_id)
            .ok_or(CatalogError::NotFound {
                kind: RecordKind::User,
                id: user_id,
            })?;
        let user = &users.data[index];
        if user.is_admin() {
            return Err(CatalogError::AdminProtected(user_id));
        }

        let has_active = records
            .data
            .iter()
            .any(|record| record.user_id == user_id && record.is_active());
        let prompt = if has_active {
            format!(
                "{} still has books out; their borrow records will be deleted as well. Delete this user?",
                user.name
            )
        } else {
            format!("Delete user {}? This cannot be undone.", user.name)
        };
        if !confirm.confirm(&prompt) {
            return Err(CatalogError::Cancelled);
        }

        users.data.remove(index);
        let mut writes = vec![self.stage(&users.data, users.version)?];

        let mut removed = 0;
        if has_active {
            let before = records.data.len();
            records.data.retain(|record| record.user_id != user_id);
            removed = before - records.data.len();
            writes.push(self.stage(&records.data, records.version)?);
        }
        self.commit(origin, writes)?;

        info!(user_id, removed_records = removed, "user deleted");
        Ok(removed)
    }
}
