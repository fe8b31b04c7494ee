//! Pure authorization decisions. Every function here is total and
//! side-effect-free; callers translate a negative decision into the
//! appropriate failure kind.

use crate::models::{Category, Role, Thread, User};

/// Whether `user` may see `category` (and everything in it). Private
/// categories require the private-access grant; public ones are visible to
/// everyone, including anonymous readers.
pub fn can_view(user: Option<&User>, category: &Category) -> bool {
    if !category.is_private {
        return true;
    }
    user.is_some_and(|u| u.has_private_access)
}

/// Whether `user` may create a thread or post under `category` (and, when
/// replying, inside `thread`). Posting requires role `member` or above — a
/// `new_member` may read but not write. A locked thread accepts no new posts
/// from anyone; locking blocks moderators too.
pub fn can_post(user: &User, category: &Category, thread: Option<&Thread>) -> bool {
    if thread.is_some_and(|t| t.locked) {
        return false;
    }
    if user.role < Role::Member {
        return false;
    }
    can_view(Some(user), category)
}

/// Whether `user` may perform moderation operations (delete content, review
/// access requests, read the audit trail, ban addresses).
pub fn can_moderate(user: &User) -> bool {
    matches!(user.role, Role::Moderator | Role::Administrator)
}

/// Whether `actor` may assign `new_role` to another user. Requires moderation
/// rights; handing out `moderator` or `administrator` requires an
/// administrator.
pub fn can_assign_role(actor: &User, new_role: Role) -> bool {
    if !can_moderate(actor) {
        return false;
    }
    if new_role >= Role::Moderator {
        return actor.role == Role::Administrator;
    }
    true
}
