use agora_forum::models::{Category, Role, Thread, User};
use agora_forum::policy;

fn user(role: Role) -> User {
    User {
        role,
        ..Default::default()
    }
}

fn granted_user(role: Role) -> User {
    User {
        role,
        has_private_access: true,
        ..Default::default()
    }
}

fn category(is_private: bool) -> Category {
    Category {
        is_private,
        ..Default::default()
    }
}

fn thread(locked: bool) -> Thread {
    Thread {
        locked,
        ..Default::default()
    }
}

#[test]
fn test_public_categories_are_visible_to_everyone() {
    let public = category(false);
    assert!(policy::can_view(None, &public));
    assert!(policy::can_view(Some(&user(Role::NewMember)), &public));
    assert!(policy::can_view(Some(&user(Role::Administrator)), &public));
}

#[test]
fn test_private_categories_need_the_grant_not_the_role() {
    let private = category(true);
    assert!(!policy::can_view(None, &private));
    // Even an administrator without the grant is outside.
    assert!(!policy::can_view(Some(&user(Role::Administrator)), &private));
    // A plain member with the grant is inside.
    assert!(policy::can_view(Some(&granted_user(Role::Member)), &private));
}

#[test]
fn test_posting_needs_member_role() {
    let public = category(false);
    assert!(!policy::can_post(&user(Role::NewMember), &public, None));
    assert!(policy::can_post(&user(Role::Member), &public, None));
    assert!(policy::can_post(&user(Role::Moderator), &public, None));
}

#[test]
fn test_posting_into_private_needs_role_and_grant() {
    let private = category(true);
    assert!(!policy::can_post(&user(Role::Member), &private, None));
    // Grant without the member role is still not enough.
    assert!(!policy::can_post(&granted_user(Role::NewMember), &private, None));
    assert!(policy::can_post(&granted_user(Role::Member), &private, None));
}

#[test]
fn test_locked_threads_refuse_every_poster() {
    let public = category(false);
    let locked = thread(true);
    let open = thread(false);

    assert!(policy::can_post(&user(Role::Member), &public, Some(&open)));
    assert!(!policy::can_post(&user(Role::Member), &public, Some(&locked)));
    // Locking blocks moderators and administrators too.
    assert!(!policy::can_post(&user(Role::Moderator), &public, Some(&locked)));
    assert!(!policy::can_post(&user(Role::Administrator), &public, Some(&locked)));
}

#[test]
fn test_moderation_capability() {
    assert!(!policy::can_moderate(&user(Role::NewMember)));
    assert!(!policy::can_moderate(&user(Role::Member)));
    assert!(policy::can_moderate(&user(Role::Moderator)));
    assert!(policy::can_moderate(&user(Role::Administrator)));
}

#[test]
fn test_role_assignment_capability() {
    let member = user(Role::Member);
    let moderator = user(Role::Moderator);
    let admin = user(Role::Administrator);

    // Plain members hand out nothing.
    assert!(!policy::can_assign_role(&member, Role::Member));

    // Moderators handle the low rungs only.
    assert!(policy::can_assign_role(&moderator, Role::NewMember));
    assert!(policy::can_assign_role(&moderator, Role::Member));
    assert!(!policy::can_assign_role(&moderator, Role::Moderator));
    assert!(!policy::can_assign_role(&moderator, Role::Administrator));

    // Administrators assign anything.
    assert!(policy::can_assign_role(&admin, Role::Moderator));
    assert!(policy::can_assign_role(&admin, Role::Administrator));
}
