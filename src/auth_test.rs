use super::*;

#[test]
fn new_session_is_anonymous() {
    let auth = InMemoryAuth::new();
    assert!(auth.current_user().is_none());
    assert!(auth.token().is_none());
    assert!(!auth.is_authenticated());
}

#[test]
fn signed_in_exposes_token_and_user() {
    let auth = InMemoryAuth::signed_in("tok", "u1");
    assert_eq!(auth.token().as_deref(), Some("tok"));
    assert_eq!(auth.current_user().as_deref(), Some("u1"));
}

#[test]
fn login_without_user_is_authenticated_but_userless() {
    let auth = InMemoryAuth::new();
    auth.login("tok");
    assert!(auth.is_authenticated());
    assert!(auth.current_user().is_none());
}

#[test]
fn unauthorized_clears_session() {
    let auth = InMemoryAuth::signed_in("tok", "u1");
    auth.on_unauthorized();
    assert!(auth.token().is_none());
    assert!(auth.current_user().is_none());
}
