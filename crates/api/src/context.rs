use dbadmin_auth::{Role, User};

/// Principal context for a request (the bearer-authenticated user).
///
/// Built fresh from storage by the auth middleware on every request.
#[derive(Debug, Clone, PartialEq)]
pub struct PrincipalContext {
    user: User,
}

impl PrincipalContext {
    pub fn new(user: User) -> Self {
        Self { user }
    }

    pub fn username(&self) -> &str {
        &self.user.username
    }

    pub fn role(&self) -> Role {
        self.user.role
    }

    pub fn user(&self) -> &User {
        &self.user
    }
}
