use crate::config::Config;
use crate::error::{AppError, Result};
use subtle::ConstantTimeEq;

/// Constant-time string comparison to prevent timing attacks
/// Use this for comparing API keys and other shared secrets
pub fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// GitHub logins are case-insensitive.
pub fn is_admin(login: &str, admins: &[String]) -> bool {
    admins.iter().any(|admin| admin.eq_ignore_ascii_case(login))
}

/// Admin gate: either the service API key or an allowlisted GitHub user.
///
/// Missing or bad credentials are `Unauthenticated`; a valid user who is not on the
/// allowlist is `Forbidden`.
pub fn authorize_admin(
    login: Option<&str>,
    presented_key: Option<&str>,
    config: &Config,
) -> Result<()> {
    if let Some(key) = presented_key {
        return match &config.api_key {
            Some(expected) if constant_time_compare(key, expected) => Ok(()),
            _ => Err(AppError::Unauthenticated("Invalid API key".to_string())),
        };
    }

    match login {
        None => Err(AppError::Unauthenticated(
            "Sign in with GitHub or provide an API key".to_string(),
        )),
        Some(user) if is_admin(user, &config.admin_users) => Ok(()),
        Some(user) => Err(AppError::Forbidden(format!(
            "{} is not a translation administrator",
            user
        ))),
    }
}
