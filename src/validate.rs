//! Pre-flight form validation. Failures here never reach the network.

use crate::error::{AppError, AppResult};

/// Minimum password length accepted by the auth screens.
const MIN_PASSWORD_LEN: usize = 6;

pub fn email(email: &str) -> AppResult<()> {
    let email = email.trim();
    if email.is_empty() {
        return Err(AppError::Validation("Email is required".into()));
    }
    if !looks_like_email(email) {
        return Err(AppError::Validation(
            "Please enter a valid email address".into(),
        ));
    }
    Ok(())
}

pub fn password(password: &str) -> AppResult<()> {
    if password.is_empty() {
        return Err(AppError::Validation("Password is required".into()));
    }
    if password.len() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "Password must be at least {} characters long",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

pub fn username(username: &str) -> AppResult<()> {
    if username.trim().is_empty() {
        return Err(AppError::Validation("Username is required".into()));
    }
    Ok(())
}

pub fn sign_up(email_addr: &str, pass: &str, name: &str) -> AppResult<()> {
    username(name)?;
    email(email_addr)?;
    password(pass)?;
    Ok(())
}

pub fn sign_in(email_addr: &str, pass: &str) -> AppResult<()> {
    email(email_addr)?;
    password(pass)?;
    Ok(())
}

/// local@domain.tld, no whitespace anywhere.
fn looks_like_email(s: &str) -> bool {
    if s.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = s.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.is_empty() {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) => !host.is_empty() && !tld.is_empty(),
        None => false,
    }
}
