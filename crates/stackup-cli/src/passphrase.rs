use zeroize::Zeroizing;

use stackup_core::error::{Result, StackupError};

use crate::prompt::prompt_hidden;

pub(crate) const PASSPHRASE_ENV: &str = "STACKUP_PASSPHRASE";

pub(crate) fn from_env() -> Option<Zeroizing<String>> {
    std::env::var(PASSPHRASE_ENV)
        .ok()
        .filter(|s| !s.is_empty())
        .map(Zeroizing::new)
}

/// Passphrase for a new encrypted backup: environment first, otherwise an
/// interactive prompt with confirmation.
pub(crate) fn get_new_passphrase() -> Result<Zeroizing<String>> {
    if let Some(pass) = from_env() {
        return Ok(pass);
    }
    let first = Zeroizing::new(prompt_hidden("Enter new passphrase: ")?);
    let second = Zeroizing::new(prompt_hidden("Confirm passphrase: ")?);
    if *first != *second {
        return Err(StackupError::Config("passphrases do not match".into()));
    }
    if first.is_empty() {
        return Err(StackupError::Config("passphrase must not be empty".into()));
    }
    Ok(first)
}

/// Passphrase for opening an existing artifact: environment always wins;
/// the prompt is only shown when explicitly requested.
pub(crate) fn get_existing_passphrase(prompt: bool) -> Result<Option<Zeroizing<String>>> {
    if let Some(pass) = from_env() {
        return Ok(Some(pass));
    }
    if !prompt {
        return Ok(None);
    }
    Ok(Some(Zeroizing::new(prompt_hidden("Enter passphrase: ")?)))
}
