//! Credential Store (C2): resolves `${NAME}` references from the
//! process environment, then the OS keychain, and provides the
//! administrative `set`/`get`/`list`/`delete` operations used by the
//! `minerva keychain` CLI subcommand.

use crate::errors::{MinervaError, Result};

const SERVICE: &str = "minerva";

/// Resolves a credential reference. A reference that is not a
/// `${NAME}` template is returned unchanged (treated as a literal
/// secret already present in config). Resolution order: process
/// environment variable `NAME`, then keychain entry under service
/// `minerva`, account `NAME`.
pub fn resolve(reference: &str) -> Result<String> {
    let Some(name) = template_name(reference) else {
        return Ok(reference.to_string());
    };

    if let Ok(value) = std::env::var(name) {
        return Ok(value);
    }

    match keyring::Entry::new(SERVICE, name).and_then(|e| e.get_password()) {
        Ok(secret) => Ok(secret),
        Err(_) => Err(MinervaError::CredentialMissing {
            variable: name.to_string(),
        }),
    }
}

fn template_name(reference: &str) -> Option<&str> {
    reference.strip_prefix("${").and_then(|s| s.strip_suffix('}'))
}

/// Administrative keychain operations. These never touch the process
/// environment — only the OS keychain.
pub fn keychain_set(name: &str, secret: &str) -> Result<()> {
    keyring::Entry::new(SERVICE, name)
        .and_then(|e| e.set_password(secret))
        .map_err(|e| MinervaError::Storage {
            message: format!("failed to write keychain entry {name}: {e}"),
        })
}

pub fn keychain_get(name: &str) -> Result<String> {
    keyring::Entry::new(SERVICE, name)
        .and_then(|e| e.get_password())
        .map_err(|_| MinervaError::CredentialMissing {
            variable: name.to_string(),
        })
}

/// Reports whether an entry exists for `name`, without exposing its
/// value. The `keyring` crate has no cross-platform enumeration API,
/// so `keychain list` checks presence for the single named entry
/// rather than listing every secret under the `minerva` service.
pub fn keychain_contains(name: &str) -> bool {
    keyring::Entry::new(SERVICE, name).and_then(|e| e.get_password()).is_ok()
}

pub fn keychain_delete(name: &str) -> Result<()> {
    keyring::Entry::new(SERVICE, name)
        .and_then(|e| e.delete_credential())
        .map_err(|e| MinervaError::Storage {
            message: format!("failed to delete keychain entry {name}: {e}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_reference_passes_through() {
        assert_eq!(resolve("literal-secret").unwrap(), "literal-secret");
    }

    #[test]
    fn template_name_extraction() {
        assert_eq!(template_name("${OPENAI_API_KEY}"), Some("OPENAI_API_KEY"));
        assert_eq!(template_name("plain"), None);
    }

    #[test]
    fn env_var_resolves_template() {
        std::env::set_var("MINERVA_TEST_CRED", "secret-value");
        assert_eq!(resolve("${MINERVA_TEST_CRED}").unwrap(), "secret-value");
        std::env::remove_var("MINERVA_TEST_CRED");
    }

    #[test]
    fn missing_reference_is_credential_missing() {
        std::env::remove_var("MINERVA_DOES_NOT_EXIST_XYZ");
        let err = resolve("${MINERVA_DOES_NOT_EXIST_XYZ}").unwrap_err();
        assert_eq!(err.code(), "CREDENTIAL_MISSING");
    }
}
