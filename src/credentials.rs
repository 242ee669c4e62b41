//! Credential loading through a chained store abstraction.
//!
//! The primary store is a private `.env`-style file under the runtime root
//! (mode 0600 enforced). The fallback reads process environment variables.
//! Credentials never touch the main Store or the logs.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};

/// An OAuth-style credential for one provider account.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    /// Bearer access token.
    pub access_token: String,
    /// Refresh token, when the provider issued one.
    pub refresh_token: Option<String>,
    /// Access-token expiry instant, when known.
    pub expires_at_utc: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("expires_at_utc", &self.expires_at_utc)
            .finish()
    }
}

impl Credential {
    /// True when the access token has expired as of `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at_utc.is_some_and(|exp| exp <= now)
    }
}

/// Capability for loading and saving provider credentials.
pub trait CredentialStore: Send + Sync {
    /// Load the credential for `(provider, account_id)`, if present.
    fn load(&self, provider: &str, account_id: &str) -> Option<Credential>;

    /// Persist a credential for `(provider, account_id)`.
    ///
    /// # Errors
    ///
    /// Returns an error when the backing store cannot be written.
    fn save(&self, provider: &str, account_id: &str, credential: &Credential)
        -> anyhow::Result<()>;
}

/// Key prefix for one `(provider, account)` pair, e.g. `GMAIL_PERSONAL`.
fn key_prefix(provider: &str, account_id: &str) -> String {
    format!(
        "{}_{}",
        provider.to_uppercase(),
        account_id.to_uppercase().replace(['-', '.', '@'], "_")
    )
}

fn credential_from_lookup(lookup: impl Fn(&str) -> Option<String>, prefix: &str) -> Option<Credential> {
    let access_token = lookup(&format!("{prefix}_ACCESS_TOKEN"))?;
    if access_token.trim().is_empty() {
        return None;
    }
    let refresh_token = lookup(&format!("{prefix}_REFRESH_TOKEN")).filter(|v| !v.trim().is_empty());
    let expires_at_utc = lookup(&format!("{prefix}_EXPIRES_AT"))
        .and_then(|v| DateTime::parse_from_rfc3339(&v).ok())
        .map(|dt| dt.with_timezone(&Utc));
    Some(Credential {
        access_token,
        refresh_token,
        expires_at_utc,
    })
}

// ---------------------------------------------------------------------------
// File store
// ---------------------------------------------------------------------------

/// Private env-file credential store (`~/.daybook/.env`).
pub struct FileCredentialStore {
    path: PathBuf,
}

impl std::fmt::Debug for FileCredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileCredentialStore")
            .field("path", &self.path)
            .finish()
    }
}

impl FileCredentialStore {
    /// Create a store over the given env-file path. The file may not exist
    /// yet; `load` then returns `None` until the first `save`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Read all key-value pairs, validating file permissions first.
    fn read_vars(&self) -> anyhow::Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        validate_private_permissions(&self.path)?;

        let mut vars = BTreeMap::new();
        let iter = dotenvy::from_path_iter(&self.path)
            .with_context(|| format!("failed to read credentials at {}", self.path.display()))?;
        for item in iter {
            let (key, value) = item.with_context(|| {
                format!(
                    "failed to parse key-value entry in credentials file {}",
                    self.path.display()
                )
            })?;
            vars.insert(key, value);
        }
        Ok(vars)
    }

    fn write_vars(&self, vars: &BTreeMap<String, String>) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let mut contents = String::new();
        for (key, value) in vars {
            contents.push_str(key);
            contents.push('=');
            contents.push_str(value);
            contents.push('\n');
        }
        fs::write(&self.path, contents)
            .with_context(|| format!("failed to write credentials at {}", self.path.display()))?;
        enforce_private_file_permissions(&self.path)
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self, provider: &str, account_id: &str) -> Option<Credential> {
        let vars = match self.read_vars() {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "credential file unreadable");
                return None;
            }
        };
        let prefix = key_prefix(provider, account_id);
        credential_from_lookup(|key| vars.get(key).cloned(), &prefix)
    }

    fn save(
        &self,
        provider: &str,
        account_id: &str,
        credential: &Credential,
    ) -> anyhow::Result<()> {
        let mut vars = self.read_vars()?;
        let prefix = key_prefix(provider, account_id);
        vars.insert(
            format!("{prefix}_ACCESS_TOKEN"),
            credential.access_token.clone(),
        );
        match &credential.refresh_token {
            Some(token) => {
                vars.insert(format!("{prefix}_REFRESH_TOKEN"), token.clone());
            }
            None => {
                vars.remove(&format!("{prefix}_REFRESH_TOKEN"));
            }
        }
        match credential.expires_at_utc {
            Some(exp) => {
                vars.insert(format!("{prefix}_EXPIRES_AT"), exp.to_rfc3339());
            }
            None => {
                vars.remove(&format!("{prefix}_EXPIRES_AT"));
            }
        }
        self.write_vars(&vars)
    }
}

// ---------------------------------------------------------------------------
// Environment store
// ---------------------------------------------------------------------------

/// Read-only fallback store over process environment variables
/// (`DAYBOOK_<PROVIDER>_<ACCOUNT>_ACCESS_TOKEN` etc.).
#[derive(Debug, Default)]
pub struct EnvCredentialStore;

impl CredentialStore for EnvCredentialStore {
    fn load(&self, provider: &str, account_id: &str) -> Option<Credential> {
        let prefix = format!("DAYBOOK_{}", key_prefix(provider, account_id));
        credential_from_lookup(|key| std::env::var(key).ok(), &prefix)
    }

    fn save(
        &self,
        _provider: &str,
        _account_id: &str,
        _credential: &Credential,
    ) -> anyhow::Result<()> {
        Err(anyhow::anyhow!("environment credential store is read-only"))
    }
}

// ---------------------------------------------------------------------------
// Chain
// ---------------------------------------------------------------------------

/// Chained store: first hit wins on load; saves go to the primary.
pub struct ChainedCredentialStore {
    stores: Vec<Box<dyn CredentialStore>>,
}

impl std::fmt::Debug for ChainedCredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainedCredentialStore")
            .field("stores", &self.stores.len())
            .finish()
    }
}

impl ChainedCredentialStore {
    /// Build a chain from ordered stores. The first store is the save target.
    pub fn new(stores: Vec<Box<dyn CredentialStore>>) -> Self {
        Self { stores }
    }

    /// Default chain: private env-file primary, process-env fallback.
    pub fn default_chain(env_file: PathBuf) -> Self {
        Self::new(vec![
            Box::new(FileCredentialStore::new(env_file)),
            Box::new(EnvCredentialStore),
        ])
    }
}

impl CredentialStore for ChainedCredentialStore {
    fn load(&self, provider: &str, account_id: &str) -> Option<Credential> {
        self.stores
            .iter()
            .find_map(|store| store.load(provider, account_id))
    }

    fn save(
        &self,
        provider: &str,
        account_id: &str,
        credential: &Credential,
    ) -> anyhow::Result<()> {
        let primary = self
            .stores
            .first()
            .ok_or_else(|| anyhow::anyhow!("empty credential chain"))?;
        primary.save(provider, account_id, credential)
    }
}

// ---------------------------------------------------------------------------
// Permissions
// ---------------------------------------------------------------------------

/// Ensure a file has private permissions when supported.
///
/// # Errors
///
/// Returns an error if permissions cannot be updated.
pub fn enforce_private_file_permissions(path: &Path) -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        let perms = fs::Permissions::from_mode(0o600);
        fs::set_permissions(path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

#[cfg(unix)]
fn validate_private_permissions(path: &Path) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = fs::metadata(path)
        .with_context(|| format!("failed to inspect credentials file {}", path.display()))?;
    let mode = metadata.permissions().mode() & 0o777;

    if mode & 0o077 != 0 {
        return Err(anyhow::anyhow!(
            "credentials file {} must be 0600, found {:o}",
            path.display(),
            mode
        ));
    }

    Ok(())
}

#[cfg(not(unix))]
fn validate_private_permissions(_path: &Path) -> anyhow::Result<()> {
    Ok(())
}
