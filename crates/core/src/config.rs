//! Core runtime configuration.
//!
//! This module defines configuration that should be resolved once at process startup and then
//! passed into core services. Nothing in the crate reads process-wide environment variables
//! while handling an operation; the binary parses them into a [`CoreConfig`] and hands it over.

use crate::identity::AccessPolicy;
use crate::{CoreError, CoreResult};
use clinic_files::UploadPolicy;
use clinic_types::{EmailAddress, NonEmptyText};

/// Connection parameters for the managed backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackendConfig {
    project_id: NonEmptyText,
    api_key: Option<String>,
    storage_bucket: Option<String>,
}

impl BackendConfig {
    pub fn new(
        project_id: &str,
        api_key: Option<String>,
        storage_bucket: Option<String>,
    ) -> CoreResult<Self> {
        let project_id = NonEmptyText::new(project_id)
            .map_err(|_| CoreError::InvalidInput("project_id cannot be empty".into()))?;

        Ok(Self {
            project_id,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            storage_bucket: storage_bucket.filter(|b| !b.trim().is_empty()),
        })
    }

    pub fn project_id(&self) -> &str {
        self.project_id.as_str()
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    /// Bucket name, defaulting to `{project_id}.appspot.com`.
    pub fn storage_bucket(&self) -> String {
        self.storage_bucket
            .clone()
            .unwrap_or_else(|| format!("{}.appspot.com", self.project_id))
    }
}

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    backend: BackendConfig,
    access_policy: AccessPolicy,
    upload_policy: UploadPolicy,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    pub fn new(
        backend: BackendConfig,
        admin_emails: Vec<EmailAddress>,
        upload_policy: UploadPolicy,
    ) -> CoreResult<Self> {
        if upload_policy.max_bytes() == 0 {
            return Err(CoreError::InvalidInput(
                "maximum upload size must be positive".into(),
            ));
        }
        if upload_policy.allowed_types().is_empty() {
            return Err(CoreError::InvalidInput(
                "at least one upload content type must be allowed".into(),
            ));
        }

        Ok(Self {
            backend,
            access_policy: AccessPolicy::new(admin_emails),
            upload_policy,
        })
    }

    pub fn backend(&self) -> &BackendConfig {
        &self.backend
    }

    pub fn access_policy(&self) -> &AccessPolicy {
        &self.access_policy
    }

    pub fn upload_policy(&self) -> &UploadPolicy {
        &self.upload_policy
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn comma_separated(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty())
}

/// Parse the admin allow-list from an optional comma-separated value.
///
/// Missing or blank means no admins.
pub fn admin_emails_from_env_value(value: Option<String>) -> CoreResult<Vec<EmailAddress>> {
    let Some(value) = non_empty(value) else {
        return Ok(Vec::new());
    };
    comma_separated(&value)
        .map(|email| EmailAddress::parse(email).map_err(CoreError::from))
        .collect()
}

/// Parse the upload ceiling in bytes; missing or blank yields `default`.
pub fn max_upload_bytes_from_env_value(value: Option<String>, default: u64) -> CoreResult<u64> {
    match non_empty(value) {
        None => Ok(default),
        Some(v) => v.parse::<u64>().map_err(|_| {
            CoreError::InvalidInput(format!("maximum upload size must be a byte count: '{}'", v))
        }),
    }
}

/// Parse the allowed content types; missing or blank yields `default`.
pub fn allowed_types_from_env_value(value: Option<String>, default: &[&str]) -> Vec<String> {
    match non_empty(value) {
        None => default.iter().map(|t| t.to_string()).collect(),
        Some(v) => comma_separated(&v).map(str::to_string).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clinic_files::{DEFAULT_ALLOWED_TYPES, DEFAULT_MAX_UPLOAD_BYTES};

    #[test]
    fn test_backend_requires_project_id() {
        assert!(BackendConfig::new("  ", None, None).is_err());

        let backend = BackendConfig::new("clinic-dev", Some(" ".into()), None).unwrap();
        assert_eq!(backend.api_key(), None);
        assert_eq!(backend.storage_bucket(), "clinic-dev.appspot.com");
    }

    #[test]
    fn test_core_config_rejects_empty_upload_policy() {
        let backend = BackendConfig::new("clinic-dev", None, None).unwrap();
        assert!(CoreConfig::new(backend.clone(), vec![], UploadPolicy::new(0, vec!["a/b".into()])).is_err());
        assert!(CoreConfig::new(backend.clone(), vec![], UploadPolicy::new(10, vec![])).is_err());
        assert!(CoreConfig::new(backend, vec![], UploadPolicy::default()).is_ok());
    }

    #[test]
    fn test_admin_emails_parsing() {
        assert!(admin_emails_from_env_value(None).unwrap().is_empty());

        let emails =
            admin_emails_from_env_value(Some(" a@clinic.org, ,b@clinic.org ".into())).unwrap();
        assert_eq!(emails.len(), 2);
        assert_eq!(emails[1].as_str(), "b@clinic.org");

        assert!(admin_emails_from_env_value(Some("not-an-email".into())).is_err());
    }

    #[test]
    fn test_upload_settings_parsing() {
        assert_eq!(
            max_upload_bytes_from_env_value(None, DEFAULT_MAX_UPLOAD_BYTES).unwrap(),
            DEFAULT_MAX_UPLOAD_BYTES
        );
        assert_eq!(
            max_upload_bytes_from_env_value(Some("1024".into()), DEFAULT_MAX_UPLOAD_BYTES).unwrap(),
            1024
        );
        assert!(max_upload_bytes_from_env_value(Some("20MB".into()), 1).is_err());

        assert_eq!(
            allowed_types_from_env_value(None, DEFAULT_ALLOWED_TYPES).len(),
            DEFAULT_ALLOWED_TYPES.len()
        );
        assert_eq!(
            allowed_types_from_env_value(Some("image/png, application/pdf".into()), DEFAULT_ALLOWED_TYPES),
            vec!["image/png".to_string(), "application/pdf".to_string()]
        );
    }
}
