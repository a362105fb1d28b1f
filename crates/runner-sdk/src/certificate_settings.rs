use crate::error::{PluginError, Result};
use crate::string_util::StringUtil;
use std::path::PathBuf;
use std::sync::Arc;

/// Keys read from the `runner` context.
pub mod keys {
    pub const SKIP_CERT_VALIDATION: &str = "SkipCertValidation";
    pub const CA_INFO: &str = "CAInfo";
    pub const CLIENT_CERT: &str = "ClientCert";
    pub const CLIENT_CERT_KEY: &str = "ClientCertKey";
    pub const CLIENT_CERT_ARCHIVE: &str = "ClientCertArchive";
    pub const CLIENT_CERT_PASSWORD: &str = "ClientCertPassword";
}

/// Certificate configuration the runner was set up with.
#[derive(Debug, Clone, Default)]
pub struct RunnerCertificateSettings {
    pub skip_server_certificate_validation: bool,
    pub ca_certificate_file: Option<String>,
    pub client_certificate_file: Option<String>,
    pub client_certificate_private_key_file: Option<String>,
    pub client_certificate_archive_file: Option<String>,
    pub client_certificate_password: Option<String>,
    /// Built from the archive and password only; the file/key pair is recorded
    /// above but never wired into the manager.
    pub client_certificate_manager: Option<Arc<RunnerClientCertificateManager>>,
}

impl RunnerCertificateSettings {
    /// Resolve certificate settings through `lookup`, which reads a key from
    /// the `runner` context.
    ///
    /// Returns `Ok(None)` when none of `SkipCertValidation`, `CAInfo` and
    /// `ClientCert` is configured.
    pub fn resolve<F>(lookup: F) -> Result<Option<Self>>
    where
        F: Fn(&str) -> Result<Option<String>>,
    {
        let skip_cert_validation = lookup(keys::SKIP_CERT_VALIDATION)?
            .and_then(|v| StringUtil::convert_to_bool(&v))
            .unwrap_or(false);
        let ca_file = non_empty(lookup(keys::CA_INFO)?);
        let client_cert_file = non_empty(lookup(keys::CLIENT_CERT)?);

        if ca_file.is_none() && client_cert_file.is_none() && !skip_cert_validation {
            return Ok(None);
        }

        let mut settings = RunnerCertificateSettings {
            skip_server_certificate_validation: skip_cert_validation,
            ca_certificate_file: ca_file,
            ..Default::default()
        };

        if client_cert_file.is_some() {
            settings.client_certificate_file = client_cert_file;
            settings.client_certificate_private_key_file = lookup(keys::CLIENT_CERT_KEY)?;
            settings.client_certificate_archive_file = lookup(keys::CLIENT_CERT_ARCHIVE)?;
            settings.client_certificate_password = lookup(keys::CLIENT_CERT_PASSWORD)?;
            settings.client_certificate_manager = Some(Arc::new(RunnerClientCertificateManager::new(
                settings.client_certificate_archive_file.clone(),
                settings.client_certificate_password.clone(),
            )));
        }

        Ok(Some(settings))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Supplies the client certificate presented during the TLS handshake.
///
/// The archive is a PEM bundle holding the certificate chain followed by the
/// private key. The password is kept alongside it for archives that need one.
#[derive(Debug, Clone)]
pub struct RunnerClientCertificateManager {
    archive_file: Option<String>,
    password: Option<String>,
}

impl RunnerClientCertificateManager {
    pub fn new(archive_file: Option<String>, password: Option<String>) -> Self {
        Self {
            archive_file,
            password,
        }
    }

    pub fn archive_file(&self) -> Option<&str> {
        self.archive_file.as_deref().filter(|f| !f.is_empty())
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    /// Read the archive and turn it into a TLS identity.
    ///
    /// Returns `Ok(None)` when no archive is configured.
    pub async fn load_identity(&self) -> Result<Option<reqwest::Identity>> {
        let Some(archive) = self.archive_file() else {
            return Ok(None);
        };
        let path = PathBuf::from(archive);

        let pem = tokio::fs::read(&path)
            .await
            .map_err(|e| PluginError::ClientCertificate {
                path: path.clone(),
                message: e.to_string(),
            })?;

        let identity = reqwest::Identity::from_pem(&pem).map_err(|e| PluginError::ClientCertificate {
            path: path.clone(),
            message: e.to_string(),
        })?;

        tracing::debug!("Loaded client certificate archive {}", path.display());
        Ok(Some(identity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Result<Option<String>> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| Ok(map.get(key).cloned())
    }

    #[test]
    fn nothing_configured_resolves_to_none() {
        let settings = RunnerCertificateSettings::resolve(lookup_from(&[])).unwrap();
        assert!(settings.is_none());
    }

    #[test]
    fn skip_validation_false_and_empty_values_resolve_to_none() {
        let settings = RunnerCertificateSettings::resolve(lookup_from(&[
            (keys::SKIP_CERT_VALIDATION, "false"),
            (keys::CA_INFO, ""),
            (keys::CLIENT_CERT, ""),
        ]))
        .unwrap();
        assert!(settings.is_none());
    }

    #[test]
    fn skip_validation_only() {
        let settings =
            RunnerCertificateSettings::resolve(lookup_from(&[(keys::SKIP_CERT_VALIDATION, "true")]))
                .unwrap()
                .unwrap();
        assert!(settings.skip_server_certificate_validation);
        assert!(settings.ca_certificate_file.is_none());
        assert!(settings.client_certificate_manager.is_none());
    }

    #[test]
    fn ca_only_does_not_read_client_keys() {
        let settings = RunnerCertificateSettings::resolve(lookup_from(&[
            (keys::CA_INFO, "/etc/ca.pem"),
            (keys::CLIENT_CERT_ARCHIVE, "/etc/client.pem"),
        ]))
        .unwrap()
        .unwrap();
        assert_eq!(settings.ca_certificate_file.as_deref(), Some("/etc/ca.pem"));
        assert!(settings.client_certificate_archive_file.is_none());
        assert!(settings.client_certificate_manager.is_none());
    }

    #[test]
    fn client_cert_wires_archive_into_manager() {
        let settings = RunnerCertificateSettings::resolve(lookup_from(&[
            (keys::CLIENT_CERT, "/etc/client.crt"),
            (keys::CLIENT_CERT_KEY, "/etc/client.key"),
            (keys::CLIENT_CERT_ARCHIVE, "/etc/client.pem"),
            (keys::CLIENT_CERT_PASSWORD, "hunter2"),
        ]))
        .unwrap()
        .unwrap();
        assert_eq!(settings.client_certificate_file.as_deref(), Some("/etc/client.crt"));
        assert_eq!(
            settings.client_certificate_private_key_file.as_deref(),
            Some("/etc/client.key")
        );
        let manager = settings.client_certificate_manager.unwrap();
        assert_eq!(manager.archive_file(), Some("/etc/client.pem"));
        assert_eq!(manager.password(), Some("hunter2"));
    }

    #[test]
    fn lookup_errors_propagate() {
        let result = RunnerCertificateSettings::resolve(|_| {
            Err(PluginError::MalformedContext {
                namespace: "runner".to_string(),
            })
        });
        assert!(matches!(result, Err(PluginError::MalformedContext { .. })));
    }

    #[tokio::test]
    async fn manager_without_archive_has_no_identity() {
        let manager = RunnerClientCertificateManager::new(Some(String::new()), None);
        assert!(manager.load_identity().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn manager_reports_missing_archive() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.pem");
        let manager =
            RunnerClientCertificateManager::new(Some(missing.to_string_lossy().into_owned()), None);
        let err = manager.load_identity().await.unwrap_err();
        assert!(matches!(err, PluginError::ClientCertificate { ref path, .. } if *path == missing));
    }
}
