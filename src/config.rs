// System
use std::path::{Path, PathBuf};

// Third Party
use kube::config::{Config, InClusterError, KubeConfigOptions, Kubeconfig};
use tracing::{debug, info};

// Local
use crate::{error::Error, utils::KUBECONFIG_RELATIVE_PATH};

/// Resolve the cluster connection, preferring the in-cluster service account and falling back
/// to `$HOME/.kube/config`. No network calls are made.
pub async fn resolve() -> Result<Config, Error> {
    resolve_from(Config::incluster(), std::env::var_os("HOME").map(PathBuf::from)).await
}

/// Resolution with its environment made explicit. An in-cluster config, when present, is always
/// used as is.
pub async fn resolve_from(
    incluster: Result<Config, InClusterError>,
    home: Option<PathBuf>,
) -> Result<Config, Error> {
    let incluster_error = match incluster {
        Ok(config) => {
            info!("Using in-cluster config for {}", config.cluster_url);
            return Ok(config);
        }
        Err(error) => error,
    };
    debug!("No in-cluster config found: {}", incluster_error);

    let home = match home {
        Some(home) => home,
        None => return Err(Error::MissingHome(incluster_error)),
    };
    let path = kubeconfig_path(&home);
    debug!("Falling back to kubeconfig at {}", path.display());

    match load_kubeconfig(&path).await {
        Ok(config) => {
            info!(
                "Using kubeconfig {} for {}",
                path.display(),
                config.cluster_url
            );
            Ok(config)
        }
        Err(kubeconfig) => Err(Error::Resolution {
            incluster: incluster_error,
            kubeconfig,
        }),
    }
}

async fn load_kubeconfig(path: &Path) -> Result<Config, kube::config::KubeconfigError> {
    let kubeconfig = Kubeconfig::read_from(path)?;
    Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default()).await
}

pub fn kubeconfig_path(home: &Path) -> PathBuf {
    KUBECONFIG_RELATIVE_PATH
        .iter()
        .fold(home.to_path_buf(), |path, part| path.join(part))
}

#[cfg(test)]
mod tests {
    // System
    use std::path::{Path, PathBuf};

    // Third Party
    use kube::config::{Config, InClusterError};

    // Local
    use super::{kubeconfig_path, resolve_from};
    use crate::error::Error;

    const KUBECONFIG: &str = r#"
apiVersion: v1
kind: Config
current-context: kind-ng-voice
clusters:
- name: kind-ng-voice
  cluster:
    server: https://127.0.0.1:6443
    insecure-skip-tls-verify: true
contexts:
- name: kind-ng-voice
  context:
    cluster: kind-ng-voice
    user: watcher
users:
- name: watcher
  user:
    token: not-a-real-token
"#;

    fn not_incluster() -> Result<Config, InClusterError> {
        Err(InClusterError::ReadDefaultNamespace(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "no service account mounted",
        )))
    }

    /// A fresh fake home directory under the system temp dir.
    fn fake_home(test_name: &str) -> PathBuf {
        let home = std::env::temp_dir().join(format!(
            "pod-watcher-{}-{}",
            test_name,
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&home);
        std::fs::create_dir_all(home.join(".kube")).unwrap();
        home
    }

    #[test]
    fn test_kubeconfig_path() {
        assert_eq!(
            kubeconfig_path(Path::new("/home/ops")),
            PathBuf::from("/home/ops/.kube/config")
        );
    }

    #[tokio::test]
    async fn test_incluster_config_wins() {
        let incluster = Config::new("https://10.0.0.1:443".parse().unwrap());
        // A bogus home proves the fallback is never consulted
        let config = resolve_from(Ok(incluster), Some(PathBuf::from("/nonexistent")))
            .await
            .unwrap();
        assert_eq!(config.cluster_url.host(), Some("10.0.0.1"));
    }

    #[tokio::test]
    async fn test_falls_back_to_kubeconfig() {
        let home = fake_home("fallback");
        std::fs::write(kubeconfig_path(&home), KUBECONFIG).unwrap();

        let config = resolve_from(not_incluster(), Some(home.clone()))
            .await
            .unwrap();
        assert_eq!(config.cluster_url.host(), Some("127.0.0.1"));
        assert_eq!(config.cluster_url.port_u16(), Some(6443));
        assert!(config.accept_invalid_certs);

        std::fs::remove_dir_all(home).unwrap();
    }

    #[tokio::test]
    async fn test_missing_kubeconfig_is_fatal() {
        let home = fake_home("missing");
        let result = resolve_from(not_incluster(), Some(home.clone())).await;
        assert!(matches!(result, Err(Error::Resolution { .. })));

        std::fs::remove_dir_all(home).unwrap();
    }

    #[tokio::test]
    async fn test_malformed_kubeconfig_is_fatal() {
        let home = fake_home("malformed");
        std::fs::write(kubeconfig_path(&home), "clusters: [this is: not yaml").unwrap();

        let result = resolve_from(not_incluster(), Some(home.clone())).await;
        match result {
            Err(error @ Error::Resolution { .. }) => {
                assert!(error.to_string().starts_with("cannot load kubeconfig"));
            }
            other => panic!("expected a resolution error, got {:?}", other),
        }

        std::fs::remove_dir_all(home).unwrap();
    }

    #[tokio::test]
    async fn test_missing_home_is_fatal() {
        let result = resolve_from(not_incluster(), None).await;
        assert!(matches!(result, Err(Error::MissingHome(_))));
    }
}
