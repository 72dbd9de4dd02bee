// Third Party
use kube::config::{InClusterError, KubeconfigError};
use thiserror::Error;

/// Startup failures. Anything that goes wrong once the watch loop is running is logged and
/// retried instead.
#[derive(Debug, Error)]
pub enum Error {
    #[error("not running in-cluster ({0}) and HOME is not set to locate a kubeconfig")]
    MissingHome(#[source] InClusterError),

    #[error("cannot load kubeconfig: {kubeconfig} (in-cluster config unavailable: {incluster})")]
    Resolution {
        incluster: InClusterError,
        #[source]
        kubeconfig: KubeconfigError,
    },

    #[error("failed to create kubernetes client: {0}")]
    Client(#[from] kube::Error),
}
