// System
use std::time::Duration;

// Third Party
use tracing_subscriber::EnvFilter;

/// Only pods carrying this label are watched.
pub const LABEL_SELECTOR: &str = "project=ng-voice";

/// Longest watch the API client accepts. The server closes each session after this long and
/// the loop reopens it, replaying every matching pod as `Added`.
pub const WATCH_TIMEOUT_SECS: u32 = 290;

/// Resource version every session starts from: whatever state the API server has cached.
pub const WATCH_RESOURCE_VERSION: &str = "0";

/// Fixed delay between the end of one watch session and the next attempt to open one.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Location of the fallback kubeconfig, relative to `$HOME`.
pub const KUBECONFIG_RELATIVE_PATH: [&str; 2] = [".kube", "config"];

/// Install a fmt subscriber that logs the given targets at `level` and everything else at `warn`.
/// `RUST_LOG` takes precedence when set.
pub fn init_tracing(targets: &[&str], level: tracing::Level) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(targets, level)));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn default_directives(targets: &[&str], level: tracing::Level) -> String {
    let mut directives = vec!["warn".to_string()];
    directives.extend(targets.iter().map(|target| format!("{}={}", target, level)));
    directives.join(",")
}
