//! Kubernetes client construction

use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};

use crate::config::DriftConfig;
use crate::error::{KubeError, Result};

/// Build a client from the resolved kubeconfig and context
pub async fn connect(config: &DriftConfig) -> Result<Client> {
    let kubeconfig = Kubeconfig::read_from(&config.kubeconfig).map_err(|e| {
        KubeError::InvalidConfig(format!(
            "reading kubeconfig '{}' failed: {}",
            config.kubeconfig.display(),
            e
        ))
    })?;

    let options = KubeConfigOptions {
        context: config.kube_context.clone(),
        ..Default::default()
    };

    let client_config = Config::from_custom_kubeconfig(kubeconfig, &options)
        .await
        .map_err(|e| KubeError::InvalidConfig(format!("loading kubeconfig failed: {}", e)))?;

    Ok(Client::try_from(client_config)?)
}
