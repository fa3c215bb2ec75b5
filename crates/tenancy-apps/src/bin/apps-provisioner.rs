//! Apps Provisioner - replays a seed manifest against an in-memory platform

use anyhow::Context;
use std::collections::BTreeSet;
use tenancy_apps::{apply_seed, AppUseCases, InMemoryPlatform, OrganizationService, ProvisioningConfig, SeedManifest};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("apps-provisioner v{}", env!("CARGO_PKG_VERSION"));

    let config = match std::env::var("APPS_CONFIG_PATH") {
        Ok(path) => ProvisioningConfig::load(&path).with_context(|| format!("loading config from {}", path))?,
        Err(_) => {
            tracing::warn!("APPS_CONFIG_PATH not set, using defaults");
            ProvisioningConfig::default()
        }
    };

    let seed_path = std::env::args()
        .nth(1)
        .context("usage: apps-provisioner <seed.json>")?;
    let manifest = SeedManifest::load(&seed_path).with_context(|| format!("loading seed from {}", seed_path))?;

    let platform = InMemoryPlatform::new(config);
    let (service, dispatcher) = platform.build_service();
    let dispatcher = dispatcher.spawn();

    let summary = apply_seed(&platform, &service, &manifest).await?;
    tracing::info!(?summary, "seed complete");

    let organizations = platform.organizations.organizations();
    for app in service.get_apps().await? {
        for organization in &organizations {
            let owners: BTreeSet<_> = platform.organizations.get_owners(organization.id).await?;
            let configs = service
                .get_available_configs(app.id, &owners, std::slice::from_ref(organization))
                .await?;
            for config in configs {
                tracing::info!(
                    app = %app.name,
                    organization = %organization.title,
                    principal = %config.principal,
                    types = ?config.config.keys().collect::<Vec<_>>(),
                    "available config"
                );
            }
        }
    }

    drop(service);
    dispatcher.await?;
    Ok(())
}
