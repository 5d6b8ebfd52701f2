use hrgate_api::{HrGateConfig, PermissionAdmin, RequestContext};
use hrgate_core::SystemOperation;

/// Provision the default permission catalog and the master system role.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = HrGateConfig::from_env()?;
    hrgate_observability::init_with(config.log_format);

    let admin = PermissionAdmin::bootstrap(&config).await?;
    let report = admin
        .seed_defaults(&RequestContext::system(SystemOperation::Seeding))
        .await?;

    tracing::info!(
        permissions_created = report.permissions_created,
        master_role_created = report.master_role_created,
        "seeding finished"
    );
    Ok(())
}
