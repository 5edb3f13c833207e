use crate::cli::actions::SiteArgs;
use anyhow::Result;

/// Re-sync a site's outputs with its real resources.
/// # Errors
/// Returns an error if the site does not exist or the engine fails.
pub async fn execute(args: SiteArgs) -> Result<()> {
    let service = args.service.build().await?;

    service.adopt_site(&args.project, &args.site).await?;
    let site = service.refresh_site(&args.project, &args.site).await?;

    if let Some(endpoint) = site.endpoint {
        println!("staticEndpoint: {endpoint}");
    }
    Ok(())
}
