use crate::cli::actions::SiteArgs;
use anyhow::Result;

/// Print a site as JSON.
/// # Errors
/// Returns an error if the site does not exist.
pub async fn execute(args: SiteArgs) -> Result<()> {
    let service = args.service.build().await?;

    service.adopt_site(&args.project, &args.site).await?;
    let site = service.get_site(&args.project, &args.site).await?;

    println!("{}", serde_json::to_string_pretty(&site)?);
    Ok(())
}
