use crate::cli::actions::SiteArgs;
use anyhow::Result;

/// Tear down a site and forget its stack.
/// # Errors
/// Returns an error if the site does not exist or the engine fails.
pub async fn execute(args: SiteArgs) -> Result<()> {
    let service = args.service.build().await?;

    service.adopt_site(&args.project, &args.site).await?;
    service.delete_site(&args.project, &args.site).await?;

    println!(
        "Stack {} in project {} destroyed",
        args.site, args.project
    );
    Ok(())
}
