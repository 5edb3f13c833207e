use crate::{cli::actions::ServiceArgs, stacks::Site};
use anyhow::Result;

#[derive(Debug)]
pub struct Args {
    pub service: ServiceArgs,
    pub project: String,
}

/// List the sites the registry knows for a project.
/// # Errors
/// Returns an error if the project is unknown.
pub async fn execute(args: Args) -> Result<()> {
    let service = args.service.build().await?;
    let sites = service.list_sites(&args.project).await?;

    for site in &sites {
        println!("{}", row(site));
    }
    Ok(())
}

fn row(site: &Site) -> String {
    let endpoint = site
        .endpoint
        .as_ref()
        .map_or_else(|| "-".to_string(), ToString::to_string);
    format!("{}\t{}\t{}", site.name, site.status, endpoint)
}
