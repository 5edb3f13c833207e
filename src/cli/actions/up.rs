use crate::{
    cli::actions::ServiceArgs,
    stacks::{ChangeSummary, Deployment, SiteSpec},
};
use anyhow::{Context, Result};
use std::fmt::Write;
use std::path::PathBuf;

#[derive(Debug)]
pub struct Args {
    pub service: ServiceArgs,
    pub project: String,
    pub site: String,
    pub content_file: PathBuf,
    pub content404_file: PathBuf,
}

/// Create the site, or update it when it already exists.
/// # Errors
/// Returns an error if a content file cannot be read or the deployment fails.
pub async fn execute(args: Args) -> Result<()> {
    let content = tokio::fs::read_to_string(&args.content_file)
        .await
        .with_context(|| format!("Failed to read {}", args.content_file.display()))?;
    let content404 = tokio::fs::read_to_string(&args.content404_file)
        .await
        .with_context(|| format!("Failed to read {}", args.content404_file.display()))?;

    let spec = SiteSpec {
        project: args.project,
        site: args.site,
        content,
        content404,
        ..SiteSpec::default()
    };

    let service = args.service.build().await?;
    let deployment = service.upsert_site(&spec).await?;

    print!("{}", render(&deployment));
    Ok(())
}

fn summary_lines(changes: ChangeSummary) -> String {
    let mut out = String::from("update summary:\n");
    for (op, count) in [
        ("create", changes.create),
        ("update", changes.update),
        ("delete", changes.delete),
        ("same", changes.same),
    ] {
        if count > 0 {
            let _ = writeln!(out, "    {op}: {count}");
        }
    }
    out
}

fn render(deployment: &Deployment) -> String {
    let mut out = summary_lines(deployment.changes);
    if let Some(outputs) = deployment.outputs() {
        let _ = writeln!(out, "staticEndpoint: {}", outputs.endpoint);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::actions::service::tests::memory_args;
    use std::io::Write as _;

    #[test]
    fn test_summary_skips_zero_counts() {
        let out = summary_lines(ChangeSummary {
            create: 0,
            update: 1,
            delete: 0,
            same: 4,
        });
        assert_eq!(out, "update summary:\n    update: 1\n    same: 4\n");
    }

    #[tokio::test]
    async fn test_up_with_memory_engine() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let index = dir.path().join("index.html");
        let missing = dir.path().join("404.html");
        std::fs::File::create(&index)?.write_all(b"<h1>hi</h1>")?;
        std::fs::File::create(&missing)?.write_all(b"<h1>404</h1>")?;

        let service = memory_args().build().await?;
        let spec = SiteSpec {
            project: "acme".to_string(),
            site: "blog".to_string(),
            content: std::fs::read_to_string(&index)?,
            content404: std::fs::read_to_string(&missing)?,
            ..SiteSpec::default()
        };
        let deployment = service.upsert_site(&spec).await?;
        let out = render(&deployment);
        assert!(out.starts_with("update summary:\n    create: 5\n"));
        assert!(out.contains("staticEndpoint: https://"));

        execute(Args {
            service: memory_args(),
            project: "acme".to_string(),
            site: "blog".to_string(),
            content_file: index,
            content404_file: missing,
        })
        .await
    }

    #[tokio::test]
    async fn test_up_missing_file() {
        let result = execute(Args {
            service: memory_args(),
            project: "acme".to_string(),
            site: "blog".to_string(),
            content_file: PathBuf::from("/nonexistent/index.html"),
            content404_file: PathBuf::from("/nonexistent/404.html"),
        })
        .await;
        assert!(result
            .err()
            .is_some_and(|e| e.to_string().contains("Failed to read /nonexistent/index.html")));
    }
}
