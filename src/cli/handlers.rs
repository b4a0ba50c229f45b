use anyhow::{bail, Result};

use crate::app::App;
use crate::search::{SearchInput, SearchMode};
use crate::web;

pub async fn handle_search(
    query: Option<String>,
    from: Option<String>,
    limit: Option<usize>,
    mode: Option<SearchMode>,
    app: App,
) -> Result<()> {
    if query.is_none() && from.is_none() {
        bail!("either --query or --from is required");
    }

    // one-shot searches want the whole corpus
    if let Some(report) = app.cache.build_cache().await {
        log::debug!(
            "cache ready: files={} failures={}",
            report.files_cached,
            report.failures
        );
    }

    let outcome = app
        .router
        .search(SearchInput {
            query,
            from_path: from,
            limit,
            mode,
        })
        .await;

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

pub async fn handle_daemon(addr: String, app: App) -> Result<()> {
    web::start_daemon(&addr, app).await
}
