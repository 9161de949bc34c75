// This file implements `forgebin cache`: listing the install cache, dropping the
// records of individual tools and clearing it entirely. It only touches `cache.yml`;
// installed executables are left where they are.

use anyhow::Result;
use clap::{Args, Subcommand};
use colored::Colorize;
use forgebin::libs::cache_store::CacheStore;
use forgebin::libs::config_loading::expand_path;
use forgebin::libs::utilities::timestamps::{display_timestamp, time_since};
use forgebin::schemas::config::default_cache_dir;
use forgebin::schemas::tools::tool_id;
use forgebin::{log_info, log_warn};
use prettytable::format::consts::FORMAT_BOX_CHARS;
use prettytable::{Table, row};

/// Flags of `forgebin cache`.
#[derive(Args, Debug)]
pub struct CacheArgs {
    /// Directory holding cache.yml
    #[arg(long, global = true, env = "FORGEBIN_CACHE_DIR")]
    pub cache_dir: Option<String>,

    #[command(subcommand)]
    pub action: CacheAction,
}

#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// List cached tools
    List,
    /// Forget a tool so the next run re-evaluates it
    Remove {
        /// Tool name
        name: String,
        /// Output directory the tool was installed into; without it every record
        /// with this name is removed
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Delete the cache file
    Clear,
}

/// Runs the `cache` command.
pub fn run(args: CacheArgs) -> Result<()> {
    let dir = args
        .cache_dir
        .as_deref()
        .map(expand_path)
        .unwrap_or_else(default_cache_dir);
    let store = CacheStore::new(dir.join("cache.yml"));

    match args.action {
        CacheAction::List => list(&store),
        CacheAction::Remove { name, output } => remove(&store, &name, output.as_deref())?,
        CacheAction::Clear => {
            store.clear()?;
            log_info!("[Cache] Cleared {}", store.path().display().to_string().cyan());
        }
    }
    Ok(())
}

fn list(store: &CacheStore) {
    let cache = store.load();
    if cache.is_empty() {
        log_info!("[Cache] No cached tools in {}", store.path().display());
        return;
    }

    let mut table = Table::new();
    table.set_format(*FORMAT_BOX_CHARS);
    table.set_titles(row![b => "Tool", "Version", "Source", "Path", "Updated"]);
    for item in cache.items() {
        table.add_row(row![
            item.name,
            item.version,
            item.kind,
            item.path,
            format!("{} ({})", display_timestamp(&item.updated), time_since(&item.updated)),
        ]);
    }
    table.printstd();
}

fn remove(store: &CacheStore, name: &str, output: Option<&str>) -> Result<()> {
    let ids: Vec<String> = match output {
        Some(output) => vec![tool_id(&expand_path(output).display().to_string(), name)],
        None => store
            .load()
            .items()
            .into_iter()
            .filter(|item| item.name == name)
            .map(|item| item.id.clone())
            .collect(),
    };

    let mut removed = 0;
    for id in ids {
        if store.remove(&id)?.is_some() {
            removed += 1;
        }
    }
    if removed == 0 {
        log_warn!("[Cache] No cached record for {}", name.yellow());
    } else {
        log_info!("[Cache] Removed {} record(s) for {}", removed, name.bold());
    }
    Ok(())
}
