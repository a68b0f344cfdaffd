//! Subcommand implementations.
//!
//! The CLI has no UI, so it drives the engine through a host that reports
//! nothing installed and never prompts.

use std::path::Path;
use std::sync::Arc;

use fs_err as fs;
use recommender_core::{
    ExtensionHost, ModelStore, Prompt, RecommendationEngine, RecommenderConfig, StoragePaths,
    UserChoice,
};

const CLI_SOURCE: &str = "recommender-cli";

pub struct Context {
    store: Arc<ModelStore>,
}

impl Context {
    /// `session` of `None` joins the host's current session instead of
    /// starting one.
    pub fn new(paths: StoragePaths, session: Option<&str>, config: &RecommenderConfig) -> Self {
        let options = config.store_options();
        let store = match session {
            Some(session) => ModelStore::with_options(paths, session, options),
            None => ModelStore::joining(paths, options),
        };
        Context {
            store: Arc::new(store),
        }
    }

    fn engine(&self, source_id: &str) -> RecommendationEngine<HeadlessHost> {
        RecommendationEngine::new(Arc::clone(&self.store), Arc::new(HeadlessHost), source_id)
    }
}

struct HeadlessHost;

impl ExtensionHost for HeadlessHost {
    fn is_installed(&self, _extension_id: &str) -> bool {
        false
    }

    fn prompt(&self, _prompt: &Prompt) -> Option<UserChoice> {
        None
    }

    fn install(&self, extension_id: &str, _display_name: &str) -> Result<(), String> {
        Err(format!("cannot install {} from the command line", extension_id))
    }
}

pub fn register(
    ctx: &Context,
    source: &str,
    extension: &str,
    name: &str,
    description: &str,
    startup: bool,
) -> Result<(), String> {
    let engine = ctx.engine(source);
    let rec = engine.create(extension, name, description, startup);
    // Merge only: the startup pass needs a host that can prompt.
    let new_session = engine.add_recommendations_to_model(vec![rec])?;
    println!(
        "Registered {} -> {}{}",
        source,
        extension,
        if new_session { " (new session)" } else { "" }
    );
    Ok(())
}

pub fn ignore(ctx: &Context, extension: &str, startup_only: bool) -> Result<(), String> {
    ctx.engine(CLI_SOURCE).mark_ignored(extension, startup_only)?;
    println!("Ignored {}", extension);
    Ok(())
}

pub fn ignore_one(ctx: &Context, source: &str, extension: &str) -> Result<(), String> {
    let engine = ctx.engine(source);
    engine.mark_ignored_single_rec(&engine.create(extension, "", "", false))?;
    println!("Ignored {} -> {}", source, extension);
    Ok(())
}

pub fn timelock(ctx: &Context, extension: &str) -> Result<(), String> {
    ctx.engine(CLI_SOURCE).timelock_recommendation_for(extension)?;
    println!("Time-locked {}", extension);
    Ok(())
}

pub fn list(ctx: &Context, extension: Option<&str>) -> Result<(), String> {
    let json = match extension {
        Some(id) => {
            let recs = ctx.engine(CLI_SOURCE).recommendations_for(id)?;
            serde_json::to_string_pretty(&recs)
        }
        None => match ctx.store.read_recommendation_model()? {
            Some(model) => serde_json::to_string_pretty(&model),
            None => {
                eprintln!(
                    "No recommendation model in {}",
                    ctx.store.paths().root().display()
                );
                return Ok(());
            }
        },
    }
    .map_err(|e| format!("Failed to serialize output: {}", e))?;
    println!("{}", json);
    Ok(())
}

pub fn write_key(ctx: &Context, key: &str, file: &Path) -> Result<(), String> {
    let contents = fs::read_to_string(file).map_err(|e| e.to_string())?;
    let path = ctx.store.write_key(key, &contents)?;
    println!("{}", path.display());
    Ok(())
}

pub fn lock_status(ctx: &Context) -> Result<(), String> {
    let lock_path = ctx.store.paths().lock_file();
    let Some(status) = ctx.store.lock_status() else {
        println!("Unlocked ({} absent)", lock_path.display());
        return Ok(());
    };

    println!("Lock file: {}", lock_path.display());
    match &status.contents {
        Some(contents) => {
            println!("  Acquired at: {} ms", contents.acquired_at);
            println!("  Nonce:       {}", contents.nonce);
        }
        None => println!("  Contents:    unreadable"),
    }
    println!("  Age:         {:.1}s", status.age.as_secs_f64());
    println!("  Stale:       {}", if status.stale { "yes" } else { "no" });
    Ok(())
}
