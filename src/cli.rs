// PlantScope CLI binary

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use plantscope::collection::{AddOutcome, Collection, RecordRef, RemoteWrite, RemoveOutcome};
use plantscope::config::{self, CollectionConfig};
use plantscope::db;
use plantscope::friends::{friend_collection, friend_summaries};
use plantscope::media::BlobUploader;
use plantscope::model::{CollectionView, UserId, UserSession};
use plantscope::reconcile::{DocumentOutcome, MediaOutcome};
use plantscope::recognition::{record_from_response, EncyclopediaEntry};
use plantscope::store::{DocumentStore, LocalStore};

#[derive(Parser)]
#[command(name = "plantscope")]
#[command(about = "PlantScope - your identified plant collection", long_about = None)]
#[command(version)]
struct Cli {
    /// Data directory (defaults to the platform data dir)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the merged collection
    List {
        /// Signed-in user (omit for local-only)
        #[arg(short, long)]
        user: Option<String>,
    },

    /// Add a plant from a recognition response
    Add {
        /// Recognition response JSON file
        recognition: PathBuf,
        /// Encyclopedia entry JSON file
        #[arg(long)]
        encyclopedia: Option<PathBuf>,
        /// Photo of the plant
        #[arg(long)]
        image: Option<PathBuf>,
        /// Signed-in user (omit for local-only)
        #[arg(short, long)]
        user: Option<String>,
    },

    /// Remove a plant from the collection
    Remove {
        /// Scientific name
        scientific_name: String,
        /// Remote document id
        #[arg(long)]
        doc_id: Option<String>,
        /// Signed-in user (omit for local-only)
        #[arg(short, long)]
        user: Option<String>,
    },

    /// Push local plants to the user's remote collection
    Sync {
        #[arg(short, long)]
        user: String,
    },

    /// List friends and how many plants each has collected
    Friends {
        #[arg(short, long)]
        user: String,
    },

    /// Show a friend's collection
    FriendPlants {
        friend_id: String,
    },

    /// Show or change settings
    Config {
        /// Remote call timeout in seconds
        #[arg(long)]
        remote_timeout: Option<u64>,
        /// Upload timeout in seconds
        #[arg(long)]
        upload_timeout: Option<u64>,
        /// Public base URL for uploaded photos
        #[arg(long)]
        blob_url: Option<String>,
    },
}

/// Everything a command needs, opened from one data directory.
struct AppContext {
    collection: Collection,
    documents: Arc<DocumentStore>,
    config: CollectionConfig,
}

fn resolve_data_dir(data_dir: Option<PathBuf>) -> Result<PathBuf> {
    match data_dir {
        Some(dir) => Ok(dir),
        None => db::get_data_dir(),
    }
}

fn open_context(data_dir: &Path) -> Result<AppContext> {
    let conn = db::open_local_db(&db::get_local_db_path(data_dir))?;
    let config = config::load_config(&conn)?;

    let local = LocalStore::new(conn, config.collection_key.clone());
    let documents = Arc::new(DocumentStore::open(&db::get_document_db_path(data_dir))?);
    let uploader = Arc::new(BlobUploader::new(
        db::get_blobs_path(data_dir),
        config.blob_base_url.clone(),
    ));

    let collection = Collection::new(local, documents.clone(), uploader, config.call_limits());
    Ok(AppContext { collection, documents, config })
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let data_dir = resolve_data_dir(cli.data_dir)?;

    match cli.command {
        Commands::List { user } => cmd_list(&data_dir, user).await,
        Commands::Add { recognition, encyclopedia, image, user } => {
            cmd_add(&data_dir, recognition, encyclopedia, image, user).await
        }
        Commands::Remove { scientific_name, doc_id, user } => {
            cmd_remove(&data_dir, scientific_name, doc_id, user).await
        }
        Commands::Sync { user } => cmd_sync(&data_dir, user).await,
        Commands::Friends { user } => cmd_friends(&data_dir, user).await,
        Commands::FriendPlants { friend_id } => cmd_friend_plants(&data_dir, friend_id).await,
        Commands::Config { remote_timeout, upload_timeout, blob_url } => {
            cmd_config(&data_dir, remote_timeout, upload_timeout, blob_url)
        }
    }
}

fn print_view(view: &CollectionView) {
    if view.is_empty() {
        println!("No plants yet. Use 'plantscope add <recognition.json>' to add one.");
        return;
    }

    println!("{:<32}  {:<24}  {:>6}  {}", "Scientific name", "Common name", "Score", "Status");
    println!("{}", "-".repeat(80));

    for record in view {
        let common = record.identity.common_names.first().map(String::as_str).unwrap_or("-");
        let score = record
            .confidence_score
            .map(|s| format!("{:.0}%", s * 100.0))
            .unwrap_or_else(|| "-".to_string());
        let status = if record.is_local_only() { "local" } else { "synced" };
        println!(
            "{:<32}  {:<24}  {:>6}  {}",
            truncate(&record.identity.scientific_name, 32),
            truncate(common, 24),
            score,
            status
        );
    }

    println!();
    println!("{} plants", view.len());
}

async fn cmd_list(data_dir: &Path, user: Option<String>) -> Result<()> {
    let ctx = open_context(data_dir)?;
    let session = user.map(UserSession::new);

    let view = ctx.collection.view(session.as_ref()).await;
    print_view(&view);
    Ok(())
}

async fn cmd_add(
    data_dir: &Path,
    recognition: PathBuf,
    encyclopedia: Option<PathBuf>,
    image: Option<PathBuf>,
    user: Option<String>,
) -> Result<()> {
    let ctx = open_context(data_dir)?;
    let session = user.map(UserSession::new);

    let response = std::fs::read_to_string(&recognition)
        .with_context(|| format!("Cannot read {}", recognition.display()))?;
    let entry = match encyclopedia {
        Some(path) => {
            let json = std::fs::read_to_string(&path)
                .with_context(|| format!("Cannot read {}", path.display()))?;
            Some(serde_json::from_str::<EncyclopediaEntry>(&json)?)
        }
        None => None,
    };
    let local_uri = match image {
        Some(path) => Some(path.canonicalize().unwrap_or(path).to_string_lossy().to_string()),
        None => None,
    };

    let record = record_from_response(&response, entry, local_uri)?;

    match ctx.collection.add_record(session.as_ref(), record).await? {
        AddOutcome::Added { record, remote } => {
            println!("Added {} ({})", record.identity.scientific_name, record.display_name());
            match remote {
                RemoteWrite::Skipped { reason } => println!("  Saved on this device only: {}", reason),
                RemoteWrite::Attempted { media, document } => {
                    match media {
                        MediaOutcome::NotNeeded => {}
                        MediaOutcome::Uploaded { url } => println!("  Photo:    {}", url),
                        MediaOutcome::UploadFailed { reason } => {
                            println!("  Photo upload failed, kept local copy: {}", reason)
                        }
                    }
                    match document {
                        DocumentOutcome::Created { doc_id } => println!("  Document: {}", doc_id),
                        DocumentOutcome::RemoteWriteFailed { reason } => {
                            println!("  Not saved remotely, will retry on next sync: {}", reason)
                        }
                    }
                }
            }
        }
        AddOutcome::DuplicateRejected { existing } => {
            println!(
                "{} is already in your collection",
                existing.identity.scientific_name
            );
        }
    }

    Ok(())
}

async fn cmd_remove(
    data_dir: &Path,
    scientific_name: String,
    doc_id: Option<String>,
    user: Option<String>,
) -> Result<()> {
    let ctx = open_context(data_dir)?;
    let session = user.map(UserSession::new);
    let target = RecordRef { remote_doc_id: doc_id, scientific_name };

    match ctx.collection.remove_record(session.as_ref(), &target).await? {
        RemoveOutcome::Removed { local_removed, remote } => {
            println!("Removed {}", target.scientific_name);
            println!("  Local copies: {}", local_removed);
            println!("  Remote:       {:?}", remote);
        }
        RemoveOutcome::NotFound => {
            println!("{} is not in the collection", target.scientific_name);
        }
    }

    Ok(())
}

async fn cmd_sync(data_dir: &Path, user: String) -> Result<()> {
    let ctx = open_context(data_dir)?;
    let session = UserSession::new(user);

    let report = ctx.collection.on_sign_in(&session).await?;

    if report.entries.is_empty() {
        println!("Everything is already synced.");
        return Ok(());
    }

    for entry in &report.entries {
        let status = match &entry.document {
            DocumentOutcome::Created { doc_id } => format!("created {}", doc_id),
            DocumentOutcome::RemoteWriteFailed { reason } => format!("failed: {}", reason),
        };
        println!("  {:<32}  {}", truncate(&entry.record.identity.scientific_name, 32), status);
        if let MediaOutcome::UploadFailed { reason } = &entry.media {
            println!("  {:<32}  photo not uploaded: {}", "", reason);
        }
    }

    println!();
    println!("Sync complete:");
    println!("  Pushed:          {}", report.created());
    println!("  Write failures:  {}", report.write_failures());
    println!("  Upload failures: {}", report.upload_failures());
    Ok(())
}

async fn cmd_friends(data_dir: &Path, user: String) -> Result<()> {
    let ctx = open_context(data_dir)?;
    let user = UserId::new(user);

    let summaries = friend_summaries(
        ctx.documents.as_ref(),
        ctx.documents.as_ref(),
        &user,
        ctx.config.call_limits(),
    )
    .await?;

    if summaries.is_empty() {
        println!("No friends yet.");
        return Ok(());
    }

    println!("{:<24}  {:<24}  {:>6}", "Friend", "Id", "Plants");
    println!("{}", "-".repeat(58));
    for friend in summaries {
        let count = friend
            .plants_collected
            .map(|n| n.to_string())
            .unwrap_or_else(|| "?".to_string());
        println!(
            "{:<24}  {:<24}  {:>6}",
            truncate(&friend.username, 24),
            truncate(friend.friend_id.as_str(), 24),
            count
        );
    }
    Ok(())
}

async fn cmd_friend_plants(data_dir: &Path, friend_id: String) -> Result<()> {
    let ctx = open_context(data_dir)?;
    let friend = UserId::new(friend_id);

    let view = friend_collection(ctx.documents.as_ref(), &friend, ctx.config.call_limits()).await?;
    println!("{}'s collection", friend);
    println!();
    print_view(&view);
    Ok(())
}

fn cmd_config(
    data_dir: &Path,
    remote_timeout: Option<u64>,
    upload_timeout: Option<u64>,
    blob_url: Option<String>,
) -> Result<()> {
    let conn = db::open_local_db(&db::get_local_db_path(data_dir))?;
    let mut cfg = config::load_config(&conn)?;

    let changed = remote_timeout.is_some() || upload_timeout.is_some() || blob_url.is_some();
    if let Some(secs) = remote_timeout {
        cfg.remote_timeout_secs = secs;
    }
    if let Some(secs) = upload_timeout {
        cfg.upload_timeout_secs = secs;
    }
    if let Some(url) = blob_url {
        cfg.blob_base_url = url;
    }
    if changed {
        config::save_config(&conn, &cfg)?;
        println!("Settings saved.");
        println!();
    }

    println!("Data directory:  {}", data_dir.display());
    println!("Remote timeout:  {}s", cfg.remote_timeout_secs);
    println!("Upload timeout:  {}s", cfg.upload_timeout_secs);
    println!("Blob base URL:   {}", cfg.blob_base_url);
    println!("Collection key:  {}", cfg.collection_key);
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}
