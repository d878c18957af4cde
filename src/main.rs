use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use sport_resell::assist::{AssistClient, AssistTask};
use sport_resell::catalog::{CatalogView, LiveCatalog};
use sport_resell::config::{self, Config};
use sport_resell::draft::{DraftComposer, ImageFile, SubmitOutcome};
use sport_resell::filter::{CatalogQuery, MemoFilter};
use sport_resell::model::{Category, CategoryFilter};
use sport_resell::seed::seed_catalog;
use sport_resell::store::ListingStoreClient;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Follow the live catalog and print the filtered view on every change
    Watch {
        /// Case-insensitive title substring
        #[arg(long, default_value = "")]
        text: String,
        /// Category name, or "All"
        #[arg(long, default_value = "All")]
        category: CategoryFilter,
    },
    /// Run one assist task (title, description, price) on the given text
    Assist { task: AssistTask, text: String },
    /// Compose a listing and submit it to the store
    Post {
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        price: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value = "Running")]
        category: Category,
        #[arg(long)]
        qna: Option<String>,
        /// Image file to stage; repeatable, at most 10 are kept
        #[arg(long = "image")]
        images: Vec<PathBuf>,
        /// Assist task to run on the draft before submitting; repeatable
        #[arg(long = "assist")]
        assist: Vec<AssistTask>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;

    match args.command {
        Command::Watch { text, category } => watch(&cfg, CatalogQuery::new(text, category)).await,
        Command::Assist { task, text } => {
            let client = AssistClient::from_config(&cfg)?;
            match client.invoke(task, &text).await {
                Some(raw) => match task.postprocess(&raw) {
                    Some(value) => println!("{}", value),
                    None => println!("(no usable {} in response: {})", task, raw.trim()),
                },
                None => println!("(assist unavailable)"),
            }
            Ok(())
        }
        Command::Post {
            title,
            price,
            description,
            category,
            qna,
            images,
            assist,
        } => {
            let mut draft = DraftComposer::new();
            draft.set_title(title);
            draft.set_price(price);
            draft.set_description(description);
            draft.set_category(category);
            if let Some(note) = qna {
                draft.set_qa_note(note);
            }

            let mut files = Vec::with_capacity(images.len());
            for path in &images {
                let bytes = tokio::fs::read(path)
                    .await
                    .with_context(|| format!("failed to read image: {}", path.display()))?;
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                files.push(ImageFile::new(name, bytes));
            }
            let accepted = draft.attach_images(files);
            if accepted < images.len() {
                warn!(accepted, given = images.len(), "image limit reached; extra images dropped");
            }

            if !assist.is_empty() {
                let client = AssistClient::from_config(&cfg)?;
                for task in assist {
                    let changed = draft.assist(&client, task).await;
                    info!(%task, changed, "assist applied");
                }
            }

            let store = ListingStoreClient::from_config(&cfg)?;
            let session = cfg.session();
            match draft.submit(session.as_ref(), &store).await {
                SubmitOutcome::Posted(record) => {
                    println!("posted {} ({} at {})", record.id, record.title, record.price);
                    Ok(())
                }
                SubmitOutcome::Incomplete => Err(anyhow!("title and a positive price are required")),
                SubmitOutcome::Unauthenticated => Err(anyhow!("no session configured")),
                SubmitOutcome::Rejected(err) => Err(err).context("listing store rejected the listing"),
            }
        }
    }
}

async fn watch(cfg: &Config, query: CatalogQuery) -> Result<()> {
    let catalog = Arc::new(LiveCatalog::new(seed_catalog().to_vec()));
    let mut memo = MemoFilter::new();
    print_view(&catalog.view(), &query, &mut memo);

    let session = cfg.session();
    let store = ListingStoreClient::from_config(cfg)?;
    let shutdown = CancellationToken::new();
    let mut views = catalog.watch();
    let mut follower = {
        let catalog = Arc::clone(&catalog);
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            catalog
                .follow_if_authenticated(session.as_ref(), &store, shutdown)
                .await
        })
    };

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
            // Returns at once without a session, or when the stream closes.
            done = &mut follower => {
                done.context("catalog follower task failed")??;
                return Ok(());
            }
            changed = views.changed() => {
                if changed.is_err() {
                    break;
                }
                let view = views.borrow_and_update().clone();
                print_view(&view, &query, &mut memo);
            }
        }
    }

    shutdown.cancel();
    follower.await.context("catalog follower task failed")??;
    Ok(())
}

fn print_view(view: &CatalogView, query: &CatalogQuery, memo: &mut MemoFilter) {
    let shown = memo.apply(view, query);
    println!(
        "--- catalog #{}: {} of {} listings ---",
        view.generation(),
        shown.len(),
        view.len()
    );
    for rec in shown.iter() {
        println!(
            "{:<24} {:<8} {:>8}  {}  ({})",
            rec.id,
            rec.category.as_str(),
            rec.price,
            rec.title,
            rec.owner_handle
        );
    }
}
