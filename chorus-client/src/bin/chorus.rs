//! Chorus command-line entry point.
//!
//! ```text
//! chorus [--config chorus.toml] [--add-client <name>] [--post <text> [--client <name>] [--count <n>]]
//! ```
//!
//! Signs in with `CHORUS_EMAIL` / `CHORUS_PASSWORD` when no saved session
//! is valid.

use std::sync::Arc;

use chorus_client::{forget_session, persist_session, restore_session, Cli, RestClient};
use chorus_core::{
    AiProvider, ChorusConfig, Client, ClientDraft, Keyword, MutationKind, SampleComment, SystemClock,
};
use chorus_llm::{default_provider, generator_for, CommentPrompt};
use chorus_session::{SessionContext, SessionSettings, SessionState};
use chorus_storage::{
    CollectionMirror, LmdbMedium, MutationMessages, OptimisticExecutor, RefreshOutcome, RemoteCollection,
    RevalidatingFetcher, TracingSink, TtlCache,
};
use clap::Parser;
use color_eyre::eyre::{eyre, WrapErr};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    let config = ChorusConfig::load(cli.config.as_deref())?;
    init_tracing(&config)?;

    let medium = LmdbMedium::open(&config.cache.path, config.cache.map_size_mb)
        .wrap_err_with(|| format!("opening cache at {}", config.cache.path.display()))?;
    let cache = Arc::new(TtlCache::new(
        Arc::new(medium),
        Arc::new(SystemClock),
        config.cache.namespace.clone(),
    ));
    let purged = cache.purge_expired();
    tracing::debug!(purged, "purged expired cache entries");

    let rest = RestClient::new(&config.backend)?;
    rest.set_session(restore_session(&cache));

    let session = SessionContext::new(
        Arc::new(rest.clone()),
        Arc::clone(&cache),
        SessionSettings::from_config(&config),
    );
    let mut state = session.bootstrap().await;
    if !state.is_authenticated() {
        if let (Ok(email), Ok(password)) = (std::env::var("CHORUS_EMAIL"), std::env::var("CHORUS_PASSWORD")) {
            state = session.sign_in(&email, &password).await?;
        }
    }
    match session.session() {
        Some(current) => {
            persist_session(&cache, &current, config.cache.profile_ttl());
        }
        None => forget_session(&cache),
    }

    print_session(&state);
    if !state.is_authenticated() {
        println!("Set CHORUS_EMAIL and CHORUS_PASSWORD to sign in.");
        return Ok(());
    }

    let remote: Arc<dyn RemoteCollection<Client>> = Arc::new(rest.clone());
    let clients = OptimisticExecutor::new(remote, Arc::new(TracingSink))
        .with_mirror(CollectionMirror::new(
            RevalidatingFetcher::new(Arc::clone(&cache), config.timeouts.refresh()),
            "clients",
            config.cache.collection_ttl(),
        ))
        .with_mutation_timeout(config.timeouts.mutation());

    let (read, refresh) = clients.load().await?.into_parts();
    if read.was_cache_hit() {
        let age = read.staleness(cache.clock().now_millis());
        println!("Clients (cached {}s ago):", age.as_secs());
    } else {
        println!("Clients:");
    }
    print_clients(read.value());

    if let Some(refresh) = refresh {
        match refresh.outcome().await {
            RefreshOutcome::Updated => {
                println!("Clients (refreshed):");
                print_clients(&clients.snapshot());
            }
            RefreshOutcome::Failed(e) => println!("Could not refresh clients: {}", e),
            RefreshOutcome::Superseded | RefreshOutcome::Cancelled => {}
        }
    }

    if let Some(name) = cli.add_client {
        let messages = MutationMessages::default_for::<Client>(MutationKind::Create);
        let report = clients.create(ClientDraft::named(name), &messages).await;
        match report.into_result() {
            Ok(Some(created)) => println!("Created client {} ({})", created.name, created.id),
            Ok(None) => {}
            Err(e) => println!("{}: {}", messages.error, e),
        }
    }

    if let Some(post) = cli.post {
        let snapshot = clients.snapshot();
        let client = match cli.client {
            Some(name) => snapshot.iter().find(|c| c.name.eq_ignore_ascii_case(&name)),
            None => snapshot.iter().find(|c| c.is_active),
        }
        .cloned()
        .ok_or_else(|| eyre!("no matching client to comment as"))?;
        generate_comments(&config, &rest, client, post, cli.count).await?;
    }

    Ok(())
}

fn init_tracing(config: &ChorusConfig) -> color_eyre::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.log_filter()));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .map_err(|e| eyre!("Failed to init subscriber: {}", e))
}

async fn generate_comments(
    config: &ChorusConfig,
    rest: &RestClient,
    client: Client,
    post: String,
    count: usize,
) -> color_eyre::Result<()> {
    let providers = RemoteCollection::<AiProvider>::fetch_all(rest).await?;
    let keywords = RemoteCollection::<Keyword>::fetch_all(rest).await?;
    let samples = RemoteCollection::<SampleComment>::fetch_all(rest).await?;

    let provider = default_provider(&providers)?;
    let generator = generator_for(provider, &config.llm.clone().unwrap_or_default())?;
    let prompt = CommentPrompt::builder(client)
        .keywords(&keywords)
        .samples(&samples)
        .post(post)
        .count(count)
        .build()?;

    tracing::info!(
        provider = generator.provider(),
        model = generator.model(),
        client = %prompt.client().name,
        "generating comments"
    );
    let comments = generator.generate(&prompt).await?;
    println!("Suggested comments for {}:", prompt.client().name);
    for (i, comment) in comments.iter().enumerate() {
        println!("  {}. {}", i + 1, comment);
    }
    Ok(())
}

fn print_session(state: &SessionState) {
    match state {
        SessionState::Authenticated(snapshot) => {
            let who = snapshot.user.email.as_deref().unwrap_or(snapshot.user.id.as_str());
            println!("Signed in as {}", who);
            if let Some(profile) = &snapshot.profile {
                if let Some(name) = &profile.full_name {
                    println!("  Name: {}", name);
                }
                if let Some(role) = &profile.role {
                    println!("  Role: {}", role);
                }
            }
            if let Some(org) = &snapshot.organization {
                println!("  Organization: {}", org.name);
            }
            if let Some(error) = &snapshot.error {
                let source = if snapshot.from_cache { "cached profile" } else { "no profile" };
                println!("  ({}: {})", source, error);
            }
        }
        other => match other.error() {
            Some(error) => println!("Not signed in: {}", error),
            None => println!("Not signed in."),
        },
    }
}

fn print_clients(clients: &[Client]) {
    if clients.is_empty() {
        println!("  (none)");
    }
    for client in clients {
        let status = if client.is_active { "" } else { " [inactive]" };
        match &client.industry {
            Some(industry) => println!("  {} - {}{}", client.name, industry, status),
            None => println!("  {}{}", client.name, status),
        }
    }
}
