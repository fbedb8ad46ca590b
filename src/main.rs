use std::sync::Arc;

use anyhow::Context;
use clap::{Arg, ArgAction, Command};
use selfui::config::AppConfig;
use selfui::factory::{ClientFactory, GeminiClientBuilder};
use selfui::handler::GenerationHandler;
use selfui::history::JsonFileHistoryStore;
use selfui::project::JsonFileProjectStore;
use selfui::http::reqwest::default_dyn_transport;
use selfui::remote::RemoteGenerator;
use selfui::server::{AppState, build_router, serve};
use selfui::session::{GenerateBackend, GenerationSession, LocalGenerator};
use selfui::settings::JsonFileSettingsStore;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("selfui")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Describe a UI, get Tailwind markup back")
        .subcommand(Command::new("serve").about("Serve POST /api/generate (default)"))
        .subcommand(
            Command::new("generate")
                .about("Generate markup for one prompt and record it in history")
                .arg(Arg::new("prompt").required(true).help("What to build"))
                .arg(
                    Arg::new("remote")
                        .long("remote")
                        .help("Server origin to call instead of generating in-process"),
                )
                .arg(
                    Arg::new("api-key")
                        .long("api-key")
                        .help("Provider key used for this request only, ahead of the saved key"),
                ),
        )
        .subcommand(
            Command::new("history")
                .about("List past generations, newest first")
                .arg(Arg::new("show").long("show").help("Print the markup of one entry"))
                .arg(Arg::new("delete").long("delete").help("Delete one entry by id")),
        )
        .subcommand(
            Command::new("project")
                .about("List projects, newest first")
                .arg(Arg::new("create").long("create").help("Create a project with this name"))
                .arg(
                    Arg::new("show")
                        .long("show")
                        .help("Print the placeholder markup of one project"),
                )
                .arg(Arg::new("delete").long("delete").help("Delete one project by id")),
        )
        .subcommand(
            Command::new("key")
                .about("Show, save or clear the saved provider key")
                .arg(
                    Arg::new("set")
                        .long("set")
                        .help("Save this key and send it with later requests"),
                )
                .arg(
                    Arg::new("clear")
                        .long("clear")
                        .action(ArgAction::SetTrue)
                        .conflicts_with("set")
                        .help("Forget the saved key"),
                ),
        )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("selfui=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let matches = cli().get_matches();
    let config = AppConfig::from_env().context("invalid configuration")?;

    match matches.subcommand() {
        Some(("generate", args)) => {
            let prompt = args
                .get_one::<String>("prompt")
                .cloned()
                .unwrap_or_default();
            let backend: Arc<dyn GenerateBackend> = match args.get_one::<String>("remote") {
                Some(origin) => {
                    let remote = RemoteGenerator::new(default_dyn_transport()?, origin);
                    remote
                        .health()
                        .await
                        .with_context(|| format!("server at {origin} is not reachable"))?;
                    Arc::new(remote)
                }
                None => Arc::new(LocalGenerator::new(local_handler(&config)?)),
            };
            let session = open_session(&config, backend);
            if session.restore_override_credential().await? {
                info!("using saved provider key");
            }
            if let Some(key) = args.get_one::<String>("api-key") {
                session.set_override_credential(Some(key.clone()));
            }

            let result = session.submit(&prompt).await?;
            println!("{}", result.markup);
        }
        Some(("history", args)) => {
            let session = open_session(&config, Arc::new(Offline));
            if let Some(id) = args.get_one::<String>("delete") {
                if !session.delete_history(id).await? {
                    anyhow::bail!("no history entry with id {id}");
                }
            } else if let Some(id) = args.get_one::<String>("show") {
                let markup = session
                    .open_history(id)
                    .await?
                    .with_context(|| format!("no history entry with id {id}"))?;
                println!("{markup}");
            } else {
                for entry in session.history().await? {
                    println!("{}\t{}\t{}", entry.id, entry.created_at, entry.prompt);
                }
            }
        }
        Some(("project", args)) => {
            let session = open_session(&config, Arc::new(Offline));
            if let Some(name) = args.get_one::<String>("create") {
                let project = session.create_project(name).await?;
                println!("{}", project.id);
            } else if let Some(id) = args.get_one::<String>("delete") {
                if !session.delete_project(id).await? {
                    anyhow::bail!("no project with id {id}");
                }
            } else if let Some(id) = args.get_one::<String>("show") {
                let markup = session
                    .open_project(id)
                    .await?
                    .with_context(|| format!("no project with id {id}"))?;
                println!("{markup}");
            } else {
                for project in session.projects().await? {
                    println!("{}\t{}\t{}", project.id, project.created_at, project.name);
                }
            }
        }
        Some(("key", args)) => {
            let session = open_session(&config, Arc::new(Offline));
            if args.get_flag("clear") {
                session.save_override_credential(None).await?;
            } else if let Some(key) = args.get_one::<String>("set") {
                session.save_override_credential(Some(key.clone())).await?;
            } else if session.restore_override_credential().await? {
                println!("a provider key is saved in {}", config.settings_path.display());
            } else {
                println!("no provider key saved");
            }
        }
        _ => run_server(&config).await?,
    }
    Ok(())
}

fn open_session(config: &AppConfig, backend: Arc<dyn GenerateBackend>) -> GenerationSession {
    GenerationSession::new(
        backend,
        Arc::new(JsonFileHistoryStore::new(&config.history_path)),
    )
    .with_projects(Arc::new(JsonFileProjectStore::new(&config.projects_path)))
    .with_settings(Arc::new(JsonFileSettingsStore::new(&config.settings_path)))
}

fn local_handler(config: &AppConfig) -> anyhow::Result<GenerationHandler> {
    let transport = default_dyn_transport().context("failed to build HTTP client")?;
    let builder = GeminiClientBuilder::from_config(config, transport);
    let factory = ClientFactory::new(Arc::new(builder), config.api_key.clone());
    if !factory.has_default() {
        warn!("no GEMINI_API_KEY configured; requests must supply their own key");
    }
    Ok(GenerationHandler::new(Arc::new(factory)))
}

async fn run_server(config: &AppConfig) -> anyhow::Result<()> {
    let state = AppState::new(local_handler(config)?);
    let shutdown = state.shutdown.clone();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutting down");
            }
            shutdown.cancel();
        }
    });

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    serve(listener, build_router(state), shutdown).await?;
    Ok(())
}

/// Backend for commands that never generate.
struct Offline;

#[async_trait::async_trait]
impl GenerateBackend for Offline {
    async fn generate(
        &self,
        _prompt: &str,
        _override_credential: Option<&str>,
    ) -> Result<String, selfui::session::GenerateFailure> {
        Err(selfui::session::GenerateFailure {
            message: "generation is not available for this command".to_string(),
            details: None,
            status: None,
        })
    }
}
