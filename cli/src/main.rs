use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use serde_json::{Value, json};
use taskforge::config::ConfigError;
use taskforge::types::FormError;
use taskforge::{
    ApiError, App, ClientConfig, CreateTaskData, CredentialStore, FileCredentialStore, LoginCredentials,
    MemoryCredentialStore, NavStack, SignupCredentials, UpdateTaskData,
};
use tracing_subscriber::EnvFilter;


#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Form(#[from] FormError),
    #[error("{0}")]
    Api(#[from] ApiError),
    #[error("{0}")]
    Task(String),
    #[error("not signed in; run `taskforge login` first")]
    NotSignedIn,
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "taskforge", about = "Task manager API client")]
struct Cli {
    #[arg(long, env = "TASKFORGE_API_URL")]
    api_url: Option<String>,

    #[arg(long, help = "Keep credentials in memory only")]
    ephemeral: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "TASKFORGE_PASSWORD", hide_env_values = true)]
        password: String,
    },
    Signup(SignupArgs),
    Logout,
    Whoami,
    Tasks(TasksCommand),
}

#[derive(Args, Debug)]
struct SignupArgs {
    #[arg(long)]
    name: String,
    #[arg(long)]
    email: String,
    #[arg(long)]
    password: String,
    #[arg(long)]
    confirm_password: String,
}

#[derive(Args, Debug)]
struct TasksCommand {
    #[command(subcommand)]
    command: TasksSubcommand,
}

#[derive(Subcommand, Debug)]
enum TasksSubcommand {
    List,
    Show {
        id: String,
    },
    Add {
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: Option<String>,
    },
    Edit {
        id: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: Option<String>,
    },
    /// Flip the task's completed flag.
    Toggle {
        id: String,
    },
    Delete {
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = ClientConfig::from_env()?;
    if let Some(api_url) = &cli.api_url {
        config = config.with_api_url(api_url);
    }

    tracing::debug!(api_url = %config.api_url, ephemeral = cli.ephemeral, "starting");

    let store: Arc<dyn CredentialStore> = if cli.ephemeral {
        Arc::new(MemoryCredentialStore::new())
    } else {
        Arc::new(FileCredentialStore::new(config.credentials_dir.clone()))
    };
    let app = App::start(&config, store).await?;
    let _listener = app.auth.spawn_event_listener();

    if let Some(output) = run(&app, cli.command).await? {
        print_json(&output)?;
    }
    Ok(())
}

async fn run(app: &App, command: Command) -> Result<Option<Value>, CliError> {
    match command {
        Command::Login { email, password } => {
            let credentials = LoginCredentials { email, password };
            credentials.validate()?;
            app.auth.sign_in(&credentials).await?;
            Ok(Some(whoami(app)))
        }
        Command::Signup(args) => {
            let credentials = SignupCredentials {
                name: args.name,
                email: args.email,
                password: args.password,
                confirm_password: args.confirm_password,
            };
            credentials.validate()?;
            app.auth.sign_up(&credentials).await?;
            Ok(Some(whoami(app)))
        }
        Command::Logout => {
            app.auth.sign_out().await;
            Ok(None)
        }
        Command::Whoami => Ok(Some(whoami(app))),
        Command::Tasks(tasks) => {
            if app.auth.state().nav_stack() != NavStack::Tasks {
                return Err(CliError::NotSignedIn);
            }
            run_tasks(app, tasks.command).await.map(Some)
        }
    }
}

fn whoami(app: &App) -> Value {
    let state = app.auth.state();
    match state.user {
        Some(user) => json!({ "id": user.id, "email": user.email, "name": user.name }),
        None => json!({ "signedIn": false }),
    }
}

async fn run_tasks(app: &App, command: TasksSubcommand) -> Result<Value, CliError> {
    let mut list = app.task_list();
    match command {
        TasksSubcommand::List => {
            if !list.refresh().await {
                return Err(task_error(&list));
            }
            Ok(serde_json::to_value(list.tasks())?)
        }
        TasksSubcommand::Show { id } => {
            let task = list.get(&id).await.ok_or_else(|| task_error(&list))?;
            Ok(serde_json::to_value(task)?)
        }
        TasksSubcommand::Add { title, description } => {
            let data = CreateTaskData::from_form(&title, description.as_deref())?;
            let task = list.add(&data).await.ok_or_else(|| task_error(&list))?;
            Ok(serde_json::to_value(task)?)
        }
        TasksSubcommand::Edit { id, title, description } => {
            let data = UpdateTaskData::from_form(&title, description.as_deref())?;
            let task = list.update(&id, &data).await.ok_or_else(|| task_error(&list))?;
            Ok(serde_json::to_value(task)?)
        }
        TasksSubcommand::Toggle { id } => {
            let current = list.get(&id).await.ok_or_else(|| task_error(&list))?;
            let task = list.toggle(&id, !current.completed).await.ok_or_else(|| task_error(&list))?;
            Ok(serde_json::to_value(task)?)
        }
        TasksSubcommand::Delete { id } => {
            if !list.remove(&id).await {
                return Err(task_error(&list));
            }
            Ok(json!({ "deleted": id }))
        }
    }
}

fn task_error(list: &taskforge::task_list::TaskList) -> CliError {
    CliError::Task(list.error().unwrap_or("task request failed").to_owned())
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
