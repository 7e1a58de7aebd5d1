use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing_subscriber::EnvFilter;
use wingman_admin::api::auth::{self, ProfileUpdate};
use wingman_admin::api::users::{self, UserInput};
use wingman_admin::api::{ApiClient, ApiError, types};
use wingman_admin::config::{ClientConfig, ConfigError};
use wingman_admin::diagnostics;
use wingman_admin::guard::{GuardTarget, LogNavigator, RouteGuard, SIGN_IN_PATH, return_location};
use wingman_admin::session::{SessionError, SessionStore};
use wingman_admin::storage::{FileStore, StorageError};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("failed to load .env: {0}")]
    Dotenv(#[from] dotenvy::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("sign in required to open {from}; run `wingman login` (sign-in view: {SIGN_IN_PATH})")]
    SignInRequired { from: String },
    #[error("diagnostics reported {0} failed check(s)")]
    Unhealthy(usize),
}

#[derive(Parser, Debug)]
#[command(name = "wingman", version, about = "AI Wingman admin client")]
struct Cli {
    /// Overrides the environment's default API root.
    #[arg(long, env = "WINGMAN_API_BASE_URL")]
    base_url: Option<String>,

    /// Directory holding persisted session records.
    #[arg(long, env = "WINGMAN_STATE_DIR")]
    state_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Login {
        email: String,
        #[arg(long, env = "WINGMAN_PASSWORD", hide_env_values = true)]
        password: String,
        /// View to continue at after sign-in.
        #[arg(long)]
        from: Option<String>,
    },
    Logout,
    Status,
    SendOtp {
        email: String,
    },
    VerifyOtp {
        email: String,
        otp: String,
    },
    ResetPassword(ResetPasswordArgs),
    Profile(ProfileCommand),
    ChangePassword(ChangePasswordArgs),
    Users(UsersCommand),
    /// Raw authenticated GET; prints the JSON body.
    Get {
        path: String,
    },
    Diagnose,
}

#[derive(Args, Debug)]
struct ResetPasswordArgs {
    email: String,
    #[arg(long)]
    token: Option<String>,
    #[arg(long)]
    new_password: String,
    #[arg(long)]
    confirm: String,
}

#[derive(Args, Debug)]
struct ChangePasswordArgs {
    #[arg(long)]
    current: String,
    #[arg(long)]
    new_password: String,
    #[arg(long)]
    confirm: String,
}

#[derive(Args, Debug)]
struct ProfileCommand {
    #[command(subcommand)]
    command: ProfileSubcommand,
}

#[derive(Subcommand, Debug)]
enum ProfileSubcommand {
    Show,
    Update {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },
}

#[derive(Args, Debug)]
struct UsersCommand {
    #[command(subcommand)]
    command: UsersSubcommand,
}

#[derive(Subcommand, Debug)]
enum UsersSubcommand {
    List,
    Create(UserFields),
    Update {
        id: String,
        #[command(flatten)]
        fields: UserFields,
    },
    Delete {
        id: String,
    },
}

#[derive(Args, Debug)]
struct UserFields {
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    email: Option<String>,
    #[arg(long)]
    status: Option<String>,
    /// Extra fields as a JSON object.
    #[arg(long)]
    data: Option<String>,
}

impl UserFields {
    fn into_input(self) -> Result<UserInput, CliError> {
        let extra = match self.data {
            Some(raw) => serde_json::from_str::<Map<String, Value>>(&raw)?,
            None => Map::new(),
        };
        Ok(UserInput { name: self.name, email: self.email, status: self.status, extra })
    }
}

/// Guard outcome for a CLI subcommand: proceed, or stop with a sign-in hint.
struct CommandGate;

impl GuardTarget for CommandGate {
    type Output = Result<(), CliError>;

    fn render(&mut self) -> Self::Output {
        Ok(())
    }

    fn redirect_to_sign_in(&mut self, from: &str) -> Self::Output {
        Err(CliError::SignInRequired { from: from.to_owned() })
    }
}

struct CliContext {
    client: ApiClient,
    session: SessionStore,
    guard: RouteGuard,
}

impl CliContext {
    fn protect(&self, location: &str) -> Result<(), CliError> {
        self.guard.enter(location, &mut CommandGate)
    }
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    // .env first so RUST_LOG and WINGMAN_* from it reach the subscriber and clap.
    let dotenv = match dotenvy::dotenv() {
        Ok(path) => Some(path),
        Err(e) if e.not_found() => None,
        Err(e) => return Err(e.into()),
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();
    if let Some(path) = dotenv {
        tracing::debug!(path = %path.display(), "loaded .env");
    }

    let cli = Cli::parse();
    let mut config = ClientConfig::from_env()?;
    if let Some(base_url) = cli.base_url.as_deref() {
        config.set_base_url(base_url)?;
    }
    if let Some(state_dir) = cli.state_dir {
        config.state_dir = state_dir;
    }

    let store = Arc::new(FileStore::open(&config.state_dir)?);
    let session = SessionStore::load(store)?;
    let client = ApiClient::new(&config, session.clone(), Arc::new(LogNavigator))?;
    let ctx = CliContext { guard: RouteGuard::new(session.clone()), client, session };

    run(&ctx, cli.command).await
}

async fn run(ctx: &CliContext, command: Command) -> Result<(), CliError> {
    match command {
        Command::Login { email, password, from } => {
            let signed_in = auth::login(&ctx.client, &email, &password).await?;
            println!("signed in as {} ({})", signed_in.email, signed_in.user_id);
            println!("continue at {}", return_location(from.as_deref()));
            Ok(())
        }
        Command::Logout => {
            ctx.session.sign_out()?;
            println!("signed out");
            Ok(())
        }
        Command::Status => {
            match ctx.session.session() {
                Some(s) => println!("authenticated as {} ({})", s.email, s.user_id),
                None => println!("not signed in"),
            }
            Ok(())
        }
        Command::SendOtp { email } => {
            auth::send_otp(&ctx.client, &email).await?;
            println!("verification code sent to {email}");
            Ok(())
        }
        Command::VerifyOtp { email, otp } => {
            match auth::verify_otp(&ctx.client, &email, &otp).await? {
                Some(token) => println!("verified; reset token: {token}"),
                None => println!("verified"),
            }
            Ok(())
        }
        Command::ResetPassword(args) => {
            auth::reset_password(&ctx.client, &args.email, args.token.as_deref(), &args.new_password, &args.confirm)
                .await?;
            println!("password reset; sign in with the new password");
            Ok(())
        }
        Command::Profile(profile) => run_profile(ctx, profile).await,
        Command::ChangePassword(args) => {
            ctx.protect("/dashboard/settings")?;
            auth::change_password(&ctx.client, &args.current, &args.new_password, &args.confirm).await?;
            println!("password changed");
            Ok(())
        }
        Command::Users(users) => run_users(ctx, users).await,
        Command::Get { path } => {
            let path = if path.starts_with('/') { path } else { format!("/{path}") };
            ctx.protect(&path)?;
            let value = types::read_value(ctx.client.get(&path).await?).await?;
            print_json(&value)
        }
        Command::Diagnose => {
            let report = diagnostics::run(&ctx.client).await;
            println!("{report}");
            if report.is_healthy() { Ok(()) } else { Err(CliError::Unhealthy(report.failed())) }
        }
    }
}

async fn run_profile(ctx: &CliContext, profile: ProfileCommand) -> Result<(), CliError> {
    ctx.protect("/dashboard/settings")?;
    match profile.command {
        ProfileSubcommand::Show => print_json(&auth::profile(&ctx.client).await?),
        ProfileSubcommand::Update { name, email } => {
            let update = ProfileUpdate { name, email };
            print_json(&auth::update_profile(&ctx.client, &update).await?)
        }
    }
}

async fn run_users(ctx: &CliContext, users: UsersCommand) -> Result<(), CliError> {
    ctx.protect("/users")?;
    match users.command {
        UsersSubcommand::List => print_json(&users::list(&ctx.client).await?),
        UsersSubcommand::Create(fields) => print_json(&users::create(&ctx.client, &fields.into_input()?).await?),
        UsersSubcommand::Update { id, fields } => {
            print_json(&users::update(&ctx.client, &id, &fields.into_input()?).await?)
        }
        UsersSubcommand::Delete { id } => {
            users::delete(&ctx.client, &id).await?;
            println!("deleted user {id}");
            Ok(())
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
