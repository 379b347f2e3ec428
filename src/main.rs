mod common;
mod config;
mod network;
mod phone;
mod storage;
mod sync;
mod ui;

use std::error::Error;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use common::{
    ChatContext, ChatId, ClientCommand, GeoPoint, HelpRequest, NewRequest, Registration,
    RequestId, UserId,
};
use config::AppConfig;
use network::{AccountApi, HttpApi, MitzvotApi};
use storage::{ClientDatabase, SeenLedger};
use sync::admin::{render_request, render_user};
use sync::{
    AccountOverview, AdminPanel, COUPON_STARS, Counterpart, SyncRuntime, close_account,
    contact_for, request_outcome, resolve_counterpart,
};
use ui::ConsoleApp;

#[derive(Parser)]
#[command(
    name = "mitzvot",
    version,
    about = "Mitzvot mutual-aid client: nearby requests, chats and notifications"
)]
struct Cli {
    /// Path to JSON config file
    #[arg(long, default_value = config::DEFAULT_CONFIG_PATH, value_name = "FILE")]
    config: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a config file with default settings
    InitConfig,
    /// Sign in and print the session token
    Login { email: String, password: String },
    /// Create an account
    Register {
        name: String,
        age: u32,
        email: String,
        password: String,
        /// Israeli mobile number, any common spelling
        phone: String,
    },
    /// Stay signed in and print chat notifications and the nearby feed
    /// (`/help ID`, `/complete ID`, `/refresh`, `/quit`)
    Watch {
        #[arg(long, requires = "lng", allow_negative_numbers = true)]
        lat: Option<f64>,
        #[arg(long, requires = "lat", allow_negative_numbers = true)]
        lng: Option<f64>,
    },
    /// Open a chat and send typed lines (`/attach PATH`, `/complete ID`, `/close`, `/quit`)
    Chat {
        chat_id: String,
        #[arg(long)]
        title: Option<String>,
        /// Mark the chat as belonging to a completed request
        #[arg(long)]
        read_only: bool,
    },
    /// Start a chat with another user about a request, then open it
    StartChat {
        user_id: String,
        request_id: String,
        #[arg(long)]
        title: Option<String>,
    },
    /// Chat with whoever is on the other side of one of your requests
    Contact { request_id: String },
    /// List your chats
    Chats,
    /// List open requests around a location
    Nearby {
        #[arg(allow_negative_numbers = true)]
        lat: f64,
        #[arg(allow_negative_numbers = true)]
        lng: f64,
    },
    /// Post a new help request
    Post {
        title: String,
        description: String,
        #[arg(allow_negative_numbers = true)]
        lat: f64,
        #[arg(allow_negative_numbers = true)]
        lng: f64,
    },
    /// Volunteer for a request
    Help { request_id: String },
    /// Confirm one of your requests was fulfilled
    Complete { request_id: String },
    /// Show stars and requests
    Account,
    /// Set the profile picture URL
    ProfileImage { url: String },
    /// Permanently delete your account
    DeleteAccount {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
    /// Moderation tools (admin role only)
    Admin {
        #[command(subcommand)]
        action: AdminCommand,
    },
    /// Forget which messages were already seen
    ResetSeen,
}

#[derive(Subcommand)]
enum AdminCommand {
    /// List every account
    Users,
    /// Block a user from the service
    Ban { user_id: String },
    /// Lift a ban
    Unban { user_id: String },
    /// List every request
    Requests,
    /// Remove a request
    DeleteRequest {
        request_id: String,
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();
    let app_config = config::load_config(&cli.config).with_env_overrides();
    let api = HttpApi::new(app_config.api_url.clone(), app_config.token.clone());

    match cli.command {
        Command::InitConfig => {
            config::save_config(&cli.config, &app_config)?;
            println!("Wrote {}", cli.config);
        }
        Command::Login { email, password } => {
            let session = api.login(&email, &password).await?;
            let name = session.user.name.as_deref().unwrap_or(&email);
            println!("Signed in as {name}");
            println!("export {}={}", config::TOKEN_ENV, session.token);
        }
        Command::Register {
            name,
            age,
            email,
            password,
            phone,
        } => {
            let Some(phone) = phone::normalize_israeli_phone(&phone) else {
                return Err(format!("`{phone}` is not a valid Israeli mobile number").into());
            };
            let registration = Registration {
                name,
                age,
                email,
                password,
                phone,
                profile_image: None,
            };
            let user = api.register(&registration).await?;
            println!("Registered {}", user.id);
        }
        Command::Watch { lat, lng } => {
            let mut initial = Vec::new();
            if let (Some(latitude), Some(longitude)) = (lat, lng) {
                initial.push(ClientCommand::SetLocation(GeoPoint {
                    latitude,
                    longitude,
                }));
            }
            run_session(&app_config, api, initial, true).await?;
        }
        Command::Chat {
            chat_id,
            title,
            read_only,
        } => {
            let context = ChatContext {
                request_title: title,
                read_only,
                ..ChatContext::new(ChatId::new(chat_id))
            };
            run_session(&app_config, api, vec![ClientCommand::OpenChat(context)], true).await?;
        }
        Command::StartChat {
            user_id,
            request_id,
            title,
        } => {
            let start = ClientCommand::StartChat {
                other_user: UserId::new(user_id),
                request_id: RequestId::new(request_id),
                request_title: title,
            };
            run_session(&app_config, api, vec![start], true).await?;
        }
        Command::Contact { request_id } => {
            let overview = AccountOverview::load(&api).await?;
            let request = overview
                .open
                .iter()
                .chain(&overview.solved_for_others)
                .chain(&overview.completed)
                .find(|request| request.id.as_str() == request_id)
                .ok_or_else(|| format!("request {request_id} is not one of yours"))?;

            let Some(other) = contact_for(&overview.user.id, request) else {
                return Err(format!("nobody to contact about {request_id} yet").into());
            };
            if matches!(
                resolve_counterpart(&overview.user.id, request),
                Counterpart::Helper(_)
            ) {
                println!("Contacting your helper");
            }
            let start = ClientCommand::StartChat {
                other_user: other.id,
                request_id: request.id.clone(),
                request_title: Some(request.title.clone()),
            };
            run_session(&app_config, api, vec![start], true).await?;
        }
        Command::Chats => {
            let me = api.me().await?;
            let chats = api.list_chat_summaries().await?;
            for line in ui::components::sidebar::render(&me.id, &chats) {
                println!("{line}");
            }
        }
        Command::Nearby { lat, lng } => {
            let center = GeoPoint {
                latitude: lat,
                longitude: lng,
            };
            let requests = api
                .fetch_nearby_requests(center, app_config.radius_km)
                .await?;
            println!(
                "{} requests within {} km",
                requests.len(),
                app_config.radius_km
            );
            for request in requests.iter().filter(|request| !request.is_completed) {
                match request.position() {
                    Some(at) => println!(
                        "[{}] {} ({:.4}, {:.4}): {}",
                        request.id, request.title, at.latitude, at.longitude, request.description
                    ),
                    None => println!("[{}] {}: {}", request.id, request.title, request.description),
                }
            }
        }
        Command::Post {
            title,
            description,
            lat,
            lng,
        } => {
            let request = NewRequest {
                title,
                description,
                latitude: lat,
                longitude: lng,
            };
            let created =
                request_action(&app_config, &api, ClientCommand::CreateRequest(request)).await?;
            println!("Posted request {}", created.id);
        }
        Command::Help { request_id } => {
            let help = ClientCommand::OfferHelp(RequestId::new(request_id));
            let request = request_action(&app_config, &api, help).await?;
            println!("You volunteered for \"{}\"", request.title);
        }
        Command::Complete { request_id } => {
            let mut overview = AccountOverview::load(&api).await?;
            let request_id = RequestId::new(request_id);
            if !overview.completable().any(|request| request.id == request_id) {
                return Err(format!("request {request_id} has no helper yet").into());
            }
            let complete = ClientCommand::CompleteRequest(request_id);
            let request = request_action(&app_config, &api, complete).await?;
            let title = request.title.clone();
            overview.record_completion(&api, request).await;
            println!(
                "Completed \"{title}\"; you now have {} stars",
                overview.user.stars
            );
        }
        Command::Account => print_account(&AccountOverview::load(&api).await?),
        Command::ProfileImage { url } => {
            let mut overview = AccountOverview::load(&api).await?;
            overview.set_profile_image(&api, &url).await?;
            println!("Profile picture updated");
            print_account(&overview);
        }
        Command::DeleteAccount { yes } => {
            if !yes {
                return Err("this cannot be undone; pass --yes to delete your account".into());
            }
            storage::ensure_data_dir(&app_config.data_dir)?;
            let ledger = SeenLedger::open(ClientDatabase::with_path(app_config.database_path())?)?;
            let user = close_account(&api, &ledger).await?;
            println!("Deleted account {}", user.id);
        }
        Command::Admin { action } => run_admin(&api, action).await?,
        Command::ResetSeen => {
            storage::ensure_data_dir(&app_config.data_dir)?;
            let ledger = SeenLedger::open(ClientDatabase::with_path(app_config.database_path())?)?;
            let count = ledger.snapshot().markers.len();
            ledger.clear()?;
            println!("Cleared {count} seen markers");
        }
    }

    Ok(())
}

/// Run one request action through the sync runtime and return the request it
/// produced.
async fn request_action(
    app_config: &AppConfig,
    api: &HttpApi,
    command: ClientCommand,
) -> Result<HelpRequest, Box<dyn Error>> {
    let me = api.me().await?;
    let events = SyncRuntime::execute(
        Arc::new(api.clone()),
        me.id,
        SeenLedger::in_memory()?,
        app_config.sync_settings(),
        command,
    )
    .await;
    match request_outcome(events) {
        Some(Ok(request)) => Ok(request),
        Some(Err(message)) => Err(message.into()),
        None => Err("the server did not confirm the action".into()),
    }
}

async fn run_admin(api: &HttpApi, action: AdminCommand) -> Result<(), Box<dyn Error>> {
    let panel = AdminPanel::open(api).await?;
    match action {
        AdminCommand::Users => {
            let users = panel.users().await?;
            println!("{} users", users.len());
            for user in &users {
                println!("  {}", render_user(user));
            }
        }
        AdminCommand::Ban { user_id } => {
            let user = panel.set_banned(&UserId::new(user_id), true).await?;
            println!("{}", render_user(&user));
        }
        AdminCommand::Unban { user_id } => {
            let user = panel.set_banned(&UserId::new(user_id), false).await?;
            println!("{}", render_user(&user));
        }
        AdminCommand::Requests => {
            let requests = panel.requests().await?;
            println!("{} requests", requests.len());
            for request in &requests {
                println!("  {}", render_request(request));
            }
        }
        AdminCommand::DeleteRequest { request_id, yes } => {
            if !yes {
                return Err(format!("pass --yes to delete request {request_id}").into());
            }
            panel.delete_request(&RequestId::new(request_id.as_str())).await?;
            println!("Deleted request {request_id}");
        }
    }
    Ok(())
}

fn print_account(overview: &AccountOverview) {
    let user = &overview.user;
    println!("{}", user.name.as_deref().unwrap_or("(no name)"));
    if let Some(phone) = &user.phone {
        println!("Phone: {}", phone::format_phone_for_display(phone));
    }
    if let Some(image) = &user.profile_image {
        println!("Picture: {image}");
    }
    println!(
        "Stars: {}/{COUPON_STARS} ({:.0}%)",
        user.stars,
        overview.stars_progress() * 100.0
    );
    if overview.coupon_unlocked() {
        println!("Coupon unlocked!");
    } else {
        println!("{} more stars to the coupon", overview.stars_missing());
    }

    println!("Open requests:");
    for request in &overview.open {
        let helper = if request.has_helper() { " (has a helper)" } else { "" };
        println!("  [{}] {}{helper}", request.id, request.title);
    }
    println!("Solved for others: {}", overview.solved_for_others.len());
    println!("Completed: {}", overview.completed.len());
}

/// Run the sync loops for the signed-in user until Ctrl-C, `/quit` or end of
/// input.
async fn run_session(
    app_config: &AppConfig,
    api: HttpApi,
    initial: Vec<ClientCommand>,
    interactive: bool,
) -> Result<(), Box<dyn Error>> {
    let me = api.me().await?;
    log::info!("Signed in as {}", me.id);

    storage::ensure_data_dir(&app_config.data_dir)?;
    let ledger = SeenLedger::open(ClientDatabase::with_path(app_config.database_path())?)?;

    // UI -> Sync
    let (cmd_tx, cmd_rx) = mpsc::channel(100);
    // Sync -> UI
    let (event_tx, mut event_rx) = mpsc::channel(100);

    let runtime = SyncRuntime::new(
        Arc::new(api),
        me.id.clone(),
        ledger,
        app_config.sync_settings(),
        event_tx,
        cmd_rx,
    );
    let runtime = tokio::spawn(runtime.run());

    let mut app = ConsoleApp::new(me.id, cmd_tx);
    for command in initial {
        match command {
            ClientCommand::OpenChat(context) => app.open_chat(context).await,
            other => app.send_command(other).await,
        }
    }

    let mut input = BufReader::new(tokio::io::stdin()).lines();
    let mut reading = interactive;

    loop {
        tokio::select! {
            event = event_rx.recv() => {
                let Some(event) = event else { break };
                for line in app.handle_sync_event(event) {
                    println!("{line}");
                }
            }
            line = input.next_line(), if reading => {
                match line {
                    Ok(Some(line)) => {
                        if !app.submit_input(&line).await {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(err) => {
                        log::warn!("Failed to read input: {err}");
                        reading = false;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    // Dropping the last command sender stops the runtime.
    drop(app);
    drop(event_rx);
    if let Err(err) = runtime.await {
        log::warn!("Sync runtime ended abnormally: {err}");
    }
    Ok(())
}
