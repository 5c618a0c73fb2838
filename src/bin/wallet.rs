use std::{error::Error, io, path::PathBuf, process::exit, sync::Arc};

use clap::{Parser, Subcommand};
use directories::ProjectDirs;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use wallet_rs::{
    AccountRequest, BudgetRequest,
    client::{ApiClient, ClientError, FileStorage, MemoryStorage, TokenStore},
};

/// A command line client for the wallet API.
///
/// The refresh token is kept in a session file so later invocations stay
/// logged in. The access token only lives as long as one invocation and is
/// refreshed as needed.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// The base URL of the wallet API.
    #[arg(long, env = "WALLET_API_BASE", default_value = wallet_rs::client::DEFAULT_BASE_URL)]
    base_url: String,

    /// File path to the session file. Defaults to the platform data directory.
    #[arg(long, env = "WALLET_SESSION_FILE")]
    session_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a new user and log in as them.
    Register {
        /// The unique display name for the new user.
        username: String,
        /// The unique email address for the new user.
        email: String,
    },
    /// Log in with an email address or username.
    Login {
        /// The email address or username.
        login: String,
    },
    /// Forget the stored session.
    Logout,
    /// Show the logged in user.
    Whoami,
    /// Set a new password without logging in.
    ForgotPassword {
        /// The username of the account.
        username: String,
        /// The email address of the account.
        email: String,
    },
    /// Change the username and email of the logged in user.
    Profile {
        /// The new username.
        username: String,
        /// The new email address.
        email: String,
    },
    /// Manage accounts.
    #[command(subcommand)]
    Accounts(AccountCommand),
    /// Manage monthly budgets.
    #[command(subcommand)]
    Budgets(BudgetCommand),
}

#[derive(Subcommand, Debug)]
enum AccountCommand {
    /// List accounts.
    List,
    /// Create an account.
    Create {
        /// The display name, defaults to "New Account".
        #[arg(long)]
        name: Option<String>,
        /// The kind of account, defaults to "cash".
        #[arg(long = "type")]
        kind: Option<String>,
    },
    /// Rename or retype an account.
    Update {
        /// The account ID.
        id: i64,
        /// The new display name.
        #[arg(long)]
        name: Option<String>,
        /// The new kind of account.
        #[arg(long = "type")]
        kind: Option<String>,
    },
    /// Delete an account.
    Delete {
        /// The account ID.
        id: i64,
    },
}

#[derive(Subcommand, Debug)]
enum BudgetCommand {
    /// List budgets.
    List {
        /// Only show budgets for this month (YYYY-MM).
        #[arg(long)]
        month: Option<String>,
    },
    /// Create or replace the budget for a month and category.
    Set {
        /// The month (YYYY-MM).
        month: String,
        /// The amount that may be spent.
        amount: f64,
        /// The category, defaults to the overall monthly budget.
        #[arg(long)]
        category: Option<String>,
    },
    /// Delete a budget.
    Delete {
        /// The budget ID.
        id: i64,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    setup_logging();

    let args = Args::parse();
    let session_file = match args.session_file {
        Some(path) => path,
        None => default_session_file()?,
    };

    let token_store = Arc::new(TokenStore::load(
        Arc::new(MemoryStorage::new()),
        Arc::new(FileStorage::new(session_file)),
    ));

    let client = ApiClient::builder()
        .base_url(args.base_url)
        .token_store(token_store)
        .on_login_required(|| {
            print_error("Your session has ended. Log in again with `wallet login`.")
        })
        .build()?;

    if let Err(error) = run(&client, args.command).await {
        print_error(&error);
        exit(1);
    }

    Ok(())
}

async fn run(client: &ApiClient, command: Command) -> Result<(), ClientError> {
    match command {
        Command::Register { username, email } => {
            let Some(password) = prompt_new_password()? else {
                return Ok(());
            };
            let user = client.register(&username, &email, &password).await?;
            println!("Registered and logged in as {} <{}>", user.username, user.email);
        }
        Command::Login { login } => {
            let password = prompt_password("Password: ")?;
            let user = client.login(&login, &password).await?;
            println!("Logged in as {} <{}>", user.username, user.email);
        }
        Command::Logout => {
            client.logout()?;
            println!("Logged out");
        }
        Command::Whoami => {
            let token_store = client.token_store();
            match (token_store.user(), token_store.refresh_token()) {
                (Some(user), _) => println!("{} <{}> (id {})", user.username, user.email, user.id),
                (None, Some(_)) => println!("Logged in (the session will be refreshed on the next request)"),
                (None, None) => println!("Not logged in"),
            }
        }
        Command::ForgotPassword { username, email } => {
            let Some(password) = prompt_new_password()? else {
                return Ok(());
            };
            client.forgot_password(&username, &email, &password).await?;
            println!("Password updated, log in with your new password");
        }
        Command::Profile { username, email } => {
            client.update_profile(&username, &email).await?;
            println!("Profile updated");
        }
        Command::Accounts(command) => run_account_command(client, command).await?,
        Command::Budgets(command) => run_budget_command(client, command).await?,
    }

    Ok(())
}

async fn run_account_command(client: &ApiClient, command: AccountCommand) -> Result<(), ClientError> {
    match command {
        AccountCommand::List => {
            for account in client.accounts().await? {
                println!(
                    "{:>4}  {:<20} {:<12} {:>12.2}",
                    account.id, account.name, account.kind, account.balance
                );
            }
        }
        AccountCommand::Create { name, kind } => {
            let account = client
                .create_account(&AccountRequest { name, kind })
                .await?;
            println!("Created account {} ({})", account.name, account.id);
        }
        AccountCommand::Update { id, name, kind } => {
            client
                .update_account(id, &AccountRequest { name, kind })
                .await?;
            println!("Updated account {id}");
        }
        AccountCommand::Delete { id } => {
            client.delete_account(id).await?;
            println!("Deleted account {id}");
        }
    }

    Ok(())
}

async fn run_budget_command(client: &ApiClient, command: BudgetCommand) -> Result<(), ClientError> {
    match command {
        BudgetCommand::List { month } => {
            for budget in client.budgets(month.as_deref()).await? {
                let category = if budget.category.is_empty() {
                    "(all)"
                } else {
                    &budget.category
                };
                println!(
                    "{:>4}  {}  {:<20} {:>12.2}",
                    budget.id, budget.month, category, budget.amount
                );
            }
        }
        BudgetCommand::Set {
            month,
            amount,
            category,
        } => {
            client
                .set_budget(&BudgetRequest {
                    month: Some(month.clone()),
                    amount: Some(amount),
                    category,
                })
                .await?;
            println!("Set budget for {month}");
        }
        BudgetCommand::Delete { id } => {
            client.delete_budget(id).await?;
            println!("Deleted budget {id}");
        }
    }

    Ok(())
}

fn default_session_file() -> Result<PathBuf, ClientError> {
    ProjectDirs::from("", "", "wallet_rs")
        .map(|dirs| dirs.data_dir().join("session.json"))
        .ok_or_else(|| {
            ClientError::Configuration(
                "could not find a home directory for the session file, use --session-file".to_owned(),
            )
        })
}

fn prompt_password(prompt: &str) -> Result<String, ClientError> {
    rpassword::prompt_password(prompt).map_err(|error| {
        ClientError::Configuration(format!("Could not read password from stdin: {error}"))
    })
}

/// Ask for a new password twice. Returns `None` if stdin was closed.
fn prompt_new_password() -> Result<Option<String>, ClientError> {
    loop {
        let first_password = match rpassword::prompt_password("Enter a new password: ") {
            Ok(string) => string,
            Err(error) if error.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(error) => {
                return Err(ClientError::Configuration(format!(
                    "Could not read password from stdin: {error}"
                )));
            }
        };

        let second_password = prompt_password("Enter the same password again: ")?;

        if first_password != second_password {
            print_error("Passwords must match, try again.");
            continue;
        }

        return Ok(Some(first_password));
    }
}

fn setup_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn print_error(error: impl ToString) {
    eprintln!("\x1b[31;1m{}\x1b[0m", error.to_string());
}
