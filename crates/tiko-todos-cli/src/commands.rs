use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context as _, Result};
use tiko_todos_core::{
    Config, KeyringTokenStore, MemoryTokenStore, RegistrationProfile, SessionManager,
    SessionStatus, TodoClient, TokenStore,
};
use tracing::warn;

use crate::format::{format_timestamp, format_todo_line};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Login { email: Option<String> },
    Register,
    Logout,
    Status,
    List { json: bool },
    Add { description: String },
    Edit { id: i64, description: String },
    SetDone { id: i64, done: bool },
    Delete { id: i64 },
}

impl Command {
    /// Parse arguments after the program name. `Ok(None)` means show usage.
    pub fn parse(args: &[String]) -> Result<Option<Self>> {
        let Some((name, rest)) = args.split_first() else {
            return Ok(None);
        };

        let command = match name.as_str() {
            "-h" | "--help" | "help" => return Ok(None),
            "login" => Command::Login {
                email: rest.first().cloned(),
            },
            "register" => Command::Register,
            "logout" => Command::Logout,
            "status" => Command::Status,
            "list" | "ls" => Command::List {
                json: rest.iter().any(|a| a == "--json"),
            },
            "add" => Command::Add {
                description: join_words(rest, "add")?,
            },
            "edit" => {
                let (id, words) = split_id(rest, "edit")?;
                Command::Edit {
                    id,
                    description: join_words(words, "edit")?,
                }
            }
            "done" => Command::SetDone {
                id: split_id(rest, "done")?.0,
                done: true,
            },
            "undone" => Command::SetDone {
                id: split_id(rest, "undone")?.0,
                done: false,
            },
            "delete" | "rm" => Command::Delete {
                id: split_id(rest, "delete")?.0,
            },
            other => bail!("Unknown command: {}", other),
        };
        Ok(Some(command))
    }
}

/// Keep tokens in memory for this run only; the keychain is never touched
pub const EPHEMERAL_FLAG: &str = "--ephemeral";

/// Remove every occurrence of a global flag, reporting whether it was present
pub fn take_flag(args: &mut Vec<String>, flag: &str) -> bool {
    let before = args.len();
    args.retain(|a| a != flag);
    args.len() != before
}

fn split_id<'a>(args: &'a [String], command: &str) -> Result<(i64, &'a [String])> {
    let (id, rest) = args
        .split_first()
        .ok_or_else(|| anyhow!("`{}` needs a todo id", command))?;
    let id = id
        .parse::<i64>()
        .with_context(|| format!("Invalid todo id: {}", id))?;
    Ok((id, rest))
}

fn join_words(words: &[String], command: &str) -> Result<String> {
    let text = words.join(" ");
    if text.trim().is_empty() {
        bail!("`{}` needs a description", command);
    }
    Ok(text)
}

/// Everything a command needs: config, the session and the todo client.
pub struct Context {
    pub config: Config,
    pub session: SessionManager,
    pub todos: TodoClient,
}

impl Context {
    pub async fn init(ephemeral: bool) -> Result<Self> {
        let config = Config::load().unwrap_or_else(|e| {
            warn!(error = %e, "Failed to load config, using defaults");
            Config::default()
        });

        let store: Arc<dyn TokenStore> = if ephemeral {
            Arc::new(MemoryTokenStore::new())
        } else {
            Arc::new(KeyringTokenStore::new())
        };
        let session = SessionManager::new(config.api_client()?, store)
            .with_trust_window(config.trust_window());
        session.restore().await?;

        let todos = TodoClient::new(session.clone());
        Ok(Self {
            config,
            session,
            todos,
        })
    }
}

pub async fn execute(ctx: &Context, command: Command) -> Result<()> {
    match command {
        Command::Login { email } => login(ctx, email).await,
        Command::Register => register(ctx).await,
        Command::Logout => {
            ctx.session.logout().await?;
            println!("Logged out.");
            Ok(())
        }
        Command::Status => status(ctx).await,
        Command::List { json } => list(ctx, json).await,
        Command::Add { description } => {
            let todo = ctx.todos.create(&description).await?;
            println!("{}", format_todo_line(&todo));
            Ok(())
        }
        Command::Edit { id, description } => {
            let todo = find(ctx, id).await?;
            let todo = ctx.todos.update(id, &description, todo.done).await?;
            println!("{}", format_todo_line(&todo));
            Ok(())
        }
        Command::SetDone { id, done } => {
            let todo = find(ctx, id).await?;
            let todo = ctx.todos.update(id, &todo.description, done).await?;
            println!("{}", format_todo_line(&todo));
            Ok(())
        }
        Command::Delete { id } => {
            ctx.todos.delete(id).await?;
            println!("Deleted todo {}.", id);
            Ok(())
        }
    }
}

async fn find(ctx: &Context, id: i64) -> Result<tiko_todos_core::Todo> {
    ctx.todos
        .find(id)
        .await?
        .ok_or_else(|| anyhow!("No todo with id {}", id))
}

async fn login(ctx: &Context, email: Option<String>) -> Result<()> {
    let email = match email {
        Some(email) => email,
        None => match ctx.config.last_email.as_deref() {
            Some(last) => {
                let input = prompt(&format!("Email [{}]: ", last))?;
                if input.is_empty() {
                    last.to_string()
                } else {
                    input
                }
            }
            None => prompt("Email: ")?,
        },
    };
    let password = rpassword::prompt_password("Password: ")?;

    println!("Authenticating...");
    ctx.session.login(&email, &password).await?;

    let mut config = ctx.config.clone();
    config.last_email = Some(email.trim().to_lowercase());
    if let Err(e) = config.save() {
        warn!(error = %e, "Failed to save config");
    }

    println!("Login successful!");
    Ok(())
}

async fn register(ctx: &Context) -> Result<()> {
    println!("=== Create Account ===");
    let email = prompt("Email: ")?;
    let password = rpassword::prompt_password("Password (at least 8 characters): ")?;
    let password2 = rpassword::prompt_password("Confirm password: ")?;
    let first_name = prompt("First name: ")?;
    let last_name = prompt("Last name: ")?;

    let profile = RegistrationProfile {
        email,
        password,
        password2,
        first_name,
        last_name,
    };
    ctx.session.register(&profile).await?;

    println!("Registration completed. Log in with `tiko-todos login {}`.", profile.email.to_lowercase());
    Ok(())
}

async fn status(ctx: &Context) -> Result<()> {
    let session = ctx.session.session().await;
    println!("Server:   {}", ctx.session.api().base_url());
    println!("Session:  {}", session.status().label());
    if session.status() == SessionStatus::Authenticated {
        let verified = session
            .validated_at()
            .map(format_timestamp)
            .unwrap_or_else(|| "not verified this run".to_string());
        println!("Verified: {}", verified);
    }
    if let Some(email) = ctx.config.last_email.as_deref() {
        println!("Email:    {}", email);
    }
    Ok(())
}

async fn list(ctx: &Context, json: bool) -> Result<()> {
    let todos = ctx.todos.list().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&todos)?);
        return Ok(());
    }

    if todos.is_empty() {
        println!("No todos yet. Add one with `tiko-todos add <description>`.");
        return Ok(());
    }
    for todo in &todos {
        println!("{}", format_todo_line(todo));
    }
    let open = todos.iter().filter(|t| !t.done).count();
    println!("\n{} todos, {} open", todos.len(), open);
    Ok(())
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}
