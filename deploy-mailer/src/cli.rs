//! Command-line front-end for deploy-mailer.
//!
//! Parsing, prompting and printing live here; every remote operation and all
//! validation rules are in `deploy-mailer-core`. Each action reports its own
//! failure as an error so the binary exits non-zero, and nothing is retried.
//!
//! Reports go to stdout; tracing output goes to stderr.

use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use deploy_mailer_core::archive::StagingArea;
use deploy_mailer_core::config::{load_config, AppConfig};
use deploy_mailer_core::consent::LoopbackConsent;
use deploy_mailer_core::contract::{EmailDraft, RepositoryHost};
use deploy_mailer_core::credentials::CredentialProvider;
use deploy_mailer_core::generator::{combine_skills, EmailDraftGenerator};
use deploy_mailer_core::github::GitHubClient;
use deploy_mailer_core::gmail::{load_attachment, MailDispatcher};
use deploy_mailer_core::mail_log;
use deploy_mailer_core::session::SessionState;
use deploy_mailer_core::synchronise::{push_folder, PushTarget, SyncReport, DEFAULT_COMMIT_MESSAGE};
use deploy_mailer_core::transport::ReqwestTransport;
use deploy_mailer_core::validation::require_non_empty;

/// CLI for deploy-mailer: push folders to GitHub and send job application emails.
#[derive(Parser)]
#[clap(
    name = "deploy-mailer",
    version,
    about = "Push local folders to GitHub and send AI-drafted job application emails"
)]
pub struct Cli {
    /// Optional YAML settings file (no secrets)
    #[clap(long, global = true)]
    pub config: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Push files, folders or a zipped folder to a GitHub repository
    Push {
        /// Target repository name
        #[clap(long)]
        repo: String,
        /// Folder to upload, keeping its layout (repeatable)
        #[clap(long = "dir")]
        dirs: Vec<PathBuf>,
        /// Single file to upload into the repository root (repeatable)
        #[clap(long = "file")]
        files: Vec<PathBuf>,
        /// Zipped folder to extract and upload
        #[clap(long)]
        zip: Option<PathBuf>,
        /// Branch to commit to (defaults to the configured branch)
        #[clap(long)]
        branch: Option<String>,
        /// Commit message
        #[clap(long, default_value = DEFAULT_COMMIT_MESSAGE)]
        message: String,
        /// README.md content to add to the upload
        #[clap(long)]
        readme: Option<String>,
        /// Print the per-file report as JSON
        #[clap(long)]
        json: bool,
    },
    /// List or delete your repositories
    Repos {
        #[clap(subcommand)]
        command: RepoCommands,
    },
    /// Check which account the GitHub token belongs to
    Whoami,
    /// Generate and send job application emails
    Email {
        #[clap(subcommand)]
        command: EmailCommands,
    },
}

#[derive(Subcommand)]
pub enum RepoCommands {
    /// Print the names of your repositories
    List,
    /// Delete repositories from your list
    Delete {
        /// Repository names, each must appear in `repos list`
        #[clap(required = true)]
        names: Vec<String>,
        /// Skip the confirmation prompt
        #[clap(long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
pub enum EmailCommands {
    /// Draft an application email and save it as editable YAML
    Generate {
        /// Job description, or @FILE to read it from a file
        #[clap(long)]
        job: String,
        /// Your skills and experience, or @FILE
        #[clap(long)]
        skills: String,
        /// Extra instructions appended to the skills
        #[clap(long)]
        extra: Option<String>,
        /// Subject line for the draft
        #[clap(long)]
        subject: Option<String>,
        /// Where to write the draft
        #[clap(long, default_value = "draft.yaml")]
        out: PathBuf,
    },
    /// Send a saved draft through Gmail
    Send {
        /// Draft YAML written by `email generate`
        #[clap(long)]
        draft: PathBuf,
        /// Recipient address
        #[clap(long)]
        to: String,
        /// Sender address (defaults to GMAIL_ADDRESS)
        #[clap(long)]
        from: Option<String>,
        /// File to attach, overriding the draft's attachment
        #[clap(long)]
        attachment: Option<PathBuf>,
    },
}

/// `@path` reads the text from a file; anything else is taken literally.
pub fn read_text_arg(value: &str) -> Result<String> {
    match value.strip_prefix('@') {
        Some(path) => fs::read_to_string(path).with_context(|| format!("Failed to read {path}")),
        None => Ok(value.to_string()),
    }
}

/// `y` or `yes`, case-insensitive.
pub fn is_confirmation(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

fn confirm(question: &str) -> Result<bool> {
    eprint!("{question} [y/N] ");
    io::stderr().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(is_confirmation(&answer))
}

/// `Success: N, Failed: M` followed by one line per file.
pub fn format_report(report: &SyncReport) -> String {
    let mut out = format!("Success: {}, Failed: {}\n", report.succeeded(), report.failed());
    let width = report
        .results
        .iter()
        .map(|r| r.path.len())
        .max()
        .unwrap_or(0);
    for (path, outcome) in report.rows() {
        out.push_str(&format!("{path:<width$}  {outcome}\n"));
    }
    out
}

fn github_client(config: &AppConfig) -> Result<GitHubClient<ReqwestTransport>> {
    let token = config.require_github_token()?;
    let owner = config.require_github_username()?;
    Ok(GitHubClient::new(
        ReqwestTransport::new(),
        config.github.api_base.clone(),
        owner,
        token,
    ))
}

#[allow(clippy::too_many_arguments)]
async fn push(
    config: &AppConfig,
    repo: String,
    dirs: Vec<PathBuf>,
    files: Vec<PathBuf>,
    zip: Option<PathBuf>,
    branch: Option<String>,
    message: String,
    readme: Option<String>,
    json: bool,
) -> Result<()> {
    let target = PushTarget {
        repo,
        branch: branch.unwrap_or_else(|| config.github.default_branch.clone()),
        message,
    };
    target.validate()?;

    let staging = StagingArea::new().context("Failed to create staging directory")?;
    for dir in &dirs {
        staging
            .add_dir(dir)
            .with_context(|| format!("Failed to stage folder {}", dir.display()))?;
    }
    for file in &files {
        staging
            .add_file(file)
            .with_context(|| format!("Failed to stage file {}", file.display()))?;
    }
    if let Some(zip) = &zip {
        staging
            .add_zip(zip)
            .with_context(|| format!("Failed to extract {}", zip.display()))?;
    }
    if let Some(text) = readme.as_deref().filter(|t| !t.trim().is_empty()) {
        staging.write_readme(text)?;
    }
    if staging.file_count() == 0 {
        bail!("Nothing to upload. Pass at least one --dir, --file or --zip.");
    }

    let client = github_client(config)?;
    tracing::info!(command = "push", repo = %target.repo, "Starting push");
    let report = push_folder(&client, staging.path(), &target).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", format_report(&report));
    }
    if report.failed() > 0 {
        bail!("{} of {} files failed to upload", report.failed(), report.results.len());
    }
    Ok(())
}

async fn list_repos<H: RepositoryHost>(host: &H, session: &mut SessionState) {
    let names = session.repositories(host).await;
    if names.is_empty() {
        println!("No repositories found.");
    }
    for name in names {
        println!("{name}");
    }
}

async fn delete_repos<H: RepositoryHost>(
    host: &H,
    session: &mut SessionState,
    names: Vec<String>,
    yes: bool,
) -> Result<()> {
    session.repositories(host).await;
    session.select(&names)?;

    if !yes && !confirm(&format!("Delete {} repositories: {}?", names.len(), names.join(", ")))? {
        println!("Aborted.");
        return Ok(());
    }

    let outcomes = session.delete_selected(host).await;
    let mut failed = 0;
    for outcome in &outcomes {
        if outcome.deleted {
            println!("Deleted: {}", outcome.name);
        } else {
            failed += 1;
            println!("Failed to delete: {}", outcome.name);
        }
    }
    let remaining = session.repositories(host).await.len();
    println!("Repositories remaining: {remaining}");
    if failed > 0 {
        bail!("{failed} repositories could not be deleted");
    }
    Ok(())
}

async fn whoami(config: &AppConfig) -> Result<()> {
    let client = github_client(config)?;
    match client.authenticated_user().await {
        Some(login) => {
            println!("Authenticated as {login}");
            if login != client.owner() {
                println!("Note: GITHUB_USERNAME is {}", client.owner());
            }
            Ok(())
        }
        None => bail!("GitHub rejected the token. Check GITHUB_TOKEN."),
    }
}

async fn generate_email(
    config: &AppConfig,
    job: String,
    skills: String,
    extra: Option<String>,
    subject: Option<String>,
    out: PathBuf,
) -> Result<()> {
    let job = read_text_arg(&job)?;
    let skills = read_text_arg(&skills)?;
    require_non_empty("Job description", &job)?;
    require_non_empty("Skills", &skills)?;
    let settings = config.gemini_settings()?;

    let generator = EmailDraftGenerator::new(ReqwestTransport::new(), settings);
    let skills = combine_skills(&skills, extra.as_deref());
    let mut draft = match generator.generate_draft(&job, &skills).await {
        Ok(draft) => draft,
        Err(message) => bail!("No email draft was generated: {message}"),
    };
    if let Some(subject) = subject {
        draft.subject = subject;
    }

    write_draft(&out, &draft)?;
    println!("{}\n", draft.body);
    println!("Draft written to {}. Edit it, then run `email send`.", out.display());
    Ok(())
}

fn write_draft(path: &Path, draft: &EmailDraft) -> Result<()> {
    let yaml = serde_yaml::to_string(draft)?;
    fs::write(path, yaml).with_context(|| format!("Failed to write {}", path.display()))
}

fn read_draft(path: &Path) -> Result<EmailDraft> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read draft {}", path.display()))?;
    serde_yaml::from_str(&raw).with_context(|| format!("Failed to parse draft {}", path.display()))
}

async fn send_email(
    config: &AppConfig,
    draft: PathBuf,
    to: String,
    from: Option<String>,
    attachment: Option<PathBuf>,
) -> Result<()> {
    let draft = read_draft(&draft)?;
    require_non_empty("Email body", &draft.body)?;
    require_non_empty("Recipient address", &to)?;
    let from = config.sender_address(from.as_deref())?;

    let attachment = match attachment.or_else(|| draft.attachment.clone()) {
        Some(path) => Some(
            load_attachment(&path)
                .with_context(|| format!("Failed to read attachment {}", path.display()))?,
        ),
        None => None,
    };

    let consent = LoopbackConsent::bind().await?;
    let tokens = CredentialProvider::new(
        ReqwestTransport::new(),
        consent,
        config.gmail.credentials_path.clone(),
        config.gmail.token_path.clone(),
    );
    let dispatcher = MailDispatcher::new(ReqwestTransport::new(), tokens, config.gmail.api_base.clone());

    let sent = dispatcher
        .send(&draft, &to, &from, attachment.as_ref())
        .await
        .context("Failed to send email")?;
    println!("Email sent to {to} (message id {}).", sent.id);

    match mail_log::write_entry(&config.log_dir, &draft, &to, &from) {
        Ok(path) => println!("Logged to {}", path.display()),
        Err(e) => tracing::warn!(error = %e, "Email sent but the log entry could not be written"),
    }
    Ok(())
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => AppConfig::from_env(),
    };

    match cli.command {
        Commands::Push {
            repo,
            dirs,
            files,
            zip,
            branch,
            message,
            readme,
            json,
        } => push(&config, repo, dirs, files, zip, branch, message, readme, json).await,
        Commands::Repos { command } => {
            let client = github_client(&config)?;
            let mut session = SessionState::new();
            match command {
                RepoCommands::List => {
                    list_repos(&client, &mut session).await;
                    Ok(())
                }
                RepoCommands::Delete { names, yes } => {
                    delete_repos(&client, &mut session, names, yes).await
                }
            }
        }
        Commands::Whoami => whoami(&config).await,
        Commands::Email { command } => match command {
            EmailCommands::Generate {
                job,
                skills,
                extra,
                subject,
                out,
            } => generate_email(&config, job, skills, extra, subject, out).await,
            EmailCommands::Send {
                draft,
                to,
                from,
                attachment,
            } => send_email(&config, draft, to, from, attachment).await,
        },
    }
}
