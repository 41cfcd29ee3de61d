use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{error, info};

use bulkmail::config::{self, Config, LogSettings};
use bulkmail::inliner::resolve_base_dir;
use bulkmail::{list_templates, logging, CampaignRunner, MjmlCompiler, RecipientList, SmtpMailer};

/// Send every MJML template in a directory to a list of recipients
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Directory holding the .mjml templates and the images they reference
    #[clap(short, long, default_value = "./templates")]
    templates: String,

    /// JSON file with a "recipients" array
    #[clap(short, long, default_value = "./sources/recipients.json")]
    recipients: String,

    /// Environment file to load instead of ./.env
    #[clap(long)]
    env_file: Option<String>,

    /// Enable debug logging
    #[clap(short, long)]
    debug: bool,
}

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    let env_file = args.env_file.as_deref().map(expand);
    config::load_env_file(env_file.as_deref()).context("Failed to load environment")?;

    let log_settings = LogSettings::from_env().context("Invalid logging configuration")?;
    logging::init(&log_settings, args.debug)?;

    if let Err(err) = run(&args).await {
        error!("Error: {:#}", err);
        return Err(err);
    }
    Ok(())
}

async fn run(args: &Args) -> Result<()> {
    // Fail on missing settings before touching any file or the relay
    let config = Config::from_env().context("Invalid configuration")?;

    let recipients_path = expand(&args.recipients);
    let recipients = RecipientList::load(&recipients_path)
        .await
        .with_context(|| format!("Failed to load recipients from {}", recipients_path.display()))?;

    let templates_dir = expand(&args.templates);
    let templates = list_templates(&templates_dir)
        .await
        .with_context(|| format!("Failed to load templates from {}", templates_dir.display()))?;
    if templates.is_empty() {
        bail!("No templates found in {}", templates_dir.display());
    }

    info!(
        "Loaded {} templates and {} recipients",
        templates.len(),
        recipients.len()
    );

    let base_dir = resolve_base_dir(&templates_dir)
        .context("Failed to resolve the template directory")?;
    let mailer = SmtpMailer::new(&config.smtp, config.sender.clone())
        .context("Failed to set up the SMTP transport")?;

    let runner = CampaignRunner::new(&MjmlCompiler, &mailer, base_dir);
    let report = runner.run(&templates, &recipients).await;

    info!(
        "Run finished: {} templates sent, {} skipped, {} emails delivered, {} failed",
        report.templates,
        report.skipped_templates.len(),
        report.sent(),
        report.failed()
    );

    Ok(())
}
