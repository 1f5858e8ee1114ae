use anyhow::Result;
use clap::Parser;

use backlot::cli::commands::{self, Command as _};
use backlot::cli::{Cli, Commands};
use backlot::{config, telemetry};

fn main() -> Result<()> {
    let cli = Cli::parse();

    config::init_config()?;
    let settings = config::config()?;
    telemetry::init_telemetry(&settings.observability)?;

    let result = tokio::runtime::Runtime::new()?.block_on(async { run(cli).await });
    telemetry::shutdown_telemetry();
    result
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        // Default behavior: no subcommand - show how the desk flow works
        None => commands::show_desk_overview().await,
        Some(Commands::Init { force, dry_run }) => {
            commands::init::InitCommand::new(force, dry_run).execute().await
        }
        Some(Commands::Seed { file }) => commands::seed::SeedCommand::new(file).execute().await,
        Some(Commands::Arrivals { hours }) => {
            commands::arrivals::ArrivalsCommand::new(hours).execute().await
        }
        Some(Commands::Status { reference }) => {
            commands::status::StatusCommand::new(reference).execute().await
        }
        Some(Commands::Intake { reference, odometer, fuel, at }) => {
            commands::steps::IntakeCommand::new(reference, odometer, fuel, at)
                .execute()
                .await
        }
        Some(Commands::Photo {
            reference,
            label,
            kind,
        }) => {
            commands::photo::PhotoCommand::new(reference, label, kind)
                .execute()
                .await
        }
        Some(Commands::Evidence { reference }) => {
            commands::steps::EvidenceCommand::new(reference).execute().await
        }
        Some(Commands::Issues { reference }) => {
            commands::steps::IssuesCommand::new(reference).execute().await
        }
        Some(Commands::Damage { reference, note, severity, cost, clear }) => {
            commands::damage::DamageCommand::new(reference, note, severity, cost, clear)
                .execute()
                .await
        }
        Some(Commands::Fee { reference, amount, reason, adjust }) => {
            commands::fee::FeeCommand::new(reference, amount, reason, adjust)
                .execute()
                .await
        }
        Some(Commands::Closeout { reference, confirm_damage_check }) => {
            commands::steps::CloseoutCommand::new(reference, confirm_damage_check)
                .execute()
                .await
        }
        Some(Commands::Settle { reference }) => {
            commands::steps::SettleCommand::new(reference).execute().await
        }
        Some(Commands::Audit { reference }) => {
            commands::audit::AuditCommand::new(reference).execute().await
        }
    }
}
