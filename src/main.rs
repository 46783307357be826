use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    let cli = calilist::cli::Cli::parse();
    calilist::logging::init(cli.verbose).context("init logging")?;
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        calilist::cli::Command::Sync(args) => {
            let file = calilist::config::load(cli.config.as_deref()).context("load config")?;
            let config = calilist::config::Config::resolve(file, &args).context("resolve config")?;
            let report = calilist::sync::run(&config, args.dry_run)
                .await
                .context("sync")?;
            println!("{}", report.summary_line(args.dry_run));
        }
        calilist::cli::Command::Login => {
            calilist::login::run(cli.config.as_deref())
                .await
                .context("login")?;
        }
    }

    Ok(())
}
