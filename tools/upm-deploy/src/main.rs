use clap::Parser;
use cli::{Cli, Command};
use confirm::AssumeYes;
use deploy_home::DeployHome;
use error::is_cancellation;
use external_dependencies::{
    external_dependency_preflight_check, INSTALL_DEPENDENCIES, VM_DEPENDENCIES,
};

mod cleanup;
mod cli;
mod commands;
mod components;
mod confirm;
mod deploy_home;
mod error;
mod external_dependencies;
mod helm;
mod host;
mod k8s;
mod kube_client;
mod logging;
mod network;
mod retry;
mod subprocess;
mod topology;
mod vagrant;
mod vagrant_config;
mod virt;

async fn run(cli: Cli, deploy_home: DeployHome) -> anyhow::Result<()> {
    let assume_yes = AssumeYes::from_boolean(cli.assume_yes);

    // Plumbing from the CLI to the command modules

    match &cli.command {
        Command::Setup(args) => {
            commands::setup(
                args,
                &cli.vagrant_dir,
                &deploy_home,
                assume_yes,
                cli.skip_preflight_checks,
            )
            .await?
        }
        Command::Vm { command } => {
            if !cli.skip_preflight_checks {
                external_dependency_preflight_check(&deploy_home, &VM_DEPENDENCIES)?;
            }

            commands::vm(command, &cli.vagrant_dir, assume_yes).await?
        }
        Command::Install(args) => {
            if !cli.skip_preflight_checks {
                external_dependency_preflight_check(&deploy_home, &INSTALL_DEPENDENCIES)?;
            }

            commands::install(args, &cli.vagrant_dir, assume_yes).await?
        }
    }

    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    #[cfg(not(unix))]
    panic!("Cannot run upm-deploy on non-unix platform");

    let cli = Cli::parse();

    let deploy_home = DeployHome::new()?;

    let log_file = cli
        .log_file
        .clone()
        .unwrap_or_else(|| deploy_home.default_log_file());
    logging::init_tracing("info", &log_file)?;

    cleanup::remove_on_interrupt(deploy_home.tmp_dir()?)?;

    if let Err(e) = run(cli, deploy_home).await {
        if is_cancellation(&e) {
            tracing::info!("{e}, nothing more to do");
            return Ok(());
        }

        tracing::error!("{e:#}");
        std::process::exit(1);
    }

    Ok(())
}
