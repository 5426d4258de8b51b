pub mod cli;
pub mod error;

pub mod cmd {
    pub mod clean;
    pub mod completions;
    pub mod convert;
    pub mod missing;
    pub mod plan;
    pub mod restore;
    pub mod validate;
}

pub mod core {
    pub mod errors;

    pub mod cache;
    pub mod config;
    pub mod dependency;
    pub mod embed;
    pub mod events;
    pub mod feed;
    pub mod graph;
    pub mod project;
    pub mod publish;
    pub mod restore;
    pub mod session;
    pub mod solution;
    pub mod storage;
    pub mod validation;
    pub mod version;
    pub mod workspace;
}

pub mod utils {
    pub mod file_io;
    pub mod theme;
}

use anyhow::Result;

use crate::cli::{Cli, Commands, SelectionArgs};
use crate::core::session::{AppBuilder, AppSession};
use crate::error::CliError;

fn session(selection: &SelectionArgs) -> Result<AppSession> {
    AppBuilder::new()?
        .with_root(selection.root.clone())
        .with_selection(&selection.solutions, selection.all)
        .with_cache(selection.cache.clone())
        .initialize()
}

pub async fn execute(cli: Cli) -> Result<()> {
    let Cli {
        command, selection, ..
    } = cli;

    let Some(command) = command else {
        return Err(CliError::NoCommand.into());
    };

    let exit_code = match command {
        Commands::Completions { shell } => {
            cmd::completions::generate(shell);
            0
        }
        Commands::Version => {
            cmd::completions::print_version();
            0
        }
        Commands::Restore(args) => {
            let mut sess = session(&selection)?;
            cmd::restore::run(&mut sess, args).await?
        }
        Commands::Validate => cmd::validate::run(&session(&selection)?)?,
        Commands::Missing => cmd::missing::run(&session(&selection)?)?,
        Commands::Clean(args) => cmd::clean::run(&mut session(&selection)?, args.mode.into())?,
        Commands::Convert(args) => cmd::convert::run(&mut session(&selection)?, args.mode.into())?,
        Commands::Plan(args) => cmd::plan::run(&mut session(&selection)?, args.format)?,
    };

    if exit_code != 0 {
        std::process::exit(exit_code);
    }

    Ok(())
}
