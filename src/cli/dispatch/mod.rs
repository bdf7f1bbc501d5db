use std::path::PathBuf;

use anyhow::Result;

use crate::cli::actions::Action;

pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    Ok(Action::Server {
        config: matches
            .get_one::<String>("config")
            .map(PathBuf::from)
            .ok_or_else(|| anyhow::anyhow!("missing required argument: --config"))?,
    })
}
