use anyhow::{Context, Result};

use crate::{cli::actions::Action, config, doorward};

/// Handle the server action
pub async fn handle(action: Action) -> Result<()> {
    match action {
        Action::Server { config: path } => {
            let config = config::load(&path)
                .with_context(|| format!("invalid configuration {}", path.display()))?;

            doorward::new(config).await?;
        }
    }

    Ok(())
}
