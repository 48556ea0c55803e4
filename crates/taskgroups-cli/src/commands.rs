//! Subcommand handlers.

use anyhow::{bail, Result};
use taskgroups_core::{GridIconSpec, IconEngine, Referent};

use crate::Command;

pub async fn run(engine: &IconEngine, command: Command) -> Result<()> {
    match command {
        Command::Resolve {
            target,
            force,
            aumid,
        } => {
            let referent = if aumid {
                Referent::packaged(target.clone(), target)
            } else {
                Referent::classify(&target)
            };
            let icon = if force {
                engine.invalidate_and_regenerate(&referent).await
            } else {
                engine.resolve_icon(&referent).await
            };
            match icon {
                Some(path) => println!("{}", path.display()),
                None => bail!("no icon for {}", referent),
            }
        }
        Command::Grid {
            dimension,
            icons,
            output,
        } => {
            let composed = match output {
                Some(target) => {
                    engine
                        .compose_grid_into(GridIconSpec::new(icons, dimension, target))
                        .await
                }
                None => engine.compose_grid_icon(&icons, dimension).await,
            };
            match composed {
                Some(path) => println!("{}", path.display()),
                None => bail!("grid composition failed"),
            }
        }
        Command::Gray { icon } => match engine.make_grayscale_variant(&icon).await {
            Some(path) => println!("{}", path.display()),
            None => bail!("could not desaturate {}", icon.display()),
        },
        Command::Stats => {
            println!("{}", serde_json::to_string_pretty(&engine.stats())?);
        }
        Command::Prune => {
            let report = engine.prune().await;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}
