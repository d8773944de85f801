use margin_core::db::{IntegrationRepository, LibSqlIntegrationRepository};
use margin_core::services::open_database;

use crate::commands::common::CommandContext;
use crate::error::CliError;

pub async fn run_connect(token: &str, root: &str, ctx: &CommandContext) -> Result<(), CliError> {
    let db = open_database(&ctx.db_path).await?;
    let integration = LibSqlIntegrationRepository::new(db.connection())
        .upsert(&ctx.user, token, root)
        .await?;

    println!("Connected Notion page {}", integration.root_block_id);
    Ok(())
}

pub async fn run_disconnect(ctx: &CommandContext) -> Result<(), CliError> {
    let db = open_database(&ctx.db_path).await?;
    let removed = LibSqlIntegrationRepository::new(db.connection())
        .delete(&ctx.user)
        .await?;

    if removed {
        println!("Disconnected Notion");
    } else {
        println!("Notion was not connected");
    }
    Ok(())
}
