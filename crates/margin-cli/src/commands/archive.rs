use crate::commands::common::{normalize_highlight_identifier, resolve_highlight, CommandContext};
use crate::error::CliError;

pub async fn run_archive(id: &str, undo: bool, ctx: &CommandContext) -> Result<(), CliError> {
    let query = normalize_highlight_identifier(id)?;
    let service = ctx.service().await?;
    let highlight = resolve_highlight(&query, &service, &ctx.user).await?;

    let updated = service
        .set_archived(&ctx.user, &highlight.id, !undo)
        .await?;
    println!("{}", updated.id);
    Ok(())
}
