use crate::commands::common::{
    describe_sync, normalize_highlight_identifier, resolve_highlight, CommandContext,
};
use crate::error::CliError;

pub async fn run_delete(id: &str, ctx: &CommandContext) -> Result<(), CliError> {
    let query = normalize_highlight_identifier(id)?;
    let service = ctx.service().await?;
    let highlight = resolve_highlight(&query, &service, &ctx.user).await?;

    let outcome = service.delete(&ctx.user, &highlight.id).await?;
    println!("{}", highlight.id);
    eprintln!("{}", describe_sync(&outcome));
    Ok(())
}
