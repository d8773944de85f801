use margin_core::models::HighlightDraft;

use crate::commands::common::{describe_sync, resolve_highlight_text, CommandContext};
use crate::error::CliError;

pub async fn run_add(
    text_parts: &[String],
    html: Option<String>,
    source: Option<String>,
    author: Option<String>,
    ctx: &CommandContext,
) -> Result<(), CliError> {
    let text = resolve_highlight_text(text_parts)?;
    let draft = HighlightDraft {
        text,
        html,
        source,
        author,
    };

    let service = ctx.service().await?;
    let change = service.create(&ctx.user, draft).await?;

    println!("{}", change.highlight.id);
    eprintln!("{}", describe_sync(&change.sync));
    Ok(())
}
